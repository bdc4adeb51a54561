//! Bitbucket Cloud source

use std::sync::Arc;

use serde::Deserialize;

use crate::plugin::headers::parse_headers;
use crate::update::error::FetchError;
use crate::update::http::{Auth, HttpClient, RequestPolicy};
use crate::update::reference::{HostKind, RepositoryReference};
use crate::update::semver::find_max_version;
use crate::update::source::RepositorySource;
use crate::update::sources::{check_status, parse_json};
use crate::update::types::UpdateRecord;

/// Default base URL for Bitbucket API
pub const DEFAULT_API_URL: &str = "https://api.bitbucket.org";

const WEB_URL: &str = "https://bitbucket.org";

/// Number of most recent tags considered per check
const TAG_PAGE_LEN: usize = 50;

/// Response from the Bitbucket refs/tags endpoint
#[derive(Debug, Deserialize)]
struct TagPage {
    values: Vec<Tag>,
}

#[derive(Debug, Deserialize)]
struct Tag {
    name: String,
    target: Option<TagTarget>,
}

#[derive(Debug, Deserialize)]
struct TagTarget {
    date: Option<String>,
    message: Option<String>,
    author: Option<TagAuthor>,
}

#[derive(Debug, Deserialize)]
struct TagAuthor {
    raw: Option<String>,
}

/// Source implementation for Bitbucket repositories
pub struct BitbucketSource {
    http: Arc<dyn HttpClient>,
    policy: RequestPolicy,
    api_url: String,
    ignore_prerelease: bool,
}

impl BitbucketSource {
    pub fn new(http: Arc<dyn HttpClient>, policy: RequestPolicy, api_url: &str) -> Self {
        Self {
            http,
            policy,
            api_url: api_url.trim_end_matches('/').to_string(),
            ignore_prerelease: false,
        }
    }

    pub fn with_ignore_prerelease(mut self, ignore_prerelease: bool) -> Self {
        self.ignore_prerelease = ignore_prerelease;
        self
    }

    fn auth(reference: &RepositoryReference) -> Option<Auth> {
        reference.credentials.clone().map(Auth::Basic)
    }

    fn homepage(reference: &RepositoryReference) -> String {
        format!("{}/{}", WEB_URL, reference.full_name())
    }

    fn archive_url(reference: &RepositoryReference, git_ref: &str) -> String {
        format!("{}/{}/get/{}.zip", WEB_URL, reference.full_name(), git_ref)
    }

    async fn fetch_tags(&self, reference: &RepositoryReference) -> Result<UpdateRecord, FetchError> {
        let url = format!(
            "{}/2.0/repositories/{}/refs/tags?sort=-target.date&pagelen={}",
            self.api_url,
            reference.full_name(),
            TAG_PAGE_LEN
        );

        let request = self.policy.request(&url)?.auth(Self::auth(reference));
        let response = self.http.get(request).await?;
        check_status(&response, reference, &url)?;

        let page: TagPage = parse_json(&response, &url)?;
        let names: Vec<String> = page.values.iter().map(|t| t.name.clone()).collect();
        let Some(newest) = find_max_version(&names, self.ignore_prerelease) else {
            return Err(FetchError::NotFound(format!(
                "{} has no version tags",
                reference.full_name()
            )));
        };

        let target = page
            .values
            .into_iter()
            .find(|t| t.name == newest)
            .and_then(|t| t.target);
        let (last_updated, description, author) = match target {
            Some(target) => (
                target.date,
                target.message.map(|m| m.trim().to_string()).filter(|m| !m.is_empty()),
                target.author.and_then(|a| a.raw),
            ),
            None => (None, None, None),
        };

        Ok(UpdateRecord {
            download_url: Self::archive_url(reference, &newest),
            remote_version: newest,
            homepage: Self::homepage(reference),
            author,
            requires: None,
            tested: None,
            last_updated,
            description,
        })
    }

    async fn fetch_branch(
        &self,
        reference: &RepositoryReference,
        branch: &str,
        main_file: &str,
    ) -> Result<UpdateRecord, FetchError> {
        let url = format!(
            "{}/2.0/repositories/{}/src/{}/{}",
            self.api_url,
            reference.full_name(),
            branch,
            main_file
        );

        let request = self.policy.request(&url)?.auth(Self::auth(reference));
        let response = self.http.get(request).await?;
        check_status(&response, reference, &url)?;

        let headers = parse_headers(&response.body);
        let Some(version) = headers.version else {
            return Err(FetchError::Malformed(format!(
                "{} has no Version header",
                url
            )));
        };

        Ok(UpdateRecord {
            remote_version: version,
            download_url: Self::archive_url(reference, branch),
            homepage: headers
                .plugin_uri
                .unwrap_or_else(|| Self::homepage(reference)),
            author: headers.author,
            requires: headers.requires,
            tested: headers.tested,
            last_updated: None,
            description: headers.description,
        })
    }
}

#[async_trait::async_trait]
impl RepositorySource for BitbucketSource {
    fn host_kind(&self) -> HostKind {
        HostKind::Bitbucket
    }

    async fn fetch_latest(
        &self,
        reference: &RepositoryReference,
    ) -> Result<UpdateRecord, FetchError> {
        match (&reference.branch, &reference.main_file) {
            (Some(branch), Some(main_file)) => {
                self.fetch_branch(reference, branch, main_file).await
            }
            _ => self.fetch_tags(reference).await,
        }
    }
}
