//! GitHub source: Releases API, or plugin headers read from a branch

use std::sync::Arc;

use serde::Deserialize;
use tracing::debug;

use crate::plugin::headers::parse_headers;
use crate::update::error::FetchError;
use crate::update::http::{Auth, HttpClient, RequestPolicy};
use crate::update::reference::{HostKind, RepositoryReference};
use crate::update::source::RepositorySource;
use crate::update::sources::{check_status, parse_json};
use crate::update::types::UpdateRecord;

/// Default base URL for GitHub API
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// Default base URL for raw file access
pub const DEFAULT_RAW_URL: &str = "https://raw.githubusercontent.com";

const WEB_URL: &str = "https://github.com";

/// Response from the GitHub "latest release" endpoint
#[derive(Debug, Deserialize)]
struct Release {
    tag_name: String,
    zipball_url: Option<String>,
    published_at: Option<String>,
    body: Option<String>,
    author: Option<ReleaseAuthor>,
}

#[derive(Debug, Deserialize)]
struct ReleaseAuthor {
    login: String,
}

/// Source implementation for GitHub repositories
pub struct GitHubSource {
    http: Arc<dyn HttpClient>,
    policy: RequestPolicy,
    api_url: String,
    raw_url: String,
    token: Option<String>,
}

impl GitHubSource {
    pub fn new(
        http: Arc<dyn HttpClient>,
        policy: RequestPolicy,
        api_url: &str,
        raw_url: &str,
    ) -> Self {
        Self {
            http,
            policy,
            api_url: api_url.trim_end_matches('/').to_string(),
            raw_url: raw_url.trim_end_matches('/').to_string(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.is_empty());
        self
    }

    fn auth(&self, reference: &RepositoryReference) -> Option<Auth> {
        match (&self.token, &reference.credentials) {
            (Some(token), _) => Some(Auth::Bearer(token.clone())),
            (None, Some(credentials)) => Some(Auth::Basic(credentials.clone())),
            (None, None) => None,
        }
    }

    fn homepage(reference: &RepositoryReference) -> String {
        format!("{}/{}", WEB_URL, reference.full_name())
    }

    async fn fetch_release(
        &self,
        reference: &RepositoryReference,
    ) -> Result<UpdateRecord, FetchError> {
        let url = format!(
            "{}/repos/{}/releases/latest",
            self.api_url,
            reference.full_name()
        );

        let request = self
            .policy
            .request(&url)?
            .header("Accept", "application/vnd.github+json")
            .auth(self.auth(reference));
        let response = self.http.get(request).await?;
        check_status(&response, reference, &url)?;

        let release: Release = parse_json(&response, &url)?;
        if release.tag_name.trim().is_empty() {
            return Err(FetchError::Malformed(format!(
                "release of {} has an empty tag",
                reference.full_name()
            )));
        }

        let download_url = release.zipball_url.unwrap_or_else(|| {
            format!(
                "{}/{}/archive/refs/tags/{}.zip",
                WEB_URL,
                reference.full_name(),
                release.tag_name
            )
        });

        Ok(UpdateRecord {
            remote_version: release.tag_name,
            download_url,
            homepage: Self::homepage(reference),
            author: release.author.map(|a| a.login),
            requires: None,
            tested: None,
            last_updated: release.published_at,
            description: release.body.filter(|b| !b.is_empty()),
        })
    }

    async fn fetch_branch(
        &self,
        reference: &RepositoryReference,
        branch: &str,
        main_file: &str,
    ) -> Result<UpdateRecord, FetchError> {
        let url = format!(
            "{}/{}/{}/{}",
            self.raw_url,
            reference.full_name(),
            branch,
            main_file
        );

        let request = self.policy.request(&url)?.auth(self.auth(reference));
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
            download_url: format!(
                "{}/{}/archive/refs/heads/{}.zip",
                WEB_URL,
                reference.full_name(),
                branch
            ),
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
impl RepositorySource for GitHubSource {
    fn host_kind(&self) -> HostKind {
        HostKind::GitHub
    }

    async fn fetch_latest(
        &self,
        reference: &RepositoryReference,
    ) -> Result<UpdateRecord, FetchError> {
        match (&reference.branch, &reference.main_file) {
            (Some(branch), Some(main_file)) => {
                debug!("Reading {} headers from branch {}", reference.full_name(), branch);
                self.fetch_branch(reference, branch, main_file).await
            }
            _ => self.fetch_release(reference).await,
        }
    }
}
