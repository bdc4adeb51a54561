//! Generic Git source using the smart HTTP ref advertisement
//!
//! Any repository served at a `.git` URL answers
//! `GET <url>/info/refs?service=git-upload-pack` with its refs encoded as
//! pkt-lines. Tags are read from that listing; dumb HTTP servers that reply
//! with plain `<sha>\t<ref>` lines are handled as well.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::update::error::FetchError;
use crate::update::http::{Auth, HttpClient, RequestPolicy};
use crate::update::reference::{HostKind, RepositoryReference};
use crate::update::semver::find_max_version;
use crate::update::source::RepositorySource;
use crate::update::sources::check_status;
use crate::update::types::UpdateRecord;

const UPLOAD_PACK_ADVERTISEMENT: &str = "application/x-git-upload-pack-advertisement";
const TAG_PREFIX: &str = "refs/tags/";
const PEELED_SUFFIX: &str = "^{}";

/// Source implementation for plain Git repositories
pub struct GenericGitSource {
    http: Arc<dyn HttpClient>,
    policy: RequestPolicy,
    ignore_prerelease: bool,
}

impl GenericGitSource {
    pub fn new(http: Arc<dyn HttpClient>, policy: RequestPolicy) -> Self {
        Self {
            http,
            policy,
            ignore_prerelease: false,
        }
    }

    pub fn with_ignore_prerelease(mut self, ignore_prerelease: bool) -> Self {
        self.ignore_prerelease = ignore_prerelease;
        self
    }
}

#[async_trait::async_trait]
impl RepositorySource for GenericGitSource {
    fn host_kind(&self) -> HostKind {
        HostKind::GenericGit
    }

    async fn fetch_latest(
        &self,
        reference: &RepositoryReference,
    ) -> Result<UpdateRecord, FetchError> {
        if let Some(branch) = &reference.branch {
            debug!(
                "Ignoring branch {} for {}: plain Git hosts are checked by tag",
                branch,
                reference.url
            );
        }

        let repo_url = reference.url.as_str().trim_end_matches('/');
        let url = format!("{}/info/refs?service=git-upload-pack", repo_url);

        let request = self
            .policy
            .request(&url)?
            .auth(reference.credentials.clone().map(Auth::Basic));
        let response = self.http.get(request).await?;
        check_status(&response, reference, &url)?;

        let smart = response
            .header("content-type")
            .is_some_and(|ct| ct.starts_with(UPLOAD_PACK_ADVERTISEMENT));
        let tags = if smart {
            parse_pkt_line_tags(&response.body)?
        } else {
            parse_plain_tags(&response.body)
        };

        let Some(newest) = find_max_version(&tags, self.ignore_prerelease) else {
            return Err(FetchError::NotFound(format!(
                "{} has no version tags",
                reference.url
            )));
        };

        let base = repo_url.strip_suffix(".git").unwrap_or(repo_url);
        Ok(UpdateRecord {
            download_url: format!("{}/archive/{}.zip", base, newest),
            remote_version: newest,
            homepage: base.to_string(),
            author: None,
            requires: None,
            tested: None,
            last_updated: None,
            description: None,
        })
    }
}

/// Extract tag names from a pkt-line encoded ref advertisement
fn parse_pkt_line_tags(body: &str) -> Result<Vec<String>, FetchError> {
    let bytes = body.as_bytes();
    let mut tags = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        let header = bytes
            .get(pos..pos + 4)
            .and_then(|h| std::str::from_utf8(h).ok())
            .ok_or_else(|| FetchError::Malformed("truncated pkt-line header".to_string()))?;
        let len = usize::from_str_radix(header, 16)
            .map_err(|_| FetchError::Malformed(format!("invalid pkt-line length {header:?}")))?;

        // flush-pkt
        if len == 0 {
            pos += 4;
            continue;
        }
        if len < 4 || pos + len > bytes.len() {
            return Err(FetchError::Malformed(format!(
                "pkt-line length {len} out of range"
            )));
        }

        let payload = String::from_utf8_lossy(&bytes[pos + 4..pos + len]);
        pos += len;

        let line = payload.trim_end_matches('\n');
        if line.starts_with('#') {
            continue;
        }
        // The first ref carries capabilities after a NUL byte
        let line = line.split('\0').next().unwrap_or_default();
        if let Some(tag) = line.split_once(' ').and_then(|(_, name)| tag_name(name)) {
            tags.push(tag);
        }
    }

    Ok(tags)
}

/// Extract tag names from a dumb-protocol `info/refs` listing
fn parse_plain_tags(body: &str) -> Vec<String> {
    let tags: Vec<String> = body
        .lines()
        .filter_map(|line| line.split_once('\t').and_then(|(_, name)| tag_name(name)))
        .collect();
    if tags.is_empty() && !body.trim().is_empty() {
        warn!("No tags found in ref listing");
    }
    tags
}

fn tag_name(ref_name: &str) -> Option<String> {
    let tag = ref_name.trim().strip_prefix(TAG_PREFIX)?;
    if tag.ends_with(PEELED_SUFFIX) {
        return None;
    }
    Some(tag.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::update::http::{MockHttpClient, ReqwestClient};
    use mockito::{Matcher, Server};

    fn pkt(line: &str) -> String {
        format!("{:04x}{}", line.len() + 4, line)
    }

    fn advertisement(refs: &[&str]) -> String {
        let mut body = pkt("# service=git-upload-pack\n");
        body.push_str("0000");
        for (i, r) in refs.iter().enumerate() {
            let line = if i == 0 {
                format!("{r}\0multi_ack thin-pack side-band\n")
            } else {
                format!("{r}\n")
            };
            body.push_str(&pkt(&line));
        }
        body.push_str("0000");
        body
    }

    #[test]
    fn parse_pkt_line_tags_skips_heads_and_peeled_tags() {
        let body = advertisement(&[
            "1111111111111111111111111111111111111111 HEAD",
            "2222222222222222222222222222222222222222 refs/heads/main",
            "3333333333333333333333333333333333333333 refs/tags/v1.0.0",
            "4444444444444444444444444444444444444444 refs/tags/v1.0.0^{}",
            "5555555555555555555555555555555555555555 refs/tags/v1.2.0",
        ]);

        assert_eq!(
            parse_pkt_line_tags(&body).unwrap(),
            vec!["v1.0.0".to_string(), "v1.2.0".to_string()]
        );
    }

    #[test]
    fn parse_pkt_line_tags_rejects_truncated_input() {
        assert!(matches!(
            parse_pkt_line_tags("00ffshort"),
            Err(FetchError::Malformed(_))
        ));
        assert!(matches!(
            parse_pkt_line_tags("zz"),
            Err(FetchError::Malformed(_))
        ));
    }

    #[test]
    fn parse_plain_tags_reads_tab_separated_refs() {
        let body = "aaaa\trefs/heads/main\nbbbb\trefs/tags/2.0.0\ncccc\trefs/tags/2.0.0^{}\n";

        assert_eq!(parse_plain_tags(body), vec!["2.0.0".to_string()]);
    }

    #[tokio::test]
    async fn fetch_latest_returns_highest_tag() {
        let mut server = Server::new_async().await;

        let mock = server
            .mock("GET", "/acme/hello.git/info/refs")
            .match_query(Matcher::UrlEncoded(
                "service".into(),
                "git-upload-pack".into(),
            ))
            .with_status(200)
            .with_header("content-type", UPLOAD_PACK_ADVERTISEMENT)
            .with_body(advertisement(&[
                "1111111111111111111111111111111111111111 refs/heads/main",
                "2222222222222222222222222222222222222222 refs/tags/1.9.0",
                "3333333333333333333333333333333333333333 refs/tags/1.10.0",
            ]))
            .create_async()
            .await;

        let reference =
            RepositoryReference::parse(&format!("{}/acme/hello.git", server.url())).unwrap();
        let source = GenericGitSource::new(
            Arc::new(ReqwestClient::new().unwrap()),
            RequestPolicy::default()
                .with_insecure_hosts(vec!["127.0.0.1".to_string()]),
        );

        let result = source.fetch_latest(&reference).await.unwrap();

        mock.assert_async().await;
        assert_eq!(result.remote_version, "1.10.0");
        assert_eq!(
            result.download_url,
            format!("{}/acme/hello/archive/1.10.0.zip", server.url())
        );
        assert_eq!(result.homepage, format!("{}/acme/hello", server.url()));
    }

    #[tokio::test]
    async fn fetch_latest_refuses_plain_http_host_not_listed_as_insecure() {
        let mut http = MockHttpClient::new();
        http.expect_get().never();

        let reference = RepositoryReference::parse("http://git.example.com/acme/hello.git").unwrap();
        let source = GenericGitSource::new(Arc::new(http), RequestPolicy::default());

        assert!(matches!(
            source.fetch_latest(&reference).await,
            Err(FetchError::InsecureTransport(url)) if url.starts_with("http://git.example.com/")
        ));
    }

    #[tokio::test]
    async fn fetch_latest_returns_not_found_without_tags() {
        let mut server = Server::new_async().await;

        let _mock = server
            .mock("GET", "/acme/empty.git/info/refs")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("content-type", UPLOAD_PACK_ADVERTISEMENT)
            .with_body(advertisement(&[
                "1111111111111111111111111111111111111111 refs/heads/main",
            ]))
            .create_async()
            .await;

        let reference =
            RepositoryReference::parse(&format!("{}/acme/empty.git", server.url())).unwrap();
        let source = GenericGitSource::new(
            Arc::new(ReqwestClient::new().unwrap()),
            RequestPolicy::default()
                .with_insecure_hosts(vec!["127.0.0.1".to_string()]),
        );

        assert!(matches!(
            source.fetch_latest(&reference).await,
            Err(FetchError::NotFound(_))
        ));
    }
}
