//! Repository source implementations for fetching release metadata

pub mod bitbucket;
pub mod generic_git;
pub mod github;

pub use bitbucket::BitbucketSource;
pub use generic_git::GenericGitSource;
pub use github::GitHubSource;

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tracing::warn;

use crate::config::Config;
use crate::update::error::FetchError;
use crate::update::http::{HttpClient, HttpResponse, RequestPolicy};
use crate::update::reference::RepositoryReference;
use crate::update::source::{RepositorySource, SourceSet};

/// Request policy built from the `http` section of `config`
pub fn request_policy(config: &Config) -> RequestPolicy {
    RequestPolicy::new(
        Duration::from_secs(config.http.timeout),
        config.http.ssl_disabled_hosts.clone(),
    )
    .with_insecure_hosts(config.http.insecure_hosts.clone())
}

/// Create the enabled sources in priority order: GitHub, Bitbucket, generic Git
pub fn create_default_sources(config: &Config, http: Arc<dyn HttpClient>) -> SourceSet {
    let policy = request_policy(config);
    let sources_config = &config.sources;
    let mut sources: Vec<Arc<dyn RepositorySource>> = Vec::new();

    if sources_config.github.enabled {
        sources.push(Arc::new(
            GitHubSource::new(
                http.clone(),
                policy.clone(),
                &sources_config.github.api_url,
                &sources_config.github.raw_url,
            )
            .with_token(sources_config.github.token.clone()),
        ));
    }

    if sources_config.bitbucket.enabled {
        sources.push(Arc::new(
            BitbucketSource::new(http.clone(), policy.clone(), &sources_config.bitbucket.api_url)
                .with_ignore_prerelease(sources_config.ignore_prerelease),
        ));
    }

    if sources_config.git.enabled {
        sources.push(Arc::new(
            GenericGitSource::new(http, policy)
                .with_ignore_prerelease(sources_config.ignore_prerelease),
        ));
    }

    SourceSet::new(sources)
}

/// Map a non-success HTTP status to the matching fetch error
fn check_status(
    response: &HttpResponse,
    reference: &RepositoryReference,
    url: &str,
) -> Result<(), FetchError> {
    match response.status {
        _ if response.is_success() => Ok(()),
        404 => Err(FetchError::NotFound(reference.full_name())),
        429 => Err(FetchError::RateLimited {
            retry_after_secs: retry_after(response),
        }),
        // GitHub signals an exhausted quota with 403
        403 if response.header("x-ratelimit-remaining") == Some("0") => {
            Err(FetchError::RateLimited {
                retry_after_secs: retry_after(response),
            })
        }
        401 | 403 => Err(FetchError::Unauthorized(url.to_string())),
        status => {
            warn!("{} returned status {}", url, status);
            Err(FetchError::UnexpectedStatus {
                status,
                url: url.to_string(),
            })
        }
    }
}

fn retry_after(response: &HttpResponse) -> Option<u64> {
    response.header("retry-after").and_then(|v| v.trim().parse().ok())
}

fn parse_json<T: DeserializeOwned>(response: &HttpResponse, url: &str) -> Result<T, FetchError> {
    serde_json::from_str(&response.body).map_err(|e| {
        warn!("Failed to parse response from {}: {}", url, e);
        FetchError::Malformed(e.to_string())
    })
}
