//! Repository source trait for fetching release metadata from Git hosts

use std::sync::Arc;

#[cfg(test)]
use mockall::automock;

use crate::update::error::FetchError;
use crate::update::reference::{HostKind, RepositoryReference};
use crate::update::types::UpdateRecord;

/// Trait for fetching the latest release of a repository
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait RepositorySource: Send + Sync {
    /// Returns the host kind this implementation handles
    fn host_kind(&self) -> HostKind;

    /// Returns true if this source can check the given repository
    fn recognizes(&self, reference: &RepositoryReference) -> bool {
        reference.host_kind == self.host_kind()
    }

    /// Fetches the metadata of the newest release
    ///
    /// # Returns
    /// * `Ok(UpdateRecord)` - Fully populated record
    /// * `Err(FetchError)` - If the request fails or the payload is unusable
    async fn fetch_latest(&self, reference: &RepositoryReference)
    -> Result<UpdateRecord, FetchError>;
}

/// Sources in priority order; the first one that recognizes a reference wins
#[derive(Clone, Default)]
pub struct SourceSet {
    sources: Vec<Arc<dyn RepositorySource>>,
}

impl SourceSet {
    pub fn new(sources: Vec<Arc<dyn RepositorySource>>) -> Self {
        Self { sources }
    }

    pub fn select(&self, reference: &RepositoryReference) -> Option<&Arc<dyn RepositorySource>> {
        self.sources.iter().find(|s| s.recognizes(reference))
    }
}
