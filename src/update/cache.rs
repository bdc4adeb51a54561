//! TTL-bounded cache of update records
//!
//! The cache holds one snapshot: a map of plugin identifier to the latest
//! release found for it, plus the time the snapshot was taken. A snapshot is
//! never patched. A refresh fetches every resolvable plugin and replaces the
//! stored snapshot with a single `set`.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::DEFAULT_MAX_CONCURRENT_FETCHES;
use crate::plugin::types::PluginDescriptor;
use crate::update::clock::Clock;
use crate::update::error::StoreError;
use crate::update::reference::RepositoryReference;
use crate::update::source::{RepositorySource, SourceSet};
use crate::update::store::SnapshotStore;
use crate::update::types::UpdateRecord;

/// Store key of the snapshot
pub const SNAPSHOT_KEY: &str = "git_plugins";

/// A complete snapshot of update records
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Records in plugin enumeration order; absent means "unknown"
    pub records: IndexMap<String, UpdateRecord>,
    /// Creation time in milliseconds since UNIX epoch
    pub created_at: i64,
    /// Time-to-live in milliseconds the entry was created with
    pub ttl: i64,
}

impl CacheEntry {
    /// Returns true if the entry is younger than both its own ttl and `ttl`
    pub fn is_fresh(&self, now_ms: i64, ttl: Duration) -> bool {
        let age = now_ms - self.created_at;
        let limit = self.ttl.min(millis(ttl));
        // A clock that went backwards makes the age meaningless
        age >= 0 && age < limit
    }
}

fn millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

/// A plugin resolved to the source that can check it
pub struct ResolvedPlugin {
    pub identifier: String,
    pub reference: RepositoryReference,
    pub source: Arc<dyn RepositorySource>,
}

pub struct UpdateCache {
    store: Arc<dyn SnapshotStore>,
    clock: Arc<dyn Clock>,
    sources: SourceSet,
    max_concurrent_fetches: usize,
}

impl UpdateCache {
    pub fn new(store: Arc<dyn SnapshotStore>, clock: Arc<dyn Clock>, sources: SourceSet) -> Self {
        Self {
            store,
            clock,
            sources,
            max_concurrent_fetches: DEFAULT_MAX_CONCURRENT_FETCHES,
        }
    }

    pub fn with_max_concurrent_fetches(mut self, max: usize) -> Self {
        self.max_concurrent_fetches = max.max(1);
        self
    }

    /// Resolve a plugin to its repository reference and source
    ///
    /// Returns `None` for plugins without a repository, with an unparseable
    /// URL, or on a host no source recognizes.
    pub fn resolve(&self, plugin: &PluginDescriptor) -> Option<ResolvedPlugin> {
        let reference = match RepositoryReference::from_descriptor(plugin) {
            Ok(Some(reference)) => reference,
            Ok(None) => return None,
            Err(e) => {
                warn!("Skipping {}: {}", plugin.identifier, e);
                return None;
            }
        };

        let Some(source) = self.sources.select(&reference) else {
            debug!(
                "Skipping {}: no source for {} ({})",
                plugin.identifier,
                reference.url,
                reference.host_kind.as_str()
            );
            return None;
        };

        Some(ResolvedPlugin {
            identifier: plugin.identifier.clone(),
            reference,
            source: source.clone(),
        })
    }

    /// The stored snapshot, without refreshing
    pub fn snapshot(&self) -> Option<CacheEntry> {
        let raw = self
            .store
            .get(SNAPSHOT_KEY)
            .inspect_err(|e| error!("Failed to read cache snapshot: {}", e))
            .ok()??;

        serde_json::from_str(&raw)
            .inspect_err(|e| warn!("Discarding unreadable cache snapshot: {}", e))
            .ok()
    }

    /// Return the cached records if fresh, otherwise refresh them first
    ///
    /// Fetch failures drop only the failing plugin from the new snapshot.
    pub async fn get_or_refresh(
        &self,
        plugins: &[PluginDescriptor],
        ttl: Duration,
    ) -> IndexMap<String, UpdateRecord> {
        let now = self.clock.now_ms();

        if let Some(entry) = self.snapshot() {
            if entry.is_fresh(now, ttl) {
                debug!(
                    "Using cached snapshot with {} records, created at {}",
                    entry.records.len(),
                    entry.created_at
                );
                return entry.records;
            }
            debug!("Cached snapshot created at {} is stale", entry.created_at);
        }

        self.refresh(plugins, ttl).await.records
    }

    /// Drop the stored snapshot so the next call refreshes
    pub fn invalidate(&self) -> Result<(), StoreError> {
        info!("Invalidating cache snapshot");
        self.store.delete(SNAPSHOT_KEY)
    }

    async fn refresh(&self, plugins: &[PluginDescriptor], ttl: Duration) -> CacheEntry {
        let resolved: Vec<ResolvedPlugin> = plugins.iter().filter_map(|p| self.resolve(p)).collect();
        info!("Refreshing update data for {} plugins", resolved.len());

        let results: Vec<_> = stream::iter(resolved)
            .map(|plugin| async move {
                let result = plugin.source.fetch_latest(&plugin.reference).await;
                (plugin, result)
            })
            .buffered(self.max_concurrent_fetches)
            .collect()
            .await;

        let mut records = IndexMap::new();
        for (plugin, result) in results {
            match result {
                Ok(record) => {
                    debug!(
                        "Latest release of {} is {}",
                        plugin.identifier, record.remote_version
                    );
                    records.insert(plugin.identifier, record);
                }
                Err(e) => {
                    warn!(
                        "Failed to fetch {} from {}: {}",
                        plugin.identifier, plugin.reference.url, e
                    );
                }
            }
        }

        let entry = CacheEntry {
            records,
            created_at: self.clock.now_ms(),
            ttl: millis(ttl),
        };

        match serde_json::to_string(&entry) {
            Ok(raw) => {
                let _ = self
                    .store
                    .set(SNAPSHOT_KEY, &raw, ttl)
                    .inspect_err(|e| error!("Failed to save cache snapshot: {}", e));
            }
            Err(e) => error!("Failed to serialize cache snapshot: {}", e),
        }

        info!("Cached {} update records", entry.records.len());
        entry
    }
}
