//! Orchestration of update queries and update application

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use tracing::{debug, info, warn};

use crate::plugin::directory::PluginSource;
use crate::plugin::types::PluginDescriptor;
use crate::update::cache::UpdateCache;
use crate::update::error::{RegistryError, StoreError, UpdateError};
use crate::update::installer::Installer;
use crate::update::semver::is_newer;
use crate::update::types::{AvailableUpdate, UpdateOffer, UpdateRecord};

/// Outcome of a successful `apply_update`
#[derive(Debug)]
pub struct UpdateReport {
    pub identifier: String,
    pub new_version: String,
    pub destination: PathBuf,
    /// Set when the install succeeded but a follow-up step did not
    pub warning: Option<UpdateError>,
}

impl UpdateReport {
    pub fn is_clean(&self) -> bool {
        self.warning.is_none()
    }
}

pub struct UpdateRegistry {
    plugins: Arc<dyn PluginSource>,
    cache: UpdateCache,
    installer: Arc<dyn Installer>,
    plugins_root: PathBuf,
    ttl: Duration,
    debug: bool,
}

impl UpdateRegistry {
    pub fn new(
        plugins: Arc<dyn PluginSource>,
        cache: UpdateCache,
        installer: Arc<dyn Installer>,
        plugins_root: impl Into<PathBuf>,
        ttl: Duration,
    ) -> Self {
        Self {
            plugins,
            cache,
            installer,
            plugins_root: plugins_root.into(),
            ttl,
            debug: false,
        }
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn cache(&self) -> &UpdateCache {
        &self.cache
    }

    /// Installed plugins that declare a repository some source can check
    fn checkable_plugins(&self) -> Result<Vec<PluginDescriptor>, RegistryError> {
        let plugins = self.plugins.installed_plugins()?;
        let total = plugins.len();
        let checkable: Vec<PluginDescriptor> = plugins
            .into_iter()
            .filter(|p| self.cache.resolve(p).is_some())
            .collect();

        debug!("{} of {} plugins are checkable", checkable.len(), total);
        Ok(checkable)
    }

    async fn fresh_records(
        &self,
        plugins: &[PluginDescriptor],
    ) -> IndexMap<String, UpdateRecord> {
        self.cache.get_or_refresh(plugins, self.ttl).await
    }

    /// Plugins whose repository holds a newer release, in enumeration order
    pub async fn list_available_updates(&self) -> Result<Vec<AvailableUpdate>, RegistryError> {
        let plugins = self.checkable_plugins()?;
        let mut records = self.fresh_records(&plugins).await;

        let updates: Vec<AvailableUpdate> = plugins
            .into_iter()
            .filter_map(|plugin| {
                let record = records.shift_remove(&plugin.identifier)?;
                is_newer(&record.remote_version, &plugin.installed_version)
                    .then_some(AvailableUpdate { plugin, record })
            })
            .collect();

        info!("{} updates available", updates.len());
        Ok(updates)
    }

    /// Decision output for every available update
    pub async fn offers(&self) -> Result<Vec<UpdateOffer>, RegistryError> {
        Ok(self
            .list_available_updates()
            .await?
            .iter()
            .map(AvailableUpdate::offer)
            .collect())
    }

    /// Cached release record for one plugin, refreshing first if stale
    pub async fn describe(&self, identifier: &str) -> Result<Option<UpdateRecord>, RegistryError> {
        let plugins = self.checkable_plugins()?;
        let mut records = self.fresh_records(&plugins).await;
        Ok(records.shift_remove(identifier))
    }

    /// Install the newest release of `identifier`, preserving its active state
    pub async fn apply_update(&self, identifier: &str) -> Result<UpdateReport, UpdateError> {
        let plugins = self.checkable_plugins()?;
        let Some(plugin) = plugins.iter().find(|p| p.identifier == identifier).cloned() else {
            return Err(UpdateError::NotAvailable(identifier.to_string()));
        };

        let record = self
            .fresh_records(&plugins)
            .await
            .shift_remove(identifier)
            .filter(|r| is_newer(&r.remote_version, &plugin.installed_version))
            .ok_or_else(|| UpdateError::NotAvailable(identifier.to_string()))?;

        let was_active = self.installer.is_active(&plugin).await.unwrap_or_else(|e| {
            warn!("Could not read active state of {}: {}", identifier, e);
            false
        });

        let destination = self.plugins_root.join(identifier);
        info!(
            "Updating {} from {} to {}",
            identifier, plugin.installed_version, record.remote_version
        );

        self.installer
            .install(&plugin, &record.download_url, &destination)
            .await
            .map_err(|source| UpdateError::InstallFailed {
                identifier: identifier.to_string(),
                source,
            })?;

        let warning = if was_active {
            self.installer
                .set_active(&plugin, true)
                .await
                .err()
                .map(|source| {
                    warn!("Failed to reactivate {}: {}", identifier, source);
                    UpdateError::ReactivationFailed {
                        identifier: identifier.to_string(),
                        source,
                    }
                })
        } else {
            None
        };

        Ok(UpdateReport {
            identifier: identifier.to_string(),
            new_version: record.remote_version,
            destination,
            warning,
        })
    }

    /// Drop the cached snapshot
    pub fn clear_cache(&self) -> Result<(), StoreError> {
        self.cache.invalidate()
    }

    /// Drop the cached snapshot when running in debug mode
    pub fn clear_cache_if_debugging(&self) -> Result<(), StoreError> {
        if self.debug {
            self.clear_cache()?;
        }
        Ok(())
    }
}
