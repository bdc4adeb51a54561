//! Shared fakes for integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use git_plugin_updater::plugin::directory::PluginDirectory;
use git_plugin_updater::plugin::types::PluginDescriptor;
use git_plugin_updater::update::cache::UpdateCache;
use git_plugin_updater::update::clock::Clock;
use git_plugin_updater::update::error::{FetchError, InstallError};
use git_plugin_updater::update::installer::Installer;
use git_plugin_updater::update::reference::{HostKind, RepositoryReference};
use git_plugin_updater::update::registry::UpdateRegistry;
use git_plugin_updater::update::source::{RepositorySource, SourceSet};
use git_plugin_updater::update::store::MemoryStore;
use git_plugin_updater::update::types::UpdateRecord;

/// Clock that only moves when told to
pub struct FakeClock(AtomicI64);

impl FakeClock {
    pub fn new(now_ms: i64) -> Arc<Self> {
        Arc::new(Self(AtomicI64::new(now_ms)))
    }

    pub fn advance(&self, by: Duration) {
        self.0.fetch_add(by.as_millis() as i64, Ordering::SeqCst);
    }
}

impl Clock for FakeClock {
    fn now_ms(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// GitHub source serving canned releases keyed by `owner/name`
pub struct FakeSource {
    releases: Mutex<HashMap<String, String>>,
    failing: Mutex<Vec<String>>,
    fetches: AtomicUsize,
}

impl FakeSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            releases: Mutex::new(HashMap::new()),
            failing: Mutex::new(Vec::new()),
            fetches: AtomicUsize::new(0),
        })
    }

    pub fn set_release(&self, full_name: &str, version: &str) {
        self.releases
            .lock()
            .unwrap()
            .insert(full_name.to_string(), version.to_string());
    }

    pub fn fail(&self, full_name: &str) {
        self.failing.lock().unwrap().push(full_name.to_string());
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RepositorySource for FakeSource {
    fn host_kind(&self) -> HostKind {
        HostKind::GitHub
    }

    async fn fetch_latest(
        &self,
        reference: &RepositoryReference,
    ) -> Result<UpdateRecord, FetchError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let full_name = reference.full_name();

        if self.failing.lock().unwrap().contains(&full_name) {
            return Err(FetchError::Timeout(full_name));
        }

        let version = self
            .releases
            .lock()
            .unwrap()
            .get(&full_name)
            .cloned()
            .ok_or_else(|| FetchError::NotFound(full_name.clone()))?;

        Ok(UpdateRecord::new(
            version.clone(),
            format!("https://github.com/{full_name}/archive/refs/tags/{version}.zip"),
            format!("https://github.com/{full_name}"),
        ))
    }
}

/// Installer that records calls instead of touching the host
#[derive(Default)]
pub struct FakeInstaller {
    pub active: Mutex<HashMap<String, bool>>,
    pub installs: Mutex<Vec<(String, String, PathBuf)>>,
    pub fail_install: bool,
    pub fail_activate: bool,
}

impl FakeInstaller {
    pub fn with_active(self, slug: &str, active: bool) -> Self {
        self.active.lock().unwrap().insert(slug.to_string(), active);
        self
    }

    pub fn is_marked_active(&self, slug: &str) -> bool {
        self.active
            .lock()
            .unwrap()
            .get(slug)
            .copied()
            .unwrap_or(false)
    }
}

#[async_trait]
impl Installer for FakeInstaller {
    async fn is_active(&self, plugin: &PluginDescriptor) -> Result<bool, InstallError> {
        Ok(self.is_marked_active(&plugin.identifier))
    }

    async fn install(
        &self,
        plugin: &PluginDescriptor,
        package_url: &str,
        destination: &Path,
    ) -> Result<(), InstallError> {
        if self.fail_install {
            return Err(InstallError::Failed {
                command: format!("install {package_url}"),
                code: Some(1),
                stderr: "Download failed.".to_string(),
            });
        }

        // Installing replaces the folder, which leaves the plugin inactive
        self.active
            .lock()
            .unwrap()
            .insert(plugin.identifier.clone(), false);
        self.installs.lock().unwrap().push((
            plugin.identifier.clone(),
            package_url.to_string(),
            destination.to_path_buf(),
        ));
        Ok(())
    }

    async fn set_active(
        &self,
        plugin: &PluginDescriptor,
        active: bool,
    ) -> Result<(), InstallError> {
        if self.fail_activate {
            return Err(InstallError::Failed {
                command: format!("activate {}", plugin.identifier),
                code: Some(1),
                stderr: "Plugin could not be activated.".to_string(),
            });
        }
        self.active
            .lock()
            .unwrap()
            .insert(plugin.identifier.clone(), active);
        Ok(())
    }
}

/// Write `<root>/<slug>/<slug>.php` with a plugin header block
pub fn write_plugin(root: &Path, slug: &str, version: &str, git_uri: Option<&str>) {
    let dir = root.join(slug);
    fs::create_dir_all(&dir).unwrap();

    let mut header = format!("<?php\n/*\n * Plugin Name: {slug}\n * Version: {version}\n");
    if let Some(uri) = git_uri {
        header.push_str(&format!(" * Git URI: {uri}\n"));
    }
    header.push_str(" */\n");

    fs::write(dir.join(format!("{slug}.php")), header).unwrap();
}

pub fn create_test_cache(source: Arc<FakeSource>, clock: Arc<FakeClock>) -> UpdateCache {
    let source: Arc<dyn RepositorySource> = source;
    UpdateCache::new(
        Arc::new(MemoryStore::new(clock.clone())),
        clock,
        SourceSet::new(vec![source]),
    )
}

/// Registry over a temporary plugins directory
pub fn create_test_registry(
    source: Arc<FakeSource>,
    installer: Arc<FakeInstaller>,
) -> (TempDir, UpdateRegistry) {
    let temp_dir = TempDir::new().unwrap();
    let cache = create_test_cache(source, FakeClock::new(1_000_000));
    let registry = UpdateRegistry::new(
        Arc::new(PluginDirectory::new(temp_dir.path())),
        cache,
        installer,
        temp_dir.path(),
        Duration::from_secs(3600),
    );
    (temp_dir, registry)
}
