//! Command-line frontend
//!
//! Wires the production collaborators (reqwest, SQLite store, plugin
//! directory, installer) into an [`UpdateRegistry`] and renders its
//! answers as text or JSON.

pub mod commands;
pub mod logging;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use crate::config::{self, CacheBackend, Config};
use crate::plugin::directory::PluginDirectory;
use crate::update::cache::UpdateCache;
use crate::update::clock::{Clock, SystemClock};
use crate::update::http::ReqwestClient;
use crate::update::installer::CommandInstaller;
use crate::update::registry::UpdateRegistry;
use crate::update::sources::{create_default_sources, request_policy};
use crate::update::store::{MemoryStore, SnapshotStore, SqliteStore};

#[derive(Parser, Debug)]
#[command(name = "git-plugin-updater")]
#[command(version, about = "Update checker for plugins hosted on GitHub, Bitbucket and Git servers")]
pub struct Cli {
    /// Path to a JSON config file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Plugins directory, overrides `pluginsDir` from the config
    #[arg(long, global = true)]
    pub plugins_dir: Option<PathBuf>,

    /// Also log to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print machine-readable JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List plugins with a newer release available
    Check,
    /// Show the latest release of one plugin
    Info { slug: String },
    /// Install the latest release of one plugin
    Update { slug: String },
    /// Drop the cached release data
    ClearCache,
}

/// Build a registry from `config` using the production collaborators
pub fn build_registry(config: &Config, plugins_dir: PathBuf) -> anyhow::Result<UpdateRegistry> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let store: Arc<dyn SnapshotStore> = match config.cache.backend {
        CacheBackend::Sqlite => {
            let db_path = config::db_path();
            if let Some(parent) = db_path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create data directory {:?}", parent))?;
            }
            Arc::new(
                SqliteStore::new(&db_path, clock.clone())
                    .with_context(|| format!("Failed to open cache database {:?}", db_path))?,
            )
        }
        CacheBackend::Memory => Arc::new(MemoryStore::new(clock.clone())),
    };

    let http = Arc::new(ReqwestClient::new().context("Failed to create HTTP client")?);
    let sources = create_default_sources(config, http);
    let cache = UpdateCache::new(store, clock, sources)
        .with_max_concurrent_fetches(config.http.max_concurrent_fetches);

    let plugins = Arc::new(PluginDirectory::new(plugins_dir.clone()));
    let installer = Arc::new(
        CommandInstaller::new(config.installer.clone(), request_policy(config))
            .context("Failed to create installer")?,
    );

    Ok(
        UpdateRegistry::new(plugins, cache, installer, plugins_dir, config.cache.ttl())
            .with_debug(config.debug),
    )
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load(cli.config.as_deref())?;
    let _guard = logging::init(&config::log_path(), config.log_format, cli.verbose)?;

    let plugins_dir = cli
        .plugins_dir
        .clone()
        .or_else(|| config.plugins_dir.clone())
        .context("No plugins directory given, pass --plugins-dir or set pluginsDir in the config")?;

    info!("Starting {:?} for {:?}", cli.command, plugins_dir);

    let registry = build_registry(&config, plugins_dir)?;
    registry.clear_cache_if_debugging()?;

    let mut out = std::io::stdout().lock();
    match cli.command {
        Command::Check => commands::check(&registry, cli.json, &mut out).await,
        Command::Info { slug } => commands::info(&registry, &slug, cli.json, &mut out).await,
        Command::Update { slug } => commands::update(&registry, &slug, cli.json, &mut out).await,
        Command::ClearCache => commands::clear_cache(&registry, cli.json, &mut out),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "git-plugin-updater",
            "info",
            "hello",
            "--json",
            "--plugins-dir",
            "/srv/plugins",
        ])
        .unwrap();

        assert!(cli.json);
        assert_eq!(cli.plugins_dir, Some(PathBuf::from("/srv/plugins")));
        assert!(matches!(cli.command, Command::Info { slug } if slug == "hello"));
    }

    #[test]
    fn requires_a_subcommand() {
        assert!(Cli::try_parse_from(["git-plugin-updater"]).is_err());
    }
}
