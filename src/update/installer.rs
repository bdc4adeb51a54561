//! Installer collaborator used to apply updates
//!
//! [`CommandInstaller`] installs a package in one of two ways. By default it
//! downloads the release archive, unpacks it next to the destination and
//! swaps it into place, so `<plugins>/<slug>` always ends up holding the new
//! release whatever the archive's top-level folder is called. With an
//! `installCommand` template it runs that command instead. Activation always
//! goes through command templates (wp-cli by default).

use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[cfg(test)]
use mockall::automock;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use zip::ZipArchive;

use crate::config::InstallerConfig;
use crate::plugin::types::PluginDescriptor;
use crate::update::error::InstallError;
use crate::update::http::RequestPolicy;

const USER_AGENT: &str = concat!("git-plugin-updater/", env!("CARGO_PKG_VERSION"));
const DESTINATION_PLACEHOLDER: &str = "{destination}";

/// Performs download, extraction and activation on the host
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait Installer: Send + Sync {
    /// Returns whether the plugin is currently enabled
    async fn is_active(&self, plugin: &PluginDescriptor) -> Result<bool, InstallError>;

    /// Download `package_url` and install it at `destination`
    async fn install(
        &self,
        plugin: &PluginDescriptor,
        package_url: &str,
        destination: &Path,
    ) -> Result<(), InstallError>;

    /// Enable or disable the plugin
    async fn set_active(&self, plugin: &PluginDescriptor, active: bool)
    -> Result<(), InstallError>;
}

/// Installer driven by the built-in archive unpacker and command templates
pub struct CommandInstaller {
    config: InstallerConfig,
    policy: RequestPolicy,
    verified: reqwest::Client,
    unverified: reqwest::Client,
}

struct CommandOutput {
    success: bool,
    code: Option<i32>,
    stderr: String,
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> InstallError + '_ {
    move |source| InstallError::Io {
        path: path.to_path_buf(),
        source,
    }
}

impl CommandInstaller {
    /// `policy` decides which package URLs may be downloaded and whether
    /// their certificates are verified
    pub fn new(config: InstallerConfig, policy: RequestPolicy) -> Result<Self, InstallError> {
        Ok(Self {
            config,
            policy,
            verified: reqwest::Client::builder()
                .user_agent(USER_AGENT)
                .build()
                .map_err(InstallError::Client)?,
            unverified: reqwest::Client::builder()
                .user_agent(USER_AGENT)
                .danger_accept_invalid_certs(true)
                .build()
                .map_err(InstallError::Client)?,
        })
    }

    /// Split a template into words and substitute placeholders per word
    fn expand(
        template: &str,
        plugin: &PluginDescriptor,
        package_url: &str,
        destination: &Path,
    ) -> Vec<String> {
        let destination = destination.to_string_lossy();
        template
            .split_whitespace()
            .map(|word| {
                word.replace("{package}", package_url)
                    .replace(DESTINATION_PLACEHOLDER, &destination)
                    .replace("{slug}", &plugin.identifier)
            })
            .collect()
    }

    async fn run(&self, argv: Vec<String>) -> Result<CommandOutput, InstallError> {
        let command_line = argv.join(" ");
        let Some((program, args)) = argv.split_first() else {
            return Err(InstallError::NotConfigured("empty"));
        };

        debug!("Executing: {}", command_line);

        let output = timeout(
            Duration::from_secs(self.config.timeout),
            Command::new(program).args(args).kill_on_drop(true).output(),
        )
        .await
        .map_err(|_| InstallError::Timeout {
            command: command_line.clone(),
            timeout_secs: self.config.timeout,
        })?
        .map_err(|source| InstallError::Spawn {
            command: command_line.clone(),
            source,
        })?;

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if !stderr.is_empty() {
            warn!("stderr from {}: {}", command_line, stderr);
        }

        Ok(CommandOutput {
            success: output.status.success(),
            code: output.status.code(),
            stderr,
        })
    }

    async fn run_checked(&self, argv: Vec<String>) -> Result<(), InstallError> {
        let command = argv.join(" ");
        let output = self.run(argv).await?;
        if output.success {
            Ok(())
        } else {
            Err(InstallError::Failed {
                command,
                code: output.code,
                stderr: output.stderr,
            })
        }
    }

    async fn download(&self, package_url: &str) -> Result<Vec<u8>, InstallError> {
        if !self.policy.allows(package_url) {
            return Err(InstallError::InsecureTransport(package_url.to_string()));
        }
        let client = if self.policy.verify_tls(package_url) {
            &self.verified
        } else {
            warn!("TLS verification disabled for {}", package_url);
            &self.unverified
        };

        let download_error = |source| InstallError::Download {
            url: package_url.to_string(),
            source,
        };

        debug!("Downloading {}", package_url);
        let response = client
            .get(package_url)
            .timeout(Duration::from_secs(self.config.timeout))
            .send()
            .await
            .map_err(download_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(InstallError::DownloadStatus {
                url: package_url.to_string(),
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes().await.map_err(download_error)?;
        Ok(bytes.to_vec())
    }

    async fn unpack(&self, package_url: &str, destination: &Path) -> Result<(), InstallError> {
        let archive = self.download(package_url).await?;
        let url = package_url.to_string();
        let target = destination.to_path_buf();

        tokio::task::spawn_blocking(move || replace_with_archive(&archive, &url, &target))
            .await
            .map_err(|e| InstallError::Io {
                path: destination.to_path_buf(),
                source: std::io::Error::other(e),
            })?
    }
}

/// Unpack a zip archive and swap it into `destination`
///
/// The archive is extracted into a staging directory beside `destination`.
/// A single top-level folder (`owner-repo-<sha>/` in GitHub zipballs) is
/// unwrapped. The previous contents are restored if the final rename fails.
fn replace_with_archive(archive: &[u8], url: &str, destination: &Path) -> Result<(), InstallError> {
    let parent = destination.parent().ok_or_else(|| InstallError::Io {
        path: destination.to_path_buf(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "destination has no parent"),
    })?;
    fs::create_dir_all(parent).map_err(io_error(parent))?;

    let staging = tempfile::Builder::new()
        .prefix(".git-plugin-updater-")
        .tempdir_in(parent)
        .map_err(io_error(parent))?;
    let unpacked = staging.path().join("unpacked");

    let archive_error = |e: zip::result::ZipError| InstallError::Archive {
        url: url.to_string(),
        reason: e.to_string(),
    };
    ZipArchive::new(Cursor::new(archive))
        .map_err(archive_error)?
        .extract(&unpacked)
        .map_err(archive_error)?;

    let root = package_root(&unpacked).map_err(io_error(&unpacked))?;
    let Some(root) = root else {
        return Err(InstallError::Archive {
            url: url.to_string(),
            reason: "archive is empty".to_string(),
        });
    };

    let previous = staging.path().join("previous");
    let had_previous = destination.exists();
    if had_previous {
        fs::rename(destination, &previous).map_err(io_error(destination))?;
    }

    if let Err(source) = fs::rename(&root, destination) {
        if had_previous {
            if let Err(e) = fs::rename(&previous, destination) {
                warn!("Failed to restore {:?}: {}", destination, e);
            }
        }
        return Err(InstallError::Io {
            path: destination.to_path_buf(),
            source,
        });
    }

    info!("Unpacked {} into {:?}", url, destination);
    Ok(())
}

/// The directory holding the plugin files, or `None` for an empty archive
fn package_root(unpacked: &Path) -> std::io::Result<Option<PathBuf>> {
    if !unpacked.exists() {
        return Ok(None);
    }

    let entries: Vec<PathBuf> = fs::read_dir(unpacked)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<_, _>>()?;

    Ok(match entries.as_slice() {
        [] => None,
        [only] if only.is_dir() => Some(only.clone()),
        _ => Some(unpacked.to_path_buf()),
    })
}

#[async_trait::async_trait]
impl Installer for CommandInstaller {
    async fn is_active(&self, plugin: &PluginDescriptor) -> Result<bool, InstallError> {
        // Without a way to ask, assume active so the plugin is re-enabled
        let Some(template) = &self.config.status_command else {
            return Ok(true);
        };

        let argv = Self::expand(template, plugin, "", Path::new(""));
        Ok(self.run(argv).await?.success)
    }

    async fn install(
        &self,
        plugin: &PluginDescriptor,
        package_url: &str,
        destination: &Path,
    ) -> Result<(), InstallError> {
        info!("Installing {} from {}", plugin.identifier, package_url);

        let Some(template) = self.config.install_command.as_deref() else {
            return self.unpack(package_url, destination).await;
        };

        if !template.contains(DESTINATION_PLACEHOLDER) {
            return Err(InstallError::DestinationIgnored(template.to_string()));
        }
        self.run_checked(Self::expand(template, plugin, package_url, destination))
            .await
    }

    async fn set_active(
        &self,
        plugin: &PluginDescriptor,
        active: bool,
    ) -> Result<(), InstallError> {
        let (template, name) = if active {
            (&self.config.activate_command, "activate")
        } else {
            (&self.config.deactivate_command, "deactivate")
        };
        let template = template
            .as_deref()
            .ok_or(InstallError::NotConfigured(name))?;

        self.run_checked(Self::expand(template, plugin, "", Path::new("")))
            .await
    }
}
