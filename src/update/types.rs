//! Common types for update checking

use serde::{Deserialize, Serialize};

/// Latest release metadata of a remote repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRecord {
    /// Version of the newest release (e.g., "1.3.0" or "v1.3.0")
    pub remote_version: String,
    /// Archive URL handed to the installer
    pub download_url: String,
    /// Project page shown to the user
    pub homepage: String,
    pub author: Option<String>,
    /// Minimum host version the release requires
    pub requires: Option<String>,
    /// Highest host version the release was tested with
    pub tested: Option<String>,
    /// Publication time as reported by the host
    pub last_updated: Option<String>,
    /// Release notes or plugin description
    pub description: Option<String>,
}

impl UpdateRecord {
    pub fn new(
        remote_version: impl Into<String>,
        download_url: impl Into<String>,
        homepage: impl Into<String>,
    ) -> Self {
        Self {
            remote_version: remote_version.into(),
            download_url: download_url.into(),
            homepage: homepage.into(),
            author: None,
            requires: None,
            tested: None,
            last_updated: None,
            description: None,
        }
    }
}

/// A plugin whose repository holds a newer release than the installed one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailableUpdate {
    pub plugin: crate::plugin::types::PluginDescriptor,
    pub record: UpdateRecord,
}

impl AvailableUpdate {
    /// Flatten into the decision output consumed by frontends
    pub fn offer(&self) -> UpdateOffer {
        UpdateOffer {
            identifier: self.plugin.identifier.clone(),
            installed_version: self.plugin.installed_version.clone(),
            new_version: self.record.remote_version.clone(),
            package: self.record.download_url.clone(),
            url: self.record.homepage.clone(),
            description: self.record.description.clone(),
        }
    }
}

/// Update-available decision for one plugin
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOffer {
    pub identifier: String,
    pub installed_version: String,
    pub new_version: String,
    pub package: String,
    pub url: String,
    pub description: Option<String>,
}
