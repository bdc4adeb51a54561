//! Common types for installed plugins

/// An installed plugin as read from the host at the start of a check cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginDescriptor {
    /// Stable slug, the plugin's folder name (e.g., "my-plugin")
    pub identifier: String,
    /// Display name from the `Plugin Name` header
    pub name: String,
    /// Main file relative to the plugins root (e.g., "my-plugin/my-plugin.php")
    pub main_file: String,
    /// Installed version from the `Version` header
    pub installed_version: String,
    /// Repository URL from the `Git URI` header
    pub repository_url: Option<String>,
    /// Branch from the `Git Branch` header
    pub branch: Option<String>,
}

impl PluginDescriptor {
    pub fn new(
        identifier: impl Into<String>,
        installed_version: impl Into<String>,
        repository_url: Option<&str>,
    ) -> Self {
        let identifier = identifier.into();
        Self {
            name: identifier.clone(),
            main_file: format!("{identifier}/{identifier}.php"),
            identifier,
            installed_version: installed_version.into(),
            repository_url: repository_url.map(str::to_string),
            branch: None,
        }
    }

    pub fn with_branch(mut self, branch: &str) -> Self {
        self.branch = Some(branch.to_string());
        self
    }

    /// File name of the main plugin file without its folder
    pub fn main_file_name(&self) -> &str {
        self.main_file
            .rsplit_once('/')
            .map_or(self.main_file.as_str(), |(_, file)| file)
    }
}
