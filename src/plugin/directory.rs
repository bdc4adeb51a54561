//! Enumeration of installed plugins from a plugins directory

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

#[cfg(test)]
use mockall::automock;
use tracing::{debug, warn};

use crate::plugin::headers::{HEADER_READ_LIMIT, PluginHeaders, parse_headers};
use crate::plugin::types::PluginDescriptor;
use crate::update::error::EnumerateError;

/// Supplies the list of installed plugins for a check cycle
#[cfg_attr(test, automock)]
pub trait PluginSource: Send + Sync {
    /// Returns every installed plugin, in a stable order
    fn installed_plugins(&self) -> Result<Vec<PluginDescriptor>, EnumerateError>;
}

/// Reads plugins laid out as `<root>/<folder>/<main>.php`
///
/// A folder is a plugin when one of its top-level `.php` files carries a
/// `Plugin Name` header. Folders are visited in sorted order.
pub struct PluginDirectory {
    root: PathBuf,
}

impl PluginDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn read_plugin(&self, folder: &Path) -> Option<PluginDescriptor> {
        let identifier = folder.file_name()?.to_str()?.to_string();

        let mut candidates: Vec<PathBuf> = fs::read_dir(folder)
            .inspect_err(|e| warn!("Failed to read plugin folder {:?}: {}", folder, e))
            .ok()?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "php"))
            .collect();
        candidates.sort();

        candidates.into_iter().find_map(|path| {
            let headers = read_headers(&path)?;
            let name = headers.name.clone()?;
            let file_name = path.file_name()?.to_str()?;
            Some(descriptor_from_headers(
                &identifier,
                format!("{identifier}/{file_name}"),
                name,
                headers,
            ))
        })
    }
}

impl PluginSource for PluginDirectory {
    fn installed_plugins(&self) -> Result<Vec<PluginDescriptor>, EnumerateError> {
        let entries = fs::read_dir(&self.root).map_err(|source| EnumerateError::ReadDir {
            path: self.root.clone(),
            source,
        })?;

        let mut folders: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_dir())
            .collect();
        folders.sort();

        let plugins: Vec<PluginDescriptor> = folders
            .iter()
            .filter_map(|folder| self.read_plugin(folder))
            .collect();

        debug!("Found {} plugins in {:?}", plugins.len(), self.root);
        Ok(plugins)
    }
}

fn read_headers(path: &Path) -> Option<PluginHeaders> {
    let file = fs::File::open(path)
        .inspect_err(|e| warn!("Failed to open {:?}: {}", path, e))
        .ok()?;

    let mut buf = Vec::with_capacity(HEADER_READ_LIMIT);
    file.take(HEADER_READ_LIMIT as u64)
        .read_to_end(&mut buf)
        .inspect_err(|e| warn!("Failed to read {:?}: {}", path, e))
        .ok()?;

    Some(parse_headers(&String::from_utf8_lossy(&buf)))
}

fn descriptor_from_headers(
    identifier: &str,
    main_file: String,
    name: String,
    headers: PluginHeaders,
) -> PluginDescriptor {
    PluginDescriptor {
        identifier: identifier.to_string(),
        name,
        main_file,
        installed_version: headers.version.unwrap_or_default(),
        repository_url: headers.git_uri,
        branch: headers.git_branch,
    }
}
