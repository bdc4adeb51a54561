//! Installed plugin enumeration
//!
//! # Modules
//!
//! - [`directory`]: `PluginSource` trait and the plugins-directory scanner
//! - [`headers`]: Parser for plugin header blocks (`Plugin Name`, `Git URI`, ...)
//! - [`types`]: `PluginDescriptor`

pub mod directory;
pub mod headers;
pub mod types;
