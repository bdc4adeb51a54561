//! Update checking layer for Git-hosted plugins
//!
//! This module provides the core functionality for fetching, caching, and comparing
//! plugin release metadata across Git hosts (GitHub, Bitbucket, plain Git over HTTP).
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   Source    │────▶│    Cache    │◀────│  Registry   │
//! │  (fetch)    │     │ (snapshot)  │     │  (decide)   │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!        │                   │                   │
//!        ▼                   ▼                   ▼
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   Sources   │     │    Store    │     │   Semver    │
//! │(github, ...)│     │(sqlite, mem)│     │(version cmp)│
//! └─────────────┘     └─────────────┘     └─────────────┘
//! ```
//!
//! # Modules
//!
//! - [`cache`]: TTL-bounded snapshot of update records with refresh logic
//! - [`clock`]: Clock capability used for cache freshness
//! - [`error`]: Error types for every layer of the update pipeline
//! - [`http`]: HTTP capability with per-request timeout and TLS policy
//! - [`installer`]: Installer collaborator used to apply updates
//! - [`reference`]: Parsing of declared repository URLs
//! - [`registry`]: Orchestration and update queries
//! - [`semver`]: Version comparison
//! - [`source`]: Repository source trait and priority-ordered selection
//! - [`sources`]: Concrete sources (GitHub, Bitbucket, generic Git)
//! - [`store`]: Key-value snapshot storage (SQLite, in-memory)
//! - [`types`]: Common types like `UpdateRecord`

pub mod cache;
pub mod clock;
pub mod error;
pub mod http;
pub mod installer;
pub mod reference;
pub mod registry;
pub mod semver;
pub mod source;
pub mod sources;
pub mod store;
pub mod types;
