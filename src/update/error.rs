use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Invalid repository URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Repository URL {0} does not name an owner and repository")]
    MissingRepository(String),
}

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("Request to {0} timed out")]
    Timeout(String),

    #[error("Network error: {0}")]
    Transport(#[from] reqwest::Error),
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Repository not found: {0}")]
    NotFound(String),

    #[error("Rate limited: retry after {retry_after_secs:?} seconds")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Refusing plain http request to {0}, add its host to insecureHosts to allow it")]
    InsecureTransport(String),

    #[error("Unexpected status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },
}

impl From<HttpError> for FetchError {
    fn from(err: HttpError) -> Self {
        match err {
            HttpError::Timeout(url) => FetchError::Timeout(url),
            HttpError::Transport(e) if e.is_timeout() => FetchError::Timeout(e.to_string()),
            HttpError::Transport(e) => FetchError::Network(e.to_string()),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Failed to acquire store lock")]
    LockPoisoned,
}

#[derive(Debug, Error)]
pub enum EnumerateError {
    #[error("Failed to read plugins directory {path:?}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum InstallError {
    #[error("No {0} command configured")]
    NotConfigured(&'static str),

    #[error("Install command does not use {{destination}}: {0}")]
    DestinationIgnored(String),

    #[error("Refusing plain http download of {0}, add its host to insecureHosts to allow it")]
    InsecureTransport(String),

    #[error("Failed to create download client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("Failed to download {url}: {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Download of {url} returned status {status}")]
    DownloadStatus { url: String, status: u16 },

    #[error("Invalid package archive {url}: {reason}")]
    Archive { url: String, reason: String },

    #[error("Failed to install into {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to run {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command timed out after {timeout_secs}s: {command}")]
    Timeout { command: String, timeout_secs: u64 },

    #[error("Command exited with {code:?}: {command}: {stderr}")]
    Failed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },
}

#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("No update available for {0}")]
    NotAvailable(String),

    #[error("Failed to install update for {identifier}: {source}")]
    InstallFailed {
        identifier: String,
        #[source]
        source: InstallError,
    },

    #[error("{identifier} was updated but could not be reactivated, please reactivate it manually: {source}")]
    ReactivationFailed {
        identifier: String,
        #[source]
        source: InstallError,
    },

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error(transparent)]
    Enumerate(#[from] EnumerateError),
}
