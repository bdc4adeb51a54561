//! HTTP capability used by repository sources
//!
//! Sources never talk to reqwest directly. They build an [`HttpRequest`]
//! through a [`RequestPolicy`], which stamps the short timeout, refuses plain
//! http unless the host is allowed and decides whether TLS certificates are
//! verified, and hand it to an [`HttpClient`].

use std::collections::HashMap;
use std::time::Duration;

#[cfg(test)]
use mockall::automock;
use reqwest::Url;
use tracing::{debug, warn};

use crate::config::DEFAULT_HTTP_TIMEOUT_SECS;
use crate::update::error::{FetchError, HttpError};
use crate::update::reference::Credentials;

const USER_AGENT: &str = concat!("git-plugin-updater/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Auth {
    Basic(Credentials),
    Bearer(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    pub timeout: Duration,
    pub verify_tls: bool,
    pub headers: Vec<(String, String)>,
    pub auth: Option<Auth>,
}

impl HttpRequest {
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn auth(mut self, auth: Option<Auth>) -> Self {
        self.auth = auth;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    /// Header names are lower-cased
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl HttpResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Trait for issuing GET requests
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait HttpClient: Send + Sync {
    async fn get(&self, request: HttpRequest) -> Result<HttpResponse, HttpError>;
}

/// Timeout and TLS settings applied to every outbound request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestPolicy {
    timeout: Duration,
    /// Hosts for which certificate verification is skipped
    tls_exempt_hosts: Vec<String>,
    /// Hosts that may be reached over plain http
    insecure_hosts: Vec<String>,
}

fn normalize_hosts(hosts: Vec<String>) -> Vec<String> {
    hosts
        .into_iter()
        .map(|h| h.trim().to_ascii_lowercase())
        .filter(|h| !h.is_empty())
        .collect()
}

fn host_of(url: &Url) -> Option<String> {
    url.host_str().map(str::to_ascii_lowercase)
}

impl RequestPolicy {
    pub fn new(timeout: Duration, tls_exempt_hosts: Vec<String>) -> Self {
        Self {
            timeout,
            tls_exempt_hosts: normalize_hosts(tls_exempt_hosts),
            insecure_hosts: Vec::new(),
        }
    }

    pub fn with_insecure_hosts(mut self, hosts: Vec<String>) -> Self {
        self.insecure_hosts = normalize_hosts(hosts);
        self
    }

    /// Returns false only for hosts explicitly listed as exempt
    pub fn verify_tls(&self, url: &str) -> bool {
        let Some(host) = Url::parse(url).ok().as_ref().and_then(host_of) else {
            return true;
        };

        !self.tls_exempt_hosts.iter().any(|exempt| *exempt == host)
    }

    /// Returns true for https, and for http to a host listed as insecure
    pub fn allows(&self, url: &str) -> bool {
        let Ok(parsed) = Url::parse(url) else {
            return false;
        };
        match parsed.scheme() {
            "https" => true,
            "http" => host_of(&parsed).is_some_and(|host| self.insecure_hosts.contains(&host)),
            _ => false,
        }
    }

    pub fn request(&self, url: &str) -> Result<HttpRequest, FetchError> {
        if !self.allows(url) {
            warn!("Refusing request to {}", url);
            return Err(FetchError::InsecureTransport(url.to_string()));
        }

        Ok(HttpRequest {
            url: url.to_string(),
            timeout: self.timeout,
            verify_tls: self.verify_tls(url),
            headers: Vec::new(),
            auth: None,
        })
    }
}

impl Default for RequestPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS), Vec::new())
    }
}

/// reqwest-backed [`HttpClient`]
///
/// Keeps a second client with certificate verification disabled, used only
/// for requests the [`RequestPolicy`] marked as exempt.
pub struct ReqwestClient {
    verified: reqwest::Client,
    unverified: reqwest::Client,
}

impl ReqwestClient {
    pub fn new() -> Result<Self, HttpError> {
        Ok(Self {
            verified: reqwest::Client::builder().user_agent(USER_AGENT).build()?,
            unverified: reqwest::Client::builder()
                .user_agent(USER_AGENT)
                .danger_accept_invalid_certs(true)
                .build()?,
        })
    }
}

#[async_trait::async_trait]
impl HttpClient for ReqwestClient {
    async fn get(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        let client = if request.verify_tls {
            &self.verified
        } else {
            warn!("TLS verification disabled for {}", request.url);
            &self.unverified
        };

        debug!("GET {}", request.url);

        let mut builder = client.get(&request.url).timeout(request.timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        builder = match &request.auth {
            Some(Auth::Basic(credentials)) => {
                builder.basic_auth(&credentials.username, credentials.password.as_ref())
            }
            Some(Auth::Bearer(token)) => builder.bearer_auth(token),
            None => builder,
        };

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                HttpError::Timeout(request.url.clone())
            } else {
                HttpError::Transport(e)
            }
        })?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();

        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                HttpError::Timeout(request.url.clone())
            } else {
                HttpError::Transport(e)
            }
        })?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}
