// API transport module: a small blocking HTTP client that talks to the
// platform's REST API. Every request carries the bearer token and the
// client's User-Agent; responses are decoded as JSON.

use std::fmt;
use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, USER_AGENT};
use reqwest::{Proxy, StatusCode};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::ConfigError;

/// Identifier sent as `User-Agent` on every request.
pub const CLIENT_ID: &str = concat!("htb-cli/", env!("CARGO_PKG_VERSION"));

/// Default API root; version segments are appended per request.
pub const DEFAULT_API_ROOT: &str = "https://labs.hackthebox.com/api";

/// The two API generations the platform serves side by side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiVersion {
    V4,
    V5,
}

impl ApiVersion {
    pub fn segment(self) -> &'static str {
        match self {
            ApiVersion::V4 => "v4",
            ApiVersion::V5 => "v5",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Method::Get => "GET",
            Method::Post => "POST",
        })
    }
}

/// Immutable per-run credentials and addressing. Built once at startup
/// and handed by reference to whatever needs it.
#[derive(Clone)]
pub struct Session {
    token: String,
    api_root: String,
}

impl Session {
    pub fn new(token: impl Into<String>, api_root: impl Into<String>) -> Self {
        let api_root: String = api_root.into();
        Session {
            token: token.into(),
            api_root: api_root.trim_end_matches('/').to_string(),
        }
    }

    pub fn api_root(&self) -> &str {
        &self.api_root
    }

    /// Full URL for `path` under the given API version.
    pub fn url(&self, version: ApiVersion, path: &str) -> String {
        format!(
            "{}/{}/{}",
            self.api_root,
            version.segment(),
            path.trim_start_matches('/')
        )
    }

    fn headers(&self) -> Result<HeaderMap, ConfigError> {
        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.token))
            .map_err(|_| ConfigError::MalformedToken)?;
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_ID));
        Ok(headers)
    }
}

// The token must never end up in logs.
impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("api_root", &self.api_root)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Why a single request failed.
#[derive(Debug, Error)]
pub enum TransportCause {
    #[error("request failed: {0}")]
    Network(#[source] reqwest::Error),
    #[error("server answered {status}")]
    Status {
        status: u16,
        /// Decoded body, when the server sent JSON along with the error.
        body: Option<Value>,
    },
    #[error("response was not valid JSON: {0}")]
    Decode(String),
}

/// A failed call, carrying the endpoint it was aimed at.
#[derive(Debug, Error)]
#[error("{method} /{path} failed: {cause}")]
pub struct TransportError {
    pub method: Method,
    pub path: String,
    #[source]
    pub cause: TransportCause,
}

impl TransportError {
    pub fn new(method: Method, path: impl Into<String>, cause: TransportCause) -> Self {
        TransportError {
            method,
            path: path.into(),
            cause,
        }
    }

    /// JSON body returned alongside a non-2xx status, if any.
    pub fn body(&self) -> Option<&Value> {
        match &self.cause {
            TransportCause::Status { body, .. } => body.as_ref(),
            _ => None,
        }
    }
}

/// The seam between the endpoint catalog and the network. One call per
/// method invocation, never retried.
pub trait Transport {
    fn get(&self, version: ApiVersion, path: &str) -> Result<Value, TransportError>;
    fn post(&self, version: ApiVersion, path: &str, body: &Value) -> Result<Value, TransportError>;
}

/// Knobs for the underlying HTTP client. TLS verification and proxying
/// are deployment choices, not core behavior.
#[derive(Debug, Clone)]
pub struct HttpOptions {
    pub insecure: bool,
    pub proxy: Option<String>,
    pub timeout: Duration,
}

impl Default for HttpOptions {
    fn default() -> Self {
        HttpOptions {
            insecure: false,
            proxy: None,
            timeout: Duration::from_secs(30),
        }
    }
}

/// `Transport` backed by a reqwest blocking client.
pub struct HttpTransport {
    client: Client,
    session: Session,
}

impl HttpTransport {
    pub fn new(session: Session, options: &HttpOptions) -> Result<Self, ConfigError> {
        let mut builder = Client::builder()
            .default_headers(session.headers()?)
            .timeout(options.timeout)
            .danger_accept_invalid_certs(options.insecure);
        if let Some(proxy) = &options.proxy {
            let proxy = Proxy::all(proxy).map_err(|source| ConfigError::Proxy {
                url: proxy.clone(),
                source,
            })?;
            builder = builder.proxy(proxy);
        }
        let client = builder.build().map_err(ConfigError::Client)?;
        Ok(HttpTransport { client, session })
    }

    fn finish(method: Method, path: &str, res: Response) -> Result<Value, TransportError> {
        let status = res.status();
        let text = res
            .text()
            .map_err(|e| TransportError::new(method, path, TransportCause::Network(e)))?;
        if !status.is_success() {
            warn!(%method, path, status = status.as_u16(), "request rejected");
            return Err(TransportError::new(
                method,
                path,
                TransportCause::Status {
                    status: status.as_u16(),
                    body: serde_json::from_str(&text).ok(),
                },
            ));
        }
        decode_body(method, path, status, &text)
    }
}

fn decode_body(
    method: Method,
    path: &str,
    status: StatusCode,
    text: &str,
) -> Result<Value, TransportError> {
    if text.trim().is_empty() && status == StatusCode::NO_CONTENT {
        return Ok(Value::Null);
    }
    serde_json::from_str(text)
        .map_err(|e| TransportError::new(method, path, TransportCause::Decode(e.to_string())))
}

impl Transport for HttpTransport {
    fn get(&self, version: ApiVersion, path: &str) -> Result<Value, TransportError> {
        debug!(method = "GET", api = version.segment(), path, "sending request");
        let res = self
            .client
            .get(self.session.url(version, path))
            .send()
            .map_err(|e| TransportError::new(Method::Get, path, TransportCause::Network(e)))?;
        Self::finish(Method::Get, path, res)
    }

    fn post(&self, version: ApiVersion, path: &str, body: &Value) -> Result<Value, TransportError> {
        debug!(method = "POST", api = version.segment(), path, "sending request");
        let res = self
            .client
            .post(self.session.url(version, path))
            .json(body)
            .send()
            .map_err(|e| TransportError::new(Method::Post, path, TransportCause::Network(e)))?;
        Self::finish(Method::Post, path, res)
    }
}
