//! Request core: path normalization, authentication, dispatch and response
//! classification for every call the client makes.
//!
//! # Design
//! `TpmClient` holds the immutable `ClientConfig` and a `Transport`, and no
//! per-call state. Each call is split the same way:
//!
//! - `build_request` produces an `HttpRequest` (pure, given a timestamp);
//! - the transport executes it;
//! - `parse_response` turns the `HttpResponse` into `Option<Value>` or a
//!   `TpmError`.
//!
//! Per-call extras such as the unlock reason travel in `RequestOptions`
//! instead of living on the client, so one call can never leak a header into
//! the next.

use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, error, info, warn};
use serde_json::Value;

use crate::auth::{Authenticator, UNLOCK_REASON_HEADER};
use crate::config::ClientConfig;
use crate::error::{Result, TpmError};
use crate::http::{HttpMethod, HttpRequest, HttpResponse, Transport, UreqTransport};
use crate::pagination::{next_link, CollectionIter, Page, PageLink};

pub const CONTENT_TYPE: &str = "application/json; charset=utf-8";
pub const USER_AGENT: &str = concat!("tpm-rs/", env!("CARGO_PKG_VERSION"));

/// Options that apply to a single call only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOptions {
    /// Sent as `X-Unlock-Reason` with this call only.
    pub unlock_reason: Option<String>,
}

impl RequestOptions {
    pub fn with_unlock_reason(reason: impl Into<String>) -> Self {
        Self {
            unlock_reason: Some(reason.into()),
        }
    }
}

/// Decoded body of one exchange plus its pagination continuation.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub body: Option<Value>,
    pub next: Option<PageLink>,
}

/// Synchronous client for the Team Password Manager API.
#[derive(Debug, Clone)]
pub struct TpmClient<T = UreqTransport> {
    config: ClientConfig,
    transport: T,
}

impl TpmClient<UreqTransport> {
    /// Client using the blocking `ureq` transport configured from `config`.
    pub fn new(config: ClientConfig) -> Self {
        let transport = UreqTransport::new(&config);
        Self { config, transport }
    }
}

impl<T> TpmClient<T> {
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Resource path relative to the base URL, always under `api/{version}/`.
    ///
    /// Accepts a bare resource path (`projects.json`), a path that already
    /// carries the API prefix, or an absolute URL below the base URL as
    /// found in pagination links.
    pub fn normalize_path(&self, path: &str) -> String {
        let path = path
            .strip_prefix(self.config.base_url())
            .unwrap_or(path)
            .trim_start_matches('/');
        let prefix = self.config.version().path_prefix();
        if path.starts_with(&prefix) {
            path.to_string()
        } else {
            format!("{prefix}{path}")
        }
    }

    /// Absolute URL a path resolves to.
    pub fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url(), self.normalize_path(path))
    }

    /// Build the signed or basic-authenticated request for one call.
    pub fn build_request(
        &self,
        path: &str,
        method: HttpMethod,
        body: Option<&Value>,
        options: &RequestOptions,
        timestamp: u64,
    ) -> Result<HttpRequest> {
        let path = self.normalize_path(path);
        debug!("Using path {path}");

        let body = match body {
            Some(value) if !is_empty_payload(value) => Some(
                serde_json::to_string(value)
                    .map_err(|e| TpmError::Serialization(e.to_string()))?,
            ),
            _ => None,
        };

        let mut headers = vec![
            ("Content-Type".to_string(), CONTENT_TYPE.to_string()),
            ("User-Agent".to_string(), USER_AGENT.to_string()),
        ];
        let auth = Authenticator::new(self.config.credentials()).authenticate(
            &path,
            timestamp,
            body.as_deref().unwrap_or(""),
        );
        headers.extend(auth.headers());

        if let Some(reason) = options.unlock_reason.as_deref() {
            info!("Unlock Reason: {reason}");
            headers.push((UNLOCK_REASON_HEADER.to_string(), reason.to_string()));
        }

        Ok(HttpRequest {
            method,
            url: format!("{}{}", self.config.base_url(), path),
            headers,
            body,
        })
    }

    /// Classify a response into a decoded body or a typed error.
    pub fn parse_response(&self, url: &str, response: &HttpResponse) -> Result<Option<Value>> {
        if response.body.is_empty() {
            debug!("No result returned.");
            return Ok(None);
        }
        match serde_json::from_str::<Value>(&response.body) {
            Ok(value) => match error_message(&value) {
                Some(message) => Err(TpmError::Protocol(message)),
                None => Ok(Some(value)),
            },
            Err(e) => match response.status {
                403 => {
                    warn!("{url} forbidden");
                    Err(TpmError::Forbidden {
                        url: url.to_string(),
                    })
                }
                404 => {
                    warn!("{url} not found");
                    Err(TpmError::NotFound {
                        url: url.to_string(),
                    })
                }
                _ => Err(TpmError::MalformedResponse {
                    diagnostic: e.to_string(),
                    url: url.to_string(),
                    body: response.body.clone(),
                }),
            },
        }
    }
}

impl<T: Transport> TpmClient<T> {
    /// Client using a caller-supplied transport.
    pub fn with_transport(config: ClientConfig, transport: T) -> Self {
        Self { config, transport }
    }

    /// Perform one call and return the decoded body (`None` for no content).
    pub fn request(
        &self,
        path: &str,
        method: HttpMethod,
        body: Option<&Value>,
        options: &RequestOptions,
    ) -> Result<Option<Value>> {
        self.dispatch(path, method, body, options)
            .map(|response| response.body)
    }

    pub fn get(&self, path: &str) -> Result<Option<Value>> {
        self.get_with(path, &RequestOptions::default())
    }

    pub fn get_with(&self, path: &str, options: &RequestOptions) -> Result<Option<Value>> {
        self.request(path, HttpMethod::Get, None, options)
    }

    pub fn post(&self, path: &str, body: Option<&Value>) -> Result<Option<Value>> {
        self.request(path, HttpMethod::Post, body, &RequestOptions::default())
    }

    pub fn put(&self, path: &str, body: Option<&Value>) -> Result<Option<Value>> {
        self.put_with(path, body, &RequestOptions::default())
    }

    pub fn put_with(
        &self,
        path: &str,
        body: Option<&Value>,
        options: &RequestOptions,
    ) -> Result<Option<Value>> {
        self.request(path, HttpMethod::Put, body, options)
    }

    pub fn delete(&self, path: &str) -> Result<Option<Value>> {
        self.request(path, HttpMethod::Delete, None, &RequestOptions::default())
    }

    /// Lazily iterate every item of a paginated collection.
    pub fn iter_collection(&self, path: &str) -> CollectionIter<'_, T> {
        CollectionIter::new(self, path)
    }

    /// Fetch every page of a collection. Fails as a whole if any page fails.
    pub fn collection(&self, path: &str) -> Result<Vec<Value>> {
        self.iter_collection(path).collect()
    }

    pub(crate) fn fetch_page(&self, path: &str) -> Result<Page> {
        let response = self.dispatch(path, HttpMethod::Get, None, &RequestOptions::default())?;
        let items = match response.body {
            None => Vec::new(),
            Some(Value::Array(items)) => items,
            Some(other) => {
                return Err(TpmError::MalformedResponse {
                    diagnostic: "expected a JSON array".to_string(),
                    url: self.url_for(path),
                    body: other.to_string(),
                })
            }
        };
        Ok(Page {
            items,
            next: response.next,
        })
    }

    /// Send with the configured retry policy. Only retryable errors are
    /// re-sent, each attempt with a fresh timestamp and signature.
    fn dispatch(
        &self,
        path: &str,
        method: HttpMethod,
        body: Option<&Value>,
        options: &RequestOptions,
    ) -> Result<ApiResponse> {
        let policy = self.config.retry();
        let mut attempt = 1;
        loop {
            debug!(
                "Try {attempt} of {} to retrieve result.",
                policy.max_attempts
            );
            match self.send_once(path, method, body, options) {
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable() && attempt < policy.max_attempts => {
                    warn!(
                        "{method} {path}: attempt {attempt}/{} failed ({e}), retrying in {}ms...",
                        policy.max_attempts,
                        policy.delay.as_millis()
                    );
                    std::thread::sleep(policy.delay);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn send_once(
        &self,
        path: &str,
        method: HttpMethod,
        body: Option<&Value>,
        options: &RequestOptions,
    ) -> Result<ApiResponse> {
        let request = self.build_request(path, method, body, options, unix_timestamp())?;
        let response = self.transport.execute(&request).map_err(|e| {
            error!("Connection error for {e}");
            TpmError::Connection(e)
        })?;
        let body = self.parse_response(&request.url, &response)?;
        let next = response.header("link").and_then(next_link);
        Ok(ApiResponse { body, next })
    }
}

fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Payloads that carry nothing are sent as an empty body.
fn is_empty_payload(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// The server's message when `value` is an object with a truthy `error`.
fn error_message(value: &Value) -> Option<String> {
    let object = value.as_object()?;
    let flagged = match object.get("error")? {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    };
    if !flagged {
        return None;
    }
    Some(match object.get("message") {
        Some(Value::String(message)) => message.clone(),
        Some(other) => other.to_string(),
        None => "unknown error".to_string(),
    })
}
