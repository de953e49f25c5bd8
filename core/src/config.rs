//! Client configuration and its validation.
//!
//! # Design
//! `ClientConfig` is validated once, in `ClientConfigBuilder::build`, and is
//! immutable afterwards. Every rule that can reject a configuration (URL
//! grammar, credential exclusivity, version tag) lives here so the request
//! path never produces `TpmError::Config`.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;

use log::debug;
use regex::Regex;

use crate::error::{Result, TpmError};

/// Message used for every credential combination that is not exactly one
/// complete mode.
pub const AUTH_MODE_ERROR: &str =
    "No authentication specified (user/password or private/public key)";

/// Delay between attempts when retries are enabled and no delay is given.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1000);

/// Absolute http(s) URL: optional userinfo, IPv4 literal or DNS name,
/// optional port, optional path/query/fragment suffix.
static URL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^(?:https?://)",
        r"(?:\S+(?::\S*)?@)?",
        r"(?:",
        r"(?:[1-9]\d?|1\d\d|2[01]\d|22[0-3])",
        r"(?:\.(?:1?\d{1,2}|2[0-4]\d|25[0-5])){2}",
        r"(?:\.(?:[1-9]\d?|1\d\d|2[0-4]\d|25[0-4]))",
        r"|",
        r"(?:(?:[a-z\x{a1}-\x{ffff}0-9]-*)*[a-z\x{a1}-\x{ffff}0-9]+)",
        r"(?:\.(?:[a-z\x{a1}-\x{ffff}0-9]-*)*[a-z\x{a1}-\x{ffff}0-9]+)*",
        r"(?:\.(?:[a-z\x{a1}-\x{ffff}]{2,}))?",
        r".?",
        r")",
        r"(?::\d{2,5})?",
        r"(?:[/?#]\S*)?$",
    ))
    .unwrap_or_else(|e| panic!("URL pattern must compile: {e}"))
});

/// Returns true when `url` is an absolute http(s) URL accepted by the client.
pub fn is_valid_base_url(url: &str) -> bool {
    URL_PATTERN.is_match(url)
}

/// Server API version. Each version maps to the `api/{tag}/` path prefix and
/// gates the resource methods that only exist from that version on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ApiVersion {
    V3,
    #[default]
    V4,
    V5,
}

impl ApiVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiVersion::V3 => "v3",
            ApiVersion::V4 => "v4",
            ApiVersion::V5 => "v5",
        }
    }

    /// Prefix every resource path lives under, e.g. `api/v4/`.
    pub fn path_prefix(&self) -> String {
        format!("api/{}/", self.as_str())
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApiVersion {
    type Err = TpmError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "v3" => Ok(ApiVersion::V3),
            "v4" => Ok(ApiVersion::V4),
            "v5" => Ok(ApiVersion::V5),
            other => Err(TpmError::Config(format!("API Version not known: {other}"))),
        }
    }
}

/// The single authentication mode a client uses.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    Basic { username: String, password: String },
    KeyPair { private_key: String, public_key: String },
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Credentials::KeyPair { public_key, .. } => f
                .debug_struct("KeyPair")
                .field("private_key", &"<redacted>")
                .field("public_key", public_key)
                .finish(),
        }
    }
}

/// Bounded retry of whole requests. One attempt means no retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

/// Validated, immutable client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    server_url: String,
    base_url: String,
    version: ApiVersion,
    credentials: Credentials,
    retry: RetryPolicy,
    timeout: Option<Duration>,
    accept_invalid_certs: bool,
}

impl ClientConfig {
    pub fn builder(url: impl Into<String>) -> ClientConfigBuilder {
        ClientConfigBuilder::new(url)
    }

    /// Build a configuration from `TPM_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from any key lookup using the `TPM_*` names.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = lookup("TPM_URL")
            .ok_or_else(|| TpmError::Config("TPM_URL is not set".to_string()))?;
        let mut builder = ClientConfigBuilder::new(url);
        if let Some(version) = lookup("TPM_API_VERSION") {
            builder = builder.api_version(version.parse()?);
        }
        if let Some(username) = lookup("TPM_USERNAME") {
            builder = builder.username(username);
        }
        if let Some(password) = lookup("TPM_PASSWORD") {
            builder = builder.password(password);
        }
        if let Some(private_key) = lookup("TPM_PRIVATE_KEY") {
            builder = builder.private_key(private_key);
        }
        if let Some(public_key) = lookup("TPM_PUBLIC_KEY") {
            builder = builder.public_key(public_key);
        }
        if let Some(retries) = lookup("TPM_MAX_RETRIES") {
            let attempts = retries.parse::<u32>().map_err(|e| {
                TpmError::Config(format!("TPM_MAX_RETRIES is not a number: {e}"))
            })?;
            builder = builder.max_attempts(attempts);
        }
        builder.build()
    }

    /// The server URL as given, without trailing slash.
    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    /// `{server_url}/index.php/`, the root every API path is appended to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn version(&self) -> ApiVersion {
        self.version
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn accept_invalid_certs(&self) -> bool {
        self.accept_invalid_certs
    }
}

/// Collects configuration fields; `build` enforces every invariant.
#[derive(Clone, Default)]
pub struct ClientConfigBuilder {
    url: String,
    version: ApiVersion,
    username: Option<String>,
    password: Option<String>,
    private_key: Option<String>,
    public_key: Option<String>,
    retry: RetryPolicy,
    timeout: Option<Duration>,
    accept_invalid_certs: bool,
}

impl ClientConfigBuilder {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn api_version(mut self, version: ApiVersion) -> Self {
        self.version = version;
        self
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn private_key(mut self, private_key: impl Into<String>) -> Self {
        self.private_key = Some(private_key.into());
        self
    }

    pub fn public_key(mut self, public_key: impl Into<String>) -> Self {
        self.public_key = Some(public_key.into());
        self
    }

    /// Total attempts per request, including the first. Zero is treated as one.
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.retry.max_attempts = attempts.max(1);
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry.delay = delay;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Skip TLS certificate verification. Only for servers with self-signed
    /// certificates on trusted networks.
    pub fn danger_accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }

    pub fn build(self) -> Result<ClientConfig> {
        if !is_valid_base_url(&self.url) {
            return Err(TpmError::Config(format!("Invalid URL: {}", self.url)));
        }
        let server_url = self.url.trim_end_matches('/').to_string();
        let base_url = format!("{server_url}/index.php/");
        debug!("Set Base URL to {base_url}, API {}", self.version);

        let credentials = match (
            self.username,
            self.password,
            self.private_key,
            self.public_key,
        ) {
            (Some(username), Some(password), None, None) => {
                debug!("Using Basic authentication.");
                Credentials::Basic { username, password }
            }
            (None, None, Some(private_key), Some(public_key)) => {
                debug!("Using Private/Public Key authentication.");
                Credentials::KeyPair {
                    private_key,
                    public_key,
                }
            }
            _ => return Err(TpmError::Config(AUTH_MODE_ERROR.to_string())),
        };

        Ok(ClientConfig {
            server_url,
            base_url,
            version: self.version,
            credentials,
            retry: self.retry,
            timeout: self.timeout,
            accept_invalid_certs: self.accept_invalid_certs,
        })
    }
}
