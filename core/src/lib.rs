//! Synchronous client for the Team Password Manager REST API.
//!
//! # Overview
//! `TpmClient` talks to a TPM server through versioned JSON endpoints
//! (`{server}/index.php/api/vN/...`). It authenticates every call with
//! either HTTP Basic credentials or an HMAC-SHA256 signed key pair, follows
//! `link: rel="next"` headers across paginated collections and classifies
//! failures into `TpmError`.
//!
//! # Design
//! - `ClientConfig` is validated once and is immutable afterwards. The
//!   client carries no per-call state; the unlock reason for locked
//!   passwords travels in `RequestOptions`.
//! - Requests and responses are plain data (`HttpRequest` /
//!   `HttpResponse`). The network round-trip sits behind the `Transport`
//!   trait, with `UreqTransport` as the blocking default.
//! - Resource payloads pass through as `serde_json::Value`; the server owns
//!   that schema.
//!
//! ```no_run
//! use tpm_core::{ClientConfig, TpmClient};
//!
//! let config = ClientConfig::builder("https://tpm.example.com")
//!     .username("USER")
//!     .password("PASS")
//!     .build()?;
//! let client = TpmClient::new(config);
//! for project in client.list_projects()? {
//!     println!("{}", project["name"]);
//! }
//! # Ok::<(), tpm_core::TpmError>(())
//! ```

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod pagination;
pub mod resources;
pub mod types;

#[cfg(test)]
mod testing;

pub use client::{RequestOptions, TpmClient};
pub use config::{ApiVersion, ClientConfig, ClientConfigBuilder, Credentials, RetryPolicy};
pub use error::{Result, TpmError};
pub use http::{HttpMethod, HttpRequest, HttpResponse, Transport, UreqTransport};
pub use pagination::{CollectionIter, PageLink};
pub use types::{CreatedResource, VersionInfo};
