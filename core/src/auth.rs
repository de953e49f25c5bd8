//! Request authentication: HTTP Basic or HMAC-signed key pair.
//!
//! # Design
//! The authenticator is a pure function of the credentials, the signed path,
//! a timestamp and the serialized body. The caller reads the clock and
//! passes the timestamp in, so signatures are reproducible in tests.
//!
//! The signed message is `path + timestamp + body` with no URL decoding; the
//! path must be exactly the one appended to the base URL of the physical
//! request.

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::config::Credentials;

type HmacSha256 = Hmac<Sha256>;

pub const PUBLIC_KEY_HEADER: &str = "X-Public-Key";
pub const REQUEST_HASH_HEADER: &str = "X-Request-Hash";
pub const REQUEST_TIMESTAMP_HEADER: &str = "X-Request-Timestamp";
pub const UNLOCK_REASON_HEADER: &str = "X-Unlock-Reason";

/// Authentication evidence for a single outgoing call.
#[derive(Clone, PartialEq, Eq)]
pub enum AuthArtifacts {
    Basic {
        username: String,
        password: String,
    },
    Signed {
        public_key: String,
        hash: String,
        timestamp: u64,
    },
}

impl AuthArtifacts {
    /// Render the evidence as request headers.
    pub fn headers(&self) -> Vec<(String, String)> {
        match self {
            AuthArtifacts::Basic { username, password } => {
                let token = STANDARD.encode(format!("{username}:{password}"));
                vec![("Authorization".to_string(), format!("Basic {token}"))]
            }
            AuthArtifacts::Signed {
                public_key,
                hash,
                timestamp,
            } => vec![
                (PUBLIC_KEY_HEADER.to_string(), public_key.clone()),
                (REQUEST_HASH_HEADER.to_string(), hash.clone()),
                (REQUEST_TIMESTAMP_HEADER.to_string(), timestamp.to_string()),
            ],
        }
    }
}

impl fmt::Debug for AuthArtifacts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthArtifacts::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            AuthArtifacts::Signed {
                public_key,
                hash,
                timestamp,
            } => f
                .debug_struct("Signed")
                .field("public_key", public_key)
                .field("hash", hash)
                .field("timestamp", timestamp)
                .finish(),
        }
    }
}

/// Produces `AuthArtifacts` for the configured credentials.
#[derive(Debug, Clone, Copy)]
pub struct Authenticator<'a> {
    credentials: &'a Credentials,
}

impl<'a> Authenticator<'a> {
    pub fn new(credentials: &'a Credentials) -> Self {
        Self { credentials }
    }

    pub fn authenticate(&self, path: &str, timestamp: u64, body: &str) -> AuthArtifacts {
        match self.credentials {
            Credentials::Basic { username, password } => AuthArtifacts::Basic {
                username: username.clone(),
                password: password.clone(),
            },
            Credentials::KeyPair {
                private_key,
                public_key,
            } => AuthArtifacts::Signed {
                public_key: public_key.clone(),
                hash: sign(private_key, path, timestamp, body),
                timestamp,
            },
        }
    }
}

/// Lowercase hex HMAC-SHA256 of `path + timestamp + body` keyed by `private_key`.
pub fn sign(private_key: &str, path: &str, timestamp: u64, body: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(private_key.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(path.as_bytes());
    mac.update(timestamp.to_string().as_bytes());
    mac.update(body.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_pair() -> Credentials {
        Credentials::KeyPair {
            private_key: "private_secret".to_string(),
            public_key: "public_secret".to_string(),
        }
    }

    #[test]
    fn rfc4231_digest() {
        let digest = sign("Jefe", "what do ya want for nothing?", 0, "");
        let mut mac = HmacSha256::new_from_slice(b"Jefe").unwrap();
        mac.update(b"what do ya want for nothing?0");
        assert_eq!(digest, hex::encode(mac.finalize().into_bytes()));

        let mut reference = HmacSha256::new_from_slice(b"Jefe").unwrap();
        reference.update(b"what do ya want for nothing?");
        assert_eq!(
            hex::encode(reference.finalize().into_bytes()),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn signature_matches_known_vectors() {
        assert_eq!(
            sign("private_secret", "api/v4/version.json", 1_700_000_000, ""),
            "6dbc92023f7c66f3655267d4f0a286c8eaef6fdd7afb2c39a765fe2048f0e45e"
        );
        assert_eq!(
            sign(
                "private_secret",
                "api/v4/projects.json",
                1_700_000_000,
                r#"{"name":"TestProject"}"#
            ),
            "f4a56c79d4934b9c2fb4023d5e7a1c95e5205b63036e7c86a1a84bdd5dda5d7f"
        );
    }

    #[test]
    fn signature_is_deterministic() {
        let a = sign("private_secret", "api/v4/version.json", 1_500_000_000, "");
        let b = sign("private_secret", "api/v4/version.json", 1_500_000_000, "");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn signature_depends_on_every_input() {
        let base = sign("k", "api/v4/projects.json", 1, "{}");
        assert_ne!(base, sign("other", "api/v4/projects.json", 1, "{}"));
        assert_ne!(base, sign("k", "api/v4/passwords.json", 1, "{}"));
        assert_ne!(base, sign("k", "api/v4/projects.json", 2, "{}"));
        assert_ne!(base, sign("k", "api/v4/projects.json", 1, ""));
    }

    #[test]
    fn key_pair_produces_three_headers() {
        let credentials = key_pair();
        let artifacts =
            Authenticator::new(&credentials).authenticate("api/v4/version.json", 42, "");
        let headers = artifacts.headers();
        assert_eq!(headers.len(), 3);
        assert_eq!(
            headers[0],
            (PUBLIC_KEY_HEADER.to_string(), "public_secret".to_string())
        );
        assert_eq!(
            headers[1],
            (
                REQUEST_HASH_HEADER.to_string(),
                sign("private_secret", "api/v4/version.json", 42, "")
            )
        );
        assert_eq!(
            headers[2],
            (REQUEST_TIMESTAMP_HEADER.to_string(), "42".to_string())
        );
    }

    #[test]
    fn basic_produces_authorization_header() {
        let credentials = Credentials::Basic {
            username: "USER".to_string(),
            password: "PASS".to_string(),
        };
        let artifacts = Authenticator::new(&credentials).authenticate("ignored", 0, "");
        assert_eq!(
            artifacts.headers(),
            vec![("Authorization".to_string(), "Basic VVNFUjpQQVNT".to_string())]
        );
        assert!(!format!("{artifacts:?}").contains("PASS"));
    }
}
