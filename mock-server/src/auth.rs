//! Server-side check of Basic and HMAC key-pair authentication.

use axum::http::HeaderMap;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::MockConfig;

type HmacSha256 = Hmac<Sha256>;

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// Whether the request proves knowledge of the configured credentials.
///
/// `signed_path` is the request path below `/index.php/`, exactly as the
/// client signs it.
pub fn verify(config: &MockConfig, signed_path: &str, headers: &HeaderMap, body: &str) -> bool {
    if let Some(authorization) = header(headers, "authorization") {
        let Some(token) = authorization.strip_prefix("Basic ") else {
            return false;
        };
        let Ok(decoded) = STANDARD.decode(token.trim()) else {
            return false;
        };
        return decoded == format!("{}:{}", config.username, config.password).as_bytes();
    }

    let (Some(public_key), Some(hash), Some(timestamp)) = (
        header(headers, "x-public-key"),
        header(headers, "x-request-hash"),
        header(headers, "x-request-timestamp"),
    ) else {
        return false;
    };
    if public_key != config.public_key {
        return false;
    }
    let Ok(expected) = hex::decode(hash) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(config.private_key.as_bytes()) else {
        return false;
    };
    mac.update(signed_path.as_bytes());
    mac.update(timestamp.as_bytes());
    mac.update(body.as_bytes());
    mac.verify_slice(&expected).is_ok()
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn signed(path: &str, timestamp: &str, body: &str, key: &str) -> HeaderMap {
        let mut mac = HmacSha256::new_from_slice(key.as_bytes()).unwrap();
        mac.update(format!("{path}{timestamp}{body}").as_bytes());
        let mut headers = HeaderMap::new();
        headers.insert("x-public-key", HeaderValue::from_static("public_secret"));
        headers.insert(
            "x-request-hash",
            HeaderValue::from_str(&hex::encode(mac.finalize().into_bytes())).unwrap(),
        );
        headers.insert("x-request-timestamp", HeaderValue::from_str(timestamp).unwrap());
        headers
    }

    #[test]
    fn accepts_basic_credentials() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Basic VVNFUjpQQVNT"));
        assert!(verify(&MockConfig::default(), "api/v4/projects.json", &headers, ""));
    }

    #[test]
    fn rejects_wrong_password() {
        let mut headers = HeaderMap::new();
        let token = STANDARD.encode("USER:nope");
        headers.insert(
            "authorization",
            HeaderValue::from_str(&format!("Basic {token}")).unwrap(),
        );
        assert!(!verify(&MockConfig::default(), "api/v4/projects.json", &headers, ""));
    }

    #[test]
    fn accepts_valid_signature() {
        let headers = signed("api/v4/projects.json", "1700000000", "", "private_secret");
        assert!(verify(&MockConfig::default(), "api/v4/projects.json", &headers, ""));
    }

    #[test]
    fn signature_covers_path_and_body() {
        let headers = signed("api/v4/projects.json", "1700000000", "{}", "private_secret");
        let config = MockConfig::default();
        assert!(!verify(&config, "api/v4/passwords.json", &headers, "{}"));
        assert!(!verify(&config, "api/v4/projects.json", &headers, ""));
    }

    #[test]
    fn rejects_unknown_key_and_missing_headers() {
        let headers = signed("api/v4/projects.json", "1", "", "other_secret");
        assert!(!verify(&MockConfig::default(), "api/v4/projects.json", &headers, ""));
        assert!(!verify(&MockConfig::default(), "api/v4/projects.json", &HeaderMap::new(), ""));
    }
}
