//! Provider credentials.
//!
//! Credentials are plain values handed to the client on every call.
//! Obtaining or refreshing them (e.g. the Thortful login flow that yields
//! a short-lived `user_token`) happens out of band; a [`CredentialSource`]
//! is the seam where a refreshing implementation plugs in.

use crate::types::Provider;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

const DEFAULT_PLATFORM: &str = "swapbench";

#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("no credentials configured for provider {0}")]
    Missing(Provider),
    #[error("credentials for {expected} cannot be used with provider {provider}")]
    Mismatch { provider: Provider, expected: &'static str },
    #[error("failed to read credential file {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed credential file {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("credential value for header {0} contains invalid characters")]
    InvalidHeader(&'static str),
}

/// Thortful session headers, in the shape of a cached `thortful_auth.json`.
///
/// Extra keys in the file (`timestamp`, `note`, `Content-Type`, ...) are ignored.
#[derive(Clone, Serialize, Deserialize)]
pub struct ThortfulAuth {
    #[serde(rename = "API_KEY")]
    pub api_key: String,
    #[serde(rename = "API_SECRET")]
    pub api_secret: String,
    /// Short-lived bearer-style token from the Thortful login flow.
    pub user_token: String,
    #[serde(rename = "x-thortful-customer-id")]
    pub customer_id: String,
    #[serde(default = "default_platform")]
    pub platform: String,
}

fn default_platform() -> String {
    DEFAULT_PLATFORM.to_string()
}

impl ThortfulAuth {
    /// Load cached session headers from a JSON file.
    pub fn load(path: &Path) -> Result<Self, CredentialError> {
        let text = std::fs::read_to_string(path).map_err(|source| CredentialError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| CredentialError::Malformed {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Credentials for one provider call.
#[derive(Clone)]
pub enum Credentials {
    Segmind { api_key: String },
    Thortful(ThortfulAuth),
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Segmind { .. } => f.write_str("Credentials::Segmind(<redacted>)"),
            Credentials::Thortful(auth) => f
                .debug_struct("Credentials::Thortful")
                .field("customer_id", &auth.customer_id)
                .field("platform", &auth.platform)
                .finish_non_exhaustive(),
        }
    }
}

impl Credentials {
    /// Authentication headers for `provider`.
    pub fn headers(&self, provider: Provider) -> Result<HeaderMap, CredentialError> {
        let mut headers = HeaderMap::new();
        match (self, provider.is_segmind()) {
            (Credentials::Segmind { api_key }, true) => {
                insert(&mut headers, "x-api-key", api_key)?;
            }
            (Credentials::Thortful(auth), false) => {
                insert(&mut headers, "API_KEY", &auth.api_key)?;
                insert(&mut headers, "API_SECRET", &auth.api_secret)?;
                insert(&mut headers, "user_token", &auth.user_token)?;
                insert(&mut headers, "x-thortful-customer-id", &auth.customer_id)?;
                insert(&mut headers, "platform", &auth.platform)?;
            }
            (Credentials::Segmind { .. }, false) => {
                return Err(CredentialError::Mismatch {
                    provider,
                    expected: "segmind",
                })
            }
            (Credentials::Thortful(_), true) => {
                return Err(CredentialError::Mismatch {
                    provider,
                    expected: "thortful",
                })
            }
        }
        Ok(headers)
    }
}

fn insert(headers: &mut HeaderMap, name: &'static str, value: &str) -> Result<(), CredentialError> {
    let mut value = HeaderValue::from_str(value.trim()).map_err(|_| CredentialError::InvalidHeader(name))?;
    value.set_sensitive(true);
    // Thortful's header names are not lowercase; HeaderName normalizes them.
    let name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| CredentialError::InvalidHeader(name))?;
    headers.insert(name, value);
    Ok(())
}

/// Supplies credentials per provider. Implementations may refresh
/// tokens; the orchestrator asks again before every attempt.
pub trait CredentialSource: Send + Sync {
    fn credentials(&self, provider: Provider) -> Result<Credentials, CredentialError>;
}

/// Fixed credentials loaded once at startup.
#[derive(Clone, Default)]
pub struct StaticCredentials {
    segmind_api_key: Option<String>,
    thortful: Option<ThortfulAuth>,
}

impl StaticCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_segmind_key(mut self, api_key: impl Into<String>) -> Self {
        self.segmind_api_key = Some(api_key.into());
        self
    }

    pub fn with_thortful(mut self, auth: ThortfulAuth) -> Self {
        self.thortful = Some(auth);
        self
    }

    /// Whether `provider` can be called at all with these credentials.
    pub fn covers(&self, provider: Provider) -> bool {
        self.credentials(provider).is_ok()
    }
}

impl CredentialSource for StaticCredentials {
    fn credentials(&self, provider: Provider) -> Result<Credentials, CredentialError> {
        if provider.is_segmind() {
            self.segmind_api_key
                .as_ref()
                .filter(|k| !k.trim().is_empty())
                .map(|k| Credentials::Segmind { api_key: k.clone() })
                .ok_or(CredentialError::Missing(provider))
        } else {
            self.thortful
                .clone()
                .map(Credentials::Thortful)
                .ok_or(CredentialError::Missing(provider))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn thortful_auth() -> ThortfulAuth {
        ThortfulAuth {
            api_key: "key".into(),
            api_secret: "secret".into(),
            user_token: "token".into(),
            customer_id: "cust-1".into(),
            platform: default_platform(),
        }
    }

    #[test]
    fn test_segmind_headers() {
        let creds = Credentials::Segmind { api_key: "abc".into() };
        let headers = creds.headers(Provider::V43).unwrap();
        assert_eq!(headers.get("x-api-key").unwrap(), "abc");
        assert_eq!(headers.len(), 1);
    }

    #[test]
    fn test_thortful_headers() {
        let headers = Credentials::Thortful(thortful_auth())
            .headers(Provider::Thortful)
            .unwrap();
        assert_eq!(headers.get("api_key").unwrap(), "key");
        assert_eq!(headers.get("api_secret").unwrap(), "secret");
        assert_eq!(headers.get("user_token").unwrap(), "token");
        assert_eq!(headers.get("x-thortful-customer-id").unwrap(), "cust-1");
        assert_eq!(headers.get("platform").unwrap(), "swapbench");
    }

    #[test]
    fn test_mismatched_credentials() {
        let creds = Credentials::Segmind { api_key: "abc".into() };
        assert!(matches!(
            creds.headers(Provider::Thortful),
            Err(CredentialError::Mismatch { .. })
        ));
    }

    #[test]
    fn test_invalid_header_value() {
        let creds = Credentials::Segmind { api_key: "bad\nkey".into() };
        assert!(matches!(
            creds.headers(Provider::V2),
            Err(CredentialError::InvalidHeader("x-api-key"))
        ));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let text = format!("{:?}", Credentials::Segmind { api_key: "abc123".into() });
        assert!(!text.contains("abc123"));
        let text = format!("{:?}", Credentials::Thortful(thortful_auth()));
        assert!(!text.contains("token"));
        assert!(!text.contains("secret"));
    }

    #[test]
    fn test_static_source() {
        let source = StaticCredentials::new().with_segmind_key("k");
        assert!(source.covers(Provider::V2));
        assert!(!source.covers(Provider::Thortful));
        assert!(matches!(
            source.credentials(Provider::Thortful),
            Err(CredentialError::Missing(Provider::Thortful))
        ));
        assert!(!StaticCredentials::new().with_segmind_key(" ").covers(Provider::V4));
    }

    #[test]
    fn test_load_cached_auth_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "API_KEY": "k",
                "API_SECRET": "s",
                "user_token": "t",
                "x-thortful-customer-id": "c",
                "Content-Type": "application/json",
                "timestamp": "2025-07-01T10:00:00",
                "note": "Authentication headers"
            }}"#
        )
        .unwrap();
        let auth = ThortfulAuth::load(file.path()).unwrap();
        assert_eq!(auth.user_token, "t");
        assert_eq!(auth.platform, "swapbench");
    }

    #[test]
    fn test_load_malformed_auth_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"API_KEY": "k"}}"#).unwrap();
        assert!(matches!(
            ThortfulAuth::load(file.path()),
            Err(CredentialError::Malformed { .. })
        ));
        assert!(matches!(
            ThortfulAuth::load(Path::new("/nonexistent/thortful_auth.json")),
            Err(CredentialError::Unreadable { .. })
        ));
    }
}
