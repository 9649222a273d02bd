//! Credentials
//!
//! A [`CredentialProvider`] tells the engine whether basic credentials are
//! available to answer an authentication challenge.

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

// ============================================================================
// CredentialProvider
// ============================================================================

/// Source of credentials for a transport.
pub trait CredentialProvider: Send + Sync + fmt::Debug {
    /// Basic credentials, if configured.
    fn basic_credentials(&self) -> Option<BasicCredentials>;

    /// Whether basic credentials are configured.
    fn is_basic_auth_configured(&self) -> bool {
        self.basic_credentials().is_some()
    }

    /// Extra headers to send with every HTTP request.
    fn http_headers(&self) -> Vec<(String, String)> {
        Vec::new()
    }
}

/// Provider that never has credentials.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCredentials;

impl CredentialProvider for NoopCredentials {
    fn basic_credentials(&self) -> Option<BasicCredentials> {
        None
    }
}

// ============================================================================
// BasicCredentials
// ============================================================================

/// Username/password pair.
#[derive(Clone, PartialEq, Eq)]
pub struct BasicCredentials {
    /// Username
    pub username: String,
    /// Password
    pub password: String,
}

impl BasicCredentials {
    /// Create a credential pair.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// SASL PLAIN payload: base64 of `0x00 username 0x00 password`.
    pub fn sasl_payload(&self) -> String {
        let mut raw = Vec::with_capacity(self.username.len() + self.password.len() + 2);
        raw.push(0);
        raw.extend_from_slice(self.username.as_bytes());
        raw.push(0);
        raw.extend_from_slice(self.password.as_bytes());
        STANDARD.encode(raw)
    }
}

impl fmt::Debug for BasicCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicCredentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

// ============================================================================
// AuthToken
// ============================================================================

/// Configured authentication.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scheme", rename_all = "lowercase")]
pub enum AuthToken {
    /// No authentication
    #[default]
    None,
    /// Basic authentication (username/password), answered through SASL
    Basic {
        /// Username
        username: String,
        /// Password
        password: String,
    },
    /// Bearer token, sent as an `authorization` header
    Bearer {
        /// Token
        token: String,
    },
}

impl AuthToken {
    /// Basic authentication token
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Basic {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Bearer token
    pub fn bearer(token: impl Into<String>) -> Self {
        Self::Bearer {
            token: token.into(),
        }
    }

    /// No authentication
    pub fn none() -> Self {
        Self::None
    }

    /// Scheme name
    pub fn scheme(&self) -> &str {
        match self {
            Self::None => "none",
            Self::Basic { .. } => "basic",
            Self::Bearer { .. } => "bearer",
        }
    }
}

impl CredentialProvider for AuthToken {
    fn basic_credentials(&self) -> Option<BasicCredentials> {
        match self {
            Self::Basic { username, password } => Some(BasicCredentials::new(username, password)),
            _ => None,
        }
    }

    fn http_headers(&self) -> Vec<(String, String)> {
        match self {
            Self::Bearer { token } => vec![("authorization".to_string(), format!("Bearer {}", token))],
            _ => Vec::new(),
        }
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "AuthToken::None"),
            Self::Basic { username, .. } => f
                .debug_struct("AuthToken::Basic")
                .field("username", username)
                .field("password", &"***")
                .finish(),
            Self::Bearer { .. } => f
                .debug_struct("AuthToken::Bearer")
                .field("token", &"***")
                .finish(),
        }
    }
}
