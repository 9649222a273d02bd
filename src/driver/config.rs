//! Connection settings
//!
//! Settings shared by every transport binding. Loadable from any serde
//! format, or assembled with [`ConnectionSettings::builder`].

use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Serialize};

use super::auth::{AuthToken, CredentialProvider, NoopCredentials};
use super::error::{DriverError, DriverResult};

/// Default connect timeout
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Default cap on authentication retries per exchange
pub const DEFAULT_MAX_AUTH_ATTEMPTS: u32 = 1;

// ============================================================================
// TrustStrategy
// ============================================================================

/// TLS trust strategy
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustStrategy {
    /// Use the system certificate store
    #[default]
    TrustSystemCas,
    /// Accept any certificate (development only)
    TrustAllCertificates,
}

// ============================================================================
// ConnectionSettings
// ============================================================================

/// Connection settings
///
/// | field | default | meaning |
/// |-------|---------|---------|
/// | `auth` | none | credential source |
/// | `trust_strategy` | system CAs | TLS trust |
/// | `connect_timeout` | 15s | transport connect timeout |
/// | `request_timeout` | none | deadline for one round trip |
/// | `max_response_content_length` | 0 | response body cap in bytes, 0 = unlimited |
/// | `max_auth_attempts` | 1 | authentication retries per exchange |
/// | `user_agent` | `gremlin-driver/<version>` | HTTP user agent |
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    /// Authentication
    pub auth: AuthToken,
    /// TLS trust strategy
    pub trust_strategy: TrustStrategy,
    /// Connect timeout
    pub connect_timeout: Duration,
    /// Deadline for a single request/response round trip
    pub request_timeout: Option<Duration>,
    /// Maximum response body size in bytes, 0 disables the check
    pub max_response_content_length: u64,
    /// Authentication retries allowed per exchange
    pub max_auth_attempts: u32,
    /// User agent
    pub user_agent: String,
}

impl ConnectionSettings {
    /// Start a builder from defaults.
    pub fn builder() -> ConnectionSettingsBuilder {
        ConnectionSettingsBuilder {
            settings: Self::default(),
        }
    }

    /// Credential provider for the configured auth, or a no-op provider.
    pub fn credential_provider(&self) -> Arc<dyn CredentialProvider> {
        match self.auth {
            AuthToken::None => Arc::new(NoopCredentials),
            _ => Arc::new(self.auth.clone()),
        }
    }

    /// Check internal consistency.
    pub fn validate(&self) -> DriverResult<()> {
        if self.connect_timeout.is_zero() {
            return Err(DriverError::configuration("connect_timeout must be non-zero"));
        }
        if matches!(self.request_timeout, Some(t) if t.is_zero()) {
            return Err(DriverError::configuration("request_timeout must be non-zero"));
        }
        if self.user_agent.is_empty() {
            return Err(DriverError::configuration("user_agent must not be empty"));
        }
        Ok(())
    }
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            auth: AuthToken::default(),
            trust_strategy: TrustStrategy::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: None,
            max_response_content_length: 0,
            max_auth_attempts: DEFAULT_MAX_AUTH_ATTEMPTS,
            user_agent: format!("gremlin-driver/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

// ============================================================================
// ConnectionSettingsBuilder
// ============================================================================

/// Connection settings builder
pub struct ConnectionSettingsBuilder {
    settings: ConnectionSettings,
}

impl ConnectionSettingsBuilder {
    /// Authentication
    pub fn with_auth(mut self, auth: AuthToken) -> Self {
        self.settings.auth = auth;
        self
    }

    /// TLS trust strategy
    pub fn with_trust_strategy(mut self, strategy: TrustStrategy) -> Self {
        self.settings.trust_strategy = strategy;
        self
    }

    /// Connect timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.settings.connect_timeout = timeout;
        self
    }

    /// Per round-trip deadline
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.settings.request_timeout = Some(timeout);
        self
    }

    /// Response body cap, 0 disables it
    pub fn with_max_response_content_length(mut self, bytes: u64) -> Self {
        self.settings.max_response_content_length = bytes;
        self
    }

    /// Authentication retries per exchange
    pub fn with_max_auth_attempts(mut self, attempts: u32) -> Self {
        self.settings.max_auth_attempts = attempts;
        self
    }

    /// User agent
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.settings.user_agent = user_agent.into();
        self
    }

    /// Build
    pub fn build(self) -> ConnectionSettings {
        self.settings
    }
}

// ============================================================================
// Endpoint parsing
// ============================================================================

/// Parse and validate an HTTP(S) endpoint.
pub fn parse_http_endpoint(endpoint: &str) -> DriverResult<Url> {
    let url = Url::parse(endpoint)
        .map_err(|e| DriverError::configuration(format!("Invalid endpoint '{}': {}", endpoint, e)))?;
    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(DriverError::configuration(format!(
                "Unsupported scheme '{}' for HTTP transport",
                other
            )))
        }
    }
    if url.host_str().is_none() {
        return Err(DriverError::configuration(format!(
            "Endpoint '{}' has no host",
            endpoint
        )));
    }
    Ok(url)
}
