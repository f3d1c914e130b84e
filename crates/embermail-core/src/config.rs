//! Session configuration shared by both engines.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Connection security mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Security {
    /// No encryption. **Not recommended for production.**
    None,
    /// Start with plaintext, upgrade with STARTTLS.
    StartTls,
    /// TLS from the start. **Recommended.**
    #[default]
    Implicit,
}

impl Security {
    /// Returns the default IMAP port for this security mode.
    #[must_use]
    pub const fn default_imap_port(self) -> u16 {
        match self {
            Self::None | Self::StartTls => 143,
            Self::Implicit => 993,
        }
    }

    /// Returns the default SMTP port for this security mode.
    #[must_use]
    pub const fn default_smtp_port(self) -> u16 {
        match self {
            Self::None => 25,
            Self::StartTls => 587,
            Self::Implicit => 465,
        }
    }
}

/// Server address and TLS policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server hostname.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Security mode.
    #[serde(default)]
    pub security: Security,
    /// Validate the server certificate chain.
    #[serde(default = "default_true")]
    pub verify_certificate: bool,
}

const fn default_true() -> bool {
    true
}

/// Secret used to authenticate.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum Secret {
    /// No authentication.
    #[default]
    None,
    /// Password for PLAIN/LOGIN.
    Password(String),
    /// `OAuth2` access token for XOAUTH2.
    AccessToken(String),
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Password(_) => f.write_str("Password(<redacted>)"),
            Self::AccessToken(_) => f.write_str("AccessToken(<redacted>)"),
        }
    }
}

/// Login identity and secret.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Account name, usually the email address.
    pub user: String,
    /// Password or token.
    #[serde(default)]
    pub secret: Secret,
}

impl Credentials {
    /// Password credentials.
    #[must_use]
    pub fn password(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            secret: Secret::Password(password.into()),
        }
    }

    /// `OAuth2` token credentials.
    #[must_use]
    pub fn token(user: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            secret: Secret::AccessToken(token.into()),
        }
    }

    /// Returns true when there is something to authenticate with.
    #[must_use]
    pub fn is_present(&self) -> bool {
        !matches!(self.secret, Secret::None)
    }
}

/// Deadlines for connecting and for each blocking read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeouts {
    /// TCP connect (and TLS handshake) deadline.
    #[serde(with = "duration_secs")]
    pub connect: Duration,
    /// Deadline for every read that waits on the server.
    #[serde(with = "duration_secs")]
    pub read: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(30),
            read: Duration::from_secs(30),
        }
    }
}

/// Local time settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeConfig {
    /// Offset from UTC used when stamping `Date` headers.
    pub utc_offset_minutes: i32,
}

/// Reconnect behaviour after a dropped connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectPolicy {
    /// Reconnect transparently on the next call.
    pub enabled: bool,
    /// Minimum time between two reconnect attempts.
    #[serde(with = "duration_secs")]
    pub cooldown: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            cooldown: Duration::from_secs(10),
        }
    }
}

/// Everything needed to open and authenticate one session.
///
/// Owned by the caller; engines borrow it for the life of a connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Server address.
    pub server: ServerConfig,
    /// Login identity.
    #[serde(default)]
    pub credentials: Credentials,
    /// Name announced in SMTP `EHLO`/`HELO`.
    #[serde(default = "default_client_domain")]
    pub client_domain: String,
    /// Connect and read deadlines.
    #[serde(default)]
    pub timeouts: Timeouts,
    /// Local time settings.
    #[serde(default)]
    pub time: TimeConfig,
    /// Reconnect policy.
    #[serde(default)]
    pub reconnect: ReconnectPolicy,
}

fn default_client_domain() -> String {
    "localhost".to_string()
}

impl SessionConfig {
    /// Creates a builder for an IMAP session.
    #[must_use]
    pub fn imap(host: impl Into<String>) -> SessionConfigBuilder {
        SessionConfigBuilder::new(host, Security::default_imap_port)
    }

    /// Creates a builder for an SMTP session.
    #[must_use]
    pub fn smtp(host: impl Into<String>) -> SessionConfigBuilder {
        SessionConfigBuilder::new(host, Security::default_smtp_port)
    }

    /// Checks the configuration for problems that would fail every connect.
    ///
    /// # Errors
    ///
    /// Returns every problem found.
    pub fn validate(&self) -> std::result::Result<(), Vec<ConfigError>> {
        let mut errors = Vec::new();
        if self.server.host.trim().is_empty() {
            errors.push(ConfigError::EmptyHost);
        }
        if self.server.port == 0 {
            errors.push(ConfigError::InvalidPort);
        }
        if self.credentials.is_present() && self.credentials.user.trim().is_empty() {
            errors.push(ConfigError::EmptyUser);
        }
        if self.timeouts.read.is_zero() {
            errors.push(ConfigError::ZeroReadTimeout);
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Like [`SessionConfig::validate`] but folded into one [`Error`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] listing every problem.
    pub fn ensure_valid(&self) -> Result<()> {
        self.validate().map_err(|errors| {
            let text: Vec<&str> = errors.iter().map(ConfigError::message).collect();
            Error::Config(text.join("; "))
        })
    }
}

/// A configuration problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// Server host is empty.
    EmptyHost,
    /// Port is zero.
    InvalidPort,
    /// A secret is set but the user is empty.
    EmptyUser,
    /// Read timeout of zero would fail every read.
    ZeroReadTimeout,
}

impl ConfigError {
    /// Get human-readable error message.
    #[must_use]
    pub const fn message(&self) -> &'static str {
        match self {
            Self::EmptyHost => "server host is required",
            Self::InvalidPort => "port must be 1-65535",
            Self::EmptyUser => "user is required when a password or token is set",
            Self::ZeroReadTimeout => "read timeout must be non-zero",
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Builder for [`SessionConfig`].
#[derive(Debug, Clone)]
pub struct SessionConfigBuilder {
    host: String,
    port: Option<u16>,
    default_port: fn(Security) -> u16,
    security: Security,
    verify_certificate: bool,
    credentials: Credentials,
    client_domain: String,
    timeouts: Timeouts,
    time: TimeConfig,
    reconnect: ReconnectPolicy,
}

impl SessionConfigBuilder {
    fn new(host: impl Into<String>, default_port: fn(Security) -> u16) -> Self {
        Self {
            host: host.into(),
            port: None,
            default_port,
            security: Security::Implicit,
            verify_certificate: true,
            credentials: Credentials::default(),
            client_domain: default_client_domain(),
            timeouts: Timeouts::default(),
            time: TimeConfig::default(),
            reconnect: ReconnectPolicy::default(),
        }
    }

    /// Sets the port.
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Sets the security mode.
    #[must_use]
    pub const fn security(mut self, security: Security) -> Self {
        self.security = security;
        self
    }

    /// Enables or disables certificate verification.
    #[must_use]
    pub const fn verify_certificate(mut self, verify: bool) -> Self {
        self.verify_certificate = verify;
        self
    }

    /// Sets the credentials.
    #[must_use]
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// Sets the `EHLO` domain.
    #[must_use]
    pub fn client_domain(mut self, domain: impl Into<String>) -> Self {
        self.client_domain = domain.into();
        self
    }

    /// Sets the connect timeout.
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.connect = timeout;
        self
    }

    /// Sets the read timeout.
    #[must_use]
    pub const fn read_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.read = timeout;
        self
    }

    /// Sets the UTC offset for `Date` headers.
    #[must_use]
    pub const fn utc_offset_minutes(mut self, minutes: i32) -> Self {
        self.time.utc_offset_minutes = minutes;
        self
    }

    /// Sets the reconnect policy.
    #[must_use]
    pub const fn reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> SessionConfig {
        SessionConfig {
            server: ServerConfig {
                host: self.host,
                port: self.port.unwrap_or_else(|| (self.default_port)(self.security)),
                security: self.security,
                verify_certificate: self.verify_certificate,
            },
            credentials: self.credentials,
            client_domain: self.client_domain,
            timeouts: self.timeouts,
            time: self.time,
            reconnect: self.reconnect,
        }
    }
}

/// Serializes a [`Duration`] as whole seconds.
mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ports() {
        assert_eq!(Security::None.default_imap_port(), 143);
        assert_eq!(Security::StartTls.default_imap_port(), 143);
        assert_eq!(Security::Implicit.default_imap_port(), 993);
        assert_eq!(Security::None.default_smtp_port(), 25);
        assert_eq!(Security::StartTls.default_smtp_port(), 587);
        assert_eq!(Security::Implicit.default_smtp_port(), 465);
    }

    #[test]
    fn test_builder_picks_protocol_port() {
        let imap = SessionConfig::imap("imap.example.com").build();
        assert_eq!(imap.server.port, 993);

        let smtp = SessionConfig::smtp("smtp.example.com")
            .security(Security::StartTls)
            .build();
        assert_eq!(smtp.server.port, 587);

        let custom = SessionConfig::smtp("smtp.example.com").port(2525).build();
        assert_eq!(custom.server.port, 2525);
    }

    #[test]
    fn test_builder_all_options() {
        let config = SessionConfig::imap("imap.example.com")
            .security(Security::None)
            .verify_certificate(false)
            .credentials(Credentials::password("user", "pass"))
            .client_domain("device.local")
            .connect_timeout(Duration::from_secs(5))
            .read_timeout(Duration::from_secs(7))
            .utc_offset_minutes(420)
            .build();
        assert_eq!(config.server.port, 143);
        assert!(!config.server.verify_certificate);
        assert_eq!(config.client_domain, "device.local");
        assert_eq!(config.timeouts.read, Duration::from_secs(7));
        assert_eq!(config.time.utc_offset_minutes, 420);
    }

    #[test]
    fn test_secret_debug_redacted() {
        let creds = Credentials::password("user", "hunter2");
        let debug = format!("{creds:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("redacted"));
    }

    #[test]
    fn test_validate_reports_every_problem() {
        let mut config = SessionConfig::imap("").build();
        config.server.port = 0;
        config.credentials = Credentials::token("", "tok");
        let errors = config.validate().unwrap_err();
        assert_eq!(
            errors,
            vec![
                ConfigError::EmptyHost,
                ConfigError::InvalidPort,
                ConfigError::EmptyUser
            ]
        );
        assert!(matches!(config.ensure_valid(), Err(Error::Config(_))));
    }

    #[test]
    fn test_json_round_trip() {
        let config = SessionConfig::smtp("smtp.example.com")
            .credentials(Credentials::password("me@example.com", "pw"))
            .build();
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"read\":30"));
        let back: SessionConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_json_minimal() {
        let json = r#"{"server":{"host":"imap.example.com","port":993}}"#;
        let config: SessionConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.server.security, Security::Implicit);
        assert!(config.server.verify_certificate);
        assert_eq!(config.client_domain, "localhost");
        assert!(!config.credentials.is_present());
    }
}
