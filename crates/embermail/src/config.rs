//! Application configuration file.
//!
//! ```json
//! {
//!   "smtp": {
//!     "server": { "host": "smtp.example.com", "port": 465 },
//!     "credentials": { "user": "device@example.com" }
//!   },
//!   "imap": {
//!     "server": { "host": "imap.example.com", "port": 993 },
//!     "credentials": { "user": "device@example.com" }
//!   },
//!   "storage_root": "/var/lib/embermail"
//! }
//! ```
//!
//! Secrets are better kept out of the file: `EMBERMAIL_SMTP_PASSWORD`,
//! `EMBERMAIL_SMTP_TOKEN`, `EMBERMAIL_IMAP_PASSWORD` and
//! `EMBERMAIL_IMAP_TOKEN` override whatever the file says. A token wins
//! over a password.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use embermail_core::{Secret, SessionConfig};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::storage::FsStorage;

/// Everything the CLI needs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Incoming mail server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imap: Option<SessionConfig>,
    /// Outgoing mail server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smtp: Option<SessionConfig>,
    /// Directory attachments and saved bodies go to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_root: Option<PathBuf>,
    /// Sender address; the SMTP user when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
}

impl AppConfig {
    /// Reads `path`, applies environment overrides and validates.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be read or parsed, or a session
    /// configuration is invalid.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        let mut config =
            Self::from_json(&text).with_context(|| format!("parsing {}", path.display()))?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Parses JSON without overrides.
    ///
    /// # Errors
    ///
    /// Returns the JSON error.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Replaces secrets with values from `lookup` (normally the process
    /// environment).
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        for (prefix, session) in [("IMAP", &mut self.imap), ("SMTP", &mut self.smtp)] {
            let Some(session) = session.as_mut() else {
                continue;
            };
            if let Some(token) = lookup(&format!("EMBERMAIL_{prefix}_TOKEN")) {
                debug!(protocol = prefix, "access token from environment");
                session.credentials.secret = Secret::AccessToken(token);
            } else if let Some(password) = lookup(&format!("EMBERMAIL_{prefix}_PASSWORD")) {
                debug!(protocol = prefix, "password from environment");
                session.credentials.secret = Secret::Password(password);
            }
        }
    }

    /// Checks both session configurations.
    ///
    /// # Errors
    ///
    /// Lists every problem, prefixed by protocol.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();
        for (name, session) in [("imap", &self.imap), ("smtp", &self.smtp)] {
            if let Some(Err(errors)) = session.as_ref().map(SessionConfig::validate) {
                problems.extend(errors.iter().map(|e| format!("{name}: {e}")));
            }
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(anyhow!("invalid configuration: {}", problems.join("; ")))
        }
    }

    /// The IMAP section.
    ///
    /// # Errors
    ///
    /// Fails when there is none.
    pub fn imap(&self) -> Result<&SessionConfig> {
        self.imap.as_ref().context("no \"imap\" section in configuration")
    }

    /// The SMTP section.
    ///
    /// # Errors
    ///
    /// Fails when there is none.
    pub fn smtp(&self) -> Result<&SessionConfig> {
        self.smtp.as_ref().context("no \"smtp\" section in configuration")
    }

    /// Sender address for outgoing mail.
    #[must_use]
    pub fn sender(&self) -> Option<&str> {
        self.from
            .as_deref()
            .or_else(|| self.smtp.as_ref().map(|s| s.credentials.user.as_str()))
            .filter(|s| !s.is_empty())
    }

    /// Filesystem storage at `storage_root`, if set.
    #[must_use]
    pub fn storage(&self) -> Option<FsStorage> {
        self.storage_root.as_ref().map(FsStorage::new)
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
    use embermail_core::Security;
    use std::collections::HashMap;
    use std::time::Duration;

    const SAMPLE: &str = r#"{
        "smtp": {
            "server": { "host": "smtp.example.com", "port": 587, "security": "starttls" },
            "credentials": { "user": "device@example.com",
                             "secret": { "kind": "password", "value": "from-file" } },
            "timeouts": { "connect": 10, "read": 20 }
        },
        "imap": {
            "server": { "host": "imap.example.com", "port": 993 },
            "credentials": { "user": "device@example.com" }
        },
        "storage_root": "/tmp/embermail"
    }"#;

    #[test]
    fn test_parse() {
        let config = AppConfig::from_json(SAMPLE).unwrap();
        let smtp = config.smtp().unwrap();
        assert_eq!(smtp.server.security, Security::StartTls);
        assert_eq!(smtp.timeouts.read, Duration::from_secs(20));
        assert_eq!(smtp.client_domain, "localhost");
        assert_eq!(smtp.credentials.secret, Secret::Password("from-file".into()));

        let imap = config.imap().unwrap();
        assert_eq!(imap.server.security, Security::Implicit);
        assert!(imap.server.verify_certificate);
        assert!(!imap.credentials.is_present());
        assert_eq!(config.sender(), Some("device@example.com"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_overrides() {
        let mut config = AppConfig::from_json(SAMPLE).unwrap();
        let env: HashMap<&str, &str> = [
            ("EMBERMAIL_SMTP_PASSWORD", "pw"),
            ("EMBERMAIL_SMTP_TOKEN", "tok"),
            ("EMBERMAIL_IMAP_PASSWORD", "imap-pw"),
        ]
        .into_iter()
        .collect();
        config.apply_overrides(|key| env.get(key).map(ToString::to_string));

        assert_eq!(
            config.smtp().unwrap().credentials.secret,
            Secret::AccessToken("tok".into())
        );
        assert_eq!(
            config.imap().unwrap().credentials.secret,
            Secret::Password("imap-pw".into())
        );
    }

    #[test]
    fn test_missing_sections() {
        let config = AppConfig::from_json("{}").unwrap();
        assert!(config.imap().is_err());
        assert!(config.smtp().is_err());
        assert!(config.storage().is_none());
        assert_eq!(config.sender(), None);
    }

    #[test]
    fn test_validation_lists_problems() {
        let json = r#"{ "smtp": { "server": { "host": "", "port": 0 } } }"#;
        let err = AppConfig::from_json(json).unwrap().validate().unwrap_err();
        let text = err.to_string();
        assert!(text.contains("smtp: server host is required"));
        assert!(text.contains("smtp: port must be 1-65535"));
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        tokio::fs::write(&path, SAMPLE).await.unwrap();
        let config = AppConfig::load(&path).await.unwrap();
        assert_eq!(config.storage_root, Some(PathBuf::from("/tmp/embermail")));

        assert!(AppConfig::load(dir.path().join("missing.json")).await.is_err());
    }
}
