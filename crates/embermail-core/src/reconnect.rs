//! Reconnect policy enforcement.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::config::ReconnectPolicy;
use crate::error::{Error, Result};

/// Host hook for bringing the network back before a reconnect.
pub trait NetworkHandler: Send {
    /// Returns true if the network link is up.
    fn is_network_up(&mut self) -> bool {
        true
    }

    /// Tries to restore the link (e.g. rejoin Wi-Fi). Returns true on
    /// success.
    fn resume(&mut self) -> bool {
        true
    }
}

/// Assumes the network is always up.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultNetwork;

impl NetworkHandler for DefaultNetwork {}

/// Rate-limits reconnect attempts according to a [`ReconnectPolicy`].
#[derive(Debug, Clone)]
pub struct ReconnectGate {
    policy: ReconnectPolicy,
    last_attempt: Option<DateTime<Utc>>,
}

impl ReconnectGate {
    /// Creates a gate with no attempt recorded.
    #[must_use]
    pub const fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            last_attempt: None,
        }
    }

    /// Records an attempt at `now` if the policy allows one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConnected`] when reconnecting is disabled and
    /// [`Error::ReconnectCooldown`] inside the cooldown window.
    pub fn try_acquire(&mut self, now: DateTime<Utc>) -> Result<()> {
        if !self.policy.enabled {
            return Err(Error::NotConnected);
        }
        if let Some(last) = self.last_attempt
            && let Ok(elapsed) = (now - last).to_std()
            && elapsed < self.policy.cooldown
        {
            let remaining = self.policy.cooldown - elapsed;
            debug!(?remaining, "reconnect suppressed");
            return Err(Error::ReconnectCooldown(remaining));
        }
        self.last_attempt = Some(now);
        Ok(())
    }

    /// Forgets the last attempt.
    pub fn reset(&mut self) {
        self.last_attempt = None;
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
    use chrono::TimeZone;
    use std::time::Duration;

    #[test]
    fn test_cooldown() {
        let mut gate = ReconnectGate::new(ReconnectPolicy::default());
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert!(gate.try_acquire(t0).is_ok());
        let err = gate.try_acquire(t0 + chrono::Duration::seconds(4)).unwrap_err();
        assert!(matches!(err, Error::ReconnectCooldown(d) if d == Duration::from_secs(6)));
        assert!(gate.try_acquire(t0 + chrono::Duration::seconds(10)).is_ok());
    }

    #[test]
    fn test_disabled() {
        let mut gate = ReconnectGate::new(ReconnectPolicy {
            enabled: false,
            cooldown: Duration::ZERO,
        });
        assert!(matches!(gate.try_acquire(Utc::now()), Err(Error::NotConnected)));
    }
}
