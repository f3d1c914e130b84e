//! `tracing` subscriber setup.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter variable checked before `RUST_LOG`.
pub const LOG_ENV: &str = "EMBERMAIL_LOG";

/// Filter used when neither variable is set.
pub const DEFAULT_FILTER: &str = "info";

/// Installs a formatted subscriber filtered by `EMBERMAIL_LOG`, then
/// `RUST_LOG`, then [`DEFAULT_FILTER`].
///
/// Calling it again, or after another subscriber was installed, does
/// nothing.
pub fn init_logging() {
    let directives = filter_directives(
        std::env::var(LOG_ENV).ok(),
        std::env::var(EnvFilter::DEFAULT_ENV).ok(),
    );
    let filter = EnvFilter::try_new(&directives).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

fn filter_directives(primary: Option<String>, fallback: Option<String>) -> String {
    [primary, fallback]
        .into_iter()
        .flatten()
        .find(|value| !value.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_FILTER.to_string())
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
    fn test_filter_precedence() {
        assert_eq!(
            filter_directives(Some("embermail_imap=trace".into()), Some("warn".into())),
            "embermail_imap=trace"
        );
        assert_eq!(filter_directives(None, Some("warn".into())), "warn");
        assert_eq!(filter_directives(Some("  ".into()), None), "info");
        assert_eq!(filter_directives(None, None), DEFAULT_FILTER);
    }

    #[test]
    fn test_init_twice() {
        init_logging();
        init_logging();
    }
}
