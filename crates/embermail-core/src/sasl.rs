//! SASL initial responses.
//!
//! Implements:
//! - PLAIN (RFC 4616)
//! - LOGIN (the legacy two-step username/password exchange)
//! - XOAUTH2 (Google/Microsoft proprietary)
//! - OAUTHBEARER (RFC 7628)

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// Generates the PLAIN initial response.
///
/// Format: `\0<username>\0<password>` (base64 encoded). The empty first
/// field means the authorization identity equals the login.
///
/// ```
/// use embermail_core::sasl::plain_response;
///
/// assert_eq!(plain_response("user", "pass"), "AHVzZXIAcGFzcw==");
/// ```
#[must_use]
pub fn plain_response(username: &str, password: &str) -> String {
    let auth_string = format!("\0{username}\0{password}");
    STANDARD.encode(auth_string.as_bytes())
}

/// Encodes one LOGIN step (the username or the password).
#[must_use]
pub fn login_encode(value: &str) -> String {
    STANDARD.encode(value.as_bytes())
}

/// Generates the XOAUTH2 initial response.
///
/// Format: `user=<user>\x01auth=Bearer <token>\x01\x01`
#[must_use]
pub fn xoauth2_response(user: &str, token: &str) -> String {
    let auth_string = format!("user={user}\x01auth=Bearer {token}\x01\x01");
    STANDARD.encode(auth_string.as_bytes())
}

/// Generates the OAUTHBEARER initial response.
#[must_use]
pub fn oauthbearer_response(user: &str, token: &str) -> String {
    let auth_string = format!("n,a={user},\x01auth=Bearer {token}\x01\x01");
    STANDARD.encode(auth_string.as_bytes())
}

/// Decodes a server challenge, returning its text.
///
/// XOAUTH2 failures arrive as a base64 JSON document in a continuation.
#[must_use]
pub fn decode_challenge(challenge: &str) -> Option<String> {
    let bytes = STANDARD.decode(challenge.trim()).ok()?;
    String::from_utf8(bytes).ok()
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
    fn test_plain_response() {
        let decoded = STANDARD.decode(plain_response("user", "pass")).unwrap();
        assert_eq!(decoded, b"\0user\0pass");
    }

    #[test]
    fn test_login_steps() {
        assert_eq!(login_encode("user@example.com"), "dXNlckBleGFtcGxlLmNvbQ==");
        assert_eq!(login_encode("secret"), "c2VjcmV0");
    }

    #[test]
    fn test_xoauth2_response() {
        let decoded = STANDARD.decode(xoauth2_response("a@b.c", "tok")).unwrap();
        assert_eq!(decoded, b"user=a@b.c\x01auth=Bearer tok\x01\x01");
    }

    #[test]
    fn test_oauthbearer_response() {
        let decoded = STANDARD.decode(oauthbearer_response("a@b.c", "tok")).unwrap();
        assert_eq!(decoded, b"n,a=a@b.c,\x01auth=Bearer tok\x01\x01");
    }

    #[test]
    fn test_decode_challenge() {
        assert_eq!(decode_challenge("VXNlcm5hbWU6").as_deref(), Some("Username:"));
        assert_eq!(decode_challenge("!!"), None);
    }
}
