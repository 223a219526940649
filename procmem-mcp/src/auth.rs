//! `x-api-key` inbound request authentication.
//!
//! Kept as small as the contract it enforces: a header shape check and a
//! local-mode bypass. There's no identity store behind it — a well-formed
//! cloud key's user id is the key itself.

use procmem_core::error::Error;

/// User id assigned in local mode, where no GitHub client is configured and
/// auth is bypassed entirely.
pub const LOCAL_USER_ID: &str = "local";

const API_KEY_PREFIX: &str = "ac_";
const API_KEY_SUFFIX_LEN: usize = 24;

/// Whether inbound requests are authenticated at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// No GitHub client configured: every request is `LOCAL_USER_ID`.
    Local,
    /// `x-api-key` header required on every request.
    Cloud,
}

impl AuthMode {
    /// Local mode (no GitHub client configured) bypasses auth entirely.
    /// `github_client_configured` is the caller's own check of whether it
    /// has a GitHub client wired up.
    #[must_use]
    pub fn from_github_client(github_client_configured: bool) -> Self {
        if github_client_configured { AuthMode::Cloud } else { AuthMode::Local }
    }
}

/// Validate the `x-api-key` header (if present) against this mode, returning
/// the caller's user id or [`Error::Auth`].
pub fn authenticate(mode: AuthMode, api_key_header: Option<&str>) -> Result<String, Error> {
    match mode {
        AuthMode::Local => Ok(LOCAL_USER_ID.to_string()),
        AuthMode::Cloud => match api_key_header {
            Some(key) if is_well_formed(key) => Ok(key.to_string()),
            _ => Err(Error::Auth),
        },
    }
}

/// `ac_` followed by exactly 24 alphanumeric characters.
#[must_use]
pub fn is_well_formed(key: &str) -> bool {
    key.strip_prefix(API_KEY_PREFIX)
        .is_some_and(|rest| rest.len() == API_KEY_SUFFIX_LEN && rest.chars().all(|c| c.is_ascii_alphanumeric()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_mode_bypasses_auth_with_sentinel_user() {
        let user = authenticate(AuthMode::Local, None).unwrap();
        assert_eq!(user, LOCAL_USER_ID);
    }

    #[test]
    fn local_mode_ignores_a_present_header_too() {
        let user = authenticate(AuthMode::Local, Some("garbage")).unwrap();
        assert_eq!(user, LOCAL_USER_ID);
    }

    #[test]
    fn cloud_mode_rejects_missing_header() {
        let err = authenticate(AuthMode::Cloud, None).unwrap_err();
        assert_eq!(err.to_string(), "Unauthorized");
    }

    #[test]
    fn cloud_mode_rejects_malformed_key() {
        assert!(authenticate(AuthMode::Cloud, Some("ac_tooshort")).is_err());
        assert!(authenticate(AuthMode::Cloud, Some("wrong_prefix_0123456789012345")).is_err());
    }

    #[test]
    fn cloud_mode_accepts_well_formed_key() {
        let key = format!("ac_{}", "a".repeat(24));
        let user = authenticate(AuthMode::Cloud, Some(&key)).unwrap();
        assert_eq!(user, key);
    }

    #[test]
    fn from_github_client_selects_mode() {
        assert_eq!(AuthMode::from_github_client(false), AuthMode::Local);
        assert_eq!(AuthMode::from_github_client(true), AuthMode::Cloud);
    }
}
