// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Request authorization.
//
// Identity comes from HTTP Basic credentials checked against the config's
// credential table (the actual account store, PAM or htpasswd, is an
// external concern feeding that table).  Policies bind operations to
// groups; a missing identity surfaces as HTTP 401, a wrong group as 403,
// both without an IPP body.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use platen_core::error::Result;
use platen_core::{PlatenError, ServerConfig};

/// Authorization policy for an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy<'a> {
    /// No credentials needed.
    Public,
    /// Any authenticated user.
    Authenticated,
    /// Member of the named group.
    Group(&'a str),
}

/// Verify an HTTP `Authorization: Basic ...` header value against the
/// credential table.  Returns the authenticated username.
pub fn verify_basic(config: &ServerConfig, header_value: &str) -> Option<String> {
    let encoded = header_value.strip_prefix("Basic ")?.trim();
    let decoded = BASE64.decode(encoded).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, password) = decoded.split_once(':')?;
    (config.credentials.get(user).map(String::as_str) == Some(password))
        .then(|| user.to_string())
}

/// Apply a policy to an (optional) authenticated username.
pub fn authorize(config: &ServerConfig, username: Option<&str>, policy: Policy<'_>) -> Result<()> {
    match policy {
        Policy::Public => Ok(()),
        Policy::Authenticated => {
            username.map(|_| ()).ok_or(PlatenError::Unauthorized)
        }
        Policy::Group(group) => {
            let user = username.ok_or(PlatenError::Unauthorized)?;
            if config.user_in_group(user, group) {
                Ok(())
            } else {
                Err(PlatenError::Forbidden)
            }
        }
    }
}

/// The policy for administrative operations: the configured admin group,
/// or open when none is configured (single-operator deployments).
pub fn admin_policy(config: &ServerConfig) -> Policy<'_> {
    match &config.admin_group {
        Some(group) => Policy::Group(group),
        None => Policy::Public,
    }
}

/// Whether the user may act as an administrator.  With no admin group
/// configured, administration is open (single-operator deployments).
pub fn is_admin(config: &ServerConfig, username: Option<&str>) -> bool {
    match &config.admin_group {
        None => true,
        Some(group) => username.is_some_and(|u| config.user_in_group(u, group)),
    }
}

/// Job attributes hidden from non-owners.
pub fn privacy_attributes() -> std::collections::HashSet<String> {
    ["job-name", "job-originating-user-name", "document-name", "document-metadata"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ServerConfig {
        let mut config = ServerConfig::default();
        config.admin_group = Some("admin".into());
        config.proxy_group = Some("proxy".into());
        config.users.insert("alice".into(), vec!["admin".into()]);
        config.users.insert("bob".into(), vec!["proxy".into()]);
        config.credentials.insert("alice".into(), "secret".into());
        config
    }

    fn basic(user: &str, password: &str) -> String {
        format!("Basic {}", BASE64.encode(format!("{user}:{password}")))
    }

    #[test]
    fn basic_credentials_verify_against_table() {
        let config = config();
        assert_eq!(
            verify_basic(&config, &basic("alice", "secret")).as_deref(),
            Some("alice")
        );
        assert_eq!(verify_basic(&config, &basic("alice", "wrong")), None);
        assert_eq!(verify_basic(&config, &basic("eve", "secret")), None);
        assert_eq!(verify_basic(&config, "Bearer abc"), None);
        assert_eq!(verify_basic(&config, "Basic !!!not-base64"), None);
    }

    #[test]
    fn policies() {
        let config = config();
        assert!(authorize(&config, None, Policy::Public).is_ok());
        assert!(matches!(
            authorize(&config, None, Policy::Authenticated),
            Err(PlatenError::Unauthorized)
        ));
        assert!(authorize(&config, Some("bob"), Policy::Authenticated).is_ok());
        assert!(authorize(&config, Some("alice"), Policy::Group("admin")).is_ok());
        assert!(matches!(
            authorize(&config, Some("bob"), Policy::Group("admin")),
            Err(PlatenError::Forbidden)
        ));
        assert!(matches!(
            authorize(&config, None, Policy::Group("admin")),
            Err(PlatenError::Unauthorized)
        ));
    }

    #[test]
    fn admin_is_open_without_a_configured_group() {
        let mut config = config();
        config.admin_group = None;
        assert!(is_admin(&config, None));
        assert!(is_admin(&config, Some("anyone")));

        let config = self::config();
        assert!(is_admin(&config, Some("alice")));
        assert!(!is_admin(&config, Some("bob")));
        assert!(!is_admin(&config, None));
    }

    #[test]
    fn privacy_attributes_cover_identifying_names() {
        let private = privacy_attributes();
        assert!(private.contains("job-name"));
        assert!(private.contains("job-originating-user-name"));
        assert!(private.contains("document-name"));
    }
}
