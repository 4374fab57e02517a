// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Server configuration.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Log level forwarded to transform commands via `SERVER_LOGLEVEL`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Info,
    Debug,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Info => "info",
            Self::Debug => "debug",
        }
    }
}

/// Persistent server settings.
///
/// Configuration file loading and CLI tooling live outside the core; this
/// struct is the contract they fill in.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind the IPP listener to.
    pub bind_address: String,
    /// TCP port for the IPP listener.
    pub port: u16,
    /// Host name used when building printer/job URIs.
    pub server_name: String,
    /// Directory for job spool files and resource payloads.
    pub spool_dir: PathBuf,
    /// Transform (RIP) command; relative paths resolve against `bin_dir`.
    pub transform_command: Option<PathBuf>,
    /// Directory for relative transform commands.
    pub bin_dir: PathBuf,
    /// Allow-list of directories `file:` document URIs may reference.
    pub file_directories: Vec<PathBuf>,
    /// Group whose members may perform administrative operations.
    pub admin_group: Option<String>,
    /// Group whose members may perform proxy (output-device) operations.
    pub proxy_group: Option<String>,
    /// If set, job submission requires membership in this group.
    pub print_group: Option<String>,
    /// User name to group memberships.  Group resolution itself (PAM etc.)
    /// is an external concern; this table is what the server consults.
    pub users: HashMap<String, Vec<String>>,
    /// User name to password for HTTP Basic authentication.
    pub credentials: HashMap<String, String>,
    /// Accept the target URI anywhere in the operation group instead of
    /// strictly third (RFC 8011 §4.1.5).
    pub relaxed_conformance: bool,
    /// Maximum jobs queued per printer before `too-many-jobs`.
    pub max_jobs: usize,
    /// Maximum resources allocated to one printer.
    pub max_resources_per_printer: usize,
    /// Event ring capacity per subscription.
    pub max_subscription_events: usize,
    /// Newly created printers start with the hold-new-jobs reason set.
    pub default_hold_new_jobs: bool,
    /// Log level forwarded to transforms.
    pub log_level: LogLevel,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".into(),
            port: 8631,
            server_name: "localhost".into(),
            spool_dir: PathBuf::from("/var/spool/platen"),
            transform_command: None,
            bin_dir: PathBuf::from("/usr/lib/platen"),
            file_directories: Vec::new(),
            admin_group: None,
            proxy_group: None,
            print_group: None,
            users: HashMap::new(),
            credentials: HashMap::new(),
            relaxed_conformance: false,
            max_jobs: 100,
            max_resources_per_printer: 8,
            max_subscription_events: 100,
            default_hold_new_jobs: false,
            log_level: LogLevel::Info,
        }
    }
}

impl ServerConfig {
    /// Load configuration from a JSON file.
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Whether `user` is a member of `group`.
    pub fn user_in_group(&self, user: &str, group: &str) -> bool {
        self.users
            .get(user)
            .is_some_and(|groups| groups.iter().any(|g| g == group))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_sensible() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 8631);
        assert_eq!(config.max_resources_per_printer, 8);
        assert!(!config.relaxed_conformance);
        assert_eq!(config.log_level, LogLevel::Info);
    }

    #[test]
    fn load_partial_config_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(
            file,
            r#"{{"port": 631, "admin_group": "wheel", "users": {{"alice": ["wheel"]}}}}"#
        )
        .expect("write config");

        let config = ServerConfig::load(file.path()).expect("load");
        assert_eq!(config.port, 631);
        assert_eq!(config.admin_group.as_deref(), Some("wheel"));
        assert!(config.user_in_group("alice", "wheel"));
        assert!(!config.user_in_group("alice", "print"));
        assert!(!config.user_in_group("bob", "wheel"));
        // Unspecified fields come from Default.
        assert_eq!(config.bind_address, "0.0.0.0");
    }
}
