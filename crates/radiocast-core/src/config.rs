//! Configuration for Radiocast.
//!
//! One JSON file describes the server, the delay policy, the radio
//! systems/talkgroups, user groups, users (API keys), and downstream
//! relay targets. Defaults apply field-by-field and a handful of
//! environment variables override the file:
//!
//! 1. Built-in defaults
//! 2. Config file (`radiocast.json`)
//! 3. Environment variables (`RADIOCAST_*`, highest priority)

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::access::AccessScope;
use crate::delay::{DelayOverrides, baseline_delay};
use crate::error::{Error, Result};

/// Complete Radiocast configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub delay: DelayPolicyConfig,
    #[serde(default)]
    pub systems: Vec<SystemConfig>,
    #[serde(default)]
    pub groups: Vec<UserGroupConfig>,
    #[serde(default)]
    pub users: Vec<UserConfig>,
    #[serde(default)]
    pub downstreams: Vec<DownstreamConfig>,
}

/// Server-process configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the HTTP/WebSocket listener binds to.
    pub listen_addr: String,
    /// SQLite database file; `None` uses `radiocast.db` in the working
    /// directory.
    pub db_path: Option<PathBuf>,
    pub log_level: String,
    /// Shared secrets accepted on the call-upload endpoint.
    pub ingest_keys: Vec<String>,
    /// Bounded per-listener channel capacity; a full channel drops.
    pub client_channel_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:3000".to_string(),
            db_path: None,
            log_level: "info".to_string(),
            ingest_keys: Vec::new(),
            client_channel_capacity: 64,
        }
    }
}

/// Delay-policy switches.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DelayPolicyConfig {
    /// Global default delay in minutes when neither talkgroup nor
    /// system configures one.
    #[serde(default)]
    pub default_minutes: u32,
    /// When set, the global delay for a call is collapsed to the
    /// minimum delay across currently connected clients with access
    /// (an unauthenticated client counts as zero).
    #[serde(default)]
    pub authenticated_mode: bool,
    /// When set, a failed durable push keeps the in-memory timer armed
    /// instead of releasing the call immediately (fail-closed).
    #[serde(default)]
    pub strict_persistence: bool,
}

/// One configured radio system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    pub ref_id: u32,
    #[serde(default)]
    pub label: String,
    /// Delay in minutes; zero means none configured.
    #[serde(default)]
    pub delay: u32,
    #[serde(default)]
    pub talkgroups: Vec<TalkgroupConfig>,
}

/// One configured talkgroup within a system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TalkgroupConfig {
    pub ref_id: u32,
    #[serde(default)]
    pub label: String,
    /// Delay in minutes; outranks the system delay when non-zero.
    #[serde(default)]
    pub delay: u32,
}

/// A user group: shared delay overrides and access scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserGroupConfig {
    pub name: String,
    #[serde(default)]
    pub overrides: DelayOverrides,
    #[serde(default)]
    pub access: AccessScope,
}

/// One user, identified by API key on the listen and read endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserConfig {
    pub api_key: String,
    #[serde(default)]
    pub name: String,
    /// Optional group name; group overrides apply beneath the user's own.
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub overrides: DelayOverrides,
    #[serde(default)]
    pub access: AccessScope,
}

/// A downstream relay target receiving a filtered copy of every call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownstreamConfig {
    pub url: String,
    pub api_key: String,
    #[serde(default)]
    pub access: AccessScope,
    #[serde(default)]
    pub disabled: bool,
}

impl Config {
    /// Load configuration from a JSON file and apply env overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file {}: {e}", path.display()))
        })?;
        let mut config: Self = serde_json::from_str(&content).map_err(|e| {
            Error::Config(format!("Failed to parse config file {}: {e}", path.display()))
        })?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        for user in &self.users {
            if let Some(group) = &user.group {
                if !self.groups.iter().any(|g| &g.name == group) {
                    return Err(Error::Config(format!(
                        "user {:?} references unknown group {group:?}",
                        user.name
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|name| std::env::var(name).ok());
    }

    /// Apply `RADIOCAST_*` overrides from the given variable lookup.
    /// Environment reads go through this seam so precedence is testable
    /// without mutating process-wide state.
    fn apply_overrides_from(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(val) = var("RADIOCAST_LISTEN_ADDR") {
            self.server.listen_addr = val;
        }
        if let Some(val) = var("RADIOCAST_DB_PATH") {
            self.server.db_path = Some(PathBuf::from(val));
        }
        if let Some(val) = var("RADIOCAST_LOG_LEVEL") {
            self.server.log_level = val;
        }
        if let Some(val) = var("RADIOCAST_DEFAULT_DELAY") {
            if let Ok(n) = val.parse() {
                self.delay.default_minutes = n;
            }
        }
    }

    pub fn system(&self, system_ref: u32) -> Option<&SystemConfig> {
        self.systems.iter().find(|s| s.ref_id == system_ref)
    }

    pub fn talkgroup(&self, system_ref: u32, talkgroup_ref: u32) -> Option<&TalkgroupConfig> {
        self.system(system_ref)?
            .talkgroups
            .iter()
            .find(|t| t.ref_id == talkgroup_ref)
    }

    /// Global baseline delay for a call: talkgroup over system over the
    /// configured default.
    pub fn baseline_for(&self, system_ref: u32, talkgroup_ref: u32) -> u32 {
        let system_delay = self.system(system_ref).map_or(0, |s| s.delay);
        let talkgroup_delay = self.talkgroup(system_ref, talkgroup_ref).map_or(0, |t| t.delay);
        baseline_delay(talkgroup_delay, system_delay, self.delay.default_minutes)
    }

    pub fn user_by_key(&self, api_key: &str) -> Option<&UserConfig> {
        self.users.iter().find(|u| u.api_key == api_key)
    }

    pub fn group_by_name(&self, name: &str) -> Option<&UserGroupConfig> {
        self.groups.iter().find(|g| g.name == name)
    }

    /// The user's delay overrides merged over their group's.
    pub fn overrides_for(&self, user: &UserConfig) -> DelayOverrides {
        let group = user
            .group
            .as_deref()
            .and_then(|name| self.group_by_name(name))
            .map(|g| &g.overrides);
        DelayOverrides::merged(&user.overrides, group)
    }

    /// Whether the key is accepted on the call-upload endpoint. Keys of
    /// configured downstreams are accepted too, so paired instances can
    /// relay to each other with one shared secret.
    pub fn is_ingest_key(&self, key: &str) -> bool {
        self.server.ingest_keys.iter().any(|k| k == key)
            || self.downstreams.iter().any(|d| d.api_key == key)
    }
}
