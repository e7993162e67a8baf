//! Target configuration.
//!
//! A TOML file describes how to reach the target, how to gain the privileges
//! the control surface requires, where the init system's binaries and
//! control socket live, and the default bounds for every wait.
//!
//! ```toml
//! [target]
//! host = "192.168.7.2"
//! user = "root"
//! identity_file = "~/.ssh/target_ed25519"
//!
//! [privilege]
//! sudo = true
//! password_env = "TARGET_SUDO_PASSWORD"
//!
//! [init]
//! socket_path = "/tmp/crinit-itest.sock"
//!
//! [timeouts]
//! ready = "30s"
//! poll_interval = "100ms"
//! ```
//!
//! Passwords are never stored in the file; `password_env` names the
//! environment variable that holds one.

use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::transport::Privilege;

/// Top-level harness configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct TargetConfig {
    /// How to reach the target.
    #[serde(default)]
    pub target: TargetSection,

    /// Privilege escalation.
    #[serde(default)]
    pub privilege: PrivilegeConfig,

    /// Init system layout on the target.
    #[serde(default)]
    pub init: InitConfig,

    /// Default bounds for waits.
    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

impl TargetConfig {
    /// Loads and validates configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or fails
    /// validation.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parses and validates configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or fails validation.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Serializes configuration to TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Checks cross-field constraints serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] describing the first violation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target.transport == TransportKind::Ssh && self.target.host.trim().is_empty() {
            return Err(ConfigError::Validation(
                "target.host is required for the ssh transport".to_string(),
            ));
        }
        if self.timeouts.poll_interval.is_zero() {
            return Err(ConfigError::Validation(
                "timeouts.poll_interval must be greater than zero".to_string(),
            ));
        }
        if self.timeouts.poll_interval > self.timeouts.ready {
            return Err(ConfigError::Validation(format!(
                "timeouts.poll_interval ({}) exceeds timeouts.ready ({})",
                humantime::format_duration(self.timeouts.poll_interval),
                humantime::format_duration(self.timeouts.ready),
            )));
        }
        if !self.init.socket_path.is_absolute() {
            return Err(ConfigError::Validation(format!(
                "init.socket_path must be absolute, got {}",
                self.init.socket_path.display()
            )));
        }
        if self.init.socket_env.is_empty()
            || !self
                .init
                .socket_env
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(ConfigError::Validation(format!(
                "init.socket_env '{}' is not a valid environment variable name",
                self.init.socket_env
            )));
        }
        Ok(())
    }
}

/// Which transport carries commands to the target.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// OpenSSH, multiplexed over one control master.
    #[default]
    Ssh,
    /// Local `sh -c`.
    Local,
}

/// Connection settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct TargetSection {
    /// Transport kind.
    #[serde(default)]
    pub transport: TransportKind,

    /// Host name or address.
    #[serde(default)]
    pub host: String,

    /// SSH port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Remote user; the ssh client default applies when unset.
    #[serde(default)]
    pub user: Option<String>,

    /// Private key file.
    #[serde(default)]
    pub identity_file: Option<PathBuf>,

    /// Bound on establishing the connection.
    #[serde(default = "default_connect_timeout", with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Control socket of the ssh multiplexing master. A per-process path in
    /// the temp directory is used when unset.
    #[serde(default)]
    pub control_path: Option<PathBuf>,
}

const fn default_port() -> u16 {
    22
}

const fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

impl Default for TargetSection {
    fn default() -> Self {
        Self {
            transport: TransportKind::default(),
            host: String::new(),
            port: default_port(),
            user: None,
            identity_file: None,
            connect_timeout: default_connect_timeout(),
            control_path: None,
        }
    }
}

impl TargetSection {
    /// `user@host`, or just `host` when no user is configured.
    #[must_use]
    pub fn destination(&self) -> String {
        self.user
            .as_ref()
            .map_or_else(|| self.host.clone(), |user| format!("{user}@{}", self.host))
    }
}

/// Privilege escalation settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PrivilegeConfig {
    /// Run control commands through `sudo` (the session user is not root).
    #[serde(default)]
    pub sudo: bool,

    /// Environment variable holding the sudo password.
    #[serde(default)]
    pub password_env: Option<String>,
}

impl PrivilegeConfig {
    /// Resolves the configured privilege level, reading the password from
    /// the environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if `password_env` names a variable
    /// that is not set.
    pub fn resolve(&self) -> Result<Privilege, ConfigError> {
        if !self.sudo {
            return Ok(Privilege::Inherit);
        }
        let password = match &self.password_env {
            Some(var) => {
                let value = std::env::var(var).map_err(|_| {
                    ConfigError::Validation(format!(
                        "privilege.password_env names '{var}', which is not set"
                    ))
                })?;
                Some(SecretString::from(value))
            },
            None => None,
        };
        Ok(Privilege::Sudo { password })
    }
}

/// Init system layout on the target.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct InitConfig {
    /// Control client binary.
    #[serde(default = "default_ctl_binary")]
    pub ctl_binary: String,

    /// Init daemon binary.
    #[serde(default = "default_init_binary")]
    pub init_binary: PathBuf,

    /// Control socket the harness-started instance listens on.
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,

    /// Environment variable that selects the control socket.
    #[serde(default = "default_socket_env")]
    pub socket_env: String,

    /// File capturing the init daemon's stdout and stderr.
    #[serde(default = "default_log_path")]
    pub log_path: PathBuf,

    /// Directory holding task configuration files on the target.
    #[serde(default = "default_task_dir")]
    pub task_dir: PathBuf,

    /// Pass `-v` to every control command.
    #[serde(default)]
    pub verbose: bool,
}

fn default_ctl_binary() -> String {
    "crinit-ctl".to_string()
}

fn default_init_binary() -> PathBuf {
    PathBuf::from("/sbin/crinit")
}

fn default_socket_path() -> PathBuf {
    PathBuf::from("/tmp/crinit-itest.sock")
}

fn default_socket_env() -> String {
    "CRINIT_SOCK".to_string()
}

fn default_log_path() -> PathBuf {
    PathBuf::from("/tmp/crinit-itest.log")
}

fn default_task_dir() -> PathBuf {
    PathBuf::from("/tmp/crinit-itest")
}

impl Default for InitConfig {
    fn default() -> Self {
        Self {
            ctl_binary: default_ctl_binary(),
            init_binary: default_init_binary(),
            socket_path: default_socket_path(),
            socket_env: default_socket_env(),
            log_path: default_log_path(),
            task_dir: default_task_dir(),
            verbose: false,
        }
    }
}

/// Default bounds for waits. Every wait in the harness is bounded.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct TimeoutConfig {
    /// Bound on the control socket appearing after start.
    #[serde(default = "default_ready_timeout", with = "humantime_serde")]
    pub ready: Duration,

    /// Interval between polls.
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,

    /// Bound on a task reaching an expected state.
    #[serde(default = "default_state_timeout", with = "humantime_serde")]
    pub state: Duration,
}

const fn default_ready_timeout() -> Duration {
    Duration::from_secs(30)
}

const fn default_poll_interval() -> Duration {
    Duration::from_millis(100)
}

const fn default_state_timeout() -> Duration {
    Duration::from_secs(10)
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            ready: default_ready_timeout(),
            poll_interval: default_poll_interval(),
            state: default_state_timeout(),
        }
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// I/O error reading configuration file.
    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Validation error.
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

mod humantime_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
