//! Configuration types for ftp-inbound
//!
//! The field names follow the property keys handed over by the host framework
//! (`serverType`, `serverFolder`, `numberOfLinesToSkip`, ...), so a property map
//! deserializes straight into [`Config`].

use crate::error::{Error, Result};
use crate::selector::FileSelector;
use crate::utils::{base_name, ensure_trailing_separator, ensure_trailing_slash};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, path::PathBuf, time::Duration};

/// Default FTP control port
pub const FTP_DEFAULT_PORT: u16 = 21;

/// Default SSH port
pub const SFTP_DEFAULT_PORT: u16 = 22;

/// Password sent to FTP servers when none is configured
///
/// Some servers reject a truly empty `PASS` command.
pub const EMPTY_PASSWORD_PLACEHOLDER: &str = "PASS";

/// Remote protocol used to reach the file server
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolKind {
    /// Plain FTP (passive mode)
    #[default]
    Ftp,
    /// SFTP over SSH
    Sftp,
}

impl ProtocolKind {
    /// Port used when the configuration does not name one
    pub fn default_port(self) -> u16 {
        match self {
            ProtocolKind::Ftp => FTP_DEFAULT_PORT,
            ProtocolKind::Sftp => SFTP_DEFAULT_PORT,
        }
    }
}

impl std::fmt::Display for ProtocolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtocolKind::Ftp => write!(f, "ftp"),
            ProtocolKind::Sftp => write!(f, "sftp"),
        }
    }
}

/// When the first tick fires
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScheduleAnchor {
    /// First tick fires as soon as the scheduler is armed
    #[default]
    Immediate,
    /// First tick fires on the next wall-clock multiple of this many seconds
    AlignedSecs(u64),
}

/// Configuration for one inbound transport
///
/// Built once per activation and shared read-only (`Arc<Config>`) with every
/// tick. Call [`Config::normalized`] before use; the transport does this when
/// it starts.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Protocol selector (`ftp` or `sftp`)
    #[serde(rename = "serverType", default)]
    pub protocol: ProtocolKind,

    /// Hostname or IP address of the file server
    pub server: String,

    /// Server port (default: 21 for ftp, 22 for sftp)
    #[serde(default)]
    pub port: Option<u16>,

    /// Login name
    #[serde(default)]
    pub user: String,

    /// Login secret, already decrypted by the host
    #[serde(default)]
    pub password: String,

    /// Private key identity for SFTP authentication
    #[serde(default)]
    pub private_key: Option<PathBuf>,

    /// Passphrase protecting `private_key`
    #[serde(default)]
    pub private_key_passphrase: Option<String>,

    /// Remote directory that is polled (empty = login directory)
    #[serde(default)]
    pub server_folder: String,

    /// Exact file name or glob pattern (`*.txt`)
    #[serde(alias = "fileFormat")]
    pub file_name: String,

    /// Local download directory (default: "./downloads/")
    #[serde(default = "default_local_folder")]
    pub local_folder: PathBuf,

    /// Poll interval, in seconds on the wire (default: 60)
    #[serde(with = "duration_serde", default = "default_frequency")]
    pub frequency: Duration,

    /// Leading lines stripped from every file before delivery
    #[serde(default)]
    pub number_of_lines_to_skip: usize,

    /// Anchor of the first tick
    #[serde(default)]
    pub schedule_anchor: ScheduleAnchor,

    /// Deadline for establishing and authenticating a session (default: 30s)
    #[serde(with = "duration_serde", default = "default_connect_timeout")]
    pub connect_timeout: Duration,

    /// Deadline for each list/fetch/delete command (default: 60s)
    #[serde(with = "duration_serde", default = "default_operation_timeout")]
    pub operation_timeout: Duration,

    /// Largest file that is buffered in memory for delivery (default: 64 MiB)
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: u64,

    /// Use binary (TYPE I) instead of ASCII (TYPE A) FTP transfers
    #[serde(default)]
    pub binary_transfer: bool,

    /// Verify the SFTP host key against `known_hosts` (default: true)
    #[serde(default = "default_true")]
    pub strict_host_key_checking: bool,

    /// known_hosts file used for verification (default: ~/.ssh/known_hosts)
    #[serde(default)]
    pub known_hosts_path: Option<PathBuf>,
}

impl Config {
    /// Build a configuration from the host framework's property map
    ///
    /// `null` values are treated as absent so that defaults apply, matching
    /// how unset properties are reported by the host.
    pub fn from_properties(properties: &HashMap<String, serde_json::Value>) -> Result<Self> {
        let map: serde_json::Map<String, serde_json::Value> = properties
            .iter()
            .filter(|(_, value)| !value.is_null())
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        serde_json::from_value(serde_json::Value::Object(map)).map_err(|e| Error::Config {
            message: format!("invalid transport properties: {}", e),
            key: None,
        })
    }

    /// Parse a configuration from a JSON document using the same keys
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Effective port
    pub fn port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.protocol.default_port())
    }

    /// `host:port` label used in logs and error context
    pub fn address(&self) -> String {
        format!("{}:{}", self.server, self.port())
    }

    /// Private key path, treating an empty property as unset
    pub fn private_key(&self) -> Option<&PathBuf> {
        self.private_key
            .as_ref()
            .filter(|path| !path.as_os_str().is_empty())
    }

    /// Return a copy with directories and the selector normalized
    ///
    /// - `server_folder` ends with `/` unless it is empty
    /// - `local_folder` ends with a path separator
    /// - `file_name` is reduced to its final path component
    pub fn normalized(mut self) -> Self {
        self.server_folder = ensure_trailing_slash(&self.server_folder);
        self.local_folder = ensure_trailing_separator(&self.local_folder);
        self.file_name = base_name(&self.file_name).to_string();
        self
    }

    /// Check that the configuration can drive a transport
    pub fn validate(&self) -> Result<()> {
        if self.server.trim().is_empty() {
            return Err(Error::config("server", "server must not be empty"));
        }
        if self.file_name.trim().is_empty() {
            return Err(Error::config(
                "fileName",
                "a file name or pattern must be configured",
            ));
        }
        if self.frequency.is_zero() {
            return Err(Error::config(
                "frequency",
                "poll frequency must be at least one second",
            ));
        }
        if self.port == Some(0) {
            return Err(Error::config("port", "port must not be 0"));
        }
        if let ScheduleAnchor::AlignedSecs(0) = self.schedule_anchor {
            return Err(Error::config(
                "scheduleAnchor",
                "aligned anchor must be at least one second",
            ));
        }
        FileSelector::new(&self.file_name)?;
        Ok(())
    }
}

// Default value functions
fn default_local_folder() -> PathBuf {
    PathBuf::from("downloads")
}

fn default_frequency() -> Duration {
    Duration::from_secs(60)
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_operation_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_max_payload_bytes() -> u64 {
    64 * 1024 * 1024 // 64 MiB
}

fn default_true() -> bool {
    true
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
