//! Test configuration helpers for loading .env server credentials

use ftp_inbound::Config;
use tempfile::TempDir;

/// Error type for test configuration
#[derive(Debug)]
pub struct ConfigError(pub String);

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Config error: {}", self.0)
    }
}

impl std::error::Error for ConfigError {}

fn required(name: &str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError(format!("{} not set in environment", name)))
}

/// Load file server configuration from environment variables
///
/// Required environment variables:
/// - `INBOUND_HOST` - Server hostname
/// - `INBOUND_USER` - Login name
///
/// Optional environment variables:
/// - `INBOUND_PROTOCOL` - `ftp` or `sftp` (default: ftp)
/// - `INBOUND_PORT` - Server port (default: protocol default)
/// - `INBOUND_PASSWORD` - Login secret (default: empty)
/// - `INBOUND_PRIVATE_KEY` - SFTP key path
/// - `INBOUND_FOLDER` - Remote directory to poll (default: login directory)
/// - `INBOUND_STRICT_HOST_KEY` - `false` to accept unknown SFTP hosts
pub fn load_server_config(local: &TempDir, file_name: &str) -> Result<Config, ConfigError> {
    dotenvy::dotenv().ok();

    let mut properties = serde_json::Map::new();
    properties.insert(
        "serverType".into(),
        std::env::var("INBOUND_PROTOCOL")
            .unwrap_or_else(|_| "ftp".to_string())
            .into(),
    );
    properties.insert("server".into(), required("INBOUND_HOST")?.into());
    properties.insert("user".into(), required("INBOUND_USER")?.into());
    properties.insert(
        "password".into(),
        std::env::var("INBOUND_PASSWORD").unwrap_or_default().into(),
    );
    if let Some(port) = std::env::var("INBOUND_PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
    {
        properties.insert("port".into(), port.into());
    }
    if let Ok(key) = std::env::var("INBOUND_PRIVATE_KEY") {
        properties.insert("privateKey".into(), key.into());
    }
    if let Ok(strict) = std::env::var("INBOUND_STRICT_HOST_KEY") {
        properties.insert("strictHostKeyChecking".into(), (strict != "false").into());
    }
    properties.insert(
        "serverFolder".into(),
        std::env::var("INBOUND_FOLDER").unwrap_or_default().into(),
    );
    properties.insert("fileName".into(), file_name.into());
    properties.insert(
        "localFolder".into(),
        local.path().to_string_lossy().into_owned().into(),
    );
    properties.insert("frequency".into(), 1.into());
    properties.insert("connectTimeout".into(), 15.into());
    properties.insert("operationTimeout".into(), 15.into());

    serde_json::from_value::<Config>(serde_json::Value::Object(properties))
        .map(Config::normalized)
        .map_err(|e| ConfigError(format!("Invalid server config: {}", e)))
}

/// Load server config with an invalid password for auth failure tests
pub fn load_server_config_bad_password(
    local: &TempDir,
    file_name: &str,
) -> Result<Config, ConfigError> {
    let mut config = load_server_config(local, file_name)?;
    config.password = "invalid_password_12345".to_string();
    config.private_key = None;
    Ok(config)
}

/// Check if live test credentials are available
pub fn has_live_credentials() -> bool {
    dotenvy::dotenv().ok();
    std::env::var("INBOUND_HOST").is_ok() && std::env::var("INBOUND_USER").is_ok()
}
