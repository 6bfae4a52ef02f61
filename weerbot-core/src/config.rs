use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::model::{ChatId, Coordinates, ReportKind};

pub const DEFAULT_TELEGRAM_API: &str = "https://api.telegram.org";
pub const DEFAULT_WEATHER_URL: &str = "https://weerlive.nl/api/json-data-10min.php";
pub const DEFAULT_UV_URL: &str = "https://api.openuv.io/api/v1/uv";

/// Telegram bot credentials and the chats allowed to use it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub token: String,
    #[serde(default = "default_telegram_api")]
    pub api_base: String,
    /// Chat that receives diagnostics when a run fails.
    pub operator_chat_id: ChatId,
    /// Allow-list applied to recipient files and interactive commands.
    #[serde(default)]
    pub authorized_users: Vec<ChatId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherConfig {
    pub api_key: String,
    /// `"lat,lon"`; used as the weather API location and for the UV lookup.
    pub location: String,
    #[serde(default = "default_weather_url")]
    pub base_url: String,
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UvConfig {
    pub api_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_api_key: Option<String>,
    #[serde(default = "default_uv_url")]
    pub base_url: String,
    #[serde(default = "default_uv_cache")]
    pub cache_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: PathBuf,
    #[serde(default = "default_summary_recipients")]
    pub summary_recipients: PathBuf,
    #[serde(default = "default_details_recipients")]
    pub details_recipients: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            snapshot_path: default_snapshot_path(),
            summary_recipients: default_summary_recipients(),
            details_recipients: default_details_recipients(),
        }
    }
}

/// `scp` destination for the raw weather snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub ssh_key: PathBuf,
    /// `host:port`
    pub server: String,
    pub remote_path: String,
    /// Forward relay failures to the operator chat.
    #[serde(default = "default_true")]
    pub notify_operator: bool,
}

impl RelayConfig {
    /// Split `server` into host and port.
    pub fn host_and_port(&self) -> Result<(&str, u16)> {
        let (host, port) = self
            .server
            .rsplit_once(':')
            .ok_or_else(|| anyhow!("relay server '{}' must be written as host:port", self.server))?;

        if host.is_empty() {
            return Err(anyhow!("relay server '{}' has an empty host", self.server));
        }

        let port = port
            .parse()
            .with_context(|| format!("relay server '{}' has an invalid port", self.server))?;

        Ok((host, port))
    }
}

/// Top-level configuration, loaded once at startup and shared read-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    pub telegram: TelegramConfig,
    pub weather: WeatherConfig,
    pub uv: UvConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relay: Option<RelayConfig>,
}

impl Config {
    /// Load config from `path`, or from the platform default location.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_file_path()?,
        };

        let contents = fs::read_to_string(&path).with_context(|| {
            format!(
                "Failed to read config file: {}\n\
                 Hint: run `weerbot configure` to create one.",
                path.display()
            )
        })?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let cfg: Config = toml::from_str(contents)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Save config to `path`, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Path to the default config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("nl", "weerbot", "weerbot")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Check the settings that cannot be caught by deserialization alone.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        if self.telegram.token.trim().is_empty() {
            problems.push("telegram.token is empty".to_string());
        }
        if self.weather.api_key.trim().is_empty() {
            problems.push("weather.api_key is empty".to_string());
        }
        if self.uv.api_key.trim().is_empty() {
            problems.push("uv.api_key is empty".to_string());
        }
        if let Err(e) = self.coordinates() {
            problems.push(format!("weather.location: {e}"));
        }
        if self.http_timeout_secs == 0 {
            problems.push("http_timeout_secs must be greater than zero".to_string());
        }
        if let Some(relay) = &self.relay {
            if let Err(e) = relay.host_and_port() {
                problems.push(e.to_string());
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(anyhow!("Invalid configuration: {}", problems.join("; ")))
        }
    }

    pub fn coordinates(&self) -> Result<Coordinates> {
        self.weather.location.parse().map_err(|e: String| anyhow!(e))
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.weather.retry_delay_secs)
    }

    pub fn recipients_path(&self, kind: ReportKind) -> &Path {
        match kind {
            ReportKind::Summary => &self.storage.summary_recipients,
            ReportKind::Details => &self.storage.details_recipients,
        }
    }
}

fn default_telegram_api() -> String {
    DEFAULT_TELEGRAM_API.to_string()
}

fn default_weather_url() -> String {
    DEFAULT_WEATHER_URL.to_string()
}

fn default_uv_url() -> String {
    DEFAULT_UV_URL.to_string()
}

fn default_retry_delay_secs() -> u64 {
    60
}

fn default_http_timeout_secs() -> u64 {
    30
}

fn default_uv_cache() -> PathBuf {
    PathBuf::from("uv.json")
}

fn default_snapshot_path() -> PathBuf {
    PathBuf::from("weer_output.json")
}

fn default_summary_recipients() -> PathBuf {
    PathBuf::from("users_lists/users_summary.txt")
}

fn default_details_recipients() -> PathBuf {
    PathBuf::from("users_lists/users_details.txt")
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [telegram]
        token = "123:abc"
        operator_chat_id = 1
        authorized_users = [1, 2]

        [weather]
        api_key = "weer-key"
        location = "52.09,5.12"

        [uv]
        api_key = "uv-key"
    "#;

    #[test]
    fn minimal_config_fills_defaults() {
        let cfg = Config::from_toml(MINIMAL).expect("minimal config must parse");

        assert_eq!(cfg.telegram.api_base, DEFAULT_TELEGRAM_API);
        assert_eq!(cfg.weather.base_url, DEFAULT_WEATHER_URL);
        assert_eq!(cfg.weather.retry_delay_secs, 60);
        assert_eq!(cfg.http_timeout(), Duration::from_secs(30));
        assert_eq!(cfg.uv.cache_path, PathBuf::from("uv.json"));
        assert!(cfg.uv.backup_api_key.is_none());
        assert!(cfg.relay.is_none());
        assert_eq!(
            cfg.recipients_path(ReportKind::Details),
            Path::new("users_lists/users_details.txt")
        );
    }

    #[test]
    fn invalid_location_is_rejected() {
        let contents = MINIMAL.replace("52.09,5.12", "utrecht");
        let err = Config::from_toml(&contents).unwrap_err();
        assert!(err.to_string().contains("weather.location"));
    }

    #[test]
    fn empty_secret_is_rejected() {
        let contents = MINIMAL.replace("uv-key", " ");
        let err = Config::from_toml(&contents).unwrap_err();
        assert!(err.to_string().contains("uv.api_key is empty"));
    }

    #[test]
    fn relay_server_is_split_into_host_and_port() {
        let contents = format!(
            "{MINIMAL}\n[relay]\nssh_key = \"/keys/id\"\nserver = \"user@example.org:2222\"\nremote_path = \"/srv/weer.json\"\n"
        );
        let cfg = Config::from_toml(&contents).unwrap();
        let relay = cfg.relay.expect("relay configured");
        assert!(relay.enabled);
        assert_eq!(relay.host_and_port().unwrap(), ("user@example.org", 2222));
    }

    #[test]
    fn relay_server_without_port_is_rejected() {
        let contents = format!(
            "{MINIMAL}\n[relay]\nssh_key = \"/keys/id\"\nserver = \"example.org\"\nremote_path = \"/srv\"\n"
        );
        assert!(Config::from_toml(&contents).is_err());
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let cfg = Config::from_toml(MINIMAL).unwrap();
        cfg.save(&path).unwrap();

        let loaded = Config::load(Some(&path)).unwrap();
        assert_eq!(loaded.telegram.authorized_users, vec![ChatId(1), ChatId(2)]);
        assert_eq!(loaded.weather.location, "52.09,5.12");
    }
}
