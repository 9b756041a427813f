//! Tool configuration.
//!
//! Stored as TOML:
//! - Linux/macOS: `~/.config/logscribe/logscribe.toml`
//! - Windows: `%APPDATA%/logscribe/logscribe.toml`
//!
//! Every field has a serde default so a partial file keeps working across
//! releases; a default file is written on first run.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Tool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Root directory for captured logs.
    #[serde(default = "default_log_root")]
    pub log_root: String,

    /// Device-presence polling interval in seconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Continuous all-absent time before the single alert fires, seconds.
    #[serde(default = "default_absence_threshold")]
    pub absence_threshold_secs: u64,

    /// Status aggregation/display refresh interval in seconds.
    #[serde(default = "default_status_interval")]
    pub status_interval_secs: u64,

    /// Log file rotation threshold in bytes.
    #[serde(default = "default_rotate_threshold")]
    pub rotate_threshold_bytes: u64,

    /// Tick interval of synthetic platforms, milliseconds.
    #[serde(default = "default_synthetic_interval")]
    pub synthetic_interval_ms: u64,

    /// Timeout for a single device probe invocation, seconds.
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,

    /// Release manifest location. Empty disables update checking.
    #[serde(default = "default_manifest_url")]
    pub manifest_url: String,

    /// Path to `adb`.
    #[serde(default = "default_adb")]
    pub adb_path: String,

    /// Directory holding the libimobiledevice tools.
    #[serde(default = "default_ios_tools_dir")]
    pub ios_tools_dir: String,

    /// Bundle downloaded into `ios_tools_dir` when the tools are missing.
    /// Empty disables the bootstrap; the tools are then required on PATH.
    #[serde(default)]
    pub ios_tools_url: String,
}

fn default_log_root() -> String {
    "logs".into()
}

fn default_poll_interval() -> u64 {
    5
}

fn default_absence_threshold() -> u64 {
    60
}

fn default_status_interval() -> u64 {
    2
}

fn default_rotate_threshold() -> u64 {
    logscribe_capture::DEFAULT_ROTATE_THRESHOLD
}

fn default_synthetic_interval() -> u64 {
    1000
}

fn default_probe_timeout() -> u64 {
    4
}

fn default_manifest_url() -> String {
    "https://releases.logscribe.dev/manifest.json".into()
}

fn default_adb() -> String {
    "adb".into()
}

fn default_ios_tools_dir() -> String {
    "ios_tools".into()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_root: default_log_root(),
            poll_interval_secs: default_poll_interval(),
            absence_threshold_secs: default_absence_threshold(),
            status_interval_secs: default_status_interval(),
            rotate_threshold_bytes: default_rotate_threshold(),
            synthetic_interval_ms: default_synthetic_interval(),
            probe_timeout_secs: default_probe_timeout(),
            manifest_url: default_manifest_url(),
            adb_path: default_adb(),
            ios_tools_dir: default_ios_tools_dir(),
            ios_tools_url: String::new(),
        }
    }
}

impl Config {
    /// Loads configuration from `path` (or the platform default location),
    /// writing a default file if none exists.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => config_path()?,
        };

        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save(&path)?;
            Ok(config)
        }
    }

    /// Saves the configuration to `path`.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }
}

/// Returns the platform-specific configuration file path.
fn config_path() -> anyhow::Result<PathBuf> {
    #[cfg(windows)]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        Ok(PathBuf::from(appdata).join("logscribe").join("logscribe.toml"))
    }

    #[cfg(not(windows))]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        Ok(PathBuf::from(home)
            .join(".config")
            .join("logscribe")
            .join("logscribe.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let config = Config::default();
        assert_eq!(config.poll_interval_secs, 5);
        assert_eq!(config.absence_threshold_secs, 60);
        assert_eq!(config.rotate_threshold_bytes, 5 * 1024 * 1024);
        assert_eq!(config.adb_path, "adb");
        assert!(config.ios_tools_url.is_empty());
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let config: Config = toml::from_str(r#"log_root = "/data/logs""#).unwrap();
        assert_eq!(config.log_root, "/data/logs");
        assert_eq!(config.poll_interval_secs, 5);
        assert_eq!(config.status_interval_secs, 2);
    }

    #[test]
    fn roundtrip_toml() {
        let mut config = Config::default();
        config.rotate_threshold_bytes = 1024;
        config.manifest_url = "https://example.com/m.json".into();

        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.rotate_threshold_bytes, 1024);
        assert_eq!(parsed.manifest_url, "https://example.com/m.json");
    }

    #[test]
    fn load_creates_default_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("sub").join("logscribe.toml");

        let config = Config::load(Some(&path)).unwrap();
        assert!(path.exists());
        assert_eq!(config.poll_interval_secs, 5);

        // Second load reads the file it just wrote.
        let again = Config::load(Some(&path)).unwrap();
        assert_eq!(again.log_root, config.log_root);
    }
}
