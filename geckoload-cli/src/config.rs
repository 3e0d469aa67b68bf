//! Configuration file support for geckoload.
//!
//! Configuration is loaded from multiple sources with the following priority (highest first):
//! 1. Command-line arguments
//! 2. Environment variables (USBGECKODEVICE, GECKOLOAD_BACKEND)
//! 3. Local config file (./geckoload.toml)
//! 4. Global config file (~/.config/geckoload/config.toml)
//!
//! A file passed with `--config` replaces both files.

use directories::ProjectDirs;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the per-directory config file.
pub const LOCAL_CONFIG_FILE: &str = "geckoload.toml";

/// Connection configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Serial device path (e.g., "/dev/ttyUSB0" or "COM3").
    pub device: Option<String>,
    /// Backend name ("serial" or "ftdi").
    pub backend: Option<String>,
    /// Baud rate for the serial backend.
    pub baud: Option<u32>,
    /// USB vendor ID for the FTDI backend.
    pub vid: Option<u16>,
    /// USB product ID for the FTDI backend.
    pub pid: Option<u16>,
    /// Wait for output to reach the wire after every chunk.
    pub drain_after_write: Option<bool>,
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Connection configuration.
    #[serde(default)]
    pub connection: ConnectionConfig,
}

impl Config {
    /// Load configuration from the global and local files.
    pub fn load() -> Self {
        let mut config = Self::default();

        if let Some(global_path) = Self::global_config_path() {
            if let Some(global_config) = Self::load_from_file(&global_path) {
                debug!("Loaded global config from {}", global_path.display());
                config.merge(global_config);
            }
        }

        // Local config overrides global
        if let Some(local_config) = Self::load_from_file(Path::new(LOCAL_CONFIG_FILE)) {
            debug!("Loaded local config from {LOCAL_CONFIG_FILE}");
            config.merge(local_config);
        }

        config
    }

    /// Load configuration from a specific file path (--config flag).
    pub fn load_from_path(path: &Path) -> Self {
        if let Some(config) = Self::load_from_file(path) {
            debug!("Loaded config from {}", path.display());
            config
        } else {
            warn!(
                "Could not load config from {}, using defaults",
                path.display()
            );
            Self::default()
        }
    }

    fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => Some(config),
                Err(e) => {
                    warn!("Failed to parse config file {}: {}", path.display(), e);
                    None
                },
            },
            Err(e) => {
                warn!("Failed to read config file {}: {}", path.display(), e);
                None
            },
        }
    }

    /// Get the global configuration directory.
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "geckoload").map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the global configuration file path.
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Merge another config into this one. Set values in `other` win.
    fn merge(&mut self, other: Self) {
        let ours = &mut self.connection;
        let theirs = other.connection;

        if theirs.device.is_some() {
            ours.device = theirs.device;
        }
        if theirs.backend.is_some() {
            ours.backend = theirs.backend;
        }
        if theirs.baud.is_some() {
            ours.baud = theirs.baud;
        }
        if theirs.vid.is_some() {
            ours.vid = theirs.vid;
        }
        if theirs.pid.is_some() {
            ours.pid = theirs.pid;
        }
        if theirs.drain_after_write.is_some() {
            ours.drain_after_write = theirs.drain_after_write;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.connection.device.is_none());
        assert!(config.connection.backend.is_none());
        assert!(config.connection.baud.is_none());
        assert!(config.connection.drain_after_write.is_none());
    }

    #[test]
    fn test_config_merge_overrides() {
        let mut base = Config::default();
        base.connection.device = Some("/dev/ttyUSB0".to_string());
        base.connection.baud = Some(115_200);

        let mut other = Config::default();
        other.connection.device = Some("/dev/ttyUSB1".to_string());
        other.connection.backend = Some("ftdi".to_string());
        other.connection.drain_after_write = Some(false);

        base.merge(other);

        assert_eq!(base.connection.device.as_deref(), Some("/dev/ttyUSB1"));
        assert_eq!(base.connection.backend.as_deref(), Some("ftdi"));
        assert_eq!(base.connection.baud, Some(115_200));
        assert_eq!(base.connection.drain_after_write, Some(false));
    }

    #[test]
    fn test_config_merge_does_not_overwrite_with_none() {
        let mut base = Config::default();
        base.connection.device = Some("/dev/ttyUSB0".to_string());
        base.connection.vid = Some(0x0403);

        base.merge(Config::default());

        assert_eq!(base.connection.device.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(base.connection.vid, Some(0x0403));
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
[connection]
device = "/dev/tty.usbserial-GECKUSB0"
backend = "ftdi"
baud = 115200
vid = 0x0403
pid = 0x6001
drain_after_write = false
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        let conn = &config.connection;
        assert_eq!(conn.device.as_deref(), Some("/dev/tty.usbserial-GECKUSB0"));
        assert_eq!(conn.backend.as_deref(), Some("ftdi"));
        assert_eq!(conn.baud, Some(115_200));
        assert_eq!(conn.vid, Some(0x0403));
        assert_eq!(conn.pid, Some(0x6001));
        assert_eq!(conn.drain_after_write, Some(false));
    }

    #[test]
    fn test_config_from_empty_toml() {
        let config: Config = toml::from_str("").unwrap();
        assert!(config.connection.device.is_none());
    }

    #[test]
    fn test_config_rejects_out_of_range_vid() {
        assert!(toml::from_str::<Config>("[connection]\nvid = 70000\n").is_err());
    }

    #[test]
    fn test_load_from_path_valid() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gecko.toml");
        fs::write(&path, "[connection]\ndevice = \"/dev/ttyUSB1\"\n").unwrap();

        let config = Config::load_from_path(&path);
        assert_eq!(config.connection.device.as_deref(), Some("/dev/ttyUSB1"));
    }

    #[test]
    fn test_load_from_path_invalid_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        fs::write(&path, "invalid toml [[[").unwrap();

        let config = Config::load_from_path(&path);
        assert!(config.connection.device.is_none());
    }

    #[test]
    fn test_load_from_path_nonexistent() {
        let config = Config::load_from_path(Path::new("/nonexistent/path/config.toml"));
        assert!(config.connection.device.is_none());
    }

    #[test]
    fn test_global_config_path() {
        if let Some(p) = Config::global_config_path() {
            let s = p.to_string_lossy();
            assert!(s.contains("geckoload"));
            assert!(s.ends_with("config.toml"));
        }
    }
}
