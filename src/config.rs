use crate::{HostdeckError, Result, log_warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostdeckConfig {
    #[serde(default)]
    pub libvirt: LibvirtConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub ui: UiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibvirtConfig {
    /// Connection URI handed to every `virsh` invocation.
    #[serde(default = "default_libvirt_uri")]
    pub uri: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Interval of the volume group refresh timer while a group needs polling.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Mount points that cannot be torn down automatically.
    #[serde(default = "default_protected_mounts")]
    pub protected_mounts: Vec<String>,
    /// Directory holding the LVM2 tools. Resolved through `PATH` when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lvm_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UiConfig {
    #[serde(default = "default_ui_theme")]
    pub theme: String,
    #[serde(default = "default_ui_refresh_interval_seconds")]
    pub refresh_interval_seconds: u64,
}

fn default_libvirt_uri() -> String {
    "qemu:///system".to_string()
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_protected_mounts() -> Vec<String> {
    ["/", "/boot", "/usr", "/var"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_ui_theme() -> String {
    "ocean".to_string()
}

fn default_ui_refresh_interval_seconds() -> u64 {
    5
}

impl Default for LibvirtConfig {
    fn default() -> Self {
        Self {
            uri: default_libvirt_uri(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            protected_mounts: default_protected_mounts(),
            lvm_dir: None,
        }
    }
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            theme: default_ui_theme(),
            refresh_interval_seconds: default_ui_refresh_interval_seconds(),
        }
    }
}

impl StorageConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(100))
    }
}

impl HostdeckConfig {
    /// `$XDG_CONFIG_HOME/hostdeck/config.toml`, or a relative fallback when no
    /// config directory is known.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .map(|dir| dir.join("hostdeck").join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("hostdeck.toml"))
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: HostdeckConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_str(contents: &str) -> Result<Self> {
        let config: HostdeckConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if it exists, otherwise warn and use defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::from_file(path)
        } else {
            log_warn!("Config not found at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.libvirt.uri.trim().is_empty() {
            return Err(HostdeckError::ConfigError(
                "libvirt.uri cannot be empty".to_string(),
            ));
        }
        if self.ui.refresh_interval_seconds == 0 {
            return Err(HostdeckError::ConfigError(
                "ui.refresh_interval_seconds must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn empty_file_yields_defaults() {
        let config = HostdeckConfig::from_str("").unwrap();
        assert_eq!(config.libvirt.uri, "qemu:///system");
        assert_eq!(config.storage.poll_interval_ms, 2000);
        assert_eq!(config.storage.poll_interval(), Duration::from_secs(2));
        assert!(config.storage.protected_mounts.contains(&"/".to_string()));
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = HostdeckConfig::from_str(
            r#"
            [storage]
            poll_interval_ms = 500

            [libvirt]
            uri = "qemu:///session"
            "#,
        )
        .unwrap();
        assert_eq!(config.storage.poll_interval_ms, 500);
        assert_eq!(config.storage.protected_mounts.len(), 4);
        assert_eq!(config.libvirt.uri, "qemu:///session");
        assert_eq!(config.ui.refresh_interval_seconds, 5);
    }

    #[test]
    fn rejects_zero_refresh_interval() {
        let err = HostdeckConfig::from_str("[ui]\nrefresh_interval_seconds = 0\n").unwrap_err();
        assert!(matches!(err, HostdeckError::ConfigError(_)));
    }

    #[test]
    fn save_and_reload() {
        let file = NamedTempFile::new().unwrap();
        let mut config = HostdeckConfig::default();
        config.storage.protected_mounts.push("/srv".to_string());
        config.save_to_file(file.path()).unwrap();

        let loaded = HostdeckConfig::from_file(file.path()).unwrap();
        assert_eq!(loaded.storage.protected_mounts.last().unwrap(), "/srv");
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = HostdeckConfig::load_or_default(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.ui.theme, "ocean");
    }
}
