//! Configuration loading and persistence.
//!
//! Handles reading and writing the butler configuration file. Every field
//! can be overridden from the environment so CI runs need no file at all.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::{fs, path::PathBuf, time::Duration};

use crate::api::PlatformVersion;
use crate::constants;
use crate::shell::SystemShell;

/// Configuration for the butler client and privileged peer.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Host the ADB server listens on.
    pub adb_host: String,
    /// Port the ADB server listens on.
    pub adb_port: u16,
    /// Hardware serial of this device, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_serial: Option<String>,
    /// Milliseconds to wait for the privileged peer's handle.
    pub bind_timeout_ms: u64,
    /// Milliseconds to wait for the accessibility service to toggle.
    pub accessibility_timeout_ms: u64,
    /// Platform API level of the target device. Detected when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform_level: Option<u32>,
    /// Executable launched as the privileged peer. Defaults to this binary.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package_path: Option<PathBuf>,
    /// Directory for the announcement and capability sockets.
    pub runtime_dir: PathBuf,
    /// JSON file used as the settings store instead of the `settings` tool.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settings_file: Option<PathBuf>,
    /// Component name of the accessibility service to toggle.
    pub accessibility_service: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            adb_host: constants::DEFAULT_ADB_HOST.to_string(),
            adb_port: constants::DEFAULT_ADB_PORT,
            device_serial: None,
            bind_timeout_ms: constants::DEFAULT_BIND_TIMEOUT.as_millis() as u64,
            accessibility_timeout_ms: constants::ACCESSIBILITY_TIMEOUT.as_millis() as u64,
            platform_level: None,
            package_path: None,
            runtime_dir: std::env::temp_dir(),
            settings_file: None,
            accessibility_service: constants::DEFAULT_ACCESSIBILITY_SERVICE.to_string(),
        }
    }
}

impl Config {
    /// Returns the configuration directory path, creating it if necessary.
    ///
    /// Directory selection priority:
    /// 1. `#[cfg(test)]` (unit tests): `<temp>/butler-test`
    /// 2. `BUTLER_CONFIG_DIR` env var: explicit override
    /// 3. `BUTLER_ENV=test`: `<temp>/butler-test` (integration tests)
    /// 4. Default: platform config dir (Linux: ~/.config/butler)
    pub fn config_dir() -> Result<PathBuf> {
        let dir = {
            #[cfg(test)]
            {
                std::env::temp_dir().join("butler-test")
            }

            #[cfg(not(test))]
            {
                if let Ok(dir) = std::env::var("BUTLER_CONFIG_DIR") {
                    PathBuf::from(dir)
                } else if crate::env::is_any_test() {
                    std::env::temp_dir().join("butler-test")
                } else {
                    dirs::config_dir()
                        .context("Could not determine config directory")?
                        .join("butler")
                }
            }
        };
        fs::create_dir_all(&dir)
            .with_context(|| format!("create config dir: {}", dir.display()))?;
        Ok(dir)
    }

    /// Loads configuration from file, with environment variable overrides.
    pub fn load() -> Result<Self> {
        let mut config = match Self::load_from_file() {
            Ok(config) => config,
            Err(e) => {
                log::debug!("[config] using defaults: {e:#}");
                Self::default()
            }
        };
        config.apply_env_overrides();
        Ok(config)
    }

    fn load_from_file() -> Result<Self> {
        let config_path = Self::config_dir()?.join("config.json");
        if config_path.exists() {
            let content = fs::read_to_string(&config_path)
                .with_context(|| format!("read {}", config_path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("parse {}", config_path.display()))
        } else {
            anyhow::bail!("Config file not found")
        }
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies overrides from any key lookup. Unparseable numbers are ignored.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(host) = lookup("BUTLER_ADB_HOST") {
            self.adb_host = host;
        }

        if let Some(port) = lookup("BUTLER_ADB_PORT").and_then(|v| v.parse().ok()) {
            self.adb_port = port;
        }

        if let Some(serial) = lookup("BUTLER_DEVICE_SERIAL").or_else(|| lookup("ANDROID_SERIAL")) {
            if !serial.is_empty() {
                self.device_serial = Some(serial);
            }
        }

        if let Some(ms) = lookup("BUTLER_BIND_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            self.bind_timeout_ms = ms;
        }

        if let Some(ms) = lookup("BUTLER_ACCESSIBILITY_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            self.accessibility_timeout_ms = ms;
        }

        if let Some(level) = lookup("BUTLER_PLATFORM_LEVEL").and_then(|v| v.parse().ok()) {
            self.platform_level = Some(level);
        }

        if let Some(path) = lookup("BUTLER_PACKAGE_PATH") {
            self.package_path = Some(PathBuf::from(path));
        }

        if let Some(dir) = lookup("BUTLER_RUNTIME_DIR") {
            self.runtime_dir = PathBuf::from(dir);
        }

        if let Some(path) = lookup("BUTLER_SETTINGS_FILE") {
            self.settings_file = Some(PathBuf::from(path));
        }

        if let Some(service) = lookup("BUTLER_ACCESSIBILITY_SERVICE") {
            self.accessibility_service = service;
        }
    }

    /// Persists the current configuration to disk.
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_dir()?.join("config.json");
        fs::write(&config_path, serde_json::to_string_pretty(self)?)?;

        // Set restrictive permissions (owner read/write only)
        #[cfg(unix)]
        fs::set_permissions(&config_path, fs::Permissions::from_mode(0o600))?;

        Ok(())
    }

    /// Bootstrap wait as a [`Duration`].
    pub fn bind_timeout(&self) -> Duration {
        Duration::from_millis(self.bind_timeout_ms)
    }

    /// Accessibility wait as a [`Duration`].
    pub fn accessibility_timeout(&self) -> Duration {
        Duration::from_millis(self.accessibility_timeout_ms)
    }

    /// Platform level of the device behind `shell`.
    ///
    /// A configured level wins; otherwise the device is asked once. A device
    /// that cannot answer is assumed to be at the default level.
    pub fn platform_for(&self, shell: &dyn SystemShell) -> PlatformVersion {
        if let Some(level) = self.platform_level {
            return PlatformVersion(level);
        }
        match PlatformVersion::detect(shell) {
            Ok(platform) => {
                log::debug!("[config] detected platform level {}", platform.0);
                platform
            }
            Err(e) => {
                log::warn!(
                    "[config] platform level unknown ({e}), assuming {}",
                    constants::DEFAULT_PLATFORM_LEVEL
                );
                PlatformVersion(constants::DEFAULT_PLATFORM_LEVEL)
            }
        }
    }
}
