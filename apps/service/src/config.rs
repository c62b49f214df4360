use std::collections::BTreeMap;
use std::time::Duration;
use std::{env, fs, path};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::monitor::types::DebouncePolicy;
use crate::store::GroupHosts;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Read(std::io::Error),
    #[error("failed to write config: {0}")]
    Write(std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("no config path available ($XDG_CONFIG_HOME and $HOME both unset)")]
    PathUnavailable,
}

/// Process-lifetime monitor configuration.
#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub monitor: MonitorSettings,
    pub persistence: PersistenceSettings,
    /// Any `[groups.<name>]` section defines a monitored group; its
    /// `hosts` table is the baked-in seed set persisted overrides merge
    /// into.
    pub groups: BTreeMap<String, GroupSettings>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    /// Consecutive failed probes before a host is declared down.
    pub failure_threshold: u32,
    /// Minimum seconds between repeated alerts for a host that stays down.
    pub persistent_alert_cooldown_secs: u64,
    /// Per-attempt probe timeout, seconds.
    pub probe_timeout_secs: u64,
    /// Concurrent probes per scheduler round.
    pub max_concurrent_probes: usize,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            persistent_alert_cooldown_secs: 600,
            probe_timeout_secs: 2,
            max_concurrent_probes: 20,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceSettings {
    pub hosts_file: path::PathBuf,
}

impl Default for PersistenceSettings {
    fn default() -> Self {
        Self { hosts_file: path::PathBuf::from("hosts.json") }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupSettings {
    pub interval_secs: u64,
    pub hosts: BTreeMap<String, String>,
}

impl Default for GroupSettings {
    fn default() -> Self {
        Self { interval_secs: 5, hosts: BTreeMap::new() }
    }
}

impl GroupSettings {
    pub fn with_interval(interval: Duration) -> Self {
        Self { interval_secs: interval.as_secs(), hosts: BTreeMap::new() }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        let groups = ["cctv", "corporativo", "servers", "switches"]
            .into_iter()
            .map(|name| (name.to_string(), GroupSettings::default()))
            .collect();
        Self {
            monitor: MonitorSettings::default(),
            persistence: PersistenceSettings::default(),
            groups,
        }
    }
}

/// Used to ensure we are actually reading a toml file
fn normalize_toml_path(path: &path::Path) -> path::PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
        path.set_extension("toml");
    }
    path
}

/// Get default config path ($XDG_CONFIG_HOME/vigia/config.toml or
/// $HOME/.config/...)
fn default_config_path() -> Result<path::PathBuf, ConfigError> {
    let path = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Some(home_dir) = env::home_dir() {
        home_dir.join(".config")
    } else {
        return Err(ConfigError::PathUnavailable);
    };

    Ok(path.join("vigia/config.toml"))
}

impl Config {
    /// Load the configuration, writing a default file first if none
    /// exists at the resolved path.
    pub fn load(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, ConfigError> {
        let config_path: path::PathBuf = if let Some(path) = optional_path {
            normalize_toml_path(path.as_ref())
        } else {
            default_config_path()?
        };

        if config_path.exists() {
            let raw = fs::read_to_string(&config_path).map_err(ConfigError::Read)?;
            Ok(toml::from_str(&raw)?)
        } else {
            let config = Self::default();
            config.write(&config_path)?;
            Ok(config)
        }
    }

    /// Serialize and write the config to a file.
    pub fn write(&self, path: &path::Path) -> Result<(), ConfigError> {
        let raw = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(ConfigError::Write)?;
        }
        fs::write(path, raw).map_err(ConfigError::Write)
    }

    pub fn debounce_policy(&self) -> DebouncePolicy {
        DebouncePolicy {
            failure_threshold: self.monitor.failure_threshold,
            persistent_cooldown: Duration::from_secs(self.monitor.persistent_alert_cooldown_secs),
        }
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.monitor.probe_timeout_secs)
    }

    /// The configured seed hosts, in the store's merge shape.
    pub fn seed_groups(&self) -> GroupHosts {
        self.groups
            .iter()
            .map(|(name, group)| (name.clone(), group.hosts.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_has_the_four_builtin_groups() {
        let config = Config::default();
        for name in ["cctv", "servers", "switches", "corporativo"] {
            assert!(config.groups.contains_key(name), "missing group {name}");
        }
        assert_eq!(config.monitor.failure_threshold, 5);
        assert_eq!(config.monitor.persistent_alert_cooldown_secs, 600);
    }

    #[test]
    fn parses_group_sections_with_seed_hosts() {
        let raw = r#"
            [monitor]
            failure_threshold = 3

            [groups.servers]
            interval_secs = 10
            hosts = { "10.0.0.1" = "web-01" }

            [groups.lab]
            interval_secs = 60
        "#;
        let config: Config = toml::from_str(raw).unwrap();
        assert_eq!(config.monitor.failure_threshold, 3);
        assert_eq!(config.groups["servers"].interval(), Duration::from_secs(10));
        assert_eq!(config.groups["servers"].hosts["10.0.0.1"], "web-01");
        assert!(config.groups.contains_key("lab"));
        // Untouched settings keep their defaults.
        assert_eq!(config.monitor.max_concurrent_probes, 20);
    }

    #[test]
    fn load_writes_a_default_file_on_first_run() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let config = Config::load(Some(&path)).unwrap();
        assert!(path.exists());
        assert_eq!(config.groups.len(), 4);

        // Second load reads the file it just wrote.
        let reread = Config::load(Some(&path)).unwrap();
        assert_eq!(reread.monitor.probe_timeout_secs, config.monitor.probe_timeout_secs);
    }
}
