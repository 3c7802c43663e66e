use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::routing::AllowedHosts;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Data root {path} is unusable: {source}")]
    DataRoot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub server: ServerConfig,
    pub gateway: GatewayConfig,
    pub executor: ExecutorConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub max_request_size_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Directory holding one sub-directory per collection
    pub data_root: PathBuf,
    pub allowed_hosts: AllowedHosts,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Jobs a collection worker buffers before submitters wait
    pub queue_depth: usize,
    /// Seconds without jobs before a worker closes its collection; 0 keeps it open
    pub idle_timeout_secs: u64,
}

/// Partial config as read from a YAML file; absent keys keep the preset value
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub server: ServerOverrides,
    pub gateway: GatewayOverrides,
    pub executor: ExecutorOverrides,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerOverrides {
    pub bind_address: Option<String>,
    pub port: Option<u16>,
    pub max_request_size_bytes: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GatewayOverrides {
    pub data_root: Option<PathBuf>,
    pub allowed_hosts: Option<AllowedHosts>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExecutorOverrides {
    pub queue_depth: Option<usize>,
    pub idle_timeout_secs: Option<u64>,
}

impl AppConfig {
    /// Preset for `APP_ENV`, then the YAML file (if any), then environment variables.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Self::preset(env::var("APP_ENV").ok().as_deref());
        if let Some(path) = file {
            config = config.with_file(&ConfigFile::read(path)?);
        }
        Ok(config.with_env_overrides())
    }

    fn preset(app_env: Option<&str>) -> Self {
        // Set defaults based on environment
        match app_env {
            Some("production") | Some("prod") => Self::production(),
            Some("staging") | Some("stage") => Self::staging(),
            _ => Self::development(),
        }
    }

    pub fn with_file(mut self, file: &ConfigFile) -> Self {
        if let Some(v) = &file.server.bind_address {
            self.server.bind_address = v.clone();
        }
        if let Some(v) = file.server.port {
            self.server.port = v;
        }
        if let Some(v) = file.server.max_request_size_bytes {
            self.server.max_request_size_bytes = v;
        }
        if let Some(v) = &file.gateway.data_root {
            self.gateway.data_root = v.clone();
        }
        if let Some(v) = &file.gateway.allowed_hosts {
            self.gateway.allowed_hosts = v.clone();
        }
        if let Some(v) = file.executor.queue_depth {
            self.executor.queue_depth = v;
        }
        if let Some(v) = file.executor.idle_timeout_secs {
            self.executor.idle_timeout_secs = v;
        }
        self
    }

    fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| env::var(key).ok())
    }

    /// Apply `GATEWAY_*` overrides from `lookup`. Unparsable values are ignored.
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        // Server overrides
        if let Some(v) = lookup("GATEWAY_BIND_ADDRESS") {
            self.server.bind_address = v;
        }
        if let Some(v) = lookup("GATEWAY_PORT").or_else(|| lookup("PORT")) {
            self.server.port = v.parse().unwrap_or(self.server.port);
        }
        if let Some(v) = lookup("GATEWAY_MAX_REQUEST_SIZE_BYTES") {
            self.server.max_request_size_bytes = v.parse().unwrap_or(self.server.max_request_size_bytes);
        }

        // Gateway overrides
        if let Some(v) = lookup("GATEWAY_DATA_ROOT") {
            self.gateway.data_root = PathBuf::from(v);
        }
        if let Some(v) = lookup("GATEWAY_ALLOWED_HOSTS") {
            self.gateway.allowed_hosts = AllowedHosts::from(v);
        }

        // Executor overrides
        if let Some(v) = lookup("GATEWAY_QUEUE_DEPTH") {
            self.executor.queue_depth = v.parse().unwrap_or(self.executor.queue_depth);
        }
        if let Some(v) = lookup("GATEWAY_IDLE_TIMEOUT_SECS") {
            self.executor.idle_timeout_secs = v.parse().unwrap_or(self.executor.idle_timeout_secs);
        }

        self
    }

    /// Create the data root if needed and make it absolute, so the jail check compares
    /// against a fixed prefix.
    pub fn prepare_data_root(&mut self) -> Result<(), ConfigError> {
        let root = self.gateway.data_root.clone();
        std::fs::create_dir_all(&root).map_err(|source| ConfigError::DataRoot {
            path: root.clone(),
            source,
        })?;
        self.gateway.data_root =
            std::fs::canonicalize(&root).map_err(|source| ConfigError::DataRoot {
                path: root.clone(),
                source,
            })?;
        Ok(())
    }

    /// Idle timeout for collection workers, `None` when disabled
    pub fn idle_timeout(&self) -> Option<Duration> {
        match self.executor.idle_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.bind_address, self.server.port)
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 27701,
                max_request_size_bytes: 10 * 1024 * 1024, // 10MB
            },
            gateway: GatewayConfig {
                data_root: PathBuf::from("./collections"),
                allowed_hosts: AllowedHosts::Any,
            },
            executor: ExecutorConfig {
                queue_depth: 64,
                idle_timeout_secs: 300,
            },
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            server: ServerConfig {
                bind_address: "0.0.0.0".to_string(),
                port: 27701,
                max_request_size_bytes: 5 * 1024 * 1024, // 5MB
            },
            gateway: GatewayConfig {
                data_root: PathBuf::from("./collections"),
                allowed_hosts: AllowedHosts::Any,
            },
            executor: ExecutorConfig {
                queue_depth: 64,
                idle_timeout_secs: 300,
            },
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            server: ServerConfig {
                bind_address: "0.0.0.0".to_string(),
                port: 27701,
                max_request_size_bytes: 2 * 1024 * 1024, // 2MB
            },
            gateway: GatewayConfig {
                data_root: PathBuf::from("/var/lib/collection-gateway"),
                allowed_hosts: AllowedHosts::Any,
            },
            executor: ExecutorConfig {
                queue_depth: 256,
                idle_timeout_secs: 600,
            },
        }
    }
}

impl ConfigFile {
    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(text: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_default_development_config() {
        let config = AppConfig::preset(None);
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.gateway.allowed_hosts, AllowedHosts::Any);
        assert_eq!(config.bind_addr(), "127.0.0.1:27701");
    }

    #[test]
    fn test_default_production_config() {
        let config = AppConfig::preset(Some("prod"));
        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.server.bind_address, "0.0.0.0");
        assert_eq!(config.server.max_request_size_bytes, 2 * 1024 * 1024);
    }

    #[test]
    fn env_overrides_win_and_bad_values_are_ignored() {
        let config = AppConfig::preset(None).with_overrides_from(lookup(&[
            ("GATEWAY_PORT", "8080"),
            ("PORT", "9999"),
            ("GATEWAY_ALLOWED_HOSTS", "10.0.0.7"),
            ("GATEWAY_DATA_ROOT", "/srv/anki"),
            ("GATEWAY_QUEUE_DEPTH", "lots"),
        ]));
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.gateway.allowed_hosts, AllowedHosts::Only("10.0.0.7".into()));
        assert_eq!(config.gateway.data_root, PathBuf::from("/srv/anki"));
        assert_eq!(config.executor.queue_depth, 64);
    }

    #[test]
    fn plain_port_is_a_fallback() {
        let config = AppConfig::preset(None).with_overrides_from(lookup(&[("PORT", "4000")]));
        assert_eq!(config.server.port, 4000);
    }

    #[test]
    fn file_overrides_only_what_it_names() {
        let file = ConfigFile::parse(
            "gateway:\n  allowed_hosts: \"*\"\n  data_root: /data\nexecutor:\n  queue_depth: 8\n",
        )
        .unwrap();
        let config = AppConfig::preset(None).with_file(&file);
        assert_eq!(config.gateway.data_root, PathBuf::from("/data"));
        assert_eq!(config.gateway.allowed_hosts, AllowedHosts::Any);
        assert_eq!(config.executor.queue_depth, 8);
        assert_eq!(config.server.port, 27701);
    }

    #[test]
    fn idle_timeout_can_be_tuned_or_disabled() {
        let config = AppConfig::preset(None);
        assert_eq!(config.idle_timeout(), Some(Duration::from_secs(300)));

        let file = ConfigFile::parse("executor:\n  idle_timeout_secs: 30\n").unwrap();
        let config = AppConfig::preset(None).with_file(&file);
        assert_eq!(config.idle_timeout(), Some(Duration::from_secs(30)));

        let config = config.with_overrides_from(lookup(&[("GATEWAY_IDLE_TIMEOUT_SECS", "0")]));
        assert_eq!(config.idle_timeout(), None);
    }

    #[test]
    fn unknown_file_keys_are_rejected() {
        assert!(ConfigFile::parse("gateway:\n  data_rooot: /data\n").is_err());
    }

    #[test]
    fn data_root_is_created_and_made_absolute() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::preset(None);
        config.gateway.data_root = dir.path().join("nested").join("..").join("root");

        config.prepare_data_root().unwrap();
        assert!(config.gateway.data_root.is_absolute());
        assert!(config.gateway.data_root.is_dir());
        assert!(config.gateway.data_root.ends_with("root"));
    }
}
