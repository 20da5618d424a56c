use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::address::AddressScheme;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/clickhouse-backup/config.yml";
pub const CONFIG_ENV: &str = "CLICKHOUSE_BACKUP_CONFIG";

const DEFAULT_LISTEN_HOST: &str = "0.0.0.0";
const DEFAULT_SHARD_HTTP_PORT: u16 = 7171;
const DEFAULT_ENGINE_BINARY: &str = "clickhouse-backup";

/// Agent configuration. Sections this crate does not know about are ignored,
/// so the engine's own config file can be pointed at directly.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub api: ApiConfig,
    pub engine: EngineConfig,
    /// File the config was loaded from; forwarded to the engine.
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Table filter applied when a request names none, e.g. `db.*`.
    pub tables: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub listen_host: String,
    /// Distinct per shard so several agents can share a host.
    pub shard_http_port: u16,
    pub addressing: AddressScheme,
    /// Refuse create/freeze while the shadow directory holds leftovers.
    pub require_clean_shadow: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen_host: DEFAULT_LISTEN_HOST.to_string(),
            shard_http_port: DEFAULT_SHARD_HTTP_PORT,
            addressing: AddressScheme::default(),
            require_clean_shadow: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub binary: String,
    /// Extra arguments placed before every engine command.
    pub args: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            binary: DEFAULT_ENGINE_BINARY.to_string(),
            args: Vec::new(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl Config {
    /// Loads YAML, or TOML when the file has a `.toml` extension.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let is_toml = path.extension().is_some_and(|ext| ext == "toml");
        let mut config: Config = if is_toml {
            toml::from_str(&content).map_err(|source| ConfigError::Toml {
                path: path.to_path_buf(),
                source,
            })?
        } else if content.trim().is_empty() {
            Config::default()
        } else {
            serde_yaml::from_str(&content).map_err(|source| ConfigError::Yaml {
                path: path.to_path_buf(),
                source,
            })?
        };
        config.source = Some(path.to_path_buf());
        Ok(config)
    }

    /// The requested table filter, or the configured default when none was given.
    pub fn table_filter<'a>(&'a self, requested: &'a str) -> &'a str {
        if requested.is_empty() {
            &self.general.tables
        } else {
            requested
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &tempfile::TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn yaml_with_foreign_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "config.yml",
            "general:\n  tables: \"db.*\"\n  remote_storage: s3\nclickhouse:\n  host: localhost\napi:\n  shard_http_port: 7172\n  addressing: kinded\n",
        );

        let config = Config::load(&path).unwrap();
        assert_eq!(config.general.tables, "db.*");
        assert_eq!(config.api.shard_http_port, 7172);
        assert_eq!(config.api.addressing, AddressScheme::Kinded);
        assert_eq!(config.api.listen_host, "0.0.0.0");
        assert!(config.api.require_clean_shadow);
        assert_eq!(config.engine.binary, "clickhouse-backup");
        assert_eq!(config.source.as_deref(), Some(path.as_path()));
    }

    #[test]
    fn toml_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "agent.toml",
            "[api]\nshard_http_port = 7300\nrequire_clean_shadow = false\n\n[engine]\nbinary = \"/usr/bin/clickhouse-backup\"\nargs = [\"--quiet\"]\n",
        );

        let config = Config::load(&path).unwrap();
        assert_eq!(config.api.shard_http_port, 7300);
        assert!(!config.api.require_clean_shadow);
        assert_eq!(config.engine.binary, "/usr/bin/clickhouse-backup");
        assert_eq!(config.engine.args, ["--quiet"]);
    }

    #[test]
    fn empty_file_is_all_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "config.yml", "");
        let config = Config::load(&path).unwrap();
        assert_eq!(config.api.shard_http_port, 7171);
    }

    #[test]
    fn missing_and_malformed_files() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.yml");
        assert!(matches!(
            Config::load(&missing),
            Err(ConfigError::Read { .. })
        ));

        let bad = write(&dir, "config.yml", "api: [not, a, map");
        assert!(matches!(Config::load(&bad), Err(ConfigError::Yaml { .. })));
    }

    #[test]
    fn table_filter_falls_back_to_config() {
        let mut config = Config::default();
        config.general.tables = "db.*".into();
        assert_eq!(config.table_filter(""), "db.*");
        assert_eq!(config.table_filter("other.t"), "other.t");
    }
}
