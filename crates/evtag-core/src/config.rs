//! # Configuration
//!
//! One configuration tree for the whole core. Values come from an optional
//! YAML file and are then overridden by `EVTAG_*` environment variables:
//!
//! | Variable | Field |
//! |---|---|
//! | `EVTAG_PORT` | `server.port` |
//! | `EVTAG_MAX_NAME_LEN` | `naming.max_name_len` |
//! | `EVTAG_SUFFIX_RETRY_BOUND` | `naming.suffix_retry_bound` |
//! | `EVTAG_CACHE_TTL_SECS` | `cache.ttl_secs` |
//! | `EVTAG_EXPORT_MAX_CONCURRENT` | `export.max_concurrent` |
//! | `EVTAG_EXPORT_PRESIGN_TTL_SECS` | `export.presign_ttl_secs` |
//! | `EVTAG_LINK_FALLBACK_TTL_SECS` | `export.link_fallback_ttl_secs` |
//! | `EVTAG_DELETE_MODE` | `evidence.delete_mode` (`soft` / `hard`) |
//! | `EVTAG_LOG_FORMAT` | `log.format` (`pretty` / `json`) |
//! | `DATABASE_URL` | `database_url` |

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::kind::DeleteMode;

/// Root configuration.
///
/// Custom `Debug` redacts the database URL, which may embed credentials.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EvtagConfig {
    /// HTTP transport settings.
    pub server: ServerConfig,
    /// Evidence naming limits.
    pub naming: NamingConfig,
    /// Projection cache settings.
    pub cache: CacheConfig,
    /// Exporter settings.
    pub export: ExportConfig,
    /// Evidence lifecycle settings.
    pub evidence: EvidenceConfig,
    /// Logging settings.
    pub log: LogConfig,
    /// Optional Postgres URL. Absent means in-memory only.
    pub database_url: Option<String>,
}

impl std::fmt::Debug for EvtagConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvtagConfig")
            .field("server", &self.server)
            .field("naming", &self.naming)
            .field("cache", &self.cache)
            .field("export", &self.export)
            .field("evidence", &self.evidence)
            .field("log", &self.log)
            .field(
                "database_url",
                &self.database_url.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

/// HTTP transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Port to bind.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 8080 }
    }
}

/// Evidence naming limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NamingConfig {
    /// Maximum evidence name length in characters.
    pub max_name_len: usize,
    /// How many `(N)` candidates are probed before giving up.
    pub suffix_retry_bound: u32,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            max_name_len: 512,
            suffix_retry_bound: 8,
        }
    }
}

/// Projection cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Entry time-to-live in seconds.
    pub ttl_secs: u64,
}

impl CacheConfig {
    /// TTL as a `Duration`.
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 24 * 60 * 60,
        }
    }
}

/// Exporter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Maximum packaging tasks running at once.
    pub max_concurrent: usize,
    /// Lifetime requested for presigned download URLs.
    pub presign_ttl_secs: u64,
    /// Link lifetime used when storage reports no expiry.
    pub link_fallback_ttl_secs: u64,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 4,
            presign_ttl_secs: 3600,
            link_fallback_ttl_secs: 3600,
        }
    }
}

/// Evidence lifecycle settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EvidenceConfig {
    /// How orphaned evidence is removed by `detach`.
    pub delete_mode: DeleteMode,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Configuration loading errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("cannot read config file {path}: {source}")]
    Read {
        /// File path.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The config file is not valid YAML for this schema.
    #[error("invalid config YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    /// An environment override did not parse.
    #[error("invalid value for {var}: \"{value}\"")]
    InvalidEnv {
        /// Variable name.
        var: String,
        /// Raw value.
        value: String,
    },
    /// A value is outside its allowed range.
    #[error("invalid configuration: {0}")]
    OutOfRange(String),
}

impl EvtagConfig {
    /// Parse a YAML document. Missing sections take their defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from an optional file, then apply process environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.display().to_string(),
                    source,
                })?;
                tracing::debug!(path = %path.display(), "loaded configuration file");
                Self::from_yaml_str(&raw)?
            }
            None => Self::default(),
        };
        config.apply_env(|var| std::env::var(var).ok())?;
        Ok(config)
    }

    /// Apply `EVTAG_*` overrides read through `lookup`.
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(v) = parse_env(&lookup, "EVTAG_PORT")? {
            self.server.port = v;
        }
        if let Some(v) = parse_env(&lookup, "EVTAG_MAX_NAME_LEN")? {
            self.naming.max_name_len = v;
        }
        if let Some(v) = parse_env(&lookup, "EVTAG_SUFFIX_RETRY_BOUND")? {
            self.naming.suffix_retry_bound = v;
        }
        if let Some(v) = parse_env(&lookup, "EVTAG_CACHE_TTL_SECS")? {
            self.cache.ttl_secs = v;
        }
        if let Some(v) = parse_env(&lookup, "EVTAG_EXPORT_MAX_CONCURRENT")? {
            self.export.max_concurrent = v;
        }
        if let Some(v) = parse_env(&lookup, "EVTAG_EXPORT_PRESIGN_TTL_SECS")? {
            self.export.presign_ttl_secs = v;
        }
        if let Some(v) = parse_env(&lookup, "EVTAG_LINK_FALLBACK_TTL_SECS")? {
            self.export.link_fallback_ttl_secs = v;
        }
        if let Some(raw) = lookup("EVTAG_DELETE_MODE") {
            self.evidence.delete_mode = match raw.trim().to_ascii_lowercase().as_str() {
                "soft" => DeleteMode::Soft,
                "hard" => DeleteMode::Hard,
                _ => {
                    return Err(ConfigError::InvalidEnv {
                        var: "EVTAG_DELETE_MODE".into(),
                        value: raw,
                    })
                }
            };
        }
        if let Some(raw) = lookup("EVTAG_LOG_FORMAT") {
            self.log.format = match raw.trim().to_ascii_lowercase().as_str() {
                "pretty" => LogFormat::Pretty,
                "json" => LogFormat::Json,
                _ => {
                    return Err(ConfigError::InvalidEnv {
                        var: "EVTAG_LOG_FORMAT".into(),
                        value: raw,
                    })
                }
            };
        }
        if let Some(url) = lookup("DATABASE_URL") {
            if !url.trim().is_empty() {
                self.database_url = Some(url);
            }
        }
        self.validate()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.naming.max_name_len == 0 {
            return Err(ConfigError::OutOfRange(
                "naming.max_name_len must be positive".into(),
            ));
        }
        if self.naming.suffix_retry_bound == 0 {
            return Err(ConfigError::OutOfRange(
                "naming.suffix_retry_bound must be positive".into(),
            ));
        }
        if self.export.max_concurrent == 0 {
            return Err(ConfigError::OutOfRange(
                "export.max_concurrent must be positive".into(),
            ));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &str,
) -> Result<Option<T>, ConfigError> {
    match lookup(var) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv {
                var: var.to_string(),
                value: raw,
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = EvtagConfig::default();
        assert_eq!(config.naming.max_name_len, 512);
        assert_eq!(config.cache.ttl(), Duration::from_secs(86_400));
        assert_eq!(config.export.link_fallback_ttl_secs, 3600);
        assert_eq!(config.evidence.delete_mode, DeleteMode::Hard);
    }

    #[test]
    fn yaml_sections_are_optional() {
        let config = EvtagConfig::from_yaml_str("cache:\n  ttl_secs: 60\n").unwrap();
        assert_eq!(config.cache.ttl_secs, 60);
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn env_overrides_yaml() {
        let mut config = EvtagConfig::from_yaml_str("server:\n  port: 9000\n").unwrap();
        config
            .apply_env(env(&[
                ("EVTAG_PORT", "9100"),
                ("EVTAG_DELETE_MODE", "soft"),
                ("EVTAG_LOG_FORMAT", "json"),
            ]))
            .unwrap();
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.evidence.delete_mode, DeleteMode::Soft);
        assert_eq!(config.log.format, LogFormat::Json);
    }

    #[test]
    fn bad_env_value_is_rejected() {
        let mut config = EvtagConfig::default();
        let err = config
            .apply_env(env(&[("EVTAG_CACHE_TTL_SECS", "forever")]))
            .unwrap_err();
        assert!(err.to_string().contains("EVTAG_CACHE_TTL_SECS"));
    }

    #[test]
    fn zero_concurrency_is_out_of_range() {
        let err = EvtagConfig::from_yaml_str("export:\n  max_concurrent: 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange(_)));
    }

    #[test]
    fn debug_redacts_database_url() {
        let mut config = EvtagConfig::default();
        config
            .apply_env(env(&[("DATABASE_URL", "postgres://user:secret@db/evtag")]))
            .unwrap();
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn load_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "naming:\n  suffix_retry_bound: 3").unwrap();
        let config = EvtagConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.naming.suffix_retry_bound, 3);
    }
}
