use serde::Deserialize;
use std::path::{Path, PathBuf};

/// File consulted when no `--config` path is given.
pub const DEFAULT_CONFIG_FILE: &str = "pidgraph.toml";

/// Top-level configuration loaded from pidgraph.toml.
#[derive(Debug, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct GrapherConfig {
    pub sampler: SamplerConfig,
    pub resolver: ResolverConfig,
    pub watcher: WatcherConfig,
    pub chart: ChartConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Path to the pidstat binary.
    pub command: PathBuf,
    /// Seconds between samples.
    pub interval_secs: u64,
    /// Upper bound on samples per watch; acts as a safety cap, not the
    /// normal termination path.
    pub max_samples: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// How many times to look for a target before giving up.
    pub max_attempts: u32,
    /// Milliseconds between liveness probes.
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// Milliseconds between task-liveness checks while waiting for watchers.
    pub liveness_poll_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChartConfig {
    pub width: u32,
    pub height: u32,
}

// --- Default implementations ---

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            command: PathBuf::from("/usr/bin/pidstat"),
            interval_secs: 1,
            max_samples: 3600,
        }
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_attempts: 120,
            poll_interval_ms: 1000,
        }
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            liveness_poll_ms: 200,
        }
    }
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            width: 1000,
            height: 480,
        }
    }
}

/// Errors that can occur while loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read the config file.
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The config file is not valid TOML for this schema.
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "failed to read config {}: {}", path.display(), source)
            }
            ConfigError::Parse { path, source } => {
                write!(f, "failed to parse config {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
        }
    }
}

impl GrapherConfig {
    /// Load configuration.
    ///
    /// An explicit `--config` path must exist and parse. Without one, the
    /// default file is used if present, otherwise built-in defaults apply.
    pub fn load(path: Option<&Path>) -> Result<GrapherConfig, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.is_file() {
                    Self::from_file(default)
                } else {
                    Ok(GrapherConfig::default())
                }
            }
        }
    }

    fn from_file(path: &Path) -> Result<GrapherConfig, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config = toml::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
        tracing::debug!(path = %path.display(), "loaded config file");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GrapherConfig::default();
        assert_eq!(config.sampler.command, PathBuf::from("/usr/bin/pidstat"));
        assert_eq!(config.sampler.interval_secs, 1);
        assert_eq!(config.sampler.max_samples, 3600);
        assert_eq!(config.resolver.max_attempts, 120);
        assert_eq!(config.resolver.poll_interval_ms, 1000);
        assert_eq!(config.watcher.liveness_poll_ms, 200);
        assert_eq!(config.chart.width, 1000);
        assert_eq!(config.chart.height, 480);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: GrapherConfig = toml::from_str(
            r#"
            [sampler]
            interval_secs = 5

            [resolver]
            max_attempts = 10
            "#,
        )
        .unwrap();
        assert_eq!(config.sampler.interval_secs, 5);
        assert_eq!(config.sampler.command, PathBuf::from("/usr/bin/pidstat"));
        assert_eq!(config.resolver.max_attempts, 10);
        assert_eq!(config.resolver.poll_interval_ms, 1000);
        assert_eq!(config.chart.width, 1000);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pidgraph.toml");
        std::fs::write(
            &path,
            "[sampler]\ncommand = \"/opt/sysstat/pidstat\"\nmax_samples = 60\n",
        )
        .unwrap();

        let config = GrapherConfig::load(Some(&path)).unwrap();
        assert_eq!(config.sampler.command, PathBuf::from("/opt/sysstat/pidstat"));
        assert_eq!(config.sampler.max_samples, 60);
        assert_eq!(config.sampler.interval_secs, 1);
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.toml");
        let err = GrapherConfig::load(Some(&path)).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
        assert!(err.to_string().contains("failed to read config"));
    }

    #[test]
    fn test_load_invalid_toml_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[sampler]\ninterval_secs = \"fast\"\n").unwrap();
        let err = GrapherConfig::load(Some(&path)).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
