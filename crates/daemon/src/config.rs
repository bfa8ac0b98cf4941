use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database_path: PathBuf,
    pub language_priority: Vec<String>,
    pub path_overrides: Vec<PathOverrideConfig>,
    pub path_mappings: Vec<PathMappingConfig>,
    pub containers: ContainersConfig,
    pub processing: ProcessingConfig,
    pub execution: ExecutionConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathOverrideConfig {
    pub path: String,
    pub language_priority: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathMappingConfig {
    pub remote: PathBuf,
    pub local: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainersConfig {
    pub mkv: bool,
    pub mp4: bool,
}

impl Default for ContainersConfig {
    fn default() -> Self {
        Self {
            mkv: true,
            mp4: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    pub worker_count: usize,
    pub max_mp4_concurrent: usize,
    pub timeout_seconds: u64,
    pub retry_attempts: u32,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            max_mp4_concurrent: 1,
            timeout_seconds: 300,
            retry_attempts: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    pub dry_run: bool,
    pub skip_if_correct: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            skip_if_correct: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("/var/lib/trackd/jobs.db"),
            language_priority: vec!["eng".to_string()],
            path_overrides: Vec::new(),
            path_mappings: Vec::new(),
            containers: ContainersConfig::default(),
            processing: ProcessingConfig::default(),
            execution: ExecutionConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

pub fn load_config(path: Option<&std::path::Path>) -> Result<Config> {
    let config = if let Some(config_path) = path {
        if config_path.exists() {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| anyhow::anyhow!("Failed to read config file: {}", e))?;

            toml::from_str::<Config>(&contents)
                .map_err(|e| anyhow::anyhow!("Failed to parse TOML config: {}", e))?
        } else {
            #[cfg(not(test))]
            tracing::warn!("Config file not found at {:?}, using defaults", config_path);
            Config::default()
        }
    } else {
        #[cfg(not(test))]
        tracing::info!("No config path provided, using defaults");
        Config::default()
    };

    validate_config(&config)?;
    Ok(config)
}

pub fn validate_config(config: &Config) -> Result<()> {
    if config.language_priority.is_empty() {
        anyhow::bail!("language_priority cannot be empty");
    }

    if config.processing.worker_count == 0 {
        anyhow::bail!("processing.worker_count must be at least 1");
    }

    if config.processing.max_mp4_concurrent > config.processing.worker_count {
        anyhow::bail!("processing.max_mp4_concurrent cannot exceed processing.worker_count");
    }

    for over in &config.path_overrides {
        if over.language_priority.is_empty() {
            anyhow::bail!(
                "path_overrides entry for {:?} has an empty language_priority",
                over.path
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn arb_containers() -> impl Strategy<Value = ContainersConfig> {
        (any::<bool>(), any::<bool>()).prop_map(|(mkv, mp4)| ContainersConfig { mkv, mp4 })
    }

    fn arb_processing() -> impl Strategy<Value = ProcessingConfig> {
        (1_usize..16, 1_u64..3600, 0_u32..5).prop_map(
            |(worker_count, timeout_seconds, retry_attempts)| ProcessingConfig {
                worker_count,
                max_mp4_concurrent: 1.min(worker_count),
                timeout_seconds,
                retry_attempts,
            },
        )
    }

    fn arb_execution() -> impl Strategy<Value = ExecutionConfig> {
        (any::<bool>(), any::<bool>())
            .prop_map(|(dry_run, skip_if_correct)| ExecutionConfig { dry_run, skip_if_correct })
    }

    fn arb_config() -> impl Strategy<Value = Config> {
        (
            prop::collection::vec("[a-z]{3}", 1..4),
            arb_containers(),
            arb_processing(),
            arb_execution(),
        )
            .prop_map(
                |(language_priority, containers, processing, execution)| Config {
                    database_path: PathBuf::from("/tmp/trackd-test.db"),
                    language_priority,
                    path_overrides: Vec::new(),
                    path_mappings: Vec::new(),
                    containers,
                    processing,
                    execution,
                    logging: LoggingConfig::default(),
                },
            )
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Any valid config survives a TOML serialize/deserialize round trip unchanged.
        #[test]
        fn prop_config_round_trip(config in arb_config()) {
            let toml_string = toml::to_string(&config)
                .expect("Failed to serialize config to TOML");

            let mut temp_file = NamedTempFile::new().expect("Failed to create temp file");
            temp_file.write_all(toml_string.as_bytes())
                .expect("Failed to write to temp file");
            temp_file.flush().expect("Failed to flush temp file");

            let loaded_config = load_config(Some(temp_file.path()))
                .expect("Failed to load config from file");

            prop_assert_eq!(config, loaded_config);
        }
    }

    #[test]
    fn missing_config_file_uses_defaults() {
        let non_existent_path = PathBuf::from("/tmp/non_existent_trackd_config_12345.toml");
        let config = load_config(Some(&non_existent_path)).expect("Should load defaults");
        assert_eq!(config, Config::default());
    }

    #[test]
    fn no_config_path_uses_defaults() {
        let config = load_config(None).expect("Should load defaults");
        assert_eq!(config, Config::default());
    }

    #[test]
    fn invalid_toml_syntax_is_rejected() {
        let mut temp_file = NamedTempFile::new().expect("Failed to create temp file");
        temp_file
            .write_all(b"this is not valid TOML {{{")
            .expect("Failed to write");
        temp_file.flush().expect("Failed to flush");

        let result = load_config(Some(temp_file.path()));
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("parse TOML"));
    }

    #[test]
    fn partial_config_falls_back_to_defaults_for_missing_fields() {
        let mut temp_file = NamedTempFile::new().expect("Failed to create temp file");
        let partial_toml = r#"
language_priority = ["jpn", "eng"]
"#;
        temp_file
            .write_all(partial_toml.as_bytes())
            .expect("Failed to write");
        temp_file.flush().expect("Failed to flush");

        let config = load_config(Some(temp_file.path())).expect("Should load partial config");

        assert_eq!(config.language_priority, vec!["jpn", "eng"]);
        assert_eq!(
            config.processing.worker_count,
            Config::default().processing.worker_count
        );
    }

    #[test]
    fn validation_rejects_empty_language_priority() {
        let config = Config {
            language_priority: vec![],
            ..Config::default()
        };
        let result = validate_config(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("language_priority"));
    }

    #[test]
    fn validation_rejects_zero_worker_count() {
        let config = Config {
            processing: ProcessingConfig {
                worker_count: 0,
                ..ProcessingConfig::default()
            },
            ..Config::default()
        };
        let result = validate_config(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("worker_count"));
    }

    #[test]
    fn validation_rejects_mp4_cap_above_worker_count() {
        let config = Config {
            processing: ProcessingConfig {
                worker_count: 2,
                max_mp4_concurrent: 3,
                ..ProcessingConfig::default()
            },
            ..Config::default()
        };
        let result = validate_config(&config);
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("max_mp4_concurrent"));
    }
}
