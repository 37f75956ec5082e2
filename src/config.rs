//! Typed configuration for every stage of the pipeline.
//!
//! Layers, lowest priority first: built-in defaults, the TOML params file,
//! then `SENTIMENT_*` environment variables (`__` separates nested keys, e.g.
//! `SENTIMENT_DATASET__TRAIN_SIZE=0.7`). Unknown keys are rejected so a typo
//! can never be silently ignored.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::classifier::ClassifierParams;
use crate::errors::{SentimentError, SentimentResult};
use crate::logging::LogLevel;
use crate::normalizer::TextNormalizer;
use crate::pipeline::PipelineSpec;
use crate::vectorizer::VectorizerParams;

pub const DEFAULT_PARAMS_PATH: &str = "params.toml";
pub const PARAMS_PATH_ENV: &str = "SENTIMENT_PARAMS_PATH";
pub const ENV_PREFIX: &str = "SENTIMENT_";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    pub dataset: DatasetConfig,
    pub ingestion: IngestionConfig,
    #[serde(default)]
    pub normalizer: TextNormalizer,
    #[serde(default)]
    pub vectorizer: VectorizerParams,
    #[serde(default)]
    pub model: ClassifierParams,
    pub pipeline: ArtifactConfig,
    pub registry: RegistryConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatasetConfig {
    /// Local path or http(s) URL of a CSV / JSON Lines file
    pub url: String,
    #[serde(default = "default_train_size")]
    pub train_size: f64,
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Rows whose normalized text has this many tokens or fewer are dropped
    #[serde(default = "default_short_text_tokens")]
    pub short_text_tokens: usize,
    /// Source column name -> `text` / `target`
    #[serde(default)]
    pub rename_columns: BTreeMap<String, String>,
}

fn default_train_size() -> f64 {
    0.8
}

fn default_seed() -> u64 {
    42
}

fn default_short_text_tokens() -> usize {
    3
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IngestionConfig {
    pub processed_train_path: PathBuf,
    pub processed_test_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArtifactConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegistryConfig {
    pub path: PathBuf,
    pub experiment_name: String,
    pub run_info_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Registry run to serve: a run id or `current`
    pub run: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    pub level: String,
}

#[derive(Serialize)]
struct ConfigDefaults {
    ingestion: IngestionConfig,
    pipeline: ArtifactConfig,
    registry: RegistryConfig,
    server: ServerConfig,
    logging: LoggingConfig,
}

impl Default for ConfigDefaults {
    fn default() -> Self {
        Self {
            ingestion: IngestionConfig {
                processed_train_path: "data/processed/train.csv".into(),
                processed_test_path: "data/processed/test.csv".into(),
            },
            pipeline: ArtifactConfig {
                path: "models/pipeline.json".into(),
            },
            registry: RegistryConfig {
                path: "mlruns/registry".into(),
                experiment_name: "comment-sentiment".into(),
                run_info_path: "run_info.json".into(),
            },
            server: ServerConfig {
                host: "0.0.0.0".into(),
                port: 8000,
                run: "current".into(),
            },
            logging: LoggingConfig {
                level: "info".into(),
            },
        }
    }
}

fn base_figment() -> Figment {
    Figment::from(Serialized::defaults(ConfigDefaults::default()))
}

/// Resolve the params file: explicit path, then `SENTIMENT_PARAMS_PATH`,
/// then `params.toml` in the working directory.
pub fn resolve_params_path(explicit: Option<&Path>) -> PathBuf {
    match explicit {
        Some(path) => path.to_path_buf(),
        None => std::env::var(PARAMS_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_PARAMS_PATH)),
    }
}

/// Load the full layered configuration. A missing params file is fatal.
pub fn load_config(explicit: Option<&Path>) -> SentimentResult<PipelineConfig> {
    let path = resolve_params_path(explicit);
    if !path.exists() {
        return Err(SentimentError::configuration(format!(
            "params file not found at {}",
            path.display()
        )));
    }
    tracing::info!("Loading params from {:?}", path);

    let figment = base_figment()
        .merge(Toml::file(&path))
        .merge(Env::prefixed(ENV_PREFIX).ignore(&["params_path"]).split("__"));
    PipelineConfig::from_figment(figment)
}

impl PipelineConfig {
    /// Defaults plus the given TOML document, without environment overrides.
    pub fn from_toml_str(document: &str) -> SentimentResult<Self> {
        Self::from_figment(base_figment().merge(Toml::string(document)))
    }

    fn from_figment(figment: Figment) -> SentimentResult<Self> {
        let config: PipelineConfig = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> SentimentResult<()> {
        if self.dataset.url.trim().is_empty() {
            return Err(SentimentError::configuration("dataset.url must be set"));
        }
        let train_size = self.dataset.train_size;
        if !(train_size > 0.0 && train_size < 1.0) {
            return Err(SentimentError::configuration(format!(
                "dataset.train_size must be in (0, 1), got {train_size}"
            )));
        }
        if self.registry.experiment_name.trim().is_empty() {
            return Err(SentimentError::configuration(
                "registry.experiment_name cannot be empty",
            ));
        }
        if self.server.run.trim().is_empty() {
            return Err(SentimentError::configuration("server.run cannot be empty"));
        }
        self.logging.level.parse::<LogLevel>()?;
        self.pipeline_spec().validate()
    }

    pub fn pipeline_spec(&self) -> PipelineSpec {
        PipelineSpec::new(self.normalizer, self.vectorizer.clone(), self.model.clone())
    }

    /// Render the effective configuration as TOML.
    pub fn to_toml(&self) -> SentimentResult<String> {
        toml::to_string_pretty(self).map_err(|e| {
            SentimentError::configuration(format!("failed to render configuration: {e}"))
        })
    }
}
