//! Training driver: raw dataset in, saved pipeline artifact out.

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use tracing::info;

use crate::config::PipelineConfig;
use crate::dataset::{normalize_and_filter, read_raw_dataset, train_test_split, write_split};
use crate::errors::SentimentResult;
use crate::label::SentimentLabel;
use crate::logging::StageTimer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum TrainingStage {
    NotStarted,
    DataLoaded,
    Split,
    PipelineFit,
    Persisted,
    Done,
}

impl fmt::Display for TrainingStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TrainingStage::NotStarted => "not_started",
            TrainingStage::DataLoaded => "data_loaded",
            TrainingStage::Split => "split",
            TrainingStage::PipelineFit => "pipeline_fit",
            TrainingStage::Persisted => "persisted",
            TrainingStage::Done => "done",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TrainingOutcome {
    pub artifact_id: String,
    pub artifact_path: PathBuf,
    pub train_rows: usize,
    pub test_rows: usize,
    pub n_features: usize,
}

/// Runs the stages strictly in order. A failure leaves `stage()` at the last
/// stage that completed; there is no resume.
pub struct TrainingDriver<'a> {
    config: &'a PipelineConfig,
    stage: TrainingStage,
}

impl<'a> TrainingDriver<'a> {
    pub fn new(config: &'a PipelineConfig) -> Self {
        Self {
            config,
            stage: TrainingStage::NotStarted,
        }
    }

    pub fn stage(&self) -> TrainingStage {
        self.stage
    }

    fn advance(&mut self, next: TrainingStage) {
        info!("Training stage {} -> {}", self.stage, next);
        self.stage = next;
    }

    pub fn run(&mut self) -> SentimentResult<TrainingOutcome> {
        let timer = StageTimer::start("training");
        let dataset = &self.config.dataset;
        let ingestion = &self.config.ingestion;

        let raw = read_raw_dataset(&dataset.url, &dataset.rename_columns)?;
        let rows = normalize_and_filter(raw, &self.config.normalizer, dataset.short_text_tokens)?;
        self.advance(TrainingStage::DataLoaded);

        let (train, test) = train_test_split(rows, dataset.train_size, dataset.seed);
        write_split(&ingestion.processed_train_path, &train)?;
        write_split(&ingestion.processed_test_path, &test)?;
        info!("Split into {} train and {} test rows", train.len(), test.len());
        self.advance(TrainingStage::Split);

        let texts: Vec<&str> = train.iter().map(|row| row.text.as_str()).collect();
        let labels: Vec<SentimentLabel> = train.iter().map(|row| row.target).collect();
        let pipeline = self.config.pipeline_spec().fit(&texts, &labels)?;
        self.advance(TrainingStage::PipelineFit);

        let artifact_path = self.config.pipeline.path.clone();
        let artifact_id = pipeline.save(&artifact_path)?;
        self.advance(TrainingStage::Persisted);

        let outcome = TrainingOutcome {
            artifact_id,
            artifact_path,
            train_rows: train.len(),
            test_rows: test.len(),
            n_features: pipeline.vectorizer().n_features(),
        };
        self.advance(TrainingStage::Done);
        timer.finish();
        Ok(outcome)
    }
}
