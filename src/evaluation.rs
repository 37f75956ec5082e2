//! Scoring a persisted pipeline on the held-out split.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use tracing::info;

use crate::config::PipelineConfig;
use crate::dataset::read_split;
use crate::errors::{SentimentError, SentimentResult};
use crate::label::SentimentLabel;
use crate::logging::StageTimer;
use crate::pipeline::Pipeline;
use crate::registry::{ModelRegistry, RunDraft, RunInfo, RunRecord};

/// Counts of (true label, predicted label), rows and columns ordered
/// positive, neutral, negative.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    counts: [[u64; 3]; 3],
}

impl ConfusionMatrix {
    pub fn from_labels(
        truth: &[SentimentLabel],
        predicted: &[SentimentLabel],
    ) -> SentimentResult<Self> {
        if truth.len() != predicted.len() {
            return Err(SentimentError::validation(
                "predicted",
                format!("{} true labels but {} predictions", truth.len(), predicted.len()),
            ));
        }
        let mut counts = [[0u64; 3]; 3];
        for (t, p) in truth.iter().zip(predicted) {
            counts[t.index()][p.index()] += 1;
        }
        Ok(Self { counts })
    }

    pub fn count(&self, truth: SentimentLabel, predicted: SentimentLabel) -> u64 {
        self.counts[truth.index()][predicted.index()]
    }

    pub fn rows(&self) -> &[[u64; 3]; 3] {
        &self.counts
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().flatten().sum()
    }

    pub fn correct(&self) -> u64 {
        (0..3).map(|i| self.counts[i][i]).sum()
    }

    pub fn off_diagonal(&self) -> u64 {
        self.total() - self.correct()
    }

    /// Row sum for a true label.
    pub fn support(&self, label: SentimentLabel) -> u64 {
        self.counts[label.index()].iter().sum()
    }

    /// Column sum for a predicted label.
    pub fn predicted(&self, label: SentimentLabel) -> u64 {
        self.counts.iter().map(|row| row[label.index()]).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelMetrics {
    pub label: SentimentLabel,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub support: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AverageMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub support: u64,
}

/// Per-label precision/recall/F1 for every label that occurs in either the
/// truth or the predictions. Any zero division yields 0.0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub labels: Vec<LabelMetrics>,
    pub accuracy: f64,
    pub macro_avg: AverageMetrics,
    pub weighted_avg: AverageMetrics,
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

impl ClassificationReport {
    pub fn from_confusion(matrix: &ConfusionMatrix) -> Self {
        let labels: Vec<LabelMetrics> = SentimentLabel::ALL
            .iter()
            .copied()
            .filter(|&l| matrix.support(l) > 0 || matrix.predicted(l) > 0)
            .map(|label| {
                let tp = matrix.count(label, label) as f64;
                let precision = ratio(tp, matrix.predicted(label) as f64);
                let recall = ratio(tp, matrix.support(label) as f64);
                LabelMetrics {
                    label,
                    precision,
                    recall,
                    f1_score: ratio(2.0 * precision * recall, precision + recall),
                    support: matrix.support(label),
                }
            })
            .collect();

        let total = matrix.total();
        let n = labels.len() as f64;
        let macro_avg = AverageMetrics {
            precision: ratio(labels.iter().map(|m| m.precision).sum(), n),
            recall: ratio(labels.iter().map(|m| m.recall).sum(), n),
            f1_score: ratio(labels.iter().map(|m| m.f1_score).sum(), n),
            support: total,
        };
        let weighted = |f: fn(&LabelMetrics) -> f64| {
            ratio(
                labels.iter().map(|m| f(m) * m.support as f64).sum(),
                total as f64,
            )
        };
        let weighted_avg = AverageMetrics {
            precision: weighted(|m| m.precision),
            recall: weighted(|m| m.recall),
            f1_score: weighted(|m| m.f1_score),
            support: total,
        };

        Self {
            accuracy: ratio(matrix.correct() as f64, total as f64),
            labels,
            macro_avg,
            weighted_avg,
        }
    }

    pub fn for_label(&self, label: SentimentLabel) -> Option<&LabelMetrics> {
        self.labels.iter().find(|m| m.label == label)
    }

    /// Flat metric names as logged with a registry run.
    pub fn flatten(&self) -> BTreeMap<String, f64> {
        let mut metrics = BTreeMap::new();
        let mut put = |prefix: &str, precision: f64, recall: f64, f1: f64| {
            metrics.insert(format!("test_{prefix}_precision"), precision);
            metrics.insert(format!("test_{prefix}_recall"), recall);
            metrics.insert(format!("test_{prefix}_f1-score"), f1);
        };
        for m in &self.labels {
            put(m.label.name(), m.precision, m.recall, m.f1_score);
        }
        put(
            "macro_avg",
            self.macro_avg.precision,
            self.macro_avg.recall,
            self.macro_avg.f1_score,
        );
        put(
            "weighted_avg",
            self.weighted_avg.precision,
            self.weighted_avg.recall,
            self.weighted_avg.f1_score,
        );
        metrics.insert("test_accuracy".to_string(), self.accuracy);
        metrics
    }
}

/// Everything the evaluation stage produces for one artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub artifact_id: String,
    pub test_rows: usize,
    pub classification: ClassificationReport,
    pub confusion_matrix: ConfusionMatrix,
}

impl EvaluationReport {
    pub fn evaluate(
        artifact_id: impl Into<String>,
        truth: &[SentimentLabel],
        predicted: &[SentimentLabel],
    ) -> SentimentResult<Self> {
        let confusion_matrix = ConfusionMatrix::from_labels(truth, predicted)?;
        Ok(Self {
            artifact_id: artifact_id.into(),
            test_rows: truth.len(),
            classification: ClassificationReport::from_confusion(&confusion_matrix),
            confusion_matrix,
        })
    }
}

#[derive(Debug, Clone)]
pub struct EvaluationOutcome {
    pub run: RunRecord,
    pub run_info: RunInfo,
}

/// Loads the saved pipeline and the test split, registers the scored run
/// and marks it current.
pub struct EvaluationDriver<'a> {
    config: &'a PipelineConfig,
    registry: &'a dyn ModelRegistry,
}

impl<'a> EvaluationDriver<'a> {
    pub fn new(config: &'a PipelineConfig, registry: &'a dyn ModelRegistry) -> Self {
        Self { config, registry }
    }

    pub fn run(&self) -> SentimentResult<EvaluationOutcome> {
        let timer = StageTimer::start("evaluation");

        let pipeline = Pipeline::load(&self.config.pipeline.path)?;
        let test = read_split(&self.config.ingestion.processed_test_path)?;
        if test.is_empty() {
            return Err(SentimentError::empty_dataset("test split has no rows"));
        }

        let texts: Vec<&str> = test.iter().map(|row| row.text.as_str()).collect();
        let truth: Vec<SentimentLabel> = test.iter().map(|row| row.target).collect();
        let predicted = pipeline.predict(&texts)?;
        let report = EvaluationReport::evaluate(pipeline.artifact_id(), &truth, &predicted)?;
        info!(
            "Artifact {} scored accuracy {:.4} on {} rows",
            pipeline.artifact_id(),
            report.classification.accuracy,
            report.test_rows
        );

        let spec = pipeline.spec();
        let draft = RunDraft {
            experiment: self.config.registry.experiment_name.clone(),
            params: json!({
                "normalizer": spec.normalizer,
                "vectorizer": spec.vectorizer,
                "model": spec.classifier,
                "train_size": self.config.dataset.train_size,
                "seed": self.config.dataset.seed,
            }),
            tags: BTreeMap::from([
                ("model_name".to_string(), spec.classifier.name().to_string()),
                (
                    "vectorizer_name".to_string(),
                    spec.vectorizer.name.name().to_string(),
                ),
            ]),
            metrics: report.classification.flatten(),
            report,
        };

        let run = self.registry.log_run(draft, &pipeline)?;
        self.registry.set_current(&run.run_id)?;

        let run_info = RunInfo {
            run_id: run.run_id.clone(),
            model_path: self.config.pipeline.path.display().to_string(),
        };
        run_info.save(&self.config.registry.run_info_path)?;
        info!("Run {} registered and marked current", run.run_id);
        timer.finish();

        Ok(EvaluationOutcome { run, run_info })
    }
}
