//! Model registry: immutable runs (artifact + metrics + params) and an
//! atomic "current" pointer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::{Db, Transactional, Tree};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info};
use uuid::Uuid;

use crate::errors::{SentimentError, SentimentResult};
use crate::evaluation::EvaluationReport;
use crate::pipeline::Pipeline;

pub const CURRENT_SELECTOR: &str = "current";

const RUNS_TREE: &str = "runs";
const ARTIFACTS_TREE: &str = "artifacts";
const META_TREE: &str = "meta";
const CURRENT_KEY: &[u8] = b"current";

/// A registered run. Never modified after it is written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    /// Monotonic registration order
    pub sequence: u64,
    pub experiment: String,
    pub artifact_id: String,
    pub created_at: DateTime<Utc>,
    pub params: serde_json::Value,
    pub tags: BTreeMap<String, String>,
    pub metrics: BTreeMap<String, f64>,
    pub report: EvaluationReport,
}

/// What a caller supplies to log a run; the registry assigns id and time.
#[derive(Debug, Clone)]
pub struct RunDraft {
    pub experiment: String,
    pub params: serde_json::Value,
    pub tags: BTreeMap<String, String>,
    pub metrics: BTreeMap<String, f64>,
    pub report: EvaluationReport,
}

pub trait ModelRegistry: Send + Sync {
    /// Store the run and its artifact together under a fresh run id.
    fn log_run(&self, draft: RunDraft, pipeline: &Pipeline) -> SentimentResult<RunRecord>;

    fn load_run(&self, run_id: &str) -> SentimentResult<RunRecord>;

    fn load_pipeline(&self, run_id: &str) -> SentimentResult<Pipeline>;

    fn set_current(&self, run_id: &str) -> SentimentResult<()>;

    fn current_run_id(&self) -> SentimentResult<Option<String>>;

    /// All runs, oldest first.
    fn list_runs(&self) -> SentimentResult<Vec<RunRecord>>;

    /// Turn `current` or an explicit run id into a run id.
    fn resolve(&self, selector: &str) -> SentimentResult<String> {
        if selector == CURRENT_SELECTOR {
            self.current_run_id()?
                .ok_or_else(|| SentimentError::artifact_not_found(CURRENT_SELECTOR))
        } else {
            Ok(selector.to_string())
        }
    }
}

/// sled-backed registry with one tree per record kind.
pub struct SledModelRegistry {
    db: Db,
    runs: Tree,
    artifacts: Tree,
    meta: Tree,
}

impl SledModelRegistry {
    pub fn open(path: impl AsRef<Path>) -> SentimentResult<Self> {
        let path = path.as_ref();
        let db = sled::open(path)
            .map_err(|e| SentimentError::registry(format!("opening {}", path.display()), e))?;
        let runs = db.open_tree(RUNS_TREE)?;
        let artifacts = db.open_tree(ARTIFACTS_TREE)?;
        let meta = db.open_tree(META_TREE)?;
        debug!("Model registry opened at {:?}", path);
        Ok(Self {
            db,
            runs,
            artifacts,
            meta,
        })
    }
}

impl ModelRegistry for SledModelRegistry {
    fn log_run(&self, draft: RunDraft, pipeline: &Pipeline) -> SentimentResult<RunRecord> {
        let record = RunRecord {
            run_id: Uuid::new_v4().to_string(),
            sequence: self.db.generate_id()?,
            experiment: draft.experiment,
            artifact_id: pipeline.artifact_id().to_string(),
            created_at: Utc::now(),
            params: draft.params,
            tags: draft.tags,
            metrics: draft.metrics,
            report: draft.report,
        };
        let record_bytes = serde_json::to_vec(&record)
            .map_err(|e| SentimentError::serialization("run record", e))?;
        let artifact_bytes = pipeline.to_bytes()?;
        let key = record.run_id.as_bytes();

        (&self.runs, &self.artifacts)
            .transaction(|(runs, artifacts)| {
                runs.insert(key, record_bytes.as_slice())?;
                artifacts.insert(key, artifact_bytes.as_slice())?;
                Ok::<(), ConflictableTransactionError<()>>(())
            })
            .map_err(|e| match e {
                TransactionError::Storage(err) => SentimentError::registry("log_run", err),
                TransactionError::Abort(()) => {
                    SentimentError::artifact(format!("log_run for {} aborted", record.run_id))
                }
            })?;
        self.db.flush()?;

        info!(
            "Logged run {} ({}) for artifact {}",
            record.run_id, record.experiment, record.artifact_id
        );
        Ok(record)
    }

    fn load_run(&self, run_id: &str) -> SentimentResult<RunRecord> {
        let bytes = self
            .runs
            .get(run_id.as_bytes())?
            .ok_or_else(|| SentimentError::artifact_not_found(run_id))?;
        serde_json::from_slice(&bytes).map_err(|e| SentimentError::serialization("run record", e))
    }

    fn load_pipeline(&self, run_id: &str) -> SentimentResult<Pipeline> {
        let bytes = self
            .artifacts
            .get(run_id.as_bytes())?
            .ok_or_else(|| SentimentError::artifact_not_found(run_id))?;
        Pipeline::from_bytes(&bytes)
    }

    fn set_current(&self, run_id: &str) -> SentimentResult<()> {
        if !self.runs.contains_key(run_id.as_bytes())? {
            return Err(SentimentError::artifact_not_found(run_id));
        }
        self.meta.insert(CURRENT_KEY, run_id.as_bytes())?;
        self.db.flush()?;
        debug!("Current run is now {}", run_id);
        Ok(())
    }

    fn current_run_id(&self) -> SentimentResult<Option<String>> {
        Ok(self
            .meta
            .get(CURRENT_KEY)?
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned()))
    }

    fn list_runs(&self) -> SentimentResult<Vec<RunRecord>> {
        let mut records = self
            .runs
            .iter()
            .values()
            .map(|value| {
                let bytes = value?;
                serde_json::from_slice::<RunRecord>(&bytes)
                    .map_err(|e| SentimentError::serialization("run record", e))
            })
            .collect::<SentimentResult<Vec<_>>>()?;
        records.sort_by_key(|record| record.sequence);
        Ok(records)
    }
}

/// Pointer file written after evaluation: `{run_id, model_path}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunInfo {
    pub run_id: String,
    pub model_path: String,
}

impl RunInfo {
    pub fn save(&self, path: impl AsRef<Path>) -> SentimentResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| SentimentError::io(format!("creating {}", parent.display()), e))?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| SentimentError::serialization("run info", e))?;
        fs::write(path, json)
            .map_err(|e| SentimentError::io(format!("writing {}", path.display()), e))?;
        debug!("Run info saved to {:?}", path);
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> SentimentResult<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .map_err(|e| SentimentError::io(format!("reading {}", path.display()), e))?;
        serde_json::from_str(&json).map_err(|e| SentimentError::serialization("run info", e))
    }
}
