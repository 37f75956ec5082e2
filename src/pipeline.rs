//! Normalizer → Vectorizer → Classifier bound into one immutable artifact.
//!
//! A [`Pipeline`] can only be produced by fitting a [`PipelineSpec`] or by
//! loading a saved artifact, and it exposes no mutation afterwards. The
//! vocabulary a classifier was trained against therefore always travels with
//! it, and a served model is safe to share between threads as-is.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;
use tracing::{debug, info};
use uuid::Uuid;

use crate::classifier::{ClassifierModel, ClassifierParams};
use crate::errors::{SentimentError, SentimentResult};
use crate::label::SentimentLabel;
use crate::normalizer::TextNormalizer;
use crate::vectorizer::{Vectorizer, VectorizerParams};

pub const ARTIFACT_FORMAT_VERSION: u32 = 1;

/// Everything needed to fit a pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineSpec {
    pub normalizer: TextNormalizer,
    pub vectorizer: VectorizerParams,
    pub classifier: ClassifierParams,
}

impl PipelineSpec {
    pub fn new(
        normalizer: TextNormalizer,
        vectorizer: VectorizerParams,
        classifier: ClassifierParams,
    ) -> Self {
        Self {
            normalizer,
            vectorizer,
            classifier,
        }
    }

    pub fn validate(&self) -> SentimentResult<()> {
        self.vectorizer.validate()?;
        self.classifier.validate()
    }

    /// Fit all three stages on raw comment text. Every call yields a new
    /// artifact id, even for identical input.
    pub fn fit<S: AsRef<str>>(
        &self,
        raw_texts: &[S],
        labels: &[SentimentLabel],
    ) -> SentimentResult<Pipeline> {
        if raw_texts.is_empty() {
            return Err(SentimentError::empty_dataset("no texts to fit the pipeline on"));
        }
        if raw_texts.len() != labels.len() {
            return Err(SentimentError::validation(
                "labels",
                format!("{} texts but {} labels", raw_texts.len(), labels.len()),
            ));
        }

        let normalized = self.normalizer.normalize_all(raw_texts);
        let vectorizer = self.vectorizer.fit(&normalized)?;
        debug!(
            "{} vectorizer fitted with {} features",
            vectorizer.params().name.name(),
            vectorizer.n_features()
        );

        let x = vectorizer.transform_all(&normalized);
        let classifier = self.classifier.fit(&x, labels)?;
        debug!("{} classifier fitted on {} rows", classifier.name(), x.len());

        Ok(Pipeline {
            artifact_id: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            spec: self.clone(),
            vectorizer,
            classifier,
        })
    }
}

/// A fitted, immutable pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    artifact_id: String,
    created_at: DateTime<Utc>,
    spec: PipelineSpec,
    vectorizer: Vectorizer,
    classifier: ClassifierModel,
}

/// On-disk form: the pipeline JSON plus its checksum.
#[derive(Serialize, Deserialize)]
struct ArtifactEnvelope {
    format_version: u32,
    artifact_id: String,
    created_at: DateTime<Utc>,
    sha256: String,
    pipeline: String,
}

impl Pipeline {
    pub fn artifact_id(&self) -> &str {
        &self.artifact_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn spec(&self) -> &PipelineSpec {
        &self.spec
    }

    pub fn vectorizer(&self) -> &Vectorizer {
        &self.vectorizer
    }

    pub fn classifier(&self) -> &ClassifierModel {
        &self.classifier
    }

    /// Predict one label per raw text. An empty batch is a caller error and
    /// is rejected before any stage runs.
    pub fn predict<S: AsRef<str>>(&self, raw_texts: &[S]) -> SentimentResult<Vec<SentimentLabel>> {
        if raw_texts.is_empty() {
            return Err(SentimentError::EmptyInput);
        }
        let normalized = self.spec.normalizer.normalize_all(raw_texts);
        let x = self.vectorizer.transform_all(&normalized);
        Ok(self.classifier.predict(&x))
    }

    /// Serialize to the checksummed artifact format.
    pub fn to_bytes(&self) -> SentimentResult<Vec<u8>> {
        let body = serde_json::to_string(self)
            .map_err(|e| SentimentError::serialization("pipeline body", e))?;
        let envelope = ArtifactEnvelope {
            format_version: ARTIFACT_FORMAT_VERSION,
            artifact_id: self.artifact_id.clone(),
            created_at: self.created_at,
            sha256: sha256_hex(body.as_bytes()),
            pipeline: body,
        };
        serde_json::to_vec_pretty(&envelope)
            .map_err(|e| SentimentError::serialization("pipeline artifact", e))
    }

    pub fn from_bytes(bytes: &[u8]) -> SentimentResult<Self> {
        let envelope: ArtifactEnvelope = serde_json::from_slice(bytes)
            .map_err(|e| SentimentError::serialization("pipeline artifact", e))?;

        if envelope.format_version != ARTIFACT_FORMAT_VERSION {
            return Err(SentimentError::artifact(format!(
                "unsupported artifact format version {}",
                envelope.format_version
            )));
        }
        let actual = sha256_hex(envelope.pipeline.as_bytes());
        if actual != envelope.sha256 {
            return Err(SentimentError::artifact(format!(
                "checksum mismatch for artifact {}: expected {}, got {actual}",
                envelope.artifact_id, envelope.sha256
            )));
        }

        let pipeline: Pipeline = serde_json::from_str(&envelope.pipeline).map_err(|e| {
            SentimentError::artifact(format!(
                "artifact {} holds an invalid pipeline: {e}",
                envelope.artifact_id
            ))
        })?;
        if pipeline.artifact_id != envelope.artifact_id {
            return Err(SentimentError::artifact(
                "artifact id in envelope does not match pipeline body",
            ));
        }
        if pipeline.vectorizer.n_features() != pipeline.classifier.n_features() {
            return Err(SentimentError::artifact(format!(
                "vocabulary has {} features but classifier expects {}",
                pipeline.vectorizer.n_features(),
                pipeline.classifier.n_features()
            )));
        }
        Ok(pipeline)
    }

    /// Write the artifact to `path` and return its id. The file is written
    /// next to the target and renamed into place.
    pub fn save(&self, path: impl AsRef<Path>) -> SentimentResult<String> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| SentimentError::io(format!("creating {}", parent.display()), e))?;
        }
        let bytes = self.to_bytes()?;
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, bytes)
            .map_err(|e| SentimentError::io(format!("writing {}", tmp.display()), e))?;
        fs::rename(&tmp, path)
            .map_err(|e| SentimentError::io(format!("renaming to {}", path.display()), e))?;
        info!("Pipeline {} stored at {:?}", self.artifact_id, path);
        Ok(self.artifact_id.clone())
    }

    pub fn load(path: impl AsRef<Path>) -> SentimentResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SentimentError::artifact_not_found(path.display().to_string()));
        }
        let bytes = fs::read(path)
            .map_err(|e| SentimentError::io(format!("reading {}", path.display()), e))?;
        let pipeline = Self::from_bytes(&bytes)?;
        debug!("Pipeline {} loaded from {:?}", pipeline.artifact_id, path);
        Ok(pipeline)
    }
}

pub(crate) fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}
