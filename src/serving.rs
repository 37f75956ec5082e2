//! HTTP serving: a lazily loaded, shared pipeline behind an axum router.

use axum::{
    extract::{Query, Request, State},
    http::HeaderValue,
    middleware::{self, Next},
    response::{Json, Response},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::OnceCell;
use tower_http::cors::CorsLayer;
use tracing::{debug, info};
use url::Url;

use crate::api_errors::AppError;
use crate::errors::{SentimentError, SentimentResult};
use crate::label::SentimentLabel;
use crate::pipeline::Pipeline;
use crate::registry::ModelRegistry;

pub const PROCESS_TIME_HEADER: &str = "x-process-time";

/// Where the served pipeline comes from.
#[derive(Clone)]
pub enum ModelSource {
    /// A registry run id, or `current`
    Registry {
        registry: Arc<dyn ModelRegistry>,
        run: String,
    },
    Artifact(PathBuf),
    InMemory(Arc<Pipeline>),
}

impl ModelSource {
    fn load(&self) -> SentimentResult<Arc<Pipeline>> {
        match self {
            ModelSource::Registry { registry, run } => {
                let run_id = registry.resolve(run)?;
                info!("Loading pipeline for run {}", run_id);
                Ok(Arc::new(registry.load_pipeline(&run_id)?))
            }
            ModelSource::Artifact(path) => {
                info!("Loading pipeline from {:?}", path);
                Ok(Arc::new(Pipeline::load(path)?))
            }
            ModelSource::InMemory(pipeline) => Ok(Arc::clone(pipeline)),
        }
    }
}

/// Loads the pipeline at most once; every later call shares the same `Arc`.
pub struct ModelHandle {
    source: ModelSource,
    cell: OnceCell<Arc<Pipeline>>,
}

impl ModelHandle {
    pub fn new(source: ModelSource) -> Self {
        Self {
            source,
            cell: OnceCell::new(),
        }
    }

    pub fn in_memory(pipeline: Pipeline) -> Self {
        Self::new(ModelSource::InMemory(Arc::new(pipeline)))
    }

    pub async fn get(&self) -> SentimentResult<Arc<Pipeline>> {
        let pipeline = self
            .cell
            .get_or_try_init(|| async {
                let source = self.source.clone();
                match tokio::task::spawn_blocking(move || source.load()).await {
                    Ok(loaded) => loaded,
                    Err(e) => Err(SentimentError::artifact(format!(
                        "model loading task failed: {e}"
                    ))),
                }
            })
            .await?;
        Ok(Arc::clone(pipeline))
    }

    pub fn is_loaded(&self) -> bool {
        self.cell.initialized()
    }

    pub fn artifact_id(&self) -> Option<String> {
        self.cell.get().map(|p| p.artifact_id().to_string())
    }
}

#[derive(Clone)]
pub struct AppState {
    pub model: Arc<ModelHandle>,
}

impl AppState {
    pub fn new(model: ModelHandle) -> Self {
        Self {
            model: Arc::new(model),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentInput {
    pub text: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentPrediction {
    pub text: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub sentiment: SentimentLabel,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentimentCount {
    pub positive: usize,
    pub neutral: usize,
    pub negative: usize,
}

impl SentimentCount {
    fn add(&mut self, label: SentimentLabel) {
        match label {
            SentimentLabel::Positive => self.positive += 1,
            SentimentLabel::Neutral => self.neutral += 1,
            SentimentLabel::Negative => self.negative += 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionOutput {
    pub comments: Vec<CommentPrediction>,
    pub sentiment_count: SentimentCount,
}

/// Label every comment, keeping input order.
pub fn classify_comments(
    pipeline: &Pipeline,
    comments: Vec<CommentInput>,
) -> SentimentResult<PredictionOutput> {
    let texts: Vec<&str> = comments.iter().map(|c| c.text.as_str()).collect();
    let labels = pipeline.predict(&texts)?;

    let mut sentiment_count = SentimentCount::default();
    let comments = comments
        .into_iter()
        .zip(labels)
        .map(|(comment, sentiment)| {
            sentiment_count.add(sentiment);
            CommentPrediction {
                text: comment.text,
                timestamp: comment.timestamp,
                sentiment,
            }
        })
        .collect();
    Ok(PredictionOutput {
        comments,
        sentiment_count,
    })
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/predict", post(predict))
        .route("/validate-yt-url", get(validate_yt_url))
        .layer(middleware::from_fn(process_time))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn process_time(request: Request, next: Next) -> Response {
    let started = Instant::now();
    let mut response = next.run(request).await;
    let elapsed = format!("{:.4}", started.elapsed().as_secs_f64());
    if let Ok(value) = HeaderValue::from_str(&elapsed) {
        response.headers_mut().insert(PROCESS_TIME_HEADER, value);
    }
    response
}

async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn healthz() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn readyz(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "ready": state.model.is_loaded(),
        "artifact_id": state.model.artifact_id(),
    }))
}

async fn predict(
    State(state): State<AppState>,
    Json(comments): Json<Vec<CommentInput>>,
) -> Result<Json<PredictionOutput>, AppError> {
    if comments.is_empty() {
        return Err(SentimentError::EmptyInput.into());
    }
    let pipeline = state.model.get().await?;
    let output = classify_comments(&pipeline, comments)?;
    debug!("Classified {} comments", output.comments.len());
    Ok(Json(output))
}

#[derive(Debug, Deserialize)]
struct ValidateQuery {
    url: String,
}

#[derive(Debug, Serialize)]
struct ValidatedUrl {
    message: &'static str,
    url: String,
    video_id: String,
}

async fn validate_yt_url(
    Query(query): Query<ValidateQuery>,
) -> Result<Json<ValidatedUrl>, AppError> {
    let video_id = youtube_video_id(&query.url)?;
    Ok(Json(ValidatedUrl {
        message: "validation passed",
        url: query.url,
        video_id,
    }))
}

/// Extract the video id from `youtube.com/watch?v=<id>`, `youtu.be/<id>` or
/// a scheme-less `youtu.be/<id>`.
pub fn youtube_video_id(raw: &str) -> Result<String, AppError> {
    let invalid = || AppError::unprocessable("This is not a valid youtube video url.");

    let Ok(url) = Url::parse(raw) else {
        return raw
            .strip_prefix("youtu.be/")
            .map(|id| id.trim_matches('/').to_string())
            .filter(|id| !id.is_empty())
            .ok_or_else(invalid);
    };

    match (url.host_str(), url.path()) {
        (Some("youtube.com") | Some("www.youtube.com"), "/watch") => url
            .query_pairs()
            .find(|(key, value)| key == "v" && !value.is_empty())
            .map(|(_, value)| value.into_owned())
            .ok_or_else(|| AppError::unprocessable("validation error, bad youtube video url.")),
        (Some("youtu.be"), path) => Some(path.trim_matches('/'))
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .ok_or_else(invalid),
        _ => Err(invalid()),
    }
}

/// Bind and serve until the process is stopped. The model is loaded before
/// the listener accepts requests.
pub async fn serve(addr: &str, state: AppState) -> SentimentResult<()> {
    let pipeline = state.model.get().await?;
    info!("Serving artifact {}", pipeline.artifact_id());

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| SentimentError::io(format!("binding {addr}"), e))?;
    info!("HTTP server listening on http://{}", addr);
    axum::serve(listener, build_router(state))
        .await
        .map_err(|e| SentimentError::io("serving HTTP", e))
}
