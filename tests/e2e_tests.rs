//! End-to-end tests: raw dataset → training → evaluation → served predictions
//!
//! These drive the public API the same way the CLI does:
//! - training writes processed splits and the artifact
//! - evaluation registers the run and marks it current
//! - serving resolves `current` from the registry and answers `/predict`

use std::path::Path;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::Request;
use axum::http::StatusCode;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use comment_sentiment::{
    config::PipelineConfig,
    errors::SentimentError,
    evaluation::EvaluationDriver,
    registry::{ModelRegistry, SledModelRegistry},
    serving::{build_router, AppState, ModelHandle, ModelSource},
    training::TrainingDriver,
};

const RAW_DATASET: &str = "\
clean_comment,category
I love this video so much,1
What a great and amazing tutorial,1
Absolutely love the editing here!,1
\"Great work, amazing content as always\",1
\"This is the best channel, love it\",1
\"Amazing explanation, great job mate\",1
Loved it and will share it with friends,1
I hate this terrible video,-1
\"Worst tutorial ever, awful and boring\",-1
\"Terrible audio, I hate the music\",-1
\"Awful content, worst channel on here\",-1
\"Boring and terrible, total waste of time\",-1
I hate how awful this was,-1
This was a complete waste of my evening,-1
The video was uploaded on tuesday,0
This is part two of the series,0
The episode runs about ten minutes,0
Uploaded from the studio on tuesday,0
Part three of the series comes next,0
The runtime is about ten minutes,0
wow,1
meh ok,0
";

/// Write the raw dataset and a params document into a scratch directory
fn setup() -> (TempDir, PipelineConfig) {
    let dir = TempDir::new().expect("temp dir should be created");
    let raw = dir.path().join("raw").join("comments.csv");
    std::fs::create_dir_all(raw.parent().unwrap()).unwrap();
    std::fs::write(&raw, RAW_DATASET).unwrap();

    let config = PipelineConfig::from_toml_str(&params_document(dir.path(), &raw))
        .expect("params should load");
    (dir, config)
}

fn params_document(root: &Path, raw: &Path) -> String {
    let root = root.display();
    format!(
        r#"
        [dataset]
        url = '{raw}'
        train_size = 0.7
        seed = 42
        [dataset.rename_columns]
        clean_comment = "text"
        category = "target"

        [ingestion]
        processed_train_path = '{root}/data/processed/train.csv'
        processed_test_path = '{root}/data/processed/test.csv'

        [normalizer]
        lemmatize = true

        [vectorizer]
        name = "tfidf"
        ngram_range = [1, 2]

        [model]
        name = "multinomial_nb"
        alpha = 0.5

        [pipeline]
        path = '{root}/models/pipeline.json'

        [registry]
        path = '{root}/mlruns/registry'
        experiment_name = "e2e"
        run_info_path = '{root}/run_info.json'
        "#,
        raw = raw.display(),
    )
}

async fn predict(app: axum::Router, payload: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .uri("/predict")
        .method("POST")
        .header("Content-Type", "application/json")
        .body(Body::from(payload.to_string()))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn train_evaluate_serve() {
    let (_dir, config) = setup();

    let training = TrainingDriver::new(&config).run().expect("training should succeed");
    // "wow" and "meh ok" are too short to keep
    assert_eq!(training.train_rows + training.test_rows, 20);

    let registry = Arc::new(SledModelRegistry::open(&config.registry.path).unwrap());
    let evaluation = EvaluationDriver::new(&config, registry.as_ref())
        .run()
        .expect("evaluation should succeed");
    assert_eq!(evaluation.run.artifact_id, training.artifact_id);
    let accuracy = evaluation.run.metrics["test_accuracy"];
    assert!((0.0..=1.0).contains(&accuracy));

    let source = ModelSource::Registry {
        registry: registry.clone(),
        run: "current".to_string(),
    };
    let state = AppState::new(ModelHandle::new(source));
    let served = state.model.get().await.expect("current run should load");
    assert_eq!(served.artifact_id(), training.artifact_id);

    let (status, body) = predict(
        build_router(state),
        json!([
            { "text": "I love this, amazing and great!" },
            { "text": "Terrible, awful, I hate it" },
        ]),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["comments"][0]["sentiment"], 1);
    assert_eq!(body["comments"][1]["sentiment"], -1);
    assert_eq!(body["sentiment_count"]["positive"], 1);
    assert_eq!(body["sentiment_count"]["negative"], 1);
}

#[tokio::test]
async fn serving_without_a_current_run_is_not_found() {
    let (_dir, config) = setup();
    let registry: Arc<dyn ModelRegistry> =
        Arc::new(SledModelRegistry::open(&config.registry.path).unwrap());
    let handle = ModelHandle::new(ModelSource::Registry {
        registry,
        run: "current".to_string(),
    });

    let err = handle.get().await.unwrap_err();
    assert!(matches!(err, SentimentError::ArtifactNotFound { .. }));
    assert!(!handle.is_loaded());
}

#[tokio::test]
async fn served_predictions_match_the_trained_artifact() {
    let (_dir, config) = setup();
    TrainingDriver::new(&config).run().unwrap();

    let trained = comment_sentiment::pipeline::Pipeline::load(&config.pipeline.path).unwrap();
    let handle = ModelHandle::new(ModelSource::Artifact(config.pipeline.path.clone()));
    let served = handle.get().await.unwrap();

    let texts = ["love the series", "waste of time", "ten minutes on tuesday"];
    assert_eq!(
        served.predict(&texts).unwrap(),
        trained.predict(&texts).unwrap()
    );
}
