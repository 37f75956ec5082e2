// tests/web.rs
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use comment_sentiment::label::SentimentLabel;
use comment_sentiment::pipeline::PipelineSpec;
use comment_sentiment::serving::{build_router, AppState, ModelHandle, ModelSource};
use serde_json::{json, Value};
use tower::ServiceExt; // for .oneshot()

fn trained_app() -> (Router, AppState) {
    let corpus = [
        "I love this video",
        "love the great editing",
        "I hate this video",
        "awful and terrible sound",
        "uploaded on tuesday",
        "part two of the series",
    ];
    let labels = [
        SentimentLabel::Positive,
        SentimentLabel::Positive,
        SentimentLabel::Negative,
        SentimentLabel::Negative,
        SentimentLabel::Neutral,
        SentimentLabel::Neutral,
    ];
    let pipeline = PipelineSpec::default()
        .fit(&corpus, &labels)
        .expect("pipeline should fit");
    let state = AppState::new(ModelHandle::in_memory(pipeline));
    (build_router(state.clone()), state)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body should be readable");
    serde_json::from_slice(&bytes).expect("body should be json")
}

fn post_json(uri: &str, payload: &Value) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .method("POST")
        .header("Content-Type", "application/json")
        .body(Body::from(payload.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn predict_labels_every_comment() {
    let (app, _) = trained_app();
    let payload = json!([
        { "text": "I love this, great video!" },
        { "text": "Awful. I hate it", "timestamp": "2024-05-01T12:00:00Z" },
        { "text": "Could be better." },
        { "text": "Uploaded on tuesday" },
        { "text": "Absolutely fantastic!" },
    ]);

    let response = app.oneshot(post_json("/predict", &payload)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-process-time"));

    let body = body_json(response).await;
    let comments = body["comments"].as_array().unwrap();
    assert_eq!(comments.len(), 5);
    assert_eq!(comments[0]["text"], "I love this, great video!");
    assert_eq!(comments[0]["sentiment"], 1);
    assert_eq!(comments[1]["sentiment"], -1);
    assert_eq!(comments[1]["timestamp"], "2024-05-01T12:00:00Z");
    assert!(comments[2]["timestamp"].is_null());

    let count = &body["sentiment_count"];
    let total = count["positive"].as_u64().unwrap()
        + count["neutral"].as_u64().unwrap()
        + count["negative"].as_u64().unwrap();
    assert_eq!(total, 5);
}

#[tokio::test]
async fn empty_batch_is_bad_request() {
    let (app, _) = trained_app();
    let response = app.oneshot(post_json("/predict", &json!([]))).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["detail"], "No comments provided.");
}

#[tokio::test]
async fn validate_youtube_urls() {
    let cases = [
        ("https://www.youtube.com/watch?v=dQw4w9WgXcQ", StatusCode::OK),
        ("https://youtu.be/dQw4w9WgXcQ", StatusCode::OK),
        ("youtu.be/dQw4w9WgXcQ", StatusCode::OK),
        ("invalid_url", StatusCode::UNPROCESSABLE_ENTITY),
    ];
    for (url, expected) in cases {
        let (app, _) = trained_app();
        let uri = format!("/validate-yt-url?url={}", urlencode(url));
        let response = app.oneshot(get(&uri)).await.unwrap();
        assert_eq!(response.status(), expected, "{url}");

        let body = body_json(response).await;
        if expected == StatusCode::OK {
            assert_eq!(body["video_id"], "dQw4w9WgXcQ");
            assert_eq!(body["url"], url);
            assert_eq!(body["message"], "validation passed");
        } else {
            assert_eq!(body["error"], "validation error");
        }
    }
}

fn urlencode(raw: &str) -> String {
    url::form_urlencoded::byte_serialize(raw.as_bytes()).collect()
}

#[tokio::test]
async fn health_and_readiness() {
    let (app, state) = trained_app();

    let response = app.clone().oneshot(get("/healthz")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "ok");

    let response = app.clone().oneshot(get("/readyz")).await.unwrap();
    assert_eq!(body_json(response).await["ready"], false);

    state.model.get().await.unwrap();
    let response = app.clone().oneshot(get("/readyz")).await.unwrap();
    assert_eq!(body_json(response).await["ready"], true);

    let response = app.oneshot(get("/")).await.unwrap();
    assert_eq!(body_json(response).await["service"], "comment_sentiment");
}

#[tokio::test]
async fn model_is_loaded_once_and_shared() {
    let (_, state) = trained_app();
    let first = state.model.get().await.unwrap();
    let second = state.model.get().await.unwrap();
    assert!(std::sync::Arc::ptr_eq(&first, &second));
}

#[tokio::test]
async fn missing_artifact_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let handle = ModelHandle::new(ModelSource::Artifact(dir.path().join("missing.json")));
    let app = build_router(AppState::new(handle));

    let response = app
        .oneshot(post_json("/predict", &json!([{ "text": "hello there" }])))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
