// src/tests/registry_test.rs
// Sled registry runs, artifacts and the current pointer

use serde_json::json;
use std::collections::BTreeMap;
use tempfile::tempdir;

use crate::errors::SentimentError;
use crate::evaluation::EvaluationReport;
use crate::label::SentimentLabel;
use crate::pipeline::{Pipeline, PipelineSpec};
use crate::registry::{ModelRegistry, RunDraft, RunInfo, SledModelRegistry, CURRENT_SELECTOR};
use crate::tests::test_utils::labeled_comments;

fn fitted() -> Pipeline {
    let (texts, labels): (Vec<&str>, Vec<SentimentLabel>) = labeled_comments().into_iter().unzip();
    PipelineSpec::default().fit(&texts, &labels).unwrap()
}

fn draft_for(pipeline: &Pipeline, accuracy_rows: &[SentimentLabel]) -> RunDraft {
    let report =
        EvaluationReport::evaluate(pipeline.artifact_id(), accuracy_rows, accuracy_rows).unwrap();
    RunDraft {
        experiment: "registry-tests".into(),
        params: json!({ "model": pipeline.spec().classifier }),
        tags: BTreeMap::from([("model_name".to_string(), "multinomial_nb".to_string())]),
        metrics: report.classification.flatten(),
        report,
    }
}

#[test]
fn logged_run_round_trips_with_its_artifact() {
    let dir = tempdir().expect("failed to create temp dir");
    let registry = SledModelRegistry::open(dir.path()).unwrap();
    let pipeline = fitted();

    let run = registry
        .log_run(draft_for(&pipeline, &[SentimentLabel::Positive]), &pipeline)
        .unwrap();
    assert_eq!(run.artifact_id, pipeline.artifact_id());

    let loaded_run = registry.load_run(&run.run_id).unwrap();
    assert_eq!(loaded_run, run);
    assert_eq!(loaded_run.metrics["test_accuracy"], 1.0);

    let loaded = registry.load_pipeline(&run.run_id).unwrap();
    let inputs = ["love this great video", "hate this awful thing"];
    assert_eq!(
        loaded.predict(&inputs).unwrap(),
        pipeline.predict(&inputs).unwrap()
    );
}

#[test]
fn unknown_run_is_not_found() {
    let dir = tempdir().unwrap();
    let registry = SledModelRegistry::open(dir.path()).unwrap();

    assert!(matches!(
        registry.load_run("missing"),
        Err(SentimentError::ArtifactNotFound { .. })
    ));
    assert!(matches!(
        registry.load_pipeline("missing"),
        Err(SentimentError::ArtifactNotFound { .. })
    ));
    assert!(matches!(
        registry.set_current("missing"),
        Err(SentimentError::ArtifactNotFound { .. })
    ));
    assert!(matches!(
        registry.resolve(CURRENT_SELECTOR),
        Err(SentimentError::ArtifactNotFound { .. })
    ));
}

#[test]
fn current_pointer_moves_between_runs() {
    let dir = tempdir().unwrap();
    let registry = SledModelRegistry::open(dir.path()).unwrap();
    assert_eq!(registry.current_run_id().unwrap(), None);

    let first_pipeline = fitted();
    let first = registry
        .log_run(draft_for(&first_pipeline, &[SentimentLabel::Neutral]), &first_pipeline)
        .unwrap();
    registry.set_current(&first.run_id).unwrap();
    assert_eq!(registry.resolve(CURRENT_SELECTOR).unwrap(), first.run_id);

    let second_pipeline = fitted();
    let second = registry
        .log_run(draft_for(&second_pipeline, &[SentimentLabel::Negative]), &second_pipeline)
        .unwrap();
    // logging alone does not promote a run
    assert_eq!(registry.current_run_id().unwrap(), Some(first.run_id.clone()));

    registry.set_current(&second.run_id).unwrap();
    assert_eq!(registry.current_run_id().unwrap(), Some(second.run_id.clone()));
    assert_eq!(registry.resolve(&first.run_id).unwrap(), first.run_id);

    let runs = registry.list_runs().unwrap();
    assert_eq!(runs.len(), 2);
    assert_eq!(runs[0].run_id, first.run_id);
    assert_eq!(runs[1].run_id, second.run_id);
}

#[test]
fn registry_survives_reopen() {
    let dir = tempdir().unwrap();
    let pipeline = fitted();
    let run_id = {
        let registry = SledModelRegistry::open(dir.path()).unwrap();
        let run = registry
            .log_run(draft_for(&pipeline, &[SentimentLabel::Positive]), &pipeline)
            .unwrap();
        registry.set_current(&run.run_id).unwrap();
        run.run_id
    };

    let reopened = SledModelRegistry::open(dir.path()).unwrap();
    assert_eq!(reopened.current_run_id().unwrap(), Some(run_id.clone()));
    assert_eq!(
        reopened.load_pipeline(&run_id).unwrap().artifact_id(),
        pipeline.artifact_id()
    );
}

#[test]
fn run_info_file_round_trips() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("run_info.json");
    let info = RunInfo {
        run_id: "abc".into(),
        model_path: "models/pipeline.json".into(),
    };
    info.save(&path).unwrap();
    assert_eq!(RunInfo::load(&path).unwrap(), info);
}
