// src/tests/test_utils.rs
// Shared fixtures for the crate's unit tests

use std::fs;
use std::path::Path;

use crate::config::PipelineConfig;
use crate::label::SentimentLabel;

/// Small labeled corpus with clearly separated vocabulary per label. Every
/// comment survives the default short-text filter.
pub fn labeled_comments() -> Vec<(&'static str, SentimentLabel)> {
    use SentimentLabel::{Negative, Neutral, Positive};
    vec![
        ("I love this video so much", Positive),
        ("What a great and amazing tutorial", Positive),
        ("Absolutely love the editing here!", Positive),
        ("Great work, amazing content as always", Positive),
        ("This is the best channel, love it", Positive),
        ("Amazing explanation, great job mate", Positive),
        ("I hate this terrible video", Negative),
        ("Worst tutorial ever, awful and boring", Negative),
        ("Terrible audio, I hate the music", Negative),
        ("Awful content, worst channel on here", Negative),
        ("Boring and terrible, total waste of time", Negative),
        ("I hate how awful this was", Negative),
        ("The video was uploaded on tuesday", Neutral),
        ("This is part two of the series", Neutral),
        ("The episode runs about ten minutes", Neutral),
        ("Uploaded from the studio on tuesday", Neutral),
        ("Part three of the series comes next", Neutral),
        ("The runtime is about ten minutes", Neutral),
    ]
}

/// Write a raw dataset CSV with source column names that need renaming.
pub fn write_raw_csv(path: &Path, rows: &[(&str, SentimentLabel)]) {
    let mut writer = csv::Writer::from_path(path).expect("create raw csv");
    writer
        .write_record(["clean_comment", "category"])
        .expect("write header");
    for (text, label) in rows {
        writer
            .write_record([text.to_string(), label.code().to_string()])
            .expect("write row");
    }
    writer.flush().expect("flush raw csv");
}

/// Config whose every path lives under `dir`.
pub fn config_in(dir: &Path, dataset_url: &Path, extra: &str) -> PipelineConfig {
    let root = dir.display();
    let document = format!(
        r#"
        [dataset]
        url = '{url}'
        train_size = 0.75
        seed = 7
        [dataset.rename_columns]
        clean_comment = "text"
        category = "target"

        [ingestion]
        processed_train_path = '{root}/processed/train.csv'
        processed_test_path = '{root}/processed/test.csv'

        [pipeline]
        path = '{root}/models/pipeline.json'

        [registry]
        path = '{root}/registry'
        experiment_name = "unit-tests"
        run_info_path = '{root}/run_info.json'

        {extra}
        "#,
        url = dataset_url.display(),
    );
    PipelineConfig::from_toml_str(&document).expect("test config should load")
}

pub fn write_file(path: &Path, contents: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent dir");
    }
    fs::write(path, contents).expect("write file");
}
