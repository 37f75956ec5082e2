//! Raw dataset ingestion and the processed train/test splits.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};
use url::Url;

use crate::errors::{SentimentError, SentimentResult};
use crate::label::SentimentLabel;
use crate::normalizer::{token_count, TextNormalizer};

pub const TEXT_COLUMN: &str = "text";
pub const TARGET_COLUMN: &str = "target";

/// One labeled comment. In the processed splits `text` is already normalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledComment {
    pub text: String,
    pub target: SentimentLabel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetFormat {
    Csv,
    JsonLines,
}

/// Columnar containers have no reader here; they are named so the error
/// says what the file is instead of failing on a missing header.
const COLUMNAR_EXTENSIONS: &[&str] = &["parquet", "pq", "arrow", "feather", "ipc", "orc"];

impl DatasetFormat {
    /// Pick the format from the file extension of a path or URL. A source
    /// without an extension is read as CSV.
    pub fn detect(source: &str) -> SentimentResult<Self> {
        let path = match Url::parse(source) {
            Ok(url) if is_remote_url(&url) => url.path().to_string(),
            _ => source.to_string(),
        };
        let extension = Path::new(&path)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);
        match extension.as_deref() {
            None | Some("csv") | Some("txt") => Ok(DatasetFormat::Csv),
            Some("jsonl") | Some("ndjson") | Some("json") => Ok(DatasetFormat::JsonLines),
            Some(ext) if COLUMNAR_EXTENSIONS.contains(&ext) => Err(SentimentError::data_source(
                source,
                format!("columnar .{ext} datasets are not supported, export to CSV or JSON Lines"),
            )),
            Some(ext) => Err(SentimentError::data_source(
                source,
                format!("unsupported dataset extension .{ext}"),
            )),
        }
    }
}

fn is_remote_url(url: &Url) -> bool {
    matches!(url.scheme(), "http" | "https")
}

/// Fetch the raw bytes of a dataset from disk or over http(s).
fn fetch(source: &str) -> SentimentResult<Vec<u8>> {
    match Url::parse(source) {
        Ok(url) if is_remote_url(&url) => {
            info!("Downloading dataset from {}", url);
            let response = reqwest::blocking::get(url.clone())
                .and_then(|r| r.error_for_status())
                .map_err(|e| SentimentError::data_source(source, e.to_string()))?;
            let bytes = response
                .bytes()
                .map_err(|e| SentimentError::data_source(source, e.to_string()))?;
            Ok(bytes.to_vec())
        }
        _ => fs::read(source).map_err(|e| SentimentError::data_source(source, e.to_string())),
    }
}

/// Read the raw dataset, rename its columns and parse the labels. Rows with
/// a missing or blank text or target are dropped.
pub fn read_raw_dataset(
    source: &str,
    rename_columns: &BTreeMap<String, String>,
) -> SentimentResult<Vec<LabeledComment>> {
    let format = DatasetFormat::detect(source)?;
    let bytes = fetch(source)?;
    let rows = match format {
        DatasetFormat::Csv => parse_csv(source, &bytes, rename_columns)?,
        DatasetFormat::JsonLines => parse_json_lines(source, &bytes, rename_columns)?,
    };

    let total = rows.len();
    let mut comments = Vec::with_capacity(total);
    for (row, (text, target)) in rows.into_iter().enumerate() {
        let (Some(text), Some(target)) = (non_blank(text), non_blank(target)) else {
            continue;
        };
        let target = target.parse::<SentimentLabel>().map_err(|e| {
            SentimentError::data_source(source, format!("row {}: {e}", row + 1))
        })?;
        comments.push(LabeledComment { text, target });
    }
    if comments.len() < total {
        debug!("Dropped {} rows with missing values", total - comments.len());
    }
    info!("Loaded {} labeled rows from {}", comments.len(), source);
    Ok(comments)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn renamed<'a>(column: &'a str, rename_columns: &'a BTreeMap<String, String>) -> &'a str {
    rename_columns
        .get(column)
        .map(String::as_str)
        .unwrap_or(column)
}

type RawRow = (Option<String>, Option<String>);

fn parse_csv(
    source: &str,
    bytes: &[u8],
    rename_columns: &BTreeMap<String, String>,
) -> SentimentResult<Vec<RawRow>> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(bytes);
    let headers = reader
        .headers()
        .map_err(|e| SentimentError::data_source(source, e.to_string()))?
        .clone();

    let position = |wanted: &str| {
        headers
            .iter()
            .position(|h| renamed(h.trim(), rename_columns) == wanted)
    };
    let text_idx = position(TEXT_COLUMN).ok_or_else(|| missing_column(source, TEXT_COLUMN))?;
    let target_idx =
        position(TARGET_COLUMN).ok_or_else(|| missing_column(source, TARGET_COLUMN))?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| SentimentError::data_source(source, e.to_string()))?;
        rows.push((
            record.get(text_idx).map(str::to_string),
            record.get(target_idx).map(str::to_string),
        ));
    }
    Ok(rows)
}

fn parse_json_lines(
    source: &str,
    bytes: &[u8],
    rename_columns: &BTreeMap<String, String>,
) -> SentimentResult<Vec<RawRow>> {
    let content = std::str::from_utf8(bytes)
        .map_err(|e| SentimentError::data_source(source, e.to_string()))?;

    let mut rows = Vec::new();
    let mut seen_text = false;
    let mut seen_target = false;
    for (line_no, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let object: serde_json::Map<String, serde_json::Value> = serde_json::from_str(line)
            .map_err(|e| SentimentError::data_source(source, format!("line {}: {e}", line_no + 1)))?;

        let mut text = None;
        let mut target = None;
        for (key, value) in &object {
            match renamed(key, rename_columns) {
                TEXT_COLUMN => {
                    seen_text = true;
                    text = json_scalar(value);
                }
                TARGET_COLUMN => {
                    seen_target = true;
                    target = json_scalar(value);
                }
                _ => {}
            }
        }
        rows.push((text, target));
    }

    if !rows.is_empty() {
        if !seen_text {
            return Err(missing_column(source, TEXT_COLUMN));
        }
        if !seen_target {
            return Err(missing_column(source, TARGET_COLUMN));
        }
    }
    Ok(rows)
}

fn json_scalar(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn missing_column(source: &str, column: &str) -> SentimentError {
    SentimentError::data_source(
        source,
        format!("column '{column}' not found; map it with dataset.rename_columns"),
    )
}

/// Normalize every comment and keep only those with more than
/// `short_text_tokens` tokens afterwards.
pub fn normalize_and_filter(
    comments: Vec<LabeledComment>,
    normalizer: &TextNormalizer,
    short_text_tokens: usize,
) -> SentimentResult<Vec<LabeledComment>> {
    let before = comments.len();
    let kept: Vec<LabeledComment> = comments
        .into_iter()
        .filter_map(|comment| {
            let text = normalizer.normalize(&comment.text);
            (token_count(&text) > short_text_tokens).then_some(LabeledComment {
                text,
                target: comment.target,
            })
        })
        .collect();

    if kept.is_empty() {
        return Err(SentimentError::empty_dataset(format!(
            "all {before} rows have {short_text_tokens} tokens or fewer after normalization"
        )));
    }
    if kept.len() < before {
        warn!(
            "Dropped {} of {} rows with {} tokens or fewer",
            before - kept.len(),
            before,
            short_text_tokens
        );
    }
    Ok(kept)
}

/// Seeded shuffle then split; the first `round(n * train_size)` rows form the
/// training split. With two or more rows both splits are non-empty.
pub fn train_test_split(
    mut rows: Vec<LabeledComment>,
    train_size: f64,
    seed: u64,
) -> (Vec<LabeledComment>, Vec<LabeledComment>) {
    let mut rng = StdRng::seed_from_u64(seed);
    rows.shuffle(&mut rng);

    let n = rows.len();
    let mut n_train = (n as f64 * train_size).round() as usize;
    if n >= 2 {
        n_train = n_train.clamp(1, n - 1);
    } else {
        n_train = n;
    }
    let test = rows.split_off(n_train);
    (rows, test)
}

pub fn write_split(path: &Path, rows: &[LabeledComment]) -> SentimentResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| SentimentError::io(format!("creating {}", parent.display()), e))?;
    }
    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| SentimentError::data_source(path.display().to_string(), e.to_string()))?;
    for row in rows {
        writer
            .serialize(row)
            .map_err(|e| SentimentError::data_source(path.display().to_string(), e.to_string()))?;
    }
    writer
        .flush()
        .map_err(|e| SentimentError::io(format!("flushing {}", path.display()), e))?;
    debug!("Wrote {} rows to {:?}", rows.len(), path);
    Ok(())
}

pub fn read_split(path: &Path) -> SentimentResult<Vec<LabeledComment>> {
    let source = path.display().to_string();
    if !path.exists() {
        return Err(SentimentError::data_source(&source, "processed split not found"));
    }
    let mut reader = csv::Reader::from_path(path)
        .map_err(|e| SentimentError::data_source(&source, e.to_string()))?;
    reader
        .deserialize::<LabeledComment>()
        .map(|row| row.map_err(|e| SentimentError::data_source(&source, e.to_string())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn rename(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn format_follows_extension() {
        let detect = |source: &str| DatasetFormat::detect(source).unwrap();
        assert_eq!(detect("data/raw.csv"), DatasetFormat::Csv);
        assert_eq!(detect("data/raw.jsonl"), DatasetFormat::JsonLines);
        assert_eq!(
            detect("https://example.com/a/comments.ndjson?dl=1"),
            DatasetFormat::JsonLines
        );
        assert_eq!(detect("https://example.com/data"), DatasetFormat::Csv);
    }

    #[test]
    fn columnar_and_unknown_extensions_are_rejected() {
        for source in ["data/raw.parquet", "https://example.com/comments.PARQUET"] {
            let err = DatasetFormat::detect(source).unwrap_err();
            assert!(matches!(err, SentimentError::DataSource { .. }));
            assert!(err.to_string().contains("parquet"), "{err}");
        }
        assert!(matches!(
            DatasetFormat::detect("data/raw.xlsx"),
            Err(SentimentError::DataSource { .. })
        ));

        // rejected before the file is even opened
        let dir = tempdir().unwrap();
        let path = dir.path().join("raw.parquet");
        fs::write(&path, "text,target
this is a fine comment,1
").unwrap();
        let err = read_raw_dataset(path.to_str().unwrap(), &BTreeMap::new()).unwrap_err();
        assert!(!err.to_string().contains("'text'"), "{err}");
    }

    #[test]
    fn csv_columns_are_renamed_and_blank_rows_dropped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("reddit.csv");
        fs::write(
            &path,
            "clean_comment,category\n\
             \"great video, thanks\",1\n\
             ,0\n\
             meh,\n\
             awful sound,-1.0\n",
        )
        .unwrap();

        let rows = read_raw_dataset(
            path.to_str().unwrap(),
            &rename(&[("clean_comment", "text"), ("category", "target")]),
        )
        .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].text, "great video, thanks");
        assert_eq!(rows[0].target, SentimentLabel::Positive);
        assert_eq!(rows[1].target, SentimentLabel::Negative);
    }

    #[test]
    fn json_lines_accepts_numeric_and_named_targets() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("comments.jsonl");
        fs::write(
            &path,
            "{\"body\": \"loved every minute\", \"label\": 1}\n\
             \n\
             {\"body\": \"it was fine\", \"label\": \"neutral\"}\n",
        )
        .unwrap();

        let rows = read_raw_dataset(
            path.to_str().unwrap(),
            &rename(&[("body", "text"), ("label", "target")]),
        )
        .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].target, SentimentLabel::Neutral);
    }

    #[test]
    fn missing_source_and_columns_are_data_source_errors() {
        let err = read_raw_dataset("/definitely/not/here.csv", &BTreeMap::new()).unwrap_err();
        assert!(matches!(err, SentimentError::DataSource { .. }));

        let dir = tempdir().unwrap();
        let path = dir.path().join("raw.csv");
        fs::write(&path, "comment,category\nhello there,1\n").unwrap();
        let err = read_raw_dataset(path.to_str().unwrap(), &BTreeMap::new()).unwrap_err();
        assert!(err.to_string().contains("'text'"));
    }

    #[test]
    fn unknown_label_reports_row() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("raw.csv");
        fs::write(&path, "text,target\nthis one is fine,1\nthis one is odd,7\n").unwrap();
        let err = read_raw_dataset(path.to_str().unwrap(), &BTreeMap::new()).unwrap_err();
        assert!(matches!(err, SentimentError::DataSource { .. }));
        assert!(err.to_string().contains("row 2"));
    }

    #[test]
    fn short_rows_are_filtered() {
        let rows = vec![
            LabeledComment {
                text: "Too short!".into(),
                target: SentimentLabel::Positive,
            },
            LabeledComment {
                text: "This one has\nplenty of words".into(),
                target: SentimentLabel::Negative,
            },
        ];
        let kept = normalize_and_filter(rows, &TextNormalizer::default(), 3).unwrap();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].text, "this one has plenty of words");
    }

    #[test]
    fn filtering_everything_is_empty_dataset() {
        let rows = vec![LabeledComment {
            text: "ok then".into(),
            target: SentimentLabel::Neutral,
        }];
        let err = normalize_and_filter(rows, &TextNormalizer::default(), 3).unwrap_err();
        assert!(matches!(err, SentimentError::EmptyDataset { .. }));
    }

    #[test]
    fn split_is_seeded_and_complete() {
        let rows: Vec<LabeledComment> = (0..10)
            .map(|i| LabeledComment {
                text: format!("comment number {i} here"),
                target: SentimentLabel::ALL[i % 3],
            })
            .collect();

        let (train_a, test_a) = train_test_split(rows.clone(), 0.8, 42);
        let (train_b, test_b) = train_test_split(rows.clone(), 0.8, 42);
        assert_eq!(train_a, train_b);
        assert_eq!(test_a, test_b);
        assert_eq!(train_a.len(), 8);
        assert_eq!(test_a.len(), 2);

        let (train_tiny, test_tiny) = train_test_split(rows[..2].to_vec(), 0.9, 1);
        assert_eq!((train_tiny.len(), test_tiny.len()), (1, 1));
    }

    #[test]
    fn processed_split_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("processed").join("test.csv");
        let rows = vec![
            LabeledComment {
                text: "nice one, well done".into(),
                target: SentimentLabel::Positive,
            },
            LabeledComment {
                text: "not my thing at all".into(),
                target: SentimentLabel::Negative,
            },
        ];
        write_split(&path, &rows).unwrap();
        assert_eq!(read_split(&path).unwrap(), rows);

        let err = read_split(&dir.path().join("missing.csv")).unwrap_err();
        assert!(matches!(err, SentimentError::DataSource { .. }));
    }
}
