//! Bag-of-n-grams vectorization with a vocabulary fixed at fit time.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::errors::{SentimentError, SentimentResult};

pub type FeatureVector = Vec<f64>;

/// Supported vectorizer kinds; the `vectorizer.name` configuration key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorizerKind {
    /// Raw n-gram counts
    Count,
    /// Counts weighted by smoothed idf, rows L2-normalized
    Tfidf,
}

impl VectorizerKind {
    pub fn name(&self) -> &'static str {
        match self {
            VectorizerKind::Count => "count",
            VectorizerKind::Tfidf => "tfidf",
        }
    }
}

/// Unfitted vectorizer settings; also the `[vectorizer]` configuration section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VectorizerParams {
    pub name: VectorizerKind,
    /// Inclusive (min_n, max_n)
    pub ngram_range: (usize, usize),
    /// Minimum number of documents an n-gram must occur in
    pub min_df: usize,
    /// Maximum fraction of documents an n-gram may occur in
    pub max_df: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_features: Option<usize>,
    pub token_pattern: String,
}

impl Default for VectorizerParams {
    fn default() -> Self {
        Self {
            name: VectorizerKind::Count,
            ngram_range: (1, 1),
            min_df: 1,
            max_df: 1.0,
            max_features: None,
            token_pattern: r"(?u)\b\w\w+\b".to_string(),
        }
    }
}

impl VectorizerParams {
    pub fn validate(&self) -> SentimentResult<()> {
        let (min_n, max_n) = self.ngram_range;
        if min_n == 0 || min_n > max_n {
            return Err(SentimentError::configuration(format!(
                "vectorizer.ngram_range must satisfy 1 <= min <= max, got ({min_n}, {max_n})"
            )));
        }
        if self.min_df == 0 {
            return Err(SentimentError::configuration(
                "vectorizer.min_df must be at least 1",
            ));
        }
        if !(self.max_df > 0.0 && self.max_df <= 1.0) {
            return Err(SentimentError::configuration(format!(
                "vectorizer.max_df must be in (0, 1], got {}",
                self.max_df
            )));
        }
        if self.max_features == Some(0) {
            return Err(SentimentError::configuration(
                "vectorizer.max_features must be positive when set",
            ));
        }
        compile_pattern(&self.token_pattern).map(|_| ())
    }

    /// Learn the vocabulary (and idf weights for tf-idf) from a corpus of
    /// normalized documents.
    pub fn fit<S: AsRef<str>>(&self, corpus: &[S]) -> SentimentResult<Vectorizer> {
        self.validate()?;
        let pattern = compile_pattern(&self.token_pattern)?;

        // n-gram -> (document frequency, total frequency)
        let mut stats: HashMap<String, (usize, usize)> = HashMap::new();
        for doc in corpus {
            let grams = extract_ngrams(&pattern, doc.as_ref(), self.ngram_range);
            let mut seen = BTreeSet::new();
            for gram in grams {
                let entry = stats.entry(gram.clone()).or_insert((0, 0));
                entry.1 += 1;
                if seen.insert(gram) {
                    entry.0 += 1;
                }
            }
        }

        let n_docs = corpus.len();
        let max_df_count = self.max_df * n_docs as f64;
        let mut candidates: Vec<(String, usize, usize)> = stats
            .into_iter()
            .filter(|(_, (df, _))| *df >= self.min_df && (*df as f64) <= max_df_count)
            .map(|(gram, (df, tf))| (gram, df, tf))
            .collect();

        if let Some(limit) = self.max_features {
            candidates.sort_by(|a, b| b.2.cmp(&a.2).then_with(|| a.0.cmp(&b.0)));
            candidates.truncate(limit);
        }

        if candidates.is_empty() {
            return Err(SentimentError::empty_dataset(
                "no n-grams left to build a vocabulary from",
            ));
        }

        let doc_freq: BTreeMap<String, usize> =
            candidates.into_iter().map(|(gram, df, _)| (gram, df)).collect();
        let vocabulary = Vocabulary::from_sorted_terms(doc_freq.keys().cloned());

        let idf = match self.name {
            VectorizerKind::Count => None,
            VectorizerKind::Tfidf => Some(
                doc_freq
                    .values()
                    .map(|&df| ((1.0 + n_docs as f64) / (1.0 + df as f64)).ln() + 1.0)
                    .collect(),
            ),
        };

        Ok(Vectorizer {
            params: self.clone(),
            vocabulary,
            idf,
            pattern,
        })
    }
}

/// Mapping from n-gram to column index. Indices follow lexicographic n-gram
/// order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Vocabulary(BTreeMap<String, usize>);

impl Vocabulary {
    fn from_sorted_terms(terms: impl IntoIterator<Item = String>) -> Self {
        Self(terms.into_iter().enumerate().map(|(i, t)| (t, i)).collect())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn index_of(&self, term: &str) -> Option<usize> {
        self.0.get(term).copied()
    }

    pub fn terms(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    fn is_dense(&self) -> bool {
        let mut indices: Vec<usize> = self.0.values().copied().collect();
        indices.sort_unstable();
        indices.iter().enumerate().all(|(pos, &idx)| pos == idx)
    }
}

/// A fitted vectorizer. Serialized as its parameters, vocabulary and idf
/// weights; the token pattern is recompiled when loaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "VectorizerState", into = "VectorizerState")]
pub struct Vectorizer {
    params: VectorizerParams,
    vocabulary: Vocabulary,
    idf: Option<Vec<f64>>,
    pattern: Regex,
}

impl Vectorizer {
    pub fn params(&self) -> &VectorizerParams {
        &self.params
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    pub fn n_features(&self) -> usize {
        self.vocabulary.len()
    }

    /// Map one normalized document to a feature vector. N-grams outside the
    /// vocabulary are ignored; empty text gives an all-zero vector.
    pub fn transform(&self, text: &str) -> FeatureVector {
        let mut row = vec![0.0; self.vocabulary.len()];
        for gram in extract_ngrams(&self.pattern, text, self.params.ngram_range) {
            if let Some(idx) = self.vocabulary.index_of(&gram) {
                row[idx] += 1.0;
            }
        }

        if let Some(idf) = &self.idf {
            for (value, weight) in row.iter_mut().zip(idf) {
                *value *= weight;
            }
            let norm = row.iter().map(|v| v * v).sum::<f64>().sqrt();
            if norm > 0.0 {
                row.iter_mut().for_each(|v| *v /= norm);
            }
        }
        row
    }

    pub fn transform_all<S: AsRef<str>>(&self, texts: &[S]) -> Vec<FeatureVector> {
        texts.iter().map(|t| self.transform(t.as_ref())).collect()
    }
}

#[derive(Serialize, Deserialize)]
struct VectorizerState {
    params: VectorizerParams,
    vocabulary: Vocabulary,
    idf: Option<Vec<f64>>,
}

impl TryFrom<VectorizerState> for Vectorizer {
    type Error = SentimentError;

    fn try_from(state: VectorizerState) -> Result<Self, Self::Error> {
        state.params.validate()?;
        if !state.vocabulary.is_dense() {
            return Err(SentimentError::artifact(
                "vocabulary indices are not contiguous",
            ));
        }
        let idf_ok = match (&state.params.name, &state.idf) {
            (VectorizerKind::Count, None) => true,
            (VectorizerKind::Tfidf, Some(idf)) => idf.len() == state.vocabulary.len(),
            _ => false,
        };
        if !idf_ok {
            return Err(SentimentError::artifact(
                "idf weights do not match the vectorizer kind or vocabulary",
            ));
        }
        let pattern = compile_pattern(&state.params.token_pattern)?;
        Ok(Self {
            params: state.params,
            vocabulary: state.vocabulary,
            idf: state.idf,
            pattern,
        })
    }
}

impl From<Vectorizer> for VectorizerState {
    fn from(v: Vectorizer) -> Self {
        Self {
            params: v.params,
            vocabulary: v.vocabulary,
            idf: v.idf,
        }
    }
}

fn compile_pattern(pattern: &str) -> SentimentResult<Regex> {
    Regex::new(pattern).map_err(|e| {
        SentimentError::configuration(format!("invalid vectorizer.token_pattern: {e}"))
    })
}

fn extract_ngrams(pattern: &Regex, text: &str, (min_n, max_n): (usize, usize)) -> Vec<String> {
    let tokens: Vec<&str> = pattern.find_iter(text).map(|m| m.as_str()).collect();
    let mut grams = Vec::new();
    for n in min_n..=max_n {
        if n > tokens.len() {
            break;
        }
        grams.extend(tokens.windows(n).map(|w| w.join(" ")));
    }
    grams
}
