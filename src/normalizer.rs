//! Comment text normalization shared by training and serving.
//!
//! The same [`TextNormalizer`] value is stored inside every pipeline
//! artifact, so the text a model was trained on and the text it scores at
//! inference time always pass through identical steps.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// English stop words. Apostrophe forms are omitted because the base
/// normalization deletes apostrophes before stop words are checked.
const STOP_WORDS: &[&str] = &[
    "i", "me", "my", "myself", "we", "our", "ours", "ourselves", "you", "your", "yours",
    "yourself", "yourselves", "he", "him", "his", "himself", "she", "her", "hers", "herself",
    "it", "its", "itself", "they", "them", "their", "theirs", "themselves", "what", "which",
    "who", "whom", "this", "that", "these", "those", "am", "is", "are", "was", "were", "be",
    "been", "being", "have", "has", "had", "having", "do", "does", "did", "doing", "a", "an",
    "the", "and", "but", "if", "or", "because", "as", "until", "while", "of", "at", "by",
    "for", "with", "about", "against", "between", "into", "through", "during", "before",
    "after", "above", "below", "to", "from", "up", "down", "in", "out", "on", "off", "over",
    "under", "again", "further", "then", "once", "here", "there", "when", "where", "why",
    "how", "all", "any", "both", "each", "few", "more", "most", "other", "some", "such", "no",
    "nor", "not", "only", "own", "same", "so", "than", "too", "very", "s", "t", "can", "will",
    "just", "don", "should", "now", "d", "ll", "m", "o", "re", "ve", "y", "ain", "aren",
    "couldn", "didn", "doesn", "hadn", "hasn", "haven", "isn", "ma", "mightn", "mustn",
    "needn", "shan", "shouldn", "wasn", "weren", "won", "wouldn",
];

/// Polarity carriers that are never dropped as stop words.
const RETAINED_WORDS: &[&str] = &["not", "no", "but", "however", "yet"];

const IRREGULAR_PLURALS: &[(&str, &str)] = &[
    ("children", "child"),
    ("women", "woman"),
    ("feet", "foot"),
    ("teeth", "tooth"),
    ("mice", "mouse"),
    ("geese", "goose"),
    ("goes", "go"),
    ("wolves", "wolf"),
    ("knives", "knife"),
    ("lives", "life"),
    ("wives", "wife"),
    ("leaves", "leaf"),
    ("halves", "half"),
    ("shelves", "shelf"),
    ("thieves", "thief"),
    ("calves", "calf"),
    ("movies", "movie"),
    ("cookies", "cookie"),
    ("selfies", "selfie"),
    ("zombies", "zombie"),
    ("rookies", "rookie"),
    ("hippies", "hippie"),
];

/// Words that end in `s` but are already a base form.
const INVARIANT_WORDS: &[&str] = &[
    "news", "always", "series", "species", "perhaps", "does", "christmas", "sometimes",
    "towards", "afterwards", "backwards", "forwards", "upwards", "downwards", "nowadays",
    "whereas", "besides", "unless", "lens", "alias", "atlas", "bias", "canvas", "chaos",
    "physics", "politics", "mathematics", "economics", "ethics", "thanks", "mumps",
];

const ALLOWED_PUNCTUATION: [char; 4] = ['!', '?', '.', ','];

/// Normalization settings; also the `[normalizer]` configuration section.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TextNormalizer {
    pub remove_stop_words: bool,
    pub lemmatize: bool,
}

impl TextNormalizer {
    pub fn new(remove_stop_words: bool, lemmatize: bool) -> Self {
        Self {
            remove_stop_words,
            lemmatize,
        }
    }

    /// Normalize one comment. Idempotent in every mode.
    pub fn normalize(&self, text: &str) -> String {
        let base = normalize_base(text);
        if !self.remove_stop_words && !self.lemmatize {
            return base;
        }

        let mut kept: Vec<Cow<'_, str>> = Vec::new();
        for token in base.split_whitespace() {
            if self.remove_stop_words && is_stop_word(token) {
                continue;
            }
            let token = if self.lemmatize {
                lemmatize(token)
            } else {
                Cow::Borrowed(token)
            };
            // a lemma may itself be a stop word ("others" -> "other")
            if self.remove_stop_words && is_stop_word(&token) {
                continue;
            }
            kept.push(token);
        }
        kept.join(" ")
    }

    pub fn normalize_all<S: AsRef<str>>(&self, texts: &[S]) -> Vec<String> {
        texts.iter().map(|t| self.normalize(t.as_ref())).collect()
    }
}

/// Number of whitespace separated tokens in already normalized text.
pub fn token_count(normalized: &str) -> usize {
    normalized.split_whitespace().count()
}

fn normalize_base(text: &str) -> String {
    let lowered = text.to_lowercase();
    let cleaned: String = lowered
        .trim()
        .chars()
        .map(|c| if c.is_whitespace() { ' ' } else { c })
        .filter(|c| {
            c.is_ascii_alphanumeric() || c.is_whitespace() || ALLOWED_PUNCTUATION.contains(c)
        })
        .collect();
    cleaned.trim().to_string()
}

fn is_stop_word(token: &str) -> bool {
    !RETAINED_WORDS.contains(&token) && STOP_WORDS.contains(&token)
}

/// Reduce a plural noun to its singular form, repeating until no rule
/// applies so that the result is a fixed point.
fn lemmatize(token: &str) -> Cow<'_, str> {
    let mut current = Cow::Borrowed(token);
    loop {
        match singularize(&current).map(Cow::into_owned) {
            Some(next) => current = Cow::Owned(next),
            None => return current,
        }
    }
}

/// One singularization step. Only purely alphabetic tokens longer than three
/// characters are touched; every rule either shortens the token or maps it to
/// a form no rule applies to.
fn singularize(token: &str) -> Option<Cow<'_, str>> {
    if token.len() <= 3
        || !token.bytes().all(|b| b.is_ascii_lowercase())
        || INVARIANT_WORDS.contains(&token)
    {
        return None;
    }
    if let Some((_, singular)) = IRREGULAR_PLURALS.iter().find(|(plural, _)| *plural == token) {
        return Some(Cow::Borrowed(*singular));
    }
    if token.len() > 4 && token.ends_with("ies") {
        return Some(Cow::Owned(format!("{}y", &token[..token.len() - 3])));
    }
    if token.ends_with("sses")
        || token.ends_with("xes")
        || token.ends_with("ches")
        || token.ends_with("shes")
    {
        return Some(Cow::Borrowed(&token[..token.len() - 2]));
    }
    if token.ends_with('s')
        && !token.ends_with("ss")
        && !token.ends_with("us")
        && !token.ends_with("is")
    {
        return Some(Cow::Borrowed(&token[..token.len() - 1]));
    }
    None
}
