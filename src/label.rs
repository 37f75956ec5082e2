//! The closed set of sentiment labels and their integer encoding.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::SentimentError;

/// Sentiment of a single comment, encoded as -1 / 0 / 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i8", into = "i8")]
pub enum SentimentLabel {
    Positive,
    Neutral,
    Negative,
}

impl SentimentLabel {
    /// Conventional display order: positive, neutral, negative.
    pub const ALL: [SentimentLabel; 3] = [
        SentimentLabel::Positive,
        SentimentLabel::Neutral,
        SentimentLabel::Negative,
    ];

    pub fn code(self) -> i8 {
        match self {
            SentimentLabel::Positive => 1,
            SentimentLabel::Neutral => 0,
            SentimentLabel::Negative => -1,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SentimentLabel::Positive => "positive",
            SentimentLabel::Neutral => "neutral",
            SentimentLabel::Negative => "negative",
        }
    }

    /// Position of the label in [`SentimentLabel::ALL`].
    pub fn index(self) -> usize {
        match self {
            SentimentLabel::Positive => 0,
            SentimentLabel::Neutral => 1,
            SentimentLabel::Negative => 2,
        }
    }
}

impl TryFrom<i8> for SentimentLabel {
    type Error = SentimentError;

    fn try_from(code: i8) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(SentimentLabel::Positive),
            0 => Ok(SentimentLabel::Neutral),
            -1 => Ok(SentimentLabel::Negative),
            other => Err(SentimentError::validation(
                "label",
                format!("{other} is not one of -1, 0, 1"),
            )),
        }
    }
}

impl From<SentimentLabel> for i8 {
    fn from(label: SentimentLabel) -> Self {
        label.code()
    }
}

impl FromStr for SentimentLabel {
    type Err = SentimentError;

    /// Accepts the integer code ("-1", "0", "1", "1.0") or the label name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.to_lowercase().as_str() {
            "positive" => return Ok(SentimentLabel::Positive),
            "neutral" => return Ok(SentimentLabel::Neutral),
            "negative" => return Ok(SentimentLabel::Negative),
            _ => {}
        }
        if let Ok(code) = s.parse::<i8>() {
            return SentimentLabel::try_from(code);
        }
        // pandas-exported datasets often carry float labels
        match s.parse::<f64>() {
            Ok(v) if v.fract() == 0.0 && (-1.0..=1.0).contains(&v) => {
                SentimentLabel::try_from(v as i8)
            }
            _ => Err(SentimentError::validation(
                "label",
                format!("unrecognised sentiment label '{s}'"),
            )),
        }
    }
}

impl fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
