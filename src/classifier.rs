//! Supervised three-class models over feature vectors.
//!
//! Every supported model is a variant of [`ClassifierParams`] (unfitted
//! settings, the `[model]` configuration section) and of [`ClassifierModel`]
//! (fitted state stored in the pipeline artifact).

use serde::{Deserialize, Serialize};

use crate::errors::{SentimentError, SentimentResult};
use crate::label::SentimentLabel;
use crate::vectorizer::FeatureVector;

/// Common contract of the fitted models.
pub trait Classifier: Sized {
    type Params;

    fn fit(params: &Self::Params, x: &[FeatureVector], y: &[SentimentLabel])
        -> SentimentResult<Self>;

    fn predict_row(&self, row: &[f64]) -> SentimentLabel;

    fn predict(&self, x: &[FeatureVector]) -> Vec<SentimentLabel> {
        x.iter().map(|row| self.predict_row(row)).collect()
    }
}

/// Classifier choice and hyper-parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum ClassifierParams {
    MultinomialNb {
        #[serde(default = "default_alpha")]
        alpha: f64,
    },
    LogisticRegression {
        #[serde(default = "default_learning_rate")]
        learning_rate: f64,
        #[serde(default = "default_epochs")]
        epochs: usize,
        #[serde(default)]
        l2: f64,
    },
}

fn default_alpha() -> f64 {
    1.0
}

fn default_learning_rate() -> f64 {
    0.5
}

fn default_epochs() -> usize {
    300
}

impl Default for ClassifierParams {
    fn default() -> Self {
        ClassifierParams::MultinomialNb {
            alpha: default_alpha(),
        }
    }
}

impl ClassifierParams {
    pub fn name(&self) -> &'static str {
        match self {
            ClassifierParams::MultinomialNb { .. } => "multinomial_nb",
            ClassifierParams::LogisticRegression { .. } => "logistic_regression",
        }
    }

    pub fn validate(&self) -> SentimentResult<()> {
        match *self {
            ClassifierParams::MultinomialNb { alpha } => {
                if !(alpha > 0.0 && alpha.is_finite()) {
                    return Err(SentimentError::configuration(format!(
                        "model.alpha must be positive, got {alpha}"
                    )));
                }
            }
            ClassifierParams::LogisticRegression {
                learning_rate,
                epochs,
                l2,
            } => {
                if !(learning_rate > 0.0 && learning_rate.is_finite()) {
                    return Err(SentimentError::configuration(format!(
                        "model.learning_rate must be positive, got {learning_rate}"
                    )));
                }
                if epochs == 0 {
                    return Err(SentimentError::configuration(
                        "model.epochs must be at least 1",
                    ));
                }
                if !(l2 >= 0.0 && l2.is_finite()) {
                    return Err(SentimentError::configuration(format!(
                        "model.l2 must be non-negative, got {l2}"
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn fit(&self, x: &[FeatureVector], y: &[SentimentLabel]) -> SentimentResult<ClassifierModel> {
        self.validate()?;
        let model = match self {
            ClassifierParams::MultinomialNb { .. } => {
                ClassifierModel::MultinomialNb(MultinomialNb::fit(self, x, y)?)
            }
            ClassifierParams::LogisticRegression { .. } => {
                ClassifierModel::LogisticRegression(LogisticRegression::fit(self, x, y)?)
            }
        };
        Ok(model)
    }
}

/// A fitted model of any supported kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum ClassifierModel {
    MultinomialNb(MultinomialNb),
    LogisticRegression(LogisticRegression),
}

impl ClassifierModel {
    pub fn name(&self) -> &'static str {
        match self {
            ClassifierModel::MultinomialNb(_) => "multinomial_nb",
            ClassifierModel::LogisticRegression(_) => "logistic_regression",
        }
    }

    pub fn n_features(&self) -> usize {
        match self {
            ClassifierModel::MultinomialNb(m) => m.n_features,
            ClassifierModel::LogisticRegression(m) => m.n_features,
        }
    }

    pub fn classes(&self) -> &[SentimentLabel] {
        match self {
            ClassifierModel::MultinomialNb(m) => &m.classes,
            ClassifierModel::LogisticRegression(m) => &m.classes,
        }
    }

    pub fn predict(&self, x: &[FeatureVector]) -> Vec<SentimentLabel> {
        match self {
            ClassifierModel::MultinomialNb(m) => m.predict(x),
            ClassifierModel::LogisticRegression(m) => m.predict(x),
        }
    }
}

/// Multinomial naive Bayes with additive smoothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "MultinomialNbState", into = "MultinomialNbState")]
pub struct MultinomialNb {
    classes: Vec<SentimentLabel>,
    n_features: usize,
    class_log_prior: Vec<f64>,
    feature_log_prob: Vec<Vec<f64>>,
}

impl Classifier for MultinomialNb {
    type Params = ClassifierParams;

    fn fit(
        params: &ClassifierParams,
        x: &[FeatureVector],
        y: &[SentimentLabel],
    ) -> SentimentResult<Self> {
        let alpha = match params {
            ClassifierParams::MultinomialNb { alpha } => *alpha,
            other => {
                return Err(SentimentError::configuration(format!(
                    "{} parameters passed to multinomial_nb",
                    other.name()
                )))
            }
        };
        let n_features = check_training_input(x, y)?;
        if x.iter().flatten().any(|v| *v < 0.0) {
            return Err(SentimentError::validation(
                "features",
                "multinomial_nb requires non-negative features",
            ));
        }

        let classes = present_classes(y);
        let mut class_counts = vec![0usize; classes.len()];
        let mut feature_counts = vec![vec![0.0; n_features]; classes.len()];
        for (row, label) in x.iter().zip(y) {
            let c = class_position(&classes, *label);
            class_counts[c] += 1;
            for (acc, v) in feature_counts[c].iter_mut().zip(row) {
                *acc += v;
            }
        }

        let n_rows = y.len() as f64;
        let class_log_prior = class_counts
            .iter()
            .map(|&count| (count as f64 / n_rows).ln())
            .collect();
        let feature_log_prob = feature_counts
            .iter()
            .map(|counts| {
                let total = counts.iter().sum::<f64>() + alpha * n_features as f64;
                counts.iter().map(|c| ((c + alpha) / total).ln()).collect()
            })
            .collect();

        Ok(Self {
            classes,
            n_features,
            class_log_prior,
            feature_log_prob,
        })
    }

    fn predict_row(&self, row: &[f64]) -> SentimentLabel {
        let scores = self
            .class_log_prior
            .iter()
            .zip(&self.feature_log_prob)
            .map(|(prior, log_probs)| {
                prior + row.iter().zip(log_probs).map(|(v, lp)| v * lp).sum::<f64>()
            });
        self.classes[argmax(scores)]
    }
}

/// Multinomial (softmax) logistic regression trained with full-batch
/// gradient descent from zero weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "LogisticRegressionState", into = "LogisticRegressionState")]
pub struct LogisticRegression {
    classes: Vec<SentimentLabel>,
    n_features: usize,
    weights: Vec<Vec<f64>>,
    bias: Vec<f64>,
}

impl LogisticRegression {
    fn logits(&self, row: &[f64]) -> Vec<f64> {
        self.weights
            .iter()
            .zip(&self.bias)
            .map(|(w, b)| b + w.iter().zip(row).map(|(w, v)| w * v).sum::<f64>())
            .collect()
    }
}

impl Classifier for LogisticRegression {
    type Params = ClassifierParams;

    fn fit(
        params: &ClassifierParams,
        x: &[FeatureVector],
        y: &[SentimentLabel],
    ) -> SentimentResult<Self> {
        let (learning_rate, epochs, l2) = match params {
            ClassifierParams::LogisticRegression {
                learning_rate,
                epochs,
                l2,
            } => (*learning_rate, *epochs, *l2),
            other => {
                return Err(SentimentError::configuration(format!(
                    "{} parameters passed to logistic_regression",
                    other.name()
                )))
            }
        };
        let n_features = check_training_input(x, y)?;
        let classes = present_classes(y);
        let targets: Vec<usize> = y.iter().map(|l| class_position(&classes, *l)).collect();

        let mut model = Self {
            weights: vec![vec![0.0; n_features]; classes.len()],
            bias: vec![0.0; classes.len()],
            classes,
            n_features,
        };

        let n_rows = x.len() as f64;
        for _ in 0..epochs {
            let mut grad_w = vec![vec![0.0; n_features]; model.classes.len()];
            let mut grad_b = vec![0.0; model.classes.len()];

            for (row, &target) in x.iter().zip(&targets) {
                let probs = softmax(&model.logits(row));
                for (c, p) in probs.iter().enumerate() {
                    let err = p - if c == target { 1.0 } else { 0.0 };
                    grad_b[c] += err;
                    for (g, v) in grad_w[c].iter_mut().zip(row) {
                        *g += err * v;
                    }
                }
            }

            for c in 0..model.classes.len() {
                for (w, g) in model.weights[c].iter_mut().zip(&grad_w[c]) {
                    *w -= learning_rate * (g / n_rows + l2 * *w);
                }
                model.bias[c] -= learning_rate * grad_b[c] / n_rows;
            }
        }

        Ok(model)
    }

    fn predict_row(&self, row: &[f64]) -> SentimentLabel {
        self.classes[argmax(self.logits(row).into_iter())]
    }
}

#[derive(Serialize, Deserialize)]
struct MultinomialNbState {
    classes: Vec<SentimentLabel>,
    n_features: usize,
    class_log_prior: Vec<f64>,
    feature_log_prob: Vec<Vec<f64>>,
}

impl TryFrom<MultinomialNbState> for MultinomialNb {
    type Error = SentimentError;

    fn try_from(state: MultinomialNbState) -> Result<Self, Self::Error> {
        check_fitted_shape(
            "multinomial_nb",
            &state.classes,
            state.n_features,
            &state.class_log_prior,
            &state.feature_log_prob,
        )?;
        Ok(Self {
            classes: state.classes,
            n_features: state.n_features,
            class_log_prior: state.class_log_prior,
            feature_log_prob: state.feature_log_prob,
        })
    }
}

impl From<MultinomialNb> for MultinomialNbState {
    fn from(m: MultinomialNb) -> Self {
        Self {
            classes: m.classes,
            n_features: m.n_features,
            class_log_prior: m.class_log_prior,
            feature_log_prob: m.feature_log_prob,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct LogisticRegressionState {
    classes: Vec<SentimentLabel>,
    n_features: usize,
    weights: Vec<Vec<f64>>,
    bias: Vec<f64>,
}

impl TryFrom<LogisticRegressionState> for LogisticRegression {
    type Error = SentimentError;

    fn try_from(state: LogisticRegressionState) -> Result<Self, Self::Error> {
        check_fitted_shape(
            "logistic_regression",
            &state.classes,
            state.n_features,
            &state.bias,
            &state.weights,
        )?;
        Ok(Self {
            classes: state.classes,
            n_features: state.n_features,
            weights: state.weights,
            bias: state.bias,
        })
    }
}

impl From<LogisticRegression> for LogisticRegressionState {
    fn from(m: LogisticRegression) -> Self {
        Self {
            classes: m.classes,
            n_features: m.n_features,
            weights: m.weights,
            bias: m.bias,
        }
    }
}

/// A stored model needs one intercept and one `n_features` wide row per
/// class, and at least one distinct class.
fn check_fitted_shape(
    model: &str,
    classes: &[SentimentLabel],
    n_features: usize,
    per_class: &[f64],
    rows: &[Vec<f64>],
) -> SentimentResult<()> {
    if classes.is_empty() {
        return Err(SentimentError::artifact(format!("{model} has no classes")));
    }
    if classes
        .iter()
        .enumerate()
        .any(|(i, c)| classes[..i].contains(c))
    {
        return Err(SentimentError::artifact(format!(
            "{model} lists a class more than once"
        )));
    }
    if per_class.len() != classes.len() || rows.len() != classes.len() {
        return Err(SentimentError::artifact(format!(
            "{model} has {} classes but {} intercepts and {} weight rows",
            classes.len(),
            per_class.len(),
            rows.len()
        )));
    }
    if rows.iter().any(|row| row.len() != n_features) {
        return Err(SentimentError::artifact(format!(
            "{model} weight rows must have {n_features} columns"
        )));
    }
    Ok(())
}

/// Validate a training matrix and return its width.
fn check_training_input(x: &[FeatureVector], y: &[SentimentLabel]) -> SentimentResult<usize> {
    if x.is_empty() {
        return Err(SentimentError::empty_dataset("no training rows"));
    }
    if x.len() != y.len() {
        return Err(SentimentError::validation(
            "labels",
            format!("{} feature rows but {} labels", x.len(), y.len()),
        ));
    }
    let width = x[0].len();
    if x.iter().any(|row| row.len() != width) {
        return Err(SentimentError::validation(
            "features",
            "feature rows have different lengths",
        ));
    }
    Ok(width)
}

/// Labels seen in training, in conventional label order.
fn present_classes(y: &[SentimentLabel]) -> Vec<SentimentLabel> {
    SentimentLabel::ALL
        .into_iter()
        .filter(|label| y.contains(label))
        .collect()
}

fn class_position(classes: &[SentimentLabel], label: SentimentLabel) -> usize {
    classes
        .iter()
        .position(|c| *c == label)
        .unwrap_or_default()
}

/// Index of the largest score; the first one wins ties.
fn argmax(scores: impl Iterator<Item = f64>) -> usize {
    let mut best = 0;
    let mut best_score = f64::NEG_INFINITY;
    for (i, score) in scores.enumerate() {
        if score > best_score {
            best = i;
            best_score = score;
        }
    }
    best
}

fn softmax(logits: &[f64]) -> Vec<f64> {
    let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = logits.iter().map(|l| (l - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}
