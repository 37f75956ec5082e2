use std::str::FromStr;
use std::time::Instant;

use crate::errors::SentimentError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

impl FromStr for LogLevel {
    type Err = SentimentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(SentimentError::configuration(format!(
                "logging.level '{other}' is not one of trace, debug, info, warn, error"
            ))),
        }
    }
}

/// Install the global fmt subscriber. Later calls are no-ops, which keeps
/// tests that initialize logging more than once happy.
pub fn init_tracing(level: LogLevel) {
    let _ = tracing_subscriber::fmt()
        .with_max_level(level.to_tracing_level())
        .with_target(false)
        .try_init();
}

/// Logs how long a pipeline stage took when dropped. A timer dropped without
/// [`StageTimer::finish`] reports the stage as failed.
pub struct StageTimer {
    stage: &'static str,
    started: Instant,
    finished: bool,
}

impl StageTimer {
    pub fn start(stage: &'static str) -> Self {
        tracing::info!("Initiating {stage} stage...");
        Self {
            stage,
            started: Instant::now(),
            finished: false,
        }
    }

    /// Mark the stage as completed; the summary is logged on drop.
    pub fn finish(mut self) {
        self.finished = true;
    }

    fn summary(&self) -> String {
        let outcome = if self.finished { "ends" } else { "failed" };
        format!(
            "{} stage {} after {:.3} seconds.",
            self.stage,
            outcome,
            self.started.elapsed().as_secs_f64()
        )
    }
}

impl Drop for StageTimer {
    fn drop(&mut self) {
        if self.finished {
            tracing::info!("{}", self.summary());
        } else {
            tracing::warn!("{}", self.summary());
        }
    }
}
