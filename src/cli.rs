use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::config::{load_config, PipelineConfig};
use crate::errors::{SentimentError, SentimentResult};
use crate::evaluation::EvaluationDriver;
use crate::logging::{init_tracing, LogLevel};
use crate::pipeline::Pipeline;
use crate::registry::{ModelRegistry, SledModelRegistry};
use crate::serving::{serve, AppState, ModelHandle, ModelSource};
use crate::training::TrainingDriver;

/// Top-level CLI for the comment sentiment pipeline
#[derive(Parser)]
#[command(
    name = "comment-sentiment",
    version,
    about = "Train, evaluate and serve a YouTube comment sentiment classifier"
)]
pub struct Cli {
    /// Params file (defaults to $SENTIMENT_PARAMS_PATH, then params.toml)
    #[arg(long, global = true)]
    pub params: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Ingest the raw dataset, split it and fit the pipeline artifact
    Train,

    /// Score the saved artifact on the test split and register the run
    Evaluate,

    /// Serve the HTTP API
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
        /// Registry run id or `current`
        #[arg(long)]
        run: Option<String>,
        /// Serve an artifact file instead of a registry run
        #[arg(long, conflicts_with = "run")]
        artifact: Option<PathBuf>,
    },

    /// Classify comments from the command line
    Predict {
        #[arg(required = true)]
        texts: Vec<String>,
        #[arg(long)]
        run: Option<String>,
        #[arg(long, conflicts_with = "run")]
        artifact: Option<PathBuf>,
    },

    /// List registered runs
    Runs,

    /// Print the effective configuration as TOML
    Params,
}

pub fn dispatch(cli: Cli) -> SentimentResult<()> {
    let config = load_config(cli.params.as_deref())?;
    let level = config.logging.level.parse::<LogLevel>()?;
    init_tracing(level);

    match cli.command {
        Commands::Train => {
            let mut driver = TrainingDriver::new(&config);
            let outcome = driver.run()?;
            println!(
                "Trained artifact {} ({} features, {} train / {} test rows) at {}",
                outcome.artifact_id,
                outcome.n_features,
                outcome.train_rows,
                outcome.test_rows,
                outcome.artifact_path.display()
            );
        }
        Commands::Evaluate => {
            let registry = SledModelRegistry::open(&config.registry.path)?;
            let outcome = EvaluationDriver::new(&config, &registry).run()?;
            println!("Run {} is now current", outcome.run.run_id);
            for (name, value) in &outcome.run.metrics {
                println!("  {name}: {value:.4}");
            }
        }
        Commands::Serve {
            host,
            port,
            run,
            artifact,
        } => {
            let host = host.unwrap_or_else(|| config.server.host.clone());
            let port = port.unwrap_or(config.server.port);
            let source = model_source(&config, run, artifact)?;

            let rt = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .map_err(|e| SentimentError::io("building tokio runtime", e))?;
            let addr = format!("{host}:{port}");
            rt.block_on(serve(&addr, AppState::new(ModelHandle::new(source))))?;
        }
        Commands::Predict {
            texts,
            run,
            artifact,
        } => {
            let pipeline = match model_source(&config, run, artifact)? {
                ModelSource::Registry { registry, run } => {
                    registry.load_pipeline(&registry.resolve(&run)?)?
                }
                ModelSource::Artifact(path) => Pipeline::load(path)?,
                ModelSource::InMemory(pipeline) => (*pipeline).clone(),
            };
            let labels = pipeline.predict(&texts)?;
            for (text, label) in texts.iter().zip(labels) {
                println!("{:>2}\t{}", label.code(), text);
            }
        }
        Commands::Runs => {
            let registry = SledModelRegistry::open(&config.registry.path)?;
            let current = registry.current_run_id()?;
            for run in registry.list_runs()? {
                let marker = if current.as_deref() == Some(run.run_id.as_str()) {
                    "*"
                } else {
                    " "
                };
                let accuracy = run.metrics.get("test_accuracy").copied().unwrap_or(0.0);
                println!(
                    "{marker} {}  {}  {}  accuracy={accuracy:.4}",
                    run.run_id,
                    run.created_at.to_rfc3339(),
                    run.tags.get("model_name").map(String::as_str).unwrap_or("-"),
                );
            }
        }
        Commands::Params => {
            print!("{}", config.to_toml()?);
        }
    }
    Ok(())
}

fn model_source(
    config: &PipelineConfig,
    run: Option<String>,
    artifact: Option<PathBuf>,
) -> SentimentResult<ModelSource> {
    if let Some(path) = artifact {
        return Ok(ModelSource::Artifact(path));
    }
    let registry: Arc<dyn ModelRegistry> = Arc::new(SledModelRegistry::open(&config.registry.path)?);
    let run = run.unwrap_or_else(|| config.server.run.clone());
    info!("Using registry run selector '{}'", run);
    Ok(ModelSource::Registry { registry, run })
}
