//! txn-sentinel entrypoint: train, score and explain transaction batches from the command line.
//! Logs go to stderr; each stage prints one JSON status line on stdout.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use tracing::{info, warn};
use txn_sentinel::{
    config::SentinelConfig,
    logging::StructuredLogger,
    pipeline::{PipelineContext, Stage, StageStatus},
};

#[derive(Parser)]
#[command(name = "txn-sentinel")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Transaction anomaly detection with explained reports", long_about = None)]
struct Cli {
    /// Config file (falls back to SENTINEL_CONFIG_PATH, then config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fit a new model on a CSV batch and save it
    Train {
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Score a CSV batch against the saved model
    Score {
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Explain flagged transactions and write the reports
    Explain {
        #[arg(short, long)]
        input: PathBuf,

        /// Comma-separated transaction IDs; the batch is scored when omitted
        #[arg(long, value_delimiter = ',')]
        ids: Option<Vec<String>>,
    },

    /// Train, score and explain in one go
    Run {
        #[arg(long)]
        train_input: PathBuf,

        #[arg(short, long)]
        input: PathBuf,
    },
}

fn config_path(cli: &Cli) -> PathBuf {
    cli.config.clone().unwrap_or_else(|| {
        std::env::var("SENTINEL_CONFIG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.json"))
    })
}

fn emit(statuses: &[StageStatus]) -> anyhow::Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for s in statuses {
        StructuredLogger::emit_json(s, &mut out).context("writing status")?;
    }
    out.flush()?;
    Ok(())
}

impl Command {
    fn stage(&self) -> Stage {
        match self {
            Command::Score { .. } => Stage::Score,
            Command::Explain { .. } => Stage::Explain,
            Command::Train { .. } | Command::Run { .. } => Stage::Train,
        }
    }
}

fn execute(ctx: &PipelineContext, command: Command) -> Vec<StageStatus> {
    let stage = command.stage();
    macro_rules! load {
        ($path:expr) => {
            match ctx.load_batch(&$path) {
                Ok(batch) => batch,
                Err(e) => return vec![StageStatus::failed(stage, &e)],
            }
        };
    }

    match command {
        Command::Train { input } => {
            let batch = load!(input);
            vec![ctx.train_status(&batch)]
        }
        Command::Score { input } => {
            let batch = load!(input);
            vec![ctx.score_status(&batch).0]
        }
        Command::Explain { input, ids: Some(ids) } => {
            let batch = load!(input);
            vec![ctx.explain_status(&batch, &ids).0]
        }
        Command::Explain { input, ids: None } => {
            let batch = load!(input);
            let (scored, result) = ctx.score_status(&batch);
            match result {
                Some(result) => {
                    let (explained, _) = ctx.explain_status(&batch, &result.anomaly_ids);
                    vec![scored, explained]
                }
                None => vec![scored],
            }
        }
        Command::Run { train_input, input } => {
            let training = load!(train_input);
            let batch = load!(input);
            let run = ctx.run(&training, &batch);
            info!(run_id = %run.run_id, stages = run.stages.len(), "pipeline run finished");
            run.stages
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let path = config_path(&cli);
    let loaded = SentinelConfig::read(&path);
    let config = loaded.as_ref().cloned().unwrap_or_default();

    // The subscriber depends on the config, so read problems are logged after init.
    StructuredLogger::init(config.log.json, &config.log.level);
    if let Err(e) = &loaded {
        warn!(error = %e, "using default config");
    }
    info!(config = %path.display(), data_dir = ?config.data_dir, "txn-sentinel starting");

    let ctx = PipelineContext::from_config(config).context("invalid configuration")?;
    let statuses = execute(&ctx, cli.command);
    emit(&statuses)?;

    if statuses.iter().any(|s| !s.is_success()) {
        std::process::exit(1);
    }
    Ok(())
}
