use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use common::config::{Config, DEFAULT_CONFIG_PATH};

use crate::extraction::ExtractionReport;
use crate::jobs::{self, JobContext, Scorer};
use crate::model_scoring::load_model;

const DEFAULT_INPUT: &str = "data/wallets.csv";
const DEFAULT_FEATURES: &str = "data/compound_features.csv";
const DEFAULT_SCORES: &str = "outputs/credit_scores.csv";
const DEFAULT_MODEL_SCORES: &str = "outputs/credit_scores_model.csv";

#[derive(Debug, Parser)]
#[command(name = "credit_scorer")]
#[command(version, about = "Credit scores for Compound V2 wallets")]
pub struct Cli {
    /// TOML config file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    pub config: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

impl Cli {
    /// The chosen subcommand; a bare invocation means `run` with its defaults.
    pub fn into_command(self) -> Command {
        self.command.unwrap_or_else(|| Command::Run {
            input: PathBuf::from(DEFAULT_INPUT),
            output: PathBuf::from(DEFAULT_SCORES),
            column: None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Extract features and score them heuristically.
    Run {
        /// Wallet list (csv, tsv, txt, xlsx or xls)
        #[arg(long, default_value = DEFAULT_INPUT)]
        input: PathBuf,
        #[arg(long, default_value = DEFAULT_SCORES)]
        output: PathBuf,
        /// Wallet column; falls back to `input.wallet_column` from config
        #[arg(long)]
        column: Option<String>,
    },
    /// Extract features only.
    Extract {
        #[arg(long, default_value = DEFAULT_INPUT)]
        input: PathBuf,
        #[arg(long, default_value = DEFAULT_FEATURES)]
        output: PathBuf,
        #[arg(long)]
        column: Option<String>,
    },
    /// Heuristic scores for an existing feature table.
    Score {
        #[arg(long, default_value = DEFAULT_FEATURES)]
        features: PathBuf,
        #[arg(long, default_value = DEFAULT_SCORES)]
        output: PathBuf,
    },
    /// Extract features and score them with the trained model.
    Predict {
        #[arg(long, default_value = DEFAULT_INPUT)]
        input: PathBuf,
        #[arg(long, default_value = DEFAULT_MODEL_SCORES)]
        output: PathBuf,
        /// Model JSON; falls back to `scoring.model_path` from config
        #[arg(long)]
        model: Option<PathBuf>,
        #[arg(long)]
        column: Option<String>,
    },
}

/// Summary line followed by one line per failed wallet.
fn report_lines(report: &ExtractionReport, output: &Path) -> Vec<String> {
    let mut lines = vec![format!(
        "{} of {} wallets processed, {} skipped ({} failed) -> {}",
        report.features.len(),
        report.unique(),
        report.skipped(),
        report.failures.len(),
        output.display()
    )];
    if !report.failures.is_empty() {
        let kinds: Vec<String> = report
            .failures_by_kind()
            .into_iter()
            .map(|(kind, n)| format!("{kind}={n}"))
            .collect();
        lines.push(format!("failures: {}", kinds.join(", ")));
    }
    lines.extend(
        report
            .failures
            .iter()
            .map(|f| format!("  {} [{}] {}", f.wallet, f.error.kind(), f.error)),
    );
    lines
}

fn print_report(report: &ExtractionReport, output: &Path) {
    for line in report_lines(report, output) {
        println!("{line}");
    }
}

pub async fn run_command(cfg: &Config, cmd: Command) -> Result<()> {
    let column_or_default =
        |column: Option<String>| column.unwrap_or_else(|| cfg.input.wallet_column.clone());

    match cmd {
        Command::Score { features, output } => {
            let scored = jobs::score_feature_file(&features, &output)?;
            println!("{scored} wallets scored -> {}", output.display());
        }
        Command::Extract {
            input,
            output,
            column,
        } => {
            let client = jobs::build_client(cfg)?;
            let archive = jobs::open_archive(cfg)?;
            let ctx = JobContext {
                fetcher: &client,
                concurrency: cfg.subgraph.max_concurrent_requests,
                archive: archive.as_ref(),
            };
            let report = ctx
                .extract_to_csv(&input, &column_or_default(column), &output)
                .await?;
            print_report(&report, &output);
        }
        Command::Run {
            input,
            output,
            column,
        } => {
            let client = jobs::build_client(cfg)?;
            let archive = jobs::open_archive(cfg)?;
            let ctx = JobContext {
                fetcher: &client,
                concurrency: cfg.subgraph.max_concurrent_requests,
                archive: archive.as_ref(),
            };
            let report = ctx
                .score_wallets(
                    &input,
                    &column_or_default(column),
                    &Scorer::Heuristic,
                    &output,
                )
                .await?;
            print_report(&report, &output);
        }
        Command::Predict {
            input,
            output,
            model,
            column,
        } => {
            // Model problems are fatal before any wallet is fetched.
            let model_path = model.unwrap_or_else(|| PathBuf::from(&cfg.scoring.model_path));
            let scorer = Scorer::Model(load_model(&model_path)?);
            let client = jobs::build_client(cfg)?;
            let archive = jobs::open_archive(cfg)?;
            let ctx = JobContext {
                fetcher: &client,
                concurrency: cfg.subgraph.max_concurrent_requests,
                archive: archive.as_ref(),
            };
            let report = ctx
                .score_wallets(&input, &column_or_default(column), &scorer, &output)
                .await?;
            print_report(&report, &output);
        }
    }
    Ok(())
}
