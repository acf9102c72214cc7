use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use common::config::Config;
use common::db::Database;
use common::subgraph::SubgraphClient;

use crate::extraction::{extract_features, ExtractionReport};
use crate::fetcher::AccountFetcher;
use crate::model_scoring::{predict_scores, RegressionModel};
use crate::tables::{self, CreditScore, ScoreRow};
use crate::wallet_features::FeatureRecord;
use crate::wallet_scoring::compute_credit_score;

/// Subgraph client built from config. Fails when the API key is absent.
pub fn build_client(cfg: &Config) -> Result<SubgraphClient> {
    let api_key = cfg.subgraph.api_key_from_env()?;
    Ok(SubgraphClient::new(
        &cfg.subgraph.url,
        &api_key,
        Duration::from_secs(cfg.subgraph.timeout_secs),
    )?)
}

pub fn open_archive(cfg: &Config) -> Result<Option<Database>> {
    let Some(path) = cfg.database.path.as_deref() else {
        return Ok(None);
    };
    if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let db = Database::open_migrated(path)?;
    tracing::info!(path, "archiving subgraph responses");
    Ok(Some(db))
}

pub enum Scorer {
    Heuristic,
    Model(Box<dyn RegressionModel>),
}

impl Scorer {
    fn label(&self) -> &'static str {
        match self {
            Self::Heuristic => "heuristic",
            Self::Model(_) => "model",
        }
    }

    /// One row per feature record, same order.
    pub fn score(&self, records: &[FeatureRecord]) -> Result<Vec<ScoreRow>> {
        let rows: Vec<ScoreRow> = match self {
            Self::Heuristic => records
                .iter()
                .map(|r| ScoreRow {
                    wallet_id: r.wallet.clone(),
                    credit_score: CreditScore::Heuristic(compute_credit_score(r)),
                })
                .collect(),
            Self::Model(model) => predict_scores(model.as_ref(), records)?
                .into_iter()
                .map(|(wallet_id, score)| ScoreRow {
                    wallet_id,
                    credit_score: CreditScore::Model(score),
                })
                .collect(),
        };
        metrics::counter!("credit_scorer_wallets_scored_total", "scorer" => self.label())
            .increment(rows.len() as u64);
        Ok(rows)
    }
}

/// Fetcher plus batch settings shared by every job that talks to the subgraph.
pub struct JobContext<'a, F> {
    pub fetcher: &'a F,
    pub concurrency: usize,
    pub archive: Option<&'a Database>,
}

impl<F> JobContext<'_, F>
where
    F: AccountFetcher + Sync,
{
    pub async fn extract(&self, input: &Path, column: &str) -> Result<ExtractionReport> {
        let wallets = tables::read_wallet_list(input, column)?;
        tracing::info!(
            path = %input.display(),
            column,
            wallets = wallets.len(),
            "loaded wallet list"
        );
        Ok(extract_features(self.fetcher, &wallets, self.concurrency, self.archive).await)
    }

    pub async fn extract_to_csv(
        &self,
        input: &Path,
        column: &str,
        output: &Path,
    ) -> Result<ExtractionReport> {
        let report = self.extract(input, column).await?;
        tables::write_features_csv(output, &report.features)?;
        log_summary(&report, "extract", output);
        Ok(report)
    }

    /// Extract, score, then write. Nothing is written if scoring fails.
    pub async fn score_wallets(
        &self,
        input: &Path,
        column: &str,
        scorer: &Scorer,
        output: &Path,
    ) -> Result<ExtractionReport> {
        let report = self.extract(input, column).await?;
        let rows = scorer.score(&report.features)?;
        tables::write_scores_csv(output, &rows)?;
        log_summary(&report, scorer.label(), output);
        Ok(report)
    }
}

/// Heuristic scores for a feature table already on disk.
pub fn score_feature_file(features: &Path, output: &Path) -> Result<usize> {
    let records = tables::read_features_csv(features)?;
    let rows = Scorer::Heuristic.score(&records)?;
    tables::write_scores_csv(output, &rows)?;
    tracing::info!(
        features = %features.display(),
        output = %output.display(),
        scored = rows.len(),
        "scored feature table"
    );
    Ok(rows.len())
}

fn log_summary(report: &ExtractionReport, stage: &str, output: &Path) {
    tracing::info!(
        stage,
        output = %output.display(),
        requested = report.requested,
        unique = report.unique(),
        processed = report.features.len(),
        skipped = report.skipped(),
        failed = report.failures.len(),
        "run finished"
    );
    if !report.failures.is_empty() {
        let wallets: Vec<&str> = report.failures.iter().map(|f| f.wallet.as_str()).collect();
        tracing::warn!(
            stage,
            by_kind = ?report.failures_by_kind(),
            wallets = ?wallets,
            "wallets skipped after fetch failures"
        );
    }
}
