use std::collections::{BTreeMap, HashSet};

use common::db::Database;
use common::error::FetchError;
use common::types::Account;
use futures_util::stream::{self, StreamExt};

use crate::fetcher::AccountFetcher;
use crate::wallet_features::{aggregate, save_wallet_features, FeatureRecord};

/// Result of processing one wallet.
#[derive(Debug)]
pub enum WalletOutcome {
    Extracted(FeatureRecord),
    /// The source has no history for this wallet. Not an error.
    NotFound,
    Failed(FetchError),
}

impl WalletOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Extracted(_) => "extracted",
            Self::NotFound => "not_found",
            Self::Failed(_) => "failed",
        }
    }
}

#[derive(Debug)]
pub struct WalletFailure {
    pub wallet: String,
    pub error: FetchError,
}

/// Feature table plus an account of every wallet that did not produce a row.
#[derive(Debug, Default)]
pub struct ExtractionReport {
    /// Non-blank identifiers in the input, before de-duplication.
    pub requested: usize,
    pub features: Vec<FeatureRecord>,
    pub not_found: Vec<String>,
    pub failures: Vec<WalletFailure>,
}

impl ExtractionReport {
    pub fn unique(&self) -> usize {
        self.features.len() + self.not_found.len() + self.failures.len()
    }

    /// Wallets without a feature row, whether unknown to the source or failed.
    pub fn skipped(&self) -> usize {
        self.not_found.len() + self.failures.len()
    }

    /// Failure counts keyed by `FetchError::kind`.
    pub fn failures_by_kind(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for failure in &self.failures {
            *counts.entry(failure.error.kind()).or_insert(0) += 1;
        }
        counts
    }

    fn record(&mut self, wallet: &str, outcome: WalletOutcome) {
        metrics::counter!("credit_scorer_wallets_total", "outcome" => outcome.as_str())
            .increment(1);
        match outcome {
            WalletOutcome::Extracted(features) => self.features.push(features),
            WalletOutcome::NotFound => {
                tracing::debug!(wallet = %wallet, "wallet has no protocol history");
                self.not_found.push(wallet.to_string());
            }
            WalletOutcome::Failed(error) => {
                tracing::warn!(
                    wallet = %wallet,
                    kind = error.kind(),
                    error = %error,
                    "feature extraction failed for wallet; skipping"
                );
                self.failures.push(WalletFailure {
                    wallet: wallet.to_string(),
                    error,
                });
            }
        }
    }
}

/// Drop blanks and collapse case variants. The first spelling of each wallet is kept.
pub fn dedupe_wallets<I, S>(wallets: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    wallets
        .into_iter()
        .filter_map(|w| {
            let w = w.as_ref().trim();
            if w.is_empty() || !seen.insert(w.to_lowercase()) {
                None
            } else {
                Some(w.to_string())
            }
        })
        .collect()
}

fn outcome_for(account: Option<&Account>) -> WalletOutcome {
    match account {
        Some(a) if a.id.trim().is_empty() => {
            WalletOutcome::Failed(FetchError::Malformed("account has no id".to_string()))
        }
        account => aggregate(account).map_or(WalletOutcome::NotFound, WalletOutcome::Extracted),
    }
}

/// Best effort: archive problems are logged and never cost a wallet its row.
fn archive_response(db: &Database, wallet: &str, url: &str, body: &[u8]) {
    if let Err(e) = db.save_raw_response(wallet, url, body) {
        tracing::warn!(wallet = %wallet, error = %e, "failed to archive raw subgraph response");
    }
}

fn archive_features(db: &Database, features: &FeatureRecord) {
    if let Err(e) = save_wallet_features(&db.conn, features) {
        tracing::warn!(wallet = %features.wallet, error = %e, "failed to archive wallet features");
    }
}

/// Fetch and aggregate every distinct wallet.
///
/// Up to `concurrency` requests are in flight; rows always come back in input order.
/// Fetch failures are recorded in the report and never abort the batch.
pub async fn extract_features<F, S>(
    fetcher: &F,
    wallets: &[S],
    concurrency: usize,
    archive: Option<&Database>,
) -> ExtractionReport
where
    F: AccountFetcher + Sync,
    S: AsRef<str>,
{
    let mut report = ExtractionReport {
        requested: wallets.iter().filter(|w| !w.as_ref().trim().is_empty()).count(),
        ..ExtractionReport::default()
    };
    let unique = dedupe_wallets(wallets);

    let mut results = stream::iter(unique.iter())
        .map(|wallet| async move { (wallet, fetcher.fetch_account(wallet).await) })
        .buffered(concurrency.max(1));

    while let Some((wallet, result)) = results.next().await {
        let outcome = match result {
            Ok((account, body)) => {
                if let Some(db) = archive {
                    archive_response(db, wallet, &fetcher.account_url(wallet), &body);
                }
                outcome_for(account.as_ref())
            }
            Err(e) => WalletOutcome::Failed(e),
        };
        if let (Some(db), WalletOutcome::Extracted(features)) = (archive, &outcome) {
            archive_features(db, features);
        }
        report.record(wallet, outcome);
    }

    tracing::info!(
        requested = report.requested,
        unique = report.unique(),
        extracted = report.features.len(),
        not_found = report.not_found.len(),
        failed = report.failures.len(),
        "feature extraction finished"
    );
    report
}
