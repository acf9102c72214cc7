use common::error::FetchError;
use common::subgraph::SubgraphClient;
use common::types::Account;
use std::time::Instant;

/// Source of per-wallet lending history.
pub trait AccountFetcher {
    /// Where the request for `wallet` goes; recorded alongside archived bodies.
    fn account_url(&self, wallet: &str) -> String;

    /// Parsed account (`None` when the source has never seen the wallet) plus the raw body.
    fn fetch_account(
        &self,
        wallet: &str,
    ) -> impl std::future::Future<Output = Result<(Option<Account>, Vec<u8>), FetchError>> + Send;
}

impl AccountFetcher for SubgraphClient {
    fn account_url(&self, _wallet: &str) -> String {
        self.url().to_string()
    }

    async fn fetch_account(&self, wallet: &str) -> Result<(Option<Account>, Vec<u8>), FetchError> {
        let start = Instant::now();
        let res = self.fetch_account_raw(wallet).await;
        let ms = start.elapsed().as_secs_f64() * 1000.0;
        metrics::histogram!("credit_scorer_subgraph_latency_ms").record(ms);
        match res {
            Ok(v) => {
                metrics::counter!("credit_scorer_subgraph_requests_total", "status" => "ok")
                    .increment(1);
                Ok(v)
            }
            Err(e) => {
                metrics::counter!("credit_scorer_subgraph_requests_total", "status" => "error")
                    .increment(1);
                metrics::counter!("credit_scorer_subgraph_errors_total", "kind" => e.kind())
                    .increment(1);
                Err(e)
            }
        }
    }
}
