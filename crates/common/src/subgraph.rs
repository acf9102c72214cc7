use crate::error::{ConfigurationError, FetchError};
use crate::types::{summarize_graphql_errors, Account, AccountQueryData, GraphQlResponse};
use std::time::Duration;
use tracing::debug;

pub const ACCOUNT_QUERY: &str = "
query($addr: ID!) {
  account(id: $addr) {
    id
    borrowCount
    depositCount
    liquidateCount
    liquidationCount
    repayCount
    withdrawCount
    borrows { amountUSD timestamp }
    deposits { amountUSD timestamp }
    repays { amountUSD timestamp }
    liquidates { amountUSD timestamp }
    liquidations { amountUSD timestamp }
  }
}
";

const MAX_ERROR_BODY_CHARS: usize = 512;

/// Compound V2 subgraph client. One POST per wallet, bearer-authenticated.
pub struct SubgraphClient {
    url: String,
    api_key: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for SubgraphClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubgraphClient")
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

impl SubgraphClient {
    pub fn new(url: &str, api_key: &str, timeout: Duration) -> Result<Self, ConfigurationError> {
        if api_key.trim().is_empty() {
            return Err(ConfigurationError::Invalid(
                "subgraph API key must not be empty".to_string(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConfigurationError::Invalid(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            url: url.trim_end_matches('/').to_string(),
            api_key: api_key.trim().to_string(),
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// GraphQL request body. Account ids are lowercase in the subgraph.
    pub fn request_body(wallet: &str) -> serde_json::Value {
        serde_json::json!({
            "query": ACCOUNT_QUERY,
            "variables": { "addr": wallet.trim().to_lowercase() },
        })
    }

    /// Fetch one account. Returns the parsed account (if the subgraph knows it)
    /// and the raw response body.
    pub async fn fetch_account_raw(
        &self,
        wallet: &str,
    ) -> Result<(Option<Account>, Vec<u8>), FetchError> {
        debug!(wallet = wallet, "querying subgraph account");

        let resp = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&Self::request_body(wallet))
            .send()
            .await?;

        let status = resp.status();
        let body = resp.bytes().await?.to_vec();
        if !status.is_success() {
            let text = String::from_utf8_lossy(&body);
            return Err(FetchError::Status {
                status: status.as_u16(),
                body: text.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }

        let account = parse_account_response(&body)?;
        Ok((account, body))
    }
}

/// Decode a subgraph response body. An `errors` payload wins over partial data.
pub fn parse_account_response(body: &[u8]) -> Result<Option<Account>, FetchError> {
    let resp: GraphQlResponse<AccountQueryData> =
        serde_json::from_slice(body).map_err(|e| FetchError::Malformed(e.to_string()))?;

    if let Some(errors) = resp.errors {
        return Err(FetchError::Upstream(summarize_graphql_errors(&errors)));
    }

    let data = resp
        .data
        .ok_or_else(|| FetchError::Malformed("response has neither data nor errors".to_string()))?;
    Ok(data.account)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_lowercases_wallet() {
        let body = SubgraphClient::request_body(" 0xAbCdEF ");
        assert_eq!(body["variables"]["addr"], "0xabcdef");
        assert!(body["query"].as_str().unwrap().contains("liquidations"));
    }

    #[test]
    fn test_new_rejects_empty_api_key() {
        let res = SubgraphClient::new("https://example.com/", "  ", Duration::from_secs(60));
        assert!(res.is_err());

        let client =
            SubgraphClient::new("https://example.com/", "key", Duration::from_secs(60)).unwrap();
        assert_eq!(client.url(), "https://example.com");
    }

    #[test]
    fn test_debug_omits_api_key() {
        let client =
            SubgraphClient::new("https://example.com", "secret-key", Duration::from_secs(5)).unwrap();
        let dbg = format!("{client:?}");
        assert!(dbg.contains("https://example.com"));
        assert!(!dbg.contains("secret-key"));
    }

    #[test]
    fn test_parse_response_account_found() {
        let body = include_bytes!("../../../tests/fixtures/account_sample.json");
        let account = parse_account_response(body).unwrap().unwrap();
        assert_eq!(account.id, "0x502cb8985b2c92f8d0abcdef1234567890abcdef");
        assert_eq!(account.liquidation_count, 1);
    }

    #[test]
    fn test_parse_response_unknown_account() {
        let account = parse_account_response(br#"{"data":{"account":null}}"#).unwrap();
        assert!(account.is_none());
    }

    #[test]
    fn test_parse_response_errors_payload() {
        let err = parse_account_response(br#"{"errors":[{"message":"bad indexers"}]}"#)
            .unwrap_err();
        assert_eq!(err.kind(), "upstream");
        assert!(err.to_string().contains("bad indexers"));
    }

    #[test]
    fn test_parse_response_malformed() {
        let err = parse_account_response(b"<html>gateway timeout</html>").unwrap_err();
        assert_eq!(err.kind(), "malformed");

        let err = parse_account_response(b"{}").unwrap_err();
        assert_eq!(err.kind(), "malformed");
    }
}
