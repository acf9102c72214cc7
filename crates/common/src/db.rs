use anyhow::{Context, Result};
use rusqlite::Connection;

/// SQLite archive of raw subgraph responses and extracted feature rows.
pub struct Database {
    pub conn: Connection,
}

impl Database {
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open archive database: {path}"))?;
        conn.busy_timeout(std::time::Duration::from_secs(30))?;
        Ok(Self { conn })
    }

    /// Open and migrate in one step.
    pub fn open_migrated(path: &str) -> Result<Self> {
        let db = Self::open(path)?;
        db.run_migrations()?;
        Ok(db)
    }

    pub fn run_migrations(&self) -> Result<()> {
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Store the response body exactly as received, before parsing.
    pub fn save_raw_response(&self, wallet: &str, url: &str, body: &[u8]) -> Result<()> {
        self.conn.execute(
            "INSERT INTO raw_api_responses (api, wallet, url, response_body) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params!["compound_v2_subgraph", wallet, url, body],
        )?;
        Ok(())
    }
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS raw_api_responses (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    api TEXT NOT NULL,
    wallet TEXT NOT NULL,
    url TEXT NOT NULL,
    response_body BLOB NOT NULL,
    fetched_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_raw_api_responses_wallet ON raw_api_responses(wallet);

CREATE TABLE IF NOT EXISTS wallet_features (
    wallet TEXT PRIMARY KEY,
    borrow_count INTEGER NOT NULL,
    deposit_count INTEGER NOT NULL,
    repay_count INTEGER NOT NULL,
    liquidation_count INTEGER NOT NULL,
    liquidates_count INTEGER NOT NULL,
    withdraw_count INTEGER NOT NULL,
    total_borrow_usd REAL NOT NULL,
    total_repay_usd REAL NOT NULL,
    total_deposit_usd REAL NOT NULL,
    total_liquidated_usd REAL NOT NULL,
    total_got_liquidated_usd REAL NOT NULL,
    active_days INTEGER NOT NULL,
    extracted_at TEXT NOT NULL DEFAULT (datetime('now'))
);
";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_create_tables() {
        let db = Database::open(":memory:").unwrap();
        db.run_migrations().unwrap();

        let tables: Vec<String> = db
            .conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();
        assert!(tables.contains(&"raw_api_responses".to_string()));
        assert!(tables.contains(&"wallet_features".to_string()));
    }

    #[test]
    fn test_migrations_idempotent() {
        let db = Database::open(":memory:").unwrap();
        db.run_migrations().unwrap();
        db.run_migrations().unwrap();
    }

    #[test]
    fn test_save_raw_response_keeps_bytes() {
        let db = Database::open_migrated(":memory:").unwrap();
        db.save_raw_response("0xabc", "https://example.com", br#"{"data":{"account":null}}"#)
            .unwrap();

        let (wallet, body): (String, Vec<u8>) = db
            .conn
            .query_row(
                "SELECT wallet, response_body FROM raw_api_responses",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(wallet, "0xabc");
        assert_eq!(body, br#"{"data":{"account":null}}"#.to_vec());
    }
}
