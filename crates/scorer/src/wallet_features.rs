use anyhow::Result;
use common::types::{Account, AccountEvent};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

pub const SECONDS_PER_DAY: i64 = 86_400;

/// Model input columns in training order. `wallet` is the row key, not a feature.
pub const FEATURE_COLUMNS: [&str; 12] = [
    "borrow_count",
    "deposit_count",
    "repay_count",
    "liquidation_count",
    "liquidates_count",
    "withdraw_count",
    "total_borrow_usd",
    "total_repay_usd",
    "total_deposit_usd",
    "total_liquidated_usd",
    "total_got_liquidated_usd",
    "active_days",
];

/// Fixed-shape summary of one wallet's lending history.
///
/// Field order is the column order of the feature table on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    pub wallet: String,
    pub borrow_count: u64,
    pub deposit_count: u64,
    pub repay_count: u64,
    /// Times the wallet was liquidated.
    pub liquidation_count: u64,
    /// Times the wallet acted as liquidator.
    pub liquidates_count: u64,
    pub withdraw_count: u64,
    pub total_borrow_usd: f64,
    pub total_repay_usd: f64,
    pub total_deposit_usd: f64,
    /// Volume repaid on behalf of others while liquidating.
    pub total_liquidated_usd: f64,
    /// Volume seized from this wallet in liquidations.
    pub total_got_liquidated_usd: f64,
    pub active_days: u64,
}

impl FeatureRecord {
    /// Values in `FEATURE_COLUMNS` order.
    #[allow(clippy::cast_precision_loss)]
    pub fn feature_vector(&self) -> [f64; 12] {
        [
            self.borrow_count as f64,
            self.deposit_count as f64,
            self.repay_count as f64,
            self.liquidation_count as f64,
            self.liquidates_count as f64,
            self.withdraw_count as f64,
            self.total_borrow_usd,
            self.total_repay_usd,
            self.total_deposit_usd,
            self.total_liquidated_usd,
            self.total_got_liquidated_usd,
            self.active_days as f64,
        ]
    }
}

#[cfg(test)]
impl FeatureRecord {
    pub fn empty(wallet: &str) -> Self {
        Self {
            wallet: wallet.to_string(),
            borrow_count: 0,
            deposit_count: 0,
            repay_count: 0,
            liquidation_count: 0,
            liquidates_count: 0,
            withdraw_count: 0,
            total_borrow_usd: 0.0,
            total_repay_usd: 0.0,
            total_deposit_usd: 0.0,
            total_liquidated_usd: 0.0,
            total_got_liquidated_usd: 0.0,
            active_days: 0,
        }
    }
}

fn usd_or_zero(event: &AccountEvent) -> f64 {
    match event.amount_usd {
        Some(v) if v.is_finite() && v > 0.0 => v,
        _ => 0.0,
    }
}

/// Sum of `amountUSD`; missing, malformed or negative amounts count as zero.
pub fn sum_usd(events: &[AccountEvent]) -> f64 {
    events.iter().map(usd_or_zero).sum()
}

/// Whole days between the earliest and latest timestamped event. Untimed events are ignored.
pub fn active_days<'a, I>(event_lists: I) -> u64
where
    I: IntoIterator<Item = &'a [AccountEvent]>,
{
    let mut timestamps = event_lists
        .into_iter()
        .flatten()
        .filter_map(|e| e.timestamp);
    let Some(first) = timestamps.next() else {
        return 0;
    };
    let (earliest, latest) = timestamps.fold((first, first), |(lo, hi), ts| {
        (lo.min(ts), hi.max(ts))
    });
    let span = latest.saturating_sub(earliest);
    u64::try_from(span.div_euclid(SECONDS_PER_DAY)).unwrap_or(0)
}

/// Aggregate one account into a feature row. No account, no row.
pub fn aggregate(account: Option<&Account>) -> Option<FeatureRecord> {
    let account = account?;

    Some(FeatureRecord {
        wallet: account.id.clone(),
        borrow_count: account.borrow_count,
        deposit_count: account.deposit_count,
        repay_count: account.repay_count,
        liquidation_count: account.liquidation_count,
        liquidates_count: account.liquidate_count,
        withdraw_count: account.withdraw_count,
        total_borrow_usd: sum_usd(&account.borrows),
        total_repay_usd: sum_usd(&account.repays),
        total_deposit_usd: sum_usd(&account.deposits),
        total_liquidated_usd: sum_usd(&account.liquidates),
        total_got_liquidated_usd: sum_usd(&account.liquidations),
        active_days: active_days([
            account.borrows.as_slice(),
            account.repays.as_slice(),
            account.deposits.as_slice(),
        ]),
    })
}

pub fn save_wallet_features(conn: &Connection, features: &FeatureRecord) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO wallet_features
         (wallet, borrow_count, deposit_count, repay_count, liquidation_count, liquidates_count,
          withdraw_count, total_borrow_usd, total_repay_usd, total_deposit_usd,
          total_liquidated_usd, total_got_liquidated_usd, active_days)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        rusqlite::params![
            features.wallet,
            features.borrow_count,
            features.deposit_count,
            features.repay_count,
            features.liquidation_count,
            features.liquidates_count,
            features.withdraw_count,
            features.total_borrow_usd,
            features.total_repay_usd,
            features.total_deposit_usd,
            features.total_liquidated_usd,
            features.total_got_liquidated_usd,
            features.active_days,
        ],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::db::Database;

    fn ev(amount: f64, ts: Option<i64>) -> AccountEvent {
        AccountEvent::new(amount, ts)
    }

    fn fixture_account() -> Account {
        let body = include_bytes!("../../../tests/fixtures/account_sample.json");
        common::subgraph::parse_account_response(body)
            .unwrap()
            .unwrap()
    }

    #[test]
    fn test_aggregate_fixture_account() {
        let f = aggregate(Some(&fixture_account())).unwrap();

        assert_eq!(f.wallet, "0x502cb8985b2c92f8d0abcdef1234567890abcdef");
        assert_eq!(f.borrow_count, 2);
        assert_eq!(f.deposit_count, 3);
        assert_eq!(f.liquidation_count, 1);
        assert_eq!(f.liquidates_count, 0);
        assert_eq!(f.withdraw_count, 1);
        assert!((f.total_borrow_usd - 1000.0).abs() < 1e-9);
        assert!((f.total_deposit_usd - 1500.0).abs() < 1e-9);
        assert!((f.total_repay_usd - 1000.0).abs() < 1e-9);
        assert!((f.total_got_liquidated_usd - 250.0).abs() < 1e-9);
        assert!(f.total_liquidated_usd.abs() < f64::EPSILON);
        // 1588204800 (first deposit) .. 1619827200 (last deposit)
        assert_eq!(f.active_days, 366);
    }

    #[test]
    fn test_aggregate_absent_account_yields_no_row() {
        assert!(aggregate(None).is_none());
    }

    #[test]
    fn test_aggregate_is_deterministic() {
        let account = fixture_account();
        assert_eq!(aggregate(Some(&account)), aggregate(Some(&account)));
    }

    #[test]
    fn test_sum_usd_treats_bad_amounts_as_zero() {
        let events = vec![
            ev(10.5, None),
            AccountEvent {
                amount_usd: None,
                timestamp: Some(1),
            },
            ev(f64::NAN, None),
            ev(f64::INFINITY, None),
            ev(-40.0, None),
            ev(4.5, None),
        ];
        assert!((sum_usd(&events) - 15.0).abs() < f64::EPSILON);
        assert!(sum_usd(&[]).abs() < f64::EPSILON);
    }

    #[test]
    fn test_active_days_ignores_untimed_events() {
        let borrows = vec![ev(1.0, Some(1_000_000)), ev(1.0, None)];
        let repays = vec![ev(1.0, Some(1_000_000 + 3 * SECONDS_PER_DAY + 500))];
        let deposits: Vec<AccountEvent> = vec![ev(1.0, None)];
        assert_eq!(
            active_days([borrows.as_slice(), repays.as_slice(), deposits.as_slice()]),
            3
        );
    }

    #[test]
    fn test_active_days_single_or_no_timestamp() {
        let one = vec![ev(1.0, Some(1_700_000_000))];
        assert_eq!(active_days([one.as_slice()]), 0);

        let none = vec![ev(1.0, None), ev(2.0, None)];
        assert_eq!(active_days([none.as_slice()]), 0);
        assert_eq!(active_days(Vec::<&[AccountEvent]>::new()), 0);
    }

    #[test]
    fn test_active_days_is_order_independent() {
        let events = vec![
            ev(1.0, Some(10 * SECONDS_PER_DAY)),
            ev(1.0, Some(SECONDS_PER_DAY)),
            ev(1.0, Some(5 * SECONDS_PER_DAY)),
        ];
        assert_eq!(active_days([events.as_slice()]), 9);
    }

    #[test]
    fn test_liquidation_events_do_not_count_toward_active_days() {
        let account = Account {
            id: "0xw".to_string(),
            borrows: vec![ev(100.0, Some(0))],
            liquidations: vec![ev(50.0, Some(400 * SECONDS_PER_DAY))],
            ..Account::default()
        };
        let f = aggregate(Some(&account)).unwrap();
        assert_eq!(f.active_days, 0);
        assert!((f.total_got_liquidated_usd - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_feature_vector_matches_column_order() {
        let mut f = FeatureRecord::empty("0xw");
        f.liquidates_count = 7;
        f.total_got_liquidated_usd = 12.5;
        f.active_days = 30;
        let v = f.feature_vector();
        let idx = |name: &str| FEATURE_COLUMNS.iter().position(|c| *c == name).unwrap();
        assert!((v[idx("liquidates_count")] - 7.0).abs() < f64::EPSILON);
        assert!((v[idx("total_got_liquidated_usd")] - 12.5).abs() < f64::EPSILON);
        assert!((v[idx("active_days")] - 30.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_save_wallet_features_upserts() {
        let db = Database::open_migrated(":memory:").unwrap();

        let mut f = FeatureRecord::empty("0xabc");
        f.borrow_count = 3;
        save_wallet_features(&db.conn, &f).unwrap();
        f.borrow_count = 4;
        f.total_borrow_usd = 99.5;
        save_wallet_features(&db.conn, &f).unwrap();

        let (count, borrow_count, total): (i64, i64, f64) = db
            .conn
            .query_row(
                "SELECT COUNT(*), MAX(borrow_count), MAX(total_borrow_usd) FROM wallet_features",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(borrow_count, 4);
        assert!((total - 99.5).abs() < f64::EPSILON);
    }
}
