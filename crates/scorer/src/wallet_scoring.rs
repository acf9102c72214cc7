use crate::wallet_features::FeatureRecord;

pub const BASE_SCORE: f64 = 500.0;
pub const MIN_SCORE: f64 = 0.0;
pub const MAX_SCORE: f64 = 1000.0;

/// Per-signal contributions added onto `BASE_SCORE`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScoreBreakdown {
    pub repayment: f64,
    pub collateralization: f64,
    pub liquidation_severity: f64,
    pub liquidation_frequency: f64,
    pub withdrawal_frequency: f64,
    pub liquidator_reward: f64,
    pub longevity: f64,
    pub full_repayment_bonus: f64,
}

impl ScoreBreakdown {
    pub fn total(&self) -> f64 {
        self.repayment
            + self.collateralization
            + self.liquidation_severity
            + self.liquidation_frequency
            + self.withdrawal_frequency
            + self.liquidator_reward
            + self.longevity
            + self.full_repayment_bonus
    }
}

/// `numerator / total_borrow_usd`, or `None` when nothing was borrowed.
fn borrow_ratio(numerator: f64, total_borrow_usd: f64) -> Option<f64> {
    (total_borrow_usd > 0.0).then_some(numerator / total_borrow_usd)
}

/// Repaid volume relative to borrowed volume, capped at 2x. 0..+300.
pub fn repayment_score(total_repay_usd: f64, total_borrow_usd: f64) -> f64 {
    borrow_ratio(total_repay_usd, total_borrow_usd).map_or(0.0, |r| 150.0 * r.min(2.0))
}

/// Deposits relative to borrowed volume, capped at 2x. 0..+200.
pub fn collateralization_score(total_deposit_usd: f64, total_borrow_usd: f64) -> f64 {
    borrow_ratio(total_deposit_usd, total_borrow_usd).map_or(0.0, |r| 100.0 * r.min(2.0))
}

/// Volume lost to liquidations relative to borrowed volume. -150..0.
pub fn liquidation_severity_penalty(total_got_liquidated_usd: f64, total_borrow_usd: f64) -> f64 {
    borrow_ratio(total_got_liquidated_usd, total_borrow_usd).map_or(0.0, |r| -150.0 * r.min(1.0))
}

/// -20 per liquidation suffered, at most five counted.
#[allow(clippy::cast_precision_loss)]
pub fn liquidation_frequency_penalty(liquidation_count: u64) -> f64 {
    -20.0 * liquidation_count.min(5) as f64
}

/// -10 per withdrawal, at most five counted.
#[allow(clippy::cast_precision_loss)]
pub fn withdrawal_frequency_penalty(withdraw_count: u64) -> f64 {
    -10.0 * withdraw_count.min(5) as f64
}

/// Volume repaid while acting as liquidator, saturating at $10k. 0..+50.
pub fn liquidator_reward_score(total_liquidated_usd: f64) -> f64 {
    50.0 * (total_liquidated_usd / 10_000.0).min(1.0)
}

/// Saturates after one year of activity. 0..+50.
#[allow(clippy::cast_precision_loss)]
pub fn longevity_score(active_days: u64) -> f64 {
    50.0 * (active_days as f64 / 365.0).min(1.0)
}

/// +50 when every borrow has a matching repay.
pub fn full_repayment_bonus(borrow_count: u64, repay_count: u64) -> f64 {
    if borrow_count > 0 && repay_count >= borrow_count {
        50.0
    } else {
        0.0
    }
}

pub fn score_breakdown(f: &FeatureRecord) -> ScoreBreakdown {
    ScoreBreakdown {
        repayment: repayment_score(f.total_repay_usd, f.total_borrow_usd),
        collateralization: collateralization_score(f.total_deposit_usd, f.total_borrow_usd),
        liquidation_severity: liquidation_severity_penalty(
            f.total_got_liquidated_usd,
            f.total_borrow_usd,
        ),
        liquidation_frequency: liquidation_frequency_penalty(f.liquidation_count),
        withdrawal_frequency: withdrawal_frequency_penalty(f.withdraw_count),
        liquidator_reward: liquidator_reward_score(f.total_liquidated_usd),
        longevity: longevity_score(f.active_days),
        full_repayment_bonus: full_repayment_bonus(f.borrow_count, f.repay_count),
    }
}

/// Heuristic credit score in [0, 1000]. The clamped sum is truncated, not rounded.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn compute_credit_score(features: &FeatureRecord) -> u32 {
    let raw = BASE_SCORE + score_breakdown(features).total();
    if raw.is_nan() {
        return BASE_SCORE as u32;
    }
    raw.clamp(MIN_SCORE, MAX_SCORE).trunc() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> FeatureRecord {
        FeatureRecord::empty("0xabc")
    }

    #[test]
    fn test_zero_activity_scores_base() {
        assert_eq!(compute_credit_score(&record()), 500);
        assert_eq!(score_breakdown(&record()), ScoreBreakdown::default());
    }

    #[test]
    fn test_reference_wallet_scores_900() {
        let f = FeatureRecord {
            borrow_count: 2,
            repay_count: 2,
            total_borrow_usd: 1000.0,
            total_repay_usd: 1000.0,
            total_deposit_usd: 1500.0,
            active_days: 365,
            ..record()
        };
        let b = score_breakdown(&f);
        assert!((b.repayment - 150.0).abs() < 1e-9);
        assert!((b.collateralization - 150.0).abs() < 1e-9);
        assert!((b.longevity - 50.0).abs() < 1e-9);
        assert!((b.full_repayment_bonus - 50.0).abs() < 1e-9);
        assert_eq!(compute_credit_score(&f), 900);
    }

    #[test]
    fn test_borrow_guarded_terms_are_zero_without_borrows() {
        // Deposits and liquidations alone cannot move the ratio terms.
        let f = FeatureRecord {
            total_deposit_usd: 1_000_000.0,
            total_repay_usd: 500.0,
            total_got_liquidated_usd: 50.0,
            ..record()
        };
        let b = score_breakdown(&f);
        assert!(b.repayment.abs() < f64::EPSILON);
        assert!(b.collateralization.abs() < f64::EPSILON);
        assert!(b.liquidation_severity.abs() < f64::EPSILON);
        assert_eq!(compute_credit_score(&f), 500);
    }

    #[test]
    fn test_repayment_monotonic_until_cap() {
        let mut last = 0;
        for repay in [0.0, 100.0, 500.0, 1000.0, 1500.0, 2000.0] {
            let f = FeatureRecord {
                total_borrow_usd: 1000.0,
                total_repay_usd: repay,
                ..record()
            };
            let s = compute_credit_score(&f);
            assert!(s >= last, "repay={repay} scored {s} < {last}");
            last = s;
        }
        let at_cap = FeatureRecord {
            total_borrow_usd: 1000.0,
            total_repay_usd: 2000.0,
            ..record()
        };
        let past_cap = FeatureRecord {
            total_repay_usd: 50_000.0,
            ..at_cap.clone()
        };
        assert_eq!(compute_credit_score(&at_cap), compute_credit_score(&past_cap));
    }

    #[test]
    fn test_penalties_saturate() {
        assert!((liquidation_frequency_penalty(3) + 60.0).abs() < f64::EPSILON);
        assert!((liquidation_frequency_penalty(50) + 100.0).abs() < f64::EPSILON);
        assert!((withdrawal_frequency_penalty(2) + 20.0).abs() < f64::EPSILON);
        assert!((withdrawal_frequency_penalty(9) + 50.0).abs() < f64::EPSILON);
        assert!((liquidation_severity_penalty(5000.0, 1000.0) + 150.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_rewards_saturate() {
        assert!((liquidator_reward_score(5_000.0) - 25.0).abs() < 1e-9);
        assert!((liquidator_reward_score(1e9) - 50.0).abs() < 1e-9);
        assert!((longevity_score(730) - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_full_repayment_bonus_requires_borrows() {
        assert!(full_repayment_bonus(0, 3).abs() < f64::EPSILON);
        assert!(full_repayment_bonus(3, 2).abs() < f64::EPSILON);
        assert!((full_repayment_bonus(3, 3) - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_score_is_truncated_not_rounded() {
        // 500 + 100 * 0.999 = 599.9
        let f = FeatureRecord {
            total_borrow_usd: 1000.0,
            total_deposit_usd: 999.0,
            ..record()
        };
        assert_eq!(compute_credit_score(&f), 599);
    }

    #[test]
    fn test_worst_case_is_all_penalties() {
        let f = FeatureRecord {
            total_borrow_usd: 1000.0,
            total_got_liquidated_usd: 1000.0,
            liquidation_count: 10,
            withdraw_count: 10,
            ..record()
        };
        // 500 - 150 - 100 - 50
        assert_eq!(compute_credit_score(&f), 200);
    }

    #[test]
    fn test_best_case_clamps_to_max() {
        let f = FeatureRecord {
            borrow_count: 1,
            repay_count: 1,
            total_borrow_usd: 1.0,
            total_repay_usd: 10.0,
            total_deposit_usd: 10.0,
            total_liquidated_usd: 1e6,
            active_days: 10_000,
            ..record()
        };
        // 500 + 300 + 200 + 50 + 50 + 50 = 1150 before clamping
        assert_eq!(compute_credit_score(&f), 1000);
    }

    #[test]
    fn test_score_always_in_range() {
        for borrow in [0.0, 1.0, 1e3, 1e12] {
            for repay in [0.0, 1.0, 1e6] {
                for liq in [0_u64, 1, 7] {
                    let f = FeatureRecord {
                        total_borrow_usd: borrow,
                        total_repay_usd: repay,
                        total_got_liquidated_usd: repay,
                        liquidation_count: liq,
                        withdraw_count: liq,
                        ..record()
                    };
                    assert!(compute_credit_score(&f) <= 1000);
                }
            }
        }
    }
}
