//! Quota calculation: turns a stage's budget fields into concrete counts.
//!
//! ```text
//! max_clusters          = resolve(max_clusters,    total = |cluster units|)
//! stage_max_clusters    = max_clusters - |done|
//! max_unavailable       = resolve(max_unavailable, total = stage_max_clusters)
//! stage_max_unavailable = min(max_unavailable, |stage units|) - |in progress|
//! ```
//!
//! Both stage values may go negative; [`QuotaPlan::admission_count`]
//! clamps at zero.

use serde::{Deserialize, Serialize};

pub use stagegrid_core::RoundingMode;
use stagegrid_state::{QuotaValue, Stage};

use crate::error::QuotaError;

/// Resolve an absolute-or-percentage field against `total`.
///
/// `field` names the stage field for error reporting.
pub fn resolve(
    field: &'static str,
    value: &QuotaValue,
    total: i64,
    rounding: RoundingMode,
) -> Result<i64, QuotaError> {
    let invalid = |reason: &str| QuotaError {
        field,
        value: value.to_string(),
        reason: reason.to_string(),
    };

    match value {
        QuotaValue::Int(n) if *n < 0 => Err(invalid("must not be negative")),
        QuotaValue::Int(n) => Ok(*n),
        QuotaValue::Str(s) => {
            let digits = s
                .strip_suffix('%')
                .ok_or_else(|| invalid("expected an integer or a percentage like \"25%\""))?;
            if digits.starts_with('-') {
                return Err(invalid("must not be negative"));
            }
            // Plain ASCII digits only: no sign, no whitespace.
            if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid("percentage must be a whole number"));
            }
            let percent: i64 = digits
                .parse()
                .map_err(|_| invalid("percentage out of range"))?;
            let scaled = percent
                .checked_mul(total)
                .ok_or_else(|| invalid("percentage out of range"))?;
            Ok(match rounding {
                RoundingMode::Down => scaled.div_euclid(100),
                RoundingMode::Up => -(-scaled).div_euclid(100),
            })
        }
    }
}

/// Validate both quota fields of a stage without a live total.
pub fn validate(stage: &Stage) -> Result<(), QuotaError> {
    resolve("max_clusters", &stage.max_clusters, 0, RoundingMode::Down)?;
    resolve("max_unavailable", &stage.max_unavailable, 0, RoundingMode::Down)?;
    Ok(())
}

/// Live unit counts feeding the quota arithmetic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QuotaInputs {
    pub cluster_units: usize,
    pub stage_units: usize,
    pub done: usize,
    pub in_progress: usize,
}

/// Concrete budgets for one stage in one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaPlan {
    pub max_clusters: i64,
    /// Remaining cluster budget after units already done.
    pub stage_max_clusters: i64,
    pub max_unavailable: i64,
    /// Remaining concurrency slots after units already in progress.
    pub stage_max_unavailable: i64,
}

impl QuotaPlan {
    /// Compute the plan for `stage` from live counts.
    pub fn compute(
        stage: &Stage,
        inputs: QuotaInputs,
        rounding: RoundingMode,
    ) -> Result<Self, QuotaError> {
        let max_clusters = resolve(
            "max_clusters",
            &stage.max_clusters,
            inputs.cluster_units as i64,
            rounding,
        )?;
        let stage_max_clusters = max_clusters - inputs.done as i64;
        let max_unavailable = resolve(
            "max_unavailable",
            &stage.max_unavailable,
            stage_max_clusters,
            rounding,
        )?;
        let stage_max_unavailable =
            max_unavailable.min(inputs.stage_units as i64) - inputs.in_progress as i64;

        Ok(Self {
            max_clusters,
            stage_max_clusters,
            max_unavailable,
            stage_max_unavailable,
        })
    }

    /// How many of `to_do` units may be dispatched now. Never negative.
    pub fn admission_count(&self, to_do: usize) -> usize {
        if self.stage_max_clusters <= 0 || to_do == 0 {
            return 0;
        }
        self.stage_max_unavailable.clamp(0, to_do as i64) as usize
    }

    /// Whether the stage has consumed its cluster budget.
    pub fn is_complete(&self, done: usize) -> bool {
        done as i64 >= self.stage_max_clusters
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage(max_clusters: QuotaValue, max_unavailable: QuotaValue) -> Stage {
        Stage {
            name: "test".to_string(),
            clusters: String::new(),
            requeue: None,
            max_clusters,
            max_unavailable,
        }
    }

    #[test]
    fn resolves_absolute_values_as_is() {
        let v = QuotaValue::Int(7);
        assert_eq!(resolve("max_clusters", &v, 3, RoundingMode::Down), Ok(7));
    }

    #[test]
    fn resolves_percentages_with_rounding() {
        let v = QuotaValue::from("33%");
        assert_eq!(resolve("max_clusters", &v, 10, RoundingMode::Down), Ok(3));
        assert_eq!(resolve("max_clusters", &v, 10, RoundingMode::Up), Ok(4));

        let half = QuotaValue::from("50%");
        assert_eq!(resolve("max_clusters", &half, 10, RoundingMode::Down), Ok(5));
        assert_eq!(resolve("max_clusters", &half, 0, RoundingMode::Up), Ok(0));
    }

    #[test]
    fn percentages_of_negative_totals_round_consistently() {
        let half = QuotaValue::from("50%");
        assert_eq!(resolve("max_unavailable", &half, -3, RoundingMode::Down), Ok(-2));
        assert_eq!(resolve("max_unavailable", &half, -3, RoundingMode::Up), Ok(-1));
    }

    #[test]
    fn rejects_malformed_fields_naming_the_field() {
        for bad in ["abc", "50", "50.5%", "%", "-10%"] {
            let err = resolve("max_unavailable", &QuotaValue::from(bad), 10, RoundingMode::Down)
                .unwrap_err();
            assert_eq!(err.field, "max_unavailable");
            assert_eq!(err.value, bad);
        }
        let err = resolve("max_clusters", &QuotaValue::Int(-1), 10, RoundingMode::Down).unwrap_err();
        assert_eq!(err.field, "max_clusters");
    }

    #[test]
    fn percentage_is_bare_digits_then_percent() {
        for bad in [" 50% ", "50 %", " 50%", "+50%", "5 0%", "٥٠%"] {
            let err = resolve("max_clusters", &QuotaValue::from(bad), 10, RoundingMode::Down)
                .unwrap_err();
            assert_eq!(err.value, bad);
            assert_eq!(err.reason, "percentage must be a whole number", "{bad:?}");
        }
        let err = resolve("max_clusters", &QuotaValue::from("50% "), 10, RoundingMode::Down)
            .unwrap_err();
        assert_eq!(err.value, "50% ");
        assert_eq!(
            resolve("max_clusters", &QuotaValue::from("050%"), 10, RoundingMode::Down).unwrap(),
            5
        );
    }

    #[test]
    fn validate_checks_both_fields() {
        assert!(validate(&stage(QuotaValue::from("100%"), QuotaValue::Int(1))).is_ok());
        let err = validate(&stage(QuotaValue::from("100%"), QuotaValue::from("one"))).unwrap_err();
        assert_eq!(err.field, "max_unavailable");
    }

    #[test]
    fn all_done_completes_the_stage() {
        // 5 units, all done, max 100%.
        let plan = QuotaPlan::compute(
            &stage(QuotaValue::from("100%"), QuotaValue::Int(1)),
            QuotaInputs {
                cluster_units: 5,
                stage_units: 5,
                done: 5,
                in_progress: 0,
            },
            RoundingMode::Down,
        )
        .unwrap();
        assert_eq!(plan.max_clusters, 5);
        assert_eq!(plan.stage_max_clusters, 0);
        assert!(plan.is_complete(5));
        assert_eq!(plan.admission_count(0), 0);
    }

    #[test]
    fn half_of_ten_admits_one_at_a_time() {
        let plan = QuotaPlan::compute(
            &stage(QuotaValue::from("50%"), QuotaValue::Int(1)),
            QuotaInputs {
                cluster_units: 10,
                stage_units: 10,
                done: 0,
                in_progress: 0,
            },
            RoundingMode::Down,
        )
        .unwrap();
        assert_eq!(plan.max_clusters, 5);
        assert_eq!(plan.stage_max_clusters, 5);
        assert_eq!(plan.stage_max_unavailable, 1);
        assert_eq!(plan.admission_count(10), 1);
        assert!(!plan.is_complete(0));
    }

    #[test]
    fn in_progress_beyond_budget_clamps_admission_to_zero() {
        let plan = QuotaPlan::compute(
            &stage(QuotaValue::Int(4), QuotaValue::Int(1)),
            QuotaInputs {
                cluster_units: 4,
                stage_units: 4,
                done: 0,
                in_progress: 3,
            },
            RoundingMode::Down,
        )
        .unwrap();
        assert_eq!(plan.stage_max_unavailable, -2);
        assert_eq!(plan.admission_count(4), 0);
    }

    #[test]
    fn admission_never_exceeds_to_do() {
        let plan = QuotaPlan::compute(
            &stage(QuotaValue::Int(10), QuotaValue::Int(5)),
            QuotaInputs {
                cluster_units: 10,
                stage_units: 10,
                done: 0,
                in_progress: 0,
            },
            RoundingMode::Down,
        )
        .unwrap();
        assert_eq!(plan.stage_max_unavailable, 5);
        assert_eq!(plan.admission_count(2), 2);
    }

    #[test]
    fn stage_budget_shrinks_as_units_finish() {
        let s = stage(QuotaValue::Int(6), QuotaValue::Int(2));
        let mut previous = i64::MAX;
        for done in 0..=6 {
            let plan = QuotaPlan::compute(
                &s,
                QuotaInputs {
                    cluster_units: 6,
                    stage_units: 6,
                    done,
                    in_progress: 0,
                },
                RoundingMode::Down,
            )
            .unwrap();
            assert!(plan.stage_max_clusters < previous);
            previous = plan.stage_max_clusters;
            if done as i64 >= plan.stage_max_clusters {
                assert!(plan.is_complete(done));
            }
        }
    }
}
