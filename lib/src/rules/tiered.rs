// lib/src/rules/tiered.rs

//! Tiered add-on codes (99458, 99439): a first tier at 40 minutes and a
//! terminal second tier at 60. Units already billed this period are
//! subtracted from the units the duration has earned, and the marker is
//! held back until the top tier is reached so later runs in the same month
//! can bill newly earned units.

use async_trait::async_trait;
use tracing::info;

use models::{BillingResult, CostCategory, CptCode, NewBill, PatientId, ServiceCode};

use crate::eligibility::MarkerGate;

use super::{CptRule, RuleContext, RuleOutcome};

const TIER1_SECONDS: i64 = 2400;
const TIER2_SECONDS: i64 = 3600;

#[derive(Debug, Clone)]
pub struct TieredDurationRule {
    cpt: CptCode,
    service: ServiceCode,
    category: Option<CostCategory>,
}

impl TieredDurationRule {
    /// CPT 99458: RPM treatment management, each additional 20 minutes.
    pub fn rpm_additional() -> Self {
        TieredDurationRule {
            cpt: CptCode::Cpt99458,
            service: ServiceCode::Rpm,
            category: None,
        }
    }

    /// CPT 99439: chronic care management additional time. Duration is
    /// aggregated across all cost categories.
    pub fn ccm_additional() -> Self {
        TieredDurationRule {
            cpt: CptCode::Cpt99439,
            service: ServiceCode::Ccm,
            category: None,
        }
    }

    fn required_units(duration: i64) -> i64 {
        if duration >= TIER2_SECONDS {
            2
        } else if duration >= TIER1_SECONDS {
            1
        } else {
            0
        }
    }
}

#[async_trait]
impl CptRule for TieredDurationRule {
    fn cpt(&self) -> CptCode {
        self.cpt
    }

    fn service(&self) -> ServiceCode {
        self.service
    }

    async fn evaluate(
        &self,
        ctx: &RuleContext,
        patients: Option<&[PatientId]>,
    ) -> BillingResult<RuleOutcome> {
        let month_index = ctx.month_index();
        let candidates = ctx
            .filters
            .active_unbilled(
                self.service,
                self.cpt,
                MarkerGate::BeforePeriod(month_index),
                patients,
            )
            .await?;
        if candidates.is_empty() {
            return Ok(RuleOutcome::default());
        }

        let period_start = ctx.period_start();
        let durations = ctx
            .filters
            .duration_by_patient(&candidates, period_start, self.category)
            .await?;
        let already = ctx
            .ledger
            .count_bills_since(&candidates, self.cpt, period_start)
            .await?;

        let mut bills = Vec::new();
        let mut markers = Vec::new();
        let mut billed = Vec::new();
        for &patient in &candidates {
            let duration = durations.get(&patient).copied().unwrap_or(0);
            let required = Self::required_units(duration);
            if required == 0 {
                continue;
            }
            let prior = already.get(&patient).copied().unwrap_or(0);
            let owed = (required - prior).max(0);
            for _ in 0..owed {
                bills.push(NewBill::new(patient, self.service, self.cpt));
            }
            if owed > 0 {
                billed.push((patient, owed as u32));
            }
            // Only the terminal tier closes out the period for this patient.
            if duration >= TIER2_SECONDS {
                markers.push((patient, self.cpt, month_index));
            }
        }
        ctx.ledger.commit(&bills, &markers).await?;

        if !billed.is_empty() {
            info!(
                "{}: billed {} additional units across {} patients",
                self.cpt,
                billed.iter().map(|&(_, u)| u).sum::<u32>(),
                billed.len()
            );
        }
        Ok(RuleOutcome {
            candidates: candidates.len(),
            billed,
            markers_advanced: markers.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::testutil::{enroll, fixed_now, log_interaction, memory_context};
    use chrono::Duration;

    #[tokio::test]
    async fn sixty_five_minutes_earns_both_units_at_once() {
        let now = fixed_now();
        let (store, ctx) = memory_context(now);
        enroll(&store, 7, ServiceCode::Ccm);
        log_interaction(&store, 7, 65 * 60, CostCategory::Ccm, now - Duration::days(4));

        let rule = TieredDurationRule::ccm_additional();
        let outcome = rule.evaluate(&ctx, None).await.unwrap();
        assert_eq!(outcome.billed, vec![(7, 2)]);
        assert_eq!(store.bills().unwrap().len(), 2);
        assert_eq!(store.marker(7, CptCode::Cpt99439).unwrap(), Some(ctx.month_index()));

        // Terminal tier reached: the next run excludes the patient entirely.
        let rerun = rule.evaluate(&ctx, None).await.unwrap();
        assert_eq!(rerun.candidates, 0);
        assert_eq!(store.bills().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn partial_tier_defers_the_marker_for_later_accrual() {
        let now = fixed_now();
        let (store, ctx) = memory_context(now);
        enroll(&store, 7, ServiceCode::Rpm);
        log_interaction(&store, 7, 45 * 60, CostCategory::Rpm, now - Duration::days(8));

        let rule = TieredDurationRule::rpm_additional();
        let first = rule.evaluate(&ctx, None).await.unwrap();
        assert_eq!(first.billed, vec![(7, 1)]);
        // Tier 1 only: no marker yet, so the rule can re-run this month.
        assert_eq!(store.marker(7, CptCode::Cpt99458).unwrap(), None);

        // Unchanged data: nothing further is owed.
        let unchanged = rule.evaluate(&ctx, None).await.unwrap();
        assert_eq!(unchanged.units(), 0);

        // More time is logged later in the month; only the delta is billed.
        log_interaction(&store, 7, 20 * 60, CostCategory::Rpm, now - Duration::days(1));
        let second = rule.evaluate(&ctx, None).await.unwrap();
        assert_eq!(second.billed, vec![(7, 1)]);
        assert_eq!(store.bills().unwrap().len(), 2);
        assert_eq!(store.marker(7, CptCode::Cpt99458).unwrap(), Some(ctx.month_index()));
    }

    #[tokio::test]
    async fn below_tier_one_bills_nothing() {
        let now = fixed_now();
        let (store, ctx) = memory_context(now);
        enroll(&store, 7, ServiceCode::Rpm);
        log_interaction(&store, 7, 39 * 60, CostCategory::Rpm, now - Duration::days(2));

        let outcome = TieredDurationRule::rpm_additional()
            .evaluate(&ctx, None)
            .await
            .unwrap();
        assert_eq!(outcome.candidates, 1);
        assert!(outcome.billed.is_empty());
        assert!(store.bills().unwrap().is_empty());
    }

    #[test]
    fn tier_thresholds_are_exact() {
        assert_eq!(TieredDurationRule::required_units(2399), 0);
        assert_eq!(TieredDurationRule::required_units(2400), 1);
        assert_eq!(TieredDurationRule::required_units(3599), 1);
        assert_eq!(TieredDurationRule::required_units(3600), 2);
    }
}
