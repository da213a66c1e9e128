// lib/src/rules/incremental.rs

//! CPT 99427: principal-care add-on billed per additional 30 minutes beyond
//! the first 30. Always incremental — the marker never advances, and every
//! run re-derives the units owed from the current totals minus the units
//! already billed this period.

use async_trait::async_trait;
use tracing::info;

use models::{BillingResult, CptCode, NewBill, PatientId, ServiceCode};

use crate::eligibility::MarkerGate;

use super::{CptRule, RuleContext, RuleOutcome};

/// Time covered by the base code (99426).
const BASE_SECONDS: i64 = 1800;
/// One add-on unit per further half hour.
const UNIT_SECONDS: i64 = 1800;

#[derive(Debug, Default)]
pub struct IncrementalDurationRule;

impl IncrementalDurationRule {
    pub fn new() -> Self {
        IncrementalDurationRule
    }

    fn earned_units(duration: i64) -> i64 {
        ((duration - BASE_SECONDS) / UNIT_SECONDS).max(0)
    }
}

#[async_trait]
impl CptRule for IncrementalDurationRule {
    fn cpt(&self) -> CptCode {
        CptCode::Cpt99427
    }

    async fn evaluate(
        &self,
        ctx: &RuleContext,
        patients: Option<&[PatientId]>,
    ) -> BillingResult<RuleOutcome> {
        let month_index = ctx.month_index();
        // The marker never advances for this code, so the period gate only
        // screens enrollment; units owed are bounded by the bill counts.
        let candidates = ctx
            .filters
            .active_unbilled(
                self.service(),
                self.cpt(),
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
            .duration_by_patient(&candidates, period_start, None)
            .await?;
        let already = ctx
            .ledger
            .count_bills_since(&candidates, self.cpt(), period_start)
            .await?;

        let mut bills = Vec::new();
        let mut billed = Vec::new();
        for &patient in &candidates {
            let duration = durations.get(&patient).copied().unwrap_or(0);
            let earned = Self::earned_units(duration);
            let prior = already.get(&patient).copied().unwrap_or(0);
            let owed = (earned - prior).max(0);
            if owed == 0 {
                continue;
            }
            for _ in 0..owed {
                bills.push(NewBill::new(patient, self.service(), self.cpt()));
            }
            billed.push((patient, owed as u32));
        }
        ctx.ledger.commit(&bills, &[]).await?;

        if !billed.is_empty() {
            info!(
                "99427: billed {} incremental units across {} patients",
                billed.iter().map(|&(_, u)| u).sum::<u32>(),
                billed.len()
            );
        }
        Ok(RuleOutcome {
            candidates: candidates.len(),
            billed,
            markers_advanced: 0,
        })
    }
}
