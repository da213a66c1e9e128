// lib/src/rules/mod.rs

//! One evaluator per CPT code. Every rule follows the same shape: the
//! enrollment+unbilled gate, a clinical-evidence gate, then one atomic
//! ledger commit of the earned bills and any marker advances.

pub mod device;
pub mod incremental;
pub mod monthly;
pub mod tiered;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use models::{BillingResult, CptCode, PatientId, ServiceCode};

use crate::eligibility::EligibilityFilters;
use crate::ledger::BillLedger;
use crate::period;
use crate::stores::Stores;

pub use device::{DeviceSetupRule, DeviceSupplyRule};
pub use incremental::IncrementalDurationRule;
pub use monthly::MonthlyDurationRule;
pub use tiered::TieredDurationRule;

/// When the scheduler should run a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    Daily,
    /// Only on days `from..=to` of the billing month.
    MonthDays { from: u32, to: u32 },
}

/// Everything one evaluation pass needs: a pinned evaluation instant plus
/// the filters and ledger. A fresh context is opened per invocation.
#[derive(Clone)]
pub struct RuleContext {
    now: DateTime<Utc>,
    pub filters: EligibilityFilters,
    pub ledger: BillLedger,
}

impl RuleContext {
    pub fn new(stores: &Stores) -> Self {
        RuleContext::at(Utc::now(), stores)
    }

    /// Pins the evaluation instant; the normal constructor uses the wall
    /// clock.
    pub fn at(now: DateTime<Utc>, stores: &Stores) -> Self {
        RuleContext {
            now,
            filters: EligibilityFilters::new(stores),
            ledger: BillLedger::new(stores.bills.clone()),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// Month index of the period being evaluated.
    pub fn month_index(&self) -> i32 {
        period::month_index_at(self.now)
    }

    /// First instant of the period being evaluated.
    pub fn period_start(&self) -> DateTime<Utc> {
        period::start_of_month_at(self.now)
    }
}

/// What one rule invocation did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RuleOutcome {
    /// Patients that passed the enrollment+unbilled gate.
    pub candidates: usize,
    /// (patient, units) pairs that were billed this invocation.
    pub billed: Vec<(PatientId, u32)>,
    /// Markers advanced to the evaluated period.
    pub markers_advanced: usize,
}

impl RuleOutcome {
    /// Total bill units emitted.
    pub fn units(&self) -> u32 {
        self.billed.iter().map(|(_, units)| units).sum()
    }
}

#[async_trait]
pub trait CptRule: Send + Sync {
    fn cpt(&self) -> CptCode;

    fn service(&self) -> ServiceCode {
        self.cpt().service()
    }

    fn cadence(&self) -> Cadence {
        Cadence::Daily
    }

    /// Evaluates eligibility and commits any earned bills. `patients`
    /// narrows the pass to an explicit subset (the manual trigger).
    async fn evaluate(
        &self,
        ctx: &RuleContext,
        patients: Option<&[PatientId]>,
    ) -> BillingResult<RuleOutcome>;
}

/// The nine evaluators in their scheduled order.
pub fn all_rules() -> Vec<Arc<dyn CptRule>> {
    vec![
        Arc::new(DeviceSetupRule::new()),
        Arc::new(DeviceSupplyRule::new()),
        Arc::new(MonthlyDurationRule::rpm_management()),
        Arc::new(TieredDurationRule::rpm_additional()),
        Arc::new(MonthlyDurationRule::chronic_care()),
        Arc::new(TieredDurationRule::ccm_additional()),
        Arc::new(MonthlyDurationRule::principal_care()),
        Arc::new(IncrementalDurationRule::new()),
        Arc::new(MonthlyDurationRule::behavioral_health()),
    ]
}

/// The registered evaluator for `cpt`.
pub fn rule_for(cpt: CptCode) -> Arc<dyn CptRule> {
    all_rules()
        .into_iter()
        .find(|rule| rule.cpt() == cpt)
        .expect("every CPT code has a registered rule")
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_covers_every_code() {
        let rules = all_rules();
        assert_eq!(rules.len(), CptCode::ALL.len());
        for cpt in CptCode::ALL {
            assert!(rules.iter().any(|rule| rule.cpt() == cpt));
            assert_eq!(rule_for(cpt).cpt(), cpt);
        }
    }

    #[test]
    fn rules_bill_against_their_own_service() {
        for rule in all_rules() {
            assert_eq!(rule.service(), rule.cpt().service());
        }
    }
}
