// lib/src/rules/device.rs

//! Device-evidence rules: the one-time setup fee (99453) and the monthly
//! device-supply code (99454).

use async_trait::async_trait;
use chrono::Duration;
use tracing::info;

use models::{BillingResult, CptCode, NewBill, PatientId, ServiceCode};

use crate::eligibility::MarkerGate;

use super::{Cadence, CptRule, RuleContext, RuleOutcome};

/// Days a device must stay quiet before it is treated as newly provisioned.
const SETUP_QUIET_DAYS: i64 = 16;

/// Distinct reading days required inside the billing month for 99454.
const SUPPLY_MIN_DAYS: u32 = 16;

/// CPT 99453: initial device setup and patient education.
///
/// Bills once per device lifetime: the marker gate admits only patients
/// whose marker is zero or absent, and the evidence gate is inverted — a
/// reading inside the quiet window means the device is already in use, so
/// setup billing does not apply.
#[derive(Debug, Default)]
pub struct DeviceSetupRule;

impl DeviceSetupRule {
    pub fn new() -> Self {
        DeviceSetupRule
    }
}

#[async_trait]
impl CptRule for DeviceSetupRule {
    fn cpt(&self) -> CptCode {
        CptCode::Cpt99453
    }

    async fn evaluate(
        &self,
        ctx: &RuleContext,
        patients: Option<&[PatientId]>,
    ) -> BillingResult<RuleOutcome> {
        let candidates = ctx
            .filters
            .active_unbilled(self.service(), self.cpt(), MarkerGate::NeverBilled, patients)
            .await?;
        if candidates.is_empty() {
            return Ok(RuleOutcome::default());
        }

        let cutoff = ctx.now() - Duration::days(SETUP_QUIET_DAYS);
        let qualified = ctx.filters.without_telemetry_since(&candidates, cutoff).await?;

        let month_index = ctx.month_index();
        let bills: Vec<NewBill> = qualified
            .iter()
            .map(|&p| NewBill::new(p, self.service(), self.cpt()))
            .collect();
        let markers: Vec<(PatientId, CptCode, i32)> = qualified
            .iter()
            .map(|&p| (p, self.cpt(), month_index))
            .collect();
        ctx.ledger.commit(&bills, &markers).await?;

        if !qualified.is_empty() {
            info!(
                "99453: billed device setup for {} of {} candidates",
                qualified.len(),
                candidates.len()
            );
        }
        Ok(RuleOutcome {
            candidates: candidates.len(),
            billed: qualified.iter().map(|&p| (p, 1)).collect(),
            markers_advanced: markers.len(),
        })
    }
}

/// CPT 99454: device supply with daily recordings. One unit per month once
/// the patient has readings on enough distinct calendar days.
#[derive(Debug, Default)]
pub struct DeviceSupplyRule;

impl DeviceSupplyRule {
    pub fn new() -> Self {
        DeviceSupplyRule
    }
}

#[async_trait]
impl CptRule for DeviceSupplyRule {
    fn cpt(&self) -> CptCode {
        CptCode::Cpt99454
    }

    fn cadence(&self) -> Cadence {
        // The density gate cannot pass before the 16th.
        Cadence::MonthDays { from: 16, to: 31 }
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
                self.service(),
                self.cpt(),
                MarkerGate::BeforePeriod(month_index),
                patients,
            )
            .await?;
        if candidates.is_empty() {
            return Ok(RuleOutcome::default());
        }

        let qualified = ctx
            .filters
            .with_telemetry_days(&candidates, ctx.period_start(), SUPPLY_MIN_DAYS)
            .await?;

        let bills: Vec<NewBill> = qualified
            .iter()
            .map(|&p| NewBill::new(p, self.service(), self.cpt()))
            .collect();
        let markers: Vec<(PatientId, CptCode, i32)> = qualified
            .iter()
            .map(|&p| (p, self.cpt(), month_index))
            .collect();
        ctx.ledger.commit(&bills, &markers).await?;

        if !qualified.is_empty() {
            info!(
                "99454: billed device supply for {} of {} candidates",
                qualified.len(),
                candidates.len()
            );
        }
        Ok(RuleOutcome {
            candidates: candidates.len(),
            billed: qualified.iter().map(|&p| (p, 1)).collect(),
            markers_advanced: markers.len(),
        })
    }
}
