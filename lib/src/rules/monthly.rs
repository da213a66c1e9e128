// lib/src/rules/monthly.rs

//! Single-unit monthly duration codes: one bill per patient per billing
//! month once accumulated interaction time reaches the code's threshold.
//! CPT 99457, 99490, 99426 and 99484 share this shape and differ only in
//! their constants.

use async_trait::async_trait;
use tracing::info;

use models::{BillingResult, CostCategory, CptCode, NewBill, PatientId, ServiceCode};

use crate::eligibility::MarkerGate;

use super::{CptRule, RuleContext, RuleOutcome};

#[derive(Debug, Clone)]
pub struct MonthlyDurationRule {
    cpt: CptCode,
    service: ServiceCode,
    min_seconds: i64,
    category: Option<CostCategory>,
    requires_telemetry: bool,
}

impl MonthlyDurationRule {
    /// CPT 99457: RPM treatment management, first 20 minutes.
    pub fn rpm_management() -> Self {
        MonthlyDurationRule {
            cpt: CptCode::Cpt99457,
            service: ServiceCode::Rpm,
            min_seconds: 1200,
            category: None,
            requires_telemetry: false,
        }
    }

    /// CPT 99490: chronic care management, first 20 minutes.
    pub fn chronic_care() -> Self {
        MonthlyDurationRule {
            cpt: CptCode::Cpt99490,
            service: ServiceCode::Ccm,
            min_seconds: 1200,
            category: None,
            requires_telemetry: false,
        }
    }

    /// CPT 99426: principal care management, first 30 minutes.
    pub fn principal_care() -> Self {
        MonthlyDurationRule {
            cpt: CptCode::Cpt99426,
            service: ServiceCode::Pcm,
            min_seconds: 1800,
            category: None,
            requires_telemetry: false,
        }
    }

    /// CPT 99484: behavioral health integration — 20 minutes of BHI-category
    /// time, and the clinical time must correlate with device data to bill.
    pub fn behavioral_health() -> Self {
        MonthlyDurationRule {
            cpt: CptCode::Cpt99484,
            service: ServiceCode::Bhi,
            min_seconds: 1200,
            category: Some(CostCategory::Bhi),
            requires_telemetry: true,
        }
    }
}

#[async_trait]
impl CptRule for MonthlyDurationRule {
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
        let mut qualified = ctx
            .filters
            .with_min_duration(&candidates, period_start, self.min_seconds, self.category)
            .await?;
        if self.requires_telemetry {
            qualified = ctx
                .filters
                .with_telemetry_since(&qualified, period_start)
                .await?;
        }

        let bills: Vec<NewBill> = qualified
            .iter()
            .map(|&p| NewBill::new(p, self.service, self.cpt))
            .collect();
        let markers: Vec<(PatientId, CptCode, i32)> = qualified
            .iter()
            .map(|&p| (p, self.cpt, month_index))
            .collect();
        ctx.ledger.commit(&bills, &markers).await?;

        if !qualified.is_empty() {
            info!(
                "{}: billed {} of {} candidates",
                self.cpt,
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
