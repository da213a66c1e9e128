// lib/src/scheduler.rs

//! Drives the rule evaluators: a recurring batch pass with per-rule failure
//! isolation, plus a manual single-patient trigger.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::{interval, sleep};
use tracing::{debug, error, info};

use models::{BillingError, BillingResult, CptCode, PatientId};

use crate::config::SchedulerConfig;
use crate::period;
use crate::rules::{all_rules, rule_for, Cadence, CptRule, RuleContext, RuleOutcome};
use crate::stores::Stores;

/// Outcome of one rule inside a batch pass.
#[derive(Debug, Clone, Serialize)]
pub struct RuleRun {
    pub cpt: CptCode,
    pub outcome: Result<RuleOutcome, String>,
}

/// What a whole batch pass did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub runs: Vec<RuleRun>,
}

impl RunSummary {
    pub fn bills_emitted(&self) -> u32 {
        self.runs
            .iter()
            .filter_map(|run| run.outcome.as_ref().ok())
            .map(RuleOutcome::units)
            .sum()
    }

    pub fn failed(&self) -> usize {
        self.runs.iter().filter(|run| run.outcome.is_err()).count()
    }
}

pub struct RuleScheduler {
    stores: Stores,
    config: SchedulerConfig,
    rules: Vec<Arc<dyn CptRule>>,
}

impl RuleScheduler {
    pub fn new(stores: Stores, config: SchedulerConfig) -> Self {
        RuleScheduler {
            stores,
            config,
            rules: all_rules(),
        }
    }

    /// Replaces the registered rule set; the batch driver is otherwise
    /// agnostic to what it runs.
    pub fn with_rules(mut self, rules: Vec<Arc<dyn CptRule>>) -> Self {
        self.rules = rules;
        self
    }

    /// Runs every rule due today, sequentially, isolating failures.
    pub async fn run_all_rules(&self) -> RunSummary {
        self.run_all_rules_at(Utc::now()).await
    }

    /// Batch pass with a pinned evaluation instant.
    pub async fn run_all_rules_at(&self, now: DateTime<Utc>) -> RunSummary {
        let day = period::day_of_month_at(now);
        let mut summary = RunSummary::default();
        let mut first = true;
        for rule in &self.rules {
            if !cadence_due(rule.cadence(), day) {
                debug!("{}: not due on day {} of the month", rule.cpt(), day);
                continue;
            }
            // A short pause between rules keeps the storage backend from
            // seeing the whole batch at once.
            if !first {
                sleep(StdDuration::from_millis(self.config.inter_rule_delay_ms)).await;
            }
            first = false;

            let result = self.run_rule_isolated(rule.clone(), now, None).await;
            match &result {
                Ok(outcome) => info!(
                    "{}: {} candidates, {} units billed",
                    rule.cpt(),
                    outcome.candidates,
                    outcome.units()
                ),
                Err(e) => error!("{}: rule run failed: {}", rule.cpt(), e),
            }
            summary.runs.push(RuleRun {
                cpt: rule.cpt(),
                outcome: result.map_err(|e| e.to_string()),
            });
        }
        summary
    }

    /// Manual on-demand pass of one rule for one patient, e.g. after a new
    /// interaction is logged. The code to evaluate is always explicit.
    pub async fn run_rule_for_patient(
        &self,
        cpt: CptCode,
        patient: PatientId,
    ) -> BillingResult<RuleOutcome> {
        self.run_rule_for_patient_at(cpt, patient, Utc::now()).await
    }

    pub async fn run_rule_for_patient_at(
        &self,
        cpt: CptCode,
        patient: PatientId,
        now: DateTime<Utc>,
    ) -> BillingResult<RuleOutcome> {
        let rule = self
            .rules
            .iter()
            .find(|rule| rule.cpt() == cpt)
            .cloned()
            .unwrap_or_else(|| rule_for(cpt));
        self.run_rule_isolated(rule, now, Some(vec![patient])).await
    }

    /// Recurring driver: one batch pass per tick until the task is dropped.
    pub async fn run_forever(&self) {
        let mut ticker = interval(StdDuration::from_secs(self.config.tick_interval_secs));
        loop {
            ticker.tick().await;
            let summary = self.run_all_rules().await;
            info!(
                "billing pass complete: {} units billed, {} rule failures",
                summary.bills_emitted(),
                summary.failed()
            );
        }
    }

    /// One rule in its own task, so a panic inside a query or evaluator
    /// cannot take down the batch. Each invocation opens a fresh context.
    async fn run_rule_isolated(
        &self,
        rule: Arc<dyn CptRule>,
        now: DateTime<Utc>,
        patients: Option<Vec<PatientId>>,
    ) -> BillingResult<RuleOutcome> {
        let ctx = RuleContext::at(now, &self.stores);
        let handle = tokio::spawn(async move { rule.evaluate(&ctx, patients.as_deref()).await });
        match handle.await {
            Ok(result) => result,
            Err(join_err) => Err(BillingError::InternalError(format!(
                "rule task failed to join: {join_err:?}"
            ))),
        }
    }
}

fn cadence_due(cadence: Cadence, day: u32) -> bool {
    match cadence {
        Cadence::Daily => true,
        Cadence::MonthDays { from, to } => day >= from && day <= to,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::testutil::{enroll, fixed_now, log_interaction, memory_context};
    use crate::rules::MonthlyDurationRule;
    use crate::stores::MemoryStore;
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};
    use models::{CostCategory, ServiceCode};

    struct FailingRule;

    #[async_trait]
    impl CptRule for FailingRule {
        fn cpt(&self) -> CptCode {
            CptCode::Cpt99490
        }

        async fn evaluate(
            &self,
            _ctx: &RuleContext,
            _patients: Option<&[PatientId]>,
        ) -> BillingResult<RuleOutcome> {
            Err(BillingError::StorageError("interaction query failed".to_string()))
        }
    }

    struct PanickingRule;

    #[async_trait]
    impl CptRule for PanickingRule {
        fn cpt(&self) -> CptCode {
            CptCode::Cpt99426
        }

        async fn evaluate(
            &self,
            _ctx: &RuleContext,
            _patients: Option<&[PatientId]>,
        ) -> BillingResult<RuleOutcome> {
            panic!("evaluator bug");
        }
    }

    fn scheduler_over(store: &std::sync::Arc<MemoryStore>) -> RuleScheduler {
        let stores = crate::stores::Stores::from_shared(store.clone());
        let config = SchedulerConfig {
            tick_interval_secs: 86_400,
            inter_rule_delay_ms: 0,
        };
        RuleScheduler::new(stores, config)
    }

    #[tokio::test]
    async fn one_broken_rule_does_not_stop_the_batch() {
        let now = fixed_now();
        let (store, _ctx) = memory_context(now);
        enroll(&store, 10, ServiceCode::Rpm);
        log_interaction(&store, 10, 1300, CostCategory::Rpm, now - Duration::days(2));

        let scheduler = scheduler_over(&store).with_rules(vec![
            Arc::new(FailingRule),
            Arc::new(PanickingRule),
            Arc::new(MonthlyDurationRule::rpm_management()),
        ]);
        let summary = scheduler.run_all_rules_at(now).await;

        assert_eq!(summary.runs.len(), 3);
        assert_eq!(summary.failed(), 2);
        // The healthy rule still billed.
        assert_eq!(summary.bills_emitted(), 1);
        assert_eq!(store.bills().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn density_rule_waits_for_the_sixteenth() {
        let (store, _ctx) = memory_context(fixed_now());
        let scheduler = scheduler_over(&store);

        // June 10th: 99454 is skipped, the eight daily rules run.
        let early = Utc.with_ymd_and_hms(2025, 6, 10, 15, 0, 0).unwrap();
        let summary = scheduler.run_all_rules_at(early).await;
        assert_eq!(summary.runs.len(), 8);
        assert!(summary.runs.iter().all(|run| run.cpt != CptCode::Cpt99454));

        // June 20th: the full set runs.
        let late = fixed_now();
        let summary = scheduler.run_all_rules_at(late).await;
        assert_eq!(summary.runs.len(), 9);
    }

    #[tokio::test]
    async fn manual_trigger_evaluates_the_named_code_for_one_patient() {
        let now = fixed_now();
        let (store, _ctx) = memory_context(now);
        enroll(&store, 10, ServiceCode::Rpm);
        enroll(&store, 20, ServiceCode::Rpm);
        for patient in [10, 20] {
            log_interaction(&store, patient, 1400, CostCategory::Rpm, now - Duration::days(2));
        }

        let scheduler = scheduler_over(&store);
        let outcome = scheduler
            .run_rule_for_patient_at(CptCode::Cpt99457, 20, now)
            .await
            .unwrap();
        assert_eq!(outcome.billed, vec![(20, 1)]);
        assert_eq!(store.bills().unwrap().len(), 1);
        assert_eq!(store.marker(10, CptCode::Cpt99457).unwrap(), None);
    }

    #[tokio::test]
    async fn markers_never_move_backwards_across_runs() {
        let now = fixed_now();
        let (store, _ctx) = memory_context(now);
        enroll(&store, 10, ServiceCode::Rpm);
        log_interaction(&store, 10, 1300, CostCategory::Rpm, now - Duration::days(2));

        let scheduler = scheduler_over(&store);
        scheduler.run_all_rules_at(now).await;
        let first = store.marker(10, CptCode::Cpt99457).unwrap().unwrap();

        // A month later the patient qualifies again; the marker advances.
        let next_month = Utc.with_ymd_and_hms(2025, 7, 20, 15, 0, 0).unwrap();
        log_interaction(&store, 10, 1300, CostCategory::Rpm, next_month - Duration::days(2));
        scheduler.run_all_rules_at(next_month).await;
        let second = store.marker(10, CptCode::Cpt99457).unwrap().unwrap();
        assert!(second > first);

        // Re-running the earlier period leaves the newer marker in place.
        scheduler.run_all_rules_at(now).await;
        assert_eq!(store.marker(10, CptCode::Cpt99457).unwrap(), Some(second));
    }
}
