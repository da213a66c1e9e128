// lib/src/eligibility.rs

//! Composable predicates over patient-ID sets. Each filter answers one
//! question against one store and returns plain IDs, so the rule logic can
//! be exercised against in-memory fakes.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use models::{BillingResult, CostCategory, CptCode, PatientId, ServiceCode};

use crate::stores::{BillStore, EnrollmentStore, InteractionStore, Stores, TelemetryStore};

/// How the last-bill marker excludes already-billed patients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerGate {
    /// Admit patients whose marker is below the given month index or
    /// absent. The universal once-per-period gate.
    BeforePeriod(i32),
    /// Admit patients whose marker is zero or absent. Used by the one-time
    /// device-setup code, which bills once per device lifetime.
    NeverBilled,
}

impl MarkerGate {
    fn admits(&self, marker: Option<i32>) -> bool {
        match (self, marker) {
            (_, None) => true,
            (MarkerGate::BeforePeriod(month_index), Some(m)) => m < *month_index,
            (MarkerGate::NeverBilled, Some(m)) => m == 0,
        }
    }
}

#[derive(Clone)]
pub struct EligibilityFilters {
    enrollments: Arc<dyn EnrollmentStore>,
    interactions: Arc<dyn InteractionStore>,
    telemetry: Arc<dyn TelemetryStore>,
    bills: Arc<dyn BillStore>,
}

impl EligibilityFilters {
    pub fn new(stores: &Stores) -> Self {
        EligibilityFilters {
            enrollments: stores.enrollments.clone(),
            interactions: stores.interactions.clone(),
            telemetry: stores.telemetry.clone(),
            bills: stores.bills.clone(),
        }
    }

    /// The universal first gate: actively enrolled in `service` and not yet
    /// billed for `cpt` per `gate`, optionally restricted to `patients`.
    pub async fn active_unbilled(
        &self,
        service: ServiceCode,
        cpt: CptCode,
        gate: MarkerGate,
        patients: Option<&[PatientId]>,
    ) -> BillingResult<Vec<PatientId>> {
        let enrolled = self.enrollments.active_enrollees(service, patients).await?;
        if enrolled.is_empty() {
            return Ok(enrolled);
        }
        let markers = self.bills.markers_for(Some(&enrolled), cpt).await?;
        let total = enrolled.len();
        let kept: Vec<PatientId> = enrolled
            .into_iter()
            .filter(|p| gate.admits(markers.get(p).copied()))
            .collect();
        debug!("{}: marker gate kept {} of {} enrollees", cpt, kept.len(), total);
        Ok(kept)
    }

    /// Patients whose summed interaction duration since `period_start`
    /// reaches `min_seconds`. Exactly-equal durations qualify.
    pub async fn with_min_duration(
        &self,
        patients: &[PatientId],
        period_start: DateTime<Utc>,
        min_seconds: i64,
        category: Option<CostCategory>,
    ) -> BillingResult<Vec<PatientId>> {
        if patients.is_empty() {
            return Ok(Vec::new());
        }
        let durations = self
            .interactions
            .duration_by_patient(patients, period_start, category)
            .await?;
        Ok(patients
            .iter()
            .copied()
            .filter(|p| durations.get(p).copied().unwrap_or(0) >= min_seconds)
            .collect())
    }

    /// Raw summed durations keyed by patient, for the tiered and incremental
    /// codes that need totals rather than a threshold answer.
    pub async fn duration_by_patient(
        &self,
        patients: &[PatientId],
        period_start: DateTime<Utc>,
        category: Option<CostCategory>,
    ) -> BillingResult<HashMap<PatientId, i64>> {
        if patients.is_empty() {
            return Ok(HashMap::new());
        }
        self.interactions
            .duration_by_patient(patients, period_start, category)
            .await
    }

    /// Patients with at least one reading at or after `cutoff`.
    pub async fn with_telemetry_since(
        &self,
        patients: &[PatientId],
        cutoff: DateTime<Utc>,
    ) -> BillingResult<Vec<PatientId>> {
        if patients.is_empty() {
            return Ok(Vec::new());
        }
        let present = self
            .telemetry
            .patients_with_reading_since(patients, cutoff)
            .await?;
        Ok(patients
            .iter()
            .copied()
            .filter(|p| present.contains(p))
            .collect())
    }

    /// Patients with NO reading at or after `cutoff` — the inverted gate
    /// that treats a long-quiet device as newly provisioned.
    pub async fn without_telemetry_since(
        &self,
        patients: &[PatientId],
        cutoff: DateTime<Utc>,
    ) -> BillingResult<Vec<PatientId>> {
        if patients.is_empty() {
            return Ok(Vec::new());
        }
        let present = self
            .telemetry
            .patients_with_reading_since(patients, cutoff)
            .await?;
        Ok(patients
            .iter()
            .copied()
            .filter(|p| !present.contains(p))
            .collect())
    }

    /// Patients with at least `min_days` distinct reading days since
    /// `period_start`.
    pub async fn with_telemetry_days(
        &self,
        patients: &[PatientId],
        period_start: DateTime<Utc>,
        min_days: u32,
    ) -> BillingResult<Vec<PatientId>> {
        if patients.is_empty() {
            return Ok(Vec::new());
        }
        let days = self
            .telemetry
            .reading_days_by_patient(patients, period_start)
            .await?;
        Ok(patients
            .iter()
            .copied()
            .filter(|p| days.get(p).copied().unwrap_or(0) >= min_days)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::MemoryStore;
    use chrono::TimeZone;
    use models::{Enrollment, Interaction};

    fn utc(y: i32, mo: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, 0, 0).unwrap()
    }

    fn filters_over(store: &Arc<MemoryStore>) -> EligibilityFilters {
        EligibilityFilters::new(&Stores::from_shared(store.clone()))
    }

    fn enroll(store: &MemoryStore, patient: PatientId, service: ServiceCode) {
        store
            .add_enrollment(Enrollment {
                id: patient,
                patient_id: patient,
                service_code: service,
                enabled: true,
                started_at: utc(2025, 1, 1, 12),
                ended_at: None,
            })
            .unwrap();
    }

    #[tokio::test]
    async fn before_period_gate_admits_absent_and_older_markers() {
        let store = Arc::new(MemoryStore::new());
        for patient in [1, 2, 3] {
            enroll(&store, patient, ServiceCode::Rpm);
        }
        store.upsert_marker(1, CptCode::Cpt99457, 305).await.unwrap();
        store.upsert_marker(2, CptCode::Cpt99457, 306).await.unwrap();

        let kept = filters_over(&store)
            .active_unbilled(
                ServiceCode::Rpm,
                CptCode::Cpt99457,
                MarkerGate::BeforePeriod(306),
                None,
            )
            .await
            .unwrap();
        assert_eq!(kept, vec![1, 3]);
    }

    #[tokio::test]
    async fn never_billed_gate_only_admits_zero_or_absent() {
        let store = Arc::new(MemoryStore::new());
        for patient in [1, 2, 3] {
            enroll(&store, patient, ServiceCode::Rpm);
        }
        store.upsert_marker(1, CptCode::Cpt99453, 0).await.unwrap();
        // An older, nonzero marker would pass the period gate but not this one.
        store.upsert_marker(2, CptCode::Cpt99453, 290).await.unwrap();

        let kept = filters_over(&store)
            .active_unbilled(
                ServiceCode::Rpm,
                CptCode::Cpt99453,
                MarkerGate::NeverBilled,
                None,
            )
            .await
            .unwrap();
        assert_eq!(kept, vec![1, 3]);
    }

    #[tokio::test]
    async fn min_duration_counts_exact_ties_as_qualifying() {
        let store = Arc::new(MemoryStore::new());
        for (id, patient, seconds) in [(1, 10, 1200), (2, 11, 1199)] {
            store
                .add_interaction(Interaction {
                    id,
                    patient_id: patient,
                    staff_id: 5,
                    duration_seconds: seconds,
                    cost_category: CostCategory::Rpm,
                    session_date: utc(2025, 6, 10, 14),
                })
                .unwrap();
        }
        let kept = filters_over(&store)
            .with_min_duration(&[10, 11], utc(2025, 6, 1, 5), 1200, None)
            .await
            .unwrap();
        assert_eq!(kept, vec![10]);
    }
}
