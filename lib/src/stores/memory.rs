// lib/src/stores/memory.rs

//! The in-memory backend. This is the simplest and fastest implementation;
//! data lives only for the life of the process. It is the primary vehicle
//! for unit tests and local runs.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use models::{
    BillEvent, BillingError, BillingResult, CostCategory, CptCode, Enrollment, Interaction,
    NewBill, PatientId, ServiceCode, TelemetryReading,
};

use crate::period;
use crate::stores::{BillStore, EnrollmentStore, InteractionStore, TelemetryStore};

#[derive(Debug, Default)]
struct Internal {
    enrollments: Vec<Enrollment>,
    interactions: Vec<Interaction>,
    readings: Vec<TelemetryReading>,
    bills: Vec<BillEvent>,
    markers: HashMap<(PatientId, CptCode), i32>,
}

/// In-memory implementation of all four store seams behind one handle.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    internal: Arc<Mutex<Internal>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    fn lock(&self) -> BillingResult<MutexGuard<'_, Internal>> {
        self.internal
            .lock()
            .map_err(|e| BillingError::LockError(e.to_string()))
    }

    // Seed helpers used by tests and local runs.

    pub fn add_enrollment(&self, enrollment: Enrollment) -> BillingResult<()> {
        self.lock()?.enrollments.push(enrollment);
        Ok(())
    }

    pub fn add_interaction(&self, interaction: Interaction) -> BillingResult<()> {
        self.lock()?.interactions.push(interaction);
        Ok(())
    }

    pub fn add_reading(&self, reading: TelemetryReading) -> BillingResult<()> {
        self.lock()?.readings.push(reading);
        Ok(())
    }

    /// Snapshot of every bill recorded so far, in insertion order.
    pub fn bills(&self) -> BillingResult<Vec<BillEvent>> {
        Ok(self.lock()?.bills.clone())
    }

    /// The stored marker for (patient, cpt), if any.
    pub fn marker(&self, patient: PatientId, cpt: CptCode) -> BillingResult<Option<i32>> {
        Ok(self.lock()?.markers.get(&(patient, cpt)).copied())
    }
}

fn in_set(patients: Option<&[PatientId]>, id: PatientId) -> bool {
    patients.map_or(true, |set| set.contains(&id))
}

#[async_trait]
impl EnrollmentStore for MemoryStore {
    async fn active_enrollees(
        &self,
        service: ServiceCode,
        patients: Option<&[PatientId]>,
    ) -> BillingResult<Vec<PatientId>> {
        let internal = self.lock()?;
        let mut ids: Vec<PatientId> = internal
            .enrollments
            .iter()
            .filter(|e| e.service_code == service && e.is_active() && in_set(patients, e.patient_id))
            .map(|e| e.patient_id)
            .collect();
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }
}

#[async_trait]
impl InteractionStore for MemoryStore {
    async fn duration_by_patient(
        &self,
        patients: &[PatientId],
        from: DateTime<Utc>,
        category: Option<CostCategory>,
    ) -> BillingResult<HashMap<PatientId, i64>> {
        let internal = self.lock()?;
        let mut totals: HashMap<PatientId, i64> = HashMap::new();
        for interaction in internal.interactions.iter() {
            if !patients.contains(&interaction.patient_id) || interaction.session_date < from {
                continue;
            }
            if category.is_some_and(|c| interaction.cost_category != c) {
                continue;
            }
            *totals.entry(interaction.patient_id).or_insert(0) += interaction.duration_seconds;
        }
        Ok(totals)
    }
}

#[async_trait]
impl TelemetryStore for MemoryStore {
    async fn patients_with_reading_since(
        &self,
        patients: &[PatientId],
        cutoff: DateTime<Utc>,
    ) -> BillingResult<HashSet<PatientId>> {
        let internal = self.lock()?;
        Ok(internal
            .readings
            .iter()
            .filter(|r| patients.contains(&r.patient_id) && r.measured_at >= cutoff)
            .map(|r| r.patient_id)
            .collect())
    }

    async fn reading_days_by_patient(
        &self,
        patients: &[PatientId],
        from: DateTime<Utc>,
    ) -> BillingResult<HashMap<PatientId, u32>> {
        let internal = self.lock()?;
        let mut days: HashMap<PatientId, HashSet<NaiveDate>> = HashMap::new();
        for reading in internal.readings.iter() {
            if !patients.contains(&reading.patient_id) || reading.measured_at < from {
                continue;
            }
            days.entry(reading.patient_id)
                .or_default()
                .insert(period::calendar_day_at(reading.measured_at));
        }
        Ok(days.into_iter().map(|(p, d)| (p, d.len() as u32)).collect())
    }
}

impl Internal {
    fn append_bills(&mut self, bills: &[NewBill], entry_at: DateTime<Utc>) -> Vec<BillEvent> {
        let created: Vec<BillEvent> = bills
            .iter()
            .map(|bill| BillEvent {
                id: Uuid::new_v4(),
                patient_id: bill.patient_id,
                service_code: bill.service_code,
                cpt_code: bill.cpt_code,
                entry_at,
            })
            .collect();
        self.bills.extend(created.iter().cloned());
        created
    }
}

#[async_trait]
impl BillStore for MemoryStore {
    async fn insert_bills(&self, bills: &[NewBill]) -> BillingResult<Vec<BillEvent>> {
        // One lock scope per call keeps the batch all-or-nothing.
        let mut internal = self.lock()?;
        Ok(internal.append_bills(bills, Utc::now()))
    }

    async fn upsert_marker(
        &self,
        patient: PatientId,
        cpt: CptCode,
        month_index: i32,
    ) -> BillingResult<()> {
        self.lock()?.markers.insert((patient, cpt), month_index);
        Ok(())
    }

    async fn markers_for(
        &self,
        patients: Option<&[PatientId]>,
        cpt: CptCode,
    ) -> BillingResult<HashMap<PatientId, i32>> {
        let internal = self.lock()?;
        Ok(internal
            .markers
            .iter()
            .filter(|((patient, code), _)| *code == cpt && in_set(patients, *patient))
            .map(|((patient, _), index)| (*patient, *index))
            .collect())
    }

    async fn count_bills_since(
        &self,
        patients: &[PatientId],
        cpt: CptCode,
        since: DateTime<Utc>,
    ) -> BillingResult<HashMap<PatientId, i64>> {
        let internal = self.lock()?;
        let mut counts: HashMap<PatientId, i64> = HashMap::new();
        for bill in internal.bills.iter() {
            if bill.cpt_code == cpt && bill.entry_at >= since && patients.contains(&bill.patient_id)
            {
                *counts.entry(bill.patient_id).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }

    async fn commit(
        &self,
        bills: &[NewBill],
        markers: &[(PatientId, CptCode, i32)],
    ) -> BillingResult<Vec<BillEvent>> {
        let mut internal = self.lock()?;
        let created = internal.append_bills(bills, Utc::now());
        for &(patient, cpt, month_index) in markers {
            internal.markers.insert((patient, cpt), month_index);
        }
        Ok(created)
    }
}
