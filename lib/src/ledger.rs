// lib/src/ledger.rs

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use models::{BillEvent, BillingError, BillingResult, CptCode, LastBillMarker, NewBill, PatientId};

use crate::stores::BillStore;

/// Read/write surface over the append-only bill list and the per-patient
/// last-billed-period markers.
#[derive(Clone)]
pub struct BillLedger {
    store: Arc<dyn BillStore>,
}

impl BillLedger {
    pub fn new(store: Arc<dyn BillStore>) -> Self {
        BillLedger { store }
    }

    /// Appends one bill row; the store assigns the id and entry time.
    pub async fn record_bill(&self, bill: NewBill) -> BillingResult<BillEvent> {
        let mut events = self.store.insert_bills(std::slice::from_ref(&bill)).await?;
        events
            .pop()
            .ok_or_else(|| BillingError::InternalError("bill insert returned no row".to_string()))
    }

    /// Appends the whole batch atomically.
    pub async fn record_bills(&self, bills: &[NewBill]) -> BillingResult<Vec<BillEvent>> {
        if bills.is_empty() {
            return Ok(Vec::new());
        }
        self.store.insert_bills(bills).await
    }

    /// Inserts or advances the (patient, cpt) marker.
    pub async fn upsert_last_bill_marker(
        &self,
        patient: PatientId,
        cpt: CptCode,
        month_index: i32,
    ) -> BillingResult<()> {
        self.store.upsert_marker(patient, cpt, month_index).await
    }

    /// Current marker month index per patient for `cpt`.
    pub async fn markers_for(
        &self,
        patients: Option<&[PatientId]>,
        cpt: CptCode,
    ) -> BillingResult<HashMap<PatientId, i32>> {
        self.store.markers_for(patients, cpt).await
    }

    /// The stored marker row for one (patient, cpt) pair, if any.
    pub async fn last_bill_marker(
        &self,
        patient: PatientId,
        cpt: CptCode,
    ) -> BillingResult<Option<LastBillMarker>> {
        let markers = self.store.markers_for(Some(&[patient]), cpt).await?;
        Ok(markers.get(&patient).map(|&month_index| LastBillMarker {
            patient_id: patient,
            cpt_code: cpt,
            month_index,
        }))
    }

    /// Units already billed per patient for `cpt` since `since`; the tiered
    /// rules subtract these from the units a patient's duration has earned.
    pub async fn count_bills_since(
        &self,
        patients: &[PatientId],
        cpt: CptCode,
        since: DateTime<Utc>,
    ) -> BillingResult<HashMap<PatientId, i64>> {
        self.store.count_bills_since(patients, cpt, since).await
    }

    /// Bills and marker advances in one atomic unit per rule invocation, so
    /// a bill row is never recorded without its marker update.
    pub async fn commit(
        &self,
        bills: &[NewBill],
        markers: &[(PatientId, CptCode, i32)],
    ) -> BillingResult<Vec<BillEvent>> {
        if bills.is_empty() && markers.is_empty() {
            return Ok(Vec::new());
        }
        self.store.commit(bills, markers).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::MemoryStore;
    use models::ServiceCode;

    #[test]
    fn record_bill_returns_the_stored_row() {
        let store = Arc::new(MemoryStore::new());
        let ledger = BillLedger::new(store.clone());
        let event = tokio_test::block_on(
            ledger.record_bill(NewBill::new(7, ServiceCode::Ccm, CptCode::Cpt99490)),
        )
        .unwrap();
        assert_eq!(event.patient_id, 7);
        assert_eq!(store.bills().unwrap(), vec![event]);
    }

    #[test]
    fn marker_reads_back_as_a_row() {
        let store = Arc::new(MemoryStore::new());
        let ledger = BillLedger::new(store);
        tokio_test::block_on(async {
            assert_eq!(
                ledger.last_bill_marker(7, CptCode::Cpt99458).await.unwrap(),
                None
            );
            ledger
                .upsert_last_bill_marker(7, CptCode::Cpt99458, 306)
                .await
                .unwrap();
            let marker = ledger
                .last_bill_marker(7, CptCode::Cpt99458)
                .await
                .unwrap()
                .unwrap();
            assert_eq!(marker.month_index, 306);
            assert_eq!(marker.cpt_code, CptCode::Cpt99458);
        });
    }

    #[test]
    fn empty_commit_is_a_no_op() {
        let store = Arc::new(MemoryStore::new());
        let ledger = BillLedger::new(store.clone());
        let created = tokio_test::block_on(ledger.commit(&[], &[])).unwrap();
        assert!(created.is_empty());
        assert!(store.bills().unwrap().is_empty());
    }
}
