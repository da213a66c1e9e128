// models/src/medical/bill.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::codes::{CptCode, ServiceCode};
use crate::PatientId;

/// An append-only billing event emitted by a rule evaluator. Rows are never
/// updated or deleted; `entry_at` is the evaluation time, never backdated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillEvent {
    pub id: Uuid,
    pub patient_id: PatientId,
    pub service_code: ServiceCode,
    pub cpt_code: CptCode,
    pub entry_at: DateTime<Utc>,
}

/// Insert form of a `BillEvent`; the store assigns the id and entry time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewBill {
    pub patient_id: PatientId,
    pub service_code: ServiceCode,
    pub cpt_code: CptCode,
}

impl NewBill {
    pub fn new(patient_id: PatientId, service_code: ServiceCode, cpt_code: CptCode) -> Self {
        NewBill {
            patient_id,
            service_code,
            cpt_code,
        }
    }
}

/// The stored watermark preventing duplicate billing for a (patient, code)
/// pair within a period. One logical row per pair, upsert semantics; the
/// month index only ever advances under normal operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastBillMarker {
    pub patient_id: PatientId,
    pub cpt_code: CptCode,
    pub month_index: i32,
}
