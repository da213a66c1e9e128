// models/src/medical/interaction.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::codes::CostCategory;
use crate::PatientId;

/// A logged clinical care session. The engine only ever reads these as
/// summed duration per patient over a date range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    pub id: i32,
    pub patient_id: PatientId,
    pub staff_id: i32,
    pub duration_seconds: i64,
    pub cost_category: CostCategory,
    pub session_date: DateTime<Utc>,
}
