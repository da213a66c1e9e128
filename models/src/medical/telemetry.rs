// models/src/medical/telemetry.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::PatientId;

/// A single device measurement. The billing engine never looks at the
/// measured value, only at which patient produced a reading and when.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryReading {
    pub id: i32,
    pub device_id: i32,
    pub patient_id: PatientId,
    pub measured_at: DateTime<Utc>,
}
