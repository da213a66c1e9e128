// models/src/lib.rs

pub mod codes;
pub mod errors;
pub mod medical;
pub mod period;

// Import directly from the sub-modules; the common types are re-exported
// here so downstream crates can write `models::CptCode` etc.
pub use codes::{CostCategory, CptCode, ServiceCode};
pub use errors::{BillingError, BillingResult, ValidationError, ValidationResult};
pub use medical::{BillEvent, Enrollment, Interaction, LastBillMarker, NewBill, TelemetryReading};
pub use period::BillingPeriod;

/// Patients are keyed by their relational id across every store.
pub type PatientId = i32;
