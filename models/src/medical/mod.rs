// models/src/medical/mod.rs

pub mod bill;
pub mod enrollment;
pub mod interaction;
pub mod telemetry;

pub use bill::{BillEvent, LastBillMarker, NewBill};
pub use enrollment::Enrollment;
pub use interaction::Interaction;
pub use telemetry::TelemetryReading;
