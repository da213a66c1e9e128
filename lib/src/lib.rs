// lib/src/lib.rs

//! The billing-eligibility engine: per CPT code, per patient, per calendar
//! month, decide whether a billable event has occurred and how many units
//! to emit, based on device-telemetry cadence, care-interaction duration
//! accumulation and previously-billed state.

pub mod config;
pub mod eligibility;
pub mod ledger;
pub mod period;
pub mod rules;
pub mod scheduler;
pub mod stores;

// Import directly from the 'models' crate; the common types are re-exported
// so downstream crates can reach everything through `rpmbill::`.
pub use models::{
    BillEvent, BillingError, BillingPeriod, BillingResult, CptCode, Enrollment, Interaction,
    NewBill, PatientId, ServiceCode, TelemetryReading,
};

// Explicit re-exports
pub use crate::config::BillingConfig;
pub use crate::eligibility::{EligibilityFilters, MarkerGate};
pub use crate::ledger::BillLedger;
pub use crate::rules::{all_rules, rule_for, CptRule, RuleContext, RuleOutcome};
pub use crate::scheduler::{RuleScheduler, RunSummary};
pub use crate::stores::{MemoryStore, PostgresStore, StoreConfig, StoreEngineType, Stores};
