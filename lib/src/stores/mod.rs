// lib/src/stores/mod.rs

//! Trait seams over the external enrollment, interaction and telemetry
//! stores and the bill ledger's persistence, plus the built-in backends.
//! Each query returns plain patient-ID collections so the rule logic can be
//! unit-tested against in-memory fakes.

pub mod memory;
pub mod postgres;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use models::{
    BillEvent, BillingError, BillingResult, CostCategory, CptCode, NewBill, PatientId, ServiceCode,
};

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

/// Which backend the stores open against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreEngineType {
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub engine: StoreEngineType,
    pub connection_string: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            engine: StoreEngineType::Memory,
            connection_string: None,
        }
    }
}

/// Read access to patient service enrollments.
#[async_trait]
pub trait EnrollmentStore: Send + Sync {
    /// Patients actively enrolled in `service` (enabled and not ended),
    /// optionally restricted to `patients`. Sorted, deduplicated.
    async fn active_enrollees(
        &self,
        service: ServiceCode,
        patients: Option<&[PatientId]>,
    ) -> BillingResult<Vec<PatientId>>;
}

/// Read access to logged clinical care sessions.
#[async_trait]
pub trait InteractionStore: Send + Sync {
    /// Summed interaction duration per patient for sessions at or after
    /// `from`, optionally narrowed to one cost category. Patients with no
    /// matching sessions are absent from the map.
    async fn duration_by_patient(
        &self,
        patients: &[PatientId],
        from: DateTime<Utc>,
        category: Option<CostCategory>,
    ) -> BillingResult<HashMap<PatientId, i64>>;
}

/// Read access to device telemetry, as presence and density only.
#[async_trait]
pub trait TelemetryStore: Send + Sync {
    /// Patients in the set with at least one reading measured at or after
    /// `cutoff`.
    async fn patients_with_reading_since(
        &self,
        patients: &[PatientId],
        cutoff: DateTime<Utc>,
    ) -> BillingResult<HashSet<PatientId>>;

    /// Count of distinct calendar days (billing zone) with at least one
    /// reading, per patient, since `from`.
    async fn reading_days_by_patient(
        &self,
        patients: &[PatientId],
        from: DateTime<Utc>,
    ) -> BillingResult<HashMap<PatientId, u32>>;
}

/// Persistence for bill events and last-bill markers.
#[async_trait]
pub trait BillStore: Send + Sync {
    /// Appends the batch atomically and returns the stored rows.
    async fn insert_bills(&self, bills: &[NewBill]) -> BillingResult<Vec<BillEvent>>;

    /// Inserts or advances the marker for (patient, cpt). Idempotent under
    /// repeated calls with the same `month_index`.
    async fn upsert_marker(
        &self,
        patient: PatientId,
        cpt: CptCode,
        month_index: i32,
    ) -> BillingResult<()>;

    /// Current marker month index per patient for `cpt`, optionally
    /// restricted to `patients`. Unmarked patients are absent from the map.
    async fn markers_for(
        &self,
        patients: Option<&[PatientId]>,
        cpt: CptCode,
    ) -> BillingResult<HashMap<PatientId, i32>>;

    /// Number of bill rows per patient for `cpt` with `entry_at` at or after
    /// `since`.
    async fn count_bills_since(
        &self,
        patients: &[PatientId],
        cpt: CptCode,
        since: DateTime<Utc>,
    ) -> BillingResult<HashMap<PatientId, i64>>;

    /// Bills plus marker advances in one atomic unit. A bill row is never
    /// recorded without its marker update being applied in the same unit.
    async fn commit(
        &self,
        bills: &[NewBill],
        markers: &[(PatientId, CptCode, i32)],
    ) -> BillingResult<Vec<BillEvent>>;
}

/// The four store handles one rule evaluation runs against.
#[derive(Clone)]
pub struct Stores {
    pub enrollments: Arc<dyn EnrollmentStore>,
    pub interactions: Arc<dyn InteractionStore>,
    pub telemetry: Arc<dyn TelemetryStore>,
    pub bills: Arc<dyn BillStore>,
}

impl std::fmt::Debug for Stores {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stores").finish_non_exhaustive()
    }
}

impl Stores {
    /// Opens the backend selected by `config`.
    pub fn open(config: &StoreConfig) -> BillingResult<Self> {
        match config.engine {
            StoreEngineType::Memory => Ok(Stores::from_shared(Arc::new(MemoryStore::new()))),
            StoreEngineType::Postgres => {
                let conn = config.connection_string.as_deref().ok_or_else(|| {
                    BillingError::ConfigError(
                        "Postgres storage requires a connection string.".to_string(),
                    )
                })?;
                Ok(Stores::from_shared(Arc::new(PostgresStore::connect(conn)?)))
            }
        }
    }

    /// Wires every seam to one shared backend.
    pub fn from_shared<S>(store: Arc<S>) -> Self
    where
        S: EnrollmentStore + InteractionStore + TelemetryStore + BillStore + 'static,
    {
        Stores {
            enrollments: store.clone(),
            interactions: store.clone(),
            telemetry: store.clone(),
            bills: store,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_memory_needs_no_connection_string() {
        assert!(Stores::open(&StoreConfig::default()).is_ok());
    }

    #[test]
    fn open_postgres_without_connection_string_is_a_config_error() {
        let config = StoreConfig {
            engine: StoreEngineType::Postgres,
            connection_string: None,
        };
        let err = Stores::open(&config).unwrap_err();
        assert!(matches!(err, BillingError::ConfigError(_)));
    }
}
