// lib/src/stores/postgres.rs

//! PostgreSQL backend over the synchronous `postgres` client.
//!
//! Expected schema:
//!   enrollments(id, patient_id, service_code TEXT, enabled BOOL,
//!               started_at TIMESTAMPTZ, ended_at TIMESTAMPTZ NULL)
//!   interactions(id, patient_id, staff_id, duration_seconds BIGINT,
//!                cost_category TEXT, session_date TIMESTAMPTZ)
//!   telemetry_readings(id, device_id, patient_id, measured_at TIMESTAMPTZ)
//!   bills(id UUID PRIMARY KEY, patient_id, service_code TEXT,
//!         cpt_code INT, entry_at TIMESTAMPTZ)
//!   last_bills(patient_id, cpt_code INT, month_index INT,
//!              PRIMARY KEY (patient_id, cpt_code))
//!
//! Calendar days are counted in the same fixed Eastern offset the period
//! clock uses, via `AT TIME ZONE 'EST'`.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use postgres::{Client, NoTls};
use uuid::Uuid;

use models::{
    BillEvent, BillingError, BillingResult, CostCategory, CptCode, NewBill, PatientId, ServiceCode,
};

use crate::stores::{BillStore, EnrollmentStore, InteractionStore, TelemetryStore};

pub struct PostgresStore {
    client: Mutex<Client>,
}

impl PostgresStore {
    /// Connects eagerly; a bad connection string surfaces here, not at query
    /// time.
    pub fn connect(connection_string: &str) -> BillingResult<Self> {
        let client = Client::connect(connection_string, NoTls)
            .map_err(|e| BillingError::ConnectionError(e.to_string()))?;
        Ok(PostgresStore {
            client: Mutex::new(client),
        })
    }

    fn client(&self) -> BillingResult<MutexGuard<'_, Client>> {
        self.client
            .lock()
            .map_err(|e| BillingError::LockError(e.to_string()))
    }
}

fn cpt_param(cpt: CptCode) -> i32 {
    cpt.as_u32() as i32
}

#[async_trait]
impl EnrollmentStore for PostgresStore {
    async fn active_enrollees(
        &self,
        service: ServiceCode,
        patients: Option<&[PatientId]>,
    ) -> BillingResult<Vec<PatientId>> {
        let mut client = self.client()?;
        let rows = match patients {
            Some(ids) => client.query(
                "SELECT DISTINCT patient_id FROM enrollments \
                 WHERE service_code = $1 AND enabled AND ended_at IS NULL \
                   AND patient_id = ANY($2) \
                 ORDER BY patient_id",
                &[&service.as_str(), &ids],
            )?,
            None => client.query(
                "SELECT DISTINCT patient_id FROM enrollments \
                 WHERE service_code = $1 AND enabled AND ended_at IS NULL \
                 ORDER BY patient_id",
                &[&service.as_str()],
            )?,
        };
        Ok(rows.iter().map(|row| row.get(0)).collect())
    }
}

#[async_trait]
impl InteractionStore for PostgresStore {
    async fn duration_by_patient(
        &self,
        patients: &[PatientId],
        from: DateTime<Utc>,
        category: Option<CostCategory>,
    ) -> BillingResult<HashMap<PatientId, i64>> {
        let mut client = self.client()?;
        let rows = match category {
            Some(cat) => client.query(
                "SELECT patient_id, SUM(duration_seconds)::BIGINT FROM interactions \
                 WHERE patient_id = ANY($1) AND session_date >= $2 AND cost_category = $3 \
                 GROUP BY patient_id",
                &[&patients, &from, &cat.as_str()],
            )?,
            None => client.query(
                "SELECT patient_id, SUM(duration_seconds)::BIGINT FROM interactions \
                 WHERE patient_id = ANY($1) AND session_date >= $2 \
                 GROUP BY patient_id",
                &[&patients, &from],
            )?,
        };
        Ok(rows.iter().map(|row| (row.get(0), row.get(1))).collect())
    }
}

#[async_trait]
impl TelemetryStore for PostgresStore {
    async fn patients_with_reading_since(
        &self,
        patients: &[PatientId],
        cutoff: DateTime<Utc>,
    ) -> BillingResult<HashSet<PatientId>> {
        let mut client = self.client()?;
        let rows = client.query(
            "SELECT DISTINCT patient_id FROM telemetry_readings \
             WHERE patient_id = ANY($1) AND measured_at >= $2",
            &[&patients, &cutoff],
        )?;
        Ok(rows.iter().map(|row| row.get(0)).collect())
    }

    async fn reading_days_by_patient(
        &self,
        patients: &[PatientId],
        from: DateTime<Utc>,
    ) -> BillingResult<HashMap<PatientId, u32>> {
        let mut client = self.client()?;
        let rows = client.query(
            "SELECT patient_id, \
                    COUNT(DISTINCT (measured_at AT TIME ZONE 'EST')::date)::BIGINT \
             FROM telemetry_readings \
             WHERE patient_id = ANY($1) AND measured_at >= $2 \
             GROUP BY patient_id",
            &[&patients, &from],
        )?;
        Ok(rows
            .iter()
            .map(|row| (row.get(0), row.get::<_, i64>(1) as u32))
            .collect())
    }
}

#[async_trait]
impl BillStore for PostgresStore {
    async fn insert_bills(&self, bills: &[NewBill]) -> BillingResult<Vec<BillEvent>> {
        self.commit(bills, &[]).await
    }

    async fn upsert_marker(
        &self,
        patient: PatientId,
        cpt: CptCode,
        month_index: i32,
    ) -> BillingResult<()> {
        let mut client = self.client()?;
        client.execute(
            "INSERT INTO last_bills (patient_id, cpt_code, month_index) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (patient_id, cpt_code) \
             DO UPDATE SET month_index = EXCLUDED.month_index",
            &[&patient, &cpt_param(cpt), &month_index],
        )?;
        Ok(())
    }

    async fn markers_for(
        &self,
        patients: Option<&[PatientId]>,
        cpt: CptCode,
    ) -> BillingResult<HashMap<PatientId, i32>> {
        let mut client = self.client()?;
        let rows = match patients {
            Some(ids) => client.query(
                "SELECT patient_id, month_index FROM last_bills \
                 WHERE cpt_code = $1 AND patient_id = ANY($2)",
                &[&cpt_param(cpt), &ids],
            )?,
            None => client.query(
                "SELECT patient_id, month_index FROM last_bills WHERE cpt_code = $1",
                &[&cpt_param(cpt)],
            )?,
        };
        Ok(rows.iter().map(|row| (row.get(0), row.get(1))).collect())
    }

    async fn count_bills_since(
        &self,
        patients: &[PatientId],
        cpt: CptCode,
        since: DateTime<Utc>,
    ) -> BillingResult<HashMap<PatientId, i64>> {
        let mut client = self.client()?;
        let rows = client.query(
            "SELECT patient_id, COUNT(*)::BIGINT FROM bills \
             WHERE cpt_code = $1 AND patient_id = ANY($2) AND entry_at >= $3 \
             GROUP BY patient_id",
            &[&cpt_param(cpt), &patients, &since],
        )?;
        Ok(rows.iter().map(|row| (row.get(0), row.get(1))).collect())
    }

    async fn commit(
        &self,
        bills: &[NewBill],
        markers: &[(PatientId, CptCode, i32)],
    ) -> BillingResult<Vec<BillEvent>> {
        let mut client = self.client()?;
        let mut tx = client
            .transaction()
            .map_err(|e| BillingError::TransactionError(e.to_string()))?;

        let entry_at = Utc::now();
        let mut created = Vec::with_capacity(bills.len());
        for bill in bills {
            let event = BillEvent {
                id: Uuid::new_v4(),
                patient_id: bill.patient_id,
                service_code: bill.service_code,
                cpt_code: bill.cpt_code,
                entry_at,
            };
            tx.execute(
                "INSERT INTO bills (id, patient_id, service_code, cpt_code, entry_at) \
                 VALUES ($1, $2, $3, $4, $5)",
                &[
                    &event.id,
                    &event.patient_id,
                    &event.service_code.as_str(),
                    &cpt_param(event.cpt_code),
                    &event.entry_at,
                ],
            )?;
            created.push(event);
        }
        for &(patient, cpt, month_index) in markers {
            tx.execute(
                "INSERT INTO last_bills (patient_id, cpt_code, month_index) \
                 VALUES ($1, $2, $3) \
                 ON CONFLICT (patient_id, cpt_code) \
                 DO UPDATE SET month_index = EXCLUDED.month_index",
                &[&patient, &cpt_param(cpt), &month_index],
            )?;
        }
        tx.commit()
            .map_err(|e| BillingError::TransactionError(e.to_string()))?;
        Ok(created)
    }
}
