// models/src/medical/enrollment.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::codes::ServiceCode;
use crate::PatientId;

/// A patient's subscription to a monitoring service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enrollment {
    pub id: i32,
    pub patient_id: PatientId,
    pub service_code: ServiceCode,
    pub enabled: bool,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Enrollment {
    /// Active means the service is switched on and the enrollment has not ended.
    pub fn is_active(&self) -> bool {
        self.enabled && self.ended_at.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn enrollment(enabled: bool, ended: bool) -> Enrollment {
        let started_at = Utc.with_ymd_and_hms(2025, 1, 10, 12, 0, 0).unwrap();
        Enrollment {
            id: 1,
            patient_id: 42,
            service_code: ServiceCode::Rpm,
            enabled,
            started_at,
            ended_at: ended.then(|| started_at + chrono::Duration::days(90)),
        }
    }

    #[test]
    fn active_requires_enabled_and_open_ended() {
        assert!(enrollment(true, false).is_active());
        assert!(!enrollment(false, false).is_active());
        assert!(!enrollment(true, true).is_active());
    }
}
