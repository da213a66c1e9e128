// models/src/codes.rs

use std::fmt;
use std::str::FromStr;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};

use crate::errors::ValidationError;

/// A monitoring service a patient can be enrolled in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ServiceCode {
    /// Remote patient monitoring.
    Rpm,
    /// Chronic care management.
    Ccm,
    /// Principal care management.
    Pcm,
    /// Behavioral health integration.
    Bhi,
}

impl ServiceCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceCode::Rpm => "RPM",
            ServiceCode::Ccm => "CCM",
            ServiceCode::Pcm => "PCM",
            ServiceCode::Bhi => "BHI",
        }
    }
}

impl fmt::Display for ServiceCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ServiceCode {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RPM" => Ok(ServiceCode::Rpm),
            "CCM" => Ok(ServiceCode::Ccm),
            "PCM" => Ok(ServiceCode::Pcm),
            "BHI" => Ok(ServiceCode::Bhi),
            other => Err(ValidationError::UnknownServiceCode(other.to_string())),
        }
    }
}

/// The cost bucket a clinical interaction was logged against. Most rules
/// aggregate duration across all categories; the BHI code filters on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CostCategory {
    Rpm,
    Ccm,
    Pcm,
    Bhi,
}

impl CostCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            CostCategory::Rpm => "RPM",
            CostCategory::Ccm => "CCM",
            CostCategory::Pcm => "PCM",
            CostCategory::Bhi => "BHI",
        }
    }
}

impl fmt::Display for CostCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for CostCategory {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RPM" => Ok(CostCategory::Rpm),
            "CCM" => Ok(CostCategory::Ccm),
            "PCM" => Ok(CostCategory::Pcm),
            "BHI" => Ok(CostCategory::Bhi),
            other => Err(ValidationError::UnknownCostCategory(other.to_string())),
        }
    }
}

/// The CPT codes the billing engine evaluates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CptCode {
    /// RPM device setup and patient education (one-time).
    Cpt99453,
    /// RPM device supply with daily recordings (16+ days per month).
    Cpt99454,
    /// RPM treatment management, first 20 minutes.
    Cpt99457,
    /// RPM treatment management, each additional 20 minutes (tiered).
    Cpt99458,
    /// Chronic care management, first 20 minutes.
    Cpt99490,
    /// Chronic care management, additional time (tiered).
    Cpt99439,
    /// Principal care management, first 30 minutes.
    Cpt99426,
    /// Principal care management, each additional 30 minutes (incremental).
    Cpt99427,
    /// Behavioral health integration care management.
    Cpt99484,
}

impl CptCode {
    /// Every supported code, in scheduled evaluation order.
    pub const ALL: [CptCode; 9] = [
        CptCode::Cpt99453,
        CptCode::Cpt99454,
        CptCode::Cpt99457,
        CptCode::Cpt99458,
        CptCode::Cpt99490,
        CptCode::Cpt99439,
        CptCode::Cpt99426,
        CptCode::Cpt99427,
        CptCode::Cpt99484,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CptCode::Cpt99453 => "99453",
            CptCode::Cpt99454 => "99454",
            CptCode::Cpt99457 => "99457",
            CptCode::Cpt99458 => "99458",
            CptCode::Cpt99490 => "99490",
            CptCode::Cpt99439 => "99439",
            CptCode::Cpt99426 => "99426",
            CptCode::Cpt99427 => "99427",
            CptCode::Cpt99484 => "99484",
        }
    }

    /// The numeric form stored in the bill and marker tables.
    pub fn as_u32(&self) -> u32 {
        match self {
            CptCode::Cpt99453 => 99453,
            CptCode::Cpt99454 => 99454,
            CptCode::Cpt99457 => 99457,
            CptCode::Cpt99458 => 99458,
            CptCode::Cpt99490 => 99490,
            CptCode::Cpt99439 => 99439,
            CptCode::Cpt99426 => 99426,
            CptCode::Cpt99427 => 99427,
            CptCode::Cpt99484 => 99484,
        }
    }

    /// The service an enrollment must cover for this code to bill.
    pub fn service(&self) -> ServiceCode {
        match self {
            CptCode::Cpt99453 | CptCode::Cpt99454 | CptCode::Cpt99457 | CptCode::Cpt99458 => {
                ServiceCode::Rpm
            }
            CptCode::Cpt99490 | CptCode::Cpt99439 => ServiceCode::Ccm,
            CptCode::Cpt99426 | CptCode::Cpt99427 => ServiceCode::Pcm,
            CptCode::Cpt99484 => ServiceCode::Bhi,
        }
    }
}

impl fmt::Display for CptCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for CptCode {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "99453" => Ok(CptCode::Cpt99453),
            "99454" => Ok(CptCode::Cpt99454),
            "99457" => Ok(CptCode::Cpt99457),
            "99458" => Ok(CptCode::Cpt99458),
            "99490" => Ok(CptCode::Cpt99490),
            "99439" => Ok(CptCode::Cpt99439),
            "99426" => Ok(CptCode::Cpt99426),
            "99427" => Ok(CptCode::Cpt99427),
            "99484" => Ok(CptCode::Cpt99484),
            other => Err(ValidationError::UnknownCptCode(other.to_string())),
        }
    }
}

// CPT codes serialize as their wire string ("99457"), not the variant name.
impl Serialize for CptCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for CptCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpt_code_round_trips_through_strings() {
        for code in CptCode::ALL {
            assert_eq!(code.as_str().parse::<CptCode>().unwrap(), code);
            assert_eq!(code.as_u32().to_string(), code.as_str());
        }
    }

    #[test]
    fn unknown_cpt_code_is_rejected() {
        let err = "99999".parse::<CptCode>().unwrap_err();
        assert_eq!(err, ValidationError::UnknownCptCode("99999".to_string()));
    }

    #[test]
    fn cpt_code_serializes_as_wire_string() {
        let json = serde_json::to_string(&CptCode::Cpt99457).unwrap();
        assert_eq!(json, "\"99457\"");
        let back: CptCode = serde_json::from_str(&json).unwrap();
        assert_eq!(back, CptCode::Cpt99457);
    }

    #[test]
    fn service_codes_parse() {
        assert_eq!("RPM".parse::<ServiceCode>().unwrap(), ServiceCode::Rpm);
        assert_eq!("BHI".parse::<CostCategory>().unwrap(), CostCategory::Bhi);
        assert!("rpm".parse::<ServiceCode>().is_err());
    }

    #[test]
    fn codes_map_to_their_service() {
        assert_eq!(CptCode::Cpt99454.service(), ServiceCode::Rpm);
        assert_eq!(CptCode::Cpt99439.service(), ServiceCode::Ccm);
        assert_eq!(CptCode::Cpt99427.service(), ServiceCode::Pcm);
        assert_eq!(CptCode::Cpt99484.service(), ServiceCode::Bhi);
    }
}
