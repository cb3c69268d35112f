use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::triage::TriageLevel;

/// Patient row as served by the persistence backend. Field aliases accept
/// the camelCase convention some in-memory callers use alongside the
/// snake_case wire names.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatientRecord {
    pub id: i64,
    pub site: Option<i64>,
    pub name: String,
    pub triage_level: String,
    pub triage_status: String,
    pub created_at: Option<DateTime<Utc>>,

    // Questionnaire fields
    pub age: Option<i64>,
    pub gender: String,
    #[serde(alias = "chiefComplaint")]
    pub chief_complaint: String,
    #[serde(alias = "chiefComplaintOther")]
    pub chief_complaint_other: String,
    pub consciousness: String,
    pub mechanism: String,
    #[serde(alias = "mechanismOther")]
    pub mechanism_other: String,
    #[serde(alias = "visibleInjuries")]
    pub visible_injuries: bool,
    #[serde(alias = "selectedInjuries")]
    pub selected_injuries: Vec<String>,
    #[serde(alias = "medicalAlert")]
    pub medical_alert: bool,
    #[serde(alias = "allergiesHistory")]
    pub allergies_history: bool,
    #[serde(alias = "allergiesDetails")]
    pub allergies_details: String,
}

/// One vitals reading. The backend returns these oldest to newest; the
/// final element is the latest observation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VitalsRecord {
    pub id: i64,
    pub patient: Option<i64>,
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(alias = "heartRate")]
    pub heart_rate: Option<f64>,
    #[serde(alias = "bpSystolic")]
    pub bp_systolic: Option<f64>,
    #[serde(alias = "bpDiastolic")]
    pub bp_diastolic: Option<f64>,
    #[serde(alias = "respiratoryRate")]
    pub respiratory_rate: Option<f64>,
    pub temperature: Option<f64>,
    #[serde(alias = "oxygenSaturation")]
    pub oxygen_saturation: Option<f64>,
    /// Reading origin, e.g. "esp32" or "manual".
    pub source: String,
}

/// Intervention logged by field personnel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionRecord {
    pub id: i64,
    pub patient: Option<i64>,
    pub timestamp: Option<DateTime<Utc>>,
    pub action: String,
    #[serde(alias = "actionType")]
    pub action_type: String,
    pub details: String,
    pub source: String,
}

/// Partial update for the persisted triage fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientPatch {
    pub triage_level: TriageLevel,
    pub triage_status: String,
}

impl PatientPatch {
    /// Patch carrying a level and its fixed status label.
    pub fn for_level(level: TriageLevel) -> Self {
        Self {
            triage_level: level,
            triage_status: level.status().to_string(),
        }
    }
}
