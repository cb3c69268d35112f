//! Bridges the triage classifier to persisted patient state.
//!
//! The service owns two append/overwrite caches (last computed result and
//! last manual override per patient) and a broadcast channel that ticks
//! after every successful recalculation or override. Subscribers carry no
//! payload; they re-read the caches or the backend. Concurrent
//! recalculations for the same patient race with last-write-wins semantics;
//! callers needing stronger guarantees serialize per patient id themselves.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{error, info, instrument};

use crate::api::{PatientStore, StoreError};
use crate::models::{ActionRecord, PatientPatch, PatientRecord, VitalsRecord};
use crate::triage::{TriageClassifier, TriageFactors, TriageLevel, TriageResult};

pub const DEFAULT_OVERRIDE_REASON: &str = "Manual override by medical personnel";

/// Computed result as kept in the service cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedTriageResult {
    #[serde(flatten)]
    pub result: TriageResult,
    pub timestamp: DateTime<Utc>,
    pub auto_calculated: bool,
}

/// Manual override record superseding the computed level for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriageOverride {
    pub level: TriageLevel,
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub reason: String,
    pub overridden_by: String,
    pub manual_override: bool,
}

/// Per-patient result and override maps. Entries are overwritten in place
/// and never evicted; the persistence backend stays authoritative.
#[derive(Debug, Default)]
pub struct TriageCaches {
    pub results: DashMap<String, CachedTriageResult>,
    pub overrides: DashMap<String, TriageOverride>,
}

pub struct TriageService {
    store: Arc<dyn PatientStore>,
    classifier: TriageClassifier,
    caches: Arc<TriageCaches>,
    changes: broadcast::Sender<()>,
}

impl TriageService {
    pub fn new(store: Arc<dyn PatientStore>) -> Self {
        Self::with_caches(store, Arc::new(TriageCaches::default()))
    }

    /// Construct with externally owned caches, e.g. shared with a UI layer.
    pub fn with_caches(store: Arc<dyn PatientStore>, caches: Arc<TriageCaches>) -> Self {
        let (changes, _) = broadcast::channel(16);
        Self {
            store,
            classifier: TriageClassifier::new(),
            caches,
            changes,
        }
    }

    /// Receive a payload-free tick after every successful recalculation or
    /// override.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.changes.subscribe()
    }

    pub fn cached_result(&self, patient_id: &str) -> Option<CachedTriageResult> {
        self.caches.results.get(patient_id).map(|e| e.value().clone())
    }

    pub fn cached_override(&self, patient_id: &str) -> Option<TriageOverride> {
        self.caches.overrides.get(patient_id).map(|e| e.value().clone())
    }

    /// Recompute a patient's triage from their current record, latest
    /// vitals, and action history, and write the level and status back.
    ///
    /// Any failure along the way degrades to a conservative yellow default
    /// instead of propagating; in that case nothing is written back and the
    /// caches are left untouched.
    #[instrument(skip(self))]
    pub async fn recalculate_patient_triage(&self, patient_id: &str) -> TriageResult {
        match self.recalculate_inner(patient_id).await {
            Ok(result) => result,
            Err(err) => {
                error!(patient_id, error = %err, "triage recalculation failed, defaulting to stable");
                TriageResult {
                    level: TriageLevel::Yellow,
                    score: 0.0,
                    reasoning: vec!["Error calculating triage - defaulting to stable".to_string()],
                    shock_index: None,
                    injury_severity_score: None,
                }
            }
        }
    }

    async fn recalculate_inner(&self, patient_id: &str) -> Result<TriageResult, StoreError> {
        let patient = self.store.get_patient(patient_id).await?;
        let vitals = self.store.list_vitals(patient_id).await?;
        let actions = self.store.list_actions(patient_id).await?;

        let factors = assemble_factors(&patient, vitals.last(), &actions);
        let result = self.classifier.classify(&factors);

        self.store
            .patch_patient(patient_id, &PatientPatch::for_level(result.level))
            .await?;

        self.caches.results.insert(
            patient_id.to_string(),
            CachedTriageResult {
                result: result.clone(),
                timestamp: Utc::now(),
                auto_calculated: true,
            },
        );
        self.notify();
        info!(patient_id, level = %result.level, score = result.score, "triage recalculated");
        Ok(result)
    }

    /// Apply a clinician's manual triage override.
    ///
    /// Unlike recalculation this propagates persistence failures: an
    /// override that did not land must be surfaced to the operator, never
    /// silently dropped.
    #[instrument(skip(self))]
    pub async fn apply_triage_override(
        &self,
        patient_id: &str,
        new_level: TriageLevel,
        reason: Option<String>,
    ) -> Result<(), StoreError> {
        let patch = PatientPatch::for_level(new_level);
        self.store.patch_patient(patient_id, &patch).await?;

        self.caches.overrides.insert(
            patient_id.to_string(),
            TriageOverride {
                level: new_level,
                status: patch.triage_status,
                timestamp: Utc::now(),
                reason: reason.unwrap_or_else(|| DEFAULT_OVERRIDE_REASON.to_string()),
                // placeholder until operator identity is wired through
                overridden_by: "medical-personnel".to_string(),
                manual_override: true,
            },
        );
        self.notify();
        info!(patient_id, level = %new_level, "manual triage override applied");
        Ok(())
    }

    /// Classify already-fetched records without touching persistence.
    pub fn triage_for_patient_data(
        &self,
        patient: &PatientRecord,
        vitals: Option<&VitalsRecord>,
        actions: &[ActionRecord],
    ) -> TriageResult {
        self.classifier
            .classify(&assemble_factors(patient, vitals, actions))
    }

    fn notify(&self) {
        // nobody listening is fine
        let _ = self.changes.send(());
    }
}

/// Map persisted records onto classification factors.
///
/// Free-text fields fall back to their "other" variants when the primary is
/// blank. An action counts as an emergency intervention when it is typed
/// "emergency" or its text mentions emergency/critical care.
pub fn assemble_factors(
    patient: &PatientRecord,
    vitals: Option<&VitalsRecord>,
    actions: &[ActionRecord],
) -> TriageFactors {
    let emergency_action_count = actions.iter().filter(|a| is_emergency_action(a)).count() as u32;
    let medication_count = actions
        .iter()
        .filter(|a| a.action_type == "medication")
        .count() as u32;

    TriageFactors {
        heart_rate: vitals.and_then(|v| v.heart_rate),
        systolic_bp: vitals.and_then(|v| v.bp_systolic),
        diastolic_bp: vitals.and_then(|v| v.bp_diastolic),
        respiratory_rate: vitals.and_then(|v| v.respiratory_rate),
        temperature: vitals.and_then(|v| v.temperature),
        oxygen_saturation: vitals.and_then(|v| v.oxygen_saturation),
        consciousness: filled(&patient.consciousness),
        mechanism: filled(&patient.mechanism).or_else(|| filled(&patient.mechanism_other)),
        visible_injuries: patient.visible_injuries,
        selected_injuries: patient.selected_injuries.clone(),
        chief_complaint: filled(&patient.chief_complaint)
            .or_else(|| filled(&patient.chief_complaint_other)),
        action_count: actions.len() as u32,
        emergency_action_count,
        medication_count,
    }
}

fn filled(text: &str) -> Option<String> {
    (!text.is_empty()).then(|| text.to_string())
}

fn is_emergency_action(action: &ActionRecord) -> bool {
    if action.action_type == "emergency" {
        return true;
    }
    let text = action.action.to_lowercase();
    text.contains("emergency") || text.contains("critical")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MockPatientStore;
    use serde_json::json;

    fn injured_patient() -> PatientRecord {
        PatientRecord {
            id: 7,
            name: "John Doe".to_string(),
            consciousness: "alert".to_string(),
            visible_injuries: true,
            selected_injuries: vec!["head injury".to_string(), "chest injury".to_string()],
            ..PatientRecord::default()
        }
    }

    fn action(action_type: &str, text: &str) -> ActionRecord {
        ActionRecord {
            action: text.to_string(),
            action_type: action_type.to_string(),
            ..ActionRecord::default()
        }
    }

    // ── Factor assembly ────────────────────────────────────────

    #[test]
    fn factors_use_latest_vitals_and_other_fallbacks() {
        let patient = PatientRecord {
            mechanism: String::new(),
            mechanism_other: "fell off scaffolding".to_string(),
            chief_complaint: String::new(),
            chief_complaint_other: "leg pain".to_string(),
            ..injured_patient()
        };
        let latest = VitalsRecord {
            heart_rate: Some(112.0),
            bp_systolic: Some(95.0),
            ..VitalsRecord::default()
        };
        let actions = vec![
            action("emergency", "tourniquet"),
            action("assessment", "Critical bleeding noted"),
            action("medication", "morphine"),
            action("assessment", "splint"),
        ];

        let factors = assemble_factors(&patient, Some(&latest), &actions);
        assert_eq!(factors.heart_rate, Some(112.0));
        assert_eq!(factors.systolic_bp, Some(95.0));
        assert_eq!(factors.mechanism.as_deref(), Some("fell off scaffolding"));
        assert_eq!(factors.chief_complaint.as_deref(), Some("leg pain"));
        assert_eq!(factors.action_count, 4);
        // typed emergency + text mentioning "critical"
        assert_eq!(factors.emergency_action_count, 2);
        assert_eq!(factors.medication_count, 1);
    }

    #[test]
    fn factors_without_vitals_leave_vitals_unset() {
        let factors = assemble_factors(&injured_patient(), None, &[]);
        assert_eq!(factors.heart_rate, None);
        assert_eq!(factors.systolic_bp, None);
        assert_eq!(factors.consciousness.as_deref(), Some("alert"));
    }

    #[test]
    fn snake_and_camel_case_records_classify_identically() {
        let service = TriageService::new(Arc::new(MockPatientStore::new()));

        let snake: PatientRecord = serde_json::from_value(json!({
            "id": 1,
            "visible_injuries": true,
            "selected_injuries": ["head injury"],
            "chief_complaint": "headache"
        }))
        .unwrap();
        let camel: PatientRecord = serde_json::from_value(json!({
            "id": 1,
            "visibleInjuries": true,
            "selectedInjuries": ["head injury"],
            "chiefComplaint": "headache"
        }))
        .unwrap();
        assert_eq!(snake, camel);

        let snake_vitals: VitalsRecord =
            serde_json::from_value(json!({ "heart_rate": 120.0, "bp_systolic": 80.0 })).unwrap();
        let camel_vitals: VitalsRecord =
            serde_json::from_value(json!({ "heartRate": 120.0, "bpSystolic": 80.0 })).unwrap();

        let a = service.triage_for_patient_data(&snake, Some(&snake_vitals), &[]);
        let b = service.triage_for_patient_data(&camel, Some(&camel_vitals), &[]);
        assert_eq!(a, b);
    }

    // ── Recalculation ──────────────────────────────────────────

    #[tokio::test]
    async fn recalculation_patches_caches_and_notifies() {
        let mut store = MockPatientStore::new();
        store
            .expect_get_patient()
            .returning(|_| Ok(injured_patient()));
        store.expect_list_vitals().returning(|_| Ok(vec![]));
        store.expect_list_actions().returning(|_| Ok(vec![]));
        store
            .expect_patch_patient()
            .withf(|id, patch| {
                id == "7"
                    && patch.triage_level == TriageLevel::Red
                    && patch.triage_status == "Critical"
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let service = TriageService::new(Arc::new(store));
        let mut changes = service.subscribe();

        let result = service.recalculate_patient_triage("7").await;
        assert_eq!(result.level, TriageLevel::Red);
        assert_eq!(result.injury_severity_score, Some(21));

        let cached = service.cached_result("7").expect("result cached");
        assert!(cached.auto_calculated);
        assert_eq!(cached.result, result);
        assert!(changes.try_recv().is_ok());
    }

    #[tokio::test]
    async fn fetch_failure_degrades_to_stable_yellow() {
        let mut store = MockPatientStore::new();
        store.expect_get_patient().returning(|_| {
            Err(StoreError::Api {
                status: 500,
                body: "backend down".to_string(),
            })
        });
        store.expect_patch_patient().times(0);

        let service = TriageService::new(Arc::new(store));
        let mut changes = service.subscribe();

        let result = service.recalculate_patient_triage("7").await;
        assert_eq!(result.level, TriageLevel::Yellow);
        assert_eq!(result.score, 0.0);
        assert_eq!(
            result.reasoning,
            vec!["Error calculating triage - defaulting to stable"]
        );
        assert_eq!(result.shock_index, None);
        assert_eq!(result.injury_severity_score, None);
        assert!(service.cached_result("7").is_none());
        assert!(changes.try_recv().is_err());
    }

    #[tokio::test]
    async fn patch_failure_also_degrades_to_stable_yellow() {
        let mut store = MockPatientStore::new();
        store
            .expect_get_patient()
            .returning(|_| Ok(injured_patient()));
        store.expect_list_vitals().returning(|_| Ok(vec![]));
        store.expect_list_actions().returning(|_| Ok(vec![]));
        store.expect_patch_patient().returning(|_, _| {
            Err(StoreError::Api {
                status: 502,
                body: "bad gateway".to_string(),
            })
        });

        let service = TriageService::new(Arc::new(store));
        let result = service.recalculate_patient_triage("7").await;
        assert_eq!(result.level, TriageLevel::Yellow);
        assert!(service.cached_result("7").is_none());
    }

    // ── Manual override ────────────────────────────────────────

    #[tokio::test]
    async fn override_records_and_notifies() {
        let mut store = MockPatientStore::new();
        store
            .expect_patch_patient()
            .withf(|id, patch| {
                id == "7"
                    && patch.triage_level == TriageLevel::Black
                    && patch.triage_status == "Deceased"
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let service = TriageService::new(Arc::new(store));
        let mut changes = service.subscribe();

        service
            .apply_triage_override("7", TriageLevel::Black, None)
            .await
            .unwrap();

        let stored = service.cached_override("7").expect("override cached");
        assert_eq!(stored.level, TriageLevel::Black);
        assert_eq!(stored.status, "Deceased");
        assert_eq!(stored.reason, DEFAULT_OVERRIDE_REASON);
        assert!(stored.manual_override);
        assert!(changes.try_recv().is_ok());
    }

    #[tokio::test]
    async fn override_failure_propagates_and_caches_nothing() {
        let mut store = MockPatientStore::new();
        store.expect_patch_patient().returning(|_, _| {
            Err(StoreError::Api {
                status: 500,
                body: "backend down".to_string(),
            })
        });

        let service = TriageService::new(Arc::new(store));
        let err = service
            .apply_triage_override("7", TriageLevel::Red, Some("deteriorating".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Api { status: 500, .. }));
        assert!(service.cached_override("7").is_none());
    }

    #[tokio::test]
    async fn override_keeps_custom_reason() {
        let mut store = MockPatientStore::new();
        store.expect_patch_patient().returning(|_, _| Ok(()));

        let service = TriageService::new(Arc::new(store));
        service
            .apply_triage_override("3", TriageLevel::Green, Some("walking wounded".to_string()))
            .await
            .unwrap();
        assert_eq!(service.cached_override("3").unwrap().reason, "walking wounded");
    }
}
