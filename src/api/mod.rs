//! REST client for the TriageX persistence backend.
//!
//! The service only needs four logical operations (patient read, vitals
//! history, action history, triage patch) plus a patient listing for the
//! dashboard path; everything else the backend offers stays out of scope.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

use crate::models::{ActionRecord, PatientPatch, PatientRecord, VitalsRecord};

/// Failure modes of the persistence backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend answered with a non-success status.
    #[error("API {status}: {body}")]
    Api { status: u16, body: String },
    /// Connection, timeout, or body decode failure.
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Persistence collaborator as seen by the triage service.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PatientStore: Send + Sync {
    async fn get_patient(&self, id: &str) -> Result<PatientRecord, StoreError>;
    async fn list_patients(&self) -> Result<Vec<PatientRecord>, StoreError>;
    /// Vitals history ordered oldest to newest.
    async fn list_vitals(&self, patient_id: &str) -> Result<Vec<VitalsRecord>, StoreError>;
    async fn list_actions(&self, patient_id: &str) -> Result<Vec<ActionRecord>, StoreError>;
    async fn patch_patient(&self, id: &str, patch: &PatientPatch) -> Result<(), StoreError>;
}

/// [`PatientStore`] over the backend's JSON REST API.
pub struct HttpPatientStore {
    client: reqwest::Client,
    base: String,
}

impl HttpPatientStore {
    pub fn new(base: impl Into<String>) -> Self {
        let base = base.into().trim_end_matches('/').to_string();
        Self {
            client: reqwest::Client::new(),
            base,
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, StoreError> {
        debug!(path, "GET");
        let response = self.client.get(format!("{}{path}", self.base)).send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(StoreError::Api { status, body })
    }
}

#[async_trait]
impl PatientStore for HttpPatientStore {
    async fn get_patient(&self, id: &str) -> Result<PatientRecord, StoreError> {
        self.get_json(&format!("/patients/{id}/")).await
    }

    async fn list_patients(&self) -> Result<Vec<PatientRecord>, StoreError> {
        self.get_json("/patients/").await
    }

    async fn list_vitals(&self, patient_id: &str) -> Result<Vec<VitalsRecord>, StoreError> {
        self.get_json(&format!("/vitalsigns/?patient_id={patient_id}"))
            .await
    }

    async fn list_actions(&self, patient_id: &str) -> Result<Vec<ActionRecord>, StoreError> {
        self.get_json(&format!("/paramedic-actions/?patient_id={patient_id}"))
            .await
    }

    async fn patch_patient(&self, id: &str, patch: &PatientPatch) -> Result<(), StoreError> {
        debug!(id, level = %patch.triage_level, "PATCH patient triage");
        let response = self
            .client
            .patch(format!("{}/patients/{id}/", self.base))
            .json(patch)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}
