//! Encounters (visits) and their documentation

use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::envelope::{normalize_list, normalize_record};
use super::executor::RequestExecutor;
use super::fields::UpstreamFields;
use crate::error::AthenaError;

pub const ENCOUNTER_NOTE: &str =
    "Encounter endpoints may not be available in the athenahealth preview/sandbox environment.";
pub const CREATE_ENCOUNTER_NOTE: &str = "Encounter creation may not be available in the athenahealth \
     preview/sandbox environment. This endpoint typically requires production API access.";
pub const UPDATE_ENCOUNTER_NOTE: &str =
    "Encounter update may not be available in the athenahealth preview/sandbox environment.";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EncounterQuery {
    /// Filter by department ID (optional)
    #[serde(default, alias = "departmentid", skip_serializing_if = "Option::is_none")]
    pub department_id: Option<String>,
    /// Start date filter (YYYY-MM-DD) (optional)
    #[serde(default, alias = "startdate", skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    /// End date filter (YYYY-MM-DD) (optional)
    #[serde(default, alias = "enddate", skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    /// Filter by status: OPEN, CLOSED, SIGNED (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl EncounterQuery {
    pub fn to_upstream(&self) -> UpstreamFields {
        UpstreamFields::new()
            .push_opt("departmentid", self.department_id.as_deref())
            .push_opt("startdate", self.start_date.as_deref())
            .push_opt("enddate", self.end_date.as_deref())
            .push_opt("status", self.status.as_deref())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PatientEncountersArgs {
    /// Patient ID
    #[serde(alias = "patientid")]
    pub patient_id: String,
    #[serde(flatten)]
    pub query: EncounterQuery,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GetEncounterArgs {
    /// Encounter ID
    #[serde(alias = "encounterid")]
    pub encounter_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CreateEncounterArgs {
    /// Patient ID
    #[serde(alias = "patientid")]
    pub patient_id: String,
    /// Department ID
    #[serde(alias = "departmentid")]
    pub department_id: String,
    /// Provider ID (optional)
    #[serde(default, alias = "providerid", skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
    /// Encounter date (YYYY-MM-DD)
    #[serde(alias = "encounterdate")]
    pub encounter_date: String,
    /// Type of encounter (optional)
    #[serde(default, alias = "encountertype", skip_serializing_if = "Option::is_none")]
    pub encounter_type: Option<String>,
    /// Chief complaint (optional)
    #[serde(default, alias = "chiefcomplaint", skip_serializing_if = "Option::is_none")]
    pub chief_complaint: Option<String>,
    /// Associated appointment ID (optional)
    #[serde(default, alias = "appointmentid", skip_serializing_if = "Option::is_none")]
    pub appointment_id: Option<String>,
}

impl CreateEncounterArgs {
    pub fn to_upstream(&self) -> UpstreamFields {
        UpstreamFields::new()
            .push("patientid", &self.patient_id)
            .push("departmentid", &self.department_id)
            .push_opt("providerid", self.provider_id.as_deref())
            .push("encounterdate", &self.encounter_date)
            .push_opt("encountertype", self.encounter_type.as_deref())
            .push_opt("chiefcomplaint", self.chief_complaint.as_deref())
            .push_opt("appointmentid", self.appointment_id.as_deref())
    }
}

/// Encounter fields that can change after creation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EncounterUpdate {
    /// Chief complaint (optional)
    #[serde(default, alias = "chiefcomplaint", skip_serializing_if = "Option::is_none")]
    pub chief_complaint: Option<String>,
    /// Comma-separated ICD-10 diagnosis codes (optional)
    #[serde(default, alias = "diagnosiscodes", skip_serializing_if = "Option::is_none")]
    pub diagnosis_codes: Option<String>,
    /// Comma-separated CPT procedure codes (optional)
    #[serde(default, alias = "procedurecodes", skip_serializing_if = "Option::is_none")]
    pub procedure_codes: Option<String>,
    /// Status: OPEN, CLOSED, SIGNED (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl EncounterUpdate {
    pub fn to_upstream(&self) -> UpstreamFields {
        UpstreamFields::new()
            .push_opt("chiefcomplaint", self.chief_complaint.as_deref())
            .push_opt("diagnosiscodes", self.diagnosis_codes.as_deref())
            .push_opt("procedurecodes", self.procedure_codes.as_deref())
            .push_opt("status", self.status.as_deref())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct UpdateEncounterArgs {
    /// Encounter ID
    #[serde(alias = "encounterid")]
    pub encounter_id: String,
    #[serde(flatten)]
    pub update: EncounterUpdate,
}

#[async_trait]
pub trait EncounterApi: Send + Sync {
    async fn get_patient_encounters(
        &self,
        patient_id: &str,
        query: &EncounterQuery,
    ) -> Result<Vec<Value>, AthenaError>;

    async fn get_encounter(&self, encounter_id: &str) -> Result<Value, AthenaError>;

    async fn create_encounter(&self, args: &CreateEncounterArgs) -> Result<Value, AthenaError>;

    async fn update_encounter(&self, encounter_id: &str, update: &EncounterUpdate) -> Result<Value, AthenaError>;
}

pub struct EncounterService {
    executor: Arc<RequestExecutor>,
}

impl EncounterService {
    pub fn new(executor: Arc<RequestExecutor>) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl EncounterApi for EncounterService {
    async fn get_patient_encounters(
        &self,
        patient_id: &str,
        query: &EncounterQuery,
    ) -> Result<Vec<Value>, AthenaError> {
        let body = self
            .executor
            .get(&["patients", patient_id, "encounters"], &query.to_upstream())
            .await
            .map_err(|e| e.for_tier(self.executor.tier(), ENCOUNTER_NOTE))?;
        Ok(normalize_list(body, "encounters"))
    }

    async fn get_encounter(&self, encounter_id: &str) -> Result<Value, AthenaError> {
        let body = self
            .executor
            .get(&["encounters", encounter_id], &UpstreamFields::new())
            .await
            .map_err(|e| e.for_tier(self.executor.tier(), ENCOUNTER_NOTE))?;
        Ok(normalize_record(body))
    }

    async fn create_encounter(&self, args: &CreateEncounterArgs) -> Result<Value, AthenaError> {
        let body = self
            .executor
            .post_form(&["encounters"], &args.to_upstream())
            .await
            .map_err(|e| e.for_tier(self.executor.tier(), CREATE_ENCOUNTER_NOTE))?;
        Ok(normalize_record(body))
    }

    async fn update_encounter(&self, encounter_id: &str, update: &EncounterUpdate) -> Result<Value, AthenaError> {
        let body = self
            .executor
            .put_form(&["encounters", encounter_id], &update.to_upstream())
            .await
            .map_err(|e| e.for_tier(self.executor.tier(), UPDATE_ENCOUNTER_NOTE))?;
        Ok(normalize_record(body))
    }
}
