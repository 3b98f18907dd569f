//! Chart data: allergies, problems, medications, vitals, labs, alerts

use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::envelope::{normalize_list, normalize_record};
use super::executor::RequestExecutor;
use super::fields::UpstreamFields;
use crate::error::AthenaError;

pub const PRESCRIPTION_NOTE: &str = "The prescription endpoint is not available in the athenahealth \
     preview/sandbox environment. This endpoint requires a production API account.";
pub const DRUG_INTERACTION_NOTE: &str =
    "Drug interaction checks are not available in the athenahealth preview/sandbox environment.";
pub const ALERT_NOTE: &str =
    "Clinical alert endpoints are not available in the athenahealth preview/sandbox environment.";

/// Optional date window shared by the clinical list endpoints
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DateRange {
    /// Start date (YYYY-MM-DD)
    #[serde(default, alias = "startdate", skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    /// End date (YYYY-MM-DD)
    #[serde(default, alias = "enddate", skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
}

impl DateRange {
    pub fn to_upstream(&self) -> UpstreamFields {
        UpstreamFields::new()
            .push_opt("startdate", self.start_date.as_deref())
            .push_opt("enddate", self.end_date.as_deref())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PrescriptionQuery {
    /// ACTIVE, INACTIVE or DISCONTINUED
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(flatten)]
    pub range: DateRange,
}

impl PrescriptionQuery {
    pub fn to_upstream(&self) -> UpstreamFields {
        UpstreamFields::new()
            .push_opt("status", self.status.as_deref())
            .merge(self.range.to_upstream())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LabQuery {
    #[serde(flatten)]
    pub range: DateRange,
    /// Fetch a single lab result
    #[serde(default, alias = "labresultid", skip_serializing_if = "Option::is_none")]
    pub lab_result_id: Option<String>,
}

impl LabQuery {
    pub fn to_upstream(&self) -> UpstreamFields {
        self.range.to_upstream().push_opt("labresultid", self.lab_result_id.as_deref())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AlertQuery {
    #[serde(default, alias = "alerttype", skip_serializing_if = "Option::is_none")]
    pub alert_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acknowledged: Option<bool>,
}

impl AlertQuery {
    pub fn to_upstream(&self) -> UpstreamFields {
        UpstreamFields::new()
            .push_opt("alerttype", self.alert_type.as_deref())
            .push_opt("severity", self.severity.as_deref())
            .push_opt("acknowledged", self.acknowledged)
    }
}

/// Prescription fields without the patient, which travels in the path
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PrescriptionDetails {
    /// Medication name
    #[serde(alias = "medicationname")]
    pub medication_name: String,
    /// Dosage (e.g., "10mg")
    pub dosage: String,
    /// Route of administration (e.g., "oral")
    pub route: String,
    /// Frequency (e.g., "twice daily")
    pub frequency: String,
    /// Quantity to dispense
    pub quantity: String,
    /// Number of refills
    pub refills: String,
    /// Days supply
    #[serde(alias = "daysupply")]
    pub days_supply: String,
    /// Pharmacy ID (optional)
    #[serde(default, alias = "pharmacyid", skip_serializing_if = "Option::is_none")]
    pub pharmacy_id: Option<String>,
    /// Additional notes (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl PrescriptionDetails {
    pub fn to_upstream(&self) -> UpstreamFields {
        UpstreamFields::new()
            .push("medicationname", &self.medication_name)
            .push("dosage", &self.dosage)
            .push("route", &self.route)
            .push("frequency", &self.frequency)
            .push("quantity", &self.quantity)
            .push("refills", &self.refills)
            .push("daysupply", &self.days_supply)
            .push_opt("pharmacyid", self.pharmacy_id.as_deref())
            .push_opt("notes", self.notes.as_deref())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CreatePrescriptionArgs {
    /// Patient ID
    #[serde(alias = "patientid")]
    pub patient_id: String,
    #[serde(flatten)]
    pub prescription: PrescriptionDetails,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DrugInteractionArgs {
    /// Patient ID
    #[serde(alias = "patientid")]
    pub patient_id: String,
    /// List of medication names or RxNorm codes
    pub medications: Vec<String>,
}

pub fn medication_fields(medications: &[String]) -> UpstreamFields {
    medications
        .iter()
        .enumerate()
        .map(|(i, med)| (format!("medications[{i}]"), med))
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AcknowledgeAlertArgs {
    /// Alert ID
    #[serde(alias = "alertid")]
    pub alert_id: String,
    /// User acknowledging the alert
    #[serde(alias = "acknowledgedby")]
    pub acknowledged_by: String,
}

#[async_trait]
pub trait ClinicalApi: Send + Sync {
    async fn get_patient_allergies(&self, patient_id: &str) -> Result<Vec<Value>, AthenaError>;

    async fn get_patient_problems(&self, patient_id: &str) -> Result<Vec<Value>, AthenaError>;

    async fn get_patient_prescriptions(
        &self,
        patient_id: &str,
        query: &PrescriptionQuery,
    ) -> Result<Vec<Value>, AthenaError>;

    async fn create_prescription(
        &self,
        patient_id: &str,
        prescription: &PrescriptionDetails,
    ) -> Result<Value, AthenaError>;

    async fn get_patient_vitals(&self, patient_id: &str, range: &DateRange) -> Result<Vec<Value>, AthenaError>;

    async fn get_patient_labs(&self, patient_id: &str, query: &LabQuery) -> Result<Vec<Value>, AthenaError>;

    async fn get_clinical_alerts(&self, patient_id: &str, query: &AlertQuery) -> Result<Vec<Value>, AthenaError>;

    async fn acknowledge_alert(&self, alert_id: &str, acknowledged_by: &str) -> Result<Value, AthenaError>;

    async fn check_drug_interactions(
        &self,
        patient_id: &str,
        medications: &[String],
    ) -> Result<Vec<Value>, AthenaError>;
}

pub struct ClinicalService {
    executor: Arc<RequestExecutor>,
}

impl ClinicalService {
    pub fn new(executor: Arc<RequestExecutor>) -> Self {
        Self { executor }
    }

    async fn chart_list(
        &self,
        patient_id: &str,
        resource: &str,
        envelope: &str,
        query: &UpstreamFields,
    ) -> Result<Vec<Value>, AthenaError> {
        let body = self
            .executor
            .get(&["patients", patient_id, resource], query)
            .await
            .map_err(|e| e.for_tier(self.executor.tier(), &unavailable_note(resource)))?;
        Ok(normalize_list(body, envelope))
    }
}

fn unavailable_note(resource: &str) -> String {
    format!("The {resource} endpoint is not available in the athenahealth preview/sandbox environment.")
}

#[async_trait]
impl ClinicalApi for ClinicalService {
    async fn get_patient_allergies(&self, patient_id: &str) -> Result<Vec<Value>, AthenaError> {
        self.chart_list(patient_id, "allergies", "allergies", &UpstreamFields::new()).await
    }

    async fn get_patient_problems(&self, patient_id: &str) -> Result<Vec<Value>, AthenaError> {
        self.chart_list(patient_id, "problems", "problems", &UpstreamFields::new()).await
    }

    async fn get_patient_prescriptions(
        &self,
        patient_id: &str,
        query: &PrescriptionQuery,
    ) -> Result<Vec<Value>, AthenaError> {
        self.chart_list(patient_id, "prescriptions", "prescriptions", &query.to_upstream()).await
    }

    async fn create_prescription(
        &self,
        patient_id: &str,
        prescription: &PrescriptionDetails,
    ) -> Result<Value, AthenaError> {
        let body = self
            .executor
            .post_form(&["patients", patient_id, "prescriptions"], &prescription.to_upstream())
            .await
            .map_err(|e| e.for_tier(self.executor.tier(), PRESCRIPTION_NOTE))?;
        Ok(normalize_record(body))
    }

    async fn get_patient_vitals(&self, patient_id: &str, range: &DateRange) -> Result<Vec<Value>, AthenaError> {
        self.chart_list(patient_id, "vitals", "vitals", &range.to_upstream()).await
    }

    async fn get_patient_labs(&self, patient_id: &str, query: &LabQuery) -> Result<Vec<Value>, AthenaError> {
        self.chart_list(patient_id, "labs", "labs", &query.to_upstream()).await
    }

    async fn get_clinical_alerts(&self, patient_id: &str, query: &AlertQuery) -> Result<Vec<Value>, AthenaError> {
        self.chart_list(patient_id, "clinicalalerts", "clinicalalerts", &query.to_upstream()).await
    }

    async fn acknowledge_alert(&self, alert_id: &str, acknowledged_by: &str) -> Result<Value, AthenaError> {
        self.executor
            .post_form(
                &["clinicalalerts", alert_id, "acknowledge"],
                &UpstreamFields::new().push("acknowledgedby", acknowledged_by),
            )
            .await
            .map_err(|e| e.for_tier(self.executor.tier(), ALERT_NOTE))
    }

    async fn check_drug_interactions(
        &self,
        patient_id: &str,
        medications: &[String],
    ) -> Result<Vec<Value>, AthenaError> {
        let body = self
            .executor
            .post_form(&["patients", patient_id, "druginteractions"], &medication_fields(medications))
            .await
            .map_err(|e| e.for_tier(self.executor.tier(), DRUG_INTERACTION_NOTE))?;
        Ok(normalize_list(body, "druginteractions"))
    }
}
