//! Providers, departments and appointments

use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::clinical::DateRange;
use super::envelope::{normalize_list, normalize_list_any, normalize_record};
use super::executor::RequestExecutor;
use super::fields::UpstreamFields;
use crate::error::AthenaError;

pub const AVAILABILITY_NOTE: &str = "This endpoint may not be available in the preview/sandbox environment";
pub const APPOINTMENT_NOTE: &str = "This endpoint may not be available in the preview/sandbox environment \
     or may require specific appointment types";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ProviderQuery {
    /// Maximum number of results (default 50)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u32>,
    /// Filter by provider name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Filter by specialty
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specialty: Option<String>,
}

impl ProviderQuery {
    pub fn to_upstream(&self) -> UpstreamFields {
        UpstreamFields::new()
            .push_opt("limit", self.limit)
            .push_opt("offset", self.offset)
            .push_opt("name", self.name.as_deref())
            .push_opt("specialty", self.specialty.as_deref())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AvailabilityArgs {
    /// Department ID
    #[serde(alias = "departmentid")]
    pub department_id: String,
    /// Provider ID (optional - leave empty to check all providers)
    #[serde(default, alias = "providerid", skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
    /// Appointment type (optional)
    #[serde(default, alias = "appointmenttype", skip_serializing_if = "Option::is_none")]
    pub appointment_type: Option<String>,
    /// Start date (YYYY-MM-DD)
    #[serde(alias = "startdate")]
    pub start_date: String,
    /// End date (YYYY-MM-DD)
    #[serde(alias = "enddate")]
    pub end_date: String,
}

impl AvailabilityArgs {
    pub fn to_upstream(&self) -> UpstreamFields {
        UpstreamFields::new()
            .push("departmentid", &self.department_id)
            .push_opt("providerid", self.provider_id.as_deref())
            .push_opt("appointmenttype", self.appointment_type.as_deref())
            .push("startdate", &self.start_date)
            .push("enddate", &self.end_date)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CreateAppointmentArgs {
    /// Patient ID
    #[serde(alias = "patientid")]
    pub patient_id: String,
    /// Provider ID
    #[serde(alias = "providerid")]
    pub provider_id: String,
    /// Department ID
    #[serde(alias = "departmentid")]
    pub department_id: String,
    /// Appointment type
    #[serde(alias = "appointmenttype")]
    pub appointment_type: String,
    /// Appointment date (YYYY-MM-DD)
    pub date: String,
    /// Start time (HH:MM)
    #[serde(alias = "starttime")]
    pub start_time: String,
    /// Duration in minutes (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    /// Reason for visit (optional)
    #[serde(default, alias = "reasonforvisit", skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Appointment notes (optional)
    #[serde(default, alias = "appointmentnotes", skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl CreateAppointmentArgs {
    pub fn to_upstream(&self) -> UpstreamFields {
        UpstreamFields::new()
            .push("patientid", &self.patient_id)
            .push("providerid", &self.provider_id)
            .push("departmentid", &self.department_id)
            .push("appointmenttype", &self.appointment_type)
            .push("date", &self.date)
            .push("starttime", &self.start_time)
            .push_opt("duration", self.duration.as_deref())
            .push_opt("reasonforvisit", self.reason.as_deref())
            .push_opt("appointmentnotes", self.notes.as_deref())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PatientAppointmentQuery {
    #[serde(flatten)]
    pub range: DateRange,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl PatientAppointmentQuery {
    pub fn to_upstream(&self) -> UpstreamFields {
        self.range.to_upstream().push_opt("status", self.status.as_deref())
    }
}

#[async_trait]
pub trait SchedulingApi: Send + Sync {
    async fn get_providers(&self, query: &ProviderQuery) -> Result<Vec<Value>, AthenaError>;

    async fn get_provider(&self, provider_id: &str) -> Result<Value, AthenaError>;

    async fn get_departments(&self) -> Result<Vec<Value>, AthenaError>;

    async fn get_department(&self, department_id: &str) -> Result<Value, AthenaError>;

    async fn get_appointment_availability(&self, args: &AvailabilityArgs) -> Result<Vec<Value>, AthenaError>;

    async fn create_appointment(&self, args: &CreateAppointmentArgs) -> Result<Value, AthenaError>;

    async fn get_patient_appointments(
        &self,
        patient_id: &str,
        query: &PatientAppointmentQuery,
    ) -> Result<Vec<Value>, AthenaError>;
}

pub struct SchedulingService {
    executor: Arc<RequestExecutor>,
}

impl SchedulingService {
    pub fn new(executor: Arc<RequestExecutor>) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl SchedulingApi for SchedulingService {
    async fn get_providers(&self, query: &ProviderQuery) -> Result<Vec<Value>, AthenaError> {
        let body = self.executor.get(&["providers"], &query.to_upstream()).await?;
        Ok(normalize_list(body, "providers"))
    }

    async fn get_provider(&self, provider_id: &str) -> Result<Value, AthenaError> {
        let body = self.executor.get(&["providers", provider_id], &UpstreamFields::new()).await?;
        Ok(normalize_record(body))
    }

    async fn get_departments(&self) -> Result<Vec<Value>, AthenaError> {
        let body = self.executor.get(&["departments"], &UpstreamFields::new()).await?;
        Ok(normalize_list(body, "departments"))
    }

    async fn get_department(&self, department_id: &str) -> Result<Value, AthenaError> {
        let body = self.executor.get(&["departments", department_id], &UpstreamFields::new()).await?;
        Ok(normalize_record(body))
    }

    async fn get_appointment_availability(&self, args: &AvailabilityArgs) -> Result<Vec<Value>, AthenaError> {
        let body = self
            .executor
            .get(&["appointments", "open"], &args.to_upstream())
            .await
            .map_err(|e| e.for_tier(self.executor.tier(), AVAILABILITY_NOTE))?;
        Ok(normalize_list_any(body, &["appointments", "openappointments"]))
    }

    async fn create_appointment(&self, args: &CreateAppointmentArgs) -> Result<Value, AthenaError> {
        let body = self
            .executor
            .post_form(&["appointments"], &args.to_upstream())
            .await
            .map_err(|e| e.for_tier(self.executor.tier(), APPOINTMENT_NOTE))?;
        Ok(normalize_record(body))
    }

    async fn get_patient_appointments(
        &self,
        patient_id: &str,
        query: &PatientAppointmentQuery,
    ) -> Result<Vec<Value>, AthenaError> {
        let body = self
            .executor
            .get(&["patients", patient_id, "appointments"], &query.to_upstream())
            .await?;
        Ok(normalize_list(body, "appointments"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_appointment_field_table() {
        let args: CreateAppointmentArgs = serde_json::from_value(json!({
            "patient_id": "1",
            "provider_id": "2",
            "department_id": "3",
            "appointment_type": "82",
            "date": "2024-05-01",
            "start_time": "09:30",
            "reason": "Follow-up"
        }))
        .unwrap();

        let fields = args.to_upstream();
        assert_eq!(
            fields.keys().collect::<Vec<_>>(),
            vec!["patientid", "providerid", "departmentid", "appointmenttype", "date", "starttime", "reasonforvisit"]
        );
        assert_eq!(fields.get("reasonforvisit"), Some("Follow-up"));
    }

    #[test]
    fn test_availability_accepts_upstream_spelling() {
        let args: AvailabilityArgs = serde_json::from_value(json!({
            "departmentid": "1",
            "startdate": "2024-05-01",
            "enddate": "2024-05-07"
        }))
        .unwrap();

        let fields = args.to_upstream();
        assert_eq!(fields.keys().collect::<Vec<_>>(), vec!["departmentid", "startdate", "enddate"]);
    }

    #[test]
    fn test_provider_query_drops_absent_filters() {
        let query = ProviderQuery { name: Some("Smith".into()), ..Default::default() };
        assert_eq!(query.to_upstream().keys().collect::<Vec<_>>(), vec!["name"]);
    }

    #[tokio::test]
    async fn test_open_appointments_envelope_is_unwrapped() {
        use crate::audit::AuditLogger;
        use crate::client::AthenaClient;
        use crate::client::test_support::{config_for, mount_token};
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        mount_token(&server, 3600).await;
        Mock::given(method("GET"))
            .and(path("/v1/195900/appointments/open"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "openappointments": [{"appointmentid": "1"}],
                "totalcount": 1
            })))
            .mount(&server)
            .await;
        let client = AthenaClient::new(&config_for(&server.uri()), Arc::new(AuditLogger::disabled())).unwrap();

        let args = AvailabilityArgs {
            department_id: "1".into(),
            start_date: "2024-05-01".into(),
            end_date: "2024-05-07".into(),
            ..Default::default()
        };
        let slots = client.scheduling().get_appointment_availability(&args).await.unwrap();
        assert_eq!(slots, vec![json!({"appointmentid": "1"})]);
    }
}
