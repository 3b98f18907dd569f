//! Patient demographics: search, lookup, registration, insurance

use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::envelope::{normalize_list, normalize_record};
use super::executor::RequestExecutor;
use super::fields::UpstreamFields;
use crate::error::{AthenaError, Guidance};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SearchPatientsArgs {
    /// Patient first name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firstname: Option<String>,
    /// Patient last name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lastname: Option<String>,
    /// Date of birth (YYYY-MM-DD)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dob: Option<String>,
    /// Phone number
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    /// Email address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Restrict to patients registered in a department
    #[serde(default, alias = "departmentid", skip_serializing_if = "Option::is_none")]
    pub department_id: Option<String>,
    /// Maximum number of results (upstream default 10)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

impl SearchPatientsArgs {
    /// True when at least one recognized filter carries a value
    pub fn has_filter(&self) -> bool {
        [&self.firstname, &self.lastname, &self.dob, &self.department_id, &self.phone, &self.email]
            .iter()
            .any(|field| field.as_deref().is_some_and(|v| !v.trim().is_empty()))
    }

    pub fn to_upstream(&self) -> UpstreamFields {
        UpstreamFields::new()
            .push_opt("firstname", self.firstname.as_deref())
            .push_opt("lastname", self.lastname.as_deref())
            .push_opt("dob", self.dob.as_deref())
            .push_opt("departmentid", self.department_id.as_deref())
            .push_opt("phone", self.phone.as_deref())
            .push_opt("email", self.email.as_deref())
            .push_opt("limit", self.limit)
    }
}

/// Rejection returned for a search without any filter
pub fn search_guidance() -> Guidance {
    Guidance {
        error: "At least one search parameter is required".to_string(),
        message: "Please provide at least one of: firstname, lastname, dob, departmentid, phone, or email"
            .to_string(),
        example: json!({"firstname": "John", "lastname": "Doe", "limit": 10}),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CreatePatientArgs {
    /// Patient first name
    pub firstname: String,
    /// Patient last name
    pub lastname: String,
    /// Date of birth (MM/DD/YYYY or YYYY-MM-DD)
    pub dob: String,
    /// Sex (M or F)
    pub sex: String,
    /// Primary department ID
    #[serde(alias = "departmentid")]
    pub department_id: String,
    /// Email address (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Mobile phone number (optional)
    #[serde(default, alias = "mobilephone", skip_serializing_if = "Option::is_none")]
    pub mobile_phone: Option<String>,
    /// Home phone number (optional)
    #[serde(default, alias = "homephone", skip_serializing_if = "Option::is_none")]
    pub home_phone: Option<String>,
    /// Street address (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address1: Option<String>,
    /// City (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    /// State (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// ZIP code (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zip: Option<String>,
    /// Guarantor first name (optional)
    #[serde(default, alias = "guarantorfirstname", skip_serializing_if = "Option::is_none")]
    pub guarantor_firstname: Option<String>,
    /// Guarantor last name (optional)
    #[serde(default, alias = "guarantorlastname", skip_serializing_if = "Option::is_none")]
    pub guarantor_lastname: Option<String>,
    /// Guarantor date of birth (optional)
    #[serde(default, alias = "guarantordob", skip_serializing_if = "Option::is_none")]
    pub guarantor_dob: Option<String>,
    /// Relationship to patient: 1=Self, 2=Spouse, 3=Child, 4=Other (optional)
    #[serde(
        default,
        alias = "guarantorrelationshiptopatient",
        skip_serializing_if = "Option::is_none"
    )]
    pub guarantor_relationship: Option<String>,
}

impl CreatePatientArgs {
    pub fn to_upstream(&self) -> UpstreamFields {
        UpstreamFields::new()
            .push("firstname", &self.firstname)
            .push("lastname", &self.lastname)
            .push("dob", &self.dob)
            .push("sex", &self.sex)
            .push("departmentid", &self.department_id)
            .push_opt("email", self.email.as_deref())
            .push_opt("mobilephone", self.mobile_phone.as_deref())
            .push_opt("homephone", self.home_phone.as_deref())
            .push_opt("address1", self.address1.as_deref())
            .push_opt("city", self.city.as_deref())
            .push_opt("state", self.state.as_deref())
            .push_opt("zip", self.zip.as_deref())
            .push_opt("guarantorfirstname", self.guarantor_firstname.as_deref())
            .push_opt("guarantorlastname", self.guarantor_lastname.as_deref())
            .push_opt("guarantordob", self.guarantor_dob.as_deref())
            .push_opt("guarantorrelationshiptopatient", self.guarantor_relationship.as_deref())
    }
}

#[async_trait]
pub trait PatientApi: Send + Sync {
    /// Search by demographics; refuses to run without a filter
    async fn search_patients(&self, args: &SearchPatientsArgs) -> Result<Vec<Value>, AthenaError>;

    async fn get_patient(&self, patient_id: &str) -> Result<Value, AthenaError>;

    async fn create_patient(&self, args: &CreatePatientArgs) -> Result<Value, AthenaError>;

    async fn get_patient_insurance(&self, patient_id: &str) -> Result<Vec<Value>, AthenaError>;
}

pub struct PatientService {
    executor: Arc<RequestExecutor>,
}

impl PatientService {
    pub fn new(executor: Arc<RequestExecutor>) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl PatientApi for PatientService {
    async fn search_patients(&self, args: &SearchPatientsArgs) -> Result<Vec<Value>, AthenaError> {
        if !args.has_filter() {
            return Err(AthenaError::Validation(search_guidance()));
        }
        let body = self.executor.get(&["patients"], &args.to_upstream()).await?;
        Ok(normalize_list(body, "patients"))
    }

    async fn get_patient(&self, patient_id: &str) -> Result<Value, AthenaError> {
        let body = self.executor.get(&["patients", patient_id], &UpstreamFields::new()).await?;
        Ok(normalize_record(body))
    }

    async fn create_patient(&self, args: &CreatePatientArgs) -> Result<Value, AthenaError> {
        let body = self.executor.post_form(&["patients"], &args.to_upstream()).await?;
        Ok(normalize_record(body))
    }

    async fn get_patient_insurance(&self, patient_id: &str) -> Result<Vec<Value>, AthenaError> {
        let body = self
            .executor
            .get(&["patients", patient_id, "insurance"], &UpstreamFields::new())
            .await?;
        Ok(normalize_list(body, "insurances"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_requires_a_filter() {
        assert!(!SearchPatientsArgs::default().has_filter());
        assert!(!SearchPatientsArgs { limit: Some(5), ..Default::default() }.has_filter());
        assert!(!SearchPatientsArgs { lastname: Some("  ".into()), ..Default::default() }.has_filter());
        assert!(SearchPatientsArgs { department_id: Some("1".into()), ..Default::default() }.has_filter());
    }

    #[test]
    fn test_search_renames_department() {
        let args: SearchPatientsArgs =
            serde_json::from_value(json!({"lastname": "Doe", "departmentid": "4", "limit": 3})).unwrap();
        let fields = args.to_upstream();
        assert_eq!(fields.keys().collect::<Vec<_>>(), vec!["lastname", "departmentid", "limit"]);
    }

    #[test]
    fn test_create_patient_maps_only_present_fields() {
        let args: CreatePatientArgs = serde_json::from_value(json!({
            "firstname": "John",
            "lastname": "Doe",
            "dob": "1990-01-01",
            "sex": "M",
            "department_id": "1"
        }))
        .unwrap();

        let pairs: Vec<(String, String)> = args.to_upstream().as_pairs().to_vec();
        let expected: Vec<(String, String)> = [
            ("firstname", "John"),
            ("lastname", "Doe"),
            ("dob", "1990-01-01"),
            ("sex", "M"),
            ("departmentid", "1"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        assert_eq!(pairs, expected);
    }

    #[test]
    fn test_create_patient_renames_guarantor_fields() {
        let args = CreatePatientArgs {
            mobile_phone: Some("5551234567".into()),
            guarantor_relationship: Some("1".into()),
            ..Default::default()
        };
        let fields = args.to_upstream();
        assert_eq!(fields.get("mobilephone"), Some("5551234567"));
        assert_eq!(fields.get("guarantorrelationshiptopatient"), Some("1"));
        assert!(fields.get("mobile_phone").is_none());
    }
}
