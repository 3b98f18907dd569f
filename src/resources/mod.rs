//! MCP resources implementation
//!
//! Resources provide read-only access to patient charts and the practice
//! directory under the `athena://` scheme.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::client::AthenaClient;
use crate::client::clinical::{AlertQuery, DateRange, LabQuery, PrescriptionQuery};
use crate::client::scheduling::ProviderQuery;
use crate::error::AthenaError;

pub const SCHEME: &str = "athena://";
const MIME_JSON: &str = "application/json";

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("Unknown resource URI: {0}")]
    InvalidUri(String),

    #[error("Failed to read resource {uri}: {source}")]
    Upstream {
        uri: String,
        #[source]
        source: AthenaError,
    },
}

/// Sub-resource of a patient chart
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatientView {
    Details,
    Allergies,
    Problems,
    Prescriptions,
    Vitals,
    Labs,
    Alerts,
}

impl PatientView {
    fn parse(segment: &str) -> Option<Self> {
        Some(match segment {
            "details" => Self::Details,
            "allergies" => Self::Allergies,
            "problems" => Self::Problems,
            "prescriptions" => Self::Prescriptions,
            "vitals" => Self::Vitals,
            "labs" => Self::Labs,
            "alerts" => Self::Alerts,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Details => "details",
            Self::Allergies => "allergies",
            Self::Problems => "problems",
            Self::Prescriptions => "prescriptions",
            Self::Vitals => "vitals",
            Self::Labs => "labs",
            Self::Alerts => "alerts",
        }
    }
}

/// A parsed `athena://` URI
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceUri {
    Patients,
    Patient { id: String, view: PatientView },
    Providers,
    Provider(String),
    Departments,
}

impl FromStr for ResourceUri {
    type Err = ResourceError;

    fn from_str(uri: &str) -> Result<Self, Self::Err> {
        let invalid = || ResourceError::InvalidUri(uri.to_string());
        let path = uri.strip_prefix(SCHEME).ok_or_else(invalid)?.trim_end_matches('/');
        let segments: Vec<&str> = path.split('/').collect();

        match segments.as_slice() {
            ["patients"] => Ok(Self::Patients),
            ["providers"] => Ok(Self::Providers),
            ["departments"] => Ok(Self::Departments),
            ["patient", id] if !id.is_empty() => {
                Ok(Self::Patient { id: id.to_string(), view: PatientView::Details })
            }
            ["patient", id, view] if !id.is_empty() => {
                let view = PatientView::parse(view).ok_or_else(invalid)?;
                Ok(Self::Patient { id: id.to_string(), view })
            }
            ["provider", id] if !id.is_empty() => Ok(Self::Provider(id.to_string())),
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for ResourceUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Patients => write!(f, "{SCHEME}patients"),
            Self::Patient { id, view: PatientView::Details } => write!(f, "{SCHEME}patient/{id}"),
            Self::Patient { id, view } => write!(f, "{SCHEME}patient/{id}/{}", view.as_str()),
            Self::Providers => write!(f, "{SCHEME}providers"),
            Self::Provider(id) => write!(f, "{SCHEME}provider/{id}"),
            Self::Departments => write!(f, "{SCHEME}departments"),
        }
    }
}

/// Entry in the `resources/list` catalogue
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDescriptor {
    pub uri: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub mime_type: &'static str,
}

const fn descriptor(uri: &'static str, name: &'static str, description: &'static str) -> ResourceDescriptor {
    ResourceDescriptor { uri, name, description, mime_type: MIME_JSON }
}

pub fn resource_catalogue() -> Vec<ResourceDescriptor> {
    vec![
        descriptor(
            "athena://patients",
            "Patient Search",
            "Search for patients by name, DOB, or other identifiers",
        ),
        descriptor(
            "athena://patient/{id}",
            "Patient Details",
            "Get detailed information about a specific patient",
        ),
        descriptor("athena://patient/{id}/allergies", "Patient Allergies", "Get patient allergy information"),
        descriptor("athena://patient/{id}/problems", "Patient Problems", "Get patient problem list"),
        descriptor(
            "athena://patient/{id}/prescriptions",
            "Patient Prescriptions",
            "Get patient prescription history",
        ),
        descriptor("athena://patient/{id}/vitals", "Patient Vital Signs", "Get patient vital signs history"),
        descriptor("athena://patient/{id}/labs", "Patient Lab Results", "Get patient laboratory results"),
        descriptor(
            "athena://patient/{id}/alerts",
            "Clinical Alerts",
            "Get clinical decision support alerts for patient",
        ),
        descriptor("athena://providers", "Provider Directory", "List healthcare providers in the practice"),
        descriptor(
            "athena://provider/{id}",
            "Provider Details",
            "Get detailed information about a specific provider",
        ),
        descriptor("athena://departments", "Department Directory", "List departments in the practice"),
    ]
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceContents {
    pub uri: String,
    pub mime_type: &'static str,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadResourceResult {
    pub contents: Vec<ResourceContents>,
}

/// Resolve a resource URI against the upstream API
pub async fn read_resource(client: &AthenaClient, uri: &str) -> Result<ReadResourceResult, ResourceError> {
    let parsed: ResourceUri = uri.parse()?;
    let upstream = |source| ResourceError::Upstream { uri: uri.to_string(), source };

    let data = match &parsed {
        ResourceUri::Patients => json!({
            "message": "Use the search_patients tool to find patients",
            "example": "search_patients with firstname=\"John\" lastname=\"Doe\"",
        }),
        ResourceUri::Patient { id, view } => {
            client.audit().data_access("PATIENT_DATA", "READ");
            let clinical = client.clinical();
            let result = match view {
                PatientView::Details => client.patients().get_patient(id).await,
                PatientView::Allergies => clinical.get_patient_allergies(id).await.map(Into::into),
                PatientView::Problems => clinical.get_patient_problems(id).await.map(Into::into),
                PatientView::Prescriptions => clinical
                    .get_patient_prescriptions(id, &PrescriptionQuery::default())
                    .await
                    .map(Into::into),
                PatientView::Vitals => clinical.get_patient_vitals(id, &DateRange::default()).await.map(Into::into),
                PatientView::Labs => clinical.get_patient_labs(id, &LabQuery::default()).await.map(Into::into),
                PatientView::Alerts => {
                    clinical.get_clinical_alerts(id, &AlertQuery::default()).await.map(Into::into)
                }
            };
            result.map_err(upstream)?
        }
        ResourceUri::Providers => {
            client.scheduling().get_providers(&ProviderQuery::default()).await.map_err(upstream)?.into()
        }
        ResourceUri::Provider(id) => client.scheduling().get_provider(id).await.map_err(upstream)?,
        ResourceUri::Departments => client.scheduling().get_departments().await.map_err(upstream)?.into(),
    };

    let text = serde_json::to_string_pretty(&data).unwrap_or_else(|_| data.to_string());
    Ok(ReadResourceResult {
        contents: vec![ResourceContents { uri: uri.to_string(), mime_type: MIME_JSON, text }],
    })
}
