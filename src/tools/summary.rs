//! Clinical summary aggregation
//!
//! The patient record and up to six chart categories are fetched
//! concurrently. A failed category never aborts the aggregate: it is
//! reported as an empty list plus a warning naming the category.

use std::future::Future;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::client::AthenaClient;
use crate::client::clinical::{AlertQuery, DateRange, LabQuery, PrescriptionQuery};
use crate::config::ApiTier;
use crate::error::AthenaError;

pub const PREVIEW_NOTE: &str =
    "Preview/Sandbox environment: Clinical endpoints unavailable. Only patient demographics accessible.";

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ClinicalSummaryArgs {
    /// Patient ID
    #[serde(alias = "patientid")]
    pub patient_id: String,
    /// Include allergies
    #[serde(default = "default_true")]
    pub include_allergies: bool,
    /// Include problems
    #[serde(default = "default_true")]
    pub include_problems: bool,
    /// Include prescriptions
    #[serde(default = "default_true")]
    pub include_prescriptions: bool,
    /// Include vitals
    #[serde(default = "default_true")]
    pub include_vitals: bool,
    /// Include lab results
    #[serde(default = "default_true")]
    pub include_labs: bool,
    /// Include clinical alerts
    #[serde(default = "default_true")]
    pub include_alerts: bool,
}

impl ClinicalSummaryArgs {
    /// Every category included
    pub fn full(patient_id: impl Into<String>) -> Self {
        Self {
            patient_id: patient_id.into(),
            include_allergies: true,
            include_problems: true,
            include_prescriptions: true,
            include_vitals: true,
            include_labs: true,
            include_alerts: true,
        }
    }
}

/// Summary categories in output order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Allergies,
    Problems,
    Prescriptions,
    Vitals,
    Labs,
    Alerts,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Allergies,
        Category::Problems,
        Category::Prescriptions,
        Category::Vitals,
        Category::Labs,
        Category::Alerts,
    ];

    /// Key in the summary object
    pub fn key(&self) -> &'static str {
        match self {
            Category::Allergies => "allergies",
            Category::Problems => "problems",
            Category::Prescriptions => "prescriptions",
            Category::Vitals => "vitals",
            Category::Labs => "labs",
            Category::Alerts => "alerts",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Category::Allergies => "Allergies",
            Category::Problems => "Problems",
            Category::Prescriptions => "Prescriptions",
            Category::Vitals => "Vitals",
            Category::Labs => "Labs",
            Category::Alerts => "Alerts",
        }
    }

    fn warning(&self, err: &AthenaError) -> String {
        match err {
            AthenaError::UnavailableEndpoint { .. } => {
                format!("{} endpoint not available in preview/sandbox", self.label())
            }
            other => format!("{} could not be retrieved: {other}", self.label()),
        }
    }
}

async fn optional<F>(include: bool, fetch: F) -> Option<Result<Vec<Value>, AthenaError>>
where
    F: Future<Output = Result<Vec<Value>, AthenaError>>,
{
    if include { Some(fetch.await) } else { None }
}

/// Build the aggregate summary object; never fails
pub async fn clinical_summary(client: &AthenaClient, args: &ClinicalSummaryArgs) -> Value {
    let id = args.patient_id.as_str();
    let clinical = client.clinical();
    let prescriptions = PrescriptionQuery::default();
    let vitals = DateRange::default();
    let labs = LabQuery::default();
    let alerts = AlertQuery::default();

    let (patient, allergies, problems, rx, vitals, labs, alerts) = tokio::join!(
        client.patients().get_patient(id),
        optional(args.include_allergies, clinical.get_patient_allergies(id)),
        optional(args.include_problems, clinical.get_patient_problems(id)),
        optional(args.include_prescriptions, clinical.get_patient_prescriptions(id, &prescriptions)),
        optional(args.include_vitals, clinical.get_patient_vitals(id, &vitals)),
        optional(args.include_labs, clinical.get_patient_labs(id, &labs)),
        optional(args.include_alerts, clinical.get_clinical_alerts(id, &alerts)),
    );

    let mut summary = Map::new();
    let mut errors = Map::new();
    let mut warnings = Vec::new();

    match patient {
        Ok(record) => {
            summary.insert("patient".to_string(), record);
        }
        Err(err) => {
            errors.insert("patient".to_string(), Value::String(err.to_string()));
        }
    }

    let fetched = [allergies, problems, rx, vitals, labs, alerts];
    for (category, outcome) in Category::ALL.into_iter().zip(fetched) {
        let Some(outcome) = outcome else { continue };
        let records = match outcome {
            Ok(records) => records,
            Err(err) => {
                debug!(category = category.key(), status = ?err.status(), "summary category unavailable");
                warnings.push(category.warning(&err));
                Vec::new()
            }
        };
        summary.insert(category.key().to_string(), Value::Array(records));
    }

    if !warnings.is_empty() {
        if client.tier() == ApiTier::Preview {
            summary.insert("_note".to_string(), json!(PREVIEW_NOTE));
        }
        summary.insert("_warnings".to_string(), json!(warnings));
    }
    if !errors.is_empty() {
        summary.insert("_errors".to_string(), Value::Object(errors));
    }

    Value::Object(summary)
}
