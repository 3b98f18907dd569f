//! MCP prompt templates
//!
//! Each template fetches chart data through the client and wraps it in
//! instructions for the downstream model.

use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::client::AthenaClient;
use crate::client::clinical::PrescriptionQuery;
use crate::tools::{ClinicalSummaryArgs, clinical_summary};

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("Unknown prompt: {0}")]
    UnknownPrompt(String),

    #[error("Invalid arguments for prompt {prompt}: {message}")]
    InvalidArguments { prompt: &'static str, message: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct PromptArgument {
    pub name: &'static str,
    pub description: &'static str,
    pub required: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PromptDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub arguments: Vec<PromptArgument>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromptContent {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromptMessage {
    pub role: &'static str,
    pub content: PromptContent,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromptResult {
    pub description: &'static str,
    pub messages: Vec<PromptMessage>,
}

impl PromptResult {
    fn user(description: &'static str, text: String) -> Self {
        Self { description, messages: vec![PromptMessage { role: "user", content: PromptContent { kind: "text", text } }] }
    }

    pub fn text(&self) -> &str {
        self.messages.first().map(|m| m.content.text.as_str()).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClinicalAssessmentArgs {
    pub patient_id: String,
    #[serde(default)]
    pub chief_complaint: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MedicationReviewArgs {
    pub patient_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CarePlanArgs {
    pub patient_id: String,
    #[serde(default)]
    pub diagnosis: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptName {
    ClinicalAssessment,
    MedicationReview,
    CarePlan,
}

impl PromptName {
    pub const ALL: [PromptName; 3] = [PromptName::ClinicalAssessment, PromptName::MedicationReview, PromptName::CarePlan];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClinicalAssessment => "clinical_assessment",
            Self::MedicationReview => "medication_review",
            Self::CarePlan => "care_plan",
        }
    }

    pub fn definition(&self) -> PromptDefinition {
        let patient_id = PromptArgument { name: "patient_id", description: "Patient ID", required: true };
        match self {
            Self::ClinicalAssessment => PromptDefinition {
                name: self.as_str(),
                description: "Generate a clinical assessment prompt for a patient",
                arguments: vec![
                    patient_id,
                    PromptArgument {
                        name: "chief_complaint",
                        description: "Chief complaint or reason for visit",
                        required: false,
                    },
                ],
            },
            Self::MedicationReview => PromptDefinition {
                name: self.as_str(),
                description: "Generate a medication review prompt",
                arguments: vec![patient_id],
            },
            Self::CarePlan => PromptDefinition {
                name: self.as_str(),
                description: "Generate a care plan prompt",
                arguments: vec![
                    patient_id,
                    PromptArgument { name: "diagnosis", description: "Primary diagnosis", required: false },
                ],
            },
        }
    }

    fn parse_args<T: DeserializeOwned>(&self, arguments: Value) -> Result<T, PromptError> {
        let arguments = if arguments.is_null() { Value::Object(Default::default()) } else { arguments };
        serde_json::from_value(arguments)
            .map_err(|e| PromptError::InvalidArguments { prompt: self.as_str(), message: e.to_string() })
    }
}

impl FromStr for PromptName {
    type Err = PromptError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| PromptError::UnknownPrompt(s.to_string()))
    }
}

pub fn prompt_definitions() -> Vec<PromptDefinition> {
    PromptName::ALL.iter().map(PromptName::definition).collect()
}

/// Render a prompt by name
pub async fn get_prompt(client: &AthenaClient, name: &str, arguments: Value) -> Result<PromptResult, PromptError> {
    let prompt: PromptName = name.parse()?;
    let result = match prompt {
        PromptName::ClinicalAssessment => {
            let args: ClinicalAssessmentArgs = prompt.parse_args(arguments)?;
            clinical_assessment(client, &args).await
        }
        PromptName::MedicationReview => {
            let args: MedicationReviewArgs = prompt.parse_args(arguments)?;
            medication_review(client, &args).await
        }
        PromptName::CarePlan => {
            let args: CarePlanArgs = prompt.parse_args(arguments)?;
            care_plan(client, &args).await
        }
    };
    Ok(result)
}

async fn summary_text(client: &AthenaClient, patient_id: &str) -> String {
    let summary = clinical_summary(client, &ClinicalSummaryArgs::full(patient_id)).await;
    serde_json::to_string_pretty(&summary).unwrap_or_else(|_| summary.to_string())
}

fn or_default<'a>(value: Option<&'a str>, fallback: &'a str) -> &'a str {
    value.filter(|v| !v.trim().is_empty()).unwrap_or(fallback)
}

async fn clinical_assessment(client: &AthenaClient, args: &ClinicalAssessmentArgs) -> PromptResult {
    let summary = summary_text(client, &args.patient_id).await;
    let complaint = or_default(args.chief_complaint.as_deref(), "Not provided");

    let text = format!(
        "# Clinical Assessment for Patient {id}

## Chief Complaint
{complaint}

## Patient Summary
{summary}

## Assessment Instructions
Based on the patient's clinical data above, please provide:
1. A comprehensive clinical assessment
2. Differential diagnoses to consider
3. Recommended next steps or additional tests
4. Any red flags or urgent concerns that require immediate attention

Please consider the patient's medical history, current medications, allergies, and recent vital signs \
and lab results in your assessment.",
        id = args.patient_id,
    );
    PromptResult::user("Clinical assessment", text)
}

fn field<'a>(record: &'a Value, key: &str) -> &'a str {
    record.get(key).and_then(Value::as_str).unwrap_or("Unknown")
}

fn listing(records: &[Value], empty: &str) -> String {
    if records.is_empty() {
        return empty.to_string();
    }
    serde_json::to_string_pretty(records).unwrap_or_else(|_| empty.to_string())
}

async fn medication_review(client: &AthenaClient, args: &MedicationReviewArgs) -> PromptResult {
    let id = args.patient_id.as_str();
    let patient = match client.patients().get_patient(id).await {
        Ok(patient) => patient,
        Err(err) => {
            let text = format!(
                "# Medication Review Error

Unable to generate medication review for patient {id}.

Error: {err}

Note: The athenahealth preview/sandbox environment has limited endpoint availability. Clinical data \
endpoints (prescriptions, allergies) may not be accessible."
            );
            return PromptResult::user("Medication review", text);
        }
    };

    let query = PrescriptionQuery::default();
    let (prescriptions, allergies) = tokio::join!(
        client.clinical().get_patient_prescriptions(id, &query),
        client.clinical().get_patient_allergies(id),
    );

    let mut warnings = Vec::new();
    let prescriptions = prescriptions.unwrap_or_else(|_| {
        warnings.push("Prescription data not available in preview/sandbox environment");
        Vec::new()
    });
    let allergies = allergies.unwrap_or_else(|_| {
        warnings.push("Allergy data not available in preview/sandbox environment");
        Vec::new()
    });

    let notes = if warnings.is_empty() {
        String::new()
    } else {
        let lines: Vec<String> = warnings.iter().map(|w| format!("- {w}")).collect();
        format!("\n## Note\n{}\n", lines.join("\n"))
    };

    let text = format!(
        "# Medication Review for {first} {last}

## Patient Information
- Patient ID: {id}
- Date of Birth: {dob}
- Sex: {sex}
{notes}
## Known Allergies
{allergies}

## Current Medications
{medications}

## Review Instructions
Please review the patient's current medications and provide:
1. Assessment of medication appropriateness
2. Identification of any potential drug interactions
3. Recommendations for medication optimization
4. Suggestions for deprescribing if appropriate
5. Monitoring requirements for current medications

Consider the patient's age, allergies, and any contraindications in your review.",
        first = field(&patient, "firstname"),
        last = field(&patient, "lastname"),
        dob = field(&patient, "dob"),
        sex = field(&patient, "sex"),
        allergies = listing(&allergies, "No allergy data available"),
        medications = listing(&prescriptions, "No prescription data available"),
    );
    PromptResult::user("Medication review", text)
}

async fn care_plan(client: &AthenaClient, args: &CarePlanArgs) -> PromptResult {
    let summary = summary_text(client, &args.patient_id).await;
    let diagnosis = or_default(args.diagnosis.as_deref(), "Not specified");

    let text = format!(
        "# Care Plan Development for Patient {id}

## Primary Diagnosis
{diagnosis}

## Patient Clinical Summary
{summary}

## Care Plan Instructions
Based on the patient's clinical data and diagnosis, please develop a comprehensive care plan including:
1. Treatment goals (short-term and long-term)
2. Medication management plan
3. Lifestyle modifications and patient education
4. Follow-up schedule and monitoring requirements
5. Referrals to specialists if needed
6. Patient safety considerations
7. Discharge planning if applicable

Please ensure the care plan is evidence-based and tailored to the patient's specific needs and circumstances.",
        id = args.patient_id,
    );
    PromptResult::user("Care plan", text)
}
