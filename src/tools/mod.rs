//! MCP tools implementation
//!
//! Tools provide the operations exposed through `tools/list` and
//! `tools/call`. Input schemas are generated from the argument structs, so
//! the declared required-field sets always match what deserialization
//! accepts.

pub mod handlers;
pub mod summary;

use std::fmt;
use std::str::FromStr;

use schemars::{JsonSchema, schema_for};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::client::AthenaClient;
use crate::client::clinical::{AcknowledgeAlertArgs, CreatePrescriptionArgs, DrugInteractionArgs};
use crate::client::encounter::{CreateEncounterArgs, GetEncounterArgs, PatientEncountersArgs, UpdateEncounterArgs};
use crate::client::patient::{CreatePatientArgs, SearchPatientsArgs};
use crate::client::scheduling::{AvailabilityArgs, CreateAppointmentArgs, ProviderQuery};

pub use summary::{ClinicalSummaryArgs, clinical_summary};

/// `list_departments` takes no arguments
#[derive(Debug, Clone, Default, PartialEq, Serialize, serde::Deserialize, JsonSchema)]
pub struct ListDepartmentsArgs {}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid arguments for {tool}: {message}")]
    InvalidArguments { tool: &'static str, message: String },
}

/// Tool definition as advertised by `tools/list`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolContent {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub text: String,
}

/// Result of a tool call, already shaped for the `tools/call` response
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolOutput {
    pub content: Vec<ToolContent>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

impl ToolOutput {
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Self {
        Self { content: vec![ToolContent { kind: "text", text: pretty(value) }], is_error: false }
    }

    pub fn failure(payload: &Value) -> Self {
        Self { is_error: true, ..Self::json(payload) }
    }

    /// Text of the first content block
    pub fn text(&self) -> &str {
        self.content.first().map(|c| c.text.as_str()).unwrap_or_default()
    }

    /// First content block parsed back into JSON
    pub fn payload(&self) -> Value {
        serde_json::from_str(self.text()).unwrap_or(Value::Null)
    }
}

fn pretty<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| format!("{{\"error\":\"{e}\"}}"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolName {
    SearchPatients,
    CheckDrugInteractions,
    CreatePrescription,
    CreateAppointment,
    AcknowledgeAlert,
    GetClinicalSummary,
    ListDepartments,
    ListProviders,
    CheckAppointmentAvailability,
    CreatePatient,
    GetPatientEncounters,
    GetEncounter,
    CreateEncounter,
    UpdateEncounter,
}

impl ToolName {
    pub const ALL: [ToolName; 14] = [
        ToolName::SearchPatients,
        ToolName::CheckDrugInteractions,
        ToolName::CreatePrescription,
        ToolName::CreateAppointment,
        ToolName::AcknowledgeAlert,
        ToolName::GetClinicalSummary,
        ToolName::ListDepartments,
        ToolName::ListProviders,
        ToolName::CheckAppointmentAvailability,
        ToolName::CreatePatient,
        ToolName::GetPatientEncounters,
        ToolName::GetEncounter,
        ToolName::CreateEncounter,
        ToolName::UpdateEncounter,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::SearchPatients => "search_patients",
            ToolName::CheckDrugInteractions => "check_drug_interactions",
            ToolName::CreatePrescription => "create_prescription",
            ToolName::CreateAppointment => "create_appointment",
            ToolName::AcknowledgeAlert => "acknowledge_alert",
            ToolName::GetClinicalSummary => "get_clinical_summary",
            ToolName::ListDepartments => "list_departments",
            ToolName::ListProviders => "list_providers",
            ToolName::CheckAppointmentAvailability => "check_appointment_availability",
            ToolName::CreatePatient => "create_patient",
            ToolName::GetPatientEncounters => "get_patient_encounters",
            ToolName::GetEncounter => "get_encounter",
            ToolName::CreateEncounter => "create_encounter",
            ToolName::UpdateEncounter => "update_encounter",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ToolName::SearchPatients => "Search for patients by name, DOB, phone, or email",
            ToolName::CheckDrugInteractions => "Check for drug interactions for a patient",
            ToolName::CreatePrescription => "Create a new prescription for a patient",
            ToolName::CreateAppointment => "Create a new appointment for a patient",
            ToolName::AcknowledgeAlert => "Acknowledge a clinical alert",
            ToolName::GetClinicalSummary => "Get a comprehensive clinical summary for a patient",
            ToolName::ListDepartments => "List all departments in the practice",
            ToolName::ListProviders => "List all healthcare providers in the practice",
            ToolName::CheckAppointmentAvailability => {
                "Check available appointment slots for a department and date range"
            }
            ToolName::CreatePatient => "Register a new patient in the system",
            ToolName::GetPatientEncounters => "Get all encounters for a patient",
            ToolName::GetEncounter => "Get details of a specific encounter",
            ToolName::CreateEncounter => "Create a new encounter for a patient",
            ToolName::UpdateEncounter => "Update an existing encounter",
        }
    }

    pub fn input_schema(&self) -> Value {
        let schema = match self {
            ToolName::SearchPatients => schema_for!(SearchPatientsArgs),
            ToolName::CheckDrugInteractions => schema_for!(DrugInteractionArgs),
            ToolName::CreatePrescription => schema_for!(CreatePrescriptionArgs),
            ToolName::CreateAppointment => schema_for!(CreateAppointmentArgs),
            ToolName::AcknowledgeAlert => schema_for!(AcknowledgeAlertArgs),
            ToolName::GetClinicalSummary => schema_for!(ClinicalSummaryArgs),
            ToolName::ListDepartments => schema_for!(ListDepartmentsArgs),
            ToolName::ListProviders => schema_for!(ProviderQuery),
            ToolName::CheckAppointmentAvailability => schema_for!(AvailabilityArgs),
            ToolName::CreatePatient => schema_for!(CreatePatientArgs),
            ToolName::GetPatientEncounters => schema_for!(PatientEncountersArgs),
            ToolName::GetEncounter => schema_for!(GetEncounterArgs),
            ToolName::CreateEncounter => schema_for!(CreateEncounterArgs),
            ToolName::UpdateEncounter => schema_for!(UpdateEncounterArgs),
        };
        schema.to_value()
    }

    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition { name: self.as_str(), description: self.description(), input_schema: self.input_schema() }
    }

    /// Deserialize the call arguments for this tool; a missing object counts as `{}`
    pub fn parse_args<T: DeserializeOwned>(&self, arguments: Value) -> Result<T, ToolError> {
        let arguments = if arguments.is_null() { Value::Object(Default::default()) } else { arguments };
        serde_json::from_value(arguments)
            .map_err(|e| ToolError::InvalidArguments { tool: self.as_str(), message: e.to_string() })
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolName {
    type Err = ToolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|tool| tool.as_str() == s)
            .ok_or_else(|| ToolError::UnknownTool(s.to_string()))
    }
}

/// Every tool definition, in catalogue order
pub fn tool_definitions() -> Vec<ToolDefinition> {
    ToolName::ALL.iter().map(ToolName::definition).collect()
}

/// Execute a tool call by name
///
/// Upstream failures come back as `Ok` with `is_error` set; only an unknown
/// tool or undeserializable arguments are `Err`.
pub async fn call_tool(client: &AthenaClient, name: &str, arguments: Value) -> Result<ToolOutput, ToolError> {
    let tool: ToolName = name.parse()?;
    handlers::dispatch(client, tool, arguments).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn required(tool: ToolName) -> Vec<String> {
        tool.input_schema()["required"]
            .as_array()
            .map(|fields| fields.iter().filter_map(|f| f.as_str().map(String::from)).collect())
            .unwrap_or_default()
    }

    #[test]
    fn test_names_round_trip() {
        for tool in ToolName::ALL {
            assert_eq!(tool.as_str().parse::<ToolName>().unwrap(), tool);
        }
        assert!(matches!("fhir_lookup".parse::<ToolName>(), Err(ToolError::UnknownTool(_))));
    }

    #[test]
    fn test_definitions_cover_catalogue() {
        let definitions = tool_definitions();
        assert_eq!(definitions.len(), 14);
        let serialized = serde_json::to_value(&definitions[0]).unwrap();
        assert_eq!(serialized["name"], "search_patients");
        assert!(serialized["inputSchema"].is_object());
    }

    #[test]
    fn test_required_fields_follow_arguments() {
        assert!(required(ToolName::SearchPatients).is_empty());
        assert!(required(ToolName::ListDepartments).is_empty());

        let mut rx = required(ToolName::CreatePrescription);
        rx.sort();
        assert_eq!(
            rx,
            vec![
                "days_supply",
                "dosage",
                "frequency",
                "medication_name",
                "patient_id",
                "quantity",
                "refills",
                "route"
            ]
        );
        assert_eq!(required(ToolName::GetClinicalSummary), vec!["patient_id"]);

        let mut patient = required(ToolName::CreatePatient);
        patient.sort();
        assert_eq!(patient, vec!["department_id", "dob", "firstname", "lastname", "sex"]);
    }

    #[test]
    fn test_parse_args_reports_tool() {
        let err = ToolName::GetEncounter.parse_args::<GetEncounterArgs>(json!({})).unwrap_err();
        match err {
            ToolError::InvalidArguments { tool, message } => {
                assert_eq!(tool, "get_encounter");
                assert!(message.contains("encounter_id"));
            }
            other => panic!("unexpected {other:?}"),
        }

        let args: ListDepartmentsArgs = ToolName::ListDepartments.parse_args(Value::Null).unwrap();
        assert_eq!(args, ListDepartmentsArgs {});
    }

    #[test]
    fn test_output_shape() {
        let ok = serde_json::to_value(ToolOutput::json(&json!({"a": 1}))).unwrap();
        assert_eq!(ok["content"][0]["type"], "text");
        assert!(ok.get("isError").is_none());

        let failed = ToolOutput::failure(&json!({"error": "x"}));
        assert_eq!(serde_json::to_value(&failed).unwrap()["isError"], true);
        assert_eq!(failed.payload()["error"], "x");
    }
}
