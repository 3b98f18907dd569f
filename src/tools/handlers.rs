//! Per-tool handlers

use serde::Serialize;
use serde_json::{Value, json};
use tracing::{info, warn};

use super::summary::{ClinicalSummaryArgs, clinical_summary};
use super::{ListDepartmentsArgs, ToolError, ToolName, ToolOutput};
use crate::audit::AuditOutcome;
use crate::client::AthenaClient;
use crate::client::clinical::{AcknowledgeAlertArgs, CreatePrescriptionArgs, DrugInteractionArgs};
use crate::client::encounter::{CreateEncounterArgs, GetEncounterArgs, PatientEncountersArgs, UpdateEncounterArgs};
use crate::client::patient::{CreatePatientArgs, SearchPatientsArgs};
use crate::client::scheduling::{AvailabilityArgs, CreateAppointmentArgs, ProviderQuery};
use crate::error::AthenaError;

pub(super) async fn dispatch(client: &AthenaClient, tool: ToolName, arguments: Value) -> Result<ToolOutput, ToolError> {
    info!(tool = tool.as_str(), "executing tool");

    let output = match tool {
        ToolName::SearchPatients => {
            let args: SearchPatientsArgs = tool.parse_args(arguments)?;
            let result = client.patients().search_patients(&args).await;
            if !matches!(result, Err(AthenaError::Validation(_))) {
                audited(client, "PATIENT_SEARCH", "PATIENT", &result);
            }
            respond(tool, result, "Patient search exception")
        }
        ToolName::CheckDrugInteractions => {
            let args: DrugInteractionArgs = tool.parse_args(arguments)?;
            let result = client.clinical().check_drug_interactions(&args.patient_id, &args.medications).await;
            if result.is_ok() {
                client.audit().data_access("DRUG_INTERACTIONS", "CHECK");
            }
            respond(tool, result, "Failed to check drug interactions")
        }
        ToolName::CreatePrescription => {
            let args: CreatePrescriptionArgs = tool.parse_args(arguments)?;
            let result = client.clinical().create_prescription(&args.patient_id, &args.prescription).await;
            audited(client, "PRESCRIPTION_CREATE", "PRESCRIPTION", &result);
            respond(tool, result, "Failed to create prescription")
        }
        ToolName::CreateAppointment => {
            let args: CreateAppointmentArgs = tool.parse_args(arguments)?;
            let result = client.scheduling().create_appointment(&args).await;
            audited(client, "APPOINTMENT_CREATE", "APPOINTMENT", &result);
            respond(tool, result, "Failed to create appointment")
        }
        ToolName::AcknowledgeAlert => {
            let args: AcknowledgeAlertArgs = tool.parse_args(arguments)?;
            let result = client
                .clinical()
                .acknowledge_alert(&args.alert_id, &args.acknowledged_by)
                .await
                .map(|_| json!({"success": true, "message": "Alert acknowledged"}));
            audited(client, "ALERT_ACKNOWLEDGE", "CLINICAL_ALERT", &result);
            respond(tool, result, "Failed to acknowledge alert")
        }
        ToolName::GetClinicalSummary => {
            let args: ClinicalSummaryArgs = tool.parse_args(arguments)?;
            let summary = clinical_summary(client, &args).await;
            client.audit().data_access("CLINICAL_SUMMARY", "READ");
            ToolOutput::json(&summary)
        }
        ToolName::ListDepartments => {
            let _: ListDepartmentsArgs = tool.parse_args(arguments)?;
            respond(tool, client.scheduling().get_departments().await, "Failed to list departments")
        }
        ToolName::ListProviders => {
            let query: ProviderQuery = tool.parse_args(arguments)?;
            respond(tool, client.scheduling().get_providers(&query).await, "Failed to list providers")
        }
        ToolName::CheckAppointmentAvailability => {
            let args: AvailabilityArgs = tool.parse_args(arguments)?;
            let result = client.scheduling().get_appointment_availability(&args).await;
            respond(tool, result, "Failed to check appointment availability")
        }
        ToolName::CreatePatient => {
            let args: CreatePatientArgs = tool.parse_args(arguments)?;
            let result = client.patients().create_patient(&args).await;
            audited(client, "PATIENT_CREATE", "PATIENT", &result);
            respond(tool, result, "Failed to create patient")
        }
        ToolName::GetPatientEncounters => {
            let args: PatientEncountersArgs = tool.parse_args(arguments)?;
            let result = client.encounters().get_patient_encounters(&args.patient_id, &args.query).await;
            audited(client, "ENCOUNTER_ACCESS", "ENCOUNTER", &result);
            respond(tool, result, "Failed to get patient encounters")
        }
        ToolName::GetEncounter => {
            let args: GetEncounterArgs = tool.parse_args(arguments)?;
            let result = client.encounters().get_encounter(&args.encounter_id).await;
            audited(client, "ENCOUNTER_ACCESS", "ENCOUNTER", &result);
            respond(tool, result, "Failed to get encounter")
        }
        ToolName::CreateEncounter => {
            let args: CreateEncounterArgs = tool.parse_args(arguments)?;
            let result = client.encounters().create_encounter(&args).await;
            audited(client, "ENCOUNTER_CREATE", "ENCOUNTER", &result);
            respond(tool, result, "Failed to create encounter")
        }
        ToolName::UpdateEncounter => {
            let args: UpdateEncounterArgs = tool.parse_args(arguments)?;
            let result = client.encounters().update_encounter(&args.encounter_id, &args.update).await;
            audited(client, "ENCOUNTER_UPDATE", "ENCOUNTER", &result);
            respond(tool, result, "Failed to update encounter")
        }
    };

    Ok(output)
}

fn audited<T>(client: &AthenaClient, event: &str, resource_type: &str, result: &Result<T, AthenaError>) {
    let outcome = if result.is_ok() { AuditOutcome::Success } else { AuditOutcome::Failure };
    client.audit().action(event, resource_type, outcome);
}

fn respond<T: Serialize>(tool: ToolName, result: Result<T, AthenaError>, context: &str) -> ToolOutput {
    match result {
        Ok(data) => ToolOutput::json(&data),
        Err(err) => {
            warn!(tool = tool.as_str(), status = ?err.status(), "tool call failed");
            ToolOutput::failure(&err.to_tool_payload(context))
        }
    }
}
