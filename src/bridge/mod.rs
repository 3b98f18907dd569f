//! Plain HTTP bridge for workflow tools
//!
//! Every route answers `200 {"success": true, "data": ...}` or
//! `500 {"success": false, "error": "..."}`. Error kinds are not told
//! apart by status code, and that includes malformed request bodies.

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, Query, State, rejection::QueryRejection},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::client::AthenaClient;
use crate::client::clinical::{AlertQuery, DateRange, LabQuery, PrescriptionDetails, PrescriptionQuery};
use crate::client::encounter::{CreateEncounterArgs, EncounterQuery, EncounterUpdate};
use crate::client::patient::{CreatePatientArgs, SearchPatientsArgs};
use crate::client::scheduling::{AvailabilityArgs, CreateAppointmentArgs, PatientAppointmentQuery, ProviderQuery};
use crate::error::AthenaError;

pub const SERVICE_NAME: &str = "athenahealth-webhook-bridge";
pub const DEFAULT_PORT: u16 = 3000;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error(transparent)]
    Upstream(#[from] AthenaError),

    #[error("invalid request: {0}")]
    BadRequest(String),
}

impl IntoResponse for BridgeError {
    fn into_response(self) -> Response {
        warn!(status = ?self.upstream_status(), "bridge request failed");
        let body = json!({"success": false, "error": self.to_string()});
        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}

impl BridgeError {
    fn upstream_status(&self) -> Option<u16> {
        match self {
            Self::Upstream(err) => err.status(),
            Self::BadRequest(_) => None,
        }
    }
}

impl From<QueryRejection> for BridgeError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

type BridgeResult = Result<Json<Value>, BridgeError>;

fn ok(data: impl Into<Value>) -> BridgeResult {
    Ok(Json(json!({"success": true, "data": data.into()})))
}

fn is_form(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/x-www-form-urlencoded"))
}

/// Parse a JSON or url-encoded body; an empty body reads as `{}`
fn body<T: DeserializeOwned>(headers: &HeaderMap, bytes: &Bytes) -> Result<T, BridgeError> {
    let bad_request = |e: &dyn std::fmt::Display| BridgeError::BadRequest(e.to_string());
    if is_form(headers) {
        return serde_urlencoded::from_bytes(bytes).map_err(|e| bad_request(&e));
    }
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return serde_json::from_value(json!({})).map_err(|e| bad_request(&e));
    }
    serde_json::from_slice(bytes).map_err(|e| bad_request(&e))
}

#[derive(Debug, Deserialize)]
struct DrugInteractionBody {
    medications: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct AcknowledgeBody {
    #[serde(alias = "acknowledgedby")]
    acknowledged_by: String,
}

pub fn router(client: AthenaClient) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/", get(catalogue))
        .route("/departments", get(departments))
        .route("/departments/{department_id}", get(department))
        .route("/providers", get(providers))
        .route("/providers/{provider_id}", get(provider))
        .route("/patients", post(create_patient))
        .route("/patients/search", post(search_patients))
        .route("/patients/{patient_id}", get(patient))
        .route("/patients/{patient_id}/insurance", get(insurance))
        .route("/patients/{patient_id}/allergies", get(allergies))
        .route("/patients/{patient_id}/problems", get(problems))
        .route("/patients/{patient_id}/prescriptions", get(prescriptions).post(create_prescription))
        .route("/patients/{patient_id}/vitals", get(vitals))
        .route("/patients/{patient_id}/labs", get(labs))
        .route("/patients/{patient_id}/alerts", get(alerts))
        .route("/patients/{patient_id}/drug-interactions", post(drug_interactions))
        .route("/patients/{patient_id}/appointments", get(patient_appointments))
        .route("/patients/{patient_id}/encounters", get(patient_encounters))
        .route("/appointments", post(create_appointment))
        .route("/appointments/availability", post(availability))
        .route("/alerts/{alert_id}/acknowledge", post(acknowledge_alert))
        .route("/encounters", post(create_encounter))
        .route("/encounters/{encounter_id}", get(encounter).put(update_encounter))
        .layer(TraceLayer::new_for_http())
        .with_state(client)
}

async fn health() -> Json<Value> {
    Json(json!({"status": "ok", "service": SERVICE_NAME}))
}

async fn catalogue() -> Json<Value> {
    Json(json!({
        "service": "athenahealth Webhook Bridge",
        "version": crate::VERSION,
        "endpoints": {
            "administrative": [
                "GET /departments - List all departments",
                "GET /departments/:departmentId - Get a department",
                "GET /providers - List all providers",
                "GET /providers/:providerId - Get a provider",
                "POST /patients/search - Search for patients",
                "POST /patients - Create a new patient",
                "GET /patients/:patientId - Get patient demographics",
                "GET /patients/:patientId/insurance - Get patient insurance",
            ],
            "scheduling": [
                "POST /appointments/availability - Check appointment availability",
                "POST /appointments - Create an appointment",
                "GET /patients/:patientId/appointments - Get patient appointments",
            ],
            "clinical": [
                "GET /patients/:patientId/allergies - Get patient allergies",
                "GET /patients/:patientId/prescriptions - Get patient prescriptions",
                "GET /patients/:patientId/problems - Get patient problems",
                "GET /patients/:patientId/vitals - Get patient vitals",
                "GET /patients/:patientId/labs - Get patient lab results",
                "GET /patients/:patientId/alerts - Get clinical alerts",
                "POST /patients/:patientId/prescriptions - Create prescription",
                "POST /patients/:patientId/drug-interactions - Check drug interactions",
                "POST /alerts/:alertId/acknowledge - Acknowledge alert",
            ],
            "encounters": [
                "GET /patients/:patientId/encounters - Get patient encounters",
                "GET /encounters/:encounterId - Get specific encounter",
                "POST /encounters - Create new encounter",
                "PUT /encounters/:encounterId - Update encounter",
            ],
        },
    }))
}

async fn departments(State(client): State<AthenaClient>) -> BridgeResult {
    ok(client.scheduling().get_departments().await?)
}

async fn department(State(client): State<AthenaClient>, Path(id): Path<String>) -> BridgeResult {
    ok(client.scheduling().get_department(&id).await?)
}

async fn providers(
    State(client): State<AthenaClient>,
    query: Result<Query<ProviderQuery>, QueryRejection>,
) -> BridgeResult {
    let Query(query) = query?;
    ok(client.scheduling().get_providers(&query).await?)
}

async fn provider(State(client): State<AthenaClient>, Path(id): Path<String>) -> BridgeResult {
    ok(client.scheduling().get_provider(&id).await?)
}

async fn search_patients(State(client): State<AthenaClient>, headers: HeaderMap, bytes: Bytes) -> BridgeResult {
    let args: SearchPatientsArgs = body(&headers, &bytes)?;
    ok(client.patients().search_patients(&args).await?)
}

async fn create_patient(State(client): State<AthenaClient>, headers: HeaderMap, bytes: Bytes) -> BridgeResult {
    let args: CreatePatientArgs = body(&headers, &bytes)?;
    ok(client.patients().create_patient(&args).await?)
}

async fn patient(State(client): State<AthenaClient>, Path(id): Path<String>) -> BridgeResult {
    ok(client.patients().get_patient(&id).await?)
}

async fn insurance(State(client): State<AthenaClient>, Path(id): Path<String>) -> BridgeResult {
    ok(client.patients().get_patient_insurance(&id).await?)
}

async fn availability(State(client): State<AthenaClient>, headers: HeaderMap, bytes: Bytes) -> BridgeResult {
    let args: AvailabilityArgs = body(&headers, &bytes)?;
    ok(client.scheduling().get_appointment_availability(&args).await?)
}

async fn create_appointment(State(client): State<AthenaClient>, headers: HeaderMap, bytes: Bytes) -> BridgeResult {
    let args: CreateAppointmentArgs = body(&headers, &bytes)?;
    ok(client.scheduling().create_appointment(&args).await?)
}

async fn patient_appointments(
    State(client): State<AthenaClient>,
    Path(id): Path<String>,
    query: Result<Query<PatientAppointmentQuery>, QueryRejection>,
) -> BridgeResult {
    let Query(query) = query?;
    ok(client.scheduling().get_patient_appointments(&id, &query).await?)
}

async fn allergies(State(client): State<AthenaClient>, Path(id): Path<String>) -> BridgeResult {
    ok(client.clinical().get_patient_allergies(&id).await?)
}

async fn problems(State(client): State<AthenaClient>, Path(id): Path<String>) -> BridgeResult {
    ok(client.clinical().get_patient_problems(&id).await?)
}

async fn prescriptions(
    State(client): State<AthenaClient>,
    Path(id): Path<String>,
    query: Result<Query<PrescriptionQuery>, QueryRejection>,
) -> BridgeResult {
    let Query(query) = query?;
    ok(client.clinical().get_patient_prescriptions(&id, &query).await?)
}

async fn create_prescription(
    State(client): State<AthenaClient>,
    Path(id): Path<String>,
    headers: HeaderMap,
    bytes: Bytes,
) -> BridgeResult {
    let details: PrescriptionDetails = body(&headers, &bytes)?;
    ok(client.clinical().create_prescription(&id, &details).await?)
}

async fn vitals(
    State(client): State<AthenaClient>,
    Path(id): Path<String>,
    query: Result<Query<DateRange>, QueryRejection>,
) -> BridgeResult {
    let Query(range) = query?;
    ok(client.clinical().get_patient_vitals(&id, &range).await?)
}

async fn labs(
    State(client): State<AthenaClient>,
    Path(id): Path<String>,
    query: Result<Query<LabQuery>, QueryRejection>,
) -> BridgeResult {
    let Query(query) = query?;
    ok(client.clinical().get_patient_labs(&id, &query).await?)
}

async fn alerts(
    State(client): State<AthenaClient>,
    Path(id): Path<String>,
    query: Result<Query<AlertQuery>, QueryRejection>,
) -> BridgeResult {
    let Query(query) = query?;
    ok(client.clinical().get_clinical_alerts(&id, &query).await?)
}

async fn drug_interactions(
    State(client): State<AthenaClient>,
    Path(id): Path<String>,
    headers: HeaderMap,
    bytes: Bytes,
) -> BridgeResult {
    let request: DrugInteractionBody = body(&headers, &bytes)?;
    ok(client.clinical().check_drug_interactions(&id, &request.medications).await?)
}

async fn acknowledge_alert(
    State(client): State<AthenaClient>,
    Path(id): Path<String>,
    headers: HeaderMap,
    bytes: Bytes,
) -> BridgeResult {
    let request: AcknowledgeBody = body(&headers, &bytes)?;
    ok(client.clinical().acknowledge_alert(&id, &request.acknowledged_by).await?)
}

async fn patient_encounters(
    State(client): State<AthenaClient>,
    Path(id): Path<String>,
    query: Result<Query<EncounterQuery>, QueryRejection>,
) -> BridgeResult {
    let Query(query) = query?;
    ok(client.encounters().get_patient_encounters(&id, &query).await?)
}

async fn encounter(State(client): State<AthenaClient>, Path(id): Path<String>) -> BridgeResult {
    ok(client.encounters().get_encounter(&id).await?)
}

async fn create_encounter(State(client): State<AthenaClient>, headers: HeaderMap, bytes: Bytes) -> BridgeResult {
    let args: CreateEncounterArgs = body(&headers, &bytes)?;
    ok(client.encounters().create_encounter(&args).await?)
}

async fn update_encounter(
    State(client): State<AthenaClient>,
    Path(id): Path<String>,
    headers: HeaderMap,
    bytes: Bytes,
) -> BridgeResult {
    let update: EncounterUpdate = body(&headers, &bytes)?;
    ok(client.encounters().update_encounter(&id, &update).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditLogger;
    use crate::client::test_support::{config_for, mount_token};
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use std::sync::Arc;
    use tower::ServiceExt;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn app(upstream: &MockServer) -> Router {
        mount_token(upstream, 3600).await;
        let client = AthenaClient::new(&config_for(&upstream.uri()), Arc::new(AuditLogger::disabled())).unwrap();
        router(client)
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::post(uri).header("content-type", "application/json").body(Body::from(body.to_string())).unwrap()
    }

    #[tokio::test]
    async fn test_health_and_catalogue() {
        let upstream = MockServer::start().await;
        let app = app(&upstream).await;

        let (status, body) = send(app.clone(), Request::get("/health").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "ok", "service": SERVICE_NAME}));

        let (_, body) = send(app, Request::get("/").body(Body::empty()).unwrap()).await;
        assert!(body["endpoints"]["clinical"].as_array().unwrap().len() >= 9);
    }

    #[tokio::test]
    async fn test_vitals_forward_date_range() {
        let upstream = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/195900/patients/7/vitals"))
            .and(query_param("startdate", "2024-01-01"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"vitals": [{"bp": "120/80"}]})))
            .expect(1)
            .mount(&upstream)
            .await;

        let request = Request::get("/patients/7/vitals?startdate=2024-01-01").body(Body::empty()).unwrap();
        let (status, body) = send(app(&upstream).await, request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"success": true, "data": [{"bp": "120/80"}]}));
    }

    #[tokio::test]
    async fn test_upstream_failure_is_500() {
        let upstream = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/195900/departments"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({"message": "Forbidden practice"})))
            .mount(&upstream)
            .await;

        let (status, body) =
            send(app(&upstream).await, Request::get("/departments").body(Body::empty()).unwrap()).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({"success": false, "error": "Forbidden practice"}));
    }

    #[tokio::test]
    async fn test_malformed_body_is_500() {
        let upstream = MockServer::start().await;
        let app = app(&upstream).await;

        let (status, body) = send(app.clone(), post_json("/patients", "{\"firstname\": ")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["success"], false);

        let (status, _) = send(app, post_json("/patients/7/drug-interactions", "{}")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(upstream.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_guard_applies_on_bridge() {
        let upstream = MockServer::start().await;

        let (status, body) = send(app(&upstream).await, post_json("/patients/search", "{\"limit\": 3}")).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Please provide at least one of: firstname, lastname, dob, departmentid, phone, or email");
        assert!(upstream.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_acknowledge_accepts_upstream_spelling() {
        let upstream = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/195900/clinicalalerts/5/acknowledge"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": "true"})))
            .expect(1)
            .mount(&upstream)
            .await;

        let (status, body) =
            send(app(&upstream).await, post_json("/alerts/5/acknowledge", "{\"acknowledgedby\": \"rn\"}")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["success"], "true");
    }

    #[tokio::test]
    async fn test_form_encoded_search() {
        let upstream = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/195900/patients"))
            .and(query_param("lastname", "Doe"))
            .and(query_param("departmentid", "1"))
            .and(query_param("limit", "5"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"patients": [{"patientid": "9"}]})))
            .expect(1)
            .mount(&upstream)
            .await;

        let request = Request::post("/patients/search")
            .header("content-type", "application/x-www-form-urlencoded; charset=utf-8")
            .body(Body::from("lastname=Doe&departmentid=1&limit=5"))
            .unwrap();
        let (status, body) = send(app(&upstream).await, request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"success": true, "data": [{"patientid": "9"}]}));
    }

    #[tokio::test]
    async fn test_malformed_form_is_500() {
        let upstream = MockServer::start().await;

        let request = Request::post("/patients/search")
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from("lastname=Doe&limit=many"))
            .unwrap();
        let (status, body) = send(app(&upstream).await, request).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["success"], false);
        assert!(upstream.received_requests().await.unwrap().is_empty());
    }
}
