//! athenahealth API client
//!
//! One [`RequestExecutor`] owns the token lifecycle and HTTP pipeline. The
//! domain services borrow it through an `Arc`, and [`AthenaClient`] bundles
//! them behind trait objects for the front ends.

pub mod clinical;
pub mod encounter;
pub mod envelope;
pub mod executor;
pub mod fields;
pub mod patient;
pub mod scheduling;
pub mod token;

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::warn;

use crate::audit::AuditLogger;
use crate::config::{ApiTier, AthenaConfig};
use crate::error::AthenaError;

pub use clinical::{ClinicalApi, ClinicalService};
pub use encounter::{EncounterApi, EncounterService};
pub use envelope::{normalize_list, normalize_list_any, normalize_record};
pub use executor::RequestExecutor;
pub use fields::UpstreamFields;
pub use patient::{PatientApi, PatientService};
pub use scheduling::{SchedulingApi, SchedulingService};
pub use token::{TokenManager, TokenSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub status: HealthState,
    pub timestamp: String,
}

/// Facade over the four domain services
#[derive(Clone)]
pub struct AthenaClient {
    executor: Arc<RequestExecutor>,
    patients: Arc<dyn PatientApi>,
    clinical: Arc<dyn ClinicalApi>,
    scheduling: Arc<dyn SchedulingApi>,
    encounters: Arc<dyn EncounterApi>,
}

impl AthenaClient {
    pub fn new(config: &AthenaConfig, audit: Arc<AuditLogger>) -> Result<Self, AthenaError> {
        let executor = Arc::new(RequestExecutor::new(config, audit)?);
        Ok(Self {
            patients: Arc::new(PatientService::new(executor.clone())),
            clinical: Arc::new(ClinicalService::new(executor.clone())),
            scheduling: Arc::new(SchedulingService::new(executor.clone())),
            encounters: Arc::new(EncounterService::new(executor.clone())),
            executor,
        })
    }

    pub fn patients(&self) -> &dyn PatientApi {
        self.patients.as_ref()
    }

    pub fn clinical(&self) -> &dyn ClinicalApi {
        self.clinical.as_ref()
    }

    pub fn scheduling(&self) -> &dyn SchedulingApi {
        self.scheduling.as_ref()
    }

    pub fn encounters(&self) -> &dyn EncounterApi {
        self.encounters.as_ref()
    }

    pub fn executor(&self) -> &RequestExecutor {
        &self.executor
    }

    pub fn tier(&self) -> ApiTier {
        self.executor.tier()
    }

    pub fn audit(&self) -> &Arc<AuditLogger> {
        self.executor.audit()
    }

    /// `GET {practice}/ping`; never fails, only reports
    pub async fn health_check(&self) -> HealthStatus {
        let status = match self.executor.get(&["ping"], &UpstreamFields::new()).await {
            Ok(_) => HealthState::Healthy,
            Err(err) => {
                warn!("upstream health check failed: {err}");
                HealthState::Unhealthy
            }
        };
        HealthStatus { status, timestamp: Utc::now().to_rfc3339() }
    }
}
