// libs/scheduling-cell/src/services/cancellation.rs
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Method;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{Appointment, AppointmentOrigin, AppointmentStatus, SchedulingError};

/// The only write the scheduling cell owns: bulk-cancelling its own
/// auto-scheduled, still-future appointments for a patient.
pub struct CancellationService {
    supabase: Arc<SupabaseClient>,
}

impl CancellationService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
        }
    }

    pub fn with_client(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    /// Flip every future auto-scheduled appointment of the patient to
    /// cancelled and detach the patient. Already-cancelled rows are filtered
    /// out of the match, so repeating the call is a true no-op. Returns the
    /// mutated rows; an empty list is success.
    pub async fn cancel_auto_scheduled(
        &self,
        patient_id: i64,
        now: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, SchedulingError> {
        if patient_id <= 0 {
            debug!("Invalid patient id {}, nothing to cancel", patient_id);
            return Ok(vec![]);
        }

        let path = format!(
            "/rest/v1/appointments?patient_id=eq.{}&origin=eq.{}&status=neq.{}&starts_at=gte.{}",
            patient_id,
            AppointmentOrigin::AutoScheduled,
            AppointmentStatus::Cancelled,
            now.to_rfc3339_opts(SecondsFormat::Secs, true),
        );

        let body = json!({
            "status": AppointmentStatus::Cancelled,
            "patient_id": Value::Null,
            "updated_at": now.to_rfc3339_opts(SecondsFormat::Secs, true),
        });

        let mut headers = HeaderMap::new();
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));

        let rows: Vec<Value> = self
            .supabase
            .request_with_headers(Method::PATCH, &path, Some(auth_token), Some(body), Some(headers))
            .await
            .map_err(|e| SchedulingError::Database(e.to_string()))?;

        let cancelled: Vec<Appointment> = rows
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Appointment>, _>>()
            .map_err(|e| SchedulingError::Database(format!("Failed to parse rows: {}", e)))?;

        info!(
            "Cancelled {} auto-scheduled appointments for patient {}",
            cancelled.len(),
            patient_id
        );

        Ok(cancelled)
    }
}
