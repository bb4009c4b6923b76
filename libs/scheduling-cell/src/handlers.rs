// libs/scheduling-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, State},
    Json,
};
use axum_extra::TypedHeader;
use chrono::Utc;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{ScheduleProposalRequest, SchedulingError};
use crate::services::cancellation::CancellationService;
use crate::services::proposals::ProposalBuilder;

fn parse_patient_id(raw: &str) -> Result<i64, AppError> {
    raw.parse::<i64>()
        .map_err(|_| AppError::BadRequest(format!("Invalid patient id: {}", raw)))
}

fn require_staff(user: &User) -> Result<(), AppError> {
    if !user.is_staff() {
        return Err(AppError::Auth(
            "Not authorized to manage scheduling".to_string(),
        ));
    }
    Ok(())
}

fn map_scheduling_error(e: SchedulingError) -> AppError {
    match e {
        SchedulingError::NoAvailability { .. } => {
            AppError::NotFound(format!("{}; try a different week or room", e))
        }
        SchedulingError::Validation(msg) => AppError::ValidationError(msg),
        SchedulingError::DepartmentNotFound(id) => {
            AppError::NotFound(format!("Department {} not found", id))
        }
        SchedulingError::Database(msg) => AppError::Internal(msg),
    }
}

/// Generate appointment drafts for every pending department requirement of
/// a patient. Read-only; the operator confirms drafts through the regular
/// appointment write path.
#[axum::debug_handler]
pub async fn generate_proposals(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(patient_id): Path<String>,
    Json(request): Json<ScheduleProposalRequest>,
) -> Result<Json<Value>, AppError> {
    require_staff(&user)?;
    let patient_id = parse_patient_id(&patient_id)?;

    let builder = ProposalBuilder::new(&state);
    let response = builder
        .generate(patient_id, request, auth.token())
        .await
        .map_err(map_scheduling_error)?;

    Ok(Json(json!({
        "success": true,
        "scheduling": response,
    })))
}

/// Bulk-cancel the patient's future auto-scheduled appointments.
#[axum::debug_handler]
pub async fn cancel_auto_scheduled(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(patient_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    require_staff(&user)?;
    let patient_id = parse_patient_id(&patient_id)?;

    let service = CancellationService::new(&state);
    let cancelled = service
        .cancel_auto_scheduled(patient_id, Utc::now(), auth.token())
        .await
        .map_err(map_scheduling_error)?;

    Ok(Json(json!({
        "success": true,
        "count": cancelled.len(),
        "cancelled": cancelled,
    })))
}
