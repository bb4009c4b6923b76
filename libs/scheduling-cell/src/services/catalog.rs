// libs/scheduling-cell/src/services/catalog.rs
//
// Read adapter over the Supabase catalog: rooms, appointments, department
// requirements and staff. The scheduling services consume snapshots returned
// from here; they never query the store themselves.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use reqwest::Method;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use shared_database::supabase::SupabaseClient;

use crate::models::{
    Appointment, AppointmentStatus, Department, DepartmentRequirement, Professional, Room,
    SchedulingError,
};

#[derive(Clone)]
pub struct CatalogService {
    supabase: Arc<SupabaseClient>,
}

#[derive(Debug, Deserialize)]
struct DepartmentMember {
    professional_id: i64,
}

impl CatalogService {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    pub async fn list_rooms(&self, auth_token: &str) -> Result<Vec<Room>, SchedulingError> {
        let rows = self.get("/rest/v1/rooms?order=id.asc", auth_token).await?;
        parse_rows(rows)
    }

    /// All non-cancelled appointments whose start falls within the given
    /// calendar day, in start order.
    pub async fn appointments_for_day(
        &self,
        day: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, SchedulingError> {
        let day_start = day.and_hms_opt(0, 0, 0).unwrap().and_utc();
        let day_end = day_start + chrono::Duration::days(1);

        // Z-suffixed timestamps; a "+00:00" offset would decode as a space
        // inside the query string.
        let path = format!(
            "/rest/v1/appointments?status=neq.{}&starts_at=gte.{}&starts_at=lt.{}&order=starts_at.asc",
            AppointmentStatus::Cancelled,
            day_start.to_rfc3339_opts(SecondsFormat::Secs, true),
            day_end.to_rfc3339_opts(SecondsFormat::Secs, true),
        );

        let rows = self.get(&path, auth_token).await?;
        parse_rows(rows)
    }

    /// Future appointments of a patient that are still in an active state.
    pub async fn active_future_appointments(
        &self,
        patient_id: i64,
        now: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, SchedulingError> {
        let path = format!(
            "/rest/v1/appointments?patient_id=eq.{}&status=in.({},{})&starts_at=gte.{}&order=starts_at.asc",
            patient_id,
            AppointmentStatus::Pending,
            AppointmentStatus::Confirmed,
            now.to_rfc3339_opts(SecondsFormat::Secs, true),
        );

        let rows = self.get(&path, auth_token).await?;
        parse_rows(rows)
    }

    pub async fn requirements_for_patient(
        &self,
        patient_id: i64,
        auth_token: &str,
    ) -> Result<Vec<DepartmentRequirement>, SchedulingError> {
        let path = format!(
            "/rest/v1/patient_requirements?patient_id=eq.{}&order=id.asc",
            patient_id
        );

        let rows = self.get(&path, auth_token).await?;
        parse_rows(rows)
    }

    pub async fn departments_by_ids(
        &self,
        ids: &[i64],
        auth_token: &str,
    ) -> Result<Vec<Department>, SchedulingError> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        let id_list = ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let path = format!("/rest/v1/departments?id=in.({})&order=id.asc", id_list);

        let rows = self.get(&path, auth_token).await?;
        parse_rows(rows)
    }

    /// Professionals belonging to a department, name-sorted.
    pub async fn department_members(
        &self,
        department_id: i64,
        auth_token: &str,
    ) -> Result<Vec<Professional>, SchedulingError> {
        let path = format!(
            "/rest/v1/department_members?department_id=eq.{}&order=professional_id.asc",
            department_id
        );
        let rows = self.get(&path, auth_token).await?;
        let members: Vec<DepartmentMember> = parse_rows(rows)?;

        if members.is_empty() {
            debug!("Department {} has no member professionals", department_id);
            return Ok(vec![]);
        }

        let id_list = members
            .iter()
            .map(|m| m.professional_id.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let path = format!(
            "/rest/v1/professionals?id=in.({})&order=full_name.asc,id.asc",
            id_list
        );

        let rows = self.get(&path, auth_token).await?;
        parse_rows(rows)
    }

    /// Lowest-id professional holding any department membership; the global
    /// fallback of the selection chain.
    pub async fn first_linked_professional(
        &self,
        auth_token: &str,
    ) -> Result<Option<i64>, SchedulingError> {
        let rows = self
            .get(
                "/rest/v1/department_members?order=professional_id.asc&limit=1",
                auth_token,
            )
            .await?;
        let members: Vec<DepartmentMember> = parse_rows(rows)?;
        Ok(members.first().map(|m| m.professional_id))
    }

    async fn get(&self, path: &str, auth_token: &str) -> Result<Vec<Value>, SchedulingError> {
        self.supabase
            .request(Method::GET, path, Some(auth_token), None)
            .await
            .map_err(|e| SchedulingError::Database(e.to_string()))
    }
}

fn parse_rows<T: serde::de::DeserializeOwned>(rows: Vec<Value>) -> Result<Vec<T>, SchedulingError> {
    rows.into_iter()
        .map(serde_json::from_value)
        .collect::<Result<Vec<T>, _>>()
        .map_err(|e| SchedulingError::Database(format!("Failed to parse rows: {}", e)))
}
