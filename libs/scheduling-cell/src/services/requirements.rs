// libs/scheduling-cell/src/services/requirements.rs
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use tracing::debug;

use crate::models::{
    DepartmentRequirement, ExcludedDepartment, ExclusionReason, PendingRequirement,
    SchedulingError, SchedulingPolicy,
};
use crate::services::catalog::CatalogService;

#[derive(Debug, Clone, Default)]
pub struct ResolvedRequirements {
    pub pending: Vec<PendingRequirement>,
    pub excluded: Vec<ExcludedDepartment>,
}

/// Computes the still-unmet service requirements of a patient: lifecycle
/// filtering, one-per-department dedup, and exclusion of departments that
/// already hold an active future appointment.
pub struct RequirementResolver {
    catalog: CatalogService,
    policy: SchedulingPolicy,
}

impl RequirementResolver {
    pub fn new(catalog: CatalogService, policy: SchedulingPolicy) -> Self {
        Self { catalog, policy }
    }

    pub async fn resolve(
        &self,
        patient_id: i64,
        now: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<ResolvedRequirements, SchedulingError> {
        if patient_id <= 0 {
            debug!("Invalid patient id {}, nothing to schedule", patient_id);
            return Ok(ResolvedRequirements::default());
        }

        let rows = self
            .catalog
            .requirements_for_patient(patient_id, auth_token)
            .await?;

        let active_departments: HashSet<i64> = self
            .catalog
            .active_future_appointments(patient_id, now, auth_token)
            .await?
            .iter()
            .filter(|apt| apt.status.is_active())
            .map(|apt| apt.department_id)
            .collect();

        let (kept, excluded) = split_requirements(rows, &active_departments);

        if kept.is_empty() {
            debug!("Patient {} has no schedulable requirements", patient_id);
            return Ok(ResolvedRequirements { pending: vec![], excluded });
        }

        let department_ids: Vec<i64> = kept.iter().map(|r| r.department_id).collect();
        let departments = self
            .catalog
            .departments_by_ids(&department_ids, auth_token)
            .await?;

        let mut pending = Vec::with_capacity(kept.len());
        for row in kept {
            let department = departments
                .iter()
                .find(|d| d.id == row.department_id)
                .ok_or(SchedulingError::DepartmentNotFound(row.department_id))?;

            let duration = row
                .duration_minutes
                .filter(|d| *d > 0)
                .or(department.default_duration_minutes)
                .unwrap_or(self.policy.default_duration_minutes);

            pending.push(PendingRequirement {
                requirement_id: row.id,
                department_id: row.department_id,
                department_name: department.name.clone(),
                duration_minutes: duration,
                assigned_professional_id: row.professional_id,
                responsible_professional_id: department.responsible_professional_id,
            });
        }

        debug!(
            "Patient {}: {} pending requirements, {} excluded departments",
            patient_id,
            pending.len(),
            excluded.len()
        );

        Ok(ResolvedRequirements { pending, excluded })
    }
}

/// Drop terminal-state rows, keep one requirement per department (first in
/// id order), and divert departments that already hold an active future
/// appointment into the exclusion list.
pub(crate) fn split_requirements(
    mut rows: Vec<DepartmentRequirement>,
    active_departments: &HashSet<i64>,
) -> (Vec<DepartmentRequirement>, Vec<ExcludedDepartment>) {
    rows.sort_by_key(|r| r.id);

    let mut seen: HashSet<i64> = HashSet::new();
    let mut kept = Vec::new();
    let mut excluded = Vec::new();

    for row in rows {
        if row.state().is_excluded() {
            continue;
        }
        if !seen.insert(row.department_id) {
            continue;
        }
        if active_departments.contains(&row.department_id) {
            excluded.push(ExcludedDepartment {
                department_id: row.department_id,
                reason: ExclusionReason::AlreadyScheduled,
            });
            continue;
        }
        kept.push(row);
    }

    (kept, excluded)
}
