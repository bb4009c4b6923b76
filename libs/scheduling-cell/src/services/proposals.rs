// libs/scheduling-cell/src/services/proposals.rs
//
// Combines the requirement resolver and the slot finder into appointment
// drafts: one shared window when several departments are pending, the
// requirement's own duration when only one is. Nothing here writes to the
// store; the operator confirms drafts and the write path re-validates
// non-overlap at commit time.

use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info};

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{
    AppointmentOrigin, AppointmentStatus, Professional, ProfessionalCandidate,
    ProposedAppointment, ScheduleProposalRequest, ScheduleProposalResponse, SchedulingError,
    SchedulingPolicy,
};
use crate::services::catalog::CatalogService;
use crate::services::requirements::RequirementResolver;
use crate::services::slots::{SlotFinder, SlotQuery};

pub struct ProposalBuilder {
    catalog: CatalogService,
    resolver: RequirementResolver,
    finder: SlotFinder,
    policy: SchedulingPolicy,
}

impl ProposalBuilder {
    pub fn new(config: &AppConfig) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));
        Self::with_policy(supabase, SchedulingPolicy::default())
    }

    pub fn with_policy(supabase: Arc<SupabaseClient>, policy: SchedulingPolicy) -> Self {
        let catalog = CatalogService::new(supabase);
        Self {
            resolver: RequirementResolver::new(catalog.clone(), policy.clone()),
            finder: SlotFinder::new(catalog.clone(), policy.clone()),
            catalog,
            policy,
        }
    }

    /// Propose one appointment per pending department requirement, or an
    /// empty result when nothing is pending. Fails with `NoAvailability`
    /// when the weekly horizon is exhausted; there is no partial scheduling.
    pub async fn generate(
        &self,
        patient_id: i64,
        request: ScheduleProposalRequest,
        auth_token: &str,
    ) -> Result<ScheduleProposalResponse, SchedulingError> {
        let base = request.base_start.unwrap_or_else(Utc::now);

        // Already-booked departments are judged against real now; `base` only
        // anchors the slot search. Judging against a future base would let an
        // appointment between now and base slip past the exclusion.
        let resolved = self
            .resolver
            .resolve(patient_id, Utc::now(), auth_token)
            .await?;
        if resolved.pending.is_empty() {
            info!("Patient {}: no pending requirements to schedule", patient_id);
            return Ok(ScheduleProposalResponse {
                slot: None,
                proposals: vec![],
                excluded: resolved.excluded,
            });
        }

        // Search with the longest pending duration so the window fits every
        // requirement, floored at the clinic default.
        let required_minutes = resolved
            .pending
            .iter()
            .map(|r| r.duration_minutes)
            .max()
            .unwrap_or(self.policy.default_duration_minutes)
            .max(self.policy.default_duration_minutes);

        let slot = self
            .finder
            .find_first_available(
                SlotQuery {
                    reference: base,
                    required_minutes,
                    preferred_room_id: request.preferred_room_id,
                },
                auth_token,
            )
            .await?
            .ok_or(SchedulingError::NoAvailability {
                weeks_searched: self.policy.max_weeks_ahead,
            })?;

        let global_fallback = self.catalog.first_linked_professional(auth_token).await?;
        let shared_window = resolved.pending.len() > 1;

        let mut proposals = Vec::with_capacity(resolved.pending.len());
        for requirement in &resolved.pending {
            let members = self
                .catalog
                .department_members(requirement.department_id, auth_token)
                .await?;
            let mut candidates =
                annotate_candidates(members, requirement.responsible_professional_id);

            let chosen = choose_professional(
                requirement.assigned_professional_id,
                requirement.responsible_professional_id,
                &candidates,
                global_fallback,
            );
            if let Some(id) = chosen {
                for candidate in candidates.iter_mut() {
                    candidate.selected = candidate.professional_id == id;
                }
            }

            let duration_minutes = if shared_window {
                required_minutes
            } else {
                requirement.duration_minutes
            };

            debug!(
                "Department {}: proposing {} minutes with professional {:?}",
                requirement.department_id, duration_minutes, chosen
            );

            proposals.push(ProposedAppointment {
                department_id: requirement.department_id,
                starts_at: slot.starts_at,
                ends_at: slot.starts_at + Duration::minutes(duration_minutes as i64),
                duration_minutes,
                room_id: slot.room_id,
                professional_id: chosen,
                status: AppointmentStatus::Pending,
                origin: AppointmentOrigin::AutoScheduled,
                notes: format!("Auto-scheduled intake: {}", requirement.department_name),
                candidates,
            });
        }

        info!(
            "Patient {}: {} proposals at {} in room {}",
            patient_id,
            proposals.len(),
            slot.starts_at,
            slot.room_id
        );

        Ok(ScheduleProposalResponse {
            slot: Some(slot),
            proposals,
            excluded: resolved.excluded,
        })
    }
}

pub(crate) fn annotate_candidates(
    members: Vec<Professional>,
    responsible_id: Option<i64>,
) -> Vec<ProfessionalCandidate> {
    members
        .into_iter()
        .map(|p| ProfessionalCandidate {
            is_responsible: responsible_id == Some(p.id),
            is_admin: p.is_admin(),
            professional_id: p.id,
            full_name: p.full_name,
            selected: false,
        })
        .collect()
}

/// Deterministic selection chain: explicit assignment, then the department's
/// responsible (whether or not they appear among the eligible candidates),
/// then an admin candidate, then the global lowest-id professional with any
/// department link, then the first name-sorted candidate.
pub(crate) fn choose_professional(
    assigned: Option<i64>,
    responsible: Option<i64>,
    candidates: &[ProfessionalCandidate],
    global_fallback: Option<i64>,
) -> Option<i64> {
    if let Some(id) = assigned {
        return Some(id);
    }
    if let Some(id) = responsible {
        return Some(id);
    }
    if let Some(admin) = candidates.iter().find(|c| c.is_admin) {
        return Some(admin.professional_id);
    }
    if global_fallback.is_some() {
        return global_fallback;
    }
    candidates.first().map(|c| c.professional_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prof(id: i64, name: &str, roles: &[&str]) -> Professional {
        Professional {
            id,
            full_name: name.to_string(),
            roles: roles.iter().map(|r| r.to_string()).collect(),
        }
    }

    #[test]
    fn explicit_assignment_wins() {
        let candidates = annotate_candidates(vec![prof(1, "Ana", &["admin"])], Some(1));
        assert_eq!(choose_professional(Some(42), Some(1), &candidates, Some(9)), Some(42));
    }

    #[test]
    fn responsible_wins_even_when_not_a_candidate() {
        let candidates = annotate_candidates(vec![prof(1, "Ana", &[])], Some(7));
        assert_eq!(choose_professional(None, Some(7), &candidates, Some(9)), Some(7));
    }

    #[test]
    fn admin_candidate_beats_global_fallback() {
        let candidates = annotate_candidates(
            vec![prof(2, "Ana", &["profesional"]), prof(3, "Beto", &["Administradora"])],
            None,
        );
        assert_eq!(choose_professional(None, None, &candidates, Some(9)), Some(3));
    }

    #[test]
    fn global_fallback_then_first_candidate() {
        let candidates = annotate_candidates(
            vec![prof(5, "Ana", &["profesional"]), prof(4, "Beto", &["profesional"])],
            None,
        );
        assert_eq!(choose_professional(None, None, &candidates, Some(9)), Some(9));
        // Candidates arrive name-sorted from the catalog; Ana is first
        assert_eq!(choose_professional(None, None, &candidates, None), Some(5));
    }

    #[test]
    fn no_candidates_no_fallbacks() {
        assert_eq!(choose_professional(None, None, &[], None), None);
    }

    #[test]
    fn annotation_flags() {
        let candidates = annotate_candidates(
            vec![prof(1, "Ana", &["Administrador"]), prof(2, "Beto", &["profesional"])],
            Some(2),
        );

        assert!(candidates[0].is_admin);
        assert!(!candidates[0].is_responsible);
        assert!(!candidates[1].is_admin);
        assert!(candidates[1].is_responsible);
        assert!(candidates.iter().all(|c| !c.selected));
    }
}
