// libs/scheduling-cell/src/services/slots.rs
//
// Greedy, non-backtracking slot search. Candidate days are the next
// occurrences of the intake weekday (strictly future); within a day the scan
// walks the clinic window in fixed steps and takes the first room whose
// occupied intervals do not overlap the candidate window.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc, Weekday};
use std::collections::HashMap;
use tracing::{debug, info};

use crate::models::{Appointment, FoundSlot, Room, SchedulingError, SchedulingPolicy};
use crate::services::catalog::CatalogService;

#[derive(Debug, Clone)]
pub struct SlotQuery {
    pub reference: DateTime<Utc>,
    pub required_minutes: i32,
    pub preferred_room_id: Option<i64>,
}

pub struct SlotFinder {
    catalog: CatalogService,
    policy: SchedulingPolicy,
}

impl SlotFinder {
    pub fn new(catalog: CatalogService, policy: SchedulingPolicy) -> Self {
        Self { catalog, policy }
    }

    /// First conflict-free window of the required duration within the weekly
    /// horizon, or `None` once the horizon is exhausted.
    pub async fn find_first_available(
        &self,
        query: SlotQuery,
        auth_token: &str,
    ) -> Result<Option<FoundSlot>, SchedulingError> {
        if query.required_minutes <= 0 {
            return Err(SchedulingError::Validation(
                "Required duration must be positive".to_string(),
            ));
        }

        let rooms = self.catalog.list_rooms(auth_token).await?;
        if rooms.is_empty() {
            debug!("No rooms configured, search cannot succeed");
            return Ok(None);
        }
        let room_order = ordered_room_ids(&rooms, query.preferred_room_id);

        let mut day = next_intake_day(query.reference.date_naive(), self.policy.intake_weekday);

        for week in 0..self.policy.max_weeks_ahead {
            let appointments = self.catalog.appointments_for_day(day, auth_token).await?;
            let busy = busy_by_room(&appointments);

            if let Some(slot) =
                first_fit_in_day(day, &room_order, &busy, query.required_minutes, &self.policy)
            {
                info!(
                    "Found slot on {} at {} in room {} (week {} of horizon)",
                    day, slot.starts_at, slot.room_id, week
                );
                return Ok(Some(slot));
            }

            debug!("No room fits {} minutes on {}", query.required_minutes, day);
            day += Duration::days(7);
        }

        info!(
            "Horizon of {} weeks exhausted without a free window",
            self.policy.max_weeks_ahead
        );
        Ok(None)
    }
}

/// Next occurrence of `target` strictly after `after`: a reference already
/// on the target weekday skips to the following week.
pub(crate) fn next_intake_day(after: NaiveDate, target: Weekday) -> NaiveDate {
    let mut day = after + Duration::days(1);
    while day.weekday() != target {
        day += Duration::days(1);
    }
    day
}

/// Room ids in scan order: the preferred room first (when it exists), then
/// the rest ascending.
pub(crate) fn ordered_room_ids(rooms: &[Room], preferred: Option<i64>) -> Vec<i64> {
    let mut ids: Vec<i64> = rooms.iter().map(|r| r.id).collect();
    ids.sort_unstable();

    if let Some(pref) = preferred {
        if let Some(pos) = ids.iter().position(|id| *id == pref) {
            ids.remove(pos);
            ids.insert(0, pref);
        }
    }

    ids
}

/// Occupied intervals grouped per room, normalized to `[start, end)`.
/// Cancelled rows and rows without a room never block a slot.
pub(crate) fn busy_by_room(
    appointments: &[Appointment],
) -> HashMap<i64, Vec<(DateTime<Utc>, DateTime<Utc>)>> {
    let mut busy: HashMap<i64, Vec<(DateTime<Utc>, DateTime<Utc>)>> = HashMap::new();

    for apt in appointments {
        if apt.status == crate::models::AppointmentStatus::Cancelled {
            continue;
        }
        if let Some(room_id) = apt.room_id {
            busy.entry(room_id).or_default().push((apt.starts_at, apt.ends_at));
        }
    }

    busy
}

/// Walk one day in fixed steps; earliest feasible time wins, ties broken by
/// room scan order. Windows that would run past closing are skipped.
pub(crate) fn first_fit_in_day(
    day: NaiveDate,
    room_order: &[i64],
    busy: &HashMap<i64, Vec<(DateTime<Utc>, DateTime<Utc>)>>,
    required_minutes: i32,
    policy: &SchedulingPolicy,
) -> Option<FoundSlot> {
    let opens = day.and_time(policy.opens_at).and_utc();
    let closes = day.and_time(policy.closes_at).and_utc();
    let needed = Duration::minutes(required_minutes as i64);

    let mut start = opens;
    while start + needed <= closes {
        let end = start + needed;

        for &room_id in room_order {
            let taken = busy
                .get(&room_id)
                .map(|intervals| intervals.iter().any(|(s, e)| overlaps(*s, *e, start, end)))
                .unwrap_or(false);

            if !taken {
                return Some(FoundSlot {
                    starts_at: start,
                    ends_at: end,
                    duration_minutes: required_minutes,
                    room_id,
                });
            }
        }

        start += policy.step();
    }

    None
}

pub(crate) fn overlaps(
    a_start: DateTime<Utc>,
    a_end: DateTime<Utc>,
    b_start: DateTime<Utc>,
    b_end: DateTime<Utc>,
) -> bool {
    a_start < b_end && b_start < a_end
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AppointmentOrigin, AppointmentStatus};

    fn monday() -> NaiveDate {
        // 2026-03-02 is a Monday
        NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
    }

    fn at(day: NaiveDate, h: u32, m: u32) -> DateTime<Utc> {
        day.and_hms_opt(h, m, 0).unwrap().and_utc()
    }

    fn booked(day: NaiveDate, room: i64, from: (u32, u32), to: (u32, u32)) -> Appointment {
        Appointment {
            id: 1,
            patient_id: Some(99),
            department_id: 1,
            professional_id: None,
            room_id: Some(room),
            starts_at: at(day, from.0, from.1),
            ends_at: at(day, to.0, to.1),
            status: AppointmentStatus::Confirmed,
            origin: AppointmentOrigin::Manual,
            notes: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn next_intake_day_is_strictly_future() {
        // Reference on the target weekday skips a full week
        assert_eq!(
            next_intake_day(monday(), Weekday::Mon),
            NaiveDate::from_ymd_opt(2026, 3, 9).unwrap()
        );
        // Sunday rolls to the very next day
        assert_eq!(
            next_intake_day(NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(), Weekday::Mon),
            monday()
        );
        // Tuesday waits six days
        assert_eq!(
            next_intake_day(NaiveDate::from_ymd_opt(2026, 3, 3).unwrap(), Weekday::Mon),
            NaiveDate::from_ymd_opt(2026, 3, 9).unwrap()
        );
    }

    #[test]
    fn room_order_prefers_requested_then_ascending() {
        let rooms = vec![
            Room { id: 3, name: "C".into() },
            Room { id: 1, name: "A".into() },
            Room { id: 2, name: "B".into() },
        ];
        assert_eq!(ordered_room_ids(&rooms, None), vec![1, 2, 3]);
        assert_eq!(ordered_room_ids(&rooms, Some(2)), vec![2, 1, 3]);
        // Unknown preference is ignored
        assert_eq!(ordered_room_ids(&rooms, Some(9)), vec![1, 2, 3]);
    }

    #[test]
    fn empty_day_yields_opening_slot_in_lowest_room() {
        let policy = SchedulingPolicy::default();
        let slot = first_fit_in_day(monday(), &[1, 2], &HashMap::new(), 45, &policy).unwrap();

        assert_eq!(slot.starts_at, at(monday(), 9, 0));
        assert_eq!(slot.ends_at, at(monday(), 9, 45));
        assert_eq!(slot.room_id, 1);
    }

    #[test]
    fn busy_room_falls_through_to_next_room_same_time() {
        let policy = SchedulingPolicy::default();
        let busy = busy_by_room(&[booked(monday(), 1, (9, 0), (12, 0))]);
        let slot = first_fit_in_day(monday(), &[1, 2], &busy, 30, &policy).unwrap();

        // Earliest time wins over lowest room
        assert_eq!(slot.starts_at, at(monday(), 9, 0));
        assert_eq!(slot.room_id, 2);
    }

    #[test]
    fn window_never_crosses_closing_time() {
        let policy = SchedulingPolicy::default();
        // Both rooms blocked until 17:30
        let busy = busy_by_room(&[
            booked(monday(), 1, (9, 0), (17, 30)),
            booked(monday(), 2, (9, 0), (17, 30)),
        ]);

        // 45 minutes does not fit the 17:30-18:00 tail
        assert!(first_fit_in_day(monday(), &[1, 2], &busy, 45, &policy).is_none());

        // 30 minutes does
        let slot = first_fit_in_day(monday(), &[1, 2], &busy, 30, &policy).unwrap();
        assert_eq!(slot.starts_at, at(monday(), 17, 30));
        assert_eq!(slot.ends_at, at(monday(), 18, 0));
        assert_eq!(slot.room_id, 1);
    }

    #[test]
    fn partially_booked_day_scans_past_conflicts() {
        let policy = SchedulingPolicy::default();
        let busy = busy_by_room(&[
            booked(monday(), 1, (9, 0), (10, 30)),
            booked(monday(), 2, (9, 0), (10, 0)),
        ]);
        let slot = first_fit_in_day(monday(), &[1, 2], &busy, 60, &policy).unwrap();

        // 9:00 and 9:30 collide in both rooms; 10:00 is free in room 2 first
        assert_eq!(slot.starts_at, at(monday(), 10, 0));
        assert_eq!(slot.room_id, 2);
    }

    #[test]
    fn cancelled_and_roomless_rows_do_not_block() {
        let mut cancelled = booked(monday(), 1, (9, 0), (18, 0));
        cancelled.status = AppointmentStatus::Cancelled;
        let mut unassigned = booked(monday(), 1, (9, 0), (18, 0));
        unassigned.room_id = None;

        let busy = busy_by_room(&[cancelled, unassigned]);
        assert!(busy.is_empty());
    }

    #[test]
    fn overlap_is_half_open() {
        let d = monday();
        // Touching endpoints do not overlap
        assert!(!overlaps(at(d, 9, 0), at(d, 10, 0), at(d, 10, 0), at(d, 11, 0)));
        assert!(overlaps(at(d, 9, 0), at(d, 10, 1), at(d, 10, 0), at(d, 11, 0)));
        assert!(overlaps(at(d, 9, 0), at(d, 12, 0), at(d, 10, 0), at(d, 11, 0)));
        assert!(!overlaps(at(d, 9, 0), at(d, 10, 0), at(d, 11, 0), at(d, 12, 0)));
    }
}
