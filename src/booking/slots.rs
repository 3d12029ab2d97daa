use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use futures::future::try_join_all;

use crate::calendar::{date_range, normalize, subtract_intervals};
use crate::config::BookingConfig;
use crate::limits::*;
use crate::model::*;
use crate::policy::LifecyclePolicy;

use super::{AvailabilityRepository, BookingError};

/// Start times stepping by `step` through each free span where a booking of
/// `duration` still fits before the span ends.
pub fn step_starts(free: &[Span], duration: Duration, step: Duration) -> Vec<NaiveDateTime> {
    let mut starts = Vec::new();
    if step <= Duration::zero() {
        return starts;
    }
    for span in free {
        let mut t = span.start;
        while t + duration <= span.end {
            starts.push(t);
            t += step;
        }
    }
    starts
}

/// Computes bookable start times from schedules, breaks, holidays and bookings.
pub struct SlotGenerator<R> {
    repo: Arc<R>,
    granularity: Duration,
    default_duration: u32,
    policy: LifecyclePolicy,
}

impl<R: AvailabilityRepository> SlotGenerator<R> {
    pub fn new(repo: Arc<R>, config: BookingConfig) -> Result<Self, BookingError> {
        config.validate()?;
        Ok(Self {
            repo,
            granularity: Duration::minutes(i64::from(config.slot_granularity_minutes)),
            default_duration: config.default_service_duration_minutes,
            policy: config.policy,
        })
    }

    pub fn policy(&self) -> &LifecyclePolicy {
        &self.policy
    }

    /// Duration of `service_id` when performed by `staff_id`, in minutes.
    pub async fn resolve_duration(
        &self,
        service_id: ServiceId,
        staff_id: Option<StaffId>,
    ) -> Result<u32, BookingError> {
        let minutes = self
            .repo
            .service_duration(service_id, staff_id)
            .await?
            .unwrap_or(self.default_duration);
        if minutes == 0 || minutes > MAX_SERVICE_MINUTES {
            return Err(BookingError::InvalidService(service_id));
        }
        Ok(minutes)
    }

    /// Ordered bookable slots for one date. With `staff_id == None` every
    /// eligible staff member is considered and each slot lists who is free.
    pub async fn generate_slots(
        &self,
        service_id: ServiceId,
        staff_id: Option<StaffId>,
        date: NaiveDate,
        now: NaiveDateTime,
    ) -> Result<Vec<Slot>, BookingError> {
        let started = std::time::Instant::now();
        if self.repo.service(service_id).await?.is_none() {
            return Err(BookingError::InvalidService(service_id));
        }
        self.resolve_duration(service_id, staff_id).await?;
        let candidates = self.candidates(service_id, staff_id).await?;
        let slots = self.slots_for(service_id, &candidates, date, now).await?;
        metrics::histogram!(crate::observability::SLOT_QUERY_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());
        Ok(slots)
    }

    /// Slots for every date in `[from, to]`, skipping dates with none.
    pub async fn generate_slots_between(
        &self,
        service_id: ServiceId,
        staff_id: Option<StaffId>,
        from: NaiveDate,
        to: NaiveDate,
        now: NaiveDateTime,
    ) -> Result<Vec<(NaiveDate, Vec<Slot>)>, BookingError> {
        if (to - from).num_days() >= MAX_QUERY_DAYS {
            return Err(BookingError::LimitExceeded("query window too wide"));
        }
        if self.repo.service(service_id).await?.is_none() {
            return Err(BookingError::InvalidService(service_id));
        }
        self.resolve_duration(service_id, staff_id).await?;
        let candidates = self.candidates(service_id, staff_id).await?;
        let mut days = Vec::new();
        for date in date_range(from, to) {
            let slots = self.slots_for(service_id, &candidates, date, now).await?;
            if !slots.is_empty() {
                days.push((date, slots));
            }
        }
        Ok(days)
    }

    /// `{staff_id}` when given and eligible, else every eligible staff member.
    /// An unknown explicit staff id is an error; an inactive or unqualified
    /// one simply has no slots.
    async fn candidates(
        &self,
        service_id: ServiceId,
        staff_id: Option<StaffId>,
    ) -> Result<Vec<StaffId>, BookingError> {
        let mut eligible = self.repo.eligible_staff(service_id).await?;
        eligible.sort_unstable();
        eligible.dedup();
        match staff_id {
            Some(id) => {
                if self.repo.staff_member(id).await?.is_none() {
                    return Err(BookingError::InvalidStaff(id));
                }
                Ok(if eligible.contains(&id) { vec![id] } else { Vec::new() })
            }
            None => {
                if eligible.len() > MAX_CANDIDATE_STAFF {
                    return Err(BookingError::LimitExceeded("too many candidate staff"));
                }
                Ok(eligible)
            }
        }
    }

    async fn slots_for(
        &self,
        service_id: ServiceId,
        candidates: &[StaffId],
        date: NaiveDate,
        now: NaiveDateTime,
    ) -> Result<Vec<Slot>, BookingError> {
        if candidates.is_empty() || date < now.date() {
            return Ok(Vec::new());
        }
        if let Some(horizon) = self.policy.horizon(now)
            && date > horizon.date() {
                return Ok(Vec::new());
            }
        if self.repo.is_holiday(None, date).await? {
            return Ok(Vec::new());
        }

        let per_staff = try_join_all(
            candidates
                .iter()
                .map(|&staff| self.staff_starts(service_id, staff, date, now)),
        )
        .await?;

        // candidates are ascending, so each staff list comes out ascending too
        let mut merged: BTreeMap<NaiveDateTime, Vec<StaffId>> = BTreeMap::new();
        for (&staff, starts) in candidates.iter().zip(per_staff) {
            for start in starts {
                merged.entry(start).or_default().push(staff);
            }
        }
        Ok(merged
            .into_iter()
            .map(|(start, staff)| Slot { start, staff })
            .collect())
    }

    async fn staff_starts(
        &self,
        service_id: ServiceId,
        staff_id: StaffId,
        date: NaiveDate,
        now: NaiveDateTime,
    ) -> Result<Vec<NaiveDateTime>, BookingError> {
        if self.repo.is_holiday(Some(staff_id), date).await? {
            return Ok(Vec::new());
        }
        let entries = self.repo.weekly_schedule(staff_id, day_of_week(date)).await?;
        if entries.is_empty() {
            return Ok(Vec::new());
        }
        let duration = self.resolve_duration(service_id, Some(staff_id)).await?;

        let mut working = Vec::with_capacity(entries.len());
        for entry in &entries {
            let breaks: Vec<Span> = entry.breaks.iter().map(|b| b.on(date)).collect();
            working.extend(subtract_intervals(&[entry.hours.on(date)], &breaks));
        }
        let working = normalize(&working);

        let booked = self.repo.booked_intervals(Some(staff_id), date).await?;
        let free = subtract_intervals(&working, &booked);

        let mut starts = step_starts(&free, Duration::minutes(i64::from(duration)), self.granularity);
        starts.retain(|&t| self.policy.is_bookable(t, now));
        Ok(starts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::*;

    fn span(d: NaiveDate, h1: u32, m1: u32, h2: u32, m2: u32) -> Span {
        Span::new(at(d, h1, m1), at(d, h2, m2))
    }

    #[test]
    fn step_starts_count_matches_formula() {
        let d = date(2026, 3, 2);
        // (L, D, G) in minutes
        let cases = [(180, 30, 30), (180, 45, 15), (60, 60, 15), (50, 60, 15), (125, 30, 20), (0, 30, 15)];
        for (len, dur, gran) in cases {
            let start = at(d, 9, 0);
            let free = if len > 0 {
                vec![Span::new(start, start + Duration::minutes(len))]
            } else {
                Vec::new()
            };
            let got = step_starts(&free, Duration::minutes(dur), Duration::minutes(gran)).len() as i64;
            let expected = if len >= dur && len > 0 { (len - dur) / gran + 1 } else { 0 };
            assert_eq!(got, expected, "L={len} D={dur} G={gran}");
        }
    }

    #[test]
    fn step_starts_restart_at_each_interval() {
        let d = date(2026, 3, 2);
        let free = vec![span(d, 9, 0, 10, 0), span(d, 10, 30, 12, 0)];
        let starts = step_starts(&free, Duration::minutes(30), Duration::minutes(30));
        assert_eq!(
            starts,
            vec![at(d, 9, 0), at(d, 9, 30), at(d, 10, 30), at(d, 11, 0), at(d, 11, 30)]
        );
    }

    #[test]
    fn step_starts_granularity_finer_than_duration() {
        let d = date(2026, 3, 2);
        let starts = step_starts(&[span(d, 9, 0, 10, 0)], Duration::minutes(45), Duration::minutes(15));
        assert_eq!(starts, vec![at(d, 9, 0), at(d, 9, 15)]);
    }

    #[test]
    fn step_starts_zero_step_yields_nothing() {
        let d = date(2026, 3, 2);
        assert!(step_starts(&[span(d, 9, 0, 10, 0)], Duration::minutes(15), Duration::zero()).is_empty());
    }
}
