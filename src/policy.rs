use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::booking::BookingError;
use crate::limits::{MAX_LEAD_DAYS, MAX_POLICY_MINUTES};

/// Business timing rules consulted by slot generation and the booking coordinator.
///
/// Non-positive values disable the corresponding rule: no minimum lead time,
/// no booking horizon, self-service cancellation always allowed, holds never
/// expire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecyclePolicy {
    pub min_lead_minutes: i64,
    pub max_lead_days: i64,
    pub cancellation_cutoff_minutes: i64,
    pub incomplete_hold_minutes: i64,
}

impl Default for LifecyclePolicy {
    fn default() -> Self {
        Self {
            min_lead_minutes: 0,
            max_lead_days: 365,
            cancellation_cutoff_minutes: 0,
            incomplete_hold_minutes: 30,
        }
    }
}

/// `t + minutes`, or `None` when the result leaves chrono's range.
fn plus_minutes(t: NaiveDateTime, minutes: i64) -> Option<NaiveDateTime> {
    Duration::try_minutes(minutes).and_then(|d| t.checked_add_signed(d))
}

impl LifecyclePolicy {
    /// Reject values too large to apply to a calendar instant.
    pub fn validate(&self) -> Result<(), BookingError> {
        if self.min_lead_minutes > MAX_POLICY_MINUTES {
            return Err(BookingError::InvalidConfig("min lead time too large"));
        }
        if self.max_lead_days > MAX_LEAD_DAYS {
            return Err(BookingError::InvalidConfig("booking horizon too large"));
        }
        if self.cancellation_cutoff_minutes > MAX_POLICY_MINUTES {
            return Err(BookingError::InvalidConfig("cancellation cutoff too large"));
        }
        if self.incomplete_hold_minutes > MAX_POLICY_MINUTES {
            return Err(BookingError::InvalidConfig("incomplete hold interval too large"));
        }
        Ok(())
    }

    pub fn is_bookable(&self, start: NaiveDateTime, now: NaiveDateTime) -> bool {
        match plus_minutes(now, self.min_lead_minutes.max(0)) {
            Some(earliest) if start >= earliest => {}
            _ => return false,
        }
        self.horizon(now).is_none_or(|horizon| start <= horizon)
    }

    pub fn is_cancellable(&self, start: NaiveDateTime, now: NaiveDateTime) -> bool {
        if self.cancellation_cutoff_minutes <= 0 {
            return true;
        }
        // a deadline before the representable range has always passed
        plus_minutes(start, -self.cancellation_cutoff_minutes).is_some_and(|deadline| now <= deadline)
    }

    pub fn is_expired_hold(&self, created_at: NaiveDateTime, now: NaiveDateTime) -> bool {
        self.hold_expires_at(created_at).is_some_and(|until| now >= until)
    }

    /// When a hold created at `created_at` becomes eligible for sweeping.
    /// `None` when holds never expire.
    pub fn hold_expires_at(&self, created_at: NaiveDateTime) -> Option<NaiveDateTime> {
        if self.incomplete_hold_minutes <= 0 {
            return None;
        }
        plus_minutes(created_at, self.incomplete_hold_minutes)
    }

    /// Latest instant a booking window starting at `now` can reach, if bounded.
    pub fn horizon(&self, now: NaiveDateTime) -> Option<NaiveDateTime> {
        if self.max_lead_days <= 0 {
            return None;
        }
        Duration::try_days(self.max_lead_days).and_then(|d| now.checked_add_signed(d))
    }
}
