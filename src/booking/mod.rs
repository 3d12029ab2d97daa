mod coordinator;
mod error;
mod slots;

pub use coordinator::{cancellation_path, BookingCoordinator};
pub use error::BookingError;
pub use slots::SlotGenerator;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::model::*;

/// Read-only view of schedules, holidays, services and existing bookings.
#[async_trait]
pub trait AvailabilityRepository: Send + Sync {
    async fn service(&self, service_id: ServiceId) -> Result<Option<Service>, BookingError>;

    async fn staff_member(&self, staff_id: StaffId) -> Result<Option<StaffMember>, BookingError>;

    /// Active staff qualified for the service, ascending by id.
    async fn eligible_staff(&self, service_id: ServiceId) -> Result<Vec<StaffId>, BookingError>;

    /// Schedule entries (with breaks) for one weekday, 0 = Sunday.
    async fn weekly_schedule(
        &self,
        staff_id: StaffId,
        day_of_week: u8,
    ) -> Result<Vec<ScheduleEntry>, BookingError>;

    /// True when a holiday blocks the whole date. `None` asks about
    /// holidays that apply to everyone.
    async fn is_holiday(&self, staff_id: Option<StaffId>, date: NaiveDate) -> Result<bool, BookingError>;

    /// Staff override if any, else the service's own duration. `None` when
    /// neither is configured.
    async fn service_duration(
        &self,
        service_id: ServiceId,
        staff_id: Option<StaffId>,
    ) -> Result<Option<u32>, BookingError>;

    /// Spans of non-cancelled appointments touching `date`. `None` returns
    /// bookings with no staff assigned.
    async fn booked_intervals(
        &self,
        staff_id: Option<StaffId>,
        date: NaiveDate,
    ) -> Result<Vec<Span>, BookingError>;
}

/// Requested status change for a conditional transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub status: AppointmentStatus,
    pub payment_status: PaymentStatus,
    /// Replaces the stored payment link when `Some`.
    pub payment: Option<PaymentInfo>,
}

/// Outcome of a conditional transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Applied(Appointment),
    /// The stored status was not one of the expected ones; nothing changed.
    Rejected(Appointment),
}

/// Write side of appointment persistence. Every method is atomic.
#[async_trait]
pub trait AppointmentStore: Send + Sync {
    /// Insert unless an occupying appointment of the same staff overlaps.
    /// Returns `Conflict` with the blocking appointment otherwise.
    async fn insert_if_free(&self, appointment: Appointment) -> Result<Appointment, BookingError>;

    async fn get(&self, id: AppointmentId) -> Result<Option<Appointment>, BookingError>;

    async fn find_by_token(&self, token: &str) -> Result<Option<Appointment>, BookingError>;

    /// Apply `change` only if the current status is one of `from`.
    async fn transition(
        &self,
        id: AppointmentId,
        from: &[AppointmentStatus],
        change: StatusChange,
    ) -> Result<Transition, BookingError>;

    async fn incomplete_holds(&self) -> Result<Vec<Appointment>, BookingError>;
}
