use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

pub type StaffId = u64;
pub type ServiceId = u64;
pub type AppointmentId = Ulid;

/// Half-open interval `[start, end)` of wall-clock business time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl Span {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        debug_assert!(start <= end, "Span start must not be after end");
        Self { start, end }
    }

    pub fn starting_at(start: NaiveDateTime, minutes: u32) -> Self {
        Self::new(start, start + Duration::minutes(i64::from(minutes)))
    }

    /// The whole calendar day `[date 00:00, date+1 00:00)`.
    pub fn day(date: NaiveDate) -> Self {
        let start = date.and_time(NaiveTime::MIN);
        Self::new(start, start + Duration::days(1))
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        crate::calendar::overlaps(self.start, self.end, other.start, other.end)
    }
}

/// Time-of-day pair, e.g. a shift `09:00–17:00` or a break.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeRange {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    pub fn is_valid(&self) -> bool {
        self.start < self.end
    }

    /// Anchor this range onto a concrete date.
    pub fn on(&self, date: NaiveDate) -> Span {
        Span::new(date.and_time(self.start), date.and_time(self.end))
    }

    pub fn overlaps(&self, other: &TimeRange) -> bool {
        crate::calendar::overlaps(self.start, self.end, other.start, other.end)
    }

    pub fn contains(&self, other: &TimeRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

// ── Catalog ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub id: ServiceId,
    #[serde(default)]
    pub name: Option<String>,
    /// `None` falls back to the configured default duration.
    #[serde(default)]
    pub duration_minutes: Option<u32>,
    #[serde(default)]
    pub price_cents: u64,
}

impl Service {
    pub fn requires_payment(&self) -> bool {
        self.price_cents > 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StaffStatus {
    Active,
    Inactive,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaffMember {
    pub id: StaffId,
    #[serde(default)]
    pub name: Option<String>,
    pub status: StaffStatus,
}

impl StaffMember {
    pub fn is_active(&self) -> bool {
        self.status == StaffStatus::Active
    }
}

/// Qualification of a staff member for a service, with an optional
/// staff-specific duration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaffService {
    pub staff_id: StaffId,
    pub service_id: ServiceId,
    #[serde(default)]
    pub duration_minutes: Option<u32>,
}

/// One working block of a weekly schedule with its breaks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub staff_id: StaffId,
    /// 0 = Sunday … 6 = Saturday.
    pub day_of_week: u8,
    pub hours: TimeRange,
    #[serde(default)]
    pub breaks: Vec<TimeRange>,
}

pub fn day_of_week(date: NaiveDate) -> u8 {
    date.weekday().num_days_from_sunday() as u8
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HolidayDates {
    Single { date: NaiveDate },
    Range { start_date: NaiveDate, end_date: NaiveDate },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holiday {
    /// `None` applies to every staff member.
    #[serde(default)]
    pub staff_id: Option<StaffId>,
    #[serde(flatten)]
    pub dates: HolidayDates,
    /// Recurs every year on the same month/day.
    #[serde(default)]
    pub repeat_yearly: bool,
}

impl Holiday {
    pub fn covers(&self, date: NaiveDate) -> bool {
        let (start, end) = match self.dates {
            HolidayDates::Single { date } => (date, date),
            HolidayDates::Range { start_date, end_date } => (start_date, end_date),
        };
        if !self.repeat_yearly {
            return start <= date && date <= end;
        }
        let md = |d: NaiveDate| (d.month(), d.day());
        let (from, to, at) = (md(start), md(end), md(date));
        if from <= to {
            from <= at && at <= to
        } else {
            // range wraps the new year, e.g. Dec 24 – Jan 2
            at >= from || at <= to
        }
    }
}

// ── Appointments ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    Pending,
    Incomplete,
    Confirmed,
    Cancelled,
    Completed,
}

impl AppointmentStatus {
    /// Whether an appointment in this status occupies its staff's time.
    pub fn occupies(&self) -> bool {
        !matches!(self, AppointmentStatus::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Incomplete => "incomplete",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::Completed => "completed",
        }
    }
}

impl std::fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Unpaid,
    Pending,
    Paid,
    Cancelled,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerInfo {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub notes: Option<String>,
}

/// Link to the gateway transaction that paid for an appointment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentInfo {
    pub gateway: String,
    pub reference: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: AppointmentId,
    pub service_id: ServiceId,
    pub staff_id: Option<StaffId>,
    pub span: Span,
    pub status: AppointmentStatus,
    pub payment_status: PaymentStatus,
    pub cancellation_token: String,
    pub customer: CustomerInfo,
    pub payment: Option<PaymentInfo>,
    pub created_at: NaiveDateTime,
}

/// A bookable start time and the staff free to take it, ascending by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub start: NaiveDateTime,
    pub staff: Vec<StaffId>,
}

/// Appointments of one staff member (or of unassigned bookings), sorted by start.
#[derive(Debug, Clone)]
pub struct StaffLedger {
    pub staff_id: Option<StaffId>,
    pub appointments: Vec<Appointment>,
}

impl StaffLedger {
    pub fn new(staff_id: Option<StaffId>) -> Self {
        Self {
            staff_id,
            appointments: Vec::new(),
        }
    }

    /// Insert appointment maintaining sort order by span.start.
    pub fn insert(&mut self, appointment: Appointment) {
        let pos = self
            .appointments
            .partition_point(|a| a.span.start <= appointment.span.start);
        self.appointments.insert(pos, appointment);
    }

    pub fn get(&self, id: &AppointmentId) -> Option<&Appointment> {
        self.appointments.iter().find(|a| a.id == *id)
    }

    pub fn get_mut(&mut self, id: &AppointmentId) -> Option<&mut Appointment> {
        self.appointments.iter_mut().find(|a| a.id == *id)
    }

    /// Appointments whose span overlaps the query window, in any status.
    /// Binary search skips everything starting at or after `query.end`.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &Appointment> {
        let right_bound = self
            .appointments
            .partition_point(|a| a.span.start < query.end);
        self.appointments[..right_bound]
            .iter()
            .filter(move |a| a.span.end > query.start)
    }

    /// First appointment still occupying time that overlaps `span`.
    pub fn first_conflict(&self, span: &Span) -> Option<&Appointment> {
        self.overlapping(span)
            .find(|a| a.status.occupies() && a.span.overlaps(span))
    }
}

/// Appointment events; the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    AppointmentCreated {
        appointment: Appointment,
    },
    StatusChanged {
        id: AppointmentId,
        staff_id: Option<StaffId>,
        status: AppointmentStatus,
        payment_status: PaymentStatus,
        payment: Option<PaymentInfo>,
    },
}

impl Event {
    pub fn staff_id(&self) -> Option<StaffId> {
        match self {
            Event::AppointmentCreated { appointment } => appointment.staff_id,
            Event::StatusChanged { staff_id, .. } => *staff_id,
        }
    }
}
