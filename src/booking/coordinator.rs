use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use rand::RngCore;
use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::config::BookingConfig;
use crate::limits::*;
use crate::model::*;
use crate::observability;
use crate::policy::LifecyclePolicy;

use super::slots::SlotGenerator;
use super::{AppointmentStore, AvailabilityRepository, BookingError, StatusChange, Transition};

/// Statuses a cancellation may move away from.
const CANCELLABLE: &[AppointmentStatus] = &[
    AppointmentStatus::Pending,
    AppointmentStatus::Incomplete,
    AppointmentStatus::Confirmed,
];

const CONFIRMABLE: &[AppointmentStatus] = &[AppointmentStatus::Pending, AppointmentStatus::Incomplete];

fn new_cancellation_token() -> String {
    let mut bytes = [0u8; CANCELLATION_TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Path of the self-service cancellation page for a token.
pub fn cancellation_path(token: &str) -> String {
    format!("/cancel/{token}")
}

fn check_len(value: &str, max: usize, what: &'static str) -> Result<(), BookingError> {
    if value.len() > max {
        return Err(BookingError::LimitExceeded(what));
    }
    Ok(())
}

fn validate_customer(customer: &CustomerInfo) -> Result<(), BookingError> {
    check_len(&customer.name, MAX_CUSTOMER_FIELD_LEN, "customer name too long")?;
    check_len(&customer.email, MAX_CUSTOMER_FIELD_LEN, "customer email too long")?;
    if let Some(phone) = &customer.phone {
        check_len(phone, MAX_CUSTOMER_FIELD_LEN, "customer phone too long")?;
    }
    if let Some(notes) = &customer.notes {
        check_len(notes, MAX_NOTES_LEN, "customer notes too long")?;
    }
    Ok(())
}

fn validate_payment(payment: &PaymentInfo) -> Result<(), BookingError> {
    check_len(&payment.gateway, MAX_PAYMENT_FIELD_LEN, "payment gateway too long")?;
    check_len(&payment.reference, MAX_PAYMENT_FIELD_LEN, "payment reference too long")
}

fn cancelled() -> StatusChange {
    StatusChange {
        status: AppointmentStatus::Cancelled,
        payment_status: PaymentStatus::Cancelled,
        payment: None,
    }
}

/// Reserves, confirms and cancels appointments. The only writer of
/// appointment status in this crate.
pub struct BookingCoordinator<R, S> {
    slots: SlotGenerator<R>,
    repo: Arc<R>,
    store: Arc<S>,
    policy: LifecyclePolicy,
}

impl<R: AvailabilityRepository, S: AppointmentStore> BookingCoordinator<R, S> {
    pub fn new(repo: Arc<R>, store: Arc<S>, config: BookingConfig) -> Result<Self, BookingError> {
        Ok(Self {
            slots: SlotGenerator::new(repo.clone(), config)?,
            repo,
            store,
            policy: config.policy,
        })
    }

    pub fn slots(&self) -> &SlotGenerator<R> {
        &self.slots
    }

    pub fn policy(&self) -> &LifecyclePolicy {
        &self.policy
    }

    pub async fn generate_slots(
        &self,
        service_id: ServiceId,
        staff_id: Option<StaffId>,
        date: NaiveDate,
        now: NaiveDateTime,
    ) -> Result<Vec<Slot>, BookingError> {
        self.slots.generate_slots(service_id, staff_id, date, now).await
    }

    pub async fn appointment(&self, id: AppointmentId) -> Result<Appointment, BookingError> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("appointment {id}")))
    }

    /// Hold `start` for the customer. Returns an `incomplete` appointment when
    /// the service needs payment, `pending` otherwise.
    ///
    /// A start already covered by a booking fails the slot re-check with
    /// `SlotNoLongerAvailable`; only a race lost inside the atomic insert
    /// yields `Conflict`. Both mean "taken" and are `is_recoverable`.
    pub async fn reserve_slot(
        &self,
        service_id: ServiceId,
        staff_id: Option<StaffId>,
        start: NaiveDateTime,
        customer: CustomerInfo,
        now: NaiveDateTime,
    ) -> Result<Appointment, BookingError> {
        let result = self.try_reserve(service_id, staff_id, start, customer, now).await;
        match &result {
            Ok(appointment) => {
                info!(
                    "reserved {} for service {service_id} staff {:?} at {start} ({})",
                    appointment.id, appointment.staff_id, appointment.status
                );
                if appointment.status == AppointmentStatus::Incomplete
                    && let Some(until) = self.policy.hold_expires_at(appointment.created_at)
                {
                    debug!("{} held for payment until {until}", appointment.id);
                }
                metrics::counter!(observability::RESERVATIONS_TOTAL, "outcome" => "ok").increment(1);
            }
            Err(e) => {
                if e.is_recoverable() {
                    debug!("reservation for service {service_id} at {start} lost: {e}");
                } else {
                    warn!("reservation for service {service_id} at {start} failed: {e}");
                }
                metrics::counter!(observability::RESERVATIONS_TOTAL, "outcome" => e.label()).increment(1);
            }
        }
        result
    }

    async fn try_reserve(
        &self,
        service_id: ServiceId,
        staff_id: Option<StaffId>,
        start: NaiveDateTime,
        customer: CustomerInfo,
        now: NaiveDateTime,
    ) -> Result<Appointment, BookingError> {
        validate_customer(&customer)?;
        let service = self
            .repo
            .service(service_id)
            .await?
            .ok_or(BookingError::InvalidService(service_id))?;
        if let Some(id) = staff_id {
            self.ensure_bookable_staff(service_id, id).await?;
        }

        // Stale client-side slot lists are rejected here.
        let date = start.date();
        let slot = self
            .slots
            .generate_slots(service_id, staff_id, date, now)
            .await?
            .into_iter()
            .find(|s| s.start == start)
            .ok_or(BookingError::SlotNoLongerAvailable)?;

        let (staff, span) = self.pick_staff(service_id, &slot, date).await?;

        let (status, payment_status) = if service.requires_payment() {
            (AppointmentStatus::Incomplete, PaymentStatus::Pending)
        } else {
            (AppointmentStatus::Pending, PaymentStatus::Unpaid)
        };
        let appointment = Appointment {
            id: Ulid::new(),
            service_id,
            staff_id: Some(staff),
            span,
            status,
            payment_status,
            cancellation_token: new_cancellation_token(),
            customer,
            payment: None,
            created_at: now,
        };
        self.store.insert_if_free(appointment).await
    }

    async fn ensure_bookable_staff(&self, service_id: ServiceId, staff_id: StaffId) -> Result<(), BookingError> {
        let member = self
            .repo
            .staff_member(staff_id)
            .await?
            .ok_or(BookingError::InvalidStaff(staff_id))?;
        if !member.is_active() || !self.repo.eligible_staff(service_id).await?.contains(&staff_id) {
            return Err(BookingError::InvalidStaff(staff_id));
        }
        Ok(())
    }

    /// Lowest staff id of the slot whose bookings still leave the span free.
    async fn pick_staff(
        &self,
        service_id: ServiceId,
        slot: &Slot,
        date: NaiveDate,
    ) -> Result<(StaffId, Span), BookingError> {
        for &staff in &slot.staff {
            let minutes = self.slots.resolve_duration(service_id, Some(staff)).await?;
            let span = Span::starting_at(slot.start, minutes);
            let booked = self.repo.booked_intervals(Some(staff), date).await?;
            if !booked.iter().any(|b| b.overlaps(&span)) {
                return Ok((staff, span));
            }
            debug!("staff {staff} taken at {} since slot generation", slot.start);
        }
        Err(BookingError::SlotNoLongerAvailable)
    }

    /// Mark a reservation confirmed, linking the payment that settled it.
    /// A repeated call with the same payment is a no-op.
    pub async fn confirm_reservation(
        &self,
        id: AppointmentId,
        payment: Option<PaymentInfo>,
    ) -> Result<Appointment, BookingError> {
        if let Some(p) = &payment {
            validate_payment(p)?;
        }
        let current = self.appointment(id).await?;
        if CONFIRMABLE.contains(&current.status) {
            let change = StatusChange {
                status: AppointmentStatus::Confirmed,
                payment_status: if payment.is_some() {
                    PaymentStatus::Paid
                } else {
                    current.payment_status
                },
                payment: payment.clone(),
            };
            match self.store.transition(id, CONFIRMABLE, change).await? {
                Transition::Applied(appointment) => {
                    info!("confirmed {id}");
                    return Ok(appointment);
                }
                // lost a race: decide on what is stored now
                Transition::Rejected(now_stored) => return confirmed_same(now_stored, &payment),
            }
        }
        confirmed_same(current, &payment)
    }

    /// Self-service cancellation through the emailed token.
    pub async fn cancel_by_token(&self, token: &str, now: NaiveDateTime) -> Result<Appointment, BookingError> {
        let appointment = self
            .store
            .find_by_token(token)
            .await?
            .ok_or_else(|| BookingError::NotFound("cancellation token".into()))?;
        match appointment.status {
            AppointmentStatus::Cancelled => return Err(BookingError::AlreadyCancelled(appointment.id)),
            AppointmentStatus::Completed => {
                return Err(BookingError::InvalidState {
                    id: appointment.id,
                    status: appointment.status,
                })
            }
            _ => {}
        }
        if !self.policy.is_cancellable(appointment.span.start, now) {
            return Err(BookingError::TooLateToCancel(appointment.id));
        }
        self.cancel(appointment.id, CANCELLABLE, "customer").await
    }

    /// Administrative cancellation; ignores the cancellation cutoff.
    pub async fn cancel_appointment(&self, id: AppointmentId) -> Result<Appointment, BookingError> {
        self.cancel(id, CANCELLABLE, "admin").await
    }

    /// Abandon an unpaid hold, e.g. when the customer leaves checkout.
    pub async fn release_hold(&self, id: AppointmentId) -> Result<Appointment, BookingError> {
        self.cancel(id, &[AppointmentStatus::Incomplete], "abandoned").await
    }

    async fn cancel(
        &self,
        id: AppointmentId,
        from: &[AppointmentStatus],
        reason: &'static str,
    ) -> Result<Appointment, BookingError> {
        match self.store.transition(id, from, cancelled()).await? {
            Transition::Applied(appointment) => {
                info!("cancelled {id} ({reason})");
                metrics::counter!(observability::CANCELLATIONS_TOTAL, "reason" => reason).increment(1);
                Ok(appointment)
            }
            Transition::Rejected(current) if current.status == AppointmentStatus::Cancelled => {
                Err(BookingError::AlreadyCancelled(id))
            }
            Transition::Rejected(current) => Err(BookingError::InvalidState {
                id,
                status: current.status,
            }),
        }
    }

    /// Cancel every incomplete hold older than the hold interval. Returns how
    /// many this call cancelled; holds cancelled or confirmed concurrently are
    /// skipped.
    pub async fn sweep_expired_holds(&self, now: NaiveDateTime) -> Result<usize, BookingError> {
        if self.policy.incomplete_hold_minutes <= 0 {
            return Ok(0);
        }
        let mut count = 0;
        for hold in self.store.incomplete_holds().await? {
            if !self.policy.is_expired_hold(hold.created_at, now) {
                continue;
            }
            let from = [AppointmentStatus::Incomplete];
            if let Transition::Applied(_) = self.store.transition(hold.id, &from, cancelled()).await? {
                debug!("expired hold {} created {}", hold.id, hold.created_at);
                count += 1;
            }
        }
        if count > 0 {
            info!("swept {count} expired holds");
            metrics::counter!(observability::HOLDS_EXPIRED_TOTAL).increment(count as u64);
        }
        Ok(count)
    }
}

fn confirmed_same(current: Appointment, payment: &Option<PaymentInfo>) -> Result<Appointment, BookingError> {
    if current.status == AppointmentStatus::Confirmed
        && (payment.is_none() || current.payment == *payment)
    {
        return Ok(current);
    }
    Err(BookingError::InvalidState {
        id: current.id,
        status: current.status,
    })
}
