mod catalog;
mod ledger;

pub use catalog::{Catalog, CatalogData};
pub use ledger::{Ledger, SharedStaffLedger};

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::booking::{AppointmentStore, AvailabilityRepository, BookingError, StatusChange, Transition};
use crate::model::*;
use crate::notify::NotifyHub;

/// In-process implementation of both booking ports: an in-memory catalog
/// plus the WAL-backed appointment ledger.
pub struct LocalStore {
    pub catalog: Catalog,
    pub ledger: Ledger,
}

impl LocalStore {
    pub fn open(wal_path: &Path, catalog: Catalog) -> Result<Self, BookingError> {
        Self::open_with_notify(wal_path, catalog, Arc::new(NotifyHub::new()))
    }

    pub fn open_with_notify(
        wal_path: &Path,
        catalog: Catalog,
        notify: Arc<NotifyHub>,
    ) -> Result<Self, BookingError> {
        Ok(Self {
            catalog,
            ledger: Ledger::open(wal_path, notify)?,
        })
    }
}

#[async_trait]
impl AvailabilityRepository for LocalStore {
    async fn service(&self, service_id: ServiceId) -> Result<Option<Service>, BookingError> {
        Ok(self.catalog.service(service_id))
    }

    async fn staff_member(&self, staff_id: StaffId) -> Result<Option<StaffMember>, BookingError> {
        Ok(self.catalog.staff_member(staff_id))
    }

    async fn eligible_staff(&self, service_id: ServiceId) -> Result<Vec<StaffId>, BookingError> {
        Ok(self.catalog.eligible_staff(service_id))
    }

    async fn weekly_schedule(
        &self,
        staff_id: StaffId,
        day_of_week: u8,
    ) -> Result<Vec<ScheduleEntry>, BookingError> {
        Ok(self.catalog.weekly_schedule(staff_id, day_of_week))
    }

    async fn is_holiday(&self, staff_id: Option<StaffId>, date: NaiveDate) -> Result<bool, BookingError> {
        Ok(self.catalog.is_holiday(staff_id, date))
    }

    async fn service_duration(
        &self,
        service_id: ServiceId,
        staff_id: Option<StaffId>,
    ) -> Result<Option<u32>, BookingError> {
        Ok(self.catalog.service_duration(service_id, staff_id))
    }

    async fn booked_intervals(
        &self,
        staff_id: Option<StaffId>,
        date: NaiveDate,
    ) -> Result<Vec<Span>, BookingError> {
        Ok(self.ledger.booked_intervals(staff_id, date).await)
    }
}

#[async_trait]
impl AppointmentStore for LocalStore {
    async fn insert_if_free(&self, appointment: Appointment) -> Result<Appointment, BookingError> {
        self.ledger.insert_if_free(appointment).await
    }

    async fn get(&self, id: AppointmentId) -> Result<Option<Appointment>, BookingError> {
        Ok(self.ledger.get(id).await)
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<Appointment>, BookingError> {
        Ok(self.ledger.find_by_token(token).await)
    }

    async fn transition(
        &self,
        id: AppointmentId,
        from: &[AppointmentStatus],
        change: StatusChange,
    ) -> Result<Transition, BookingError> {
        self.ledger.transition(id, from, change).await
    }

    async fn incomplete_holds(&self) -> Result<Vec<Appointment>, BookingError> {
        Ok(self.ledger.incomplete_holds().await)
    }
}
