use std::path::Path;

use chrono::NaiveDate;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::booking::BookingError;
use crate::limits::*;
use crate::model::*;

/// Serialized catalog document, as exported by the admin side.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogData {
    #[serde(default)]
    pub services: Vec<Service>,
    #[serde(default)]
    pub staff: Vec<StaffMember>,
    #[serde(default)]
    pub staff_services: Vec<StaffService>,
    #[serde(default)]
    pub schedules: Vec<ScheduleEntry>,
    #[serde(default)]
    pub holidays: Vec<Holiday>,
}

/// Services, staff, qualifications, weekly schedules and holidays.
#[derive(Default)]
pub struct Catalog {
    services: DashMap<ServiceId, Service>,
    staff: DashMap<StaffId, StaffMember>,
    /// service → qualified staff with optional duration override
    qualifications: DashMap<ServiceId, Vec<StaffService>>,
    /// (staff, weekday) → entries sorted by start time
    schedules: DashMap<(StaffId, u8), Vec<ScheduleEntry>>,
    holidays: DashMap<Option<StaffId>, Vec<Holiday>>,
}

/// Entries of one staff/weekday: valid ranges, breaks inside, no overlaps.
fn validate_day(entries: &[ScheduleEntry]) -> Result<(), BookingError> {
    if entries.len() > MAX_ENTRIES_PER_DAY {
        return Err(BookingError::InvalidSchedule("too many entries for one day"));
    }
    for entry in entries {
        if entry.day_of_week > 6 {
            return Err(BookingError::InvalidSchedule("day_of_week must be 0-6"));
        }
        if !entry.hours.is_valid() {
            return Err(BookingError::InvalidSchedule("entry must start before it ends"));
        }
        if entry.breaks.len() > MAX_BREAKS_PER_ENTRY {
            return Err(BookingError::InvalidSchedule("too many breaks in one entry"));
        }
        for b in &entry.breaks {
            if !b.is_valid() || !entry.hours.contains(b) {
                return Err(BookingError::InvalidSchedule("break outside its entry"));
            }
        }
    }
    for (i, a) in entries.iter().enumerate() {
        if entries[i + 1..].iter().any(|b| a.hours.overlaps(&b.hours)) {
            return Err(BookingError::InvalidSchedule("entries of one day overlap"));
        }
    }
    Ok(())
}

/// A configured duration must be positive and no longer than a day.
fn validate_duration(service_id: ServiceId, minutes: Option<u32>) -> Result<(), BookingError> {
    match minutes {
        Some(m) if m == 0 || m > MAX_SERVICE_MINUTES => Err(BookingError::InvalidService(service_id)),
        _ => Ok(()),
    }
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_data(data: CatalogData) -> Result<Self, BookingError> {
        let catalog = Self::new();
        for service in data.services {
            catalog.upsert_service(service)?;
        }
        for member in data.staff {
            catalog.upsert_staff(member);
        }
        for qualification in data.staff_services {
            catalog.assign_service(qualification)?;
        }
        let mut days: std::collections::BTreeMap<(StaffId, u8), Vec<ScheduleEntry>> =
            std::collections::BTreeMap::new();
        for entry in data.schedules {
            days.entry((entry.staff_id, entry.day_of_week)).or_default().push(entry);
        }
        for ((staff_id, day), entries) in days {
            catalog.set_schedule(staff_id, day, entries)?;
        }
        for holiday in data.holidays {
            catalog.add_holiday(holiday);
        }
        Ok(catalog)
    }

    /// Load a JSON catalog document from disk.
    pub fn load(path: &Path) -> Result<Self, BookingError> {
        let text = std::fs::read_to_string(path)?;
        let data: CatalogData = serde_json::from_str(&text).map_err(|e| {
            BookingError::PersistenceError(format!("catalog {}: {e}", path.display()))
        })?;
        Self::from_data(data)
    }

    pub fn upsert_service(&self, service: Service) -> Result<(), BookingError> {
        validate_duration(service.id, service.duration_minutes)?;
        self.services.insert(service.id, service);
        Ok(())
    }

    pub fn upsert_staff(&self, member: StaffMember) {
        self.staff.insert(member.id, member);
    }

    /// Qualify a staff member for a service, replacing an earlier row.
    pub fn assign_service(&self, qualification: StaffService) -> Result<(), BookingError> {
        validate_duration(qualification.service_id, qualification.duration_minutes)?;
        let mut rows = self.qualifications.entry(qualification.service_id).or_default();
        rows.retain(|q| q.staff_id != qualification.staff_id);
        rows.push(qualification);
        Ok(())
    }

    pub fn unassign_service(&self, staff_id: StaffId, service_id: ServiceId) {
        if let Some(mut rows) = self.qualifications.get_mut(&service_id) {
            rows.retain(|q| q.staff_id != staff_id);
        }
    }

    /// Replace the entries of one staff member on one weekday.
    pub fn set_schedule(
        &self,
        staff_id: StaffId,
        day_of_week: u8,
        mut entries: Vec<ScheduleEntry>,
    ) -> Result<(), BookingError> {
        if entries.iter().any(|e| e.staff_id != staff_id || e.day_of_week != day_of_week) {
            return Err(BookingError::InvalidSchedule("entry belongs to another staff/day"));
        }
        if day_of_week > 6 {
            return Err(BookingError::InvalidSchedule("day_of_week must be 0-6"));
        }
        validate_day(&entries)?;
        entries.sort_by_key(|e| e.hours.start);
        self.schedules.insert((staff_id, day_of_week), entries);
        Ok(())
    }

    pub fn add_holiday(&self, holiday: Holiday) {
        self.holidays.entry(holiday.staff_id).or_default().push(holiday);
    }

    pub fn service(&self, id: ServiceId) -> Option<Service> {
        self.services.get(&id).map(|s| s.value().clone())
    }

    pub fn staff_member(&self, id: StaffId) -> Option<StaffMember> {
        self.staff.get(&id).map(|s| s.value().clone())
    }

    pub fn eligible_staff(&self, service_id: ServiceId) -> Vec<StaffId> {
        let Some(rows) = self.qualifications.get(&service_id) else {
            return Vec::new();
        };
        let mut ids: Vec<StaffId> = rows
            .iter()
            .map(|q| q.staff_id)
            .filter(|id| self.staff.get(id).is_some_and(|m| m.is_active()))
            .collect();
        ids.sort_unstable();
        ids
    }

    pub fn weekly_schedule(&self, staff_id: StaffId, day_of_week: u8) -> Vec<ScheduleEntry> {
        self.schedules
            .get(&(staff_id, day_of_week))
            .map(|e| e.value().clone())
            .unwrap_or_default()
    }

    pub fn is_holiday(&self, staff_id: Option<StaffId>, date: NaiveDate) -> bool {
        self.holidays
            .get(&staff_id)
            .is_some_and(|list| list.iter().any(|h| h.covers(date)))
    }

    /// Staff override first, then the service's own duration.
    pub fn service_duration(&self, service_id: ServiceId, staff_id: Option<StaffId>) -> Option<u32> {
        let own = self.services.get(&service_id)?.duration_minutes;
        let staff_override = staff_id.and_then(|sid| {
            self.qualifications.get(&service_id).and_then(|rows| {
                rows.iter()
                    .find(|q| q.staff_id == sid)
                    .and_then(|q| q.duration_minutes)
            })
        });
        staff_override.or(own)
    }
}
