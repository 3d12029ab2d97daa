use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::model::{Event, StaffId};

const CHANNEL_CAPACITY: usize = 256;

/// Broadcast hub of appointment events per staff member. `None` carries
/// events of unassigned appointments.
pub struct NotifyHub {
    channels: DashMap<Option<StaffId>, broadcast::Sender<Event>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to events for a staff member. Creates the channel if needed.
    pub fn subscribe(&self, staff_id: Option<StaffId>) -> broadcast::Receiver<Event> {
        let sender = self
            .channels
            .entry(staff_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Send a notification. No-op if nobody is listening.
    pub fn send(&self, event: &Event) {
        if let Some(sender) = self.channels.get(&event.staff_id()) {
            let _ = sender.send(event.clone());
        }
    }

    pub fn remove(&self, staff_id: Option<StaffId>) {
        self.channels.remove(&staff_id);
    }
}
