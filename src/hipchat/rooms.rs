use chrono::{DateTime, Utc};
use log::{info, warn};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomHandle {
    pub room_id: String,
    pub oauth_id: String,
    pub installed_at: DateTime<Utc>,
}

impl RoomHandle {
    pub fn new(room_id: impl Into<String>, oauth_id: impl Into<String>) -> Self {
        Self {
            room_id: room_id.into(),
            oauth_id: oauth_id.into(),
            installed_at: Utc::now(),
        }
    }
}

/// Rooms the integration is installed in, keyed by room id.
///
/// Entries are written once when a room installs the integration and only
/// read afterwards. Installation callbacks may race, so writes go through
/// the lock.
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: Mutex<HashMap<String, RoomHandle>>,
}

impl RoomRegistry {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, RoomHandle>> {
        self.rooms.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns `false` and keeps the existing entry if the room is already
    /// registered.
    pub fn register(&self, handle: RoomHandle) -> bool {
        let mut rooms = self.lock();
        if let Some(existing) = rooms.get(&handle.room_id) {
            warn!(
                "Room {} already installed (oauth id {}), ignoring new installation",
                existing.room_id, existing.oauth_id
            );
            return false;
        }
        info!("Room {} installed", handle.room_id);
        rooms.insert(handle.room_id.clone(), handle);
        true
    }

    pub fn get(&self, room_id: &str) -> Option<RoomHandle> {
        self.lock().get(room_id).cloned()
    }

    /// Removes the room installed under `oauth_id`.
    pub fn remove_by_oauth_id(&self, oauth_id: &str) -> Option<RoomHandle> {
        let mut rooms = self.lock();
        let room_id = rooms
            .values()
            .find(|handle| handle.oauth_id == oauth_id)
            .map(|handle| handle.room_id.clone())?;
        info!("Room {room_id} uninstalled");
        rooms.remove(&room_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }
}
