use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use dashmap::DashMap;
use tokio::sync::RwLock;

use crate::model::*;

pub type SharedRoomState = Arc<RwLock<RoomState>>;

#[derive(Debug)]
pub enum StoreError {
    /// The row would overlap an active booking on the same room and date.
    /// This is the storage-level exclusion constraint backing the
    /// check-then-insert race.
    Overlap { blocking: BookingId },
    NotFound(BookingId),
    Backend(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Overlap { blocking } => {
                write!(f, "overlaps active booking {blocking}")
            }
            StoreError::NotFound(id) => write!(f, "booking not found: {id}"),
            StoreError::Backend(e) => write!(f, "backend error: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Row access for bookings. Implementations must enforce the no-overlap
/// constraint for active rows on `insert` and `replace` — the engine's
/// optimistic availability check alone is not a guarantee.
#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn insert(&self, booking: Booking) -> Result<Booking, StoreError>;

    async fn get(&self, id: BookingId) -> Result<Option<Booking>, StoreError>;

    /// Replace an existing row (possibly moving it across room or date),
    /// re-checking the overlap constraint when the new row is active.
    async fn replace(&self, updated: Booking) -> Result<Booking, StoreError>;

    async fn set_status(
        &self,
        id: BookingId,
        status: BookingStatus,
        at: DateTime<Utc>,
    ) -> Result<Booking, StoreError>;

    /// All rows for a room on a date, regardless of status.
    async fn room_date_bookings(
        &self,
        room_id: RoomId,
        date: NaiveDate,
    ) -> Result<Vec<Booking>, StoreError>;

    async fn user_bookings(&self, user_id: UserId) -> Result<Vec<Booking>, StoreError>;

    /// Active rows for a room, optionally restricted to one date.
    async fn room_bookings(
        &self,
        room_id: RoomId,
        date: Option<NaiveDate>,
    ) -> Result<Vec<Booking>, StoreError>;

    /// Confirmed rows whose window elapsed: `date < today`, or
    /// `date == today` and `end_time < now`.
    async fn confirmed_elapsed(
        &self,
        today: NaiveDate,
        now: NaiveTime,
    ) -> Result<Vec<Booking>, StoreError>;
}

/// In-memory reference store. One `RwLock<RoomState>` per room; every write
/// re-validates the overlap constraint under the room's write lock, which
/// makes an overlapping insert physically impossible even when two requests
/// passed the optimistic availability check concurrently.
pub struct MemoryStore {
    rooms: DashMap<RoomId, SharedRoomState>,
    /// Reverse lookup: booking id → room id.
    booking_to_room: DashMap<BookingId, RoomId>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
            booking_to_room: DashMap::new(),
        }
    }

    fn room_state(&self, room_id: RoomId) -> SharedRoomState {
        self.rooms
            .entry(room_id)
            .or_insert_with(|| Arc::new(RwLock::new(RoomState::new(room_id))))
            .value()
            .clone()
    }

    fn existing_room(&self, id: BookingId) -> Result<SharedRoomState, StoreError> {
        let room_id = self
            .booking_to_room
            .get(&id)
            .map(|e| *e.value())
            .ok_or(StoreError::NotFound(id))?;
        self.rooms
            .get(&room_id)
            .map(|e| e.value().clone())
            .ok_or(StoreError::NotFound(id))
    }

    /// First active row overlapping `booking`'s slot, other than itself.
    fn blocking_id(rs: &RoomState, booking: &Booking) -> Option<BookingId> {
        rs.overlapping(booking.date, &booking.slot)
            .find(|b| b.is_active() && b.id != booking.id)
            .map(|b| b.id)
    }
}

#[async_trait]
impl BookingStore for MemoryStore {
    async fn insert(&self, booking: Booking) -> Result<Booking, StoreError> {
        let rs = self.room_state(booking.room_id);
        let mut guard = rs.write().await;
        if let Some(blocking) = Self::blocking_id(&guard, &booking) {
            return Err(StoreError::Overlap { blocking });
        }
        self.booking_to_room.insert(booking.id, booking.room_id);
        guard.insert(booking.clone());
        Ok(booking)
    }

    async fn get(&self, id: BookingId) -> Result<Option<Booking>, StoreError> {
        let Ok(rs) = self.existing_room(id) else {
            return Ok(None);
        };
        let guard = rs.read().await;
        Ok(guard.get(id).cloned())
    }

    async fn replace(&self, updated: Booking) -> Result<Booking, StoreError> {
        let old_room_id = self
            .booking_to_room
            .get(&updated.id)
            .map(|e| *e.value())
            .ok_or(StoreError::NotFound(updated.id))?;

        let old_rs = self.room_state(old_room_id);
        let new_rs = self.room_state(updated.room_id);

        // Acquire write locks in sorted room order to prevent deadlocks
        // when two updates move bookings between the same pair of rooms.
        let (mut old_guard, mut new_guard) = if old_room_id == updated.room_id {
            (None, new_rs.write_owned().await)
        } else if old_room_id < updated.room_id {
            let og = old_rs.write_owned().await;
            let ng = new_rs.write_owned().await;
            (Some(og), ng)
        } else {
            let ng = new_rs.write_owned().await;
            let og = old_rs.write_owned().await;
            (Some(og), ng)
        };

        let holder = old_guard.as_deref_mut().unwrap_or(&mut new_guard);
        if holder.get(updated.id).is_none() {
            return Err(StoreError::NotFound(updated.id));
        }
        if updated.is_active()
            && let Some(blocking) = Self::blocking_id(&new_guard, &updated)
        {
            return Err(StoreError::Overlap { blocking });
        }

        match old_guard.as_deref_mut() {
            Some(og) => {
                og.remove(updated.id);
            }
            None => {
                new_guard.remove(updated.id);
            }
        }
        new_guard.insert(updated.clone());
        self.booking_to_room.insert(updated.id, updated.room_id);
        Ok(updated)
    }

    async fn set_status(
        &self,
        id: BookingId,
        status: BookingStatus,
        at: DateTime<Utc>,
    ) -> Result<Booking, StoreError> {
        let rs = self.existing_room(id)?;
        let mut guard = rs.write().await;
        let booking = guard.get_mut(id).ok_or(StoreError::NotFound(id))?;
        booking.status = status;
        booking.updated_at = at;
        Ok(booking.clone())
    }

    async fn room_date_bookings(
        &self,
        room_id: RoomId,
        date: NaiveDate,
    ) -> Result<Vec<Booking>, StoreError> {
        let Some(entry) = self.rooms.get(&room_id) else {
            return Ok(Vec::new());
        };
        let rs = entry.value().clone();
        drop(entry);
        let guard = rs.read().await;
        Ok(guard.on_date(date).cloned().collect())
    }

    async fn user_bookings(&self, user_id: UserId) -> Result<Vec<Booking>, StoreError> {
        let mut out = Vec::new();
        let states: Vec<SharedRoomState> =
            self.rooms.iter().map(|e| e.value().clone()).collect();
        for rs in states {
            let guard = rs.read().await;
            out.extend(guard.bookings.iter().filter(|b| b.user_id == user_id).cloned());
        }
        out.sort_by_key(|b| (b.date, b.slot.start));
        Ok(out)
    }

    async fn room_bookings(
        &self,
        room_id: RoomId,
        date: Option<NaiveDate>,
    ) -> Result<Vec<Booking>, StoreError> {
        let Some(entry) = self.rooms.get(&room_id) else {
            return Ok(Vec::new());
        };
        let rs = entry.value().clone();
        drop(entry);
        let guard = rs.read().await;
        Ok(guard
            .bookings
            .iter()
            .filter(|b| b.is_active() && date.is_none_or(|d| b.date == d))
            .cloned()
            .collect())
    }

    async fn confirmed_elapsed(
        &self,
        today: NaiveDate,
        now: NaiveTime,
    ) -> Result<Vec<Booking>, StoreError> {
        let mut out = Vec::new();
        let states: Vec<SharedRoomState> =
            self.rooms.iter().map(|e| e.value().clone()).collect();
        for rs in states {
            let guard = rs.read().await;
            out.extend(
                guard
                    .bookings
                    .iter()
                    .filter(|b| {
                        b.status == BookingStatus::Confirmed
                            && (b.date < today || (b.date == today && b.slot.end < now))
                    })
                    .cloned(),
            );
        }
        out.sort_by_key(|b| (b.date, b.slot.start));
        Ok(out)
    }
}
