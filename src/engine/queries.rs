use chrono::{NaiveDate, NaiveTime, Utc};

use crate::model::*;

use super::availability::{conflicting, validate_slot};
use super::{Engine, EngineError};

impl Engine {
    /// True iff no active booking on the same room and date overlaps `slot`.
    /// A storage failure propagates: availability is then indeterminate and
    /// must not be read as "available".
    pub async fn is_available(
        &self,
        room_id: RoomId,
        date: NaiveDate,
        slot: &TimeSlot,
        exclude: Option<BookingId>,
    ) -> Result<bool, EngineError> {
        validate_slot(slot)?;
        let rows = self.store.room_date_bookings(room_id, date).await?;
        Ok(conflicting(&rows, slot, exclude).next().is_none())
    }

    /// The active bookings blocking a slot, for operator inspection.
    pub async fn find_conflicts(
        &self,
        room_id: RoomId,
        date: NaiveDate,
        slot: &TimeSlot,
    ) -> Result<Vec<Booking>, EngineError> {
        self.conflicts_excluding(room_id, date, slot, None).await
    }

    pub(super) async fn conflicts_excluding(
        &self,
        room_id: RoomId,
        date: NaiveDate,
        slot: &TimeSlot,
        exclude: Option<BookingId>,
    ) -> Result<Vec<Booking>, EngineError> {
        validate_slot(slot)?;
        let rows = self.store.room_date_bookings(room_id, date).await?;
        Ok(conflicting(&rows, slot, exclude).cloned().collect())
    }

    /// Confirmed bookings whose scheduled window has already elapsed
    /// without being finalized.
    pub async fn find_stuck(&self) -> Result<Vec<Booking>, EngineError> {
        let now = Utc::now();
        self.find_stuck_at(now.date_naive(), now.time()).await
    }

    /// Deterministic variant of [`Engine::find_stuck`] against an explicit
    /// wall-clock reading.
    pub async fn find_stuck_at(
        &self,
        today: NaiveDate,
        now: NaiveTime,
    ) -> Result<Vec<Booking>, EngineError> {
        Ok(self.store.confirmed_elapsed(today, now).await?)
    }

    pub async fn get_booking(&self, id: BookingId) -> Result<Booking, EngineError> {
        self.store
            .get(id)
            .await?
            .ok_or(EngineError::BookingNotFound(id))
    }

    pub async fn bookings_for_user(&self, user_id: UserId) -> Result<Vec<Booking>, EngineError> {
        Ok(self.store.user_bookings(user_id).await?)
    }

    /// Active bookings for a room, optionally restricted to one date.
    pub async fn bookings_for_room(
        &self,
        room_id: RoomId,
        date: Option<NaiveDate>,
    ) -> Result<Vec<Booking>, EngineError> {
        Ok(self.store.room_bookings(room_id, date).await?)
    }
}
