use chrono::{NaiveDate, Utc};
use ulid::Ulid;

use crate::model::*;
use crate::observability;

use super::availability::validate_slot;
use super::{Engine, EngineError};

/// Outcome of an operator conflict resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Cancelled(Booking),
    /// Acknowledged without mutating state: the operator keeps the booking
    /// as-is. Documented no-op.
    Overridden(BookingId),
}

impl Engine {
    /// Create a Confirmed booking. Preconditions, each with its own error:
    /// well-formed slot, user exists, room exists and is bookable, slot
    /// available. The store insert re-checks overlap under the room lock,
    /// so a concurrent create racing past the availability check still
    /// surfaces as a conflict rather than a double booking.
    pub async fn create(
        &self,
        user_id: UserId,
        room_id: RoomId,
        date: NaiveDate,
        slot: TimeSlot,
    ) -> Result<Booking, EngineError> {
        validate_slot(&slot)?;

        if !self
            .users
            .exists(user_id)
            .await
            .map_err(|e| EngineError::Storage(e.to_string()))?
        {
            return Err(EngineError::UserNotFound(user_id));
        }
        if !self
            .rooms
            .exists(room_id)
            .await
            .map_err(|e| EngineError::Storage(e.to_string()))?
        {
            return Err(EngineError::RoomNotFound(room_id));
        }
        if let Some(existing) = self
            .conflicts_excluding(room_id, date, &slot, None)
            .await?
            .into_iter()
            .next()
        {
            metrics::counter!(observability::BOOKING_CONFLICTS_TOTAL).increment(1);
            return Err(EngineError::Conflict(existing.id));
        }

        let now = Utc::now();
        let booking = Booking {
            id: Ulid::new(),
            user_id,
            room_id,
            date,
            slot,
            status: BookingStatus::Confirmed,
            created_at: now,
            updated_at: now,
        };
        let created = self.store.insert(booking).await.map_err(|e| {
            if matches!(e, super::StoreError::Overlap { .. }) {
                metrics::counter!(observability::BOOKING_CONFLICTS_TOTAL).increment(1);
            }
            EngineError::from(e)
        })?;
        metrics::counter!(observability::BOOKINGS_CREATED_TOTAL).increment(1);
        tracing::info!(
            booking = %created.id,
            room = created.room_id,
            user = created.user_id,
            "booking confirmed"
        );
        Ok(created)
    }

    /// Apply a partial update. Availability is re-validated (excluding the
    /// booking itself) only when room, date or slot actually changed, and
    /// room existence only when the room changed.
    pub async fn update(
        &self,
        id: BookingId,
        patch: BookingPatch,
        requester: &Requester,
    ) -> Result<Booking, EngineError> {
        let current = self.get_booking(id).await?;
        if !requester.role.can_manage_any_booking() && current.user_id != requester.user_id {
            return Err(EngineError::Unauthorized(
                "bookings can only be updated by their owner",
            ));
        }

        let room_id = patch.room_id.unwrap_or(current.room_id);
        let date = patch.date.unwrap_or(current.date);
        let slot = TimeSlot::new(
            patch.start_time.unwrap_or(current.slot.start),
            patch.end_time.unwrap_or(current.slot.end),
        );
        validate_slot(&slot)?;
        let status = patch.status.unwrap_or(current.status);
        if status != current.status && current.status.is_terminal() {
            return Err(EngineError::Validation(
                "booking is in a terminal state and cannot change status",
            ));
        }

        if room_id != current.room_id
            && !self
                .rooms
                .exists(room_id)
                .await
                .map_err(|e| EngineError::Storage(e.to_string()))?
        {
            return Err(EngineError::RoomNotFound(room_id));
        }

        let slot_changed =
            room_id != current.room_id || date != current.date || slot != current.slot;
        if slot_changed
            && let Some(existing) = self
                .conflicts_excluding(room_id, date, &slot, Some(id))
                .await?
                .into_iter()
                .next()
        {
            metrics::counter!(observability::BOOKING_CONFLICTS_TOTAL).increment(1);
            return Err(EngineError::Conflict(existing.id));
        }

        let updated = Booking {
            room_id,
            date,
            slot,
            status,
            updated_at: Utc::now(),
            ..current
        };
        Ok(self.store.replace(updated).await?)
    }

    /// Cancel a booking on behalf of its owner (or a privileged caller).
    /// Cancelling an already-cancelled booking is an explicit error and
    /// never touches `updated_at` again.
    pub async fn cancel(
        &self,
        id: BookingId,
        requester: &Requester,
    ) -> Result<Booking, EngineError> {
        let owner_check = if requester.role.can_manage_any_booking() {
            None
        } else {
            Some(requester.user_id)
        };
        self.cancel_inner(id, owner_check).await
    }

    /// Cancel bypassing ownership; reserved for the administrator role.
    pub async fn force_cancel(
        &self,
        id: BookingId,
        requester: &Requester,
    ) -> Result<Booking, EngineError> {
        if !requester.role.can_manage_any_booking() {
            return Err(EngineError::Unauthorized(
                "force-cancel requires an administrator role",
            ));
        }
        self.cancel_inner(id, None).await
    }

    async fn cancel_inner(
        &self,
        id: BookingId,
        owner: Option<UserId>,
    ) -> Result<Booking, EngineError> {
        let current = self.get_booking(id).await?;
        if let Some(user_id) = owner
            && current.user_id != user_id
        {
            return Err(EngineError::Unauthorized(
                "bookings can only be cancelled by their owner",
            ));
        }
        match current.status {
            BookingStatus::Cancelled => return Err(EngineError::AlreadyCancelled(id)),
            BookingStatus::Completed => {
                return Err(EngineError::Validation(
                    "completed bookings cannot be cancelled",
                ));
            }
            BookingStatus::Confirmed => {}
        }
        let cancelled = self
            .store
            .set_status(id, BookingStatus::Cancelled, Utc::now())
            .await?;
        metrics::counter!(observability::BOOKINGS_CANCELLED_TOTAL).increment(1);
        tracing::info!(booking = %id, "booking cancelled");
        Ok(cancelled)
    }

    /// Operator conflict resolution. `cancel` frees the slot, `override`
    /// acknowledges without mutating, `modify` is an explicit stub that
    /// needs data this call does not carry.
    pub async fn resolve_conflict(
        &self,
        id: BookingId,
        action: ResolveAction,
    ) -> Result<Resolution, EngineError> {
        let current = self.get_booking(id).await?;
        match action {
            ResolveAction::Cancel => {
                if current.status == BookingStatus::Cancelled {
                    // Idempotent for operators: the slot is already free.
                    return Ok(Resolution::Cancelled(current));
                }
                if current.status == BookingStatus::Completed {
                    return Err(EngineError::Validation(
                        "completed bookings cannot be cancelled",
                    ));
                }
                let cancelled = self
                    .store
                    .set_status(id, BookingStatus::Cancelled, Utc::now())
                    .await?;
                tracing::info!(booking = %id, "booking cancelled to resolve conflict");
                Ok(Resolution::Cancelled(cancelled))
            }
            ResolveAction::Override => Ok(Resolution::Overridden(id)),
            ResolveAction::Modify => Err(EngineError::RequiresAdditionalData(
                "modify requires replacement booking data",
            )),
        }
    }

    /// Finalize a stuck booking. Only Confirmed rows can be unblocked.
    pub async fn unblock(
        &self,
        id: BookingId,
        action: UnblockAction,
    ) -> Result<Booking, EngineError> {
        let current = self.get_booking(id).await?;
        if current.status != BookingStatus::Confirmed {
            return Err(EngineError::Validation(
                "only confirmed bookings can be unblocked",
            ));
        }
        let status = match action {
            UnblockAction::Complete => BookingStatus::Completed,
            UnblockAction::Cancel => BookingStatus::Cancelled,
        };
        let updated = self.store.set_status(id, status, Utc::now()).await?;
        tracing::info!(booking = %id, status = %updated.status, "stuck booking unblocked");
        Ok(updated)
    }
}
