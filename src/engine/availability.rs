use crate::model::*;

use super::EngineError;

/// Caller-input check: slots must be non-empty and forward.
/// Zero-length slots are a validation error, not an overlap question.
pub(crate) fn validate_slot(slot: &TimeSlot) -> Result<(), EngineError> {
    if !slot.is_well_formed() {
        return Err(EngineError::Validation("start_time must be before end_time"));
    }
    Ok(())
}

/// Active bookings among `rows` (same room and date) whose slot overlaps
/// `query`, excluding `exclude` so an in-place update does not trip over
/// itself. Cancelled rows never block a slot.
pub fn conflicting<'a>(
    rows: &'a [Booking],
    query: &'a TimeSlot,
    exclude: Option<BookingId>,
) -> impl Iterator<Item = &'a Booking> {
    rows.iter().filter(move |b| {
        b.is_active() && Some(b.id) != exclude && b.slot.overlaps(query)
    })
}
