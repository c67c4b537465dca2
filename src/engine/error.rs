use crate::model::{BookingId, RoomId, UserId};

use super::store::StoreError;

/// Error taxonomy for the booking core. NotFound, Unauthorized and Storage
/// are deliberately distinct variants — callers must never have to guess
/// which of the three an empty result meant.
#[derive(Debug)]
pub enum EngineError {
    Validation(&'static str),
    BookingNotFound(BookingId),
    UserNotFound(UserId),
    RoomNotFound(RoomId),
    Unauthorized(&'static str),
    /// The requested slot overlaps an active booking (carries the blocker).
    Conflict(BookingId),
    AlreadyCancelled(BookingId),
    /// The `modify` resolution action is a stub: it needs replacement
    /// booking data the conflict endpoint does not carry.
    RequiresAdditionalData(&'static str),
    /// Datastore failure. Availability checks surfacing this are
    /// indeterminate, never "available".
    Storage(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Validation(msg) => write!(f, "validation: {msg}"),
            EngineError::BookingNotFound(id) => write!(f, "booking not found: {id}"),
            EngineError::UserNotFound(id) => write!(f, "user not found: {id}"),
            EngineError::RoomNotFound(id) => {
                write!(f, "room not found or not available: {id}")
            }
            EngineError::Unauthorized(msg) => write!(f, "unauthorized: {msg}"),
            EngineError::Conflict(id) => {
                write!(f, "room is not available for the requested slot, blocked by booking {id}")
            }
            EngineError::AlreadyCancelled(id) => {
                write!(f, "booking {id} is already cancelled")
            }
            EngineError::RequiresAdditionalData(msg) => {
                write!(f, "requires additional data: {msg}")
            }
            EngineError::Storage(e) => write!(f, "storage error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Overlap { blocking } => EngineError::Conflict(blocking),
            StoreError::NotFound(id) => EngineError::BookingNotFound(id),
            StoreError::Backend(msg) => EngineError::Storage(msg),
        }
    }
}
