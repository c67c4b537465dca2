mod availability;
mod error;
mod mutations;
mod queries;
pub mod store;

pub use availability::conflicting;
pub use error::EngineError;
pub use mutations::Resolution;
pub use store::{BookingStore, MemoryStore, StoreError};

use std::sync::Arc;

use crate::existence::ExistenceChecker;

/// The booking core: availability, lifecycle, conflict resolution and
/// stuck-booking recovery over a [`BookingStore`], with user/room existence
/// routed through per-dependency circuit breakers.
pub struct Engine {
    store: Arc<dyn BookingStore>,
    users: ExistenceChecker,
    rooms: ExistenceChecker,
}

impl Engine {
    pub fn new(
        store: Arc<dyn BookingStore>,
        users: ExistenceChecker,
        rooms: ExistenceChecker,
    ) -> Self {
        Self { store, users, rooms }
    }

    pub fn store(&self) -> &Arc<dyn BookingStore> {
        &self.store
    }
}
