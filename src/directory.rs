//! Local user and room directory.
//!
//! The authoritative records live in the remote users and rooms services;
//! this directory holds the locally replicated copies the existence checks
//! fall back to when a remote service is unreachable.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::model::{RoomId, UserId};

#[derive(Debug)]
pub struct DirectoryError(pub String);

impl std::fmt::Display for DirectoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "directory error: {}", self.0)
    }
}

impl std::error::Error for DirectoryError {}

/// Read side of a local directory, as seen by the existence fallback.
#[async_trait]
pub trait DirectoryRead: Send + Sync {
    async fn exists(&self, id: u64) -> Result<bool, DirectoryError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub user_id: UserId,
    pub username: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    Available,
    Maintenance,
    Unavailable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomRecord {
    pub room_id: RoomId,
    pub name: String,
    pub status: RoomStatus,
}

/// Replicated directory contents. Rooms carry a status: a room under
/// maintenance is present but not bookable, and the fallback reports it
/// the same way the rooms service would.
#[derive(Default)]
pub struct Directory {
    users: DashMap<UserId, UserRecord>,
    rooms: DashMap<RoomId, RoomRecord>,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_user(&self, record: UserRecord) {
        self.users.insert(record.user_id, record);
    }

    pub fn insert_room(&self, record: RoomRecord) {
        self.rooms.insert(record.room_id, record);
    }

    pub fn user_exists(&self, user_id: UserId) -> bool {
        self.users.contains_key(&user_id)
    }

    pub fn room_exists(&self, room_id: RoomId) -> bool {
        self.rooms.contains_key(&room_id)
    }

    pub fn room_bookable(&self, room_id: RoomId) -> bool {
        self.rooms
            .get(&room_id)
            .is_some_and(|r| r.status == RoomStatus::Available)
    }
}

/// User-side read view over a shared [`Directory`].
pub struct UserLookup(pub Arc<Directory>);

#[async_trait]
impl DirectoryRead for UserLookup {
    async fn exists(&self, id: u64) -> Result<bool, DirectoryError> {
        Ok(self.0.user_exists(id))
    }
}

/// Room-side read view. "Exists" here means bookable.
pub struct RoomLookup(pub Arc<Directory>);

#[async_trait]
impl DirectoryRead for RoomLookup {
    async fn exists(&self, id: u64) -> Result<bool, DirectoryError> {
        Ok(self.0.room_bookable(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> Arc<Directory> {
        let dir = Directory::new();
        dir.insert_user(UserRecord {
            user_id: 7,
            username: "ada".into(),
        });
        dir.insert_room(RoomRecord {
            room_id: 1,
            name: "Boardroom".into(),
            status: RoomStatus::Available,
        });
        dir.insert_room(RoomRecord {
            room_id: 2,
            name: "Annex".into(),
            status: RoomStatus::Maintenance,
        });
        Arc::new(dir)
    }

    #[tokio::test]
    async fn user_lookup_matches_directory() {
        let users = UserLookup(seeded());
        assert!(users.exists(7).await.unwrap());
        assert!(!users.exists(8).await.unwrap());
    }

    #[tokio::test]
    async fn room_lookup_requires_available_status() {
        let rooms = RoomLookup(seeded());
        assert!(rooms.exists(1).await.unwrap());
        // Present but under maintenance: not bookable.
        assert!(!rooms.exists(2).await.unwrap());
        assert!(!rooms.exists(3).await.unwrap());
    }
}
