use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Booking identity.
pub type BookingId = Ulid;
/// External identity space shared with the users service.
pub type UserId = u64;
/// External identity space shared with the rooms service.
pub type RoomId = u64;

/// Half-open time-of-day interval `[start, end)`, second resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSlot {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeSlot {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    /// `start < end` — zero-length slots are rejected at the engine boundary.
    pub fn is_well_formed(&self) -> bool {
        self.start < self.end
    }

    /// Two slots overlap iff `a.start < b.end && a.end > b.start`.
    /// Slots that merely touch at an endpoint do not overlap, so
    /// back-to-back bookings are legal.
    pub fn overlaps(&self, other: &TimeSlot) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_instant(&self, t: NaiveTime) -> bool {
        self.start <= t && t < self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingStatus {
    Confirmed,
    Cancelled,
    Completed,
}

impl BookingStatus {
    /// Cancelled and Completed are terminal — no further transition defined.
    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Cancelled | BookingStatus::Completed)
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BookingStatus::Confirmed => write!(f, "Confirmed"),
            BookingStatus::Cancelled => write!(f, "Cancelled"),
            BookingStatus::Completed => write!(f, "Completed"),
        }
    }
}

/// A booking row. Never physically deleted — cancelled rows are kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub user_id: UserId,
    pub room_id: RoomId,
    pub date: NaiveDate,
    pub slot: TimeSlot,
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    /// Active bookings are the ones that count for overlap checks.
    pub fn is_active(&self) -> bool {
        self.status != BookingStatus::Cancelled
    }
}

/// Partial update for a booking. Absent fields default to the stored values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookingPatch {
    pub room_id: Option<RoomId>,
    pub date: Option<NaiveDate>,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub status: Option<BookingStatus>,
}

/// Closed set of request roles, resolved once per request by the API layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Member,
    Admin,
}

impl Role {
    /// Admins may act on bookings they do not own.
    pub fn can_manage_any_booking(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

/// The principal behind a lifecycle call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Requester {
    pub user_id: UserId,
    pub role: Role,
}

impl Requester {
    pub fn member(user_id: UserId) -> Self {
        Self { user_id, role: Role::Member }
    }

    pub fn admin(user_id: UserId) -> Self {
        Self { user_id, role: Role::Admin }
    }
}

/// Operator action for resolving a booking conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveAction {
    Cancel,
    Override,
    Modify,
}

impl std::str::FromStr for ResolveAction {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cancel" => Ok(ResolveAction::Cancel),
            "override" => Ok(ResolveAction::Override),
            "modify" => Ok(ResolveAction::Modify),
            _ => Err("invalid resolution action, use 'cancel', 'modify' or 'override'"),
        }
    }
}

/// Operator action for unblocking a stuck booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnblockAction {
    Complete,
    Cancel,
}

impl std::str::FromStr for UnblockAction {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "complete" => Ok(UnblockAction::Complete),
            "cancel" => Ok(UnblockAction::Cancel),
            _ => Err("invalid action, use 'complete' or 'cancel'"),
        }
    }
}

/// All bookings of one room, sorted by `(date, slot.start)`.
#[derive(Debug, Clone)]
pub struct RoomState {
    pub room_id: RoomId,
    pub bookings: Vec<Booking>,
}

impl RoomState {
    pub fn new(room_id: RoomId) -> Self {
        Self { room_id, bookings: Vec::new() }
    }

    /// Insert maintaining sort order by `(date, slot.start)`.
    pub fn insert(&mut self, booking: Booking) {
        let key = (booking.date, booking.slot.start);
        let pos = self
            .bookings
            .binary_search_by_key(&key, |b| (b.date, b.slot.start))
            .unwrap_or_else(|e| e);
        self.bookings.insert(pos, booking);
    }

    pub fn remove(&mut self, id: BookingId) -> Option<Booking> {
        if let Some(pos) = self.bookings.iter().position(|b| b.id == id) {
            Some(self.bookings.remove(pos))
        } else {
            None
        }
    }

    pub fn get(&self, id: BookingId) -> Option<&Booking> {
        self.bookings.iter().find(|b| b.id == id)
    }

    pub fn get_mut(&mut self, id: BookingId) -> Option<&mut Booking> {
        self.bookings.iter_mut().find(|b| b.id == id)
    }

    /// Bookings on `date` whose slot overlaps the query window.
    /// Uses binary search to skip rows sorted at or after `(date, query.end)`.
    pub fn overlapping<'a>(
        &'a self,
        date: NaiveDate,
        query: &'a TimeSlot,
    ) -> impl Iterator<Item = &'a Booking> {
        let right_bound = self
            .bookings
            .partition_point(|b| (b.date, b.slot.start) < (date, query.end));
        self.bookings[..right_bound]
            .iter()
            .filter(move |b| b.date == date && b.slot.end > query.start)
    }

    /// All rows on `date`, regardless of status, in slot order.
    pub fn on_date(&self, date: NaiveDate) -> impl Iterator<Item = &Booking> {
        self.bookings.iter().filter(move |b| b.date == date)
    }
}
