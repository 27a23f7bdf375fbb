mod memory;
mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::model::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A uniqueness or occupied-range constraint rejected the write.
    Conflict,
    Unavailable(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Conflict => write!(f, "write rejected by a constraint"),
            StoreError::Unavailable(e) => write!(f, "store unavailable: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}

pub type StoreResult<T> = Result<T, StoreError>;

/// The hosted database as seen by the booking engine.
///
/// Implementations must make `insert_time_slot` and `set_occupied` atomic
/// with respect to the occupied-range invariant: an occupied span never
/// overlaps another occupied span of the same date.
#[async_trait]
pub trait Store: Send + Sync {
    /// Active services, cheapest first.
    async fn active_services(&self) -> StoreResult<Vec<Service>>;
    /// Active barbers, ordered by name.
    async fn active_barbers(&self) -> StoreResult<Vec<Barber>>;
    async fn service(&self, id: ServiceId) -> StoreResult<Option<Service>>;
    async fn barber(&self, id: BarberId) -> StoreResult<Option<Barber>>;
    async fn date_availability(&self, id: DateId) -> StoreResult<Option<DateAvailability>>;
    /// Available dates of a barber on or after `from`, ascending.
    async fn available_dates(
        &self,
        barber_id: BarberId,
        from: NaiveDate,
    ) -> StoreResult<Vec<DateAvailability>>;

    /// All time slot rows of a barber's date, ordered by `slot_start`.
    async fn time_slots(&self, barber_id: BarberId, date_id: DateId) -> StoreResult<Vec<TimeSlot>>;
    async fn time_slot(&self, id: TimeSlotId) -> StoreResult<Option<TimeSlot>>;
    /// Fails with `Conflict` on a duplicate `(barber, date, slot_start)` or an
    /// occupied span that overlaps another occupied span.
    async fn insert_time_slot(&self, slot: TimeSlot) -> StoreResult<TimeSlotId>;
    /// Compare-and-set on `is_occupied`: applies only if the row's current
    /// value equals `expected`. Returns the number of rows affected (0 or 1).
    /// `slot_size`, when given, is written in the same update.
    async fn set_occupied(
        &self,
        id: TimeSlotId,
        expected: bool,
        occupied: bool,
        slot_size: Option<Slot>,
    ) -> StoreResult<u64>;
    async fn delete_time_slot(&self, id: TimeSlotId) -> StoreResult<u64>;

    async fn insert_booking(&self, booking: Booking) -> StoreResult<BookingId>;
    async fn booking(&self, id: BookingId) -> StoreResult<Option<Booking>>;
    /// All bookings, newest first.
    async fn bookings(&self) -> StoreResult<Vec<Booking>>;
    /// Bookings made with `phone`, newest first.
    async fn bookings_by_phone(&self, phone: &str) -> StoreResult<Vec<Booking>>;
    async fn update_booking_status(&self, id: BookingId, status: BookingStatus) -> StoreResult<u64>;
    async fn delete_booking(&self, id: BookingId) -> StoreResult<u64>;
}
