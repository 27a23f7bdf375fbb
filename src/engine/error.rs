use ulid::Ulid;

use crate::model::Slot;
use crate::store::StoreError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookingError {
    /// The chosen start became occupied before it could be claimed.
    SlotConflict(Slot),
    /// Bad customer input or a selection that is no longer valid.
    Validation(String),
    StoreUnavailable(String),
    /// A referenced barber or date disappeared mid-flow.
    InvariantViolation(String),
    NotFound(Ulid),
}

impl BookingError {
    /// One sentence suitable for showing to the customer or admin.
    pub fn user_message(&self) -> &'static str {
        match self {
            BookingError::SlotConflict(_) => {
                "This time is no longer available. Please choose another time."
            }
            BookingError::Validation(_) => "Please check the booking details and try again.",
            BookingError::StoreUnavailable(_) => {
                "We could not reach the booking system. Please try again in a moment."
            }
            BookingError::InvariantViolation(_) => {
                "Something went wrong with this booking. Please start over."
            }
            BookingError::NotFound(_) => "That booking no longer exists.",
        }
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            BookingError::SlotConflict(_) => "slot_conflict",
            BookingError::Validation(_) => "validation",
            BookingError::StoreUnavailable(_) => "store_unavailable",
            BookingError::InvariantViolation(_) => "invariant_violation",
            BookingError::NotFound(_) => "not_found",
        }
    }

    /// SQLSTATE reported on the wire.
    pub fn sqlstate(&self) -> &'static str {
        match self {
            BookingError::SlotConflict(_) => "23P01",
            BookingError::Validation(_) => "22023",
            BookingError::StoreUnavailable(_) => "08006",
            BookingError::InvariantViolation(_) => "XX000",
            BookingError::NotFound(_) => "P0002",
        }
    }
}

impl std::fmt::Display for BookingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BookingError::SlotConflict(slot) => {
                write!(f, "slot conflict at {}", crate::model::slot_to_time(*slot))
            }
            BookingError::Validation(msg) => write!(f, "validation error: {msg}"),
            BookingError::StoreUnavailable(e) => write!(f, "store unavailable: {e}"),
            BookingError::InvariantViolation(msg) => write!(f, "invariant violation: {msg}"),
            BookingError::NotFound(id) => write!(f, "not found: {id}"),
        }
    }
}

impl std::error::Error for BookingError {}

/// Plain reads and writes outside a claim: a constraint rejection there means
/// the store and the engine disagree, which the caller cannot fix.
impl From<StoreError> for BookingError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict => BookingError::StoreUnavailable(e.to_string()),
            StoreError::Unavailable(msg) => BookingError::StoreUnavailable(msg),
        }
    }
}
