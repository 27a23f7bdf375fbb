use chrono::{DateTime, NaiveDate, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::limits::{MAX_REQUIRED_SLOTS, SLOT_MINUTES};

/// Slot index: `SLOT_MINUTES`-sized units counted from midnight.
pub type Slot = i32;

pub type ServiceId = Ulid;
pub type BarberId = Ulid;
pub type DateId = Ulid;
pub type TimeSlotId = Ulid;
pub type BookingId = Ulid;

/// Half-open slot interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotRange {
    pub start: Slot,
    pub end: Slot,
}

impl SlotRange {
    pub fn new(start: Slot, end: Slot) -> Self {
        debug_assert!(start <= end, "SlotRange start must not be after end");
        Self { start, end }
    }

    pub fn len(&self) -> u32 {
        (self.end - self.start).max(0) as u32
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub fn overlaps(&self, other: &SlotRange) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains(&self, slot: Slot) -> bool {
        self.start <= slot && slot < self.end
    }

    /// Returns true if `self` fully contains `other`.
    pub fn contains_range(&self, other: &SlotRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    pub fn indices(&self) -> std::ops::Range<Slot> {
        self.start..self.end
    }
}

/// Render a slot index as the `HH:MM` clock time it starts at.
pub fn slot_to_time(slot: Slot) -> String {
    let minutes = slot.max(0) as u32 * SLOT_MINUTES;
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

/// Parse `HH:MM` into the slot index containing that minute.
pub fn time_to_slot(time: &str) -> Option<Slot> {
    let t = NaiveTime::parse_from_str(time.trim(), "%H:%M").ok()?;
    let minutes = t.hour() * 60 + t.minute();
    Some((minutes / SLOT_MINUTES) as Slot)
}

/// Number of whole slots needed to cover `minutes`.
pub fn slots_for_minutes(minutes: u32) -> u32 {
    minutes.div_ceil(SLOT_MINUTES)
}

// ── Catalogue ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub id: ServiceId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price: f64,
    /// Slot units consumed. Stored as a number; may be fractional.
    pub required_slots: f64,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl Service {
    /// `required_slots` rounded up to whole units. Non-positive counts give 0.
    pub fn slot_count(&self) -> u32 {
        if self.required_slots.is_nan() || self.required_slots <= 0.0 {
            return 0;
        }
        let units = self.required_slots.ceil();
        if units >= MAX_REQUIRED_SLOTS as f64 {
            MAX_REQUIRED_SLOTS
        } else {
            units as u32
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Barber {
    pub id: BarberId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

/// A barber's working window on one calendar date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateAvailability {
    pub id: DateId,
    pub barber_id: BarberId,
    pub date: NaiveDate,
    pub slot_start: Slot,
    pub slot_end: Slot,
    #[serde(default = "default_true")]
    pub is_available: bool,
}

impl DateAvailability {
    pub fn window(&self) -> SlotRange {
        SlotRange::new(self.slot_start, self.slot_end.max(self.slot_start))
    }
}

/// The unit of occupancy. Either provisioned ahead of time or created when a
/// booking claims it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSlot {
    pub id: TimeSlotId,
    pub barber_id: BarberId,
    pub date_id: DateId,
    pub slot_start: Slot,
    pub slot_size: Slot,
    #[serde(default)]
    pub is_occupied: bool,
}

impl TimeSlot {
    pub fn span(&self) -> SlotRange {
        SlotRange::new(self.slot_start, self.slot_start + self.slot_size.max(0))
    }
}

fn default_true() -> bool {
    true
}

// ── Bookings ─────────────────────────────────────────────────────

/// How much the customer chose to pay upfront.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentOption {
    Half,
    Full,
}

impl PaymentOption {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentOption::Half => "half",
            PaymentOption::Full => "full",
        }
    }

    /// Accepts `half`/`full` as well as the percentages `50`/`100`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "half" | "50" => Some(PaymentOption::Half),
            "full" | "100" => Some(PaymentOption::Full),
            _ => None,
        }
    }

    pub fn upfront_amount(&self, price: f64) -> f64 {
        match self {
            PaymentOption::Half => price * 0.5,
            PaymentOption::Full => price,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Paid,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Some(PaymentStatus::Pending),
            "paid" => Some(PaymentStatus::Paid),
            _ => None,
        }
    }
}

/// Admin workflow state of a booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Some(BookingStatus::Pending),
            "confirmed" => Some(BookingStatus::Confirmed),
            "cancelled" | "canceled" => Some(BookingStatus::Cancelled),
            "completed" => Some(BookingStatus::Completed),
            _ => None,
        }
    }

    pub fn can_transition_to(&self, to: BookingStatus) -> bool {
        use BookingStatus::*;
        matches!(
            (self, to),
            (Pending, Confirmed)
                | (Pending, Cancelled)
                | (Confirmed, Completed)
                | (Cancelled, Pending)
                | (Completed, Pending)
        )
    }

    /// Whether a booking in this state keeps its time slot occupied.
    pub fn holds_slot(&self) -> bool {
        !matches!(self, BookingStatus::Cancelled)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub name: String,
    pub phone: String,
    pub time_slot: TimeSlotId,
    pub barber: BarberId,
    pub service: Option<ServiceId>,
    pub observation: Option<String>,
    pub payment_option: Option<PaymentOption>,
    pub payment_status: PaymentStatus,
    pub status: BookingStatus,
    pub booked_in: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Customer {
    pub name: String,
    pub phone: String,
}

/// Everything the confirmation step submits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingRequest {
    pub barber_id: BarberId,
    pub date_id: DateId,
    pub slot_start: Slot,
    pub service_id: ServiceId,
    pub customer: Customer,
    pub notes: Option<String>,
    pub payment_option: Option<PaymentOption>,
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartTime {
    pub slot: Slot,
    pub time: String,
}

impl StartTime {
    pub fn new(slot: Slot) -> Self {
        Self {
            slot,
            time: slot_to_time(slot),
        }
    }
}

/// A booking joined with the rows it references. Joined fields are `None`
/// when the referenced row no longer exists.
#[derive(Debug, Clone, PartialEq)]
pub struct BookingView {
    pub booking: Booking,
    pub barber_name: Option<String>,
    pub service_name: Option<String>,
    pub date: Option<NaiveDate>,
    pub slot: Option<SlotRange>,
}

impl BookingView {
    pub fn time(&self) -> Option<String> {
        self.slot.map(|s| slot_to_time(s.start))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub total: usize,
    pub pending: usize,
    pub confirmed: usize,
    pub cancelled: usize,
    pub completed: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookingFilter {
    pub status: Option<BookingStatus>,
    pub search: Option<String>,
}

/// Provisioning bundle for the in-memory store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Seed {
    #[serde(default)]
    pub services: Vec<Service>,
    #[serde(default)]
    pub barbers: Vec<Barber>,
    #[serde(default)]
    pub dates: Vec<DateAvailability>,
    #[serde(default)]
    pub time_slots: Vec<TimeSlot>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_basics() {
        let r = SlotRange::new(10, 20);
        assert_eq!(r.len(), 10);
        assert!(r.contains(10));
        assert!(r.contains(19));
        assert!(!r.contains(20)); // half-open
        assert!(SlotRange::new(5, 5).is_empty());
    }

    #[test]
    fn range_overlap() {
        let a = SlotRange::new(0, 10);
        let b = SlotRange::new(5, 15);
        let c = SlotRange::new(10, 20);
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c)); // adjacent, not overlapping
        assert!(a.contains_range(&SlotRange::new(2, 10)));
        assert!(!a.contains_range(&b));
    }

    #[test]
    fn slot_clock_conversion() {
        assert_eq!(slot_to_time(0), "00:00");
        assert_eq!(slot_to_time(1), "00:05");
        assert_eq!(slot_to_time(108), "09:00");
        assert_eq!(slot_to_time(115), "09:35");
        assert_eq!(slot_to_time(287), "23:55");

        assert_eq!(time_to_slot("09:00"), Some(108));
        assert_eq!(time_to_slot("09:37"), Some(115)); // floors to the unit
        assert_eq!(time_to_slot("24:00"), None);
        assert_eq!(time_to_slot("nine"), None);
    }

    #[test]
    fn minutes_round_up_to_slots() {
        assert_eq!(slots_for_minutes(0), 0);
        assert_eq!(slots_for_minutes(5), 1);
        assert_eq!(slots_for_minutes(31), 7);
        assert_eq!(slots_for_minutes(45), 9);
    }

    fn service(required_slots: f64) -> Service {
        Service {
            id: Ulid::new(),
            name: "Corte".into(),
            description: None,
            price: 40.0,
            required_slots,
            is_active: true,
        }
    }

    #[test]
    fn service_slot_count_rounds_up() {
        assert_eq!(service(6.0).slot_count(), 6);
        assert_eq!(service(2.2).slot_count(), 3);
        assert_eq!(service(0.0).slot_count(), 0);
        assert_eq!(service(-3.0).slot_count(), 0);
        assert_eq!(service(f64::NAN).slot_count(), 0);
        assert_eq!(service(10_000.0).slot_count(), MAX_REQUIRED_SLOTS);
    }

    #[test]
    fn status_transitions() {
        use BookingStatus::*;
        assert!(Pending.can_transition_to(Confirmed));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Confirmed.can_transition_to(Completed));
        assert!(Cancelled.can_transition_to(Pending));
        assert!(Completed.can_transition_to(Pending));
        assert!(!Confirmed.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(Cancelled));
        assert!(!Pending.can_transition_to(Pending));
    }

    #[test]
    fn payment_option_parsing() {
        assert_eq!(PaymentOption::parse("50"), Some(PaymentOption::Half));
        assert_eq!(PaymentOption::parse("FULL"), Some(PaymentOption::Full));
        assert_eq!(PaymentOption::parse("25"), None);
        assert_eq!(PaymentOption::Half.upfront_amount(45.0), 22.5);
    }

    #[test]
    fn seed_from_json() {
        let json = r#"{
            "barbers": [{"id": "01ARZ3NDEKTSV4RRFFQ69G5FAV", "name": "Rafa"}],
            "dates": [{
                "id": "01ARZ3NDEKTSV4RRFFQ69G5FAW",
                "barber_id": "01ARZ3NDEKTSV4RRFFQ69G5FAV",
                "date": "2026-10-20",
                "slot_start": 108,
                "slot_end": 216
            }]
        }"#;
        let seed: Seed = serde_json::from_str(json).unwrap();
        assert_eq!(seed.barbers.len(), 1);
        assert!(seed.barbers[0].is_active);
        assert!(seed.dates[0].is_available);
        assert_eq!(seed.dates[0].window(), SlotRange::new(108, 216));
        assert!(seed.services.is_empty());
    }
}
