use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::DashMap;

use crate::model::*;

use super::{Store, StoreError, StoreResult};

/// DashMap-backed store. Time slots are grouped per date so that every claim
/// on a date runs under that entry's shard lock, which makes the occupied-range
/// check and the write a single step.
pub struct InMemoryStore {
    services: DashMap<ServiceId, Service>,
    barbers: DashMap<BarberId, Barber>,
    dates: DashMap<DateId, DateAvailability>,
    /// Time slots per date, sorted by `slot_start`.
    slots: DashMap<DateId, Vec<TimeSlot>>,
    /// Reverse lookup: time slot id → date id.
    slot_to_date: DashMap<TimeSlotId, DateId>,
    bookings: DashMap<BookingId, Booking>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            services: DashMap::new(),
            barbers: DashMap::new(),
            dates: DashMap::new(),
            slots: DashMap::new(),
            slot_to_date: DashMap::new(),
            bookings: DashMap::new(),
        }
    }

    pub fn from_seed(seed: Seed) -> Self {
        let store = Self::new();
        for s in seed.services {
            store.put_service(s);
        }
        for b in seed.barbers {
            store.put_barber(b);
        }
        for d in seed.dates {
            store.put_date(d);
        }
        for slot in seed.time_slots {
            let id = slot.id;
            if let Err(e) = store.insert_slot_row(slot) {
                tracing::warn!("seed: skipping time slot {id}: {e}");
            }
        }
        store
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        let seed: Seed = serde_json::from_str(json)?;
        Ok(Self::from_seed(seed))
    }

    // ── Provisioning ─────────────────────────────────────────

    pub fn put_service(&self, service: Service) {
        self.services.insert(service.id, service);
    }

    pub fn put_barber(&self, barber: Barber) {
        self.barbers.insert(barber.id, barber);
    }

    pub fn put_date(&self, date: DateAvailability) {
        self.dates.insert(date.id, date);
    }

    pub fn remove_date(&self, id: &DateId) {
        self.dates.remove(id);
    }

    pub fn remove_barber(&self, id: &BarberId) {
        self.barbers.remove(id);
    }

    // ── Slot rows ────────────────────────────────────────────

    fn insert_slot_row(&self, slot: TimeSlot) -> StoreResult<TimeSlotId> {
        let id = slot.id;
        if self.slot_to_date.contains_key(&id) {
            return Err(StoreError::Conflict);
        }
        let mut rows = self.slots.entry(slot.date_id).or_default();
        if rows
            .iter()
            .any(|r| r.barber_id == slot.barber_id && r.slot_start == slot.slot_start)
        {
            return Err(StoreError::Conflict);
        }
        if slot.is_occupied && overlaps_occupied(&rows, &slot.span(), slot.barber_id, None) {
            return Err(StoreError::Conflict);
        }
        let pos = rows
            .binary_search_by_key(&slot.slot_start, |r| r.slot_start)
            .unwrap_or_else(|e| e);
        self.slot_to_date.insert(id, slot.date_id);
        rows.insert(pos, slot);
        Ok(id)
    }
}

/// True if `span` overlaps an occupied row of `barber_id`, ignoring `except`.
fn overlaps_occupied(
    rows: &[TimeSlot],
    span: &SlotRange,
    barber_id: BarberId,
    except: Option<TimeSlotId>,
) -> bool {
    rows.iter().any(|r| {
        r.is_occupied
            && r.barber_id == barber_id
            && Some(r.id) != except
            && r.span().overlaps(span)
    })
}

fn newest_first(bookings: &mut [Booking]) {
    bookings.sort_by(|a, b| b.booked_in.cmp(&a.booked_in).then(b.id.cmp(&a.id)));
}

#[async_trait]
impl Store for InMemoryStore {
    async fn active_services(&self) -> StoreResult<Vec<Service>> {
        let mut services: Vec<Service> = self
            .services
            .iter()
            .filter(|e| e.is_active)
            .map(|e| e.value().clone())
            .collect();
        services.sort_by(|a, b| a.price.total_cmp(&b.price).then_with(|| a.name.cmp(&b.name)));
        Ok(services)
    }

    async fn active_barbers(&self) -> StoreResult<Vec<Barber>> {
        let mut barbers: Vec<Barber> = self
            .barbers
            .iter()
            .filter(|e| e.is_active)
            .map(|e| e.value().clone())
            .collect();
        barbers.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(barbers)
    }

    async fn service(&self, id: ServiceId) -> StoreResult<Option<Service>> {
        Ok(self.services.get(&id).map(|e| e.value().clone()))
    }

    async fn barber(&self, id: BarberId) -> StoreResult<Option<Barber>> {
        Ok(self.barbers.get(&id).map(|e| e.value().clone()))
    }

    async fn date_availability(&self, id: DateId) -> StoreResult<Option<DateAvailability>> {
        Ok(self.dates.get(&id).map(|e| e.value().clone()))
    }

    async fn available_dates(
        &self,
        barber_id: BarberId,
        from: NaiveDate,
    ) -> StoreResult<Vec<DateAvailability>> {
        let mut dates: Vec<DateAvailability> = self
            .dates
            .iter()
            .filter(|e| e.barber_id == barber_id && e.is_available && e.date >= from)
            .map(|e| e.value().clone())
            .collect();
        dates.sort_by(|a, b| a.date.cmp(&b.date).then(a.slot_start.cmp(&b.slot_start)));
        Ok(dates)
    }

    async fn time_slots(&self, barber_id: BarberId, date_id: DateId) -> StoreResult<Vec<TimeSlot>> {
        Ok(self
            .slots
            .get(&date_id)
            .map(|rows| {
                rows.iter()
                    .filter(|r| r.barber_id == barber_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn time_slot(&self, id: TimeSlotId) -> StoreResult<Option<TimeSlot>> {
        let Some(date_id) = self.slot_to_date.get(&id).map(|e| *e.value()) else {
            return Ok(None);
        };
        Ok(self
            .slots
            .get(&date_id)
            .and_then(|rows| rows.iter().find(|r| r.id == id).cloned()))
    }

    async fn insert_time_slot(&self, slot: TimeSlot) -> StoreResult<TimeSlotId> {
        self.insert_slot_row(slot)
    }

    async fn set_occupied(
        &self,
        id: TimeSlotId,
        expected: bool,
        occupied: bool,
        slot_size: Option<Slot>,
    ) -> StoreResult<u64> {
        let Some(date_id) = self.slot_to_date.get(&id).map(|e| *e.value()) else {
            return Ok(0);
        };
        let Some(mut rows) = self.slots.get_mut(&date_id) else {
            return Ok(0);
        };
        let Some(pos) = rows.iter().position(|r| r.id == id) else {
            return Ok(0);
        };
        if rows[pos].is_occupied != expected {
            return Ok(0);
        }

        let size = slot_size.unwrap_or(rows[pos].slot_size);
        if occupied {
            let span = SlotRange::new(rows[pos].slot_start, rows[pos].slot_start + size.max(0));
            if overlaps_occupied(&rows, &span, rows[pos].barber_id, Some(id)) {
                return Err(StoreError::Conflict);
            }
        }

        let row = &mut rows[pos];
        row.is_occupied = occupied;
        row.slot_size = size;
        Ok(1)
    }

    async fn delete_time_slot(&self, id: TimeSlotId) -> StoreResult<u64> {
        let Some((_, date_id)) = self.slot_to_date.remove(&id) else {
            return Ok(0);
        };
        let Some(mut rows) = self.slots.get_mut(&date_id) else {
            return Ok(0);
        };
        let before = rows.len();
        rows.retain(|r| r.id != id);
        Ok((before - rows.len()) as u64)
    }

    async fn insert_booking(&self, booking: Booking) -> StoreResult<BookingId> {
        let id = booking.id;
        match self.bookings.entry(id) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(StoreError::Conflict),
            dashmap::mapref::entry::Entry::Vacant(v) => {
                v.insert(booking);
                Ok(id)
            }
        }
    }

    async fn booking(&self, id: BookingId) -> StoreResult<Option<Booking>> {
        Ok(self.bookings.get(&id).map(|e| e.value().clone()))
    }

    async fn bookings(&self) -> StoreResult<Vec<Booking>> {
        let mut all: Vec<Booking> = self.bookings.iter().map(|e| e.value().clone()).collect();
        newest_first(&mut all);
        Ok(all)
    }

    async fn bookings_by_phone(&self, phone: &str) -> StoreResult<Vec<Booking>> {
        let mut found: Vec<Booking> = self
            .bookings
            .iter()
            .filter(|e| e.phone == phone)
            .map(|e| e.value().clone())
            .collect();
        newest_first(&mut found);
        Ok(found)
    }

    async fn update_booking_status(&self, id: BookingId, status: BookingStatus) -> StoreResult<u64> {
        match self.bookings.get_mut(&id) {
            Some(mut b) => {
                b.status = status;
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn delete_booking(&self, id: BookingId) -> StoreResult<u64> {
        Ok(self.bookings.remove(&id).map_or(0, |_| 1))
    }
}
