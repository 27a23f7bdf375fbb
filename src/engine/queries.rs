use std::collections::HashMap;

use chrono::NaiveDate;

use crate::limits::MAX_SEARCH_LEN;
use crate::model::*;

use super::availability::{allowed_ranges, compute_available_start_times, occupied_indices};
use super::{BookingError, Engine};

impl Engine {
    pub async fn list_services(&self) -> Result<Vec<Service>, BookingError> {
        Ok(self.store.active_services().await?)
    }

    pub async fn list_barbers(&self) -> Result<Vec<Barber>, BookingError> {
        Ok(self.store.active_barbers().await?)
    }

    /// Dates from `today` on where the barber works.
    pub async fn available_dates(
        &self,
        barber_id: BarberId,
        today: NaiveDate,
    ) -> Result<Vec<DateAvailability>, BookingError> {
        Ok(self.store.available_dates(barber_id, today).await?)
    }

    /// Provisioned rows of a date that are still free, ascending.
    pub async fn open_time_slots(
        &self,
        barber_id: BarberId,
        date_id: DateId,
    ) -> Result<Vec<TimeSlot>, BookingError> {
        let mut slots = self.store.time_slots(barber_id, date_id).await?;
        slots.retain(|s| !s.is_occupied);
        Ok(slots)
    }

    /// Start times a customer can pick for `service_id` with this barber on
    /// this date. Inactive barbers and services have none.
    pub async fn available_start_times(
        &self,
        barber_id: BarberId,
        date_id: DateId,
        service_id: ServiceId,
    ) -> Result<Vec<StartTime>, BookingError> {
        let (barber, date) = self.resolve_barber_date(barber_id, date_id).await?;
        let service = self
            .store
            .service(service_id)
            .await?
            .ok_or_else(|| BookingError::Validation(format!("unknown service {service_id}")))?;
        if !barber.is_active || !service.is_active {
            return Ok(Vec::new());
        }

        let slots = self.store.time_slots(barber_id, date_id).await?;
        let starts = compute_available_start_times(
            &allowed_ranges(&date),
            &occupied_indices(&slots),
            service.slot_count(),
        );
        Ok(starts.into_iter().map(StartTime::new).collect())
    }

    /// A customer's bookings, newest first.
    pub async fn customer_bookings(&self, phone: &str) -> Result<Vec<BookingView>, BookingError> {
        let phone = phone.trim();
        if phone.is_empty() {
            return Ok(Vec::new());
        }
        let bookings = self.store.bookings_by_phone(phone).await?;
        self.join_views(bookings).await
    }

    /// Admin listing: newest first, narrowed by status and a free-text search
    /// over customer name, service name and phone.
    pub async fn admin_bookings(&self, filter: &BookingFilter) -> Result<Vec<BookingView>, BookingError> {
        let search = filter
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());
        if let Some(s) = search
            && s.len() > MAX_SEARCH_LEN
        {
            return Err(BookingError::Validation("search too long".into()));
        }

        let mut bookings = self.store.bookings().await?;
        if let Some(status) = filter.status {
            bookings.retain(|b| b.status == status);
        }
        let mut views = self.join_views(bookings).await?;
        if let Some(s) = search {
            views.retain(|v| matches_search(v, s));
        }
        Ok(views)
    }

    pub async fn status_counts(&self) -> Result<StatusCounts, BookingError> {
        let mut counts = StatusCounts::default();
        for b in self.store.bookings().await? {
            counts.total += 1;
            match b.status {
                BookingStatus::Pending => counts.pending += 1,
                BookingStatus::Confirmed => counts.confirmed += 1,
                BookingStatus::Cancelled => counts.cancelled += 1,
                BookingStatus::Completed => counts.completed += 1,
            }
        }
        Ok(counts)
    }

    /// Attach barber, service, slot and date to each booking. Lookups are
    /// memoised per call since many bookings share a barber or service.
    ///
    /// The slot span is the row's start plus the booking's own service
    /// length. A cancelled booking's row may since have been reused and
    /// resized by another booking.
    async fn join_views(&self, bookings: Vec<Booking>) -> Result<Vec<BookingView>, BookingError> {
        let mut barbers: HashMap<BarberId, Option<String>> = HashMap::new();
        let mut services: HashMap<ServiceId, Option<(String, u32)>> = HashMap::new();
        let mut dates: HashMap<DateId, Option<NaiveDate>> = HashMap::new();

        let mut views = Vec::with_capacity(bookings.len());
        for booking in bookings {
            let barber_name = match barbers.get(&booking.barber) {
                Some(name) => name.clone(),
                None => {
                    let name = self.store.barber(booking.barber).await?.map(|b| b.name);
                    barbers.insert(booking.barber, name.clone());
                    name
                }
            };

            let service = match booking.service {
                None => None,
                Some(sid) => match services.get(&sid) {
                    Some(found) => found.clone(),
                    None => {
                        let found = self
                            .store
                            .service(sid)
                            .await?
                            .map(|s| {
                                let units = s.slot_count();
                                (s.name, units)
                            });
                        services.insert(sid, found.clone());
                        found
                    }
                },
            };

            let time_slot = self.store.time_slot(booking.time_slot).await?;
            let date = match &time_slot {
                None => None,
                Some(ts) => match dates.get(&ts.date_id) {
                    Some(d) => *d,
                    None => {
                        let d = self.store.date_availability(ts.date_id).await?.map(|d| d.date);
                        dates.insert(ts.date_id, d);
                        d
                    }
                },
            };

            let slot = time_slot.map(|ts| match &service {
                Some((_, units)) if *units > 0 => {
                    SlotRange::new(ts.slot_start, ts.slot_start.saturating_add(*units as Slot))
                }
                _ => ts.span(),
            });
            views.push(BookingView {
                booking,
                barber_name,
                service_name: service.map(|(name, _)| name),
                date,
                slot,
            });
        }
        Ok(views)
    }
}

fn matches_search(view: &BookingView, search: &str) -> bool {
    let needle = search.to_lowercase();
    view.booking.name.to_lowercase().contains(&needle)
        || view
            .service_name
            .as_deref()
            .is_some_and(|n| n.to_lowercase().contains(&needle))
        || view.booking.phone.contains(search)
}
