mod availability;
mod conflict;
mod error;
mod mutations;
mod queries;

pub use availability::{allowed_ranges, compute_available_start_times, merge_ranges, occupied_indices};
pub use error::BookingError;

use std::sync::Arc;

use crate::model::*;
use crate::store::Store;

/// The booking core: resolves open start times and claims slots for bookings
/// against whatever `Store` it is given.
pub struct Engine {
    store: Arc<dyn Store>,
}

impl Engine {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Barber must exist; its date must exist, belong to it, and be open.
    pub(super) async fn resolve_barber_date(
        &self,
        barber_id: BarberId,
        date_id: DateId,
    ) -> Result<(Barber, DateAvailability), BookingError> {
        let barber = self
            .store
            .barber(barber_id)
            .await?
            .ok_or_else(|| BookingError::InvariantViolation(format!("barber {barber_id} disappeared")))?;
        let date = self
            .store
            .date_availability(date_id)
            .await?
            .ok_or_else(|| BookingError::InvariantViolation(format!("date {date_id} disappeared")))?;
        if date.barber_id != barber_id {
            return Err(BookingError::Validation(format!(
                "date {date_id} does not belong to barber {barber_id}"
            )));
        }
        Ok((barber, date))
    }

    /// Service must exist and consume at least one slot.
    pub(super) async fn resolve_service(
        &self,
        service_id: ServiceId,
    ) -> Result<(Service, u32), BookingError> {
        let service = self
            .store
            .service(service_id)
            .await?
            .ok_or_else(|| BookingError::Validation(format!("unknown service {service_id}")))?;
        let required = service.slot_count();
        if required == 0 {
            return Err(BookingError::Validation(format!(
                "service {} has no duration",
                service.name
            )));
        }
        Ok((service, required))
    }
}
