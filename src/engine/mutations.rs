use chrono::Utc;
use tracing::{error, info, warn};
use ulid::Ulid;

use crate::model::*;
use crate::observability;
use crate::store::StoreError;

use super::availability::allowed_ranges;
use super::conflict::{check_no_conflict, validate_customer, validate_range};
use super::{BookingError, Engine};

/// How a booking got hold of its time slot, so a failed insert can undo it.
#[derive(Debug, Clone, Copy)]
enum Claim {
    /// An existing free row was flipped to occupied; `previous_size` restores it.
    Reused { id: TimeSlotId, previous_size: Slot },
    /// A new occupied row was inserted.
    Created { id: TimeSlotId },
}

impl Claim {
    fn id(&self) -> TimeSlotId {
        match self {
            Claim::Reused { id, .. } | Claim::Created { id } => *id,
        }
    }
}

impl Engine {
    /// Claim the slots for a request and persist the booking.
    ///
    /// 1. Validate the customer and the barber/date/service selection.
    /// 2. Re-check occupancy against a fresh read.
    /// 3. Claim: compare-and-set an existing free row at the start index, or
    ///    insert a new occupied row. A lost race surfaces as `SlotConflict`.
    /// 4. Insert the booking. If that fails, undo the claim and return the
    ///    insert's error; a failing undo is logged, never returned.
    pub async fn attempt_booking(&self, req: BookingRequest) -> Result<BookingId, BookingError> {
        let result = self.try_booking(req).await;
        let outcome = match &result {
            Ok(_) => "booked",
            Err(e) => e.kind(),
        };
        metrics::counter!(observability::BOOKING_ATTEMPTS_TOTAL, "outcome" => outcome).increment(1);
        result
    }

    async fn try_booking(&self, req: BookingRequest) -> Result<BookingId, BookingError> {
        let (customer, notes) = validate_customer(&req.customer, req.notes.as_deref())?;

        let (barber, date) = self.resolve_barber_date(req.barber_id, req.date_id).await?;
        if !barber.is_active {
            return Err(BookingError::Validation(format!("barber {} is not taking bookings", barber.name)));
        }
        if !date.is_available {
            return Err(BookingError::Validation(format!("{} is no longer available", date.date)));
        }
        let (service, required) = self.resolve_service(req.service_id).await?;
        if !service.is_active {
            return Err(BookingError::Validation(format!("service {} is not offered", service.name)));
        }

        let start = req.slot_start;
        let range = SlotRange::new(start, start.saturating_add(required as Slot));
        validate_range(&range, &allowed_ranges(&date))?;

        let slots = self.store.time_slots(req.barber_id, req.date_id).await?;
        if let Err(e) = check_no_conflict(&slots, &range) {
            warn!("slot {} for barber {} already occupied", slot_to_time(start), req.barber_id);
            return Err(e);
        }

        let claim = match slots.iter().find(|s| s.slot_start == start) {
            Some(row) => {
                match self
                    .store
                    .set_occupied(row.id, false, true, Some(required as Slot))
                    .await
                {
                    Ok(1) => Claim::Reused {
                        id: row.id,
                        previous_size: row.slot_size,
                    },
                    Ok(_) | Err(StoreError::Conflict) => {
                        warn!("lost race for slot {} of barber {}", slot_to_time(start), req.barber_id);
                        return Err(BookingError::SlotConflict(start));
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            None => {
                let row = TimeSlot {
                    id: Ulid::new(),
                    barber_id: req.barber_id,
                    date_id: req.date_id,
                    slot_start: start,
                    slot_size: required as Slot,
                    is_occupied: true,
                };
                match self.store.insert_time_slot(row).await {
                    Ok(id) => Claim::Created { id },
                    Err(StoreError::Conflict) => {
                        warn!("lost race for slot {} of barber {}", slot_to_time(start), req.barber_id);
                        return Err(BookingError::SlotConflict(start));
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        };

        let booking = Booking {
            id: Ulid::new(),
            name: customer.name,
            phone: customer.phone,
            time_slot: claim.id(),
            barber: req.barber_id,
            service: Some(service.id),
            observation: notes,
            payment_option: req.payment_option,
            payment_status: PaymentStatus::Pending,
            status: BookingStatus::Pending,
            booked_in: Utc::now(),
        };

        match self.store.insert_booking(booking).await {
            Ok(id) => {
                info!(
                    "booking {id}: {} on {} at {} with {}",
                    service.name,
                    date.date,
                    slot_to_time(start),
                    barber.name
                );
                Ok(id)
            }
            Err(e) => {
                error!("booking insert failed after claiming slot {}: {e}", claim.id());
                self.undo_claim(claim).await;
                Err(BookingError::StoreUnavailable(e.to_string()))
            }
        }
    }

    /// Compensating write for a claim whose booking was never stored.
    async fn undo_claim(&self, claim: Claim) {
        metrics::counter!(observability::BOOKING_ROLLBACKS_TOTAL).increment(1);
        let result = match claim {
            Claim::Reused { id, previous_size } => {
                self.store.set_occupied(id, true, false, Some(previous_size)).await
            }
            Claim::Created { id } => self.store.delete_time_slot(id).await,
        };
        match result {
            Ok(0) => warn!("rollback of slot {} affected no rows", claim.id()),
            Ok(_) => info!("rolled back slot {}", claim.id()),
            Err(e) => error!("rollback of slot {} failed: {e}", claim.id()),
        }
    }

    /// Move a booking through the admin workflow. Cancelling frees its slot;
    /// reactivating a cancelled booking claims the slot again, sized for its
    /// service.
    ///
    /// A repeated status is a no-op. Once a booking is cancelled its row may
    /// belong to another booking, so nothing here touches the row again
    /// unless the status changes.
    pub async fn update_booking_status(
        &self,
        id: BookingId,
        to: BookingStatus,
    ) -> Result<Booking, BookingError> {
        let mut booking = self.store.booking(id).await?.ok_or(BookingError::NotFound(id))?;
        let from = booking.status;

        if from == to {
            return Ok(booking);
        }
        if !from.can_transition_to(to) {
            return Err(BookingError::Validation(format!(
                "cannot move booking from {} to {}",
                from.as_str(),
                to.as_str()
            )));
        }

        let reclaim = !from.holds_slot() && to.holds_slot();
        if reclaim {
            self.reclaim_slot(&booking).await?;
        }

        let updated = match self.store.update_booking_status(id, to).await {
            Ok(n) => n,
            Err(e) => {
                if reclaim {
                    self.release_or_log(booking.time_slot).await;
                }
                return Err(e.into());
            }
        };
        if updated == 0 {
            if reclaim {
                self.release_or_log(booking.time_slot).await;
            }
            return Err(BookingError::NotFound(id));
        }

        if from.holds_slot()
            && !to.holds_slot()
            && let Err(e) = self.release_slot(booking.time_slot).await
        {
            // Put the booking back so the cancel can be retried as a whole.
            match self.store.update_booking_status(id, from).await {
                Ok(_) => warn!("booking {id} kept as {} after failed release", from.as_str()),
                Err(restore) => error!(
                    "booking {id} is {} but slot {} is still occupied: {restore}",
                    to.as_str(),
                    booking.time_slot
                ),
            }
            return Err(e);
        }

        info!("booking {id}: {} -> {}", from.as_str(), to.as_str());
        booking.status = to;
        Ok(booking)
    }

    /// Remove a booking and free the slot it held.
    pub async fn delete_booking(&self, id: BookingId) -> Result<(), BookingError> {
        let booking = self.store.booking(id).await?.ok_or(BookingError::NotFound(id))?;
        if self.store.delete_booking(id).await? == 0 {
            return Err(BookingError::NotFound(id));
        }
        if booking.status.holds_slot() {
            self.release_slot(booking.time_slot).await?;
        }
        info!("booking {id} deleted");
        Ok(())
    }

    /// Occupied → Free. A slot that is already free is left alone.
    async fn release_slot(&self, slot_id: TimeSlotId) -> Result<(), BookingError> {
        match self.store.set_occupied(slot_id, true, false, None).await {
            Ok(0) => {
                warn!("slot {slot_id} was already free");
                Ok(())
            }
            Ok(_) => Ok(()),
            Err(e) => {
                error!("releasing slot {slot_id} failed: {e}");
                Err(e.into())
            }
        }
    }

    async fn release_or_log(&self, slot_id: TimeSlotId) {
        if let Err(e) = self.release_slot(slot_id).await {
            error!("slot {slot_id} left occupied: {e}");
        }
    }

    /// Free → Occupied for the row a cancelled booking references. The row
    /// is resized to the booking's service, since another booking may have
    /// reused it with a different length in the meantime.
    async fn reclaim_slot(&self, booking: &Booking) -> Result<(), BookingError> {
        let slot_id = booking.time_slot;
        let slot = self.store.time_slot(slot_id).await?.ok_or_else(|| {
            BookingError::InvariantViolation(format!("time slot {slot_id} disappeared"))
        })?;
        let service_id = booking.service.ok_or_else(|| {
            BookingError::Validation(format!("booking {} has no service to size its slot", booking.id))
        })?;
        let (_, required) = self.resolve_service(service_id).await?;
        let range = SlotRange::new(slot.slot_start, slot.slot_start.saturating_add(required as Slot));
        if let Some(date) = self.store.date_availability(slot.date_id).await? {
            validate_range(&range, &allowed_ranges(&date))?;
        }

        match self
            .store
            .set_occupied(slot_id, false, true, Some(required as Slot))
            .await
        {
            Ok(1) => Ok(()),
            Ok(_) | Err(StoreError::Conflict) => Err(BookingError::SlotConflict(slot.slot_start)),
            Err(e) => Err(e.into()),
        }
    }
}
