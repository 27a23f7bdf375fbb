use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio_postgres::error::SqlState;
use tokio_postgres::{Client, NoTls, Row};
use tracing::{error, info};
use ulid::Ulid;

use crate::model::*;

use super::{Store, StoreError, StoreResult};

/// Store backed by a Postgres database. Slot claims rely on the
/// `time_slots` unique and exclusion constraints from `schema.sql`, so two
/// racing claims cannot both succeed even across processes.
pub struct PgStore {
    client: Client,
}

impl PgStore {
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let (client, connection) = tokio_postgres::connect(url, NoTls).await?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!("postgres connection closed: {e}");
            }
        });
        info!("connected to postgres");
        Ok(Self { client })
    }

    /// Create tables and constraints if they do not exist yet.
    pub async fn migrate(&self) -> StoreResult<()> {
        self.client.batch_execute(include_str!("schema.sql")).await?;
        Ok(())
    }
}

impl From<tokio_postgres::Error> for StoreError {
    fn from(e: tokio_postgres::Error) -> Self {
        match e.code() {
            Some(code) if *code == SqlState::UNIQUE_VIOLATION || *code == SqlState::EXCLUSION_VIOLATION => {
                StoreError::Conflict
            }
            _ => StoreError::Unavailable(e.to_string()),
        }
    }
}

// ── Row decoding ─────────────────────────────────────────────────

fn ulid(row: &Row, col: &str) -> StoreResult<Ulid> {
    let s: String = row.try_get(col)?;
    Ulid::from_string(&s).map_err(|e| StoreError::Unavailable(format!("bad id in {col}: {e}")))
}

fn opt_ulid(row: &Row, col: &str) -> StoreResult<Option<Ulid>> {
    let s: Option<String> = row.try_get(col)?;
    s.map(|s| Ulid::from_string(&s))
        .transpose()
        .map_err(|e| StoreError::Unavailable(format!("bad id in {col}: {e}")))
}

fn service_row(row: &Row) -> StoreResult<Service> {
    Ok(Service {
        id: ulid(row, "id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        price: row.try_get("price")?,
        required_slots: row.try_get("required_slots")?,
        is_active: row.try_get("is_active")?,
    })
}

fn barber_row(row: &Row) -> StoreResult<Barber> {
    Ok(Barber {
        id: ulid(row, "id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        is_active: row.try_get("is_active")?,
    })
}

fn date_row(row: &Row) -> StoreResult<DateAvailability> {
    Ok(DateAvailability {
        id: ulid(row, "id")?,
        barber_id: ulid(row, "barber_id")?,
        date: row.try_get::<_, NaiveDate>("date")?,
        slot_start: row.try_get("slot_start")?,
        slot_end: row.try_get("slot_end")?,
        is_available: row.try_get("is_available")?,
    })
}

fn time_slot_row(row: &Row) -> StoreResult<TimeSlot> {
    Ok(TimeSlot {
        id: ulid(row, "id")?,
        barber_id: ulid(row, "barber_id")?,
        date_id: ulid(row, "date_id")?,
        slot_start: row.try_get("slot_start")?,
        slot_size: row.try_get("slot_size")?,
        is_occupied: row.try_get("is_occupied")?,
    })
}

fn booking_row(row: &Row) -> StoreResult<Booking> {
    let payment_option: Option<String> = row.try_get("payment_option")?;
    let payment_status: String = row.try_get("payment_status")?;
    let status: String = row.try_get("status")?;
    Ok(Booking {
        id: ulid(row, "id")?,
        name: row.try_get("name")?,
        phone: row.try_get("phone")?,
        time_slot: ulid(row, "time_slot")?,
        barber: ulid(row, "barber")?,
        service: opt_ulid(row, "service")?,
        observation: row.try_get("observation")?,
        payment_option: match payment_option {
            None => None,
            Some(s) => Some(
                PaymentOption::parse(&s)
                    .ok_or_else(|| StoreError::Unavailable(format!("bad payment_option: {s}")))?,
            ),
        },
        payment_status: PaymentStatus::parse(&payment_status)
            .ok_or_else(|| StoreError::Unavailable(format!("bad payment_status: {payment_status}")))?,
        status: BookingStatus::parse(&status)
            .ok_or_else(|| StoreError::Unavailable(format!("bad status: {status}")))?,
        booked_in: row.try_get::<_, DateTime<Utc>>("booked_in")?,
    })
}

fn decode_all<T>(rows: &[Row], decode: fn(&Row) -> StoreResult<T>) -> StoreResult<Vec<T>> {
    rows.iter().map(decode).collect()
}

const SERVICE_COLS: &str = "id, name, description, price, required_slots, is_active";
const BARBER_COLS: &str = "id, name, description, is_active";
const DATE_COLS: &str = "id, barber_id, date, slot_start, slot_end, is_available";
const TIME_SLOT_COLS: &str = "id, barber_id, date_id, slot_start, slot_size, is_occupied";
const BOOKING_COLS: &str = "id, name, phone, time_slot, barber, service, observation, \
                            payment_option, payment_status, status, booked_in";

#[async_trait]
impl Store for PgStore {
    async fn active_services(&self) -> StoreResult<Vec<Service>> {
        let rows = self
            .client
            .query(
                &format!("SELECT {SERVICE_COLS} FROM services WHERE is_active ORDER BY price, name"),
                &[],
            )
            .await?;
        decode_all(&rows, service_row)
    }

    async fn active_barbers(&self) -> StoreResult<Vec<Barber>> {
        let rows = self
            .client
            .query(
                &format!("SELECT {BARBER_COLS} FROM barbers WHERE is_active ORDER BY name"),
                &[],
            )
            .await?;
        decode_all(&rows, barber_row)
    }

    async fn service(&self, id: ServiceId) -> StoreResult<Option<Service>> {
        let row = self
            .client
            .query_opt(
                &format!("SELECT {SERVICE_COLS} FROM services WHERE id = $1"),
                &[&id.to_string()],
            )
            .await?;
        row.as_ref().map(service_row).transpose()
    }

    async fn barber(&self, id: BarberId) -> StoreResult<Option<Barber>> {
        let row = self
            .client
            .query_opt(
                &format!("SELECT {BARBER_COLS} FROM barbers WHERE id = $1"),
                &[&id.to_string()],
            )
            .await?;
        row.as_ref().map(barber_row).transpose()
    }

    async fn date_availability(&self, id: DateId) -> StoreResult<Option<DateAvailability>> {
        let row = self
            .client
            .query_opt(
                &format!("SELECT {DATE_COLS} FROM dates WHERE id = $1"),
                &[&id.to_string()],
            )
            .await?;
        row.as_ref().map(date_row).transpose()
    }

    async fn available_dates(
        &self,
        barber_id: BarberId,
        from: NaiveDate,
    ) -> StoreResult<Vec<DateAvailability>> {
        let rows = self
            .client
            .query(
                &format!(
                    "SELECT {DATE_COLS} FROM dates \
                     WHERE barber_id = $1 AND is_available AND date >= $2 \
                     ORDER BY date, slot_start"
                ),
                &[&barber_id.to_string(), &from],
            )
            .await?;
        decode_all(&rows, date_row)
    }

    async fn time_slots(&self, barber_id: BarberId, date_id: DateId) -> StoreResult<Vec<TimeSlot>> {
        let rows = self
            .client
            .query(
                &format!(
                    "SELECT {TIME_SLOT_COLS} FROM time_slots \
                     WHERE barber_id = $1 AND date_id = $2 ORDER BY slot_start"
                ),
                &[&barber_id.to_string(), &date_id.to_string()],
            )
            .await?;
        decode_all(&rows, time_slot_row)
    }

    async fn time_slot(&self, id: TimeSlotId) -> StoreResult<Option<TimeSlot>> {
        let row = self
            .client
            .query_opt(
                &format!("SELECT {TIME_SLOT_COLS} FROM time_slots WHERE id = $1"),
                &[&id.to_string()],
            )
            .await?;
        row.as_ref().map(time_slot_row).transpose()
    }

    async fn insert_time_slot(&self, slot: TimeSlot) -> StoreResult<TimeSlotId> {
        self.client
            .execute(
                "INSERT INTO time_slots (id, barber_id, date_id, slot_start, slot_size, is_occupied) \
                 VALUES ($1, $2, $3, $4, $5, $6)",
                &[
                    &slot.id.to_string(),
                    &slot.barber_id.to_string(),
                    &slot.date_id.to_string(),
                    &slot.slot_start,
                    &slot.slot_size,
                    &slot.is_occupied,
                ],
            )
            .await?;
        Ok(slot.id)
    }

    async fn set_occupied(
        &self,
        id: TimeSlotId,
        expected: bool,
        occupied: bool,
        slot_size: Option<Slot>,
    ) -> StoreResult<u64> {
        let n = self
            .client
            .execute(
                "UPDATE time_slots SET is_occupied = $3, slot_size = COALESCE($4, slot_size) \
                 WHERE id = $1 AND is_occupied = $2",
                &[&id.to_string(), &expected, &occupied, &slot_size],
            )
            .await?;
        Ok(n)
    }

    async fn delete_time_slot(&self, id: TimeSlotId) -> StoreResult<u64> {
        let n = self
            .client
            .execute("DELETE FROM time_slots WHERE id = $1", &[&id.to_string()])
            .await?;
        Ok(n)
    }

    async fn insert_booking(&self, booking: Booking) -> StoreResult<BookingId> {
        self.client
            .execute(
                &format!(
                    "INSERT INTO bookings ({BOOKING_COLS}) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)"
                ),
                &[
                    &booking.id.to_string(),
                    &booking.name,
                    &booking.phone,
                    &booking.time_slot.to_string(),
                    &booking.barber.to_string(),
                    &booking.service.map(|s| s.to_string()),
                    &booking.observation,
                    &booking.payment_option.map(|p| p.as_str()),
                    &booking.payment_status.as_str(),
                    &booking.status.as_str(),
                    &booking.booked_in,
                ],
            )
            .await?;
        Ok(booking.id)
    }

    async fn booking(&self, id: BookingId) -> StoreResult<Option<Booking>> {
        let row = self
            .client
            .query_opt(
                &format!("SELECT {BOOKING_COLS} FROM bookings WHERE id = $1"),
                &[&id.to_string()],
            )
            .await?;
        row.as_ref().map(booking_row).transpose()
    }

    async fn bookings(&self) -> StoreResult<Vec<Booking>> {
        let rows = self
            .client
            .query(
                &format!("SELECT {BOOKING_COLS} FROM bookings ORDER BY booked_in DESC, id DESC"),
                &[],
            )
            .await?;
        decode_all(&rows, booking_row)
    }

    async fn bookings_by_phone(&self, phone: &str) -> StoreResult<Vec<Booking>> {
        let rows = self
            .client
            .query(
                &format!(
                    "SELECT {BOOKING_COLS} FROM bookings WHERE phone = $1 \
                     ORDER BY booked_in DESC, id DESC"
                ),
                &[&phone],
            )
            .await?;
        decode_all(&rows, booking_row)
    }

    async fn update_booking_status(&self, id: BookingId, status: BookingStatus) -> StoreResult<u64> {
        let n = self
            .client
            .execute(
                "UPDATE bookings SET status = $2 WHERE id = $1",
                &[&id.to_string(), &status.as_str()],
            )
            .await?;
        Ok(n)
    }

    async fn delete_booking(&self, id: BookingId) -> StoreResult<u64> {
        let n = self
            .client
            .execute("DELETE FROM bookings WHERE id = $1", &[&id.to_string()])
            .await?;
        Ok(n)
    }
}
