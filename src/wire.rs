use std::fmt::Debug;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::Sink;
use futures::stream;
use pgwire::api::auth::cleartext::CleartextPasswordAuthStartupHandler;
use pgwire::api::auth::{DefaultServerParameterProvider, StartupHandler};
use pgwire::api::copy::CopyHandler;
use pgwire::api::portal::{Format, Portal};
use pgwire::api::query::{ExtendedQueryHandler, SimpleQueryHandler};
use pgwire::api::results::{
    DataRowEncoder, DescribePortalResponse, DescribeStatementResponse, FieldFormat, FieldInfo,
    QueryResponse, Response, Tag,
};
use pgwire::api::stmt::{QueryParser, StoredStatement};
use pgwire::api::store::PortalStore;
use pgwire::api::{ClientInfo, ClientPortalStore, NoopHandler, PgWireServerHandlers, Type};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};
use pgwire::messages::PgWireBackendMessage;
use pgwire::messages::data::DataRow;
use tokio::net::TcpStream;

use crate::auth::BarberslotAuthSource;
use crate::engine::{BookingError, Engine};
use crate::model::*;
use crate::observability;
use crate::sql::{self, Command};

pub struct BarberslotHandler {
    engine: Arc<Engine>,
    query_parser: Arc<BarberslotQueryParser>,
}

impl BarberslotHandler {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            query_parser: Arc::new(BarberslotQueryParser),
        }
    }

    /// Parse, execute and record metrics for one statement.
    async fn run(&self, sql: &str) -> PgWireResult<Vec<Response>> {
        let cmd = sql::parse_sql(sql).map_err(sql_err)?;
        let label = observability::command_label(&cmd);
        let started = Instant::now();

        let result = self.execute_command(cmd).await;

        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(observability::QUERIES_TOTAL, "command" => label, "status" => status)
            .increment(1);
        metrics::histogram!(observability::QUERY_DURATION_SECONDS, "command" => label)
            .record(started.elapsed().as_secs_f64());
        result
    }

    async fn execute_command(&self, cmd: Command) -> PgWireResult<Vec<Response>> {
        let engine = &self.engine;
        match cmd {
            Command::SelectServices => {
                let services = engine.list_services().await.map_err(booking_err)?;
                rows(services_schema(), services, |enc, s| {
                    enc.encode_field(&s.id.to_string())?;
                    enc.encode_field(&s.name)?;
                    enc.encode_field(&s.description)?;
                    enc.encode_field(&s.price)?;
                    enc.encode_field(&s.required_slots)?;
                    enc.encode_field(&(s.slot_count() as i32))
                })
            }
            Command::SelectBarbers => {
                let barbers = engine.list_barbers().await.map_err(booking_err)?;
                rows(barbers_schema(), barbers, |enc, b| {
                    enc.encode_field(&b.id.to_string())?;
                    enc.encode_field(&b.name)?;
                    enc.encode_field(&b.description)
                })
            }
            Command::SelectDates { barber_id } => {
                let today = chrono::Local::now().date_naive();
                let dates = engine
                    .available_dates(barber_id, today)
                    .await
                    .map_err(booking_err)?;
                rows(dates_schema(), dates, |enc, d| {
                    enc.encode_field(&d.id.to_string())?;
                    enc.encode_field(&d.barber_id.to_string())?;
                    enc.encode_field(&d.date.to_string())?;
                    enc.encode_field(&d.slot_start)?;
                    enc.encode_field(&d.slot_end)?;
                    enc.encode_field(&slot_to_time(d.slot_start))?;
                    enc.encode_field(&slot_to_time(d.slot_end))
                })
            }
            Command::SelectTimeSlots { barber_id, date_id } => {
                let slots = engine
                    .open_time_slots(barber_id, date_id)
                    .await
                    .map_err(booking_err)?;
                rows(time_slots_schema(), slots, |enc, s| {
                    enc.encode_field(&s.id.to_string())?;
                    enc.encode_field(&s.barber_id.to_string())?;
                    enc.encode_field(&s.date_id.to_string())?;
                    enc.encode_field(&s.slot_start)?;
                    enc.encode_field(&s.slot_size)?;
                    enc.encode_field(&slot_to_time(s.slot_start))
                })
            }
            Command::SelectStartTimes {
                barber_id,
                date_id,
                service_id,
            } => {
                let starts = engine
                    .available_start_times(barber_id, date_id, service_id)
                    .await
                    .map_err(booking_err)?;
                rows(start_times_schema(), starts, |enc, st| {
                    enc.encode_field(&st.slot)?;
                    enc.encode_field(&st.time)
                })
            }
            Command::InsertBooking { request, returning } => {
                let id = engine.attempt_booking(request).await.map_err(booking_err)?;
                if returning {
                    rows(id_schema(), vec![id], |enc, id| enc.encode_field(&id.to_string()))
                } else {
                    Ok(vec![Response::Execution(Tag::new("INSERT").with_rows(1))])
                }
            }
            Command::SelectBookings { phone, filter } => {
                let views = match phone {
                    Some(phone) => engine.customer_bookings(&phone).await,
                    None => engine.admin_bookings(&filter).await,
                }
                .map_err(booking_err)?;
                rows(bookings_schema(), views, encode_booking_view)
            }
            Command::SelectBookingCounts => {
                let counts = engine.status_counts().await.map_err(booking_err)?;
                rows(counts_schema(), vec![counts], |enc, c| {
                    enc.encode_field(&(c.total as i64))?;
                    enc.encode_field(&(c.pending as i64))?;
                    enc.encode_field(&(c.confirmed as i64))?;
                    enc.encode_field(&(c.cancelled as i64))?;
                    enc.encode_field(&(c.completed as i64))
                })
            }
            Command::UpdateBookingStatus { id, status } => {
                let booking = engine
                    .update_booking_status(id, status)
                    .await
                    .map_err(booking_err)?;
                rows(status_schema(), vec![booking], |enc, b| {
                    enc.encode_field(&b.id.to_string())?;
                    enc.encode_field(&b.status.as_str().to_string())
                })
            }
            Command::DeleteBooking { id } => {
                engine.delete_booking(id).await.map_err(booking_err)?;
                Ok(vec![Response::Execution(Tag::new("DELETE").with_rows(1))])
            }
        }
    }
}

fn encode_booking_view(enc: &mut DataRowEncoder, v: &BookingView) -> PgWireResult<()> {
    let b = &v.booking;
    enc.encode_field(&b.id.to_string())?;
    enc.encode_field(&b.name)?;
    enc.encode_field(&b.phone)?;
    enc.encode_field(&v.barber_name)?;
    enc.encode_field(&v.service_name)?;
    enc.encode_field(&v.date.map(|d| d.to_string()))?;
    enc.encode_field(&v.time())?;
    enc.encode_field(&b.status.as_str().to_string())?;
    enc.encode_field(&b.payment_option.map(|p| p.as_str().to_string()))?;
    enc.encode_field(&b.payment_status.as_str().to_string())?;
    enc.encode_field(&b.observation)?;
    enc.encode_field(&b.booked_in.to_rfc3339())
}

/// Encode `items` as a single query response with `schema`.
fn rows<T>(
    schema: Vec<FieldInfo>,
    items: Vec<T>,
    encode: impl Fn(&mut DataRowEncoder, &T) -> PgWireResult<()>,
) -> PgWireResult<Vec<Response>> {
    let schema = Arc::new(schema);
    let data: Vec<PgWireResult<DataRow>> = items
        .iter()
        .map(|item| {
            let mut encoder = DataRowEncoder::new(schema.clone());
            encode(&mut encoder, item)?;
            Ok(encoder.take_row())
        })
        .collect();
    Ok(vec![Response::Query(QueryResponse::new(
        schema,
        stream::iter(data),
    ))])
}

// ── Result schemas ───────────────────────────────────────────────

fn text(name: &str) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, Type::VARCHAR, FieldFormat::Text)
}

fn int4(name: &str) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, Type::INT4, FieldFormat::Text)
}

fn int8(name: &str) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, Type::INT8, FieldFormat::Text)
}

fn float8(name: &str) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, Type::FLOAT8, FieldFormat::Text)
}

fn services_schema() -> Vec<FieldInfo> {
    vec![
        text("id"),
        text("name"),
        text("description"),
        float8("price"),
        float8("required_slots"),
        int4("slot_count"),
    ]
}

fn barbers_schema() -> Vec<FieldInfo> {
    vec![text("id"), text("name"), text("description")]
}

fn dates_schema() -> Vec<FieldInfo> {
    vec![
        text("id"),
        text("barber_id"),
        text("date"),
        int4("slot_start"),
        int4("slot_end"),
        text("start_time"),
        text("end_time"),
    ]
}

fn time_slots_schema() -> Vec<FieldInfo> {
    vec![
        text("id"),
        text("barber_id"),
        text("date_id"),
        int4("slot_start"),
        int4("slot_size"),
        text("time"),
    ]
}

fn start_times_schema() -> Vec<FieldInfo> {
    vec![int4("slot_start"), text("time")]
}

fn id_schema() -> Vec<FieldInfo> {
    vec![text("id")]
}

fn bookings_schema() -> Vec<FieldInfo> {
    vec![
        text("id"),
        text("name"),
        text("phone"),
        text("barber"),
        text("service"),
        text("date"),
        text("time"),
        text("status"),
        text("payment_option"),
        text("payment_status"),
        text("notes"),
        text("booked_in"),
    ]
}

fn counts_schema() -> Vec<FieldInfo> {
    vec![
        int8("total"),
        int8("pending"),
        int8("confirmed"),
        int8("cancelled"),
        int8("completed"),
    ]
}

fn status_schema() -> Vec<FieldInfo> {
    vec![text("id"), text("status")]
}

/// Result columns for a statement that has not been bound yet.
fn describe_schema(sql: &str) -> Vec<FieldInfo> {
    let lower = sql.to_lowercase();
    if lower.trim_start().starts_with("insert") {
        return if lower.contains("returning") {
            id_schema()
        } else {
            vec![]
        };
    }
    if !lower.trim_start().starts_with("select") {
        return vec![];
    }
    if lower.contains("set_booking_status") {
        status_schema()
    } else if lower.contains("booking_counts") {
        counts_schema()
    } else if lower.contains("bookings") {
        bookings_schema()
    } else if lower.contains("start_times") {
        start_times_schema()
    } else if lower.contains("time_slots") {
        time_slots_schema()
    } else if lower.contains("dates") {
        dates_schema()
    } else if lower.contains("barbers") {
        barbers_schema()
    } else if lower.contains("services") {
        services_schema()
    } else {
        vec![]
    }
}

#[async_trait]
impl SimpleQueryHandler for BarberslotHandler {
    async fn do_query<C>(&self, _client: &mut C, query: &str) -> PgWireResult<Vec<Response>>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        self.run(query).await
    }
}

// ── Extended Query Protocol ──────────────────────────────────────

#[derive(Debug)]
pub struct BarberslotQueryParser;

#[async_trait]
impl QueryParser for BarberslotQueryParser {
    type Statement = String;

    async fn parse_sql<C>(
        &self,
        _client: &C,
        sql: &str,
        _types: &[Option<Type>],
    ) -> PgWireResult<String>
    where
        C: ClientInfo + Unpin + Send + Sync,
    {
        Ok(sql.to_string())
    }

    fn get_parameter_types(&self, stmt: &String) -> PgWireResult<Vec<Type>> {
        Ok(vec![Type::VARCHAR; count_params(stmt)])
    }

    fn get_result_schema(
        &self,
        stmt: &String,
        _column_format: Option<&Format>,
    ) -> PgWireResult<Vec<FieldInfo>> {
        Ok(describe_schema(stmt))
    }
}

#[async_trait]
impl ExtendedQueryHandler for BarberslotHandler {
    type Statement = String;
    type QueryParser = BarberslotQueryParser;

    fn query_parser(&self) -> Arc<Self::QueryParser> {
        self.query_parser.clone()
    }

    async fn do_query<C>(
        &self,
        _client: &mut C,
        portal: &Portal<Self::Statement>,
        _max_rows: usize,
    ) -> PgWireResult<Response>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let sql = substitute_params(portal);
        let mut responses = self.run(&sql).await?;
        Ok(responses.remove(0))
    }

    async fn do_describe_statement<C>(
        &self,
        _client: &mut C,
        target: &StoredStatement<Self::Statement>,
    ) -> PgWireResult<DescribeStatementResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let param_types = vec![Type::VARCHAR; count_params(&target.statement)];
        Ok(DescribeStatementResponse::new(
            param_types,
            describe_schema(&target.statement),
        ))
    }

    async fn do_describe_portal<C>(
        &self,
        _client: &mut C,
        target: &Portal<Self::Statement>,
    ) -> PgWireResult<DescribePortalResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        Ok(DescribePortalResponse::new(describe_schema(
            &target.statement.statement,
        )))
    }
}

/// Count the highest $N parameter placeholder in the SQL string.
fn count_params(sql: &str) -> usize {
    let mut max = 0usize;
    let bytes = sql.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' {
            i += 1;
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            if i > start
                && let Ok(n) = sql[start..i].parse::<usize>()
            {
                max = max.max(n);
            }
        } else {
            i += 1;
        }
    }
    max
}

/// Substitute $1, $2, ... placeholders with bound parameter values (text format).
fn substitute_params(portal: &Portal<String>) -> String {
    let mut result = portal.statement.statement.to_string();
    for (i, param) in portal.parameters.iter().enumerate().rev() {
        let placeholder = format!("${}", i + 1);
        let value = match param {
            Some(bytes) => {
                let text = String::from_utf8_lossy(bytes);
                format!("'{}'", text.replace('\'', "''"))
            }
            None => "NULL".to_string(),
        };
        result = result.replace(&placeholder, &value);
    }
    result
}

// ── Factory ──────────────────────────────────────────────────────

pub struct BarberslotFactory {
    handler: Arc<BarberslotHandler>,
    auth_handler: Arc<
        CleartextPasswordAuthStartupHandler<BarberslotAuthSource, DefaultServerParameterProvider>,
    >,
    noop: Arc<NoopHandler>,
}

impl BarberslotFactory {
    pub fn new(engine: Arc<Engine>, password: String) -> Self {
        let auth_source = BarberslotAuthSource::new(password);
        let param_provider = DefaultServerParameterProvider::default();
        Self {
            handler: Arc::new(BarberslotHandler::new(engine)),
            auth_handler: Arc::new(CleartextPasswordAuthStartupHandler::new(
                auth_source,
                param_provider,
            )),
            noop: Arc::new(NoopHandler),
        }
    }
}

impl PgWireServerHandlers for BarberslotFactory {
    fn simple_query_handler(&self) -> Arc<impl SimpleQueryHandler> {
        self.handler.clone()
    }

    fn extended_query_handler(&self) -> Arc<impl ExtendedQueryHandler> {
        self.handler.clone()
    }

    fn startup_handler(&self) -> Arc<impl StartupHandler> {
        self.auth_handler.clone()
    }

    fn copy_handler(&self) -> Arc<impl CopyHandler> {
        self.noop.clone()
    }
}

/// Serve one client connection until it closes.
pub async fn process_connection(
    socket: TcpStream,
    engine: Arc<Engine>,
    password: String,
) -> Result<(), std::io::Error> {
    let factory = Arc::new(BarberslotFactory::new(engine, password));
    pgwire::tokio::process_socket(socket, None, factory).await
}

fn booking_err(e: BookingError) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        e.sqlstate().into(),
        format!("{} ({e})", e.user_message()),
    )))
}

fn sql_err(e: crate::sql::SqlError) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        "42601".into(),
        e.to_string(),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_params_takes_highest_placeholder() {
        assert_eq!(count_params("SELECT * FROM services"), 0);
        assert_eq!(
            count_params("SELECT * FROM start_times WHERE barber_id = $1 AND date_id = $2 AND service_id = $3"),
            3
        );
        assert_eq!(count_params("SELECT $2, $1"), 2);
    }

    #[test]
    fn describe_picks_schema_by_table() {
        assert_eq!(describe_schema("SELECT * FROM booking_counts").len(), 5);
        assert_eq!(describe_schema("SELECT * FROM bookings WHERE phone = $1").len(), 12);
        assert_eq!(describe_schema("SELECT * FROM start_times WHERE barber_id = $1").len(), 2);
        assert_eq!(describe_schema("select set_booking_status($1, $2)").len(), 2);
        assert_eq!(
            describe_schema("INSERT INTO bookings VALUES ($1, $2, $3, $4, $5, $6) RETURNING id").len(),
            1
        );
        assert!(describe_schema("INSERT INTO bookings VALUES ($1)").is_empty());
        assert!(describe_schema("DELETE FROM bookings WHERE id = $1").is_empty());
    }
}
