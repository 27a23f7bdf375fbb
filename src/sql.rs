use sqlparser::ast::{
    self, Expr, FromTable, FunctionArg, FunctionArgExpr, FunctionArguments, ObjectNamePart,
    SelectItem, SetExpr, Statement, TableFactor, TableObject, Value, ValueWithSpan,
};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use ulid::Ulid;

use crate::model::*;

/// Parsed command from SQL input.
#[derive(Debug, PartialEq)]
pub enum Command {
    SelectServices,
    SelectBarbers,
    SelectDates {
        barber_id: BarberId,
    },
    SelectTimeSlots {
        barber_id: BarberId,
        date_id: DateId,
    },
    SelectStartTimes {
        barber_id: BarberId,
        date_id: DateId,
        service_id: ServiceId,
    },
    InsertBooking {
        request: BookingRequest,
        returning: bool,
    },
    /// With a phone: that customer's history. Without: the admin listing.
    SelectBookings {
        phone: Option<String>,
        filter: BookingFilter,
    },
    SelectBookingCounts,
    UpdateBookingStatus {
        id: BookingId,
        status: BookingStatus,
    },
    DeleteBooking {
        id: BookingId,
    },
}

/// Column order of a positional `INSERT INTO bookings VALUES (...)`.
const BOOKING_COLUMNS: [&str; 8] = [
    "barber_id",
    "date_id",
    "slot_start",
    "service_id",
    "name",
    "phone",
    "notes",
    "payment_option",
];

pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    if stmts.is_empty() {
        return Err(SqlError::Empty);
    }

    match &stmts[0] {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Delete(delete) => parse_delete(delete),
        Statement::Query(query) => parse_select(query),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = insert_table_name(insert)?;
    if table != "bookings" {
        return Err(SqlError::UnknownTable(table));
    }
    let values = extract_insert_values(insert)?;

    let columns: Vec<String> = if insert.columns.is_empty() {
        BOOKING_COLUMNS.iter().map(|c| c.to_string()).collect()
    } else {
        insert.columns.iter().map(|c| c.value.to_lowercase()).collect()
    };
    if values.len() > columns.len() {
        return Err(SqlError::WrongArity("bookings", columns.len(), values.len()));
    }

    let mut row: Vec<(String, Expr)> = Vec::with_capacity(values.len());
    for (col, value) in columns.into_iter().zip(values) {
        if !BOOKING_COLUMNS.contains(&col.as_str()) {
            return Err(SqlError::Parse(format!("unknown column: {col}")));
        }
        row.push((col, value));
    }

    let request = BookingRequest {
        barber_id: parse_ulid_expr(required(&row, "barber_id")?)?,
        date_id: parse_ulid_expr(required(&row, "date_id")?)?,
        slot_start: parse_slot_expr(required(&row, "slot_start")?)?,
        service_id: parse_ulid_expr(required(&row, "service_id")?)?,
        customer: Customer {
            name: parse_string_expr(required(&row, "name")?)?,
            phone: parse_string_expr(required(&row, "phone")?)?,
        },
        notes: lookup(&row, "notes").map(parse_string_or_null).transpose()?.flatten(),
        payment_option: match lookup(&row, "payment_option").map(parse_string_or_null).transpose()?.flatten() {
            None => None,
            Some(s) => Some(
                PaymentOption::parse(&s)
                    .ok_or_else(|| SqlError::Parse(format!("bad payment_option: {s}")))?,
            ),
        },
    };

    Ok(Command::InsertBooking {
        request,
        returning: insert.returning.is_some(),
    })
}

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    let table = delete_table_name(delete)?;
    if table != "bookings" {
        return Err(SqlError::UnknownTable(table));
    }
    let mut filters = Vec::new();
    if let Some(selection) = &delete.selection {
        collect_eq_filters(selection, &mut filters);
    }
    let id = lookup(&filters, "id").ok_or(SqlError::MissingFilter("id"))?;
    Ok(Command::DeleteBooking {
        id: parse_ulid_expr(id)?,
    })
}

fn parse_select(query: &ast::Query) -> Result<Command, SqlError> {
    let select = match query.body.as_ref() {
        SetExpr::Select(s) => s,
        _ => return Err(SqlError::Unsupported("non-SELECT query".into())),
    };

    if select.from.is_empty() {
        return parse_function_call(&select.projection);
    }
    let table = table_factor_name(&select.from[0].relation)?;

    let mut filters = Vec::new();
    if let Some(selection) = &select.selection {
        collect_eq_filters(selection, &mut filters);
    }
    let ulid_filter = |col: &'static str| -> Result<Ulid, SqlError> {
        parse_ulid_expr(lookup(&filters, col).ok_or(SqlError::MissingFilter(col))?)
    };

    match table.as_str() {
        "services" => Ok(Command::SelectServices),
        "barbers" => Ok(Command::SelectBarbers),
        "dates" => Ok(Command::SelectDates {
            barber_id: ulid_filter("barber_id")?,
        }),
        "time_slots" => Ok(Command::SelectTimeSlots {
            barber_id: ulid_filter("barber_id")?,
            date_id: ulid_filter("date_id")?,
        }),
        "start_times" => Ok(Command::SelectStartTimes {
            barber_id: ulid_filter("barber_id")?,
            date_id: ulid_filter("date_id")?,
            service_id: ulid_filter("service_id")?,
        }),
        "bookings" => {
            let phone = lookup(&filters, "phone").map(parse_string_expr).transpose()?;
            let status = match lookup(&filters, "status").map(parse_string_expr).transpose()? {
                None => None,
                Some(s) => Some(parse_status(&s)?),
            };
            let search = lookup(&filters, "search").map(parse_string_expr).transpose()?;
            Ok(Command::SelectBookings {
                phone,
                filter: BookingFilter { status, search },
            })
        }
        "booking_counts" => Ok(Command::SelectBookingCounts),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

/// `SELECT set_booking_status('<id>', '<status>')`
fn parse_function_call(projection: &[SelectItem]) -> Result<Command, SqlError> {
    let expr = match projection.first() {
        Some(SelectItem::UnnamedExpr(e)) | Some(SelectItem::ExprWithAlias { expr: e, .. }) => e,
        _ => return Err(SqlError::Parse("SELECT without FROM".into())),
    };
    let Expr::Function(func) = expr else {
        return Err(SqlError::Parse("SELECT without FROM".into()));
    };
    let name = object_name_last(&func.name).unwrap_or_default();
    if name != "set_booking_status" {
        return Err(SqlError::UnknownFunction(name));
    }

    let args = function_args(&func.args)?;
    if args.len() != 2 {
        return Err(SqlError::WrongArity("set_booking_status", 2, args.len()));
    }
    Ok(Command::UpdateBookingStatus {
        id: parse_ulid_expr(args[0])?,
        status: parse_status(&parse_string_expr(args[1])?)?,
    })
}

fn function_args(args: &FunctionArguments) -> Result<Vec<&Expr>, SqlError> {
    match args {
        FunctionArguments::None => Ok(Vec::new()),
        FunctionArguments::List(list) => list
            .args
            .iter()
            .map(|arg| match arg {
                FunctionArg::Unnamed(FunctionArgExpr::Expr(e)) => Ok(e),
                other => Err(SqlError::Parse(format!("unsupported argument: {other}"))),
            })
            .collect(),
        FunctionArguments::Subquery(_) => Err(SqlError::Unsupported("subquery argument".into())),
    }
}

/// Flatten `a = x AND b = y AND ...` into `(column, value)` pairs. Other
/// predicates are ignored.
fn collect_eq_filters(expr: &Expr, out: &mut Vec<(String, Expr)>) {
    match expr {
        Expr::BinaryOp { left, op, right } => match op {
            ast::BinaryOperator::And => {
                collect_eq_filters(left, out);
                collect_eq_filters(right, out);
            }
            ast::BinaryOperator::Eq => {
                if let Some(col) = expr_column_name(left) {
                    out.push((col, right.as_ref().clone()));
                }
            }
            _ => {}
        },
        Expr::Nested(inner) => collect_eq_filters(inner, out),
        _ => {}
    }
}

// ── Helpers ───────────────────────────────────────────────────

fn lookup<'a>(pairs: &'a [(String, Expr)], col: &str) -> Option<&'a Expr> {
    pairs.iter().find(|(c, _)| c == col).map(|(_, e)| e)
}

fn required<'a>(pairs: &'a [(String, Expr)], col: &'static str) -> Result<&'a Expr, SqlError> {
    lookup(pairs, col).ok_or(SqlError::MissingColumn(col))
}

fn object_name_last(name: &ast::ObjectName) -> Option<String> {
    name.0.last().and_then(|part| match part {
        ObjectNamePart::Identifier(ident) => Some(ident.value.to_lowercase()),
        _ => None,
    })
}

fn insert_table_name(insert: &ast::Insert) -> Result<String, SqlError> {
    match &insert.table {
        TableObject::TableName(name) => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("unsupported table object in INSERT".into())),
    }
}

fn delete_table_name(delete: &ast::Delete) -> Result<String, SqlError> {
    let tables_with_joins = match &delete.from {
        FromTable::WithFromKeyword(t) | FromTable::WithoutKeyword(t) => t,
    };
    if let Some(first) = tables_with_joins.first() {
        table_factor_name(&first.relation)
    } else {
        Err(SqlError::Parse("DELETE without table".into()))
    }
}

fn table_factor_name(tf: &TableFactor) -> Result<String, SqlError> {
    match tf {
        TableFactor::Table { name, .. } => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("complex table expression".into())),
    }
}

fn extract_insert_values(insert: &ast::Insert) -> Result<Vec<Expr>, SqlError> {
    let body = insert
        .source
        .as_ref()
        .ok_or(SqlError::Parse("no VALUES".into()))?;
    match body.body.as_ref() {
        SetExpr::Values(values) => match values.rows.as_slice() {
            [] => Err(SqlError::Parse("empty VALUES".into())),
            [row] => Ok(row.clone()),
            _ => Err(SqlError::Unsupported("one booking per INSERT".into())),
        },
        _ => Err(SqlError::Parse("expected VALUES".into())),
    }
}

fn expr_column_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.to_lowercase()),
        Expr::CompoundIdentifier(parts) => parts.last().map(|i| i.value.to_lowercase()),
        _ => None,
    }
}

fn extract_value(expr: &Expr) -> Option<&Value> {
    match expr {
        Expr::Value(ValueWithSpan { value, .. }) => Some(value),
        _ => None,
    }
}

fn parse_ulid_expr(expr: &Expr) -> Result<Ulid, SqlError> {
    let s = parse_string_expr(expr)?;
    Ulid::from_string(&s).map_err(|e| SqlError::Parse(format!("bad ULID: {e}")))
}

fn parse_string_expr(expr: &Expr) -> Result<String, SqlError> {
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s)) | Some(Value::Number(s, _)) => Ok(s.clone()),
        Some(value) => Err(SqlError::Parse(format!("expected string, got {value:?}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr:?}"))),
    }
}

fn parse_string_or_null(expr: &Expr) -> Result<Option<String>, SqlError> {
    match extract_value(expr) {
        Some(Value::Null) => Ok(None),
        _ => parse_string_expr(expr).map(Some),
    }
}

/// A slot index (`114`, `'114'`) or a clock time (`'09:30'`).
fn parse_slot_expr(expr: &Expr) -> Result<Slot, SqlError> {
    if let Expr::UnaryOp {
        op: ast::UnaryOperator::Minus,
        expr,
    } = expr
    {
        return Ok(-parse_slot_expr(expr)?);
    }
    let s = parse_string_expr(expr)?;
    if s.contains(':') {
        return time_to_slot(&s).ok_or_else(|| SqlError::Parse(format!("bad time: {s}")));
    }
    s.parse()
        .map_err(|e| SqlError::Parse(format!("bad slot_start {s}: {e}")))
}

fn parse_status(s: &str) -> Result<BookingStatus, SqlError> {
    BookingStatus::parse(s).ok_or_else(|| SqlError::Parse(format!("bad status: {s}")))
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum SqlError {
    Parse(String),
    Empty,
    Unsupported(String),
    UnknownTable(String),
    UnknownFunction(String),
    WrongArity(&'static str, usize, usize),
    MissingFilter(&'static str),
    MissingColumn(&'static str),
}

impl std::fmt::Display for SqlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlError::Parse(s) => write!(f, "parse error: {s}"),
            SqlError::Empty => write!(f, "empty query"),
            SqlError::Unsupported(s) => write!(f, "unsupported: {s}"),
            SqlError::UnknownTable(t) => write!(f, "unknown table: {t}"),
            SqlError::UnknownFunction(name) => write!(f, "unknown function: {name}"),
            SqlError::WrongArity(t, expected, got) => {
                write!(f, "{t}: expected {expected} values, got {got}")
            }
            SqlError::MissingFilter(col) => write!(f, "missing filter: {col}"),
            SqlError::MissingColumn(col) => write!(f, "missing column: {col}"),
        }
    }
}

impl std::error::Error for SqlError {}
