use std::net::SocketAddr;
use std::sync::Arc;

use chrono::{Days, Local, NaiveDate};
use tokio::net::TcpListener;
use tokio_postgres::error::SqlState;
use tokio_postgres::{Client, Config, NoTls, SimpleQueryMessage, SimpleQueryRow};
use ulid::Ulid;

use barberslot::engine::Engine;
use barberslot::model::*;
use barberslot::store::InMemoryStore;
use barberslot::wire;

// ── Test infrastructure ──────────────────────────────────────

struct Fixture {
    addr: SocketAddr,
    barber: BarberId,
    date: DateId,
    cut: ServiceId,
    day: NaiveDate,
}

async fn start_test_server() -> Fixture {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let day = Local::now().date_naive().checked_add_days(Days::new(1)).unwrap();
    let (barber, date, cut) = (Ulid::new(), Ulid::new(), Ulid::new());
    let store = InMemoryStore::from_seed(Seed {
        services: vec![Service {
            id: cut,
            name: "Corte".into(),
            description: None,
            price: 40.0,
            required_slots: 6.0,
            is_active: true,
        }],
        barbers: vec![Barber {
            id: barber,
            name: "Rafa".into(),
            description: None,
            is_active: true,
        }],
        dates: vec![DateAvailability {
            id: date,
            barber_id: barber,
            date: day,
            slot_start: 108,
            slot_end: 132,
            is_available: true,
        }],
        time_slots: vec![],
    });
    let engine = Arc::new(Engine::new(Arc::new(store)));

    tokio::spawn(async move {
        loop {
            let (socket, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => break,
            };
            let engine = engine.clone();
            tokio::spawn(async move {
                let _ = wire::process_connection(socket, engine, "barberslot".to_string()).await;
            });
        }
    });

    Fixture {
        addr,
        barber,
        date,
        cut,
        day,
    }
}

async fn connect(addr: SocketAddr) -> Client {
    let mut config = Config::new();
    config
        .host(addr.ip().to_string())
        .port(addr.port())
        .dbname("barbershop")
        .user("barberslot")
        .password("barberslot");

    let (client, connection) = config.connect(NoTls).await.unwrap();
    tokio::spawn(async move {
        let _ = connection.await;
    });
    client
}

async fn rows(client: &Client, sql: &str) -> Vec<SimpleQueryRow> {
    client
        .simple_query(sql)
        .await
        .unwrap()
        .into_iter()
        .filter_map(|m| match m {
            SimpleQueryMessage::Row(row) => Some(row),
            _ => None,
        })
        .collect()
}

fn insert_sql(f: &Fixture, start: &str, phone: &str) -> String {
    format!(
        "INSERT INTO bookings (barber_id, date_id, slot_start, service_id, name, phone) \
         VALUES ('{}', '{}', {start}, '{}', 'Ana Souza', '{phone}')",
        f.barber, f.date, f.cut
    )
}

fn start_times_sql(f: &Fixture) -> String {
    format!(
        "SELECT * FROM start_times WHERE barber_id = '{}' AND date_id = '{}' AND service_id = '{}'",
        f.barber, f.date, f.cut
    )
}

// ── Tests ────────────────────────────────────────────────────

#[tokio::test]
async fn wrong_password_is_rejected() {
    let f = start_test_server().await;
    let mut config = Config::new();
    config
        .host(f.addr.ip().to_string())
        .port(f.addr.port())
        .user("barberslot")
        .password("nope");
    assert!(config.connect(NoTls).await.is_err());
}

#[tokio::test]
async fn browse_catalogue_and_dates() {
    let f = start_test_server().await;
    let client = connect(f.addr).await;

    let services = rows(&client, "SELECT * FROM services").await;
    assert_eq!(services.len(), 1);
    assert_eq!(services[0].get("name"), Some("Corte"));
    assert_eq!(services[0].get("slot_count"), Some("6"));

    let barbers = rows(&client, "SELECT * FROM barbers").await;
    assert_eq!(barbers[0].get("id"), Some(f.barber.to_string().as_str()));

    let dates = rows(&client, &format!("SELECT * FROM dates WHERE barber_id = '{}'", f.barber)).await;
    assert_eq!(dates.len(), 1);
    assert_eq!(dates[0].get("date"), Some(f.day.to_string().as_str()));
    assert_eq!(dates[0].get("start_time"), Some("09:00"));
    assert_eq!(dates[0].get("end_time"), Some("11:00"));
}

#[tokio::test]
async fn book_then_start_times_shrink() {
    let f = start_test_server().await;
    let client = connect(f.addr).await;

    let before = rows(&client, &start_times_sql(&f)).await;
    assert_eq!(before.len(), 19); // 108..=126
    assert_eq!(before[0].get("time"), Some("09:00"));

    let n = client.execute(insert_sql(&f, "'09:30'", "11987654321").as_str(), &[]).await.unwrap();
    assert_eq!(n, 1);

    let after: Vec<String> = rows(&client, &start_times_sql(&f))
        .await
        .iter()
        .filter_map(|r| r.get("time").map(str::to_string))
        .collect();
    assert!(after.contains(&"09:00".to_string()));
    assert!(!after.contains(&"09:30".to_string()));
    assert!(!after.contains(&"09:10".to_string()));
    assert!(after.contains(&"10:00".to_string()));
}

#[tokio::test]
async fn double_booking_reports_slot_conflict() {
    let f = start_test_server().await;
    let client = connect(f.addr).await;

    client.batch_execute(&insert_sql(&f, "114", "11987654321")).await.unwrap();
    let err = client
        .batch_execute(&insert_sql(&f, "116", "11912345678"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some(&SqlState::EXCLUSION_VIOLATION));
}

#[tokio::test]
async fn invalid_booking_reports_validation() {
    let f = start_test_server().await;
    let client = connect(f.addr).await;

    let err = client
        .batch_execute(&insert_sql(&f, "130", "11987654321")) // runs past closing
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some(&SqlState::INVALID_PARAMETER_VALUE));

    let err = client
        .batch_execute(&insert_sql(&f, "114", "123"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some(&SqlState::INVALID_PARAMETER_VALUE));
}

#[tokio::test]
async fn bad_sql_reports_syntax_error() {
    let f = start_test_server().await;
    let client = connect(f.addr).await;
    let err = client.simple_query("SELECT * FROM haircuts").await.unwrap_err();
    assert_eq!(err.code(), Some(&SqlState::SYNTAX_ERROR));
}

#[tokio::test]
async fn returning_yields_the_booking_id() {
    let f = start_test_server().await;
    let client = connect(f.addr).await;

    let sql = format!("{} RETURNING id", insert_sql(&f, "114", "11987654321"));
    let returned = rows(&client, &sql).await;
    assert_eq!(returned.len(), 1);
    let id = returned[0].get("id").unwrap().to_string();
    assert!(Ulid::from_string(&id).is_ok());

    let history = rows(&client, "SELECT * FROM bookings WHERE phone = '11987654321'").await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].get("id"), Some(id.as_str()));
    assert_eq!(history[0].get("barber"), Some("Rafa"));
    assert_eq!(history[0].get("service"), Some("Corte"));
    assert_eq!(history[0].get("time"), Some("09:30"));
    assert_eq!(history[0].get("status"), Some("pending"));
}

#[tokio::test]
async fn extended_protocol_booking_and_history() {
    let f = start_test_server().await;
    let client = connect(f.addr).await;

    let n = client
        .execute(
            "INSERT INTO bookings (barber_id, date_id, slot_start, service_id, name, phone, notes) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
            &[
                &f.barber.to_string(),
                &f.date.to_string(),
                &"120",
                &f.cut.to_string(),
                &"O'Brien",
                &"11987654321",
                &"degradê",
            ],
        )
        .await
        .unwrap();
    assert_eq!(n, 1);

    let history = client
        .query("SELECT * FROM bookings WHERE phone = $1", &[&"11987654321"])
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    let name: String = history[0].get("name");
    let notes: String = history[0].get("notes");
    assert_eq!(name, "O'Brien");
    assert_eq!(notes, "degradê");
}

#[tokio::test]
async fn admin_status_counts_and_delete() {
    let f = start_test_server().await;
    let client = connect(f.addr).await;

    let sql = format!("{} RETURNING id", insert_sql(&f, "114", "11987654321"));
    let id = rows(&client, &sql).await[0].get("id").unwrap().to_string();

    let updated = rows(&client, &format!("SELECT set_booking_status('{id}', 'confirmed')")).await;
    assert_eq!(updated[0].get("status"), Some("confirmed"));

    let err = client
        .simple_query(&format!("SELECT set_booking_status('{id}', 'pending')"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some(&SqlState::INVALID_PARAMETER_VALUE));

    let counts = rows(&client, "SELECT * FROM booking_counts").await;
    assert_eq!(counts[0].get("total"), Some("1"));
    assert_eq!(counts[0].get("confirmed"), Some("1"));

    let listed = rows(&client, "SELECT * FROM bookings WHERE status = 'confirmed' AND search = 'ana'").await;
    assert_eq!(listed.len(), 1);

    client
        .batch_execute(&format!("DELETE FROM bookings WHERE id = '{id}'"))
        .await
        .unwrap();
    assert!(rows(&client, "SELECT * FROM bookings").await.is_empty());
    let starts = rows(&client, &start_times_sql(&f)).await;
    assert_eq!(starts.len(), 19);

    let err = client
        .batch_execute(&format!("DELETE FROM bookings WHERE id = '{id}'"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some(&SqlState::NO_DATA_FOUND));
}

#[tokio::test]
async fn concurrent_clients_cannot_double_book() {
    let f = start_test_server().await;

    let mut handles = Vec::new();
    for i in 0..8 {
        let client = connect(f.addr).await;
        let sql = insert_sql(&f, "114", &format!("1198765432{i}"));
        handles.push(tokio::spawn(async move { client.batch_execute(&sql).await }));
    }

    let mut ok = 0;
    for h in handles {
        match h.await.unwrap() {
            Ok(()) => ok += 1,
            Err(e) => assert_eq!(e.code(), Some(&SqlState::EXCLUSION_VIOLATION)),
        }
    }
    assert_eq!(ok, 1);

    let client = connect(f.addr).await;
    assert_eq!(rows(&client, "SELECT * FROM bookings").await.len(), 1);
}
