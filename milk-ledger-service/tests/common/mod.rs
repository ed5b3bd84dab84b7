//! Common test utilities for milk-ledger-service integration tests.
#![allow(dead_code)]

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::NaiveDate;
use http_body_util::BodyExt;
use milk_ledger_service::config::{DatabaseConfig, MilkLedgerConfig, StoreConfig};
use milk_ledger_service::models::{MilkLedgerEntry, MovementCategory};
use milk_ledger_service::services::{Database, LedgerStore, MemoryLedgerStore, MilkLedger};
use milk_ledger_service::startup::{build_router, AppState, Application};
use service_core::config::Config as CommonConfig;
use rust_decimal::Decimal;
use serde_json::Value;
use std::sync::{Arc, Once};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tower::util::ServiceExt;

static INIT: Once = Once::new();

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,milk_ledger_service=debug,sqlx=warn")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// A ledger over a fresh in-memory store.
pub fn memory_ledger() -> (MilkLedger, Arc<MemoryLedgerStore>) {
    init_tracing();
    let store = Arc::new(MemoryLedgerStore::new());
    let ledger = MilkLedger::new(store.clone() as Arc<dyn LedgerStore>);
    (ledger, store)
}

/// The full HTTP router over a fresh in-memory store.
pub fn spawn_router() -> (Router, Arc<MemoryLedgerStore>) {
    let (ledger, store) = memory_ledger();
    (build_router(AppState::new(ledger)), store)
}

fn test_config(store: StoreConfig) -> MilkLedgerConfig {
    MilkLedgerConfig {
        common: CommonConfig {
            host: "127.0.0.1".parse().unwrap(),
            port: 0,
        },
        service_name: "milk-ledger-service-test".to_string(),
        service_version: "test".to_string(),
        log_level: "debug".to_string(),
        otlp_endpoint: None,
        store,
    }
}

/// Spawn the full application over the in-memory store on a random port.
///
/// Returns the application's ledger and the bound port.
pub async fn spawn_memory_app() -> (MilkLedger, u16) {
    init_tracing();

    let app = Application::build(test_config(StoreConfig::Memory))
        .await
        .expect("Failed to build application");
    let ledger = app.ledger().clone();
    let port = app.port();

    tokio::spawn(async move {
        app.run_until_stopped().await.ok();
    });

    (ledger, port)
}

/// Plain HTTP/1.1 GET against a running application; returns status and body.
pub async fn http_get(port: u16, path: &str) -> (u16, String) {
    let mut stream = TcpStream::connect(("127.0.0.1", port))
        .await
        .expect("Failed to connect to application");
    let request = format!(
        "GET {} HTTP/1.1\r\nHost: 127.0.0.1\r\nConnection: close\r\n\r\n",
        path
    );
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut raw = String::new();
    stream.read_to_string(&mut raw).await.unwrap();

    let status = raw
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse().ok())
        .expect("Malformed status line");
    let body = raw
        .split_once("\r\n\r\n")
        .map(|(_, body)| body.to_string())
        .unwrap_or_default();
    (status, body)
}

/// Spawn the application against `TEST_DATABASE_URL` on an emptied schema.
///
/// Returns the application's ledger and a separate pool for direct checks.
pub async fn spawn_postgres_app() -> (MilkLedger, Database) {
    init_tracing();

    let database_url = std::env::var("TEST_DATABASE_URL")
        .expect("TEST_DATABASE_URL must be set to run PostgreSQL tests");

    let config = test_config(StoreConfig::Postgres(DatabaseConfig {
        url: database_url.clone(),
        max_connections: 4,
        min_connections: 1,
    }));

    let app = Application::build(config)
        .await
        .expect("Failed to build application");
    let ledger = app.ledger().clone();

    let db = Database::new(&database_url, 4, 1)
        .await
        .expect("Failed to connect to test database");
    sqlx::query("TRUNCATE milk_ledger_entries, milk_movements")
        .execute(db.pool())
        .await
        .expect("Failed to reset tables");

    tokio::spawn(async move {
        app.run_until_stopped().await.ok();
    });

    (ledger, db)
}

/// January 2024, day `d`.
pub fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
}

/// Record a movement and panic on failure.
pub async fn record(ledger: &MilkLedger, d: u32, category: MovementCategory, delta: Decimal) {
    ledger
        .record_movement(day(d), category, delta)
        .await
        .expect("Failed to record movement");
}

/// Every stored entry in January 2024.
pub async fn january(ledger: &MilkLedger) -> Vec<MilkLedgerEntry> {
    ledger
        .get_ledger(day(1), day(31))
        .await
        .expect("Failed to get ledger")
}

/// Closing balance stored for day `d`.
pub fn closing_on(entries: &[MilkLedgerEntry], d: u32) -> Decimal {
    entries
        .iter()
        .find(|e| e.entry_date == day(d))
        .map(|e| e.closing_balance)
        .unwrap_or_else(|| panic!("no entry for day {}", d))
}

/// Assert the formula and chaining invariants over an ascending chain.
pub fn assert_chain_consistent(entries: &[MilkLedgerEntry]) {
    for entry in entries {
        assert_eq!(
            Some(entry.closing_balance),
            entry.expected_closing(),
            "closing formula broken on {}",
            entry.entry_date
        );
        for category in MovementCategory::ALL {
            assert!(
                entry.total(category) >= Decimal::ZERO,
                "negative {} total on {}",
                category,
                entry.entry_date
            );
        }
    }
    for pair in entries.windows(2) {
        assert!(pair[0].entry_date < pair[1].entry_date, "entries out of order");
        assert_eq!(
            pair[1].opening_balance, pair[0].closing_balance,
            "chain broken between {} and {}",
            pair[0].entry_date, pair[1].entry_date
        );
    }
}

/// Send a request through the router and decode the JSON body (Null when empty).
pub async fn send(
    router: &Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

/// Parse a decimal field serialized as a JSON string or number.
pub fn decimal(value: &Value) -> Decimal {
    match value {
        Value::String(s) => s.parse().expect("invalid decimal string"),
        Value::Number(n) => n.to_string().parse().expect("invalid decimal number"),
        other => panic!("expected decimal, got {}", other),
    }
}
