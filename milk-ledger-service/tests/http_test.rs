//! HTTP surface tests, driven through the router without a socket.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{decimal, http_get, send, spawn_memory_app, spawn_router};
use rust_decimal_macros::dec;
use serde_json::json;
use tower::util::ServiceExt;

#[tokio::test]
async fn health_and_readiness_report_ok() {
    let (router, _) = spawn_router();

    let (status, body) = send(&router, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "milk-ledger-service");

    let (status, _) = send(&router, "GET", "/ready", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn metrics_endpoint_is_plain_text() {
    let (router, _) = spawn_router();

    let response = router
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("text/plain"));
}

#[tokio::test]
async fn request_id_is_echoed() {
    let (router, _) = spawn_router();

    let response = router
        .oneshot(
            Request::builder()
                .uri("/health")
                .header("x-request-id", "dairy-42")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.headers()["x-request-id"], "dairy-42");
}

#[tokio::test]
async fn adjustments_cascade_and_show_up_in_the_ledger() {
    let (router, _) = spawn_router();

    for (date, category, delta) in [
        ("2024-01-01", "produced", "100"),
        ("2024-01-02", "calf_consumed", "10"),
        ("2024-01-01", "waste", "5"),
    ] {
        let (status, _) = send(
            &router,
            "POST",
            "/api/v1/ledger/adjustments",
            Some(json!({ "date": date, "category": category, "delta": delta })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = send(
        &router,
        "GET",
        "/api/v1/ledger?start=2024-01-01&end=2024-01-31",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let entries = body["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["entry_date"], "2024-01-01");
    assert_eq!(decimal(&entries[0]["closing_balance"]), dec!(95));
    assert_eq!(decimal(&entries[1]["opening_balance"]), dec!(95));
    assert_eq!(decimal(&entries[1]["closing_balance"]), dec!(85));

    let (status, body) = send(
        &router,
        "GET",
        "/api/v1/ledger/balance?as_of=2024-01-15",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["as_of"], "2024-01-15");
    assert_eq!(decimal(&body["balance"]), dec!(85));
}

#[tokio::test]
async fn negative_total_is_unprocessable() {
    let (router, _) = spawn_router();

    let (status, body) = send(
        &router,
        "POST",
        "/api/v1/ledger/adjustments",
        Some(json!({ "date": "2024-01-01", "category": "sold", "delta": "-3" })),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].as_str().unwrap().contains("sold"));
}

#[tokio::test]
async fn inverted_range_is_not_found() {
    let (router, _) = spawn_router();

    for path in [
        "/api/v1/ledger?start=2024-02-01&end=2024-01-01",
        "/api/v1/ledger/summary?start=2024-02-01&end=2024-01-01",
        "/api/v1/ledger/audit?start=2024-02-01&end=2024-01-01",
        "/api/v1/movements?start=2024-02-01&end=2024-01-01",
    ] {
        let (status, _) = send(&router, "GET", path, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{}", path);
    }
}

#[tokio::test]
async fn malformed_queries_are_bad_requests() {
    let (router, _) = spawn_router();

    let (status, _) = send(&router, "GET", "/api/v1/ledger?start=2024-01-01", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &router,
        "GET",
        "/api/v1/ledger?start=yesterday&end=2024-01-01",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_category_is_rejected() {
    let (router, _) = spawn_router();

    let (status, _) = send(
        &router,
        "POST",
        "/api/v1/ledger/adjustments",
        Some(json!({ "date": "2024-01-01", "category": "cheese", "delta": "1" })),
    )
    .await;

    assert!(status.is_client_error());
}

#[tokio::test]
async fn movement_crud_round() {
    let (router, _) = spawn_router();

    let (status, body) = send(
        &router,
        "POST",
        "/api/v1/movements",
        Some(json!({
            "movement_date": "2024-03-10",
            "category": "collected",
            "volume": "64.25",
            "reference": "Supplier B"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = body["movement"]["movement_id"].as_str().unwrap().to_string();
    assert_eq!(decimal(&body["ledger"][0]["total_collected"]), dec!(64.25));

    let (status, body) = send(&router, "GET", &format!("/api/v1/movements/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["reference"], "Supplier B");

    let (status, body) = send(
        &router,
        "PUT",
        &format!("/api/v1/movements/{}", id),
        Some(json!({ "volume": "60" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(decimal(&body["ledger"][0]["closing_balance"]), dec!(60));

    let (status, body) = send(
        &router,
        "GET",
        "/api/v1/movements?start=2024-03-01&end=2024-03-31&category=collected",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);

    let (status, body) = send(&router, "DELETE", &format!("/api/v1/movements/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(decimal(&body["ledger"][0]["closing_balance"]), dec!(0));

    let (status, _) = send(&router, "GET", &format!("/api/v1/movements/{}", id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn movement_input_errors() {
    let (router, _) = spawn_router();

    let (status, _) = send(
        &router,
        "POST",
        "/api/v1/movements",
        Some(json!({
            "movement_date": "2024-03-10",
            "category": "produced",
            "volume": "0"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &router,
        "POST",
        "/api/v1/movements",
        Some(json!({
            "movement_date": "2024-03-10",
            "category": "produced",
            "volume": "3",
            "note": "n".repeat(2001)
        })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = send(&router, "GET", "/api/v1/movements/not-a-uuid", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn summary_and_audit_endpoints() {
    let (router, _) = spawn_router();
    for (date, category, delta) in [
        ("2024-01-01", "produced", "80"),
        ("2024-01-02", "sold", "30"),
        ("2024-01-03", "production_used", "20"),
    ] {
        send(
            &router,
            "POST",
            "/api/v1/ledger/adjustments",
            Some(json!({ "date": date, "category": category, "delta": delta })),
        )
        .await;
    }

    let (status, body) = send(
        &router,
        "GET",
        "/api/v1/ledger/summary?start=2024-01-02&end=2024-01-03",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(decimal(&body["opening_balance"]), dec!(80));
    assert_eq!(decimal(&body["total_sold"]), dec!(30));
    assert_eq!(decimal(&body["closing_balance"]), dec!(30));
    assert_eq!(body["tracked_days"], 2);

    let (status, body) = send(
        &router,
        "GET",
        "/api/v1/ledger/audit?start=2024-01-01&end=2024-01-31",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn out_of_range_volumes_are_client_errors() {
    let (router, _) = spawn_router();
    send(
        &router,
        "POST",
        "/api/v1/ledger/adjustments",
        Some(json!({ "date": "2024-01-01", "category": "produced", "delta": "10" })),
    )
    .await;

    for delta in ["79228162514264337593543950335", "100000000000", "-100000000000"] {
        let (status, _) = send(
            &router,
            "POST",
            "/api/v1/ledger/adjustments",
            Some(json!({ "date": "2024-01-01", "category": "produced", "delta": delta })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{}", delta);
    }

    let (status, _) = send(
        &router,
        "POST",
        "/api/v1/movements",
        Some(json!({
            "movement_date": "2024-01-01",
            "category": "collected",
            "volume": "100000000000"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &router,
        "GET",
        "/api/v1/ledger?start=2024-01-01&end=2024-01-31",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let entries = body["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(decimal(&entries[0]["total_produced"]), dec!(10));
    assert_eq!(decimal(&entries[0]["total_collected"]), dec!(0));
}

#[tokio::test]
async fn application_runs_over_the_in_memory_store() {
    let (ledger, port) = spawn_memory_app().await;
    ledger
        .record_movement(
            chrono::NaiveDate::from_ymd_opt(2024, 1, 3).unwrap(),
            milk_ledger_service::models::MovementCategory::Produced,
            dec!(12.5),
        )
        .await
        .unwrap();

    let (status, _) = http_get(port, "/ready").await;
    assert_eq!(status, 200);

    let (status, body) = http_get(port, "/api/v1/ledger/balance?as_of=2024-01-31").await;
    assert_eq!(status, 200);
    let body: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(decimal(&body["balance"]), dec!(12.5));
}
