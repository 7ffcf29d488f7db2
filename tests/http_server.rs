//! End-to-end request handling through the axum transport.

mod common;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio_tungstenite::tungstenite::Message;
use tower::ServiceExt;

use app_runtime::statistics::{now_millis, HttpStatsEntry, WsStatsEntry};
use common::{body_string, spawn_router, start_runtime_with, write_app, SHOP_MANIFEST};

fn shop_runtime() -> common::TestRuntime {
    start_runtime_with(
        |root| {
            write_app(
                &root.join("apps/shop"),
                SHOP_MANIFEST,
                &[("static/css/site.css", "body { color: teal }")],
            )
        },
        |_| {},
    )
}

fn request(method: Method, uri: &str) -> Request<Body> {
    Request::builder().method(method).uri(uri).body(Body::empty()).unwrap()
}

fn totals(entries: &[HttpStatsEntry]) -> (u64, u64, u64) {
    entries.iter().fold((0, 0, 0), |(s, c, e), entry| {
        (
            s + entry.num_success_requests,
            c + entry.num_client_error_requests,
            e + entry.num_server_error_requests,
        )
    })
}

#[tokio::test]
async fn test_exact_route_and_request_id() {
    let test = shop_runtime();
    let router = test.runtime.http_server().router();

    let response = router.oneshot(request(Method::GET, "/shop/hello")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(body_string(response).await, "Hello from shop");
}

#[tokio::test]
async fn test_not_found_and_method_not_allowed() {
    let test = shop_runtime();
    let router = test.runtime.http_server().router();

    let response = router
        .clone()
        .oneshot(request(Method::GET, "/shop/missing"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = router
        .clone()
        .oneshot(request(Method::DELETE, "/shop/hello"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(
        response.headers().get(header::ALLOW).unwrap(),
        "GET, HEAD, OPTIONS, TRACE"
    );

    // No default application is deployed
    let response = router.oneshot(request(Method::GET, "/nowhere")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_options_and_head() {
    let test = shop_runtime();
    let router = test.runtime.http_server().router();

    let response = router
        .clone()
        .oneshot(request(Method::OPTIONS, "/shop/orders"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(
        response.headers().get(header::ALLOW).unwrap(),
        "POST, OPTIONS, TRACE"
    );

    let response = router.oneshot(request(Method::HEAD, "/shop/hello")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "");
}

#[tokio::test]
async fn test_content_negotiation() {
    let test = shop_runtime();
    let router = test.runtime.http_server().router();
    let order = |content_type: &str, accept: &str| {
        Request::post("/shop/orders")
            .header(header::CONTENT_TYPE, content_type)
            .header(header::ACCEPT, accept)
            .body(Body::from(r#"{"id":7}"#))
            .unwrap()
    };

    let response = router
        .clone()
        .oneshot(order("application/json", "text/xml; q=0.9, application/json"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/json"
    );
    assert_eq!(body_string(response).await, r#"{"id":7}"#);

    let response = router
        .clone()
        .oneshot(order("application/json", "text/xml"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_ACCEPTABLE);

    let response = router
        .oneshot(order("application/xml", "application/json"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

#[tokio::test]
async fn test_static_content() {
    let test = shop_runtime();
    let router = test.runtime.http_server().router();

    let response = router
        .clone()
        .oneshot(request(Method::GET, "/shop/css/site.css"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get(header::CONTENT_TYPE).unwrap(), "text/css");
    assert_eq!(body_string(response).await, "body { color: teal }");

    let response = router
        .oneshot(request(Method::GET, "/shop/../app.toml"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_oversized_body_is_rejected() {
    let test = start_runtime_with(
        |root| write_app(&root.join("apps/shop"), SHOP_MANIFEST, &[]),
        |config| config.listener.max_body_bytes = 8,
    );
    let router = test.runtime.http_server().router();

    let response = router
        .oneshot(
            Request::post("/shop/orders")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"id":1234567890}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_statistics_count_each_request_once() {
    let test = shop_runtime();
    let router = test.runtime.http_server().router();
    let start = now_millis();

    for uri in ["/shop/hello", "/shop/hello", "/shop/missing"] {
        router.clone().oneshot(request(Method::GET, uri)).await.unwrap();
    }
    router
        .oneshot(request(Method::PUT, "/shop/hello"))
        .await
        .unwrap();

    let entries = test.runtime.http_stats.get_entries(start, now_millis());
    assert!(!entries.is_empty());
    assert_eq!(totals(&entries), (2, 2, 0));
}

#[tokio::test]
async fn test_websocket_echo_session() {
    let test = shop_runtime();
    let addr = spawn_router(test.runtime.http_server().router()).await;
    let start = now_millis();

    let (mut socket, _) = tokio_tungstenite::connect_async(format!("ws://{}/shop/ws", addr))
        .await
        .unwrap();
    socket.send(Message::text("ping")).await.unwrap();
    let reply = tokio::time::timeout(Duration::from_secs(5), socket.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(reply.to_text().unwrap(), "ping");
    socket.close(None).await.unwrap();

    let ws_stats = &test.runtime.ws_stats;
    let mut closed = 0;
    for _ in 0..50 {
        closed = ws_stats
            .get_entries(start, now_millis())
            .iter()
            .map(|e| e.num_closed_sessions)
            .sum::<u64>();
        if closed == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(closed, 1);

    let entries = ws_stats.get_entries(start, now_millis());
    let sum = |f: fn(&WsStatsEntry) -> u64| entries.iter().map(f).sum::<u64>();
    assert_eq!(sum(|e| e.num_new_sessions), 1);
    assert_eq!(sum(|e| e.num_incoming_messages), 1);
    assert_eq!(sum(|e| e.num_outgoing_messages), 1);
    assert_eq!(sum(|e| e.sum_incoming_bytes), 4);
}

#[tokio::test]
async fn test_plain_request_to_socket_path_is_not_found() {
    let test = shop_runtime();
    let router = test.runtime.http_server().router();

    let response = router.oneshot(request(Method::GET, "/shop/ws")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_real_listener_round_trip() {
    let test = shop_runtime();
    let addr = spawn_router(test.runtime.http_server().router()).await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("http://{}/shop/hello", addr))
        .header("x-request-id", "req-42")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(response.headers().get("x-request-id").unwrap(), "req-42");
    assert_eq!(response.text().await.unwrap(), "Hello from shop");

    let response = client
        .post(format!("http://{}/shop/orders", addr))
        .json(&serde_json::json!({ "id": 9, "items": ["tea"] }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let echoed: serde_json::Value = response.json().await.unwrap();
    assert_eq!(echoed["items"][0], "tea");
}
