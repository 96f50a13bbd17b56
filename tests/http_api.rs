//! HTTP surface tests driven through the router with `tower::ServiceExt`.

use std::str::FromStr;
use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tower::ServiceExt;

use opensase_checkout::api::{router, AppState};
use opensase_checkout::messaging::RecordingPublisher;
use opensase_checkout::store::{MemoryStore, Stores};
use opensase_checkout::{Product, ProductId, UserId};

async fn app() -> (Router, Arc<MemoryStore>, Product) {
    let backend = Arc::new(MemoryStore::new());
    let product = Product::new(ProductId::new(), "Nakshi Kantha", Decimal::from(100), 20).with_offer(Decimal::from(80));
    backend.insert_product(product.clone()).await;
    let state = AppState::new(Stores::from_backend(backend.clone()), Arc::new(RecordingPublisher::default()));
    (router(state), backend, product)
}

async fn send(app: &Router, method: Method, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri).header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let response = app.clone().oneshot(builder.body(Body::from(body.to_string())).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
    (status, value)
}

fn decimal(value: &Value) -> Decimal {
    match value {
        Value::String(s) => Decimal::from_str(s).unwrap(),
        other => Decimal::from_str(&other.to_string()).unwrap(),
    }
}

fn billing() -> Value {
    json!({
        "name": "Sadia Islam",
        "phone": "01911000000",
        "email": "sadia@example.com",
        "address": "Flat 3B, Lake Road",
        "city": "Sylhet",
        "district": "Sylhet",
        "country": "Bangladesh",
        "postal_code": "3100"
    })
}

#[tokio::test]
async fn test_health() {
    let (app, _, _) = app().await;
    let response = app.oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_guest_cart_round_trips_through_the_client() {
    let (app, _, product) = app().await;

    let (status, body) = send(&app, Method::POST, "/api/v1/cart/items", None, json!({"product_id": product.id, "quantity": 2})).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["mode"]["mode"], "guest");
    assert_eq!(decimal(&body["summary"]["total_price"]), Decimal::from(160));

    let guest = body["guest"].clone();
    let (status, body) =
        send(&app, Method::POST, "/api/v1/cart/items", None, json!({"guest": guest, "product_id": product.id, "quantity": 1})).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["summary"]["total_items"], 3);
    assert_eq!(decimal(&body["summary"]["total_price"]), Decimal::from(240));

    let (status, body) = send(&app, Method::POST, "/api/v1/cart/count", None, json!({"guest": body["guest"]})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 3);
}

#[tokio::test]
async fn test_invalid_quantity_is_unprocessable() {
    let (app, _, product) = app().await;
    let (status, body) = send(&app, Method::POST, "/api/v1/cart/items", None, json!({"product_id": product.id, "quantity": 0})).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["field"], "quantity");
}

#[tokio::test]
async fn test_unknown_product_is_not_found() {
    let (app, _, _) = app().await;
    let (status, _) = send(&app, Method::POST, "/api/v1/cart/items", None, json!({"product_id": ProductId::new(), "quantity": 1})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_merge_requires_a_session() {
    let (app, _, _) = app().await;
    let (status, _) = send(&app, Method::POST, "/api/v1/cart/merge", None, json!({})).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_merge_moves_guest_lines_to_the_user_cart() {
    let (app, backend, product) = app().await;
    let user = UserId::new();
    backend.add_session("tok-1", user).await;

    let (_, body) = send(&app, Method::POST, "/api/v1/cart/items", None, json!({"product_id": product.id, "quantity": 2})).await;
    let (status, body) = send(&app, Method::POST, "/api/v1/cart/merge", Some("tok-1"), json!({"guest": body["guest"]})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["report"]["merged"].as_array().unwrap().len(), 1);
    assert_eq!(body["cart"]["summary"]["total_items"], 2);
    assert_eq!(body["cart"]["guest"]["items"].as_array().unwrap().len(), 0);
    assert_eq!(backend.cart_rows(user).await.len(), 1);
}

#[tokio::test]
async fn test_failed_merge_returns_the_unmerged_lines() {
    let (app, backend, product) = app().await;
    let user = UserId::new();
    backend.add_session("tok-2", user).await;
    backend.set_fail_cart_writes(true).await;

    let (_, body) = send(&app, Method::POST, "/api/v1/cart/items", None, json!({"product_id": product.id, "quantity": 1})).await;
    let (status, body) = send(&app, Method::POST, "/api/v1/cart/merge", Some("tok-2"), json!({"guest": body["guest"]})).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["guest"]["items"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_user_cart_update_and_remove() {
    let (app, backend, product) = app().await;
    let user = UserId::new();
    backend.add_session("tok-3", user).await;

    let (status, _) = send(&app, Method::POST, "/api/v1/cart/items", Some("tok-3"), json!({"product_id": product.id, "quantity": 1})).await;
    assert_eq!(status, StatusCode::CREATED);

    let uri = format!("/api/v1/cart/items/{}", product.id);
    let (status, body) = send(&app, Method::PATCH, &uri, Some("tok-3"), json!({"quantity": 5})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["summary"]["total_items"], 5);

    let (status, body) = send(&app, Method::DELETE, &uri, Some("tok-3"), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["summary"]["item_count"], 0);

    let (status, _) = send(&app, Method::PATCH, &uri, Some("tok-3"), json!({"quantity": 2})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_checkout_redirects_to_payment_confirmation() {
    let (app, backend, product) = app().await;
    let (_, body) = send(&app, Method::POST, "/api/v1/cart/items", None, json!({"product_id": product.id, "quantity": 3})).await;

    let request = json!({
        "guest": body["guest"],
        "billing": billing(),
        "same_as_billing": true,
        "payment_method": "bkash"
    });
    let (status, body) = send(&app, Method::POST, "/api/v1/checkout", None, request).await;
    assert_eq!(status, StatusCode::CREATED);
    let order_id = body["order"]["id"].as_str().unwrap();
    assert_eq!(body["redirect"], format!("/checkout/bkash?order={order_id}"));
    assert_eq!(decimal(&body["order"]["total"]), Decimal::from(240));
    assert_eq!(body["order"]["status"], "pending");
    assert_eq!(body["guest"]["items"].as_array().unwrap().len(), 0);
    assert_eq!(backend.order_count().await, 1);
}

#[tokio::test]
async fn test_checkout_names_the_failing_field() {
    let (app, backend, product) = app().await;
    let (_, body) = send(&app, Method::POST, "/api/v1/cart/items", None, json!({"product_id": product.id, "quantity": 1})).await;

    let mut billing = billing();
    billing["phone"] = json!("");
    let request = json!({"guest": body["guest"], "billing": billing, "same_as_billing": true, "payment_method": "nagad"});
    let (status, body) = send(&app, Method::POST, "/api/v1/checkout", None, request).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["field"], "billing.phone");
    assert_eq!(backend.order_count().await, 0);
}
