//! HTTP surface for the cart and checkout engine.
//!
//! The guest cart lives on the client: every cart request carries it in the
//! `guest` field and every response hands back the version the client should
//! keep. A `Bearer` token that the auth service recognises switches the
//! request to the user's server-side cart.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::error;

use crate::cart::{CartMode, CartStore, GuestCart, Session};
use crate::checkout::{CheckoutAssembler, CheckoutRequest};
use crate::domain::aggregates::{CartSummary, Order};
use crate::domain::value_objects::ProductId;
use crate::error::CartError;
use crate::messaging::EventPublisher;
use crate::reconcile::{MergeReport, Reconciler};
use crate::store::Stores;

#[derive(Clone)]
pub struct AppState {
    pub stores: Stores,
    pub reconciler: Reconciler,
    pub checkout: CheckoutAssembler,
}

impl AppState {
    pub fn new(stores: Stores, events: Arc<dyn EventPublisher>) -> Self {
        let checkout = CheckoutAssembler::new(stores.catalog.clone(), stores.orders.clone(), events.clone());
        Self { stores, reconciler: Reconciler::new(events), checkout }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "healthy", "service": "opensase-checkout"})) }))
        .route("/api/v1/cart", post(get_summary))
        .route("/api/v1/cart/count", post(get_count))
        .route("/api/v1/cart/items", post(add_item))
        .route("/api/v1/cart/items/:product_id", patch(update_quantity).delete(remove_item))
        .route("/api/v1/cart/merge", post(merge))
        .route("/api/v1/checkout", post(checkout))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Debug)]
pub struct ApiError {
    error: CartError,
    guest: Option<GuestCart>,
}

impl From<CartError> for ApiError {
    fn from(error: CartError) -> Self { Self { error, guest: None } }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    field: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    guest: Option<&'a GuestCart>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.error {
            CartError::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            CartError::Stock { .. } => StatusCode::CONFLICT,
            CartError::ProductNotFound(_) | CartError::ItemNotFound(_) => StatusCode::NOT_FOUND,
            CartError::Unauthenticated => StatusCode::UNAUTHORIZED,
            CartError::MergeConflict { .. } => StatusCode::SERVICE_UNAVAILABLE,
            CartError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        // Storage details stay in the logs
        let message = match &self.error {
            CartError::Persistence(e) => {
                error!(error = %e, "storage failure");
                "Something went wrong, please try again".to_string()
            }
            CartError::MergeConflict { .. } => "Some items could not be moved to your cart, please try again".to_string(),
            other => other.to_string(),
        };

        let body = ErrorBody { error: message, field: self.error.field(), guest: self.guest.as_ref() };
        (status, Json(body)).into_response()
    }
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

async fn open_cart(state: &AppState, headers: &HeaderMap, guest: GuestCart) -> Result<CartStore, CartError> {
    let session = Session::resolve(state.stores.sessions.as_ref(), bearer(headers)).await?;
    Ok(CartStore::new(session, guest, &state.stores))
}

#[derive(Debug, Default, Deserialize)]
pub struct CartRequest {
    #[serde(default)]
    pub guest: GuestCart,
}

#[derive(Debug, Deserialize)]
pub struct AddItemRequest {
    #[serde(default)]
    pub guest: GuestCart,
    pub product_id: ProductId,
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateQuantityRequest {
    #[serde(default)]
    pub guest: GuestCart,
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutBody {
    #[serde(default)]
    pub guest: GuestCart,
    #[serde(flatten)]
    pub request: CheckoutRequest,
}

#[derive(Debug, Serialize)]
pub struct CartResponse {
    pub mode: CartMode,
    pub summary: CartSummary,
    pub guest: GuestCart,
}

#[derive(Debug, Serialize)]
pub struct CountResponse {
    pub count: u32,
    pub guest: GuestCart,
}

#[derive(Debug, Serialize)]
pub struct MergeResponse {
    pub report: MergeReport,
    pub cart: CartResponse,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub order: Order,
    pub redirect: String,
    pub guest: GuestCart,
}

async fn cart_response(cart: CartStore) -> Result<CartResponse, ApiError> {
    let summary = cart.get_summary().await?;
    Ok(CartResponse { mode: cart.mode(), summary, guest: cart.into_guest() })
}

async fn get_summary(State(s): State<AppState>, headers: HeaderMap, Json(r): Json<CartRequest>) -> Result<Json<CartResponse>, ApiError> {
    let cart = open_cart(&s, &headers, r.guest).await?;
    Ok(Json(cart_response(cart).await?))
}

async fn get_count(State(s): State<AppState>, headers: HeaderMap, Json(r): Json<CartRequest>) -> Result<Json<CountResponse>, ApiError> {
    let cart = open_cart(&s, &headers, r.guest).await?;
    let count = cart.get_count().await?;
    Ok(Json(CountResponse { count, guest: cart.into_guest() }))
}

async fn add_item(State(s): State<AppState>, headers: HeaderMap, Json(r): Json<AddItemRequest>) -> Result<(StatusCode, Json<CartResponse>), ApiError> {
    let mut cart = open_cart(&s, &headers, r.guest).await?;
    cart.add_item(r.product_id, r.quantity).await?;
    Ok((StatusCode::CREATED, Json(cart_response(cart).await?)))
}

async fn update_quantity(
    State(s): State<AppState>, headers: HeaderMap, Path(product_id): Path<ProductId>, Json(r): Json<UpdateQuantityRequest>,
) -> Result<Json<CartResponse>, ApiError> {
    let mut cart = open_cart(&s, &headers, r.guest).await?;
    cart.update_quantity(product_id, r.quantity).await?;
    Ok(Json(cart_response(cart).await?))
}

async fn remove_item(
    State(s): State<AppState>, headers: HeaderMap, Path(product_id): Path<ProductId>, body: Option<Json<CartRequest>>,
) -> Result<Json<CartResponse>, ApiError> {
    let guest = body.map(|Json(r)| r.guest).unwrap_or_default();
    let mut cart = open_cart(&s, &headers, guest).await?;
    cart.remove_item(product_id).await?;
    Ok(Json(cart_response(cart).await?))
}

async fn merge(State(s): State<AppState>, headers: HeaderMap, Json(r): Json<CartRequest>) -> Result<Json<MergeResponse>, ApiError> {
    let session = Session::resolve(s.stores.sessions.as_ref(), bearer(&headers)).await?;
    let user = session.user_id().ok_or(CartError::Unauthenticated)?;
    let mut cart = CartStore::new(Session::guest(), r.guest, &s.stores);
    match cart.login(user, &s.reconciler).await {
        Ok(report) => Ok(Json(MergeResponse { report, cart: cart_response(cart).await? })),
        Err(error) => Err(ApiError { error, guest: Some(cart.into_guest()) }),
    }
}

async fn checkout(State(s): State<AppState>, headers: HeaderMap, Json(body): Json<CheckoutBody>) -> Result<(StatusCode, Json<CheckoutResponse>), ApiError> {
    let mut cart = open_cart(&s, &headers, body.guest).await?;
    let order = s.checkout.submit_order(&mut cart, body.request).await?;
    let redirect = order.payment_method().confirmation_path(order.id());
    Ok((StatusCode::CREATED, Json(CheckoutResponse { order, redirect, guest: cart.into_guest() })))
}
