use axum::{
    extract::{Path, Query, State},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::errors::{ErrorResponse, ServiceError};
use crate::handlers::common::{created_response, PaginationParams};
use crate::services::orders::{CheckoutInput, OrderView};
use crate::{ApiResponse, AppState, PaginatedResponse};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateOrderRequest {
    pub shipping_address: String,
    /// Omitted or blank falls back to the shipping address.
    pub billing_address: Option<String>,
}

/// Order routes; all of them require a valid token.
pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/orders", post(create_order).get(list_orders))
        .route("/orders/:id", get(get_order))
}

/// Place an order from the caller's cart
#[utoipa::path(
    post,
    path = "/api/v1/orders",
    request_body = CreateOrderRequest,
    responses(
        (status = 201, description = "Order placed; the cart is now empty", body = ApiResponse<OrderView>),
        (status = 400, description = "Empty cart or invalid address", body = ErrorResponse),
        (status = 409, description = "Cart changed mid-checkout or a product disappeared", body = ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn create_order(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<Response, ServiceError> {
    let order = state
        .services
        .orders
        .create_order_from_cart(
            user.user_id,
            CheckoutInput {
                shipping_address: payload.shipping_address,
                billing_address: payload.billing_address,
            },
        )
        .await?;
    Ok(created_response(ApiResponse::success(order)))
}

/// List the caller's orders, newest first
#[utoipa::path(
    get,
    path = "/api/v1/orders",
    params(PaginationParams),
    responses(
        (status = 200, description = "One page of the caller's orders", body = ApiResponse<PaginatedResponse<OrderView>>),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    user: AuthUser,
    Query(pagination): Query<PaginationParams>,
) -> Result<Json<ApiResponse<PaginatedResponse<OrderView>>>, ServiceError> {
    let page = state
        .services
        .orders
        .list_orders(user.user_id, pagination.page, pagination.per_page)
        .await?;
    Ok(Json(ApiResponse::success(PaginatedResponse::new(
        page.orders,
        page.total,
        pagination.page,
        pagination.per_page,
    ))))
}

/// Fetch one of the caller's orders
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "The order", body = ApiResponse<OrderView>),
        (status = 404, description = "No such order for this user", body = ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<OrderView>>, ServiceError> {
    let order = state.services.orders.get_order(user.user_id, id).await?;
    Ok(Json(ApiResponse::success(order)))
}
