use axum::{
    extract::{Path, State},
    response::Response,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::auth::AuthUser;
use crate::errors::{ErrorResponse, ServiceError};
use crate::handlers::common::{no_content_response, validate_input};
use crate::services::carts::CartView;
use crate::{ApiResponse, AppState};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct AddCartItemRequest {
    pub product_id: Uuid,
    #[validate(range(min = 1, max = 100, message = "Quantity must be between 1 and 100"))]
    pub quantity: i32,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateCartItemRequest {
    /// Zero or negative removes the line.
    pub quantity: i32,
}

/// Cart routes; all of them require a valid token.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/cart", get(get_cart).delete(clear_cart))
        .route("/cart/items", post(add_item))
        .route("/cart/items/:product_id", put(update_item).delete(remove_item))
}

/// Fetch the caller's cart
#[utoipa::path(
    get,
    path = "/api/v1/cart",
    responses(
        (status = 200, description = "The cart, possibly a synthesized empty one", body = ApiResponse<CartView>),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "cart"
)]
pub async fn get_cart(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<ApiResponse<CartView>>, ServiceError> {
    let cart = state.services.carts.get_cart(user.user_id).await?;
    Ok(Json(ApiResponse::success(cart)))
}

/// Add a product to the cart
#[utoipa::path(
    post,
    path = "/api/v1/cart/items",
    request_body = AddCartItemRequest,
    responses(
        (status = 200, description = "Refreshed cart", body = ApiResponse<CartView>),
        (status = 400, description = "Quantity out of range", body = ErrorResponse),
        (status = 404, description = "No such product", body = ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "cart"
)]
pub async fn add_item(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<AddCartItemRequest>,
) -> Result<Json<ApiResponse<CartView>>, ServiceError> {
    validate_input(&payload)?;
    let cart = state
        .services
        .carts
        .add_item(user.user_id, payload.product_id, payload.quantity)
        .await?;
    Ok(Json(ApiResponse::success(cart)))
}

/// Set the quantity of a cart line
#[utoipa::path(
    put,
    path = "/api/v1/cart/items/{product_id}",
    params(("product_id" = Uuid, Path, description = "Product id")),
    request_body = UpdateCartItemRequest,
    responses(
        (status = 200, description = "Refreshed cart", body = ApiResponse<CartView>),
        (status = 400, description = "Quantity out of range", body = ErrorResponse),
        (status = 404, description = "Product not in the cart", body = ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "cart"
)]
pub async fn update_item(
    State(state): State<AppState>,
    user: AuthUser,
    Path(product_id): Path<Uuid>,
    Json(payload): Json<UpdateCartItemRequest>,
) -> Result<Json<ApiResponse<CartView>>, ServiceError> {
    let cart = state
        .services
        .carts
        .update_item(user.user_id, product_id, payload.quantity)
        .await?;
    Ok(Json(ApiResponse::success(cart)))
}

/// Remove a product from the cart
#[utoipa::path(
    delete,
    path = "/api/v1/cart/items/{product_id}",
    params(("product_id" = Uuid, Path, description = "Product id")),
    responses(
        (status = 204, description = "Line removed"),
        (status = 404, description = "Product not in the cart", body = ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "cart"
)]
pub async fn remove_item(
    State(state): State<AppState>,
    user: AuthUser,
    Path(product_id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    state
        .services
        .carts
        .remove_item(user.user_id, product_id)
        .await?;
    Ok(no_content_response())
}

/// Empty the cart
#[utoipa::path(
    delete,
    path = "/api/v1/cart",
    responses(
        (status = 204, description = "Cart emptied (also when it was already empty)"),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "cart"
)]
pub async fn clear_cart(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Response, ServiceError> {
    state.services.carts.clear_cart(user.user_id).await?;
    Ok(no_content_response())
}
