use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entities::category;
use crate::errors::{ErrorResponse, ServiceError};
use crate::handlers::common::PaginationParams;
use crate::services::catalog::ProductView;
use crate::{ApiResponse, AppState, PaginatedResponse};

#[derive(Debug, Serialize, ToSchema)]
pub struct CategoryResponse {
    pub id: Uuid,
    pub name: String,
    #[schema(value_type = String, format = DateTime)]
    pub created_at: DateTime<Utc>,
    #[schema(value_type = String, format = DateTime)]
    pub updated_at: DateTime<Utc>,
}

impl From<category::Model> for CategoryResponse {
    fn from(model: category::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

/// Public, unauthenticated catalog reads.
pub fn catalog_routes() -> Router<AppState> {
    Router::new()
        .route("/products", get(list_products))
        .route("/products/:id", get(get_product))
        .route("/products/category/:category_id", get(list_products_by_category))
        .route("/categories", get(list_categories))
        .route("/categories/:id", get(get_category))
}

/// List products
#[utoipa::path(
    get,
    path = "/api/v1/products",
    params(PaginationParams),
    responses(
        (status = 200, description = "One page of products", body = ApiResponse<PaginatedResponse<ProductView>>)
    ),
    tag = "catalog"
)]
pub async fn list_products(
    State(state): State<AppState>,
    Query(pagination): Query<PaginationParams>,
) -> Result<Json<ApiResponse<PaginatedResponse<ProductView>>>, ServiceError> {
    let page = state
        .services
        .catalog
        .list_products(pagination.page, pagination.per_page)
        .await?;
    Ok(Json(ApiResponse::success(PaginatedResponse::new(
        page.products,
        page.total,
        pagination.page,
        pagination.per_page,
    ))))
}

/// Fetch a single product
#[utoipa::path(
    get,
    path = "/api/v1/products/{id}",
    params(("id" = Uuid, Path, description = "Product id")),
    responses(
        (status = 200, description = "The product", body = ApiResponse<ProductView>),
        (status = 404, description = "No such product", body = ErrorResponse)
    ),
    tag = "catalog"
)]
pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<ProductView>>, ServiceError> {
    let product = state.services.catalog.get_product(id).await?;
    Ok(Json(ApiResponse::success(product)))
}

/// List the products of one category
#[utoipa::path(
    get,
    path = "/api/v1/products/category/{category_id}",
    params(
        ("category_id" = Uuid, Path, description = "Category id"),
        PaginationParams
    ),
    responses(
        (status = 200, description = "One page of the category's products", body = ApiResponse<PaginatedResponse<ProductView>>),
        (status = 404, description = "No such category", body = ErrorResponse)
    ),
    tag = "catalog"
)]
pub async fn list_products_by_category(
    State(state): State<AppState>,
    Path(category_id): Path<Uuid>,
    Query(pagination): Query<PaginationParams>,
) -> Result<Json<ApiResponse<PaginatedResponse<ProductView>>>, ServiceError> {
    let page = state
        .services
        .catalog
        .list_products_by_category(category_id, pagination.page, pagination.per_page)
        .await?;
    Ok(Json(ApiResponse::success(PaginatedResponse::new(
        page.products,
        page.total,
        pagination.page,
        pagination.per_page,
    ))))
}

/// List all categories
#[utoipa::path(
    get,
    path = "/api/v1/categories",
    responses(
        (status = 200, description = "All categories", body = ApiResponse<Vec<CategoryResponse>>)
    ),
    tag = "catalog"
)]
pub async fn list_categories(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<CategoryResponse>>>, ServiceError> {
    let categories = state.services.catalog.list_categories().await?;
    Ok(Json(ApiResponse::success(
        categories.into_iter().map(CategoryResponse::from).collect(),
    )))
}

/// Fetch a single category
#[utoipa::path(
    get,
    path = "/api/v1/categories/{id}",
    params(("id" = Uuid, Path, description = "Category id")),
    responses(
        (status = 200, description = "The category", body = ApiResponse<CategoryResponse>),
        (status = 404, description = "No such category", body = ErrorResponse)
    ),
    tag = "catalog"
)]
pub async fn get_category(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<CategoryResponse>>, ServiceError> {
    let category = state.services.catalog.get_category(id).await?;
    Ok(Json(ApiResponse::success(category.into())))
}
