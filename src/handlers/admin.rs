use axum::{
    extract::multipart::{Field, Multipart, MultipartError},
    extract::{Path, Query, State},
    response::Response,
    routing::{get, post, put},
    Json, Router,
};
use rust_decimal::Decimal;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::errors::{ErrorResponse, ServiceError};
use crate::handlers::catalog::CategoryResponse;
use crate::handlers::common::{created_response, no_content_response, PaginationParams};
use crate::services::accounts::UserSummary;
use crate::services::catalog::{
    CreateCategoryInput, CreateProductInput, ImageUpload, ProductView, UpdateCategoryInput,
    UpdateProductInput,
};
use crate::{ApiResponse, AppState, PaginatedResponse};

/// OpenAPI shape of the multipart product form. `price` and `weight` arrive
/// as text parts and are parsed server-side.
#[derive(ToSchema)]
#[allow(dead_code)]
pub struct ProductFormRequest {
    pub name: String,
    pub description: Option<String>,
    pub price: String,
    pub weight: Option<String>,
    pub category_id: Uuid,
    #[schema(value_type = Option<String>, format = Binary)]
    pub image: Option<Vec<u8>>,
}

/// Admin routes. Mounted under `/api/v1/admin`, which the route→role table
/// maps to the Admin role.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route("/categories", post(create_category))
        .route(
            "/categories/:id",
            put(update_category).delete(delete_category),
        )
        .route("/products", post(create_product))
        .route("/products/:id", put(update_product).delete(delete_product))
}

/// List user accounts
#[utoipa::path(
    get,
    path = "/api/v1/admin/users",
    params(PaginationParams),
    responses(
        (status = 200, description = "One page of accounts", body = ApiResponse<PaginatedResponse<UserSummary>>),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse),
        (status = 403, description = "Not an admin", body = ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "admin"
)]
pub async fn list_users(
    State(state): State<AppState>,
    _admin: AuthUser,
    Query(pagination): Query<PaginationParams>,
) -> Result<Json<ApiResponse<PaginatedResponse<UserSummary>>>, ServiceError> {
    let page = state
        .services
        .accounts
        .list_users(pagination.page, pagination.per_page)
        .await?;
    Ok(Json(ApiResponse::success(PaginatedResponse::new(
        page.users,
        page.total,
        pagination.page,
        pagination.per_page,
    ))))
}

/// Create a category
#[utoipa::path(
    post,
    path = "/api/v1/admin/categories",
    request_body = CreateCategoryInput,
    responses(
        (status = 201, description = "Category created", body = ApiResponse<CategoryResponse>),
        (status = 400, description = "Invalid name", body = ErrorResponse),
        (status = 403, description = "Not an admin", body = ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "admin"
)]
pub async fn create_category(
    State(state): State<AppState>,
    _admin: AuthUser,
    Json(payload): Json<CreateCategoryInput>,
) -> Result<Response, ServiceError> {
    let category = state.services.catalog.create_category(payload).await?;
    Ok(created_response(ApiResponse::success(
        CategoryResponse::from(category),
    )))
}

/// Rename a category
#[utoipa::path(
    put,
    path = "/api/v1/admin/categories/{id}",
    params(("id" = Uuid, Path, description = "Category id")),
    request_body = UpdateCategoryInput,
    responses(
        (status = 200, description = "Category updated", body = ApiResponse<CategoryResponse>),
        (status = 404, description = "No such category", body = ErrorResponse),
        (status = 400, description = "Invalid name", body = ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "admin"
)]
pub async fn update_category(
    State(state): State<AppState>,
    _admin: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateCategoryInput>,
) -> Result<Json<ApiResponse<CategoryResponse>>, ServiceError> {
    let category = state.services.catalog.update_category(id, payload).await?;
    Ok(Json(ApiResponse::success(CategoryResponse::from(category))))
}

/// Delete a category
#[utoipa::path(
    delete,
    path = "/api/v1/admin/categories/{id}",
    params(("id" = Uuid, Path, description = "Category id")),
    responses(
        (status = 204, description = "Category deleted"),
        (status = 404, description = "No such category", body = ErrorResponse),
        (status = 409, description = "Category still has products", body = ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "admin"
)]
pub async fn delete_category(
    State(state): State<AppState>,
    _admin: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    state.services.catalog.delete_category(id).await?;
    Ok(no_content_response())
}

/// Create a product (multipart form, optional image part)
#[utoipa::path(
    post,
    path = "/api/v1/admin/products",
    request_body(content = ProductFormRequest, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Product created", body = ApiResponse<ProductView>),
        (status = 400, description = "Missing field, unknown category or rejected image", body = ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "admin"
)]
pub async fn create_product(
    State(state): State<AppState>,
    _admin: AuthUser,
    mut multipart: Multipart,
) -> Result<Response, ServiceError> {
    let form = parse_product_form(&mut multipart).await?;
    let input = CreateProductInput {
        name: require(form.name, "name")?,
        description: form.description.unwrap_or_default(),
        price: require(form.price, "price")?,
        weight: form.weight.unwrap_or(Decimal::ZERO),
        category_id: require(form.category_id, "category_id")?,
    };
    let product = state
        .services
        .catalog
        .create_product(input, form.image)
        .await?;
    Ok(created_response(ApiResponse::success(product)))
}

/// Update a product (multipart form, optional replacement image)
#[utoipa::path(
    put,
    path = "/api/v1/admin/products/{id}",
    params(("id" = Uuid, Path, description = "Product id")),
    request_body(content = ProductFormRequest, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Product updated", body = ApiResponse<ProductView>),
        (status = 404, description = "No such product", body = ErrorResponse),
        (status = 400, description = "Missing field, unknown category or rejected image", body = ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "admin"
)]
pub async fn update_product(
    State(state): State<AppState>,
    _admin: AuthUser,
    Path(id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<Json<ApiResponse<ProductView>>, ServiceError> {
    let form = parse_product_form(&mut multipart).await?;
    let input = UpdateProductInput {
        name: require(form.name, "name")?,
        description: form.description.unwrap_or_default(),
        price: require(form.price, "price")?,
        weight: form.weight.unwrap_or(Decimal::ZERO),
        category_id: require(form.category_id, "category_id")?,
    };
    let product = state
        .services
        .catalog
        .update_product(id, input, form.image)
        .await?;
    Ok(Json(ApiResponse::success(product)))
}

/// Delete a product
#[utoipa::path(
    delete,
    path = "/api/v1/admin/products/{id}",
    params(("id" = Uuid, Path, description = "Product id")),
    responses(
        (status = 204, description = "Product deleted, cart lines dropped"),
        (status = 404, description = "No such product", body = ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "admin"
)]
pub async fn delete_product(
    State(state): State<AppState>,
    _admin: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    state.services.catalog.delete_product(id).await?;
    Ok(no_content_response())
}

#[derive(Default)]
struct ProductForm {
    name: Option<String>,
    description: Option<String>,
    price: Option<Decimal>,
    weight: Option<Decimal>,
    category_id: Option<Uuid>,
    image: Option<ImageUpload>,
}

async fn parse_product_form(multipart: &mut Multipart) -> Result<ProductForm, ServiceError> {
    let mut form = ProductForm::default();

    while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        match name.as_str() {
            "name" => form.name = Some(text_part(field).await?),
            "description" => form.description = Some(text_part(field).await?),
            "price" => {
                let raw = text_part(field).await?;
                form.price = Some(parse_decimal("price", &raw)?);
            }
            "weight" => {
                let raw = text_part(field).await?;
                form.weight = Some(parse_decimal("weight", &raw)?);
            }
            "category_id" => {
                let raw = text_part(field).await?;
                form.category_id = Some(raw.trim().parse::<Uuid>().map_err(|_| {
                    ServiceError::BadRequest("Field 'category_id' must be a UUID".to_string())
                })?);
            }
            "image" => {
                let file_name = field.file_name().map(str::to_string);
                let bytes = field.bytes().await.map_err(bad_multipart)?;
                // Browsers submit an empty part for an untouched file input.
                if !bytes.is_empty() {
                    let file_name = file_name.ok_or_else(|| {
                        ServiceError::BadRequest(
                            "Image upload is missing a file name".to_string(),
                        )
                    })?;
                    form.image = Some(ImageUpload {
                        file_name,
                        bytes: bytes.to_vec(),
                    });
                }
            }
            _ => {}
        }
    }

    Ok(form)
}

async fn text_part(field: Field<'_>) -> Result<String, ServiceError> {
    field.text().await.map_err(bad_multipart)
}

fn bad_multipart(err: MultipartError) -> ServiceError {
    ServiceError::BadRequest(format!("Invalid multipart payload: {}", err))
}

fn parse_decimal(field: &str, raw: &str) -> Result<Decimal, ServiceError> {
    raw.trim().parse::<Decimal>().map_err(|_| {
        ServiceError::BadRequest(format!("Field '{}' must be a decimal number", field))
    })
}

fn require<T>(value: Option<T>, field: &str) -> Result<T, ServiceError> {
    value.ok_or_else(|| ServiceError::BadRequest(format!("Field '{}' is required", field)))
}
