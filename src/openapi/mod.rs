use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Storefront API",
        version = "1.0.0",
        description = r#"
# Storefront API

REST backend for a small web shop: public catalog browsing, per-user carts,
checkout into immutable orders, and JWT-based accounts.

## Authentication

`POST /auth/login` returns a bearer token. Cart, order and admin endpoints
require it:

```
Authorization: Bearer <token>
```

Admin endpoints additionally require the `Admin` role.

## Errors

Failures return a JSON body with the shape:

```json
{
  "error": "Not Found",
  "message": "Product 550e8400-e29b-41d4-a716-446655440000 not found",
  "request_id": "req-abc123",
  "timestamp": "2025-08-01T10:30:00Z"
}
```

## Pagination

List endpoints take `page` (default 1) and `per_page` (default 20, capped
server-side) query parameters.
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "auth", description = "Registration, login and password reset"),
        (name = "catalog", description = "Public product and category reads"),
        (name = "cart", description = "The caller's shopping cart"),
        (name = "orders", description = "Checkout and order history"),
        (name = "admin", description = "Catalog management and user listing")
    ),
    paths(
        // Auth
        crate::handlers::auth::register,
        crate::handlers::auth::login,
        crate::handlers::auth::forgot_password,
        crate::handlers::auth::reset_password,

        // Catalog (public)
        crate::handlers::catalog::list_products,
        crate::handlers::catalog::get_product,
        crate::handlers::catalog::list_products_by_category,
        crate::handlers::catalog::list_categories,
        crate::handlers::catalog::get_category,

        // Cart
        crate::handlers::carts::get_cart,
        crate::handlers::carts::add_item,
        crate::handlers::carts::update_item,
        crate::handlers::carts::remove_item,
        crate::handlers::carts::clear_cart,

        // Orders
        crate::handlers::orders::create_order,
        crate::handlers::orders::list_orders,
        crate::handlers::orders::get_order,

        // Admin
        crate::handlers::admin::list_users,
        crate::handlers::admin::create_category,
        crate::handlers::admin::update_category,
        crate::handlers::admin::delete_category,
        crate::handlers::admin::create_product,
        crate::handlers::admin::update_product,
        crate::handlers::admin::delete_product,
    ),
    components(
        schemas(
            // Common types
            crate::ApiResponse<serde_json::Value>,
            crate::PaginatedResponse<serde_json::Value>,

            // Auth types
            crate::handlers::auth::RegisterRequest,
            crate::handlers::auth::LoginRequest,
            crate::handlers::auth::ForgotPasswordRequest,
            crate::handlers::auth::ResetPasswordRequest,
            crate::auth::IssuedToken,
            crate::services::accounts::LoginResult,
            crate::services::accounts::ResetRequestAck,
            crate::services::accounts::UserSummary,

            // Catalog types
            crate::handlers::catalog::CategoryResponse,
            crate::services::catalog::ProductView,
            crate::services::catalog::CreateCategoryInput,
            crate::services::catalog::UpdateCategoryInput,
            crate::handlers::admin::ProductFormRequest,

            // Cart types
            crate::handlers::carts::AddCartItemRequest,
            crate::handlers::carts::UpdateCartItemRequest,
            crate::services::carts::CartView,
            crate::services::carts::CartLine,

            // Order types
            crate::handlers::orders::CreateOrderRequest,
            crate::services::orders::OrderView,
            crate::services::orders::OrderLineView,

            // Error types
            crate::errors::ErrorResponse
        )
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "Bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDoc::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}
