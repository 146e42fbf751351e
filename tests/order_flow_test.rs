//! Checkout and order lifecycle tests.
//!
//! Exercises the cart-to-order conversion end to end: address handling,
//! price freezing, cart clearing, per-user scoping, and what happens when
//! two checkouts race over the same cart.
//!
//! Run with: cargo test --features mock-tests

mod common;

use assert_matches::assert_matches;
use axum::http::{Method, StatusCode};
use common::{response_json, TestApp};
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use serde_json::json;
use uuid::Uuid;

use storefront_api::entities::user;
use storefront_api::errors::ServiceError;
use storefront_api::services::orders::CheckoutInput;

const SHIPPING: &str = "1 Main Street, Springfield";

async fn add_to_cart(app: &TestApp, token: &str, product_id: Uuid, quantity: i32) {
    let response = app
        .request(
            Method::POST,
            "/api/v1/cart/items",
            Some(json!({"product_id": product_id, "quantity": quantity})),
            Some(token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK, "add to cart");
}

async fn checkout(app: &TestApp, token: &str) -> serde_json::Value {
    let response = app
        .request(
            Method::POST,
            "/api/v1/orders",
            Some(json!({"shipping_address": SHIPPING})),
            Some(token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED, "checkout");
    response_json(response).await
}

// ==================== Checkout ====================

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn test_checkout_turns_cart_into_order() {
    let app = TestApp::new().await;
    let (_, token) = app
        .register_user("buyer.basic@storefront.test", "BuyerPass123!")
        .await;
    let category_id = app.seed_category("Checkout").await;
    let product = app.seed_product(category_id, "Boxed Set", dec!(19.99)).await;

    add_to_cart(&app, &token, product.id, 2).await;

    let body = checkout(&app, &token).await;
    assert_eq!(body["success"], json!(true));
    let order = &body["data"];

    let order_number = order["order_number"].as_str().expect("order number");
    assert!(
        order_number.starts_with("ORD-"),
        "unexpected order number {}",
        order_number
    );
    assert_eq!(order["status"], json!("pending"));
    assert_eq!(order["total_amount"], json!("39.98"));
    assert_eq!(order["shipping_address"], json!(SHIPPING));
    // Billing falls back to shipping when omitted.
    assert_eq!(order["billing_address"], json!(SHIPPING));
    assert!(order["placed_at"].is_string());

    let items = order["items"].as_array().expect("order items");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["product_name"], json!("Boxed Set"));
    assert_eq!(items[0]["quantity"], json!(2));
    assert_eq!(items[0]["unit_price"], json!("19.99"));
    assert_eq!(items[0]["line_total"], json!("39.98"));
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn test_checkout_honors_explicit_billing_address() {
    let app = TestApp::new().await;
    let (_, token) = app
        .register_user("buyer.billing@storefront.test", "BuyerPass123!")
        .await;
    let category_id = app.seed_category("Billing").await;
    let product = app.seed_product(category_id, "Invoice Me", dec!(15.00)).await;

    add_to_cart(&app, &token, product.id, 1).await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/orders",
            Some(json!({
                "shipping_address": SHIPPING,
                "billing_address": "2 Accounting Lane, Springfield"
            })),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = response_json(response).await;
    assert_eq!(body["data"]["shipping_address"], json!(SHIPPING));
    assert_eq!(
        body["data"]["billing_address"],
        json!("2 Accounting Lane, Springfield")
    );
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn test_checkout_clears_the_cart() {
    let app = TestApp::new().await;
    let (user_id, token) = app
        .register_user("buyer.clears@storefront.test", "BuyerPass123!")
        .await;
    let category_id = app.seed_category("Cleared").await;
    let product = app.seed_product(category_id, "One Off", dec!(7.50)).await;

    add_to_cart(&app, &token, product.id, 3).await;
    checkout(&app, &token).await;

    let response = app
        .request(Method::GET, "/api/v1/cart", None, Some(&token))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["items"].as_array().map(Vec::len), Some(0));
    assert_eq!(body["data"]["total"], json!("0"));

    // A second checkout straight away finds nothing to order.
    let err = app
        .state
        .services
        .orders
        .create_order_from_cart(
            user_id,
            CheckoutInput {
                shipping_address: SHIPPING.to_string(),
                billing_address: None,
            },
        )
        .await
        .expect_err("empty cart cannot be ordered");
    assert_matches!(err, ServiceError::InvalidOperation(_));
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn test_checkout_with_empty_cart_is_rejected() {
    let app = TestApp::new().await;
    let (_, token) = app
        .register_user("buyer.empty@storefront.test", "BuyerPass123!")
        .await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/orders",
            Some(json!({"shipping_address": SHIPPING})),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response_json(response).await;
    let message = body["message"].as_str().expect("error message");
    assert!(
        message.contains("empty cart"),
        "unexpected message: {}",
        message
    );
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn test_checkout_requires_shipping_address() {
    let app = TestApp::new().await;
    let (_, token) = app
        .register_user("buyer.noaddr@storefront.test", "BuyerPass123!")
        .await;
    let category_id = app.seed_category("Unaddressed").await;
    let product = app.seed_product(category_id, "Waiting", dec!(3.00)).await;

    add_to_cart(&app, &token, product.id, 1).await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/orders",
            Some(json!({"shipping_address": "   "})),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // The rejected checkout must not have consumed the cart.
    let response = app
        .request(Method::GET, "/api/v1/cart", None, Some(&token))
        .await;
    let body = response_json(response).await;
    assert_eq!(body["data"]["items"].as_array().map(Vec::len), Some(1));
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn test_checkout_requires_an_active_account() {
    let app = TestApp::new().await;
    let (user_id, token) = app
        .register_user("buyer.inactive@storefront.test", "BuyerPass123!")
        .await;
    let category_id = app.seed_category("Suspended").await;
    let product = app.seed_product(category_id, "Held", dec!(4.00)).await;

    add_to_cart(&app, &token, product.id, 1).await;

    // Deactivate the account while the token is still live.
    let account = user::Entity::find_by_id(user_id)
        .one(app.state.db.as_ref())
        .await
        .expect("load user")
        .expect("user exists");
    let mut account: user::ActiveModel = account.into();
    account.active = Set(false);
    account
        .update(app.state.db.as_ref())
        .await
        .expect("deactivate user");

    let response = app
        .request(
            Method::POST,
            "/api/v1/orders",
            Some(json!({"shipping_address": SHIPPING})),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

// ==================== Pricing ====================

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn test_order_pricing_is_frozen_at_checkout() {
    let app = TestApp::new().await;
    let (_, token) = app
        .register_user("buyer.frozen@storefront.test", "BuyerPass123!")
        .await;
    let category_id = app.seed_category("Volatile").await;
    let product = app.seed_product(category_id, "Repriced", dec!(10.25)).await;

    add_to_cart(&app, &token, product.id, 1).await;
    let body = checkout(&app, &token).await;
    let order_id = body["data"]["id"].as_str().expect("order id").to_string();

    // Reprice the product after the order is placed.
    app.state
        .services
        .catalog
        .update_product(
            product.id,
            common::update_input(category_id, "Repriced", dec!(25.75)),
            None,
        )
        .await
        .expect("reprice product");

    // The order keeps the checkout-time price.
    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/orders/{}", order_id),
            None,
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["total_amount"], json!("10.25"));
    assert_eq!(body["data"]["items"][0]["unit_price"], json!("10.25"));

    // A fresh cart line sees the new price.
    add_to_cart(&app, &token, product.id, 1).await;
    let response = app
        .request(Method::GET, "/api/v1/cart", None, Some(&token))
        .await;
    let body = response_json(response).await;
    assert_eq!(body["data"]["items"][0]["unit_price"], json!("25.75"));
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn test_order_lines_survive_product_deletion() {
    let app = TestApp::new().await;
    let (_, token) = app
        .register_user("buyer.survivor@storefront.test", "BuyerPass123!")
        .await;
    let category_id = app.seed_category("Ephemeral").await;
    let product = app.seed_product(category_id, "Discontinued", dec!(8.25)).await;

    add_to_cart(&app, &token, product.id, 2).await;
    let body = checkout(&app, &token).await;
    let order_id = body["data"]["id"].as_str().expect("order id").to_string();

    app.state
        .services
        .catalog
        .delete_product(product.id)
        .await
        .expect("delete product");

    // The catalog no longer knows the product.
    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/products/{}", product.id),
            None,
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // The order still carries its snapshotted name and price.
    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/orders/{}", order_id),
            None,
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    let item = &body["data"]["items"][0];
    assert_eq!(item["product_name"], json!("Discontinued"));
    assert_eq!(item["unit_price"], json!("8.25"));
    assert_eq!(item["image_url"], json!(null));
}

// ==================== Scoping and Listing ====================

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn test_orders_are_scoped_to_their_owner() {
    let app = TestApp::new().await;
    let (_, owner_token) = app
        .register_user("owner@storefront.test", "OwnerPass123!")
        .await;
    let (_, other_token) = app
        .register_user("other@storefront.test", "OtherPass123!")
        .await;
    let category_id = app.seed_category("Private").await;
    let product = app.seed_product(category_id, "Mine", dec!(12.00)).await;

    add_to_cart(&app, &owner_token, product.id, 1).await;
    let body = checkout(&app, &owner_token).await;
    let order_id = body["data"]["id"].as_str().expect("order id").to_string();

    // Someone else's order reads exactly like a missing one.
    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/orders/{}", order_id),
            None,
            Some(&other_token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // And it does not appear in their listing.
    let response = app
        .request(Method::GET, "/api/v1/orders", None, Some(&other_token))
        .await;
    let body = response_json(response).await;
    assert_eq!(body["data"]["total"], json!(0));

    // Anonymous access is refused outright.
    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/orders/{}", order_id),
            None,
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn test_orders_list_newest_first() {
    let app = TestApp::new().await;
    let (_, token) = app
        .register_user("buyer.history@storefront.test", "BuyerPass123!")
        .await;
    let category_id = app.seed_category("History").await;
    let product = app.seed_product(category_id, "Repeat Buy", dec!(6.00)).await;

    add_to_cart(&app, &token, product.id, 1).await;
    let first = checkout(&app, &token).await;
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    add_to_cart(&app, &token, product.id, 2).await;
    let second = checkout(&app, &token).await;

    let response = app
        .request(Method::GET, "/api/v1/orders?page=1&per_page=10", None, Some(&token))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    let data = &body["data"];
    assert_eq!(data["total"], json!(2));
    assert_eq!(data["page"], json!(1));
    assert_eq!(data["total_pages"], json!(1));

    let items = data["items"].as_array().expect("order page");
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["id"], second["data"]["id"], "latest order first");
    assert_eq!(items[1]["id"], first["data"]["id"]);
    // Every listed order carries its lines.
    assert_eq!(items[0]["items"].as_array().map(Vec::len), Some(1));
    assert_eq!(items[0]["items"][0]["quantity"], json!(2));
}

// ==================== Races ====================

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn test_concurrent_checkout_places_exactly_one_order() {
    let app = TestApp::new().await;
    let (user_id, token) = app
        .register_user("buyer.race@storefront.test", "BuyerPass123!")
        .await;
    let category_id = app.seed_category("Contested").await;
    let product = app.seed_product(category_id, "Hot Item", dec!(99.00)).await;

    add_to_cart(&app, &token, product.id, 1).await;

    let orders = &app.state.services.orders;
    let input = || CheckoutInput {
        shipping_address: SHIPPING.to_string(),
        billing_address: None,
    };
    let (left, right) = tokio::join!(
        orders.create_order_from_cart(user_id, input()),
        orders.create_order_from_cart(user_id, input()),
    );

    let outcomes = [left, right];
    let placed = outcomes.iter().filter(|r| r.is_ok()).count();
    assert_eq!(placed, 1, "exactly one checkout may win");
    let err = outcomes
        .into_iter()
        .find_map(Result::err)
        .expect("one checkout must lose");
    assert_matches!(
        err,
        ServiceError::InvalidOperation(_) | ServiceError::ConcurrentModification(_)
    );

    // One order on record, and the cart is spent.
    let page = orders.list_orders(user_id, 1, 10).await.expect("list orders");
    assert_eq!(page.total, 1);
    let cart = app
        .state
        .services
        .carts
        .get_cart(user_id)
        .await
        .expect("get cart");
    assert!(cart.items.is_empty());
}
