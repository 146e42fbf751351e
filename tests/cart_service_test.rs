mod common;

use assert_matches::assert_matches;
use common::TestApp;
use rust_decimal_macros::dec;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use storefront_api::{
    entities::cart, errors::ServiceError, services::catalog::UpdateProductInput,
};
use uuid::Uuid;

async fn cart_version(app: &TestApp, user_id: Uuid) -> i32 {
    cart::Entity::find()
        .filter(cart::Column::UserId.eq(user_id))
        .one(&*app.state.db)
        .await
        .expect("query cart")
        .expect("cart should exist")
        .version
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn test_get_cart_without_cart_is_empty() {
    let app = TestApp::new().await;
    let (user_id, _) = app
        .register_user("empty-cart@example.com", "Password123!")
        .await;

    let view = app
        .state
        .services
        .carts
        .get_cart(user_id)
        .await
        .expect("get cart");

    assert_eq!(view.cart_id, None);
    assert!(view.items.is_empty());
    assert_eq!(view.total, dec!(0));

    // Reading must not create a cart row
    let row = cart::Entity::find()
        .filter(cart::Column::UserId.eq(user_id))
        .one(&*app.state.db)
        .await
        .expect("query cart");
    assert!(row.is_none());
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn test_add_item_creates_cart_lazily() {
    let app = TestApp::new().await;
    let (user_id, _) = app
        .register_user("lazy-cart@example.com", "Password123!")
        .await;
    let category = app.seed_category("Gadgets").await;
    let product = app.seed_product(category, "Pocket Gadget", dec!(19.99)).await;

    let view = app
        .state
        .services
        .carts
        .add_item(user_id, product.id, 2)
        .await
        .expect("add item");

    assert!(view.cart_id.is_some());
    assert_eq!(view.items.len(), 1);
    assert_eq!(view.items[0].product_id, product.id);
    assert_eq!(view.items[0].quantity, 2);
    assert_eq!(view.items[0].unit_price, dec!(19.99));
    assert_eq!(view.items[0].line_total, dec!(39.98));
    assert_eq!(view.total, dec!(39.98));
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn test_adding_same_product_merges_quantities() {
    let app = TestApp::new().await;
    let (user_id, _) = app
        .register_user("merge-cart@example.com", "Password123!")
        .await;
    let category = app.seed_category("Gadgets").await;
    let product = app.seed_product(category, "Merge Gadget", dec!(10.00)).await;

    let carts = &app.state.services.carts;
    carts
        .add_item(user_id, product.id, 2)
        .await
        .expect("first add");
    let view = carts
        .add_item(user_id, product.id, 3)
        .await
        .expect("second add");

    assert_eq!(view.items.len(), 1, "repeated adds must merge into one line");
    assert_eq!(view.items[0].quantity, 5);
    assert_eq!(view.total, dec!(50.00));
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn test_add_item_rejects_bad_quantities() {
    let app = TestApp::new().await;
    let (user_id, _) = app
        .register_user("bad-qty@example.com", "Password123!")
        .await;
    let category = app.seed_category("Gadgets").await;
    let product = app.seed_product(category, "Strict Gadget", dec!(5.00)).await;

    let carts = &app.state.services.carts;

    let zero = carts.add_item(user_id, product.id, 0).await;
    assert_matches!(zero, Err(ServiceError::ValidationError(_)));

    let negative = carts.add_item(user_id, product.id, -4).await;
    assert_matches!(negative, Err(ServiceError::ValidationError(_)));

    let oversized = carts.add_item(user_id, product.id, 101).await;
    assert_matches!(oversized, Err(ServiceError::ValidationError(_)));
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn test_add_item_for_unknown_product_is_not_found() {
    let app = TestApp::new().await;
    let (user_id, _) = app
        .register_user("ghost-product@example.com", "Password123!")
        .await;

    let result = app
        .state
        .services
        .carts
        .add_item(user_id, Uuid::new_v4(), 1)
        .await;

    assert_matches!(result, Err(ServiceError::NotFound(_)));
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn test_merged_quantity_cannot_exceed_cap() {
    let app = TestApp::new().await;
    let (user_id, _) = app
        .register_user("capped-cart@example.com", "Password123!")
        .await;
    let category = app.seed_category("Gadgets").await;
    let product = app.seed_product(category, "Bulk Gadget", dec!(1.00)).await;

    let carts = &app.state.services.carts;
    carts
        .add_item(user_id, product.id, 60)
        .await
        .expect("first add");

    let result = carts.add_item(user_id, product.id, 50).await;
    assert_matches!(result, Err(ServiceError::ValidationError(_)));

    // The failed add must roll back, leaving the original line untouched
    let view = carts.get_cart(user_id).await.expect("get cart");
    assert_eq!(view.items[0].quantity, 60);
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn test_update_item_sets_quantity() {
    let app = TestApp::new().await;
    let (user_id, _) = app
        .register_user("update-cart@example.com", "Password123!")
        .await;
    let category = app.seed_category("Gadgets").await;
    let product = app.seed_product(category, "Tunable Gadget", dec!(3.50)).await;

    let carts = &app.state.services.carts;
    carts.add_item(user_id, product.id, 2).await.expect("add");

    let view = carts
        .update_item(user_id, product.id, 7)
        .await
        .expect("update quantity");

    assert_eq!(view.items[0].quantity, 7);
    assert_eq!(view.total, dec!(24.50));
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn test_update_to_zero_removes_line() {
    let app = TestApp::new().await;
    let (user_id, _) = app
        .register_user("zero-cart@example.com", "Password123!")
        .await;
    let category = app.seed_category("Gadgets").await;
    let product = app.seed_product(category, "Fleeting Gadget", dec!(8.00)).await;

    let carts = &app.state.services.carts;
    carts.add_item(user_id, product.id, 3).await.expect("add");

    let view = carts
        .update_item(user_id, product.id, 0)
        .await
        .expect("update to zero");

    assert!(view.items.is_empty());
    assert_eq!(view.total, dec!(0));
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn test_update_and_remove_missing_line_are_not_found() {
    let app = TestApp::new().await;
    let (user_id, _) = app
        .register_user("missing-line@example.com", "Password123!")
        .await;
    let category = app.seed_category("Gadgets").await;
    let in_cart = app.seed_product(category, "Present Gadget", dec!(2.00)).await;
    let absent = app.seed_product(category, "Absent Gadget", dec!(2.00)).await;

    let carts = &app.state.services.carts;
    carts.add_item(user_id, in_cart.id, 1).await.expect("add");

    let update = carts.update_item(user_id, absent.id, 4).await;
    assert_matches!(update, Err(ServiceError::NotFound(_)));

    let remove = carts.remove_item(user_id, absent.id).await;
    assert_matches!(remove, Err(ServiceError::NotFound(_)));
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn test_clear_cart_is_idempotent() {
    let app = TestApp::new().await;
    let (user_id, _) = app
        .register_user("clear-cart@example.com", "Password123!")
        .await;
    let category = app.seed_category("Gadgets").await;
    let product = app.seed_product(category, "Clearable Gadget", dec!(6.00)).await;

    let carts = &app.state.services.carts;

    // Clearing before any cart exists succeeds quietly
    let before = carts.clear_cart(user_id).await.expect("clear without cart");
    assert!(before.items.is_empty());

    carts.add_item(user_id, product.id, 2).await.expect("add");
    let cleared = carts.clear_cart(user_id).await.expect("clear cart");
    assert!(cleared.items.is_empty());
    assert_eq!(cleared.total, dec!(0));

    let again = carts.clear_cart(user_id).await.expect("clear empty cart");
    assert!(again.items.is_empty());
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn test_cart_prices_follow_catalog() {
    let app = TestApp::new().await;
    let (user_id, _) = app
        .register_user("live-price@example.com", "Password123!")
        .await;
    let category = app.seed_category("Gadgets").await;
    let product = app.seed_product(category, "Repriced Gadget", dec!(10.00)).await;

    let carts = &app.state.services.carts;
    carts.add_item(user_id, product.id, 2).await.expect("add");

    app.state
        .services
        .catalog
        .update_product(
            product.id,
            UpdateProductInput {
                name: product.name.clone(),
                description: product.description.clone(),
                price: dec!(12.50),
                weight: product.weight,
                category_id: category,
            },
            None,
        )
        .await
        .expect("update product price");

    let view = carts.get_cart(user_id).await.expect("get cart");
    assert_eq!(view.items[0].unit_price, dec!(12.50));
    assert_eq!(view.total, dec!(25.00), "cart totals are priced live");
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn test_every_mutation_bumps_cart_version() {
    let app = TestApp::new().await;
    let (user_id, _) = app
        .register_user("versioned@example.com", "Password123!")
        .await;
    let category = app.seed_category("Gadgets").await;
    let first = app.seed_product(category, "First Gadget", dec!(1.00)).await;
    let second = app.seed_product(category, "Second Gadget", dec!(2.00)).await;

    let carts = &app.state.services.carts;

    carts.add_item(user_id, first.id, 1).await.expect("add first");
    assert_eq!(cart_version(&app, user_id).await, 1);

    carts
        .add_item(user_id, second.id, 1)
        .await
        .expect("add second");
    assert_eq!(cart_version(&app, user_id).await, 2);

    carts
        .update_item(user_id, first.id, 5)
        .await
        .expect("update first");
    assert_eq!(cart_version(&app, user_id).await, 3);

    carts
        .remove_item(user_id, second.id)
        .await
        .expect("remove second");
    assert_eq!(cart_version(&app, user_id).await, 4);

    carts.clear_cart(user_id).await.expect("clear");
    assert_eq!(cart_version(&app, user_id).await, 5);
}
