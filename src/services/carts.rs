use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, ModelTrait,
    QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entities::cart::{self, Entity as Cart};
use crate::entities::cart_item::{self, Entity as CartItem};
use crate::entities::product::{self, Entity as Product};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::images::ImageStore;

/// Upper bound on the quantity of a single product in a cart, counted
/// across repeated adds.
pub const MAX_LINE_QUANTITY: i32 = 100;

/// Shopping cart service. One cart per user, created lazily on the first
/// add; reads never create anything.
///
/// Every mutation bumps the cart's `version` column atomically, which is
/// what checkout later compares against to detect a cart that changed
/// under it.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    image_store: ImageStore,
}

/// One cart line, priced live from the catalog.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CartLine {
    pub product_id: Uuid,
    pub product_name: String,
    pub unit_price: Decimal,
    pub quantity: i32,
    pub line_total: Decimal,
    pub image_url: Option<String>,
}

/// Cart as served to clients. `cart_id` is `None` until the first item
/// is added.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CartView {
    pub cart_id: Option<Uuid>,
    pub items: Vec<CartLine>,
    pub total: Decimal,
}

impl CartView {
    fn empty() -> Self {
        Self {
            cart_id: None,
            items: Vec::new(),
            total: Decimal::ZERO,
        }
    }
}

impl CartService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        image_store: ImageStore,
    ) -> Self {
        Self {
            db,
            event_sender,
            image_store,
        }
    }

    #[instrument(skip(self))]
    pub async fn get_cart(&self, user_id: Uuid) -> Result<CartView, ServiceError> {
        let cart = Cart::find()
            .filter(cart::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?;

        match cart {
            Some(cart) => self.view_for(&*self.db, &cart).await,
            None => Ok(CartView::empty()),
        }
    }

    #[instrument(skip(self))]
    pub async fn add_item(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<CartView, ServiceError> {
        validate_quantity(quantity)?;

        let txn = self.db.begin().await?;

        let product = Product::find_by_id(product_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;

        let now = chrono::Utc::now();
        let (cart, cart_created) = match Cart::find()
            .filter(cart::Column::UserId.eq(user_id))
            .one(&txn)
            .await?
        {
            Some(cart) => (cart, false),
            None => {
                let cart = cart::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    user_id: Set(user_id),
                    version: Set(0),
                    created_at: Set(now),
                    updated_at: Set(now),
                };
                (cart.insert(&txn).await?, true)
            }
        };

        let existing = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .filter(cart_item::Column::ProductId.eq(product_id))
            .one(&txn)
            .await?;

        match existing {
            Some(line) => {
                let new_quantity = line.quantity.saturating_add(quantity);
                if new_quantity > MAX_LINE_QUANTITY {
                    return Err(ServiceError::ValidationError(format!(
                        "Quantity for product {} cannot exceed {}",
                        product.name, MAX_LINE_QUANTITY
                    )));
                }
                let mut line: cart_item::ActiveModel = line.into();
                line.quantity = Set(new_quantity);
                line.update(&txn).await?;
            }
            None => {
                let line = cart_item::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    cart_id: Set(cart.id),
                    product_id: Set(product_id),
                    quantity: Set(quantity),
                    added_at: Set(now),
                };
                line.insert(&txn).await?;
            }
        }

        self.bump_version(&txn, cart.id).await?;
        txn.commit().await?;

        if cart_created {
            self.event_sender
                .send_or_log(Event::CartCreated(cart.id))
                .await;
        }
        self.event_sender
            .send_or_log(Event::CartItemAdded {
                cart_id: cart.id,
                product_id,
                quantity,
            })
            .await;

        info!(
            "Added {} x product {} to cart {} for user {}",
            quantity, product_id, cart.id, user_id
        );
        self.view_for(&*self.db, &cart).await
    }

    /// Sets the quantity of a cart line. A quantity of zero or less removes
    /// the line instead.
    #[instrument(skip(self))]
    pub async fn update_item(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<CartView, ServiceError> {
        if quantity <= 0 {
            return self.remove_item(user_id, product_id).await;
        }
        validate_quantity(quantity)?;

        let txn = self.db.begin().await?;

        let (cart, line) = self.find_line(&txn, user_id, product_id).await?;

        let mut line: cart_item::ActiveModel = line.into();
        line.quantity = Set(quantity);
        line.update(&txn).await?;

        self.bump_version(&txn, cart.id).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartItemUpdated {
                cart_id: cart.id,
                product_id,
                quantity,
            })
            .await;

        self.view_for(&*self.db, &cart).await
    }

    #[instrument(skip(self))]
    pub async fn remove_item(
        &self,
        user_id: Uuid,
        product_id: Uuid,
    ) -> Result<CartView, ServiceError> {
        let txn = self.db.begin().await?;

        let (cart, line) = self.find_line(&txn, user_id, product_id).await?;
        line.delete(&txn).await?;

        self.bump_version(&txn, cart.id).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartItemRemoved {
                cart_id: cart.id,
                product_id,
            })
            .await;

        info!(
            "Removed product {} from cart {} for user {}",
            product_id, cart.id, user_id
        );
        self.view_for(&*self.db, &cart).await
    }

    /// Empties the cart. Clearing an absent or already empty cart succeeds.
    #[instrument(skip(self))]
    pub async fn clear_cart(&self, user_id: Uuid) -> Result<CartView, ServiceError> {
        let cart = Cart::find()
            .filter(cart::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?;

        let Some(cart) = cart else {
            return Ok(CartView::empty());
        };

        let txn = self.db.begin().await?;
        CartItem::delete_many()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .exec(&txn)
            .await?;
        self.bump_version(&txn, cart.id).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartCleared(cart.id))
            .await;

        info!("Cleared cart {} for user {}", cart.id, user_id);
        self.view_for(&*self.db, &cart).await
    }

    async fn find_line<C: ConnectionTrait>(
        &self,
        conn: &C,
        user_id: Uuid,
        product_id: Uuid,
    ) -> Result<(cart::Model, cart_item::Model), ServiceError> {
        let not_in_cart =
            || ServiceError::NotFound(format!("Product {} is not in the cart", product_id));

        let cart = Cart::find()
            .filter(cart::Column::UserId.eq(user_id))
            .one(conn)
            .await?
            .ok_or_else(not_in_cart)?;

        let line = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .filter(cart_item::Column::ProductId.eq(product_id))
            .one(conn)
            .await?
            .ok_or_else(not_in_cart)?;

        Ok((cart, line))
    }

    async fn bump_version<C: ConnectionTrait>(
        &self,
        conn: &C,
        cart_id: Uuid,
    ) -> Result<(), ServiceError> {
        // Atomic increment, not read-modify-write, so concurrent mutations
        // cannot lose a bump and mask a changed cart from checkout.
        Cart::update_many()
            .col_expr(
                cart::Column::Version,
                Expr::col(cart::Column::Version).add(1),
            )
            .col_expr(cart::Column::UpdatedAt, Expr::value(chrono::Utc::now()))
            .filter(cart::Column::Id.eq(cart_id))
            .exec(conn)
            .await?;
        Ok(())
    }

    async fn view_for<C: ConnectionTrait>(
        &self,
        conn: &C,
        cart: &cart::Model,
    ) -> Result<CartView, ServiceError> {
        let rows = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .find_also_related(Product)
            .order_by_asc(cart_item::Column::AddedAt)
            .all(conn)
            .await?;

        let mut items = Vec::with_capacity(rows.len());
        for (line, product) in rows {
            let Some(product) = product else {
                // The FK cascade removes these rows with the product; a line
                // without one cannot be priced.
                warn!(
                    "Cart {} references missing product {}",
                    cart.id, line.product_id
                );
                continue;
            };
            let image_url = product
                .image_name
                .as_deref()
                .map(|name| self.image_store.url_for(name));
            items.push(CartLine {
                product_id: product.id,
                product_name: product.name,
                unit_price: product.price,
                quantity: line.quantity,
                line_total: product.price * Decimal::from(line.quantity),
                image_url,
            });
        }

        let total = items.iter().map(|line| line.line_total).sum();
        Ok(CartView {
            cart_id: Some(cart.id),
            items,
            total,
        })
    }
}

fn validate_quantity(quantity: i32) -> Result<(), ServiceError> {
    if quantity < 1 {
        return Err(ServiceError::ValidationError(
            "Quantity must be at least 1".to_string(),
        ));
    }
    if quantity > MAX_LINE_QUANTITY {
        return Err(ServiceError::ValidationError(format!(
            "Quantity cannot exceed {} per product",
            MAX_LINE_QUANTITY
        )));
    }
    Ok(())
}
