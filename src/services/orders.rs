use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entities::cart::{self, Entity as Cart};
use crate::entities::cart_item::{self, Entity as CartItem};
use crate::entities::order::{self, Entity as Order};
use crate::entities::order_item::{self, Entity as OrderItem};
use crate::entities::product::{self, Entity as Product};
use crate::entities::user::Entity as User;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::images::ImageStore;

/// Order service. Checkout turns the caller's cart into an order inside a
/// single transaction; reads scope every query to the owning user so a
/// foreign order is indistinguishable from a missing one.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    image_store: ImageStore,
    max_page_size: u64,
}

/// Order line as served to clients. `product_name` and `unit_price` are the
/// checkout-time snapshots; only `image_url` is resolved live and may be
/// `None` once the product is gone.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OrderLineView {
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OrderView {
    pub id: Uuid,
    pub order_number: String,
    pub status: String,
    pub total_amount: Decimal,
    pub shipping_address: String,
    pub billing_address: String,
    #[schema(value_type = String, format = DateTime)]
    pub placed_at: DateTime<Utc>,
    pub items: Vec<OrderLineView>,
}

/// One page of orders plus the unpaged total.
#[derive(Debug, Clone)]
pub struct OrderPage {
    pub orders: Vec<OrderView>,
    pub total: u64,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CheckoutInput {
    pub shipping_address: String,
    /// Defaults to the shipping address when omitted or blank.
    pub billing_address: Option<String>,
}

impl OrderService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        image_store: ImageStore,
        max_page_size: u64,
    ) -> Self {
        Self {
            db,
            event_sender,
            image_store,
            max_page_size,
        }
    }

    /// Converts the user's cart into an order. The whole operation is one
    /// transaction: pricing, order and line inserts, and the cart clear
    /// either all land or none do.
    #[instrument(skip(self, input))]
    pub async fn create_order_from_cart(
        &self,
        user_id: Uuid,
        input: CheckoutInput,
    ) -> Result<OrderView, ServiceError> {
        let shipping_address = input.shipping_address.trim().to_string();
        if shipping_address.is_empty() {
            return Err(ServiceError::ValidationError(
                "Shipping address is required".to_string(),
            ));
        }
        if shipping_address.len() > 500 {
            return Err(ServiceError::ValidationError(
                "Shipping address is too long".to_string(),
            ));
        }
        let billing_address = input
            .billing_address
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| shipping_address.clone());
        if billing_address.len() > 500 {
            return Err(ServiceError::ValidationError(
                "Billing address is too long".to_string(),
            ));
        }

        let txn = self.db.begin().await?;

        // A valid token for a deleted account must not be able to order.
        let user = User::find_by_id(user_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::Unauthorized("User account not found".to_string()))?;
        if !user.active {
            return Err(ServiceError::Unauthorized(
                "User account is inactive".to_string(),
            ));
        }

        let cart = Cart::find()
            .filter(cart::Column::UserId.eq(user_id))
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::InvalidOperation(
                    "Cannot create an order from an empty cart".to_string(),
                )
            })?;
        let cart_version = cart.version;

        let lines = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .order_by_asc(cart_item::Column::AddedAt)
            .all(&txn)
            .await?;
        if lines.is_empty() {
            return Err(ServiceError::InvalidOperation(
                "Cannot create an order from an empty cart".to_string(),
            ));
        }

        // Re-resolve every product for its current price. A product removed
        // since it was carted fails the whole checkout rather than silently
        // shrinking the order.
        let product_ids: Vec<Uuid> = lines.iter().map(|line| line.product_id).collect();
        let products: HashMap<Uuid, product::Model> = Product::find()
            .filter(product::Column::Id.is_in(product_ids))
            .all(&txn)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        let mut priced = Vec::with_capacity(lines.len());
        for line in &lines {
            let product = products.get(&line.product_id).ok_or_else(|| {
                ServiceError::Conflict(format!(
                    "Product {} is no longer available",
                    line.product_id
                ))
            })?;
            priced.push((product, line.quantity));
        }

        let total_amount: Decimal = priced
            .iter()
            .map(|(product, quantity)| product.price * Decimal::from(*quantity))
            .sum();

        let order_id = Uuid::new_v4();
        let order = order::ActiveModel {
            id: Set(order_id),
            order_number: Set(format!(
                "ORD-{}",
                order_id.to_string()[..8].to_uppercase()
            )),
            user_id: Set(user_id),
            status: Set(order::OrderStatus::Pending),
            total_amount: Set(total_amount),
            shipping_address: Set(shipping_address),
            billing_address: Set(billing_address),
            ..Default::default()
        };
        let order = order.insert(&txn).await?;

        let now = Utc::now();
        for (product, quantity) in &priced {
            let item = order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(product.id),
                product_name: Set(product.name.clone()),
                quantity: Set(*quantity),
                unit_price: Set(product.price),
                created_at: Set(now),
            };
            item.insert(&txn).await?;
        }

        // Optimistic check: any cart mutation since the lines were read has
        // bumped the version, so zero affected rows means the order would be
        // built from stale lines and must not go through.
        let bumped = Cart::update_many()
            .col_expr(
                cart::Column::Version,
                Expr::col(cart::Column::Version).add(1),
            )
            .col_expr(cart::Column::UpdatedAt, Expr::value(now))
            .filter(cart::Column::Id.eq(cart.id))
            .filter(cart::Column::Version.eq(cart_version))
            .exec(&txn)
            .await?;
        if bumped.rows_affected == 0 {
            return Err(ServiceError::ConcurrentModification(cart.id));
        }

        CartItem::delete_many()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .exec(&txn)
            .await?;

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::OrderCreated {
                order_id,
                user_id,
                placed_at: order.created_at,
            })
            .await;

        info!(
            "Created order {} ({}) for user {}, total {}",
            order_id, order.order_number, user_id, total_amount
        );

        let mut views = self.views_for(&*self.db, vec![order]).await?;
        views
            .pop()
            .ok_or_else(|| ServiceError::InternalError("Order vanished after commit".to_string()))
    }

    #[instrument(skip(self))]
    pub async fn get_order(
        &self,
        user_id: Uuid,
        order_id: Uuid,
    ) -> Result<OrderView, ServiceError> {
        // Ownership is part of the predicate: someone else's order reads the
        // same as a missing one.
        let order = Order::find_by_id(order_id)
            .filter(order::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let mut views = self.views_for(&*self.db, vec![order]).await?;
        views
            .pop()
            .ok_or_else(|| ServiceError::InternalError("Order vanished mid-read".to_string()))
    }

    #[instrument(skip(self))]
    pub async fn list_orders(
        &self,
        user_id: Uuid,
        page: u64,
        per_page: u64,
    ) -> Result<OrderPage, ServiceError> {
        let page = page.max(1);
        let per_page = per_page.clamp(1, self.max_page_size);

        let paginator = Order::find()
            .filter(order::Column::UserId.eq(user_id))
            .order_by_desc(order::Column::CreatedAt)
            .paginate(&*self.db, per_page);

        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page - 1).await?;
        let orders = self.views_for(&*self.db, orders).await?;

        Ok(OrderPage { orders, total })
    }

    /// Assembles full views for a batch of orders with two follow-up queries
    /// instead of one per order.
    async fn views_for<C: ConnectionTrait>(
        &self,
        conn: &C,
        orders: Vec<order::Model>,
    ) -> Result<Vec<OrderView>, ServiceError> {
        if orders.is_empty() {
            return Ok(Vec::new());
        }

        let order_ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
        let items = OrderItem::find()
            .filter(order_item::Column::OrderId.is_in(order_ids))
            .order_by_asc(order_item::Column::CreatedAt)
            .all(conn)
            .await?;

        let product_ids: Vec<Uuid> = items.iter().map(|item| item.product_id).collect();
        let image_names: HashMap<Uuid, Option<String>> = if product_ids.is_empty() {
            HashMap::new()
        } else {
            Product::find()
                .filter(product::Column::Id.is_in(product_ids))
                .all(conn)
                .await?
                .into_iter()
                .map(|p| (p.id, p.image_name))
                .collect()
        };

        let mut lines_by_order: HashMap<Uuid, Vec<OrderLineView>> = HashMap::new();
        for item in items {
            let image_url = image_names
                .get(&item.product_id)
                .and_then(|name| name.as_deref())
                .map(|name| self.image_store.url_for(name));
            lines_by_order
                .entry(item.order_id)
                .or_default()
                .push(OrderLineView {
                    product_id: item.product_id,
                    product_name: item.product_name.clone(),
                    quantity: item.quantity,
                    unit_price: item.unit_price,
                    line_total: item.line_total(),
                    image_url,
                });
        }

        Ok(orders
            .into_iter()
            .map(|order| OrderView {
                id: order.id,
                order_number: order.order_number,
                status: order.status.to_string(),
                total_amount: order.total_amount,
                shipping_address: order.shipping_address,
                billing_address: order.billing_address,
                placed_at: order.created_at,
                items: lines_by_order.remove(&order.id).unwrap_or_default(),
            })
            .collect())
    }
}
