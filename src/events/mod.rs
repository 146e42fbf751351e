use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::metrics::BUSINESS_METRICS;

/// Handle used by services to publish domain events onto the in-process
/// channel. Cloning is cheap; all clones feed the same receiver.
#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event, surfacing channel failures to the caller.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event and only logs on failure. Used where event delivery
    /// must not fail the surrounding request.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!("Dropping event: {}", e);
        }
    }
}

// The domain events the storefront emits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Account events
    UserRegistered(Uuid),
    UserLoggedIn(Uuid),
    PasswordResetRequested(Uuid),
    PasswordResetCompleted(Uuid),

    // Catalog events
    CategoryCreated(Uuid),
    CategoryUpdated(Uuid),
    CategoryDeleted(Uuid),
    ProductCreated(Uuid),
    ProductUpdated(Uuid),
    ProductDeleted(Uuid),

    // Cart events
    CartCreated(Uuid),
    CartItemAdded {
        cart_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    },
    CartItemUpdated {
        cart_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    },
    CartItemRemoved {
        cart_id: Uuid,
        product_id: Uuid,
    },
    CartCleared(Uuid),

    // Order events
    OrderCreated {
        order_id: Uuid,
        user_id: Uuid,
        placed_at: DateTime<Utc>,
    },
}

// Consumes events off the channel, logs them and keeps the business
// counters current. Runs as a background task for the process lifetime.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        BUSINESS_METRICS.events_processed.inc();

        match event {
            Event::UserRegistered(user_id) => {
                BUSINESS_METRICS.users_registered.inc();
                info!("User registered: {}", user_id);
            }
            Event::UserLoggedIn(user_id) => {
                BUSINESS_METRICS.logins_succeeded.inc();
                info!("User logged in: {}", user_id);
            }
            Event::PasswordResetRequested(user_id) => {
                BUSINESS_METRICS.password_resets_requested.inc();
                info!("Password reset requested for user {}", user_id);
            }
            Event::PasswordResetCompleted(user_id) => {
                BUSINESS_METRICS.password_resets_completed.inc();
                info!("Password reset completed for user {}", user_id);
            }
            Event::CategoryCreated(category_id) => {
                info!("Category created: {}", category_id);
            }
            Event::CategoryUpdated(category_id) => {
                info!("Category updated: {}", category_id);
            }
            Event::CategoryDeleted(category_id) => {
                info!("Category deleted: {}", category_id);
            }
            Event::ProductCreated(product_id) => {
                info!("Product created: {}", product_id);
            }
            Event::ProductUpdated(product_id) => {
                info!("Product updated: {}", product_id);
            }
            Event::ProductDeleted(product_id) => {
                info!("Product deleted: {}", product_id);
            }
            Event::CartCreated(cart_id) => {
                BUSINESS_METRICS.carts_created.inc();
                info!("Cart created: {}", cart_id);
            }
            Event::CartItemAdded {
                cart_id,
                product_id,
                quantity,
            } => {
                BUSINESS_METRICS.cart_items_added.inc();
                info!(
                    "Cart item added: cart={}, product={}, quantity={}",
                    cart_id, product_id, quantity
                );
            }
            Event::CartItemUpdated {
                cart_id,
                product_id,
                quantity,
            } => {
                info!(
                    "Cart item updated: cart={}, product={}, quantity={}",
                    cart_id, product_id, quantity
                );
            }
            Event::CartItemRemoved {
                cart_id,
                product_id,
            } => {
                info!("Cart item removed: cart={}, product={}", cart_id, product_id);
            }
            Event::CartCleared(cart_id) => {
                info!("Cart cleared: {}", cart_id);
            }
            Event::OrderCreated {
                order_id,
                user_id,
                placed_at,
            } => {
                BUSINESS_METRICS.orders_created.inc();
                info!(
                    "Order created: order={}, user={}, placed_at={}",
                    order_id, user_id, placed_at
                );
            }
        }
    }

    warn!("Event processing loop has ended");
}
