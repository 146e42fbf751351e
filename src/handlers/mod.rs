pub mod admin;
pub mod auth;
pub mod carts;
pub mod catalog;
pub mod common;
pub mod orders;

use sea_orm::DatabaseConnection;
use std::sync::Arc;

use crate::auth::{AuthRateLimiter, AuthService};
use crate::config::AppConfig;
use crate::events::EventSender;
use crate::notifications::Mailer;
use crate::services::{AccountService, CartService, CatalogService, ImageStore, OrderService};

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub catalog: Arc<CatalogService>,
    pub carts: Arc<CartService>,
    pub orders: Arc<OrderService>,
    pub accounts: Arc<AccountService>,
}

impl AppServices {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        auth_service: Arc<AuthService>,
        mailer: Arc<dyn Mailer>,
        rate_limiter: Arc<AuthRateLimiter>,
        image_store: ImageStore,
        config: &AppConfig,
    ) -> Self {
        let default_page_size = u64::from(config.api_default_page_size);
        let max_page_size = u64::from(config.api_max_page_size);

        let catalog = Arc::new(CatalogService::new(
            db.clone(),
            event_sender.clone(),
            image_store.clone(),
            default_page_size,
            max_page_size,
        ));
        let carts = Arc::new(CartService::new(
            db.clone(),
            event_sender.clone(),
            image_store.clone(),
        ));
        let orders = Arc::new(OrderService::new(
            db.clone(),
            event_sender.clone(),
            image_store,
            max_page_size,
        ));
        let accounts = Arc::new(AccountService::new(
            db,
            event_sender,
            auth_service,
            mailer,
            rate_limiter,
            config,
        ));

        Self {
            catalog,
            carts,
            orders,
            accounts,
        }
    }
}
