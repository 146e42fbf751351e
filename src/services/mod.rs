// Storefront services
pub mod accounts;
pub mod carts;
pub mod catalog;
pub mod images;
pub mod orders;

pub use accounts::AccountService;
pub use carts::CartService;
pub use catalog::CatalogService;
pub use images::ImageStore;
pub use orders::OrderService;
