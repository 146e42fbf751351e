pub mod cart;
pub mod cart_item;
pub mod category;
pub mod order;
pub mod order_item;
pub mod password_reset_token;
pub mod product;
pub mod user;
pub mod user_role;
