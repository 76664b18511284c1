pub mod interaction;
pub mod order;
pub mod product;
pub mod user;
