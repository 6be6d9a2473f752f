pub mod events;
pub mod order;
pub mod product;
pub mod profile;
