pub mod models;
pub mod pii;

pub use models::events::OrderStatusChangedEvent;
pub use models::order::{
    ItemSnapshot, Order, OrderItem, OrderStatus, ShippingAddress, StatusTransitionError, Tracking,
};
pub use models::product::{Product, ProductImage, ProductVariant, VariantRecord};
pub use models::profile::{Profile, Role, SubscriptionStatus};
pub use pii::Masked;
