pub mod inventory;
pub mod pricing;
pub mod sync;

pub use inventory::{check_availability, InventoryError};
pub use pricing::{Markup, MarkupSettings, PricingEngine, PricingError};
pub use sync::{plan_sync, CatalogSync, StockReport, SyncPlan, SyncReport};
