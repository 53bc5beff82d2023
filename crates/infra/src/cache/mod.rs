//! Derived, discardable views over the stores.

pub mod inventory;
pub mod location;

pub use inventory::{InventoryCache, InventoryInvalidations};
pub use location::LocationCache;
