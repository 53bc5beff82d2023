//! Product / category / type / location directory.
//!
//! Plain CRUD registries that the stock operations consult to validate
//! identifiers and active status, plus the name-based location
//! de-duplication used when merging the primary store with a fallback cache.

pub mod location;
pub mod product;
pub mod registry;
pub mod role;

pub use location::{
    DedupOutcome, HOME_LOCATION_ID, Location, LocationKind, LocationStatus, NewLocation,
    ONLINE_LOCATION_ID, dedup_by_name, merge_locations,
};
pub use product::{NewProduct, Product, ProductFilter, ProductUpdate};
pub use registry::{Category, NewRegistryEntry, ProductType};
pub use role::{Actor, StaffRole};
