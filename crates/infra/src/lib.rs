//! Infrastructure layer: stores, caches, config and the application services.
//!
//! - `store`: catalog, stock ledger and transfer stores, each with an
//!   in-memory and a Postgres (sqlx) backend.
//! - `cache`: the inventory read cache and the location fallback snapshot.
//! - `services`: the operations the API exposes, composed over the stores.

pub mod cache;
pub mod config;
pub mod error;
pub mod seed;
pub mod services;
pub mod store;

pub use config::{AppConfig, RetryPolicy};
pub use error::{ServiceError, ServiceResult, StoreError, TransferError};
pub use services::InventoryServices;
