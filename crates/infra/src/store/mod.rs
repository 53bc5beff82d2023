//! Store abstractions.
//!
//! The stores are the single source of truth. Everything else (view caches,
//! the fallback location list) is derived from them and may be discarded.
//!
//! Each trait has an in-memory implementation (tests / dev) and a Postgres
//! implementation. Services only depend on the traits.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use salonstock_core::{
    CategoryId, ExpectedVersion, LocationId, ProductId, ProductTypeId, TransferId,
};
use salonstock_directory::{Category, Location, Product, ProductType};
use salonstock_inventory::{
    AdjustmentOutcome, AuditEntry, StockAdjustment, StockKey, StockLevel, Transfer, TransferStatus,
};

use crate::error::ServiceResult;

pub mod in_memory;
pub mod postgres;

pub use in_memory::{InMemoryCatalogStore, InMemoryStockLedger, InMemoryTransferStore};
pub use postgres::{PostgresCatalogStore, PostgresStockLedger, PostgresTransferStore};

/// Product / category / type / location registries.
///
/// `insert_*` fails with `Conflict` when the id is taken; `update_*` fails
/// with `NotFound` when it is not.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn insert_product(&self, product: Product) -> ServiceResult<Product>;
    async fn update_product(&self, product: Product) -> ServiceResult<Product>;
    async fn get_product(&self, id: &ProductId) -> ServiceResult<Option<Product>>;
    async fn list_products(&self) -> ServiceResult<Vec<Product>>;

    async fn insert_category(&self, category: Category) -> ServiceResult<Category>;
    async fn update_category(&self, category: Category) -> ServiceResult<Category>;
    async fn get_category(&self, id: &CategoryId) -> ServiceResult<Option<Category>>;
    async fn list_categories(&self) -> ServiceResult<Vec<Category>>;

    async fn insert_product_type(&self, product_type: ProductType) -> ServiceResult<ProductType>;
    async fn update_product_type(&self, product_type: ProductType) -> ServiceResult<ProductType>;
    async fn get_product_type(&self, id: &ProductTypeId) -> ServiceResult<Option<ProductType>>;
    async fn list_product_types(&self) -> ServiceResult<Vec<ProductType>>;

    async fn insert_location(&self, location: Location) -> ServiceResult<Location>;
    async fn update_location(&self, location: Location) -> ServiceResult<Location>;
    async fn get_location(&self, id: &LocationId) -> ServiceResult<Option<Location>>;
    async fn list_locations(&self) -> ServiceResult<Vec<Location>>;
}

/// A committed adjustment: the caller-facing outcome plus the audit entry
/// written in the same atomic section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedAdjustment {
    pub outcome: AdjustmentOutcome,
    pub entry: AuditEntry,
    /// The transfer leg had already been committed; nothing was written.
    pub replayed: bool,
}

/// LocationStock rows and their audit trail.
#[async_trait]
pub trait StockLedger: Send + Sync {
    /// Current stock of one row; 0 when the row does not exist.
    async fn stock_at(&self, key: &StockKey) -> ServiceResult<i64>;

    async fn levels_for_product(&self, product_id: &ProductId) -> ServiceResult<Vec<StockLevel>>;

    async fn levels_for_location(&self, location_id: &LocationId) -> ServiceResult<Vec<StockLevel>>;

    async fn all_levels(&self) -> ServiceResult<Vec<StockLevel>>;

    /// Atomically check and apply one adjustment.
    ///
    /// Reading the current value, deciding, writing the new value and
    /// appending the audit entry happen as one indivisible step per
    /// `(product, location)` row. Rejections leave the row untouched.
    ///
    /// Transfer legs are idempotent: when the audit trail already holds the
    /// entry for the same transfer, location and direction, that entry is
    /// returned with `replayed` set and the row is not touched again.
    async fn apply(&self, adjustment: &StockAdjustment) -> ServiceResult<AppliedAdjustment>;

    /// Set (or clear) the location-specific price, creating the row if needed.
    async fn set_price(&self, key: &StockKey, price: Option<Decimal>) -> ServiceResult<StockLevel>;

    /// Audit entries for a product, oldest first.
    async fn audit_trail(&self, product_id: &ProductId) -> ServiceResult<Vec<AuditEntry>>;

    /// Change counter of the product's rows, bumped by every committed
    /// adjustment and every price change.
    ///
    /// Monotonic; caches compare it to decide whether an entry is stale.
    async fn revision(&self, product_id: &ProductId) -> ServiceResult<u64>;
}

/// Filters for transfer listings. Every set field must match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferFilter {
    #[serde(default)]
    pub product_id: Option<ProductId>,
    /// Matches either side of the transfer.
    #[serde(default)]
    pub location_id: Option<LocationId>,
    #[serde(default)]
    pub status: Option<TransferStatus>,
}

impl TransferFilter {
    pub fn matches(&self, transfer: &Transfer) -> bool {
        if self
            .product_id
            .as_ref()
            .is_some_and(|p| transfer.product_id() != Some(p))
        {
            return false;
        }
        if self
            .location_id
            .as_ref()
            .is_some_and(|l| !transfer.touches_location(l))
        {
            return false;
        }
        if self.status.is_some_and(|s| s != transfer.status()) {
            return false;
        }
        true
    }
}

/// Transfer records.
#[async_trait]
pub trait TransferStore: Send + Sync {
    /// Persist the aggregate state.
    ///
    /// `expected` is the version the caller loaded (0 for a new transfer);
    /// a mismatch with the stored version fails with `Conflict`.
    async fn save(&self, transfer: &Transfer, expected: ExpectedVersion) -> ServiceResult<()>;

    async fn get(&self, id: TransferId) -> ServiceResult<Option<Transfer>>;

    /// Newest first.
    async fn list(&self, filter: &TransferFilter) -> ServiceResult<Vec<Transfer>>;
}
