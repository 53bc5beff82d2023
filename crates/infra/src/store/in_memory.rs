use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;

use salonstock_core::{
    AggregateRoot, CategoryId, DomainError, Entity, ExpectedVersion, LocationId, ProductId,
    ProductTypeId, ResourceKind, TransferId,
};
use salonstock_directory::{Category, Location, Product, ProductType};
use salonstock_inventory::{AdjustmentOutcome, AuditEntry, StockAdjustment, StockKey, StockLevel, Transfer};

use super::{AppliedAdjustment, CatalogStore, StockLedger, TransferFilter, TransferStore};
use crate::error::{ServiceResult, StoreError};

fn poisoned() -> StoreError {
    StoreError::Unavailable("lock poisoned".to_string())
}

fn insert_unique<K: Ord + Clone + core::fmt::Display, V: Clone>(
    map: &mut BTreeMap<K, V>,
    id: &K,
    value: V,
    kind: ResourceKind,
) -> ServiceResult<V> {
    if map.contains_key(id) {
        return Err(DomainError::conflict(format!("{kind} already exists: {id}")).into());
    }
    map.insert(id.clone(), value.clone());
    Ok(value)
}

fn replace_existing<K: Ord + Clone + core::fmt::Display, V: Clone>(
    map: &mut BTreeMap<K, V>,
    id: &K,
    value: V,
    kind: ResourceKind,
) -> ServiceResult<V> {
    match map.get_mut(id) {
        Some(slot) => {
            *slot = value.clone();
            Ok(value)
        }
        None => Err(DomainError::not_found(kind, id).into()),
    }
}

#[derive(Debug, Default)]
struct CatalogState {
    products: BTreeMap<ProductId, Product>,
    categories: BTreeMap<CategoryId, Category>,
    product_types: BTreeMap<ProductTypeId, ProductType>,
    locations: BTreeMap<LocationId, Location>,
}

/// In-memory directory registries.
///
/// Intended for tests/dev. Starts with the synthetic `home` and `online`
/// locations.
#[derive(Debug)]
pub struct InMemoryCatalogStore {
    state: RwLock<CatalogState>,
}

impl Default for InMemoryCatalogStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCatalogStore {
    pub fn new() -> Self {
        let now = Utc::now();
        let mut state = CatalogState::default();
        for location in [Location::home(now), Location::online(now)] {
            state.locations.insert(location.id.clone(), location);
        }
        Self {
            state: RwLock::new(state),
        }
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalogStore {
    async fn insert_product(&self, product: Product) -> ServiceResult<Product> {
        let mut state = self.state.write().map_err(|_| poisoned())?;
        let id = product.id.clone();
        insert_unique(&mut state.products, &id, product, ResourceKind::Product)
    }

    async fn update_product(&self, product: Product) -> ServiceResult<Product> {
        let mut state = self.state.write().map_err(|_| poisoned())?;
        let id = product.id.clone();
        replace_existing(&mut state.products, &id, product, ResourceKind::Product)
    }

    async fn get_product(&self, id: &ProductId) -> ServiceResult<Option<Product>> {
        let state = self.state.read().map_err(|_| poisoned())?;
        Ok(state.products.get(id).cloned())
    }

    async fn list_products(&self) -> ServiceResult<Vec<Product>> {
        let state = self.state.read().map_err(|_| poisoned())?;
        Ok(state.products.values().cloned().collect())
    }

    async fn insert_category(&self, category: Category) -> ServiceResult<Category> {
        let mut state = self.state.write().map_err(|_| poisoned())?;
        let id = category.id.clone();
        insert_unique(&mut state.categories, &id, category, ResourceKind::Category)
    }

    async fn update_category(&self, category: Category) -> ServiceResult<Category> {
        let mut state = self.state.write().map_err(|_| poisoned())?;
        let id = category.id.clone();
        replace_existing(&mut state.categories, &id, category, ResourceKind::Category)
    }

    async fn get_category(&self, id: &CategoryId) -> ServiceResult<Option<Category>> {
        let state = self.state.read().map_err(|_| poisoned())?;
        Ok(state.categories.get(id).cloned())
    }

    async fn list_categories(&self) -> ServiceResult<Vec<Category>> {
        let state = self.state.read().map_err(|_| poisoned())?;
        Ok(state.categories.values().cloned().collect())
    }

    async fn insert_product_type(&self, product_type: ProductType) -> ServiceResult<ProductType> {
        let mut state = self.state.write().map_err(|_| poisoned())?;
        let id = product_type.id.clone();
        insert_unique(&mut state.product_types, &id, product_type, ResourceKind::ProductType)
    }

    async fn update_product_type(&self, product_type: ProductType) -> ServiceResult<ProductType> {
        let mut state = self.state.write().map_err(|_| poisoned())?;
        let id = product_type.id.clone();
        replace_existing(&mut state.product_types, &id, product_type, ResourceKind::ProductType)
    }

    async fn get_product_type(&self, id: &ProductTypeId) -> ServiceResult<Option<ProductType>> {
        let state = self.state.read().map_err(|_| poisoned())?;
        Ok(state.product_types.get(id).cloned())
    }

    async fn list_product_types(&self) -> ServiceResult<Vec<ProductType>> {
        let state = self.state.read().map_err(|_| poisoned())?;
        Ok(state.product_types.values().cloned().collect())
    }

    async fn insert_location(&self, location: Location) -> ServiceResult<Location> {
        let mut state = self.state.write().map_err(|_| poisoned())?;
        let id = location.id().clone();
        insert_unique(&mut state.locations, &id, location, ResourceKind::Location)
    }

    async fn update_location(&self, location: Location) -> ServiceResult<Location> {
        let mut state = self.state.write().map_err(|_| poisoned())?;
        let id = location.id().clone();
        replace_existing(&mut state.locations, &id, location, ResourceKind::Location)
    }

    async fn get_location(&self, id: &LocationId) -> ServiceResult<Option<Location>> {
        let state = self.state.read().map_err(|_| poisoned())?;
        Ok(state.locations.get(id).cloned())
    }

    async fn list_locations(&self) -> ServiceResult<Vec<Location>> {
        let state = self.state.read().map_err(|_| poisoned())?;
        Ok(state.locations.values().cloned().collect())
    }
}

#[derive(Debug, Default)]
struct LedgerState {
    levels: BTreeMap<StockKey, StockLevel>,
    audit: Vec<AuditEntry>,
    revisions: HashMap<ProductId, u64>,
}

/// In-memory stock ledger.
///
/// One mutex guards every row, so the read-decide-write of an adjustment is
/// a single critical section.
#[derive(Debug, Default)]
pub struct InMemoryStockLedger {
    state: Mutex<LedgerState>,
}

impl InMemoryStockLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StockLedger for InMemoryStockLedger {
    async fn stock_at(&self, key: &StockKey) -> ServiceResult<i64> {
        let state = self.state.lock().map_err(|_| poisoned())?;
        Ok(state.levels.get(key).map(|l| l.stock).unwrap_or(0))
    }

    async fn levels_for_product(&self, product_id: &ProductId) -> ServiceResult<Vec<StockLevel>> {
        let state = self.state.lock().map_err(|_| poisoned())?;
        Ok(state
            .levels
            .values()
            .filter(|l| &l.product_id == product_id)
            .cloned()
            .collect())
    }

    async fn levels_for_location(&self, location_id: &LocationId) -> ServiceResult<Vec<StockLevel>> {
        let state = self.state.lock().map_err(|_| poisoned())?;
        Ok(state
            .levels
            .values()
            .filter(|l| &l.location_id == location_id)
            .cloned()
            .collect())
    }

    async fn all_levels(&self) -> ServiceResult<Vec<StockLevel>> {
        let state = self.state.lock().map_err(|_| poisoned())?;
        Ok(state.levels.values().cloned().collect())
    }

    async fn apply(&self, adjustment: &StockAdjustment) -> ServiceResult<AppliedAdjustment> {
        let mut state = self.state.lock().map_err(|_| poisoned())?;
        let key = adjustment.key();

        if let Some(entry) = state.audit.iter().rev().find(|e| e.records_leg(adjustment)) {
            return Ok(AppliedAdjustment {
                outcome: entry.into(),
                entry: entry.clone(),
                replayed: true,
            });
        }

        let previous_stock = state.levels.get(&key).map(|l| l.stock).unwrap_or(0);
        let new_stock = adjustment.apply_to(previous_stock)?;
        let now = Utc::now();

        let level = state.levels.entry(key).or_insert_with(|| StockLevel {
            product_id: adjustment.product_id.clone(),
            location_id: adjustment.location_id.clone(),
            stock: 0,
            price: None,
            updated_at: now,
        });
        level.stock = new_stock;
        level.updated_at = now;

        let entry = adjustment.audit_entry(previous_stock, new_stock, now);
        state.audit.push(entry.clone());
        *state
            .revisions
            .entry(adjustment.product_id.clone())
            .or_default() += 1;

        Ok(AppliedAdjustment {
            outcome: AdjustmentOutcome {
                previous_stock,
                new_stock,
                adjustment: adjustment.quantity,
                audit_entry_id: entry.id,
            },
            entry,
            replayed: false,
        })
    }

    async fn set_price(&self, key: &StockKey, price: Option<Decimal>) -> ServiceResult<StockLevel> {
        let mut state = self.state.lock().map_err(|_| poisoned())?;
        let now = Utc::now();
        let level = state.levels.entry(key.clone()).or_insert_with(|| StockLevel {
            product_id: key.product_id.clone(),
            location_id: key.location_id.clone(),
            stock: 0,
            price: None,
            updated_at: now,
        });
        level.price = price;
        level.updated_at = now;
        let level = level.clone();
        *state.revisions.entry(key.product_id.clone()).or_default() += 1;
        Ok(level)
    }

    async fn audit_trail(&self, product_id: &ProductId) -> ServiceResult<Vec<AuditEntry>> {
        let state = self.state.lock().map_err(|_| poisoned())?;
        Ok(state
            .audit
            .iter()
            .filter(|e| &e.product_id == product_id)
            .cloned()
            .collect())
    }

    async fn revision(&self, product_id: &ProductId) -> ServiceResult<u64> {
        let state = self.state.lock().map_err(|_| poisoned())?;
        Ok(state.revisions.get(product_id).copied().unwrap_or(0))
    }
}

/// In-memory transfer records.
#[derive(Debug, Default)]
pub struct InMemoryTransferStore {
    transfers: RwLock<BTreeMap<TransferId, Transfer>>,
}

impl InMemoryTransferStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TransferStore for InMemoryTransferStore {
    async fn save(&self, transfer: &Transfer, expected: ExpectedVersion) -> ServiceResult<()> {
        let mut transfers = self.transfers.write().map_err(|_| poisoned())?;
        let current = transfers
            .get(&transfer.id_typed())
            .map(|t| t.version())
            .unwrap_or(0);
        expected.check(current)?;
        transfers.insert(transfer.id_typed(), transfer.clone());
        Ok(())
    }

    async fn get(&self, id: TransferId) -> ServiceResult<Option<Transfer>> {
        let transfers = self.transfers.read().map_err(|_| poisoned())?;
        Ok(transfers.get(&id).cloned())
    }

    async fn list(&self, filter: &TransferFilter) -> ServiceResult<Vec<Transfer>> {
        let transfers = self.transfers.read().map_err(|_| poisoned())?;
        // v7 ids sort by creation time.
        Ok(transfers
            .values()
            .rev()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect())
    }
}
