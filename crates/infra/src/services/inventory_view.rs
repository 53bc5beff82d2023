use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use salonstock_core::{CategoryId, DomainError, LocationId, ProductId};
use salonstock_directory::{ONLINE_LOCATION_ID, Product, ProductFilter};
use salonstock_inventory::{AuditEntry, StockKey, StockLevel};

use super::DirectoryService;
use crate::cache::InventoryCache;
use crate::error::ServiceResult;
use crate::store::StockLedger;

/// Which stock figure an inventory listing reports.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LocationScope {
    /// Total over every location.
    #[default]
    All,
    Location(LocationId),
}

impl FromStr for LocationScope {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" | "all" => Ok(LocationScope::All),
            id => Ok(LocationScope::Location(LocationId::parse(id)?)),
        }
    }
}

/// One line of the inventory screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryRow {
    pub product_id: ProductId,
    pub name: String,
    pub category: CategoryId,
    pub stock: i64,
    pub min_stock: i64,
    pub low_stock: bool,
    pub is_retail: bool,
    pub is_active: bool,
}

impl InventoryRow {
    fn new(product: &Product, stock: i64) -> Self {
        Self {
            product_id: product.id.clone(),
            name: product.name.clone(),
            category: product.category.clone(),
            stock,
            min_stock: product.min_stock,
            low_stock: product.is_low_stock(stock),
            is_retail: product.is_retail,
            is_active: product.is_active,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationStockView {
    pub location_id: LocationId,
    pub stock: i64,
    pub price: Option<Decimal>,
}

impl From<&StockLevel> for LocationStockView {
    fn from(level: &StockLevel) -> Self {
        Self {
            location_id: level.location_id.clone(),
            stock: level.stock,
            price: level.price,
        }
    }
}

/// Per-location breakdown of one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductStock {
    pub product_id: ProductId,
    pub total: i64,
    pub locations: Vec<LocationStockView>,
}

/// A product record together with its stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductListing {
    #[serde(flatten)]
    pub product: Product,
    pub total_stock: i64,
    pub locations: Vec<LocationStockView>,
}

/// Read side of the ledger: totals, per-location figures and listings.
///
/// Per-product reads go through the `InventoryCache`. The ledger revision is
/// read first and the cached rows are served only when computed at that same
/// revision, so a read never misses an adjustment that completed before it.
pub struct InventoryView {
    directory: Arc<DirectoryService>,
    ledger: Arc<dyn StockLedger>,
    cache: Arc<InventoryCache>,
}

impl InventoryView {
    pub fn new(directory: Arc<DirectoryService>, ledger: Arc<dyn StockLedger>, cache: Arc<InventoryCache>) -> Self {
        Self {
            directory,
            ledger,
            cache,
        }
    }

    async fn levels(&self, product_id: &ProductId) -> ServiceResult<Vec<StockLevel>> {
        let revision = self.ledger.revision(product_id).await?;
        if let Some(levels) = self.cache.get(product_id, revision) {
            return Ok(levels);
        }

        let levels = self.ledger.levels_for_product(product_id).await?;
        self.cache.put(product_id.clone(), revision, levels.clone());
        Ok(levels)
    }

    pub async fn total_stock(&self, product_id: &ProductId) -> ServiceResult<i64> {
        self.directory.product(product_id).await?;
        Ok(self.levels(product_id).await?.iter().map(|l| l.stock).sum())
    }

    /// Stock of a product at one location; 0 when the row does not exist yet.
    pub async fn stock_at(&self, product_id: &ProductId, location_id: &LocationId) -> ServiceResult<i64> {
        self.directory.product(product_id).await?;
        self.directory.location(location_id).await?;

        Ok(self
            .levels(product_id)
            .await?
            .iter()
            .find(|l| &l.location_id == location_id)
            .map(|l| l.stock)
            .unwrap_or(0))
    }

    pub async fn product_stock(&self, product_id: &ProductId) -> ServiceResult<ProductStock> {
        self.directory.product(product_id).await?;
        let levels = self.levels(product_id).await?;

        Ok(ProductStock {
            product_id: product_id.clone(),
            total: levels.iter().map(|l| l.stock).sum(),
            locations: levels.iter().map(LocationStockView::from).collect(),
        })
    }

    /// The price that applies at a location: the override if set, else the
    /// product's base price.
    pub async fn effective_price(&self, key: &StockKey) -> ServiceResult<Option<Decimal>> {
        let product = self.directory.product(&key.product_id).await?;
        self.directory.location(&key.location_id).await?;

        let override_price = self
            .levels(&key.product_id)
            .await?
            .iter()
            .find(|l| l.location_id == key.location_id)
            .and_then(|l| l.price);
        Ok(override_price.or(product.price))
    }

    /// One row per product. For a single location the stock is that
    /// location's; for `All` it is the total.
    #[instrument(skip(self), err)]
    pub async fn get_inventory(&self, scope: &LocationScope) -> ServiceResult<Vec<InventoryRow>> {
        let levels = match scope {
            LocationScope::All => self.ledger.all_levels().await?,
            LocationScope::Location(id) => {
                self.directory.location(id).await?;
                self.ledger.levels_for_location(id).await?
            }
        };

        let mut stock: HashMap<ProductId, i64> = HashMap::new();
        for level in levels {
            *stock.entry(level.product_id).or_default() += level.stock;
        }

        let products = self.directory.list_products(&ProductFilter::default()).await?;
        Ok(products
            .iter()
            .map(|p| InventoryRow::new(p, stock.get(&p.id).copied().unwrap_or(0)))
            .collect())
    }

    /// Rows at or below their reorder threshold.
    pub async fn low_stock(&self, scope: &LocationScope) -> ServiceResult<Vec<InventoryRow>> {
        let mut rows = self.get_inventory(scope).await?;
        rows.retain(|r| r.low_stock);
        Ok(rows)
    }

    /// Whether the client-facing shop may offer the product.
    pub async fn online_available(&self, product_id: &ProductId) -> ServiceResult<bool> {
        let product = self.directory.product(product_id).await?;
        if !product.is_active || !product.is_retail {
            return Ok(false);
        }

        let online = LocationId::parse(ONLINE_LOCATION_ID)?;
        Ok(self.stock_at(product_id, &online).await? > 0)
    }

    /// Products matching `filter`, each with its stock. With a location the
    /// breakdown is narrowed to that location.
    pub async fn list_products(
        &self,
        filter: &ProductFilter,
        location_id: Option<&LocationId>,
    ) -> ServiceResult<Vec<ProductListing>> {
        if let Some(id) = location_id {
            self.directory.location(id).await?;
        }

        let products = self.directory.list_products(filter).await?;
        let mut listings = Vec::with_capacity(products.len());
        for product in products {
            let levels = self.levels(&product.id).await?;
            let total_stock = levels.iter().map(|l| l.stock).sum();
            let locations = levels
                .iter()
                .filter(|l| location_id.is_none_or(|id| &l.location_id == id))
                .map(LocationStockView::from)
                .collect();
            listings.push(ProductListing {
                product,
                total_stock,
                locations,
            });
        }
        Ok(listings)
    }

    pub async fn audit_trail(&self, product_id: &ProductId) -> ServiceResult<Vec<AuditEntry>> {
        self.directory.product(product_id).await?;
        self.ledger.audit_trail(product_id).await
    }

    /// Drop the cached figures of one product.
    pub fn invalidate(&self, product_id: &ProductId) {
        self.cache.invalidate(product_id);
    }

    /// Drop every cached figure.
    pub fn refresh(&self) {
        self.cache.clear();
        tracing::debug!("inventory cache cleared");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use salonstock_inventory::AdjustmentType;

    use super::*;
    use crate::services::testing::{adjustment, lid, pid, stocked};

    #[tokio::test]
    async fn stock_at_unknown_location_is_not_found_and_missing_row_is_zero() {
        let services = stocked(5).await;

        assert_eq!(services.view.stock_at(&pid("P1"), &lid("Spa-B")).await.unwrap(), 0);
        let err = services.view.stock_at(&pid("P1"), &lid("Nowhere")).await.unwrap_err();
        assert!(matches!(err.as_domain(), Some(DomainError::NotFound { .. })));
    }

    #[tokio::test]
    async fn reads_after_an_adjustment_are_never_stale() {
        let services = stocked(5).await;
        assert_eq!(services.view.total_stock(&pid("P1")).await.unwrap(), 5);
        assert!(!services.view.cache.is_empty());

        services
            .adjustments
            .adjust(adjustment("P1", "Spa-B", AdjustmentType::Add, 3))
            .await
            .unwrap();
        assert_eq!(services.view.total_stock(&pid("P1")).await.unwrap(), 8);
    }

    #[tokio::test]
    async fn stale_entries_are_rejected_even_without_bus_events() {
        let services = stocked(5).await;
        let view = InventoryView::new(
            services.directory.clone(),
            services.view.ledger.clone(),
            Arc::new(InventoryCache::new(Duration::from_secs(300))),
        );
        assert_eq!(view.total_stock(&pid("P1")).await.unwrap(), 5);

        services
            .adjustments
            .adjust(adjustment("P1", "Spa-A", AdjustmentType::Remove, 2))
            .await
            .unwrap();
        assert_eq!(view.total_stock(&pid("P1")).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn inventory_scopes_and_low_stock() {
        let services = stocked(5).await;
        services
            .adjustments
            .adjust(adjustment("P1", "Spa-B", AdjustmentType::Add, 1))
            .await
            .unwrap();

        let all = services.view.get_inventory(&LocationScope::All).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].stock, 6);
        assert!(!all[0].low_stock);

        let at_b = services
            .view
            .get_inventory(&LocationScope::Location(lid("Spa-B")))
            .await
            .unwrap();
        assert_eq!(at_b[0].stock, 1);
        assert!(at_b[0].low_stock);

        let low = services
            .view
            .low_stock(&"Spa-B".parse::<LocationScope>().unwrap())
            .await
            .unwrap();
        assert_eq!(low.len(), 1);
        assert!(services.view.low_stock(&LocationScope::All).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn online_availability_needs_stock_at_online() {
        let services = stocked(5).await;
        assert!(!services.view.online_available(&pid("P1")).await.unwrap());

        services
            .adjustments
            .adjust(adjustment("P1", "online", AdjustmentType::Add, 2))
            .await
            .unwrap();
        assert!(services.view.online_available(&pid("P1")).await.unwrap());

        services.directory.set_product_active(&pid("P1"), false).await.unwrap();
        assert!(!services.view.online_available(&pid("P1")).await.unwrap());
    }

    #[tokio::test]
    async fn price_override_is_visible_immediately() {
        let services = stocked(5).await;
        let key = StockKey::new(pid("P1"), lid("Spa-A"));
        assert_eq!(services.view.effective_price(&key).await.unwrap(), None);

        services
            .adjustments
            .set_price(&key, Some(Decimal::new(1999, 2)))
            .await
            .unwrap();
        assert_eq!(
            services.view.effective_price(&key).await.unwrap(),
            Some(Decimal::new(1999, 2))
        );

        let breakdown = services.view.product_stock(&pid("P1")).await.unwrap();
        assert_eq!(breakdown.total, 5);
        assert_eq!(breakdown.locations[0].price, Some(Decimal::new(1999, 2)));
    }

    #[tokio::test]
    async fn price_override_is_seen_without_bus_events() {
        let services = stocked(5).await;
        let view = InventoryView::new(
            services.directory.clone(),
            services.view.ledger.clone(),
            Arc::new(InventoryCache::new(Duration::from_secs(300))),
        );
        let key = StockKey::new(pid("P1"), lid("Spa-A"));
        assert_eq!(view.effective_price(&key).await.unwrap(), None);

        services
            .adjustments
            .set_price(&key, Some(Decimal::new(1999, 2)))
            .await
            .unwrap();
        assert_eq!(view.effective_price(&key).await.unwrap(), Some(Decimal::new(1999, 2)));
    }

    #[tokio::test]
    async fn listing_narrows_to_location() {
        let services = stocked(5).await;
        services
            .adjustments
            .adjust(adjustment("P1", "Spa-B", AdjustmentType::Add, 2))
            .await
            .unwrap();

        let listings = services
            .view
            .list_products(&ProductFilter::default(), Some(&lid("Spa-B")))
            .await
            .unwrap();
        assert_eq!(listings[0].total_stock, 7);
        assert_eq!(listings[0].locations.len(), 1);
        assert_eq!(listings[0].locations[0].stock, 2);
    }

    #[test]
    fn scope_parses_all_or_location() {
        assert_eq!("all".parse::<LocationScope>().unwrap(), LocationScope::All);
        assert_eq!(
            "Spa-A".parse::<LocationScope>().unwrap(),
            LocationScope::Location(lid("Spa-A"))
        );
    }
}
