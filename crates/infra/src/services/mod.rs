//! Application services: the logical operations, composed from the stores.
//!
//! ```text
//! AdjustStock ──► DirectoryService (resolve active) ──► StockLedger::apply ──► EventPublisher
//! CreateTransfer ─► TransferStore (pending) ─► leg 1 ─► leg 2 (retry) ─┬─► completed
//!                                                                    └─► compensation ─► cancelled
//! Inventory reads ─► InventoryCache (revision checked) ─► StockLedger
//! ```

use std::sync::Arc;

use salonstock_events::{EventBus, EventEnvelope, InMemoryEventBus, Subscription};
use salonstock_inventory::InventoryEvent;

use crate::cache::{InventoryCache, LocationCache};
use crate::config::AppConfig;
use crate::store::{CatalogStore, StockLedger, TransferStore};

pub mod adjustment;
pub mod directory;
pub mod inventory_view;
pub mod transfer;

pub use adjustment::AdjustmentService;
pub use directory::DirectoryService;
pub use inventory_view::{
    InventoryRow, InventoryView, LocationScope, LocationStockView, ProductListing, ProductStock,
};
pub use transfer::{CreateTransferRequest, TransferService};

/// Publishes committed inventory facts.
///
/// Publishing happens after the store committed; a failed publish is logged
/// and never rolls the operation back (caches re-check the ledger revision).
#[derive(Debug, Clone, Default)]
pub struct EventPublisher {
    bus: Arc<InMemoryEventBus<EventEnvelope<InventoryEvent>>>,
}

impl EventPublisher {
    pub fn new(bus: Arc<InMemoryEventBus<EventEnvelope<InventoryEvent>>>) -> Self {
        Self { bus }
    }

    pub fn publish(&self, event: InventoryEvent) {
        let envelope = EventEnvelope::wrap(event);
        let event_type = envelope.event_type().to_string();
        if let Err(e) = self.bus.publish(envelope) {
            tracing::warn!(event_type = %event_type, error = ?e, "failed to publish inventory event");
        }
    }

    pub fn subscribe(&self) -> Subscription<EventEnvelope<InventoryEvent>> {
        self.bus.subscribe()
    }
}

/// Every service, wired over one set of stores.
#[derive(Clone)]
pub struct InventoryServices {
    pub directory: Arc<DirectoryService>,
    pub adjustments: Arc<AdjustmentService>,
    pub transfers: Arc<TransferService>,
    pub view: Arc<InventoryView>,
    pub events: EventPublisher,
}

impl InventoryServices {
    pub fn build(
        catalog: Arc<dyn CatalogStore>,
        ledger: Arc<dyn StockLedger>,
        transfer_store: Arc<dyn TransferStore>,
        location_cache: Arc<LocationCache>,
        config: &AppConfig,
    ) -> Self {
        let events = EventPublisher::default();
        let inventory_cache = Arc::new(InventoryCache::with_invalidations(
            config.inventory_cache_ttl,
            events.subscribe(),
        ));

        let directory = Arc::new(DirectoryService::new(catalog, location_cache));
        let adjustments = Arc::new(AdjustmentService::new(
            directory.clone(),
            ledger.clone(),
            events.clone(),
        ));
        let transfers = Arc::new(TransferService::new(
            directory.clone(),
            adjustments.clone(),
            ledger.clone(),
            transfer_store,
            events.clone(),
            config.transfer_retry,
        ));
        let view = Arc::new(InventoryView::new(directory.clone(), ledger, inventory_cache));

        Self {
            directory,
            adjustments,
            transfers,
            view,
            events,
        }
    }

    /// In-memory stores; used by tests and when persistence is disabled.
    pub fn in_memory(config: &AppConfig) -> Self {
        use crate::store::{InMemoryCatalogStore, InMemoryStockLedger, InMemoryTransferStore};

        Self::build(
            Arc::new(InMemoryCatalogStore::new()),
            Arc::new(InMemoryStockLedger::new()),
            Arc::new(InMemoryTransferStore::new()),
            Arc::new(LocationCache::new()),
            config,
        )
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Shared fixtures for service tests.

    use salonstock_core::{CategoryId, LocationId, ProductId};
    use salonstock_directory::{Actor, NewLocation, NewProduct, NewRegistryEntry, StaffRole};
    use salonstock_inventory::{AdjustmentType, StockAdjustment};

    use super::*;

    pub fn pid(raw: &str) -> ProductId {
        ProductId::parse(raw).unwrap()
    }

    pub fn lid(raw: &str) -> LocationId {
        LocationId::parse(raw).unwrap()
    }

    pub fn manager() -> Actor {
        Actor::new("u-1", StaffRole::Manager).unwrap()
    }

    pub fn adjustment(product: &str, location: &str, kind: AdjustmentType, quantity: i64) -> StockAdjustment {
        StockAdjustment {
            product_id: pid(product),
            location_id: lid(location),
            adjustment_type: kind,
            quantity,
            reason: "stock count".into(),
            notes: None,
            actor: manager(),
            transfer_id: None,
        }
    }

    /// Catalog with product `P1` (retail, min_stock 2) and salons `Spa-A`, `Spa-B`.
    pub async fn seed_catalog(services: &InventoryServices) {
        services
            .directory
            .create_category(NewRegistryEntry {
                id: CategoryId::parse("hair-care").unwrap(),
                name: "Hair care".into(),
                is_active: true,
            })
            .await
            .unwrap();
        services
            .directory
            .create_product(NewProduct {
                id: pid("P1"),
                name: "Argan Oil Serum".into(),
                category: CategoryId::parse("hair-care").unwrap(),
                product_type: None,
                is_retail: true,
                is_active: true,
                cost: None,
                price: None,
                min_stock: 2,
            })
            .await
            .unwrap();
        for (id, name) in [("Spa-A", "Spa A"), ("Spa-B", "Spa B")] {
            services
                .directory
                .create_location(NewLocation {
                    id: lid(id),
                    name: name.into(),
                    kind: salonstock_directory::LocationKind::Physical,
                    status: salonstock_directory::LocationStatus::Active,
                })
                .await
                .unwrap();
        }
    }

    pub async fn stocked(quantity_at_a: i64) -> InventoryServices {
        let services = InventoryServices::in_memory(&AppConfig::default());
        seed_catalog(&services).await;
        if quantity_at_a > 0 {
            services
                .adjustments
                .adjust(adjustment("P1", "Spa-A", AdjustmentType::Add, quantity_at_a))
                .await
                .unwrap();
        }
        services
    }
}
