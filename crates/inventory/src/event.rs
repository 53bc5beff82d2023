use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use salonstock_core::{AuditEntryId, LocationId, ProductId, TransferId};
use salonstock_events::Event;

use crate::stock::AuditEntry;
use crate::transfer::TransferEvent;

/// Event: StockAdjusted (one committed LocationStock change).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAdjusted {
    pub audit_entry_id: AuditEntryId,
    pub product_id: ProductId,
    pub location_id: LocationId,
    pub delta: i64,
    pub new_stock: i64,
    pub transfer_id: Option<TransferId>,
    pub occurred_at: DateTime<Utc>,
}

impl From<&AuditEntry> for StockAdjusted {
    fn from(entry: &AuditEntry) -> Self {
        Self {
            audit_entry_id: entry.id,
            product_id: entry.product_id.clone(),
            location_id: entry.location_id.clone(),
            delta: entry.delta,
            new_stock: entry.new_stock,
            transfer_id: entry.transfer_id,
            occurred_at: entry.timestamp,
        }
    }
}

/// Event: PriceChanged (location-specific price override set or cleared).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceChanged {
    pub product_id: ProductId,
    pub location_id: LocationId,
    pub price: Option<Decimal>,
    pub occurred_at: DateTime<Utc>,
}

/// Everything the inventory module publishes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InventoryEvent {
    StockAdjusted(StockAdjusted),
    PriceChanged(PriceChanged),
    Transfer(TransferEvent),
}

impl InventoryEvent {
    /// The product whose derived figures this event invalidates.
    pub fn product_id(&self) -> Option<&ProductId> {
        match self {
            InventoryEvent::StockAdjusted(e) => Some(&e.product_id),
            InventoryEvent::PriceChanged(e) => Some(&e.product_id),
            InventoryEvent::Transfer(TransferEvent::Created(e)) => Some(&e.product_id),
            InventoryEvent::Transfer(TransferEvent::Completed(e)) => Some(&e.product_id),
            InventoryEvent::Transfer(TransferEvent::Cancelled(_)) => None,
        }
    }
}

impl Event for InventoryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            InventoryEvent::StockAdjusted(_) => "inventory.stock.adjusted",
            InventoryEvent::PriceChanged(_) => "inventory.stock.price_changed",
            InventoryEvent::Transfer(e) => e.event_type(),
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            InventoryEvent::StockAdjusted(e) => e.occurred_at,
            InventoryEvent::PriceChanged(e) => e.occurred_at,
            InventoryEvent::Transfer(e) => e.occurred_at(),
        }
    }
}
