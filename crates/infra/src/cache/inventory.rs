use std::collections::HashMap;
use std::sync::{Mutex, RwLock};
use std::time::{Duration, Instant};

use salonstock_core::ProductId;
use salonstock_events::{EventEnvelope, Subscription};
use salonstock_inventory::{InventoryEvent, StockLevel};

/// Subscription through which committed stock changes reach the cache.
pub type InventoryInvalidations = Subscription<EventEnvelope<InventoryEvent>>;

#[derive(Debug, Clone)]
struct Entry {
    revision: u64,
    cached_at: Instant,
    levels: Vec<StockLevel>,
}

/// Read-through cache of per-product stock rows.
///
/// An entry is served only if
/// - no invalidation for its product is pending on the bus,
/// - it was computed at the ledger revision the caller just read, and
/// - it is younger than the TTL.
///
/// The revision check alone keeps reads correct when an event is lost;
/// the bus just frees memory early.
#[derive(Debug)]
pub struct InventoryCache {
    entries: RwLock<HashMap<ProductId, Entry>>,
    invalidations: Option<Mutex<InventoryInvalidations>>,
    ttl: Duration,
}

impl InventoryCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            invalidations: None,
            ttl,
        }
    }

    pub fn with_invalidations(ttl: Duration, invalidations: InventoryInvalidations) -> Self {
        Self {
            invalidations: Some(Mutex::new(invalidations)),
            ..Self::new(ttl)
        }
    }

    /// Apply every invalidation queued on the bus. Returns how many events
    /// were consumed.
    pub fn sync(&self) -> usize {
        let Some(invalidations) = &self.invalidations else {
            return 0;
        };
        let Ok(sub) = invalidations.lock() else {
            self.clear();
            return 0;
        };

        let events = sub.drain();
        for envelope in &events {
            if let Some(product_id) = envelope.payload().product_id() {
                self.invalidate(product_id);
            }
        }
        events.len()
    }

    pub fn get(&self, product_id: &ProductId, revision: u64) -> Option<Vec<StockLevel>> {
        self.sync();
        let entries = self.entries.read().ok()?;
        let entry = entries.get(product_id)?;
        if entry.revision != revision || entry.cached_at.elapsed() >= self.ttl {
            return None;
        }
        Some(entry.levels.clone())
    }

    pub fn put(&self, product_id: ProductId, revision: u64, levels: Vec<StockLevel>) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(
                product_id,
                Entry {
                    revision,
                    cached_at: Instant::now(),
                    levels,
                },
            );
        }
    }

    pub fn invalidate(&self, product_id: &ProductId) {
        if let Ok(mut entries) = self.entries.write() {
            if entries.remove(product_id).is_some() {
                tracing::debug!(product_id = %product_id, "inventory cache entry invalidated");
            }
        }
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.write() {
            entries.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
