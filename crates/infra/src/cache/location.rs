use std::sync::RwLock;

use chrono::{DateTime, Utc};

use salonstock_directory::Location;

#[derive(Debug, Clone)]
struct Snapshot {
    locations: Vec<Location>,
    stored_at: DateTime<Utc>,
}

/// Last known good location list.
///
/// Serves as the fallback source when listing locations: it is merged after
/// the primary store's records, and served alone when the primary store
/// cannot be read. It may hold stale or legacy records; the merge step
/// de-duplicates them.
#[derive(Debug, Default)]
pub struct LocationCache {
    snapshot: RwLock<Option<Snapshot>>,
}

impl LocationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a known list (e.g. records imported from an older system).
    pub fn with_locations(locations: Vec<Location>) -> Self {
        let cache = Self::new();
        cache.store(locations);
        cache
    }

    pub fn store(&self, locations: Vec<Location>) {
        if let Ok(mut slot) = self.snapshot.write() {
            *slot = Some(Snapshot {
                locations,
                stored_at: Utc::now(),
            });
        }
    }

    pub fn snapshot(&self) -> Vec<Location> {
        self.snapshot
            .read()
            .ok()
            .and_then(|s| s.as_ref().map(|s| s.locations.clone()))
            .unwrap_or_default()
    }

    pub fn stored_at(&self) -> Option<DateTime<Utc>> {
        self.snapshot
            .read()
            .ok()
            .and_then(|s| s.as_ref().map(|s| s.stored_at))
    }

    pub fn clear(&self) {
        if let Ok(mut slot) = self.snapshot.write() {
            *slot = None;
        }
    }
}
