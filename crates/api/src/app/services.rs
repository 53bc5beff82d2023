use std::ops::Deref;
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;

use salonstock_infra::cache::LocationCache;
use salonstock_infra::seed;
use salonstock_infra::store::{self, PostgresCatalogStore, PostgresStockLedger, PostgresTransferStore};
use salonstock_infra::{AppConfig, InventoryServices};

/// Shared state handed to every handler through `Extension<Arc<AppServices>>`.
#[derive(Clone)]
pub struct AppServices {
    inner: InventoryServices,
}

impl Deref for AppServices {
    type Target = InventoryServices;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl AppServices {
    pub fn new(inner: InventoryServices) -> Self {
        Self { inner }
    }
}

/// Wire the stores selected by `config` and load demo data if asked to.
pub async fn build_services(config: &AppConfig) -> anyhow::Result<AppServices> {
    let location_cache = if config.seed_demo_data {
        Arc::new(LocationCache::with_locations(seed::legacy_locations(Utc::now())?))
    } else {
        Arc::new(LocationCache::new())
    };

    let services = if config.use_persistent_stores {
        let url = config
            .database_url
            .as_deref()
            .context("USE_PERSISTENT_STORES is set but DATABASE_URL is missing")?;
        let pool = store::postgres::connect(url, config.database_max_connections)
            .await
            .context("failed to connect to postgres")?;
        tracing::info!(max_connections = config.database_max_connections, "using postgres stores");

        InventoryServices::build(
            Arc::new(PostgresCatalogStore::new(pool.clone())),
            Arc::new(PostgresStockLedger::new(pool.clone())),
            Arc::new(PostgresTransferStore::new(pool)),
            location_cache,
            config,
        )
    } else {
        tracing::info!("using in-memory stores");
        InventoryServices::build(
            Arc::new(store::InMemoryCatalogStore::new()),
            Arc::new(store::InMemoryStockLedger::new()),
            Arc::new(store::InMemoryTransferStore::new()),
            location_cache,
            config,
        )
    };

    if config.seed_demo_data {
        seed::seed_demo_data(&services)
            .await
            .context("failed to seed demo data")?;
    }

    Ok(AppServices::new(services))
}
