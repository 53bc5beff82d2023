//! Demo catalog loaded when `SEED_DEMO_DATA` is set.
//!
//! Idempotent: records that already exist are left as they are, and stock is
//! only added to rows that are still empty.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use salonstock_core::{CategoryId, DomainError, LocationId, ProductId, ProductTypeId};
use salonstock_directory::{
    Actor, Location, LocationKind, LocationStatus, NewLocation, NewProduct, NewRegistryEntry, StaffRole,
};
use salonstock_inventory::{AdjustmentType, StockAdjustment};

use crate::error::{ServiceError, ServiceResult};
use crate::services::InventoryServices;

const CATEGORIES: &[(&str, &str)] = &[
    ("hair-care", "Hair care"),
    ("skin-care", "Skin care"),
    ("nail-care", "Nail care"),
];

const PRODUCT_TYPES: &[(&str, &str)] = &[("retail", "Retail"), ("professional", "Professional use")];

const LOCATIONS: &[(&str, &str)] = &[("Spa-A", "Downtown Spa"), ("Spa-B", "Riverside Salon")];

struct DemoProduct {
    id: &'static str,
    name: &'static str,
    category: &'static str,
    product_type: &'static str,
    is_retail: bool,
    price_cents: i64,
    min_stock: i64,
    stock: &'static [(&'static str, i64)],
}

const PRODUCTS: &[DemoProduct] = &[
    DemoProduct {
        id: "P1",
        name: "Argan Oil Serum",
        category: "hair-care",
        product_type: "retail",
        is_retail: true,
        price_cents: 2450,
        min_stock: 3,
        stock: &[("Spa-A", 10), ("Spa-B", 4), ("online", 6)],
    },
    DemoProduct {
        id: "P2",
        name: "Keratin Treatment 1L",
        category: "hair-care",
        product_type: "professional",
        is_retail: false,
        price_cents: 8900,
        min_stock: 1,
        stock: &[("Spa-A", 2), ("home", 1)],
    },
    DemoProduct {
        id: "P3",
        name: "Hydrating Face Mask",
        category: "skin-care",
        product_type: "retail",
        is_retail: true,
        price_cents: 1800,
        min_stock: 5,
        stock: &[("Spa-B", 3)],
    },
    DemoProduct {
        id: "P4",
        name: "Gel Polish Base Coat",
        category: "nail-care",
        product_type: "professional",
        is_retail: false,
        price_cents: 1200,
        min_stock: 2,
        stock: &[("Spa-A", 8), ("Spa-B", 8)],
    },
];

/// Location records carried over from an older deployment. They share
/// names with current records and are collapsed by the location merge.
pub fn legacy_locations(now: DateTime<Utc>) -> ServiceResult<Vec<Location>> {
    Ok(vec![
        Location {
            id: LocationId::parse("home-legacy")?,
            name: "Home Service".into(),
            status: LocationStatus::Active,
            kind: LocationKind::Home,
            created_at: now,
        },
        Location {
            id: LocationId::parse("spa-a-old")?,
            name: "downtown  spa".into(),
            status: LocationStatus::Active,
            kind: LocationKind::Physical,
            created_at: now,
        },
    ])
}

fn ignore_existing<T>(result: ServiceResult<T>) -> ServiceResult<()> {
    match result {
        Ok(_) | Err(ServiceError::Domain(DomainError::Conflict(_))) => Ok(()),
        Err(e) => Err(e),
    }
}

pub async fn seed_demo_data(services: &InventoryServices) -> ServiceResult<()> {
    let directory = &services.directory;
    let actor = Actor::new("seed", StaffRole::Owner)?;

    for (id, name) in CATEGORIES {
        ignore_existing(
            directory
                .create_category(NewRegistryEntry {
                    id: CategoryId::parse(id)?,
                    name: (*name).into(),
                    is_active: true,
                })
                .await,
        )?;
    }

    for (id, name) in PRODUCT_TYPES {
        ignore_existing(
            directory
                .create_product_type(NewRegistryEntry {
                    id: ProductTypeId::parse(id)?,
                    name: (*name).into(),
                    is_active: true,
                })
                .await,
        )?;
    }

    for (id, name) in LOCATIONS {
        ignore_existing(
            directory
                .create_location(NewLocation {
                    id: LocationId::parse(id)?,
                    name: (*name).into(),
                    kind: LocationKind::Physical,
                    status: LocationStatus::Active,
                })
                .await,
        )?;
    }

    for demo in PRODUCTS {
        let product_id = ProductId::parse(demo.id)?;
        ignore_existing(
            directory
                .create_product(NewProduct {
                    id: product_id.clone(),
                    name: demo.name.into(),
                    category: CategoryId::parse(demo.category)?,
                    product_type: Some(ProductTypeId::parse(demo.product_type)?),
                    is_retail: demo.is_retail,
                    is_active: true,
                    cost: None,
                    price: Some(Decimal::new(demo.price_cents, 2)),
                    min_stock: demo.min_stock,
                })
                .await,
        )?;

        for (location, quantity) in demo.stock {
            let location_id = LocationId::parse(location)?;
            let current = services
                .view
                .stock_at(&product_id, &location_id)
                .await?;
            if current > 0 {
                continue;
            }
            services
                .adjustments
                .adjust(StockAdjustment {
                    product_id: product_id.clone(),
                    location_id,
                    adjustment_type: AdjustmentType::Add,
                    quantity: *quantity,
                    reason: "opening stock".into(),
                    notes: None,
                    actor: actor.clone(),
                    transfer_id: None,
                })
                .await?;
        }
    }

    tracing::info!(products = PRODUCTS.len(), "demo data seeded");
    Ok(())
}
