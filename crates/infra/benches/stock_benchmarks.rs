use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use tokio::runtime::Runtime;

use salonstock_core::{CategoryId, LocationId, ProductId};
use salonstock_directory::{Actor, LocationKind, LocationStatus, NewLocation, NewProduct, NewRegistryEntry, StaffRole};
use salonstock_infra::services::{CreateTransferRequest, LocationScope};
use salonstock_infra::{AppConfig, InventoryServices};
use salonstock_inventory::{AdjustmentType, StockAdjustment};

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn actor() -> Actor {
    Actor::new("bench", StaffRole::Manager).unwrap()
}

fn adjustment(product: &ProductId, location: &LocationId, kind: AdjustmentType, quantity: i64) -> StockAdjustment {
    StockAdjustment {
        product_id: product.clone(),
        location_id: location.clone(),
        adjustment_type: kind,
        quantity,
        reason: "bench".into(),
        notes: None,
        actor: actor(),
        transfer_id: None,
    }
}

/// `products` products stocked at two salons.
async fn catalog(products: usize) -> (InventoryServices, Vec<ProductId>) {
    let services = InventoryServices::in_memory(&AppConfig::default());
    services
        .directory
        .create_category(NewRegistryEntry {
            id: CategoryId::parse("bench").unwrap(),
            name: "Bench".into(),
            is_active: true,
        })
        .await
        .unwrap();
    for id in ["Spa-A", "Spa-B"] {
        services
            .directory
            .create_location(NewLocation {
                id: LocationId::parse(id).unwrap(),
                name: id.into(),
                kind: LocationKind::Physical,
                status: LocationStatus::Active,
            })
            .await
            .unwrap();
    }

    let spa_a = LocationId::parse("Spa-A").unwrap();
    let mut ids = Vec::with_capacity(products);
    for n in 0..products {
        let id = ProductId::parse(format!("P{n}")).unwrap();
        services
            .directory
            .create_product(NewProduct {
                id: id.clone(),
                name: format!("Product {n}"),
                category: CategoryId::parse("bench").unwrap(),
                product_type: None,
                is_retail: true,
                is_active: true,
                cost: None,
                price: None,
                min_stock: 5,
            })
            .await
            .unwrap();
        services
            .adjustments
            .adjust(adjustment(&id, &spa_a, AdjustmentType::Add, 1_000_000_000))
            .await
            .unwrap();
        ids.push(id);
    }
    (services, ids)
}

fn bench_adjustment_latency(c: &mut Criterion) {
    let rt = runtime();
    let (services, ids) = rt.block_on(catalog(1));
    let spa_a = LocationId::parse("Spa-A").unwrap();

    let mut group = c.benchmark_group("adjustment_latency");
    group.bench_function("remove_one", |b| {
        b.iter(|| {
            rt.block_on(services.adjustments.adjust(adjustment(
                &ids[0],
                &spa_a,
                AdjustmentType::Remove,
                1,
            )))
            .unwrap();
        });
    });
    group.bench_function("transfer_one", |b| {
        b.iter(|| {
            rt.block_on(services.transfers.create_transfer(CreateTransferRequest {
                product_id: ids[0].clone(),
                from_location_id: spa_a.clone(),
                to_location_id: LocationId::parse("Spa-B").unwrap(),
                quantity: 1,
                reason: "bench".into(),
                notes: None,
                performed_by: actor(),
            }))
            .unwrap();
        });
    });
    group.finish();
}

fn bench_inventory_reads(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("inventory_reads");

    for products in [10usize, 100, 1000] {
        let (services, ids) = rt.block_on(catalog(products));
        group.throughput(Throughput::Elements(products as u64));

        group.bench_with_input(BenchmarkId::new("get_inventory_all", products), &products, |b, _| {
            b.iter(|| black_box(rt.block_on(services.view.get_inventory(&LocationScope::All)).unwrap()));
        });
        group.bench_with_input(BenchmarkId::new("total_stock_cached", products), &products, |b, _| {
            b.iter(|| {
                for id in &ids {
                    black_box(rt.block_on(services.view.total_stock(id)).unwrap());
                }
            });
        });
        group.bench_with_input(BenchmarkId::new("total_stock_cold", products), &products, |b, _| {
            b.iter(|| {
                services.view.refresh();
                for id in &ids {
                    black_box(rt.block_on(services.view.total_stock(id)).unwrap());
                }
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_adjustment_latency, bench_inventory_reads);
criterion_main!(benches);
