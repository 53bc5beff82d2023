//! Postgres-backed stores.
//!
//! ## Error Mapping
//!
//! | SQLx error | StoreError / DomainError | scenario |
//! |------------|--------------------------|----------|
//! | `PoolClosed`, `Io`, `Tls` | `Unavailable` (transient) | database unreachable |
//! | `PoolTimedOut` | `Timeout` (transient) | pool exhausted |
//! | `Database` `23505` | `Conflict` | duplicate id on insert |
//! | `Database` `23503` | `Validation` | reference to a missing row |
//! | `Database` (other) | `Database` | anything else the server rejects |
//! | `ColumnDecode`, `Decode` | `Corrupt` | row does not fit the domain type |
//!
//! ## Atomic adjustments
//!
//! `PostgresStockLedger::apply` runs inside one transaction: the stock row is
//! created if missing, locked with `SELECT ... FOR UPDATE`, re-checked, updated
//! and the audit entry inserted before commit. Concurrent adjustments of the
//! same row queue on the row lock, so a sufficiency check can never be stale.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use tracing::instrument;

use salonstock_core::{
    AggregateRoot, CategoryId, DomainError, ExpectedVersion, LocationId, ProductId, ProductTypeId,
    ResourceKind, TransferId,
};
use salonstock_directory::{Actor, Category, Location, Product, ProductType};
use salonstock_inventory::{
    AdjustmentOutcome, AuditEntry, StockAdjustment, StockKey, StockLevel, Transfer,
};

use super::{AppliedAdjustment, CatalogStore, StockLedger, TransferFilter, TransferStore};
use crate::error::{ServiceError, ServiceResult, StoreError};

/// Open a connection pool and apply the bundled schema migrations.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool, StoreError> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
        .map_err(|e| map_sqlx_error("connect", e))?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| StoreError::Database(format!("migration failed: {e}")))?;

    tracing::info!(max_connections, "connected to postgres");
    Ok(pool)
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            StoreError::Database(format!("database error in {}: {}", operation, db_err.message()))
        }
        sqlx::Error::PoolClosed => {
            StoreError::Unavailable(format!("connection pool closed in {}", operation))
        }
        sqlx::Error::PoolTimedOut => {
            StoreError::Timeout(format!("timed out acquiring a connection in {}", operation))
        }
        sqlx::Error::Io(e) => StoreError::Unavailable(format!("io error in {}: {}", operation, e)),
        sqlx::Error::Tls(e) => StoreError::Unavailable(format!("tls error in {}: {}", operation, e)),
        sqlx::Error::ColumnDecode { index, source } => {
            StoreError::Corrupt(format!("column {} in {}: {}", index, operation, source))
        }
        sqlx::Error::Decode(e) => StoreError::Corrupt(format!("decode error in {}: {}", operation, e)),
        other => StoreError::Database(format!("{} failed: {}", operation, other)),
    }
}

fn db_error_code(err: &sqlx::Error) -> Option<String> {
    if let sqlx::Error::Database(db_err) = err {
        return db_err.code().map(|c| c.into_owned());
    }
    None
}

/// Map an insert/update error, turning constraint violations into domain errors.
fn map_write_error(operation: &str, what: String, err: sqlx::Error) -> ServiceError {
    match db_error_code(&err).as_deref() {
        Some("23505") => DomainError::conflict(format!("{what} already exists")).into(),
        Some("23503") => {
            DomainError::validation(format!("{what} references a missing record")).into()
        }
        _ => map_sqlx_error(operation, err).into(),
    }
}

fn corrupt(what: &str, err: impl core::fmt::Display) -> StoreError {
    StoreError::Corrupt(format!("{what}: {err}"))
}

fn read<'r, T>(row: &'r PgRow, column: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(column)
        .map_err(|e| map_sqlx_error(column, e))
}

fn product_from_row(row: &PgRow) -> Result<Product, StoreError> {
    let product_type: Option<String> = read(row, "product_type")?;
    Ok(Product {
        id: ProductId::parse(read::<String>(row, "id")?).map_err(|e| corrupt("products.id", e))?,
        name: read(row, "name")?,
        category: CategoryId::parse(read::<String>(row, "category_id")?)
            .map_err(|e| corrupt("products.category_id", e))?,
        product_type: product_type
            .map(|t| ProductTypeId::parse(t))
            .transpose()
            .map_err(|e| corrupt("products.product_type", e))?,
        is_retail: read(row, "is_retail")?,
        is_active: read(row, "is_active")?,
        cost: read::<Option<Decimal>>(row, "cost")?,
        price: read::<Option<Decimal>>(row, "price")?,
        min_stock: read(row, "min_stock")?,
        created_at: read(row, "created_at")?,
        updated_at: read(row, "updated_at")?,
    })
}

fn category_from_row(row: &PgRow) -> Result<Category, StoreError> {
    Ok(Category {
        id: CategoryId::parse(read::<String>(row, "id")?).map_err(|e| corrupt("categories.id", e))?,
        name: read(row, "name")?,
        is_active: read(row, "is_active")?,
        created_at: read(row, "created_at")?,
    })
}

fn product_type_from_row(row: &PgRow) -> Result<ProductType, StoreError> {
    Ok(ProductType {
        id: ProductTypeId::parse(read::<String>(row, "id")?)
            .map_err(|e| corrupt("product_types.id", e))?,
        name: read(row, "name")?,
        is_active: read(row, "is_active")?,
        created_at: read(row, "created_at")?,
    })
}

fn location_from_row(row: &PgRow) -> Result<Location, StoreError> {
    Ok(Location {
        id: LocationId::parse(read::<String>(row, "id")?).map_err(|e| corrupt("locations.id", e))?,
        name: read(row, "name")?,
        status: read::<String>(row, "status")?
            .parse()
            .map_err(|e| corrupt("locations.status", e))?,
        kind: read::<String>(row, "kind")?
            .parse()
            .map_err(|e| corrupt("locations.kind", e))?,
        created_at: read(row, "created_at")?,
    })
}

fn level_from_row(row: &PgRow) -> Result<StockLevel, StoreError> {
    Ok(StockLevel {
        product_id: ProductId::parse(read::<String>(row, "product_id")?)
            .map_err(|e| corrupt("location_stock.product_id", e))?,
        location_id: LocationId::parse(read::<String>(row, "location_id")?)
            .map_err(|e| corrupt("location_stock.location_id", e))?,
        stock: read(row, "stock")?,
        price: read::<Option<Decimal>>(row, "price")?,
        updated_at: read(row, "updated_at")?,
    })
}

fn audit_from_row(row: &PgRow) -> Result<AuditEntry, StoreError> {
    let role: String = read(row, "actor_role")?;
    let transfer_id: Option<uuid::Uuid> = read(row, "transfer_id")?;
    Ok(AuditEntry {
        id: read::<uuid::Uuid>(row, "id")?.into(),
        product_id: ProductId::parse(read::<String>(row, "product_id")?)
            .map_err(|e| corrupt("audit_entries.product_id", e))?,
        location_id: LocationId::parse(read::<String>(row, "location_id")?)
            .map_err(|e| corrupt("audit_entries.location_id", e))?,
        delta: read(row, "delta")?,
        reason: read(row, "reason")?,
        notes: read(row, "notes")?,
        previous_stock: read(row, "previous_stock")?,
        new_stock: read(row, "new_stock")?,
        actor: Actor {
            id: read(row, "actor_id")?,
            role: role.parse().map_err(|e| corrupt("audit_entries.actor_role", e))?,
        },
        transfer_id: transfer_id.map(TransferId::from_uuid),
        timestamp: read(row, "occurred_at")?,
    })
}

fn collect<T>(
    rows: Vec<PgRow>,
    decode: impl Fn(&PgRow) -> Result<T, StoreError>,
) -> ServiceResult<Vec<T>> {
    rows.iter()
        .map(|r| decode(r).map_err(ServiceError::from))
        .collect()
}

/// Postgres-backed directory registries.
#[derive(Debug, Clone)]
pub struct PostgresCatalogStore {
    pool: Arc<PgPool>,
}

impl PostgresCatalogStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    async fn write_product(&self, product: &Product, insert: bool) -> ServiceResult<Product> {
        let query = if insert {
            sqlx::query(
                r#"
                INSERT INTO products (
                    id, name, category_id, product_type, is_retail, is_active,
                    cost, price, min_stock, created_at, updated_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                "#,
            )
            .bind(product.id.as_str())
            .bind(&product.name)
            .bind(product.category.as_str())
            .bind(product.product_type.as_ref().map(|t| t.as_str()))
            .bind(product.is_retail)
            .bind(product.is_active)
            .bind(product.cost)
            .bind(product.price)
            .bind(product.min_stock)
            .bind(product.created_at)
            .bind(product.updated_at)
        } else {
            sqlx::query(
                r#"
                UPDATE products SET
                    name = $2, category_id = $3, product_type = $4, is_retail = $5,
                    is_active = $6, cost = $7, price = $8, min_stock = $9, updated_at = $10
                WHERE id = $1
                "#,
            )
            .bind(product.id.as_str())
            .bind(&product.name)
            .bind(product.category.as_str())
            .bind(product.product_type.as_ref().map(|t| t.as_str()))
            .bind(product.is_retail)
            .bind(product.is_active)
            .bind(product.cost)
            .bind(product.price)
            .bind(product.min_stock)
            .bind(product.updated_at)
        };

        let result = query
            .execute(&*self.pool)
            .await
            .map_err(|e| map_write_error("write_product", format!("product {}", product.id), e))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::not_found(ResourceKind::Product, &product.id).into());
        }
        Ok(product.clone())
    }

    async fn write_registry_entry(
        &self,
        kind: ResourceKind,
        entry: RegistryRow<'_>,
        insert: bool,
    ) -> ServiceResult<()> {
        let sql = match (kind, insert) {
            (ResourceKind::Category, true) => {
                "INSERT INTO categories (id, name, is_active, created_at) VALUES ($1, $2, $3, $4)"
            }
            (ResourceKind::Category, false) => {
                "UPDATE categories SET name = $2, is_active = $3 WHERE id = $1"
            }
            (ResourceKind::ProductType, true) => {
                "INSERT INTO product_types (id, name, is_active, created_at) VALUES ($1, $2, $3, $4)"
            }
            (ResourceKind::ProductType, false) => {
                "UPDATE product_types SET name = $2, is_active = $3 WHERE id = $1"
            }
            (other, _) => {
                return Err(StoreError::Database(format!("{other} is not a registry table")).into());
            }
        };

        let mut query = sqlx::query(sql)
            .bind(entry.id)
            .bind(entry.name)
            .bind(entry.is_active);
        if insert {
            query = query.bind(entry.created_at);
        }

        let result = query
            .execute(&*self.pool)
            .await
            .map_err(|e| map_write_error("write_registry_entry", format!("{kind} {}", entry.id), e))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::not_found(kind, entry.id).into());
        }
        Ok(())
    }

    async fn write_location(&self, location: &Location, insert: bool) -> ServiceResult<()> {
        let query = if insert {
            sqlx::query(
                "INSERT INTO locations (id, name, status, kind, created_at) VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(location.id.as_str())
            .bind(&location.name)
            .bind(location.status.as_str())
            .bind(location.kind.as_str())
            .bind(location.created_at)
        } else {
            sqlx::query("UPDATE locations SET name = $2, status = $3, kind = $4 WHERE id = $1")
                .bind(location.id.as_str())
                .bind(&location.name)
                .bind(location.status.as_str())
                .bind(location.kind.as_str())
        };

        let result = query
            .execute(&*self.pool)
            .await
            .map_err(|e| map_write_error("write_location", format!("location {}", location.id), e))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::not_found(ResourceKind::Location, &location.id).into());
        }
        Ok(())
    }
}

/// Columns shared by the category and product-type registries.
struct RegistryRow<'a> {
    id: &'a str,
    name: &'a str,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl<'a> From<&'a Category> for RegistryRow<'a> {
    fn from(c: &'a Category) -> Self {
        Self {
            id: c.id.as_str(),
            name: &c.name,
            is_active: c.is_active,
            created_at: c.created_at,
        }
    }
}

impl<'a> From<&'a ProductType> for RegistryRow<'a> {
    fn from(t: &'a ProductType) -> Self {
        Self {
            id: t.id.as_str(),
            name: &t.name,
            is_active: t.is_active,
            created_at: t.created_at,
        }
    }
}

#[async_trait]
impl CatalogStore for PostgresCatalogStore {
    #[instrument(skip(self, product), fields(product_id = %product.id), err)]
    async fn insert_product(&self, product: Product) -> ServiceResult<Product> {
        self.write_product(&product, true).await
    }

    #[instrument(skip(self, product), fields(product_id = %product.id), err)]
    async fn update_product(&self, product: Product) -> ServiceResult<Product> {
        self.write_product(&product, false).await
    }

    async fn get_product(&self, id: &ProductId) -> ServiceResult<Option<Product>> {
        let row = sqlx::query("SELECT * FROM products WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_product", e))?;
        Ok(row.as_ref().map(product_from_row).transpose()?)
    }

    async fn list_products(&self) -> ServiceResult<Vec<Product>> {
        let rows = sqlx::query("SELECT * FROM products ORDER BY id")
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_products", e))?;
        collect(rows, product_from_row)
    }

    async fn insert_category(&self, category: Category) -> ServiceResult<Category> {
        self.write_registry_entry(ResourceKind::Category, (&category).into(), true)
            .await?;
        Ok(category)
    }

    async fn update_category(&self, category: Category) -> ServiceResult<Category> {
        self.write_registry_entry(ResourceKind::Category, (&category).into(), false)
            .await?;
        Ok(category)
    }

    async fn get_category(&self, id: &CategoryId) -> ServiceResult<Option<Category>> {
        let row = sqlx::query("SELECT * FROM categories WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_category", e))?;
        Ok(row.as_ref().map(category_from_row).transpose()?)
    }

    async fn list_categories(&self) -> ServiceResult<Vec<Category>> {
        let rows = sqlx::query("SELECT * FROM categories ORDER BY id")
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_categories", e))?;
        collect(rows, category_from_row)
    }

    async fn insert_product_type(&self, product_type: ProductType) -> ServiceResult<ProductType> {
        self.write_registry_entry(ResourceKind::ProductType, (&product_type).into(), true)
            .await?;
        Ok(product_type)
    }

    async fn update_product_type(&self, product_type: ProductType) -> ServiceResult<ProductType> {
        self.write_registry_entry(ResourceKind::ProductType, (&product_type).into(), false)
            .await?;
        Ok(product_type)
    }

    async fn get_product_type(&self, id: &ProductTypeId) -> ServiceResult<Option<ProductType>> {
        let row = sqlx::query("SELECT * FROM product_types WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_product_type", e))?;
        Ok(row.as_ref().map(product_type_from_row).transpose()?)
    }

    async fn list_product_types(&self) -> ServiceResult<Vec<ProductType>> {
        let rows = sqlx::query("SELECT * FROM product_types ORDER BY id")
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_product_types", e))?;
        collect(rows, product_type_from_row)
    }

    #[instrument(skip(self, location), fields(location_id = %location.id), err)]
    async fn insert_location(&self, location: Location) -> ServiceResult<Location> {
        self.write_location(&location, true).await?;
        Ok(location)
    }

    #[instrument(skip(self, location), fields(location_id = %location.id), err)]
    async fn update_location(&self, location: Location) -> ServiceResult<Location> {
        self.write_location(&location, false).await?;
        Ok(location)
    }

    async fn get_location(&self, id: &LocationId) -> ServiceResult<Option<Location>> {
        let row = sqlx::query("SELECT * FROM locations WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_location", e))?;
        Ok(row.as_ref().map(location_from_row).transpose()?)
    }

    async fn list_locations(&self) -> ServiceResult<Vec<Location>> {
        let rows = sqlx::query("SELECT * FROM locations ORDER BY id")
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_locations", e))?;
        collect(rows, location_from_row)
    }
}

/// Postgres-backed stock ledger.
#[derive(Debug, Clone)]
pub struct PostgresStockLedger {
    pool: Arc<PgPool>,
}

impl PostgresStockLedger {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[async_trait]
impl StockLedger for PostgresStockLedger {
    async fn stock_at(&self, key: &StockKey) -> ServiceResult<i64> {
        let row = sqlx::query(
            "SELECT stock FROM location_stock WHERE product_id = $1 AND location_id = $2",
        )
        .bind(key.product_id.as_str())
        .bind(key.location_id.as_str())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("stock_at", e))?;

        match row {
            Some(row) => Ok(read(&row, "stock")?),
            None => Ok(0),
        }
    }

    async fn levels_for_product(&self, product_id: &ProductId) -> ServiceResult<Vec<StockLevel>> {
        let rows = sqlx::query("SELECT * FROM location_stock WHERE product_id = $1 ORDER BY location_id")
            .bind(product_id.as_str())
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("levels_for_product", e))?;
        collect(rows, level_from_row)
    }

    async fn levels_for_location(&self, location_id: &LocationId) -> ServiceResult<Vec<StockLevel>> {
        let rows = sqlx::query("SELECT * FROM location_stock WHERE location_id = $1 ORDER BY product_id")
            .bind(location_id.as_str())
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("levels_for_location", e))?;
        collect(rows, level_from_row)
    }

    async fn all_levels(&self) -> ServiceResult<Vec<StockLevel>> {
        let rows = sqlx::query("SELECT * FROM location_stock ORDER BY product_id, location_id")
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("all_levels", e))?;
        collect(rows, level_from_row)
    }

    #[instrument(
        skip(self, adjustment),
        fields(
            product_id = %adjustment.product_id,
            location_id = %adjustment.location_id,
            delta = adjustment.delta()
        ),
        err
    )]
    async fn apply(&self, adjustment: &StockAdjustment) -> ServiceResult<AppliedAdjustment> {
        adjustment.validate()?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        sqlx::query(
            r#"
            INSERT INTO location_stock (product_id, location_id, stock)
            VALUES ($1, $2, 0)
            ON CONFLICT (product_id, location_id) DO NOTHING
            "#,
        )
        .bind(adjustment.product_id.as_str())
        .bind(adjustment.location_id.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_write_error("ensure_stock_row", format!("stock row {}", adjustment.key()), e))?;

        let row = sqlx::query(
            r#"
            SELECT stock
            FROM location_stock
            WHERE product_id = $1 AND location_id = $2
            FOR UPDATE
            "#,
        )
        .bind(adjustment.product_id.as_str())
        .bind(adjustment.location_id.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("lock_stock_row", e))?;

        let previous_stock: i64 = read(&row, "stock")?;

        // The row lock serialises retries of the same leg, so the lookup
        // sees any committed earlier attempt.
        if let Some(transfer_id) = adjustment.transfer_id {
            let existing = sqlx::query(
                r#"
                SELECT *
                FROM audit_entries
                WHERE transfer_id = $1 AND location_id = $2 AND (delta > 0) = $3
                "#,
            )
            .bind(*transfer_id.as_uuid())
            .bind(adjustment.location_id.as_str())
            .bind(adjustment.delta() > 0)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("find_transfer_leg", e))?;

            if let Some(row) = existing {
                let entry = audit_from_row(&row)?;
                tx.rollback()
                    .await
                    .map_err(|e| map_sqlx_error("rollback", e))?;
                return Ok(AppliedAdjustment {
                    outcome: (&entry).into(),
                    entry,
                    replayed: true,
                });
            }
        }

        let new_stock = match adjustment.apply_to(previous_stock) {
            Ok(v) => v,
            Err(e) => {
                tx.rollback()
                    .await
                    .map_err(|e| map_sqlx_error("rollback", e))?;
                return Err(e.into());
            }
        };

        let now = Utc::now();
        sqlx::query(
            r#"
            UPDATE location_stock
            SET stock = $3, updated_at = $4
            WHERE product_id = $1 AND location_id = $2
            "#,
        )
        .bind(adjustment.product_id.as_str())
        .bind(adjustment.location_id.as_str())
        .bind(new_stock)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("update_stock_row", e))?;

        let entry = adjustment.audit_entry(previous_stock, new_stock, now);
        sqlx::query(
            r#"
            INSERT INTO audit_entries (
                id, product_id, location_id, delta, reason, notes,
                previous_stock, new_stock, actor_id, actor_role, transfer_id, occurred_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(*entry.id.as_uuid())
        .bind(entry.product_id.as_str())
        .bind(entry.location_id.as_str())
        .bind(entry.delta)
        .bind(&entry.reason)
        .bind(entry.notes.as_deref())
        .bind(entry.previous_stock)
        .bind(entry.new_stock)
        .bind(&entry.actor.id)
        .bind(entry.actor.role.as_str())
        .bind(entry.transfer_id.map(|t| *t.as_uuid()))
        .bind(entry.timestamp)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_audit_entry", e))?;

        bump_revision(&mut tx, &adjustment.product_id).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

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

    #[instrument(skip(self), fields(key = %key), err)]
    async fn set_price(&self, key: &StockKey, price: Option<Decimal>) -> ServiceResult<StockLevel> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let row = sqlx::query(
            r#"
            INSERT INTO location_stock (product_id, location_id, stock, price, updated_at)
            VALUES ($1, $2, 0, $3, NOW())
            ON CONFLICT (product_id, location_id)
            DO UPDATE SET price = EXCLUDED.price, updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(key.product_id.as_str())
        .bind(key.location_id.as_str())
        .bind(price)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_write_error("set_price", format!("stock row {key}"), e))?;
        let level = level_from_row(&row)?;

        bump_revision(&mut tx, &key.product_id).await?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Ok(level)
    }

    async fn audit_trail(&self, product_id: &ProductId) -> ServiceResult<Vec<AuditEntry>> {
        let rows = sqlx::query(
            "SELECT * FROM audit_entries WHERE product_id = $1 ORDER BY occurred_at ASC, id ASC",
        )
        .bind(product_id.as_str())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("audit_trail", e))?;
        collect(rows, audit_from_row)
    }

    async fn revision(&self, product_id: &ProductId) -> ServiceResult<u64> {
        let row = sqlx::query("SELECT revision FROM product_revisions WHERE product_id = $1")
            .bind(product_id.as_str())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("revision", e))?;
        let revision: i64 = match row {
            Some(row) => read(&row, "revision")?,
            None => 0,
        };
        Ok(revision.max(0) as u64)
    }
}

async fn bump_revision(tx: &mut sqlx::Transaction<'_, sqlx::Postgres>, product_id: &ProductId) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO product_revisions (product_id, revision)
        VALUES ($1, 1)
        ON CONFLICT (product_id)
        DO UPDATE SET revision = product_revisions.revision + 1
        "#,
    )
    .bind(product_id.as_str())
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("bump_revision", e))?;
    Ok(())
}

/// Postgres-backed transfer records.
///
/// The aggregate state is stored as JSONB next to the columns used for
/// filtering; `version` carries the optimistic concurrency token.
#[derive(Debug, Clone)]
pub struct PostgresTransferStore {
    pool: Arc<PgPool>,
}

impl PostgresTransferStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

fn transfer_from_row(row: &PgRow) -> Result<Transfer, StoreError> {
    let state: serde_json::Value = read(row, "state")?;
    serde_json::from_value(state).map_err(|e| corrupt("transfers.state", e))
}

#[async_trait]
impl TransferStore for PostgresTransferStore {
    #[instrument(
        skip(self, transfer),
        fields(transfer_id = %transfer.id_typed(), version = transfer.version(), expected = ?expected),
        err
    )]
    async fn save(&self, transfer: &Transfer, expected: ExpectedVersion) -> ServiceResult<()> {
        let (Some(product_id), Some(from), Some(to), Some(created_at)) = (
            transfer.product_id(),
            transfer.from_location_id(),
            transfer.to_location_id(),
            transfer.created_at(),
        ) else {
            return Err(DomainError::conflict("cannot persist a transfer that was never created").into());
        };

        let state = serde_json::to_value(transfer).map_err(|e| corrupt("transfer state", e))?;
        let id = *transfer.id_typed().as_uuid();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let current = sqlx::query("SELECT version FROM transfers WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("load_transfer_version", e))?;
        let current_version = match &current {
            Some(row) => read::<i64>(row, "version")?.max(0) as u64,
            None => 0,
        };

        if let Err(e) = expected.check(current_version) {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(e.into());
        }

        let query = if current.is_none() {
            sqlx::query(
                r#"
                INSERT INTO transfers (
                    id, product_id, from_location_id, to_location_id,
                    status, version, state, created_at, updated_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW())
                "#,
            )
            .bind(id)
            .bind(product_id.as_str())
            .bind(from.as_str())
            .bind(to.as_str())
            .bind(transfer.status().as_str())
            .bind(transfer.version() as i64)
            .bind(&state)
            .bind(created_at)
        } else {
            sqlx::query(
                r#"
                UPDATE transfers
                SET status = $2, version = $3, state = $4, updated_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(id)
            .bind(transfer.status().as_str())
            .bind(transfer.version() as i64)
            .bind(&state)
        };

        query
            .execute(&mut *tx)
            .await
            .map_err(|e| map_write_error("save_transfer", format!("transfer {}", transfer.id_typed()), e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(())
    }

    async fn get(&self, id: TransferId) -> ServiceResult<Option<Transfer>> {
        let row = sqlx::query("SELECT state FROM transfers WHERE id = $1")
            .bind(*id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_transfer", e))?;
        Ok(row.as_ref().map(transfer_from_row).transpose()?)
    }

    async fn list(&self, filter: &TransferFilter) -> ServiceResult<Vec<Transfer>> {
        let rows = sqlx::query(
            r#"
            SELECT state
            FROM transfers
            WHERE ($1::text IS NULL OR product_id = $1)
                AND ($2::text IS NULL OR from_location_id = $2 OR to_location_id = $2)
                AND ($3::text IS NULL OR status = $3)
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(filter.product_id.as_ref().map(|p| p.as_str()))
        .bind(filter.location_id.as_ref().map(|l| l.as_str()))
        .bind(filter.status.map(|s| s.as_str()))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_transfers", e))?;
        collect(rows, transfer_from_row)
    }
}
