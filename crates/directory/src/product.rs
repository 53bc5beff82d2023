use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use salonstock_core::{CategoryId, DomainError, DomainResult, Entity, ProductId, ProductTypeId};

/// A product sold in the shop or used in treatments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub category: CategoryId,
    pub product_type: Option<ProductTypeId>,
    /// Visible in the client-facing shop.
    pub is_retail: bool,
    /// Sellable/usable. Inactive products cannot be adjusted or transferred.
    pub is_active: bool,
    pub cost: Option<Decimal>,
    pub price: Option<Decimal>,
    /// Reorder threshold.
    pub min_stock: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn is_active(&self) -> bool {
        self.is_active
    }
}

/// Input for creating a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProduct {
    pub id: ProductId,
    pub name: String,
    pub category: CategoryId,
    #[serde(default)]
    pub product_type: Option<ProductTypeId>,
    #[serde(default)]
    pub is_retail: bool,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub cost: Option<Decimal>,
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub min_stock: i64,
}

fn default_true() -> bool {
    true
}

impl NewProduct {
    /// Field-level validation. Category existence is checked by the catalog.
    pub fn validate(&self) -> DomainResult<()> {
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        validate_amounts(self.cost, self.price, self.min_stock)
    }

    pub fn into_product(self, now: DateTime<Utc>) -> Product {
        Product {
            id: self.id,
            name: self.name.trim().to_string(),
            category: self.category,
            product_type: self.product_type,
            is_retail: self.is_retail,
            is_active: self.is_active,
            cost: self.cost,
            price: self.price,
            min_stock: self.min_stock,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update for an existing product. `None` leaves the field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub category: Option<CategoryId>,
    #[serde(default)]
    pub is_retail: Option<bool>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub cost: Option<Decimal>,
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub min_stock: Option<i64>,
}

impl Product {
    /// Apply a partial update, re-validating the resulting record.
    pub fn apply_update(&mut self, update: ProductUpdate, now: DateTime<Utc>) -> DomainResult<()> {
        let mut next = self.clone();
        if let Some(name) = update.name {
            if name.trim().is_empty() {
                return Err(DomainError::validation("name cannot be empty"));
            }
            next.name = name.trim().to_string();
        }
        if let Some(category) = update.category {
            next.category = category;
        }
        if let Some(is_retail) = update.is_retail {
            next.is_retail = is_retail;
        }
        if let Some(is_active) = update.is_active {
            next.is_active = is_active;
        }
        if update.cost.is_some() {
            next.cost = update.cost;
        }
        if update.price.is_some() {
            next.price = update.price;
        }
        if let Some(min_stock) = update.min_stock {
            next.min_stock = min_stock;
        }
        validate_amounts(next.cost, next.price, next.min_stock)?;

        next.updated_at = now;
        *self = next;
        Ok(())
    }

    /// Whether the given stock level is at or below the reorder threshold.
    pub fn is_low_stock(&self, stock: i64) -> bool {
        stock <= self.min_stock
    }
}

fn validate_amounts(cost: Option<Decimal>, price: Option<Decimal>, min_stock: i64) -> DomainResult<()> {
    if cost.is_some_and(|c| c.is_sign_negative()) {
        return Err(DomainError::validation("cost cannot be negative"));
    }
    if price.is_some_and(|p| p.is_sign_negative()) {
        return Err(DomainError::validation("price cannot be negative"));
    }
    if min_stock < 0 {
        return Err(DomainError::validation("min_stock cannot be negative"));
    }
    Ok(())
}

/// Query filters for product listings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductFilter {
    #[serde(default)]
    pub category: Option<CategoryId>,
    #[serde(default)]
    pub product_type: Option<ProductTypeId>,
    #[serde(default)]
    pub is_retail: Option<bool>,
    #[serde(default)]
    pub is_active: Option<bool>,
    /// Case-insensitive substring match on name or id.
    #[serde(default)]
    pub search: Option<String>,
}

impl ProductFilter {
    pub fn matches(&self, product: &Product) -> bool {
        if self.category.as_ref().is_some_and(|c| c != &product.category) {
            return false;
        }
        if self
            .product_type
            .as_ref()
            .is_some_and(|t| product.product_type.as_ref() != Some(t))
        {
            return false;
        }
        if self.is_retail.is_some_and(|r| r != product.is_retail) {
            return false;
        }
        if self.is_active.is_some_and(|a| a != product.is_active) {
            return false;
        }
        if let Some(needle) = self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let needle = needle.to_lowercase();
            let hit = product.name.to_lowercase().contains(&needle)
                || product.id.as_str().to_lowercase().contains(&needle);
            if !hit {
                return false;
            }
        }
        true
    }
}
