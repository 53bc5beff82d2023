//! Category and product-type registries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use salonstock_core::{CategoryId, DomainError, DomainResult, Entity, ProductTypeId};

/// Product category (e.g. "Hair care", "Nails").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Product type (e.g. "Retail", "Back bar", "Consumable").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductType {
    pub id: ProductTypeId,
    pub name: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Entity for Category {
    type Id = CategoryId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn is_active(&self) -> bool {
        self.is_active
    }
}

impl Entity for ProductType {
    type Id = ProductTypeId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn is_active(&self) -> bool {
        self.is_active
    }
}

/// Input shared by both registries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRegistryEntry<I> {
    pub id: I,
    pub name: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

impl<I> NewRegistryEntry<I> {
    fn checked_name(&self) -> DomainResult<String> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        Ok(name.to_string())
    }
}

impl NewRegistryEntry<CategoryId> {
    pub fn into_category(self, now: DateTime<Utc>) -> DomainResult<Category> {
        let name = self.checked_name()?;
        Ok(Category {
            id: self.id,
            name,
            is_active: self.is_active,
            created_at: now,
        })
    }
}

impl NewRegistryEntry<ProductTypeId> {
    pub fn into_product_type(self, now: DateTime<Utc>) -> DomainResult<ProductType> {
        let name = self.checked_name()?;
        Ok(ProductType {
            id: self.id,
            name,
            is_active: self.is_active,
            created_at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_name_is_trimmed_and_required() {
        let ok = NewRegistryEntry {
            id: CategoryId::parse("nails").unwrap(),
            name: "  Nails ".into(),
            is_active: true,
        }
        .into_category(Utc::now())
        .unwrap();
        assert_eq!(ok.name, "Nails");

        let err = NewRegistryEntry {
            id: ProductTypeId::parse("retail").unwrap(),
            name: "".into(),
            is_active: true,
        }
        .into_product_type(Utc::now());
        assert!(err.is_err());
    }
}
