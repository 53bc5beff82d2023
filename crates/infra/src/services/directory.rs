use std::sync::Arc;

use chrono::Utc;
use tracing::instrument;

use salonstock_core::{
    CategoryId, DomainError, Entity, LocationId, ProductId, ProductTypeId, ResourceKind,
};
use salonstock_directory::{
    Category, Location, LocationStatus, NewLocation, NewProduct, NewRegistryEntry, Product,
    ProductFilter, ProductType, ProductUpdate, merge_locations,
};

use crate::cache::LocationCache;
use crate::error::ServiceResult;
use crate::store::CatalogStore;

/// Directory lookups and registry maintenance.
///
/// Stock operations go through `resolve_active_*` so that unknown and
/// disabled resources are reported distinctly.
pub struct DirectoryService {
    catalog: Arc<dyn CatalogStore>,
    location_cache: Arc<LocationCache>,
}

impl DirectoryService {
    pub fn new(catalog: Arc<dyn CatalogStore>, location_cache: Arc<LocationCache>) -> Self {
        Self {
            catalog,
            location_cache,
        }
    }

    pub async fn product(&self, id: &ProductId) -> ServiceResult<Product> {
        self.catalog
            .get_product(id)
            .await?
            .ok_or_else(|| DomainError::not_found(ResourceKind::Product, id).into())
    }

    pub async fn location(&self, id: &LocationId) -> ServiceResult<Location> {
        self.catalog
            .get_location(id)
            .await?
            .ok_or_else(|| DomainError::not_found(ResourceKind::Location, id).into())
    }

    pub async fn resolve_active_product(&self, id: &ProductId) -> ServiceResult<Product> {
        let product = self.product(id).await?;
        if !product.is_active() {
            return Err(DomainError::inactive(ResourceKind::Product, id).into());
        }
        Ok(product)
    }

    pub async fn resolve_active_location(&self, id: &LocationId) -> ServiceResult<Location> {
        let location = self.location(id).await?;
        if !location.is_active() {
            return Err(DomainError::inactive(ResourceKind::Location, id).into());
        }
        Ok(location)
    }

    /// Primary store merged with the fallback snapshot, one record per name.
    ///
    /// When the primary store cannot be read the last snapshot is served
    /// instead; if there is none the store error is returned.
    pub async fn list_locations(&self) -> ServiceResult<Vec<Location>> {
        let primary = match self.catalog.list_locations().await {
            Ok(locations) => locations,
            Err(e) => {
                let fallback = self.location_cache.snapshot();
                if fallback.is_empty() {
                    return Err(e);
                }
                tracing::warn!(error = %e, served = fallback.len(), "location store unavailable; serving cached list");
                return Ok(fallback);
            }
        };

        let merged = merge_locations(primary, self.location_cache.snapshot());
        if merged.removed > 0 {
            tracing::warn!(removed = merged.removed, "dropped duplicate locations while merging");
        }
        self.location_cache.store(merged.locations.clone());
        Ok(merged.locations)
    }

    #[instrument(skip(self, input), fields(location_id = %input.id), err)]
    pub async fn create_location(&self, input: NewLocation) -> ServiceResult<Location> {
        let location = input.into_location(Utc::now())?;
        let name_key = location.name_key();
        if let Some(existing) = self
            .catalog
            .list_locations()
            .await?
            .into_iter()
            .find(|l| l.name_key() == name_key)
        {
            // Listings keep one record per name; a second one would vanish.
            return Err(DomainError::conflict(format!(
                "location name '{}' is already used by {}",
                location.name, existing.id
            ))
            .into());
        }
        self.catalog.insert_location(location).await
    }

    #[instrument(skip(self), fields(location_id = %id), err)]
    pub async fn set_location_status(&self, id: &LocationId, status: LocationStatus) -> ServiceResult<Location> {
        let mut location = self.location(id).await?;
        location.status = status;
        let location = self.catalog.update_location(location).await?;
        tracing::info!(status = status.as_str(), "location status changed");
        Ok(location)
    }

    pub async fn list_categories(&self) -> ServiceResult<Vec<Category>> {
        self.catalog.list_categories().await
    }

    pub async fn create_category(&self, input: NewRegistryEntry<CategoryId>) -> ServiceResult<Category> {
        let category = input.into_category(Utc::now())?;
        self.catalog.insert_category(category).await
    }

    pub async fn set_category_active(&self, id: &CategoryId, is_active: bool) -> ServiceResult<Category> {
        let mut category = self
            .catalog
            .get_category(id)
            .await?
            .ok_or_else(|| DomainError::not_found(ResourceKind::Category, id))?;
        category.is_active = is_active;
        self.catalog.update_category(category).await
    }

    pub async fn list_product_types(&self) -> ServiceResult<Vec<ProductType>> {
        self.catalog.list_product_types().await
    }

    pub async fn create_product_type(
        &self,
        input: NewRegistryEntry<ProductTypeId>,
    ) -> ServiceResult<ProductType> {
        let product_type = input.into_product_type(Utc::now())?;
        self.catalog.insert_product_type(product_type).await
    }

    pub async fn set_product_type_active(
        &self,
        id: &ProductTypeId,
        is_active: bool,
    ) -> ServiceResult<ProductType> {
        let mut product_type = self
            .catalog
            .get_product_type(id)
            .await?
            .ok_or_else(|| DomainError::not_found(ResourceKind::ProductType, id))?;
        product_type.is_active = is_active;
        self.catalog.update_product_type(product_type).await
    }

    /// An active product must point at an existing, active category, and its
    /// type (if any) must exist.
    async fn check_references(&self, product: &Product) -> ServiceResult<()> {
        let category = self.catalog.get_category(&product.category).await?;
        match category {
            None => {
                return Err(DomainError::validation(format!(
                    "category {} does not exist",
                    product.category
                ))
                .into());
            }
            Some(c) if product.is_active && !c.is_active => {
                return Err(DomainError::validation(format!(
                    "active product cannot use inactive category {}",
                    c.id
                ))
                .into());
            }
            Some(_) => {}
        }

        if let Some(type_id) = &product.product_type {
            if self.catalog.get_product_type(type_id).await?.is_none() {
                return Err(
                    DomainError::validation(format!("product type {type_id} does not exist")).into(),
                );
            }
        }
        Ok(())
    }

    #[instrument(skip(self, input), fields(product_id = %input.id), err)]
    pub async fn create_product(&self, input: NewProduct) -> ServiceResult<Product> {
        input.validate()?;
        let product = input.into_product(Utc::now());
        self.check_references(&product).await?;
        self.catalog.insert_product(product).await
    }

    #[instrument(skip(self, update), fields(product_id = %id), err)]
    pub async fn update_product(&self, id: &ProductId, update: ProductUpdate) -> ServiceResult<Product> {
        let mut product = self.product(id).await?;
        product.apply_update(update, Utc::now())?;
        self.check_references(&product).await?;
        self.catalog.update_product(product).await
    }

    pub async fn set_product_active(&self, id: &ProductId, is_active: bool) -> ServiceResult<Product> {
        self.update_product(
            id,
            ProductUpdate {
                is_active: Some(is_active),
                ..ProductUpdate::default()
            },
        )
        .await
    }

    pub async fn list_products(&self, filter: &ProductFilter) -> ServiceResult<Vec<Product>> {
        let products = self.catalog.list_products().await?;
        Ok(products.into_iter().filter(|p| filter.matches(p)).collect())
    }
}
