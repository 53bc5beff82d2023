use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::instrument;

use salonstock_inventory::{
    AdjustmentOutcome, InventoryEvent, PriceChanged, StockAdjustment, StockKey, StockLevel,
};

use super::{DirectoryService, EventPublisher};
use crate::error::ServiceResult;
use crate::store::{AppliedAdjustment, StockLedger};

/// The single entry point for changing a LocationStock row.
pub struct AdjustmentService {
    directory: Arc<DirectoryService>,
    ledger: Arc<dyn StockLedger>,
    events: EventPublisher,
}

impl AdjustmentService {
    pub fn new(directory: Arc<DirectoryService>, ledger: Arc<dyn StockLedger>, events: EventPublisher) -> Self {
        Self {
            directory,
            ledger,
            events,
        }
    }

    /// Add or remove stock at one location.
    ///
    /// Input is validated first, then the product and location must both be
    /// active; the ledger re-checks sufficiency inside its atomic section.
    #[instrument(
        skip(self, adjustment),
        fields(
            product_id = %adjustment.product_id,
            location_id = %adjustment.location_id,
            adjustment_type = adjustment.adjustment_type.as_str(),
            quantity = adjustment.quantity,
            actor = %adjustment.actor
        ),
        err
    )]
    pub async fn adjust(&self, adjustment: StockAdjustment) -> ServiceResult<AdjustmentOutcome> {
        adjustment.validate()?;
        self.directory.resolve_active_product(&adjustment.product_id).await?;
        self.directory.resolve_active_location(&adjustment.location_id).await?;

        let applied = self.commit(&adjustment).await?;
        Ok(applied.outcome)
    }

    /// Apply without the directory checks.
    ///
    /// Only for compensating a transfer leg: restoring the source must not
    /// depend on the source still being active.
    pub(crate) async fn compensate(&self, adjustment: &StockAdjustment) -> ServiceResult<AdjustmentOutcome> {
        let applied = self.commit(adjustment).await?;
        Ok(applied.outcome)
    }

    async fn commit(&self, adjustment: &StockAdjustment) -> ServiceResult<AppliedAdjustment> {
        let applied = self.ledger.apply(adjustment).await?;
        if applied.replayed {
            tracing::info!(
                product_id = %adjustment.product_id,
                location_id = %adjustment.location_id,
                transfer_id = ?adjustment.transfer_id,
                "transfer leg already applied"
            );
            return Ok(applied);
        }
        tracing::info!(
            product_id = %adjustment.product_id,
            location_id = %adjustment.location_id,
            previous_stock = applied.outcome.previous_stock,
            new_stock = applied.outcome.new_stock,
            transfer_id = ?adjustment.transfer_id,
            "stock adjusted"
        );
        self.events
            .publish(InventoryEvent::StockAdjusted((&applied.entry).into()));
        Ok(applied)
    }

    /// Set (or clear) the location-specific price of a product.
    #[instrument(skip(self), fields(key = %key), err)]
    pub async fn set_price(&self, key: &StockKey, price: Option<Decimal>) -> ServiceResult<StockLevel> {
        if price.is_some_and(|p| p.is_sign_negative()) {
            return Err(salonstock_core::DomainError::validation("price cannot be negative").into());
        }
        self.directory.product(&key.product_id).await?;
        self.directory.location(&key.location_id).await?;

        let level = self.ledger.set_price(key, price).await?;
        self.events.publish(InventoryEvent::PriceChanged(PriceChanged {
            product_id: key.product_id.clone(),
            location_id: key.location_id.clone(),
            price,
            occurred_at: Utc::now(),
        }));
        Ok(level)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use salonstock_core::DomainError;
    use salonstock_directory::LocationStatus;
    use salonstock_inventory::AdjustmentType;

    use crate::services::testing::{adjustment, lid, pid, stocked};

    #[tokio::test]
    async fn remove_more_than_available_is_rejected_without_mutation() {
        let services = stocked(3).await;
        let err = services
            .adjustments
            .adjust(adjustment("P1", "Spa-A", AdjustmentType::Remove, 5))
            .await
            .unwrap_err();

        match err.as_domain() {
            Some(DomainError::InsufficientStock {
                available, requested, ..
            }) => {
                assert_eq!(*available, 3);
                assert_eq!(*requested, 5);
            }
            other => panic!("expected insufficient stock, got {other:?}"),
        }
        assert_eq!(services.view.stock_at(&pid("P1"), &lid("Spa-A")).await.unwrap(), 3);
        assert_eq!(services.view.audit_trail(&pid("P1")).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn successful_adjustment_moves_stock_by_exactly_q() {
        let services = stocked(10).await;
        let out = services
            .adjustments
            .adjust(adjustment("P1", "Spa-A", AdjustmentType::Remove, 4))
            .await
            .unwrap();
        assert_eq!(out.previous_stock, 10);
        assert_eq!(out.new_stock, 6);
        assert_eq!(out.adjustment, 4);

        let trail = services.view.audit_trail(&pid("P1")).await.unwrap();
        assert_eq!(trail.last().map(|e| e.delta), Some(-4));
        assert_eq!(trail.last().map(|e| e.id), Some(out.audit_entry_id));
    }

    #[tokio::test]
    async fn inactive_location_is_rejected() {
        let services = stocked(5).await;
        services
            .directory
            .set_location_status(&lid("Spa-B"), LocationStatus::Inactive)
            .await
            .unwrap();

        let err = services
            .adjustments
            .adjust(adjustment("P1", "Spa-B", AdjustmentType::Add, 1))
            .await
            .unwrap_err();
        assert!(matches!(err.as_domain(), Some(DomainError::Inactive { .. })));
    }

    #[tokio::test]
    async fn unknown_product_is_not_found() {
        let services = stocked(0).await;
        let err = services
            .adjustments
            .adjust(adjustment("P404", "Spa-A", AdjustmentType::Add, 1))
            .await
            .unwrap_err();
        assert!(matches!(err.as_domain(), Some(DomainError::NotFound { .. })));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_removes_never_oversell() {
        let services = stocked(10).await;

        let mut handles = Vec::new();
        for _ in 0..25 {
            let adjustments = services.adjustments.clone();
            handles.push(tokio::spawn(async move {
                adjustments
                    .adjust(adjustment("P1", "Spa-A", AdjustmentType::Remove, 1))
                    .await
            }));
        }

        let mut ok = 0;
        let mut seen = HashSet::new();
        for h in handles {
            match h.await.unwrap() {
                Ok(out) => {
                    ok += 1;
                    assert!(out.new_stock >= 0);
                    assert!(seen.insert(out.new_stock), "two removes observed the same stock");
                }
                Err(e) => assert!(matches!(e.as_domain(), Some(DomainError::InsufficientStock { .. }))),
            }
        }

        assert_eq!(ok, 10);
        assert_eq!(services.view.stock_at(&pid("P1"), &lid("Spa-A")).await.unwrap(), 0);
    }
}
