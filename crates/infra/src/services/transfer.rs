use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use salonstock_core::{Aggregate, AggregateRoot, DomainError, ExpectedVersion, LocationId, ProductId, ResourceKind, TransferId};
use salonstock_directory::Actor;
use salonstock_inventory::{
    AdjustmentType, CancelTransfer, CompleteTransfer, CreateTransfer, InventoryEvent, StockAdjustment, StockKey,
    Transfer, TransferCommand, TransferEvent,
};

use super::{AdjustmentService, DirectoryService, EventPublisher};
use crate::config::RetryPolicy;
use crate::error::{ServiceError, ServiceResult, StoreError, TransferError};
use crate::store::{StockLedger, TransferFilter, TransferStore};

/// Audit reason of the adjustment that credits the source back.
pub const COMPENSATION_REASON: &str = "transfer compensation";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTransferRequest {
    pub product_id: ProductId,
    pub from_location_id: LocationId,
    pub to_location_id: LocationId,
    pub quantity: i64,
    pub reason: String,
    #[serde(default)]
    pub notes: Option<String>,
    pub performed_by: Actor,
}

/// Moves stock between two locations as a remove leg and an add leg.
///
/// The pair is not one atomic write. If the add leg cannot be applied the
/// source is credited back with a compensating adjustment, so a transfer
/// either moves the full quantity or leaves both rows where they were.
pub struct TransferService {
    directory: Arc<DirectoryService>,
    adjustments: Arc<AdjustmentService>,
    ledger: Arc<dyn StockLedger>,
    transfers: Arc<dyn TransferStore>,
    events: EventPublisher,
    retry: RetryPolicy,
}

impl TransferService {
    pub fn new(
        directory: Arc<DirectoryService>,
        adjustments: Arc<AdjustmentService>,
        ledger: Arc<dyn StockLedger>,
        transfers: Arc<dyn TransferStore>,
        events: EventPublisher,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            directory,
            adjustments,
            ledger,
            transfers,
            events,
            retry,
        }
    }

    #[instrument(
        skip(self, request),
        fields(
            product_id = %request.product_id,
            from = %request.from_location_id,
            to = %request.to_location_id,
            quantity = request.quantity,
            transfer_id = tracing::field::Empty
        ),
        err
    )]
    pub async fn create_transfer(&self, request: CreateTransferRequest) -> Result<Transfer, TransferError> {
        let transfer_id = TransferId::new();
        tracing::Span::current().record("transfer_id", tracing::field::display(transfer_id));

        let mut transfer = Transfer::empty(transfer_id);
        let created = transfer.execute(&TransferCommand::Create(CreateTransfer {
            transfer_id,
            product_id: request.product_id.clone(),
            from_location_id: request.from_location_id.clone(),
            to_location_id: request.to_location_id.clone(),
            quantity: request.quantity,
            reason: request.reason.clone(),
            notes: request.notes.clone(),
            performed_by: request.performed_by.clone(),
            occurred_at: Utc::now(),
        }))?;

        self.directory.resolve_active_product(&request.product_id).await?;
        self.directory.resolve_active_location(&request.from_location_id).await?;
        self.directory.resolve_active_location(&request.to_location_id).await?;

        let source = StockKey::new(request.product_id.clone(), request.from_location_id.clone());
        let available = self.ledger.stock_at(&source).await?;
        if available < request.quantity {
            return Err(DomainError::InsufficientStock {
                product_id: request.product_id.to_string(),
                location_id: request.from_location_id.to_string(),
                available,
                requested: request.quantity,
            }
            .into());
        }

        self.transfers.save(&transfer, ExpectedVersion::Exact(0)).await?;
        self.publish(created);

        let source_leg = leg(&request, transfer_id, AdjustmentType::Remove, &request.from_location_id);
        let source = &source_leg;
        let taken = self
            .with_retry("source leg", move || self.adjustments.adjust(source.clone()))
            .await;

        if let Err(cause) = taken {
            tracing::warn!(error = %cause, "source leg failed; cancelling transfer");
            // A timed out attempt may still have committed the removal.
            if cause.is_transient() && self.leg_committed(&source_leg).await {
                return self
                    .roll_back(&mut transfer, &request, cause, |_, cause| TransferError::Rejected(cause))
                    .await;
            }
            self.cancel(&mut transfer, &cause).await;
            return Err(TransferError::Rejected(cause));
        }

        let destination_leg = leg(&request, transfer_id, AdjustmentType::Add, &request.to_location_id);
        let destination = &destination_leg;
        let placed = self
            .with_retry("destination leg", move || self.adjustments.adjust(destination.clone()))
            .await;

        if let Err(cause) = placed {
            tracing::warn!(error = %cause, "destination leg failed; compensating source");
            return self
                .roll_back(&mut transfer, &request, cause, |transfer_id, cause| {
                    TransferError::DestinationFailed {
                        transfer_id,
                        cause,
                        source_restored: true,
                    }
                })
                .await;
        }

        let expected = ExpectedVersion::Exact(transfer.version());
        let completed = transfer.execute(&TransferCommand::Complete(CompleteTransfer {
            transfer_id,
            occurred_at: Utc::now(),
        }))?;
        let record = &transfer;
        if let Err(e) = self
            .with_retry("record completion", move || self.transfers.save(record, expected))
            .await
        {
            // Both legs are committed and linked by transfer_id in the audit
            // trail; only the record lags behind.
            tracing::error!(error = %e, "failed to persist completed transfer");
        }
        self.publish(completed);

        tracing::info!(status = transfer.status().as_str(), "transfer completed");
        Ok(transfer)
    }

    pub async fn get_transfer(&self, id: TransferId) -> ServiceResult<Transfer> {
        self.transfers
            .get(id)
            .await?
            .ok_or_else(|| DomainError::not_found(ResourceKind::Transfer, id).into())
    }

    pub async fn list_transfers(&self, filter: &TransferFilter) -> ServiceResult<Vec<Transfer>> {
        self.transfers.list(filter).await
    }

    /// Credit the source back after its removal committed, then cancel.
    ///
    /// `restored` builds the error surfaced when the source is whole again.
    async fn roll_back(
        &self,
        transfer: &mut Transfer,
        request: &CreateTransferRequest,
        cause: ServiceError,
        restored: impl FnOnce(TransferId, ServiceError) -> TransferError,
    ) -> Result<Transfer, TransferError> {
        let transfer_id = transfer.id_typed();
        let compensation = StockAdjustment {
            reason: COMPENSATION_REASON.to_string(),
            notes: Some(format!("transfer failed: {cause}")),
            ..leg(request, transfer_id, AdjustmentType::Add, &request.from_location_id)
        };
        let compensation = &compensation;
        let outcome = self
            .with_retry("compensation", move || self.adjustments.compensate(compensation))
            .await;

        match outcome {
            Ok(_) => {
                self.cancel(transfer, &cause).await;
                Err(restored(transfer_id, cause))
            }
            Err(compensation) => {
                tracing::error!(
                    transfer_id = %transfer_id,
                    product_id = %request.product_id,
                    location_id = %request.from_location_id,
                    quantity = request.quantity,
                    cause = %cause,
                    compensation_error = %compensation,
                    "compensation failed; source location is short by the transfer quantity"
                );
                self.cancel(transfer, &compensation).await;
                Err(TransferError::CompensationFailed {
                    transfer_id,
                    cause,
                    compensation,
                })
            }
        }
    }

    /// Whether the audit trail holds the entry for `leg`. An unreadable
    /// trail counts as not committed and is logged.
    async fn leg_committed(&self, leg: &StockAdjustment) -> bool {
        let product_id = &leg.product_id;
        match self
            .with_retry("leg lookup", move || self.ledger.audit_trail(product_id))
            .await
        {
            Ok(trail) => trail.iter().any(|entry| entry.records_leg(leg)),
            Err(e) => {
                tracing::error!(
                    error = %e,
                    transfer_id = ?leg.transfer_id,
                    location_id = %leg.location_id,
                    "cannot tell whether the source leg committed"
                );
                false
            }
        }
    }

    /// Mark the transfer cancelled, recording why. Best effort: the stock
    /// outcome is already decided.
    async fn cancel(&self, transfer: &mut Transfer, failure: &ServiceError) {
        let expected = ExpectedVersion::Exact(transfer.version());
        let cancelled = match transfer.execute(&TransferCommand::Cancel(CancelTransfer {
            transfer_id: transfer.id_typed(),
            failure: failure.to_string(),
            occurred_at: Utc::now(),
        })) {
            Ok(events) => events,
            Err(e) => {
                tracing::warn!(error = %e, "transfer could not be cancelled");
                return;
            }
        };

        let record: &Transfer = transfer;
        if let Err(e) = self
            .with_retry("record cancellation", move || self.transfers.save(record, expected))
            .await
        {
            tracing::error!(error = %e, "failed to persist cancelled transfer");
        }
        self.publish(cancelled);
    }

    fn publish(&self, events: Vec<TransferEvent>) {
        for event in events {
            self.events.publish(InventoryEvent::Transfer(event));
        }
    }

    /// One attempt bounded by the per-attempt timeout.
    async fn attempt<T>(&self, step: &'static str, op: impl Future<Output = ServiceResult<T>>) -> ServiceResult<T> {
        match tokio::time::timeout(self.retry.attempt_timeout, op).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(format!(
                "{step} exceeded {}ms",
                self.retry.attempt_timeout.as_millis()
            ))
            .into()),
        }
    }

    /// Retry transient failures within the policy budget. Domain rejections
    /// are returned immediately.
    async fn with_retry<T, F, Fut>(&self, step: &'static str, mut op: F) -> ServiceResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ServiceResult<T>>,
    {
        let mut attempt = 1;
        loop {
            let err = match self.attempt(step, op()).await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };
            if !err.is_transient() || attempt >= self.retry.attempts {
                return Err(err);
            }

            let delay = self.retry.delay_for(attempt);
            tracing::warn!(
                step,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "transient failure; retrying"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

fn leg(
    request: &CreateTransferRequest,
    transfer_id: TransferId,
    adjustment_type: AdjustmentType,
    location_id: &LocationId,
) -> StockAdjustment {
    StockAdjustment {
        product_id: request.product_id.clone(),
        location_id: location_id.clone(),
        adjustment_type,
        quantity: request.quantity,
        reason: request.reason.clone(),
        notes: request.notes.clone(),
        actor: request.performed_by.clone(),
        transfer_id: Some(transfer_id),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use rust_decimal::Decimal;

    use salonstock_directory::LocationStatus;
    use salonstock_inventory::{AuditEntry, StockLevel, TransferStatus};

    use super::*;
    use crate::cache::LocationCache;
    use crate::config::AppConfig;
    use crate::services::InventoryServices;
    use crate::services::testing::{adjustment, lid, manager, pid, seed_catalog, stocked};
    use crate::store::{
        AppliedAdjustment, CatalogStore, InMemoryCatalogStore, InMemoryStockLedger, InMemoryTransferStore,
    };

    fn request(from: &str, to: &str, quantity: i64) -> CreateTransferRequest {
        CreateTransferRequest {
            product_id: pid("P1"),
            from_location_id: lid(from),
            to_location_id: lid(to),
            quantity,
            reason: "restock".into(),
            notes: None,
            performed_by: manager(),
        }
    }

    fn fast_config() -> AppConfig {
        AppConfig {
            transfer_retry: RetryPolicy {
                attempts: 3,
                attempt_timeout: Duration::from_millis(500),
                backoff: Duration::from_millis(1),
            },
            ..AppConfig::default()
        }
    }

    /// Which adjustments the wrapped ledger refuses.
    #[derive(Clone, Copy)]
    enum Fault {
        /// Adds at the location fail with a transient error this many times.
        TransientAdds(u32),
        /// Every add at the location fails.
        AllAdds,
        /// Every add anywhere fails, including compensation.
        Everything,
        /// The location is deactivated as soon as the source leg commits.
        DeactivateAfterRemove,
        /// Adds at the location commit, then stall past the attempt timeout
        /// this many times.
        StallAdds(u32),
        /// Every transfer removal commits, then stalls past the timeout.
        StallRemoves,
        /// Every add at the location fails; adds elsewhere (the
        /// compensation) fail this many times first.
        FlakyCompensation(u32),
    }

    const STALL: Duration = Duration::from_millis(800);

    struct FaultyLedger {
        inner: InMemoryStockLedger,
        catalog: Arc<InMemoryCatalogStore>,
        target: LocationId,
        fault: Fault,
        failures: AtomicU32,
        stalls: AtomicU32,
        restore_failures: AtomicU32,
    }

    impl FaultyLedger {
        fn fail(&self) -> ServiceResult<AppliedAdjustment> {
            self.failures.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Unavailable("injected".into()).into())
        }
    }

    #[async_trait]
    impl StockLedger for FaultyLedger {
        async fn stock_at(&self, key: &StockKey) -> ServiceResult<i64> {
            self.inner.stock_at(key).await
        }

        async fn levels_for_product(&self, product_id: &ProductId) -> ServiceResult<Vec<StockLevel>> {
            self.inner.levels_for_product(product_id).await
        }

        async fn levels_for_location(&self, location_id: &LocationId) -> ServiceResult<Vec<StockLevel>> {
            self.inner.levels_for_location(location_id).await
        }

        async fn all_levels(&self) -> ServiceResult<Vec<StockLevel>> {
            self.inner.all_levels().await
        }

        async fn apply(&self, adj: &StockAdjustment) -> ServiceResult<AppliedAdjustment> {
            let is_transfer_add = adj.transfer_id.is_some() && adj.adjustment_type == AdjustmentType::Add;
            match self.fault {
                Fault::TransientAdds(n) if is_transfer_add && adj.location_id == self.target => {
                    if self.failures.load(Ordering::SeqCst) < n {
                        return self.fail();
                    }
                }
                Fault::AllAdds if is_transfer_add && adj.location_id == self.target => return self.fail(),
                Fault::Everything if is_transfer_add => return self.fail(),
                Fault::FlakyCompensation(_) if is_transfer_add && adj.location_id == self.target => {
                    return self.fail();
                }
                Fault::FlakyCompensation(n) if is_transfer_add => {
                    if self.restore_failures.fetch_add(1, Ordering::SeqCst) < n {
                        return Err(StoreError::Unavailable("injected".into()).into());
                    }
                }
                _ => {}
            }

            let applied = self.inner.apply(adj).await?;

            let stall = match self.fault {
                Fault::StallAdds(n) => {
                    is_transfer_add
                        && adj.location_id == self.target
                        && self.stalls.fetch_add(1, Ordering::SeqCst) < n
                }
                Fault::StallRemoves => {
                    adj.transfer_id.is_some() && adj.adjustment_type == AdjustmentType::Remove
                }
                _ => false,
            };
            if stall {
                tokio::time::sleep(STALL).await;
            }

            if matches!(self.fault, Fault::DeactivateAfterRemove)
                && adj.transfer_id.is_some()
                && adj.adjustment_type == AdjustmentType::Remove
            {
                let mut target = self.catalog.get_location(&self.target).await?.unwrap();
                target.status = LocationStatus::Inactive;
                self.catalog.update_location(target).await?;
            }
            Ok(applied)
        }

        async fn set_price(&self, key: &StockKey, price: Option<Decimal>) -> ServiceResult<StockLevel> {
            self.inner.set_price(key, price).await
        }

        async fn audit_trail(&self, product_id: &ProductId) -> ServiceResult<Vec<AuditEntry>> {
            self.inner.audit_trail(product_id).await
        }

        async fn revision(&self, product_id: &ProductId) -> ServiceResult<u64> {
            self.inner.revision(product_id).await
        }
    }

    async fn faulty(fault: Fault, stock_at_a: i64) -> (InventoryServices, Arc<FaultyLedger>) {
        let catalog = Arc::new(InMemoryCatalogStore::new());
        let ledger = Arc::new(FaultyLedger {
            inner: InMemoryStockLedger::new(),
            catalog: catalog.clone(),
            target: lid("Spa-B"),
            fault,
            failures: AtomicU32::new(0),
            stalls: AtomicU32::new(0),
            restore_failures: AtomicU32::new(0),
        });
        let services = InventoryServices::build(
            catalog,
            ledger.clone(),
            Arc::new(InMemoryTransferStore::new()),
            Arc::new(LocationCache::new()),
            &fast_config(),
        );
        seed_catalog(&services).await;
        services
            .adjustments
            .adjust(adjustment("P1", "Spa-A", AdjustmentType::Add, stock_at_a))
            .await
            .unwrap();
        (services, ledger)
    }

    async fn stock(services: &InventoryServices, location: &str) -> i64 {
        services.view.stock_at(&pid("P1"), &lid(location)).await.unwrap()
    }

    #[tokio::test]
    async fn transfer_moves_quantity_and_links_audit_entries() {
        let services = stocked(10).await;
        let transfer = services.transfers.create_transfer(request("Spa-A", "Spa-B", 4)).await.unwrap();

        assert_eq!(transfer.status(), TransferStatus::Completed);
        assert!(transfer.completed_at().is_some());
        assert_eq!(stock(&services, "Spa-A").await, 6);
        assert_eq!(stock(&services, "Spa-B").await, 4);
        assert_eq!(services.view.total_stock(&pid("P1")).await.unwrap(), 10);

        let linked: Vec<i64> = services
            .view
            .audit_trail(&pid("P1"))
            .await
            .unwrap()
            .into_iter()
            .filter(|e| e.transfer_id == Some(transfer.id_typed()))
            .map(|e| e.delta)
            .collect();
        assert_eq!(linked, vec![-4, 4]);

        let stored = services.transfers.get_transfer(transfer.id_typed()).await.unwrap();
        assert_eq!(stored.status(), TransferStatus::Completed);
    }

    #[tokio::test]
    async fn same_source_and_destination_is_rejected_without_mutation() {
        let services = stocked(10).await;
        let err = services
            .transfers
            .create_transfer(request("Spa-A", "Spa-A", 1))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            TransferError::Rejected(ServiceError::Domain(DomainError::InvalidTransfer(_)))
        ));
        assert_eq!(stock(&services, "Spa-A").await, 10);
        assert!(services
            .transfers
            .list_transfers(&TransferFilter::default())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn insufficient_source_is_rejected_before_any_record() {
        let services = stocked(3).await;
        let err = services
            .transfers
            .create_transfer(request("Spa-A", "Spa-B", 5))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            TransferError::Rejected(ServiceError::Domain(DomainError::InsufficientStock {
                available: 3,
                requested: 5,
                ..
            }))
        ));
        assert_eq!(stock(&services, "Spa-A").await, 3);
        assert_eq!(stock(&services, "Spa-B").await, 0);
        assert!(services
            .transfers
            .list_transfers(&TransferFilter::default())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn inactive_destination_is_rejected_up_front() {
        let services = stocked(10).await;
        services
            .directory
            .set_location_status(&lid("Spa-B"), LocationStatus::Inactive)
            .await
            .unwrap();

        let err = services
            .transfers
            .create_transfer(request("Spa-A", "Spa-B", 1))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TransferError::Rejected(ServiceError::Domain(DomainError::Inactive { .. }))
        ));
        assert_eq!(stock(&services, "Spa-A").await, 10);
    }

    #[tokio::test]
    async fn transient_destination_failures_are_retried() {
        let (services, ledger) = faulty(Fault::TransientAdds(2), 10).await;
        let transfer = services.transfers.create_transfer(request("Spa-A", "Spa-B", 4)).await.unwrap();

        assert_eq!(transfer.status(), TransferStatus::Completed);
        assert_eq!(ledger.failures.load(Ordering::SeqCst), 2);
        assert_eq!(stock(&services, "Spa-A").await, 6);
        assert_eq!(stock(&services, "Spa-B").await, 4);
    }

    #[tokio::test]
    async fn failed_destination_restores_the_source() {
        let (services, ledger) = faulty(Fault::AllAdds, 10).await;
        let err = services
            .transfers
            .create_transfer(request("Spa-A", "Spa-B", 4))
            .await
            .unwrap_err();

        let transfer_id = match err {
            TransferError::DestinationFailed {
                transfer_id,
                source_restored,
                ref cause,
            } => {
                assert!(source_restored);
                assert!(cause.is_transient());
                transfer_id
            }
            other => panic!("expected destination failure, got {other:?}"),
        };
        assert_eq!(ledger.failures.load(Ordering::SeqCst), 3);
        assert_eq!(stock(&services, "Spa-A").await, 10);
        assert_eq!(stock(&services, "Spa-B").await, 0);

        let trail = services.view.audit_trail(&pid("P1")).await.unwrap();
        let compensation = trail.last().unwrap();
        assert_eq!(compensation.reason, COMPENSATION_REASON);
        assert_eq!(compensation.delta, 4);
        assert_eq!(compensation.transfer_id, Some(transfer_id));

        let stored = services.transfers.get_transfer(transfer_id).await.unwrap();
        assert_eq!(stored.status(), TransferStatus::Cancelled);
        assert!(stored.failure().is_some());
    }

    #[tokio::test]
    async fn destination_deactivated_mid_flight_is_compensated() {
        let (services, ledger) = faulty(Fault::DeactivateAfterRemove, 10).await;
        let err = services
            .transfers
            .create_transfer(request("Spa-A", "Spa-B", 4))
            .await
            .unwrap_err();

        match err {
            TransferError::DestinationFailed {
                cause, source_restored, ..
            } => {
                assert!(source_restored);
                assert!(matches!(cause.as_domain(), Some(DomainError::Inactive { .. })));
            }
            other => panic!("expected destination failure, got {other:?}"),
        }
        assert_eq!(ledger.failures.load(Ordering::SeqCst), 0);
        assert_eq!(stock(&services, "Spa-A").await, 10);
        assert_eq!(stock(&services, "Spa-B").await, 0);
    }

    #[tokio::test]
    async fn failed_compensation_is_surfaced() {
        let (services, _) = faulty(Fault::Everything, 10).await;
        let err = services
            .transfers
            .create_transfer(request("Spa-A", "Spa-B", 4))
            .await
            .unwrap_err();

        let transfer_id = match err {
            TransferError::CompensationFailed { transfer_id, .. } => transfer_id,
            other => panic!("expected compensation failure, got {other:?}"),
        };
        assert_eq!(stock(&services, "Spa-A").await, 6);
        assert_eq!(stock(&services, "Spa-B").await, 0);

        let stored = services.transfers.get_transfer(transfer_id).await.unwrap();
        assert_eq!(stored.status(), TransferStatus::Cancelled);
    }

    #[tokio::test]
    async fn destination_committed_before_timeout_is_not_applied_twice() {
        let (services, ledger) = faulty(Fault::StallAdds(1), 10).await;
        let transfer = services.transfers.create_transfer(request("Spa-A", "Spa-B", 4)).await.unwrap();

        assert_eq!(transfer.status(), TransferStatus::Completed);
        assert_eq!(ledger.stalls.load(Ordering::SeqCst), 2);
        assert_eq!(stock(&services, "Spa-A").await, 6);
        assert_eq!(stock(&services, "Spa-B").await, 4);
        assert_eq!(services.view.total_stock(&pid("P1")).await.unwrap(), 10);

        let legs = services
            .view
            .audit_trail(&pid("P1"))
            .await
            .unwrap()
            .into_iter()
            .filter(|e| e.transfer_id == Some(transfer.id_typed()))
            .count();
        assert_eq!(legs, 2);
    }

    #[tokio::test]
    async fn source_committed_before_timeout_is_credited_back() {
        let (services, _) = faulty(Fault::StallRemoves, 10).await;
        let err = services
            .transfers
            .create_transfer(request("Spa-A", "Spa-B", 4))
            .await
            .unwrap_err();

        match err {
            TransferError::Rejected(ref cause) => {
                assert!(matches!(cause, ServiceError::Store(StoreError::Timeout(_))));
            }
            other => panic!("expected rejected transfer, got {other:?}"),
        }
        assert_eq!(stock(&services, "Spa-A").await, 10);
        assert_eq!(stock(&services, "Spa-B").await, 0);

        let deltas: Vec<i64> = services
            .view
            .audit_trail(&pid("P1"))
            .await
            .unwrap()
            .into_iter()
            .filter(|e| e.transfer_id.is_some())
            .map(|e| e.delta)
            .collect();
        assert_eq!(deltas, vec![-4, 4]);

        let cancelled = services
            .transfers
            .list_transfers(&TransferFilter {
                status: Some(TransferStatus::Cancelled),
                ..TransferFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(cancelled.len(), 1);
    }

    #[tokio::test]
    async fn compensation_retries_transient_failures() {
        let (services, ledger) = faulty(Fault::FlakyCompensation(2), 10).await;
        let err = services
            .transfers
            .create_transfer(request("Spa-A", "Spa-B", 4))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            TransferError::DestinationFailed {
                source_restored: true,
                ..
            }
        ));
        assert_eq!(ledger.failures.load(Ordering::SeqCst), 3);
        assert_eq!(ledger.restore_failures.load(Ordering::SeqCst), 3);
        assert_eq!(stock(&services, "Spa-A").await, 10);
        assert_eq!(stock(&services, "Spa-B").await, 0);

        let compensations = services
            .view
            .audit_trail(&pid("P1"))
            .await
            .unwrap()
            .into_iter()
            .filter(|e| e.reason == COMPENSATION_REASON)
            .count();
        assert_eq!(compensations, 1);
    }

    #[tokio::test]
    async fn unknown_transfer_is_not_found() {
        let services = stocked(0).await;
        let err = services.transfers.get_transfer(TransferId::new()).await.unwrap_err();
        assert!(matches!(err.as_domain(), Some(DomainError::NotFound { .. })));
    }

    #[tokio::test]
    async fn listing_filters_by_location_and_status() {
        let services = stocked(10).await;
        services.transfers.create_transfer(request("Spa-A", "Spa-B", 2)).await.unwrap();
        services.transfers.create_transfer(request("Spa-B", "home", 1)).await.unwrap();

        let touching_home = services
            .transfers
            .list_transfers(&TransferFilter {
                location_id: Some(lid("home")),
                ..TransferFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(touching_home.len(), 1);

        let completed = services
            .transfers
            .list_transfers(&TransferFilter {
                status: Some(TransferStatus::Completed),
                ..TransferFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(completed.len(), 2);
        assert!(completed.iter().all(|t| t.completed_at().is_some()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_transfers_conserve_stock() {
        let services = stocked(10).await;

        let mut handles = Vec::new();
        for i in 0..8 {
            let transfers = services.transfers.clone();
            let (from, to) = if i % 2 == 0 { ("Spa-A", "Spa-B") } else { ("Spa-A", "home") };
            handles.push(tokio::spawn(async move { transfers.create_transfer(request(from, to, 2)).await }));
        }

        let mut completed = 0;
        for h in handles {
            if h.await.unwrap().is_ok() {
                completed += 1;
            }
        }

        assert_eq!(completed, 5);
        assert_eq!(stock(&services, "Spa-A").await, 0);
        assert_eq!(services.view.total_stock(&pid("P1")).await.unwrap(), 10);
    }
}
