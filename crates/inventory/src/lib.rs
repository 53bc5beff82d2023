//! Inventory domain module.
//!
//! Business rules for per-location stock, implemented as deterministic
//! domain logic (no IO, no HTTP, no storage): the stock adjustment decision,
//! the audit entry it produces, and the transfer lifecycle.

pub mod event;
pub mod stock;
pub mod transfer;

pub use event::{InventoryEvent, PriceChanged, StockAdjusted};
pub use stock::{AdjustmentOutcome, AdjustmentType, AuditEntry, StockAdjustment, StockKey, StockLevel};
pub use transfer::{
    CancelTransfer, CompleteTransfer, CreateTransfer, Transfer, TransferCancelled, TransferCommand,
    TransferCompleted, TransferCreated, TransferEvent, TransferStatus,
};
