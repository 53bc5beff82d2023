//! Infrastructure error model.
//!
//! `StoreError` covers failures of the backing store itself. Services surface
//! `ServiceError`, which is either a deterministic business rejection
//! (`DomainError`) or a store failure. Transfers add the two outcomes that
//! only exist once stock has already moved.

use salonstock_core::{DomainError, TransferId};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store could not be reached (pool closed, connection refused).
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The operation did not finish within its time budget.
    #[error("store operation timed out: {0}")]
    Timeout(String),

    /// The store rejected the statement.
    #[error("database error: {0}")]
    Database(String),

    /// A persisted record could not be decoded.
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Whether retrying the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_) | StoreError::Timeout(_))
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ServiceError {
    pub fn is_transient(&self) -> bool {
        match self {
            ServiceError::Domain(_) => false,
            ServiceError::Store(e) => e.is_transient(),
        }
    }

    pub fn as_domain(&self) -> Option<&DomainError> {
        match self {
            ServiceError::Domain(e) => Some(e),
            ServiceError::Store(_) => None,
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Failure of a transfer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransferError {
    /// Rejected before any stock moved, or the source leg itself failed.
    /// A removal that committed before failing has been credited back.
    #[error(transparent)]
    Rejected(#[from] ServiceError),

    /// The destination leg failed after the source was debited.
    #[error(
        "transfer {transfer_id}: destination leg failed ({cause}); source restored: {source_restored}"
    )]
    DestinationFailed {
        transfer_id: TransferId,
        cause: ServiceError,
        source_restored: bool,
    },

    /// The destination leg failed and the source could not be credited back.
    #[error(
        "transfer {transfer_id}: compensation failed ({compensation}) after destination leg failed ({cause})"
    )]
    CompensationFailed {
        transfer_id: TransferId,
        cause: ServiceError,
        compensation: ServiceError,
    },
}

impl From<DomainError> for TransferError {
    fn from(err: DomainError) -> Self {
        TransferError::Rejected(ServiceError::Domain(err))
    }
}

impl From<StoreError> for TransferError {
    fn from(err: StoreError) -> Self {
        TransferError::Rejected(ServiceError::Store(err))
    }
}
