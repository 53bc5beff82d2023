//! Domain error model.

use serde::Serialize;
use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Which registry a missing or disabled resource belongs to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Product,
    Location,
    Category,
    ProductType,
    Transfer,
}

impl ResourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Product => "product",
            ResourceKind::Location => "location",
            ResourceKind::Category => "category",
            ResourceKind::ProductType => "product_type",
            ResourceKind::Transfer => "transfer",
        }
    }
}

impl core::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Domain-level error.
///
/// Deterministic business failures only. Every variant carries enough detail
/// for a caller to render a specific message (which location, how much short).
/// Storage and transport failures live in the infra layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Malformed or missing input.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Unknown identifier.
    #[error("{kind} not found: {id}")]
    NotFound { kind: ResourceKind, id: String },

    /// The resource exists but is disabled.
    #[error("{kind} is inactive: {id}")]
    Inactive { kind: ResourceKind, id: String },

    /// The operation would drive a stock row negative.
    #[error(
        "insufficient stock for product {product_id} at location {location_id} \
         (available: {available}, requested: {requested})"
    )]
    InsufficientStock {
        product_id: String,
        location_id: String,
        available: i64,
        requested: i64,
    },

    /// Transfer-specific precondition failure (e.g. same source and destination).
    #[error("invalid transfer: {0}")]
    InvalidTransfer(String),

    /// A state conflict (stale version, illegal lifecycle transition).
    #[error("conflict: {0}")]
    Conflict(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(kind: ResourceKind, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub fn inactive(kind: ResourceKind, id: impl ToString) -> Self {
        Self::Inactive {
            kind,
            id: id.to_string(),
        }
    }

    pub fn invalid_transfer(msg: impl Into<String>) -> Self {
        Self::InvalidTransfer(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Stable machine-readable code (used in API error bodies).
    pub fn code(&self) -> &'static str {
        match self {
            DomainError::Validation(_) => "validation_error",
            DomainError::NotFound { .. } => "not_found",
            DomainError::Inactive { .. } => "inactive_resource",
            DomainError::InsufficientStock { .. } => "insufficient_stock",
            DomainError::InvalidTransfer(_) => "invalid_transfer",
            DomainError::Conflict(_) => "conflict",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_stock_message_names_location_and_shortfall() {
        let err = DomainError::InsufficientStock {
            product_id: "P1".into(),
            location_id: "Spa-A".into(),
            available: 3,
            requested: 5,
        };
        let msg = err.to_string();
        assert!(msg.contains("Spa-A"));
        assert!(msg.contains("available: 3"));
        assert!(msg.contains("requested: 5"));
        assert_eq!(err.code(), "insufficient_stock");
    }

    #[test]
    fn not_found_and_inactive_are_distinct() {
        let nf = DomainError::not_found(ResourceKind::Location, "Spa-Z");
        let ia = DomainError::inactive(ResourceKind::Location, "Spa-Z");
        assert_ne!(nf, ia);
        assert_eq!(nf.to_string(), "location not found: Spa-Z");
        assert_eq!(ia.to_string(), "location is inactive: Spa-Z");
    }
}
