use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use salonstock_core::{AuditEntryId, DomainError, DomainResult, LocationId, ProductId, TransferId};
use salonstock_directory::Actor;

/// Composite key of a LocationStock row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StockKey {
    pub product_id: ProductId,
    pub location_id: LocationId,
}

impl StockKey {
    pub fn new(product_id: ProductId, location_id: LocationId) -> Self {
        Self {
            product_id,
            location_id,
        }
    }
}

impl core::fmt::Display for StockKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}@{}", self.product_id, self.location_id)
    }
}

/// One LocationStock row: stock of a product at a location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevel {
    pub product_id: ProductId,
    pub location_id: LocationId,
    pub stock: i64,
    /// Location-specific price override.
    pub price: Option<Decimal>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdjustmentType {
    Add,
    Remove,
}

impl AdjustmentType {
    pub fn as_str(self) -> &'static str {
        match self {
            AdjustmentType::Add => "add",
            AdjustmentType::Remove => "remove",
        }
    }
}

/// A request to move one LocationStock row by a signed amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAdjustment {
    pub product_id: ProductId,
    pub location_id: LocationId,
    pub adjustment_type: AdjustmentType,
    pub quantity: i64,
    pub reason: String,
    pub notes: Option<String>,
    pub actor: Actor,
    /// Set when the adjustment is a leg (or compensation) of a transfer.
    pub transfer_id: Option<TransferId>,
}

impl StockAdjustment {
    pub fn key(&self) -> StockKey {
        StockKey::new(self.product_id.clone(), self.location_id.clone())
    }

    /// Input validation that does not need the current stock.
    pub fn validate(&self) -> DomainResult<()> {
        if self.quantity <= 0 {
            return Err(DomainError::validation("quantity must be greater than zero"));
        }
        if self.reason.trim().is_empty() {
            return Err(DomainError::validation("reason is required"));
        }
        Ok(())
    }

    /// Signed change this adjustment applies.
    pub fn delta(&self) -> i64 {
        match self.adjustment_type {
            AdjustmentType::Add => self.quantity,
            AdjustmentType::Remove => -self.quantity,
        }
    }

    /// Decide the new stock given the current value.
    ///
    /// Must be evaluated inside the same atomic section as the write. A
    /// removal that would go below zero is rejected whole, never clamped.
    pub fn apply_to(&self, current: i64) -> DomainResult<i64> {
        self.validate()?;

        let new_stock = current
            .checked_add(self.delta())
            .ok_or_else(|| DomainError::validation("stock overflow"))?;

        if new_stock < 0 {
            return Err(DomainError::InsufficientStock {
                product_id: self.product_id.to_string(),
                location_id: self.location_id.to_string(),
                available: current,
                requested: self.quantity,
            });
        }

        Ok(new_stock)
    }

    /// The audit entry for this adjustment once it has been applied.
    pub fn audit_entry(&self, previous_stock: i64, new_stock: i64, at: DateTime<Utc>) -> AuditEntry {
        AuditEntry {
            id: AuditEntryId::new(),
            product_id: self.product_id.clone(),
            location_id: self.location_id.clone(),
            delta: self.delta(),
            reason: self.reason.trim().to_string(),
            notes: self.notes.clone(),
            previous_stock,
            new_stock,
            actor: self.actor.clone(),
            transfer_id: self.transfer_id,
            timestamp: at,
        }
    }
}

/// Result of a successful adjustment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustmentOutcome {
    pub previous_stock: i64,
    pub new_stock: i64,
    /// The (unsigned) quantity applied.
    pub adjustment: i64,
    pub audit_entry_id: AuditEntryId,
}

/// Append-only "why did stock change" record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: AuditEntryId,
    pub product_id: ProductId,
    pub location_id: LocationId,
    pub delta: i64,
    pub reason: String,
    pub notes: Option<String>,
    pub previous_stock: i64,
    pub new_stock: i64,
    pub actor: Actor,
    pub transfer_id: Option<TransferId>,
    pub timestamp: DateTime<Utc>,
}

impl AuditEntry {
    /// Whether this entry records the same transfer leg as `adjustment`.
    ///
    /// A transfer touches a `(location, direction)` pair at most once, so
    /// the triple identifies a leg (or its compensation). Plain adjustments
    /// never match.
    pub fn records_leg(&self, adjustment: &StockAdjustment) -> bool {
        match (self.transfer_id, adjustment.transfer_id) {
            (Some(recorded), Some(requested)) => {
                recorded == requested
                    && self.product_id == adjustment.product_id
                    && self.location_id == adjustment.location_id
                    && (self.delta > 0) == (adjustment.adjustment_type == AdjustmentType::Add)
            }
            _ => false,
        }
    }
}

impl From<&AuditEntry> for AdjustmentOutcome {
    fn from(entry: &AuditEntry) -> Self {
        Self {
            previous_stock: entry.previous_stock,
            new_stock: entry.new_stock,
            adjustment: entry.delta.abs(),
            audit_entry_id: entry.id,
        }
    }
}
