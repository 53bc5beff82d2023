use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use salonstock_core::{Aggregate, AggregateRoot, DomainError, LocationId, ProductId, TransferId};
use salonstock_directory::Actor;
use salonstock_events::Event;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    Pending,
    Completed,
    Cancelled,
}

impl TransferStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TransferStatus::Pending => "pending",
            TransferStatus::Completed => "completed",
            TransferStatus::Cancelled => "cancelled",
        }
    }
}

impl core::str::FromStr for TransferStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(TransferStatus::Pending),
            "completed" => Ok(TransferStatus::Completed),
            "cancelled" => Ok(TransferStatus::Cancelled),
            other => Err(DomainError::validation(format!("unknown transfer status: {other}"))),
        }
    }
}

/// Aggregate root: Transfer.
///
/// Lifecycle: `pending` → `completed` once both legs succeeded, or
/// `pending` → `cancelled` when a leg failed (after any compensation).
/// Terminal states never change again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    id: TransferId,
    product_id: Option<ProductId>,
    from_location_id: Option<LocationId>,
    to_location_id: Option<LocationId>,
    quantity: i64,
    reason: String,
    notes: Option<String>,
    performed_by: Option<Actor>,
    status: TransferStatus,
    created_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
    failure: Option<String>,
    version: u64,
}

impl Transfer {
    /// Create an empty, not-yet-created aggregate instance.
    pub fn empty(id: TransferId) -> Self {
        Self {
            id,
            product_id: None,
            from_location_id: None,
            to_location_id: None,
            quantity: 0,
            reason: String::new(),
            notes: None,
            performed_by: None,
            status: TransferStatus::Pending,
            created_at: None,
            completed_at: None,
            cancelled_at: None,
            failure: None,
            version: 0,
        }
    }

    pub fn id_typed(&self) -> TransferId {
        self.id
    }

    pub fn is_created(&self) -> bool {
        self.created_at.is_some()
    }

    pub fn product_id(&self) -> Option<&ProductId> {
        self.product_id.as_ref()
    }

    pub fn from_location_id(&self) -> Option<&LocationId> {
        self.from_location_id.as_ref()
    }

    pub fn to_location_id(&self) -> Option<&LocationId> {
        self.to_location_id.as_ref()
    }

    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn performed_by(&self) -> Option<&Actor> {
        self.performed_by.as_ref()
    }

    pub fn status(&self) -> TransferStatus {
        self.status
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn cancelled_at(&self) -> Option<DateTime<Utc>> {
        self.cancelled_at
    }

    /// Why the transfer was cancelled, if it was.
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    /// Whether the transfer moves stock in or out of `location_id`.
    pub fn touches_location(&self, location_id: &LocationId) -> bool {
        self.from_location_id.as_ref() == Some(location_id)
            || self.to_location_id.as_ref() == Some(location_id)
    }
}

impl AggregateRoot for Transfer {
    type Id = TransferId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateTransfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTransfer {
    pub transfer_id: TransferId,
    pub product_id: ProductId,
    pub from_location_id: LocationId,
    pub to_location_id: LocationId,
    pub quantity: i64,
    pub reason: String,
    pub notes: Option<String>,
    pub performed_by: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CompleteTransfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteTransfer {
    pub transfer_id: TransferId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelTransfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelTransfer {
    pub transfer_id: TransferId,
    pub failure: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferCommand {
    Create(CreateTransfer),
    Complete(CompleteTransfer),
    Cancel(CancelTransfer),
}

/// Event: TransferCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferCreated {
    pub transfer_id: TransferId,
    pub product_id: ProductId,
    pub from_location_id: LocationId,
    pub to_location_id: LocationId,
    pub quantity: i64,
    pub reason: String,
    pub notes: Option<String>,
    pub performed_by: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Event: TransferCompleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferCompleted {
    pub transfer_id: TransferId,
    pub product_id: ProductId,
    pub from_location_id: LocationId,
    pub to_location_id: LocationId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: TransferCancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferCancelled {
    pub transfer_id: TransferId,
    pub failure: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferEvent {
    Created(TransferCreated),
    Completed(TransferCompleted),
    Cancelled(TransferCancelled),
}

impl Event for TransferEvent {
    fn event_type(&self) -> &'static str {
        match self {
            TransferEvent::Created(_) => "inventory.transfer.created",
            TransferEvent::Completed(_) => "inventory.transfer.completed",
            TransferEvent::Cancelled(_) => "inventory.transfer.cancelled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            TransferEvent::Created(e) => e.occurred_at,
            TransferEvent::Completed(e) => e.occurred_at,
            TransferEvent::Cancelled(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Transfer {
    type Command = TransferCommand;
    type Event = TransferEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            TransferEvent::Created(e) => {
                self.id = e.transfer_id;
                self.product_id = Some(e.product_id.clone());
                self.from_location_id = Some(e.from_location_id.clone());
                self.to_location_id = Some(e.to_location_id.clone());
                self.quantity = e.quantity;
                self.reason = e.reason.clone();
                self.notes = e.notes.clone();
                self.performed_by = Some(e.performed_by.clone());
                self.status = TransferStatus::Pending;
                self.created_at = Some(e.occurred_at);
            }
            TransferEvent::Completed(e) => {
                self.status = TransferStatus::Completed;
                self.completed_at = Some(e.occurred_at);
            }
            TransferEvent::Cancelled(e) => {
                self.status = TransferStatus::Cancelled;
                self.cancelled_at = Some(e.occurred_at);
                self.failure = Some(e.failure.clone());
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            TransferCommand::Create(cmd) => self.handle_create(cmd),
            TransferCommand::Complete(cmd) => self.handle_complete(cmd),
            TransferCommand::Cancel(cmd) => self.handle_cancel(cmd),
        }
    }
}

impl Transfer {
    fn ensure_transfer_id(&self, transfer_id: TransferId) -> Result<(), DomainError> {
        if self.id != transfer_id {
            return Err(DomainError::invalid_transfer("transfer_id mismatch"));
        }
        Ok(())
    }

    fn ensure_pending(&self) -> Result<(), DomainError> {
        if !self.is_created() {
            return Err(DomainError::not_found(
                salonstock_core::ResourceKind::Transfer,
                self.id,
            ));
        }
        if self.status != TransferStatus::Pending {
            return Err(DomainError::conflict(format!(
                "transfer {} is already {}",
                self.id,
                self.status.as_str()
            )));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateTransfer) -> Result<Vec<TransferEvent>, DomainError> {
        if self.is_created() {
            return Err(DomainError::conflict("transfer already exists"));
        }
        self.ensure_transfer_id(cmd.transfer_id)?;

        if cmd.from_location_id == cmd.to_location_id {
            return Err(DomainError::invalid_transfer(format!(
                "source and destination are the same location ({})",
                cmd.from_location_id
            )));
        }
        if cmd.quantity <= 0 {
            return Err(DomainError::validation("quantity must be greater than zero"));
        }
        if cmd.reason.trim().is_empty() {
            return Err(DomainError::validation("reason is required"));
        }

        Ok(vec![TransferEvent::Created(TransferCreated {
            transfer_id: cmd.transfer_id,
            product_id: cmd.product_id.clone(),
            from_location_id: cmd.from_location_id.clone(),
            to_location_id: cmd.to_location_id.clone(),
            quantity: cmd.quantity,
            reason: cmd.reason.trim().to_string(),
            notes: cmd.notes.clone(),
            performed_by: cmd.performed_by.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_complete(&self, cmd: &CompleteTransfer) -> Result<Vec<TransferEvent>, DomainError> {
        self.ensure_transfer_id(cmd.transfer_id)?;
        self.ensure_pending()?;

        // ensure_pending guarantees the create event was applied.
        let (Some(product_id), Some(from), Some(to)) = (
            self.product_id.clone(),
            self.from_location_id.clone(),
            self.to_location_id.clone(),
        ) else {
            return Err(DomainError::conflict("transfer is missing its legs"));
        };

        Ok(vec![TransferEvent::Completed(TransferCompleted {
            transfer_id: self.id,
            product_id,
            from_location_id: from,
            to_location_id: to,
            quantity: self.quantity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &CancelTransfer) -> Result<Vec<TransferEvent>, DomainError> {
        self.ensure_transfer_id(cmd.transfer_id)?;
        self.ensure_pending()?;

        Ok(vec![TransferEvent::Cancelled(TransferCancelled {
            transfer_id: self.id,
            failure: cmd.failure.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}
