use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Json, Query};
use axum::http::{HeaderMap, StatusCode};
use rust_decimal::Decimal;
use serde::Deserialize;

use salonstock_core::{CategoryId, DomainError, LocationId, ProductId, ProductTypeId, TransferId};
use salonstock_directory::{Actor, LocationStatus, ProductFilter, StaffRole};
use salonstock_infra::services::LocationScope;
use salonstock_infra::store::TransferFilter;
use salonstock_inventory::{AdjustmentOutcome, AdjustmentType, StockAdjustment, Transfer, TransferStatus};

use crate::app::errors;

/// Handlers return a response either way; the error side is already rendered.
pub type ApiResult = Result<axum::response::Response, axum::response::Response>;

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct AdjustStockRequest {
    pub product_id: String,
    pub location_id: String,
    pub adjustment_type: String,
    pub quantity: i64,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateTransferBody {
    pub product_id: String,
    pub from_location_id: String,
    pub to_location_id: String,
    pub quantity: i64,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SetActiveRequest {
    pub is_active: bool,
}

#[derive(Debug, Deserialize)]
pub struct LocationStatusRequest {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct SetPriceRequest {
    /// `null` clears the override.
    pub price: Option<Decimal>,
}

// -------------------------
// Query parameters
// -------------------------

#[derive(Debug, Default, Deserialize)]
pub struct LocationQuery {
    pub location: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TransferListQuery {
    pub product_id: Option<String>,
    pub location_id: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProductListQuery {
    pub category: Option<String>,
    pub product_type: Option<String>,
    pub is_retail: Option<bool>,
    pub is_active: Option<bool>,
    pub search: Option<String>,
    pub location: Option<String>,
}

// -------------------------
// Extraction helpers
// -------------------------

pub fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, axum::response::Response> {
    body.map(|Json(v)| v)
        .map_err(|e| errors::json_error(StatusCode::BAD_REQUEST, "validation_error", e.body_text()))
}

pub fn query_params<T>(query: Result<Query<T>, QueryRejection>) -> Result<T, axum::response::Response> {
    query
        .map(|Query(v)| v)
        .map_err(|e| errors::json_error(StatusCode::BAD_REQUEST, "validation_error", e.body_text()))
}

/// Map a domain parse failure straight to its response.
pub fn parsed<T>(result: Result<T, DomainError>) -> Result<T, axum::response::Response> {
    result.map_err(errors::domain_error_to_response)
}

/// Who is performing the request, from `X-Actor-Id` / `X-Actor-Role`.
pub fn actor_from_headers(headers: &HeaderMap) -> Result<Actor, axum::response::Response> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    let id = header(ACTOR_ID_HEADER).ok_or_else(|| {
        errors::json_error(StatusCode::BAD_REQUEST, "validation_error", "X-Actor-Id header is required")
    })?;
    let role = header(ACTOR_ROLE_HEADER).ok_or_else(|| {
        errors::json_error(StatusCode::BAD_REQUEST, "validation_error", "X-Actor-Role header is required")
    })?;

    let role: StaffRole = parsed(role.parse())?;
    parsed(Actor::new(id, role))
}

pub fn parse_adjustment_type(raw: &str) -> Result<AdjustmentType, DomainError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "add" => Ok(AdjustmentType::Add),
        "remove" => Ok(AdjustmentType::Remove),
        other => Err(DomainError::validation(format!(
            "adjustment_type must be add or remove, got {other:?}"
        ))),
    }
}

pub fn parse_transfer_id(raw: &str) -> Result<TransferId, axum::response::Response> {
    raw.parse::<uuid::Uuid>()
        .map(TransferId::from_uuid)
        .map_err(|_| errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid transfer id"))
}

impl AdjustStockRequest {
    pub fn into_adjustment(self, actor: Actor) -> Result<StockAdjustment, DomainError> {
        Ok(StockAdjustment {
            product_id: ProductId::parse(&self.product_id)?,
            location_id: LocationId::parse(&self.location_id)?,
            adjustment_type: parse_adjustment_type(&self.adjustment_type)?,
            quantity: self.quantity,
            reason: self.reason,
            notes: self.notes,
            actor,
            transfer_id: None,
        })
    }
}

impl LocationQuery {
    pub fn scope(&self) -> Result<LocationScope, DomainError> {
        self.location.as_deref().unwrap_or("all").parse()
    }
}

impl LocationStatusRequest {
    pub fn status(&self) -> Result<LocationStatus, DomainError> {
        self.status.parse()
    }
}

impl TransferListQuery {
    pub fn into_filter(self) -> Result<TransferFilter, DomainError> {
        Ok(TransferFilter {
            product_id: self.product_id.map(ProductId::parse).transpose()?,
            location_id: self.location_id.map(LocationId::parse).transpose()?,
            status: self.status.map(|s| s.parse::<TransferStatus>()).transpose()?,
        })
    }
}

impl ProductListQuery {
    pub fn into_parts(self) -> Result<(ProductFilter, Option<LocationId>), DomainError> {
        let filter = ProductFilter {
            category: self.category.map(CategoryId::parse).transpose()?,
            product_type: self.product_type.map(ProductTypeId::parse).transpose()?,
            is_retail: self.is_retail,
            is_active: self.is_active,
            search: self.search,
        };
        let location = self
            .location
            .filter(|l| l.trim() != "all")
            .map(LocationId::parse)
            .transpose()?;
        Ok((filter, location))
    }
}

// -------------------------
// Response mapping
// -------------------------

pub fn adjustment_to_json(adjustment: &StockAdjustment, outcome: AdjustmentOutcome) -> serde_json::Value {
    serde_json::json!({
        "product_id": adjustment.product_id,
        "location_id": adjustment.location_id,
        "adjustment_type": adjustment.adjustment_type.as_str(),
        "previous_stock": outcome.previous_stock,
        "new_stock": outcome.new_stock,
        "adjustment": outcome.adjustment,
        "audit_entry_id": outcome.audit_entry_id,
    })
}

pub fn transfer_to_json(transfer: &Transfer) -> serde_json::Value {
    serde_json::json!({
        "id": transfer.id_typed(),
        "transfer_id": transfer.id_typed(),
        "product_id": transfer.product_id(),
        "from_location_id": transfer.from_location_id(),
        "to_location_id": transfer.to_location_id(),
        "quantity": transfer.quantity(),
        "reason": transfer.reason(),
        "notes": transfer.notes(),
        "performed_by": transfer.performed_by(),
        "status": transfer.status().as_str(),
        "created_at": transfer.created_at(),
        "completed_at": transfer.completed_at(),
        "cancelled_at": transfer.cancelled_at(),
        "failure": transfer.failure(),
    })
}
