use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use salonstock_core::DomainError;
use salonstock_infra::{ServiceError, StoreError, TransferError};

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

pub fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    let message = err.to_string();
    match err {
        DomainError::Validation(_) => json_error(StatusCode::BAD_REQUEST, "validation_error", message),
        DomainError::NotFound { kind, id } => (
            StatusCode::NOT_FOUND,
            axum::Json(json!({
                "error": "not_found",
                "message": message,
                "kind": kind,
                "id": id,
            })),
        )
            .into_response(),
        DomainError::Inactive { kind, id } => (
            StatusCode::CONFLICT,
            axum::Json(json!({
                "error": "inactive_resource",
                "message": message,
                "kind": kind,
                "id": id,
            })),
        )
            .into_response(),
        DomainError::InsufficientStock {
            product_id,
            location_id,
            available,
            requested,
        } => (
            StatusCode::UNPROCESSABLE_ENTITY,
            axum::Json(json!({
                "error": "insufficient_stock",
                "message": message,
                "product_id": product_id,
                "location_id": location_id,
                "available": available,
                "requested": requested,
            })),
        )
            .into_response(),
        DomainError::InvalidTransfer(_) => json_error(StatusCode::BAD_REQUEST, "invalid_transfer", message),
        DomainError::Conflict(_) => json_error(StatusCode::CONFLICT, "conflict", message),
    }
}

pub fn store_error_to_response(err: StoreError) -> axum::response::Response {
    tracing::error!(error = %err, "store failure");
    if err.is_transient() {
        json_error(StatusCode::SERVICE_UNAVAILABLE, "store_unavailable", err.to_string())
    } else {
        json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", err.to_string())
    }
}

pub fn service_error_to_response(err: ServiceError) -> axum::response::Response {
    match err {
        ServiceError::Domain(e) => domain_error_to_response(e),
        ServiceError::Store(e) => store_error_to_response(e),
    }
}

/// Transfers that failed after stock moved report which transfer it was
/// and whether the source was credited back.
pub fn transfer_error_to_response(err: TransferError) -> axum::response::Response {
    let message = err.to_string();
    match err {
        TransferError::Rejected(e) => service_error_to_response(e),
        TransferError::DestinationFailed {
            transfer_id,
            cause,
            source_restored,
        } => {
            let status = if cause.is_transient() {
                StatusCode::SERVICE_UNAVAILABLE
            } else {
                StatusCode::CONFLICT
            };
            (
                status,
                axum::Json(json!({
                    "error": "transfer_destination_failed",
                    "message": message,
                    "transfer_id": transfer_id,
                    "source_restored": source_restored,
                })),
            )
                .into_response()
        }
        TransferError::CompensationFailed { transfer_id, .. } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            axum::Json(json!({
                "error": "transfer_compensation_failed",
                "message": message,
                "transfer_id": transfer_id,
                "source_restored": false,
            })),
        )
            .into_response(),
    }
}
