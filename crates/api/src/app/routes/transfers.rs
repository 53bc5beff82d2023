use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Extension, Path, Query,
    },
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use salonstock_core::{LocationId, ProductId};
use salonstock_infra::services::CreateTransferRequest;

use crate::app::dto::{self, ApiResult};
use crate::app::errors;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_transfers).post(create_transfer))
        .route("/:id", get(get_transfer))
}

pub async fn create_transfer(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
    body: Result<Json<dto::CreateTransferBody>, JsonRejection>,
) -> ApiResult {
    let performed_by = dto::actor_from_headers(&headers)?;
    let body = dto::json_body(body)?;

    let request = CreateTransferRequest {
        product_id: dto::parsed(ProductId::parse(&body.product_id))?,
        from_location_id: dto::parsed(LocationId::parse(&body.from_location_id))?,
        to_location_id: dto::parsed(LocationId::parse(&body.to_location_id))?,
        quantity: body.quantity,
        reason: body.reason,
        notes: body.notes,
        performed_by,
    };

    let transfer = services
        .transfers
        .create_transfer(request)
        .await
        .map_err(errors::transfer_error_to_response)?;

    Ok((StatusCode::CREATED, Json(dto::transfer_to_json(&transfer))).into_response())
}

pub async fn list_transfers(
    Extension(services): Extension<Arc<AppServices>>,
    query: Result<Query<dto::TransferListQuery>, QueryRejection>,
) -> ApiResult {
    let filter = dto::parsed(dto::query_params(query)?.into_filter())?;
    let transfers = services
        .transfers
        .list_transfers(&filter)
        .await
        .map_err(errors::service_error_to_response)?;

    let items: Vec<_> = transfers.iter().map(dto::transfer_to_json).collect();
    Ok(Json(serde_json::json!({ "items": items })).into_response())
}

pub async fn get_transfer(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> ApiResult {
    let id = dto::parse_transfer_id(&id)?;
    let transfer = services
        .transfers
        .get_transfer(id)
        .await
        .map_err(errors::service_error_to_response)?;

    Ok(Json(dto::transfer_to_json(&transfer)).into_response())
}
