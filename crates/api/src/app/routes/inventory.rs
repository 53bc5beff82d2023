use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Extension, Path, Query,
    },
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use salonstock_core::{LocationId, ProductId};
use salonstock_infra::services::LocationScope;
use salonstock_inventory::StockKey;

use crate::app::dto::{self, ApiResult};
use crate::app::errors;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/", get(get_inventory))
        .route("/adjust", post(adjust_stock))
        .route("/low-stock", get(low_stock))
        .route("/refresh", post(refresh))
        .route("/:product_id/stock", get(product_stock))
        .route("/:product_id/audit", get(audit_trail))
        .route("/:product_id/online", get(online_available))
        .route("/:product_id/prices/:location_id", get(get_price).post(set_price))
}

pub async fn adjust_stock(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
    body: Result<Json<dto::AdjustStockRequest>, JsonRejection>,
) -> ApiResult {
    let actor = dto::actor_from_headers(&headers)?;
    let body = dto::json_body(body)?;
    let adjustment = dto::parsed(body.into_adjustment(actor))?;

    let outcome = services
        .adjustments
        .adjust(adjustment.clone())
        .await
        .map_err(errors::service_error_to_response)?;

    Ok((StatusCode::OK, Json(dto::adjustment_to_json(&adjustment, outcome))).into_response())
}

/// `GET /inventory?location=<id|all>`
pub async fn get_inventory(
    Extension(services): Extension<Arc<AppServices>>,
    query: Result<Query<dto::LocationQuery>, QueryRejection>,
) -> ApiResult {
    let query = dto::query_params(query)?;
    let scope = dto::parsed(query.scope())?;

    let rows = services
        .view
        .get_inventory(&scope)
        .await
        .map_err(errors::service_error_to_response)?;

    Ok(Json(serde_json::json!({
        "location": scope_label(&scope),
        "items": rows,
    }))
    .into_response())
}

pub async fn low_stock(
    Extension(services): Extension<Arc<AppServices>>,
    query: Result<Query<dto::LocationQuery>, QueryRejection>,
) -> ApiResult {
    let query = dto::query_params(query)?;
    let scope = dto::parsed(query.scope())?;

    let rows = services
        .view
        .low_stock(&scope)
        .await
        .map_err(errors::service_error_to_response)?;

    Ok(Json(serde_json::json!({
        "location": scope_label(&scope),
        "items": rows,
    }))
    .into_response())
}

pub async fn product_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Path(product_id): Path<String>,
) -> ApiResult {
    let product_id = dto::parsed(ProductId::parse(product_id))?;
    let stock = services
        .view
        .product_stock(&product_id)
        .await
        .map_err(errors::service_error_to_response)?;

    Ok(Json(stock).into_response())
}

pub async fn audit_trail(
    Extension(services): Extension<Arc<AppServices>>,
    Path(product_id): Path<String>,
) -> ApiResult {
    let product_id = dto::parsed(ProductId::parse(product_id))?;
    let entries = services
        .view
        .audit_trail(&product_id)
        .await
        .map_err(errors::service_error_to_response)?;

    Ok(Json(serde_json::json!({
        "product_id": product_id,
        "entries": entries,
    }))
    .into_response())
}

pub async fn online_available(
    Extension(services): Extension<Arc<AppServices>>,
    Path(product_id): Path<String>,
) -> ApiResult {
    let product_id = dto::parsed(ProductId::parse(product_id))?;
    let available = services
        .view
        .online_available(&product_id)
        .await
        .map_err(errors::service_error_to_response)?;

    Ok(Json(serde_json::json!({
        "product_id": product_id,
        "online_available": available,
    }))
    .into_response())
}

pub async fn get_price(
    Extension(services): Extension<Arc<AppServices>>,
    Path((product_id, location_id)): Path<(String, String)>,
) -> ApiResult {
    let key = stock_key(product_id, location_id)?;
    let price = services
        .view
        .effective_price(&key)
        .await
        .map_err(errors::service_error_to_response)?;

    Ok(Json(serde_json::json!({
        "product_id": key.product_id,
        "location_id": key.location_id,
        "price": price,
    }))
    .into_response())
}

pub async fn set_price(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
    Path((product_id, location_id)): Path<(String, String)>,
    body: Result<Json<dto::SetPriceRequest>, JsonRejection>,
) -> ApiResult {
    let actor = dto::actor_from_headers(&headers)?;
    let key = stock_key(product_id, location_id)?;
    let body = dto::json_body(body)?;

    let level = services
        .adjustments
        .set_price(&key, body.price)
        .await
        .map_err(errors::service_error_to_response)?;
    tracing::info!(key = %key, actor = %actor, "location price updated");

    Ok(Json(level).into_response())
}

/// Drop cached inventory figures (all, or one product with `?product_id=`).
pub async fn refresh(
    Extension(services): Extension<Arc<AppServices>>,
    Query(params): Query<std::collections::HashMap<String, String>>,
) -> ApiResult {
    match params.get("product_id") {
        Some(raw) => {
            let product_id = dto::parsed(ProductId::parse(raw))?;
            services.view.invalidate(&product_id);
        }
        None => services.view.refresh(),
    }
    Ok(StatusCode::NO_CONTENT.into_response())
}

fn stock_key(product_id: String, location_id: String) -> Result<StockKey, axum::response::Response> {
    Ok(StockKey::new(
        dto::parsed(ProductId::parse(product_id))?,
        dto::parsed(LocationId::parse(location_id))?,
    ))
}

fn scope_label(scope: &LocationScope) -> String {
    match scope {
        LocationScope::All => "all".to_string(),
        LocationScope::Location(id) => id.to_string(),
    }
}
