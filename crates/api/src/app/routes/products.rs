use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Extension, Path, Query,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use salonstock_core::ProductId;
use salonstock_directory::{NewProduct, ProductUpdate};

use crate::app::dto::{self, ApiResult};
use crate::app::errors;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_products).post(create_product))
        .route("/:id", get(get_product).patch(update_product))
        .route("/:id/status", post(set_status))
}

/// `GET /products?category=&product_type=&is_retail=&is_active=&search=&location=`
pub async fn list_products(
    Extension(services): Extension<Arc<AppServices>>,
    query: Result<Query<dto::ProductListQuery>, QueryRejection>,
) -> ApiResult {
    let (filter, location) = dto::parsed(dto::query_params(query)?.into_parts())?;
    let listings = services
        .view
        .list_products(&filter, location.as_ref())
        .await
        .map_err(errors::service_error_to_response)?;

    Ok(Json(serde_json::json!({ "items": listings })).into_response())
}

pub async fn create_product(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<NewProduct>, JsonRejection>,
) -> ApiResult {
    let input = dto::json_body(body)?;
    let product = services
        .directory
        .create_product(input)
        .await
        .map_err(errors::service_error_to_response)?;

    Ok((StatusCode::CREATED, Json(product)).into_response())
}

pub async fn get_product(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> ApiResult {
    let id = dto::parsed(ProductId::parse(id))?;
    let product = services
        .directory
        .product(&id)
        .await
        .map_err(errors::service_error_to_response)?;

    Ok(Json(product).into_response())
}

pub async fn update_product(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    body: Result<Json<ProductUpdate>, JsonRejection>,
) -> ApiResult {
    let id = dto::parsed(ProductId::parse(id))?;
    let update = dto::json_body(body)?;
    let product = services
        .directory
        .update_product(&id, update)
        .await
        .map_err(errors::service_error_to_response)?;

    Ok(Json(product).into_response())
}

pub async fn set_status(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    body: Result<Json<dto::SetActiveRequest>, JsonRejection>,
) -> ApiResult {
    let id = dto::parsed(ProductId::parse(id))?;
    let body = dto::json_body(body)?;
    let product = services
        .directory
        .set_product_active(&id, body.is_active)
        .await
        .map_err(errors::service_error_to_response)?;

    Ok(Json(product).into_response())
}
