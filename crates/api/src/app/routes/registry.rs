//! Category and product-type registries.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use salonstock_core::{CategoryId, ProductTypeId};
use salonstock_directory::NewRegistryEntry;

use crate::app::dto::{self, ApiResult};
use crate::app::errors;
use crate::app::services::AppServices;

pub fn categories_router() -> Router {
    Router::new()
        .route("/", get(list_categories).post(create_category))
        .route("/:id/status", post(set_category_status))
}

pub fn product_types_router() -> Router {
    Router::new()
        .route("/", get(list_product_types).post(create_product_type))
        .route("/:id/status", post(set_product_type_status))
}

pub async fn list_categories(Extension(services): Extension<Arc<AppServices>>) -> ApiResult {
    let items = services
        .directory
        .list_categories()
        .await
        .map_err(errors::service_error_to_response)?;
    Ok(Json(serde_json::json!({ "items": items })).into_response())
}

pub async fn create_category(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<NewRegistryEntry<CategoryId>>, JsonRejection>,
) -> ApiResult {
    let input = dto::json_body(body)?;
    let category = services
        .directory
        .create_category(input)
        .await
        .map_err(errors::service_error_to_response)?;
    Ok((StatusCode::CREATED, Json(category)).into_response())
}

pub async fn set_category_status(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    body: Result<Json<dto::SetActiveRequest>, JsonRejection>,
) -> ApiResult {
    let id = dto::parsed(CategoryId::parse(id))?;
    let body = dto::json_body(body)?;
    let category = services
        .directory
        .set_category_active(&id, body.is_active)
        .await
        .map_err(errors::service_error_to_response)?;
    Ok(Json(category).into_response())
}

pub async fn list_product_types(Extension(services): Extension<Arc<AppServices>>) -> ApiResult {
    let items = services
        .directory
        .list_product_types()
        .await
        .map_err(errors::service_error_to_response)?;
    Ok(Json(serde_json::json!({ "items": items })).into_response())
}

pub async fn create_product_type(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<NewRegistryEntry<ProductTypeId>>, JsonRejection>,
) -> ApiResult {
    let input = dto::json_body(body)?;
    let product_type = services
        .directory
        .create_product_type(input)
        .await
        .map_err(errors::service_error_to_response)?;
    Ok((StatusCode::CREATED, Json(product_type)).into_response())
}

pub async fn set_product_type_status(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    body: Result<Json<dto::SetActiveRequest>, JsonRejection>,
) -> ApiResult {
    let id = dto::parsed(ProductTypeId::parse(id))?;
    let body = dto::json_body(body)?;
    let product_type = services
        .directory
        .set_product_type_active(&id, body.is_active)
        .await
        .map_err(errors::service_error_to_response)?;
    Ok(Json(product_type).into_response())
}
