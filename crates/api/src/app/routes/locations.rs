use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use salonstock_core::LocationId;
use salonstock_directory::NewLocation;

use crate::app::dto::{self, ApiResult};
use crate::app::errors;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_locations).post(create_location))
        .route("/:id/status", post(set_status))
}

/// Primary store merged with the fallback snapshot, one record per name.
pub async fn list_locations(Extension(services): Extension<Arc<AppServices>>) -> ApiResult {
    let locations = services
        .directory
        .list_locations()
        .await
        .map_err(errors::service_error_to_response)?;

    Ok(Json(serde_json::json!({ "items": locations })).into_response())
}

pub async fn create_location(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<NewLocation>, JsonRejection>,
) -> ApiResult {
    let input = dto::json_body(body)?;
    let location = services
        .directory
        .create_location(input)
        .await
        .map_err(errors::service_error_to_response)?;

    Ok((StatusCode::CREATED, Json(location)).into_response())
}

pub async fn set_status(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    body: Result<Json<dto::LocationStatusRequest>, JsonRejection>,
) -> ApiResult {
    let id = dto::parsed(LocationId::parse(id))?;
    let status = dto::parsed(dto::json_body(body)?.status())?;

    let location = services
        .directory
        .set_location_status(&id, status)
        .await
        .map_err(errors::service_error_to_response)?;

    Ok(Json(location).into_response())
}
