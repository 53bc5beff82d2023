use axum::Router;

pub mod inventory;
pub mod locations;
pub mod products;
pub mod registry;
pub mod system;
pub mod transfers;

/// Router for every inventory/directory endpoint.
pub fn router() -> Router {
    Router::new()
        .nest("/inventory", inventory::router())
        .nest("/transfers", transfers::router())
        .nest("/locations", locations::router())
        .nest("/products", products::router())
        .nest("/categories", registry::categories_router())
        .nest("/product-types", registry::product_types_router())
}
