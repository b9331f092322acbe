pub mod common;
pub mod docs;
pub mod paths;
pub mod registry;
pub mod resource;

pub use common::common_routes;
pub use docs::{describe, docs_routes, openapi, OperationDoc, ParamDoc, ParamLocation};
pub use registry::{RouteEntry, RouteRegistry};
pub use resource::resource_routes;

use crate::state::AppState;
use axum::Router;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

/// Common, documentation and resource routes on one router.
pub fn app_routes(state: AppState) -> Router {
    Router::new()
        .merge(common_routes(state.clone()))
        .merge(docs_routes(state.clone()))
        .merge(resource_routes(state))
}

/// [`app_routes`] with a request body limit and HTTP tracing.
pub fn app_routes_with_layers(state: AppState, body_limit_bytes: usize) -> Router {
    app_routes(state)
        .layer(RequestBodyLimitLayer::new(body_limit_bytes))
        .layer(TraceLayer::new_for_http())
}
