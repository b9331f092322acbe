//! Resource routes built from every registry entry.
//! Entries are grouped by path so one path can answer several methods. The
//! handler resolves the resource and dispatches the operation on each request,
//! so a replaced pipeline is picked up without rebuilding the router.

use crate::error::AppError;
use crate::pipeline::InboundRequest;
use crate::response::{reply, Envelope};
use crate::routes::paths;
use crate::state::AppState;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{Method, StatusCode},
    routing::{MethodFilter, MethodRouter},
    Json, Router,
};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};

struct Binding {
    method: Method,
    resource: String,
    operation: String,
}

pub fn resource_routes(state: AppState) -> Router {
    let mut by_path: BTreeMap<String, Vec<Binding>> = BTreeMap::new();
    let mut seen = HashSet::new();
    for resource in state.all_resources() {
        for entry in resource.routes().list() {
            let rejected = paths::check_path(&entry.path).err().or_else(|| {
                by_path
                    .keys()
                    .find(|bound| paths::params_conflict(bound, &entry.path))
                    .map(|bound| format!("parameter names conflict with '{}'", bound))
            });
            if let Some(reason) = rejected {
                tracing::error!(
                    resource = %resource.name(),
                    operation = %entry.operation_name,
                    path = %entry.path,
                    %reason,
                    "route skipped"
                );
                continue;
            }
            if !seen.insert((entry.path.clone(), entry.method.clone())) {
                tracing::warn!(
                    resource = %resource.name(),
                    operation = %entry.operation_name,
                    method = %entry.method,
                    path = %entry.path,
                    "path and method already bound; route skipped"
                );
                continue;
            }
            by_path.entry(entry.path.clone()).or_default().push(Binding {
                method: entry.method.clone(),
                resource: resource.name().to_string(),
                operation: entry.operation_name.clone(),
            });
        }
    }

    let mut router = Router::new();
    for (path, bindings) in by_path {
        let mut methods: MethodRouter<AppState> = MethodRouter::new();
        for binding in bindings {
            let Some(filter) = method_filter(&binding.method) else {
                tracing::warn!(method = %binding.method, path = %path, "unsupported method; route skipped");
                continue;
            };
            let Binding { method, resource, operation } = binding;
            methods = methods.on(
                filter,
                move |State(state): State<AppState>,
                      path_params: Option<Path<HashMap<String, String>>>,
                      Query(query): Query<Vec<(String, String)>>,
                      body: Bytes| {
                    let resource = resource.clone();
                    let operation = operation.clone();
                    let method = method.clone();
                    async move {
                        let path_params = path_params.map(|Path(p)| p).unwrap_or_default();
                        serve(state, &resource, &operation, method, path_params, query, body).await
                    }
                },
            );
        }
        router = router.route(&path, methods);
    }
    router.with_state(state)
}

async fn serve(
    state: AppState,
    resource: &str,
    operation: &str,
    method: Method,
    path_params: HashMap<String, String>,
    query: Vec<(String, String)>,
    body: Bytes,
) -> Result<(StatusCode, Json<Envelope>), AppError> {
    let body = parse_body(&body)?;
    let request = InboundRequest {
        method,
        path_params,
        query,
        body,
    };
    let resource = state.resource(resource)?;
    let (status, envelope) = resource.handle(state.data.clone(), operation, request).await?;
    Ok(reply(status, envelope))
}

fn parse_body(body: &[u8]) -> Result<Option<Value>, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice(body)
        .map(Some)
        .map_err(|e| AppError::BadRequest(format!("invalid JSON body: {}", e)))
}

fn method_filter(method: &Method) -> Option<MethodFilter> {
    Some(match *method {
        Method::GET => MethodFilter::GET,
        Method::POST => MethodFilter::POST,
        Method::PUT => MethodFilter::PUT,
        Method::PATCH => MethodFilter::PATCH,
        Method::DELETE => MethodFilter::DELETE,
        Method::HEAD => MethodFilter::HEAD,
        Method::OPTIONS => MethodFilter::OPTIONS,
        Method::TRACE => MethodFilter::TRACE,
        _ => return None,
    })
}
