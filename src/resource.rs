//! A resource binds one model descriptor to its access rules, paging options
//! and route registry.

use crate::access::FieldAccess;
use crate::error::{AppError, ConfigError};
use crate::pipeline::{InboundRequest, Operation, Pipeline, RequestContext};
use crate::query::DEFAULT_PAGE_SIZE;
use crate::response::Envelope;
use crate::routes::{paths, RouteEntry, RouteRegistry};
use crate::schema::ModelDescriptor;
use crate::store::DataAccess;
use axum::http::{Method, StatusCode};
use std::collections::HashMap;
use std::sync::Arc;

/// Operation name of the bare `GET {prefix}` alias of list.
pub const INDEX_OPERATION: &str = "index";

/// Per-route replacements for a built-in operation's defaults.
#[derive(Clone, Debug, Default)]
pub struct RouteOverride {
    pub method: Option<Method>,
    pub path: Option<String>,
    pub allowed_fields: Option<Vec<String>>,
    pub description: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PagingOptions {
    pub default_size: i64,
    pub max_size: Option<i64>,
}

impl Default for PagingOptions {
    fn default() -> Self {
        PagingOptions {
            default_size: DEFAULT_PAGE_SIZE,
            max_size: None,
        }
    }
}

pub struct Resource {
    name: String,
    prefix: String,
    descriptor: Arc<ModelDescriptor>,
    access: FieldAccess,
    paging: PagingOptions,
    routes: RouteRegistry,
}

impl Resource {
    /// Prefix defaults to `/{table_name}`. No routes are registered yet.
    pub fn new(name: impl Into<String>, descriptor: ModelDescriptor) -> Self {
        let prefix = format!("/{}", descriptor.table_name());
        Resource {
            name: name.into(),
            prefix,
            descriptor: Arc::new(descriptor),
            access: FieldAccess::default(),
            paging: PagingOptions::default(),
            routes: RouteRegistry::new(),
        }
    }

    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.prefix = normalize_prefix(prefix);
        self
    }

    pub fn with_access(mut self, access: FieldAccess) -> Self {
        self.access = access;
        self
    }

    pub fn with_paging(mut self, paging: PagingOptions) -> Self {
        self.paging = paging;
        self
    }

    /// Register every built-in operation the model supports.
    pub fn with_default_routes(self) -> Self {
        self.with_operations(Operation::ALL)
    }

    pub fn with_operations(self, ops: impl IntoIterator<Item = Operation>) -> Self {
        for op in ops {
            self.register_operation(op);
        }
        self
    }

    /// Default route(s) for a built-in operation. List also answers on the bare
    /// prefix as `index`. Key operations are skipped when the model has no
    /// primary key.
    pub fn register_operation(&self, op: Operation) {
        self.register_operation_at(op, RouteOverride::default());
    }

    /// Like [`register_operation`](Self::register_operation) with the method,
    /// path, allow-list or description replaced where `route` sets them.
    pub fn register_operation_at(&self, op: Operation, route: RouteOverride) {
        if op.requires_key() && !self.descriptor.has_primary_key() {
            tracing::info!(
                resource = %self.name,
                operation = %op,
                "model has no primary key; operation not exposed"
            );
            return;
        }
        let description = route.description.unwrap_or_else(|| op.description().to_string());
        let mut entry = RouteEntry::new(
            op.name(),
            route.method.unwrap_or_else(|| op.default_method()),
            route.path.unwrap_or_else(|| op.default_path(&self.prefix)),
            Pipeline::for_operation(op),
        )
        .description(description.clone());
        entry.allowed_fields = route.allowed_fields.clone();
        self.register(entry);
        if op == Operation::List {
            let mut index = RouteEntry::new(
                INDEX_OPERATION,
                Method::GET,
                self.prefix.clone(),
                Pipeline::for_operation(op),
            )
            .description(description);
            index.allowed_fields = route.allowed_fields;
            self.register(index);
        }
    }

    /// Add or replace a route. Replacing an operation's entry takes effect on
    /// the next request.
    pub fn register(&self, entry: RouteEntry) {
        tracing::info!(
            resource = %self.name,
            operation = %entry.operation_name,
            method = %entry.method,
            path = %entry.path,
            "route registered"
        );
        self.routes.register(entry);
    }

    pub fn routes(&self) -> &RouteRegistry {
        &self.routes
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn descriptor(&self) -> &Arc<ModelDescriptor> {
        &self.descriptor
    }

    pub fn access(&self) -> &FieldAccess {
        &self.access
    }

    pub fn paging(&self) -> &PagingOptions {
        &self.paging
    }

    /// Dispatch `operation` and run its pipeline over a fresh context.
    pub async fn handle(
        self: &Arc<Self>,
        data: Arc<dyn DataAccess>,
        operation: &str,
        request: InboundRequest,
    ) -> Result<(StatusCode, Envelope), AppError> {
        let entry = self.routes.dispatch(operation)?;
        let mut ctx = RequestContext::new(self.clone(), &entry, data, request);
        entry.pipeline.run(&mut ctx).await?;
        Ok(ctx.into_reply())
    }
}

fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_end_matches('/');
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

/// Registered resources keyed by name. Names and prefixes are unique.
#[derive(Default)]
pub struct ResourceSet {
    resources: Vec<Arc<Resource>>,
    by_name: HashMap<String, usize>,
}

impl ResourceSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, resource: Resource) -> Result<Arc<Resource>, ConfigError> {
        if self.by_name.contains_key(resource.name()) {
            return Err(ConfigError::DuplicateResource(resource.name().to_string()));
        }
        if self.resources.iter().any(|r| r.prefix() == resource.prefix()) {
            return Err(ConfigError::DuplicatePrefix(resource.prefix().to_string()));
        }
        paths::check_path(resource.prefix()).map_err(ConfigError::Validation)?;
        self.check_routes(&resource)?;
        tracing::info!(
            resource = %resource.name(),
            prefix = %resource.prefix(),
            table = %resource.descriptor().table_name(),
            routes = resource.routes().len(),
            "resource registered"
        );
        let resource = Arc::new(resource);
        self.by_name.insert(resource.name().to_string(), self.resources.len());
        self.resources.push(resource.clone());
        Ok(resource)
    }

    /// Every route path must be routable and agree on parameter names with
    /// the routes already in the set.
    fn check_routes(&self, resource: &Resource) -> Result<(), ConfigError> {
        let entries = resource.routes().list();
        let bound: Vec<String> = self
            .resources
            .iter()
            .flat_map(|r| r.routes().list())
            .map(|e| e.path.clone())
            .collect();
        for (i, entry) in entries.iter().enumerate() {
            let invalid = |reason: String| ConfigError::InvalidRoute {
                operation: format!("{}.{}", resource.name(), entry.operation_name),
                reason,
            };
            paths::check_path(&entry.path).map_err(invalid)?;
            let earlier = entries[..i].iter().map(|e| &e.path).chain(bound.iter());
            for other in earlier {
                if paths::params_conflict(other, &entry.path) {
                    return Err(invalid(format!(
                        "parameter names in '{}' conflict with '{}'",
                        entry.path, other
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<Resource>> {
        self.by_name.get(name).map(|&i| self.resources[i].clone())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Resource>> {
        self.resources.iter()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}
