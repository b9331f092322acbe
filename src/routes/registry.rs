//! Operation name -> route entry. Last registration for a name wins.

use crate::error::AppError;
use crate::pipeline::Pipeline;
use axum::http::Method;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

#[derive(Clone, Debug)]
pub struct RouteEntry {
    pub operation_name: String,
    pub method: Method,
    pub path: String,
    pub pipeline: Arc<Pipeline>,
    /// Overrides the resource allow-list for this route only.
    pub allowed_fields: Option<Vec<String>>,
    pub description: Option<String>,
}

impl RouteEntry {
    pub fn new(
        operation_name: impl Into<String>,
        method: Method,
        path: impl Into<String>,
        pipeline: Pipeline,
    ) -> Self {
        RouteEntry {
            operation_name: operation_name.into(),
            method,
            path: path.into(),
            pipeline: Arc::new(pipeline),
            allowed_fields: None,
            description: None,
        }
    }

    pub fn allowed_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

#[derive(Default)]
struct Entries {
    order: Vec<String>,
    by_name: HashMap<String, Arc<RouteEntry>>,
}

/// Safe to read from many request tasks while registration takes the write lock.
#[derive(Default)]
pub struct RouteRegistry {
    inner: RwLock<Entries>,
}

impl RouteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the entry for its operation name.
    pub fn register(&self, entry: RouteEntry) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let name = entry.operation_name.clone();
        match inner.by_name.insert(name.clone(), Arc::new(entry)) {
            Some(previous) => {
                tracing::warn!(
                    operation = %name,
                    method = %previous.method,
                    path = %previous.path,
                    "route overridden"
                );
            }
            None => inner.order.push(name),
        }
    }

    pub fn register_route(
        &self,
        operation_name: &str,
        method: Method,
        path: &str,
        pipeline: Pipeline,
        allowed_fields: Option<Vec<String>>,
    ) {
        let mut entry = RouteEntry::new(operation_name, method, path, pipeline);
        entry.allowed_fields = allowed_fields;
        self.register(entry);
    }

    pub fn dispatch(&self, operation_name: &str) -> Result<Arc<RouteEntry>, AppError> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner
            .by_name
            .get(operation_name)
            .cloned()
            .ok_or_else(|| AppError::NotRegistered(operation_name.to_string()))
    }

    /// Entries in first-registration order.
    pub fn list(&self) -> Vec<Arc<RouteEntry>> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner
            .order
            .iter()
            .filter_map(|name| inner.by_name.get(name).cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{stage_fn, ExecResult, StageRole};
    use serde_json::json;

    fn tagged(tag: &'static str) -> Pipeline {
        Pipeline::custom().with_stage(
            StageRole::Execute,
            stage_fn(move |ctx| {
                ctx.result = Some(ExecResult::Custom(json!(tag)));
                Ok(())
            }),
        )
    }

    #[test]
    fn test_dispatch_unknown_is_not_registered() {
        let reg = RouteRegistry::new();
        assert_eq!(
            reg.dispatch("nope").unwrap_err(),
            AppError::NotRegistered("nope".into())
        );
        assert!(reg.is_empty());
    }

    #[test]
    fn test_last_registration_wins() {
        let reg = RouteRegistry::new();
        reg.register(RouteEntry::new("list", Method::GET, "/a/list", tagged("first")));
        reg.register(RouteEntry::new("detail", Method::GET, "/a/detail/:id", tagged("d")));
        reg.register(RouteEntry::new("list", Method::GET, "/a/all", tagged("second")));

        assert_eq!(reg.len(), 2);
        let entry = reg.dispatch("list").unwrap();
        assert_eq!(entry.path, "/a/all");
        let names: Vec<_> = reg.list().iter().map(|e| e.operation_name.clone()).collect();
        assert_eq!(names, vec!["list", "detail"]);
    }

    #[test]
    fn test_register_route_keeps_allow_list() {
        let reg = RouteRegistry::new();
        reg.register_route(
            "published",
            Method::GET,
            "/a/published",
            Pipeline::custom(),
            Some(vec!["id".into(), "title".into()]),
        );
        let entry = reg.dispatch("published").unwrap();
        assert_eq!(entry.allowed_fields.as_deref(), Some(&["id".to_string(), "title".to_string()][..]));
    }
}
