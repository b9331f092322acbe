//! Per-request state shared by the pipeline stages.

use crate::access::{AccessKind, FieldAccessSpec};
use crate::error::AppError;
use crate::query::{Condition, Page, SortField};
use crate::resource::Resource;
use crate::response::Envelope;
use crate::routes::RouteEntry;
use crate::schema::ModelDescriptor;
use crate::store::{DataAccess, QueryBuilder};
use crate::value::Row;
use axum::http::{Method, StatusCode};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Transport-neutral view of the inbound request.
#[derive(Clone, Debug)]
pub struct InboundRequest {
    pub method: Method,
    pub path_params: HashMap<String, String>,
    /// Query parameters in the order they appeared.
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl InboundRequest {
    pub fn new(method: Method) -> Self {
        InboundRequest {
            method,
            path_params: HashMap::new(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn with_path_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.path_params.insert(key.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn query_pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.query.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query_pairs().find(|(k, _)| *k == key).map(|(_, v)| v)
    }
}

/// Raw outcome of the execute stage, shaped by post-process.
#[derive(Clone, Debug, PartialEq)]
pub enum ExecResult {
    Page { rows: Vec<Row>, total: i64 },
    One(Option<Row>),
    Created(Row),
    Affected(u64),
    /// Already-shaped data from a custom stage.
    Custom(Value),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    Created,
    PreProcess,
    BuildQuery,
    Execute,
    PostProcess,
    Completed,
    Aborted,
}

/// Owned by exactly one pipeline invocation and dropped with the request.
pub struct RequestContext {
    pub operation: String,
    pub resource: Arc<Resource>,
    pub request: InboundRequest,
    pub data: Arc<dyn DataAccess>,
    /// Route-level allow-list; replaces the resource allow-list for this operation.
    pub allowed_fields: Option<Vec<String>>,
    pub query: Option<Box<dyn QueryBuilder>>,
    pub conditions: Vec<Condition>,
    pub sort: Vec<SortField>,
    pub page: Option<Page>,
    pub payload: Option<Row>,
    pub result: Option<ExecResult>,
    pub status: StatusCode,
    pub response: Option<Envelope>,
    /// Free-form values passed between stages.
    pub scratch: HashMap<String, Value>,
    state: PipelineState,
    error: Option<AppError>,
}

impl RequestContext {
    pub fn new(
        resource: Arc<Resource>,
        entry: &RouteEntry,
        data: Arc<dyn DataAccess>,
        request: InboundRequest,
    ) -> Self {
        RequestContext {
            operation: entry.operation_name.clone(),
            resource,
            request,
            data,
            allowed_fields: entry.allowed_fields.clone(),
            query: None,
            conditions: Vec::new(),
            sort: Vec::new(),
            page: None,
            payload: None,
            result: None,
            status: StatusCode::OK,
            response: None,
            scratch: HashMap::new(),
            state: PipelineState::Created,
            error: None,
        }
    }

    pub fn model(&self) -> Arc<ModelDescriptor> {
        self.resource.descriptor().clone()
    }

    /// Resource spec for `kind`, with the route allow-list applied when present.
    pub fn access_spec(&self, kind: AccessKind) -> FieldAccessSpec {
        let base = self.resource.access().spec(kind);
        match &self.allowed_fields {
            Some(allow) => base.with_allow(allow),
            None => base.clone(),
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: PipelineState) {
        self.state = state;
    }

    pub fn error(&self) -> Option<&AppError> {
        self.error.as_ref()
    }

    pub(crate) fn abort(&mut self, err: AppError) {
        self.state = PipelineState::Aborted;
        self.error = Some(err);
    }

    pub fn respond(&mut self, status: StatusCode, data: Value) {
        self.status = status;
        self.response = Some(Envelope::success(data));
    }

    /// Final status and envelope; an error in the slot wins over any response.
    pub fn into_reply(self) -> (StatusCode, Envelope) {
        if let Some(err) = self.error {
            return (err.status(), err.to_envelope());
        }
        let envelope = self.response.unwrap_or_else(|| Envelope::success(Value::Null));
        (self.status, envelope)
    }
}
