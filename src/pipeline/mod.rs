//! Handler pipeline: pre-process, build-query, execute and post-process stages
//! run in order over one [`RequestContext`].
//!
//! Built-in operations get default stages. A custom endpoint starts from one of
//! those pipelines and swaps any subset of stages:
//!
//! ```rust,ignore
//! let pipeline = Pipeline::for_operation(Operation::List)
//!     .with_stage(StageRole::PreProcess, stage_fn(|ctx| {
//!         ctx.conditions.push(Condition::eq("status", FieldValue::Int(1)));
//!         Ok(())
//!     }));
//! ```

mod context;
mod stages;

pub use context::{ExecResult, InboundRequest, PipelineState, RequestContext};
pub use stages::{BuildQuery, ExecuteQuery, NoopStage, ShapeResponse};

use crate::access::AccessKind;
use crate::error::AppError;
use async_trait::async_trait;
use axum::http::Method;
use std::fmt;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StageRole {
    PreProcess,
    BuildQuery,
    Execute,
    PostProcess,
}

impl StageRole {
    pub const ORDER: [StageRole; 4] = [
        StageRole::PreProcess,
        StageRole::BuildQuery,
        StageRole::Execute,
        StageRole::PostProcess,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StageRole::PreProcess => "pre_process",
            StageRole::BuildQuery => "build_query",
            StageRole::Execute => "execute",
            StageRole::PostProcess => "post_process",
        }
    }

    fn state(&self) -> PipelineState {
        match self {
            StageRole::PreProcess => PipelineState::PreProcess,
            StageRole::BuildQuery => PipelineState::BuildQuery,
            StageRole::Execute => PipelineState::Execute,
            StageRole::PostProcess => PipelineState::PostProcess,
        }
    }
}

impl fmt::Display for StageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The five built-in operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    List,
    Detail,
    Save,
    Update,
    Delete,
}

impl Operation {
    pub const ALL: [Operation; 5] = [
        Operation::List,
        Operation::Detail,
        Operation::Save,
        Operation::Update,
        Operation::Delete,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Operation::List => "list",
            Operation::Detail => "detail",
            Operation::Save => "save",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Operation::ALL.into_iter().find(|op| op.name() == name)
    }

    pub fn access_kind(&self) -> AccessKind {
        match self {
            Operation::Save => AccessKind::Create,
            Operation::Update => AccessKind::Update,
            Operation::List | Operation::Detail | Operation::Delete => AccessKind::Query,
        }
    }

    pub fn requires_key(&self) -> bool {
        matches!(self, Operation::Detail | Operation::Update | Operation::Delete)
    }

    pub fn default_method(&self) -> Method {
        match self {
            Operation::List | Operation::Detail => Method::GET,
            Operation::Save => Method::POST,
            Operation::Update => Method::PUT,
            Operation::Delete => Method::DELETE,
        }
    }

    pub fn default_path(&self, prefix: &str) -> String {
        match self {
            Operation::List => format!("{}/list", prefix),
            Operation::Detail => format!("{}/detail/:id", prefix),
            Operation::Save => format!("{}/save", prefix),
            Operation::Update => format!("{}/update/:id", prefix),
            Operation::Delete => format!("{}/delete/:id", prefix),
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Operation::List => "List records with filtering, sorting and pagination",
            Operation::Detail => "Fetch one record by primary key",
            Operation::Save => "Create a record",
            Operation::Update => "Update a record by primary key",
            Operation::Delete => "Delete a record by primary key",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One phase of request processing. May mutate the context or abort with an error.
#[async_trait]
pub trait Stage: Send + Sync {
    async fn run(&self, ctx: &mut RequestContext) -> Result<(), AppError>;

    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Adapts a synchronous closure into a stage.
pub struct FnStage<F>(F);

pub fn stage_fn<F>(f: F) -> FnStage<F>
where
    F: Fn(&mut RequestContext) -> Result<(), AppError> + Send + Sync + 'static,
{
    FnStage(f)
}

#[async_trait]
impl<F> Stage for FnStage<F>
where
    F: Fn(&mut RequestContext) -> Result<(), AppError> + Send + Sync + 'static,
{
    async fn run(&self, ctx: &mut RequestContext) -> Result<(), AppError> {
        (self.0)(ctx)
    }
}

#[derive(Clone)]
pub struct Pipeline {
    pre_process: Arc<dyn Stage>,
    build_query: Arc<dyn Stage>,
    execute: Arc<dyn Stage>,
    post_process: Arc<dyn Stage>,
}

impl Pipeline {
    /// Default stages for a built-in operation.
    pub fn for_operation(op: Operation) -> Self {
        Pipeline {
            pre_process: Arc::new(NoopStage),
            build_query: Arc::new(BuildQuery::new(op)),
            execute: Arc::new(ExecuteQuery::new(op)),
            post_process: Arc::new(ShapeResponse),
        }
    }

    /// No query work; only the response shaping stage. Starting point for
    /// endpoints that bring their own build and execute stages.
    pub fn custom() -> Self {
        Pipeline {
            pre_process: Arc::new(NoopStage),
            build_query: Arc::new(NoopStage),
            execute: Arc::new(NoopStage),
            post_process: Arc::new(ShapeResponse),
        }
    }

    pub fn with_stage(mut self, role: StageRole, stage: impl Stage + 'static) -> Self {
        self.replace(role, Arc::new(stage));
        self
    }

    pub fn replace(&mut self, role: StageRole, stage: Arc<dyn Stage>) {
        match role {
            StageRole::PreProcess => self.pre_process = stage,
            StageRole::BuildQuery => self.build_query = stage,
            StageRole::Execute => self.execute = stage,
            StageRole::PostProcess => self.post_process = stage,
        }
    }

    pub fn stage(&self, role: StageRole) -> &Arc<dyn Stage> {
        match role {
            StageRole::PreProcess => &self.pre_process,
            StageRole::BuildQuery => &self.build_query,
            StageRole::Execute => &self.execute,
            StageRole::PostProcess => &self.post_process,
        }
    }

    /// Run every stage in order. The first error aborts: later stages are
    /// skipped, the context error slot is set and the error is returned.
    pub async fn run(&self, ctx: &mut RequestContext) -> Result<(), AppError> {
        for role in StageRole::ORDER {
            ctx.set_state(role.state());
            let stage = self.stage(role);
            if let Err(err) = stage.run(ctx).await {
                if err.is_client_error() {
                    tracing::debug!(operation = %ctx.operation, stage = %role, error = %err, "request rejected");
                } else {
                    tracing::warn!(operation = %ctx.operation, stage = %role, error = %err, "pipeline aborted");
                }
                ctx.abort(err.clone());
                return Err(err);
            }
        }
        ctx.set_state(PipelineState::Completed);
        Ok(())
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("pre_process", &self.pre_process.name())
            .field("build_query", &self.build_query.name())
            .field("execute", &self.execute.name())
            .field("post_process", &self.post_process.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::Resource;
    use crate::routes::RouteEntry;
    use crate::schema::{FieldDef, FieldKind, ModelDescriptor, RecordDef, TypeDef};
    use crate::store::MemoryDataAccess;
    use serde_json::json;
    use std::sync::Mutex;

    fn context() -> RequestContext {
        let model = ModelDescriptor::build(&TypeDef::Record(RecordDef {
            name: "Note".into(),
            table_name: None,
            fields: vec![FieldDef::column("id", FieldKind::BigInt).primary_key()],
        }))
        .unwrap();
        let resource = Arc::new(Resource::new("notes", model));
        let entry = RouteEntry::new("peek", Method::GET, "/notes/peek", Pipeline::custom());
        RequestContext::new(
            resource,
            &entry,
            Arc::new(MemoryDataAccess::new()),
            InboundRequest::new(Method::GET),
        )
    }

    struct Tracked(Arc<Mutex<Vec<&'static str>>>, &'static str, bool);

    #[async_trait]
    impl Stage for Tracked {
        async fn run(&self, _ctx: &mut RequestContext) -> Result<(), AppError> {
            self.0.lock().unwrap().push(self.1);
            if self.2 {
                return Err(AppError::BadRequest(format!("{} failed", self.1)));
            }
            Ok(())
        }
    }

    fn recording(log: &Arc<Mutex<Vec<&'static str>>>, fail_at: Option<&'static str>) -> Pipeline {
        let mut p = Pipeline::custom();
        for (role, name) in [
            (StageRole::PreProcess, "pre"),
            (StageRole::BuildQuery, "build"),
            (StageRole::Execute, "exec"),
            (StageRole::PostProcess, "post"),
        ] {
            p.replace(role, Arc::new(Tracked(log.clone(), name, fail_at == Some(name))));
        }
        p
    }

    #[tokio::test]
    async fn test_stages_run_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut ctx = context();
        assert_eq!(ctx.state(), PipelineState::Created);
        recording(&log, None).run(&mut ctx).await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["pre", "build", "exec", "post"]);
        assert_eq!(ctx.state(), PipelineState::Completed);
        assert!(ctx.error().is_none());
    }

    #[tokio::test]
    async fn test_abort_skips_remaining_stages() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut ctx = context();
        let err = recording(&log, Some("build")).run(&mut ctx).await.unwrap_err();
        assert_eq!(err, AppError::BadRequest("build failed".into()));
        assert_eq!(*log.lock().unwrap(), vec!["pre", "build"]);
        assert_eq!(ctx.state(), PipelineState::Aborted);
        assert_eq!(ctx.error(), Some(&err));
        let (status, env) = ctx.into_reply();
        assert_eq!(status.as_u16(), 400);
        assert_eq!(env.code, 400);
    }

    #[tokio::test]
    async fn test_fn_stage_sets_result() {
        let mut ctx = context();
        let p = Pipeline::custom().with_stage(
            StageRole::Execute,
            stage_fn(|ctx| {
                ctx.result = Some(ExecResult::Custom(json!({"op": ctx.operation})));
                Ok(())
            }),
        );
        p.run(&mut ctx).await.unwrap();
        let (_, env) = ctx.into_reply();
        assert_eq!(env.data, json!({"op": "peek"}));
    }

    #[test]
    fn test_operation_names_round_trip() {
        for op in Operation::ALL {
            assert_eq!(Operation::from_name(op.name()), Some(op));
        }
        assert_eq!(Operation::from_name("bogus"), None);
        assert_eq!(Operation::Detail.default_path("/users"), "/users/detail/:id");
    }
}
