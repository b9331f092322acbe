//! Resource SDK: schema-driven REST resources. A record definition becomes a
//! model descriptor; each resource gets list/detail/save/update/delete routes
//! whose handlers run a replaceable stage pipeline over a pluggable query builder.

pub mod access;
pub mod case;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod query;
pub mod resource;
pub mod response;
pub mod routes;
pub mod schema;
pub mod sql;
pub mod state;
pub mod store;
pub mod value;

pub use access::{filter, AccessKind, FieldAccess, FieldAccessSpec};
pub use config::{load_from_path, parse_config, resolve, validate, FullConfig, Settings};
pub use error::{AppError, ConfigError, SchemaError};
pub use pipeline::{
    stage_fn, ExecResult, InboundRequest, Operation, Pipeline, PipelineState, RequestContext, Stage,
    StageRole,
};
pub use query::{parse_conditions, paginate, Condition, ConditionParser, Operator, Page, SortField};
pub use resource::{PagingOptions, Resource, ResourceSet, RouteOverride};
pub use response::{Envelope, PageResult};
pub use routes::{app_routes, app_routes_with_layers, common_routes, describe, docs_routes, resource_routes, RouteEntry, RouteRegistry};
pub use schema::{FieldDef, FieldKind, ModelDescriptor, Record, RecordDef, TypeDef};
pub use state::AppState;
pub use store::{ensure_database_exists, DataAccess, MemoryDataAccess, PgDataAccess, QueryBuilder};
pub use value::{FieldValue, Row};
