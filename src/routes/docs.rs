//! Route documentation derived from the registries: a plain JSON listing and
//! an OpenAPI document, both built at request time.

use crate::access::AccessKind;
use crate::pipeline::Operation;
use crate::query::OPERATOR_SEPARATOR;
use crate::resource::{Resource, INDEX_OPERATION};
use crate::routes::RouteEntry;
use crate::state::AppState;
use axum::{extract::State, http::Method, routing::get, Json, Router};
use serde::Serialize;
use utoipa::openapi::path::{HttpMethod, OperationBuilder, ParameterBuilder, ParameterIn, PathItem};
use utoipa::openapi::request_body::RequestBodyBuilder;
use utoipa::openapi::{
    ContentBuilder, InfoBuilder, OpenApi, OpenApiBuilder, PathsBuilder, Required, ResponseBuilder,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamLocation {
    Path,
    Query,
    Body,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ParamDoc {
    pub name: String,
    pub location: ParamLocation,
    pub required: bool,
    pub description: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OperationDoc {
    pub resource: String,
    pub operation: String,
    pub method: String,
    pub path: String,
    pub description: Option<String>,
    pub allowed_fields: Vec<String>,
    pub parameters: Vec<ParamDoc>,
}

/// One entry per registered route of `resource`, in registration order.
pub fn describe(resource: &Resource) -> Vec<OperationDoc> {
    resource
        .routes()
        .list()
        .iter()
        .map(|entry| describe_entry(resource, entry))
        .collect()
}

fn access_kind(entry: &RouteEntry) -> AccessKind {
    match Operation::from_name(&entry.operation_name) {
        Some(op) => op.access_kind(),
        None if entry.method == Method::POST => AccessKind::Create,
        None if entry.method == Method::PUT || entry.method == Method::PATCH => AccessKind::Update,
        None => AccessKind::Query,
    }
}

fn describe_entry(resource: &Resource, entry: &RouteEntry) -> OperationDoc {
    let model = resource.descriptor();
    let spec = resource.access().spec(access_kind(entry));
    let spec = match &entry.allowed_fields {
        Some(allow) => spec.with_allow(allow),
        None => spec.clone(),
    };
    let allowed_fields = spec.allowed_fields(model);

    let mut parameters: Vec<ParamDoc> = path_params(&entry.path)
        .map(|name| ParamDoc {
            name: name.to_string(),
            location: ParamLocation::Path,
            required: true,
            description: "primary key".into(),
        })
        .collect();

    let is_list = entry.operation_name == INDEX_OPERATION
        || entry.operation_name == Operation::List.name()
        || (Operation::from_name(&entry.operation_name).is_none() && entry.method == Method::GET);
    if is_list {
        for (name, description) in [
            ("page", "page number, from 1"),
            ("size", "page size"),
            ("sort", "comma-separated fields, '-' prefix for descending"),
        ] {
            parameters.push(ParamDoc {
                name: name.into(),
                location: ParamLocation::Query,
                required: false,
                description: description.into(),
            });
        }
    }
    if entry.method == Method::GET {
        for field in &allowed_fields {
            parameters.push(ParamDoc {
                name: field.clone(),
                location: ParamLocation::Query,
                required: false,
                description: format!(
                    "filter; append {}eq|ne|gt|ge|lt|le|like|in|not_in for other operators",
                    OPERATOR_SEPARATOR
                ),
            });
        }
    }
    if matches!(entry.method, Method::POST | Method::PUT | Method::PATCH) {
        parameters.push(ParamDoc {
            name: "body".into(),
            location: ParamLocation::Body,
            required: true,
            description: format!("JSON object with any of: {}", allowed_fields.join(", ")),
        });
    }

    OperationDoc {
        resource: resource.name().to_string(),
        operation: entry.operation_name.clone(),
        method: entry.method.to_string(),
        path: entry.path.clone(),
        description: entry.description.clone(),
        allowed_fields,
        parameters,
    }
}

fn path_params(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter_map(|seg| seg.strip_prefix(':'))
}

/// `/a/detail/:id` -> `/a/detail/{id}`
fn openapi_path(path: &str) -> String {
    path.split('/')
        .map(|seg| match seg.strip_prefix(':') {
            Some(name) => format!("{{{}}}", name),
            None => seg.to_string(),
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn http_method(method: &str) -> Option<HttpMethod> {
    Some(match method {
        "GET" => HttpMethod::Get,
        "POST" => HttpMethod::Post,
        "PUT" => HttpMethod::Put,
        "PATCH" => HttpMethod::Patch,
        "DELETE" => HttpMethod::Delete,
        "HEAD" => HttpMethod::Head,
        "OPTIONS" => HttpMethod::Options,
        "TRACE" => HttpMethod::Trace,
        _ => return None,
    })
}

pub fn openapi(resources: &[std::sync::Arc<Resource>]) -> OpenApi {
    let mut paths = PathsBuilder::new();
    for resource in resources {
        for doc in describe(resource) {
            let Some(method) = http_method(&doc.method) else {
                continue;
            };
            let mut op = OperationBuilder::new()
                .operation_id(Some(format!("{}_{}", doc.resource, doc.operation)))
                .summary(doc.description.clone())
                .tag(doc.resource.clone())
                .response("200", ResponseBuilder::new().description("success envelope").build())
                .response("400", ResponseBuilder::new().description("invalid request").build())
                .response("404", ResponseBuilder::new().description("not found").build());
            for p in &doc.parameters {
                let location = match p.location {
                    ParamLocation::Path => ParameterIn::Path,
                    ParamLocation::Query => ParameterIn::Query,
                    ParamLocation::Body => {
                        op = op.request_body(Some(
                            RequestBodyBuilder::new()
                                .description(Some(p.description.clone()))
                                .content("application/json", ContentBuilder::new().build())
                                .required(Some(Required::True))
                                .build(),
                        ));
                        continue;
                    }
                };
                op = op.parameter(
                    ParameterBuilder::new()
                        .name(p.name.clone())
                        .parameter_in(location)
                        .required(if p.required { Required::True } else { Required::False })
                        .description(Some(p.description.clone()))
                        .build(),
                );
            }
            paths = paths.path(openapi_path(&doc.path), PathItem::new(method, op.build()));
        }
    }
    OpenApiBuilder::new()
        .info(
            InfoBuilder::new()
                .title(env!("CARGO_PKG_NAME"))
                .version(env!("CARGO_PKG_VERSION"))
                .build(),
        )
        .paths(paths.build())
        .build()
}

async fn operations(State(state): State<AppState>) -> Json<Vec<OperationDoc>> {
    let docs = state
        .all_resources()
        .iter()
        .flat_map(|r| describe(r))
        .collect();
    Json(docs)
}

async fn openapi_json(State(state): State<AppState>) -> Json<OpenApi> {
    Json(openapi(&state.all_resources()))
}

/// GET /_docs/operations, GET /_docs/openapi.json
pub fn docs_routes(state: AppState) -> Router {
    Router::new()
        .route("/_docs/operations", get(operations))
        .route("/_docs/openapi.json", get(openapi_json))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{FieldAccess, FieldAccessSpec};
    use crate::schema::{FieldDef, FieldKind, ModelDescriptor, RecordDef, TypeDef};
    use std::sync::Arc;

    fn resource() -> Resource {
        let model = ModelDescriptor::build(&TypeDef::Record(RecordDef {
            name: "User".into(),
            table_name: None,
            fields: vec![
                FieldDef::column("id", FieldKind::BigInt).primary_key().auto_increment(),
                FieldDef::column("name", FieldKind::Text),
                FieldDef::column("password", FieldKind::Text),
            ],
        }))
        .unwrap();
        Resource::new("users", model)
            .with_access(FieldAccess {
                query: FieldAccessSpec::default().excluding(["password"]),
                ..FieldAccess::default()
            })
            .with_default_routes()
    }

    #[test]
    fn test_describe_lists_every_route() {
        let docs = describe(&resource());
        let ops: Vec<_> = docs.iter().map(|d| d.operation.as_str()).collect();
        assert_eq!(ops, vec!["list", "index", "detail", "save", "update", "delete"]);

        let list = &docs[0];
        assert_eq!(list.allowed_fields, vec!["id", "name"]);
        assert!(list.parameters.iter().any(|p| p.name == "page"));

        let detail = &docs[2];
        assert_eq!(detail.parameters[0].name, "id");
        assert_eq!(detail.parameters[0].location, ParamLocation::Path);

        let save = &docs[3];
        assert_eq!(save.allowed_fields, vec!["id", "name", "password"]);
        assert!(save.parameters.iter().any(|p| p.location == ParamLocation::Body));
    }

    #[test]
    fn test_openapi_paths() {
        let doc = openapi(&[Arc::new(resource())]);
        let json = serde_json::to_value(&doc).unwrap();
        assert!(json["paths"]["/users/detail/{id}"]["get"].is_object());
        assert!(json["paths"]["/users/save"]["post"].is_object());
        assert_eq!(json["paths"]["/users/list"]["get"]["operationId"], "users_list");
    }

    #[test]
    fn test_openapi_path_conversion() {
        assert_eq!(openapi_path("/a/detail/:id"), "/a/detail/{id}");
        assert_eq!(openapi_path("/a"), "/a");
    }
}
