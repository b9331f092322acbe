//! End-to-end tests: HTTP requests through the generated router.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use resource_sdk::{
    app_routes, stage_fn, AppError, AppState, Condition, DataAccess, FieldAccess, FieldAccessSpec,
    FieldDef, FieldKind, FieldValue, MemoryDataAccess, ModelDescriptor, Operation, Operator, Pipeline,
    QueryBuilder, RecordDef, Resource, ResourceSet, Row, RouteEntry, SortField, StageRole, TypeDef,
};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

#[derive(Clone, Debug, PartialEq)]
enum Call {
    Select(Vec<String>),
    Filter(Vec<Condition>),
    OrderBy(Vec<SortField>),
    Paginate(i64, i64),
    Count,
    List,
    One,
    Insert(Row),
    Update(Row),
    Delete,
}

/// Records every builder call; answers with canned values.
#[derive(Clone, Default)]
struct Recorder {
    calls: Arc<Mutex<Vec<Call>>>,
    total: i64,
}

impl Recorder {
    fn with_total(total: i64) -> Self {
        Recorder {
            total,
            ..Recorder::default()
        }
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

struct RecordingQuery {
    calls: Arc<Mutex<Vec<Call>>>,
    total: i64,
}

impl RecordingQuery {
    fn push(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl DataAccess for Recorder {
    fn query(&self, _model: Arc<ModelDescriptor>) -> Box<dyn QueryBuilder> {
        Box::new(RecordingQuery {
            calls: self.calls.clone(),
            total: self.total,
        })
    }
}

#[async_trait]
impl QueryBuilder for RecordingQuery {
    fn select(&mut self, fields: &[String]) {
        self.push(Call::Select(fields.to_vec()));
    }

    fn filter(&mut self, conditions: &[Condition]) {
        self.push(Call::Filter(conditions.to_vec()));
    }

    fn order_by(&mut self, sort: &[SortField]) {
        self.push(Call::OrderBy(sort.to_vec()));
    }

    fn paginate(&mut self, offset: i64, limit: i64) {
        self.push(Call::Paginate(offset, limit));
    }

    async fn count(&mut self) -> Result<i64, AppError> {
        self.push(Call::Count);
        Ok(self.total)
    }

    async fn list(&mut self) -> Result<Vec<Row>, AppError> {
        self.push(Call::List);
        Ok(Vec::new())
    }

    async fn one(&mut self) -> Result<Option<Row>, AppError> {
        self.push(Call::One);
        Ok(None)
    }

    async fn insert(&mut self, row: &Row) -> Result<Row, AppError> {
        self.push(Call::Insert(row.clone()));
        let mut stored = row.clone();
        stored.insert("id".into(), FieldValue::Int(1));
        Ok(stored)
    }

    async fn update(&mut self, changes: &Row) -> Result<u64, AppError> {
        self.push(Call::Update(changes.clone()));
        Ok(1)
    }

    async fn delete(&mut self) -> Result<u64, AppError> {
        self.push(Call::Delete);
        Err(AppError::Execution("connection reset by peer".into()))
    }
}

fn model() -> ModelDescriptor {
    ModelDescriptor::build(&TypeDef::Record(RecordDef {
        name: "Res".into(),
        table_name: Some("res".into()),
        fields: vec![
            FieldDef::column("id", FieldKind::BigInt).primary_key().auto_increment(),
            FieldDef::column("name", FieldKind::Text),
            FieldDef::column("status", FieldKind::Int),
            FieldDef::column("secret", FieldKind::Text),
        ],
    }))
    .unwrap()
}

fn res_resource() -> Resource {
    Resource::new("res", model())
        .with_access(FieldAccess {
            query: FieldAccessSpec::allow(["id", "name", "status"]),
            create: FieldAccessSpec::allow(["name", "status"]),
            update: FieldAccessSpec::default().excluding(["secret"]),
        })
        .with_default_routes()
}

fn app(data: Arc<dyn DataAccess>) -> (Router, AppState) {
    let mut set = ResourceSet::new();
    set.insert(res_resource()).unwrap();
    let state = AppState::new(data, set);
    (app_routes(state.clone()), state)
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(b) => builder
            .header("content-type", "application/json")
            .body(Body::from(b.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn list_hands_window_and_conditions_to_builder() {
    let recorder = Recorder::with_total(12);
    let (app, _) = app(Arc::new(recorder.clone()));

    let (status, body) = send(&app, Method::GET, "/res/list?name__like=abc&page=2&size=5", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["code"], 0);
    assert_eq!(body["data"]["pageNum"], 2);
    assert_eq!(body["data"]["pageSize"], 5);
    assert_eq!(body["data"]["total"], 12);
    assert_eq!(body["data"]["totalPages"], 3);

    assert_eq!(
        recorder.calls(),
        vec![
            Call::Select(vec!["id".into(), "name".into(), "status".into()]),
            Call::Filter(vec![Condition::new(
                "name",
                Operator::Like,
                FieldValue::String("%abc%".into())
            )]),
            Call::OrderBy(vec![]),
            Call::Paginate(5, 5),
            Call::Count,
            Call::List,
        ]
    );
}

#[tokio::test]
async fn list_skips_fetch_past_last_page() {
    let recorder = Recorder::with_total(3);
    let (app, _) = app(Arc::new(recorder.clone()));
    let (status, body) = send(&app, Method::GET, "/res?page=4&size=5", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["data"], json!([]));
    assert!(!recorder.calls().contains(&Call::List));
}

#[tokio::test]
async fn save_persists_only_allowed_fields() {
    let recorder = Recorder::default();
    let (app, _) = app(Arc::new(recorder.clone()));

    let (status, body) = send(
        &app,
        Method::POST,
        "/res/save",
        Some(json!({"name": "widget", "status": 1, "secret": "hunter2"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["id"], 1);
    assert!(body["data"].get("secret").is_none());

    let mut expected = Row::new();
    expected.insert("name".into(), FieldValue::String("widget".into()));
    expected.insert("status".into(), FieldValue::Int(1));
    assert_eq!(recorder.calls(), vec![Call::Insert(expected)]);
}

#[tokio::test]
async fn unsupported_operator_rejected_before_datastore() {
    let recorder = Recorder::default();
    let (app, _) = app(Arc::new(recorder.clone()));

    let (status, body) = send(&app, Method::GET, "/res/list?foo__bogus=1", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 400);
    assert!(body["message"].as_str().unwrap().contains("foo__bogus"));
    assert!(recorder.calls().is_empty());
}

#[tokio::test]
async fn datastore_error_message_passed_through() {
    let recorder = Recorder::default();
    let (app, _) = app(Arc::new(recorder.clone()));

    let (status, body) = send(&app, Method::DELETE, "/res/delete/7", None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["message"], "connection reset by peer");
    assert_eq!(
        recorder.calls(),
        vec![
            Call::Filter(vec![Condition::eq("id", FieldValue::Int(7))]),
            Call::Delete,
        ]
    );
}

#[tokio::test]
async fn update_excludes_key_and_secret() {
    let recorder = Recorder::default();
    let (app, _) = app(Arc::new(recorder.clone()));

    let (status, body) = send(
        &app,
        Method::PUT,
        "/res/update/7",
        Some(json!({"id": 9, "name": "renamed", "secret": "x"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!({"affected": 1}));

    let mut changes = Row::new();
    changes.insert("name".into(), FieldValue::String("renamed".into()));
    assert_eq!(
        recorder.calls(),
        vec![
            Call::Filter(vec![Condition::eq("id", FieldValue::Int(7))]),
            Call::Update(changes),
        ]
    );
}

#[tokio::test]
async fn unknown_route_and_unregistered_operation() {
    let (app, state) = app(Arc::new(MemoryDataAccess::new()));
    let (status, _) = send(&app, Method::GET, "/res/archive", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let res = state.resource("res").unwrap();
    let err = res
        .handle(
            state.data.clone(),
            "archive",
            resource_sdk::InboundRequest::new(Method::GET),
        )
        .await
        .unwrap_err();
    assert_eq!(err, AppError::NotRegistered("archive".into()));
}

#[tokio::test]
async fn replaced_pipeline_applies_without_rebuilding_router() {
    let (app, state) = app(Arc::new(MemoryDataAccess::new()));
    let pipeline = Pipeline::custom().with_stage(
        StageRole::Execute,
        stage_fn(|ctx| {
            ctx.result = Some(resource_sdk::ExecResult::Custom(json!("second")));
            Ok(())
        }),
    );
    state
        .resource("res")
        .unwrap()
        .register(RouteEntry::new("list", Method::GET, "/res/list", pipeline));

    let (status, body) = send(&app, Method::GET, "/res/list", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], "second");
}

#[tokio::test]
async fn crud_round_trip_in_memory() {
    let (app, _) = app(Arc::new(MemoryDataAccess::new()));

    for name in ["alpha", "beta", "gamma"] {
        let (status, _) = send(&app, Method::POST, "/res/save", Some(json!({"name": name, "status": 1}))).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (_, body) = send(&app, Method::GET, "/res/detail/2", None).await;
    assert_eq!(body["data"], json!({"id": 2, "name": "beta", "status": 1}));

    let (status, _) = send(&app, Method::PUT, "/res/update/2", Some(json!({"status": 0}))).await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = send(&app, Method::GET, "/res/list?status=1&sort=-id", None).await;
    let names: Vec<_> = body["data"]["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["name"].clone())
        .collect();
    assert_eq!(names, vec![json!("gamma"), json!("alpha")]);

    let (_, body) = send(&app, Method::GET, "/res/list?name_in=alpha,beta", None).await;
    assert_eq!(body["data"]["total"], 2);

    let (status, _) = send(&app, Method::DELETE, "/res/delete/2", None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = send(&app, Method::GET, "/res/detail/2", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], 404);
}

#[tokio::test]
async fn custom_endpoint_reuses_list_stages() {
    let (app, state) = app(Arc::new(MemoryDataAccess::new()));
    let active = Pipeline::for_operation(Operation::List).with_stage(
        StageRole::PreProcess,
        stage_fn(|ctx| {
            ctx.conditions.push(Condition::eq("status", FieldValue::Int(1)));
            Ok(())
        }),
    );
    state
        .resource("res")
        .unwrap()
        .register(RouteEntry::new("active", Method::GET, "/res/active", active).allowed_fields(["name"]));
    // Routes are bound when the router is built; rebuild to expose the new path.
    let app_with_active = app_routes(state.clone());

    for (name, status) in [("a", 1), ("b", 0), ("c", 1)] {
        send(&app, Method::POST, "/res/save", Some(json!({"name": name, "status": status}))).await;
    }
    let (status, body) = send(&app_with_active, Method::GET, "/res/active", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 2);
    assert_eq!(body["data"]["data"][0], json!({"name": "a"}));
}

#[tokio::test]
async fn bad_json_body_is_client_error() {
    let (app, _) = app(Arc::new(MemoryDataAccess::new()));
    let request = Request::builder()
        .method(Method::POST)
        .uri("/res/save")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn common_and_docs_routes() {
    let (app, _) = app(Arc::new(MemoryDataAccess::new()));

    let (status, body) = send(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, body) = send(&app, Method::GET, "/ready", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["resources"], 1);

    let (_, body) = send(&app, Method::GET, "/_docs/operations", None).await;
    let ops: Vec<_> = body.as_array().unwrap().iter().map(|d| d["operation"].clone()).collect();
    assert_eq!(ops, vec![json!("list"), json!("index"), json!("detail"), json!("save"), json!("update"), json!("delete")]);

    let (status, body) = send(&app, Method::GET, "/_docs/openapi.json", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["paths"]["/res/update/{id}"]["put"].is_object());
}

#[tokio::test]
async fn unsupported_operator_on_write_rejected_before_datastore() {
    let recorder = Recorder::default();
    let (app, _) = app(Arc::new(recorder.clone()));

    let (status, body) = send(&app, Method::DELETE, "/res/delete/7?foo__bogus=1", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("foo__bogus"));

    let (status, _) = send(
        &app,
        Method::PUT,
        "/res/update/7?status__between=1",
        Some(json!({"name": "renamed"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(recorder.calls().is_empty());
}

#[tokio::test]
async fn update_scope_filters_reach_builder() {
    let recorder = Recorder::default();
    let (app, _) = app(Arc::new(recorder.clone()));

    let (status, _) = send(&app, Method::PUT, "/res/update/7?status=1", Some(json!({"name": "n"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        recorder.calls()[0],
        Call::Filter(vec![
            Condition::eq("id", FieldValue::Int(7)),
            Condition::eq("status", FieldValue::Int(1)),
        ])
    );
}

#[tokio::test]
async fn huge_page_size_does_not_overflow() {
    let (app, _) = app(Arc::new(MemoryDataAccess::new()));
    send(&app, Method::POST, "/res/save", Some(json!({"name": "only", "status": 1}))).await;

    let uri = format!("/res/list?size={}", i64::MAX);
    let (status, body) = send(&app, Method::GET, &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["pageSize"], i64::MAX);
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["totalPages"], 1);
    assert_eq!(body["data"]["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn text_filter_matches_exact_spelling() {
    let (app, _) = app(Arc::new(MemoryDataAccess::new()));
    for name in ["007", "7"] {
        send(&app, Method::POST, "/res/save", Some(json!({"name": name, "status": 1}))).await;
    }

    let (_, body) = send(&app, Method::GET, "/res/list?name=007", None).await;
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["data"][0]["name"], "007");
}
