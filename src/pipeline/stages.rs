//! Default stages for the built-in operations.

use crate::access::AccessKind;
use crate::error::AppError;
use crate::pipeline::{ExecResult, Operation, RequestContext, Stage};
use crate::query::{sort_from_params, Condition, ConditionParser, Page};
use crate::response::PageResult;
use crate::schema::ModelDescriptor;
use crate::value::{row_to_json, FieldValue, Row};
use async_trait::async_trait;
use axum::http::StatusCode;
use serde_json::{json, Value};

/// Name of the path parameter carrying a single-column primary key.
pub const ID_PARAM: &str = "id";

pub struct NoopStage;

#[async_trait]
impl Stage for NoopStage {
    async fn run(&self, _ctx: &mut RequestContext) -> Result<(), AppError> {
        Ok(())
    }
}

/// Validates input and prepares a query builder. Never touches the datastore.
pub struct BuildQuery {
    operation: Operation,
}

impl BuildQuery {
    pub fn new(operation: Operation) -> Self {
        BuildQuery { operation }
    }
}

#[async_trait]
impl Stage for BuildQuery {
    async fn run(&self, ctx: &mut RequestContext) -> Result<(), AppError> {
        let model = ctx.model();
        let query_spec = ctx.access_spec(AccessKind::Query);
        let select = query_spec.allowed_fields(&model);

        match self.operation {
            Operation::List => {
                let filters = parse_filters(ctx, &model)?;
                ctx.conditions.extend(filters);
                coerce_conditions(&model, &mut ctx.conditions)?;
                let sort = sort_from_params(ctx.request.query_pairs());
                if !sort.is_empty() {
                    ctx.sort = sort;
                }
                let paging = ctx.resource.paging();
                let page = Page::from_params(ctx.request.query_pairs(), paging.default_size)
                    .capped(paging.max_size);

                let mut q = ctx.data.query(model);
                q.select(&select);
                q.filter(&ctx.conditions);
                q.order_by(&ctx.sort);
                q.paginate(page.offset(), page.limit());
                ctx.page = Some(page);
                ctx.query = Some(q);
            }
            Operation::Detail => {
                let key = key_conditions(ctx, &model)?;
                let filters = parse_filters(ctx, &model)?;
                ctx.conditions.extend(key);
                ctx.conditions.extend(filters);
                coerce_conditions(&model, &mut ctx.conditions)?;

                let mut q = ctx.data.query(model);
                q.select(&select);
                q.filter(&ctx.conditions);
                ctx.query = Some(q);
            }
            Operation::Save => {
                if let Some(first) = parse_filters(ctx, &model)?.first() {
                    return Err(AppError::BadRequest(format!(
                        "save does not accept filter parameters (got '{}')",
                        first.field
                    )));
                }
                let mut payload = prepare_payload(ctx, &model, AccessKind::Create)?;
                if let Some(ai) = model.auto_increment_field() {
                    payload.remove(ai);
                }
                ctx.payload = Some(payload);
                ctx.query = Some(ctx.data.query(model));
            }
            Operation::Update => {
                let key = key_conditions(ctx, &model)?;
                let scope = parse_scope(ctx, &model)?;
                let mut payload = prepare_payload(ctx, &model, AccessKind::Update)?;
                for pk in model.primary_keys() {
                    payload.remove(pk);
                }
                if let Some(ai) = model.auto_increment_field() {
                    payload.remove(ai);
                }
                if payload.is_empty() {
                    return Err(AppError::BadRequest("no updatable fields in body".into()));
                }
                ctx.conditions.extend(key);
                ctx.conditions.extend(scope);
                coerce_conditions(&model, &mut ctx.conditions)?;

                let mut q = ctx.data.query(model);
                q.filter(&ctx.conditions);
                ctx.payload = Some(payload);
                ctx.query = Some(q);
            }
            Operation::Delete => {
                let key = key_conditions(ctx, &model)?;
                let scope = parse_scope(ctx, &model)?;
                ctx.conditions.extend(key);
                ctx.conditions.extend(scope);
                coerce_conditions(&model, &mut ctx.conditions)?;

                let mut q = ctx.data.query(model);
                q.filter(&ctx.conditions);
                ctx.query = Some(q);
            }
        }
        Ok(())
    }
}

/// Parse filter parameters and check them against the query access spec.
fn parse_filters(ctx: &RequestContext, model: &ModelDescriptor) -> Result<Vec<Condition>, AppError> {
    let parser = ConditionParser::with_known_fields(model.storage_names());
    let conditions = parser.parse(ctx.request.query_pairs())?;
    ctx.access_spec(AccessKind::Query).check_conditions(model, &conditions)?;
    Ok(conditions)
}

/// Filters that narrow an update or delete. Bare primary-key parameters are
/// the key itself, read by [`key_conditions`], and are skipped here.
fn parse_scope(ctx: &RequestContext, model: &ModelDescriptor) -> Result<Vec<Condition>, AppError> {
    let parser = ConditionParser::with_known_fields(model.storage_names());
    let params = ctx
        .request
        .query_pairs()
        .filter(|(k, _)| !model.primary_keys().iter().any(|pk| pk == k));
    let conditions = parser.parse(params)?;
    ctx.access_spec(AccessKind::Query).check_conditions(model, &conditions)?;
    Ok(conditions)
}

fn coerce_conditions(model: &ModelDescriptor, conditions: &mut [Condition]) -> Result<(), AppError> {
    for cond in conditions.iter_mut() {
        let Some(field) = model.field(&cond.field) else {
            return Err(AppError::FieldNotAllowed(cond.field.clone()));
        };
        // LIKE patterns compare as text whatever the column type
        if cond.operator == crate::query::Operator::Like {
            cond.value = FieldValue::String(cond.value.to_string());
            continue;
        }
        let value = std::mem::replace(&mut cond.value, FieldValue::Null);
        cond.value = value
            .coerce(field.kind)
            .map_err(|msg| AppError::BadRequest(format!("{}: {}", cond.field, msg)))?;
    }
    Ok(())
}

/// Equality conditions for every primary-key column. A single key is read from the
/// `:id` path parameter; any key may also come from a path or query parameter, or
/// the body, under its storage name.
fn key_conditions(ctx: &RequestContext, model: &ModelDescriptor) -> Result<Vec<Condition>, AppError> {
    if !model.has_primary_key() {
        return Err(AppError::MissingPrimaryKey(format!(
            "{} has no primary key",
            model.table_name()
        )));
    }
    let single = model.primary_keys().len() == 1;
    let mut out = Vec::new();
    for pk in model.primary_keys() {
        let from_path = ctx
            .request
            .path_params
            .get(pk)
            .or_else(|| single.then(|| ctx.request.path_params.get(ID_PARAM)).flatten())
            .map(|s| FieldValue::infer(s));
        let from_query = || ctx.request.query_param(pk).map(FieldValue::infer);
        let from_body = || {
            ctx.request
                .body
                .as_ref()
                .and_then(|b| b.get(pk))
                .filter(|v| !v.is_null())
                .map(|v| FieldValue::from_json(v.clone()))
        };
        let value = from_path
            .or_else(from_query)
            .or_else(from_body)
            .filter(|v| !matches!(v, FieldValue::String(s) if s.is_empty()))
            .ok_or_else(|| AppError::MissingPrimaryKey(pk.clone()))?;
        out.push(Condition::eq(pk.clone(), value));
    }
    Ok(out)
}

/// Body -> row of known, permitted, type-checked columns. Unknown or
/// disallowed keys are dropped.
fn prepare_payload(ctx: &RequestContext, model: &ModelDescriptor, kind: AccessKind) -> Result<Row, AppError> {
    let object = match &ctx.request.body {
        None | Some(Value::Null) => return Ok(Row::new()),
        Some(Value::Object(map)) => map,
        Some(_) => return Err(AppError::BadRequest("body must be a JSON object".into())),
    };
    let raw: Row = object
        .iter()
        .map(|(k, v)| {
            let key = model
                .resolve_key(k)
                .map(|f| f.storage_name.clone())
                .unwrap_or_else(|| k.clone());
            (key, FieldValue::from_json(v.clone()))
        })
        .collect();
    let permitted = ctx.access_spec(kind).filter_known(model, &raw);
    permitted
        .into_iter()
        .map(|(k, v)| {
            let field = model.field(&k).ok_or_else(|| AppError::FieldNotAllowed(k.clone()))?;
            let v = v
                .coerce(field.kind)
                .map_err(|msg| AppError::BadRequest(format!("{}: {}", k, msg)))?;
            Ok((k, v))
        })
        .collect()
}

/// Runs the prepared builder and records the raw outcome.
pub struct ExecuteQuery {
    operation: Operation,
}

impl ExecuteQuery {
    pub fn new(operation: Operation) -> Self {
        ExecuteQuery { operation }
    }
}

#[async_trait]
impl Stage for ExecuteQuery {
    async fn run(&self, ctx: &mut RequestContext) -> Result<(), AppError> {
        let mut q = ctx.query.take().ok_or_else(|| {
            AppError::Execution(format!("no query was built for operation '{}'", ctx.operation))
        })?;
        let result = match self.operation {
            Operation::List => {
                let page = ctx.page.unwrap_or_default();
                let total = q.count().await?;
                let rows = if total > page.offset() { q.list().await? } else { Vec::new() };
                ExecResult::Page { rows, total }
            }
            Operation::Detail => ExecResult::One(q.one().await?),
            Operation::Save => {
                let payload = ctx.payload.clone().unwrap_or_default();
                ExecResult::Created(q.insert(&payload).await?)
            }
            Operation::Update => {
                let payload = ctx.payload.clone().unwrap_or_default();
                ExecResult::Affected(q.update(&payload).await?)
            }
            Operation::Delete => ExecResult::Affected(q.delete().await?),
        };
        ctx.query = Some(q);
        ctx.result = Some(result);
        Ok(())
    }
}

/// Turns the raw result into the public envelope. Outbound rows only carry
/// fields the query access spec admits.
pub struct ShapeResponse;

#[async_trait]
impl Stage for ShapeResponse {
    async fn run(&self, ctx: &mut RequestContext) -> Result<(), AppError> {
        let model = ctx.model();
        let spec = ctx.access_spec(AccessKind::Query);
        let outbound = |row: &Row| row_to_json(&spec.filter_known(&model, row));

        let (status, data) = match &ctx.result {
            None => {
                if ctx.response.is_some() {
                    return Ok(());
                }
                (StatusCode::OK, Value::Null)
            }
            Some(ExecResult::Page { rows, total }) => {
                let page = ctx.page.unwrap_or_default();
                let result = PageResult {
                    page_num: page.page_num,
                    page_size: page.page_size,
                    total: *total,
                    data: rows.iter().map(outbound).collect::<Vec<_>>(),
                };
                let data = serde_json::to_value(&result)
                    .map_err(|e| AppError::Execution(format!("serialize page: {}", e)))?;
                (StatusCode::OK, data)
            }
            Some(ExecResult::One(Some(row))) => (StatusCode::OK, outbound(row)),
            Some(ExecResult::One(None)) => {
                return Err(AppError::NotFound(format!("{} record", model.table_name())));
            }
            Some(ExecResult::Created(row)) => (StatusCode::CREATED, outbound(row)),
            Some(ExecResult::Affected(0)) => {
                return Err(AppError::NotFound(format!("{} record", model.table_name())));
            }
            Some(ExecResult::Affected(n)) => (StatusCode::OK, json!({ "affected": n })),
            Some(ExecResult::Custom(v)) => (StatusCode::OK, v.clone()),
        };
        ctx.respond(status, data);
        Ok(())
    }
}
