//! PostgreSQL collaborator: runs builder output through a sqlx pool.

use crate::error::AppError;
use crate::query::{Condition, SortField};
use crate::schema::ModelDescriptor;
use crate::sql::{self, bind_all, bind_all_scalar, QueryBuf};
use crate::store::{DataAccess, QueryBuilder};
use crate::value::{FieldValue, Row};
use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{ConnectOptions, PgPool};
use std::str::FromStr;
use std::sync::Arc;

#[derive(Clone)]
pub struct PgDataAccess {
    pool: PgPool,
}

impl PgDataAccess {
    pub fn new(pool: PgPool) -> Self {
        PgDataAccess { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// CREATE TABLE IF NOT EXISTS for a registered model.
    pub async fn ensure_table(&self, model: &ModelDescriptor) -> Result<(), AppError> {
        let ddl = sql::create_table(model);
        tracing::debug!(sql = %ddl, "ensure table");
        sqlx::query(&ddl).execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl DataAccess for PgDataAccess {
    fn query(&self, model: Arc<ModelDescriptor>) -> Box<dyn QueryBuilder> {
        Box::new(PgQuery {
            pool: self.pool.clone(),
            model,
            select: Vec::new(),
            conditions: Vec::new(),
            sort: Vec::new(),
            window: None,
        })
    }

    async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1").fetch_optional(&self.pool).await?;
        Ok(())
    }
}

struct PgQuery {
    pool: PgPool,
    model: Arc<ModelDescriptor>,
    select: Vec<String>,
    conditions: Vec<Condition>,
    sort: Vec<SortField>,
    window: Option<(i64, i64)>,
}

impl PgQuery {
    fn require_filter(&self, action: &str) -> Result<(), AppError> {
        if self.conditions.is_empty() {
            return Err(AppError::Execution(format!(
                "refusing to {} {} without a filter",
                action,
                self.model.table_name()
            )));
        }
        Ok(())
    }

    async fn fetch_all(&self, q: &QueryBuf) -> Result<Vec<Row>, AppError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let rows = bind_all(sqlx::query(&q.sql), &q.params)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(pg_row_to_row).collect())
    }

    async fn fetch_optional(&self, q: &QueryBuf) -> Result<Option<Row>, AppError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let row = bind_all(sqlx::query(&q.sql), &q.params)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(pg_row_to_row))
    }

    async fn execute(&self, q: &QueryBuf) -> Result<u64, AppError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "execute");
        let done = bind_all(sqlx::query(&q.sql), &q.params)
            .execute(&self.pool)
            .await?;
        Ok(done.rows_affected())
    }
}

#[async_trait]
impl QueryBuilder for PgQuery {
    fn select(&mut self, fields: &[String]) {
        self.select = fields.to_vec();
    }

    fn filter(&mut self, conditions: &[Condition]) {
        self.conditions.extend_from_slice(conditions);
    }

    fn order_by(&mut self, sort: &[SortField]) {
        self.sort.extend_from_slice(sort);
    }

    fn paginate(&mut self, offset: i64, limit: i64) {
        self.window = Some((offset, limit));
    }

    async fn count(&mut self) -> Result<i64, AppError> {
        let q = sql::count(&self.model, &self.conditions);
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let n = bind_all_scalar(sqlx::query_scalar::<_, i64>(&q.sql), &q.params)
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }

    async fn list(&mut self) -> Result<Vec<Row>, AppError> {
        let q = sql::select(&self.model, &self.select, &self.conditions, &self.sort, self.window);
        self.fetch_all(&q).await
    }

    async fn one(&mut self) -> Result<Option<Row>, AppError> {
        let q = sql::select(&self.model, &self.select, &self.conditions, &self.sort, Some((0, 1)));
        self.fetch_optional(&q).await
    }

    async fn insert(&mut self, row: &Row) -> Result<Row, AppError> {
        let q = sql::insert(&self.model, row);
        self.fetch_optional(&q)
            .await?
            .ok_or_else(|| AppError::Execution("insert returned no row".into()))
    }

    async fn update(&mut self, changes: &Row) -> Result<u64, AppError> {
        self.require_filter("update")?;
        match sql::update(&self.model, &self.conditions, changes) {
            Some(q) => self.execute(&q).await,
            None => Ok(0),
        }
    }

    async fn delete(&mut self) -> Result<u64, AppError> {
        self.require_filter("delete")?;
        let q = sql::delete(&self.model, &self.conditions);
        self.execute(&q).await
    }
}

fn pg_row_to_row(row: &PgRow) -> Row {
    use sqlx::Column;
    use sqlx::Row as _;
    row.columns()
        .iter()
        .map(|col| (col.name().to_string(), cell_to_value(row, col.name())))
        .collect()
}

fn cell_to_value(row: &PgRow, name: &str) -> FieldValue {
    use sqlx::Row as _;
    if let Ok(Some(n)) = row.try_get::<Option<i16>, _>(name) {
        return FieldValue::Int(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i32>, _>(name) {
        return FieldValue::Int(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i64>, _>(name) {
        return FieldValue::Int(n);
    }
    if let Ok(Some(n)) = row.try_get::<Option<f32>, _>(name) {
        return FieldValue::Float(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<f64>, _>(name) {
        return FieldValue::Float(n);
    }
    if let Ok(Some(b)) = row.try_get::<Option<bool>, _>(name) {
        return FieldValue::Bool(b);
    }
    if let Ok(Some(u)) = row.try_get::<Option<uuid::Uuid>, _>(name) {
        return FieldValue::String(u.to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(name) {
        return FieldValue::String(d.to_rfc3339());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDateTime>, _>(name) {
        return FieldValue::String(d.format("%Y-%m-%dT%H:%M:%S%.f").to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDate>, _>(name) {
        return FieldValue::String(d.format("%Y-%m-%d").to_string());
    }
    if let Ok(Some(s)) = row.try_get::<Option<String>, _>(name) {
        return FieldValue::String(s);
    }
    if let Ok(Some(j)) = row.try_get::<Option<serde_json::Value>, _>(name) {
        return FieldValue::Json(j);
    }
    FieldValue::Null
}

/// Create the target database if it does not exist (connects to the `postgres` admin db).
pub async fn ensure_database_exists(database_url: &str) -> Result<(), AppError> {
    let (admin_url, db_name) = parse_db_name_from_url(database_url)?;
    if db_name.is_empty() || db_name == "postgres" {
        return Ok(());
    }
    let opts = sqlx::postgres::PgConnectOptions::from_str(&admin_url)
        .map_err(|e| AppError::BadRequest(format!("invalid DATABASE_URL: {}", e)))?;
    let mut conn: sqlx::PgConnection = opts.connect().await?;
    let exists: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
        .bind(&db_name)
        .fetch_one(&mut conn)
        .await?;
    if !exists.0 {
        tracing::info!(database = %db_name, "creating database");
        sqlx::query(&format!("CREATE DATABASE \"{}\"", db_name.replace('"', "\"\"")))
            .execute(&mut conn)
            .await?;
    }
    Ok(())
}

fn parse_db_name_from_url(url: &str) -> Result<(String, String), AppError> {
    let path_start = url
        .rfind('/')
        .ok_or_else(|| AppError::BadRequest("DATABASE_URL: no path".into()))?
        + 1;
    let path_and_query = url.get(path_start..).unwrap_or("");
    let db_name = path_and_query.split('?').next().unwrap_or("").trim();
    let base = url.get(..path_start).unwrap_or(url);
    Ok((format!("{}postgres", base), db_name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_db_name_from_url() {
        let (admin, db) = parse_db_name_from_url("postgres://u:p@localhost:5432/shop?sslmode=disable").unwrap();
        assert_eq!(admin, "postgres://u:p@localhost:5432/postgres");
        assert_eq!(db, "shop");
    }
}
