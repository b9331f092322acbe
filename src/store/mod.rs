//! Data-access collaborators. The core hands conditions, sort and paging to a
//! [`QueryBuilder`]; it never writes query text itself.

mod memory;
mod postgres;

pub use memory::MemoryDataAccess;
pub use postgres::{ensure_database_exists, PgDataAccess};

use crate::error::AppError;
use crate::query::{Condition, SortField};
use crate::schema::ModelDescriptor;
use crate::value::Row;
use async_trait::async_trait;
use std::sync::Arc;

/// Entry point of a datastore: one builder per query.
#[async_trait]
pub trait DataAccess: Send + Sync {
    fn query(&self, model: Arc<ModelDescriptor>) -> Box<dyn QueryBuilder>;

    /// Readiness check.
    async fn ping(&self) -> Result<(), AppError> {
        Ok(())
    }
}

/// Chain-style query against one table. Filter, sort and paging calls
/// accumulate; the async terminal calls run the query.
///
/// `count` ignores sort and paging. `update` and `delete` act on every row
/// matching the accumulated filter.
#[async_trait]
pub trait QueryBuilder: Send {
    fn select(&mut self, fields: &[String]);
    fn filter(&mut self, conditions: &[Condition]);
    fn order_by(&mut self, sort: &[SortField]);
    fn paginate(&mut self, offset: i64, limit: i64);

    async fn count(&mut self) -> Result<i64, AppError>;
    async fn list(&mut self) -> Result<Vec<Row>, AppError>;
    async fn one(&mut self) -> Result<Option<Row>, AppError>;
    /// Returns the stored row, including generated values.
    async fn insert(&mut self, row: &Row) -> Result<Row, AppError>;
    async fn update(&mut self, changes: &Row) -> Result<u64, AppError>;
    async fn delete(&mut self) -> Result<u64, AppError>;
}
