//! Process-local datastore. Backs tests and the demo server when no database is configured.

use crate::error::AppError;
use crate::query::{Condition, Operator, SortDirection, SortField};
use crate::schema::ModelDescriptor;
use crate::store::{DataAccess, QueryBuilder};
use crate::value::{FieldValue, Row};
use async_trait::async_trait;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

#[derive(Default, Debug)]
struct MemoryTable {
    rows: Vec<Row>,
    next_id: i64,
}

type Tables = Arc<RwLock<HashMap<String, MemoryTable>>>;

#[derive(Clone, Default)]
pub struct MemoryDataAccess {
    tables: Tables,
}

impl MemoryDataAccess {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every row currently stored in `table`.
    pub fn rows(&self, table: &str) -> Vec<Row> {
        let guard = self.tables.read().unwrap_or_else(|e| e.into_inner());
        guard.get(table).map(|t| t.rows.clone()).unwrap_or_default()
    }

    /// Insert rows as-is, bypassing auto-increment.
    pub fn seed(&self, table: &str, rows: impl IntoIterator<Item = Row>) {
        let mut guard = self.tables.write().unwrap_or_else(|e| e.into_inner());
        let t = guard.entry(table.to_string()).or_default();
        for row in rows {
            t.rows.push(row);
        }
    }
}

#[async_trait]
impl DataAccess for MemoryDataAccess {
    fn query(&self, model: Arc<ModelDescriptor>) -> Box<dyn QueryBuilder> {
        Box::new(MemoryQuery {
            model,
            tables: self.tables.clone(),
            select: None,
            conditions: Vec::new(),
            sort: Vec::new(),
            window: None,
        })
    }
}

struct MemoryQuery {
    model: Arc<ModelDescriptor>,
    tables: Tables,
    select: Option<Vec<String>>,
    conditions: Vec<Condition>,
    sort: Vec<SortField>,
    window: Option<(i64, i64)>,
}

fn poisoned<T>(_: T) -> AppError {
    AppError::Execution("memory store lock poisoned".into())
}

impl MemoryQuery {
    fn matching<'r>(&self, rows: &'r [Row]) -> Vec<&'r Row> {
        rows.iter()
            .filter(|r| self.conditions.iter().all(|c| matches(r, c)))
            .collect()
    }

    fn project(&self, row: &Row) -> Row {
        match &self.select {
            Some(fields) if !fields.is_empty() => row
                .iter()
                .filter(|(k, _)| fields.contains(k))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            _ => row.clone(),
        }
    }

    fn sorted_window(&self, rows: &[Row]) -> Vec<Row> {
        let mut hits = self.matching(rows);
        let sort: Vec<&SortField> = self
            .sort
            .iter()
            .filter(|s| {
                let known = self.model.contains(&s.field);
                if !known {
                    tracing::debug!(field = %s.field, "ignoring unknown sort field");
                }
                known
            })
            .collect();
        hits.sort_by(|a, b| {
            for s in &sort {
                let av = a.get(&s.field).unwrap_or(&FieldValue::Null);
                let bv = b.get(&s.field).unwrap_or(&FieldValue::Null);
                let ord = compare(av, bv).unwrap_or(Ordering::Equal);
                let ord = match s.direction {
                    SortDirection::Asc => ord,
                    SortDirection::Desc => ord.reverse(),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        });
        let (offset, limit) = self.window.unwrap_or((0, i64::MAX));
        hits.into_iter()
            .skip(usize::try_from(offset.max(0)).unwrap_or(usize::MAX))
            .take(usize::try_from(limit.max(0)).unwrap_or(usize::MAX))
            .map(|r| self.project(r))
            .collect()
    }
}

#[async_trait]
impl QueryBuilder for MemoryQuery {
    fn select(&mut self, fields: &[String]) {
        self.select = Some(fields.to_vec());
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
        let guard = self.tables.read().map_err(poisoned)?;
        let n = guard
            .get(self.model.table_name())
            .map(|t| self.matching(&t.rows).len())
            .unwrap_or(0);
        Ok(n as i64)
    }

    async fn list(&mut self) -> Result<Vec<Row>, AppError> {
        let guard = self.tables.read().map_err(poisoned)?;
        Ok(guard
            .get(self.model.table_name())
            .map(|t| self.sorted_window(&t.rows))
            .unwrap_or_default())
    }

    async fn one(&mut self) -> Result<Option<Row>, AppError> {
        let guard = self.tables.read().map_err(poisoned)?;
        Ok(guard
            .get(self.model.table_name())
            .and_then(|t| self.matching(&t.rows).first().map(|r| self.project(r))))
    }

    async fn insert(&mut self, row: &Row) -> Result<Row, AppError> {
        let mut guard = self.tables.write().map_err(poisoned)?;
        let table = guard.entry(self.model.table_name().to_string()).or_default();
        let mut stored: Row = self
            .model
            .storage_names()
            .map(|f| (f.to_string(), row.get(f).cloned().unwrap_or(FieldValue::Null)))
            .collect();
        if let Some(ai) = self.model.auto_increment_field() {
            match stored.get(ai).and_then(FieldValue::as_i64) {
                Some(given) => table.next_id = table.next_id.max(given),
                None => {
                    let seen = table
                        .rows
                        .iter()
                        .filter_map(|r| r.get(ai).and_then(FieldValue::as_i64))
                        .max()
                        .unwrap_or(0);
                    table.next_id = table.next_id.max(seen) + 1;
                    stored.insert(ai.to_string(), FieldValue::Int(table.next_id));
                }
            }
        }
        for pk in self.model.primary_keys() {
            let key = stored.get(pk).cloned().unwrap_or(FieldValue::Null);
            let clash = table
                .rows
                .iter()
                .any(|r| r.get(pk).map(|v| values_equal(v, &key)).unwrap_or(false));
            if clash && self.model.primary_keys().len() == 1 {
                return Err(AppError::Execution(format!(
                    "duplicate key value violates unique constraint on {}.{}",
                    self.model.table_name(),
                    pk
                )));
            }
        }
        table.rows.push(stored.clone());
        Ok(stored)
    }

    async fn update(&mut self, changes: &Row) -> Result<u64, AppError> {
        let mut guard = self.tables.write().map_err(poisoned)?;
        let Some(table) = guard.get_mut(self.model.table_name()) else {
            return Ok(0);
        };
        let mut n = 0;
        for row in table.rows.iter_mut() {
            if self.conditions.iter().all(|c| matches(row, c)) {
                for (k, v) in changes {
                    row.insert(k.clone(), v.clone());
                }
                n += 1;
            }
        }
        Ok(n)
    }

    async fn delete(&mut self) -> Result<u64, AppError> {
        let mut guard = self.tables.write().map_err(poisoned)?;
        let Some(table) = guard.get_mut(self.model.table_name()) else {
            return Ok(0);
        };
        let before = table.rows.len();
        table.rows.retain(|r| !self.conditions.iter().all(|c| matches(r, c)));
        Ok((before - table.rows.len()) as u64)
    }
}

fn compare(a: &FieldValue, b: &FieldValue) -> Option<Ordering> {
    use FieldValue as V;
    match (a, b) {
        (V::Int(x), V::Int(y)) => Some(x.cmp(y)),
        (V::Int(x), V::Float(y)) => (*x as f64).partial_cmp(y),
        (V::Float(x), V::Int(y)) => x.partial_cmp(&(*y as f64)),
        (V::Float(x), V::Float(y)) => x.partial_cmp(y),
        (V::String(x), V::String(y)) => Some(x.cmp(y)),
        (V::Bool(x), V::Bool(y)) => Some(x.cmp(y)),
        (V::Null, V::Null) => Some(Ordering::Equal),
        (V::Null, _) => Some(Ordering::Less),
        (_, V::Null) => Some(Ordering::Greater),
        _ if a == b => Some(Ordering::Equal),
        _ => None,
    }
}

fn values_equal(a: &FieldValue, b: &FieldValue) -> bool {
    !a.is_null() && !b.is_null() && compare(a, b) == Some(Ordering::Equal)
}

fn matches(row: &Row, cond: &Condition) -> bool {
    let value = row.get(&cond.field).unwrap_or(&FieldValue::Null);
    let ordered = |want: &[Ordering]| {
        !value.is_null()
            && !cond.value.is_null()
            && compare(value, &cond.value).map(|o| want.contains(&o)).unwrap_or(false)
    };
    let members = || match &cond.value {
        FieldValue::List(items) => items.clone(),
        other => vec![other.clone()],
    };
    match cond.operator {
        Operator::Eq => values_equal(value, &cond.value),
        Operator::Ne => !value.is_null() && !values_equal(value, &cond.value),
        Operator::Gt => ordered(&[Ordering::Greater]),
        Operator::Ge => ordered(&[Ordering::Greater, Ordering::Equal]),
        Operator::Lt => ordered(&[Ordering::Less]),
        Operator::Le => ordered(&[Ordering::Less, Ordering::Equal]),
        Operator::Like => {
            !value.is_null() && like(&value.to_string(), &cond.value.to_string())
        }
        Operator::In => members().iter().any(|m| values_equal(value, m)),
        Operator::NotIn => !value.is_null() && !members().iter().any(|m| values_equal(value, m)),
    }
}

/// SQL LIKE: `%` any run, `_` one character.
fn like(text: &str, pattern: &str) -> bool {
    let t: Vec<char> = text.chars().collect();
    let p: Vec<char> = pattern.chars().collect();
    // dp[j] = pattern[..i] matches text[..j]
    let mut dp = vec![false; t.len() + 1];
    dp[0] = true;
    for &pc in &p {
        let mut next = vec![false; t.len() + 1];
        if pc == '%' {
            let mut any = false;
            for j in 0..=t.len() {
                any = any || dp[j];
                next[j] = any;
            }
        } else {
            for j in 1..=t.len() {
                next[j] = dp[j - 1] && (pc == '_' || pc == t[j - 1]);
            }
        }
        dp = next;
    }
    dp[t.len()]
}
