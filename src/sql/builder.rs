//! Builds parameterized SELECT, COUNT, INSERT, UPDATE, DELETE and CREATE TABLE from a model descriptor.

use crate::query::{Condition, Operator, SortField};
use crate::schema::{FieldDescriptor, FieldKind, ModelDescriptor};
use crate::value::{FieldValue, Row};

/// Quote identifier for PostgreSQL (names come from validated descriptors only).
fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

#[derive(Debug, Default)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<FieldValue>,
}

impl QueryBuf {
    fn new() -> Self {
        Self::default()
    }

    /// Bind one value and return its placeholder, cast to the column's type.
    fn push_param(&mut self, v: FieldValue, kind: FieldKind) -> String {
        self.params.push(v);
        format!("${}::{}", self.params.len(), kind.pg_type())
    }
}

/// Column list for SELECT / RETURNING: requested fields that exist, else every column.
fn column_list(model: &ModelDescriptor, fields: &[String]) -> String {
    let chosen: Vec<&FieldDescriptor> = model
        .fields()
        .iter()
        .filter(|f| fields.is_empty() || fields.contains(&f.storage_name))
        .collect();
    let chosen = if chosen.is_empty() {
        model.fields().iter().collect()
    } else {
        chosen
    };
    chosen
        .iter()
        .map(|f| quoted(&f.storage_name))
        .collect::<Vec<_>>()
        .join(", ")
}

fn condition_sql(q: &mut QueryBuf, field: &FieldDescriptor, cond: &Condition) -> Option<String> {
    let col = quoted(&field.storage_name);
    let kind = field.kind;
    let cmp = |op: &str, q: &mut QueryBuf| {
        let ph = q.push_param(cond.value.clone(), kind);
        format!("{} {} {}", col, op, ph)
    };
    Some(match cond.operator {
        Operator::Eq if cond.value.is_null() => format!("{} IS NULL", col),
        Operator::Ne if cond.value.is_null() => format!("{} IS NOT NULL", col),
        Operator::Eq => cmp("=", q),
        Operator::Ne => cmp("<>", q),
        Operator::Gt => cmp(">", q),
        Operator::Ge => cmp(">=", q),
        Operator::Lt => cmp("<", q),
        Operator::Le => cmp("<=", q),
        Operator::Like => {
            let ph = q.push_param(cond.value.clone(), FieldKind::Text);
            format!("{}::text LIKE {}", col, ph)
        }
        Operator::In | Operator::NotIn => {
            let items = match &cond.value {
                FieldValue::List(items) => items.clone(),
                other => vec![other.clone()],
            };
            if items.is_empty() {
                return match cond.operator {
                    Operator::In => Some("1 = 0".to_string()),
                    _ => None,
                };
            }
            let phs: Vec<String> = items.into_iter().map(|v| q.push_param(v, kind)).collect();
            let op = if cond.operator == Operator::In { "IN" } else { "NOT IN" };
            format!("{} {} ({})", col, op, phs.join(", "))
        }
    })
}

/// WHERE clause from conditions on known columns; params bound in condition order.
fn where_clause(q: &mut QueryBuf, model: &ModelDescriptor, conditions: &[Condition]) -> String {
    let mut parts = Vec::new();
    for cond in conditions {
        let Some(field) = model.field(&cond.field) else {
            tracing::debug!(field = %cond.field, "skipping condition on unknown column");
            continue;
        };
        if let Some(sql) = condition_sql(q, field, cond) {
            parts.push(sql);
        }
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", parts.join(" AND "))
    }
}

fn order_clause(model: &ModelDescriptor, sort: &[SortField]) -> String {
    let parts: Vec<String> = sort
        .iter()
        .filter(|s| model.contains(&s.field))
        .map(|s| format!("{} {}", quoted(&s.field), s.direction.as_sql()))
        .collect();
    if parts.is_empty() {
        model
            .primary_keys()
            .first()
            .map(|pk| format!(" ORDER BY {}", quoted(pk)))
            .unwrap_or_default()
    } else {
        format!(" ORDER BY {}", parts.join(", "))
    }
}

/// SELECT with filters, ORDER BY (primary key when no usable sort), optional LIMIT/OFFSET.
pub fn select(
    model: &ModelDescriptor,
    fields: &[String],
    conditions: &[Condition],
    sort: &[SortField],
    window: Option<(i64, i64)>,
) -> QueryBuf {
    let mut q = QueryBuf::new();
    let where_sql = where_clause(&mut q, model, conditions);
    let window_sql = window
        .map(|(offset, limit)| format!(" LIMIT {} OFFSET {}", limit.max(0), offset.max(0)))
        .unwrap_or_default();
    q.sql = format!(
        "SELECT {} FROM {}{}{}{}",
        column_list(model, fields),
        quoted(model.table_name()),
        where_sql,
        order_clause(model, sort),
        window_sql
    );
    q
}

pub fn count(model: &ModelDescriptor, conditions: &[Condition]) -> QueryBuf {
    let mut q = QueryBuf::new();
    let where_sql = where_clause(&mut q, model, conditions);
    q.sql = format!("SELECT COUNT(*) FROM {}{}", quoted(model.table_name()), where_sql);
    q
}

/// INSERT of the known columns present in `row`. A missing or null auto-increment
/// column is omitted so the database assigns it.
pub fn insert(model: &ModelDescriptor, row: &Row) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut cols = Vec::new();
    let mut placeholders = Vec::new();
    for f in model.fields() {
        let Some(val) = row.get(&f.storage_name) else { continue };
        if f.is_auto_increment && val.is_null() {
            continue;
        }
        cols.push(quoted(&f.storage_name));
        placeholders.push(q.push_param(val.clone(), f.kind));
    }
    let table = quoted(model.table_name());
    let returning = column_list(model, &[]);
    q.sql = if cols.is_empty() {
        format!("INSERT INTO {} DEFAULT VALUES RETURNING {}", table, returning)
    } else {
        format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
            table,
            cols.join(", "),
            placeholders.join(", "),
            returning
        )
    };
    q
}

/// UPDATE of known columns in `changes` for rows matching `conditions`.
/// Returns None when nothing would be set.
pub fn update(model: &ModelDescriptor, conditions: &[Condition], changes: &Row) -> Option<QueryBuf> {
    let mut q = QueryBuf::new();
    let mut sets = Vec::new();
    for (k, v) in changes {
        let Some(f) = model.field(k) else { continue };
        let ph = q.push_param(v.clone(), f.kind);
        sets.push(format!("{} = {}", quoted(k), ph));
    }
    if sets.is_empty() {
        return None;
    }
    let where_sql = where_clause(&mut q, model, conditions);
    q.sql = format!(
        "UPDATE {} SET {}{}",
        quoted(model.table_name()),
        sets.join(", "),
        where_sql
    );
    Some(q)
}

pub fn delete(model: &ModelDescriptor, conditions: &[Condition]) -> QueryBuf {
    let mut q = QueryBuf::new();
    let where_sql = where_clause(&mut q, model, conditions);
    q.sql = format!("DELETE FROM {}{}", quoted(model.table_name()), where_sql);
    q
}

fn column_type(f: &FieldDescriptor) -> &'static str {
    match (f.kind, f.is_auto_increment) {
        (FieldKind::Int, true) => "SERIAL",
        (FieldKind::BigInt, true) => "BIGSERIAL",
        (kind, _) => kind.pg_type(),
    }
}

/// CREATE TABLE IF NOT EXISTS with the primary key constraint.
pub fn create_table(model: &ModelDescriptor) -> String {
    let mut defs: Vec<String> = model
        .fields()
        .iter()
        .map(|f| {
            let mut def = format!("{} {}", quoted(&f.storage_name), column_type(f));
            if f.is_primary_key {
                def.push_str(" NOT NULL");
            }
            def
        })
        .collect();
    if model.has_primary_key() {
        let pks: Vec<String> = model.primary_keys().iter().map(|k| quoted(k)).collect();
        defs.push(format!("PRIMARY KEY ({})", pks.join(", ")));
    }
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        quoted(model.table_name()),
        defs.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldDef, RecordDef, TypeDef};

    fn model() -> ModelDescriptor {
        ModelDescriptor::build(&TypeDef::Record(RecordDef {
            name: "Member".into(),
            table_name: None,
            fields: vec![
                FieldDef::column("id", FieldKind::BigInt).primary_key().auto_increment(),
                FieldDef::column("name", FieldKind::Text),
                FieldDef::column("status", FieldKind::Int),
            ],
        }))
        .unwrap()
    }

    #[test]
    fn test_select_with_conditions_sort_window() {
        let m = model();
        let conds = vec![
            Condition::new("name", Operator::Like, FieldValue::String("%ab%".into())),
            Condition::new(
                "status",
                Operator::In,
                FieldValue::List(vec![FieldValue::Int(1), FieldValue::Int(2)]),
            ),
        ];
        let q = select(
            &m,
            &["id".to_string(), "name".to_string()],
            &conds,
            &[SortField::desc("name"), SortField::asc("bogus")],
            Some((5, 5)),
        );
        assert_eq!(
            q.sql,
            "SELECT \"id\", \"name\" FROM \"member\" WHERE \"name\"::text LIKE $1::text AND \"status\" IN ($2::int4, $3::int4) ORDER BY \"name\" DESC LIMIT 5 OFFSET 5"
        );
        assert_eq!(q.params.len(), 3);
    }

    #[test]
    fn test_default_order_is_primary_key() {
        let q = select(&model(), &[], &[], &[], None);
        assert_eq!(q.sql, "SELECT \"id\", \"name\", \"status\" FROM \"member\" ORDER BY \"id\"");
    }

    #[test]
    fn test_count_ignores_window() {
        let q = count(&model(), &[Condition::eq("status", FieldValue::Int(1))]);
        assert_eq!(q.sql, "SELECT COUNT(*) FROM \"member\" WHERE \"status\" = $1::int4");
    }

    #[test]
    fn test_insert_skips_auto_increment() {
        let mut row = Row::new();
        row.insert("id".into(), FieldValue::Null);
        row.insert("name".into(), FieldValue::String("x".into()));
        let q = insert(&model(), &row);
        assert_eq!(
            q.sql,
            "INSERT INTO \"member\" (\"name\") VALUES ($1::text) RETURNING \"id\", \"name\", \"status\""
        );
    }

    #[test]
    fn test_update_and_delete() {
        let m = model();
        let key = [Condition::eq("id", FieldValue::Int(3))];
        let mut changes = Row::new();
        changes.insert("status".into(), FieldValue::Int(2));
        let q = update(&m, &key, &changes).unwrap();
        assert_eq!(q.sql, "UPDATE \"member\" SET \"status\" = $1::int4 WHERE \"id\" = $2::int8");
        assert!(update(&m, &key, &Row::new()).is_none());
        let q = delete(&m, &key);
        assert_eq!(q.sql, "DELETE FROM \"member\" WHERE \"id\" = $1::int8");
    }

    #[test]
    fn test_null_equality() {
        let q = count(&model(), &[Condition::eq("name", FieldValue::Null)]);
        assert_eq!(q.sql, "SELECT COUNT(*) FROM \"member\" WHERE \"name\" IS NULL");
        assert!(q.params.is_empty());
    }

    #[test]
    fn test_create_table() {
        assert_eq!(
            create_table(&model()),
            "CREATE TABLE IF NOT EXISTS \"member\" (\"id\" BIGSERIAL NOT NULL, \"name\" text, \"status\" int4, PRIMARY KEY (\"id\"))"
        );
    }
}
