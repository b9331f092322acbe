//! Convert FieldValue to bind parameters. Every parameter is sent as text and
//! cast server-side by the placeholder (`$n::int8`), so one bind type covers all columns.

use crate::value::FieldValue;
use sqlx::postgres::{PgArguments, Postgres};
use sqlx::query::{Query, QueryScalar};

pub fn bind_text(v: &FieldValue) -> Option<String> {
    match v {
        FieldValue::Null => None,
        FieldValue::Bool(b) => Some(b.to_string()),
        FieldValue::Int(i) => Some(i.to_string()),
        FieldValue::Float(f) => Some(f.to_string()),
        FieldValue::String(s) => Some(s.clone()),
        FieldValue::List(_) | FieldValue::Json(_) => Some(v.to_json().to_string()),
    }
}

pub fn bind_all<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    params: &[FieldValue],
) -> Query<'q, Postgres, PgArguments> {
    for p in params {
        query = query.bind(bind_text(p));
    }
    query
}

pub fn bind_all_scalar<'q, O>(
    mut query: QueryScalar<'q, Postgres, O, PgArguments>,
    params: &[FieldValue],
) -> QueryScalar<'q, Postgres, O, PgArguments> {
    for p in params {
        query = query.bind(bind_text(p));
    }
    query
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bind_text() {
        assert_eq!(bind_text(&FieldValue::Null), None);
        assert_eq!(bind_text(&FieldValue::Int(5)), Some("5".into()));
        assert_eq!(bind_text(&FieldValue::Bool(false)), Some("false".into()));
        assert_eq!(bind_text(&FieldValue::Json(json!({"a": 1}))), Some("{\"a\":1}".into()));
    }
}
