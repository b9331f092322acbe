//! Query condition parsing: `field__op=value` request parameters -> typed predicates.

use crate::error::AppError;
use crate::value::FieldValue;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;

/// Control parameters that never become conditions.
pub const RESERVED_PARAMS: &[&str] = &["page", "pageNum", "size", "pageSize", "sort", "orderBy"];

/// Separator between field and operator in the canonical form.
pub const OPERATOR_SEPARATOR: &str = "__";

/// Bare suffixes accepted as an alternative to `__op`. Longest first.
const SUFFIXES: &[(&str, Operator)] = &[
    ("_not_in", Operator::NotIn),
    ("_like", Operator::Like),
    ("_gte", Operator::Ge),
    ("_lte", Operator::Le),
    ("_gt", Operator::Gt),
    ("_lt", Operator::Lt),
    ("_in", Operator::In),
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    Like,
    In,
    NotIn,
}

impl Operator {
    pub fn from_token(token: &str) -> Option<Self> {
        Some(match token {
            "eq" => Operator::Eq,
            "ne" | "neq" => Operator::Ne,
            "gt" => Operator::Gt,
            "ge" | "gte" => Operator::Ge,
            "lt" => Operator::Lt,
            "le" | "lte" => Operator::Le,
            "like" => Operator::Like,
            "in" => Operator::In,
            "not_in" | "nin" => Operator::NotIn,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "eq",
            Operator::Ne => "ne",
            Operator::Gt => "gt",
            Operator::Ge => "ge",
            Operator::Lt => "lt",
            Operator::Le => "le",
            Operator::Like => "like",
            Operator::In => "in",
            Operator::NotIn => "not_in",
        }
    }

    pub fn takes_list(&self) -> bool {
        matches!(self, Operator::In | Operator::NotIn)
    }

    pub const ALL: [Operator; 9] = [
        Operator::Eq,
        Operator::Ne,
        Operator::Gt,
        Operator::Ge,
        Operator::Lt,
        Operator::Le,
        Operator::Like,
        Operator::In,
        Operator::NotIn,
    ];
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Condition {
    pub field: String,
    pub operator: Operator,
    /// `FieldValue::List` for `in` / `not_in`.
    pub value: FieldValue,
}

impl Condition {
    pub fn new(field: impl Into<String>, operator: Operator, value: FieldValue) -> Self {
        Condition {
            field: field.into(),
            operator,
            value,
        }
    }

    pub fn eq(field: impl Into<String>, value: FieldValue) -> Self {
        Condition::new(field, Operator::Eq, value)
    }
}

pub fn is_reserved(key: &str) -> bool {
    RESERVED_PARAMS.contains(&key)
}

/// Splits request parameters into conditions. Parsing is all-or-nothing: the
/// first bad parameter fails the whole request.
#[derive(Default)]
pub struct ConditionParser<'a> {
    known_fields: Option<HashSet<&'a str>>,
}

impl<'a> ConditionParser<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// With known fields, a key that is itself a field is never split on a bare suffix
    /// (so a column named `logged_in` stays an equality filter).
    pub fn with_known_fields(fields: impl IntoIterator<Item = &'a str>) -> Self {
        ConditionParser {
            known_fields: Some(fields.into_iter().collect()),
        }
    }

    pub fn parse<'p, I>(&self, params: I) -> Result<Vec<Condition>, AppError>
    where
        I: IntoIterator<Item = (&'p str, &'p str)>,
    {
        let mut out = Vec::new();
        for (key, raw) in params {
            if is_reserved(key) {
                continue;
            }
            let (field, operator) = self.split_key(key)?;
            let value = parse_value(key, operator, raw)?;
            out.push(Condition {
                field: field.to_string(),
                operator,
                value,
            });
        }
        Ok(out)
    }

    fn split_key<'k>(&self, key: &'k str) -> Result<(&'k str, Operator), AppError> {
        if let Some((field, token)) = key.rsplit_once(OPERATOR_SEPARATOR) {
            if field.is_empty() {
                return Err(AppError::BadRequest(format!("missing field name in parameter '{}'", key)));
            }
            let op = Operator::from_token(token).ok_or_else(|| AppError::UnsupportedOperator(key.to_string()))?;
            return Ok((field, op));
        }
        let is_field = self
            .known_fields
            .as_ref()
            .map(|known| known.contains(key))
            .unwrap_or(false);
        if !is_field {
            for (suffix, op) in SUFFIXES {
                if let Some(field) = key.strip_suffix(suffix) {
                    if !field.is_empty() {
                        return Ok((field, *op));
                    }
                }
            }
        }
        Ok((key, Operator::Eq))
    }
}

fn parse_value(key: &str, operator: Operator, raw: &str) -> Result<FieldValue, AppError> {
    match operator {
        Operator::In | Operator::NotIn => {
            let items: Vec<FieldValue> = raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(FieldValue::infer)
                .collect();
            if items.is_empty() {
                return Err(AppError::BadRequest(format!(
                    "parameter '{}' requires at least one value",
                    key
                )));
            }
            Ok(FieldValue::List(items))
        }
        Operator::Like => {
            let pattern = if raw.contains('%') {
                raw.to_string()
            } else {
                format!("%{}%", raw)
            };
            Ok(FieldValue::String(pattern))
        }
        _ => Ok(FieldValue::infer(raw)),
    }
}

/// Parse with no field knowledge; bare suffixes always split.
pub fn parse_conditions<'p, I>(params: I) -> Result<Vec<Condition>, AppError>
where
    I: IntoIterator<Item = (&'p str, &'p str)>,
{
    ConditionParser::new().parse(params)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_double_underscore_gt() {
        let conds = parse_conditions([("age__gt", "20")]).unwrap();
        assert_eq!(conds, vec![Condition::new("age", Operator::Gt, FieldValue::Int(20))]);
    }

    #[test]
    fn test_in_list() {
        let conds = parse_conditions([("status__in", "1,2,3")]).unwrap();
        assert_eq!(
            conds,
            vec![Condition::new(
                "status",
                Operator::In,
                FieldValue::List(vec![FieldValue::Int(1), FieldValue::Int(2), FieldValue::Int(3)])
            )]
        );
    }

    #[test]
    fn test_in_drops_empty_tokens() {
        let conds = parse_conditions([("status__in", "1,,2, ")]).unwrap();
        assert_eq!(conds[0].value, FieldValue::List(vec![FieldValue::Int(1), FieldValue::Int(2)]));
        assert!(matches!(
            parse_conditions([("status__not_in", ", ,")]),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn test_unknown_operator_names_parameter() {
        let err = parse_conditions([("name", "x"), ("foo__bogus", "1")]).unwrap_err();
        assert_eq!(err, AppError::UnsupportedOperator("foo__bogus".into()));
    }

    #[test]
    fn test_default_eq_and_reserved_skipped() {
        let conds = parse_conditions([
            ("page", "2"),
            ("size", "5"),
            ("sort", "-id"),
            ("name", "bob"),
        ])
        .unwrap();
        assert_eq!(conds, vec![Condition::eq("name", FieldValue::String("bob".into()))]);
    }

    #[test]
    fn test_bare_suffixes() {
        let conds = parse_conditions([
            ("age_gte", "18"),
            ("age_lt", "65"),
            ("kind_not_in", "a,b"),
            ("name_like", "ann"),
        ])
        .unwrap();
        assert_eq!(conds[0].operator, Operator::Ge);
        assert_eq!(conds[1].operator, Operator::Lt);
        assert_eq!(conds[2].field, "kind");
        assert_eq!(conds[2].operator, Operator::NotIn);
        assert_eq!(conds[3].value, FieldValue::String("%ann%".into()));
    }

    #[test]
    fn test_known_field_not_split_on_suffix() {
        let parser = ConditionParser::with_known_fields(["logged_in", "id"]);
        let conds = parser.parse([("logged_in", "true"), ("id_in", "1,2")]).unwrap();
        assert_eq!(conds[0], Condition::eq("logged_in", FieldValue::Bool(true)));
        assert_eq!(conds[1].field, "id");
        assert_eq!(conds[1].operator, Operator::In);
    }

    #[test]
    fn test_order_follows_input() {
        let conds = parse_conditions([("b", "1"), ("a", "2")]).unwrap();
        let fields: Vec<_> = conds.iter().map(|c| c.field.as_str()).collect();
        assert_eq!(fields, vec!["b", "a"]);
    }

    #[test]
    fn test_like_keeps_explicit_wildcards() {
        let conds = parse_conditions([("name__like", "ab%")]).unwrap();
        assert_eq!(conds[0].value, FieldValue::String("ab%".into()));
    }

    #[test]
    fn test_operator_aliases() {
        for (token, op) in [("neq", Operator::Ne), ("gte", Operator::Ge), ("nin", Operator::NotIn)] {
            assert_eq!(Operator::from_token(token), Some(op));
        }
        for op in Operator::ALL {
            assert_eq!(Operator::from_token(op.as_str()), Some(op));
        }
    }
}
