//! Field-level access control: per-operation allow / exclude lists.

use crate::error::AppError;
use crate::query::Condition;
use crate::schema::ModelDescriptor;
use crate::value::Row;
use serde::{Deserialize, Serialize};

/// Allow / exclude lists over storage names. An empty allow-list admits every
/// field; exclude always wins.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldAccessSpec {
    #[serde(default)]
    pub allow: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl FieldAccessSpec {
    pub fn allow<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FieldAccessSpec {
            allow: fields.into_iter().map(Into::into).collect(),
            exclude: Vec::new(),
        }
    }

    pub fn excluding<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn permits(&self, field: &str) -> bool {
        if self.exclude.iter().any(|f| f == field) {
            return false;
        }
        self.allow.is_empty() || self.allow.iter().any(|f| f == field)
    }

    /// Same exclude-list, allow-list replaced (used for per-route overrides).
    pub fn with_allow(&self, allow: &[String]) -> Self {
        FieldAccessSpec {
            allow: allow.to_vec(),
            exclude: self.exclude.clone(),
        }
    }

    /// Storage names of the model that this spec admits, in model order.
    pub fn allowed_fields(&self, model: &ModelDescriptor) -> Vec<String> {
        model
            .storage_names()
            .filter(|f| self.permits(f))
            .map(str::to_string)
            .collect()
    }

    /// Drop keys not permitted here and keys the model does not know.
    pub fn filter_known(&self, model: &ModelDescriptor, data: &Row) -> Row {
        filter(data, self)
            .into_iter()
            .filter(|(k, _)| model.contains(k))
            .collect()
    }

    /// Every condition must target a model field this spec admits.
    pub fn check_conditions(&self, model: &ModelDescriptor, conditions: &[Condition]) -> Result<(), AppError> {
        match conditions
            .iter()
            .find(|c| !model.contains(&c.field) || !self.permits(&c.field))
        {
            Some(c) => Err(AppError::FieldNotAllowed(c.field.clone())),
            None => Ok(()),
        }
    }
}

/// Pure and total: keys not permitted are dropped, never rejected.
pub fn filter(data: &Row, spec: &FieldAccessSpec) -> Row {
    data.iter()
        .filter(|(k, _)| spec.permits(k))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessKind {
    Query,
    Create,
    Update,
}

/// Access specs for the three kinds of field use.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldAccess {
    #[serde(default)]
    pub query: FieldAccessSpec,
    #[serde(default)]
    pub create: FieldAccessSpec,
    #[serde(default)]
    pub update: FieldAccessSpec,
}

impl FieldAccess {
    pub fn spec(&self, kind: AccessKind) -> &FieldAccessSpec {
        match kind {
            AccessKind::Query => &self.query,
            AccessKind::Create => &self.create,
            AccessKind::Update => &self.update,
        }
    }

    /// Every field name mentioned by any spec.
    pub fn referenced_fields(&self) -> impl Iterator<Item = &str> {
        [&self.query, &self.create, &self.update]
            .into_iter()
            .flat_map(|s| s.allow.iter().chain(s.exclude.iter()))
            .map(String::as_str)
    }
}
