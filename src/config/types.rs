//! Raw config types matching the JSON resource file.

use crate::access::FieldAccess;
use crate::schema::TypeDef;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FullConfig {
    #[serde(default)]
    pub resources: Vec<ResourceConfig>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResourceConfig {
    pub name: String,
    /// Defaults to `/{table_name}`.
    #[serde(default)]
    pub prefix: Option<String>,
    pub record: TypeDef,
    #[serde(default)]
    pub access: FieldAccess,
    /// Enabled built-in operations; `None` enables all five.
    #[serde(default)]
    pub operations: Option<Vec<String>>,
    /// Overrides keyed by operation name.
    #[serde(default)]
    pub routes: BTreeMap<String, RouteConfig>,
    #[serde(default)]
    pub default_page_size: Option<i64>,
    #[serde(default)]
    pub max_page_size: Option<i64>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RouteConfig {
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub allowed_fields: Option<Vec<String>>,
    #[serde(default)]
    pub description: Option<String>,
}
