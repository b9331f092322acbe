//! Record definitions: what a caller declares once, ahead of serving traffic.

use serde::{Deserialize, Serialize};

/// Declared type of a field. Drives value coercion and SQL casts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Int,
    BigInt,
    Float,
    Bool,
    Text,
    Uuid,
    Timestamp,
    Json,
}

impl FieldKind {
    /// Declared (host-language) type tag recorded on the descriptor.
    pub fn type_tag(&self) -> &'static str {
        match self {
            FieldKind::Int => "i32",
            FieldKind::BigInt => "i64",
            FieldKind::Float => "f64",
            FieldKind::Bool => "bool",
            FieldKind::Text => "String",
            FieldKind::Uuid => "Uuid",
            FieldKind::Timestamp => "DateTime",
            FieldKind::Json => "Json",
        }
    }

    /// PostgreSQL type used to cast bound parameters.
    pub fn pg_type(&self) -> &'static str {
        match self {
            FieldKind::Int => "int4",
            FieldKind::BigInt => "int8",
            FieldKind::Float => "float8",
            FieldKind::Bool => "boolean",
            FieldKind::Text => "text",
            FieldKind::Uuid => "uuid",
            FieldKind::Timestamp => "timestamptz",
            FieldKind::Json => "jsonb",
        }
    }
}

/// Persistence annotation on a field. A field without one is transient.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnAnnotation {
    /// Explicit storage name; defaults to snake_case of the field name.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub primary_key: bool,
    #[serde(default)]
    pub auto_increment: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub kind: FieldKind,
    #[serde(default)]
    pub column: Option<ColumnAnnotation>,
}

impl FieldDef {
    /// Persistent field stored under the default column name.
    pub fn column(name: impl Into<String>, kind: FieldKind) -> Self {
        FieldDef {
            name: name.into(),
            kind,
            column: Some(ColumnAnnotation::default()),
        }
    }

    /// Field with no persistence annotation; never becomes a column.
    pub fn transient(name: impl Into<String>, kind: FieldKind) -> Self {
        FieldDef {
            name: name.into(),
            kind,
            column: None,
        }
    }

    pub fn rename(mut self, storage_name: impl Into<String>) -> Self {
        self.column.get_or_insert_with(ColumnAnnotation::default).name = Some(storage_name.into());
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.column.get_or_insert_with(ColumnAnnotation::default).primary_key = true;
        self
    }

    pub fn auto_increment(mut self) -> Self {
        self.column.get_or_insert_with(ColumnAnnotation::default).auto_increment = true;
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordDef {
    /// Declared type name, e.g. "UserProfile".
    pub name: String,
    /// Explicit table name; wins over the derived one.
    #[serde(default)]
    pub table_name: Option<String>,
    pub fields: Vec<FieldDef>,
}

/// Any type definition handed to the descriptor builder. Only records describe tables.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TypeDef {
    Record(RecordDef),
    Primitive { name: String },
}

impl TypeDef {
    pub fn name(&self) -> &str {
        match self {
            TypeDef::Record(r) => &r.name,
            TypeDef::Primitive { name } => name,
        }
    }
}

/// Implemented by Rust types that want to be exposed as resources.
///
/// ```rust,ignore
/// struct Article;
///
/// impl Record for Article {
///     const TYPE_NAME: &'static str = "Article";
///
///     fn fields() -> Vec<FieldDef> {
///         vec![
///             FieldDef::column("id", FieldKind::BigInt).primary_key().auto_increment(),
///             FieldDef::column("title", FieldKind::Text),
///         ]
///     }
/// }
/// ```
pub trait Record {
    const TYPE_NAME: &'static str;

    /// Explicit table name. `None` means snake_case of `TYPE_NAME`.
    fn table_name() -> Option<String> {
        None
    }

    fn fields() -> Vec<FieldDef>;

    fn type_def() -> TypeDef {
        TypeDef::Record(RecordDef {
            name: Self::TYPE_NAME.to_string(),
            table_name: Self::table_name(),
            fields: Self::fields(),
        })
    }
}
