//! Model descriptor: record definition validated and flattened for runtime use.

use crate::case::to_snake_case;
use crate::error::SchemaError;
use crate::schema::types::{FieldKind, Record, RecordDef, TypeDef};
use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::OnceLock;

fn identifier_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("static regex"))
}

/// True if `s` is safe to use as a table or column name.
pub fn is_identifier(s: &str) -> bool {
    identifier_re().is_match(s)
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FieldDescriptor {
    pub storage_name: String,
    pub display_name: String,
    pub type_tag: String,
    pub kind: FieldKind,
    pub is_primary_key: bool,
    pub is_auto_increment: bool,
}

/// Built once per record type and never mutated afterwards.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ModelDescriptor {
    table_name: String,
    fields: Vec<FieldDescriptor>,
    primary_keys: Vec<String>,
    auto_increment_field: Option<String>,
}

impl ModelDescriptor {
    pub fn build(def: &TypeDef) -> Result<Self, SchemaError> {
        match def {
            TypeDef::Record(record) => Self::from_record(record),
            TypeDef::Primitive { name } => Err(SchemaError::NotARecord(name.clone())),
        }
    }

    pub fn of<R: Record>() -> Result<Self, SchemaError> {
        Self::build(&R::type_def())
    }

    fn from_record(record: &RecordDef) -> Result<Self, SchemaError> {
        let table_name = record
            .table_name
            .clone()
            .unwrap_or_else(|| to_snake_case(&record.name));
        if !is_identifier(&table_name) {
            return Err(SchemaError::InvalidIdentifier(table_name));
        }

        let mut seen = HashSet::new();
        let mut fields = Vec::new();
        let mut primary_keys = Vec::new();
        let mut auto_increment_field = None;

        for f in &record.fields {
            let Some(column) = &f.column else { continue };
            let storage_name = column.name.clone().unwrap_or_else(|| to_snake_case(&f.name));
            if !is_identifier(&storage_name) {
                return Err(SchemaError::InvalidIdentifier(storage_name));
            }
            if !seen.insert(storage_name.clone()) {
                return Err(SchemaError::DuplicateColumn {
                    record: record.name.clone(),
                    column: storage_name,
                });
            }
            if column.primary_key {
                primary_keys.push(storage_name.clone());
            }
            if column.auto_increment {
                if auto_increment_field.is_some() {
                    return Err(SchemaError::MultipleAutoIncrement(record.name.clone()));
                }
                auto_increment_field = Some(storage_name.clone());
            }
            fields.push(FieldDescriptor {
                storage_name,
                display_name: f.name.clone(),
                type_tag: f.kind.type_tag().to_string(),
                kind: f.kind,
                is_primary_key: column.primary_key,
                is_auto_increment: column.auto_increment,
            });
        }

        if fields.is_empty() {
            return Err(SchemaError::NoPersistentFields(record.name.clone()));
        }

        Ok(ModelDescriptor {
            table_name,
            fields,
            primary_keys,
            auto_increment_field,
        })
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn primary_keys(&self) -> &[String] {
        &self.primary_keys
    }

    pub fn auto_increment_field(&self) -> Option<&str> {
        self.auto_increment_field.as_deref()
    }

    pub fn field(&self, storage_name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.storage_name == storage_name)
    }

    /// Lookup by storage name first, then by declared name.
    pub fn resolve_key(&self, key: &str) -> Option<&FieldDescriptor> {
        self.field(key)
            .or_else(|| self.fields.iter().find(|f| f.display_name == key))
    }

    pub fn contains(&self, storage_name: &str) -> bool {
        self.field(storage_name).is_some()
    }

    pub fn storage_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.storage_name.as_str())
    }

    pub fn has_primary_key(&self) -> bool {
        !self.primary_keys.is_empty()
    }
}
