//! Config validation: unique names and prefixes, known operations and fields,
//! well-formed routes.

use crate::config::{FullConfig, ResourceConfig};
use crate::error::ConfigError;
use crate::pipeline::Operation;
use crate::routes::paths;
use crate::schema::ModelDescriptor;
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

const METHODS: &[&str] = &["GET", "POST", "PUT", "PATCH", "DELETE"];

fn name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_-]*$").expect("static regex"))
}

fn prefix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(/[A-Za-z0-9_-]+)+$").expect("static regex"))
}

/// Prefix the resource will be served under.
pub fn effective_prefix(config: &ResourceConfig, model: &ModelDescriptor) -> String {
    match &config.prefix {
        Some(p) => p.trim_end_matches('/').to_string(),
        None => format!("/{}", model.table_name()),
    }
}

pub fn validate(config: &FullConfig) -> Result<(), ConfigError> {
    let mut names = HashSet::new();
    let mut prefixes = HashSet::new();

    for r in &config.resources {
        if !name_re().is_match(&r.name) {
            return Err(ConfigError::Validation(format!("invalid resource name '{}'", r.name)));
        }
        if !names.insert(r.name.as_str()) {
            return Err(ConfigError::DuplicateResource(r.name.clone()));
        }

        let model = ModelDescriptor::build(&r.record)?;
        let prefix = effective_prefix(r, &model);
        if !prefix_re().is_match(&prefix) {
            return Err(ConfigError::Validation(format!(
                "resource '{}': invalid prefix '{}'",
                r.name, prefix
            )));
        }
        if paths::is_reserved(&prefix) {
            return Err(ConfigError::Validation(format!(
                "resource '{}': prefix '{}' is reserved",
                r.name, prefix
            )));
        }
        if !prefixes.insert(prefix.clone()) {
            return Err(ConfigError::DuplicatePrefix(prefix));
        }

        if let Some(ops) = &r.operations {
            for op in ops {
                if Operation::from_name(op).is_none() {
                    return Err(ConfigError::UnknownOperation(op.clone()));
                }
            }
        }

        for field in r.access.referenced_fields() {
            check_field(r, &model, field)?;
        }

        for (op, route) in &r.routes {
            if Operation::from_name(op).is_none() {
                return Err(ConfigError::UnknownOperation(op.clone()));
            }
            if let Some(method) = &route.method {
                if !METHODS.contains(&method.to_ascii_uppercase().as_str()) {
                    return Err(ConfigError::InvalidRoute {
                        operation: op.clone(),
                        reason: format!("unsupported method '{}'", method),
                    });
                }
            }
            if let Some(path) = &route.path {
                paths::check_path(path).map_err(|reason| ConfigError::InvalidRoute {
                    operation: op.clone(),
                    reason,
                })?;
            }
            for field in route.allowed_fields.iter().flatten() {
                check_field(r, &model, field)?;
            }
        }

        for (label, size) in [("default_page_size", r.default_page_size), ("max_page_size", r.max_page_size)] {
            if matches!(size, Some(n) if n < 1) {
                return Err(ConfigError::Validation(format!(
                    "resource '{}': {} must be at least 1",
                    r.name, label
                )));
            }
        }
    }
    Ok(())
}

fn check_field(r: &ResourceConfig, model: &ModelDescriptor, field: &str) -> Result<(), ConfigError> {
    if model.contains(field) {
        Ok(())
    } else {
        Err(ConfigError::UnknownField {
            resource: r.name.clone(),
            field: field.to_string(),
        })
    }
}
