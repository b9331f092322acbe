//! Load resource config from a JSON file and resolve it into registered resources.

use crate::config::{effective_prefix, validate, FullConfig, ResourceConfig};
use crate::error::ConfigError;
use crate::pipeline::Operation;
use crate::resource::{PagingOptions, Resource, ResourceSet, RouteOverride};
use crate::schema::ModelDescriptor;
use axum::http::Method;
use std::path::Path;
use std::str::FromStr;

pub fn parse_config(json: &str) -> Result<FullConfig, ConfigError> {
    serde_json::from_str(json).map_err(|e| ConfigError::Load(e.to_string()))
}

pub async fn load_from_path(path: impl AsRef<Path>) -> Result<FullConfig, ConfigError> {
    let path = path.as_ref();
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
    let config = parse_config(&text)?;
    tracing::info!(path = %path.display(), resources = config.resources.len(), "config loaded");
    Ok(config)
}

/// Build the resource set from full config. Validates first.
pub fn resolve(config: &FullConfig) -> Result<ResourceSet, ConfigError> {
    validate(config)?;
    let mut set = ResourceSet::new();
    for r in &config.resources {
        set.insert(resolve_resource(r)?)?;
    }
    Ok(set)
}

fn resolve_resource(config: &ResourceConfig) -> Result<Resource, ConfigError> {
    let model = ModelDescriptor::build(&config.record)?;
    let prefix = effective_prefix(config, &model);
    let defaults = PagingOptions::default();
    let resource = Resource::new(config.name.clone(), model)
        .with_prefix(&prefix)
        .with_access(config.access.clone())
        .with_paging(PagingOptions {
            default_size: config.default_page_size.unwrap_or(defaults.default_size),
            max_size: config.max_page_size.or(defaults.max_size),
        });

    let ops: Vec<Operation> = match &config.operations {
        Some(names) => names
            .iter()
            .map(|n| Operation::from_name(n).ok_or_else(|| ConfigError::UnknownOperation(n.clone())))
            .collect::<Result<_, _>>()?,
        None => Operation::ALL.to_vec(),
    };
    for op in ops {
        let route = match config.routes.get(op.name()) {
            Some(rc) => RouteOverride {
                method: rc
                    .method
                    .as_deref()
                    .map(|m| {
                        Method::from_str(&m.to_ascii_uppercase()).map_err(|e| ConfigError::InvalidRoute {
                            operation: op.name().to_string(),
                            reason: e.to_string(),
                        })
                    })
                    .transpose()?,
                path: rc.path.clone(),
                allowed_fields: rc.allowed_fields.clone(),
                description: rc.description.clone(),
            },
            None => RouteOverride::default(),
        };
        resource.register_operation_at(op, route);
    }
    Ok(resource)
}
