//! Example consumer: serves resources through resource-sdk.
//!
//! Run from repo root: `cargo run -p example-consumer`
//! Set CONFIG_PATH=example_consumer/resources.json to load resources from JSON;
//! without it the built-in `Article` record is served. Without DATABASE_URL the
//! in-memory datastore is used.

use resource_sdk::{
    app_routes_with_layers, ensure_database_exists, load_from_path, resolve, stage_fn, AppState, Condition,
    DataAccess, FieldAccess, FieldAccessSpec, FieldDef, FieldKind, FieldValue, MemoryDataAccess,
    ModelDescriptor, Operation, PagingOptions, PgDataAccess, Pipeline, Record, Resource, ResourceSet,
    RouteEntry, Settings, SortField, StageRole,
};
use axum::http::Method;
use std::sync::Arc;
use tokio::net::TcpListener;

struct Article;

impl Record for Article {
    const TYPE_NAME: &'static str = "Article";

    fn fields() -> Vec<FieldDef> {
        vec![
            FieldDef::column("id", FieldKind::BigInt).primary_key().auto_increment(),
            FieldDef::column("title", FieldKind::Text),
            FieldDef::column("body", FieldKind::Text),
            FieldDef::column("authorEmail", FieldKind::Text),
            FieldDef::column("published", FieldKind::Bool),
            FieldDef::column("createdAt", FieldKind::Timestamp),
            FieldDef::transient("wordCount", FieldKind::Int),
        ]
    }
}

fn article_resource() -> Result<Resource, Box<dyn std::error::Error>> {
    let model = ModelDescriptor::of::<Article>()?;
    let resource = Resource::new("articles", model)
        .with_prefix("/articles")
        .with_access(FieldAccess {
            query: FieldAccessSpec::default().excluding(["author_email"]),
            create: FieldAccessSpec::allow(["title", "body", "author_email", "published", "created_at"]),
            update: FieldAccessSpec::allow(["title", "body", "published"]),
        })
        .with_paging(PagingOptions {
            default_size: 20,
            max_size: Some(100),
        })
        .with_default_routes();

    // Published articles, newest first, reusing the list stages.
    let published = Pipeline::for_operation(Operation::List).with_stage(
        StageRole::PreProcess,
        stage_fn(|ctx| {
            ctx.conditions.push(Condition::eq("published", FieldValue::Bool(true)));
            if ctx.request.query_param("sort").is_none() {
                ctx.sort = vec![SortField::desc("created_at")];
            }
            Ok(())
        }),
    );
    resource.register(
        RouteEntry::new("published", Method::GET, "/articles/published", published)
            .allowed_fields(["id", "title", "created_at"])
            .description("Published articles, newest first"),
    );
    Ok(resource)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("resource_sdk=info,tower_http=info")),
        )
        .init();

    let settings = Settings::from_env()?;

    let resources = match &settings.config_path {
        Some(path) => resolve(&load_from_path(path).await?)?,
        None => {
            let mut set = ResourceSet::new();
            set.insert(article_resource()?)?;
            set
        }
    };

    let data: Arc<dyn DataAccess> = match &settings.database_url {
        Some(url) => {
            ensure_database_exists(url).await?;
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(5)
                .connect(url)
                .await?;
            let pg = PgDataAccess::new(pool);
            for resource in resources.iter() {
                pg.ensure_table(resource.descriptor()).await?;
            }
            Arc::new(pg)
        }
        None => {
            tracing::info!("DATABASE_URL not set; using in-memory datastore");
            Arc::new(MemoryDataAccess::new())
        }
    };

    let state = AppState::new(data, resources);
    let app = app_routes_with_layers(state, settings.body_limit_bytes);

    let listener = TcpListener::bind(settings.bind_addr).await?;
    tracing::info!("Example consumer listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
