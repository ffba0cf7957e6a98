use anyhow::Result;
use axum::http::{HeaderName, HeaderValue, Method, StatusCode};
use segment_router::config::Config;
use segment_router::middleware::{self, Middleware};
use segment_router::{health, server, ApiOptions, ConfigError, RequestContext, Response, Router};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "segment_router=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting segment router");

    middleware::init_metrics()?;
    info!("Initialized Prometheus metrics exporter");

    let config_path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.yaml".to_string());
    let config = if std::path::Path::new(&config_path).exists() {
        info!("Loading configuration from: {}", config_path);
        Config::from_yaml_with_env(&config_path)?
    } else {
        warn!("Configuration file {} not found, using defaults", config_path);
        Config::default()
    };
    config.validate()?;

    let router = build_router(&config)?;
    info!("Registered {} routes", router.routes().len());

    server::serve(router, &config.server).await
}

fn build_router(config: &Config) -> Result<Router, ConfigError> {
    let mut guards: Vec<Middleware> = Vec::new();
    if let Some(rate_limit) = &config.server.rate_limit {
        guards.push(middleware::rate_limit(middleware::create_rate_limiter(
            rate_limit,
        )));
    }
    if let Some(api_keys) = &config.server.api_keys {
        guards.push(middleware::require_api_key(api_keys.clone()));
    }

    Router::builder(config)
        .routes(|api| {
            api.get("health", health::health_check)?;
            api.get("ready", health::readiness_check)?;
            api.get("metrics", middleware::metrics_handler)?;

            api.group("echo", ApiOptions::with_middleware(guards), |api| {
                api.get("${message}", echo)?;
                api.post("", echo_body)
            })
        })?
        .method_fallback(Method::OPTIONS, default_options)
        .build()
}

async fn echo(ctx: Arc<RequestContext>) -> Response {
    Response::json(json!({
        "message": ctx.param("message"),
        "request_id": ctx.request_id(),
    }))
    .with_status(StatusCode::OK)
}

async fn echo_body(ctx: Arc<RequestContext>) -> Response {
    match ctx.body().await {
        Ok(body) => Response::json(json!({
            "fields": body.fields(),
            "files": body.files().values().map(|f| f.file_name()).collect::<Vec<_>>(),
        }))
        .with_status(StatusCode::OK),
        Err(err) => Response::json(json!({"error": err.to_string()}))
            .with_status(StatusCode::BAD_REQUEST),
    }
}

async fn default_options(_ctx: Arc<RequestContext>) -> Response {
    Response::none()
        .with_status(StatusCode::NO_CONTENT)
        .with_header(
            HeaderName::from_static("allow"),
            HeaderValue::from_static("GET, POST, OPTIONS"),
        )
}
