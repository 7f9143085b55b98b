//! api-server: HTTP API for the link shortener.
//!
//! One binary for both deployments:
//! - Local: `axum::serve` on `PORT` (default 3001).
//! - AWS Lambda: when `AWS_LAMBDA_RUNTIME_API` is set the same router is driven
//!   by `lambda_http` (API Gateway HTTP API / function URL events).
//!
//! Run:
//! ```bash
//! # in-memory storage, pretty logs
//! API_URL=http://localhost:3001 STORAGE_PROVIDER=memory cargo run -p api-server
//!
//! # DynamoDB (credentials from the default AWS provider chain)
//! API_URL=https://s.example.com TABLE_NAME=links cargo run -p api-server
//! ```
//!
//! Configuration: See `config.rs` for all environment variables.

mod config;
mod error;
mod repo;
mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{header, HeaderName, Method};
use axum::Router;
use domain::service::LinkService;
use domain::SystemClock;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::{Config, CorsOrigins, LogFormat};
use crate::repo::AnyRepo;
use crate::routes::{AppState, API_KEY_HEADER};

#[tokio::main]
async fn main() -> Result<(), lambda_http::Error> {
    // Load and validate config first (fail fast on misconfiguration)
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    init_tracing(&cfg);
    cfg.warn_if_insecure();

    let repo = match AnyRepo::from_config(&cfg).await {
        Ok(r) => r,
        Err(e) => {
            error!(field = e.field, err = %e, "repository init failed");
            std::process::exit(1);
        }
    };
    let storage = repo.kind();

    let mut svc = LinkService::new(repo, SystemClock, cfg.api_url.clone());
    if let Some(url) = &cfg.fallback_url {
        svc = svc.with_fallback_url(url.clone());
    }
    info!(
        storage,
        api_url = %cfg.api_url,
        fallback_url = %svc.fallback_url(),
        "link service ready"
    );

    let state = AppState {
        svc: Arc::new(svc),
        admin_api_key: cfg.admin_api_key.as_deref().map(Arc::from),
    };
    let app = build_app(state, &cfg.cors_origins);

    if cfg.lambda {
        info!("running under the AWS Lambda runtime");
        return lambda_http::run(app).await;
    }

    let addr: SocketAddr = ([0, 0, 0, 0], cfg.port).into();
    info!(%addr, "api-server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// Router plus request-id, tracing and CORS layers.
fn build_app(state: AppState, cors_origins: &CorsOrigins) -> Router {
    // Request ID header name
    let x_request_id = HeaderName::from_static("x-request-id");

    routes::router(state)
        .layer(PropagateRequestIdLayer::new(x_request_id.clone()))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-");
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id,
                )
            }),
        )
        .layer(SetRequestIdLayer::new(x_request_id, MakeRequestUuid))
        .layer(cors_layer(cors_origins))
}

fn cors_layer(origins: &CorsOrigins) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, HeaderName::from_static(API_KEY_HEADER)]);
    match origins {
        CorsOrigins::Any => layer.allow_origin(Any),
        CorsOrigins::List(list) => layer.allow_origin(AllowOrigin::list(list.iter().cloned())),
    }
}

fn init_tracing(cfg: &Config) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);
    match cfg.log_format {
        LogFormat::Json => {
            registry
                .with(
                    fmt::layer()
                        .json()
                        .with_target(true)
                        .with_timer(fmt::time::SystemTime)
                        .with_writer(std::io::stdout),
                )
                .init();
        }
        LogFormat::Pretty => {
            registry
                .with(
                    fmt::layer()
                        .pretty()
                        .with_target(true)
                        .with_writer(std::io::stdout),
                )
                .init();
        }
    }
}
