mod config;
mod context;
mod database;
mod db;
mod error;
mod middleware;
mod models;
mod routes;
mod service;

#[cfg(test)]
pub mod test_utils;

pub use config::Config;
pub use context::AppContext;
pub use error::app_error::AppError;

use crate::middleware::RequestLogger;
use crate::middleware::rate_limit::RateLimiter;
use crate::routes as app_routes;
use rocket::data::{ByteUnit, Limits, ToByteUnit};
use rocket::fairing::AdHoc;
use rocket::{Build, Rocket, catchers, http::Method};
use rocket_cors::{AllowedOrigins, CorsOptions};
use rocket_okapi::swagger_ui::{SwaggerUIConfig, make_swagger_ui};
use rocket_okapi::{get_openapi_route, okapi::merge::marge_spec_list};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const DEFAULT_API_BASE_PATH: &str = "/api";
const FILES_MOUNT_PATH: &str = "/files";

pub fn init_tracing(log_level: &str, json_format: bool) {
    // RUST_LOG takes precedence over the configured level, e.g.
    //   RUST_LOG=info,driftpro::service::session=debug
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let subscriber = tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_line_number(true);

    let result = if json_format { subscriber.json().try_init() } else { subscriber.try_init() };
    if let Err(e) = result {
        eprintln!("tracing subscriber already installed: {}", e);
    }
}

fn build_cors(cors_config: &config::CorsConfig) -> Result<CorsOptions, AppError> {
    let is_wildcard = cors_config.allowed_origins.len() == 1 && cors_config.allowed_origins[0] == "*";

    if is_wildcard && cors_config.allow_credentials {
        return Err(AppError::InvalidConfig(
            "wildcard CORS origins (*) cannot be combined with credentials".to_string(),
        ));
    }

    let allowed_origins = if cors_config.allowed_origins.is_empty() {
        AllowedOrigins::some_exact::<&str>(&[])
    } else if is_wildcard {
        AllowedOrigins::all()
    } else {
        AllowedOrigins::some_exact(&cors_config.allowed_origins.iter().map(String::as_str).collect::<Vec<_>>())
    };

    Ok(CorsOptions {
        allowed_origins,
        allowed_methods: vec![Method::Get, Method::Post, Method::Put, Method::Delete, Method::Options, Method::Head]
            .into_iter()
            .map(From::from)
            .collect(),
        allowed_headers: rocket_cors::AllowedHeaders::some(&["Content-Type", "Accept"]),
        allow_credentials: cors_config.allow_credentials,
        ..Default::default()
    })
}

fn get_swagger_config(openapi_url: &str) -> SwaggerUIConfig {
    SwaggerUIConfig {
        url: openapi_url.to_string(),
        ..Default::default()
    }
}

fn normalize_base_path(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return DEFAULT_API_BASE_PATH.to_string();
    }

    let mut normalized = if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    };

    while normalized.ends_with('/') && normalized.len() > 1 {
        normalized.pop();
    }

    normalized
}

fn join_base_path(base_path: &str, path: &str) -> String {
    let base = base_path.trim_end_matches('/');
    let suffix = path.trim_start_matches('/');

    if base.is_empty() {
        format!("/{}", suffix)
    } else {
        format!("{}/{}", base, suffix)
    }
}

struct RouteSpec {
    path: &'static str,
    routes: Vec<rocket::Route>,
    openapi: rocket_okapi::okapi::openapi3::OpenApi,
}

fn collect_route_specs() -> Vec<RouteSpec> {
    let (health_routes, health_openapi) = app_routes::health::routes();
    let (session_routes, session_openapi) = app_routes::session::routes();
    let (company_routes, company_openapi) = app_routes::company::routes();
    let (deviation_routes, deviation_openapi) = app_routes::deviation::routes();
    let (document_routes, document_openapi) = app_routes::document::routes();

    vec![
        RouteSpec {
            path: "/health",
            routes: health_routes,
            openapi: health_openapi,
        },
        RouteSpec {
            path: "/session",
            routes: session_routes,
            openapi: session_openapi,
        },
        RouteSpec {
            path: "/companies",
            routes: company_routes,
            openapi: company_openapi,
        },
        RouteSpec {
            path: "/deviations",
            routes: deviation_routes,
            openapi: deviation_openapi,
        },
        RouteSpec {
            path: "/documents",
            routes: document_routes,
            openapi: document_openapi,
        },
    ]
}

fn mount_api_routes(mut rocket: Rocket<Build>, base_path: &str, enable_swagger: bool) -> Result<Rocket<Build>, AppError> {
    let route_specs = collect_route_specs();

    if !enable_swagger {
        for spec in route_specs {
            rocket = rocket.mount(join_base_path(base_path, spec.path), spec.routes);
        }
        return Ok(rocket);
    }

    let mut openapi_list = Vec::new();
    for spec in route_specs {
        rocket = rocket.mount(join_base_path(base_path, spec.path), spec.routes);
        openapi_list.push((spec.path, spec.openapi));
    }

    let openapi_docs = marge_spec_list(&openapi_list).map_err(|e| AppError::InvalidConfig(format!("could not merge OpenAPI spec: {}", e)))?;

    let settings = rocket_okapi::settings::OpenApiSettings::default();
    rocket = rocket.mount(base_path, vec![get_openapi_route(openapi_docs, &settings)]);

    let docs_path = join_base_path(base_path, "docs");
    let openapi_url = join_base_path(base_path, "openapi.json");
    Ok(rocket.mount(docs_path, make_swagger_ui(&get_swagger_config(&openapi_url))))
}

/// JSON bodies carry uploads as base64, so the limit covers the encoded size
/// of the largest file plus room for the other fields.
fn json_body_limit(max_upload_mb: u64) -> ByteUnit {
    let encoded = max_upload_mb.saturating_mul(1024 * 1024).div_ceil(3).saturating_mul(4);
    encoded.saturating_add(64 * 1024).bytes()
}

fn stage_rate_limiter(rate_limit_config: config::RateLimitConfig) -> AdHoc {
    AdHoc::on_ignite("Rate Limiter", move |rocket| {
        let limiter = Arc::new(RateLimiter::new(&rate_limit_config));
        Arc::clone(&limiter).spawn_cleanup_task();

        Box::pin(async move { rocket.manage(limiter) })
    })
}

fn stage_session_shutdown() -> AdHoc {
    AdHoc::on_shutdown("Session Synchronizer", |rocket| {
        Box::pin(async move {
            if let Some(ctx) = rocket.state::<Arc<AppContext>>() {
                ctx.shutdown().await;
                info!("session synchronizer stopped");
            }
        })
    })
}

/// Assembles the daemon around an already initialized context.
pub fn build_rocket(config: Config, ctx: Arc<AppContext>) -> Result<Rocket<Build>, AppError> {
    let cors = build_cors(&config.cors)?.to_cors().map_err(|e| {
        error!(error = %e, "failed to create CORS fairing");
        AppError::InvalidConfig(format!("CORS: {}", e))
    })?;

    let figment = rocket::Config::figment()
        .merge(("port", config.server.port))
        .merge(("address", config.server.address.clone()))
        .merge(("limits", Limits::default().limit("json", json_body_limit(config.storage.max_upload_mb))));

    let base_path = normalize_base_path(&config.api.base_path);

    let mut rocket = rocket::custom(figment)
        .manage(ctx)
        .attach(stage_rate_limiter(config.rate_limit.clone()))
        .attach(stage_session_shutdown())
        .attach(cors)
        .attach(RequestLogger)
        .mount(FILES_MOUNT_PATH, app_routes::files::routes());

    rocket = mount_api_routes(rocket, &base_path, config.api.enable_swagger)?;

    Ok(rocket.register(
        base_path.as_str(),
        catchers![app_routes::error::not_found, app_routes::error::conflict, app_routes::error::too_many_requests],
    ))
}
