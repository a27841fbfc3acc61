use std::{net::SocketAddr, sync::Arc};

use axum::http::{header, HeaderValue, Method};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use landing_cms_api::{
    build_router,
    config::Config,
    db::{self, accounts::PgAccountStore, audit_log::PgAuditStore, refresh_tokens::{PgRefreshTokenStore, RefreshTokenStore}},
    AppState,
};

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,tower_http=info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .allow_credentials(true)
        .allow_origin(AllowOrigin::list(origins))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let config = Arc::new(Config::from_env()?);
    init_tracing(config.log_json);

    let pool = db::create_pool(&config.database_url).await?;
    db::run_migrations(&pool).await?;
    info!("Database connected and migrations applied");

    let refresh_tokens = Arc::new(PgRefreshTokenStore::new(pool.clone()));
    match refresh_tokens.delete_expired().await {
        Ok(n) => info!(deleted = n, "expired refresh tokens purged"),
        Err(e) => tracing::warn!("failed to purge expired refresh tokens: {e:#}"),
    }

    let state = AppState::new(
        pool.clone(),
        config.clone(),
        Arc::new(PgAccountStore::new(pool.clone())),
        refresh_tokens,
        Arc::new(PgAuditStore::new(pool)),
    );
    let audit = state.audit.clone();

    let app = build_router(state).layer(cors_layer(&config.cors_origins));

    let addr = format!("{}:{}", config.host, config.port);
    info!("landing CMS API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    audit.shutdown().await;
    info!("audit log drained, exiting");
    Ok(())
}
