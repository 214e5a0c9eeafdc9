//! Axum HTTP server.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::get;
use axum::{middleware, Json, Router};
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use timedial_core::protocol::HealthResponse;

use crate::state::GatewayState;
use crate::{api, rate_limit};

/// All routes: `/health`, the rate-limited `/api/*` routes, and the built
/// front-end as the fallback when its directory exists.
pub fn build_router(state: Arc<GatewayState>) -> Router {
    let api = api::router().route_layer(middleware::from_fn_with_state(
        state.clone(),
        rate_limit::limit_requests,
    ));

    let mut app = Router::new().route("/health", get(health)).merge(api);

    #[cfg(feature = "metrics")]
    {
        match crate::metrics::install_prometheus_recorder() {
            Ok(handle) => {
                app = app.route("/metrics", get(move || std::future::ready(handle.render())));
            }
            Err(e) => warn!(error = %e, "Prometheus recorder not installed"),
        }
        app = app.layer(middleware::from_fn(crate::metrics::track_requests));
    }

    let static_dir = state.config.static_dir();
    if static_dir.is_dir() {
        info!(dir = %static_dir.display(), "Serving front-end");
        let index = ServeFile::new(static_dir.join("index.html"));
        app = app.fallback_service(ServeDir::new(&static_dir).fallback(index));
    }

    app.layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind to the configured address and serve until Ctrl+C.
pub async fn start_gateway(state: Arc<GatewayState>, port: u16) -> anyhow::Result<()> {
    let addr = format!("{}:{port}", state.config.gateway_bind());
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Gateway listening on {addr}");
    serve(listener, state, shutdown_signal()).await
}

/// Serve on an already bound listener until `shutdown` resolves.
pub async fn serve(
    listener: tokio::net::TcpListener,
    state: Arc<GatewayState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = build_router(state);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await?;
    Ok(())
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        version: env!("CARGO_PKG_VERSION").into(),
    })
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    }
}
