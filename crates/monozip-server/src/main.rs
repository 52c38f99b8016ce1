use std::{env, net::SocketAddr, sync::Arc};

use axum::{Json, Router, extract::State, http::StatusCode, routing::get};
use monozip_core::{
    ArchiveBuilder, ClientRuleService, Config, ZipArchiveBuilder, init_telemetry, open_store,
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

mod api;

#[derive(Clone)]
pub struct AppState {
    pub service: ClientRuleService,
    pub admin_password: Arc<str>,
    pub archiver: Arc<dyn ArchiveBuilder>,
    pub max_upload_bytes: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
    let config = Config::load(&config_path)?;

    let _guard = init_telemetry(&config.app, &config.telemetry)?;

    let store = open_store(&config).await?;
    let service = ClientRuleService::new(store);
    info!(backend = service.backend().as_str(), "client rule store ready");
    if config.admin.password.is_empty() {
        warn!("admin password is empty; rule management requests will be rejected");
    }

    let state = AppState {
        service,
        admin_password: Arc::from(config.admin.password.as_str()),
        archiver: Arc::new(ZipArchiveBuilder),
        max_upload_bytes: config.archive.max_upload_bytes,
    };
    let app = router(state);

    let shutdown = CancellationToken::new();
    let addr = SocketAddr::from(([0, 0, 0, 0], config.app.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("monozip listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .nest("/api", api::router(&state))
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    backend: String,
    store: String,
}

async fn healthz(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let healthy = match state.service.health_check().await {
        Ok(()) => true,
        Err(err) => {
            warn!(error = %err, "client rule store health check failed");
            false
        }
    };

    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(HealthResponse {
            status: if healthy { "healthy" } else { "unhealthy" }.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            backend: state.service.backend().as_str().to_string(),
            store: if healthy { "ok" } else { "unhealthy" }.to_string(),
        }),
    )
}

async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            warn!("received ctrl+c, shutting down");
        }
        _ = terminate => {
            warn!("received terminate signal, shutting down");
        }
        _ = shutdown.cancelled() => {}
    }

    shutdown.cancel();
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use monozip_core::clients::JsonFileClientRuleStore;
    use monozip_core::{ClientRuleService, ZipArchiveBuilder};
    use tempfile::TempDir;

    use crate::AppState;

    pub const ADMIN_PASSWORD: &str = "letmein";

    /// State backed by a JSON store seeded with the built-in defaults.
    pub fn file_state(dir: &TempDir) -> AppState {
        let store = JsonFileClientRuleStore::new(dir.path().join("clients.json"));
        AppState {
            service: ClientRuleService::new(Arc::new(store)),
            admin_password: Arc::from(ADMIN_PASSWORD),
            archiver: Arc::new(ZipArchiveBuilder),
            max_upload_bytes: 1024,
        }
    }
}
