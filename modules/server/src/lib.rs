#![forbid(clippy::unwrap_used, unsafe_code, clippy::expect_used, clippy::panic)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use auth::entities::db::user_account::{UserAccount, UserRole};
use auth::services::middleware::UserAuthLayer;
use auth::utils::jwt::JwtCodec;
use axum::Router;
use axum::http::{Method, header};
use framework::sqlx::DatabaseProcessor;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracking::store::{MemoryParcelStore, ParcelStore};
use uuid::Uuid;

pub mod config;
pub mod error;
pub mod routes;
pub mod state;
pub mod telemetry;

use config::{CorsOrigins, ServerConfig};
use state::AppState;

/// The full HTTP surface over `state`, with identity, CORS and request tracing.
pub fn app<S: ParcelStore>(state: AppState<S>, codec: Arc<JwtCodec>, origins: &CorsOrigins) -> Router {
    let allow_origin = match origins {
        CorsOrigins::Any => AllowOrigin::any(),
        CorsOrigins::List(list) => AllowOrigin::list(list.iter().cloned()),
    };
    let cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60));

    routes::router(state)
        .layer(UserAuthLayer::new(codec))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

pub async fn run(config: ServerConfig) -> anyhow::Result<()> {
    let codec = Arc::new(JwtCodec::new(config.jwt.clone()));
    let app = match config.database_url.as_deref() {
        Some(url) => {
            info!("Connecting to PostgreSQL...");
            let db = DatabaseProcessor::connect(url, config.database_max_connections)
                .await
                .context("Failed to connect to the database")?;
            tracking::MIGRATOR
                .run(db.db())
                .await
                .context("Failed to apply migrations")?;
            info!("Migrations applied");
            app(AppState::new(Arc::new(db)), codec, &config.cors_allowed_origins)
        }
        None => {
            warn!("DATABASE_URL not set, running on the in-memory store");
            let store = Arc::new(MemoryParcelStore::new());
            seed_demo_users(&store, &codec)?;
            app(AppState::new(store), codec, &config.cors_allowed_origins)
        }
    };

    let address = SocketAddr::new(config.bind_addr, config.port);
    let listener = TcpListener::bind(address)
        .await
        .with_context(|| format!("Failed to bind {address}"))?;
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shut down");
    Ok(())
}

/// Fixed accounts for debug runs. Their tokens are logged so the API can be tried by hand.
fn seed_demo_users(store: &MemoryParcelStore, codec: &JwtCodec) -> anyhow::Result<()> {
    let now = framework::now_time();
    let demo = [
        (Uuid::from_u128(1), "customer", UserRole::Customer),
        (Uuid::from_u128(2), "driver", UserRole::Driver),
        (Uuid::from_u128(3), "admin", UserRole::Admin),
    ];
    for (id, name, role) in demo {
        store.insert_user(UserAccount {
            id,
            email: format!("{name}@example.com"),
            first_name: "Demo".into(),
            last_name: name.into(),
            role,
            created_at: now,
            updated_at: now,
        })?;
        let token = codec.issue(id).context("Failed to issue demo token")?;
        info!(user_id = %id, role = ?role, token = token.as_ref(), "Demo user ready");
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
