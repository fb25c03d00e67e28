use axum::Router;
use axum::routing::get;
use tracking::store::ParcelStore;

use crate::state::AppState;

pub mod parcels;
pub mod ws;

pub fn router<S: ParcelStore>(state: AppState<S>) -> Router {
    Router::new()
        .merge(parcels::router())
        .route("/ws", get(ws::subscribe::<S>))
        .route("/health", get(health))
        .with_state(state)
}

async fn health() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({ "status": "ok" }))
}
