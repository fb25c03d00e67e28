use auth::services::middleware::UserId;
use auth::utils::rbac::Authorized;
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, put};
use axum::{Json, Router};
use kanau::processor::Processor;
use tracking::entities::parcel::{GeoPoint, ParcelStatus};
use tracking::services::lifecycle::{
    AssignDriver, CreateParcel, FindParcelByTrackingCode, ListAllParcels,
    ListAssignedParcels, ListSentParcels, ParcelDetails, ShowParcelStatistics, UnassignDriver,
    UpdateParcelLocation, UpdateParcelStatus,
};
use tracking::services::view::{ParcelStatistics, ParcelView};
use tracking::store::ParcelStore;
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

pub fn router<S: ParcelStore>() -> Router<AppState<S>> {
    Router::new()
        .route("/parcels", get(list_all::<S>).post(create::<S>))
        .route("/parcels/sent", get(list_sent::<S>))
        .route("/parcels/assigned", get(list_assigned::<S>))
        .route("/parcels/statistics", get(statistics::<S>))
        .route("/parcels/tracking/{code}", get(find_by_tracking_code::<S>))
        .route("/parcels/{id}", get(find_by_id::<S>))
        .route("/parcels/{id}/status", put(update_status::<S>))
        .route("/parcels/{id}/location", put(update_location::<S>))
        .route(
            "/parcels/{id}/assign-driver/{driver_id}",
            put(assign_driver::<S>),
        )
        .route("/parcels/{id}/driver", delete(unassign_driver::<S>))
}

async fn create<S: ParcelStore>(
    State(state): State<AppState<S>>,
    UserId(user_id): UserId,
    body: Result<Json<ParcelDetails>, JsonRejection>,
) -> Result<(StatusCode, Json<ParcelView>), ApiError> {
    let Json(details) = body?;
    let Authorized { operation, .. } = state
        .authorize(
            user_id,
            CreateParcel {
                sender_id: user_id,
                details,
            },
        )
        .await?;
    let view = state.service.process(operation).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

async fn list_all<S: ParcelStore>(
    State(state): State<AppState<S>>,
    UserId(user_id): UserId,
) -> Result<Json<Vec<ParcelView>>, ApiError> {
    let Authorized { operation, .. } = state.authorize(user_id, ListAllParcels).await?;
    Ok(Json(state.service.process(operation).await?))
}

async fn list_sent<S: ParcelStore>(
    State(state): State<AppState<S>>,
    UserId(user_id): UserId,
) -> Result<Json<Vec<ParcelView>>, ApiError> {
    let Authorized { operation, .. } = state
        .authorize(user_id, ListSentParcels { sender_id: user_id })
        .await?;
    Ok(Json(state.service.process(operation).await?))
}

async fn list_assigned<S: ParcelStore>(
    State(state): State<AppState<S>>,
    UserId(user_id): UserId,
) -> Result<Json<Vec<ParcelView>>, ApiError> {
    let Authorized { operation, .. } = state
        .authorize(user_id, ListAssignedParcels { driver_id: user_id })
        .await?;
    Ok(Json(state.service.process(operation).await?))
}

async fn statistics<S: ParcelStore>(
    State(state): State<AppState<S>>,
    UserId(user_id): UserId,
) -> Result<Json<ParcelStatistics>, ApiError> {
    let Authorized { operation, .. } = state.authorize(user_id, ShowParcelStatistics).await?;
    Ok(Json(state.service.process(operation).await?))
}

async fn find_by_tracking_code<S: ParcelStore>(
    State(state): State<AppState<S>>,
    Path(tracking_code): Path<String>,
) -> Result<Json<ParcelView>, ApiError> {
    let view = state
        .service
        .process(FindParcelByTrackingCode { tracking_code })
        .await?;
    Ok(Json(view))
}

async fn find_by_id<S: ParcelStore>(
    State(state): State<AppState<S>>,
    UserId(user_id): UserId,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<ParcelView>, ApiError> {
    let Path(parcel_id) = path?;
    let view = state.find_visible_parcel(user_id, parcel_id).await?;
    Ok(Json(view))
}

#[derive(Debug, serde::Deserialize)]
struct StatusUpdate {
    status: ParcelStatus,
    #[serde(default, alias = "note")]
    notes: Option<String>,
}

async fn update_status<S: ParcelStore>(
    State(state): State<AppState<S>>,
    UserId(user_id): UserId,
    path: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<StatusUpdate>, JsonRejection>,
) -> Result<Json<ParcelView>, ApiError> {
    let Path(parcel_id) = path?;
    let Json(update) = body?;
    let Authorized { operation, .. } = state
        .authorize(
            user_id,
            UpdateParcelStatus {
                parcel_id,
                status: update.status,
                note: update.notes,
                actor_id: user_id,
            },
        )
        .await?;
    Ok(Json(state.service.process(operation).await?))
}

#[derive(Debug, serde::Deserialize)]
struct LocationUpdate {
    latitude: f64,
    longitude: f64,
    location_name: String,
}

async fn update_location<S: ParcelStore>(
    State(state): State<AppState<S>>,
    UserId(user_id): UserId,
    path: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<LocationUpdate>, JsonRejection>,
) -> Result<Json<ParcelView>, ApiError> {
    let Path(parcel_id) = path?;
    let Json(update) = body?;
    let Authorized { operation, .. } = state
        .authorize(
            user_id,
            UpdateParcelLocation {
                parcel_id,
                location: GeoPoint {
                    latitude: update.latitude,
                    longitude: update.longitude,
                },
                location_name: update.location_name,
                actor_id: user_id,
            },
        )
        .await?;
    Ok(Json(state.service.process(operation).await?))
}

async fn assign_driver<S: ParcelStore>(
    State(state): State<AppState<S>>,
    UserId(user_id): UserId,
    path: Result<Path<(Uuid, Uuid)>, PathRejection>,
) -> Result<Json<ParcelView>, ApiError> {
    let Path((parcel_id, driver_id)) = path?;
    let Authorized { operation, .. } = state
        .authorize(
            user_id,
            AssignDriver {
                parcel_id,
                driver_id,
                actor_id: user_id,
            },
        )
        .await?;
    Ok(Json(state.service.process(operation).await?))
}

async fn unassign_driver<S: ParcelStore>(
    State(state): State<AppState<S>>,
    UserId(user_id): UserId,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<ParcelView>, ApiError> {
    let Path(parcel_id) = path?;
    let Authorized { operation, .. } = state
        .authorize(
            user_id,
            UnassignDriver {
                parcel_id,
                actor_id: user_id,
            },
        )
        .await?;
    Ok(Json(state.service.process(operation).await?))
}
