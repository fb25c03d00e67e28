use std::sync::Arc;

use auth::entities::db::user_account::{UserAccount, UserDirectory, UserRole};
use auth::role_gated;
use framework::now_time;
use kanau::processor::Processor;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::TrackingError;
use crate::entities::parcel::{GeoPoint, Parcel, ParcelStatus};
use crate::entities::tracking_event::NewTrackingEvent;
use crate::services::broadcaster::{NoopNotifier, ParcelNotifier};
use crate::services::parcel_lock::ParcelLocks;
use crate::services::tracking_code::{generate_tracking_code, normalize_tracking_code};
use crate::services::transition::validate_transition;
use crate::services::view::{ParcelStatistics, ParcelView, assemble_views};
use crate::store::{NewParcel, ParcelChange, ParcelFilter, ParcelLookup, ParcelStore};

pub const MAX_TRACKING_CODE_ATTEMPTS: usize = 5;
pub const PARCEL_CREATED_NOTE: &str = "Parcel created and awaiting pickup";

type TrackingCodeSource = Arc<dyn Fn() -> String + Send + Sync>;

/// Owns every mutation of parcels and their ledger.
pub struct ParcelLifecycleService<S> {
    store: Arc<S>,
    notifier: Arc<dyn ParcelNotifier>,
    locks: Arc<ParcelLocks>,
    tracking_codes: TrackingCodeSource,
}

impl<S> Clone for ParcelLifecycleService<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            notifier: self.notifier.clone(),
            locks: self.locks.clone(),
            tracking_codes: self.tracking_codes.clone(),
        }
    }
}

impl<S: ParcelStore> ParcelLifecycleService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            notifier: Arc::new(NoopNotifier),
            locks: Arc::new(ParcelLocks::new()),
            tracking_codes: Arc::new(generate_tracking_code),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn ParcelNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_tracking_codes(
        mut self,
        source: impl Fn() -> String + Send + Sync + 'static,
    ) -> Self {
        self.tracking_codes = Arc::new(source);
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn locks(&self) -> &ParcelLocks {
        &self.locks
    }

    async fn view(&self, parcel: Parcel) -> Result<ParcelView, TrackingError> {
        let id = parcel.id;
        assemble_views(self.store.as_ref(), vec![parcel])
            .await?
            .pop()
            .ok_or_else(|| TrackingError::ParcelNotFound(id.to_string()))
    }

    /// View of a parcel whose write has already committed. A failed enrichment is logged
    /// and falls back to the bare record, so callers never see an error for a write that
    /// happened.
    async fn committed_view(&self, parcel: Parcel) -> ParcelView {
        let fallback = parcel.clone();
        match self.view(parcel).await {
            Ok(view) => view,
            Err(e) => {
                warn!(parcel_id = %fallback.id, error = %e, "Could not assemble view after commit");
                ParcelView::bare(fallback)
            }
        }
    }

    async fn load_parcel(&self, parcel_id: Uuid) -> Result<Parcel, TrackingError> {
        self.store
            .find_parcel(ParcelLookup::Id(parcel_id))
            .await?
            .ok_or_else(|| TrackingError::ParcelNotFound(parcel_id.to_string()))
    }

    async fn load_actor(&self, actor_id: Uuid) -> Result<UserAccount, TrackingError> {
        self.store
            .find_user(actor_id)
            .await?
            .ok_or(TrackingError::ActorNotFound(actor_id))
    }

    /// Persist one lifecycle step, then notify. The caller holds the parcel's lock.
    async fn commit(
        &self,
        change: ParcelChange,
        event: NewTrackingEvent,
    ) -> Result<ParcelView, TrackingError> {
        let parcel_id = change.parcel_id;
        let updated = self
            .store
            .commit_change(change, event)
            .await
            .map_err(|e| match e {
                framework::Error::Conflict => TrackingError::ConcurrentModification,
                framework::Error::NotFound => TrackingError::ParcelNotFound(parcel_id.to_string()),
                other => TrackingError::Storage(other),
            })?;
        let view = self.committed_view(updated).await;
        self.notifier.parcel_updated(&view);
        Ok(view)
    }
}

/// Booking form for a new parcel.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ParcelDetails {
    #[serde(default)]
    pub description: Option<String>,
    pub pickup_address: String,
    pub delivery_address: String,
    #[serde(default)]
    pub recipient_name: Option<String>,
    #[serde(default)]
    pub recipient_phone: Option<String>,
    #[serde(default)]
    pub pickup_location: Option<GeoPoint>,
    #[serde(default)]
    pub delivery_location: Option<GeoPoint>,
}

impl ParcelDetails {
    pub fn validate(&self) -> Result<(), TrackingError> {
        if self.pickup_address.trim().is_empty() {
            return Err(TrackingError::InvalidDetails("pickup address is required"));
        }
        if self.delivery_address.trim().is_empty() {
            return Err(TrackingError::InvalidDetails("delivery address is required"));
        }
        let points = [self.pickup_location, self.delivery_location];
        if points.iter().flatten().any(|point| !point.is_valid()) {
            return Err(TrackingError::InvalidCoordinates);
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct CreateParcel {
    pub sender_id: Uuid,
    pub details: ParcelDetails,
}

role_gated! {CreateParcel => [UserRole::Customer, UserRole::Admin]}

impl<S: ParcelStore> Processor<CreateParcel> for ParcelLifecycleService<S> {
    type Output = ParcelView;
    type Error = TrackingError;
    #[instrument(skip_all, err, fields(sender_id = %input.sender_id))]
    async fn process(&self, input: CreateParcel) -> Result<ParcelView, TrackingError> {
        let CreateParcel { sender_id, details } = input;
        details.validate()?;
        let sender = self
            .store
            .find_user(sender_id)
            .await?
            .ok_or(TrackingError::SenderNotFound(sender_id))?;

        for attempt in 1..=MAX_TRACKING_CODE_ATTEMPTS {
            let now = now_time();
            let parcel = NewParcel {
                id: Uuid::new_v4(),
                tracking_code: (self.tracking_codes)(),
                description: details.description.clone().unwrap_or_default(),
                pickup_address: details.pickup_address.clone(),
                delivery_address: details.delivery_address.clone(),
                recipient_name: details.recipient_name.clone(),
                recipient_phone: details.recipient_phone.clone(),
                pickup_latitude: details.pickup_location.map(|p| p.latitude),
                pickup_longitude: details.pickup_location.map(|p| p.longitude),
                delivery_latitude: details.delivery_location.map(|p| p.latitude),
                delivery_longitude: details.delivery_location.map(|p| p.longitude),
                sender_id: sender.id,
                created_at: now,
            };
            let event = NewTrackingEvent {
                status: ParcelStatus::Pending,
                latitude: None,
                longitude: None,
                location_name: None,
                notes: Some(PARCEL_CREATED_NOTE.to_string()),
                updated_by: sender.id,
                created_at: now,
            };
            match self.store.insert_parcel(parcel, event).await {
                Ok(parcel) => {
                    info!(parcel_id = %parcel.id, tracking_code = %parcel.tracking_code, "Parcel created");
                    let view = self.committed_view(parcel).await;
                    self.notifier.parcel_updated(&view);
                    return Ok(view);
                }
                Err(framework::Error::Conflict) => {
                    warn!(attempt, "Tracking code already taken, generating another");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(TrackingError::TrackingCodeConflict)
    }
}

#[derive(Debug, Clone)]
pub struct UpdateParcelStatus {
    pub parcel_id: Uuid,
    pub status: ParcelStatus,
    pub note: Option<String>,
    pub actor_id: Uuid,
}

role_gated! {UpdateParcelStatus => [UserRole::Driver, UserRole::Admin]}

impl<S: ParcelStore> Processor<UpdateParcelStatus> for ParcelLifecycleService<S> {
    type Output = ParcelView;
    type Error = TrackingError;
    #[instrument(skip_all, err, fields(parcel_id = %input.parcel_id, status = %input.status))]
    async fn process(&self, input: UpdateParcelStatus) -> Result<ParcelView, TrackingError> {
        let _guard = self.locks.lock(input.parcel_id).await;
        let parcel = self.load_parcel(input.parcel_id).await?;
        let actor = self.load_actor(input.actor_id).await?;
        validate_transition(parcel.status, input.status)?;

        let now = now_time();
        let change = ParcelChange {
            status: input.status,
            ..ParcelChange::unchanged(&parcel, now)
        };
        let notes = input
            .note
            .filter(|note| !note.trim().is_empty())
            .unwrap_or_else(|| format!("Status changed to {}", input.status));
        let event = NewTrackingEvent {
            status: input.status,
            latitude: parcel.current_latitude,
            longitude: parcel.current_longitude,
            location_name: None,
            notes: Some(notes),
            updated_by: actor.id,
            created_at: now,
        };
        let view = self.commit(change, event).await?;
        info!(from = %parcel.status, "Parcel status changed");
        Ok(view)
    }
}

#[derive(Debug, Clone)]
pub struct UpdateParcelLocation {
    pub parcel_id: Uuid,
    pub location: GeoPoint,
    pub location_name: String,
    pub actor_id: Uuid,
}

role_gated! {UpdateParcelLocation => [UserRole::Driver, UserRole::Admin]}

impl<S: ParcelStore> Processor<UpdateParcelLocation> for ParcelLifecycleService<S> {
    type Output = ParcelView;
    type Error = TrackingError;
    #[instrument(skip_all, err, fields(parcel_id = %input.parcel_id))]
    async fn process(&self, input: UpdateParcelLocation) -> Result<ParcelView, TrackingError> {
        if !input.location.is_valid() {
            return Err(TrackingError::InvalidCoordinates);
        }
        let _guard = self.locks.lock(input.parcel_id).await;
        let parcel = self.load_parcel(input.parcel_id).await?;
        let actor = self.load_actor(input.actor_id).await?;

        let now = now_time();
        let change = ParcelChange {
            current_latitude: Some(input.location.latitude),
            current_longitude: Some(input.location.longitude),
            ..ParcelChange::unchanged(&parcel, now)
        };
        let event = NewTrackingEvent {
            status: parcel.status,
            latitude: Some(input.location.latitude),
            longitude: Some(input.location.longitude),
            notes: Some(format!("Location updated: {}", input.location_name)),
            location_name: Some(input.location_name),
            updated_by: actor.id,
            created_at: now,
        };
        self.commit(change, event).await
    }
}

#[derive(Debug, Clone)]
pub struct AssignDriver {
    pub parcel_id: Uuid,
    pub driver_id: Uuid,
    pub actor_id: Uuid,
}

role_gated! {AssignDriver => [UserRole::Admin]}

impl<S: ParcelStore> Processor<AssignDriver> for ParcelLifecycleService<S> {
    type Output = ParcelView;
    type Error = TrackingError;
    #[instrument(skip_all, err, fields(parcel_id = %input.parcel_id, driver_id = %input.driver_id))]
    async fn process(&self, input: AssignDriver) -> Result<ParcelView, TrackingError> {
        let _guard = self.locks.lock(input.parcel_id).await;
        let parcel = self.load_parcel(input.parcel_id).await?;
        let driver = self
            .store
            .find_user(input.driver_id)
            .await?
            .filter(|user| user.role == UserRole::Driver)
            .ok_or(TrackingError::DriverNotFound(input.driver_id))?;
        if parcel.driver_id == Some(driver.id) {
            return Err(TrackingError::AlreadyAssigned(driver.id));
        }
        let actor = self.load_actor(input.actor_id).await?;

        let now = now_time();
        let change = ParcelChange {
            driver_id: Some(driver.id),
            ..ParcelChange::unchanged(&parcel, now)
        };
        let event = NewTrackingEvent {
            status: parcel.status,
            latitude: parcel.current_latitude,
            longitude: parcel.current_longitude,
            location_name: None,
            notes: Some(format!("Driver assigned: {}", driver.full_name())),
            updated_by: actor.id,
            created_at: now,
        };
        self.commit(change, event).await
    }
}

#[derive(Debug, Clone)]
pub struct UnassignDriver {
    pub parcel_id: Uuid,
    pub actor_id: Uuid,
}

role_gated! {UnassignDriver => [UserRole::Admin]}

impl<S: ParcelStore> Processor<UnassignDriver> for ParcelLifecycleService<S> {
    type Output = ParcelView;
    type Error = TrackingError;
    #[instrument(skip_all, err, fields(parcel_id = %input.parcel_id))]
    async fn process(&self, input: UnassignDriver) -> Result<ParcelView, TrackingError> {
        let _guard = self.locks.lock(input.parcel_id).await;
        let parcel = self.load_parcel(input.parcel_id).await?;
        let Some(driver_id) = parcel.driver_id else {
            return Err(TrackingError::NoDriverAssigned);
        };
        let actor = self.load_actor(input.actor_id).await?;
        let driver_name = match self.store.find_user(driver_id).await? {
            Some(driver) => driver.full_name(),
            None => driver_id.to_string(),
        };

        let now = now_time();
        let change = ParcelChange {
            driver_id: None,
            ..ParcelChange::unchanged(&parcel, now)
        };
        let event = NewTrackingEvent {
            status: parcel.status,
            latitude: parcel.current_latitude,
            longitude: parcel.current_longitude,
            location_name: None,
            notes: Some(format!("Driver unassigned: {driver_name}")),
            updated_by: actor.id,
            created_at: now,
        };
        self.commit(change, event).await
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FindParcelById {
    pub parcel_id: Uuid,
}

role_gated! {FindParcelById => [UserRole::Customer, UserRole::Driver, UserRole::Admin]}

impl<S: ParcelStore> Processor<FindParcelById> for ParcelLifecycleService<S> {
    type Output = ParcelView;
    type Error = TrackingError;
    #[instrument(skip_all, err, fields(parcel_id = %input.parcel_id))]
    async fn process(&self, input: FindParcelById) -> Result<ParcelView, TrackingError> {
        let parcel = self.load_parcel(input.parcel_id).await?;
        self.view(parcel).await
    }
}

/// Public lookup; no role required.
#[derive(Debug, Clone)]
pub struct FindParcelByTrackingCode {
    pub tracking_code: String,
}

impl<S: ParcelStore> Processor<FindParcelByTrackingCode> for ParcelLifecycleService<S> {
    type Output = ParcelView;
    type Error = TrackingError;
    #[instrument(skip_all, err)]
    async fn process(&self, input: FindParcelByTrackingCode) -> Result<ParcelView, TrackingError> {
        let not_found = || TrackingError::ParcelNotFound(input.tracking_code.clone());
        let code = normalize_tracking_code(&input.tracking_code).ok_or_else(not_found)?;
        let parcel = self
            .store
            .find_parcel(ParcelLookup::TrackingCode(code))
            .await?
            .ok_or_else(not_found)?;
        self.view(parcel).await
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ListAllParcels;

role_gated! {ListAllParcels => [UserRole::Admin]}

#[derive(Debug, Clone, Copy)]
pub struct ListSentParcels {
    pub sender_id: Uuid,
}

role_gated! {ListSentParcels => [UserRole::Customer, UserRole::Admin]}

#[derive(Debug, Clone, Copy)]
pub struct ListAssignedParcels {
    pub driver_id: Uuid,
}

role_gated! {ListAssignedParcels => [UserRole::Driver]}

impl<S: ParcelStore> ParcelLifecycleService<S> {
    async fn list(&self, filter: ParcelFilter) -> Result<Vec<ParcelView>, TrackingError> {
        let parcels = self.store.list_parcels(filter).await?;
        Ok(assemble_views(self.store.as_ref(), parcels).await?)
    }
}

impl<S: ParcelStore> Processor<ListAllParcels> for ParcelLifecycleService<S> {
    type Output = Vec<ParcelView>;
    type Error = TrackingError;
    #[instrument(skip_all, err)]
    async fn process(&self, _: ListAllParcels) -> Result<Vec<ParcelView>, TrackingError> {
        self.list(ParcelFilter::All).await
    }
}

impl<S: ParcelStore> Processor<ListSentParcels> for ParcelLifecycleService<S> {
    type Output = Vec<ParcelView>;
    type Error = TrackingError;
    #[instrument(skip_all, err, fields(sender_id = %input.sender_id))]
    async fn process(&self, input: ListSentParcels) -> Result<Vec<ParcelView>, TrackingError> {
        self.list(ParcelFilter::Sender(input.sender_id)).await
    }
}

impl<S: ParcelStore> Processor<ListAssignedParcels> for ParcelLifecycleService<S> {
    type Output = Vec<ParcelView>;
    type Error = TrackingError;
    #[instrument(skip_all, err, fields(driver_id = %input.driver_id))]
    async fn process(&self, input: ListAssignedParcels) -> Result<Vec<ParcelView>, TrackingError> {
        self.list(ParcelFilter::Driver(input.driver_id)).await
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ShowParcelStatistics;

role_gated! {ShowParcelStatistics => [UserRole::Admin]}

impl<S: ParcelStore> Processor<ShowParcelStatistics> for ParcelLifecycleService<S> {
    type Output = ParcelStatistics;
    type Error = TrackingError;
    #[instrument(skip_all, err)]
    async fn process(&self, _: ShowParcelStatistics) -> Result<ParcelStatistics, TrackingError> {
        let counts = self.store.count_by_status().await?;
        Ok(ParcelStatistics::from_counts(&counts))
    }
}
