use std::sync::Arc;

use auth::utils::rbac::{AuthenticatedOperation, AuthorizationLayer, Authorized, RoleGated};
use kanau::processor::Processor;
use tracking::services::broadcaster::ParcelBroadcaster;
use tracking::services::lifecycle::{FindParcelById, ParcelLifecycleService};
use tracking::services::view::ParcelView;
use tracking::store::ParcelStore;
use uuid::Uuid;

use crate::error::ApiError;

pub struct AppState<S> {
    pub service: ParcelLifecycleService<S>,
    pub authorization: AuthorizationLayer<Arc<S>>,
    pub broadcaster: ParcelBroadcaster,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
            authorization: self.authorization.clone(),
            broadcaster: self.broadcaster.clone(),
        }
    }
}

impl<S: ParcelStore> AppState<S> {
    pub fn new(store: Arc<S>) -> Self {
        let broadcaster = ParcelBroadcaster::new();
        let service = ParcelLifecycleService::new(store.clone())
            .with_notifier(Arc::new(broadcaster.clone()));
        Self {
            service,
            authorization: AuthorizationLayer::new(store),
            broadcaster,
        }
    }

    /// Resolve the caller and check `operation`'s role policy.
    pub async fn authorize<Op>(
        &self,
        user_id: Uuid,
        operation: Op,
    ) -> Result<Authorized<Op>, ApiError>
    where
        Op: RoleGated + Send,
    {
        Ok(self
            .authorization
            .process(AuthenticatedOperation { user_id, operation })
            .await?)
    }

    /// Load a parcel by id for `user_id`. Customers see only what they sent and drivers
    /// only what they carry.
    pub async fn find_visible_parcel(
        &self,
        user_id: Uuid,
        parcel_id: Uuid,
    ) -> Result<ParcelView, ApiError> {
        let Authorized { actor, operation } =
            self.authorize(user_id, FindParcelById { parcel_id }).await?;
        let view = self.service.process(operation).await?;
        if !view.is_visible_to(&actor) {
            return Err(ApiError::forbidden());
        }
        Ok(view)
    }
}
