use std::future::Future;
use std::sync::Arc;

use auth::entities::db::user_account::UserDirectory;
use time::PrimitiveDateTime;
use uuid::Uuid;

use crate::entities::parcel::{Parcel, ParcelStatus};
use crate::entities::tracking_event::{NewTrackingEvent, TrackingEvent};

pub mod memory;
pub mod postgres;

pub use memory::MemoryParcelStore;

#[derive(Debug, Clone, PartialEq)]
pub struct NewParcel {
    pub id: Uuid,
    pub tracking_code: String,
    pub description: String,
    pub pickup_address: String,
    pub delivery_address: String,
    pub recipient_name: Option<String>,
    pub recipient_phone: Option<String>,
    pub pickup_latitude: Option<f64>,
    pub pickup_longitude: Option<f64>,
    pub delivery_latitude: Option<f64>,
    pub delivery_longitude: Option<f64>,
    pub sender_id: Uuid,
    pub created_at: PrimitiveDateTime,
}

/// The mutable columns of a parcel after a lifecycle step.
#[derive(Debug, Clone, PartialEq)]
pub struct ParcelChange {
    pub parcel_id: Uuid,
    /// `updated_at` as read before the change. The commit is rejected if it moved.
    pub expected_updated_at: PrimitiveDateTime,
    pub status: ParcelStatus,
    pub current_latitude: Option<f64>,
    pub current_longitude: Option<f64>,
    pub driver_id: Option<Uuid>,
    pub updated_at: PrimitiveDateTime,
}

impl ParcelChange {
    /// A change that leaves every column as it is in `parcel`.
    pub fn unchanged(parcel: &Parcel, updated_at: PrimitiveDateTime) -> Self {
        Self {
            parcel_id: parcel.id,
            expected_updated_at: parcel.updated_at,
            status: parcel.status,
            current_latitude: parcel.current_latitude,
            current_longitude: parcel.current_longitude,
            driver_id: parcel.driver_id,
            updated_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParcelLookup {
    Id(Uuid),
    TrackingCode(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParcelFilter {
    All,
    Sender(Uuid),
    Driver(Uuid),
}

/// Persistence for parcels and their ledger.
///
/// `insert_parcel` and `commit_change` write the parcel row and its ledger entry in one
/// transaction. A duplicate tracking code on insert, or a stale `expected_updated_at` on
/// commit, fails with [`framework::Error::Conflict`] and writes nothing.
pub trait ParcelStore: UserDirectory + Send + Sync + 'static {
    fn insert_parcel(
        &self,
        parcel: NewParcel,
        event: NewTrackingEvent,
    ) -> impl Future<Output = Result<Parcel, framework::Error>> + Send;

    fn commit_change(
        &self,
        change: ParcelChange,
        event: NewTrackingEvent,
    ) -> impl Future<Output = Result<Parcel, framework::Error>> + Send;

    fn find_parcel(
        &self,
        lookup: ParcelLookup,
    ) -> impl Future<Output = Result<Option<Parcel>, framework::Error>> + Send;

    /// Newest first.
    fn list_parcels(
        &self,
        filter: ParcelFilter,
    ) -> impl Future<Output = Result<Vec<Parcel>, framework::Error>> + Send;

    /// Ledger entries of the given parcels, in ledger order.
    fn list_events(
        &self,
        parcel_ids: &[Uuid],
    ) -> impl Future<Output = Result<Vec<TrackingEvent>, framework::Error>> + Send;

    /// Parcel count per status. Statuses without parcels may be omitted.
    fn count_by_status(
        &self,
    ) -> impl Future<Output = Result<Vec<(ParcelStatus, i64)>, framework::Error>> + Send;
}

impl<T: ParcelStore> ParcelStore for Arc<T> {
    fn insert_parcel(
        &self,
        parcel: NewParcel,
        event: NewTrackingEvent,
    ) -> impl Future<Output = Result<Parcel, framework::Error>> + Send {
        (**self).insert_parcel(parcel, event)
    }

    fn commit_change(
        &self,
        change: ParcelChange,
        event: NewTrackingEvent,
    ) -> impl Future<Output = Result<Parcel, framework::Error>> + Send {
        (**self).commit_change(change, event)
    }

    fn find_parcel(
        &self,
        lookup: ParcelLookup,
    ) -> impl Future<Output = Result<Option<Parcel>, framework::Error>> + Send {
        (**self).find_parcel(lookup)
    }

    fn list_parcels(
        &self,
        filter: ParcelFilter,
    ) -> impl Future<Output = Result<Vec<Parcel>, framework::Error>> + Send {
        (**self).list_parcels(filter)
    }

    fn list_events(
        &self,
        parcel_ids: &[Uuid],
    ) -> impl Future<Output = Result<Vec<TrackingEvent>, framework::Error>> + Send {
        (**self).list_events(parcel_ids)
    }

    fn count_by_status(
        &self,
    ) -> impl Future<Output = Result<Vec<(ParcelStatus, i64)>, framework::Error>> + Send {
        (**self).count_by_status()
    }
}
