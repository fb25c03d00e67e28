use time::PrimitiveDateTime;
use uuid::Uuid;

use crate::entities::parcel::{GeoPoint, ParcelStatus};

/// One append-only entry in a parcel's tracking history. `id` is assigned by the
/// store and orders entries of the same parcel.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct TrackingEvent {
    pub id: i64,
    pub parcel_id: Uuid,
    pub status: ParcelStatus,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub location_name: Option<String>,
    pub notes: Option<String>,
    pub updated_by: Uuid,
    pub created_at: PrimitiveDateTime,
}

impl TrackingEvent {
    pub fn point(&self) -> Option<GeoPoint> {
        GeoPoint::from_columns(self.latitude, self.longitude)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewTrackingEvent {
    pub status: ParcelStatus,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub location_name: Option<String>,
    pub notes: Option<String>,
    pub updated_by: Uuid,
    pub created_at: PrimitiveDateTime,
}
