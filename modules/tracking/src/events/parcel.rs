use std::sync::Arc;

use uuid::Uuid;

use crate::services::view::ParcelView;

/// Frames pushed to a live-update subscriber.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ParcelEvent {
    ParcelUpdated { data: Arc<ParcelView> },
    ParcelSnapshot { data: Arc<ParcelView> },
    Joined { parcel_id: Uuid },
    Left { parcel_id: Uuid },
    Error { message: String },
}

/// Frames sent by a live-update subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParcelCommand {
    #[serde(alias = "joinParcelRoom")]
    JoinParcelRoom {
        #[serde(alias = "parcelId")]
        parcel_id: Uuid,
    },
    #[serde(alias = "leaveParcelRoom")]
    LeaveParcelRoom {
        #[serde(alias = "parcelId")]
        parcel_id: Uuid,
    },
    #[serde(alias = "trackParcel")]
    TrackParcel {
        #[serde(alias = "parcelId")]
        parcel_id: Uuid,
    },
}

impl ParcelCommand {
    pub fn parcel_id(&self) -> Uuid {
        match *self {
            ParcelCommand::JoinParcelRoom { parcel_id }
            | ParcelCommand::LeaveParcelRoom { parcel_id }
            | ParcelCommand::TrackParcel { parcel_id } => parcel_id,
        }
    }
}
