use uuid::Uuid;

use crate::entities::parcel::ParcelStatus;

#[derive(Debug, thiserror::Error)]
pub enum TrackingError {
    #[error("Parcel {0} not found")]
    ParcelNotFound(String),
    #[error("Sender {0} not found")]
    SenderNotFound(Uuid),
    #[error("Acting user {0} not found")]
    ActorNotFound(Uuid),
    #[error("Driver {0} not found")]
    DriverNotFound(Uuid),
    #[error("Driver {0} is already assigned to this parcel")]
    AlreadyAssigned(Uuid),
    #[error("No driver is assigned to this parcel")]
    NoDriverAssigned,
    #[error("Cannot transition from {from} to {to}")]
    InvalidTransition { from: ParcelStatus, to: ParcelStatus },
    #[error("Coordinates out of range")]
    InvalidCoordinates,
    #[error("Invalid parcel details: {0}")]
    InvalidDetails(&'static str),
    #[error("Could not allocate a unique tracking code")]
    TrackingCodeConflict,
    #[error("Parcel was modified concurrently")]
    ConcurrentModification,
    #[error("Storage error: {0}")]
    Storage(#[from] framework::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    InvalidTransition,
    Validation,
    Internal,
}

impl TrackingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TrackingError::ParcelNotFound(_)
            | TrackingError::SenderNotFound(_)
            | TrackingError::ActorNotFound(_)
            | TrackingError::DriverNotFound(_) => ErrorKind::NotFound,
            TrackingError::AlreadyAssigned(_)
            | TrackingError::TrackingCodeConflict
            | TrackingError::ConcurrentModification => ErrorKind::Conflict,
            TrackingError::InvalidTransition { .. } | TrackingError::NoDriverAssigned => {
                ErrorKind::InvalidTransition
            }
            TrackingError::InvalidCoordinates | TrackingError::InvalidDetails(_) => {
                ErrorKind::Validation
            }
            TrackingError::Storage(framework::Error::NotFound) => ErrorKind::NotFound,
            TrackingError::Storage(framework::Error::Conflict) => ErrorKind::Conflict,
            TrackingError::Storage(framework::Error::InvalidInput) => ErrorKind::Validation,
            TrackingError::Storage(_) => ErrorKind::Internal,
        }
    }
}
