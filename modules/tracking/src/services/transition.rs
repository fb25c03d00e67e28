use crate::TrackingError;
use crate::entities::parcel::ParcelStatus;

impl ParcelStatus {
    /// Statuses reachable from `self` in one step.
    pub fn allowed_next(self) -> &'static [ParcelStatus] {
        use ParcelStatus::*;
        match self {
            Pending => &[PickedUp, Cancelled],
            PickedUp => &[InTransit, Cancelled],
            InTransit => &[OutForDelivery, Cancelled],
            OutForDelivery => &[Delivered, Cancelled],
            Delivered | Cancelled => &[],
        }
    }

    pub fn is_terminal(self) -> bool {
        self.allowed_next().is_empty()
    }

    pub fn can_transition_to(self, next: ParcelStatus) -> bool {
        self.allowed_next().contains(&next)
    }
}

pub fn validate_transition(from: ParcelStatus, to: ParcelStatus) -> Result<(), TrackingError> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(TrackingError::InvalidTransition { from, to })
    }
}
