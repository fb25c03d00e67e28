use std::collections::HashMap;
use std::iter;

use auth::entities::db::user_account::{UserAccount, UserDirectory, UserRole};
use compact_str::CompactString;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::entities::parcel::{GeoPoint, Parcel, ParcelStatus};
use crate::entities::tracking_event::TrackingEvent;
use crate::store::ParcelStore;

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub first_name: CompactString,
    pub last_name: CompactString,
    pub email: String,
    pub role: UserRole,
}

impl From<&UserAccount> for UserSummary {
    fn from(account: &UserAccount) -> Self {
        Self {
            id: account.id,
            first_name: account.first_name.clone(),
            last_name: account.last_name.clone(),
            email: account.email.clone(),
            role: account.role,
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TrackingEntryView {
    pub id: i64,
    pub status: ParcelStatus,
    pub location: Option<GeoPoint>,
    pub location_name: Option<String>,
    pub notes: Option<String>,
    pub updated_by_id: Uuid,
    pub updated_by: Option<UserSummary>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// A parcel as returned to clients and pushed to subscribers.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ParcelView {
    pub id: Uuid,
    pub tracking_code: String,
    pub description: String,
    pub pickup_address: String,
    pub delivery_address: String,
    pub recipient_name: Option<String>,
    pub recipient_phone: Option<String>,
    pub pickup_location: Option<GeoPoint>,
    pub delivery_location: Option<GeoPoint>,
    pub current_location: Option<GeoPoint>,
    pub status: ParcelStatus,
    pub sender_id: Uuid,
    pub sender: Option<UserSummary>,
    pub driver_id: Option<Uuid>,
    pub driver: Option<UserSummary>,
    pub tracking_history: Vec<TrackingEntryView>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl ParcelView {
    /// Customers see what they sent, drivers what they carry, admins everything.
    pub fn is_visible_to(&self, user: &UserAccount) -> bool {
        match user.role {
            UserRole::Admin => true,
            UserRole::Customer => self.sender_id == user.id,
            UserRole::Driver => self.driver_id == Some(user.id),
        }
    }

    /// The parcel record alone, without ledger or user summaries.
    pub(crate) fn bare(parcel: Parcel) -> Self {
        Self::assemble(parcel, Vec::new(), &HashMap::new())
    }

    fn assemble(
        parcel: Parcel,
        tracking_history: Vec<TrackingEntryView>,
        users: &HashMap<Uuid, UserSummary>,
    ) -> Self {
        Self {
            pickup_location: parcel.pickup_point(),
            delivery_location: parcel.delivery_point(),
            current_location: parcel.current_point(),
            sender: users.get(&parcel.sender_id).cloned(),
            driver: parcel.driver_id.and_then(|id| users.get(&id).cloned()),
            id: parcel.id,
            tracking_code: parcel.tracking_code,
            description: parcel.description,
            pickup_address: parcel.pickup_address,
            delivery_address: parcel.delivery_address,
            recipient_name: parcel.recipient_name,
            recipient_phone: parcel.recipient_phone,
            status: parcel.status,
            sender_id: parcel.sender_id,
            driver_id: parcel.driver_id,
            tracking_history,
            created_at: parcel.created_at.assume_utc(),
            updated_at: parcel.updated_at.assume_utc(),
        }
    }
}

impl TrackingEntryView {
    fn assemble(event: TrackingEvent, users: &HashMap<Uuid, UserSummary>) -> Self {
        Self {
            id: event.id,
            status: event.status,
            location: event.point(),
            location_name: event.location_name,
            notes: event.notes,
            updated_by_id: event.updated_by,
            updated_by: users.get(&event.updated_by).cloned(),
            created_at: event.created_at.assume_utc(),
        }
    }
}

/// Join parcels with their ledgers and the users they reference. Order is preserved.
pub(crate) async fn assemble_views<S: ParcelStore>(
    store: &S,
    parcels: Vec<Parcel>,
) -> Result<Vec<ParcelView>, framework::Error> {
    if parcels.is_empty() {
        return Ok(vec![]);
    }
    let parcel_ids: Vec<Uuid> = parcels.iter().map(|parcel| parcel.id).collect();
    let events = store.list_events(&parcel_ids).await?;

    let mut user_ids: Vec<Uuid> = parcels
        .iter()
        .flat_map(|parcel| iter::once(parcel.sender_id).chain(parcel.driver_id))
        .chain(events.iter().map(|event| event.updated_by))
        .collect();
    user_ids.sort_unstable();
    user_ids.dedup();
    let users: HashMap<Uuid, UserSummary> = store
        .find_users(&user_ids)
        .await?
        .iter()
        .map(|account| (account.id, UserSummary::from(account)))
        .collect();

    let mut histories: HashMap<Uuid, Vec<TrackingEntryView>> = HashMap::new();
    for event in events {
        histories
            .entry(event.parcel_id)
            .or_default()
            .push(TrackingEntryView::assemble(event, &users));
    }
    Ok(parcels
        .into_iter()
        .map(|parcel| {
            let history = histories.remove(&parcel.id).unwrap_or_default();
            ParcelView::assemble(parcel, history, &users)
        })
        .collect())
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ParcelStatistics {
    pub total: i64,
    pub pending: i64,
    pub picked_up: i64,
    pub in_transit: i64,
    pub out_for_delivery: i64,
    pub delivered: i64,
    pub cancelled: i64,
    /// `delivered / total`, 0 when there are no parcels.
    pub delivery_rate: f64,
}

impl ParcelStatistics {
    pub fn from_counts(counts: &[(ParcelStatus, i64)]) -> Self {
        let count = |status: ParcelStatus| -> i64 {
            counts
                .iter()
                .filter(|(s, _)| *s == status)
                .map(|(_, n)| n)
                .sum()
        };
        let total = counts.iter().map(|(_, n)| n).sum::<i64>();
        let delivered = count(ParcelStatus::Delivered);
        Self {
            total,
            pending: count(ParcelStatus::Pending),
            picked_up: count(ParcelStatus::PickedUp),
            in_transit: count(ParcelStatus::InTransit),
            out_for_delivery: count(ParcelStatus::OutForDelivery),
            delivered,
            cancelled: count(ParcelStatus::Cancelled),
            delivery_rate: if total == 0 {
                0.0
            } else {
                delivered as f64 / total as f64
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_statistics_have_zero_rate() {
        let stats = ParcelStatistics::from_counts(&[]);
        assert_eq!(stats.total, 0);
        assert_eq!(stats.delivery_rate, 0.0);
    }

    #[test]
    fn delivery_rate_is_a_fraction() {
        let stats = ParcelStatistics::from_counts(&[
            (ParcelStatus::Delivered, 3),
            (ParcelStatus::Pending, 4),
            (ParcelStatus::Cancelled, 1),
        ]);
        assert_eq!(stats.total, 8);
        assert_eq!(stats.delivered, 3);
        assert_eq!(stats.in_transit, 0);
        assert!((stats.delivery_rate - 0.375).abs() < f64::EPSILON);
    }
}
