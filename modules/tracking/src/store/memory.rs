use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use auth::entities::db::user_account::{UserAccount, UserDirectory};
use uuid::Uuid;

use crate::entities::parcel::{Parcel, ParcelStatus};
use crate::entities::tracking_event::{NewTrackingEvent, TrackingEvent};
use crate::store::{NewParcel, ParcelChange, ParcelFilter, ParcelLookup, ParcelStore};

#[derive(Debug, Default)]
struct MemoryState {
    users: HashMap<Uuid, UserAccount>,
    parcels: HashMap<Uuid, Parcel>,
    events: Vec<TrackingEvent>,
    next_event_id: i64,
}

impl MemoryState {
    fn append_event(&mut self, parcel_id: Uuid, event: NewTrackingEvent) -> TrackingEvent {
        self.next_event_id += 1;
        let event = TrackingEvent {
            id: self.next_event_id,
            parcel_id,
            status: event.status,
            latitude: event.latitude,
            longitude: event.longitude,
            location_name: event.location_name,
            notes: event.notes,
            updated_by: event.updated_by,
            created_at: event.created_at,
        };
        self.events.push(event.clone());
        event
    }

    /// Mirrors the foreign keys of the relational schema.
    fn check_user(&self, id: Uuid) -> Result<(), framework::Error> {
        if self.users.contains_key(&id) {
            Ok(())
        } else {
            Err(framework::Error::InvalidInput)
        }
    }
}

/// Process-local [`ParcelStore`] used by debug mode and tests.
#[derive(Debug, Default)]
pub struct MemoryParcelStore {
    state: RwLock<MemoryState>,
}

impl MemoryParcelStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_user(&self, user: UserAccount) -> Result<(), framework::Error> {
        self.write()?.users.insert(user.id, user);
        Ok(())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryState>, framework::Error> {
        self.state.read().map_err(|_| poisoned())
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryState>, framework::Error> {
        self.state.write().map_err(|_| poisoned())
    }
}

fn poisoned() -> framework::Error {
    framework::Error::BusinessPanic(anyhow::anyhow!("memory store lock poisoned"))
}

impl UserDirectory for MemoryParcelStore {
    async fn find_user(&self, id: Uuid) -> Result<Option<UserAccount>, framework::Error> {
        Ok(self.read()?.users.get(&id).cloned())
    }

    async fn find_users(&self, ids: &[Uuid]) -> Result<Vec<UserAccount>, framework::Error> {
        let state = self.read()?;
        Ok(ids
            .iter()
            .filter_map(|id| state.users.get(id).cloned())
            .collect())
    }
}

impl ParcelStore for MemoryParcelStore {
    async fn insert_parcel(
        &self,
        parcel: NewParcel,
        event: NewTrackingEvent,
    ) -> Result<Parcel, framework::Error> {
        let mut state = self.write()?;
        state.check_user(parcel.sender_id)?;
        state.check_user(event.updated_by)?;
        let duplicate = state.parcels.values().any(|existing| {
            existing.id == parcel.id || existing.tracking_code == parcel.tracking_code
        });
        if duplicate {
            return Err(framework::Error::Conflict);
        }
        let inserted = Parcel {
            id: parcel.id,
            tracking_code: parcel.tracking_code,
            description: parcel.description,
            pickup_address: parcel.pickup_address,
            delivery_address: parcel.delivery_address,
            recipient_name: parcel.recipient_name,
            recipient_phone: parcel.recipient_phone,
            pickup_latitude: parcel.pickup_latitude,
            pickup_longitude: parcel.pickup_longitude,
            delivery_latitude: parcel.delivery_latitude,
            delivery_longitude: parcel.delivery_longitude,
            current_latitude: None,
            current_longitude: None,
            status: event.status,
            sender_id: parcel.sender_id,
            driver_id: None,
            created_at: parcel.created_at,
            updated_at: parcel.created_at,
        };
        state.parcels.insert(inserted.id, inserted.clone());
        state.append_event(inserted.id, event);
        Ok(inserted)
    }

    async fn commit_change(
        &self,
        change: ParcelChange,
        event: NewTrackingEvent,
    ) -> Result<Parcel, framework::Error> {
        let mut state = self.write()?;
        state.check_user(event.updated_by)?;
        if let Some(driver_id) = change.driver_id {
            state.check_user(driver_id)?;
        }
        let parcel = state
            .parcels
            .get_mut(&change.parcel_id)
            .ok_or(framework::Error::NotFound)?;
        if parcel.updated_at != change.expected_updated_at {
            return Err(framework::Error::Conflict);
        }
        parcel.status = change.status;
        parcel.current_latitude = change.current_latitude;
        parcel.current_longitude = change.current_longitude;
        parcel.driver_id = change.driver_id;
        parcel.updated_at = change.updated_at;
        let updated = parcel.clone();
        state.append_event(updated.id, event);
        Ok(updated)
    }

    async fn find_parcel(&self, lookup: ParcelLookup) -> Result<Option<Parcel>, framework::Error> {
        let state = self.read()?;
        Ok(match lookup {
            ParcelLookup::Id(id) => state.parcels.get(&id).cloned(),
            ParcelLookup::TrackingCode(code) => state
                .parcels
                .values()
                .find(|parcel| parcel.tracking_code == code)
                .cloned(),
        })
    }

    async fn list_parcels(&self, filter: ParcelFilter) -> Result<Vec<Parcel>, framework::Error> {
        let state = self.read()?;
        let mut parcels: Vec<Parcel> = state
            .parcels
            .values()
            .filter(|parcel| match filter {
                ParcelFilter::All => true,
                ParcelFilter::Sender(id) => parcel.sender_id == id,
                ParcelFilter::Driver(id) => parcel.driver_id == Some(id),
            })
            .cloned()
            .collect();
        parcels.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(parcels)
    }

    async fn list_events(&self, parcel_ids: &[Uuid]) -> Result<Vec<TrackingEvent>, framework::Error> {
        let state = self.read()?;
        Ok(state
            .events
            .iter()
            .filter(|event| parcel_ids.contains(&event.parcel_id))
            .cloned()
            .collect())
    }

    async fn count_by_status(&self) -> Result<Vec<(ParcelStatus, i64)>, framework::Error> {
        let state = self.read()?;
        let mut counts: HashMap<ParcelStatus, i64> = HashMap::new();
        for parcel in state.parcels.values() {
            *counts.entry(parcel.status).or_default() += 1;
        }
        Ok(counts.into_iter().collect())
    }
}
