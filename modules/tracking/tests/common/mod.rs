#![allow(dead_code)]

use std::sync::Arc;

use auth::entities::db::user_account::{UserAccount, UserRole};
use tracking::services::broadcaster::ParcelBroadcaster;
use tracking::services::lifecycle::{ParcelDetails, ParcelLifecycleService};
use tracking::services::view::ParcelView;
use tracking::store::MemoryParcelStore;
use uuid::Uuid;

pub struct Fixture {
    pub store: Arc<MemoryParcelStore>,
    pub broadcaster: ParcelBroadcaster,
    pub service: ParcelLifecycleService<MemoryParcelStore>,
    pub customer: UserAccount,
    pub driver: UserAccount,
    pub other_driver: UserAccount,
    pub admin: UserAccount,
}

pub fn account(first_name: &str, role: UserRole) -> UserAccount {
    let now = framework::now_time();
    UserAccount {
        id: Uuid::new_v4(),
        email: format!("{}@example.com", first_name.to_lowercase()),
        first_name: first_name.into(),
        last_name: "Tester".into(),
        role,
        created_at: now,
        updated_at: now,
    }
}

pub fn fixture() -> Fixture {
    let store = Arc::new(MemoryParcelStore::new());
    let customer = account("Carol", UserRole::Customer);
    let driver = account("Dave", UserRole::Driver);
    let other_driver = account("Erin", UserRole::Driver);
    let admin = account("Alice", UserRole::Admin);
    for user in [&customer, &driver, &other_driver, &admin] {
        assert!(store.insert_user(user.clone()).is_ok());
    }
    let broadcaster = ParcelBroadcaster::new();
    let service =
        ParcelLifecycleService::new(store.clone()).with_notifier(Arc::new(broadcaster.clone()));
    Fixture {
        store,
        broadcaster,
        service,
        customer,
        driver,
        other_driver,
        admin,
    }
}

pub fn details() -> ParcelDetails {
    ParcelDetails {
        description: Some("Two books".to_string()),
        pickup_address: "1 Main St".to_string(),
        delivery_address: "9 Elm St".to_string(),
        recipient_name: Some("Rita".to_string()),
        recipient_phone: Some("+15550100".to_string()),
        pickup_location: None,
        delivery_location: None,
    }
}

/// The parcel's status must always be the status of its newest ledger entry.
pub fn assert_status_matches_ledger(view: &ParcelView) {
    let last = view.tracking_history.last().map(|entry| entry.status);
    assert_eq!(last, Some(view.status));
    let ids: Vec<i64> = view.tracking_history.iter().map(|entry| entry.id).collect();
    assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
}
