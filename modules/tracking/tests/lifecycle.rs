mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use common::{assert_status_matches_ledger, details, fixture};
use kanau::processor::Processor;
use tracking::TrackingError;
use tracking::entities::parcel::{GeoPoint, ParcelStatus};
use tracking::services::lifecycle::*;
use tracking::services::view::ParcelView;
use uuid::Uuid;

async fn create(fx: &common::Fixture) -> ParcelView {
    let created = fx
        .service
        .process(CreateParcel {
            sender_id: fx.customer.id,
            details: details(),
        })
        .await;
    match created {
        Ok(view) => view,
        Err(e) => panic!("create failed: {e}"),
    }
}

async fn set_status(
    fx: &common::Fixture,
    parcel_id: Uuid,
    status: ParcelStatus,
) -> Result<ParcelView, TrackingError> {
    fx.service
        .process(UpdateParcelStatus {
            parcel_id,
            status,
            note: None,
            actor_id: fx.driver.id,
        })
        .await
}

#[tokio::test]
async fn creation_appends_one_pending_entry_by_the_sender() {
    let fx = fixture();
    let view = create(&fx).await;

    assert_eq!(view.status, ParcelStatus::Pending);
    assert_eq!(view.tracking_code.len(), 12);
    assert_eq!(view.description, "Two books");
    assert_eq!(view.driver_id, None);
    assert_eq!(view.sender.as_ref().map(|s| s.id), Some(fx.customer.id));
    assert_eq!(view.tracking_history.len(), 1);
    let entry = &view.tracking_history[0];
    assert_eq!(entry.status, ParcelStatus::Pending);
    assert_eq!(entry.updated_by_id, fx.customer.id);
    assert_eq!(entry.notes.as_deref(), Some(PARCEL_CREATED_NOTE));
    assert_status_matches_ledger(&view);
}

#[tokio::test]
async fn unknown_sender_is_rejected() {
    let fx = fixture();
    let sender_id = Uuid::new_v4();
    let result = fx
        .service
        .process(CreateParcel {
            sender_id,
            details: details(),
        })
        .await;
    assert!(matches!(result, Err(TrackingError::SenderNotFound(id)) if id == sender_id));
}

#[tokio::test]
async fn missing_address_is_rejected() {
    let fx = fixture();
    let result = fx
        .service
        .process(CreateParcel {
            sender_id: fx.customer.id,
            details: ParcelDetails {
                delivery_address: "  ".to_string(),
                ..details()
            },
        })
        .await;
    assert!(matches!(result, Err(TrackingError::InvalidDetails(_))));
}

#[tokio::test]
async fn pickup_succeeds_once() {
    let fx = fixture();
    let parcel = create(&fx).await;

    let picked = set_status(&fx, parcel.id, ParcelStatus::PickedUp).await;
    assert!(matches!(picked, Ok(ref v) if v.status == ParcelStatus::PickedUp));

    let again = set_status(&fx, parcel.id, ParcelStatus::PickedUp).await;
    assert!(matches!(
        again,
        Err(TrackingError::InvalidTransition {
            from: ParcelStatus::PickedUp,
            to: ParcelStatus::PickedUp
        })
    ));

    let current = fx
        .service
        .process(FindParcelById {
            parcel_id: parcel.id,
        })
        .await;
    assert!(matches!(current, Ok(ref v) if v.tracking_history.len() == 2));
}

#[tokio::test]
async fn happy_path_records_five_entries() {
    let fx = fixture();
    let parcel = create(&fx).await;
    let path = [
        ParcelStatus::PickedUp,
        ParcelStatus::InTransit,
        ParcelStatus::OutForDelivery,
        ParcelStatus::Delivered,
    ];
    let mut last = parcel;
    for status in path {
        last = match set_status(&fx, last.id, status).await {
            Ok(view) => view,
            Err(e) => panic!("{status}: {e}"),
        };
        assert_status_matches_ledger(&last);
    }
    assert_eq!(last.tracking_history.len(), 5);
    assert_eq!(
        last.tracking_history[4].notes.as_deref(),
        Some("Status changed to delivered")
    );
    assert!(
        last.tracking_history[1..]
            .iter()
            .all(|entry| entry.updated_by_id == fx.driver.id)
    );

    let cancel = set_status(&fx, last.id, ParcelStatus::Cancelled).await;
    assert!(matches!(cancel, Err(TrackingError::InvalidTransition { .. })));
}

#[tokio::test]
async fn explicit_note_is_kept() {
    let fx = fixture();
    let parcel = create(&fx).await;
    let result = fx
        .service
        .process(UpdateParcelStatus {
            parcel_id: parcel.id,
            status: ParcelStatus::Cancelled,
            note: Some("Sender changed their mind".to_string()),
            actor_id: fx.admin.id,
        })
        .await;
    let Ok(view) = result else {
        panic!("cancel failed");
    };
    let entry = &view.tracking_history[1];
    assert_eq!(entry.notes.as_deref(), Some("Sender changed their mind"));
    assert_eq!(entry.updated_by_id, fx.admin.id);
}

#[tokio::test]
async fn unknown_parcel_and_actor() {
    let fx = fixture();
    let missing = set_status(&fx, Uuid::new_v4(), ParcelStatus::PickedUp).await;
    assert!(matches!(missing, Err(TrackingError::ParcelNotFound(_))));

    let parcel = create(&fx).await;
    let ghost = Uuid::new_v4();
    let result = fx
        .service
        .process(UpdateParcelStatus {
            parcel_id: parcel.id,
            status: ParcelStatus::PickedUp,
            note: None,
            actor_id: ghost,
        })
        .await;
    assert!(matches!(result, Err(TrackingError::ActorNotFound(id)) if id == ghost));
}

#[tokio::test]
async fn location_update_moves_parcel_and_keeps_status() {
    let fx = fixture();
    let parcel = create(&fx).await;
    let location = GeoPoint {
        latitude: 52.52,
        longitude: 13.405,
    };
    let result = fx
        .service
        .process(UpdateParcelLocation {
            parcel_id: parcel.id,
            location,
            location_name: "Berlin hub".to_string(),
            actor_id: fx.driver.id,
        })
        .await;
    let Ok(view) = result else {
        panic!("location update failed");
    };
    assert_eq!(view.current_location, Some(location));
    assert_eq!(view.status, ParcelStatus::Pending);
    let entry = &view.tracking_history[1];
    assert_eq!(entry.location, Some(location));
    assert_eq!(entry.location_name.as_deref(), Some("Berlin hub"));
    assert_eq!(entry.notes.as_deref(), Some("Location updated: Berlin hub"));
    assert_status_matches_ledger(&view);

    // Later status entries carry the last known position.
    let picked = set_status(&fx, parcel.id, ParcelStatus::PickedUp).await;
    assert!(matches!(picked, Ok(ref v) if v.tracking_history[2].location == Some(location)));
}

#[tokio::test]
async fn out_of_range_coordinates_are_rejected() {
    let fx = fixture();
    let parcel = create(&fx).await;
    for (latitude, longitude) in [(91.0, 0.0), (0.0, -180.5), (f64::NAN, 0.0)] {
        let result = fx
            .service
            .process(UpdateParcelLocation {
                parcel_id: parcel.id,
                location: GeoPoint {
                    latitude,
                    longitude,
                },
                location_name: "Nowhere".to_string(),
                actor_id: fx.driver.id,
            })
            .await;
        assert!(matches!(result, Err(TrackingError::InvalidCoordinates)));
    }
    let current = fx
        .service
        .process(FindParcelById {
            parcel_id: parcel.id,
        })
        .await;
    assert!(matches!(current, Ok(ref v) if v.tracking_history.len() == 1));
}

#[tokio::test]
async fn driver_assignment_is_authored_by_the_actor() {
    let fx = fixture();
    let parcel = create(&fx).await;
    let assign = AssignDriver {
        parcel_id: parcel.id,
        driver_id: fx.driver.id,
        actor_id: fx.admin.id,
    };

    let Ok(view) = fx.service.process(assign.clone()).await else {
        panic!("assignment failed");
    };
    assert_eq!(view.driver_id, Some(fx.driver.id));
    assert_eq!(view.driver.as_ref().map(|d| d.id), Some(fx.driver.id));
    let entry = &view.tracking_history[1];
    assert_eq!(entry.notes.as_deref(), Some("Driver assigned: Dave Tester"));
    assert_eq!(entry.updated_by_id, fx.admin.id);
    assert_eq!(entry.status, ParcelStatus::Pending);

    let again = fx.service.process(assign).await;
    assert!(matches!(again, Err(TrackingError::AlreadyAssigned(id)) if id == fx.driver.id));

    let reassigned = fx
        .service
        .process(AssignDriver {
            parcel_id: parcel.id,
            driver_id: fx.other_driver.id,
            actor_id: fx.admin.id,
        })
        .await;
    assert!(matches!(reassigned, Ok(ref v) if v.driver_id == Some(fx.other_driver.id)));
}

#[tokio::test]
async fn only_drivers_can_be_assigned() {
    let fx = fixture();
    let parcel = create(&fx).await;
    for driver_id in [fx.customer.id, Uuid::new_v4()] {
        let result = fx
            .service
            .process(AssignDriver {
                parcel_id: parcel.id,
                driver_id,
                actor_id: fx.admin.id,
            })
            .await;
        assert!(matches!(result, Err(TrackingError::DriverNotFound(id)) if id == driver_id));
    }
}

#[tokio::test]
async fn unassigning_requires_a_driver() {
    let fx = fixture();
    let parcel = create(&fx).await;
    let unassign = UnassignDriver {
        parcel_id: parcel.id,
        actor_id: fx.admin.id,
    };
    let result = fx.service.process(unassign.clone()).await;
    assert!(matches!(result, Err(TrackingError::NoDriverAssigned)));

    let assigned = fx
        .service
        .process(AssignDriver {
            parcel_id: parcel.id,
            driver_id: fx.driver.id,
            actor_id: fx.admin.id,
        })
        .await;
    assert!(assigned.is_ok());

    let Ok(view) = fx.service.process(unassign).await else {
        panic!("unassign failed");
    };
    assert_eq!(view.driver_id, None);
    assert_eq!(view.driver, None);
    let entry = &view.tracking_history[2];
    assert_eq!(entry.notes.as_deref(), Some("Driver unassigned: Dave Tester"));
    assert_eq!(entry.updated_by_id, fx.admin.id);
}

#[tokio::test]
async fn statistics_count_every_status() {
    let fx = fixture();
    let empty = fx.service.process(ShowParcelStatistics).await;
    assert!(matches!(empty, Ok(ref s) if s.total == 0 && s.delivery_rate == 0.0));

    let delivered = create(&fx).await;
    for status in [
        ParcelStatus::PickedUp,
        ParcelStatus::InTransit,
        ParcelStatus::OutForDelivery,
        ParcelStatus::Delivered,
    ] {
        assert!(set_status(&fx, delivered.id, status).await.is_ok());
    }
    let cancelled = create(&fx).await;
    assert!(
        set_status(&fx, cancelled.id, ParcelStatus::Cancelled)
            .await
            .is_ok()
    );
    create(&fx).await;
    create(&fx).await;

    let Ok(stats) = fx.service.process(ShowParcelStatistics).await else {
        panic!("statistics failed");
    };
    assert_eq!(stats.total, 4);
    assert_eq!(stats.pending, 2);
    assert_eq!(stats.delivered, 1);
    assert_eq!(stats.cancelled, 1);
    assert_eq!(stats.in_transit, 0);
    assert!((stats.delivery_rate - 0.25).abs() < f64::EPSILON);
}

#[tokio::test]
async fn tracking_code_collision_is_retried() {
    let fx = fixture();
    let first = create(&fx).await;

    let calls = Arc::new(AtomicUsize::new(0));
    let taken = first.tracking_code.clone();
    let service = fx.service.clone().with_tracking_codes({
        let calls = calls.clone();
        move || match calls.fetch_add(1, Ordering::SeqCst) {
            0 | 1 => taken.clone(),
            _ => "FRESHCODE001".to_string(),
        }
    });
    let result = service
        .process(CreateParcel {
            sender_id: fx.customer.id,
            details: details(),
        })
        .await;
    assert!(matches!(result, Ok(ref v) if v.tracking_code == "FRESHCODE001"));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn tracking_code_retries_are_bounded() {
    let fx = fixture();
    let first = create(&fx).await;

    let calls = Arc::new(AtomicUsize::new(0));
    let taken = first.tracking_code.clone();
    let service = fx.service.clone().with_tracking_codes({
        let calls = calls.clone();
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            taken.clone()
        }
    });
    let result = service
        .process(CreateParcel {
            sender_id: fx.customer.id,
            details: details(),
        })
        .await;
    assert!(matches!(result, Err(TrackingError::TrackingCodeConflict)));
    assert_eq!(calls.load(Ordering::SeqCst), MAX_TRACKING_CODE_ATTEMPTS);

    let listed = fx.service.process(ListAllParcels).await;
    assert!(matches!(listed, Ok(ref all) if all.len() == 1));
}

#[tokio::test]
async fn public_lookup_by_tracking_code() {
    let fx = fixture();
    let parcel = create(&fx).await;

    let found = fx
        .service
        .process(FindParcelByTrackingCode {
            tracking_code: parcel.tracking_code.to_lowercase(),
        })
        .await;
    assert!(matches!(found, Ok(ref v) if v.id == parcel.id));

    let missing = fx
        .service
        .process(FindParcelByTrackingCode {
            tracking_code: "ZZZZZZZZZZZZ".to_string(),
        })
        .await;
    assert!(matches!(missing, Err(TrackingError::ParcelNotFound(_))));
}

#[tokio::test]
async fn lists_are_scoped_and_newest_first() {
    let fx = fixture();
    let older = create(&fx).await;
    tokio::time::sleep(Duration::from_millis(5)).await;
    let newer = create(&fx).await;
    let assigned = fx
        .service
        .process(AssignDriver {
            parcel_id: older.id,
            driver_id: fx.driver.id,
            actor_id: fx.admin.id,
        })
        .await;
    assert!(assigned.is_ok());

    let sent = fx
        .service
        .process(ListSentParcels {
            sender_id: fx.customer.id,
        })
        .await;
    let Ok(sent) = sent else {
        panic!("listing sent parcels failed");
    };
    let ids: Vec<Uuid> = sent.iter().map(|v| v.id).collect();
    assert_eq!(ids, vec![newer.id, older.id]);

    let carried = fx
        .service
        .process(ListAssignedParcels {
            driver_id: fx.driver.id,
        })
        .await;
    assert!(matches!(carried, Ok(ref v) if v.len() == 1 && v[0].id == older.id));

    let nothing = fx
        .service
        .process(ListAssignedParcels {
            driver_id: fx.other_driver.id,
        })
        .await;
    assert!(matches!(nothing, Ok(ref v) if v.is_empty()));
}

#[tokio::test]
async fn concurrent_updates_of_one_parcel_are_serialized() {
    let fx = fixture();
    let parcel = create(&fx).await;

    let attempts = (0..8).map(|_| {
        let service = fx.service.clone();
        let actor_id = fx.driver.id;
        tokio::spawn(async move {
            service
                .process(UpdateParcelStatus {
                    parcel_id: parcel.id,
                    status: ParcelStatus::PickedUp,
                    note: None,
                    actor_id,
                })
                .await
        })
    });
    let mut succeeded = 0;
    let mut rejected = 0;
    for handle in attempts.collect::<Vec<_>>() {
        match handle.await {
            Ok(Ok(_)) => succeeded += 1,
            Ok(Err(TrackingError::InvalidTransition { .. })) => rejected += 1,
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
    assert_eq!(succeeded, 1);
    assert_eq!(rejected, 7);

    let Ok(view) = fx
        .service
        .process(FindParcelById {
            parcel_id: parcel.id,
        })
        .await
    else {
        panic!("lookup failed");
    };
    assert_eq!(view.tracking_history.len(), 2);
    assert_status_matches_ledger(&view);
    assert!(fx.service.locks().is_empty());
}
