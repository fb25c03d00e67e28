use std::sync::Arc;

use auth::services::middleware::UserId;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tracing::{debug, instrument};
use tracking::events::parcel::{ParcelCommand, ParcelEvent};
use tracking::services::broadcaster::SubscriberId;
use tracking::store::ParcelStore;
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

/// `GET /ws`. The identity extractor runs first, so a missing or invalid token is a 401
/// before any upgrade happens.
pub async fn subscribe<S: ParcelStore>(
    State(state): State<AppState<S>>,
    UserId(user_id): UserId,
    upgrade: WebSocketUpgrade,
) -> Response {
    upgrade.on_upgrade(move |socket| session(state, user_id, socket))
}

#[instrument(skip_all, fields(user_id = %user_id, subscriber = tracing::field::Empty))]
async fn session<S: ParcelStore>(state: AppState<S>, user_id: Uuid, socket: WebSocket) {
    let subscription = state.broadcaster.register();
    let subscriber = subscription.id;
    tracing::Span::current().record("subscriber", tracing::field::display(subscriber));
    let mut pushes = subscription.receiver;
    let (mut sink, mut stream) = socket.split();

    loop {
        let outgoing = tokio::select! {
            pushed = pushes.recv() => match pushed {
                Some(event) => event,
                None => break,
            },
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => handle_command(&state, user_id, subscriber, text.as_str()).await,
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    debug!(error = %e, "WebSocket receive failed");
                    break;
                }
            },
        };
        let frame = match serde_json::to_string(&outgoing) {
            Ok(frame) => frame,
            Err(e) => {
                debug!(error = %e, "Could not encode frame");
                continue;
            }
        };
        if sink.send(Message::Text(frame.into())).await.is_err() {
            break;
        }
    }

    state.broadcaster.disconnect(subscriber);
}

async fn handle_command<S: ParcelStore>(
    state: &AppState<S>,
    user_id: Uuid,
    subscriber: SubscriberId,
    text: &str,
) -> ParcelEvent {
    let command: ParcelCommand = match serde_json::from_str(text) {
        Ok(command) => command,
        Err(e) => {
            return ParcelEvent::Error {
                message: format!("Malformed message: {e}"),
            };
        }
    };
    let parcel_id = command.parcel_id();
    match command {
        ParcelCommand::JoinParcelRoom { .. } => {
            match state.find_visible_parcel(user_id, parcel_id).await {
                Ok(_) if state.broadcaster.join(parcel_id, subscriber) => {
                    ParcelEvent::Joined { parcel_id }
                }
                Ok(_) => ParcelEvent::Error {
                    message: "Subscription is closed".to_string(),
                },
                Err(e) => error_frame(e),
            }
        }
        ParcelCommand::LeaveParcelRoom { .. } => {
            state.broadcaster.leave(parcel_id, subscriber);
            ParcelEvent::Left { parcel_id }
        }
        ParcelCommand::TrackParcel { .. } => {
            match state.find_visible_parcel(user_id, parcel_id).await {
                Ok(view) => ParcelEvent::ParcelSnapshot {
                    data: Arc::new(view),
                },
                Err(e) => error_frame(e),
            }
        }
    }
}

fn error_frame(error: ApiError) -> ParcelEvent {
    ParcelEvent::Error {
        message: error.message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use auth::entities::db::user_account::{UserAccount, UserRole};
    use kanau::processor::Processor;
    use tracking::TrackingError;
    use tracking::services::broadcaster::Subscription;
    use tracking::services::lifecycle::{AssignDriver, CreateParcel, ParcelDetails};
    use tracking::store::MemoryParcelStore;

    struct Session {
        state: AppState<MemoryParcelStore>,
        sender: UserAccount,
        stranger: UserAccount,
        driver: UserAccount,
        admin: UserAccount,
        parcel_id: Uuid,
    }

    fn account(first_name: &str, role: UserRole) -> UserAccount {
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

    async fn session() -> Result<Session, String> {
        let store = Arc::new(MemoryParcelStore::new());
        let sender = account("Carol", UserRole::Customer);
        let stranger = account("Chris", UserRole::Customer);
        let driver = account("Dave", UserRole::Driver);
        let admin = account("Alice", UserRole::Admin);
        for user in [&sender, &stranger, &driver, &admin] {
            store
                .insert_user(user.clone())
                .map_err(|e| format!("seed user: {e}"))?;
        }
        let state = AppState::new(store);
        let parcel = state
            .service
            .process(CreateParcel {
                sender_id: sender.id,
                details: ParcelDetails {
                    pickup_address: "1 Depot Road".to_string(),
                    delivery_address: "9 Harbour Street".to_string(),
                    recipient_phone: Some("+1555".to_string()),
                    ..ParcelDetails::default()
                },
            })
            .await
            .map_err(|e| format!("create parcel: {e}"))?;
        Ok(Session {
            state,
            sender,
            stranger,
            driver,
            admin,
            parcel_id: parcel.id,
        })
    }

    fn command(kind: &str, parcel_id: Uuid) -> String {
        serde_json::json!({ "type": kind, "parcel_id": parcel_id }).to_string()
    }

    async fn send(
        s: &Session,
        user: &UserAccount,
        subscription: &Subscription,
        text: &str,
    ) -> ParcelEvent {
        handle_command(&s.state, user.id, subscription.id, text).await
    }

    #[tokio::test]
    async fn sender_gets_snapshot_and_joins() -> Result<(), String> {
        let s = session().await?;
        let sub = s.state.broadcaster.register();

        let snapshot = send(&s, &s.sender, &sub, &command("track_parcel", s.parcel_id)).await;
        let ParcelEvent::ParcelSnapshot { data } = snapshot else {
            return Err(format!("expected snapshot, got {snapshot:?}"));
        };
        assert_eq!(data.id, s.parcel_id);

        let joined = send(&s, &s.sender, &sub, &command("join_parcel_room", s.parcel_id)).await;
        assert_eq!(joined, ParcelEvent::Joined { parcel_id: s.parcel_id });
        assert_eq!(s.state.broadcaster.room_size(s.parcel_id), 1);
        Ok(())
    }

    #[tokio::test]
    async fn stranger_cannot_track_or_join() -> Result<(), String> {
        let s = session().await?;
        let sub = s.state.broadcaster.register();

        for kind in ["track_parcel", "join_parcel_room"] {
            let reply = send(&s, &s.stranger, &sub, &command(kind, s.parcel_id)).await;
            assert_eq!(
                reply,
                ParcelEvent::Error {
                    message: ApiError::forbidden().message
                }
            );
        }
        assert_eq!(s.state.broadcaster.room_size(s.parcel_id), 0);
        Ok(())
    }

    #[tokio::test]
    async fn driver_sees_parcel_only_once_assigned() -> Result<(), String> {
        let s = session().await?;
        let sub = s.state.broadcaster.register();
        let track = command("track_parcel", s.parcel_id);

        let before = send(&s, &s.driver, &sub, &track).await;
        assert!(matches!(before, ParcelEvent::Error { .. }));

        s.state
            .service
            .process(AssignDriver {
                parcel_id: s.parcel_id,
                driver_id: s.driver.id,
                actor_id: s.admin.id,
            })
            .await
            .map_err(|e| format!("assign: {e}"))?;
        let after = send(&s, &s.driver, &sub, &track).await;
        assert!(matches!(after, ParcelEvent::ParcelSnapshot { .. }));

        let admin = send(&s, &s.admin, &sub, &track).await;
        assert!(matches!(admin, ParcelEvent::ParcelSnapshot { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn unknown_parcel_is_an_error_frame() -> Result<(), String> {
        let s = session().await?;
        let sub = s.state.broadcaster.register();
        let missing = Uuid::new_v4();

        for kind in ["track_parcel", "join_parcel_room"] {
            let reply = send(&s, &s.admin, &sub, &command(kind, missing)).await;
            let ParcelEvent::Error { message } = reply else {
                return Err(format!("expected error frame for {kind}, got {reply:?}"));
            };
            assert!(message.contains(&missing.to_string()));
        }
        assert_eq!(s.state.broadcaster.room_size(missing), 0);
        Ok(())
    }

    #[tokio::test]
    async fn malformed_frame_is_answered_not_fatal() -> Result<(), String> {
        let s = session().await?;
        let sub = s.state.broadcaster.register();

        for text in ["not json", r#"{"type":"dance","parcel_id":"x"}"#, "{}"] {
            let reply = send(&s, &s.sender, &sub, text).await;
            assert!(
                matches!(reply, ParcelEvent::Error { ref message } if message.starts_with("Malformed message")),
                "{text}: {reply:?}"
            );
        }
        // The session keeps working afterwards.
        let joined = send(&s, &s.sender, &sub, &command("join_parcel_room", s.parcel_id)).await;
        assert_eq!(joined, ParcelEvent::Joined { parcel_id: s.parcel_id });
        Ok(())
    }

    #[tokio::test]
    async fn leave_answers_left_and_stops_pushes() -> Result<(), String> {
        let s = session().await?;
        let mut sub = s.state.broadcaster.register();
        send(&s, &s.sender, &sub, &command("join_parcel_room", s.parcel_id)).await;

        let left = send(&s, &s.sender, &sub, &command("leave_parcel_room", s.parcel_id)).await;
        assert_eq!(left, ParcelEvent::Left { parcel_id: s.parcel_id });
        assert_eq!(s.state.broadcaster.room_size(s.parcel_id), 0);

        s.state
            .service
            .process(AssignDriver {
                parcel_id: s.parcel_id,
                driver_id: s.driver.id,
                actor_id: s.admin.id,
            })
            .await
            .map_err(|e| format!("assign: {e}"))?;
        assert!(sub.receiver.try_recv().is_err());
        Ok(())
    }

    #[tokio::test]
    async fn joined_session_receives_updates_until_disconnect() -> Result<(), String> {
        let s = session().await?;
        let mut sub = s.state.broadcaster.register();
        send(&s, &s.sender, &sub, &command("join_parcel_room", s.parcel_id)).await;

        s.state
            .service
            .process(AssignDriver {
                parcel_id: s.parcel_id,
                driver_id: s.driver.id,
                actor_id: s.admin.id,
            })
            .await
            .map_err(|e| format!("assign: {e}"))?;
        let pushed = sub.receiver.try_recv().map_err(|e| format!("push: {e}"))?;
        let ParcelEvent::ParcelUpdated { data } = pushed else {
            return Err(format!("expected update, got {pushed:?}"));
        };
        assert_eq!(data.driver_id, Some(s.driver.id));

        // What a session does on exit.
        s.state.broadcaster.disconnect(sub.id);
        assert_eq!(s.state.broadcaster.room_size(s.parcel_id), 0);
        assert_eq!(s.state.broadcaster.subscriber_count(), 0);
        Ok(())
    }

    #[test]
    fn storage_failures_do_not_leak_into_frames() {
        let failure = TrackingError::Storage(framework::Error::BusinessPanic(anyhow::anyhow!(
            "connection to 10.0.0.5 refused"
        )));
        assert_eq!(
            error_frame(failure.into()),
            ParcelEvent::Error {
                message: ApiError::internal().message
            }
        );
    }
}
