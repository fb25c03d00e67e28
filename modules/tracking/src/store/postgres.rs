use framework::sqlx::DatabaseProcessor;
use kanau::processor::Processor;
use tracing::{Instrument, info_span, instrument};
use uuid::Uuid;

use crate::entities::parcel::{Parcel, ParcelStatus};
use crate::entities::tracking_event::{NewTrackingEvent, TrackingEvent};
use crate::store::{NewParcel, ParcelChange, ParcelFilter, ParcelLookup, ParcelStore};

const PARCEL_COLUMNS: &str = r#"
    id, tracking_code, description, pickup_address, delivery_address,
    recipient_name, recipient_phone,
    pickup_latitude, pickup_longitude, delivery_latitude, delivery_longitude,
    current_latitude, current_longitude,
    status, sender_id, driver_id, created_at, updated_at
"#;

#[derive(Debug, Clone)]
pub struct InsertParcel {
    pub parcel: NewParcel,
    pub event: NewTrackingEvent,
}

async fn append_tracking_event(
    tx: &mut sqlx::PgConnection,
    parcel_id: Uuid,
    event: &NewTrackingEvent,
) -> Result<TrackingEvent, sqlx::Error> {
    sqlx::query_as::<_, TrackingEvent>(
        r#"
        INSERT INTO "tracking"."tracking_event"
            (parcel_id, status, latitude, longitude, location_name, notes, updated_by, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING id, parcel_id, status, latitude, longitude, location_name, notes,
                  updated_by, created_at
        "#,
    )
    .bind(parcel_id)
    .bind(event.status)
    .bind(event.latitude)
    .bind(event.longitude)
    .bind(event.location_name.as_deref())
    .bind(event.notes.as_deref())
    .bind(event.updated_by)
    .bind(event.created_at)
    .fetch_one(tx)
    .await
}

impl Processor<InsertParcel> for DatabaseProcessor {
    type Output = Parcel;
    type Error = sqlx::Error;
    #[instrument(skip_all, name = "SQL-Transaction:InsertParcel", err, fields(parcel_id = %input.parcel.id))]
    async fn process(&self, input: InsertParcel) -> Result<Parcel, sqlx::Error> {
        let InsertParcel { parcel, event } = input;
        let mut tx = self
            .db()
            .begin()
            .instrument(info_span!("<Transaction Begin>"))
            .await?;
        let inserted = sqlx::query_as::<_, Parcel>(&format!(
            r#"
            INSERT INTO "tracking"."parcel"
                (id, tracking_code, description, pickup_address, delivery_address,
                 recipient_name, recipient_phone,
                 pickup_latitude, pickup_longitude, delivery_latitude, delivery_longitude,
                 status, sender_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $14)
            RETURNING {PARCEL_COLUMNS}
            "#
        ))
        .bind(parcel.id)
        .bind(&parcel.tracking_code)
        .bind(&parcel.description)
        .bind(&parcel.pickup_address)
        .bind(&parcel.delivery_address)
        .bind(parcel.recipient_name.as_deref())
        .bind(parcel.recipient_phone.as_deref())
        .bind(parcel.pickup_latitude)
        .bind(parcel.pickup_longitude)
        .bind(parcel.delivery_latitude)
        .bind(parcel.delivery_longitude)
        .bind(event.status)
        .bind(parcel.sender_id)
        .bind(parcel.created_at)
        .fetch_one(&mut *tx)
        .await?;
        append_tracking_event(&mut tx, inserted.id, &event).await?;
        tx.commit()
            .instrument(info_span!("<Transaction Commit>"))
            .await?;
        Ok(inserted)
    }
}

#[derive(Debug, Clone)]
pub struct CommitParcelChange {
    pub change: ParcelChange,
    pub event: NewTrackingEvent,
}

impl Processor<CommitParcelChange> for DatabaseProcessor {
    /// `None` when the row moved on since it was read.
    type Output = Option<Parcel>;
    type Error = sqlx::Error;
    #[instrument(skip_all, name = "SQL-Transaction:CommitParcelChange", err, fields(parcel_id = %input.change.parcel_id))]
    async fn process(&self, input: CommitParcelChange) -> Result<Option<Parcel>, sqlx::Error> {
        let CommitParcelChange { change, event } = input;
        let mut tx = self
            .db()
            .begin()
            .instrument(info_span!("<Transaction Begin>"))
            .await?;
        let updated = sqlx::query_as::<_, Parcel>(&format!(
            r#"
            UPDATE "tracking"."parcel"
            SET status = $3, current_latitude = $4, current_longitude = $5,
                driver_id = $6, updated_at = $7
            WHERE id = $1 AND updated_at = $2
            RETURNING {PARCEL_COLUMNS}
            "#
        ))
        .bind(change.parcel_id)
        .bind(change.expected_updated_at)
        .bind(change.status)
        .bind(change.current_latitude)
        .bind(change.current_longitude)
        .bind(change.driver_id)
        .bind(change.updated_at)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(updated) = updated else {
            tx.rollback().await?;
            return Ok(None);
        };
        append_tracking_event(&mut tx, updated.id, &event).await?;
        tx.commit()
            .instrument(info_span!("<Transaction Commit>"))
            .await?;
        Ok(Some(updated))
    }
}

#[derive(Debug, Clone)]
pub struct FindParcel {
    pub lookup: ParcelLookup,
}

impl Processor<FindParcel> for DatabaseProcessor {
    type Output = Option<Parcel>;
    type Error = sqlx::Error;
    #[instrument(skip_all, name = "SQL:FindParcel", err)]
    async fn process(&self, input: FindParcel) -> Result<Option<Parcel>, sqlx::Error> {
        match input.lookup {
            ParcelLookup::Id(id) => {
                sqlx::query_as::<_, Parcel>(&format!(
                    r#"SELECT {PARCEL_COLUMNS} FROM "tracking"."parcel" WHERE id = $1"#
                ))
                .bind(id)
                .fetch_optional(self.db())
                .await
            }
            ParcelLookup::TrackingCode(code) => {
                sqlx::query_as::<_, Parcel>(&format!(
                    r#"SELECT {PARCEL_COLUMNS} FROM "tracking"."parcel" WHERE tracking_code = $1"#
                ))
                .bind(code)
                .fetch_optional(self.db())
                .await
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ListParcels {
    pub filter: ParcelFilter,
}

impl Processor<ListParcels> for DatabaseProcessor {
    type Output = Vec<Parcel>;
    type Error = sqlx::Error;
    #[instrument(skip_all, name = "SQL:ListParcels", err)]
    async fn process(&self, input: ListParcels) -> Result<Vec<Parcel>, sqlx::Error> {
        let (condition, owner) = match input.filter {
            ParcelFilter::All => ("$1::uuid IS NULL", None),
            ParcelFilter::Sender(id) => ("sender_id = $1", Some(id)),
            ParcelFilter::Driver(id) => ("driver_id = $1", Some(id)),
        };
        sqlx::query_as::<_, Parcel>(&format!(
            r#"
            SELECT {PARCEL_COLUMNS} FROM "tracking"."parcel"
            WHERE {condition}
            ORDER BY created_at DESC, id
            "#
        ))
        .bind(owner)
        .fetch_all(self.db())
        .await
    }
}

#[derive(Debug, Clone)]
pub struct ListTrackingEvents {
    pub parcel_ids: Vec<Uuid>,
}

impl Processor<ListTrackingEvents> for DatabaseProcessor {
    type Output = Vec<TrackingEvent>;
    type Error = sqlx::Error;
    #[instrument(skip_all, name = "SQL:ListTrackingEvents", err)]
    async fn process(&self, input: ListTrackingEvents) -> Result<Vec<TrackingEvent>, sqlx::Error> {
        sqlx::query_as::<_, TrackingEvent>(
            r#"
            SELECT id, parcel_id, status, latitude, longitude, location_name, notes,
                   updated_by, created_at
            FROM "tracking"."tracking_event"
            WHERE parcel_id = ANY($1)
            ORDER BY id
            "#,
        )
        .bind(&input.parcel_ids)
        .fetch_all(self.db())
        .await
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CountParcelsByStatus;

impl Processor<CountParcelsByStatus> for DatabaseProcessor {
    type Output = Vec<(ParcelStatus, i64)>;
    type Error = sqlx::Error;
    #[instrument(skip_all, name = "SQL:CountParcelsByStatus", err)]
    async fn process(
        &self,
        _: CountParcelsByStatus,
    ) -> Result<Vec<(ParcelStatus, i64)>, sqlx::Error> {
        sqlx::query_as::<_, (ParcelStatus, i64)>(
            r#"
            SELECT status, COUNT(*) AS count
            FROM "tracking"."parcel"
            GROUP BY status
            "#,
        )
        .fetch_all(self.db())
        .await
    }
}

impl ParcelStore for DatabaseProcessor {
    async fn insert_parcel(
        &self,
        parcel: NewParcel,
        event: NewTrackingEvent,
    ) -> Result<Parcel, framework::Error> {
        Ok(self.process(InsertParcel { parcel, event }).await?)
    }

    async fn commit_change(
        &self,
        change: ParcelChange,
        event: NewTrackingEvent,
    ) -> Result<Parcel, framework::Error> {
        self.process(CommitParcelChange { change, event })
            .await?
            .ok_or(framework::Error::Conflict)
    }

    async fn find_parcel(&self, lookup: ParcelLookup) -> Result<Option<Parcel>, framework::Error> {
        Ok(self.process(FindParcel { lookup }).await?)
    }

    async fn list_parcels(&self, filter: ParcelFilter) -> Result<Vec<Parcel>, framework::Error> {
        Ok(self.process(ListParcels { filter }).await?)
    }

    async fn list_events(&self, parcel_ids: &[Uuid]) -> Result<Vec<TrackingEvent>, framework::Error> {
        if parcel_ids.is_empty() {
            return Ok(vec![]);
        }
        Ok(self
            .process(ListTrackingEvents {
                parcel_ids: parcel_ids.to_vec(),
            })
            .await?)
    }

    async fn count_by_status(&self) -> Result<Vec<(ParcelStatus, i64)>, framework::Error> {
        Ok(self.process(CountParcelsByStatus).await?)
    }
}
