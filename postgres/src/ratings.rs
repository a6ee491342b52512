//! `PostgreSQL` rating ledger.

use crate::error::{corrupt, storage_error};
use crate::read;
use async_trait::async_trait;
use meetpoint_appointments::ports::RatingLedger;
use meetpoint_appointments::{Appointment, AppointmentId, Rating, RatingDirection, RatingId, Score, StorageError, UserId};
use meetpoint_runtime::retry::RetryPolicy;
use sqlx::postgres::{PgArguments, PgPool, PgRow};
use sqlx::query::Query;
use sqlx::{Postgres, Row};

const COLUMNS: &str = "id, appointment_id, rater_id, rated_id, direction, score, comment, created_at";

/// Ratings table adapter.
#[derive(Clone)]
pub struct PostgresRatingLedger {
    pool: PgPool,
    retry: RetryPolicy,
}

impl PostgresRatingLedger {
    /// Creates a new ledger on `pool`
    #[must_use]
    pub const fn new(pool: PgPool, retry: RetryPolicy) -> Self {
        Self { pool, retry }
    }

    async fn fetch_for_appointment(&self, appointment_id: AppointmentId) -> Result<Vec<Rating>, StorageError> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM ratings WHERE appointment_id = $1 ORDER BY created_at"
        ))
        .bind(appointment_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| storage_error("list ratings", e))?;
        rows.iter().map(decode_rating).collect()
    }

    async fn fetch_closable(&self, limit: i64) -> Result<Vec<AppointmentId>, StorageError> {
        let ids: Vec<uuid::Uuid> = sqlx::query_scalar(
            r"
            SELECT a.id FROM appointments a
            WHERE a.status = 'confirmed'
              AND (SELECT COUNT(*) FROM ratings r WHERE r.appointment_id = a.id) = 2
            ORDER BY a.scheduled_at, a.id
            LIMIT $1
            ",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| storage_error("list closable appointments", e))?;
        Ok(ids.into_iter().map(AppointmentId::from_uuid).collect())
    }

    async fn fetch_received(
        &self,
        user_id: UserId,
        direction: Option<RatingDirection>,
    ) -> Result<Vec<Rating>, StorageError> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM ratings \
             WHERE rated_id = $1 AND ($2::TEXT IS NULL OR direction = $2) \
             ORDER BY created_at DESC"
        ))
        .bind(user_id.as_uuid())
        .bind(direction.map(RatingDirection::as_str))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| storage_error("list received ratings", e))?;
        rows.iter().map(decode_rating).collect()
    }
}

#[async_trait]
impl RatingLedger for PostgresRatingLedger {
    #[tracing::instrument(skip_all, fields(appointment_id = %rating.appointment_id, direction = %rating.direction), level = "debug")]
    async fn insert(&self, rating: &Rating) -> Result<(), StorageError> {
        insert_query(rating)
            .execute(&self.pool)
            .await
            .map_err(|e| storage_error("insert rating", e))?;
        Ok(())
    }

    #[tracing::instrument(skip_all, fields(appointment_id = %rating.appointment_id, direction = %rating.direction), level = "debug")]
    async fn insert_closing(&self, rating: &Rating, completed: &Appointment) -> Result<bool, StorageError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| storage_error("begin closing rating", e))?;

        // Dropping `tx` on an early return rolls the insert back
        insert_query(rating)
            .execute(&mut *tx)
            .await
            .map_err(|e| storage_error("insert closing rating", e))?;

        let result = sqlx::query(
            r"
            UPDATE appointments
            SET status = $2, completed_at = $3
            WHERE id = $1 AND status = 'confirmed'
            ",
        )
        .bind(completed.id.as_uuid())
        .bind(completed.status.as_str())
        .bind(completed.completed_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| storage_error("complete appointment", e))?;

        if result.rows_affected() != 1 {
            tx.rollback()
                .await
                .map_err(|e| storage_error("roll back closing rating", e))?;
            metrics::counter!("appointment_store_cas_lost_total").increment(1);
            return Ok(false);
        }

        tx.commit()
            .await
            .map_err(|e| storage_error("commit closing rating", e))?;
        Ok(true)
    }

    async fn closable(&self, limit: usize) -> Result<Vec<AppointmentId>, StorageError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        read(&self.retry, || self.fetch_closable(limit)).await
    }

    async fn for_appointment(&self, appointment_id: AppointmentId) -> Result<Vec<Rating>, StorageError> {
        read(&self.retry, || self.fetch_for_appointment(appointment_id)).await
    }

    async fn received_by(
        &self,
        user_id: UserId,
        direction: Option<RatingDirection>,
    ) -> Result<Vec<Rating>, StorageError> {
        read(&self.retry, || self.fetch_received(user_id, direction)).await
    }
}

fn insert_query(rating: &Rating) -> Query<'_, Postgres, PgArguments> {
    sqlx::query(
        r"
        INSERT INTO ratings (id, appointment_id, rater_id, rated_id, direction, score, comment, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ",
    )
    .bind(rating.id.as_uuid())
    .bind(rating.appointment_id.as_uuid())
    .bind(rating.rater_id.as_uuid())
    .bind(rating.rated_id.as_uuid())
    .bind(rating.direction.as_str())
    .bind(i16::from(rating.score.value()))
    .bind(rating.comment.as_deref())
    .bind(rating.created_at)
}

fn decode_rating(row: &PgRow) -> Result<Rating, StorageError> {
    let get_err = |e| storage_error("decode rating", e);

    let direction: String = row.try_get("direction").map_err(get_err)?;
    let score: i16 = row.try_get("score").map_err(get_err)?;
    let score = u8::try_from(score)
        .map_err(|e| corrupt("score", e))
        .and_then(|s| Score::try_from(s).map_err(|e| corrupt("score", e)))?;

    Ok(Rating {
        id: RatingId::from_uuid(row.try_get("id").map_err(get_err)?),
        appointment_id: AppointmentId::from_uuid(row.try_get("appointment_id").map_err(get_err)?),
        rater_id: UserId::from_uuid(row.try_get("rater_id").map_err(get_err)?),
        rated_id: UserId::from_uuid(row.try_get("rated_id").map_err(get_err)?),
        direction: direction.parse().map_err(|e| corrupt("direction", e))?,
        score,
        comment: row.try_get("comment").map_err(get_err)?,
        created_at: row.try_get("created_at").map_err(get_err)?,
    })
}
