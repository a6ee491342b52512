//! `PostgreSQL` appointment store.

use crate::error::{corrupt, storage_error};
use crate::read;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use meetpoint_appointments::ports::AppointmentStore;
use meetpoint_appointments::{
    Appointment, AppointmentId, AppointmentQuery, AppointmentStatus, CancellationReason, MeetingPointId, Money,
    ProductId, Role, StorageError, UserId,
};
use meetpoint_runtime::retry::RetryPolicy;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;

const COLUMNS: &str = "id, product_id, buyer_id, seller_id, meeting_point_id, scheduled_date, scheduled_time, \
     requested_quantity, unit_price_cents, status, cancellation_kind, cancellation_note, \
     requested_at, confirmed_at, completed_at";

/// Appointments table adapter.
#[derive(Clone)]
pub struct PostgresAppointmentStore {
    pool: PgPool,
    retry: RetryPolicy,
}

impl PostgresAppointmentStore {
    /// Creates a new store on `pool`
    #[must_use]
    pub const fn new(pool: PgPool, retry: RetryPolicy) -> Self {
        Self { pool, retry }
    }

    async fn fetch_one(&self, id: AppointmentId) -> Result<Option<Appointment>, StorageError> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM appointments WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| storage_error("get appointment", e))?;
        row.as_ref().map(decode_appointment).transpose()
    }

    async fn fetch_list(&self, query: &AppointmentQuery) -> Result<Vec<Appointment>, StorageError> {
        let party = match query.role {
            Role::Buyer => "buyer_id",
            Role::Seller => "seller_id",
        };
        let sql = format!(
            "SELECT {COLUMNS} FROM appointments \
             WHERE {party} = $1 AND ($2::TEXT IS NULL OR status = $2) \
             ORDER BY scheduled_at, requested_at"
        );
        let rows = sqlx::query(&sql)
            .bind(query.user_id.as_uuid())
            .bind(query.status.map(AppointmentStatus::as_str))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| storage_error("list appointments", e))?;
        rows.iter().map(decode_appointment).collect()
    }

    async fn fetch_due(
        &self,
        status: AppointmentStatus,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Appointment>, StorageError> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM appointments \
             WHERE status = $1 AND scheduled_at <= $2 \
             ORDER BY scheduled_at, requested_at LIMIT $3"
        ))
        .bind(status.as_str())
        .bind(cutoff)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| storage_error("list due appointments", e))?;
        rows.iter().map(decode_appointment).collect()
    }

    async fn fetch_due_count(&self, status: AppointmentStatus, cutoff: DateTime<Utc>) -> Result<usize, StorageError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM appointments WHERE status = $1 AND scheduled_at <= $2")
                .bind(status.as_str())
                .bind(cutoff)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| storage_error("count due appointments", e))?;
        usize::try_from(count).map_err(|e| corrupt("due count", e))
    }

    async fn fetch_slot_holder(
        &self,
        seller_id: UserId,
        scheduled_at: DateTime<Utc>,
    ) -> Result<Option<AppointmentId>, StorageError> {
        let id: Option<uuid::Uuid> = sqlx::query_scalar(
            r"
            SELECT id FROM appointments
            WHERE seller_id = $1 AND scheduled_at = $2 AND status IN ('requested', 'confirmed')
            LIMIT 1
            ",
        )
        .bind(seller_id.as_uuid())
        .bind(scheduled_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| storage_error("find slot holder", e))?;
        Ok(id.map(AppointmentId::from_uuid))
    }
}

#[async_trait]
impl AppointmentStore for PostgresAppointmentStore {
    #[tracing::instrument(skip_all, fields(appointment_id = %appointment.id), level = "debug")]
    async fn insert(&self, appointment: &Appointment) -> Result<(), StorageError> {
        let quantity = i32::try_from(appointment.requested_quantity)
            .map_err(|_| StorageError::Backend(format!("quantity {} out of range", appointment.requested_quantity)))?;
        let price = i64::try_from(appointment.unit_price_snapshot.cents())
            .map_err(|_| StorageError::Backend(format!("price {} out of range", appointment.unit_price_snapshot)))?;

        sqlx::query(
            r"
            INSERT INTO appointments (
                id, product_id, buyer_id, seller_id, meeting_point_id,
                scheduled_date, scheduled_time, scheduled_at,
                requested_quantity, unit_price_cents, status,
                cancellation_kind, cancellation_note,
                requested_at, confirmed_at, completed_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            ",
        )
        .bind(appointment.id.as_uuid())
        .bind(appointment.product_id.as_uuid())
        .bind(appointment.buyer_id.as_uuid())
        .bind(appointment.seller_id.as_uuid())
        .bind(appointment.meeting_point_id.as_uuid())
        .bind(appointment.scheduled_date)
        .bind(appointment.scheduled_time)
        .bind(appointment.scheduled_at())
        .bind(quantity)
        .bind(price)
        .bind(appointment.status.as_str())
        .bind(appointment.cancellation_reason.as_ref().map(CancellationReason::kind))
        .bind(appointment.cancellation_reason.as_ref().and_then(CancellationReason::note))
        .bind(appointment.requested_at)
        .bind(appointment.confirmed_at)
        .bind(appointment.completed_at)
        .execute(&self.pool)
        .await
        .map_err(|e| storage_error("insert appointment", e))?;
        Ok(())
    }

    async fn get(&self, id: AppointmentId) -> Result<Option<Appointment>, StorageError> {
        read(&self.retry, || self.fetch_one(id)).await
    }

    async fn list(&self, query: &AppointmentQuery) -> Result<Vec<Appointment>, StorageError> {
        read(&self.retry, || self.fetch_list(query)).await
    }

    async fn due(
        &self,
        status: AppointmentStatus,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Appointment>, StorageError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        read(&self.retry, || self.fetch_due(status, cutoff, limit)).await
    }

    async fn count_due(&self, status: AppointmentStatus, cutoff: DateTime<Utc>) -> Result<usize, StorageError> {
        read(&self.retry, || self.fetch_due_count(status, cutoff)).await
    }

    async fn active_at_slot(
        &self,
        seller_id: UserId,
        scheduled_at: DateTime<Utc>,
    ) -> Result<Option<AppointmentId>, StorageError> {
        read(&self.retry, || self.fetch_slot_holder(seller_id, scheduled_at)).await
    }

    #[tracing::instrument(skip_all, fields(appointment_id = %next.id, %expected, next = %next.status), level = "debug")]
    async fn compare_and_set(&self, expected: AppointmentStatus, next: &Appointment) -> Result<bool, StorageError> {
        let result = sqlx::query(
            r"
            UPDATE appointments
            SET status = $3,
                cancellation_kind = $4,
                cancellation_note = $5,
                confirmed_at = $6,
                completed_at = $7
            WHERE id = $1 AND status = $2
            ",
        )
        .bind(next.id.as_uuid())
        .bind(expected.as_str())
        .bind(next.status.as_str())
        .bind(next.cancellation_reason.as_ref().map(CancellationReason::kind))
        .bind(next.cancellation_reason.as_ref().and_then(CancellationReason::note))
        .bind(next.confirmed_at)
        .bind(next.completed_at)
        .execute(&self.pool)
        .await
        .map_err(|e| storage_error("update appointment", e))?;

        let swapped = result.rows_affected() == 1;
        if !swapped {
            metrics::counter!("appointment_store_cas_lost_total").increment(1);
        }
        Ok(swapped)
    }

    async fn ping(&self) -> Result<(), StorageError> {
        read(&self.retry, || async {
            sqlx::query("SELECT 1")
                .execute(&self.pool)
                .await
                .map(|_| ())
                .map_err(|e| storage_error("ping", e))
        })
        .await
    }
}

fn decode_appointment(row: &PgRow) -> Result<Appointment, StorageError> {
    let get_err = |e| storage_error("decode appointment", e);

    let quantity: i32 = row.try_get("requested_quantity").map_err(get_err)?;
    let price: i64 = row.try_get("unit_price_cents").map_err(get_err)?;
    let status: String = row.try_get("status").map_err(get_err)?;
    let cancellation_kind: Option<String> = row.try_get("cancellation_kind").map_err(get_err)?;
    let cancellation_note: Option<String> = row.try_get("cancellation_note").map_err(get_err)?;

    let cancellation_reason = cancellation_kind
        .map(|kind| CancellationReason::from_parts(&kind, cancellation_note))
        .transpose()
        .map_err(|e| corrupt("cancellation reason", e))?;

    Ok(Appointment {
        id: AppointmentId::from_uuid(row.try_get("id").map_err(get_err)?),
        product_id: ProductId::from_uuid(row.try_get("product_id").map_err(get_err)?),
        buyer_id: UserId::from_uuid(row.try_get("buyer_id").map_err(get_err)?),
        seller_id: UserId::from_uuid(row.try_get("seller_id").map_err(get_err)?),
        meeting_point_id: MeetingPointId::from_uuid(row.try_get("meeting_point_id").map_err(get_err)?),
        scheduled_date: row.try_get("scheduled_date").map_err(get_err)?,
        scheduled_time: row.try_get("scheduled_time").map_err(get_err)?,
        requested_quantity: u32::try_from(quantity).map_err(|e| corrupt("requested_quantity", e))?,
        unit_price_snapshot: Money::from_cents(u64::try_from(price).map_err(|e| corrupt("unit_price_cents", e))?),
        status: status.parse().map_err(|e| corrupt("status", e))?,
        cancellation_reason,
        requested_at: row.try_get("requested_at").map_err(get_err)?,
        confirmed_at: row.try_get("confirmed_at").map_err(get_err)?,
        completed_at: row.try_get("completed_at").map_err(get_err)?,
    })
}
