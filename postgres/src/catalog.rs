//! `PostgreSQL` catalog: listings and weekly availability.

use crate::error::{corrupt, storage_error};
use crate::read;
use async_trait::async_trait;
use chrono::{NaiveTime, Weekday};
use meetpoint_appointments::ports::Catalog;
use meetpoint_appointments::{AvailabilityWindow, Listing, MeetingPointId, ProductId, StorageError, UserId};
use meetpoint_runtime::retry::RetryPolicy;
use sqlx::postgres::PgPool;

/// Catalog adapter over `listings` and `availability_windows`.
#[derive(Clone)]
pub struct PostgresCatalog {
    pool: PgPool,
    retry: RetryPolicy,
}

impl PostgresCatalog {
    /// Creates a new catalog on `pool`
    #[must_use]
    pub const fn new(pool: PgPool, retry: RetryPolicy) -> Self {
        Self { pool, retry }
    }

    /// Insert or replace a listing.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the write fails.
    pub async fn upsert_listing(&self, listing: &Listing) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO listings (product_id, seller_id, meeting_point_id) VALUES ($1, $2, $3)
            ON CONFLICT (product_id) DO UPDATE
            SET seller_id = EXCLUDED.seller_id, meeting_point_id = EXCLUDED.meeting_point_id
            ",
        )
        .bind(listing.product_id.as_uuid())
        .bind(listing.seller_id.as_uuid())
        .bind(listing.meeting_point_id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(|e| storage_error("upsert listing", e))?;
        Ok(())
    }

    /// Publish one availability window for a seller.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the write fails.
    pub async fn add_availability(&self, seller_id: UserId, window: AvailabilityWindow) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO availability_windows (seller_id, weekday, start_time, end_time)
            VALUES ($1, $2, $3, $4)
            ",
        )
        .bind(seller_id.as_uuid())
        .bind(window.weekday.to_string())
        .bind(window.start)
        .bind(window.end)
        .execute(&self.pool)
        .await
        .map_err(|e| storage_error("add availability", e))?;
        Ok(())
    }

    async fn fetch_listing(&self, product_id: ProductId) -> Result<Option<Listing>, StorageError> {
        let row: Option<(uuid::Uuid, uuid::Uuid)> =
            sqlx::query_as("SELECT seller_id, meeting_point_id FROM listings WHERE product_id = $1")
                .bind(product_id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| storage_error("get listing", e))?;
        Ok(row.map(|(seller_id, meeting_point_id)| Listing {
            product_id,
            seller_id: UserId::from_uuid(seller_id),
            meeting_point_id: MeetingPointId::from_uuid(meeting_point_id),
        }))
    }

    async fn fetch_availability(
        &self,
        seller_id: UserId,
        weekday: Weekday,
    ) -> Result<Vec<AvailabilityWindow>, StorageError> {
        let rows: Vec<(String, NaiveTime, NaiveTime)> = sqlx::query_as(
            r"
            SELECT weekday, start_time, end_time FROM availability_windows
            WHERE seller_id = $1 AND weekday = $2
            ORDER BY start_time
            ",
        )
        .bind(seller_id.as_uuid())
        .bind(weekday.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| storage_error("list availability", e))?;

        rows.into_iter()
            .map(|(weekday, start, end)| -> Result<AvailabilityWindow, StorageError> {
                Ok(AvailabilityWindow {
                    weekday: weekday.parse().map_err(|_| corrupt("weekday", &weekday))?,
                    start,
                    end,
                })
            })
            .collect()
    }
}

#[async_trait]
impl Catalog for PostgresCatalog {
    async fn listing(&self, product_id: ProductId) -> Result<Option<Listing>, StorageError> {
        read(&self.retry, || self.fetch_listing(product_id)).await
    }

    async fn availability(&self, seller_id: UserId, weekday: Weekday) -> Result<Vec<AvailabilityWindow>, StorageError> {
        read(&self.retry, || self.fetch_availability(seller_id, weekday)).await
    }
}
