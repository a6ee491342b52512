//! `PostgreSQL` stock ledger.

use crate::error::{corrupt, storage_error};
use crate::read;
use async_trait::async_trait;
use meetpoint_appointments::ports::{StockDecrement, StockLedger};
use meetpoint_appointments::{ProductId, StorageError};
use meetpoint_runtime::retry::RetryPolicy;
use sqlx::postgres::PgPool;

/// Per-product stock kept in `product_stock`.
#[derive(Clone)]
pub struct PostgresStockLedger {
    pool: PgPool,
    retry: RetryPolicy,
}

impl PostgresStockLedger {
    /// Creates a new ledger on `pool`
    #[must_use]
    pub const fn new(pool: PgPool, retry: RetryPolicy) -> Self {
        Self { pool, retry }
    }

    /// Overwrite the stock of one product.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the write fails.
    pub async fn set(&self, product_id: ProductId, quantity: u32) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO product_stock (product_id, available) VALUES ($1, $2)
            ON CONFLICT (product_id) DO UPDATE SET available = EXCLUDED.available
            ",
        )
        .bind(product_id.as_uuid())
        .bind(to_column(quantity)?)
        .execute(&self.pool)
        .await
        .map_err(|e| storage_error("set stock", e))?;
        Ok(())
    }

    async fn fetch_available(&self, product_id: ProductId) -> Result<u32, StorageError> {
        let available: Option<i32> = sqlx::query_scalar("SELECT available FROM product_stock WHERE product_id = $1")
            .bind(product_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| storage_error("read stock", e))?;
        available.map_or(Ok(0), from_column)
    }
}

#[async_trait]
impl StockLedger for PostgresStockLedger {
    async fn available(&self, product_id: ProductId) -> Result<u32, StorageError> {
        read(&self.retry, || self.fetch_available(product_id)).await
    }

    #[tracing::instrument(skip(self), level = "debug")]
    async fn try_decrement(&self, product_id: ProductId, quantity: u32) -> Result<StockDecrement, StorageError> {
        let remaining: Option<i32> = sqlx::query_scalar(
            r"
            UPDATE product_stock
            SET available = available - $2
            WHERE product_id = $1 AND available >= $2
            RETURNING available
            ",
        )
        .bind(product_id.as_uuid())
        .bind(to_column(quantity)?)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| storage_error("decrement stock", e))?;

        match remaining {
            Some(remaining) => Ok(StockDecrement::Applied {
                remaining: from_column(remaining)?,
            }),
            None => Ok(StockDecrement::Insufficient {
                available: self.available(product_id).await?,
            }),
        }
    }

    #[tracing::instrument(skip(self), level = "debug")]
    async fn restore(&self, product_id: ProductId, quantity: u32) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO product_stock (product_id, available) VALUES ($1, $2)
            ON CONFLICT (product_id) DO UPDATE SET available = product_stock.available + EXCLUDED.available
            ",
        )
        .bind(product_id.as_uuid())
        .bind(to_column(quantity)?)
        .execute(&self.pool)
        .await
        .map_err(|e| storage_error("restore stock", e))?;
        Ok(())
    }
}

fn to_column(quantity: u32) -> Result<i32, StorageError> {
    i32::try_from(quantity).map_err(|_| StorageError::Backend(format!("quantity {quantity} out of range")))
}

fn from_column(available: i32) -> Result<u32, StorageError> {
    u32::try_from(available).map_err(|e| corrupt("available", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantities_beyond_the_column_are_rejected() {
        assert_eq!(to_column(7).ok(), Some(7));
        assert!(to_column(u32::MAX).is_err());
        assert!(matches!(from_column(-1), Err(StorageError::Corrupt(_))));
    }
}
