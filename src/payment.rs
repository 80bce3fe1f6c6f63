//! Payments mirrored from the external processor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::error::Result;

const COLUMNS: &str = "id, user_id, provider, provider_reference, \
     amount_cents, currency, status, created_at";

/// Payment as saved on database, a flat mirror of processor state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Payment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub provider: String,
    pub provider_reference: String,
    pub amount_cents: i64,
    pub currency: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct PaymentRepository {
    pool: Pool<Postgres>,
}

impl PaymentRepository {
    /// Create a new [`PaymentRepository`].
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Paginated payments, newest first.
    pub async fn list(
        &self,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Payment>, i64)> {
        let query = format!(
            "SELECT {COLUMNS} FROM payments ORDER BY created_at DESC LIMIT $1 OFFSET $2"
        );
        let payments = sqlx::query_as::<_, Payment>(&query)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM payments")
            .fetch_one(&self.pool)
            .await?;

        Ok((payments, total))
    }

    /// Settled revenue since a cutoff, in cents.
    pub async fn revenue_since(&self, cutoff: DateTime<Utc>) -> Result<i64> {
        Ok(sqlx::query_scalar::<_, i64>(
            r#"SELECT COALESCE(SUM(amount_cents), 0)::BIGINT FROM payments
                WHERE status = 'succeeded' AND created_at >= $1"#,
        )
        .bind(cutoff)
        .fetch_one(&self.pool)
        .await?)
    }

    /// Number of payments since a cutoff.
    pub async fn count_since(&self, cutoff: DateTime<Utc>) -> Result<i64> {
        Ok(sqlx::query_scalar::<_, i64>(
            r#"SELECT COUNT(*) FROM payments WHERE created_at >= $1"#,
        )
        .bind(cutoff)
        .fetch_one(&self.pool)
        .await?)
    }
}
