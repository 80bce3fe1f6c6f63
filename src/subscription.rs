//! Subscription packages.

use serde::{Deserialize, Serialize};
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::error::{Result, ServerError};

const COLUMNS: &str =
    "id, package, price_cents, billing_period, features, active, created_at";

/// Package type, fixed catalogue.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type,
)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "subscription_package", rename_all = "lowercase")]
pub enum Package {
    #[default]
    Starter,
    Standard,
    Premium,
    Enterprise,
}

#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type,
)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "billing_period", rename_all = "lowercase")]
pub enum BillingPeriod {
    #[default]
    Monthly,
    Yearly,
}

/// Subscription as saved on database.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Subscription {
    pub id: Uuid,
    pub package: Package,
    pub price_cents: i64,
    pub billing_period: BillingPeriod,
    /// Feature-flag bundle of the package.
    pub features: serde_json::Value,
    pub active: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Clone)]
pub struct SubscriptionRepository {
    pool: Pool<Postgres>,
}

impl SubscriptionRepository {
    /// Create a new [`SubscriptionRepository`].
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Active package catalogue, cheapest first.
    pub async fn list_active(&self) -> Result<Vec<Subscription>> {
        let query = format!(
            "SELECT {COLUMNS} FROM subscriptions WHERE active ORDER BY price_cents ASC"
        );

        Ok(sqlx::query_as::<_, Subscription>(&query)
            .fetch_all(&self.pool)
            .await?)
    }

    /// Find a subscription by id.
    pub async fn find_by_id(&self, id: Uuid) -> Result<Subscription> {
        let query = format!("SELECT {COLUMNS} FROM subscriptions WHERE id = $1");

        sqlx::query_as::<_, Subscription>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(ServerError::NotFound("subscription"))
    }

    /// Find the catalogue entry of a package.
    pub async fn find_by_package(&self, package: Package) -> Result<Subscription> {
        let query =
            format!("SELECT {COLUMNS} FROM subscriptions WHERE package = $1 AND active");

        sqlx::query_as::<_, Subscription>(&query)
            .bind(package)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(ServerError::NotFound("subscription"))
    }
}
