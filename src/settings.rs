//! Per-user settings documents.

use serde::{Deserialize, Serialize};
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::error::Result;

/// Which settings document an update targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Section {
    BusinessProfile,
    NotificationPrefs,
    Integrations,
}

impl Section {
    fn column(&self) -> &'static str {
        match self {
            Section::BusinessProfile => "business_profile",
            Section::NotificationPrefs => "notification_prefs",
            Section::Integrations => "integrations",
        }
    }
}

/// Settings as saved on database, one row per user.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Settings {
    pub user_id: Uuid,
    pub business_profile: serde_json::Value,
    pub notification_prefs: serde_json::Value,
    pub integrations: serde_json::Value,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Clone)]
pub struct SettingsRepository {
    pool: Pool<Postgres>,
}

impl SettingsRepository {
    /// Create a new [`SettingsRepository`].
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Settings of a user; empty documents when none were saved yet.
    pub async fn get(&self, user_id: Uuid) -> Result<Settings> {
        let settings = sqlx::query_as::<_, Settings>(
            r#"SELECT user_id, business_profile, notification_prefs, integrations, updated_at
                FROM settings WHERE user_id = $1"#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(settings.unwrap_or(Settings {
            user_id,
            business_profile: serde_json::json!({}),
            notification_prefs: serde_json::json!({}),
            integrations: serde_json::json!({}),
            updated_at: chrono::Utc::now(),
        }))
    }

    /// Replace one settings document of a user.
    pub async fn put(
        &self,
        user_id: Uuid,
        section: Section,
        document: &serde_json::Value,
    ) -> Result<Settings> {
        let column = section.column();
        let query = format!(
            r#"INSERT INTO settings (user_id, {column}, updated_at)
                VALUES ($1, $2, NOW())
                ON CONFLICT (user_id)
                DO UPDATE SET {column} = $2, updated_at = NOW()
                RETURNING user_id, business_profile, notification_prefs, integrations, updated_at"#
        );

        Ok(sqlx::query_as::<_, Settings>(&query)
            .bind(user_id)
            .bind(document)
            .fetch_one(&self.pool)
            .await?)
    }
}
