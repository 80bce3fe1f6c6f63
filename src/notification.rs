//! Per-user notifications.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::error::{Result, ServerError};
use crate::user::Role;

const COLUMNS: &str = "id, user_id, audience, title, body, kind, status, \
     read_at, expires_at, created_at";

/// Lifecycle status of a [`Notification`].
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type,
)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "notification_status", rename_all = "lowercase")]
pub enum NotificationStatus {
    #[default]
    Unread,
    Read,
    Archived,
    Dismissed,
}

/// Notification as saved on database.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Role audience the notification was broadcast to, if any.
    pub audience: Option<Role>,
    pub title: String,
    pub body: String,
    pub kind: String,
    pub status: NotificationStatus,
    pub read_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Counts surfaced by the admin analytics endpoint.
#[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NotificationAnalytics {
    pub total: i64,
    pub unread: i64,
    pub read: i64,
    pub archived: i64,
    pub dismissed: i64,
    pub by_kind: Vec<KindCount>,
}

#[derive(Debug, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct KindCount {
    pub kind: String,
    pub count: i64,
}

#[derive(Clone)]
pub struct NotificationRepository {
    pool: Pool<Postgres>,
}

impl NotificationRepository {
    /// Create a new [`NotificationRepository`].
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Create a notification for a single user.
    pub async fn insert(
        &self,
        user_id: Uuid,
        title: &str,
        body: &str,
        kind: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Notification> {
        let query = format!(
            r#"INSERT INTO notifications (user_id, title, body, kind, expires_at)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING {COLUMNS}"#
        );

        Ok(sqlx::query_as::<_, Notification>(&query)
            .bind(user_id)
            .bind(title)
            .bind(body)
            .bind(kind)
            .bind(expires_at)
            .fetch_one(&self.pool)
            .await?)
    }

    /// Broadcast a notification to every non-deleted user with a role.
    ///
    /// One row per recipient so read state stays per-user. Returns the
    /// number of created notifications.
    pub async fn insert_for_audience(
        &self,
        audience: Role,
        title: &str,
        body: &str,
        kind: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"INSERT INTO notifications (user_id, audience, title, body, kind, expires_at)
                SELECT id, $1, $2, $3, $4, $5 FROM users
                WHERE role = $1 AND deleted_at IS NULL"#,
        )
        .bind(audience)
        .bind(title)
        .bind(body)
        .bind(kind)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Notifications of a user, expired ones excluded.
    pub async fn list_for_user(
        &self,
        user_id: Uuid,
        status: Option<NotificationStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Notification>, i64)> {
        const FILTER: &str = r#"FROM notifications
            WHERE user_id = $1
              AND ($2::notification_status IS NULL OR status = $2)
              AND (expires_at IS NULL OR expires_at > NOW())"#;

        let query = format!(
            "SELECT {COLUMNS} {FILTER} ORDER BY created_at DESC LIMIT $3 OFFSET $4"
        );
        let notifications = sqlx::query_as::<_, Notification>(&query)
            .bind(user_id)
            .bind(status)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        let count = format!("SELECT COUNT(*) {FILTER}");
        let total = sqlx::query_scalar::<_, i64>(&count)
            .bind(user_id)
            .bind(status)
            .fetch_one(&self.pool)
            .await?;

        Ok((notifications, total))
    }

    /// Mark one notification read.
    ///
    /// Idempotent: `read_at` keeps its first value on repeated calls.
    pub async fn mark_read(
        &self,
        id: Uuid,
        user_id: Uuid,
    ) -> Result<Notification> {
        let query = format!(
            r#"UPDATE notifications
                SET status = 'read', read_at = COALESCE(read_at, NOW())
                WHERE id = $1 AND user_id = $2 AND status IN ('unread', 'read')
                RETURNING {COLUMNS}"#
        );

        sqlx::query_as::<_, Notification>(&query)
            .bind(id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(ServerError::NotFound("notification"))
    }

    /// Mark every unread notification of a user read.
    pub async fn mark_all_read(&self, user_id: Uuid) -> Result<u64> {
        let result = sqlx::query(
            r#"UPDATE notifications
                SET status = 'read', read_at = COALESCE(read_at, NOW())
                WHERE user_id = $1 AND status = 'unread'"#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Move a notification to `archived` or `dismissed`.
    pub async fn set_status(
        &self,
        id: Uuid,
        user_id: Uuid,
        status: NotificationStatus,
    ) -> Result<Notification> {
        let query = format!(
            r#"UPDATE notifications SET status = $3
                WHERE id = $1 AND user_id = $2
                RETURNING {COLUMNS}"#
        );

        sqlx::query_as::<_, Notification>(&query)
            .bind(id)
            .bind(user_id)
            .bind(status)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(ServerError::NotFound("notification"))
    }

    /// Delete a notification of a user.
    pub async fn delete(&self, id: Uuid, user_id: Uuid) -> Result<()> {
        let result = sqlx::query(
            r#"DELETE FROM notifications WHERE id = $1 AND user_id = $2"#,
        )
        .bind(id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() != 1 {
            return Err(ServerError::NotFound("notification"));
        }

        Ok(())
    }

    /// Number of unread notifications across all users.
    pub async fn count_unread(&self) -> Result<i64> {
        Ok(sqlx::query_scalar::<_, i64>(
            r#"SELECT COUNT(*) FROM notifications WHERE status = 'unread'"#,
        )
        .fetch_one(&self.pool)
        .await?)
    }

    /// Counts by status and kind, for the admin analytics view.
    pub async fn analytics(&self) -> Result<NotificationAnalytics> {
        let (total, unread, read, archived, dismissed) =
            sqlx::query_as::<_, (i64, i64, i64, i64, i64)>(
                r#"SELECT COUNT(*),
                        COUNT(*) FILTER (WHERE status = 'unread'),
                        COUNT(*) FILTER (WHERE status = 'read'),
                        COUNT(*) FILTER (WHERE status = 'archived'),
                        COUNT(*) FILTER (WHERE status = 'dismissed')
                    FROM notifications"#,
            )
            .fetch_one(&self.pool)
            .await?;

        let by_kind = sqlx::query_as::<_, KindCount>(
            r#"SELECT kind, COUNT(*) AS count FROM notifications
                GROUP BY kind ORDER BY count DESC"#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(NotificationAnalytics {
            total,
            unread,
            read,
            archived,
            dismissed,
            by_kind,
        })
    }
}
