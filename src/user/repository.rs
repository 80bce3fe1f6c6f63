//! Handle database requests.

use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::error::{Result, ServerError};
use crate::user::{Role, Status, User};

const COLUMNS: &str = "id, username, email, email_hash, password, role, \
     status, locale, company, phone, address, subscription_id, created_at, \
     deleted_at";

#[derive(Clone)]
pub struct UserRepository {
    pool: Pool<Postgres>,
}

impl UserRepository {
    /// Create a new [`UserRepository`].
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Insert [`User`] into database.
    ///
    /// A duplicate email surfaces as [`ServerError::EmailTaken`].
    pub async fn insert(&self, user: &User) -> Result<User> {
        let query = format!(
            r#"INSERT INTO users
                (username, email, email_hash, password, role, locale, company, phone)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                RETURNING {COLUMNS}"#
        );

        sqlx::query_as::<_, User>(&query)
            .bind(&user.username)
            .bind(&user.email)
            .bind(&user.email_hash)
            .bind(&user.password)
            .bind(user.role)
            .bind(&user.locale)
            .bind(&user.company)
            .bind(&user.phone)
            .fetch_one(&self.pool)
            .await
            .map_err(|err| match &err {
                sqlx::Error::Database(db) if db.is_unique_violation() => {
                    ServerError::EmailTaken
                },
                _ => err.into(),
            })
    }

    /// Find current user using `id` field.
    pub async fn find_by_id(&self, user_id: Uuid) -> Result<User> {
        let query = format!("SELECT {COLUMNS} FROM users WHERE id = $1");

        let user = sqlx::query_as::<_, User>(&query)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(ServerError::NotFound("user"))?;

        if user.deleted_at.is_some() {
            return Err(ServerError::NotFound("user"));
        }

        Ok(user)
    }

    /// Find current user using the email digest.
    pub async fn find_by_email_hash(
        &self,
        email_hash: &str,
    ) -> Result<Option<User>> {
        let query =
            format!("SELECT {COLUMNS} FROM users WHERE email_hash = $1 AND deleted_at IS NULL");

        Ok(sqlx::query_as::<_, User>(&query)
            .bind(email_hash)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// Update profile fields of current user.
    pub async fn update(&self, user: &User) -> Result<()> {
        sqlx::query(
            r#"UPDATE users
                SET username = $1, email = $2, email_hash = $3, password = $4,
                    locale = $5, company = $6, phone = $7, address = $8
                WHERE id = $9"#,
        )
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.email_hash)
        .bind(&user.password)
        .bind(&user.locale)
        .bind(&user.company)
        .bind(&user.phone)
        .bind(&user.address)
        .bind(user.id)
        .execute(&self.pool)
        .await
        .map_err(|err| match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                ServerError::EmailTaken
            },
            _ => err.into(),
        })?;

        Ok(())
    }

    /// Update account status, admin action.
    pub async fn set_status(&self, user_id: Uuid, status: Status) -> Result<()> {
        let result = sqlx::query(
            r#"UPDATE users SET status = $1 WHERE id = $2 AND deleted_at IS NULL"#,
        )
        .bind(status)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() != 1 {
            return Err(ServerError::NotFound("user"));
        }

        Ok(())
    }

    /// Attach a subscription package to a user.
    pub async fn assign_subscription(
        &self,
        user_id: Uuid,
        subscription_id: Uuid,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"UPDATE users SET subscription_id = $1 WHERE id = $2 AND deleted_at IS NULL"#,
        )
        .bind(subscription_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() != 1 {
            return Err(ServerError::NotFound("user"));
        }

        Ok(())
    }

    /// Delete current user. Soft delete with retention.
    pub async fn delete(&self, user_id: Uuid) -> Result<()> {
        sqlx::query(r#"UPDATE users SET deleted_at = NOW() WHERE id = $1"#)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Paginated customer list with optional status and search filters.
    pub async fn list_customers(
        &self,
        status: Option<Status>,
        search: Option<String>,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<User>, i64)> {
        const FILTER: &str = r#"FROM users
            WHERE role = 'customer' AND deleted_at IS NULL
              AND ($1::user_status IS NULL OR status = $1)
              AND ($2::text IS NULL
                   OR username ILIKE '%' || $2 || '%'
                   OR email ILIKE '%' || $2 || '%')"#;

        let query = format!(
            "SELECT {COLUMNS} {FILTER} ORDER BY created_at DESC LIMIT $3 OFFSET $4"
        );
        let users = sqlx::query_as::<_, User>(&query)
            .bind(status)
            .bind(&search)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        let count = format!("SELECT COUNT(*) {FILTER}");
        let total = sqlx::query_scalar::<_, i64>(&count)
            .bind(status)
            .bind(&search)
            .fetch_one(&self.pool)
            .await?;

        Ok((users, total))
    }

    /// Number of non-deleted accounts with a given role.
    pub async fn count_by_role(&self, role: Role) -> Result<i64> {
        Ok(sqlx::query_scalar::<_, i64>(
            r#"SELECT COUNT(*) FROM users WHERE role = $1 AND deleted_at IS NULL"#,
        )
        .bind(role)
        .fetch_one(&self.pool)
        .await?)
    }

    /// Number of accounts created since a cutoff.
    pub async fn count_signups_since(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<i64> {
        Ok(sqlx::query_scalar::<_, i64>(
            r#"SELECT COUNT(*) FROM users WHERE created_at >= $1 AND deleted_at IS NULL"#,
        )
        .bind(cutoff)
        .fetch_one(&self.pool)
        .await?)
    }

    /// Number of accounts holding an active subscription.
    pub async fn count_subscribed(&self) -> Result<i64> {
        Ok(sqlx::query_scalar::<_, i64>(
            r#"SELECT COUNT(*) FROM users
                WHERE subscription_id IS NOT NULL AND deleted_at IS NULL"#,
        )
        .fetch_one(&self.pool)
        .await?)
    }

    /// Insert a refresh token linked to user into database.
    pub async fn insert_token(
        &self,
        token: &str,
        user_id: Uuid,
        ip: Option<String>,
    ) -> Result<()> {
        sqlx::query(r#"INSERT INTO tokens (token, user_id, ip) VALUES ($1, $2, $3)"#)
            .bind(token)
            .bind(user_id)
            .bind(ip)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Resolve the owner of a refresh token.
    ///
    /// Suspended accounts do not resolve, a refresh token cannot outlive
    /// a suspension.
    pub async fn token_owner(&self, token: &str) -> Result<Option<User>> {
        let query = r#"SELECT u.id, u.username, u.email, u.email_hash, u.password,
                    u.role, u.status, u.locale, u.company, u.phone, u.address,
                    u.subscription_id, u.created_at, u.deleted_at
                FROM tokens t
                JOIN users u ON u.id = t.user_id
                WHERE t.token = $1 AND u.deleted_at IS NULL
                  AND u.status != 'suspended'"#;

        Ok(sqlx::query_as::<_, User>(query)
            .bind(token)
            .fetch_optional(&self.pool)
            .await?)
    }
}
