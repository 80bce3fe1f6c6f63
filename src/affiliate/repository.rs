//! Handle database requests for the affiliate program.

use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::affiliate::{Affiliate, Commission, Referral, Tier};
use crate::error::{Result, ServerError};

const AFFILIATE_COLUMNS: &str = "id, user_id, referral_code, tier, \
     commission_rate_bps, active, total_referrals, successful_referrals, \
     total_commission_earned_cents, total_commission_paid_cents, \
     pending_commission_cents, created_at";

const COMMISSION_COLUMNS: &str = "id, affiliate_id, order_reference, \
     order_amount_cents, amount_cents, status, approved_by, approved_at, \
     payment_method, payment_reference, paid_at, created_at";

#[derive(Clone)]
pub struct AffiliateRepository {
    pool: Pool<Postgres>,
}

impl AffiliateRepository {
    /// Create a new [`AffiliateRepository`].
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Enroll a user as affiliate.
    pub async fn insert(
        &self,
        user_id: Uuid,
        referral_code: &str,
        tier: Tier,
        rate_bps: i32,
    ) -> Result<Affiliate> {
        let query = format!(
            r#"INSERT INTO affiliates (user_id, referral_code, tier, commission_rate_bps)
                VALUES ($1, $2, $3, $4)
                RETURNING {AFFILIATE_COLUMNS}"#
        );

        Ok(sqlx::query_as::<_, Affiliate>(&query)
            .bind(user_id)
            .bind(referral_code)
            .bind(tier)
            .bind(rate_bps)
            .fetch_one(&self.pool)
            .await?)
    }

    /// Find an affiliate by id.
    pub async fn find_by_id(&self, id: Uuid) -> Result<Affiliate> {
        let query =
            format!("SELECT {AFFILIATE_COLUMNS} FROM affiliates WHERE id = $1");

        sqlx::query_as::<_, Affiliate>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(ServerError::NotFound("affiliate"))
    }

    /// Find an affiliate by its referral code.
    pub async fn find_by_code(&self, code: &str) -> Result<Affiliate> {
        let query = format!(
            "SELECT {AFFILIATE_COLUMNS} FROM affiliates WHERE referral_code = $1"
        );

        sqlx::query_as::<_, Affiliate>(&query)
            .bind(code)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(ServerError::NotFound("affiliate"))
    }

    /// Paginated affiliate list.
    pub async fn list(
        &self,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Affiliate>, i64)> {
        let query = format!(
            "SELECT {AFFILIATE_COLUMNS} FROM affiliates
                ORDER BY created_at DESC LIMIT $1 OFFSET $2"
        );
        let affiliates = sqlx::query_as::<_, Affiliate>(&query)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        let total =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM affiliates")
                .fetch_one(&self.pool)
                .await?;

        Ok((affiliates, total))
    }

    /// Update tier, commission rate and active flag.
    pub async fn update(
        &self,
        id: Uuid,
        tier: Tier,
        rate_bps: i32,
        active: bool,
    ) -> Result<Affiliate> {
        let query = format!(
            r#"UPDATE affiliates
                SET tier = $1, commission_rate_bps = $2, active = $3
                WHERE id = $4
                RETURNING {AFFILIATE_COLUMNS}"#
        );

        sqlx::query_as::<_, Affiliate>(&query)
            .bind(tier)
            .bind(rate_bps)
            .bind(active)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(ServerError::NotFound("affiliate"))
    }

    /// Bulk update tier and/or active flag over a set of affiliates.
    ///
    /// Returns the number of affected rows.
    pub async fn bulk_update(
        &self,
        ids: &[Uuid],
        tier: Option<Tier>,
        active: Option<bool>,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"UPDATE affiliates
                SET tier = COALESCE($2, tier),
                    active = COALESCE($3, active)
                WHERE id = ANY($1)"#,
        )
        .bind(ids)
        .bind(tier)
        .bind(active)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Remove an affiliate with its referrals and commissions.
    pub async fn delete(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM affiliates WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() != 1 {
            return Err(ServerError::NotFound("affiliate"));
        }

        Ok(())
    }

    /// Track a new referral and bump `total_referrals` together.
    pub async fn add_referral(
        &self,
        affiliate_id: Uuid,
        referred_email_hash: &str,
    ) -> Result<Referral> {
        let mut tx = self.pool.begin().await?;

        let referral = sqlx::query_as::<_, Referral>(
            r#"INSERT INTO referrals (affiliate_id, referred_email_hash)
                VALUES ($1, $2)
                RETURNING id, affiliate_id, referred_email_hash, converted, created_at"#,
        )
        .bind(affiliate_id)
        .bind(referred_email_hash)
        .fetch_one(&mut *tx)
        .await?;

        let result = sqlx::query(
            r#"UPDATE affiliates SET total_referrals = total_referrals + 1 WHERE id = $1"#,
        )
        .bind(affiliate_id)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() != 1 {
            tx.rollback().await?;
            return Err(ServerError::NotFound("affiliate"));
        }

        tx.commit().await?;
        Ok(referral)
    }

    /// Commissions of an affiliate, newest first.
    pub async fn list_commissions(
        &self,
        affiliate_id: Uuid,
    ) -> Result<Vec<Commission>> {
        let query = format!(
            "SELECT {COMMISSION_COLUMNS} FROM commissions
                WHERE affiliate_id = $1 ORDER BY created_at DESC"
        );

        Ok(sqlx::query_as::<_, Commission>(&query)
            .bind(affiliate_id)
            .fetch_all(&self.pool)
            .await?)
    }

    /// Sum of pending commission amounts across all affiliates.
    pub async fn pending_commission_total(&self) -> Result<i64> {
        Ok(sqlx::query_scalar::<_, i64>(
            r#"SELECT COALESCE(SUM(amount_cents), 0)::BIGINT
                FROM commissions WHERE status = 'pending'"#,
        )
        .fetch_one(&self.pool)
        .await?)
    }
}
