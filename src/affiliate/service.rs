//! Commission lifecycle transitions.
//!
//! Every transition is a conditional update (`WHERE status = expected`)
//! running in the same transaction as the aggregate counter changes, with
//! the affiliate row locked first. Concurrent approve/pay on one commission
//! cannot double-apply, and an out-of-order call returns
//! [`ServerError::InvalidTransition`] instead of silently succeeding.

use sqlx::{PgConnection, Pool, Postgres};
use uuid::Uuid;

use crate::affiliate::{Commission, CommissionStatus, commission_for};
use crate::error::{Result, ServerError};

const COMMISSION_RETURNING: &str = "id, affiliate_id, order_reference, \
     order_amount_cents, amount_cents, status, approved_by, approved_at, \
     payment_method, payment_reference, paid_at, created_at";

#[derive(Clone)]
pub struct CommissionService {
    pool: Pool<Postgres>,
}

impl CommissionService {
    /// Create a new [`CommissionService`].
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Record a converted order for an affiliate.
    ///
    /// Creates a `pending` commission from the affiliate's current rate and
    /// bumps `successful_referrals`, `total_commission_earned_cents` and
    /// `pending_commission_cents`. When `referral_id` is given, the matching
    /// referral row is flagged converted.
    pub async fn record_conversion(
        &self,
        affiliate_id: Uuid,
        order_reference: &str,
        order_amount_cents: i64,
        referral_id: Option<Uuid>,
    ) -> Result<Commission> {
        let mut tx = self.pool.begin().await?;

        let rate_bps = lock_affiliate(&mut *tx, affiliate_id).await?;
        let amount = commission_for(order_amount_cents, rate_bps);

        let query = format!(
            r#"INSERT INTO commissions
                (affiliate_id, order_reference, order_amount_cents, amount_cents)
                VALUES ($1, $2, $3, $4)
                RETURNING {COMMISSION_RETURNING}"#
        );
        let commission = sqlx::query_as::<_, Commission>(&query)
            .bind(affiliate_id)
            .bind(order_reference)
            .bind(order_amount_cents)
            .bind(amount)
            .fetch_one(&mut *tx)
            .await?;

        if let Some(referral_id) = referral_id {
            let result = sqlx::query(
                r#"UPDATE referrals SET converted = TRUE
                    WHERE id = $1 AND affiliate_id = $2 AND NOT converted"#,
            )
            .bind(referral_id)
            .bind(affiliate_id)
            .execute(&mut *tx)
            .await?;
            if result.rows_affected() != 1 {
                tx.rollback().await?;
                return Err(ServerError::NotFound("referral"));
            }
        }

        sqlx::query(
            r#"UPDATE affiliates
                SET successful_referrals = successful_referrals + 1,
                    total_commission_earned_cents = total_commission_earned_cents + $2,
                    pending_commission_cents = pending_commission_cents + $2
                WHERE id = $1"#,
        )
        .bind(affiliate_id)
        .bind(amount)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(commission)
    }

    /// Approve a `pending` commission. No counter change.
    pub async fn approve(
        &self,
        affiliate_id: Uuid,
        commission_id: Uuid,
        approver: Uuid,
    ) -> Result<Commission> {
        let mut tx = self.pool.begin().await?;
        lock_affiliate(&mut *tx, affiliate_id).await?;

        let query = format!(
            r#"UPDATE commissions
                SET status = 'approved', approved_by = $3, approved_at = NOW()
                WHERE id = $1 AND affiliate_id = $2 AND status = 'pending'
                RETURNING {COMMISSION_RETURNING}"#
        );
        let commission = sqlx::query_as::<_, Commission>(&query)
            .bind(commission_id)
            .bind(affiliate_id)
            .bind(approver)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(commission) = commission else {
            return Err(transition_error(&mut *tx, affiliate_id, commission_id).await?);
        };

        tx.commit().await?;
        Ok(commission)
    }

    /// Pay an `approved` commission.
    ///
    /// Moves the amount from `pending_commission_cents` to
    /// `total_commission_paid_cents`.
    pub async fn pay(
        &self,
        affiliate_id: Uuid,
        commission_id: Uuid,
        payment_method: &str,
        payment_reference: &str,
    ) -> Result<Commission> {
        let mut tx = self.pool.begin().await?;
        lock_affiliate(&mut *tx, affiliate_id).await?;

        let query = format!(
            r#"UPDATE commissions
                SET status = 'paid', payment_method = $3,
                    payment_reference = $4, paid_at = NOW()
                WHERE id = $1 AND affiliate_id = $2 AND status = 'approved'
                RETURNING {COMMISSION_RETURNING}"#
        );
        let commission = sqlx::query_as::<_, Commission>(&query)
            .bind(commission_id)
            .bind(affiliate_id)
            .bind(payment_method)
            .bind(payment_reference)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(commission) = commission else {
            return Err(transition_error(&mut *tx, affiliate_id, commission_id).await?);
        };

        sqlx::query(
            r#"UPDATE affiliates
                SET pending_commission_cents = pending_commission_cents - $2,
                    total_commission_paid_cents = total_commission_paid_cents + $2
                WHERE id = $1"#,
        )
        .bind(affiliate_id)
        .bind(commission.amount_cents)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(commission)
    }

    /// Cancel a `pending` commission.
    ///
    /// Rolls the amount out of both `pending_commission_cents` and
    /// `total_commission_earned_cents`, keeping
    /// `earned − paid == pending + approved` exact.
    pub async fn cancel(
        &self,
        affiliate_id: Uuid,
        commission_id: Uuid,
    ) -> Result<Commission> {
        let mut tx = self.pool.begin().await?;
        lock_affiliate(&mut *tx, affiliate_id).await?;

        let query = format!(
            r#"UPDATE commissions
                SET status = 'cancelled'
                WHERE id = $1 AND affiliate_id = $2 AND status = 'pending'
                RETURNING {COMMISSION_RETURNING}"#
        );
        let commission = sqlx::query_as::<_, Commission>(&query)
            .bind(commission_id)
            .bind(affiliate_id)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(commission) = commission else {
            return Err(transition_error(&mut *tx, affiliate_id, commission_id).await?);
        };

        sqlx::query(
            r#"UPDATE affiliates
                SET pending_commission_cents = pending_commission_cents - $2,
                    total_commission_earned_cents = total_commission_earned_cents - $2
                WHERE id = $1"#,
        )
        .bind(affiliate_id)
        .bind(commission.amount_cents)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(commission)
    }
}

/// Lock the affiliate row for the duration of the transaction and return
/// its commission rate.
async fn lock_affiliate(
    conn: &mut PgConnection,
    affiliate_id: Uuid,
) -> Result<i32> {
    sqlx::query_scalar::<_, i32>(
        r#"SELECT commission_rate_bps FROM affiliates WHERE id = $1 FOR UPDATE"#,
    )
    .bind(affiliate_id)
    .fetch_optional(conn)
    .await?
    .ok_or(ServerError::NotFound("affiliate"))
}

/// Build the error for a refused transition: unknown commission or a
/// status that does not match the expected one.
async fn transition_error(
    conn: &mut PgConnection,
    affiliate_id: Uuid,
    commission_id: Uuid,
) -> Result<ServerError> {
    let status = sqlx::query_scalar::<_, CommissionStatus>(
        r#"SELECT status FROM commissions WHERE id = $1 AND affiliate_id = $2"#,
    )
    .bind(commission_id)
    .bind(affiliate_id)
    .fetch_optional(conn)
    .await?;

    Ok(match status {
        Some(status) => ServerError::InvalidTransition {
            from: status.to_string(),
        },
        None => ServerError::NotFound("commission"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::affiliate::AffiliateRepository;
    use sqlx::{Pool, Postgres};

    const AFFILIATE: Uuid = Uuid::from_u128(0xA0A0_0000_0000_0000_0000_0000_0000_0001);
    const ADMIN: Uuid = Uuid::from_u128(0x0000_0000_0000_0000_0000_0000_0000_0001);

    async fn earned_minus_paid(pool: &Pool<Postgres>) -> i64 {
        sqlx::query_scalar::<_, i64>(
            r#"SELECT total_commission_earned_cents - total_commission_paid_cents
                FROM affiliates WHERE id = $1"#,
        )
        .bind(AFFILIATE)
        .fetch_one(pool)
        .await
        .unwrap()
    }

    async fn open_commissions(pool: &Pool<Postgres>) -> i64 {
        sqlx::query_scalar::<_, i64>(
            r#"SELECT COALESCE(SUM(amount_cents), 0)::BIGINT FROM commissions
                WHERE affiliate_id = $1 AND status IN ('pending', 'approved')"#,
        )
        .bind(AFFILIATE)
        .fetch_one(pool)
        .await
        .unwrap()
    }

    #[sqlx::test(fixtures("../../fixtures/base.sql"))]
    async fn test_full_lifecycle_keeps_counters_consistent(pool: Pool<Postgres>) {
        let service = CommissionService::new(pool.clone());

        // 10% of $200.00 at the fixture's 1000 bps.
        let first = service
            .record_conversion(AFFILIATE, "order-1", 20_000, None)
            .await
            .unwrap();
        assert_eq!(first.amount_cents, 2_000);
        assert_eq!(first.status, CommissionStatus::Pending);
        assert_eq!(earned_minus_paid(&pool).await, open_commissions(&pool).await);

        let second = service
            .record_conversion(AFFILIATE, "order-2", 5_000, None)
            .await
            .unwrap();

        service.approve(AFFILIATE, first.id, ADMIN).await.unwrap();
        assert_eq!(earned_minus_paid(&pool).await, open_commissions(&pool).await);

        let paid = service
            .pay(AFFILIATE, first.id, "bank_transfer", "tx-42")
            .await
            .unwrap();
        assert_eq!(paid.status, CommissionStatus::Paid);
        assert_eq!(paid.payment_reference.as_deref(), Some("tx-42"));
        assert_eq!(earned_minus_paid(&pool).await, open_commissions(&pool).await);

        service.cancel(AFFILIATE, second.id).await.unwrap();
        assert_eq!(earned_minus_paid(&pool).await, open_commissions(&pool).await);

        let affiliate = AffiliateRepository::new(pool.clone())
            .find_by_id(AFFILIATE)
            .await
            .unwrap();
        assert_eq!(affiliate.successful_referrals, 2);
        assert_eq!(affiliate.pending_commission_cents, 0);
        assert_eq!(affiliate.total_commission_paid_cents, 2_000);
    }

    #[sqlx::test(fixtures("../../fixtures/base.sql"))]
    async fn test_pay_before_approve_is_refused(pool: Pool<Postgres>) {
        let service = CommissionService::new(pool.clone());

        let commission = service
            .record_conversion(AFFILIATE, "order-1", 10_000, None)
            .await
            .unwrap();

        let err = service
            .pay(AFFILIATE, commission.id, "bank_transfer", "tx-1")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServerError::InvalidTransition { ref from } if from == "pending"
        ));

        // Nothing moved.
        let affiliate = AffiliateRepository::new(pool.clone())
            .find_by_id(AFFILIATE)
            .await
            .unwrap();
        assert_eq!(affiliate.total_commission_paid_cents, 0);
        assert_eq!(affiliate.pending_commission_cents, commission.amount_cents);
    }

    #[sqlx::test(fixtures("../../fixtures/base.sql"))]
    async fn test_cancel_only_from_pending(pool: Pool<Postgres>) {
        let service = CommissionService::new(pool.clone());

        let commission = service
            .record_conversion(AFFILIATE, "order-1", 10_000, None)
            .await
            .unwrap();
        service.approve(AFFILIATE, commission.id, ADMIN).await.unwrap();

        let err = service.cancel(AFFILIATE, commission.id).await.unwrap_err();
        assert!(matches!(err, ServerError::InvalidTransition { .. }));
    }

    #[sqlx::test(fixtures("../../fixtures/base.sql"))]
    async fn test_unknown_commission_is_not_found(pool: Pool<Postgres>) {
        let service = CommissionService::new(pool);

        let err = service
            .approve(AFFILIATE, Uuid::new_v4(), ADMIN)
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::NotFound("commission")));
    }
}
