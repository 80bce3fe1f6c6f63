//! Affiliate program: referral tracking and the commission lifecycle.

mod repository;
mod service;

pub use repository::*;
pub use service::*;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Affiliate classification, drives the default commission rate.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type,
)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "affiliate_tier", rename_all = "lowercase")]
pub enum Tier {
    #[default]
    Bronze,
    Silver,
    Gold,
    Platinum,
}

impl Tier {
    /// Default commission rate for this tier, in basis points.
    pub fn default_rate_bps(&self, defaults: &crate::config::Affiliate) -> i32 {
        match self {
            Tier::Bronze => defaults.bronze_bps,
            Tier::Silver => defaults.silver_bps,
            Tier::Gold => defaults.gold_bps,
            Tier::Platinum => defaults.platinum_bps,
        }
    }
}

/// Lifecycle status of a [`Commission`].
///
/// `pending → approved → paid`, `cancelled` reachable from `pending` only.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type,
)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "commission_status", rename_all = "lowercase")]
pub enum CommissionStatus {
    #[default]
    Pending,
    Approved,
    Paid,
    Cancelled,
}

impl std::fmt::Display for CommissionStatus {
    /// Formats with the serialized (wire and database) spelling.
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::String(status)) => f.write_str(&status),
            _ => Err(std::fmt::Error),
        }
    }
}

/// Affiliate as saved on database.
///
/// The counters are maintained transactionally by [`CommissionService`];
/// `conversion_rate` is derived, never stored.
#[derive(
    Clone, Debug, Default, PartialEq, Serialize, Deserialize, sqlx::FromRow,
)]
pub struct Affiliate {
    pub id: Uuid,
    pub user_id: Uuid,
    pub referral_code: String,
    pub tier: Tier,
    pub commission_rate_bps: i32,
    pub active: bool,
    pub total_referrals: i64,
    pub successful_referrals: i64,
    pub total_commission_earned_cents: i64,
    pub total_commission_paid_cents: i64,
    pub pending_commission_cents: i64,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl Affiliate {
    /// Share of referrals that converted, in `0.0..=1.0`.
    pub fn conversion_rate(&self) -> f64 {
        if self.total_referrals == 0 {
            0.0
        } else {
            self.successful_referrals as f64 / self.total_referrals as f64
        }
    }
}

/// A commission owed to an affiliate for a converted order.
#[derive(
    Clone, Debug, Default, PartialEq, Serialize, Deserialize, sqlx::FromRow,
)]
pub struct Commission {
    pub id: Uuid,
    pub affiliate_id: Uuid,
    pub order_reference: String,
    pub order_amount_cents: i64,
    pub amount_cents: i64,
    pub status: CommissionStatus,
    pub approved_by: Option<Uuid>,
    pub approved_at: Option<chrono::DateTime<chrono::Utc>>,
    pub payment_method: Option<String>,
    pub payment_reference: Option<String>,
    pub paid_at: Option<chrono::DateTime<chrono::Utc>>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Commission owed for an order, rounded down to the cent.
///
/// Widened arithmetic: the multiply cannot overflow, and the result fits
/// `i64` again since rates never exceed 10 000 bps.
pub fn commission_for(order_amount_cents: i64, rate_bps: i32) -> i64 {
    (i128::from(order_amount_cents) * i128::from(rate_bps) / 10_000) as i64
}

/// A referral brought in by an affiliate.
#[derive(
    Clone, Debug, Default, PartialEq, Serialize, Deserialize, sqlx::FromRow,
)]
pub struct Referral {
    pub id: Uuid,
    pub affiliate_id: Uuid,
    #[serde(skip)]
    pub referred_email_hash: String,
    pub converted: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commission_rounds_down() {
        // 10% of $99.99 is $9.999, owed $9.99.
        assert_eq!(commission_for(9999, 1000), 999);
        assert_eq!(commission_for(10_000, 1000), 1000);
        assert_eq!(commission_for(0, 1000), 0);
    }

    #[test]
    fn test_commission_survives_large_orders() {
        let half_max = i64::MAX / 2;
        assert_eq!(commission_for(half_max, 10_000), half_max);
        assert_eq!(commission_for(i64::MAX, 10_000), i64::MAX);
        assert!(commission_for(half_max, 1_000) > 0);
    }

    #[test]
    fn test_status_display_matches_wire_spelling() {
        let statuses = [
            CommissionStatus::Pending,
            CommissionStatus::Approved,
            CommissionStatus::Paid,
            CommissionStatus::Cancelled,
        ];
        for status in statuses {
            assert_eq!(
                serde_json::to_value(status).unwrap(),
                serde_json::Value::String(status.to_string())
            );
        }
    }

    #[test]
    fn test_conversion_rate_derivation() {
        let affiliate = Affiliate {
            total_referrals: 8,
            successful_referrals: 2,
            ..Default::default()
        };
        assert_eq!(affiliate.conversion_rate(), 0.25);
        assert_eq!(Affiliate::default().conversion_rate(), 0.0);
    }
}
