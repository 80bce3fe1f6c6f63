//! Affiliate program HTTP API, admin only.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Extension, Json, Router, middleware};
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::AppState;
use crate::affiliate::{
    Affiliate, AffiliateRepository, Commission, CommissionService, Referral,
    Tier,
};
use crate::error::Result;
use crate::router::{Page, Pager, Valid};
use crate::user::User;

const REFERRAL_CODE_LENGTH: usize = 10;

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        // `GET /affiliates` lists, `POST /affiliates` enrolls.
        .route("/", get(list).post(enroll))
        // `PUT /affiliates/bulk` goes to `bulk_update`.
        .route("/bulk", put(bulk_update))
        .route(
            "/{affiliate_id}",
            get(get_affiliate).put(update).delete(delete),
        )
        // `POST /affiliates/:ID/referrals` tracks a new referral.
        .route("/{affiliate_id}/referrals", post(add_referral))
        // `POST /affiliates/:ID/conversions` records a converted order.
        .route("/{affiliate_id}/conversions", post(record_conversion))
        .route(
            "/{affiliate_id}/commissions/{commission_id}/approve",
            post(approve_commission),
        )
        .route(
            "/{affiliate_id}/commissions/{commission_id}/pay",
            post(pay_commission),
        )
        .route(
            "/{affiliate_id}/commissions/{commission_id}/cancel",
            post(cancel_commission),
        )
        .route_layer(middleware::from_fn(crate::router::require_admin))
        .route_layer(middleware::from_fn_with_state(
            state,
            crate::router::auth,
        ))
}

async fn list(
    State(state): State<AppState>,
    Query(pager): Query<Pager>,
) -> Result<Json<Page<Affiliate>>> {
    let (affiliates, total) = AffiliateRepository::new(state.db.postgres.clone())
        .list(i64::from(pager.limit()), pager.offset())
        .await?;

    Ok(Json(Page::new(affiliates, &pager, total)))
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct EnrollBody {
    pub user_id: Uuid,
    #[serde(default)]
    pub tier: Tier,
    /// Overrides the tier's default rate when set.
    #[validate(range(min = 0, max = 10_000))]
    pub commission_rate_bps: Option<i32>,
}

/// Enroll a user in the affiliate program with a fresh referral code.
async fn enroll(
    State(state): State<AppState>,
    Valid(body): Valid<EnrollBody>,
) -> Result<(StatusCode, Json<Affiliate>)> {
    let rate_bps = body
        .commission_rate_bps
        .unwrap_or_else(|| body.tier.default_rate_bps(&state.config.affiliate));
    let code = referral_code();

    let affiliate = AffiliateRepository::new(state.db.postgres.clone())
        .insert(body.user_id, &code, body.tier, rate_bps)
        .await?;

    Ok((StatusCode::CREATED, Json(affiliate)))
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct AffiliateDetail {
    #[serde(flatten)]
    pub affiliate: Affiliate,
    pub conversion_rate: f64,
    pub commissions: Vec<Commission>,
}

/// Affiliate with its derived conversion rate and commission history.
async fn get_affiliate(
    State(state): State<AppState>,
    Path(affiliate_id): Path<Uuid>,
) -> Result<Json<AffiliateDetail>> {
    let repo = AffiliateRepository::new(state.db.postgres.clone());
    let affiliate = repo.find_by_id(affiliate_id).await?;
    let commissions = repo.list_commissions(affiliate_id).await?;

    Ok(Json(AffiliateDetail {
        conversion_rate: affiliate.conversion_rate(),
        affiliate,
        commissions,
    }))
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct UpdateBody {
    pub tier: Tier,
    #[validate(range(min = 0, max = 10_000))]
    pub commission_rate_bps: i32,
    pub active: bool,
}

async fn update(
    State(state): State<AppState>,
    Path(affiliate_id): Path<Uuid>,
    Valid(body): Valid<UpdateBody>,
) -> Result<Json<Affiliate>> {
    let affiliate = AffiliateRepository::new(state.db.postgres.clone())
        .update(affiliate_id, body.tier, body.commission_rate_bps, body.active)
        .await?;

    Ok(Json(affiliate))
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct BulkBody {
    #[validate(length(min = 1))]
    pub ids: Vec<Uuid>,
    pub tier: Option<Tier>,
    pub active: Option<bool>,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct BulkResponse {
    pub updated: u64,
}

/// Apply a tier and/or active change to a set of affiliates at once.
async fn bulk_update(
    State(state): State<AppState>,
    Valid(body): Valid<BulkBody>,
) -> Result<Json<BulkResponse>> {
    let updated = AffiliateRepository::new(state.db.postgres.clone())
        .bulk_update(&body.ids, body.tier, body.active)
        .await?;

    Ok(Json(BulkResponse { updated }))
}

async fn delete(
    State(state): State<AppState>,
    Path(affiliate_id): Path<Uuid>,
) -> Result<StatusCode> {
    AffiliateRepository::new(state.db.postgres.clone())
        .delete(affiliate_id)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct ReferralBody {
    #[validate(email)]
    pub referred_email: String,
}

/// Track a referral. The referred address is only kept as a digest.
async fn add_referral(
    State(state): State<AppState>,
    Path(affiliate_id): Path<Uuid>,
    Valid(body): Valid<ReferralBody>,
) -> Result<(StatusCode, Json<Referral>)> {
    let referral = AffiliateRepository::new(state.db.postgres.clone())
        .add_referral(affiliate_id, &state.crypto.digest(&body.referred_email))
        .await?;

    Ok((StatusCode::CREATED, Json(referral)))
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct ConversionBody {
    #[validate(length(min = 1, max = 255))]
    pub order_reference: String,
    #[validate(range(min = 1))]
    pub order_amount_cents: i64,
    pub referral_id: Option<Uuid>,
}

/// Record a converted order, creating a `pending` commission.
async fn record_conversion(
    State(state): State<AppState>,
    Path(affiliate_id): Path<Uuid>,
    Valid(body): Valid<ConversionBody>,
) -> Result<(StatusCode, Json<Commission>)> {
    let commission = CommissionService::new(state.db.postgres.clone())
        .record_conversion(
            affiliate_id,
            &body.order_reference,
            body.order_amount_cents,
            body.referral_id,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(commission)))
}

async fn approve_commission(
    State(state): State<AppState>,
    Extension(admin): Extension<User>,
    Path((affiliate_id, commission_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Commission>> {
    let commission = CommissionService::new(state.db.postgres.clone())
        .approve(affiliate_id, commission_id, admin.id)
        .await?;

    Ok(Json(commission))
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct PayBody {
    #[validate(length(min = 1, max = 64))]
    pub payment_method: String,
    #[validate(length(min = 1, max = 255))]
    pub payment_reference: String,
}

async fn pay_commission(
    State(state): State<AppState>,
    Path((affiliate_id, commission_id)): Path<(Uuid, Uuid)>,
    Valid(body): Valid<PayBody>,
) -> Result<Json<Commission>> {
    let commission = CommissionService::new(state.db.postgres.clone())
        .pay(
            affiliate_id,
            commission_id,
            &body.payment_method,
            &body.payment_reference,
        )
        .await?;

    Ok(Json(commission))
}

async fn cancel_commission(
    State(state): State<AppState>,
    Path((affiliate_id, commission_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Commission>> {
    let commission = CommissionService::new(state.db.postgres.clone())
        .cancel(affiliate_id, commission_id)
        .await?;

    Ok(Json(commission))
}

fn referral_code() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(REFERRAL_CODE_LENGTH)
        .map(|byte| char::from(byte).to_ascii_uppercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::*;
    use axum::http::Method;
    use http_body_util::BodyExt;
    use serde_json::json;
    use sqlx::{Pool, Postgres};

    const AFFILIATE: &str = "a0a00000-0000-0000-0000-000000000001";

    #[test]
    fn test_referral_code_shape() {
        let code = referral_code();
        assert_eq!(code.len(), REFERRAL_CODE_LENGTH);
        assert!(code.chars().all(|c| c.is_ascii_alphanumeric()));
        assert!(!code.chars().any(|c| c.is_ascii_lowercase()));
    }

    #[sqlx::test(fixtures("../../fixtures/base.sql"))]
    async fn test_enroll_uses_tier_default_rate(pool: Pool<Postgres>) {
        let state = router::state(pool);
        let app = app(state.clone());

        let response = make_request(
            Some(&state),
            app,
            Method::POST,
            "/affiliates",
            json!({
                "user_id": "00000000-0000-0000-0000-000000000003",
                "tier": "silver",
            })
            .to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let body: Affiliate = serde_json::from_slice(&body).unwrap();
        assert_eq!(body.tier, Tier::Silver);
        assert_eq!(
            body.commission_rate_bps,
            Tier::Silver.default_rate_bps(&config::Affiliate::default())
        );
        assert_eq!(body.referral_code.len(), REFERRAL_CODE_LENGTH);
    }

    #[sqlx::test(fixtures("../../fixtures/base.sql"))]
    async fn test_conversion_then_invalid_pay_conflicts(pool: Pool<Postgres>) {
        let state = router::state(pool);
        let app = app(state.clone());

        let path = format!("/affiliates/{AFFILIATE}/conversions");
        let response = make_request(
            Some(&state),
            app.clone(),
            Method::POST,
            &path,
            json!({"order_reference": "order-9", "order_amount_cents": 20_000})
                .to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let commission: affiliate::Commission =
            serde_json::from_slice(&body).unwrap();
        assert_eq!(commission.amount_cents, 2_000);

        // Paying a commission that was never approved is refused.
        let path =
            format!("/affiliates/{AFFILIATE}/commissions/{}/pay", commission.id);
        let response = make_request(
            Some(&state),
            app,
            Method::POST,
            &path,
            json!({"payment_method": "bank_transfer", "payment_reference": "tx-1"})
                .to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["status"], 409);
    }

    #[sqlx::test(fixtures("../../fixtures/base.sql"))]
    async fn test_detail_exposes_conversion_rate(pool: Pool<Postgres>) {
        let state = router::state(pool);
        let app = app(state.clone());

        let path = format!("/affiliates/{AFFILIATE}/conversions");
        let response = make_request(
            Some(&state),
            app.clone(),
            Method::POST,
            &path,
            json!({
                "order_reference": "order-1",
                "order_amount_cents": 10_000,
                "referral_id": "b0b00000-0000-0000-0000-000000000001",
            })
            .to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let path = format!("/affiliates/{AFFILIATE}");
        let response =
            make_request(Some(&state), app, Method::GET, &path, String::default())
                .await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        // One of the two fixture referrals converted.
        assert_eq!(body["conversion_rate"], 0.5);
        assert_eq!(body["commissions"].as_array().unwrap().len(), 1);
    }

    #[sqlx::test(fixtures("../../fixtures/base.sql"))]
    async fn test_bulk_update(pool: Pool<Postgres>) {
        let state = router::state(pool.clone());
        let app = app(state.clone());

        let response = make_request(
            Some(&state),
            app,
            Method::PUT,
            "/affiliates/bulk",
            json!({"ids": [AFFILIATE], "active": false}).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let body: BulkResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(body.updated, 1);

        let active = sqlx::query_scalar::<_, bool>(
            "SELECT active FROM affiliates WHERE referral_code = 'CAROL10'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert!(!active);
    }
}
