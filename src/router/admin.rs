//! Admin dashboard and customer management.

use axum::extract::{Path, Query, State};
use axum::routing::{get, put};
use axum::{Extension, Json, Router, middleware};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::AppState;
use crate::affiliate::AffiliateRepository;
use crate::error::Result;
use crate::notification::NotificationRepository;
use crate::payment::{Payment, PaymentRepository};
use crate::router::{Page, Pager, Valid};
use crate::subscription::{Package, SubscriptionRepository};
use crate::user::{Role, Status, User, UserRepository};

const DEFAULT_ANALYTICS_DAYS: i64 = 30;

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        // `GET /admin/dashboard` goes to `dashboard`.
        .route("/dashboard", get(dashboard))
        // `GET /admin/customers` goes to `customers`.
        .route("/customers", get(customers))
        // `PUT /admin/customers/:ID/status` goes to `set_status`.
        .route("/customers/{user_id}/status", put(set_status))
        // `PUT /admin/customers/:ID/subscription` goes to `assign_subscription`.
        .route(
            "/customers/{user_id}/subscription",
            put(assign_subscription),
        )
        // `GET /admin/orders` goes to `orders`.
        .route("/orders", get(orders))
        // `GET /admin/analytics` goes to `analytics`.
        .route("/analytics", get(analytics))
        // `GET /admin/notifications/analytics` goes to `notification_analytics`.
        .route("/notifications/analytics", get(notification_analytics))
        .route_layer(middleware::from_fn(crate::router::require_admin))
        .route_layer(middleware::from_fn_with_state(
            state,
            crate::router::auth,
        ))
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct DashboardResponse {
    pub customers: i64,
    pub subscribed: i64,
    pub pending_commission_cents: i64,
    pub unread_notifications: i64,
    pub revenue_cents_30d: i64,
}

/// Aggregate counters for the admin landing page.
async fn dashboard(
    State(state): State<AppState>,
) -> Result<Json<DashboardResponse>> {
    let pool = state.db.postgres.clone();
    let users = UserRepository::new(pool.clone());
    let cutoff = Utc::now() - Duration::days(DEFAULT_ANALYTICS_DAYS);

    Ok(Json(DashboardResponse {
        customers: users.count_by_role(Role::Customer).await?,
        subscribed: users.count_subscribed().await?,
        pending_commission_cents: AffiliateRepository::new(pool.clone())
            .pending_commission_total()
            .await?,
        unread_notifications: NotificationRepository::new(pool.clone())
            .count_unread()
            .await?,
        revenue_cents_30d: PaymentRepository::new(pool)
            .revenue_since(cutoff)
            .await?,
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct CustomerFilter {
    pub status: Option<Status>,
    pub search: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

/// Paginated customer list with optional status/search filters.
async fn customers(
    State(state): State<AppState>,
    Query(filter): Query<CustomerFilter>,
) -> Result<Json<Page<User>>> {
    let pager = Pager {
        page: filter.page,
        limit: filter.limit,
    };
    let (users, total) = UserRepository::new(state.db.postgres.clone())
        .list_customers(
            filter.status,
            filter.search,
            i64::from(pager.limit()),
            pager.offset(),
        )
        .await?;

    Ok(Json(Page::new(users, &pager, total)))
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct StatusBody {
    pub status: Status,
}

/// Handler to change a customer's account status.
async fn set_status(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Valid(body): Valid<StatusBody>,
) -> Result<Json<User>> {
    let repo = UserRepository::new(state.db.postgres.clone());
    repo.set_status(user_id, body.status).await?;

    Ok(Json(repo.find_by_id(user_id).await?))
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct SubscriptionBody {
    pub package: Package,
}

/// Assign a subscription package to a customer.
async fn assign_subscription(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Valid(body): Valid<SubscriptionBody>,
) -> Result<Json<User>> {
    let pool = state.db.postgres.clone();
    let subscription = SubscriptionRepository::new(pool.clone())
        .find_by_package(body.package)
        .await?;

    let repo = UserRepository::new(pool);
    repo.assign_subscription(user_id, subscription.id).await?;

    Ok(Json(repo.find_by_id(user_id).await?))
}

/// Paginated payments mirror, newest first.
async fn orders(
    State(state): State<AppState>,
    Query(pager): Query<Pager>,
) -> Result<Json<Page<Payment>>> {
    let (payments, total) = PaymentRepository::new(state.db.postgres.clone())
        .list(i64::from(pager.limit()), pager.offset())
        .await?;

    Ok(Json(Page::new(payments, &pager, total)))
}

#[derive(Debug, Default, Deserialize)]
pub struct AnalyticsQuery {
    pub days: Option<i64>,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsResponse {
    pub days: i64,
    pub revenue_cents: i64,
    pub payments: i64,
    pub signups: i64,
}

/// Revenue and signup aggregates over a day window.
async fn analytics(
    State(state): State<AppState>,
    Query(query): Query<AnalyticsQuery>,
) -> Result<Json<AnalyticsResponse>> {
    let days = query.days.unwrap_or(DEFAULT_ANALYTICS_DAYS).clamp(1, 365);
    let cutoff = Utc::now() - Duration::days(days);

    let payments = PaymentRepository::new(state.db.postgres.clone());
    Ok(Json(AnalyticsResponse {
        days,
        revenue_cents: payments.revenue_since(cutoff).await?,
        payments: payments.count_since(cutoff).await?,
        signups: UserRepository::new(state.db.postgres.clone())
            .count_signups_since(cutoff)
            .await?,
    }))
}

/// Notification counts by status and kind.
async fn notification_analytics(
    State(state): State<AppState>,
    Extension(_admin): Extension<User>,
) -> Result<Json<crate::notification::NotificationAnalytics>> {
    Ok(Json(
        NotificationRepository::new(state.db.postgres.clone())
            .analytics()
            .await?,
    ))
}
