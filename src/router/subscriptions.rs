//! Subscription catalogue HTTP API.

use axum::extract::State;
use axum::routing::get;
use axum::{Extension, Json, Router, middleware};

use crate::AppState;
use crate::error::Result;
use crate::subscription::{Subscription, SubscriptionRepository};
use crate::user::User;

pub fn router(state: AppState) -> Router<AppState> {
    let my_routes = Router::new()
        // `GET /subscriptions/@me` goes to `me`.
        .route("/@me", get(me))
        .route_layer(middleware::from_fn_with_state(
            state,
            crate::router::auth,
        ));

    Router::new()
        // `GET /subscriptions/packages` is public.
        .route("/packages", get(packages))
        .merge(my_routes)
}

/// Public package catalogue, cheapest first.
async fn packages(
    State(state): State<AppState>,
) -> Result<Json<Vec<Subscription>>> {
    Ok(Json(
        SubscriptionRepository::new(state.db.postgres.clone())
            .list_active()
            .await?,
    ))
}

/// The caller's subscription, `null` when none was assigned.
async fn me(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> Result<Json<Option<Subscription>>> {
    let subscription = match user.subscription_id {
        Some(id) => Some(
            SubscriptionRepository::new(state.db.postgres.clone())
                .find_by_id(id)
                .await?,
        ),
        None => None,
    };

    Ok(Json(subscription))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::*;
    use axum::http::{Method, StatusCode};
    use http_body_util::BodyExt;
    use sqlx::{Pool, Postgres};

    #[sqlx::test]
    async fn test_packages_are_public_and_sorted(pool: Pool<Postgres>) {
        let state = router::state(pool);
        let app = app(state);

        let response = make_request(
            None,
            app,
            Method::GET,
            "/subscriptions/packages",
            String::default(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let body: Vec<Subscription> = serde_json::from_slice(&body).unwrap();
        assert_eq!(body.len(), 4);
        assert!(body.windows(2).all(|w| w[0].price_cents <= w[1].price_cents));
        assert_eq!(body[0].package, subscription::Package::Starter);
    }

    #[sqlx::test(fixtures("../../fixtures/base.sql"))]
    async fn test_me_without_subscription_is_null(pool: Pool<Postgres>) {
        let state = router::state(pool);
        let app = app(state.clone());

        let response = make_request(
            Some(&state),
            app,
            Method::GET,
            "/subscriptions/@me",
            String::default(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(body.is_null());
    }
}
