//! Per-user settings HTTP API.

use axum::extract::State;
use axum::routing::get;
use axum::{Extension, Json, Router, middleware};

use crate::AppState;
use crate::error::Result;
use crate::settings::{Section, Settings, SettingsRepository};
use crate::user::User;

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        // `GET /settings` returns every document at once.
        .route("/", get(get_settings))
        .route(
            "/business-profile",
            get(get_business_profile).put(put_business_profile),
        )
        .route(
            "/notifications",
            get(get_notification_prefs).put(put_notification_prefs),
        )
        .route("/integrations", get(get_integrations).put(put_integrations))
        .route_layer(middleware::from_fn_with_state(
            state,
            crate::router::auth,
        ))
}

async fn get_settings(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> Result<Json<Settings>> {
    Ok(Json(
        SettingsRepository::new(state.db.postgres.clone())
            .get(user.id)
            .await?,
    ))
}

async fn get_section(
    state: AppState,
    user: User,
    section: Section,
) -> Result<Json<serde_json::Value>> {
    let settings = SettingsRepository::new(state.db.postgres.clone())
        .get(user.id)
        .await?;

    Ok(Json(match section {
        Section::BusinessProfile => settings.business_profile,
        Section::NotificationPrefs => settings.notification_prefs,
        Section::Integrations => settings.integrations,
    }))
}

async fn get_business_profile(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> Result<Json<serde_json::Value>> {
    get_section(state, user, Section::BusinessProfile).await
}

async fn get_notification_prefs(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> Result<Json<serde_json::Value>> {
    get_section(state, user, Section::NotificationPrefs).await
}

async fn get_integrations(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> Result<Json<serde_json::Value>> {
    get_section(state, user, Section::Integrations).await
}

async fn put_section(
    state: AppState,
    user: User,
    section: Section,
    document: serde_json::Value,
) -> Result<Json<Settings>> {
    Ok(Json(
        SettingsRepository::new(state.db.postgres.clone())
            .put(user.id, section, &document)
            .await?,
    ))
}

async fn put_business_profile(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Json(document): Json<serde_json::Value>,
) -> Result<Json<Settings>> {
    put_section(state, user, Section::BusinessProfile, document).await
}

async fn put_notification_prefs(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Json(document): Json<serde_json::Value>,
) -> Result<Json<Settings>> {
    put_section(state, user, Section::NotificationPrefs, document).await
}

async fn put_integrations(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Json(document): Json<serde_json::Value>,
) -> Result<Json<Settings>> {
    put_section(state, user, Section::Integrations, document).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::*;
    use axum::http::{Method, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::json;
    use sqlx::{Pool, Postgres};

    #[sqlx::test(fixtures("../../fixtures/base.sql"))]
    async fn test_defaults_then_partial_update(pool: Pool<Postgres>) {
        let state = router::state(pool);
        let app = app(state.clone());

        // No row yet: empty documents.
        let response = make_request(
            Some(&state),
            app.clone(),
            Method::GET,
            "/settings",
            String::default(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let body: Settings = serde_json::from_slice(&body).unwrap();
        assert_eq!(body.business_profile, json!({}));

        // Updating one document leaves the others untouched.
        let response = make_request(
            Some(&state),
            app.clone(),
            Method::PUT,
            "/settings/business-profile",
            json!({"name": "Acme", "vat": "FR123"}).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = make_request(
            Some(&state),
            app,
            Method::PUT,
            "/settings/integrations",
            json!({"slack_webhook": "https://hooks.example.com/x"}).to_string(),
        )
        .await;
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let body: Settings = serde_json::from_slice(&body).unwrap();
        assert_eq!(body.business_profile["name"], "Acme");
        assert_eq!(
            body.integrations["slack_webhook"],
            "https://hooks.example.com/x"
        );
        assert_eq!(body.notification_prefs, json!({}));
    }
}
