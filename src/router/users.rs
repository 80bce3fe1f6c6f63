//! Users-related HTTP API.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Extension, Json, Router, middleware};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::AppState;
use crate::error::{Result, ServerError};
use crate::router::Valid;
use crate::user::{Role, User, UserBuilder, UserRepository, UserService};

pub fn router(state: AppState) -> Router<AppState> {
    let admin_routes = Router::new()
        // `POST /users` creates an account with an explicit role.
        .route("/", post(create))
        .route_layer(middleware::from_fn(crate::router::require_admin));

    Router::new()
        // `GET /users/@me` goes to `me`.
        .route("/@me", get(me).patch(update).delete(delete))
        // `GET /users/:ID` goes to `get_user`.
        .route("/{user_id}", get(get_user))
        .merge(admin_routes)
        .route_layer(middleware::from_fn_with_state(
            state,
            crate::router::auth,
        ))
}

async fn me(Extension(user): Extension<User>) -> Json<User> {
    Json(user)
}

/// Fetch a profile. Restricted to the owner and admins.
async fn get_user(
    State(state): State<AppState>,
    Extension(caller): Extension<User>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<User>> {
    if caller.id != user_id && caller.role != Role::Admin {
        return Err(ServerError::Forbidden);
    }

    let user = UserRepository::new(state.db.postgres.clone())
        .find_by_id(user_id)
        .await?;
    Ok(Json(user))
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CreateBody {
    #[validate(length(min = 2, max = 50))]
    pub username: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8, max = 255))]
    pub password: String,
    pub role: Role,
    pub company: Option<String>,
}

/// Admin handler to create user with an explicit role.
async fn create(
    State(state): State<AppState>,
    Valid(body): Valid<CreateBody>,
) -> Result<(StatusCode, Json<User>)> {
    let user = UserBuilder::new()
        .username(&body.username)
        .role(body.role)
        .company(body.company)
        .email(&body.email)
        .password(&body.password)
        .build(state.db.postgres.clone(), state.crypto.clone())
        .create()
        .await?;

    Ok((StatusCode::CREATED, Json(user.data)))
}

#[derive(Debug, Default, Serialize, Deserialize, Validate)]
pub struct UpdateBody {
    #[validate(length(min = 2, max = 50))]
    pub username: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(min = 8, max = 255))]
    pub new_password: Option<String>,
    /// Current password, required for email or password changes.
    pub password: Option<String>,
    #[validate(length(equal = 2))]
    pub locale: Option<String>,
    pub company: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

/// Handler to let users modify their profile.
async fn update(
    State(state): State<AppState>,
    Extension(mut user): Extension<User>,
    Valid(body): Valid<UpdateBody>,
) -> Result<Json<User>> {
    // Sensitive changes require password confirmation.
    if body.email.is_some() || body.new_password.is_some() {
        let confirmed = body
            .password
            .as_deref()
            .is_some_and(|p| state.crypto.verify_password(p, &user.password));
        if !confirmed {
            return Err(ServerError::InvalidCredentials);
        }
    }

    if let Some(username) = body.username {
        user.username = username;
    }
    if let Some(email) = body.email {
        user.email_hash = state.crypto.digest(&email);
        user.email = email;
    }
    if let Some(new_password) = body.new_password {
        user.password = state.crypto.hash_password(&new_password)?;
    }
    if let Some(locale) = body.locale {
        user.locale = locale;
    }
    if body.company.is_some() {
        user.company = body.company;
    }
    if body.phone.is_some() {
        user.phone = body.phone;
    }
    if body.address.is_some() {
        user.address = body.address;
    }

    UserRepository::new(state.db.postgres.clone())
        .update(&user)
        .await?;

    Ok(Json(user))
}

/// Handler to soft-delete the caller's account.
async fn delete(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> Result<StatusCode> {
    UserService::new(user, state.db.postgres.clone(), state.crypto.clone())
        .delete()
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::*;
    use axum::http::Method;
    use http_body_util::BodyExt;
    use serde_json::json;
    use sqlx::{Pool, Postgres};

    #[sqlx::test(fixtures("../../fixtures/base.sql"))]
    async fn test_me_requires_token(pool: Pool<Postgres>) {
        let state = router::state(pool);
        let app = app(state);

        let response =
            make_request(None, app, Method::GET, "/users/@me", String::default())
                .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    async fn register(app: axum::Router) -> router::auth::TokenResponse {
        let response = make_request(
            None,
            app,
            Method::POST,
            "/auth/register",
            json!({
                "username": "jane",
                "email": "jane@example.com",
                "password": "P$soW%920$n&",
            })
            .to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    #[sqlx::test]
    async fn test_email_change_requires_password_confirmation(
        pool: Pool<Postgres>,
    ) {
        let state = router::state(pool);
        let app = app(state);
        let token = register(app.clone()).await.token;

        // No confirmation at all.
        let response = make_request_with_token(
            app.clone(),
            Method::PATCH,
            "/users/@me",
            &token,
            json!({"email": "other@example.com"}).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        // Wrong current password.
        let response = make_request_with_token(
            app.clone(),
            Method::PATCH,
            "/users/@me",
            &token,
            json!({"email": "other@example.com", "password": "not-the-password"})
                .to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        // Correct current password.
        let response = make_request_with_token(
            app,
            Method::PATCH,
            "/users/@me",
            &token,
            json!({"email": "other@example.com", "password": "P$soW%920$n&"})
                .to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let body: User = serde_json::from_slice(&body).unwrap();
        assert_eq!(body.email, "other@example.com");
    }

    #[sqlx::test]
    async fn test_profile_change_needs_no_confirmation(pool: Pool<Postgres>) {
        let state = router::state(pool);
        let app = app(state);
        let token = register(app.clone()).await.token;

        let response = make_request_with_token(
            app,
            Method::PATCH,
            "/users/@me",
            &token,
            json!({"username": "janet", "company": "Acme"}).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let body: User = serde_json::from_slice(&body).unwrap();
        assert_eq!(body.username, "janet");
        assert_eq!(body.company.as_deref(), Some("Acme"));
    }

    #[sqlx::test]
    async fn test_password_change_then_login(pool: Pool<Postgres>) {
        let state = router::state(pool);
        let app = app(state);
        let token = register(app.clone()).await.token;

        let response = make_request_with_token(
            app.clone(),
            Method::PATCH,
            "/users/@me",
            &token,
            json!({"new_password": "N3w&Secr3t!pw", "password": "P$soW%920$n&"})
                .to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = make_request(
            None,
            app,
            Method::POST,
            "/auth/login",
            json!({"email": "jane@example.com", "password": "N3w&Secr3t!pw"})
                .to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[sqlx::test(fixtures("../../fixtures/base.sql"))]
    async fn test_admin_creates_staff_account(pool: Pool<Postgres>) {
        let state = router::state(pool);
        let app = app(state.clone());

        let response = make_request(
            Some(&state),
            app,
            Method::POST,
            "/users",
            json!({
                "username": "sam",
                "email": "sam@bizhub.test",
                "password": "P$soW%920$n&",
                "role": "staff",
            })
            .to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let body: User = serde_json::from_slice(&body).unwrap();
        assert_eq!(body.role, Role::Staff);
        assert_eq!(body.username, "sam");
    }
}
