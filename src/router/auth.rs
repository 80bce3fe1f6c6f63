//! Account registration and login.

use axum::{Json, Router, extract::State, http::StatusCode, routing::post};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::AppState;
use crate::error::{Result, ServerError};
use crate::router::Valid;
use crate::user::UserBuilder;

pub const TOKEN_TYPE: &str = "Bearer";

pub fn router() -> Router<AppState> {
    Router::new()
        // `POST /auth/register` goes to `register`.
        .route("/register", post(register))
        // `POST /auth/login` goes to `login`.
        .route("/login", post(login))
        // `POST /auth/token` exchanges a refresh token.
        .route("/token", post(refresh))
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct RegisterBody {
    #[validate(length(min = 2, max = 50))]
    pub username: String,
    #[validate(email(message = "Email must be formatted."))]
    pub email: String,
    #[validate(length(
        min = 8,
        max = 255,
        message = "Password must contain at least 8 characters."
    ))]
    pub password: String,
    #[validate(length(equal = 2, message = "Locale must be ISO 3166-1 alpha-2."))]
    pub locale: Option<String>,
    pub company: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token_type: String,
    pub token: String,
    pub refresh_token: String,
    pub expires_in: u64,
}

/// Handler to create a customer account.
async fn register(
    State(state): State<AppState>,
    Valid(body): Valid<RegisterBody>,
) -> Result<(StatusCode, Json<TokenResponse>)> {
    let user = UserBuilder::new()
        .username(&body.username)
        .locale(body.locale)
        .company(body.company)
        .phone(body.phone)
        .email(&body.email)
        .password(&body.password)
        .build(state.db.postgres.clone(), state.crypto.clone())
        .create()
        .await?;

    let refresh_token = user.generate_token().await?;
    let token = state
        .token
        .create(&user.data.id.to_string(), user.data.role)?;

    Ok((
        StatusCode::CREATED,
        Json(TokenResponse {
            token_type: TOKEN_TYPE.to_owned(),
            token,
            refresh_token,
            expires_in: crate::token::EXPIRATION_TIME,
        }),
    ))
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct LoginBody {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
}

/// Handler to login, issues a signed token with a fixed expiry.
async fn login(
    State(state): State<AppState>,
    Valid(body): Valid<LoginBody>,
) -> Result<Json<TokenResponse>> {
    let user = UserBuilder::new()
        .email(&body.email)
        .password(&body.password)
        .build(state.db.postgres.clone(), state.crypto.clone())
        .authenticate(&body.password)
        .await?;

    let refresh_token = user.generate_token().await?;
    let token = state
        .token
        .create(&user.data.id.to_string(), user.data.role)?;

    Ok(Json(TokenResponse {
        token_type: TOKEN_TYPE.to_owned(),
        token,
        refresh_token,
        expires_in: crate::token::EXPIRATION_TIME,
    }))
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct RefreshBody {
    #[validate(length(equal = 64))]
    pub refresh_token: String,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct AccessTokenResponse {
    pub token_type: String,
    pub token: String,
    pub expires_in: u64,
}

/// Exchange a refresh token for a fresh access token.
async fn refresh(
    State(state): State<AppState>,
    Valid(body): Valid<RefreshBody>,
) -> Result<Json<AccessTokenResponse>> {
    let user = crate::user::UserRepository::new(state.db.postgres.clone())
        .token_owner(&body.refresh_token)
        .await?
        .ok_or(ServerError::Unauthorized)?;

    let token = state.token.create(&user.id.to_string(), user.role)?;

    Ok(Json(AccessTokenResponse {
        token_type: TOKEN_TYPE.to_owned(),
        token,
        expires_in: crate::token::EXPIRATION_TIME,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::*;
    use axum::http::{Method, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::json;
    use sqlx::{Pool, Postgres};

    fn register_body(email: &str) -> serde_json::Value {
        json!({
            "username": "jane",
            "email": email,
            "password": "P$soW%920$n&",
        })
    }

    #[sqlx::test]
    async fn test_register_then_login(pool: Pool<Postgres>) {
        let state = router::state(pool);
        let app = app(state.clone());

        let response = make_request(
            None,
            app.clone(),
            Method::POST,
            "/auth/register",
            register_body("jane@example.com").to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let body: TokenResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(body.token_type, TOKEN_TYPE);
        assert_eq!(body.expires_in, crate::token::EXPIRATION_TIME);
        assert!(state.token.decode(&body.token).is_ok());

        let response = make_request(
            None,
            app,
            Method::POST,
            "/auth/login",
            json!({"email": "jane@example.com", "password": "P$soW%920$n&"})
                .to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[sqlx::test]
    async fn test_register_duplicate_email_conflicts(pool: Pool<Postgres>) {
        let state = router::state(pool.clone());
        let app = app(state);

        let response = make_request(
            None,
            app.clone(),
            Method::POST,
            "/auth/register",
            register_body("dup@example.com").to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);

        // Same email, different casing: still one account.
        let response = make_request(
            None,
            app,
            Method::POST,
            "/auth/register",
            register_body("Dup@Example.com").to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM users WHERE email ILIKE 'dup@example.com'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(count, 1);
    }

    #[sqlx::test]
    async fn test_refresh_exchange_issues_access_token(pool: Pool<Postgres>) {
        let state = router::state(pool);
        let app = app(state.clone());

        let response = make_request(
            None,
            app.clone(),
            Method::POST,
            "/auth/register",
            register_body("jane@example.com").to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let body: TokenResponse = serde_json::from_slice(&body).unwrap();

        let response = make_request(
            None,
            app.clone(),
            Method::POST,
            "/auth/token",
            json!({"refresh_token": body.refresh_token}).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let exchanged =
            response.into_body().collect().await.unwrap().to_bytes();
        let exchanged: AccessTokenResponse =
            serde_json::from_slice(&exchanged).unwrap();
        assert_eq!(exchanged.token_type, TOKEN_TYPE);
        assert!(state.token.decode(&exchanged.token).is_ok());

        // An unknown refresh token is refused.
        let response = make_request(
            None,
            app,
            Method::POST,
            "/auth/token",
            json!({"refresh_token": "0".repeat(64)}).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[sqlx::test]
    async fn test_suspension_revokes_both_token_paths(pool: Pool<Postgres>) {
        let state = router::state(pool.clone());
        let app = app(state);

        let response = make_request(
            None,
            app.clone(),
            Method::POST,
            "/auth/register",
            register_body("jane@example.com").to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let body: TokenResponse = serde_json::from_slice(&body).unwrap();

        sqlx::query("UPDATE users SET status = 'suspended'")
            .execute(&pool)
            .await
            .unwrap();

        // Access tokens issued before the suspension stop working.
        let response = make_request_with_token(
            app.clone(),
            Method::GET,
            "/users/@me",
            &body.token,
            String::default(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        // And the refresh token no longer exchanges.
        let response = make_request(
            None,
            app,
            Method::POST,
            "/auth/token",
            json!({"refresh_token": body.refresh_token}).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[sqlx::test]
    async fn test_login_wrong_password_is_unauthorized(pool: Pool<Postgres>) {
        let state = router::state(pool);
        let app = app(state);

        let response = make_request(
            None,
            app.clone(),
            Method::POST,
            "/auth/register",
            register_body("kate@example.com").to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = make_request(
            None,
            app,
            Method::POST,
            "/auth/login",
            json!({"email": "kate@example.com", "password": "not-the-password"})
                .to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
