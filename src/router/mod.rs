//! HTTP route tree and shared request plumbing.

pub mod admin;
pub mod affiliates;
pub mod auth;
pub mod files;
pub mod notifications;
pub mod settings;
pub mod status;
pub mod subscriptions;
pub mod users;

use axum::Json;
use axum::extract::{FromRequest, Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::error::{Result, ServerError};
use crate::user::{Role, Status, User, UserRepository};
use crate::AppState;

const BEARER: &str = "Bearer ";
const DEFAULT_LIMIT: u32 = 20;
const MAX_LIMIT: u32 = 100;

/// JSON body extractor running `validator` rules.
pub struct Valid<T>(pub T);

impl<S, T> FromRequest<S> for Valid<T>
where
    S: Send + Sync,
    T: serde::de::DeserializeOwned + Validate,
{
    type Rejection = ServerError;

    async fn from_request(req: Request, state: &S) -> Result<Self> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        value.validate()?;
        Ok(Valid(value))
    }
}

/// Custom middleware for authentification.
///
/// Resolves the bearer token to a live account and stores it as a request
/// extension.
pub async fn auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .ok_or(ServerError::Unauthorized)?;
    let token = token.strip_prefix(BEARER).unwrap_or(token);

    let claims = state
        .token
        .decode(token)
        .map_err(|_| ServerError::Unauthorized)?;
    let user_id =
        Uuid::parse_str(&claims.sub).map_err(|_| ServerError::Unauthorized)?;

    let user = UserRepository::new(state.db.postgres.clone())
        .find_by_id(user_id)
        .await
        .map_err(|_| ServerError::Unauthorized)?;

    // A suspension takes effect even on tokens issued before it.
    if user.status == Status::Suspended {
        return Err(ServerError::Forbidden);
    }

    req.extensions_mut().insert::<User>(user);
    Ok(next.run(req).await)
}

/// Gate a route family behind the admin role. Run after [`auth`].
pub async fn require_admin(req: Request, next: Next) -> Result<Response> {
    match req.extensions().get::<User>() {
        Some(user) if user.role == Role::Admin => Ok(next.run(req).await),
        Some(_) => Err(ServerError::Forbidden),
        None => Err(ServerError::Unauthorized),
    }
}

/// `page`/`limit` query parameters of list endpoints.
#[derive(Clone, Copy, Debug, Default, Deserialize)]
pub struct Pager {
    pub(crate) page: Option<u32>,
    pub(crate) limit: Option<u32>,
}

impl Pager {
    /// 1-based page number.
    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn limit(&self) -> u32 {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page() - 1) * i64::from(self.limit())
    }
}

/// One page of a list endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub page: u32,
    pub limit: u32,
    pub total: i64,
    pub total_pages: i64,
}

impl<T> Page<T> {
    /// Assemble a page; `total_pages = ceil(total / limit)`.
    pub fn new(data: Vec<T>, pager: &Pager, total: i64) -> Self {
        let limit = i64::from(pager.limit());
        Self {
            data,
            page: pager.page(),
            limit: pager.limit(),
            total,
            total_pages: (total + limit - 1) / limit,
        }
    }
}

#[cfg(test)]
pub(crate) fn state(pool: sqlx::PgPool) -> AppState {
    use std::sync::Arc;

    AppState {
        config: Arc::new(crate::config::Configuration::default()),
        db: crate::database::Database { postgres: pool },
        crypto: Arc::new(
            // Cheap argon2 parameters, tests only.
            crate::crypto::Crypto::new(Some(crate::config::Argon2 {
                memory_cost: 1024,
                iterations: 1,
                parallelism: 1,
                hash_length: 32,
            }))
            .expect("argon2 parameters"),
        ),
        token: crate::token::TokenManager::new("bizhub", "test-secret"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pager(page: Option<u32>, limit: Option<u32>) -> Pager {
        Pager { page, limit }
    }

    #[test]
    fn test_pager_defaults() {
        let p = pager(None, None);
        assert_eq!(p.page(), 1);
        assert_eq!(p.limit(), DEFAULT_LIMIT);
        assert_eq!(p.offset(), 0);
    }

    #[test]
    fn test_pager_offset_and_clamp() {
        let p = pager(Some(3), Some(10));
        assert_eq!(p.offset(), 20);

        let p = pager(Some(0), Some(1000));
        assert_eq!(p.page(), 1);
        assert_eq!(p.limit(), MAX_LIMIT);
    }

    #[test]
    fn test_total_pages_is_ceiling() {
        let p = pager(Some(1), Some(10));
        assert_eq!(Page::<()>::new(vec![], &p, 0).total_pages, 0);
        assert_eq!(Page::<()>::new(vec![], &p, 1).total_pages, 1);
        assert_eq!(Page::<()>::new(vec![], &p, 10).total_pages, 1);
        assert_eq!(Page::<()>::new(vec![], &p, 11).total_pages, 2);
        assert_eq!(Page::<()>::new(vec![], &p, 95).total_pages, 10);
    }
}
