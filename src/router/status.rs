//! Public instance metadata.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;

use crate::config::Configuration;

/// Handler of `/status.json`. Serializes the public part of the
/// configuration, credentials are skipped.
pub async fn status(
    State(config): State<Arc<Configuration>>,
) -> Json<Arc<Configuration>> {
    Json(config)
}

#[cfg(test)]
mod tests {
    use crate::*;
    use axum::http::{Method, StatusCode};
    use http_body_util::BodyExt;
    use sqlx::{Pool, Postgres};

    #[sqlx::test]
    async fn test_status_hides_credentials(pool: Pool<Postgres>) {
        let state = router::state(pool);
        let app = app(state);

        let response =
            make_request(None, app, Method::GET, "/status.json", String::default())
                .await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(body.get("name").is_some());
        assert!(body.get("token").is_none());
        assert!(body.get("postgres").is_none());
    }
}
