//! File uploads HTTP API. Metadata in Postgres, blobs on local disk.

use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Extension, Json, Router, middleware};
use uuid::Uuid;

use crate::AppState;
use crate::error::{Result, ServerError};
use crate::files::{FileRepository, FileStore, StoredFile};
use crate::user::User;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";
// Multipart boundary and header overhead on top of the blob itself.
const BODY_OVERHEAD_BYTES: usize = 64 * 1024;

pub fn router(state: AppState) -> Router<AppState> {
    let max_size = state.config.uploads.max_size_bytes;

    Router::new()
        // `POST /files` uploads, `GET /files` lists the caller's files.
        .route("/", get(list).post(upload))
        .route("/{file_id}", axum::routing::delete(delete))
        .layer(DefaultBodyLimit::max(max_size + BODY_OVERHEAD_BYTES))
        .route_layer(middleware::from_fn_with_state(
            state,
            crate::router::auth,
        ))
}

async fn list(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> Result<Json<Vec<StoredFile>>> {
    Ok(Json(
        FileRepository::new(state.db.postgres.clone())
            .list_for_owner(user.id)
            .await?,
    ))
}

/// Handler to upload one file as the `file` part of a multipart form.
async fn upload(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<StoredFile>)> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ServerError::ParsingForm(Box::new(err)))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field
            .file_name()
            .map(ToOwned::to_owned)
            .unwrap_or_else(|| "unnamed".to_owned());
        let content_type = field
            .content_type()
            .map(ToOwned::to_owned)
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_owned());

        let data = field
            .bytes()
            .await
            .map_err(|err| ServerError::ParsingForm(Box::new(err)))?;
        if data.len() > state.config.uploads.max_size_bytes {
            return Err(ServerError::FileTooLarge);
        }

        let store = FileStore::new(&state.config.uploads.directory);
        let storage_path = store.save(Uuid::new_v4(), &data).await?;

        let file = FileRepository::new(state.db.postgres.clone())
            .insert(
                user.id,
                &file_name,
                &content_type,
                data.len() as i64,
                &storage_path,
            )
            .await?;

        return Ok((StatusCode::CREATED, Json(file)));
    }

    Err(ServerError::ParsingForm(
        "missing `file` part in multipart form".into(),
    ))
}

/// Delete a file's metadata row and its blob.
async fn delete(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(file_id): Path<Uuid>,
) -> Result<StatusCode> {
    let repo = FileRepository::new(state.db.postgres.clone());
    let file = repo.find(file_id, user.id).await?;

    repo.delete(file_id, user.id).await?;
    FileStore::new(&state.config.uploads.directory)
        .remove(&file.storage_path)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::*;
    use axum::body::Body;
    use axum::http::{Method, Request, header};
    use http_body_util::BodyExt;
    use sqlx::{Pool, Postgres};
    use tower::ServiceExt;

    const BOUNDARY: &str = "bizhub-test-boundary";

    fn multipart_body(file_name: &str, data: &[u8]) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; \
                 name=\"file\"; filename=\"{file_name}\"\r\n\
                 Content-Type: text/plain\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    async fn send_upload(
        state: &AppState,
        app: axum::Router,
        file_name: &str,
        data: &[u8],
    ) -> axum::response::Response {
        let token = state
            .token
            .create("00000000-0000-0000-0000-000000000001", user::Role::Admin)
            .unwrap();

        app.oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/files")
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={BOUNDARY}"),
                )
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::from(multipart_body(file_name, data)))
                .unwrap(),
        )
        .await
        .unwrap()
    }

    #[sqlx::test(fixtures("../../fixtures/base.sql"))]
    async fn test_upload_list_delete(pool: Pool<Postgres>) {
        let state = router::state(pool);
        let app = app(state.clone());

        let response =
            send_upload(&state, app.clone(), "notes.txt", b"hello there").await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let file: StoredFile = serde_json::from_slice(&body).unwrap();
        assert_eq!(file.file_name, "notes.txt");
        assert_eq!(file.size_bytes, 11);
        assert!(tokio::fs::try_exists(&file.storage_path).await.unwrap());

        let response = make_request(
            Some(&state),
            app.clone(),
            Method::GET,
            "/files",
            String::default(),
        )
        .await;
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let files: Vec<StoredFile> = serde_json::from_slice(&body).unwrap();
        assert_eq!(files.len(), 1);

        let path = format!("/files/{}", file.id);
        let response = make_request(
            Some(&state),
            app,
            Method::DELETE,
            &path,
            String::default(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(!tokio::fs::try_exists(&file.storage_path).await.unwrap());
    }

    #[sqlx::test(fixtures("../../fixtures/base.sql"))]
    async fn test_oversized_upload_is_rejected(pool: Pool<Postgres>) {
        let mut config = config::Configuration::default();
        config.uploads.max_size_bytes = 16;
        let state = AppState {
            config: std::sync::Arc::new(config),
            ..router::state(pool)
        };
        let app = app(state.clone());

        let response =
            send_upload(&state, app, "big.bin", &[0_u8; 64]).await;
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
