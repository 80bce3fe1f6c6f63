//! Uploaded file metadata and local blob storage.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::error::{Result, ServerError};

const COLUMNS: &str =
    "id, owner_id, file_name, content_type, size_bytes, storage_path, created_at";

/// File metadata as saved on database. The blob lives on disk.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct StoredFile {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: i64,
    #[serde(skip)]
    pub storage_path: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Clone)]
pub struct FileRepository {
    pool: Pool<Postgres>,
}

impl FileRepository {
    /// Create a new [`FileRepository`].
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub async fn insert(
        &self,
        owner_id: Uuid,
        file_name: &str,
        content_type: &str,
        size_bytes: i64,
        storage_path: &str,
    ) -> Result<StoredFile> {
        let query = format!(
            r#"INSERT INTO files (owner_id, file_name, content_type, size_bytes, storage_path)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING {COLUMNS}"#
        );

        Ok(sqlx::query_as::<_, StoredFile>(&query)
            .bind(owner_id)
            .bind(file_name)
            .bind(content_type)
            .bind(size_bytes)
            .bind(storage_path)
            .fetch_one(&self.pool)
            .await?)
    }

    /// Files of an owner, newest first.
    pub async fn list_for_owner(&self, owner_id: Uuid) -> Result<Vec<StoredFile>> {
        let query = format!(
            "SELECT {COLUMNS} FROM files WHERE owner_id = $1 ORDER BY created_at DESC"
        );

        Ok(sqlx::query_as::<_, StoredFile>(&query)
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await?)
    }

    /// Find a file owned by a user.
    pub async fn find(&self, id: Uuid, owner_id: Uuid) -> Result<StoredFile> {
        let query =
            format!("SELECT {COLUMNS} FROM files WHERE id = $1 AND owner_id = $2");

        sqlx::query_as::<_, StoredFile>(&query)
            .bind(id)
            .bind(owner_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(ServerError::NotFound("file"))
    }

    pub async fn delete(&self, id: Uuid, owner_id: Uuid) -> Result<()> {
        let result =
            sqlx::query(r#"DELETE FROM files WHERE id = $1 AND owner_id = $2"#)
                .bind(id)
                .bind(owner_id)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() != 1 {
            return Err(ServerError::NotFound("file"));
        }

        Ok(())
    }
}

/// Local filesystem blob store.
#[derive(Clone, Debug)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Create a new [`FileStore`] rooted at the configured directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Write a blob under a fresh name and return its storage path.
    pub async fn save(&self, id: Uuid, data: &[u8]) -> Result<String> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(io_error)?;

        let path = self.root.join(id.to_string());
        tokio::fs::write(&path, data).await.map_err(io_error)?;

        Ok(path.to_string_lossy().into_owned())
    }

    /// Remove a blob. A missing blob is not an error, the metadata row is
    /// authoritative.
    pub async fn remove(&self, storage_path: &str) -> Result<()> {
        match tokio::fs::remove_file(Path::new(storage_path)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(io_error(err)),
        }
    }
}

fn io_error(err: std::io::Error) -> ServerError {
    ServerError::Internal {
        details: "file storage failure".to_owned(),
        source: Some(Box::new(err)),
    }
}
