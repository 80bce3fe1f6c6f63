//! Notifications HTTP API.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Extension, Json, Router, middleware};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::AppState;
use crate::error::Result;
use crate::notification::{
    Notification, NotificationRepository, NotificationStatus,
};
use crate::router::{Page, Pager, Valid};
use crate::user::{Role, User};

pub fn router(state: AppState) -> Router<AppState> {
    let admin_routes = Router::new()
        // `POST /notifications` sends to a user or a role audience.
        .route("/", post(create))
        .route_layer(middleware::from_fn(crate::router::require_admin));

    Router::new()
        // `GET /notifications` lists the caller's notifications.
        .route("/", get(list))
        // `PUT /notifications/read-all` goes to `read_all`.
        .route("/read-all", put(read_all))
        // `PUT /notifications/:ID/read` goes to `read`, idempotent.
        .route("/{notification_id}/read", put(read))
        .route("/{notification_id}/archive", put(archive))
        .route("/{notification_id}/dismiss", put(dismiss))
        .route("/{notification_id}", axum::routing::delete(delete))
        .merge(admin_routes)
        .route_layer(middleware::from_fn_with_state(
            state,
            crate::router::auth,
        ))
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub status: Option<NotificationStatus>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

async fn list(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Page<Notification>>> {
    let pager = Pager {
        page: query.page,
        limit: query.limit,
    };
    let (notifications, total) =
        NotificationRepository::new(state.db.postgres.clone())
            .list_for_user(
                user.id,
                query.status,
                i64::from(pager.limit()),
                pager.offset(),
            )
            .await?;

    Ok(Json(Page::new(notifications, &pager, total)))
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CreateBody {
    /// Single recipient; mutually exclusive with `audience`.
    pub user_id: Option<Uuid>,
    /// Role to broadcast to; one row is created per active member.
    pub audience: Option<Role>,
    #[validate(length(min = 1, max = 255))]
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[validate(length(min = 1, max = 64))]
    #[serde(default = "default_kind")]
    pub kind: String,
    pub expires_at: Option<DateTime<Utc>>,
}

fn default_kind() -> String {
    "general".to_owned()
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct CreateResponse {
    pub created: u64,
}

/// Admin handler sending a notification to one user or a role audience.
async fn create(
    State(state): State<AppState>,
    Valid(body): Valid<CreateBody>,
) -> Result<(StatusCode, Json<CreateResponse>)> {
    let repo = NotificationRepository::new(state.db.postgres.clone());

    let created = match (body.user_id, body.audience) {
        (Some(user_id), None) => {
            repo.insert(user_id, &body.title, &body.body, &body.kind, body.expires_at)
                .await?;
            1
        }
        (None, Some(audience)) => {
            repo.insert_for_audience(
                audience,
                &body.title,
                &body.body,
                &body.kind,
                body.expires_at,
            )
            .await?
        }
        _ => {
            return Err(crate::error::ServerError::Validation(
                exactly_one_recipient_error(),
            ));
        }
    };

    Ok((StatusCode::CREATED, Json(CreateResponse { created })))
}

fn exactly_one_recipient_error() -> validator::ValidationErrors {
    let mut errors = validator::ValidationErrors::new();
    errors.add(
        "user_id",
        validator::ValidationError::new("recipient")
            .with_message("Exactly one of user_id or audience is required.".into()),
    );
    errors
}

async fn read(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(notification_id): Path<Uuid>,
) -> Result<Json<Notification>> {
    let notification = NotificationRepository::new(state.db.postgres.clone())
        .mark_read(notification_id, user.id)
        .await?;

    Ok(Json(notification))
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct ReadAllResponse {
    pub updated: u64,
}

async fn read_all(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> Result<Json<ReadAllResponse>> {
    let updated = NotificationRepository::new(state.db.postgres.clone())
        .mark_all_read(user.id)
        .await?;

    Ok(Json(ReadAllResponse { updated }))
}

async fn archive(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(notification_id): Path<Uuid>,
) -> Result<Json<Notification>> {
    let notification = NotificationRepository::new(state.db.postgres.clone())
        .set_status(notification_id, user.id, NotificationStatus::Archived)
        .await?;

    Ok(Json(notification))
}

async fn dismiss(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(notification_id): Path<Uuid>,
) -> Result<Json<Notification>> {
    let notification = NotificationRepository::new(state.db.postgres.clone())
        .set_status(notification_id, user.id, NotificationStatus::Dismissed)
        .await?;

    Ok(Json(notification))
}

async fn delete(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(notification_id): Path<Uuid>,
) -> Result<StatusCode> {
    NotificationRepository::new(state.db.postgres.clone())
        .delete(notification_id, user.id)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}
