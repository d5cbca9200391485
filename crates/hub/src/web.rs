use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::db::{now_unix, Db, NewPlant};
use crate::monitor::{self, RegisterError};
use crate::notify::NotifyPolicy;
use crate::sim::SampleGenerator;
use crate::state::SharedState;
use crate::status::PartialReading;

const DEFAULT_HISTORY: i64 = 50;
const MAX_HISTORY: i64 = 500;

#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub shared: SharedState,
    pub sampler: Arc<Mutex<SampleGenerator>>,
    pub policy: NotifyPolicy,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Internal(anyhow::Error),
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        match e.downcast_ref::<RegisterError>() {
            Some(rejected) => ApiError::BadRequest(rejected.to_string()),
            None => ApiError::Internal(e),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, msg) = match self {
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m),
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            ApiError::Internal(e) => {
                error!("api: {e:#}");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
        };
        (status, Json(json!({ "error": msg }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

// ---------------------------------------------------------------------------
// Routes
// ---------------------------------------------------------------------------

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/status", get(api_status))
        .route("/api/users", post(create_user))
        .route("/api/plants", get(list_plants).post(create_plant))
        .route("/api/plants/{id}", axum::routing::delete(delete_plant))
        .route("/api/plants/{id}/status", get(plant_status))
        .route("/api/plants/{id}/notifications", get(plant_notifications))
        .route(
            "/api/plants/{id}/readings",
            get(plant_readings).post(ingest_reading),
        )
        .route("/api/notifications", get(list_notifications))
        .route("/api/notifications/latest", get(latest_notification))
        .route("/api/notifications/{id}/read", post(mark_read))
        .with_state(state)
}

async fn api_status(State(app): State<AppState>) -> impl IntoResponse {
    let st = app.shared.read().await;
    Json(st.to_status())
}

#[derive(Deserialize)]
struct NewUser {
    username: String,
}

async fn create_user(
    State(app): State<AppState>,
    Json(body): Json<NewUser>,
) -> ApiResult<impl IntoResponse> {
    let username = body.username.trim();
    if username.is_empty() {
        return Err(ApiError::BadRequest("username is empty".into()));
    }
    let user = app.db.create_user(username).await?;
    info!(user_id = user.user_id, "user created");
    Ok((StatusCode::CREATED, Json(user)))
}

async fn list_plants(State(app): State<AppState>) -> ApiResult<impl IntoResponse> {
    Ok(Json(app.db.list_plants().await?))
}

/// Creates the plant and evaluates its first reading before responding.
async fn create_plant(
    State(app): State<AppState>,
    Json(body): Json<NewPlant>,
) -> ApiResult<impl IntoResponse> {
    if body.name.as_deref().map_or(true, |n| n.trim().is_empty()) {
        return Err(ApiError::BadRequest("name is empty".into()));
    }

    let first = app.sampler.lock().await.generate(now_unix());
    let registered = monitor::register_plant(&app.db, &body, first, app.policy).await?;

    {
        let mut st = app.shared.write().await;
        let o = &registered.outcome;
        st.record_reading(registered.plant.plant_id, o.reading, o.status);
        if let Some(id) = o.notification_id {
            st.record_notification(registered.plant.plant_id, id, o.status.as_str());
        }
    }

    Ok((StatusCode::CREATED, Json(registered)))
}

async fn delete_plant(State(app): State<AppState>, Path(id): Path<i64>) -> ApiResult<StatusCode> {
    if app.db.delete_plant(id).await? {
        info!(plant_id = id, "plant deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("plant {id} not found")))
    }
}

async fn plant_status(
    State(app): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    match monitor::plant_status(&app.db, id).await? {
        Some(st) => Ok(Json(st)),
        None => Err(ApiError::NotFound(format!("plant {id} not found"))),
    }
}

#[derive(Deserialize)]
struct HistoryQuery {
    limit: Option<i64>,
}

async fn plant_readings(
    State(app): State<AppState>,
    Path(id): Path<i64>,
    Query(q): Query<HistoryQuery>,
) -> ApiResult<impl IntoResponse> {
    if app.db.get_plant(id).await?.is_none() {
        return Err(ApiError::NotFound(format!("plant {id} not found")));
    }
    let limit = q.limit.unwrap_or(DEFAULT_HISTORY).clamp(1, MAX_HISTORY);
    Ok(Json(app.db.recent_readings(id, limit).await?))
}

async fn ingest_reading(
    State(app): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<PartialReading>,
) -> ApiResult<impl IntoResponse> {
    let Some(plant) = app.db.get_plant(id).await? else {
        return Err(ApiError::NotFound(format!("plant {id} not found")));
    };
    let outcome = monitor::ingest(&app.db, &plant, body, app.policy).await?;

    {
        let mut st = app.shared.write().await;
        st.record_reading(id, outcome.reading, outcome.status);
        if let Some(nid) = outcome.notification_id {
            st.record_notification(id, nid, outcome.status.as_str());
        }
    }

    Ok((StatusCode::CREATED, Json(outcome)))
}

async fn plant_notifications(
    State(app): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    if app.db.get_plant(id).await?.is_none() {
        return Err(ApiError::NotFound(format!("plant {id} not found")));
    }
    Ok(Json(app.db.notifications_for_plant(id).await?))
}

#[derive(Deserialize)]
struct NotificationQuery {
    user_id: i64,
}

async fn list_notifications(
    State(app): State<AppState>,
    Query(q): Query<NotificationQuery>,
) -> ApiResult<impl IntoResponse> {
    if app.db.get_user(q.user_id).await?.is_none() {
        return Err(ApiError::NotFound(format!("user {} not found", q.user_id)));
    }
    let notifications = app.db.notifications_for_user(q.user_id).await?;
    let unread = app.db.unread_count(q.user_id).await?;
    Ok(Json(json!({ "unread": unread, "notifications": notifications })))
}

async fn latest_notification(State(app): State<AppState>) -> ApiResult<impl IntoResponse> {
    match app.db.latest_notification().await? {
        Some(n) => Ok(Json(n)),
        None => Err(ApiError::NotFound("no notifications".into())),
    }
}

async fn mark_read(State(app): State<AppState>, Path(id): Path<i64>) -> ApiResult<StatusCode> {
    if app.db.mark_notification_read(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("notification {id} not found")))
    }
}

// ---------------------------------------------------------------------------
// Server entry-point
// ---------------------------------------------------------------------------

pub async fn serve(state: AppState, port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;

    info!("api listening on http://{addr}");

    axum::serve(listener, router(state)).await?;
    Ok(())
}

// ===========================================================================
// Tests
// ===========================================================================
