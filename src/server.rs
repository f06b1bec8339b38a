//! HTTP API.
//!
//! Plain REST over the CRM tables. Reads go straight to the pool; every
//! write runs in a transaction so a failed request leaves nothing behind.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "lp not found: 42" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `conflict` (409),
//! `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so the desktop front-end
//! can call the API from its own origin.

use axum::{
    extract::{FromRequest, FromRequestParts, Path, Query, Request, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::db;
use crate::error::CrmError;
use crate::funds;
use crate::funnel::{self, FunnelEntry, LpInterest, RoadshowEntry};
use crate::gps;
use crate::links::{self, Link, NoteRelationships};
use crate::migrate;
use crate::models::{
    Distributor, Fund, Gp, InterestStage, Lp, Note, Person, Roadshow, RoadshowStatus, Todo,
    TodoStatus,
};
use crate::notes::{self, NoteContent};
use crate::repo::{self, Entity};
use crate::roadshows;
use crate::todos::{self, NewTodo};

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub config: Arc<Config>,
}

/// Starts the API server on `[server].bind`.
///
/// The schema is applied first, so a fresh database file works without a
/// separate `crm init`.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    migrate::apply_schema(&pool).await?;

    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
    };
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(addr = %listener.local_addr()?, "CRM API listening");
    println!("CRM API listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}

/// Every route of the API.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let images_dir = state.config.server.images_dir.clone();

    let mut router = Router::new()
        .route("/health", get(handle_health))
        // LPs
        .route("/lps", get(list_rows::<Lp>).post(create_row::<Lp>))
        .route("/lps/search", get(search_rows::<Lp>))
        .route(
            "/lps/{id}",
            get(get_row::<Lp>).put(update_row::<Lp>).delete(delete_row::<Lp>),
        )
        .route(
            "/lps/{id}/people",
            get(|s: State<AppState>, p: PathParams<i64>| children::<Lp, Person>(s, p, Link::LpPerson)),
        )
        .route(
            "/lps/{id}/people/{person_id}",
            post(|s: State<AppState>, p: PathParams<(i64, i64)>| add_link(s, p, Link::LpPerson))
                .delete(|s: State<AppState>, p: PathParams<(i64, i64)>| remove_link(s, p, Link::LpPerson)),
        )
        .route(
            "/lps/{id}/notes",
            get(|s: State<AppState>, p: PathParams<i64>| parents::<Lp, Note>(s, p, Link::NoteLp)),
        )
        .route("/lps/{id}/tasks", get(lp_tasks))
        .route(
            "/lps/{id}/gps",
            get(|s: State<AppState>, p: PathParams<i64>| parents::<Lp, Gp>(s, p, Link::GpLp)),
        )
        .route("/lps/{id}/interests", get(lp_interests))
        // GPs
        .route("/gps", get(list_rows::<Gp>).post(create_row::<Gp>))
        .route("/gps/search", get(search_rows::<Gp>))
        .route(
            "/gps/{id}",
            get(get_row::<Gp>).put(update_row::<Gp>).delete(delete_row::<Gp>),
        )
        .route(
            "/gps/{id}/people",
            get(|s: State<AppState>, p: PathParams<i64>| children::<Gp, Person>(s, p, Link::GpPerson)),
        )
        .route(
            "/gps/{id}/people/{person_id}",
            post(|s: State<AppState>, p: PathParams<(i64, i64)>| add_link(s, p, Link::GpPerson))
                .delete(|s: State<AppState>, p: PathParams<(i64, i64)>| remove_link(s, p, Link::GpPerson)),
        )
        .route(
            "/gps/{id}/lps",
            get(|s: State<AppState>, p: PathParams<i64>| children::<Gp, Lp>(s, p, Link::GpLp)),
        )
        .route(
            "/gps/{id}/lps/{lp_id}",
            post(|s: State<AppState>, p: PathParams<(i64, i64)>| add_link(s, p, Link::GpLp))
                .delete(|s: State<AppState>, p: PathParams<(i64, i64)>| remove_link(s, p, Link::GpLp)),
        )
        .route(
            "/gps/{id}/notes",
            get(|s: State<AppState>, p: PathParams<i64>| parents::<Gp, Note>(s, p, Link::NoteGp)),
        )
        .route("/gps/{id}/tasks", get(gp_tasks))
        .route("/gps/{id}/funds", get(gp_funds))
        // Distributors
        .route(
            "/distributors",
            get(list_rows::<Distributor>).post(create_row::<Distributor>),
        )
        .route("/distributors/search", get(search_rows::<Distributor>))
        .route(
            "/distributors/{id}",
            get(get_row::<Distributor>)
                .put(update_row::<Distributor>)
                .delete(delete_row::<Distributor>),
        )
        .route(
            "/distributors/{id}/people",
            get(|s: State<AppState>, p: PathParams<i64>| {
                children::<Distributor, Person>(s, p, Link::DistributorPerson)
            }),
        )
        .route(
            "/distributors/{id}/people/{person_id}",
            post(|s: State<AppState>, p: PathParams<(i64, i64)>| add_link(s, p, Link::DistributorPerson))
                .delete(|s: State<AppState>, p: PathParams<(i64, i64)>| {
                    remove_link(s, p, Link::DistributorPerson)
                }),
        )
        .route("/distributors/{id}/gps", get(distributor_gps))
        .route(
            "/distributors/{id}/notes",
            get(|s: State<AppState>, p: PathParams<i64>| {
                parents::<Distributor, Note>(s, p, Link::NoteDistributor)
            }),
        )
        // People
        .route("/people", get(list_rows::<Person>).post(create_row::<Person>))
        .route("/people/search", get(search_rows::<Person>))
        .route(
            "/people/{id}",
            get(get_row::<Person>)
                .put(update_row::<Person>)
                .delete(delete_row::<Person>),
        )
        .route(
            "/people/{id}/gps",
            get(|s: State<AppState>, p: PathParams<i64>| parents::<Person, Gp>(s, p, Link::GpPerson)),
        )
        .route(
            "/people/{id}/lps",
            get(|s: State<AppState>, p: PathParams<i64>| parents::<Person, Lp>(s, p, Link::LpPerson)),
        )
        .route(
            "/people/{id}/distributors",
            get(|s: State<AppState>, p: PathParams<i64>| {
                parents::<Person, Distributor>(s, p, Link::DistributorPerson)
            }),
        )
        // Funds
        .route("/funds", get(list_rows::<Fund>).post(create_row::<Fund>))
        .route("/funds/search", get(search_rows::<Fund>))
        .route(
            "/funds/{id}",
            get(get_row::<Fund>).put(update_row::<Fund>).delete(delete_row::<Fund>),
        )
        .route(
            "/funds/{id}/notes",
            get(|s: State<AppState>, p: PathParams<i64>| parents::<Fund, Note>(s, p, Link::NoteFund)),
        )
        .route("/funds/{id}/roadshows", get(fund_roadshows))
        .route("/funds/{id}/funnel", get(fund_funnel))
        .route(
            "/funds/{id}/funnel/{lp_id}",
            put(set_interest).delete(reset_interest),
        )
        // Notes
        .route("/notes", get(list_rows::<Note>).post(create_row::<Note>))
        .route(
            "/notes/{id}",
            get(get_row::<Note>).put(update_row::<Note>).delete(delete_note),
        )
        .route(
            "/notes/{id}/lps",
            get(|s: State<AppState>, p: PathParams<i64>| children::<Note, Lp>(s, p, Link::NoteLp)),
        )
        .route(
            "/notes/{id}/gps",
            get(|s: State<AppState>, p: PathParams<i64>| children::<Note, Gp>(s, p, Link::NoteGp)),
        )
        .route(
            "/notes/{id}/funds",
            get(|s: State<AppState>, p: PathParams<i64>| children::<Note, Fund>(s, p, Link::NoteFund)),
        )
        .route(
            "/notes/{id}/distributors",
            get(|s: State<AppState>, p: PathParams<i64>| {
                children::<Note, Distributor>(s, p, Link::NoteDistributor)
            }),
        )
        .route(
            "/notes/{id}/people",
            get(|s: State<AppState>, p: PathParams<i64>| children::<Note, Person>(s, p, Link::NotePerson)),
        )
        .route("/notes/{id}/todos", get(note_todos))
        .route("/notes/{id}/content", get(note_content))
        .route("/notes/{id}/relationships", post(replace_relationships))
        .route(
            "/notes/{id}/funds/{fund_id}",
            post(|s: State<AppState>, p: PathParams<(i64, i64)>| add_link(s, p, Link::NoteFund))
                .delete(|s: State<AppState>, p: PathParams<(i64, i64)>| remove_link(s, p, Link::NoteFund)),
        )
        // Todos
        .route("/todos", get(list_todos).post(create_todo))
        .route(
            "/todos/{id}",
            get(get_row::<Todo>).put(update_todo).delete(delete_row::<Todo>),
        )
        .route(
            "/todos/{id}/lps",
            get(|s: State<AppState>, p: PathParams<i64>| children::<Todo, Lp>(s, p, Link::TodoLp)),
        )
        .route(
            "/todos/{id}/lps/{lp_id}",
            post(|s: State<AppState>, p: PathParams<(i64, i64)>| add_link(s, p, Link::TodoLp))
                .delete(|s: State<AppState>, p: PathParams<(i64, i64)>| remove_link(s, p, Link::TodoLp)),
        )
        // Roadshows
        .route(
            "/roadshows",
            get(list_rows::<Roadshow>).post(create_row::<Roadshow>),
        )
        .route(
            "/roadshows/{id}",
            get(get_row::<Roadshow>)
                .put(update_row::<Roadshow>)
                .delete(delete_row::<Roadshow>),
        )
        .route("/roadshows/{id}/lps", get(roadshow_board))
        .route(
            "/roadshows/{id}/lps/{lp_id}",
            put(set_roadshow_status).delete(reset_roadshow_status),
        );

    if let Some(dir) = images_dir {
        router = router.nest_service("/images", ServeDir::new(dir));
    }

    router
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g., `"bad_request"`, `"not_found"`).
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

fn conflict(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::CONFLICT,
        code: "conflict".to_string(),
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

impl From<CrmError> for AppError {
    fn from(err: CrmError) -> Self {
        match err {
            CrmError::NotFound { .. } => not_found(err.to_string()),
            CrmError::Invalid { .. } | CrmError::Serialization(_) => bad_request(err.to_string()),
            CrmError::Conflict(_) => conflict(err.to_string()),
            CrmError::Database(ref db_err) => {
                tracing::error!(error = %db_err, "database error");
                internal(err.to_string())
            }
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        CrmError::from(err).into()
    }
}

type ApiResult<T> = Result<Json<T>, AppError>;

/// `Json<T>` whose rejections use the error contract instead of axum's
/// plain-text bodies.
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| bad_request(rejection.body_text()))?;
        Ok(JsonBody(value))
    }
}

/// `Path<T>` with error-contract rejections, e.g. `/lps/abc`.
pub struct PathParams<T>(pub T);

impl<S, T> FromRequestParts<S> for PathParams<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(value) = Path::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| bad_request(rejection.body_text()))?;
        Ok(PathParams(value))
    }
}

/// `Query<T>` with error-contract rejections.
pub struct QueryParams<T>(pub T);

impl<S, T> FromRequestParts<S> for QueryParams<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| bad_request(rejection.body_text()))?;
        Ok(QueryParams(value))
    }
}

fn deleted() -> Json<Value> {
    Json(json!({ "status": "deleted" }))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    timestamp: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

// ============ Generic resource handlers ============

#[derive(Deserialize)]
struct SearchParams {
    #[serde(default)]
    q: String,
}

#[derive(Deserialize, Default)]
struct BoardParams {
    #[serde(default)]
    all: bool,
}

#[derive(Deserialize, Default)]
struct TodoParams {
    status: Option<String>,
}

async fn list_rows<T: Entity + 'static>(State(state): State<AppState>) -> ApiResult<Vec<T>> {
    Ok(Json(repo::list::<T>(&state.pool).await?))
}

async fn search_rows<T: Entity + 'static>(
    State(state): State<AppState>,
    QueryParams(params): QueryParams<SearchParams>,
) -> ApiResult<Vec<T>> {
    let rows = repo::search::<T>(&state.pool, &params.q, state.config.api.search_limit).await?;
    Ok(Json(rows))
}

async fn get_row<T: Entity + 'static>(
    State(state): State<AppState>,
    PathParams(id): PathParams<i64>,
) -> ApiResult<T> {
    Ok(Json(repo::get::<T>(&state.pool, id).await?))
}

async fn create_row<T: Entity + 'static>(
    State(state): State<AppState>,
    JsonBody(row): JsonBody<T>,
) -> ApiResult<T> {
    let mut tx = db::begin_write(&state.pool).await?;
    let created = repo::create(&mut *tx, &row).await?;
    tx.commit().await?;
    tracing::debug!(table = T::TABLE, id = created.id(), "created");
    Ok(Json(created))
}

async fn update_row<T: Entity + 'static>(
    State(state): State<AppState>,
    PathParams(id): PathParams<i64>,
    JsonBody(changes): JsonBody<Value>,
) -> ApiResult<T> {
    let mut tx = db::begin_write(&state.pool).await?;
    let updated = repo::patch::<T>(&mut *tx, id, changes).await?;
    tx.commit().await?;
    Ok(Json(updated))
}

async fn delete_row<T: Entity + 'static>(
    State(state): State<AppState>,
    PathParams(id): PathParams<i64>,
) -> ApiResult<Value> {
    let mut tx = db::begin_write(&state.pool).await?;
    repo::delete::<T>(&mut *tx, id).await?;
    tx.commit().await?;
    tracing::debug!(table = T::TABLE, id, "deleted");
    Ok(deleted())
}

/// Rows linked to `P` row `id`, where `P` is the left side of `kind`.
async fn children<P: Entity, T: Entity>(
    State(state): State<AppState>,
    PathParams(id): PathParams<i64>,
    kind: Link,
) -> ApiResult<Vec<T>> {
    repo::get::<P>(&state.pool, id).await?;
    Ok(Json(links::children::<T>(&state.pool, kind, id).await?))
}

/// Rows linked to `P` row `id`, where `P` is the right side of `kind`.
async fn parents<P: Entity, T: Entity>(
    State(state): State<AppState>,
    PathParams(id): PathParams<i64>,
    kind: Link,
) -> ApiResult<Vec<T>> {
    repo::get::<P>(&state.pool, id).await?;
    Ok(Json(links::parents::<T>(&state.pool, kind, id).await?))
}

async fn add_link(
    State(state): State<AppState>,
    PathParams((left, right)): PathParams<(i64, i64)>,
    kind: Link,
) -> ApiResult<Value> {
    let mut tx = db::begin_write(&state.pool).await?;
    let created = links::link(&mut *tx, kind, left, right).await?;
    tx.commit().await?;
    Ok(Json(json!({ "linked": true, "created": created })))
}

async fn remove_link(
    State(state): State<AppState>,
    PathParams((left, right)): PathParams<(i64, i64)>,
    kind: Link,
) -> ApiResult<Value> {
    let mut tx = db::begin_write(&state.pool).await?;
    let removed = links::unlink(&mut *tx, kind, left, right).await?;
    tx.commit().await?;
    Ok(Json(json!({ "linked": false, "removed": removed })))
}

// ============ Resource-specific handlers ============

async fn lp_tasks(State(state): State<AppState>, PathParams(id): PathParams<i64>) -> ApiResult<Vec<Todo>> {
    repo::get::<Lp>(&state.pool, id).await?;
    Ok(Json(todos::for_lp(&state.pool, id).await?))
}

async fn lp_interests(
    State(state): State<AppState>,
    PathParams(id): PathParams<i64>,
) -> ApiResult<Vec<LpInterest>> {
    Ok(Json(funnel::lp_interests(&state.pool, id).await?))
}

async fn gp_tasks(State(state): State<AppState>, PathParams(id): PathParams<i64>) -> ApiResult<Vec<Todo>> {
    repo::get::<Gp>(&state.pool, id).await?;
    Ok(Json(todos::for_gp(&state.pool, id).await?))
}

async fn gp_funds(State(state): State<AppState>, PathParams(id): PathParams<i64>) -> ApiResult<Vec<Fund>> {
    repo::get::<Gp>(&state.pool, id).await?;
    Ok(Json(funds::for_gp(&state.pool, id).await?))
}

async fn distributor_gps(
    State(state): State<AppState>,
    PathParams(id): PathParams<i64>,
) -> ApiResult<Vec<Gp>> {
    repo::get::<Distributor>(&state.pool, id).await?;
    Ok(Json(gps::for_distributor(&state.pool, id).await?))
}

async fn fund_roadshows(
    State(state): State<AppState>,
    PathParams(id): PathParams<i64>,
) -> ApiResult<Vec<Roadshow>> {
    repo::get::<Fund>(&state.pool, id).await?;
    Ok(Json(roadshows::for_fund(&state.pool, id).await?))
}

async fn delete_note(State(state): State<AppState>, PathParams(id): PathParams<i64>) -> ApiResult<Value> {
    let mut tx = db::begin_write(&state.pool).await?;
    notes::delete(&mut *tx, id).await?;
    tx.commit().await?;
    Ok(deleted())
}

async fn note_todos(State(state): State<AppState>, PathParams(id): PathParams<i64>) -> ApiResult<Vec<Todo>> {
    repo::get::<Note>(&state.pool, id).await?;
    Ok(Json(todos::for_note(&state.pool, id).await?))
}

async fn note_content(
    State(state): State<AppState>,
    PathParams(id): PathParams<i64>,
) -> ApiResult<NoteContent> {
    let note = repo::get::<Note>(&state.pool, id).await?;
    Ok(Json(notes::content(&note)))
}

async fn replace_relationships(
    State(state): State<AppState>,
    PathParams(id): PathParams<i64>,
    JsonBody(rels): JsonBody<NoteRelationships>,
) -> ApiResult<Value> {
    let mut tx = db::begin_write(&state.pool).await?;
    links::replace_note_relationships(&mut *tx, id, &rels).await?;
    tx.commit().await?;
    Ok(Json(json!({ "success": true, "note_id": id })))
}

async fn list_todos(
    State(state): State<AppState>,
    QueryParams(params): QueryParams<TodoParams>,
) -> ApiResult<Vec<Todo>> {
    let status = match params.status.as_deref() {
        None | Some("") => None,
        Some(raw) => Some(
            TodoStatus::parse(raw)
                .ok_or_else(|| bad_request(format!("unknown todo status: {}", raw)))?,
        ),
    };
    Ok(Json(todos::list(&state.pool, status).await?))
}

async fn create_todo(
    State(state): State<AppState>,
    JsonBody(new): JsonBody<NewTodo>,
) -> ApiResult<Todo> {
    let mut tx = db::begin_write(&state.pool).await?;
    let todo = todos::create(&mut *tx, new).await?;
    tx.commit().await?;
    Ok(Json(todo))
}

async fn update_todo(
    State(state): State<AppState>,
    PathParams(id): PathParams<i64>,
    JsonBody(changes): JsonBody<Value>,
) -> ApiResult<Todo> {
    let mut tx = db::begin_write(&state.pool).await?;
    let todo = todos::patch(&mut *tx, id, changes).await?;
    tx.commit().await?;
    Ok(Json(todo))
}

// ============ Funnel ============

#[derive(Deserialize)]
struct InterestBody {
    interest: String,
}

#[derive(Deserialize)]
struct StatusBody {
    status: String,
}

async fn fund_funnel(
    State(state): State<AppState>,
    PathParams(id): PathParams<i64>,
    QueryParams(params): QueryParams<BoardParams>,
) -> ApiResult<Vec<FunnelEntry>> {
    Ok(Json(funnel::fund_funnel(&state.pool, id, params.all).await?))
}

async fn set_interest(
    State(state): State<AppState>,
    PathParams((fund_id, lp_id)): PathParams<(i64, i64)>,
    JsonBody(body): JsonBody<InterestBody>,
) -> ApiResult<FunnelEntry> {
    let stage = InterestStage::parse(&body.interest)
        .ok_or_else(|| bad_request(format!("unknown interest stage: {}", body.interest)))?;

    let mut tx = db::begin_write(&state.pool).await?;
    funnel::set_interest(&mut *tx, fund_id, lp_id, stage).await?;
    tx.commit().await?;

    funnel::fund_funnel(&state.pool, fund_id, true)
        .await?
        .into_iter()
        .find(|entry| entry.lp_id == lp_id)
        .map(Json)
        .ok_or_else(|| not_found(format!("lp not found: {}", lp_id)))
}

async fn reset_interest(
    State(state): State<AppState>,
    PathParams((fund_id, lp_id)): PathParams<(i64, i64)>,
) -> ApiResult<Value> {
    let mut tx = db::begin_write(&state.pool).await?;
    funnel::reset_interest(&mut *tx, fund_id, lp_id).await?;
    tx.commit().await?;
    Ok(deleted())
}

async fn roadshow_board(
    State(state): State<AppState>,
    PathParams(id): PathParams<i64>,
    QueryParams(params): QueryParams<BoardParams>,
) -> ApiResult<Vec<RoadshowEntry>> {
    Ok(Json(funnel::roadshow_board(&state.pool, id, params.all).await?))
}

async fn set_roadshow_status(
    State(state): State<AppState>,
    PathParams((roadshow_id, lp_id)): PathParams<(i64, i64)>,
    JsonBody(body): JsonBody<StatusBody>,
) -> ApiResult<RoadshowEntry> {
    let status = RoadshowStatus::parse(&body.status)
        .ok_or_else(|| bad_request(format!("unknown roadshow status: {}", body.status)))?;

    let mut tx = db::begin_write(&state.pool).await?;
    funnel::set_roadshow_status(&mut *tx, roadshow_id, lp_id, status).await?;
    tx.commit().await?;

    funnel::roadshow_board(&state.pool, roadshow_id, true)
        .await?
        .into_iter()
        .find(|entry| entry.lp_id == lp_id)
        .map(Json)
        .ok_or_else(|| not_found(format!("lp not found: {}", lp_id)))
}

async fn reset_roadshow_status(
    State(state): State<AppState>,
    PathParams((roadshow_id, lp_id)): PathParams<(i64, i64)>,
) -> ApiResult<Value> {
    let mut tx = db::begin_write(&state.pool).await?;
    funnel::reset_roadshow_status(&mut *tx, roadshow_id, lp_id).await?;
    tx.commit().await?;
    Ok(deleted())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crm_errors_map_to_status_codes() {
        let cases = [
            (CrmError::not_found("lp", 3), StatusCode::NOT_FOUND, "not_found"),
            (CrmError::invalid("date", "bad"), StatusCode::BAD_REQUEST, "bad_request"),
            (
                CrmError::Conflict("FOREIGN KEY constraint failed".into()),
                StatusCode::CONFLICT,
                "conflict",
            ),
        ];
        for (err, status, code) in cases {
            let app_err = AppError::from(err);
            assert_eq!(app_err.status, status);
            assert_eq!(app_err.code, code);
        }
    }

    #[test]
    fn test_not_found_message() {
        let app_err = AppError::from(CrmError::not_found("lp", 42));
        assert_eq!(app_err.message, "lp not found: 42");
    }
}
