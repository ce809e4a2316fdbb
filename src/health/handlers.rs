use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use time::OffsetDateTime;
use tracing::{info, instrument};
use uuid::Uuid;

use super::{
    dto::{
        BatchHealthRecordCreate, BatchResponse, HealthRecordCreate, HealthRecordUpdate,
        HealthTrendsResponse, RecordListQuery, SummaryQuery, TrendsQuery,
    },
    repo_types::{HealthRecord, RecordFilter},
    services,
    trends::{self, HealthSummary, TimeWindow},
};
use crate::{
    auth::extractors::{ensure_self, load_active_user, AuthUser},
    error::AppError,
    extract::{ApiJson, ApiPath, ApiQuery},
    response::{DataResponse, Message, Page},
    state::AppState,
};

pub const MAX_LIST_LIMIT: i64 = 100;
pub const MAX_TREND_LIMIT: i64 = 1000;

type RecordResponse = DataResponse<HealthRecord>;

pub fn health_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/users/:user_id/health-records",
            get(list_records).post(create_record),
        )
        .route("/users/:user_id/health-records/batch", post(create_batch))
        .route("/users/:user_id/health-records/latest", get(latest_record))
        .route(
            "/users/:user_id/health-records/:record_id",
            get(get_record).put(update_record).delete(delete_record),
        )
        .route("/users/:user_id/health-trends", get(health_trends))
        .route("/users/:user_id/health-summary", get(health_summary))
}

fn not_found() -> AppError {
    AppError::NotFound("Health record not found".into())
}

fn check_trend_limit(limit: i64) -> Result<(), AppError> {
    if !(1..=MAX_TREND_LIMIT).contains(&limit) {
        return Err(AppError::Validation(format!(
            "limit must be between 1 and {MAX_TREND_LIMIT}"
        )));
    }
    Ok(())
}

#[instrument(skip(state, payload))]
pub async fn create_record(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    ApiPath(user_id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<HealthRecordCreate>,
) -> Result<(StatusCode, Json<RecordResponse>), AppError> {
    ensure_self(caller, user_id)?;
    let new = services::validate_create(payload)?;
    load_active_user(&state, user_id).await?;

    let record = services::create(&state.db, user_id, new).await?;
    Ok((
        StatusCode::CREATED,
        Json(DataResponse::new(record, "Health record created")),
    ))
}

#[instrument(skip(state, payload))]
pub async fn create_batch(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    ApiPath(user_id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<BatchHealthRecordCreate>,
) -> Result<(StatusCode, Json<BatchResponse>), AppError> {
    ensure_self(caller, user_id)?;
    let records = services::validate_batch(payload.records)?;
    load_active_user(&state, user_id).await?;

    let out = services::create_batch(&state.db, user_id, records).await?;
    Ok((StatusCode::CREATED, Json(out)))
}

#[instrument(skip(state))]
pub async fn list_records(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    ApiPath(user_id): ApiPath<Uuid>,
    ApiQuery(q): ApiQuery<RecordListQuery>,
) -> Result<Json<Page<HealthRecord>>, AppError> {
    ensure_self(caller, user_id)?;
    if q.skip < 0 {
        return Err(AppError::Validation("skip must be >= 0".into()));
    }
    if !(1..=MAX_LIST_LIMIT).contains(&q.limit) {
        return Err(AppError::Validation(format!(
            "limit must be between 1 and {MAX_LIST_LIMIT}"
        )));
    }
    load_active_user(&state, user_id).await?;

    let filter = q.filter();
    let records = HealthRecord::list(&state.db, user_id, filter, q.limit, q.skip).await?;
    let total = HealthRecord::count(&state.db, user_id, filter).await?;
    let page = q.skip / q.limit + 1;
    Ok(Json(Page::new(records, total, page, q.limit)))
}

#[instrument(skip(state))]
pub async fn latest_record(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    ApiPath(user_id): ApiPath<Uuid>,
) -> Result<Json<RecordResponse>, AppError> {
    ensure_self(caller, user_id)?;
    load_active_user(&state, user_id).await?;

    let record = HealthRecord::latest(&state.db, user_id)
        .await?
        .ok_or_else(not_found)?;
    Ok(Json(DataResponse::new(record, "Latest health record")))
}

#[instrument(skip(state))]
pub async fn get_record(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    ApiPath((user_id, record_id)): ApiPath<(Uuid, Uuid)>,
) -> Result<Json<RecordResponse>, AppError> {
    ensure_self(caller, user_id)?;
    load_active_user(&state, user_id).await?;

    let record = HealthRecord::find(&state.db, user_id, record_id)
        .await?
        .ok_or_else(not_found)?;
    Ok(Json(DataResponse::new(record, "Health record found")))
}

#[instrument(skip(state, payload))]
pub async fn update_record(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    ApiPath((user_id, record_id)): ApiPath<(Uuid, Uuid)>,
    ApiJson(payload): ApiJson<HealthRecordUpdate>,
) -> Result<Json<RecordResponse>, AppError> {
    ensure_self(caller, user_id)?;
    load_active_user(&state, user_id).await?;

    let record = HealthRecord::find(&state.db, user_id, record_id)
        .await?
        .ok_or_else(not_found)?;
    let merged = services::apply_update(record, payload)?;
    let saved = HealthRecord::save(&state.db, &merged).await?;
    info!(record_id = %saved.id, level = %saved.health_level, "health record updated");
    Ok(Json(DataResponse::new(saved, "Health record updated")))
}

#[instrument(skip(state))]
pub async fn delete_record(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    ApiPath((user_id, record_id)): ApiPath<(Uuid, Uuid)>,
) -> Result<Json<Message>, AppError> {
    ensure_self(caller, user_id)?;
    load_active_user(&state, user_id).await?;

    if !HealthRecord::delete(&state.db, user_id, record_id).await? {
        return Err(not_found());
    }
    info!(record_id = %record_id, "health record deleted");
    Ok(Json(Message::new("Health record deleted")))
}

#[instrument(skip(state))]
pub async fn health_trends(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    ApiPath(user_id): ApiPath<Uuid>,
    ApiQuery(q): ApiQuery<TrendsQuery>,
) -> Result<Json<HealthTrendsResponse>, AppError> {
    ensure_self(caller, user_id)?;
    check_trend_limit(q.limit)?;
    let window = TimeWindow::resolve(
        q.time_range,
        q.start_date,
        q.end_date,
        OffsetDateTime::now_utc(),
    )?;
    load_active_user(&state, user_id).await?;

    let filter = RecordFilter {
        assessment_type: q.assessment_type,
        data_source: q.data_source,
        start: Some(window.start),
        end: Some(window.end),
    };
    let records = HealthRecord::trend_records(&state.db, user_id, filter, q.limit).await?;
    Ok(Json(services::build_trends(
        &records,
        &window,
        q.time_range,
        q.include_details,
    )))
}

#[instrument(skip(state))]
pub async fn health_summary(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    ApiPath(user_id): ApiPath<Uuid>,
    ApiQuery(q): ApiQuery<SummaryQuery>,
) -> Result<Json<HealthSummary>, AppError> {
    ensure_self(caller, user_id)?;
    check_trend_limit(q.limit)?;
    let window = TimeWindow::resolve(q.time_range, None, None, OffsetDateTime::now_utc())?;
    load_active_user(&state, user_id).await?;

    let filter = RecordFilter {
        start: Some(window.start),
        end: Some(window.end),
        ..Default::default()
    };
    let records = HealthRecord::trend_records(&state.db, user_id, filter, q.limit).await?;
    Ok(Json(trends::summarize(&records, &window)))
}
