use axum::{
    extract::State,
    http::StatusCode,
    routing::get,
    Json, Router,
};
use tracing::{info, instrument};
use uuid::Uuid;

use super::{
    dto::{CreateUserRequest, UpdateUserRequest, UserListQuery, UserOut},
    repo_types::{User, UserFilter},
    services,
};
use crate::{
    auth::extractors::{ensure_self, load_active_user, AuthUser},
    error::AppError,
    extract::{ApiJson, ApiPath, ApiQuery},
    response::{DataResponse, Message, Page},
    state::AppState,
};

pub const MAX_PAGE_SIZE: i64 = 100;

type UserResponse = DataResponse<UserOut>;

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route(
            "/users/:user_id",
            get(get_user).put(update_user).delete(delete_user),
        )
        .route("/users/email/:email", get(get_user_by_email))
        .route("/users/username/:username", get(get_user_by_username))
}

fn not_found() -> AppError {
    AppError::NotFound("User not found".into())
}

#[instrument(skip(state, payload))]
pub async fn create_user(
    State(state): State<AppState>,
    ApiJson(mut payload): ApiJson<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserResponse>), AppError> {
    services::validate_create(&mut payload)?;
    let user = services::register(&state.db, payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(DataResponse::new(user.into(), "User created")),
    ))
}

#[instrument(skip(state))]
pub async fn list_users(
    State(state): State<AppState>,
    AuthUser(_caller): AuthUser,
    ApiQuery(q): ApiQuery<UserListQuery>,
) -> Result<Json<Page<UserOut>>, AppError> {
    if q.page < 1 {
        return Err(AppError::Validation("page must be >= 1".into()));
    }
    if !(1..=MAX_PAGE_SIZE).contains(&q.size) {
        return Err(AppError::Validation(format!(
            "size must be between 1 and {MAX_PAGE_SIZE}"
        )));
    }

    let filter = UserFilter {
        is_active: q.is_active,
        search: q.search.as_deref(),
    };
    let offset = (q.page - 1)
        .checked_mul(q.size)
        .ok_or_else(|| AppError::Validation("page out of range".into()))?;
    let users = User::list(&state.db, filter, q.order_by, q.size, offset).await?;
    let total = User::count(&state.db, filter).await?;

    let items = users.into_iter().map(UserOut::from).collect();
    Ok(Json(Page::new(items, total, q.page, q.size)))
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    AuthUser(_caller): AuthUser,
    ApiPath(user_id): ApiPath<Uuid>,
) -> Result<Json<UserResponse>, AppError> {
    let user = User::find_by_id(&state.db, user_id)
        .await?
        .ok_or_else(not_found)?;
    Ok(Json(DataResponse::new(user.into(), "User found")))
}

#[instrument(skip(state))]
pub async fn get_user_by_email(
    State(state): State<AppState>,
    AuthUser(_caller): AuthUser,
    ApiPath(email): ApiPath<String>,
) -> Result<Json<UserResponse>, AppError> {
    let email = services::normalize_email(&email);
    let user = User::find_by_email(&state.db, &email)
        .await?
        .ok_or_else(not_found)?;
    Ok(Json(DataResponse::new(user.into(), "User found")))
}

#[instrument(skip(state))]
pub async fn get_user_by_username(
    State(state): State<AppState>,
    AuthUser(_caller): AuthUser,
    ApiPath(username): ApiPath<String>,
) -> Result<Json<UserResponse>, AppError> {
    let user = User::find_by_username(&state.db, username.trim())
        .await?
        .ok_or_else(not_found)?;
    Ok(Json(DataResponse::new(user.into(), "User found")))
}

#[instrument(skip(state, payload))]
pub async fn update_user(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    ApiPath(user_id): ApiPath<Uuid>,
    ApiJson(mut payload): ApiJson<UpdateUserRequest>,
) -> Result<Json<UserResponse>, AppError> {
    ensure_self(caller, user_id)?;
    services::validate_update(&mut payload)?;
    let user = load_active_user(&state, user_id).await?;
    let updated = services::update(&state.db, user, payload).await?;
    Ok(Json(DataResponse::new(updated.into(), "User updated")))
}

#[instrument(skip(state))]
pub async fn delete_user(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    ApiPath(user_id): ApiPath<Uuid>,
) -> Result<Json<Message>, AppError> {
    ensure_self(caller, user_id)?;
    if !User::delete(&state.db, user_id).await? {
        return Err(not_found());
    }
    info!(user_id = %user_id, "user deleted");
    Ok(Json(Message::new("User deleted")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::JwtKeys;
    use axum::{body::Body, extract::FromRef, http::Request};
    use tower::ServiceExt;

    fn bearer(state: &AppState, user_id: Uuid) -> String {
        let token = JwtKeys::from_ref(state).sign_access(user_id).unwrap();
        format!("Bearer {token}")
    }

    async fn error_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn create_user_rejects_invalid_email_before_touching_db() {
        let app = user_routes().with_state(AppState::fake());
        let body = serde_json::json!({
            "email": "nope",
            "username": "someone",
            "password": "long-enough-password"
        });
        let response = app
            .oneshot(
                Request::post("/users")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = error_body(response).await;
        assert_eq!(json["error"], "validation_error");
        assert_eq!(json["message"], "Invalid email");
    }

    #[tokio::test]
    async fn listing_requires_authentication() {
        let app = user_routes().with_state(AppState::fake());
        let response = app
            .oneshot(Request::get("/users").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn listing_rejects_oversized_pages() {
        let state = AppState::fake();
        let auth = bearer(&state, Uuid::new_v4());
        let app = user_routes().with_state(state);
        let response = app
            .oneshot(
                Request::get("/users?size=500")
                    .header("authorization", auth)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn listing_rejects_page_whose_offset_overflows() {
        let state = AppState::fake();
        let auth = bearer(&state, Uuid::new_v4());
        let app = user_routes().with_state(state);
        let response = app
            .oneshot(
                Request::get(format!("/users?page={}&size=100", i64::MAX))
                    .header("authorization", auth)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = error_body(response).await;
        assert_eq!(json["message"], "page out of range");
    }

    #[tokio::test]
    async fn listing_reports_bad_query_in_error_envelope() {
        let state = AppState::fake();
        let auth = bearer(&state, Uuid::new_v4());
        let app = user_routes().with_state(state);
        let response = app
            .oneshot(
                Request::get("/users?order_by=shoe_size")
                    .header("authorization", auth)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(error_body(response).await["error"], "validation_error");
    }

    #[tokio::test]
    async fn cannot_update_someone_else() {
        let state = AppState::fake();
        let auth = bearer(&state, Uuid::new_v4());
        let app = user_routes().with_state(state);
        let response = app
            .oneshot(
                Request::put(format!("/users/{}", Uuid::new_v4()))
                    .header("authorization", auth)
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"full_name":"Mallory"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn cannot_delete_someone_else() {
        let state = AppState::fake();
        let auth = bearer(&state, Uuid::new_v4());
        let app = user_routes().with_state(state);
        let response = app
            .oneshot(
                Request::delete(format!("/users/{}", Uuid::new_v4()))
                    .header("authorization", auth)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
