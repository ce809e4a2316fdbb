use lazy_static::lazy_static;
use regex::Regex;
use sqlx::PgPool;
use tracing::{info, warn};

use super::{
    dto::{CreateUserRequest, UpdateUserRequest},
    repo_types::User,
};
use crate::{auth::password::hash_password, error::AppError};

pub const MIN_PASSWORD_LEN: usize = 8;
pub const MAX_PASSWORD_LEN: usize = 100;
const MAX_FULL_NAME_LEN: usize = 100;

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    (5..=255).contains(&email.len()) && EMAIL_RE.is_match(email)
}

pub fn validate_username(username: &str) -> Result<(), AppError> {
    lazy_static! {
        static ref USERNAME_RE: Regex = Regex::new(r"^[A-Za-z0-9_-]{3,50}$").unwrap();
    }
    if !USERNAME_RE.is_match(username) {
        return Err(AppError::Validation(
            "Username must be 3-50 characters of letters, digits, '_' or '-'".into(),
        ));
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), AppError> {
    let len = password.chars().count();
    if len < MIN_PASSWORD_LEN {
        return Err(AppError::Validation("Password too short".into()));
    }
    if len > MAX_PASSWORD_LEN {
        return Err(AppError::Validation("Password too long".into()));
    }
    Ok(())
}

fn clean_full_name(full_name: Option<String>) -> Result<Option<String>, AppError> {
    let Some(name) = full_name.map(|n| n.trim().to_string()) else {
        return Ok(None);
    };
    if name.is_empty() {
        return Ok(None);
    }
    if name.chars().count() > MAX_FULL_NAME_LEN {
        return Err(AppError::Validation("Full name too long".into()));
    }
    Ok(Some(name))
}

fn clean_email(email: &str) -> Result<String, AppError> {
    let email = normalize_email(email);
    if !is_valid_email(&email) {
        return Err(AppError::Validation("Invalid email".into()));
    }
    Ok(email)
}

/// Normalizes and validates a registration payload in place.
pub fn validate_create(req: &mut CreateUserRequest) -> Result<(), AppError> {
    req.email = clean_email(&req.email)?;
    req.username = req.username.trim().to_string();
    validate_username(&req.username)?;
    validate_password(&req.password)?;
    req.full_name = clean_full_name(req.full_name.take())?;
    Ok(())
}

/// Normalizes and validates the fields present in an update payload.
pub fn validate_update(req: &mut UpdateUserRequest) -> Result<(), AppError> {
    if let Some(email) = req.email.as_deref() {
        req.email = Some(clean_email(email)?);
    }
    if let Some(username) = req.username.as_deref() {
        let username = username.trim().to_string();
        validate_username(&username)?;
        req.username = Some(username);
    }
    if let Some(password) = req.password.as_deref() {
        validate_password(password)?;
    }
    if let Some(name) = req.full_name.take() {
        req.full_name = Some(clean_full_name(name)?);
    }
    Ok(())
}

pub async fn register(db: &PgPool, req: CreateUserRequest) -> Result<User, AppError> {
    if User::is_email_taken(db, &req.email, None).await? {
        warn!(email = %req.email, "email already registered");
        return Err(AppError::Conflict("Email already registered".into()));
    }
    if User::is_username_taken(db, &req.username, None).await? {
        warn!(username = %req.username, "username already taken");
        return Err(AppError::Conflict("Username already taken".into()));
    }

    let hash = hash_password(&req.password)?;
    let user = User::create(
        db,
        &req.email,
        &req.username,
        &hash,
        req.full_name.as_deref(),
        req.is_active,
    )
    .await?;

    info!(user_id = %user.id, username = %user.username, "user created");
    Ok(user)
}

/// Applies a validated update to `user` and persists it.
pub async fn update(db: &PgPool, mut user: User, req: UpdateUserRequest) -> Result<User, AppError> {
    if let Some(email) = req.email {
        if email != user.email && User::is_email_taken(db, &email, Some(user.id)).await? {
            return Err(AppError::Conflict("Email already registered".into()));
        }
        user.email = email;
    }
    if let Some(username) = req.username {
        if username != user.username
            && User::is_username_taken(db, &username, Some(user.id)).await?
        {
            return Err(AppError::Conflict("Username already taken".into()));
        }
        user.username = username;
    }
    if let Some(password) = req.password {
        user.hashed_password = hash_password(&password)?;
    }
    if let Some(name) = req.full_name {
        user.full_name = name;
    }
    if let Some(active) = req.is_active {
        user.is_active = active;
    }

    let updated = User::save(db, &user).await?;
    info!(user_id = %updated.id, "user updated");
    Ok(updated)
}
