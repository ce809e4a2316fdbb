use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// User record in the database.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub hashed_password: String, // Argon2 hash, not exposed in JSON
    pub full_name: Option<String>,
    pub is_active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Filters shared by the user listing and its count.
#[derive(Debug, Default, Clone, Copy)]
pub struct UserFilter<'a> {
    pub is_active: Option<bool>,
    pub search: Option<&'a str>,
}

#[cfg(test)]
impl User {
    pub fn sample() -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: Uuid::new_v4(),
            email: "test@example.com".into(),
            username: "tester".into(),
            hashed_password: "$argon2id$v=19$placeholder".into(),
            full_name: Some("Test User".into()),
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }
}
