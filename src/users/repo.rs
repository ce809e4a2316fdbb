use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::{
    dto::UserOrder,
    repo_types::{User, UserFilter},
};

const USER_COLUMNS: &str =
    "id, email, username, hashed_password, full_name, is_active, created_at, updated_at";

/// Escapes LIKE wildcards so user input matches literally.
fn like_pattern(search: &str) -> String {
    let escaped = search
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

fn push_filters<'a>(qb: &mut QueryBuilder<'a, Postgres>, filter: UserFilter<'a>) {
    qb.push(" WHERE TRUE");
    if let Some(active) = filter.is_active {
        qb.push(" AND is_active = ").push_bind(active);
    }
    if let Some(search) = filter.search.map(str::trim).filter(|s| !s.is_empty()) {
        let pattern = like_pattern(search);
        qb.push(" AND (username ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR email ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR full_name ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

impl User {
    pub async fn find_by_id(db: &PgPool, id: Uuid) -> sqlx::Result<Option<User>> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, username, hashed_password, full_name, is_active, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(db)
        .await
    }

    pub async fn find_by_email(db: &PgPool, email: &str) -> sqlx::Result<Option<User>> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, username, hashed_password, full_name, is_active, created_at, updated_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(db)
        .await
    }

    pub async fn find_by_username(db: &PgPool, username: &str) -> sqlx::Result<Option<User>> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, username, hashed_password, full_name, is_active, created_at, updated_at
            FROM users
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(db)
        .await
    }

    pub async fn list(
        db: &PgPool,
        filter: UserFilter<'_>,
        order: UserOrder,
        limit: i64,
        offset: i64,
    ) -> sqlx::Result<Vec<User>> {
        let mut qb = QueryBuilder::<Postgres>::new(format!("SELECT {USER_COLUMNS} FROM users"));
        push_filters(&mut qb, filter);
        qb.push(" ORDER BY ").push(order.sql());
        qb.push(" LIMIT ").push_bind(limit);
        qb.push(" OFFSET ").push_bind(offset);
        qb.build_query_as::<User>().fetch_all(db).await
    }

    pub async fn count(db: &PgPool, filter: UserFilter<'_>) -> sqlx::Result<i64> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM users");
        push_filters(&mut qb, filter);
        qb.build_query_scalar::<i64>().fetch_one(db).await
    }

    pub async fn create(
        db: &PgPool,
        email: &str,
        username: &str,
        hashed_password: &str,
        full_name: Option<&str>,
        is_active: bool,
    ) -> sqlx::Result<User> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (email, username, hashed_password, full_name, is_active)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, email, username, hashed_password, full_name, is_active, created_at, updated_at
            "#,
        )
        .bind(email)
        .bind(username)
        .bind(hashed_password)
        .bind(full_name)
        .bind(is_active)
        .fetch_one(db)
        .await
    }

    /// Writes every mutable column of `user` back and bumps `updated_at`.
    pub async fn save(db: &PgPool, user: &User) -> sqlx::Result<User> {
        sqlx::query_as::<_, User>(
            r#"
            UPDATE users
               SET email = $2,
                   username = $3,
                   hashed_password = $4,
                   full_name = $5,
                   is_active = $6,
                   updated_at = now()
             WHERE id = $1
            RETURNING id, email, username, hashed_password, full_name, is_active, created_at, updated_at
            "#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.username)
        .bind(&user.hashed_password)
        .bind(&user.full_name)
        .bind(user.is_active)
        .fetch_one(db)
        .await
    }

    /// Returns false when no such user existed.
    pub async fn delete(db: &PgPool, id: Uuid) -> sqlx::Result<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn is_email_taken(
        db: &PgPool,
        email: &str,
        exclude_id: Option<Uuid>,
    ) -> sqlx::Result<bool> {
        sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM users
                WHERE email = $1 AND ($2::uuid IS NULL OR id <> $2)
            )
            "#,
        )
        .bind(email)
        .bind(exclude_id)
        .fetch_one(db)
        .await
    }

    pub async fn is_username_taken(
        db: &PgPool,
        username: &str,
        exclude_id: Option<Uuid>,
    ) -> sqlx::Result<bool> {
        sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM users
                WHERE username = $1 AND ($2::uuid IS NULL OR id <> $2)
            )
            "#,
        )
        .bind(username)
        .bind(exclude_id)
        .fetch_one(db)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("bob"), "%bob%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
        assert_eq!(like_pattern("a\\b"), "%a\\\\b%");
    }

    #[test]
    fn filters_render_expected_sql() {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM users");
        push_filters(
            &mut qb,
            UserFilter {
                is_active: Some(true),
                search: Some(" ali "),
            },
        );
        let sql = qb.sql();
        assert!(sql.contains("is_active = $1"));
        assert!(sql.contains("username ILIKE $2"));
        assert!(sql.contains("full_name ILIKE $4"));
    }

    #[test]
    fn blank_search_adds_no_clause() {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM users");
        push_filters(
            &mut qb,
            UserFilter {
                is_active: None,
                search: Some("   "),
            },
        );
        assert!(!qb.sql().contains("ILIKE"));
    }
}
