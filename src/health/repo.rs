use anyhow::Context;
use sqlx::{Executor, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::repo_types::{HealthRecord, HealthRecordRow, NewHealthRecord, RecordFilter};

const RECORD_COLUMNS: &str = "id, user_id, assessed_at, overall_score, physical_score, \
     mental_score, lifestyle_score, assessment_type, health_level, assessment_notes, \
     detailed_metrics, data_source, created_at, updated_at";

fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, user_id: Uuid, filter: RecordFilter) {
    qb.push(" WHERE user_id = ").push_bind(user_id);
    if let Some(kind) = filter.assessment_type {
        qb.push(" AND assessment_type = ").push_bind(kind.as_str());
    }
    if let Some(source) = filter.data_source {
        qb.push(" AND data_source = ").push_bind(source.as_str());
    }
    if let Some(start) = filter.start {
        qb.push(" AND assessed_at >= ").push_bind(start);
    }
    if let Some(end) = filter.end {
        qb.push(" AND assessed_at <= ").push_bind(end);
    }
}

fn convert(rows: Vec<HealthRecordRow>) -> anyhow::Result<Vec<HealthRecord>> {
    rows.into_iter().map(HealthRecord::try_from).collect()
}

async fn insert_one<'e, E>(
    executor: E,
    user_id: Uuid,
    new: &NewHealthRecord,
) -> anyhow::Result<HealthRecordRow>
where
    E: Executor<'e, Database = Postgres>,
{
    let row = sqlx::query_as::<_, HealthRecordRow>(&format!(
        r#"
        INSERT INTO health_records (
            user_id, assessed_at, overall_score, physical_score, mental_score,
            lifestyle_score, assessment_type, health_level, assessment_notes,
            detailed_metrics, data_source
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        RETURNING {RECORD_COLUMNS}
        "#
    ))
    .bind(user_id)
    .bind(new.assessed_at)
    .bind(new.overall_score)
    .bind(new.physical_score)
    .bind(new.mental_score)
    .bind(new.lifestyle_score)
    .bind(new.assessment_type.as_str())
    .bind(new.health_level.as_str())
    .bind(new.assessment_notes.as_deref())
    .bind(new.detailed_metrics.as_ref())
    .bind(new.data_source.as_str())
    .fetch_one(executor)
    .await
    .context("insert health record")?;

    Ok(row)
}

impl HealthRecord {
    pub async fn insert(
        db: &PgPool,
        user_id: Uuid,
        new: &NewHealthRecord,
    ) -> anyhow::Result<HealthRecord> {
        insert_one(db, user_id, new).await?.try_into()
    }

    /// Inserts every record or none of them.
    pub async fn insert_batch(
        db: &PgPool,
        user_id: Uuid,
        records: &[NewHealthRecord],
    ) -> anyhow::Result<Vec<Uuid>> {
        let mut tx = db.begin().await.context("begin batch insert")?;
        let mut ids = Vec::with_capacity(records.len());
        for new in records {
            let row = insert_one(&mut *tx, user_id, new).await?;
            ids.push(row.id);
        }
        tx.commit().await.context("commit batch insert")?;
        Ok(ids)
    }

    pub async fn find(
        db: &PgPool,
        user_id: Uuid,
        id: Uuid,
    ) -> anyhow::Result<Option<HealthRecord>> {
        let row = sqlx::query_as::<_, HealthRecordRow>(&format!(
            "SELECT {RECORD_COLUMNS} FROM health_records WHERE id = $1 AND user_id = $2"
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(db)
        .await
        .context("find health record")?;

        row.map(HealthRecord::try_from).transpose()
    }

    pub async fn latest(db: &PgPool, user_id: Uuid) -> anyhow::Result<Option<HealthRecord>> {
        let row = sqlx::query_as::<_, HealthRecordRow>(&format!(
            r#"
            SELECT {RECORD_COLUMNS}
              FROM health_records
             WHERE user_id = $1
             ORDER BY assessed_at DESC, created_at DESC
             LIMIT 1
            "#
        ))
        .bind(user_id)
        .fetch_optional(db)
        .await
        .context("latest health record")?;

        row.map(HealthRecord::try_from).transpose()
    }

    /// Newest first.
    pub async fn list(
        db: &PgPool,
        user_id: Uuid,
        filter: RecordFilter,
        limit: i64,
        offset: i64,
    ) -> anyhow::Result<Vec<HealthRecord>> {
        let mut qb =
            QueryBuilder::<Postgres>::new(format!("SELECT {RECORD_COLUMNS} FROM health_records"));
        push_filters(&mut qb, user_id, filter);
        qb.push(" ORDER BY assessed_at DESC, created_at DESC");
        qb.push(" LIMIT ").push_bind(limit);
        qb.push(" OFFSET ").push_bind(offset);

        let rows = qb
            .build_query_as::<HealthRecordRow>()
            .fetch_all(db)
            .await
            .context("list health records")?;
        convert(rows)
    }

    pub async fn count(db: &PgPool, user_id: Uuid, filter: RecordFilter) -> anyhow::Result<i64> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM health_records");
        push_filters(&mut qb, user_id, filter);
        qb.build_query_scalar::<i64>()
            .fetch_one(db)
            .await
            .context("count health records")
    }

    /// Records inside the filter's window, oldest first, at most `limit`.
    pub async fn trend_records(
        db: &PgPool,
        user_id: Uuid,
        filter: RecordFilter,
        limit: i64,
    ) -> anyhow::Result<Vec<HealthRecord>> {
        let mut qb =
            QueryBuilder::<Postgres>::new(format!("SELECT {RECORD_COLUMNS} FROM health_records"));
        push_filters(&mut qb, user_id, filter);
        qb.push(" ORDER BY assessed_at ASC, created_at ASC");
        qb.push(" LIMIT ").push_bind(limit);

        let rows = qb
            .build_query_as::<HealthRecordRow>()
            .fetch_all(db)
            .await
            .context("load trend records")?;
        convert(rows)
    }

    /// Writes every mutable column back and bumps `updated_at`.
    pub async fn save(db: &PgPool, record: &HealthRecord) -> anyhow::Result<HealthRecord> {
        let row = sqlx::query_as::<_, HealthRecordRow>(&format!(
            r#"
            UPDATE health_records
               SET assessed_at = $3,
                   overall_score = $4,
                   physical_score = $5,
                   mental_score = $6,
                   lifestyle_score = $7,
                   assessment_type = $8,
                   health_level = $9,
                   assessment_notes = $10,
                   detailed_metrics = $11,
                   data_source = $12,
                   updated_at = now()
             WHERE id = $1 AND user_id = $2
            RETURNING {RECORD_COLUMNS}
            "#
        ))
        .bind(record.id)
        .bind(record.user_id)
        .bind(record.assessed_at)
        .bind(record.overall_score)
        .bind(record.physical_score)
        .bind(record.mental_score)
        .bind(record.lifestyle_score)
        .bind(record.assessment_type.as_str())
        .bind(record.health_level.as_str())
        .bind(record.assessment_notes.as_deref())
        .bind(record.detailed_metrics.as_ref())
        .bind(record.data_source.as_str())
        .fetch_one(db)
        .await
        .context("update health record")?;

        row.try_into()
    }

    /// Returns false when the user had no such record.
    pub async fn delete(db: &PgPool, user_id: Uuid, id: Uuid) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM health_records WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(db)
            .await
            .context("delete health record")?;
        Ok(result.rows_affected() > 0)
    }
}
