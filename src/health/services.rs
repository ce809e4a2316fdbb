use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use super::{
    dto::{BatchResponse, HealthRecordCreate, HealthRecordUpdate, HealthTrendsResponse},
    repo_types::{HealthLevel, HealthRecord, NewHealthRecord},
    trends::{self, EChartsDataPoint, TimeRange, TimeWindow},
};
use crate::error::AppError;

pub const MAX_NOTES_LEN: usize = 1000;
pub const MAX_BATCH_SIZE: usize = 100;

fn check_score(field: &str, score: f64) -> Result<f64, AppError> {
    if !score.is_finite() || !(0.0..=100.0).contains(&score) {
        return Err(AppError::Validation(format!(
            "{field} must be between 0 and 100"
        )));
    }
    Ok(score)
}

fn check_optional_score(field: &str, score: Option<f64>) -> Result<Option<f64>, AppError> {
    score.map(|s| check_score(field, s)).transpose()
}

fn clean_notes(notes: Option<String>) -> Result<Option<String>, AppError> {
    let Some(notes) = notes.map(|n| n.trim().to_string()) else {
        return Ok(None);
    };
    if notes.is_empty() {
        return Ok(None);
    }
    if notes.chars().count() > MAX_NOTES_LEN {
        return Err(AppError::Validation(format!(
            "assessment_notes must be at most {MAX_NOTES_LEN} characters"
        )));
    }
    Ok(Some(notes))
}

fn check_metrics(metrics: &Option<serde_json::Value>) -> Result<(), AppError> {
    match metrics {
        Some(value) if !value.is_object() => Err(AppError::Validation(
            "detailed_metrics must be a JSON object".into(),
        )),
        _ => Ok(()),
    }
}

/// Validates a create payload and derives the health level.
pub fn validate_create(req: HealthRecordCreate) -> Result<NewHealthRecord, AppError> {
    let overall_score = check_score("overall_score", req.overall_score)?;
    let physical_score = check_optional_score("physical_score", req.physical_score)?;
    let mental_score = check_optional_score("mental_score", req.mental_score)?;
    let lifestyle_score = check_optional_score("lifestyle_score", req.lifestyle_score)?;
    let assessment_notes = clean_notes(req.assessment_notes)?;
    check_metrics(&req.detailed_metrics)?;

    Ok(NewHealthRecord {
        assessed_at: req.assessed_at,
        overall_score,
        physical_score,
        mental_score,
        lifestyle_score,
        assessment_type: req.assessment_type,
        health_level: HealthLevel::from_score(overall_score),
        assessment_notes,
        detailed_metrics: req.detailed_metrics,
        data_source: req.data_source,
    })
}

/// Validates every record of a batch; the first failure names its index.
pub fn validate_batch(records: Vec<HealthRecordCreate>) -> Result<Vec<NewHealthRecord>, AppError> {
    if records.is_empty() || records.len() > MAX_BATCH_SIZE {
        return Err(AppError::Validation(format!(
            "records must contain between 1 and {MAX_BATCH_SIZE} items"
        )));
    }
    records
        .into_iter()
        .enumerate()
        .map(|(i, r)| {
            validate_create(r).map_err(|e| AppError::Validation(format!("record {i}: {e}")))
        })
        .collect()
}

/// Validates the present fields of `req` and merges them into `record`.
///
/// `health_level` follows `overall_score` whenever the score is touched.
pub fn apply_update(
    mut record: HealthRecord,
    req: HealthRecordUpdate,
) -> Result<HealthRecord, AppError> {
    if let Some(at) = req.assessed_at {
        record.assessed_at = at;
    }
    if let Some(score) = req.overall_score {
        record.overall_score = check_score("overall_score", score)?;
        record.health_level = HealthLevel::from_score(record.overall_score);
    }
    if let Some(score) = req.physical_score {
        record.physical_score = check_optional_score("physical_score", score)?;
    }
    if let Some(score) = req.mental_score {
        record.mental_score = check_optional_score("mental_score", score)?;
    }
    if let Some(score) = req.lifestyle_score {
        record.lifestyle_score = check_optional_score("lifestyle_score", score)?;
    }
    if let Some(kind) = req.assessment_type {
        record.assessment_type = kind;
    }
    if let Some(notes) = req.assessment_notes {
        record.assessment_notes = clean_notes(notes)?;
    }
    if let Some(metrics) = req.detailed_metrics {
        check_metrics(&metrics)?;
        record.detailed_metrics = metrics;
    }
    if let Some(source) = req.data_source {
        record.data_source = source;
    }
    Ok(record)
}

pub async fn create(
    db: &PgPool,
    user_id: Uuid,
    new: NewHealthRecord,
) -> Result<HealthRecord, AppError> {
    let record = HealthRecord::insert(db, user_id, &new).await?;
    info!(
        user_id = %user_id,
        record_id = %record.id,
        score = record.overall_score,
        level = %record.health_level,
        "health record created"
    );
    Ok(record)
}

pub async fn create_batch(
    db: &PgPool,
    user_id: Uuid,
    records: Vec<NewHealthRecord>,
) -> Result<BatchResponse, AppError> {
    let created_ids = HealthRecord::insert_batch(db, user_id, &records).await?;
    info!(user_id = %user_id, count = created_ids.len(), "health records batch created");
    Ok(BatchResponse {
        success_count: created_ids.len(),
        failed_count: 0,
        errors: Vec::new(),
        created_ids,
    })
}

/// Assembles the trends payload from records sorted oldest first.
pub fn build_trends(
    records: &[HealthRecord],
    window: &TimeWindow,
    range: TimeRange,
    include_details: bool,
) -> HealthTrendsResponse {
    let summary = trends::summarize(records, window);
    let data_points: Vec<EChartsDataPoint> = records
        .iter()
        .map(|r| EChartsDataPoint::from_record(r, include_details))
        .collect();
    let echarts_config = trends::echarts_config(&data_points, &summary);

    HealthTrendsResponse {
        total_records: data_points.len(),
        time_range: window.describe(range),
        data_points,
        summary,
        echarts_config,
    }
}
