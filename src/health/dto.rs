use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::extract::nullable;

use super::{
    repo_types::{AssessmentType, DataSource, RecordFilter},
    trends::{EChartsDataPoint, HealthSummary, TimeRange},
};

#[derive(Debug, Clone, Deserialize)]
pub struct HealthRecordCreate {
    #[serde(with = "time::serde::rfc3339")]
    pub assessed_at: OffsetDateTime,
    pub overall_score: f64,
    pub physical_score: Option<f64>,
    pub mental_score: Option<f64>,
    pub lifestyle_score: Option<f64>,
    #[serde(default)]
    pub assessment_type: AssessmentType,
    pub assessment_notes: Option<String>,
    pub detailed_metrics: Option<serde_json::Value>,
    #[serde(default)]
    pub data_source: DataSource,
}

/// Partial update; absent fields are left untouched. The optional columns
/// use `Option<Option<_>>` so an explicit `null` clears them.
#[derive(Debug, Default, Deserialize)]
pub struct HealthRecordUpdate {
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub assessed_at: Option<OffsetDateTime>,
    pub overall_score: Option<f64>,
    #[serde(default, deserialize_with = "nullable")]
    pub physical_score: Option<Option<f64>>,
    #[serde(default, deserialize_with = "nullable")]
    pub mental_score: Option<Option<f64>>,
    #[serde(default, deserialize_with = "nullable")]
    pub lifestyle_score: Option<Option<f64>>,
    pub assessment_type: Option<AssessmentType>,
    #[serde(default, deserialize_with = "nullable")]
    pub assessment_notes: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub detailed_metrics: Option<Option<serde_json::Value>>,
    pub data_source: Option<DataSource>,
}

#[derive(Debug, Deserialize)]
pub struct BatchHealthRecordCreate {
    pub records: Vec<HealthRecordCreate>,
}

#[derive(Debug, Serialize)]
pub struct BatchResponse {
    pub success_count: usize,
    pub failed_count: usize,
    pub errors: Vec<String>,
    pub created_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct RecordListQuery {
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "default_list_limit")]
    pub limit: i64,
    pub assessment_type: Option<AssessmentType>,
    pub data_source: Option<DataSource>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub start_date: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub end_date: Option<OffsetDateTime>,
}

impl RecordListQuery {
    pub fn filter(&self) -> RecordFilter {
        RecordFilter {
            assessment_type: self.assessment_type,
            data_source: self.data_source,
            start: self.start_date,
            end: self.end_date,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TrendsQuery {
    #[serde(default)]
    pub time_range: TimeRange,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub start_date: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub end_date: Option<OffsetDateTime>,
    pub assessment_type: Option<AssessmentType>,
    pub data_source: Option<DataSource>,
    #[serde(default)]
    pub include_details: bool,
    #[serde(default = "default_trend_limit")]
    pub limit: i64,
}

#[derive(Debug, Deserialize)]
pub struct SummaryQuery {
    #[serde(default)]
    pub time_range: TimeRange,
    #[serde(default = "default_trend_limit")]
    pub limit: i64,
}

#[derive(Debug, Serialize)]
pub struct HealthTrendsResponse {
    pub data_points: Vec<EChartsDataPoint>,
    pub summary: HealthSummary,
    pub time_range: String,
    pub total_records: usize,
    pub echarts_config: serde_json::Value,
}

fn default_list_limit() -> i64 {
    20
}

fn default_trend_limit() -> i64 {
    100
}
