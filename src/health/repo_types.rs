use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssessmentType {
    #[default]
    Comprehensive,
    Quick,
    Specific,
}

impl AssessmentType {
    pub fn as_str(self) -> &'static str {
        match self {
            AssessmentType::Comprehensive => "comprehensive",
            AssessmentType::Quick => "quick",
            AssessmentType::Specific => "specific",
        }
    }
}

impl FromStr for AssessmentType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "comprehensive" => Ok(AssessmentType::Comprehensive),
            "quick" => Ok(AssessmentType::Quick),
            "specific" => Ok(AssessmentType::Specific),
            other => anyhow::bail!("unknown assessment type: {other}"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    #[default]
    Manual,
    Device,
    Api,
}

impl DataSource {
    pub fn as_str(self) -> &'static str {
        match self {
            DataSource::Manual => "manual",
            DataSource::Device => "device",
            DataSource::Api => "api",
        }
    }
}

impl FromStr for DataSource {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(DataSource::Manual),
            "device" => Ok(DataSource::Device),
            "api" => Ok(DataSource::Api),
            other => anyhow::bail!("unknown data source: {other}"),
        }
    }
}

/// Health level bucket derived from the overall score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthLevel {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl HealthLevel {
    /// >=80 excellent, >=60 good, >=40 fair, otherwise poor.
    pub fn from_score(score: f64) -> Self {
        if score >= 80.0 {
            HealthLevel::Excellent
        } else if score >= 60.0 {
            HealthLevel::Good
        } else if score >= 40.0 {
            HealthLevel::Fair
        } else {
            HealthLevel::Poor
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HealthLevel::Excellent => "excellent",
            HealthLevel::Good => "good",
            HealthLevel::Fair => "fair",
            HealthLevel::Poor => "poor",
        }
    }
}

impl fmt::Display for HealthLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HealthLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "excellent" => Ok(HealthLevel::Excellent),
            "good" => Ok(HealthLevel::Good),
            "fair" => Ok(HealthLevel::Fair),
            "poor" => Ok(HealthLevel::Poor),
            other => anyhow::bail!("unknown health level: {other}"),
        }
    }
}

/// Raw row as stored in `health_records`.
#[derive(Debug, FromRow)]
pub struct HealthRecordRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub assessed_at: OffsetDateTime,
    pub overall_score: f64,
    pub physical_score: Option<f64>,
    pub mental_score: Option<f64>,
    pub lifestyle_score: Option<f64>,
    pub assessment_type: String,
    pub health_level: String,
    pub assessment_notes: Option<String>,
    pub detailed_metrics: Option<serde_json::Value>,
    pub data_source: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub assessed_at: OffsetDateTime,
    pub overall_score: f64,
    pub physical_score: Option<f64>,
    pub mental_score: Option<f64>,
    pub lifestyle_score: Option<f64>,
    pub assessment_type: AssessmentType,
    pub health_level: HealthLevel,
    pub assessment_notes: Option<String>,
    pub detailed_metrics: Option<serde_json::Value>,
    pub data_source: DataSource,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl TryFrom<HealthRecordRow> for HealthRecord {
    type Error = anyhow::Error;

    fn try_from(r: HealthRecordRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            user_id: r.user_id,
            assessed_at: r.assessed_at,
            overall_score: r.overall_score,
            physical_score: r.physical_score,
            mental_score: r.mental_score,
            lifestyle_score: r.lifestyle_score,
            assessment_type: r.assessment_type.parse()?,
            health_level: r.health_level.parse()?,
            assessment_notes: r.assessment_notes,
            detailed_metrics: r.detailed_metrics,
            data_source: r.data_source.parse()?,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

/// Validated values for an insert; `health_level` is always derived here.
#[derive(Debug, Clone)]
pub struct NewHealthRecord {
    pub assessed_at: OffsetDateTime,
    pub overall_score: f64,
    pub physical_score: Option<f64>,
    pub mental_score: Option<f64>,
    pub lifestyle_score: Option<f64>,
    pub assessment_type: AssessmentType,
    pub health_level: HealthLevel,
    pub assessment_notes: Option<String>,
    pub detailed_metrics: Option<serde_json::Value>,
    pub data_source: DataSource,
}

/// Optional filters shared by listing, counting and trend queries.
#[derive(Debug, Default, Clone, Copy)]
pub struct RecordFilter {
    pub assessment_type: Option<AssessmentType>,
    pub data_source: Option<DataSource>,
    pub start: Option<OffsetDateTime>,
    pub end: Option<OffsetDateTime>,
}
