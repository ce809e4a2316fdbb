//! Trend aggregation over a user's health records.
//!
//! Everything here is pure: the repository hands over records already
//! filtered to a window and sorted by `assessed_at` ascending, and the
//! functions below turn them into summary statistics and chart-ready data.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use time::{macros::datetime, macros::format_description, Duration, OffsetDateTime, UtcOffset};

use super::repo_types::{AssessmentType, DataSource, HealthLevel, HealthRecord};
use crate::error::AppError;

/// Score difference between first and last record that counts as a trend.
pub const TREND_THRESHOLD: f64 = 5.0;

/// Start of the `all` window.
pub const EPOCH_START: OffsetDateTime = datetime!(2020-01-01 0:00 UTC);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeRange {
    #[serde(rename = "7d")]
    Week,
    #[default]
    #[serde(rename = "30d")]
    Month,
    #[serde(rename = "90d")]
    Quarter,
    #[serde(rename = "180d")]
    HalfYear,
    #[serde(rename = "365d")]
    Year,
    #[serde(rename = "all")]
    All,
}

impl TimeRange {
    pub fn days(self) -> Option<i64> {
        match self {
            TimeRange::Week => Some(7),
            TimeRange::Month => Some(30),
            TimeRange::Quarter => Some(90),
            TimeRange::HalfYear => Some(180),
            TimeRange::Year => Some(365),
            TimeRange::All => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TimeRange::Week => "last 7 days",
            TimeRange::Month => "last 30 days",
            TimeRange::Quarter => "last 90 days",
            TimeRange::HalfYear => "last 180 days",
            TimeRange::Year => "last 365 days",
            TimeRange::All => "all time",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: OffsetDateTime,
    pub end: OffsetDateTime,
    /// Whether either bound came from the caller instead of the preset.
    pub explicit: bool,
}

impl TimeWindow {
    /// Resolves a preset range relative to `now`.
    ///
    /// An explicit `start_date` replaces the preset start and an explicit
    /// `end_date` replaces `now` as the end. Each bound is overridden
    /// independently.
    pub fn resolve(
        range: TimeRange,
        start_date: Option<OffsetDateTime>,
        end_date: Option<OffsetDateTime>,
        now: OffsetDateTime,
    ) -> Result<Self, AppError> {
        let preset_start = match range.days() {
            Some(days) => now - Duration::days(days),
            None => EPOCH_START,
        };
        let start = start_date.unwrap_or(preset_start);
        let end = end_date.unwrap_or(now);
        if start >= end {
            return Err(AppError::Validation(
                "start_date must be earlier than end_date".into(),
            ));
        }
        Ok(Self {
            start,
            end,
            explicit: start_date.is_some() || end_date.is_some(),
        })
    }

    pub fn whole_days(&self) -> i64 {
        (self.end - self.start).whole_days()
    }

    /// Human description, e.g. `last 30 days` or `2024-01-01 to 2024-02-01`.
    pub fn describe(&self, range: TimeRange) -> String {
        if self.explicit {
            format!("{} to {}", format_date(self.start), format_date(self.end))
        } else {
            range.label().to_string()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreTrend {
    Rising,
    Falling,
    Stable,
}

impl ScoreTrend {
    /// Compares only the first and last score.
    pub fn classify(first: f64, last: f64) -> Self {
        if last > first + TREND_THRESHOLD {
            ScoreTrend::Rising
        } else if last < first - TREND_THRESHOLD {
            ScoreTrend::Falling
        } else {
            ScoreTrend::Stable
        }
    }

    pub fn color(self) -> &'static str {
        match self {
            ScoreTrend::Rising => "#52c41a",
            ScoreTrend::Falling => "#ff4d4f",
            ScoreTrend::Stable => "#1890ff",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthSummary {
    pub latest_score: Option<f64>,
    pub average_score: Option<f64>,
    pub max_score: Option<f64>,
    pub min_score: Option<f64>,
    pub score_trend: ScoreTrend,
    pub total_assessments: usize,
    /// Assessments per 30 days.
    pub assessment_frequency: f64,
    pub health_level_distribution: BTreeMap<HealthLevel, usize>,
    /// Percent change from the first to the last score.
    pub improvement_rate: Option<f64>,
}

impl HealthSummary {
    fn empty() -> Self {
        Self {
            latest_score: None,
            average_score: None,
            max_score: None,
            min_score: None,
            score_trend: ScoreTrend::Stable,
            total_assessments: 0,
            assessment_frequency: 0.0,
            health_level_distribution: BTreeMap::new(),
            improvement_rate: None,
        }
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Summary statistics over `records`, which must be sorted oldest first.
pub fn summarize(records: &[HealthRecord], window: &TimeWindow) -> HealthSummary {
    let (Some(first), Some(last)) = (records.first(), records.last()) else {
        return HealthSummary::empty();
    };

    let n = records.len();
    let scores = records.iter().map(|r| r.overall_score);
    let sum: f64 = scores.clone().sum();
    let max = scores.clone().fold(f64::MIN, f64::max);
    let min = scores.fold(f64::MAX, f64::min);

    let (score_trend, improvement_rate) = if n >= 2 {
        let (a, b) = (first.overall_score, last.overall_score);
        let rate = (a > 0.0).then(|| round_to((b - a) / a * 100.0, 2));
        (ScoreTrend::classify(a, b), rate)
    } else {
        (ScoreTrend::Stable, None)
    };

    let days = window.whole_days();
    let assessment_frequency = if days > 0 {
        round_to(n as f64 / (days as f64 / 30.0).max(1.0), 2)
    } else {
        0.0
    };

    let mut distribution = BTreeMap::new();
    for r in records {
        *distribution.entry(r.health_level).or_insert(0) += 1;
    }

    HealthSummary {
        latest_score: Some(round_to(last.overall_score, 1)),
        average_score: Some(round_to(sum / n as f64, 1)),
        max_score: Some(round_to(max, 1)),
        min_score: Some(round_to(min, 1)),
        score_trend,
        total_assessments: n,
        assessment_frequency,
        health_level_distribution: distribution,
        improvement_rate,
    }
}

/// A record flattened for direct use as an ECharts series entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EChartsDataPoint {
    pub date: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub value: f64,
    pub physical: Option<f64>,
    pub mental: Option<f64>,
    pub lifestyle: Option<f64>,
    pub level: HealthLevel,
    #[serde(rename = "type")]
    pub assessment_type: AssessmentType,
    pub source: DataSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl EChartsDataPoint {
    pub fn from_record(record: &HealthRecord, include_details: bool) -> Self {
        Self {
            date: format_date(record.assessed_at),
            timestamp: (record.assessed_at.unix_timestamp_nanos() / 1_000_000) as i64,
            value: record.overall_score,
            physical: record.physical_score,
            mental: record.mental_score,
            lifestyle: record.lifestyle_score,
            level: record.health_level,
            assessment_type: record.assessment_type,
            source: record.data_source,
            details: include_details
                .then(|| record.detailed_metrics.clone())
                .flatten(),
        }
    }
}

fn format_date(at: OffsetDateTime) -> String {
    let fmt = format_description!("[year]-[month]-[day]");
    at.to_offset(UtcOffset::UTC)
        .format(&fmt)
        .unwrap_or_else(|_| at.date().to_string())
}

/// Suggested ECharts option object; `{}` when there is nothing to plot.
pub fn echarts_config(points: &[EChartsDataPoint], summary: &HealthSummary) -> Value {
    if points.is_empty() {
        return json!({});
    }

    let average = summary
        .average_score
        .map(|a| a.to_string())
        .unwrap_or_else(|| "-".into());

    let mut series = vec![json!({
        "name": "Overall score",
        "type": "line",
        "smooth": true,
        "symbol": "circle",
        "symbolSize": 6,
        "lineStyle": { "width": 2, "color": summary.score_trend.color() },
    })];

    let mut config = json!({
        "title": {
            "text": "Health trend",
            "subtext": format!("{} assessments, average {}", summary.total_assessments, average),
        },
        "tooltip": {
            "trigger": "axis",
            "formatter": "{b}<br/>Overall score: {c}<br/>Health level: {d}",
        },
        "xAxis": { "type": "time", "name": "Date" },
        "yAxis": { "type": "value", "name": "Score", "min": 0, "max": 100 },
        "grid": {
            "left": "3%",
            "right": "4%",
            "bottom": "3%",
            "top": "15%",
            "containLabel": true,
        },
    });

    if points.iter().any(|p| p.physical.is_some()) {
        for (name, symbol) in [
            ("Physical", "triangle"),
            ("Mental", "diamond"),
            ("Lifestyle", "rect"),
        ] {
            series.push(json!({
                "name": name,
                "type": "line",
                "smooth": true,
                "symbol": symbol,
                "symbolSize": 4,
            }));
        }
        config["legend"] = json!({
            "data": ["Overall score", "Physical", "Mental", "Lifestyle"],
            "top": "5%",
        });
    }

    config["series"] = Value::Array(series);
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;
    use uuid::Uuid;

    fn record(at: OffsetDateTime, score: f64) -> HealthRecord {
        HealthRecord {
            id: Uuid::new_v4(),
            user_id: Uuid::nil(),
            assessed_at: at,
            overall_score: score,
            physical_score: None,
            mental_score: None,
            lifestyle_score: None,
            assessment_type: AssessmentType::Comprehensive,
            health_level: HealthLevel::from_score(score),
            assessment_notes: None,
            detailed_metrics: None,
            data_source: DataSource::Manual,
            created_at: at,
            updated_at: at,
        }
    }

    fn window_days(days: i64) -> TimeWindow {
        let end = datetime!(2024-06-30 12:00 UTC);
        TimeWindow {
            start: end - Duration::days(days),
            end,
            explicit: false,
        }
    }

    fn series(scores: &[f64]) -> Vec<HealthRecord> {
        let base = datetime!(2024-06-01 08:00 UTC);
        scores
            .iter()
            .enumerate()
            .map(|(i, s)| record(base + Duration::days(i as i64), *s))
            .collect()
    }

    #[test]
    fn preset_window_ends_now() {
        let now = datetime!(2024-06-30 12:00 UTC);
        let w = TimeWindow::resolve(TimeRange::Week, None, None, now).unwrap();
        assert_eq!(w.end, now);
        assert_eq!(w.start, datetime!(2024-06-23 12:00 UTC));
        assert!(!w.explicit);
        assert_eq!(w.describe(TimeRange::Week), "last 7 days");
    }

    #[test]
    fn all_window_starts_at_epoch() {
        let now = datetime!(2024-06-30 12:00 UTC);
        let w = TimeWindow::resolve(TimeRange::All, None, None, now).unwrap();
        assert_eq!(w.start, EPOCH_START);
        assert_eq!(w.describe(TimeRange::All), "all time");
    }

    #[test]
    fn explicit_bounds_override_preset() {
        let now = datetime!(2024-06-30 12:00 UTC);
        let start = datetime!(2024-01-01 0:00 UTC);
        let end = datetime!(2024-02-01 0:00 UTC);
        let w = TimeWindow::resolve(TimeRange::Week, Some(start), Some(end), now).unwrap();
        assert_eq!((w.start, w.end), (start, end));
        assert_eq!(w.describe(TimeRange::Week), "2024-01-01 to 2024-02-01");
    }

    #[test]
    fn end_only_replaces_the_end() {
        let now = datetime!(2024-06-30 12:00 UTC);
        let end = datetime!(2024-06-15 0:00 UTC);
        let w = TimeWindow::resolve(TimeRange::Month, None, Some(end), now).unwrap();
        assert_eq!(w.start, datetime!(2024-05-31 12:00 UTC));
        assert_eq!(w.end, end);
        assert!(w.explicit);
        assert_eq!(w.describe(TimeRange::Month), "2024-05-31 to 2024-06-15");
    }

    #[test]
    fn end_before_preset_start_is_rejected() {
        let now = datetime!(2024-06-30 12:00 UTC);
        let end = datetime!(2024-03-31 0:00 UTC);
        let err = TimeWindow::resolve(TimeRange::Month, None, Some(end), now).unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);
    }

    #[test]
    fn start_only_keeps_now_as_end() {
        let now = datetime!(2024-06-30 12:00 UTC);
        let start = datetime!(2024-06-01 0:00 UTC);
        let w = TimeWindow::resolve(TimeRange::Week, Some(start), None, now).unwrap();
        assert_eq!((w.start, w.end), (start, now));
        assert_eq!(w.whole_days(), 29);
    }

    #[test]
    fn inverted_window_is_rejected() {
        let now = datetime!(2024-06-30 12:00 UTC);
        let start = datetime!(2024-05-01 0:00 UTC);
        let end = datetime!(2024-04-01 0:00 UTC);
        assert!(TimeWindow::resolve(TimeRange::Month, Some(start), Some(end), now).is_err());
        assert!(TimeWindow::resolve(TimeRange::Month, Some(start), Some(start), now).is_err());
    }

    #[test]
    fn time_range_deserializes_from_query_tokens() {
        let r: TimeRange = serde_json::from_str("\"90d\"").unwrap();
        assert_eq!(r, TimeRange::Quarter);
        let r: TimeRange = serde_json::from_str("\"all\"").unwrap();
        assert_eq!(r, TimeRange::All);
        assert!(serde_json::from_str::<TimeRange>("\"2w\"").is_err());
    }

    #[test]
    fn empty_summary() {
        let s = summarize(&[], &window_days(30));
        assert_eq!(s, HealthSummary::empty());
        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json["score_trend"], "stable");
        assert!(json["average_score"].is_null());
        assert_eq!(json["health_level_distribution"], json!({}));
    }

    #[test]
    fn single_record_is_stable_without_improvement() {
        let s = summarize(&series(&[72.0]), &window_days(30));
        assert_eq!(s.score_trend, ScoreTrend::Stable);
        assert_eq!(s.latest_score, Some(72.0));
        assert_eq!(s.improvement_rate, None);
        assert_eq!(s.total_assessments, 1);
    }

    #[test]
    fn zero_latest_score_is_reported() {
        let s = summarize(&series(&[0.0]), &window_days(30));
        assert_eq!(s.latest_score, Some(0.0));
        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json["latest_score"], json!(0.0));
    }

    #[test]
    fn unchanged_score_has_zero_improvement() {
        let s = summarize(&series(&[64.0, 90.0, 64.0]), &window_days(30));
        assert_eq!(s.improvement_rate, Some(0.0));
        assert_eq!(s.score_trend, ScoreTrend::Stable);
    }

    #[test]
    fn basic_statistics() {
        let s = summarize(&series(&[60.0, 75.5, 90.25, 70.0]), &window_days(30));
        assert_eq!(s.latest_score, Some(70.0));
        assert_eq!(s.average_score, Some(73.9));
        assert_eq!(s.max_score, Some(90.3));
        assert_eq!(s.min_score, Some(60.0));
        assert_eq!(s.total_assessments, 4);
    }

    #[test]
    fn trend_uses_first_and_last_only() {
        let rising = summarize(&series(&[50.0, 20.0, 55.1]), &window_days(30));
        assert_eq!(rising.score_trend, ScoreTrend::Rising);

        let falling = summarize(&series(&[80.0, 99.0, 74.9]), &window_days(30));
        assert_eq!(falling.score_trend, ScoreTrend::Falling);

        let stable = summarize(&series(&[80.0, 10.0, 85.0]), &window_days(30));
        assert_eq!(stable.score_trend, ScoreTrend::Stable);
    }

    #[test]
    fn improvement_rate_is_percent_change() {
        let s = summarize(&series(&[50.0, 75.0]), &window_days(30));
        assert_eq!(s.improvement_rate, Some(50.0));

        let s = summarize(&series(&[80.0, 60.0]), &window_days(30));
        assert_eq!(s.improvement_rate, Some(-25.0));

        let s = summarize(&series(&[0.0, 60.0]), &window_days(30));
        assert_eq!(s.improvement_rate, None);
    }

    #[test]
    fn frequency_is_per_thirty_days() {
        let records = series(&[60.0, 62.0, 64.0, 66.0, 68.0, 70.0]);
        assert_eq!(summarize(&records, &window_days(90)).assessment_frequency, 2.0);
        // windows shorter than a month count as one month
        assert_eq!(summarize(&records, &window_days(7)).assessment_frequency, 6.0);

        let sub_day = TimeWindow {
            start: datetime!(2024-06-30 00:00 UTC),
            end: datetime!(2024-06-30 12:00 UTC),
            explicit: true,
        };
        assert_eq!(summarize(&records, &sub_day).assessment_frequency, 0.0);
    }

    #[test]
    fn distribution_counts_levels() {
        let s = summarize(&series(&[95.0, 85.0, 65.0, 45.0, 10.0, 20.0]), &window_days(30));
        let d = &s.health_level_distribution;
        assert_eq!(d.get(&HealthLevel::Excellent), Some(&2));
        assert_eq!(d.get(&HealthLevel::Good), Some(&1));
        assert_eq!(d.get(&HealthLevel::Fair), Some(&1));
        assert_eq!(d.get(&HealthLevel::Poor), Some(&2));

        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json["health_level_distribution"]["poor"], 2);
    }

    #[test]
    fn data_point_shape() {
        let mut r = record(datetime!(2024-03-05 23:30 UTC), 82.5);
        r.physical_score = Some(0.0);
        r.detailed_metrics = Some(json!({ "heart_rate": 64 }));

        let p = EChartsDataPoint::from_record(&r, false);
        assert_eq!(p.date, "2024-03-05");
        assert_eq!(p.timestamp, 1_709_681_400_000);
        assert_eq!(p.physical, Some(0.0));
        assert_eq!(p.level, HealthLevel::Excellent);
        assert!(p.details.is_none());

        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["type"], "comprehensive");
        assert_eq!(json["source"], "manual");
        assert!(json.get("details").is_none());

        let with_details = EChartsDataPoint::from_record(&r, true);
        assert_eq!(with_details.details, Some(json!({ "heart_rate": 64 })));
    }

    #[test]
    fn data_point_date_is_utc() {
        let offset = time::UtcOffset::from_hms(8, 0, 0).unwrap();
        let at = datetime!(2024-03-05 20:00 UTC).to_offset(offset);
        assert_eq!(at.day(), 6);
        let p = EChartsDataPoint::from_record(&record(at, 70.0), false);
        assert_eq!(p.date, "2024-03-05");
    }

    #[test]
    fn config_is_empty_without_points() {
        assert_eq!(echarts_config(&[], &HealthSummary::empty()), json!({}));
    }

    #[test]
    fn config_colors_line_by_trend() {
        let records = series(&[50.0, 70.0]);
        let summary = summarize(&records, &window_days(30));
        let points: Vec<_> = records
            .iter()
            .map(|r| EChartsDataPoint::from_record(r, false))
            .collect();
        let config = echarts_config(&points, &summary);
        assert_eq!(config["series"][0]["lineStyle"]["color"], "#52c41a");
        assert_eq!(config["series"].as_array().unwrap().len(), 1);
        assert!(config.get("legend").is_none());
        assert_eq!(config["title"]["subtext"], "2 assessments, average 60");
    }

    #[test]
    fn config_adds_dimension_series_when_present() {
        let mut records = series(&[70.0, 71.0]);
        records[1].physical_score = Some(66.0);
        let summary = summarize(&records, &window_days(30));
        let points: Vec<_> = records
            .iter()
            .map(|r| EChartsDataPoint::from_record(r, false))
            .collect();
        let config = echarts_config(&points, &summary);
        assert_eq!(config["series"].as_array().unwrap().len(), 4);
        assert_eq!(config["legend"]["data"][3], "Lifestyle");
        assert_eq!(config["series"][0]["lineStyle"]["color"], "#1890ff");
    }
}
