//! Cohort retention. Builds first-session cohorts at day, week or month
//! granularity, runs one cohort report and pivots it into a cohort by offset
//! matrix, optionally split by platform.

use crate::client::{DimensionValue, MetricValue, ReportingApi, RunReportResponse};
use crate::date_range::DateRange;
use crate::request::{
    property_path, Cohort, CohortGranularity, CohortSpec, CohortsRange, Dimension, Metric,
    RunReportRequest,
};
use chrono::{Datelike, Duration, Months, NaiveDate};
use insight_core::{InsightError, InsightResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

pub const COHORT_ANCHOR_DIMENSION: &str = "firstSessionDate";
pub const PLATFORM_DIMENSION: &str = "platformDeviceCategory";
pub const ACTIVE_USERS_METRIC: &str = "cohortActiveUsers";

// ─── Types ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionGranularity {
    #[default]
    Day,
    Week,
    Month,
}

impl RetentionGranularity {
    pub fn offset_dimension(self) -> &'static str {
        match self {
            RetentionGranularity::Day => "cohortNthDay",
            RetentionGranularity::Week => "cohortNthWeek",
            RetentionGranularity::Month => "cohortNthMonth",
        }
    }

    pub fn api_granularity(self) -> CohortGranularity {
        match self {
            RetentionGranularity::Day => CohortGranularity::Daily,
            RetentionGranularity::Week => CohortGranularity::Weekly,
            RetentionGranularity::Month => CohortGranularity::Monthly,
        }
    }

    /// Column prefix: `Day 0`, `Week 3`, `Month 12`.
    pub fn column_name(self) -> &'static str {
        match self {
            RetentionGranularity::Day => "Day",
            RetentionGranularity::Week => "Week",
            RetentionGranularity::Month => "Month",
        }
    }
}

impl FromStr for RetentionGranularity {
    type Err = InsightError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "day" => Ok(RetentionGranularity::Day),
            "week" => Ok(RetentionGranularity::Week),
            "month" => Ok(RetentionGranularity::Month),
            other => Err(InsightError::Config(format!(
                "unknown retention granularity {other:?} (expected day, week or month)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionQuery {
    pub platform: bool,
    pub granularity: RetentionGranularity,
    pub end_offset: u32,
    pub before_month: u32,
}

impl Default for RetentionQuery {
    fn default() -> Self {
        Self {
            platform: false,
            granularity: RetentionGranularity::Day,
            end_offset: 1,
            before_month: 12,
        }
    }
}

/// Cohort label → active users per offset. `offsets` names the columns; each
/// row holds one value per offset, in the same order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionTable {
    pub col_name: String,
    pub offsets: Vec<u32>,
    pub rows: BTreeMap<String, Vec<u64>>,
}

impl RetentionTable {
    pub fn columns(&self) -> Vec<String> {
        self.offsets
            .iter()
            .map(|o| format!("{} {}", self.col_name, o))
            .collect()
    }

    pub fn get(&self, cohort: &str, offset: u32) -> Option<u64> {
        let idx = self.offsets.iter().position(|o| *o == offset)?;
        self.rows.get(cohort).and_then(|r| r.get(idx)).copied()
    }

    pub fn cohorts(&self) -> Vec<&str> {
        self.rows.keys().map(String::as_str).collect()
    }

    /// One JSON object per cohort: `{"cohort_date": ..., "Day 0": n, ...}`.
    pub fn records(&self) -> Vec<serde_json::Map<String, serde_json::Value>> {
        let columns = self.columns();
        self.rows
            .iter()
            .map(|(cohort, values)| {
                let mut record = serde_json::Map::new();
                record.insert("cohort_date".into(), cohort.clone().into());
                for (col, value) in columns.iter().zip(values) {
                    record.insert(col.clone(), (*value).into());
                }
                record
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RetentionResult {
    Combined(RetentionTable),
    ByPlatform(BTreeMap<String, RetentionTable>),
}

impl RetentionResult {
    /// Row-per-cohort output with `{col_name} N` columns. A platform split
    /// yields one record list per category.
    pub fn to_records(&self) -> serde_json::Value {
        fn list(table: &RetentionTable) -> serde_json::Value {
            serde_json::Value::Array(
                table
                    .records()
                    .into_iter()
                    .map(serde_json::Value::Object)
                    .collect(),
            )
        }

        match self {
            RetentionResult::Combined(table) => list(table),
            RetentionResult::ByPlatform(tables) => serde_json::Value::Object(
                tables
                    .iter()
                    .map(|(platform, table)| (platform.clone(), list(table)))
                    .collect(),
            ),
        }
    }
}

// ─── Cohort construction ────────────────────────────────────────────────────

fn months_back(date: NaiveDate, months: u32) -> NaiveDate {
    date.checked_sub_months(Months::new(months)).unwrap_or(date)
}

fn cohort(label: String, start: NaiveDate, end: NaiveDate) -> Cohort {
    Cohort {
        name: label,
        dimension: COHORT_ANCHOR_DIMENSION.to_string(),
        date_range: DateRange {
            start_date: start,
            end_date: end,
        },
    }
}

/// Cohorts for the lookback window ending at `today`.
///
/// - day: every day in `[today - before_month months, today]`, one day each.
/// - week: every Monday in that window, Monday..Sunday.
/// - month: every month start from `first_of_month - before_month months`
///   through the current month start, labelled `YYYY-MM`; each covers the
///   calendar month *before* its label.
pub fn build_cohorts(
    granularity: RetentionGranularity,
    before_month: u32,
    today: NaiveDate,
) -> Vec<Cohort> {
    match granularity {
        RetentionGranularity::Day => {
            let start = months_back(today, before_month);
            start
                .iter_days()
                .take_while(|d| *d <= today)
                .map(|d| cohort(d.format("%Y-%m-%d").to_string(), d, d))
                .collect()
        }
        RetentionGranularity::Week => {
            let start = months_back(today, before_month);
            let to_monday = (7 - start.weekday().num_days_from_monday()) % 7;
            let first_monday = start + Duration::days(to_monday as i64);
            first_monday
                .iter_weeks()
                .take_while(|d| *d <= today)
                .map(|d| cohort(d.format("%Y-%m-%d").to_string(), d, d + Duration::days(6)))
                .collect()
        }
        RetentionGranularity::Month => {
            let current = today.with_day(1).unwrap_or(today);
            let mut month = months_back(current, before_month);
            let mut cohorts = Vec::new();
            while month <= current {
                let start = months_back(month, 1);
                let end = month - Duration::days(1);
                cohorts.push(cohort(month.format("%Y-%m").to_string(), start, end));
                month = match month.checked_add_months(Months::new(1)) {
                    Some(next) => next,
                    None => break,
                };
            }
            cohorts
        }
    }
}

/// The cohort report request. `platformDeviceCategory` is prepended when
/// splitting by platform.
pub fn build_retention_request(
    property_id: &str,
    query: &RetentionQuery,
    cohorts: Vec<Cohort>,
) -> RunReportRequest {
    let mut dimensions = vec![
        Dimension::new("cohort"),
        Dimension::new(query.granularity.offset_dimension()),
    ];
    if query.platform {
        dimensions.insert(0, Dimension::new(PLATFORM_DIMENSION));
    }

    RunReportRequest {
        property: property_path(property_id),
        dimensions,
        metrics: vec![Metric::new(ACTIVE_USERS_METRIC)],
        cohort_spec: Some(CohortSpec {
            cohorts,
            cohorts_range: CohortsRange {
                granularity: query.granularity.api_granularity(),
                start_offset: 0,
                end_offset: query.end_offset,
            },
        }),
        ..Default::default()
    }
}

// ─── Pivoting ───────────────────────────────────────────────────────────────

struct CohortCell<'a> {
    cohort: &'a str,
    offset: u32,
    active_users: u64,
}

fn cell<'a>(
    dims: &'a [DimensionValue],
    metrics: &[MetricValue],
    cohort_idx: usize,
) -> InsightResult<CohortCell<'a>> {
    let cohort = dims
        .get(cohort_idx)
        .ok_or_else(|| InsightError::Parse("cohort row is missing the cohort dimension".into()))?;
    let offset_raw = dims
        .get(cohort_idx + 1)
        .ok_or_else(|| InsightError::Parse("cohort row is missing the offset dimension".into()))?;
    let users_raw = metrics
        .first()
        .ok_or_else(|| InsightError::Parse("cohort row has no metric value".into()))?;

    let offset = offset_raw.value.parse::<u32>().map_err(|_| {
        InsightError::Parse(format!("invalid cohort offset {:?}", offset_raw.value))
    })?;
    let active_users = users_raw.value.parse::<u64>().map_err(|_| {
        InsightError::Parse(format!("invalid active user count {:?}", users_raw.value))
    })?;

    Ok(CohortCell {
        cohort: &cohort.value,
        offset,
        active_users,
    })
}

/// Pivot without a platform split. Only cohorts that appear in the response
/// are present, and only offsets observed somewhere become columns; gaps
/// inside a present cohort read as zero.
pub fn pivot_combined(
    response: &RunReportResponse,
    granularity: RetentionGranularity,
) -> InsightResult<RetentionTable> {
    let mut sparse: BTreeMap<String, BTreeMap<u32, u64>> = BTreeMap::new();
    let mut offsets = BTreeSet::new();

    for row in &response.rows {
        let c = cell(&row.dimension_values, &row.metric_values, 0)?;
        offsets.insert(c.offset);
        sparse
            .entry(c.cohort.to_string())
            .or_default()
            .insert(c.offset, c.active_users);
    }

    let offsets: Vec<u32> = offsets.into_iter().collect();
    let rows = sparse
        .into_iter()
        .map(|(cohort, cells)| {
            let values = offsets
                .iter()
                .map(|o| cells.get(o).copied().unwrap_or(0))
                .collect();
            (cohort, values)
        })
        .collect();

    Ok(RetentionTable {
        col_name: granularity.column_name().to_string(),
        offsets,
        rows,
    })
}

/// Pivot with a platform split. Each category gets the full `0..=end_offset`
/// column set, and every cohort seen for that category is zero-filled before
/// its observed cells are written.
pub fn pivot_by_platform(
    response: &RunReportResponse,
    granularity: RetentionGranularity,
    end_offset: u32,
) -> InsightResult<BTreeMap<String, RetentionTable>> {
    let offsets: Vec<u32> = (0..=end_offset).collect();
    let mut tables: BTreeMap<String, RetentionTable> = BTreeMap::new();

    for row in &response.rows {
        let category = row
            .dimension_values
            .first()
            .ok_or_else(|| InsightError::Parse("cohort row is missing the platform".into()))?;
        let c = cell(&row.dimension_values, &row.metric_values, 1)?;

        let table = tables
            .entry(category.value.clone())
            .or_insert_with(|| RetentionTable {
                col_name: granularity.column_name().to_string(),
                offsets: offsets.clone(),
                rows: BTreeMap::new(),
            });
        let values = table
            .rows
            .entry(c.cohort.to_string())
            .or_insert_with(|| vec![0; offsets.len()]);

        match values.get_mut(c.offset as usize) {
            Some(slot) => *slot = c.active_users,
            None => warn!(
                platform = %category.value,
                cohort = c.cohort,
                offset = c.offset,
                end_offset,
                "Cohort offset beyond requested range, dropped"
            ),
        }
    }

    Ok(tables)
}

// ─── Analyzer ───────────────────────────────────────────────────────────────

pub struct RetentionAnalyzer {
    api: Arc<dyn ReportingApi>,
    property_id: String,
}

impl RetentionAnalyzer {
    pub fn new(api: Arc<dyn ReportingApi>, property_id: impl Into<String>) -> Self {
        Self {
            api,
            property_id: property_id.into(),
        }
    }

    /// Run the retention query as of the local calendar date.
    pub async fn retention(&self, query: &RetentionQuery) -> InsightResult<RetentionResult> {
        self.retention_at(query, chrono::Local::now().date_naive())
            .await
    }

    pub async fn retention_at(
        &self,
        query: &RetentionQuery,
        today: NaiveDate,
    ) -> InsightResult<RetentionResult> {
        let cohorts = build_cohorts(query.granularity, query.before_month, today);
        let cohort_count = cohorts.len();
        let request = build_retention_request(&self.property_id, query, cohorts);

        let response = self.api.run_report(&request).await?;

        info!(
            granularity = ?query.granularity,
            platform = query.platform,
            cohorts = cohort_count,
            rows = response.rows.len(),
            "Cohort report received"
        );

        if query.platform {
            Ok(RetentionResult::ByPlatform(pivot_by_platform(
                &response,
                query.granularity,
                query.end_offset,
            )?))
        } else {
            Ok(RetentionResult::Combined(pivot_combined(
                &response,
                query.granularity,
            )?))
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
