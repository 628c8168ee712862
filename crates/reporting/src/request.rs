//! Report request wire types and the builder that assembles one from a job.

use crate::date_range::{calculate_date_range, DateRange};
use crate::filter::FilterExpression;
use chrono::NaiveDate;
use insight_core::JobConfig;
use serde::{Deserialize, Serialize};

// ─── Types ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimension {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metric {
    pub name: String,
}

impl Dimension {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Metric {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DimensionOrderBy {
    pub dimension_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub dimension: DimensionOrderBy,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub desc: bool,
}

impl OrderBy {
    pub fn dimension(name: impl Into<String>) -> Self {
        Self {
            dimension: DimensionOrderBy {
                dimension_name: name.into(),
            },
            desc: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CohortGranularity {
    Daily,
    Weekly,
    Monthly,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cohort {
    pub name: String,
    pub dimension: String,
    pub date_range: DateRange,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CohortsRange {
    pub granularity: CohortGranularity,
    #[serde(default)]
    pub start_offset: u32,
    pub end_offset: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CohortSpec {
    pub cohorts: Vec<Cohort>,
    pub cohorts_range: CohortsRange,
}

/// Body of a `runReport` call. The property travels in the URL path.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReportRequest {
    #[serde(skip)]
    pub property: String,
    pub dimensions: Vec<Dimension>,
    pub metrics: Vec<Metric>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub date_ranges: Vec<DateRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimension_filter: Option<FilterExpression>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub order_bys: Vec<OrderBy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cohort_spec: Option<CohortSpec>,
}

impl RunReportRequest {
    pub fn dimension_names(&self) -> Vec<&str> {
        self.dimensions.iter().map(|d| d.name.as_str()).collect()
    }

    pub fn metric_names(&self) -> Vec<&str> {
        self.metrics.iter().map(|m| m.name.as_str()).collect()
    }
}

pub fn property_path(property_id: &str) -> String {
    format!("properties/{property_id}")
}

// ─── Builder ────────────────────────────────────────────────────────────────

/// Turns a job descriptor into a report request for one property.
#[derive(Debug, Clone)]
pub struct ReportRequestBuilder {
    property_id: String,
    today: NaiveDate,
}

impl ReportRequestBuilder {
    pub fn new(property_id: impl Into<String>) -> Self {
        Self {
            property_id: property_id.into(),
            today: chrono::Local::now().date_naive(),
        }
    }

    /// Pin "today" so date ranges are reproducible.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    /// The default dimension always ends up first, and the request is ordered by it.
    pub fn build(&self, job: &JobConfig, filter: Option<FilterExpression>) -> RunReportRequest {
        let default_dimension = job.default_dimension.as_str();

        let mut dimensions: Vec<String> = job
            .dimensions
            .to_vec()
            .into_iter()
            .filter(|d| d != default_dimension)
            .collect();
        dimensions.insert(0, default_dimension.to_string());

        RunReportRequest {
            property: property_path(&self.property_id),
            dimensions: dimensions.into_iter().map(Dimension::new).collect(),
            metrics: job.metrics.to_vec().into_iter().map(Metric::new).collect(),
            date_ranges: calculate_date_range(default_dimension, job.start, self.today),
            dimension_filter: filter,
            order_bys: vec![OrderBy::dimension(default_dimension)],
            limit: None,
            offset: None,
            cohort_spec: None,
        }
    }
}
