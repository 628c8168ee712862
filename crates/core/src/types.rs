//! Job descriptors: the tagged records that drive one extraction job each.

use crate::error::{InsightError, InsightResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A scalar string or a list of strings. Config files use both shapes for
/// dimensions, metrics and filter values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::One(v) => vec![v],
            OneOrMany::Many(vs) => vs,
        }
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.clone().into_vec()
    }
}

impl Default for OneOrMany {
    fn default() -> Self {
        OneOrMany::Many(Vec::new())
    }
}

impl From<&str> for OneOrMany {
    fn from(v: &str) -> Self {
        OneOrMany::One(v.to_string())
    }
}

impl From<Vec<&str>> for OneOrMany {
    fn from(vs: Vec<&str>) -> Self {
        OneOrMany::Many(vs.into_iter().map(String::from).collect())
    }
}

/// String match semantics, evaluated by the reporting API.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchType {
    #[default]
    Exact,
    BeginsWith,
    EndsWith,
    Contains,
    FullRegexp,
    PartialRegexp,
}

/// How `values1` is turned into filter leaves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValuesMode {
    /// A single matched value; extra values are dropped.
    #[default]
    Scalar,
    /// One leaf per value, OR-ed together (same as `values2`).
    Expand,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterConfig {
    pub field1: String,
    pub values1: OneOrMany,
    #[serde(default)]
    pub field2: Option<String>,
    #[serde(default)]
    pub values2: Option<OneOrMany>,
    #[serde(default)]
    pub match_type1: MatchType,
    #[serde(default)]
    pub match_type2: MatchType,
    #[serde(default)]
    pub exclude1: bool,
    #[serde(default)]
    pub exclude2: bool,
    #[serde(default)]
    pub values1_mode: ValuesMode,
}

fn default_dimension() -> String {
    "date".to_string()
}

/// One extraction job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobConfig {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub dimensions: OneOrMany,
    #[serde(default)]
    pub metrics: OneOrMany,
    #[serde(default)]
    pub filters: Option<FilterConfig>,
    #[serde(default = "default_dimension")]
    pub default_dimension: String,
    /// Lookback window in days. Injected from the file's `default_start`.
    #[serde(default)]
    pub start: i64,
}

impl JobConfig {
    /// Human-readable label used in logs and job reports.
    pub fn label(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => self.dimensions.to_vec().join("_"),
        }
    }
}

/// On-disk job file: a shared lookback plus the ordered job list.
#[derive(Debug, Clone, Deserialize)]
pub struct JobFile {
    pub default_start: i64,
    pub data_configs: Vec<JobConfig>,
}

impl JobFile {
    pub fn parse(json: &str) -> InsightResult<Vec<JobConfig>> {
        let file: JobFile = serde_json::from_str(json)?;
        Ok(file.into_jobs())
    }

    pub fn load(path: &Path) -> InsightResult<Vec<JobConfig>> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            InsightError::Config(format!("cannot read job file {}: {e}", path.display()))
        })?;
        Self::parse(&json)
    }

    /// Apply `default_start` uniformly to every job.
    pub fn into_jobs(self) -> Vec<JobConfig> {
        let start = self.default_start;
        self.data_configs
            .into_iter()
            .map(|mut job| {
                job.start = start;
                job
            })
            .collect()
    }
}
