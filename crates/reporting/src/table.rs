//! Flat tabular output of a report.

use crate::client::{RunReportResponse, Row};
use insight_core::{InsightError, InsightResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Number(f64),
    Text(String),
}

impl CellValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) => Some(s),
            CellValue::Number(_) => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            CellValue::Text(_) => None,
        }
    }
}

/// Column name → value. Dimensions are text, metrics are numbers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReportRow {
    pub cells: BTreeMap<String, CellValue>,
}

impl ReportRow {
    pub fn get(&self, column: &str) -> Option<&CellValue> {
        self.cells.get(column)
    }

    /// Flatten one API row against the response headers.
    pub fn from_response_row(response: &RunReportResponse, row: &Row) -> InsightResult<Self> {
        let mut cells = BTreeMap::new();

        for (header, value) in response.dimension_headers.iter().zip(&row.dimension_values) {
            let text = if header.name == "date" {
                normalize_compact_date(&value.value)
            } else {
                value.value.clone()
            };
            cells.insert(header.name.clone(), CellValue::Text(text));
        }

        for (header, value) in response.metric_headers.iter().zip(&row.metric_values) {
            let number: f64 = value.value.parse().map_err(|_| {
                InsightError::Parse(format!(
                    "metric {} has non-numeric value {:?}",
                    header.name, value.value
                ))
            })?;
            cells.insert(header.name.clone(), CellValue::Number(number));
        }

        Ok(Self { cells })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportTable {
    pub columns: Vec<String>,
    pub rows: Vec<ReportRow>,
}

impl ReportTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Dimension headers then metric headers, in response order.
    pub fn columns_of(response: &RunReportResponse) -> Vec<String> {
        response
            .dimension_headers
            .iter()
            .map(|h| h.name.clone())
            .chain(response.metric_headers.iter().map(|h| h.name.clone()))
            .collect()
    }
}

/// `20240827` → `2024-08-27`. Anything that is not eight ASCII digits is
/// returned unchanged.
pub fn normalize_compact_date(raw: &str) -> String {
    if raw.len() == 8 && raw.bytes().all(|b| b.is_ascii_digit()) {
        format!("{}-{}-{}", &raw[..4], &raw[4..6], &raw[6..])
    } else {
        raw.to_string()
    }
}
