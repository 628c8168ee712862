//! Dimension filter expressions: the boolean tree the reporting API
//! evaluates server-side, and the builder that derives it from a job's
//! `filters` block.

use insight_core::{FilterConfig, MatchType, ValuesMode};
use serde::{Deserialize, Serialize};
use tracing::warn;

// ─── Types ──────────────────────────────────────────────────────────────────

/// A filter tree. Serializes to the API's externally tagged shape, e.g.
/// `{"andGroup": {"expressions": [...]}}` or `{"notExpression": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterExpression {
    AndGroup(FilterExpressionList),
    OrGroup(FilterExpressionList),
    NotExpression(Box<FilterExpression>),
    Filter(Filter),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterExpressionList {
    pub expressions: Vec<FilterExpression>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Filter {
    pub field_name: String,
    pub string_filter: StringFilter,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StringFilter {
    pub match_type: MatchType,
    pub value: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub case_sensitive: bool,
}

impl FilterExpression {
    pub fn leaf(field: &str, value: &str, match_type: MatchType) -> Self {
        FilterExpression::Filter(Filter {
            field_name: field.to_string(),
            string_filter: StringFilter {
                match_type,
                value: value.to_string(),
                case_sensitive: false,
            },
        })
    }

    pub fn or(expressions: Vec<FilterExpression>) -> Self {
        FilterExpression::OrGroup(FilterExpressionList { expressions })
    }

    pub fn and(expressions: Vec<FilterExpression>) -> Self {
        FilterExpression::AndGroup(FilterExpressionList { expressions })
    }

    pub fn not(inner: FilterExpression) -> Self {
        FilterExpression::NotExpression(Box::new(inner))
    }

    /// Field names referenced anywhere in the tree, in depth-first order.
    pub fn fields(&self) -> Vec<&str> {
        match self {
            FilterExpression::Filter(f) => vec![f.field_name.as_str()],
            FilterExpression::NotExpression(inner) => inner.fields(),
            FilterExpression::AndGroup(list) | FilterExpression::OrGroup(list) => {
                list.expressions.iter().flat_map(|e| e.fields()).collect()
            }
        }
    }
}

// ─── Builder ────────────────────────────────────────────────────────────────

/// Build the dimension filter for one job.
///
/// field1 becomes an OR over its value(s), or a negated leaf when `exclude1`
/// is set. When field2 is present with at least one value, it becomes an OR
/// over every value (negated as a whole when `exclude2` is set) and both
/// halves are combined under AND. A field2 without values is ignored.
///
/// Returns `None` only when field1 has no value at all.
pub fn build_dimension_filter(config: &FilterConfig) -> Option<FilterExpression> {
    let first = field1_expression(config)?;

    let values2 = config
        .values2
        .as_ref()
        .map(|v| v.to_vec())
        .unwrap_or_default();

    let field2 = match config.field2.as_deref() {
        Some(field) if !field.is_empty() && !values2.is_empty() => field,
        _ => return Some(first),
    };

    let leaves = values2
        .iter()
        .map(|v| FilterExpression::leaf(field2, v, config.match_type2))
        .collect();
    let any_of = FilterExpression::or(leaves);
    let second = if config.exclude2 {
        FilterExpression::not(any_of)
    } else {
        any_of
    };

    Some(FilterExpression::and(vec![first, second]))
}

fn field1_expression(config: &FilterConfig) -> Option<FilterExpression> {
    let values = config.values1.to_vec();
    let field = config.field1.as_str();

    match config.values1_mode {
        ValuesMode::Scalar => {
            let value = values.first()?;
            if values.len() > 1 {
                warn!(
                    field,
                    dropped = values.len() - 1,
                    "values1 is scalar; extra values ignored (set values1_mode = \"expand\")"
                );
            }
            let leaf = FilterExpression::leaf(field, value, config.match_type1);
            Some(if config.exclude1 {
                FilterExpression::not(leaf)
            } else {
                FilterExpression::or(vec![leaf])
            })
        }
        ValuesMode::Expand => {
            if values.is_empty() {
                return None;
            }
            let any_of = FilterExpression::or(
                values
                    .iter()
                    .map(|v| FilterExpression::leaf(field, v, config.match_type1))
                    .collect(),
            );
            Some(if config.exclude1 {
                FilterExpression::not(any_of)
            } else {
                any_of
            })
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
