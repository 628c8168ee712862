//! Spreadsheet source. Reads worksheet ranges and shapes them into tables
//! keyed by a header row.

use insight_core::auth::{TokenProvider, DRIVE_READONLY_SCOPE, SPREADSHEETS_READONLY_SCOPE};
use insight_core::config::{Ga4Config, SheetsConfig};
use insight_core::{InsightError, InsightResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl SheetTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Build a table from raw cell values. Row `header_idx` (0-based) names
    /// the columns; every later row is data, right-padded with empty cells
    /// to the header width.
    pub fn from_values(values: Vec<Vec<String>>, header_idx: usize) -> Self {
        let mut iter = values.into_iter().skip(header_idx);
        let columns = match iter.next() {
            Some(header) => header,
            None => return Self::default(),
        };

        let width = columns.len();
        let rows = iter
            .map(|mut row| {
                if row.len() > width {
                    warn!(
                        width,
                        cells = row.len(),
                        "Row wider than header, extra cells dropped"
                    );
                    row.truncate(width);
                }
                row.resize(width, String::new());
                row
            })
            .collect();

        Self { columns, rows }
    }
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct Spreadsheet {
    #[serde(default)]
    sheets: Vec<Sheet>,
}

#[derive(Debug, Deserialize)]
struct Sheet {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
struct SheetProperties {
    title: String,
}

/// Quote a worksheet title for A1 notation: `Q1 'plan'` → `'Q1 ''plan'''`.
pub fn a1_range(sheet_name: &str, range: Option<&str>) -> String {
    let quoted = format!("'{}'", sheet_name.replace('\'', "''"));
    match range {
        Some(r) if !r.is_empty() => format!("{quoted}!{r}"),
        _ => quoted,
    }
}

pub struct SheetsClient {
    http: reqwest::Client,
    api_url: String,
    tokens: Arc<TokenProvider>,
}

impl SheetsClient {
    pub fn new(sheets: &SheetsConfig, credentials: &Ga4Config) -> InsightResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(credentials.timeout_secs))
            .build()
            .map_err(|e| InsightError::Config(format!("sheets HTTP client: {e}")))?;

        let tokens = TokenProvider::from_settings(
            credentials.access_token.as_deref(),
            credentials.credentials_path.as_deref(),
            &[SPREADSHEETS_READONLY_SCOPE, DRIVE_READONLY_SCOPE],
            http.clone(),
        )?;

        Ok(Self::with_tokens(http, &sheets.api_url, Arc::new(tokens)))
    }

    pub fn with_tokens(http: reqwest::Client, api_url: &str, tokens: Arc<TokenProvider>) -> Self {
        Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            tokens,
        }
    }

    fn url(&self, segments: &[&str]) -> InsightResult<reqwest::Url> {
        let mut url = reqwest::Url::parse(&self.api_url)
            .map_err(|e| InsightError::Config(format!("invalid sheets api_url: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| InsightError::Config("sheets api_url cannot be a base".into()))?
            .extend(segments);
        Ok(url)
    }

    pub fn values_url(&self, sheet_id: &str, range: &str) -> InsightResult<reqwest::Url> {
        self.url(&["spreadsheets", sheet_id, "values", range])
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: reqwest::Url) -> InsightResult<T> {
        let token = self.tokens.token().await?;
        debug!(url = %url, "Sheets request");

        let response = self.http.get(url).bearer_auth(token).send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(InsightError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response.json().await?)
    }

    async fn values(&self, sheet_id: &str, range: &str) -> InsightResult<Vec<Vec<String>>> {
        let body: ValueRange = self.get_json(self.values_url(sheet_id, range)?).await?;
        Ok(body.values)
    }

    /// Read one range; row `header_idx` of the range holds the column names.
    pub async fn fetch_range(
        &self,
        sheet_id: &str,
        sheet_name: &str,
        range: &str,
        header_idx: usize,
    ) -> InsightResult<SheetTable> {
        let values = self.values(sheet_id, &a1_range(sheet_name, Some(range))).await?;
        Ok(SheetTable::from_values(values, header_idx))
    }

    pub async fn sheet_titles(&self, sheet_id: &str) -> InsightResult<Vec<String>> {
        let mut url = self.url(&["spreadsheets", sheet_id])?;
        url.query_pairs_mut()
            .append_pair("fields", "sheets.properties.title");
        let body: Spreadsheet = self.get_json(url).await?;
        Ok(body.sheets.into_iter().map(|s| s.properties.title).collect())
    }

    /// Read every worksheet. `header_row` is the 1-based sheet row holding
    /// the column names.
    pub async fn fetch_all(
        &self,
        sheet_id: &str,
        header_row: usize,
    ) -> InsightResult<BTreeMap<String, SheetTable>> {
        let header_idx = header_row.saturating_sub(1);
        let mut tables = BTreeMap::new();

        for title in self.sheet_titles(sheet_id).await? {
            let values = self.values(sheet_id, &a1_range(&title, None)).await?;
            let table = SheetTable::from_values(values, header_idx);
            info!(sheet = %title, rows = table.len(), "Worksheet loaded");
            tables.insert(title, table);
        }

        Ok(tables)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(rows: &[&[&str]]) -> Vec<Vec<String>> {
        rows.iter()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    #[test]
    fn test_empty_values_give_empty_table() {
        assert_eq!(SheetTable::from_values(vec![], 0), SheetTable::default());
    }

    #[test]
    fn test_first_row_is_header() {
        let table = SheetTable::from_values(
            grid(&[&["date", "spend"], &["2024-01-01", "10"], &["2024-01-02", "12"]]),
            0,
        );
        assert_eq!(table.columns, vec!["date", "spend"]);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_header_below_title_rows_and_padding() {
        let table = SheetTable::from_values(
            grid(&[
                &["Marketing plan"],
                &[],
                &["channel", "budget", "owner"],
                &["search", "100"],
                &["social"],
            ]),
            2,
        );
        assert_eq!(table.columns, vec!["channel", "budget", "owner"]);
        assert_eq!(table.rows[0], vec!["search", "100", ""]);
        assert_eq!(table.rows[1], vec!["social", "", ""]);
    }

    #[test]
    fn test_wide_rows_truncated() {
        let table = SheetTable::from_values(grid(&[&["a"], &["1", "2"]]), 0);
        assert_eq!(table.rows[0], vec!["1"]);
    }

    #[test]
    fn test_header_beyond_data() {
        let table = SheetTable::from_values(grid(&[&["a"]]), 3);
        assert!(table.columns.is_empty());
        assert!(table.is_empty());
    }

    #[test]
    fn test_a1_range_quotes_titles() {
        assert_eq!(a1_range("Sheet1", Some("A1:C10")), "'Sheet1'!A1:C10");
        assert_eq!(a1_range("Q1 'plan'", None), "'Q1 ''plan'''");
    }

    #[test]
    fn test_values_url_escapes_range() {
        let client = SheetsClient::with_tokens(
            reqwest::Client::new(),
            "https://sheets.googleapis.com/v4/",
            Arc::new(TokenProvider::fixed("t")),
        );
        let url = client.values_url("abc", "'My Sheet'!A1:B2").unwrap();
        assert_eq!(
            url.as_str(),
            "https://sheets.googleapis.com/v4/spreadsheets/abc/values/'My%20Sheet'!A1:B2"
        );
    }
}
