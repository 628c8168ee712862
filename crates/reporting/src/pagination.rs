//! Paginated report fetching.
//!
//! Pages are requested with `(limit, offset)` until a short page signals the
//! end of the data or the offset reaches the row limit. The limit is checked
//! between pages, so a run can return up to `page_size - 1` rows more than
//! `row_limit`; it is a stopping rule, not a hard cap.

use crate::client::ReportingApi;
use crate::request::RunReportRequest;
use crate::table::{ReportRow, ReportTable};
use insight_core::InsightResult;
use std::sync::Arc;
use tracing::{debug, info};

pub const DEFAULT_ROW_LIMIT: usize = 100_000;
pub const DEFAULT_PAGE_SIZE: usize = 1_000;

pub struct PaginatedFetcher {
    api: Arc<dyn ReportingApi>,
    row_limit: usize,
    page_size: usize,
}

impl PaginatedFetcher {
    pub fn new(api: Arc<dyn ReportingApi>) -> Self {
        Self {
            api,
            row_limit: DEFAULT_ROW_LIMIT,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_limits(mut self, row_limit: usize, page_size: usize) -> Self {
        self.row_limit = row_limit;
        self.page_size = page_size.max(1);
        self
    }

    /// Fetch every page of `request`. API errors propagate unchanged; there
    /// is no retry.
    pub async fn fetch(&self, mut request: RunReportRequest) -> InsightResult<ReportTable> {
        let mut table = ReportTable::default();
        let mut offset = 0usize;
        let mut pages = 0u32;

        while offset < self.row_limit {
            request.limit = Some(self.page_size as u64);
            request.offset = Some(offset as u64);

            let response = self.api.run_report(&request).await?;
            pages += 1;
            metrics::counter!("extract.pages_fetched").increment(1);

            if table.columns.is_empty() {
                table.columns = ReportTable::columns_of(&response);
            }
            for row in &response.rows {
                table.rows.push(ReportRow::from_response_row(&response, row)?);
            }

            let page_rows = response.rows.len();
            metrics::counter!("extract.rows_fetched").increment(page_rows as u64);
            debug!(offset, page_rows, total = table.rows.len(), "Fetched report page");

            offset += self.page_size;
            if page_rows < self.page_size {
                break;
            }
        }

        info!(
            property = %request.property,
            pages,
            rows = table.rows.len(),
            "Report fetch complete"
        );
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{Row, RunReportResponse};
    use crate::request::{Dimension, Metric};
    use async_trait::async_trait;
    use insight_core::InsightError;
    use std::sync::Mutex;

    /// Serves `total` synthetic rows (or unlimited when `None`) and records
    /// every `(limit, offset)` it is asked for.
    struct FakeSource {
        total: Option<usize>,
        calls: Mutex<Vec<(u64, u64)>>,
        fail_on_call: Option<usize>,
    }

    impl FakeSource {
        fn new(total: Option<usize>) -> Arc<Self> {
            Arc::new(Self {
                total,
                calls: Mutex::new(Vec::new()),
                fail_on_call: None,
            })
        }

        fn calls(&self) -> Vec<(u64, u64)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ReportingApi for FakeSource {
        async fn run_report(
            &self,
            request: &RunReportRequest,
        ) -> InsightResult<RunReportResponse> {
            let limit = request.limit.unwrap_or(0);
            let offset = request.offset.unwrap_or(0);
            let call_no = {
                let mut calls = self.calls.lock().unwrap();
                calls.push((limit, offset));
                calls.len()
            };
            if self.fail_on_call == Some(call_no) {
                return Err(InsightError::Api {
                    status: 503,
                    message: "backend unavailable".into(),
                });
            }

            let end = match self.total {
                Some(total) => (offset + limit).min(total as u64),
                None => offset + limit,
            };
            let rows = (offset..end.max(offset))
                .map(|i| Row::new(["20240101".to_string()], [i.to_string()]))
                .collect();
            Ok(RunReportResponse::for_request(request, rows))
        }
    }

    fn request() -> RunReportRequest {
        RunReportRequest {
            property: "properties/1".into(),
            dimensions: vec![Dimension::new("date")],
            metrics: vec![Metric::new("activeUsers")],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_stops_on_short_final_page() {
        // 3 full pages of 10, then a page of 9.
        let source = FakeSource::new(Some(3 * 10 + 9));
        let fetcher = PaginatedFetcher::new(source.clone()).with_limits(100_000, 10);

        let table = fetcher.fetch(request()).await.unwrap();

        assert_eq!(table.len(), 39);
        assert_eq!(source.calls(), vec![(10, 0), (10, 10), (10, 20), (10, 30)]);
        assert_eq!(table.columns, vec!["date", "activeUsers"]);
    }

    #[tokio::test]
    async fn test_exact_multiple_needs_one_empty_page() {
        let source = FakeSource::new(Some(20));
        let fetcher = PaginatedFetcher::new(source.clone()).with_limits(100_000, 10);

        let table = fetcher.fetch(request()).await.unwrap();

        assert_eq!(table.len(), 20);
        assert_eq!(source.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_row_limit_smaller_than_page_overshoots() {
        let source = FakeSource::new(None);
        let fetcher = PaginatedFetcher::new(source.clone()).with_limits(50, 100);

        let table = fetcher.fetch(request()).await.unwrap();

        // One full page is kept even though it exceeds the limit.
        assert_eq!(table.len(), 100);
        assert_eq!(source.calls(), vec![(100, 0)]);
    }

    #[tokio::test]
    async fn test_row_limit_overshoot_is_bounded() {
        let source = FakeSource::new(None);
        let fetcher = PaginatedFetcher::new(source.clone()).with_limits(25, 10);

        let table = fetcher.fetch(request()).await.unwrap();

        assert_eq!(table.len(), 30);
        assert!(table.len() < 25 + 10);
        assert_eq!(source.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_zero_row_limit_issues_no_request() {
        let source = FakeSource::new(None);
        let fetcher = PaginatedFetcher::new(source.clone()).with_limits(0, 10);

        let table = fetcher.fetch(request()).await.unwrap();

        assert!(table.is_empty());
        assert!(source.calls().is_empty());
    }

    #[tokio::test]
    async fn test_api_error_propagates() {
        let source = Arc::new(FakeSource {
            total: None,
            calls: Mutex::new(Vec::new()),
            fail_on_call: Some(2),
        });
        let fetcher = PaginatedFetcher::new(source.clone()).with_limits(100, 10);

        let err = fetcher.fetch(request()).await.unwrap_err();

        assert!(matches!(err, InsightError::Api { status: 503, .. }));
        assert_eq!(source.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_dates_normalized_in_output() {
        let source = FakeSource::new(Some(1));
        let fetcher = PaginatedFetcher::new(source).with_limits(10, 10);

        let table = fetcher.fetch(request()).await.unwrap();

        assert_eq!(table.rows[0].get("date").and_then(|c| c.as_str()), Some("2024-01-01"));
    }
}
