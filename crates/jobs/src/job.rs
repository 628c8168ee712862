//! A single extraction job: filter, request, paginated fetch.

use insight_core::{InsightResult, JobConfig};
use insight_reporting::{
    build_dimension_filter, PaginatedFetcher, ReportRequestBuilder, ReportTable, ReportingApi,
};
use std::sync::Arc;
use tracing::info;

/// Limits applied to every job's paginated fetch.
#[derive(Debug, Clone, Copy)]
pub struct FetchLimits {
    pub row_limit: usize,
    pub page_size: usize,
}

impl Default for FetchLimits {
    fn default() -> Self {
        Self {
            row_limit: insight_reporting::pagination::DEFAULT_ROW_LIMIT,
            page_size: insight_reporting::pagination::DEFAULT_PAGE_SIZE,
        }
    }
}

pub struct ExtractionJob {
    pub index: usize,
    pub config: JobConfig,
    requests: ReportRequestBuilder,
    limits: FetchLimits,
}

impl ExtractionJob {
    pub fn new(
        index: usize,
        config: JobConfig,
        requests: ReportRequestBuilder,
        limits: FetchLimits,
    ) -> Self {
        Self {
            index,
            config,
            requests,
            limits,
        }
    }

    pub fn name(&self) -> String {
        self.config.label()
    }

    /// Build the request and fetch every page. Errors are returned as-is.
    pub async fn run(&self, api: Arc<dyn ReportingApi>) -> InsightResult<ReportTable> {
        info!(job = %self.name(), index = self.index, "Processing extraction job");

        let filter = self.config.filters.as_ref().and_then(build_dimension_filter);
        let request = self.requests.build(&self.config, filter);

        PaginatedFetcher::new(api)
            .with_limits(self.limits.row_limit, self.limits.page_size)
            .fetch(request)
            .await
    }
}
