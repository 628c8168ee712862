//! Analytics report extraction: dimension filters, date windows, report
//! requests, paginated fetching into tables, and cohort retention.

pub mod client;
pub mod date_range;
pub mod filter;
pub mod pagination;
pub mod request;
pub mod retention;
pub mod table;

pub use client::{Ga4Client, ReportingApi, Row, RunReportResponse};
pub use date_range::{calculate_date_range, DateRange};
pub use filter::{build_dimension_filter, FilterExpression};
pub use pagination::PaginatedFetcher;
pub use request::{ReportRequestBuilder, RunReportRequest};
pub use retention::{
    RetentionAnalyzer, RetentionGranularity, RetentionQuery, RetentionResult, RetentionTable,
};
pub use table::{CellValue, ReportRow, ReportTable};
