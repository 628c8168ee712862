pub mod job;
pub mod manager;

pub use job::{ExtractionJob, FetchLimits};
pub use manager::{summarize, JobManager, JobOutcome, JobReport, RunSummary};
