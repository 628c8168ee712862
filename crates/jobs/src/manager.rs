//! Runs independent extraction jobs on a bounded worker pool and collects
//! one outcome per job.

use crate::job::{ExtractionJob, FetchLimits};
use insight_core::config::AppConfig;
use insight_core::JobConfig;
use insight_reporting::{ReportRequestBuilder, ReportTable, ReportingApi};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum JobOutcome {
    Succeeded { table: ReportTable },
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub index: usize,
    pub name: String,
    pub elapsed_ms: u64,
    pub outcome: JobOutcome,
}

impl JobReport {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, JobOutcome::Succeeded { .. })
    }

    pub fn table(&self) -> Option<&ReportTable> {
        match &self.outcome {
            JobOutcome::Succeeded { table } => Some(table),
            JobOutcome::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            JobOutcome::Succeeded { .. } => None,
            JobOutcome::Failed { error } => Some(error),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub succeeded: usize,
    pub failed: usize,
}

impl RunSummary {
    pub fn all_ok(&self) -> bool {
        self.failed == 0
    }
}

pub fn summarize(reports: &[JobReport]) -> RunSummary {
    reports.iter().fold(RunSummary::default(), |mut acc, r| {
        if r.is_success() {
            acc.succeeded += 1;
        } else {
            acc.failed += 1;
        }
        acc
    })
}

/// Dispatches jobs with at most `max_workers` running at once. Jobs share
/// nothing but the (stateless) API client.
pub struct JobManager {
    max_workers: usize,
    requests: ReportRequestBuilder,
    limits: FetchLimits,
}

impl JobManager {
    pub fn new(property_id: impl Into<String>, max_workers: usize) -> Self {
        Self {
            max_workers: max_workers.max(1),
            requests: ReportRequestBuilder::new(property_id),
            limits: FetchLimits::default(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.ga4.property_id.clone(), config.pipeline.max_workers).with_limits(
            FetchLimits {
                row_limit: config.ga4.row_limit,
                page_size: config.ga4.page_size,
            },
        )
    }

    pub fn with_limits(mut self, limits: FetchLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Run every job and wait for all of them. Failures (API errors or
    /// panics) are confined to their own report; reports come back in job
    /// order regardless of completion order.
    pub async fn run(&self, jobs: Vec<JobConfig>, api: Arc<dyn ReportingApi>) -> Vec<JobReport> {
        let run_id = Uuid::new_v4();
        let semaphore = Arc::new(Semaphore::new(self.max_workers));
        let mut handles: Vec<(usize, String, JoinHandle<JobReport>)> = Vec::new();

        info!(
            run_id = %run_id,
            jobs = jobs.len(),
            workers = self.max_workers,
            "Dispatching extraction jobs"
        );

        for (index, config) in jobs.into_iter().enumerate() {
            let job = ExtractionJob::new(index, config, self.requests.clone(), self.limits);
            let name = job.name();
            let api = api.clone();
            let semaphore = semaphore.clone();

            let handle = tokio::spawn(async move {
                let name = job.name();
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => {
                        return JobReport {
                            index: job.index,
                            name,
                            elapsed_ms: 0,
                            outcome: JobOutcome::Failed {
                                error: format!("worker pool closed: {e}"),
                            },
                        }
                    }
                };

                let started = Instant::now();
                let outcome = match job.run(api).await {
                    Ok(table) => JobOutcome::Succeeded { table },
                    Err(e) => JobOutcome::Failed {
                        error: e.to_string(),
                    },
                };

                JobReport {
                    index: job.index,
                    name,
                    elapsed_ms: started.elapsed().as_millis() as u64,
                    outcome,
                }
            });

            handles.push((index, name, handle));
        }

        let mut reports = Vec::with_capacity(handles.len());
        for (index, name, handle) in handles {
            let report = match handle.await {
                Ok(report) => report,
                Err(e) => {
                    error!(run_id = %run_id, job = %name, error = %e, "Job task panicked");
                    JobReport {
                        index,
                        name,
                        elapsed_ms: 0,
                        outcome: JobOutcome::Failed {
                            error: format!("job task panicked: {e}"),
                        },
                    }
                }
            };

            match &report.outcome {
                JobOutcome::Succeeded { table } => {
                    metrics::counter!("jobs.succeeded").increment(1);
                    info!(
                        run_id = %run_id,
                        job = %report.name,
                        rows = table.len(),
                        elapsed_ms = report.elapsed_ms,
                        "Job completed"
                    );
                }
                JobOutcome::Failed { error } => {
                    metrics::counter!("jobs.failed").increment(1);
                    warn!(run_id = %run_id, job = %report.name, error = %error, "Job failed");
                }
            }
            reports.push(report);
        }

        let summary = summarize(&reports);
        info!(
            run_id = %run_id,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "All jobs finished"
        );
        reports
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(ok: bool) -> JobReport {
        JobReport {
            index: 0,
            name: "job".into(),
            elapsed_ms: 1,
            outcome: if ok {
                JobOutcome::Succeeded {
                    table: ReportTable::default(),
                }
            } else {
                JobOutcome::Failed {
                    error: "boom".into(),
                }
            },
        }
    }

    #[test]
    fn test_summarize() {
        let summary = summarize(&[report(true), report(false), report(true)]);
        assert_eq!(
            summary,
            RunSummary {
                succeeded: 2,
                failed: 1
            }
        );
        assert!(!summary.all_ok());
        assert!(summarize(&[]).all_ok());
    }

    #[test]
    fn test_report_accessors() {
        assert!(report(true).table().is_some());
        assert_eq!(report(false).error(), Some("boom"));
    }

    #[test]
    fn test_zero_workers_clamped() {
        assert_eq!(JobManager::new("1", 0).max_workers(), 1);
    }

    #[test]
    fn test_from_config() {
        let mut config = AppConfig::default();
        config.ga4.property_id = "42".into();
        config.pipeline.max_workers = 3;
        assert_eq!(JobManager::from_config(&config).max_workers(), 3);
    }
}
