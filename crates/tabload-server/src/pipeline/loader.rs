//! Load orchestration
//!
//! Drives one warehouse bulk-load attempt end to end: dataset re-check,
//! best-effort truncate pre-cleanup, job submission, bounded polling, and
//! outcome classification. The outer [`RetryPolicy`](super::retry::RetryPolicy)
//! re-runs this whole sequence for transient failures; nothing in here
//! retries itself.

use std::time::Duration;
use tabload_common::{PipelineError, Result};
use tokio::time::Instant;
use tracing::{error, info, warn};

use super::classify::classify_load_failure;
use super::descriptor::IngestionPlan;
use crate::warehouse::{JobState, LoadOutcome, LoadSpec, Warehouse, WriteMode};

/// Delay between job status polls.
const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Malformed rows tolerated before the warehouse aborts the job. Kept small:
/// a file with more than a handful of bad rows is a bad file.
const MAX_BAD_RECORDS: u32 = 10;

/// Run one load attempt against the warehouse.
///
/// The dataset is re-verified even though earlier validation saw the
/// descriptor: the warehouse may have changed between then and now. On local
/// timeout the remote job is asked to cancel, but cancellation is not
/// awaited; the error says so.
pub async fn load(
    warehouse: &dyn Warehouse,
    plan: &IngestionPlan,
    timeout: Duration,
) -> Result<LoadOutcome> {
    let table = format!("{}.{}", plan.dataset, plan.table);

    if !warehouse.dataset_exists(&plan.dataset).await? {
        return Err(PipelineError::ConfigValidation(format!(
            "dataset {} does not exist",
            plan.dataset
        )));
    }

    if plan.write_mode == WriteMode::Truncate {
        // Dropping the old table avoids schema-merge surprises when the new
        // file's inferred schema differs. The truncate disposition makes
        // this an optimization, so a failure here is not fatal.
        if let Err(e) = warehouse.delete_table(&plan.dataset, &plan.table).await {
            warn!(table = %table, error = %e, "Pre-load table drop failed, continuing");
        }
    }

    let spec = LoadSpec {
        source_uri: plan.source_uri.clone(),
        dataset: plan.dataset.clone(),
        table: plan.table.clone(),
        skip_leading_rows: if plan.has_header { 1 } else { 0 },
        write_mode: plan.write_mode,
        max_bad_records: MAX_BAD_RECORDS,
        allow_quoted_newlines: true,
        allow_jagged_rows: false,
        ignore_unknown_values: false,
        autodetect_schema: true,
    };

    let job_id = warehouse.start_load(&spec).await?;
    info!(job_id = %job_id, table = %table, source = %plan.source_uri, "Load job submitted");

    let deadline = Instant::now() + timeout;

    let snapshot = loop {
        let snapshot = warehouse.job_status(&job_id).await?;

        if snapshot.state == JobState::Done {
            break snapshot;
        }

        if Instant::now() >= deadline {
            warn!(job_id = %job_id, "Load job exceeded {}s deadline, requesting cancellation", timeout.as_secs());
            if let Err(e) = warehouse.cancel_job(&job_id).await {
                warn!(job_id = %job_id, error = %e, "Cancellation request failed");
            }
            return Err(PipelineError::load_timed_out(format!(
                "load job {} did not complete within {}s; cancellation requested, remote state indeterminate",
                job_id,
                timeout.as_secs()
            )));
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        tokio::time::sleep(POLL_INTERVAL.min(remaining)).await;
    };

    if let Some(message) = snapshot.error_message {
        error!(job_id = %job_id, table = %table, error = %message, "Load job failed");
        return Err(classify_load_failure(&message));
    }

    if snapshot.bad_records > 0 {
        warn!(
            job_id = %job_id,
            bad_records = snapshot.bad_records,
            "Load completed with skipped malformed rows"
        );
    }

    info!(
        job_id = %job_id,
        table = %table,
        rows_loaded = snapshot.rows_loaded,
        "Load job completed"
    );

    Ok(LoadOutcome {
        state: JobState::Done,
        rows_loaded: snapshot.rows_loaded,
        bad_records: snapshot.bad_records,
        job_id,
        error_message: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warehouse::JobSnapshot;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct FakeWarehouse {
        dataset_present: bool,
        snapshots: Mutex<VecDeque<JobSnapshot>>,
        dropped_tables: Mutex<Vec<String>>,
        cancelled: Mutex<Vec<String>>,
        submitted: Mutex<Vec<LoadSpec>>,
    }

    impl FakeWarehouse {
        fn new(dataset_present: bool, snapshots: Vec<JobSnapshot>) -> Self {
            Self {
                dataset_present,
                snapshots: Mutex::new(snapshots.into()),
                dropped_tables: Mutex::new(Vec::new()),
                cancelled: Mutex::new(Vec::new()),
                submitted: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Warehouse for FakeWarehouse {
        async fn dataset_exists(&self, _dataset: &str) -> Result<bool> {
            Ok(self.dataset_present)
        }

        async fn delete_table(&self, dataset: &str, table: &str) -> Result<()> {
            self.dropped_tables
                .lock()
                .unwrap()
                .push(format!("{}.{}", dataset, table));
            Ok(())
        }

        async fn start_load(&self, spec: &LoadSpec) -> Result<String> {
            self.submitted.lock().unwrap().push(spec.clone());
            Ok("job-1".to_string())
        }

        async fn job_status(&self, _job_id: &str) -> Result<JobSnapshot> {
            let mut snapshots = self.snapshots.lock().unwrap();
            Ok(snapshots.pop_front().unwrap_or(JobSnapshot {
                state: JobState::Running,
                error_message: None,
                rows_loaded: 0,
                bad_records: 0,
            }))
        }

        async fn cancel_job(&self, job_id: &str) -> Result<()> {
            self.cancelled.lock().unwrap().push(job_id.to_string());
            Ok(())
        }
    }

    fn plan() -> IngestionPlan {
        IngestionPlan {
            config_bucket: "cfg-bkt".to_string(),
            config_key: "in/sales_config.json".to_string(),
            data_bucket: "bkt".to_string(),
            data_key: "in/sales.csv".to_string(),
            source_uri: "gs://bkt/in/sales.csv".to_string(),
            dataset: "analytics".to_string(),
            table: "sales".to_string(),
            write_mode: WriteMode::Truncate,
            has_header: true,
            notify_email: Some("a@b.com".to_string()),
        }
    }

    fn done(rows: u64, bad: u64) -> JobSnapshot {
        JobSnapshot {
            state: JobState::Done,
            error_message: None,
            rows_loaded: rows,
            bad_records: bad,
        }
    }

    fn running() -> JobSnapshot {
        JobSnapshot {
            state: JobState::Running,
            error_message: None,
            rows_loaded: 0,
            bad_records: 0,
        }
    }

    #[tokio::test]
    async fn test_successful_load_reports_rows() {
        let warehouse = FakeWarehouse::new(true, vec![done(1500, 2)]);
        let outcome = load(&warehouse, &plan(), Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(outcome.state, JobState::Done);
        assert_eq!(outcome.rows_loaded, 1500);
        assert_eq!(outcome.bad_records, 2);
        assert_eq!(outcome.job_id, "job-1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_until_done() {
        let warehouse = FakeWarehouse::new(true, vec![running(), running(), done(10, 0)]);
        let outcome = load(&warehouse, &plan(), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(outcome.rows_loaded, 10);
    }

    #[tokio::test]
    async fn test_missing_dataset_fails_before_submission() {
        let warehouse = FakeWarehouse::new(false, vec![]);
        let err = load(&warehouse, &plan(), Duration::from_secs(60))
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::ConfigValidation(_)));
        assert!(warehouse.submitted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_truncate_drops_existing_table_first() {
        let warehouse = FakeWarehouse::new(true, vec![done(1, 0)]);
        load(&warehouse, &plan(), Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(
            warehouse.dropped_tables.lock().unwrap().as_slice(),
            ["analytics.sales"]
        );
        let submitted = warehouse.submitted.lock().unwrap();
        assert_eq!(submitted[0].write_mode, WriteMode::Truncate);
        assert_eq!(submitted[0].skip_leading_rows, 1);
    }

    #[tokio::test]
    async fn test_append_mode_leaves_table_alone() {
        let warehouse = FakeWarehouse::new(true, vec![done(1, 0)]);
        let plan = IngestionPlan {
            write_mode: WriteMode::Append,
            ..plan()
        };
        load(&warehouse, &plan, Duration::from_secs(60)).await.unwrap();

        assert!(warehouse.dropped_tables.lock().unwrap().is_empty());
        assert_eq!(
            warehouse.submitted.lock().unwrap()[0].write_mode,
            WriteMode::Append
        );
    }

    #[tokio::test]
    async fn test_remote_failure_is_classified() {
        let failed = JobSnapshot {
            state: JobState::Done,
            error_message: Some("Provided Schema does not match Table".to_string()),
            rows_loaded: 0,
            bad_records: 0,
        };
        let warehouse = FakeWarehouse::new(true, vec![failed]);
        let err = load(&warehouse, &plan(), Duration::from_secs(60))
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::InvalidCsv(_)));
    }

    #[tokio::test]
    async fn test_timeout_requests_cancellation() {
        let warehouse = FakeWarehouse::new(true, vec![running()]);
        let err = load(&warehouse, &plan(), Duration::ZERO).await.unwrap_err();

        assert!(matches!(err, PipelineError::DataLoad { timed_out: true, .. }));
        assert_eq!(warehouse.cancelled.lock().unwrap().as_slice(), ["job-1"]);
    }
}
