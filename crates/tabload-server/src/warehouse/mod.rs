//! Warehouse port and load-job types
//!
//! The warehouse ingests an object-store URI into a table through an
//! asynchronous bulk-load job that can be polled and cancelled. The pipeline
//! core only sees this port; the REST adapter lives in [`rest`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tabload_common::Result;

pub mod rest;

/// Terminal and intermediate states of a load job, as observed locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Pending,
    Running,
    Done,
    Failed,
    TimedOut,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Done | JobState::Failed | JobState::TimedOut)
    }
}

/// Whether a load replaces all existing table rows or adds to them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteMode {
    Truncate,
    Append,
}

/// A bulk-load job request for delimited text data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadSpec {
    /// Object-store URI of the source file
    pub source_uri: String,
    pub dataset: String,
    pub table: String,
    /// Rows to skip at the start of the file (1 when a header row is present)
    pub skip_leading_rows: u32,
    pub write_mode: WriteMode,
    /// Malformed rows tolerated before the job aborts
    pub max_bad_records: u32,
    pub allow_quoted_newlines: bool,
    pub allow_jagged_rows: bool,
    pub ignore_unknown_values: bool,
    pub autodetect_schema: bool,
}

impl LoadSpec {
    /// Fully qualified destination table, `<dataset>.<table>`.
    pub fn qualified_table(&self) -> String {
        format!("{}.{}", self.dataset, self.table)
    }
}

/// One observation of a remote job, taken while polling.
#[derive(Debug, Clone)]
pub struct JobSnapshot {
    pub state: JobState,
    /// Present when the job reached a terminal state with an error payload
    pub error_message: Option<String>,
    pub rows_loaded: u64,
    pub bad_records: u64,
}

/// Final result of one load attempt.
#[derive(Debug, Clone)]
pub struct LoadOutcome {
    pub state: JobState,
    pub rows_loaded: u64,
    pub bad_records: u64,
    pub job_id: String,
    pub error_message: Option<String>,
}

/// Collaborator port for the tabular warehouse.
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Whether the dataset exists and is listable with current credentials.
    async fn dataset_exists(&self, dataset: &str) -> Result<bool>;

    /// Drop a table. Errors if the table does not exist.
    async fn delete_table(&self, dataset: &str, table: &str) -> Result<()>;

    /// Submit a bulk-load job; returns the remote job id.
    async fn start_load(&self, spec: &LoadSpec) -> Result<String>;

    /// Observe the current state of a job.
    async fn job_status(&self, job_id: &str) -> Result<JobSnapshot>;

    /// Request cancellation of a job. Completion is not awaited.
    async fn cancel_job(&self, job_id: &str) -> Result<()>;
}
