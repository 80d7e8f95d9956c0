//! REST warehouse adapter
//!
//! Thin client for a BigQuery-style jobs API: datasets and tables are
//! resources under a project, loads are asynchronous jobs polled by id.
//! HTTP status codes are mapped into the pipeline taxonomy here; job-level
//! error payloads are passed through untouched for the classifier.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tabload_common::{PipelineError, Result};
use tracing::{debug, info};

use super::{JobSnapshot, JobState, LoadSpec, Warehouse, WriteMode};

/// Per-request timeout for warehouse API calls. Job polling applies its own
/// overall deadline on top of this.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Warehouse API connection settings.
#[derive(Debug, Clone)]
pub struct WarehouseConfig {
    pub base_url: String,
    pub project: String,
    pub token: String,
}

impl WarehouseConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            base_url: std::env::var("WAREHOUSE_BASE_URL")
                .unwrap_or_else(|_| "https://warehouse.googleapis.com/v2".to_string()),
            project: std::env::var("WAREHOUSE_PROJECT")
                .map_err(|_| anyhow::anyhow!("WAREHOUSE_PROJECT must be set"))?,
            token: std::env::var("WAREHOUSE_TOKEN")
                .map_err(|_| anyhow::anyhow!("WAREHOUSE_TOKEN must be set"))?,
        })
    }
}

/// REST-backed [`Warehouse`] implementation.
pub struct RestWarehouse {
    client: Client,
    config: WarehouseConfig,
}

#[derive(Debug, Deserialize)]
struct JobResponse {
    id: String,
    #[serde(default)]
    status: JobStatusPayload,
    #[serde(default)]
    statistics: JobStatisticsPayload,
}

#[derive(Debug, Default, Deserialize)]
struct JobStatusPayload {
    #[serde(default)]
    state: String,
    #[serde(rename = "errorResult")]
    error_result: Option<JobErrorPayload>,
}

#[derive(Debug, Deserialize)]
struct JobErrorPayload {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Default, Deserialize)]
struct JobStatisticsPayload {
    #[serde(rename = "outputRows", default)]
    output_rows: u64,
    #[serde(rename = "badRecords", default)]
    bad_records: u64,
}

impl RestWarehouse {
    pub fn new(config: WarehouseConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent("tabload/0.1")
            .build()
            .map_err(|e| PipelineError::Unexpected(format!("http client build failed: {}", e)))?;

        info!("Warehouse client initialized for project {}", config.project);

        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/projects/{}/{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.project,
            path
        )
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        request
            .bearer_auth(&self.config.token)
            .send()
            .await
            .map_err(|e| PipelineError::Network(format!("warehouse request failed: {}", e)))
    }
}

#[async_trait]
impl Warehouse for RestWarehouse {
    async fn dataset_exists(&self, dataset: &str) -> Result<bool> {
        let url = self.url(&format!("datasets/{}", dataset));
        let response = self.send(self.client.get(&url)).await?;

        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(map_status(status, &body_text(response).await, dataset)),
        }
    }

    async fn delete_table(&self, dataset: &str, table: &str) -> Result<()> {
        let url = self.url(&format!("datasets/{}/tables/{}", dataset, table));
        let response = self.send(self.client.delete(&url)).await?;

        match response.status() {
            StatusCode::OK | StatusCode::NO_CONTENT => {
                debug!("Dropped table {}.{}", dataset, table);
                Ok(())
            },
            status => Err(map_status(
                status,
                &body_text(response).await,
                &format!("{}.{}", dataset, table),
            )),
        }
    }

    async fn start_load(&self, spec: &LoadSpec) -> Result<String> {
        let write_disposition = match spec.write_mode {
            WriteMode::Truncate => "WRITE_TRUNCATE",
            WriteMode::Append => "WRITE_APPEND",
        };

        let body = json!({
            "configuration": {
                "load": {
                    "sourceUris": [spec.source_uri],
                    "sourceFormat": "CSV",
                    "destinationTable": {
                        "datasetId": spec.dataset,
                        "tableId": spec.table,
                    },
                    "skipLeadingRows": spec.skip_leading_rows,
                    "autodetect": spec.autodetect_schema,
                    "writeDisposition": write_disposition,
                    "maxBadRecords": spec.max_bad_records,
                    "allowQuotedNewlines": spec.allow_quoted_newlines,
                    "allowJaggedRows": spec.allow_jagged_rows,
                    "ignoreUnknownValues": spec.ignore_unknown_values,
                }
            }
        });

        let url = self.url("jobs");
        let response = self.send(self.client.post(&url).json(&body)).await?;

        let status = response.status();
        if !status.is_success() {
            return Err(map_status(
                status,
                &body_text(response).await,
                &spec.qualified_table(),
            ));
        }

        let job: JobResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::Network(format!("malformed job response: {}", e)))?;

        debug!(job_id = %job.id, table = %spec.qualified_table(), "Load job submitted");

        Ok(job.id)
    }

    async fn job_status(&self, job_id: &str) -> Result<JobSnapshot> {
        let url = self.url(&format!("jobs/{}", job_id));
        let response = self.send(self.client.get(&url)).await?;

        let status = response.status();
        if !status.is_success() {
            return Err(map_status(status, &body_text(response).await, job_id));
        }

        let job: JobResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::Network(format!("malformed job response: {}", e)))?;

        let state = match job.status.state.as_str() {
            "PENDING" => JobState::Pending,
            "RUNNING" => JobState::Running,
            "DONE" => JobState::Done,
            other => {
                return Err(PipelineError::Unexpected(format!(
                    "unknown job state from warehouse: {}",
                    other
                )))
            },
        };

        Ok(JobSnapshot {
            state,
            error_message: job.status.error_result.map(|e| e.message),
            rows_loaded: job.statistics.output_rows,
            bad_records: job.statistics.bad_records,
        })
    }

    async fn cancel_job(&self, job_id: &str) -> Result<()> {
        let url = self.url(&format!("jobs/{}/cancel", job_id));
        let response = self.send(self.client.post(&url)).await?;

        let status = response.status();
        if !status.is_success() {
            return Err(map_status(status, &body_text(response).await, job_id));
        }

        Ok(())
    }
}

async fn body_text(response: reqwest::Response) -> String {
    response.text().await.unwrap_or_default()
}

fn map_status(status: StatusCode, body: &str, subject: &str) -> PipelineError {
    match status {
        StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED => {
            PipelineError::Permission(format!("{}: {}", subject, body))
        },
        StatusCode::NOT_FOUND => PipelineError::FileNotFound(format!("{}: {}", subject, body)),
        StatusCode::CONFLICT => PipelineError::TableConflict(format!("{}: {}", subject, body)),
        StatusCode::TOO_MANY_REQUESTS => PipelineError::Quota(format!("{}: {}", subject, body)),
        status if status.is_server_error() => {
            PipelineError::Network(format!("{} ({}): {}", subject, status, body))
        },
        status => PipelineError::Unexpected(format!("{} ({}): {}", subject, status, body)),
    }
}
