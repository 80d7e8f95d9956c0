//! Ingestion pipeline core
//!
//! One run per triggering event, strictly downstream: eligibility gate →
//! descriptor validation → data file validation → retried warehouse load →
//! archival → notification. No stage retries an earlier stage, and the run
//! as a whole never returns an error: every terminal failure is converted
//! into a best-effort email plus logs, because surfacing an error to the
//! trigger host would cause redelivery and reprocessing of a file this
//! pipeline already consumed.

use serde::Deserialize;
use std::sync::Arc;
use tabload_common::PipelineError;
use tracing::{error, info, instrument};

pub mod archive;
pub mod classify;
pub mod datafile;
pub mod descriptor;
pub mod gate;
pub mod loader;
pub mod retry;

pub use descriptor::IngestionPlan;
pub use retry::RetryPolicy;

use crate::config::PipelineConfig;
use crate::notify::{archive_warning_email, failure_email, success_email, Notifier};
use crate::storage::ObjectStore;
use crate::warehouse::Warehouse;

/// Object-store notification payload delivered by the trigger host.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadEvent {
    /// Object key of the created file
    pub name: String,
    /// Bucket the file was created in
    pub bucket: String,
}

/// Immutable ingestion request derived from one event.
#[derive(Debug, Clone)]
pub struct IngestionRequest {
    pub config_key: String,
    pub bucket: String,
}

impl From<UploadEvent> for IngestionRequest {
    fn from(event: UploadEvent) -> Self {
        Self {
            config_key: event.name,
            bucket: event.bucket,
        }
    }
}

/// What one run amounted to. Informational only: the trigger surface
/// acknowledges the event identically in every case.
#[derive(Debug)]
pub enum RunSummary {
    /// The object was not an eligible descriptor
    Skipped,
    Loaded {
        table: String,
        rows_loaded: u64,
        /// False when the load succeeded but archival failed
        archived: bool,
    },
    Failed {
        error: PipelineError,
    },
}

/// The ingestion pipeline with its collaborator handles.
pub struct Pipeline {
    store: Arc<dyn ObjectStore>,
    warehouse: Arc<dyn Warehouse>,
    notifier: Notifier,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        warehouse: Arc<dyn Warehouse>,
        notifier: Notifier,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            warehouse,
            notifier,
            config,
        }
    }

    /// Process one upload event to completion.
    #[instrument(
        skip(self),
        fields(
            run_id = %uuid::Uuid::new_v4(),
            bucket = %request.bucket,
            key = %request.config_key,
        )
    )]
    pub async fn run(&self, request: IngestionRequest) -> RunSummary {
        if !gate::eligible(&request.config_key) {
            info!("Skipping ineligible object");
            return RunSummary::Skipped;
        }

        info!("Processing descriptor");

        let plan = match descriptor::load_descriptor(
            self.store.as_ref(),
            &request.bucket,
            &request.config_key,
        )
        .await
        {
            Ok(plan) => plan,
            Err(e) => return self.fail(&request, None, e).await,
        };

        if let Err(e) = datafile::validate_data_file(
            self.store.as_ref(),
            &plan.data_bucket,
            &plan.data_key,
            self.config.max_file_size_bytes(),
        )
        .await
        {
            return self.fail(&request, Some(&plan), e).await;
        }

        let policy = RetryPolicy::new(self.config.max_retries, self.config.retry_delay());
        let outcome = match policy
            .run("warehouse load", || {
                loader::load(self.warehouse.as_ref(), &plan, self.config.timeout())
            })
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => return self.fail(&request, Some(&plan), e).await,
        };

        let table = format!("{}.{}", plan.dataset, plan.table);

        // The load already succeeded; archival problems must not overturn
        // the run's outcome. They get their own distinct notification.
        let archived = match archive::archive_run_files(self.store.as_ref(), &plan).await {
            Ok(()) => {
                let (subject, body) = success_email(
                    &table,
                    &plan.source_uri,
                    &plan.config_key,
                    outcome.rows_loaded,
                );
                self.notifier
                    .notify(plan.notify_email.as_deref(), &subject, &body)
                    .await;
                true
            },
            Err(e) => {
                error!(error = %e, "Load succeeded but archival failed");
                let (subject, body) =
                    archive_warning_email(&table, &plan.source_uri, &plan.config_key, &e.to_string());
                self.notifier
                    .notify(plan.notify_email.as_deref(), &subject, &body)
                    .await;
                false
            },
        };

        info!(
            table = %table,
            rows_loaded = outcome.rows_loaded,
            archived = archived,
            "Ingestion run completed"
        );

        RunSummary::Loaded {
            table,
            rows_loaded: outcome.rows_loaded,
            archived,
        }
    }

    async fn fail(
        &self,
        request: &IngestionRequest,
        plan: Option<&IngestionPlan>,
        error: PipelineError,
    ) -> RunSummary {
        error!(
            error = %error,
            class = %error.class(),
            "Ingestion run failed"
        );

        let table = plan.map(|p| format!("{}.{}", p.dataset, p.table));
        let (subject, body) = failure_email(
            error.kind(),
            &error.to_string(),
            table.as_deref(),
            plan.map(|p| p.source_uri.as_str()),
            &request.config_key,
        );

        self.notifier
            .notify(
                plan.and_then(|p| p.notify_email.as_deref()),
                &subject,
                &body,
            )
            .await;

        RunSummary::Failed { error }
    }
}
