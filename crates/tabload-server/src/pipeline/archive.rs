//! Post-success archival
//!
//! Moves the data file and the descriptor to the archival prefix in their
//! buckets (copy, then delete). The asymmetry is deliberate: a failed copy
//! aborts the step so source data is never lost mid-move, while a failed
//! delete after a good copy only leaves a duplicate behind and is logged.

use tabload_common::{PipelineError, Result};
use tracing::{info, warn};

use super::descriptor::IngestionPlan;
use super::gate::ARCHIVE_PREFIX;
use crate::storage::ObjectStore;

/// Archive both source files of a completed run.
pub async fn archive_run_files(store: &dyn ObjectStore, plan: &IngestionPlan) -> Result<()> {
    archive_one(store, &plan.data_bucket, &plan.data_key).await?;
    archive_one(store, &plan.config_bucket, &plan.config_key).await?;
    Ok(())
}

async fn archive_one(store: &dyn ObjectStore, bucket: &str, key: &str) -> Result<()> {
    let file_name = key.rsplit('/').next().unwrap_or(key);
    let archived_key = format!("{}{}", ARCHIVE_PREFIX, file_name);

    store
        .copy(bucket, key, &archived_key)
        .await
        .map_err(|e| match e {
            PipelineError::Permission(msg) => PipelineError::Permission(msg),
            other => PipelineError::FileProcessing(format!(
                "failed to archive {} to {}: {}",
                key, archived_key, other
            )),
        })?;

    if let Err(e) = store.delete(bucket, key).await {
        // The object is now duplicated, not lost; reprocessing protection
        // comes from the archived copy's prefix, so this is survivable.
        warn!(
            bucket = %bucket,
            key = %key,
            error = %e,
            "Archived copy created but source delete failed"
        );
    }

    info!(bucket = %bucket, from = %key, to = %archived_key, "File archived");

    Ok(())
}
