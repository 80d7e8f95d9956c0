//! Companion data file validation
//!
//! Confirms the CSV named by the descriptor is safe to hand to the
//! warehouse: it exists, is readable, sits inside the size window, and the
//! first kilobyte looks like delimited text. The delimiter and
//! line-terminator probes are advisory only; an exotic-but-valid CSV must
//! not be blocked on a heuristic.

use tabload_common::{PipelineError, Result};
use tracing::{info, warn};

use crate::storage::ObjectStore;

/// Bytes sampled from the start of the file for the structural probe.
const PROBE_BYTES: u64 = 1024;

/// Delimiters the probe expects to see in the first sampled line(s).
const COMMON_DELIMITERS: [char; 3] = [',', '\t', '|'];

/// Validate the data file before submitting a load job.
pub async fn validate_data_file(
    store: &dyn ObjectStore,
    bucket: &str,
    key: &str,
    max_size_bytes: u64,
) -> Result<()> {
    if !store.bucket_exists(bucket).await? {
        return Err(PipelineError::FileNotFound(format!(
            "data bucket {} does not exist",
            bucket
        )));
    }

    if !store.object_exists(bucket, key).await? {
        return Err(PipelineError::FileNotFound(format!(
            "data file {} does not exist in bucket {}",
            key, bucket
        )));
    }

    let size = store.object_size(bucket, key).await?;
    if size == 0 {
        return Err(PipelineError::InvalidCsv(format!(
            "data file {} is empty",
            key
        )));
    }
    if size > max_size_bytes {
        return Err(PipelineError::FileProcessing(format!(
            "data file {} is {} bytes, exceeding the {} byte limit",
            key, size, max_size_bytes
        )));
    }

    let probe = store.read_head(bucket, key, PROBE_BYTES).await?;
    check_probe(key, &probe)?;

    info!(key = %key, size = size, "Data file validated");

    Ok(())
}

/// Structural sanity probe over the first bytes of the file.
fn check_probe(key: &str, probe: &[u8]) -> Result<()> {
    let text = decode_prefix(probe).ok_or_else(|| {
        PipelineError::InvalidCsv(format!("data file {} is not decodable as text", key))
    })?;

    if text.trim().is_empty() {
        return Err(PipelineError::InvalidCsv(format!(
            "data file {} contains only whitespace",
            key
        )));
    }

    if !text.contains(&COMMON_DELIMITERS[..]) {
        warn!(
            key = %key,
            "No common delimiter found in the first {} bytes; continuing anyway",
            PROBE_BYTES
        );
    }

    if !text.contains('\n') && !text.contains('\r') {
        warn!(
            key = %key,
            "No line terminator found in the first {} bytes; continuing anyway",
            PROBE_BYTES
        );
    }

    Ok(())
}

/// Decode a byte prefix as UTF-8, tolerating one multi-byte character cut
/// off by the sampling boundary.
fn decode_prefix(probe: &[u8]) -> Option<&str> {
    match std::str::from_utf8(probe) {
        Ok(text) => Some(text),
        Err(e) if e.error_len().is_none() => {
            // Incomplete trailing sequence: the sample window split a
            // character, not the file.
            std::str::from_utf8(&probe[..e.valid_up_to()]).ok()
        },
        Err(_) => None,
    }
}
