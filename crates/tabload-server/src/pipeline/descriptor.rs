//! Descriptor loading and validation
//!
//! The descriptor is the control-plane file: it names the dataset, the
//! optional table name, the notification address, and points at the data
//! file. Every check here is a hard gate: the first failure wins and
//! nothing is silently defaulted for required fields.

use serde::Deserialize;
use tabload_common::{PipelineError, Result};
use tracing::info;

use super::gate::DESCRIPTOR_SUFFIX;
use crate::storage::ObjectStore;
use crate::warehouse::WriteMode;

/// Descriptor files above this size are rejected outright; a control-plane
/// file this large is a mistake, not configuration.
pub const DESCRIPTOR_MAX_BYTES: u64 = 10 * 1024 * 1024;

/// Maximum length for dataset and table identifiers.
pub const IDENTIFIER_MAX_LEN: usize = 1024;

/// Prefix applied when a sanitized table name would start with a digit.
const DIGIT_PREFIX: &str = "t_";

/// Raw descriptor as written by the user. Unknown keys are ignored.
#[derive(Debug, Deserialize)]
struct RawDescriptor {
    file_location: Option<String>,
    dataset: Option<String>,
    email: Option<String>,
    #[serde(rename = "override")]
    overwrite: Option<bool>,
    tablename: Option<String>,
    is_header: Option<bool>,
}

/// Fully validated ingestion plan derived from one descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestionPlan {
    pub config_bucket: String,
    pub config_key: String,
    pub data_bucket: String,
    /// Object key of the companion CSV within `data_bucket`
    pub data_key: String,
    /// Full URI handed to the warehouse as the load source
    pub source_uri: String,
    pub dataset: String,
    /// Sanitized destination table name
    pub table: String,
    pub write_mode: WriteMode,
    pub has_header: bool,
    pub notify_email: Option<String>,
}

/// Fetch, parse, and validate a descriptor into an [`IngestionPlan`].
pub async fn load_descriptor(
    store: &dyn ObjectStore,
    bucket: &str,
    key: &str,
) -> Result<IngestionPlan> {
    if !store.bucket_exists(bucket).await? {
        return Err(PipelineError::ConfigValidation(format!(
            "bucket {} does not exist",
            bucket
        )));
    }

    if !store.object_exists(bucket, key).await? {
        return Err(PipelineError::ConfigValidation(format!(
            "descriptor {} does not exist in bucket {}",
            key, bucket
        )));
    }

    let size = store
        .object_size(bucket, key)
        .await
        .map_err(not_found_is_config_error)?;
    if size == 0 {
        return Err(PipelineError::ConfigValidation(format!(
            "descriptor {} is empty",
            key
        )));
    }
    if size > DESCRIPTOR_MAX_BYTES {
        return Err(PipelineError::ConfigValidation(format!(
            "descriptor {} is {} bytes, exceeding the {} byte limit",
            key, size, DESCRIPTOR_MAX_BYTES
        )));
    }

    let bytes = store
        .read(bucket, key)
        .await
        .map_err(not_found_is_config_error)?;

    let text = String::from_utf8(bytes).map_err(|e| {
        PipelineError::ConfigValidation(format!("descriptor {} is not valid UTF-8: {}", key, e))
    })?;

    let raw: RawDescriptor = serde_json::from_str(&text).map_err(|e| {
        PipelineError::ConfigValidation(format!("descriptor {} is not valid JSON: {}", key, e))
    })?;

    info!(key = %key, "Descriptor parsed: {:?}", raw);

    let plan = validate(raw, bucket, key)?;

    info!(
        table = %format!("{}.{}", plan.dataset, plan.table),
        source = %plan.source_uri,
        "Descriptor validated"
    );

    Ok(plan)
}

/// A descriptor the provider reports as missing is a configuration problem,
/// not a missing data file; permission and transport errors pass through.
fn not_found_is_config_error(error: PipelineError) -> PipelineError {
    match error {
        PipelineError::FileNotFound(msg) => PipelineError::ConfigValidation(msg),
        other => other,
    }
}

fn validate(raw: RawDescriptor, config_bucket: &str, config_key: &str) -> Result<IngestionPlan> {
    let file_location = raw
        .file_location
        .filter(|s| !s.is_empty())
        .ok_or_else(|| PipelineError::ConfigValidation("file_location is required".into()))?;

    let dataset = raw
        .dataset
        .filter(|s| !s.is_empty())
        .ok_or_else(|| PipelineError::ConfigValidation("dataset is required".into()))?;
    validate_identifier(&dataset, "dataset")?;

    if let Some(email) = raw.email.as_deref() {
        if !is_rfc_shaped_email(email) {
            return Err(PipelineError::ConfigValidation(format!(
                "email {} is not a valid address",
                email
            )));
        }
    }

    let (scheme, data_bucket, data_prefix) = parse_file_location(&file_location)?;

    let base_name = data_file_base_name(config_key)?;
    let data_key = format!("{}{}.csv", data_prefix, base_name);
    let source_uri = format!("{}://{}/{}", scheme, data_bucket, data_key);

    let table = sanitize_table_name(raw.tablename.as_deref().unwrap_or(&base_name))?;

    let write_mode = if raw.overwrite.unwrap_or(true) {
        WriteMode::Truncate
    } else {
        WriteMode::Append
    };

    Ok(IngestionPlan {
        config_bucket: config_bucket.to_string(),
        config_key: config_key.to_string(),
        data_bucket,
        data_key,
        source_uri,
        dataset,
        table,
        write_mode,
        has_header: raw.is_header.unwrap_or(true),
        notify_email: raw.email,
    })
}

/// Split a `scheme://bucket/path/` location into scheme, bucket, and a
/// normalized path prefix (empty or ending in `/`). The scheme is optional
/// and preserved for building the load-source URI.
fn parse_file_location(raw: &str) -> Result<(String, String, String)> {
    let (scheme, rest) = match raw.split_once("://") {
        Some((scheme, rest)) if matches!(scheme, "gs" | "s3") => (scheme.to_string(), rest),
        Some((scheme, _)) => {
            return Err(PipelineError::ConfigValidation(format!(
                "file_location has unsupported scheme {}",
                scheme
            )))
        },
        None => ("s3".to_string(), raw),
    };

    let (bucket, path) = match rest.split_once('/') {
        Some((bucket, path)) => (bucket, path),
        None => (rest, ""),
    };

    if bucket.is_empty() {
        return Err(PipelineError::ConfigValidation(
            "file_location does not name a bucket".into(),
        ));
    }

    let prefix = if path.is_empty() || path.ends_with('/') {
        path.to_string()
    } else {
        format!("{}/", path)
    };

    Ok((scheme, bucket.to_string(), prefix))
}

/// Derive the data file base name: the descriptor key's final path segment
/// with the descriptor suffix stripped. `in/sales_config.json` -> `sales`.
fn data_file_base_name(config_key: &str) -> Result<String> {
    let file_name = config_key.rsplit('/').next().unwrap_or(config_key);

    let base = file_name
        .len()
        .checked_sub(DESCRIPTOR_SUFFIX.len())
        .and_then(|split| file_name.get(..split).zip(file_name.get(split..)))
        .filter(|(_, suffix)| suffix.eq_ignore_ascii_case(DESCRIPTOR_SUFFIX))
        .map(|(base, _)| base)
        .ok_or_else(|| {
            PipelineError::ConfigValidation(format!("{} is not a descriptor file", file_name))
        })?;

    if base.is_empty() {
        return Err(PipelineError::ConfigValidation(format!(
            "descriptor name {} yields an empty data file name",
            file_name
        )));
    }

    Ok(base.to_string())
}

/// Sanitize a table name: `-` and space become `_`, any other character
/// outside `[A-Za-z0-9_]` is dropped, and a leading digit gets a fixed
/// prefix. Idempotent.
pub fn sanitize_table_name(raw: &str) -> Result<String> {
    let mut name: String = raw
        .chars()
        .map(|c| if c == '-' || c == ' ' { '_' } else { c })
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();

    if name.is_empty() {
        return Err(PipelineError::ConfigValidation(format!(
            "table name {:?} is empty after sanitization",
            raw
        )));
    }

    if name.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        name = format!("{}{}", DIGIT_PREFIX, name);
    }

    if name.len() > IDENTIFIER_MAX_LEN {
        return Err(PipelineError::ConfigValidation(format!(
            "table name exceeds {} characters",
            IDENTIFIER_MAX_LEN
        )));
    }

    Ok(name)
}

fn validate_identifier(name: &str, field: &str) -> Result<()> {
    if name.len() > IDENTIFIER_MAX_LEN {
        return Err(PipelineError::ConfigValidation(format!(
            "{} exceeds {} characters",
            field, IDENTIFIER_MAX_LEN
        )));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(PipelineError::ConfigValidation(format!(
            "{} {:?} may only contain letters, digits, and underscores",
            field, name
        )));
    }
    Ok(())
}

/// Cheap shape check, not full RFC 5322 parsing: one `@`, a non-empty local
/// part, a dotted domain, no whitespace.
fn is_rfc_shaped_email(address: &str) -> bool {
    let mut parts = address.split('@');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) => {
            !local.is_empty()
                && !domain.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !address.chars().any(char::is_whitespace)
        },
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw() -> RawDescriptor {
        RawDescriptor {
            file_location: Some("gs://bkt/in/".to_string()),
            dataset: Some("analytics".to_string()),
            email: Some("a@b.com".to_string()),
            overwrite: None,
            tablename: None,
            is_header: None,
        }
    }

    #[test]
    fn test_validate_happy_path() {
        let plan = validate(raw(), "cfg-bkt", "in/sales_config.json").unwrap();
        assert_eq!(plan.data_bucket, "bkt");
        assert_eq!(plan.data_key, "in/sales.csv");
        assert_eq!(plan.source_uri, "gs://bkt/in/sales.csv");
        assert_eq!(plan.dataset, "analytics");
        assert_eq!(plan.table, "sales");
        assert_eq!(plan.write_mode, WriteMode::Truncate);
        assert!(plan.has_header);
        assert_eq!(plan.notify_email.as_deref(), Some("a@b.com"));
    }

    #[test]
    fn test_missing_dataset_is_rejected() {
        let mut descriptor = raw();
        descriptor.dataset = None;
        let err = validate(descriptor, "cfg-bkt", "in/sales_config.json").unwrap_err();
        assert!(matches!(err, PipelineError::ConfigValidation(_)));
    }

    #[test]
    fn test_missing_file_location_is_rejected() {
        let mut descriptor = raw();
        descriptor.file_location = None;
        let err = validate(descriptor, "cfg-bkt", "in/sales_config.json").unwrap_err();
        assert!(matches!(err, PipelineError::ConfigValidation(_)));
    }

    #[test]
    fn test_override_false_appends() {
        let mut descriptor = raw();
        descriptor.overwrite = Some(false);
        let plan = validate(descriptor, "cfg-bkt", "in/sales_config.json").unwrap();
        assert_eq!(plan.write_mode, WriteMode::Append);
    }

    #[test]
    fn test_explicit_tablename_wins_over_base_name() {
        let mut descriptor = raw();
        descriptor.tablename = Some("daily-sales report".to_string());
        let plan = validate(descriptor, "cfg-bkt", "in/sales_config.json").unwrap();
        assert_eq!(plan.table, "daily_sales_report");
    }

    #[test]
    fn test_malformed_email_is_rejected() {
        for bad in ["not-an-email", "a@", "@b.com", "a@b", "a b@c.com", "a@@b.com"] {
            let mut descriptor = raw();
            descriptor.email = Some(bad.to_string());
            let err = validate(descriptor, "cfg-bkt", "in/sales_config.json").unwrap_err();
            assert!(
                matches!(err, PipelineError::ConfigValidation(_)),
                "expected rejection for {:?}",
                bad
            );
        }
    }

    #[test]
    fn test_unknown_keys_are_ignored() {
        let text = r#"{
            "file_location": "gs://bkt/in/",
            "dataset": "analytics",
            "comment": "unknown keys are fine"
        }"#;
        let raw: RawDescriptor = serde_json::from_str(text).unwrap();
        assert!(validate(raw, "cfg-bkt", "sales_config.json").is_ok());
    }

    #[test]
    fn test_parse_file_location_variants() {
        assert_eq!(
            parse_file_location("gs://bkt/in/").unwrap(),
            ("gs".to_string(), "bkt".to_string(), "in/".to_string())
        );
        assert_eq!(
            parse_file_location("s3://bkt/a/b").unwrap(),
            ("s3".to_string(), "bkt".to_string(), "a/b/".to_string())
        );
        assert_eq!(
            parse_file_location("bkt/in/").unwrap(),
            ("s3".to_string(), "bkt".to_string(), "in/".to_string())
        );
        assert_eq!(
            parse_file_location("bkt").unwrap(),
            ("s3".to_string(), "bkt".to_string(), "".to_string())
        );
        assert!(parse_file_location("ftp://bkt/in/").is_err());
        assert!(parse_file_location("gs:///in/").is_err());
    }

    #[test]
    fn test_data_file_base_name() {
        assert_eq!(data_file_base_name("sales_config.json").unwrap(), "sales");
        assert_eq!(data_file_base_name("in/sales_config.json").unwrap(), "sales");
        assert_eq!(
            data_file_base_name("in/web_sales_config.json").unwrap(),
            "web_sales"
        );
        assert!(data_file_base_name("_config.json").is_err());
    }

    #[test]
    fn test_sanitize_table_name() {
        assert_eq!(sanitize_table_name("sales").unwrap(), "sales");
        assert_eq!(sanitize_table_name("daily-sales").unwrap(), "daily_sales");
        assert_eq!(sanitize_table_name("daily sales").unwrap(), "daily_sales");
        assert_eq!(sanitize_table_name("sales!2024?").unwrap(), "sales2024");
        assert_eq!(sanitize_table_name("2024_sales").unwrap(), "t_2024_sales");
        assert!(sanitize_table_name("!!!").is_err());
        assert!(sanitize_table_name(&"a".repeat(1025)).is_err());
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        for raw in ["sales", "daily-sales", "2024 sales", "x-y z9", "t_2024"] {
            let once = sanitize_table_name(raw).unwrap();
            let twice = sanitize_table_name(&once).unwrap();
            assert_eq!(once, twice, "sanitize not idempotent for {:?}", raw);
        }
    }

    #[test]
    fn test_validate_identifier() {
        assert!(validate_identifier("analytics_2024", "dataset").is_ok());
        assert!(validate_identifier("bad-name", "dataset").is_err());
        assert!(validate_identifier(&"a".repeat(1025), "dataset").is_err());
    }

    #[test]
    fn test_email_shape() {
        assert!(is_rfc_shaped_email("a@b.com"));
        assert!(is_rfc_shaped_email("first.last+tag@sub.example.org"));
        assert!(!is_rfc_shaped_email("a@b"));
        assert!(!is_rfc_shaped_email("a@.com"));
        assert!(!is_rfc_shaped_email("a@b.com."));
    }
}
