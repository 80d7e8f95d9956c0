//! Tabload Server
//!
//! Event-driven CSV ingestion service: an object-store upload notification
//! for a `*_config.json` descriptor drives validation of the descriptor and
//! its companion CSV, a bulk load into a tabular warehouse, archival of the
//! processed files, and an email status notification.
//!
//! The pipeline core (`pipeline`) only sees the collaborator ports defined
//! in `storage`, `warehouse`, `notify`, and `secrets`; the concrete S3 and
//! HTTP adapters live beside the ports.

pub mod config;
pub mod notify;
pub mod pipeline;
pub mod secrets;
pub mod storage;
pub mod warehouse;
