//! Tabload Common Library
//!
//! Shared error taxonomy and logging setup for the tabload workspace.
//!
//! # Overview
//!
//! - **Error Handling**: the closed [`PipelineError`] taxonomy shared by the
//!   pipeline core and its adapters, plus the [`ErrorClass`] derivation that
//!   drives retry decisions and notification wording.
//! - **Logging**: tracing-based logging configured from the environment.

pub mod error;
pub mod logging;

// Re-export commonly used types
pub use error::{ErrorClass, PipelineError, Result};
