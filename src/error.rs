//! Error types for Routebook
//!
//! Centralized error handling using thiserror. Every variant maps to a
//! machine-readable kind that is surfaced verbatim to callers.

use thiserror::Error;

/// All error types that can occur in Routebook
#[derive(Debug, Error)]
pub enum RoutebookError {
    /// Malformed or incomplete request
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A tool source could not be reached or returned no tools
    #[error("Tool catalog unavailable: {0}")]
    CatalogUnavailable(String),

    /// A bundle description could not be decomposed into tasks over the catalog
    #[error("Unplannable description: {0}")]
    UnplannableDescription(String),

    /// An unmatched request could not be planned into a new route
    #[error("Unplannable request: {0}")]
    UnplannableRequest(String),

    /// A route step failed to invoke; `step_index` is 1-based
    #[error("Step {step_index} failed: {cause}")]
    StepExecutionFailed { step_index: usize, cause: String },

    /// An external call exceeded its deadline
    #[error("Upstream timeout: {0}")]
    UpstreamTimeout(String),

    /// An external backend (LLM, tool server) failed for a reason other than timeout
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// A write to the route store failed
    #[error("Store write failed: {0}")]
    StoreWriteFailed(String),

    /// A read from the route store failed
    #[error("Store read failed: {0}")]
    StoreReadFailed(String),

    /// Bundle not found in storage
    #[error("Bundle not found: {0}")]
    BundleNotFound(String),

    /// Route not found in storage
    #[error("Route not found: {0}")]
    RouteNotFound(String),

    /// The caller abandoned the execution before all steps were started
    #[error("Execution cancelled before step {0}")]
    Cancelled(usize),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),

    /// A background task died before reporting
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RoutebookError {
    /// Machine-readable error kind, stable across releases
    pub fn kind(&self) -> &'static str {
        match self {
            RoutebookError::InvalidInput(_) => "InvalidInput",
            RoutebookError::CatalogUnavailable(_) => "CatalogUnavailable",
            RoutebookError::UnplannableDescription(_) => "UnplannableDescription",
            RoutebookError::UnplannableRequest(_) => "UnplannableRequest",
            RoutebookError::StepExecutionFailed { .. } => "StepExecutionFailed",
            RoutebookError::UpstreamTimeout(_) => "UpstreamTimeout",
            RoutebookError::Upstream(_) => "Upstream",
            RoutebookError::StoreWriteFailed(_) => "StoreWriteFailed",
            RoutebookError::StoreReadFailed(_) => "StoreReadFailed",
            RoutebookError::BundleNotFound(_) => "BundleNotFound",
            RoutebookError::RouteNotFound(_) => "RouteNotFound",
            RoutebookError::Cancelled(_) => "Cancelled",
            RoutebookError::Config(_) => "Config",
            RoutebookError::Internal(_) => "Internal",
            RoutebookError::Io(_) => "Io",
            RoutebookError::Json(_) => "Json",
        }
    }
}

/// Result type alias for Routebook operations
pub type Result<T> = std::result::Result<T, RoutebookError>;
