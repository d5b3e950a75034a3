//! HTTP surface
//!
//! A thin axum layer over the two services. Request bodies are parsed here;
//! every decision is made in the services.

mod error;
pub mod handlers;
pub mod routes;
pub mod server;
pub mod types;

use std::sync::Arc;

use crate::service::{BundleService, ExecutionService};

pub use error::ApiError;
pub use routes::create_router;
pub use server::start_server;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub bundles: Arc<BundleService>,
    pub executions: Arc<ExecutionService>,
}

impl AppState {
    pub fn new(bundles: BundleService, executions: ExecutionService) -> Self {
        Self {
            bundles: Arc::new(bundles),
            executions: Arc::new(executions),
        }
    }
}
