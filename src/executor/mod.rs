//! Route executor
//!
//! Runs a route's steps strictly in order against the catalog. Each step sees
//! the outputs of the steps before it and nothing else. The first failing step
//! aborts the route; outputs of steps that already completed are dropped.

pub mod bindings;

use std::future::Future;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::watch;

use crate::deadline::with_deadline;
use crate::domain::{ExecutionResult, Route};
use crate::error::{Result, RoutebookError};
use crate::tools::ToolCatalog;

/// Raised by the caller when it abandons an execution
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    /// Cancel once `signal` fires. If the signal cannot be installed the
    /// handle is held forever instead, so nothing is cancelled.
    pub async fn cancel_on<F>(self, signal: F)
    where
        F: Future<Output = std::io::Result<()>>,
    {
        match signal.await {
            Ok(()) => self.cancel(),
            Err(e) => {
                log::warn!("Cancel signal unavailable: {}", e);
                std::future::pending::<()>().await;
            }
        }
    }
}

impl Drop for CancelHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Observed by the executor between steps
#[derive(Clone)]
pub struct CancelSignal {
    rx: Option<watch::Receiver<bool>>,
}

impl CancelSignal {
    /// A linked handle/signal pair; dropping the handle cancels
    pub fn pair() -> (CancelHandle, CancelSignal) {
        let (tx, rx) = watch::channel(false);
        (CancelHandle { tx }, CancelSignal { rx: Some(rx) })
    }

    /// A signal that never fires
    pub fn never() -> Self {
        Self { rx: None }
    }

    pub fn is_cancelled(&self) -> bool {
        self.rx.as_ref().is_some_and(|rx| *rx.borrow())
    }
}

impl std::fmt::Debug for CancelSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelSignal").field("cancelled", &self.is_cancelled()).finish()
    }
}

#[derive(Debug, Clone)]
pub struct RouteExecutor {
    tool_timeout: Duration,
}

impl RouteExecutor {
    pub fn new(tool_timeout: Duration) -> Self {
        Self { tool_timeout }
    }

    /// Execute `route` for the request text `input`
    ///
    /// Steps already issued always run to completion; `cancel` is only
    /// consulted before a step starts.
    pub async fn execute(
        &self,
        route: &Route,
        catalog: &ToolCatalog,
        input: &str,
        cancel: &CancelSignal,
    ) -> Result<ExecutionResult> {
        let mut outputs: Vec<Value> = Vec::with_capacity(route.steps.len());

        for (i, step) in route.steps.iter().enumerate() {
            let step_index = i + 1;
            let fail = |cause: String| {
                log::debug!(
                    "Route {} aborted at step {}; discarding {} completed outputs",
                    route.id,
                    step_index,
                    step_index - 1
                );
                RoutebookError::StepExecutionFailed { step_index, cause }
            };

            if cancel.is_cancelled() {
                log::info!("Route {} cancelled before step {}", route.id, step_index);
                return Err(RoutebookError::Cancelled(step_index));
            }

            let descriptor = catalog
                .get(&step.tool)
                .ok_or_else(|| fail(format!("tool '{}' is not in the catalog", step.tool)))?;

            let arguments = bindings::resolve(&step.arguments, input, &outputs).map_err(&fail)?;
            if !arguments.is_object() {
                return Err(fail(format!("arguments for '{}' must be a JSON object", step.tool)));
            }
            let missing = descriptor.missing_fields(&arguments);
            if !missing.is_empty() {
                return Err(fail(format!(
                    "tool '{}' missing required field(s): {}",
                    step.tool,
                    missing.join(", ")
                )));
            }

            log::debug!("Route {} step {}: invoking {}", route.id, step_index, step.tool);
            let operation = format!("tool {} (step {})", step.tool, step_index);
            let output = match with_deadline(&operation, self.tool_timeout, catalog.invoke(&step.tool, arguments)).await {
                Ok(output) => output,
                Err(RoutebookError::UpstreamTimeout(op)) => return Err(RoutebookError::UpstreamTimeout(op)),
                Err(RoutebookError::Upstream(cause)) => return Err(fail(cause)),
                Err(e) => return Err(fail(e.to_string())),
            };
            outputs.push(output);
        }

        let result = outputs.pop().unwrap_or(Value::Null);
        Ok(ExecutionResult::new(route.id.clone(), result))
    }
}
