//! Execution outcome types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What running a route produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Output of the route's final step
    pub result: Value,

    /// Route that produced the result
    pub route_used: String,

    /// True when the route was learned for this execution
    pub new_route_created: bool,
}

impl ExecutionResult {
    pub fn new(route_used: impl Into<String>, result: Value) -> Self {
        Self {
            result,
            route_used: route_used.into(),
            new_route_created: false,
        }
    }

    /// Mark the result as produced by a freshly learned route
    pub fn learned(mut self) -> Self {
        self.new_route_created = true;
        self
    }
}
