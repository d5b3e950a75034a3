//! Orchestration services
//!
//! BundleService turns a description into a stored bundle of routes.
//! ExecutionService resolves a request to a route, learning a new one when
//! nothing matches, and runs it. Both take their collaborators and an
//! explicit ServiceConfig; neither reads process state.

mod bundle;
mod execution;

use std::fmt;
use std::time::Duration;

use crate::config::Config;

pub use bundle::{BundleCreated, BundleService};
pub use execution::ExecutionService;

/// Deadlines and matching policy shared by the services
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub catalog_timeout: Duration,
    pub llm_timeout: Duration,
    pub store_timeout: Duration,
    pub tool_timeout: Duration,
    /// Judgments below this confidence never count as a match
    pub min_confidence: f64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            catalog_timeout: Duration::from_secs(15),
            llm_timeout: Duration::from_secs(120),
            store_timeout: Duration::from_secs(10),
            tool_timeout: Duration::from_secs(60),
            min_confidence: 0.5,
        }
    }
}

impl From<&Config> for ServiceConfig {
    fn from(config: &Config) -> Self {
        Self {
            catalog_timeout: config.timeouts.catalog(),
            llm_timeout: config.timeouts.llm(),
            store_timeout: config.timeouts.store(),
            tool_timeout: config.timeouts.tool(),
            min_confidence: config.matching.min_confidence,
        }
    }
}

/// Bundle creation progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleStage {
    Created,
    Planned,
    Persisted,
}

impl BundleStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            BundleStage::Created => "created",
            BundleStage::Planned => "planned",
            BundleStage::Persisted => "persisted",
        }
    }
}

impl fmt::Display for BundleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request execution progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStage {
    Received,
    Resolved,
    RouteLearned,
    Executed,
}

impl ExecutionStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStage::Received => "received",
            ExecutionStage::Resolved => "resolved",
            ExecutionStage::RouteLearned => "route-learned",
            ExecutionStage::Executed => "executed",
        }
    }
}

impl fmt::Display for ExecutionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_config_from_config() {
        let mut config = Config::default();
        config.timeouts.tool_ms = 250;
        config.matching.min_confidence = 0.7;

        let service = ServiceConfig::from(&config);
        assert_eq!(service.tool_timeout, Duration::from_millis(250));
        assert_eq!(service.min_confidence, 0.7);
        assert_eq!(service.catalog_timeout, config.timeouts.catalog());
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(BundleStage::Persisted.to_string(), "persisted");
        assert_eq!(ExecutionStage::RouteLearned.to_string(), "route-learned");
    }
}
