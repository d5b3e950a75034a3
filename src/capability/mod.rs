//! Planning and matching capability
//!
//! The core never talks to a model directly. It asks a Capability to either
//! decompose text into tool-call tasks or to judge which stored routes share a
//! request's intent. Validation of what comes back happens in the planner and
//! matcher, so any backend can sit behind this trait.

mod llm;
mod scripted;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{Bundle, Route, Step};
use crate::error::{Result, RoutebookError};
use crate::tools::ToolDescriptor;

pub use llm::LlmCapability;
pub use scripted::ScriptedCapability;

/// How much of the text one plan should cover
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanScope {
    /// Split a bundle description into the minimal set of independent tasks
    Bundle,
    /// Treat the whole text as exactly one task
    SingleTask,
}

/// One task of a plan, as proposed by the capability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedTask {
    /// Short trigger phrase for the task
    pub description: String,
    pub steps: Vec<Step>,
    #[serde(default)]
    pub notes: String,
}

impl PlannedTask {
    pub fn new(description: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            description: description.into(),
            steps,
            notes: String::new(),
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlanOutcome {
    Planned(Vec<PlannedTask>),
    /// The text cannot be covered by the available tools
    Unplannable(String),
}

/// Intent-equivalence verdict for one stored route
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Judgment {
    pub route_id: String,
    /// In [0, 1]
    pub confidence: f64,
}

impl Judgment {
    pub fn new(route_id: impl Into<String>, confidence: f64) -> Self {
        Self {
            route_id: route_id.into(),
            confidence,
        }
    }
}

#[async_trait]
pub trait Capability: Send + Sync {
    /// Decompose `text` into tasks over `tools`
    async fn plan(&self, text: &str, tools: &[ToolDescriptor], scope: PlanScope) -> Result<PlanOutcome>;

    /// Judge which of `routes` answer the same intent as `request`
    async fn judge(&self, request: &str, bundle: &Bundle, routes: &[Route]) -> Result<Vec<Judgment>>;
}

/// Stands in when no model is configured; every call is a config error
#[derive(Debug, Default)]
pub struct Unconfigured;

#[async_trait]
impl Capability for Unconfigured {
    async fn plan(&self, _text: &str, _tools: &[ToolDescriptor], _scope: PlanScope) -> Result<PlanOutcome> {
        Err(RoutebookError::Config("no LLM is configured for this command".to_string()))
    }

    async fn judge(&self, _request: &str, _bundle: &Bundle, _routes: &[Route]) -> Result<Vec<Judgment>> {
        Err(RoutebookError::Config("no LLM is configured for this command".to_string()))
    }
}
