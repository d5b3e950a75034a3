//! Route and step records
//!
//! A route is never mutated once persisted. If a route needs to change it is
//! replaced by a new one; the old record stays valid as a historical plan.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::id::generate_route_id;

/// How a route came into existence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Produced by the planner when the bundle was created
    Planned,
    /// Produced on an unmatched request and persisted for reuse
    OnDemand,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::Planned => "planned",
            Provenance::OnDemand => "on_demand",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "planned" => Some(Provenance::Planned),
            "on_demand" => Some(Provenance::OnDemand),
            _ => None,
        }
    }
}

/// One tool invocation inside a route
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Catalog tool name
    pub tool: String,

    /// Invocation arguments; strings may carry `{{input}}` / `{{steps.N...}}` bindings
    #[serde(default = "empty_arguments")]
    pub arguments: Value,

    /// Why the step exists
    #[serde(default)]
    pub rationale: String,
}

fn empty_arguments() -> Value {
    Value::Object(Default::default())
}

impl Step {
    pub fn new(tool: impl Into<String>, arguments: Value) -> Self {
        Self {
            tool: tool.into(),
            arguments,
            rationale: String::new(),
        }
    }

    pub fn with_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = rationale.into();
        self
    }
}

/// A persisted, ordered plan of tool-invocation steps answering one intent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    //=== Identity ===
    /// Unique identifier ("rt-1738300800123-a1b2c3d4")
    pub id: String,

    /// Owning bundle
    pub bundle_id: String,

    //=== Plan ===
    /// Trigger phrase the matcher compares requests against
    pub trigger: String,

    /// Steps, executed strictly in this order
    pub steps: Vec<Step>,

    /// Free-text planner notes
    #[serde(default)]
    pub notes: String,

    //=== Metadata ===
    pub provenance: Provenance,

    /// Position inside the bundle's original plan; on-demand routes go after it
    #[serde(default)]
    pub position: u32,

    pub created_at: DateTime<Utc>,
}

impl Route {
    /// Create a route produced at bundle-creation time
    pub fn planned(bundle_id: impl Into<String>, trigger: impl Into<String>, steps: Vec<Step>, position: u32) -> Self {
        Self::new(bundle_id, trigger, steps, Provenance::Planned, position)
    }

    /// Create a route learned from an unmatched request
    pub fn on_demand(bundle_id: impl Into<String>, trigger: impl Into<String>, steps: Vec<Step>, position: u32) -> Self {
        Self::new(bundle_id, trigger, steps, Provenance::OnDemand, position)
    }

    fn new(
        bundle_id: impl Into<String>,
        trigger: impl Into<String>,
        steps: Vec<Step>,
        provenance: Provenance,
        position: u32,
    ) -> Self {
        Self {
            id: generate_route_id(),
            bundle_id: bundle_id.into(),
            trigger: trigger.into(),
            steps,
            notes: String::new(),
            provenance,
            position,
            created_at: Utc::now(),
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }

    /// Names of every tool the route invokes, in step order
    pub fn tool_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.tool.as_str()).collect()
    }
}
