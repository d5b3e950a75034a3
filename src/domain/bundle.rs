//! Bundle record
//!
//! A bundle is created once from a description and never edited afterwards;
//! only the set of routes that point at it grows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::generate_bundle_id;

/// A named collection of routes scoped to a project and a fixed set of tool sources
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bundle {
    /// Globally unique identifier ("bnd-1738300800123-a1b2c3d4")
    pub id: String,

    /// Project the bundle belongs to
    pub project_id: String,

    /// The description the bundle was planned from
    pub description: String,

    /// Tool sources whose catalog the bundle's routes are planned against
    pub tool_source_ids: Vec<String>,

    pub created_at: DateTime<Utc>,
}

impl Bundle {
    /// Allocate a new bundle identity
    pub fn new(
        project_id: impl Into<String>,
        tool_source_ids: Vec<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: generate_bundle_id(),
            project_id: project_id.into(),
            description: description.into(),
            tool_source_ids,
            created_at: Utc::now(),
        }
    }
}
