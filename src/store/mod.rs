//! Route store - persistence for bundles, routes, and tool-source registrations.
//!
//! Two backends implement the same trait: a local SQLite database and a
//! PostgREST-style row store reached over HTTP. Route steps are stored as an
//! embedded JSON array on the route row so ordering survives without joins.

mod filter;
mod rest;
mod sqlite;

use async_trait::async_trait;

use crate::domain::{Bundle, Route};
use crate::error::Result;
use crate::tools::ToolSourceConfig;

pub use filter::{Filter, FilterOp};
pub use rest::RestStore;
pub use sqlite::SqliteStore;

/// Persistence abstraction keyed by bundle identity
#[async_trait]
pub trait RouteStore: Send + Sync {
    /// Write a bundle and its planned routes; all or nothing
    async fn create_bundle(&self, bundle: &Bundle, routes: &[Route]) -> Result<()>;

    /// Get a bundle by ID.
    async fn get_bundle(&self, id: &str) -> Result<Option<Bundle>>;

    /// Bundles belonging to a project, oldest first
    async fn list_bundles(&self, project_id: &str) -> Result<Vec<Bundle>>;

    /// Append a route to an existing bundle
    async fn insert_route(&self, route: &Route) -> Result<()>;

    /// Get a route by ID.
    async fn get_route(&self, id: &str) -> Result<Option<Route>>;

    /// Routes of a bundle ordered by position, then creation time
    async fn list_routes(&self, bundle_id: &str) -> Result<Vec<Route>>;

    /// Register or replace a tool source
    async fn put_tool_source(&self, config: &ToolSourceConfig) -> Result<()>;

    /// Registered sources among `ids`; unknown ids are simply absent
    async fn get_tool_sources(&self, ids: &[String]) -> Result<Vec<ToolSourceConfig>>;
}
