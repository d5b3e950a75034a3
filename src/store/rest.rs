//! Route store over a PostgREST-compatible HTTP row store.
//!
//! Tables are addressed as `{url}/rest/v1/{table}`. The store has no
//! multi-table transactions, so bundle creation inserts the bundle, then all
//! routes in one request, and deletes the bundle again if the routes fail.
//! The delete runs on its own task, so it still happens when the caller's
//! future is dropped part-way through.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::domain::{Bundle, Provenance, Route};
use crate::error::{Result, RoutebookError};
use crate::tools::ToolSourceConfig;

use super::RouteStore;
use super::filter::Filter;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BundleRow {
    id: String,
    project_id: String,
    #[serde(default)]
    description: String,
    tool_source_ids: Vec<String>,
    created_at: DateTime<Utc>,
}

impl From<&Bundle> for BundleRow {
    fn from(b: &Bundle) -> Self {
        Self {
            id: b.id.clone(),
            project_id: b.project_id.clone(),
            description: b.description.clone(),
            tool_source_ids: b.tool_source_ids.clone(),
            created_at: b.created_at,
        }
    }
}

impl From<BundleRow> for Bundle {
    fn from(r: BundleRow) -> Self {
        Bundle {
            id: r.id,
            project_id: r.project_id,
            description: r.description,
            tool_source_ids: r.tool_source_ids,
            created_at: r.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RouteRow {
    id: String,
    bundle_id: String,
    trigger: String,
    steps: Value,
    #[serde(default)]
    notes: String,
    provenance: String,
    position: u32,
    created_at: DateTime<Utc>,
}

impl RouteRow {
    fn from_route(r: &Route) -> Result<Self> {
        Ok(Self {
            id: r.id.clone(),
            bundle_id: r.bundle_id.clone(),
            trigger: r.trigger.clone(),
            steps: serde_json::to_value(&r.steps)?,
            notes: r.notes.clone(),
            provenance: r.provenance.as_str().to_string(),
            position: r.position,
            created_at: r.created_at,
        })
    }

    fn into_route(self) -> Result<Route> {
        let provenance = Provenance::parse(&self.provenance).ok_or_else(|| {
            RoutebookError::StoreReadFailed(format!("route {} has unknown provenance '{}'", self.id, self.provenance))
        })?;
        let steps = serde_json::from_value(self.steps)
            .map_err(|e| RoutebookError::StoreReadFailed(format!("route {} has malformed steps: {}", self.id, e)))?;
        Ok(Route {
            id: self.id,
            bundle_id: self.bundle_id,
            trigger: self.trigger,
            steps,
            notes: self.notes,
            provenance,
            position: self.position,
            created_at: self.created_at,
        })
    }
}

#[derive(Clone)]
pub struct RestStore {
    client: Client,
    base_url: String,
    api_key: String,
}

impl RestStore {
    pub fn new(url: &str, api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RoutebookError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: format!("{}/rest/v1", url.trim_end_matches('/')),
            api_key: api_key.into(),
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/{}", self.base_url, table)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
    }

    async fn select<T: DeserializeOwned>(&self, table: &str, filters: &[Filter], order: Option<&str>) -> Result<Vec<T>> {
        let mut query: Vec<(String, String)> = filters.iter().map(Filter::to_query).collect();
        query.push(("select".to_string(), "*".to_string()));
        if let Some(order) = order {
            query.push(("order".to_string(), order.to_string()));
        }

        let response = self
            .authorized(self.client.get(self.table_url(table)))
            .query(&query)
            .send()
            .await
            .map_err(|e| transport_error(e, &format!("store read {}", table), RoutebookError::StoreReadFailed))?;

        let response = check(response, RoutebookError::StoreReadFailed).await?;
        response
            .json()
            .await
            .map_err(|e| RoutebookError::StoreReadFailed(format!("Failed to parse {} rows: {}", table, e)))
    }

    async fn insert<T: Serialize + ?Sized>(&self, table: &str, rows: &T, upsert: bool) -> Result<()> {
        let prefer = if upsert {
            "return=minimal,resolution=merge-duplicates"
        } else {
            "return=minimal"
        };

        let response = self
            .authorized(self.client.post(self.table_url(table)))
            .header("Prefer", prefer)
            .json(rows)
            .send()
            .await
            .map_err(|e| transport_error(e, &format!("store write {}", table), RoutebookError::StoreWriteFailed))?;

        check(response, RoutebookError::StoreWriteFailed).await?;
        Ok(())
    }

    async fn delete(&self, table: &str, filter: &Filter) -> Result<()> {
        let response = self
            .authorized(self.client.delete(self.table_url(table)))
            .query(&[filter.to_query()])
            .send()
            .await
            .map_err(|e| transport_error(e, &format!("store delete {}", table), RoutebookError::StoreWriteFailed))?;

        check(response, RoutebookError::StoreWriteFailed).await?;
        Ok(())
    }

    /// Delete a bundle and its routes, logging rather than returning failures
    async fn rollback_bundle(self, bundle_id: String) {
        if let Err(e) = self.delete("routes", &Filter::eq("bundle_id", &bundle_id)).await {
            log::warn!("Compensating route delete for {} failed: {}", bundle_id, e);
        }
        if let Err(e) = self.delete("bundles", &Filter::eq("id", &bundle_id)).await {
            log::warn!("Compensating bundle delete for {} failed: {}", bundle_id, e);
        }
    }
}

/// Rolls back a half-written bundle if dropped while armed
struct PendingBundle {
    store: Option<RestStore>,
    bundle_id: String,
}

impl PendingBundle {
    fn arm(store: &RestStore, bundle_id: &str) -> Self {
        Self {
            store: Some(store.clone()),
            bundle_id: bundle_id.to_string(),
        }
    }

    fn disarm(mut self) {
        self.store = None;
    }

    /// Roll back now and wait for it; the delete survives the caller going away
    async fn roll_back(mut self) {
        if let Some(store) = self.store.take() {
            let cleanup = tokio::spawn(store.rollback_bundle(self.bundle_id.clone()));
            if let Err(e) = cleanup.await {
                log::warn!("Rollback task for {} failed: {}", self.bundle_id, e);
            }
        }
    }
}

impl Drop for PendingBundle {
    fn drop(&mut self) {
        let Some(store) = self.store.take() else {
            return;
        };
        log::warn!("Bundle {} write abandoned part-way, rolling back", self.bundle_id);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(store.rollback_bundle(std::mem::take(&mut self.bundle_id)));
            }
            Err(_) => log::warn!("No runtime to roll back bundle {}", self.bundle_id),
        }
    }
}

impl std::fmt::Debug for RestStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestStore").field("base_url", &self.base_url).finish()
    }
}

#[async_trait]
impl RouteStore for RestStore {
    async fn create_bundle(&self, bundle: &Bundle, routes: &[Route]) -> Result<()> {
        let rows = routes.iter().map(RouteRow::from_route).collect::<Result<Vec<_>>>()?;

        // Armed before the first write: a dropped insert may still have landed
        let pending = PendingBundle::arm(self, &bundle.id);
        let mut written = self.insert("bundles", &[BundleRow::from(bundle)], false).await;
        if written.is_ok() && !rows.is_empty() {
            written = self.insert("routes", &rows, false).await;
        }

        match written {
            Ok(()) => {
                pending.disarm();
                Ok(())
            }
            Err(e) => {
                log::warn!("Writing bundle {} failed, rolling back: {}", bundle.id, e);
                pending.roll_back().await;
                Err(match e {
                    kept @ (RoutebookError::UpstreamTimeout(_) | RoutebookError::StoreWriteFailed(_)) => kept,
                    other => RoutebookError::StoreWriteFailed(other.to_string()),
                })
            }
        }
    }

    async fn get_bundle(&self, id: &str) -> Result<Option<Bundle>> {
        let rows: Vec<BundleRow> = self.select("bundles", &[Filter::eq("id", id)], None).await?;
        Ok(rows.into_iter().next().map(Bundle::from))
    }

    async fn list_bundles(&self, project_id: &str) -> Result<Vec<Bundle>> {
        let rows: Vec<BundleRow> = self
            .select("bundles", &[Filter::eq("project_id", project_id)], Some("created_at.asc,id.asc"))
            .await?;
        Ok(rows.into_iter().map(Bundle::from).collect())
    }

    async fn insert_route(&self, route: &Route) -> Result<()> {
        self.insert("routes", &[RouteRow::from_route(route)?], false).await
    }

    async fn get_route(&self, id: &str) -> Result<Option<Route>> {
        let rows: Vec<RouteRow> = self.select("routes", &[Filter::eq("id", id)], None).await?;
        rows.into_iter().next().map(RouteRow::into_route).transpose()
    }

    async fn list_routes(&self, bundle_id: &str) -> Result<Vec<Route>> {
        let rows: Vec<RouteRow> = self
            .select(
                "routes",
                &[Filter::eq("bundle_id", bundle_id)],
                Some("position.asc,created_at.asc,id.asc"),
            )
            .await?;
        rows.into_iter().map(RouteRow::into_route).collect()
    }

    async fn put_tool_source(&self, config: &ToolSourceConfig) -> Result<()> {
        self.insert("tool_sources", std::slice::from_ref(config), true).await
    }

    async fn get_tool_sources(&self, ids: &[String]) -> Result<Vec<ToolSourceConfig>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.select("tool_sources", &[Filter::in_list("id", ids)], None).await
    }
}

fn transport_error(e: reqwest::Error, operation: &str, wrap: fn(String) -> RoutebookError) -> RoutebookError {
    if e.is_timeout() {
        RoutebookError::UpstreamTimeout(operation.to_string())
    } else {
        wrap(format!("{} failed: {}", operation, e))
    }
}

async fn check(response: Response, wrap: fn(String) -> RoutebookError) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(wrap(format!("row store returned {}: {}", status, body)))
}
