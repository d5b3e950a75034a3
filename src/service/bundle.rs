//! Bundle creation and lookup

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::capability::Capability;
use crate::deadline::with_deadline;
use crate::domain::{Bundle, Route};
use crate::error::{Result, RoutebookError};
use crate::planner::RoutePlanner;
use crate::store::RouteStore;
use crate::tools::{CatalogLoader, ToolSourceConfig, ToolSourceConnector};

use super::{BundleStage, ServiceConfig};

/// Outcome of a successful bundle creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleCreated {
    pub bundle_id: String,
    pub routes_created: usize,
}

pub struct BundleService {
    store: Arc<dyn RouteStore>,
    catalog: CatalogLoader,
    planner: RoutePlanner,
    config: ServiceConfig,
}

impl BundleService {
    pub fn new(
        store: Arc<dyn RouteStore>,
        connector: Arc<dyn ToolSourceConnector>,
        capability: Arc<dyn Capability>,
        config: ServiceConfig,
    ) -> Self {
        Self {
            catalog: CatalogLoader::new(store.clone(), connector, config.catalog_timeout, config.store_timeout),
            planner: RoutePlanner::new(capability, config.llm_timeout),
            store,
            config,
        }
    }

    /// Plan `description` over the given tool sources and store the result
    ///
    /// Nothing is written unless planning succeeds, and the bundle is written
    /// together with all of its routes or not at all.
    pub async fn create_bundle(
        &self,
        project_id: &str,
        tool_source_ids: &[String],
        description: &str,
    ) -> Result<BundleCreated> {
        let project_id = project_id.trim();
        let description = description.trim();
        if project_id.is_empty() {
            return Err(RoutebookError::InvalidInput("project_id must not be empty".to_string()));
        }
        if description.is_empty() {
            return Err(RoutebookError::InvalidInput("description must not be empty".to_string()));
        }
        let source_ids = normalize_source_ids(tool_source_ids)?;

        let bundle = Bundle::new(project_id, source_ids, description);
        log::debug!("Bundle {}: {}", bundle.id, BundleStage::Created);

        let catalog = self.catalog.load(&bundle.tool_source_ids).await?;
        let planned = self.planner.plan(&bundle.id, description, &catalog).await?;
        for p in &planned {
            log::debug!("Bundle {}: task '{}' -> route {}", bundle.id, p.task_description, p.route.id);
        }
        log::debug!("Bundle {}: {}", bundle.id, BundleStage::Planned);

        let routes: Vec<Route> = planned.into_iter().map(|p| p.route).collect();
        with_deadline(
            "store write bundle",
            self.config.store_timeout,
            self.store.create_bundle(&bundle, &routes),
        )
        .await?;
        log::debug!("Bundle {}: {}", bundle.id, BundleStage::Persisted);
        log::info!(
            "Created bundle {} for project {} with {} routes",
            bundle.id,
            bundle.project_id,
            routes.len()
        );

        Ok(BundleCreated {
            bundle_id: bundle.id,
            routes_created: routes.len(),
        })
    }

    pub async fn get_bundle(&self, id: &str) -> Result<Bundle> {
        with_deadline("store read bundle", self.config.store_timeout, self.store.get_bundle(id))
            .await?
            .ok_or_else(|| RoutebookError::BundleNotFound(id.to_string()))
    }

    pub async fn list_bundles(&self, project_id: &str) -> Result<Vec<Bundle>> {
        if project_id.trim().is_empty() {
            return Err(RoutebookError::InvalidInput("project_id must not be empty".to_string()));
        }
        with_deadline(
            "store list bundles",
            self.config.store_timeout,
            self.store.list_bundles(project_id.trim()),
        )
        .await
    }

    /// Routes of an existing bundle, in plan order
    pub async fn list_routes(&self, bundle_id: &str) -> Result<Vec<Route>> {
        let (_, routes) = self.get_bundle_with_routes(bundle_id).await?;
        Ok(routes)
    }

    /// A bundle and its routes, reading the bundle row once
    pub async fn get_bundle_with_routes(&self, bundle_id: &str) -> Result<(Bundle, Vec<Route>)> {
        let bundle = self.get_bundle(bundle_id).await?;
        let routes = with_deadline(
            "store list routes",
            self.config.store_timeout,
            self.store.list_routes(bundle_id),
        )
        .await?;
        Ok((bundle, routes))
    }

    pub async fn get_route(&self, id: &str) -> Result<Route> {
        with_deadline("store read route", self.config.store_timeout, self.store.get_route(id))
            .await?
            .ok_or_else(|| RoutebookError::RouteNotFound(id.to_string()))
    }

    /// Register or replace the connection parameters of a tool source
    pub async fn register_tool_source(&self, config: &ToolSourceConfig) -> Result<()> {
        config.validate()?;
        with_deadline(
            "store write tool_source",
            self.config.store_timeout,
            self.store.put_tool_source(config),
        )
        .await?;
        log::info!("Registered tool source {} ({})", config.id, config.url);
        Ok(())
    }
}

/// Trim, reject blanks, and drop repeats while keeping first-seen order
fn normalize_source_ids(ids: &[String]) -> Result<Vec<String>> {
    if ids.is_empty() {
        return Err(RoutebookError::InvalidInput("tool_source_ids must not be empty".to_string()));
    }
    let mut unique: Vec<String> = Vec::with_capacity(ids.len());
    for id in ids {
        let id = id.trim();
        if id.is_empty() {
            return Err(RoutebookError::InvalidInput("tool_source_ids must not contain blank ids".to_string()));
        }
        if !unique.iter().any(|u| u == id) {
            unique.push(id.to_string());
        }
    }
    Ok(unique)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{PlannedTask, ScriptedCapability, Unconfigured};
    use crate::domain::{Provenance, Step};
    use crate::store::SqliteStore;
    use crate::tools::{StaticConnector, StaticToolSource, ToolDescriptor};
    use serde_json::json;

    struct Fixture {
        store: Arc<SqliteStore>,
        capability: Arc<ScriptedCapability>,
        service: BundleService,
    }

    async fn fixture(capability: ScriptedCapability) -> Fixture {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        store
            .put_tool_source(&ToolSourceConfig::new("web-search", "Web search", "http://localhost:9000/mcp"))
            .await
            .unwrap();

        let source = Arc::new(
            StaticToolSource::new("web-search")
                .with_tool(ToolDescriptor::new("web_search", "Search the web"), |_| Ok(json!([])))
                .with_tool(ToolDescriptor::new("summarize", "Summarize text"), |_| Ok(json!(""))),
        );
        let connector = Arc::new(StaticConnector::new().with_source(source));
        let capability = Arc::new(capability);
        let service = BundleService::new(store.clone(), connector, capability.clone(), ServiceConfig::default());

        Fixture {
            store,
            capability,
            service,
        }
    }

    fn two_tasks() -> Vec<PlannedTask> {
        vec![
            PlannedTask::new("search for X", vec![Step::new("web_search", json!({"query": "X"}))]),
            PlannedTask::new(
                "summarize the result",
                vec![
                    Step::new("web_search", json!({"query": "{{input}}"})),
                    Step::new("summarize", json!({"text": "{{steps.1}}"})),
                ],
            ),
        ]
    }

    #[tokio::test]
    async fn test_create_bundle_persists_routes() {
        let f = fixture(ScriptedCapability::new().with_plan(two_tasks())).await;

        let created = f
            .service
            .create_bundle("p1", &["web-search".to_string()], "search for X and summarize it")
            .await
            .unwrap();

        assert_eq!(created.routes_created, 2);
        let bundle = f.service.get_bundle(&created.bundle_id).await.unwrap();
        assert_eq!(bundle.project_id, "p1");
        assert_eq!(bundle.description, "search for X and summarize it");

        let routes = f.service.list_routes(&created.bundle_id).await.unwrap();
        let triggers: Vec<&str> = routes.iter().map(|r| r.trigger.as_str()).collect();
        assert_eq!(triggers, vec!["search for X", "summarize the result"]);
        assert!(routes.iter().all(|r| r.provenance == Provenance::Planned));
    }

    #[tokio::test]
    async fn test_blank_inputs_are_invalid() {
        let f = fixture(ScriptedCapability::new()).await;
        let ids = vec!["web-search".to_string()];

        for (project, sources, description) in [
            ("", ids.clone(), "d"),
            ("p1", vec![], "d"),
            ("p1", vec!["  ".to_string()], "d"),
            ("p1", ids.clone(), "   "),
        ] {
            let err = f.service.create_bundle(project, &sources, description).await.unwrap_err();
            assert_eq!(err.kind(), "InvalidInput");
        }
        assert!(f.capability.plan_calls().is_empty());
    }

    #[tokio::test]
    async fn test_unplannable_leaves_nothing_behind() {
        let f = fixture(ScriptedCapability::new().with_unplannable("no email tool")).await;

        let err = f
            .service
            .create_bundle("p1", &["web-search".to_string()], "email Bob")
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "UnplannableDescription");
        assert!(f.store.list_bundles("p1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unregistered_source_is_catalog_unavailable() {
        let f = fixture(ScriptedCapability::new().with_plan(two_tasks())).await;
        let err = f
            .service
            .create_bundle("p1", &["nope".to_string()], "d")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "CatalogUnavailable");
        assert!(f.capability.plan_calls().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_source_ids_are_collapsed() {
        let f = fixture(ScriptedCapability::new().with_plan(two_tasks())).await;
        let ids = vec!["web-search".to_string(), " web-search ".to_string()];

        let created = f.service.create_bundle("p1", &ids, "d").await.unwrap();
        let bundle = f.service.get_bundle(&created.bundle_id).await.unwrap();
        assert_eq!(bundle.tool_source_ids, vec!["web-search".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_lookups() {
        let f = fixture(ScriptedCapability::new()).await;
        assert_eq!(f.service.get_bundle("bnd-x").await.unwrap_err().kind(), "BundleNotFound");
        assert_eq!(f.service.list_routes("bnd-x").await.unwrap_err().kind(), "BundleNotFound");
        assert_eq!(f.service.get_route("rt-x").await.unwrap_err().kind(), "RouteNotFound");
    }

    #[tokio::test]
    async fn test_register_tool_source_validates() {
        let f = fixture(ScriptedCapability::new()).await;
        let bad = ToolSourceConfig::new("files", "Files", "ftp://nowhere");
        assert_eq!(f.service.register_tool_source(&bad).await.unwrap_err().kind(), "InvalidInput");

        let good = ToolSourceConfig::new("files", "Files", "https://files.example/mcp");
        f.service.register_tool_source(&good).await.unwrap();
        let stored = f.store.get_tool_sources(&["files".to_string()]).await.unwrap();
        assert_eq!(stored, vec![good]);
    }

    /// Counts bundle reads on top of an in-memory store
    struct CountingStore {
        inner: SqliteStore,
        bundle_reads: std::sync::atomic::AtomicUsize,
    }

    #[async_trait::async_trait]
    impl RouteStore for CountingStore {
        async fn create_bundle(&self, bundle: &Bundle, routes: &[Route]) -> Result<()> {
            self.inner.create_bundle(bundle, routes).await
        }

        async fn get_bundle(&self, id: &str) -> Result<Option<Bundle>> {
            self.bundle_reads.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            self.inner.get_bundle(id).await
        }

        async fn list_bundles(&self, project_id: &str) -> Result<Vec<Bundle>> {
            self.inner.list_bundles(project_id).await
        }

        async fn insert_route(&self, route: &Route) -> Result<()> {
            self.inner.insert_route(route).await
        }

        async fn get_route(&self, id: &str) -> Result<Option<Route>> {
            self.inner.get_route(id).await
        }

        async fn list_routes(&self, bundle_id: &str) -> Result<Vec<Route>> {
            self.inner.list_routes(bundle_id).await
        }

        async fn put_tool_source(&self, config: &ToolSourceConfig) -> Result<()> {
            self.inner.put_tool_source(config).await
        }

        async fn get_tool_sources(&self, ids: &[String]) -> Result<Vec<ToolSourceConfig>> {
            self.inner.get_tool_sources(ids).await
        }
    }

    #[tokio::test]
    async fn test_reads_without_a_model() {
        let store = Arc::new(CountingStore {
            inner: SqliteStore::in_memory().unwrap(),
            bundle_reads: Default::default(),
        });
        let bundle = Bundle::new("p1", vec!["web-search".to_string()], "research");
        let route = Route::planned(&bundle.id, "search for X", vec![Step::new("web_search", json!({}))], 0);
        store.create_bundle(&bundle, &[route]).await.unwrap();

        let service = BundleService::new(
            store.clone(),
            Arc::new(StaticConnector::new()),
            Arc::new(Unconfigured),
            ServiceConfig::default(),
        );

        assert_eq!(service.list_bundles("p1").await.unwrap().len(), 1);
        let (found, routes) = service.get_bundle_with_routes(&bundle.id).await.unwrap();
        assert_eq!(found.id, bundle.id);
        assert_eq!(routes[0].trigger, "search for X");
        assert_eq!(store.bundle_reads.load(std::sync::atomic::Ordering::SeqCst), 1);

        let err = service
            .create_bundle("p1", &["web-search".to_string()], "search")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "CatalogUnavailable");
    }
}
