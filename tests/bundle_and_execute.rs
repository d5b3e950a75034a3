//! Bundle creation and execution integration tests
//!
//! Drives both services end to end with an on-disk SQLite store, an
//! in-process tool source, and a scripted capability.

use std::sync::Arc;

use async_trait::async_trait;
use routebook::capability::{PlannedTask, ScriptedCapability};
use routebook::domain::{Bundle, Route, Step};
use routebook::error::{Result, RoutebookError};
use routebook::executor::CancelSignal;
use routebook::service::{BundleService, ExecutionService, ServiceConfig};
use routebook::store::{RouteStore, SqliteStore};
use routebook::tools::{StaticConnector, StaticToolSource, ToolDescriptor, ToolSourceConfig};
use serde_json::json;
use tempfile::TempDir;

fn web_search_source() -> Arc<StaticToolSource> {
    Arc::new(
        StaticToolSource::new("web-search")
            .with_tool(
                ToolDescriptor::new("web_search", "Search the web").with_schema(json!({
                    "type": "object",
                    "properties": {"query": {"type": "string"}},
                    "required": ["query"]
                })),
                |args| Ok(json!({"top": format!("top hit for {}", args["query"].as_str().unwrap_or(""))})),
            )
            .with_tool(
                ToolDescriptor::new("summarize", "Summarize text").with_schema(json!({
                    "type": "object",
                    "properties": {"text": {"type": "string"}},
                    "required": ["text"]
                })),
                |args| Ok(json!(format!("summary: {}", args["text"].as_str().unwrap_or("")))),
            ),
    )
}

fn search_then_summarize(description: &str) -> PlannedTask {
    PlannedTask::new(
        description,
        vec![
            Step::new("web_search", json!({"query": "{{input}}"})).with_rationale("find sources"),
            Step::new("summarize", json!({"text": "{{steps.1.top}}"})).with_rationale("condense the hit"),
        ],
    )
}

async fn registered_store(dir: &TempDir) -> Arc<SqliteStore> {
    let store = Arc::new(SqliteStore::open(dir.path().join("routebook.db")).unwrap());
    store
        .put_tool_source(&ToolSourceConfig::new("web-search", "Web search", "http://localhost:9000/mcp"))
        .await
        .unwrap();
    store
}

fn services(
    store: Arc<dyn RouteStore>,
    source: Arc<StaticToolSource>,
    capability: Arc<ScriptedCapability>,
) -> (BundleService, ExecutionService) {
    let connector = Arc::new(StaticConnector::new().with_source(source));
    (
        BundleService::new(store.clone(), connector.clone(), capability.clone(), ServiceConfig::default()),
        ExecutionService::new(store, connector, capability, ServiceConfig::default()),
    )
}

#[tokio::test]
async fn test_create_bundle_with_two_routes() {
    let dir = TempDir::new().unwrap();
    let store = registered_store(&dir).await;
    let capability = Arc::new(ScriptedCapability::new().with_plan(vec![
        PlannedTask::new("search for X", vec![Step::new("web_search", json!({"query": "X"}))]),
        search_then_summarize("summarize the result"),
    ]));
    let (bundles, _) = services(store.clone(), web_search_source(), capability);

    let created = bundles
        .create_bundle("p1", &["web-search".to_string()], "search for X and summarize it")
        .await
        .unwrap();

    assert_eq!(created.routes_created, 2);
    let routes = store.list_routes(&created.bundle_id).await.unwrap();
    assert_eq!(routes[0].trigger, "search for X");
    assert_eq!(routes[1].trigger, "summarize the result");
    assert_eq!(routes[1].steps[1].rationale, "condense the hit");
}

#[tokio::test]
async fn test_routes_only_reference_catalog_tools() {
    let dir = TempDir::new().unwrap();
    let store = registered_store(&dir).await;
    let capability = Arc::new(ScriptedCapability::new().with_plan(vec![
        search_then_summarize("research"),
        PlannedTask::new("notify", vec![Step::new("send_email", json!({"to": "bob"}))]),
    ]));
    let (bundles, _) = services(store.clone(), web_search_source(), capability);

    let err = bundles
        .create_bundle("p1", &["web-search".to_string()], "research and notify Bob")
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "UnplannableDescription");
    assert!(store.list_bundles("p1").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_planner_failure_leaves_no_bundle() {
    let dir = TempDir::new().unwrap();
    let store = registered_store(&dir).await;
    let capability = Arc::new(
        ScriptedCapability::new().with_plan_error(RoutebookError::UpstreamTimeout("planner".to_string())),
    );
    let (bundles, _) = services(store.clone(), web_search_source(), capability);

    let err = bundles
        .create_bundle("p1", &["web-search".to_string()], "search for X")
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "UpstreamTimeout");
    assert!(store.list_bundles("p1").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_first_execution_learns_and_second_reuses() {
    let dir = TempDir::new().unwrap();
    let store = registered_store(&dir).await;
    let capability = Arc::new(ScriptedCapability::new().with_plan(vec![search_then_summarize("search and summarize")]));
    let source = web_search_source();
    let (_, executions) = services(store.clone(), source.clone(), capability.clone());

    // Fresh bundle with no routes
    let bundle = Bundle::new("p1", vec!["web-search".to_string()], "research helper");
    store.create_bundle(&bundle, &[]).await.unwrap();
    let request = "search for X and summarize it";

    let first = executions.execute(&bundle.id, request, &CancelSignal::never()).await.unwrap();
    assert!(first.new_route_created);
    assert_eq!(first.result, json!("summary: top hit for search for X and summarize it"));
    let routes = store.list_routes(&bundle.id).await.unwrap();
    assert_eq!(routes.len(), 1);
    assert_eq!(first.route_used, routes[0].id);

    let second = executions.execute(&bundle.id, request, &CancelSignal::never()).await.unwrap();
    assert!(!second.new_route_created);
    assert_eq!(second.route_used, first.route_used);
    assert_eq!(store.list_routes(&bundle.id).await.unwrap().len(), 1);
    assert_eq!(source.call_count("web_search"), 2);
}

#[tokio::test]
async fn test_step_one_failure_skips_step_two() {
    let dir = TempDir::new().unwrap();
    let store = registered_store(&dir).await;
    let source = Arc::new(
        StaticToolSource::new("web-search")
            .with_tool(ToolDescriptor::new("web_search", "Search the web"), |_| {
                Err("search backend unreachable".to_string())
            })
            .with_tool(ToolDescriptor::new("summarize", "Summarize text"), |_| Ok(json!("unused"))),
    );
    let (_, executions) = services(store.clone(), source.clone(), Arc::new(ScriptedCapability::new()));

    let bundle = Bundle::new("p1", vec!["web-search".to_string()], "research helper");
    let route = Route::planned(
        &bundle.id,
        "search for X and summarize it",
        search_then_summarize("x").steps,
        0,
    );
    store.create_bundle(&bundle, std::slice::from_ref(&route)).await.unwrap();

    let err = executions
        .execute(&bundle.id, "search for X and summarize it", &CancelSignal::never())
        .await
        .unwrap_err();

    match err {
        RoutebookError::StepExecutionFailed { step_index, cause } => {
            assert_eq!(step_index, 1);
            assert_eq!(cause, "search backend unreachable");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(source.call_count("summarize"), 0);
}

/// Delegates to SQLite but refuses to append routes
struct ReadOnlyRoutes {
    inner: SqliteStore,
}

#[async_trait]
impl RouteStore for ReadOnlyRoutes {
    async fn create_bundle(&self, bundle: &Bundle, routes: &[Route]) -> Result<()> {
        self.inner.create_bundle(bundle, routes).await
    }

    async fn get_bundle(&self, id: &str) -> Result<Option<Bundle>> {
        self.inner.get_bundle(id).await
    }

    async fn list_bundles(&self, project_id: &str) -> Result<Vec<Bundle>> {
        self.inner.list_bundles(project_id).await
    }

    async fn insert_route(&self, _route: &Route) -> Result<()> {
        Err(RoutebookError::StoreWriteFailed("routes relation is read-only".to_string()))
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
async fn test_learned_route_write_failure_is_reported() {
    let inner = SqliteStore::in_memory().unwrap();
    inner
        .put_tool_source(&ToolSourceConfig::new("web-search", "Web search", "http://localhost:9000/mcp"))
        .await
        .unwrap();
    let store = Arc::new(ReadOnlyRoutes { inner });
    let source = web_search_source();
    let capability = Arc::new(ScriptedCapability::new().with_plan(vec![search_then_summarize("s")]));
    let (_, executions) = services(store.clone(), source.clone(), capability);

    let bundle = Bundle::new("p1", vec!["web-search".to_string()], "research helper");
    store.create_bundle(&bundle, &[]).await.unwrap();

    let err = executions
        .execute(&bundle.id, "search for X", &CancelSignal::never())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "StoreWriteFailed");
    assert_eq!(source.call_count("web_search"), 0);
}

#[tokio::test]
async fn test_routes_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let bundle_id = {
        let store = registered_store(&dir).await;
        let capability = Arc::new(ScriptedCapability::new().with_plan(vec![search_then_summarize("research")]));
        let (bundles, _) = services(store, web_search_source(), capability);
        bundles
            .create_bundle("p1", &["web-search".to_string()], "research things")
            .await
            .unwrap()
            .bundle_id
    };

    let reopened = SqliteStore::open(dir.path().join("routebook.db")).unwrap();
    let routes = reopened.list_routes(&bundle_id).await.unwrap();
    assert_eq!(routes.len(), 1);
    assert_eq!(routes[0].steps.len(), 2);
}
