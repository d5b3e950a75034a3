//! Tool catalog for one bundle-creation or execution call
//!
//! The catalog maps tool names to their descriptors and the live source that
//! answers them. It is built fresh per call by CatalogLoader and never cached
//! beyond that call.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde_json::Value;

use crate::deadline::with_deadline;
use crate::error::{Result, RoutebookError};
use crate::store::RouteStore;

use super::definition::ToolDescriptor;
use super::source::{ToolSource, ToolSourceConfig, ToolSourceConnector};

struct CatalogEntry {
    descriptor: ToolDescriptor,
    source: Arc<dyn ToolSource>,
}

/// Tools visible to a bundle, keyed by name
#[derive(Default)]
pub struct ToolCatalog {
    tools: HashMap<String, CatalogEntry>,
    order: Vec<String>,
}

impl ToolCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Add every tool a source lists; first registration of a name wins
    pub fn add_source(&mut self, source: Arc<dyn ToolSource>, descriptors: Vec<ToolDescriptor>) {
        for descriptor in descriptors {
            if let Some(existing) = self.tools.get(&descriptor.name) {
                log::warn!(
                    "Tool '{}' from source '{}' shadowed by source '{}'",
                    descriptor.name,
                    source.id(),
                    existing.descriptor.source_id
                );
                continue;
            }
            self.order.push(descriptor.name.clone());
            self.tools.insert(
                descriptor.name.clone(),
                CatalogEntry {
                    descriptor,
                    source: source.clone(),
                },
            );
        }
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.get(name).map(|e| &e.descriptor)
    }

    /// All descriptors in source order
    pub fn descriptors(&self) -> Vec<&ToolDescriptor> {
        self.order.iter().filter_map(|name| self.get(name)).collect()
    }

    /// Get number of tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if catalog is empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Invoke a tool through the source that listed it
    pub async fn invoke(&self, name: &str, arguments: Value) -> Result<Value> {
        let entry = self
            .tools
            .get(name)
            .ok_or_else(|| RoutebookError::Upstream(format!("tool '{}' is not in the catalog", name)))?;
        entry.source.call_tool(name, arguments).await
    }
}

impl std::fmt::Debug for ToolCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolCatalog").field("tools", &self.order).finish()
    }
}

/// Builds a ToolCatalog from registered tool-source ids
pub struct CatalogLoader {
    store: Arc<dyn RouteStore>,
    connector: Arc<dyn ToolSourceConnector>,
    catalog_timeout: Duration,
    store_timeout: Duration,
}

impl CatalogLoader {
    pub fn new(
        store: Arc<dyn RouteStore>,
        connector: Arc<dyn ToolSourceConnector>,
        catalog_timeout: Duration,
        store_timeout: Duration,
    ) -> Self {
        Self {
            store,
            connector,
            catalog_timeout,
            store_timeout,
        }
    }

    /// Resolve, connect, and list every source; any failure fails the load
    pub async fn load(&self, source_ids: &[String]) -> Result<ToolCatalog> {
        if source_ids.is_empty() {
            return Err(RoutebookError::CatalogUnavailable("no tool sources given".to_string()));
        }

        let configs = with_deadline(
            "store read tool_sources",
            self.store_timeout,
            self.store.get_tool_sources(source_ids),
        )
        .await?;

        let mut ordered = Vec::with_capacity(source_ids.len());
        for id in source_ids {
            let config = configs
                .iter()
                .find(|c| &c.id == id)
                .ok_or_else(|| RoutebookError::CatalogUnavailable(format!("tool source '{}' is not registered", id)))?;
            ordered.push(config);
        }

        let listings = join_all(ordered.into_iter().map(|config| self.list_source(config))).await;

        let mut catalog = ToolCatalog::new();
        for listing in listings {
            let (source, descriptors) = listing?;
            catalog.add_source(source, descriptors);
        }

        log::debug!("Catalog loaded: {} tools from {} sources", catalog.len(), source_ids.len());
        Ok(catalog)
    }

    async fn list_source(&self, config: &ToolSourceConfig) -> Result<(Arc<dyn ToolSource>, Vec<ToolDescriptor>)> {
        let operation = format!("catalog load {}", config.id);
        let listing = with_deadline(&operation, self.catalog_timeout, async {
            let source = self.connector.connect(config).await?;
            let descriptors = source.list_tools().await?;
            Ok((source, descriptors))
        })
        .await;

        match listing {
            Ok((_, ref descriptors)) if descriptors.is_empty() => Err(RoutebookError::CatalogUnavailable(format!(
                "tool source '{}' returned no tools",
                config.id
            ))),
            Ok(listing) => Ok(listing),
            Err(RoutebookError::UpstreamTimeout(op)) => Err(RoutebookError::UpstreamTimeout(op)),
            Err(RoutebookError::CatalogUnavailable(msg)) => Err(RoutebookError::CatalogUnavailable(msg)),
            Err(e) => {
                log::warn!("Tool source '{}' unavailable: {}", config.id, e);
                Err(RoutebookError::CatalogUnavailable(format!("tool source '{}': {}", config.id, e)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;
    use crate::tools::source::{StaticConnector, StaticToolSource};
    use serde_json::json;

    fn source(id: &str, tools: &[&str]) -> Arc<StaticToolSource> {
        let mut source = StaticToolSource::new(id);
        for name in tools {
            let name = name.to_string();
            let label = format!("{}@{}", name, id);
            source = source.with_tool(ToolDescriptor::new(name, ""), move |_| Ok(json!(label.clone())));
        }
        Arc::new(source)
    }

    async fn loader_with(sources: Vec<Arc<StaticToolSource>>, registered: &[&str]) -> CatalogLoader {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        for id in registered {
            store
                .put_tool_source(&ToolSourceConfig::new(*id, *id, "http://localhost"))
                .await
                .unwrap();
        }
        let mut connector = StaticConnector::new();
        for s in sources {
            connector = connector.with_source(s);
        }
        CatalogLoader::new(store, Arc::new(connector), Duration::from_secs(1), Duration::from_secs(1))
    }

    #[test]
    fn test_catalog_new_empty() {
        let catalog = ToolCatalog::new();
        assert!(catalog.is_empty());
        assert_eq!(catalog.len(), 0);
        assert!(catalog.get("web_search").is_none());
    }

    #[tokio::test]
    async fn test_load_single_source() {
        let loader = loader_with(vec![source("web", &["search", "fetch"])], &["web"]).await;
        let catalog = loader.load(&["web".to_string()]).await.unwrap();

        let names: Vec<&str> = catalog.descriptors().iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["search", "fetch"]);
        assert_eq!(catalog.get("search").unwrap().source_id, "web");
    }

    #[tokio::test]
    async fn test_duplicate_tool_first_source_wins() {
        let loader = loader_with(vec![source("a", &["search"]), source("b", &["search", "summarize"])], &["a", "b"]).await;
        let catalog = loader.load(&["a".to_string(), "b".to_string()]).await.unwrap();

        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.invoke("search", json!({})).await.unwrap(), json!("search@a"));
    }

    #[tokio::test]
    async fn test_unregistered_source_is_unavailable() {
        let loader = loader_with(vec![source("web", &["search"])], &["web"]).await;
        let err = loader.load(&["web".to_string(), "gone".to_string()]).await.unwrap_err();
        assert_eq!(err.kind(), "CatalogUnavailable");
    }

    #[tokio::test]
    async fn test_unreachable_source_is_unavailable() {
        let loader = loader_with(vec![], &["web"]).await;
        let err = loader.load(&["web".to_string()]).await.unwrap_err();
        assert_eq!(err.kind(), "CatalogUnavailable");
    }

    #[tokio::test]
    async fn test_source_without_tools_is_unavailable() {
        let loader = loader_with(vec![source("empty", &[])], &["empty"]).await;
        let err = loader.load(&["empty".to_string()]).await.unwrap_err();
        assert!(err.to_string().contains("returned no tools"));
    }

    #[tokio::test]
    async fn test_no_sources_is_unavailable() {
        let loader = loader_with(vec![], &[]).await;
        assert!(loader.load(&[]).await.is_err());
    }

    #[tokio::test]
    async fn test_invoke_unknown_tool() {
        let catalog = ToolCatalog::new();
        assert!(catalog.invoke("missing", json!({})).await.is_err());
    }
}
