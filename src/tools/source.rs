//! Tool sources
//!
//! Defines the ToolSource trait for listing and invoking tools, the connector
//! that turns a registered source config into a live source, and an in-process
//! StaticToolSource for local use and testing.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, RoutebookError};

use super::definition::ToolDescriptor;

/// Registered connection parameters for one tool server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSourceConfig {
    pub id: String,
    pub name: String,
    pub url: String,
    /// Extra HTTP headers sent with every request (auth tokens etc.)
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl ToolSourceConfig {
    pub fn new(id: impl Into<String>, name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            url: url.into(),
            headers: BTreeMap::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Validate the fields a caller must supply
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(RoutebookError::InvalidInput("tool source id must not be empty".to_string()));
        }
        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(RoutebookError::InvalidInput(format!(
                "tool source '{}' url must be http(s): {}",
                self.id, self.url
            )));
        }
        Ok(())
    }
}

/// A live tool server
#[async_trait]
pub trait ToolSource: Send + Sync {
    /// Source identifier
    fn id(&self) -> &str;

    /// List the tools this source exposes
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>>;

    /// Invoke a tool and return its normalised output
    async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value>;
}

/// Opens live sources from registered configs
#[async_trait]
pub trait ToolSourceConnector: Send + Sync {
    async fn connect(&self, config: &ToolSourceConfig) -> Result<Arc<dyn ToolSource>>;
}

type Handler = Arc<dyn Fn(Value) -> std::result::Result<Value, String> + Send + Sync>;

/// In-process tool source backed by closures
pub struct StaticToolSource {
    id: String,
    tools: Vec<ToolDescriptor>,
    handlers: HashMap<String, Handler>,
    delays: HashMap<String, Duration>,
    calls: Mutex<Vec<(String, Value)>>,
}

impl StaticToolSource {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tools: Vec::new(),
            handlers: HashMap::new(),
            delays: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Register a tool and the closure that answers it
    pub fn with_tool<F>(mut self, descriptor: ToolDescriptor, handler: F) -> Self
    where
        F: Fn(Value) -> std::result::Result<Value, String> + Send + Sync + 'static,
    {
        let descriptor = descriptor.with_source(self.id.clone());
        self.handlers.insert(descriptor.name.clone(), Arc::new(handler));
        self.tools.push(descriptor);
        self
    }

    /// Make a tool take `delay` before answering
    pub fn with_delay(mut self, tool: impl Into<String>, delay: Duration) -> Self {
        self.delays.insert(tool.into(), delay);
        self
    }

    /// Invocations seen so far, in order
    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self, tool: &str) -> usize {
        self.calls().iter().filter(|(name, _)| name == tool).count()
    }
}

#[async_trait]
impl ToolSource for StaticToolSource {
    fn id(&self) -> &str {
        &self.id
    }

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>> {
        Ok(self.tools.clone())
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((name.to_string(), arguments.clone()));
        }

        if let Some(delay) = self.delays.get(name) {
            tokio::time::sleep(*delay).await;
        }

        let handler = self
            .handlers
            .get(name)
            .ok_or_else(|| RoutebookError::Upstream(format!("unknown tool '{}' on source '{}'", name, self.id)))?;

        handler(arguments).map_err(RoutebookError::Upstream)
    }
}

/// Connector over a fixed set of in-process sources, keyed by source id
#[derive(Default)]
pub struct StaticConnector {
    sources: HashMap<String, Arc<StaticToolSource>>,
}

impl StaticConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(mut self, source: Arc<StaticToolSource>) -> Self {
        self.sources.insert(source.id().to_string(), source);
        self
    }
}

#[async_trait]
impl ToolSourceConnector for StaticConnector {
    async fn connect(&self, config: &ToolSourceConfig) -> Result<Arc<dyn ToolSource>> {
        self.sources
            .get(&config.id)
            .map(|s| s.clone() as Arc<dyn ToolSource>)
            .ok_or_else(|| RoutebookError::CatalogUnavailable(format!("tool source '{}' is not reachable", config.id)))
    }
}
