//! Request execution
//!
//! received -> resolved -> (route-learned) -> executed. A request that no
//! stored route answers is planned as a single task, and the new route is
//! written before it runs so the reported `route_used` always names a stored
//! route. If that write fails the execution fails with it.

use std::sync::Arc;

use crate::capability::Capability;
use crate::deadline::with_deadline;
use crate::domain::{ExecutionResult, Route};
use crate::error::{Result, RoutebookError};
use crate::executor::{CancelSignal, RouteExecutor};
use crate::matcher::{MatchOutcome, RouteMatcher};
use crate::planner::RoutePlanner;
use crate::store::RouteStore;
use crate::tools::{CatalogLoader, ToolCatalog, ToolSourceConnector};

use super::{ExecutionStage, ServiceConfig};

pub struct ExecutionService {
    store: Arc<dyn RouteStore>,
    catalog: CatalogLoader,
    planner: RoutePlanner,
    matcher: RouteMatcher,
    executor: RouteExecutor,
    config: ServiceConfig,
}

impl ExecutionService {
    pub fn new(
        store: Arc<dyn RouteStore>,
        connector: Arc<dyn ToolSourceConnector>,
        capability: Arc<dyn Capability>,
        config: ServiceConfig,
    ) -> Self {
        Self {
            catalog: CatalogLoader::new(store.clone(), connector, config.catalog_timeout, config.store_timeout),
            planner: RoutePlanner::new(capability.clone(), config.llm_timeout),
            matcher: RouteMatcher::new(capability, config.min_confidence, config.llm_timeout),
            executor: RouteExecutor::new(config.tool_timeout),
            store,
            config,
        }
    }

    /// Answer `request` with a route of bundle `bundle_id`
    pub async fn execute(&self, bundle_id: &str, request: &str, cancel: &CancelSignal) -> Result<ExecutionResult> {
        let bundle_id = bundle_id.trim();
        let request = request.trim();
        if bundle_id.is_empty() {
            return Err(RoutebookError::InvalidInput("bundle_id must not be empty".to_string()));
        }
        if request.is_empty() {
            return Err(RoutebookError::InvalidInput("request must not be empty".to_string()));
        }

        let bundle = with_deadline("store read bundle", self.config.store_timeout, self.store.get_bundle(bundle_id))
            .await?
            .ok_or_else(|| RoutebookError::BundleNotFound(bundle_id.to_string()))?;
        let routes = with_deadline(
            "store list routes",
            self.config.store_timeout,
            self.store.list_routes(&bundle.id),
        )
        .await?;
        let catalog = self.catalog.load(&bundle.tool_source_ids).await?;
        log::debug!(
            "Execution on {}: {} ({} routes, {} tools)",
            bundle.id,
            ExecutionStage::Received,
            routes.len(),
            catalog.len()
        );

        let outcome = self.matcher.match_request(request, &bundle, &routes).await?;
        log::debug!("Execution on {}: {}", bundle.id, ExecutionStage::Resolved);

        let (route, learned) = match outcome {
            MatchOutcome::Matched { route, confidence } => {
                log::debug!("Using route {} (confidence {:.2})", route.id, confidence);
                (route, false)
            }
            MatchOutcome::NoMatch => (self.learn_route(&bundle.id, request, &catalog, &routes).await?, true),
        };

        let result = self.executor.execute(&route, &catalog, request, cancel).await?;
        log::debug!("Execution on {}: {} via {}", bundle.id, ExecutionStage::Executed, route.id);

        Ok(if learned { result.learned() } else { result })
    }

    async fn learn_route(
        &self,
        bundle_id: &str,
        request: &str,
        catalog: &ToolCatalog,
        existing: &[Route],
    ) -> Result<Route> {
        let position = existing.iter().map(|r| r.position + 1).max().unwrap_or(0);
        let route = self.planner.plan_single(bundle_id, request, catalog, position).await?;

        match with_deadline("store write route", self.config.store_timeout, self.store.insert_route(&route)).await {
            Ok(()) => {}
            Err(RoutebookError::UpstreamTimeout(op)) => return Err(RoutebookError::UpstreamTimeout(op)),
            Err(RoutebookError::StoreWriteFailed(msg)) => return Err(RoutebookError::StoreWriteFailed(msg)),
            Err(e) => return Err(RoutebookError::StoreWriteFailed(e.to_string())),
        }

        log::debug!("Execution on {}: {}", bundle_id, ExecutionStage::RouteLearned);
        log::info!("Learned route {} for bundle {}: '{}'", route.id, bundle_id, route.trigger);
        Ok(route)
    }
}
