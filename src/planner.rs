//! Route planner
//!
//! Turns text into routes through the capability, then holds every produced
//! step to the catalog it was planned against: the tool must exist, arguments
//! must be an object carrying all required fields, and bindings may only look
//! backwards. A plan that fails any check is rejected whole.

use std::sync::Arc;
use std::time::Duration;

use crate::capability::{Capability, PlanOutcome, PlanScope, PlannedTask};
use crate::deadline::with_deadline;
use crate::domain::Route;
use crate::error::{Result, RoutebookError};
use crate::executor::bindings;
use crate::tools::{ToolCatalog, ToolDescriptor};

/// A route together with the task it was planned for
#[derive(Debug, Clone)]
pub struct PlannedRoute {
    pub task_description: String,
    pub route: Route,
}

pub struct RoutePlanner {
    capability: Arc<dyn Capability>,
    llm_timeout: Duration,
}

impl RoutePlanner {
    pub fn new(capability: Arc<dyn Capability>, llm_timeout: Duration) -> Self {
        Self {
            capability,
            llm_timeout,
        }
    }

    /// Decompose a bundle description into one route per task
    pub async fn plan(&self, bundle_id: &str, description: &str, catalog: &ToolCatalog) -> Result<Vec<PlannedRoute>> {
        let tasks = match self.ask(description, catalog, PlanScope::Bundle).await? {
            PlanOutcome::Planned(tasks) => tasks,
            PlanOutcome::Unplannable(reason) => return Err(RoutebookError::UnplannableDescription(reason)),
        };

        let mut planned = Vec::with_capacity(tasks.len());
        for (i, task) in tasks.into_iter().enumerate() {
            validate_task(&task, catalog)
                .map_err(|reason| RoutebookError::UnplannableDescription(format!("task {}: {}", i + 1, reason)))?;

            let route = Route::planned(bundle_id, task.description.trim(), task.steps, i as u32).with_notes(task.notes);
            planned.push(PlannedRoute {
                task_description: task.description,
                route,
            });
        }

        log::debug!("Planned {} routes for bundle {}", planned.len(), bundle_id);
        Ok(planned)
    }

    /// Plan the whole request as a single on-demand route
    ///
    /// The route's trigger is the request text itself so that the same
    /// request later matches it directly.
    pub async fn plan_single(
        &self,
        bundle_id: &str,
        request: &str,
        catalog: &ToolCatalog,
        position: u32,
    ) -> Result<Route> {
        let mut tasks = match self.ask(request, catalog, PlanScope::SingleTask).await? {
            PlanOutcome::Planned(tasks) => tasks,
            PlanOutcome::Unplannable(reason) => return Err(RoutebookError::UnplannableRequest(reason)),
        };

        if tasks.len() != 1 {
            return Err(RoutebookError::UnplannableRequest(format!(
                "expected exactly one task, planner produced {}",
                tasks.len()
            )));
        }
        let task = tasks.remove(0);
        validate_task(&task, catalog).map_err(RoutebookError::UnplannableRequest)?;

        let notes = if task.notes.is_empty() {
            task.description
        } else {
            task.notes
        };
        Ok(Route::on_demand(bundle_id, request.trim(), task.steps, position).with_notes(notes))
    }

    async fn ask(&self, text: &str, catalog: &ToolCatalog, scope: PlanScope) -> Result<PlanOutcome> {
        let tools: Vec<ToolDescriptor> = catalog.descriptors().into_iter().cloned().collect();
        with_deadline("planner", self.llm_timeout, self.capability.plan(text, &tools, scope)).await
    }
}

fn validate_task(task: &PlannedTask, catalog: &ToolCatalog) -> std::result::Result<(), String> {
    if task.description.trim().is_empty() {
        return Err("task has no description".to_string());
    }
    if task.steps.is_empty() {
        return Err(format!("'{}' has no steps", task.description));
    }

    for (i, step) in task.steps.iter().enumerate() {
        let step_number = i + 1;
        let descriptor = catalog
            .get(&step.tool)
            .ok_or_else(|| format!("step {} uses unknown tool '{}'", step_number, step.tool))?;

        if !step.arguments.is_object() {
            return Err(format!("step {} arguments must be a JSON object", step_number));
        }

        let missing = descriptor.missing_fields(&step.arguments);
        if !missing.is_empty() {
            return Err(format!(
                "step {} ({}) missing required field(s): {}",
                step_number,
                step.tool,
                missing.join(", ")
            ));
        }

        bindings::validate(&step.arguments, step_number).map_err(|e| format!("step {}: {}", step_number, e))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::ScriptedCapability;
    use crate::domain::{Provenance, Step};
    use crate::tools::{StaticToolSource, ToolSource};
    use serde_json::json;

    async fn catalog() -> ToolCatalog {
        let source = Arc::new(
            StaticToolSource::new("web-search")
                .with_tool(
                    ToolDescriptor::new("web_search", "Search the web").with_schema(json!({
                        "type": "object",
                        "properties": {"query": {"type": "string"}},
                        "required": ["query"]
                    })),
                    |_| Ok(json!([])),
                )
                .with_tool(ToolDescriptor::new("summarize", "Summarize text"), |_| Ok(json!(""))),
        );
        let mut catalog = ToolCatalog::new();
        let tools = source.list_tools().await.unwrap();
        catalog.add_source(source, tools);
        catalog
    }

    fn search_task() -> PlannedTask {
        PlannedTask::new("search for X", vec![Step::new("web_search", json!({"query": "X"}))])
    }

    fn summarize_task() -> PlannedTask {
        PlannedTask::new(
            "summarize the result",
            vec![
                Step::new("web_search", json!({"query": "{{input}}"})),
                Step::new("summarize", json!({"text": "{{steps.1}}"})),
            ],
        )
        .with_notes("reads search output")
    }

    fn planner(capability: ScriptedCapability) -> RoutePlanner {
        RoutePlanner::new(Arc::new(capability), Duration::from_secs(1))
    }

    #[tokio::test]
    async fn test_plan_two_tasks() {
        let planner = planner(ScriptedCapability::new().with_plan(vec![search_task(), summarize_task()]));

        let planned = planner
            .plan("bnd-1", "search for X and summarize it", &catalog().await)
            .await
            .unwrap();

        assert_eq!(planned.len(), 2);
        assert_eq!(planned[0].task_description, "search for X");
        assert_eq!(planned[0].route.position, 0);
        assert_eq!(planned[1].route.position, 1);
        assert_eq!(planned[1].route.notes, "reads search output");
        assert!(planned.iter().all(|p| p.route.provenance == Provenance::Planned));
        assert!(planned.iter().all(|p| p.route.bundle_id == "bnd-1"));
    }

    #[tokio::test]
    async fn test_plan_unplannable() {
        let planner = planner(ScriptedCapability::new().with_unplannable("no email tool"));
        let err = planner.plan("bnd-1", "email Bob", &catalog().await).await.unwrap_err();
        assert_eq!(err.kind(), "UnplannableDescription");
    }

    #[tokio::test]
    async fn test_plan_rejects_unknown_tool() {
        let task = PlannedTask::new("send it", vec![Step::new("send_email", json!({}))]);
        let planner = planner(ScriptedCapability::new().with_plan(vec![search_task(), task]));

        let err = planner.plan("bnd-1", "d", &catalog().await).await.unwrap_err();

        assert_eq!(err.kind(), "UnplannableDescription");
        assert!(err.to_string().contains("task 2: step 1 uses unknown tool 'send_email'"));
    }

    #[tokio::test]
    async fn test_plan_rejects_missing_required_field() {
        let task = PlannedTask::new("search", vec![Step::new("web_search", json!({"limit": 3}))]);
        let planner = planner(ScriptedCapability::new().with_plan(vec![task]));
        let err = planner.plan("bnd-1", "d", &catalog().await).await.unwrap_err();
        assert!(err.to_string().contains("missing required field(s): query"));
    }

    #[tokio::test]
    async fn test_plan_rejects_forward_reference() {
        let task = PlannedTask::new(
            "bad order",
            vec![
                Step::new("summarize", json!({"text": "{{steps.2}}"})),
                Step::new("web_search", json!({"query": "X"})),
            ],
        );
        let planner = planner(ScriptedCapability::new().with_plan(vec![task]));
        let err = planner.plan("bnd-1", "d", &catalog().await).await.unwrap_err();
        assert!(err.to_string().contains("only earlier steps"));
    }

    #[tokio::test]
    async fn test_plan_rejects_empty_steps_and_non_object_arguments() {
        let empty = PlannedTask::new("nothing", vec![]);
        let planner_a = planner(ScriptedCapability::new().with_plan(vec![empty]));
        assert!(planner_a.plan("b", "d", &catalog().await).await.is_err());

        let scalar = PlannedTask::new("x", vec![Step::new("summarize", json!("text"))]);
        let planner_b = planner(ScriptedCapability::new().with_plan(vec![scalar]));
        let err = planner_b.plan("b", "d", &catalog().await).await.unwrap_err();
        assert!(err.to_string().contains("must be a JSON object"));
    }

    #[tokio::test]
    async fn test_plan_single_uses_request_as_trigger() {
        let capability = Arc::new(ScriptedCapability::new().with_plan(vec![summarize_task()]));
        let planner = RoutePlanner::new(capability.clone(), Duration::from_secs(1));

        let route = planner
            .plan_single("bnd-1", "  search for X and summarize it ", &catalog().await, 2)
            .await
            .unwrap();

        assert_eq!(route.trigger, "search for X and summarize it");
        assert_eq!(route.provenance, Provenance::OnDemand);
        assert_eq!(route.position, 2);
        assert_eq!(route.notes, "reads search output");
        assert_eq!(capability.plan_calls()[0].1, PlanScope::SingleTask);
    }

    #[tokio::test]
    async fn test_plan_single_rejects_multiple_tasks() {
        let planner = planner(ScriptedCapability::new().with_plan(vec![search_task(), summarize_task()]));
        let err = planner.plan_single("bnd-1", "x", &catalog().await, 0).await.unwrap_err();
        assert_eq!(err.kind(), "UnplannableRequest");
    }

    #[tokio::test]
    async fn test_plan_single_unplannable_kind() {
        let planner = planner(ScriptedCapability::new().with_unplannable("nothing fits"));
        let err = planner.plan_single("bnd-1", "x", &catalog().await, 0).await.unwrap_err();
        assert_eq!(err.kind(), "UnplannableRequest");
    }

    #[tokio::test]
    async fn test_plan_capability_error_propagates() {
        let planner =
            planner(ScriptedCapability::new().with_plan_error(RoutebookError::UpstreamTimeout("llm".to_string())));
        let err = planner.plan("bnd-1", "d", &catalog().await).await.unwrap_err();
        assert_eq!(err.kind(), "UpstreamTimeout");
    }
}
