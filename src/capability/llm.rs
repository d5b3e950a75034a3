//! LLM-backed capability
//!
//! Prompts the model for a JSON answer and extracts it from the reply. The
//! model never sees raw store rows, only tool signatures and route triggers.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::domain::{Bundle, Route, Step};
use crate::error::Result;
use crate::llm::{CompletionRequest, LlmClient, extract_json};
use crate::tools::ToolDescriptor;

use super::{Capability, Judgment, PlanOutcome, PlanScope, PlannedTask};

const PLAN_SYSTEM: &str = r#"You are a task planning agent. You turn a natural-language description into routes: ordered sequences of tool calls over the tools listed by the user.

Answer with one JSON object and nothing else, in exactly one of these shapes:

{"tasks": [{"description": "<short trigger phrase>", "notes": "<optional>", "steps": [{"tool": "<tool name>", "arguments": {...}, "rationale": "<why this step>"}]}]}

{"unplannable": "<why the available tools cannot cover the description>"}

Rules:
- Use only tool names from the list. Supply every required parameter.
- Argument strings may reference "{{input}}" (the request text at execution time), "{{steps.N}}" (output of step N, 1-based, of the same task), or "{{steps.N.field}}" (a field of that output).
- A step may only reference steps that come before it.
- Each task must be executable on its own."#;

const JUDGE_SYSTEM: &str = r#"You are a route matcher. Given a user request and a list of stored routes, decide which routes answer the same intent as the request. Wording may differ; intent must not.

Answer with one JSON object and nothing else:

{"matches": [{"route_id": "<id>", "confidence": <number between 0 and 1>}]}

List only routes you judge equivalent. Return {"matches": []} when none fit."#;

#[derive(Debug, Deserialize)]
struct PlanReply {
    #[serde(default)]
    tasks: Vec<TaskReply>,
    #[serde(default)]
    unplannable: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TaskReply {
    description: String,
    #[serde(default)]
    notes: String,
    #[serde(default)]
    steps: Vec<Step>,
}

#[derive(Debug, Deserialize)]
struct JudgeReply {
    #[serde(default)]
    matches: Vec<Judgment>,
}

pub struct LlmCapability {
    llm: Arc<dyn LlmClient>,
}

impl LlmCapability {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    fn plan_prompt(text: &str, tools: &[ToolDescriptor], scope: PlanScope) -> String {
        let tool_lines = tools
            .iter()
            .map(|t| format!("- {}({}): {}", t.name, t.parameter_summary(), t.description))
            .collect::<Vec<_>>()
            .join("\n");

        let instruction = match scope {
            PlanScope::Bundle => {
                "Split this description into the minimal number of independently executable tasks and plan a route for each"
            }
            PlanScope::SingleTask => "Treat this request as exactly one task and plan a single route for it",
        };

        format!(
            "Available tools:\n{}\n\n{}:\n\"{}\"",
            tool_lines, instruction, text
        )
    }

    fn judge_prompt(request: &str, bundle: &Bundle, routes: &[Route]) -> String {
        let route_lines = routes
            .iter()
            .map(|r| {
                format!(
                    "- ID: {} | trigger: {} | tools: {}",
                    r.id,
                    r.trigger,
                    r.tool_names().join(", ")
                )
            })
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            "Bundle description: {}\n\nStored routes:\n{}\n\nUser request: \"{}\"",
            bundle.description, route_lines, request
        )
    }
}

#[async_trait]
impl Capability for LlmCapability {
    async fn plan(&self, text: &str, tools: &[ToolDescriptor], scope: PlanScope) -> Result<PlanOutcome> {
        let request = CompletionRequest::new(PLAN_SYSTEM).with_user_message(Self::plan_prompt(text, tools, scope));
        let response = self.llm.complete(request).await?;

        let reply: PlanReply = match extract_json(&response.content) {
            Ok(reply) => reply,
            Err(e) => {
                log::warn!("Planner output could not be parsed: {}", e);
                return Ok(PlanOutcome::Unplannable(format!("planner output could not be parsed: {}", e)));
            }
        };

        if let Some(reason) = reply.unplannable {
            return Ok(PlanOutcome::Unplannable(reason));
        }
        if reply.tasks.is_empty() {
            return Ok(PlanOutcome::Unplannable("planner produced no tasks".to_string()));
        }

        Ok(PlanOutcome::Planned(
            reply
                .tasks
                .into_iter()
                .map(|t| PlannedTask::new(t.description, t.steps).with_notes(t.notes))
                .collect(),
        ))
    }

    async fn judge(&self, request: &str, bundle: &Bundle, routes: &[Route]) -> Result<Vec<Judgment>> {
        let prompt = CompletionRequest::new(JUDGE_SYSTEM)
            .with_user_message(Self::judge_prompt(request, bundle, routes))
            .with_max_tokens(1024);
        let response = self.llm.complete(prompt).await?;

        let reply: JudgeReply = extract_json(&response.content)?;
        Ok(reply.matches)
    }
}
