//! Capability that replays queued answers, for tests and offline demos

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::domain::{Bundle, Route};
use crate::error::{Result, RoutebookError};
use crate::tools::ToolDescriptor;

use super::{Capability, Judgment, PlanOutcome, PlanScope, PlannedTask};

/// Replays scripted plans and judgments in order.
///
/// An exhausted plan queue is an upstream failure; an exhausted judgment
/// queue answers with no judgments, which the matcher reads as no match.
#[derive(Debug, Default)]
pub struct ScriptedCapability {
    plans: Mutex<VecDeque<Result<PlanOutcome>>>,
    judgments: Mutex<VecDeque<Result<Vec<Judgment>>>>,
    plan_calls: Mutex<Vec<(String, PlanScope)>>,
    judge_calls: Mutex<Vec<String>>,
}

impl ScriptedCapability {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful plan
    pub fn with_plan(self, tasks: Vec<PlannedTask>) -> Self {
        self.push_plan(Ok(PlanOutcome::Planned(tasks)));
        self
    }

    /// Queue an "unplannable" answer
    pub fn with_unplannable(self, reason: impl Into<String>) -> Self {
        self.push_plan(Ok(PlanOutcome::Unplannable(reason.into())));
        self
    }

    /// Queue a planning error
    pub fn with_plan_error(self, error: RoutebookError) -> Self {
        self.push_plan(Err(error));
        self
    }

    /// Queue a set of judgments
    pub fn with_judgments(self, judgments: Vec<Judgment>) -> Self {
        if let Ok(mut queue) = self.judgments.lock() {
            queue.push_back(Ok(judgments));
        }
        self
    }

    /// Queue a judging error
    pub fn with_judge_error(self, error: RoutebookError) -> Self {
        if let Ok(mut queue) = self.judgments.lock() {
            queue.push_back(Err(error));
        }
        self
    }

    fn push_plan(&self, outcome: Result<PlanOutcome>) {
        if let Ok(mut queue) = self.plans.lock() {
            queue.push_back(outcome);
        }
    }

    /// Texts and scopes passed to `plan`, in order
    pub fn plan_calls(&self) -> Vec<(String, PlanScope)> {
        self.plan_calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Requests passed to `judge`, in order
    pub fn judge_calls(&self) -> Vec<String> {
        self.judge_calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Capability for ScriptedCapability {
    async fn plan(&self, text: &str, _tools: &[ToolDescriptor], scope: PlanScope) -> Result<PlanOutcome> {
        if let Ok(mut calls) = self.plan_calls.lock() {
            calls.push((text.to_string(), scope));
        }
        self.plans
            .lock()
            .ok()
            .and_then(|mut queue| queue.pop_front())
            .unwrap_or_else(|| Err(RoutebookError::Upstream("no scripted plan left".to_string())))
    }

    async fn judge(&self, request: &str, _bundle: &Bundle, _routes: &[Route]) -> Result<Vec<Judgment>> {
        if let Ok(mut calls) = self.judge_calls.lock() {
            calls.push(request.to_string());
        }
        self.judgments
            .lock()
            .ok()
            .and_then(|mut queue| queue.pop_front())
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_plans_replay_in_order() {
        let capability = ScriptedCapability::new()
            .with_plan(vec![PlannedTask::new("search for X", vec![])])
            .with_unplannable("no tool can send email");

        let first = capability.plan("a", &[], PlanScope::Bundle).await.unwrap();
        let second = capability.plan("b", &[], PlanScope::SingleTask).await.unwrap();

        assert!(matches!(first, PlanOutcome::Planned(ref tasks) if tasks.len() == 1));
        assert_eq!(second, PlanOutcome::Unplannable("no tool can send email".to_string()));
        assert_eq!(
            capability.plan_calls(),
            vec![("a".to_string(), PlanScope::Bundle), ("b".to_string(), PlanScope::SingleTask)]
        );
    }

    #[tokio::test]
    async fn test_exhausted_plans_fail() {
        let capability = ScriptedCapability::new();
        let err = capability.plan("x", &[], PlanScope::Bundle).await.unwrap_err();
        assert_eq!(err.kind(), "Upstream");
    }

    #[tokio::test]
    async fn test_exhausted_judgments_are_empty() {
        let capability = ScriptedCapability::new().with_judgments(vec![Judgment::new("rt-1", 0.9)]);
        let bundle = Bundle::new("p1", vec!["web".to_string()], "d");

        assert_eq!(capability.judge("q", &bundle, &[]).await.unwrap().len(), 1);
        assert!(capability.judge("q", &bundle, &[]).await.unwrap().is_empty());
        assert_eq!(capability.judge_calls().len(), 2);
    }
}
