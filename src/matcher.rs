//! Route matcher
//!
//! Decides whether a request is answered by a stored route. A route whose
//! trigger is the request itself (ignoring case and spacing) wins outright.
//! Otherwise the capability judges intent; judgments for unknown routes or
//! under the confidence floor are dropped. Among the rest the highest
//! confidence wins, then the newest route, then the greatest id.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::capability::Capability;
use crate::deadline::with_deadline;
use crate::domain::{Bundle, Route};
use crate::error::Result;

#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    Matched { route: Route, confidence: f64 },
    NoMatch,
}

pub struct RouteMatcher {
    capability: Arc<dyn Capability>,
    min_confidence: f64,
    llm_timeout: Duration,
}

impl RouteMatcher {
    pub fn new(capability: Arc<dyn Capability>, min_confidence: f64, llm_timeout: Duration) -> Self {
        Self {
            capability,
            min_confidence,
            llm_timeout,
        }
    }

    pub async fn match_request(&self, request: &str, bundle: &Bundle, routes: &[Route]) -> Result<MatchOutcome> {
        if routes.is_empty() {
            return Ok(MatchOutcome::NoMatch);
        }

        let wanted = normalize(request);
        if let Some(route) = routes
            .iter()
            .filter(|r| normalize(&r.trigger) == wanted)
            .max_by(|a, b| recency(a, b))
        {
            log::debug!("Request matched route {} by trigger", route.id);
            return Ok(MatchOutcome::Matched {
                route: route.clone(),
                confidence: 1.0,
            });
        }

        let judgments = with_deadline("matcher", self.llm_timeout, self.capability.judge(request, bundle, routes)).await?;

        let by_id: HashMap<&str, &Route> = routes.iter().map(|r| (r.id.as_str(), r)).collect();
        let mut best: HashMap<&str, f64> = HashMap::new();
        for judgment in &judgments {
            let Some(route) = by_id.get(judgment.route_id.as_str()) else {
                log::warn!("Matcher judged unknown route '{}'; ignoring", judgment.route_id);
                continue;
            };
            if !judgment.confidence.is_finite() || judgment.confidence < self.min_confidence {
                continue;
            }
            let confidence = judgment.confidence.min(1.0);
            let entry = best.entry(route.id.as_str()).or_insert(confidence);
            if confidence > *entry {
                *entry = confidence;
            }
        }

        let winner = best.into_iter().max_by(|(a_id, a_conf), (b_id, b_conf)| {
            a_conf
                .partial_cmp(b_conf)
                .unwrap_or(Ordering::Equal)
                .then_with(|| recency(by_id[a_id], by_id[b_id]))
        });

        Ok(match winner {
            Some((id, confidence)) => {
                log::debug!("Request matched route {} with confidence {:.2}", id, confidence);
                MatchOutcome::Matched {
                    route: by_id[id].clone(),
                    confidence,
                }
            }
            None => MatchOutcome::NoMatch,
        })
    }
}

/// Newer routes order greater; equal timestamps fall back to id
fn recency(a: &Route, b: &Route) -> Ordering {
    a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id))
}

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}
