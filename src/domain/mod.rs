//! Domain types for Routebook
//!
//! This module contains all core domain types:
//! - Bundle: a project-scoped collection of routes over a fixed set of tool sources
//! - Route: a persisted, ordered plan of tool-invocation steps for one intent
//! - Step: one tool invocation inside a route
//! - ExecutionResult: what running a route produced

pub mod bundle;
pub mod outcome;
pub mod route;

pub use bundle::Bundle;
pub use outcome::ExecutionResult;
pub use route::{Provenance, Route, Step};
