//! Routebook - learned tool routes over MCP servers
//!
//! A bundle is planned once from a description into routes: ordered tool
//! calls against the bundle's tool sources. Requests against the bundle are
//! matched to a stored route, or planned into a new one that is kept for
//! next time.

pub mod api;
pub mod capability;
pub mod config;
pub mod deadline;
pub mod domain;
pub mod error;
pub mod executor;
pub mod id;
pub mod llm;
pub mod matcher;
pub mod planner;
pub mod service;
pub mod store;
pub mod tools;

pub use error::{Result, RoutebookError};
