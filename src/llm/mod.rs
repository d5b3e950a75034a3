//! LLM Client Layer - Anthropic API integration and structured output parsing
//!
//! This module provides:
//! - Message types for LLM communication
//! - LlmClient trait for API abstraction
//! - AnthropicClient implementation
//! - JSON extraction from model output

pub mod anthropic;
pub mod client;
pub mod parse;
pub mod types;

pub use anthropic::{AnthropicClient, AnthropicConfig};
pub use client::{LlmClient, MockLlmClient};
pub use parse::{extract_json, json_slice};
pub use types::{CompletionRequest, CompletionResponse, Message, Role, StopReason, Usage};
