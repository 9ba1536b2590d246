//! LLM integration module.
//!
//! Provides the chat completion client (OpenAI-compatible and Azure
//! conventions), the prompts used for answering and judging, and lenient
//! JSON extraction from model output.

mod client;
pub mod json;
mod prompts;

pub use client::{ChatBackend, LlmClient, LlmResponse, Message, Role};
pub use prompts::{Prompts, render};
