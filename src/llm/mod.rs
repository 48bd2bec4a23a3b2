//! LLM integration module.
//!
//! Provides the Messages-API gateway used for generation and judging and
//! the prompts the judge and config generator are given.

mod client;
mod prompts;

pub use client::{
    extract_json, ContentBlock, GatewayRequest, LlmClient, Message, MessageContent, ModelGateway,
    Role,
};
pub use prompts::Prompts;
