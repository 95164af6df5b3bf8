//! Agent Runtime - the LLM tool-calling loop and approval gate
//!
//! This crate provides the "brain" of the nexus system - the turn-taking loop
//! that:
//! - Sends the running history plus tool schemas to the LLM (`llm`)
//! - Validates and dispatches requested tool calls (`tools`)
//! - Short-circuits staged proposals back to the human (`runtime`)
//! - Feeds plain tool results back for a natural-language summary
//!
//! # Key Types
//!
//! - `ChatAgent` - Main orchestrator (see `runtime` module)
//! - `LlmClient` - Pluggable trait; `OpenAiClient` covers OpenAI-compatible
//!   providers
//! - `ToolDispatcher` - The closed capability set offered to the model
//!
//! # Safety Principle
//!
//! The LLM never mutates the upstream account directly. Mutations are staged
//! through `propose_action` and executed only after explicit human approval;
//! a staged proposal is returned to the caller and never shown back to the
//! model.

pub mod llm;
pub mod runtime;
#[cfg(test)]
mod testing;
pub mod tools;

pub use llm::{
    ChatMessage, FunctionCall, LlmClient, LlmError, LlmReply, OpenAiClient, Role, ToolCallEnvelope,
    ToolChoice, ToolDescriptor,
};
pub use runtime::{ActionRequired, AgentError, ChatAgent, TurnReply};
pub use tools::{DispatchError, ProposalSignal, ToolDispatcher, ToolOutcome};
