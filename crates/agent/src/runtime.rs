use std::sync::Arc;

use nexus_core::actions::{ActionParams, ApprovalId};
use nexus_core::identity::AccessToken;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use crate::llm::{ChatMessage, LlmClient, LlmError, Role, ToolChoice};
use crate::tools::{DispatchError, ToolDispatcher, ToolOutcome};

const TRACE_RESULT_LIMIT: usize = 200;

const SYSTEM_PROMPT: &str = "You are Nexus, an assistant for a connected Klaviyo \
marketing account. You can look up account details, campaigns, lists, and segments \
directly. You can never mutate the account yourself: to create anything, stage it \
with propose_action and wait for the human to approve. Call execute_action only \
with an approval id the human has explicitly approved. Keep replies short and \
concrete.";

/// The terminal result of one orchestrated chat turn.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TurnReply {
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_required: Option<ActionRequired>,
}

/// Machine-readable approval request for the caller to render as an
/// approve/deny UI. Emitting this instead of feeding the proposal back to the
/// model is the approval boundary: the LLM never sees its own unapproved
/// proposal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ActionRequired {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub approval_id: ApprovalId,
    pub label: String,
    pub params: ActionParams,
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error("malformed arguments for tool `{tool}`: {detail}")]
    MalformedToolArguments { tool: String, detail: String },
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

/// Turn-taking orchestrator.
///
/// State machine per turn:
/// `AWAIT_LLM_DECISION -> {DIRECT_REPLY | TOOL_EXECUTION} ->
/// [PROPOSAL_SHORT_CIRCUIT | AWAIT_LLM_SUMMARY] -> DONE`.
///
/// Tool calls run sequentially in the order the model requested them; a
/// staged proposal short-circuits the remainder of the turn straight back to
/// the caller.
pub struct ChatAgent {
    llm: Arc<dyn LlmClient>,
    dispatcher: ToolDispatcher,
}

impl ChatAgent {
    pub fn new(llm: Arc<dyn LlmClient>, dispatcher: ToolDispatcher) -> Self {
        Self { llm, dispatcher }
    }

    /// Runs one chat turn. `history` is owned by the caller and mutated in
    /// place; the upstream token is threaded through every downstream call
    /// and goes out of scope with the turn.
    pub async fn run_chat_turn(
        &self,
        user_message: &str,
        history: &mut Vec<ChatMessage>,
        token: &AccessToken,
    ) -> Result<TurnReply, AgentError> {
        if history.is_empty() {
            history.push(ChatMessage::system(SYSTEM_PROMPT));
        }
        history.push(ChatMessage::user(user_message));

        let descriptors = ToolDispatcher::descriptors();
        let decision = self.llm.chat(history, &descriptors, ToolChoice::Auto).await?;

        if decision.tool_calls.is_empty() {
            debug!(event_name = "agent.turn.direct_reply", "model replied without tools");
            return Ok(TurnReply {
                role: Role::Assistant,
                content: decision.content.unwrap_or_default(),
                trace: None,
                action_required: None,
            });
        }

        let mut trace = Vec::new();
        history.push(ChatMessage::assistant_intent(
            decision.content.clone(),
            decision.tool_calls.clone(),
        ));

        for tool_call in &decision.tool_calls {
            let name = &tool_call.function.name;
            let args = parse_tool_arguments(name, &tool_call.function.arguments)?;
            trace.push(format!("> Tool Call: {name}({args})"));

            match self.dispatcher.dispatch(token, name, &args).await? {
                ToolOutcome::Proposal(signal) => {
                    trace.push(format!(
                        "> Result: proposed {} ({})",
                        signal.action_type.as_str(),
                        signal.approval_id
                    ));
                    info!(
                        event_name = "agent.turn.proposal_short_circuit",
                        approval_id = %signal.approval_id,
                        "returning proposal to caller for approval"
                    );
                    return Ok(TurnReply {
                        role: Role::Assistant,
                        content: format!(
                            "I prepared a draft action for your approval:\n{}",
                            signal.description
                        ),
                        trace: Some(trace),
                        action_required: Some(ActionRequired {
                            kind: "approval",
                            approval_id: signal.approval_id,
                            label: signal.description,
                            params: signal.params,
                        }),
                    });
                }
                ToolOutcome::Text(text) => {
                    trace.push(format!("> Result: {}", truncate_for_trace(&text)));
                    history.push(ChatMessage::tool(&tool_call.id, text));
                }
            }
        }

        let summary = self.llm.chat(history, &[], ToolChoice::None).await?;
        info!(
            event_name = "agent.turn.done",
            tool_calls = decision.tool_calls.len(),
            "turn summarized"
        );

        Ok(TurnReply {
            role: Role::Assistant,
            content: summary.content.unwrap_or_default(),
            trace: Some(trace),
            action_required: None,
        })
    }
}

/// A malformed argument payload is a hard per-call error: the model produced
/// something that is not JSON, and there is no safe in-band recovery.
fn parse_tool_arguments(tool: &str, raw: &str) -> Result<Value, AgentError> {
    if raw.trim().is_empty() {
        return Ok(Value::Object(serde_json::Map::new()));
    }
    serde_json::from_str(raw).map_err(|error| AgentError::MalformedToolArguments {
        tool: tool.to_string(),
        detail: error.to_string(),
    })
}

fn truncate_for_trace(text: &str) -> String {
    if text.chars().count() <= TRACE_RESULT_LIMIT {
        return text.to_string();
    }
    let truncated = text.chars().take(TRACE_RESULT_LIMIT).collect::<String>();
    format!("{truncated}…")
}
