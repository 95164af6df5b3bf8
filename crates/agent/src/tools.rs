use std::sync::Arc;

use nexus_core::actions::{ActionParams, ActionType, ApprovalId};
use nexus_core::config::{ApprovalsConfig, CampaignConfig};
use nexus_core::execution::ActionExecutor;
use nexus_core::identity::{AccessToken, IdentityKey};
use nexus_core::marketing::MarketingApi;
use nexus_core::store::{IdentityContextStore, PendingActionStore};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{info, warn};

use crate::llm::ToolDescriptor;

pub const INVALID_APPROVAL_TEXT: &str = "Error: invalid or expired approval id.";

/// Typed dispatch result. The orchestrator branches on the variant tag; a
/// tool that legitimately returns JSON-shaped prose stays `Text` and is never
/// mistaken for a proposal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ToolOutcome {
    Text(String),
    Proposal(ProposalSignal),
}

/// Structured signal minted by `propose_action`. Surfaced straight to the
/// caller for approval rendering, never fed back to the LLM.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProposalSignal {
    pub approval_id: ApprovalId,
    pub action_type: ActionType,
    pub description: String,
    pub params: ActionParams,
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("unknown tool `{0}`")]
    UnknownTool(String),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct NoArgs {}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ProposeActionArgs {
    action_type: String,
    #[serde(default)]
    parameters: Value,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ExecuteActionArgs {
    approval_id: String,
    #[serde(default)]
    list_name: Option<String>,
    #[serde(default)]
    list_id: Option<String>,
    #[serde(default)]
    campaign_name: Option<String>,
    #[serde(default)]
    subject: Option<String>,
    #[serde(default)]
    preview_text: Option<String>,
}

/// The closed set of capabilities the LLM may invoke, mapped onto the
/// adapter (reads), the proposal store (`propose_action`), and the executor
/// (`execute_action`). Argument payloads are validated strictly; validation
/// failures are returned as ordinary text results so the model can react
/// in-band.
pub struct ToolDispatcher {
    api: Arc<dyn MarketingApi>,
    executor: ActionExecutor,
    proposals: Arc<dyn PendingActionStore>,
    identity: Arc<dyn IdentityContextStore>,
    campaign: CampaignConfig,
    approvals: ApprovalsConfig,
}

impl ToolDispatcher {
    pub fn new(
        api: Arc<dyn MarketingApi>,
        proposals: Arc<dyn PendingActionStore>,
        identity: Arc<dyn IdentityContextStore>,
        campaign: CampaignConfig,
        approvals: ApprovalsConfig,
    ) -> Self {
        let executor = ActionExecutor::new(api.clone());
        Self { api, executor, proposals, identity, campaign, approvals }
    }

    pub fn descriptors() -> Vec<ToolDescriptor> {
        vec![
            ToolDescriptor {
                name: "get_account_details",
                description: "Get details of the connected Klaviyo account (ID, organization name).",
                parameters: empty_object_schema(),
            },
            ToolDescriptor {
                name: "get_campaigns",
                description: "Fetch email marketing campaigns with their IDs and status.",
                parameters: empty_object_schema(),
            },
            ToolDescriptor {
                name: "get_lists",
                description: "Fetch existing subscriber lists with their IDs and profile counts.",
                parameters: empty_object_schema(),
            },
            ToolDescriptor {
                name: "get_segments",
                description: "Fetch available segments with their IDs and profile counts.",
                parameters: empty_object_schema(),
            },
            ToolDescriptor {
                name: "propose_action",
                description: "Stage a mutating action (create_list, create_vip_audience, or \
                              create_campaign_draft) for human approval. Never executes anything.",
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "action_type": {
                            "type": "string",
                            "enum": ["create_list", "create_vip_audience", "create_campaign_draft"],
                            "description": "Which action to stage."
                        },
                        "parameters": {
                            "type": "object",
                            "description": "Type-specific parameters, e.g. list_name for create_list."
                        }
                    },
                    "required": ["action_type"],
                    "additionalProperties": false
                }),
            },
            ToolDescriptor {
                name: "execute_action",
                description: "Execute a previously approved action by its approval id. Only call \
                              this after the user has explicitly approved.",
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "approval_id": { "type": "string" },
                        "list_name": { "type": "string" },
                        "list_id": { "type": "string" },
                        "campaign_name": { "type": "string" },
                        "subject": { "type": "string" },
                        "preview_text": { "type": "string" }
                    },
                    "required": ["approval_id"],
                    "additionalProperties": false
                }),
            },
        ]
    }

    pub async fn dispatch(
        &self,
        token: &AccessToken,
        name: &str,
        args: &Value,
    ) -> Result<ToolOutcome, DispatchError> {
        match name {
            "get_account_details" => Ok(self.read(token, name, args, Reader::Account).await),
            "get_campaigns" => Ok(self.read(token, name, args, Reader::Campaigns).await),
            "get_lists" => Ok(self.read(token, name, args, Reader::Lists).await),
            "get_segments" => Ok(self.read(token, name, args, Reader::Segments).await),
            "propose_action" => Ok(self.propose_action(token, args)),
            "execute_action" => Ok(self.execute_action(token, args).await),
            other => Err(DispatchError::UnknownTool(other.to_string())),
        }
    }

    async fn read(&self, token: &AccessToken, name: &str, args: &Value, reader: Reader) -> ToolOutcome {
        if let Err(text) = parse_args::<NoArgs>(name, args) {
            return ToolOutcome::Text(text);
        }

        let result = match reader {
            Reader::Account => self.api.account_details(token).await,
            Reader::Campaigns => self.api.campaigns(token).await,
            Reader::Lists => self.api.lists(token).await,
            Reader::Segments => self.api.segments(token).await,
        };

        match result {
            Ok(summary) => ToolOutcome::Text(summary),
            Err(error) => {
                warn!(tool = name, error = %error, "upstream read failed");
                ToolOutcome::Text(error.tool_text())
            }
        }
    }

    fn propose_action(&self, token: &AccessToken, args: &Value) -> ToolOutcome {
        let args = match parse_args::<ProposeActionArgs>("propose_action", args) {
            Ok(args) => args,
            Err(text) => return ToolOutcome::Text(text),
        };

        let identity = IdentityKey::from_token(token);
        let last_list_id = self.identity.last_list_id(&identity);

        let params = match ActionParams::from_proposal(
            &args.action_type,
            &args.parameters,
            &self.campaign,
            last_list_id.as_deref(),
        ) {
            Ok(params) => params,
            Err(error) => return ToolOutcome::Text(format!("Error: {error}")),
        };

        let staged = self.proposals.mint(params);
        info!(
            event_name = "agent.proposal.staged",
            approval_id = %staged.id,
            action_type = staged.params.action_type().as_str(),
            "staged action awaiting approval"
        );

        ToolOutcome::Proposal(ProposalSignal {
            approval_id: staged.id,
            action_type: staged.params.action_type(),
            description: staged.description,
            params: staged.params,
        })
    }

    async fn execute_action(&self, token: &AccessToken, args: &Value) -> ToolOutcome {
        let args = match parse_args::<ExecuteActionArgs>("execute_action", args) {
            Ok(args) => args,
            Err(text) => return ToolOutcome::Text(text),
        };

        let approval_id = ApprovalId(args.approval_id.clone());
        let params = match self.proposals.take(&approval_id) {
            Some(staged) => staged.params,
            None if self.approvals.stateless_execute_fallback => {
                match synthesize_fallback(&args, &self.campaign) {
                    Some(params) => {
                        warn!(
                            event_name = "agent.execute.stateless_fallback",
                            approval_id = %approval_id,
                            action_type = params.action_type().as_str(),
                            "approval id unknown; executing from literal fields"
                        );
                        params
                    }
                    None => return ToolOutcome::Text(INVALID_APPROVAL_TEXT.to_string()),
                }
            }
            None => return ToolOutcome::Text(INVALID_APPROVAL_TEXT.to_string()),
        };

        match self.executor.execute(token, &params).await {
            Ok(outcome) => {
                if let Some(list_id) = &outcome.created_list_id {
                    self.identity.record_list(&IdentityKey::from_token(token), list_id);
                }
                info!(
                    event_name = "agent.execute.completed",
                    approval_id = %approval_id,
                    action_type = params.action_type().as_str(),
                    "approved action executed"
                );
                ToolOutcome::Text(outcome.summary)
            }
            Err(error) => {
                warn!(
                    event_name = "agent.execute.failed",
                    approval_id = %approval_id,
                    error = %error,
                    "approved action failed"
                );
                ToolOutcome::Text(error.tool_text())
            }
        }
    }
}

enum Reader {
    Account,
    Campaigns,
    Lists,
    Segments,
}

/// Rebuilds an action from literal `execute_action` fields when the staged
/// proposal is gone (in-memory cache wiped by a restart). Resilience
/// trade-off documented in the approvals config; only reachable when the
/// operator enabled it.
fn synthesize_fallback(args: &ExecuteActionArgs, campaign: &CampaignConfig) -> Option<ActionParams> {
    if let Some(list_name) = nonempty(&args.list_name) {
        return Some(ActionParams::CreateList { list_name });
    }

    let list_id = nonempty(&args.list_id)?;
    let campaign_name = nonempty(&args.campaign_name)?;
    if campaign.default_from_email.trim().is_empty() {
        return None;
    }

    let subject = nonempty(&args.subject).unwrap_or_else(|| campaign_name.clone());
    let preview_text = nonempty(&args.preview_text).unwrap_or_default();
    Some(ActionParams::CreateCampaignDraft {
        list_id,
        campaign_name,
        subject,
        preview_text,
        from_email: campaign.default_from_email.clone(),
        from_label: campaign.default_from_label.clone(),
    })
}

fn nonempty(field: &Option<String>) -> Option<String> {
    field.as_deref().map(str::trim).filter(|value| !value.is_empty()).map(str::to_string)
}

fn parse_args<T: DeserializeOwned>(tool: &str, args: &Value) -> Result<T, String> {
    serde_json::from_value(args.clone())
        .map_err(|error| format!("Error: invalid arguments for {tool}: {error}"))
}

fn empty_object_schema() -> Value {
    json!({ "type": "object", "properties": {}, "additionalProperties": false })
}
