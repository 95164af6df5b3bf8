use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::config::CampaignConfig;

pub const DEFAULT_VIP_MIN_SPEND: i64 = 300;
pub const DEFAULT_VIP_SEED_COUNT: u32 = 3;
pub const MAX_VIP_SEED_COUNT: u32 = 100;

/// Opaque single-use approval handle handed to the human reviewer.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApprovalId(pub String);

impl std::fmt::Display for ApprovalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    CreateList,
    CreateVipAudience,
    CreateCampaignDraft,
}

impl ActionType {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "create_list" => Some(Self::CreateList),
            "create_vip_audience" => Some(Self::CreateVipAudience),
            "create_campaign_draft" => Some(Self::CreateCampaignDraft),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateList => "create_list",
            Self::CreateVipAudience => "create_vip_audience",
            Self::CreateCampaignDraft => "create_campaign_draft",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::CreateList => "Create subscriber list",
            Self::CreateVipAudience => "Create VIP audience",
            Self::CreateCampaignDraft => "Draft email campaign",
        }
    }
}

/// Validated, type-specific parameters for a staged action. Constructed only
/// through [`ActionParams::from_proposal`], so every stored instance has
/// already passed field validation and default resolution.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action_type", rename_all = "snake_case")]
pub enum ActionParams {
    CreateList {
        list_name: String,
    },
    CreateVipAudience {
        min_spend: i64,
        seed_count: u32,
    },
    CreateCampaignDraft {
        list_id: String,
        campaign_name: String,
        subject: String,
        preview_text: String,
        from_email: String,
        from_label: String,
    },
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ActionParamsError {
    #[error("unsupported action type `{0}` (expected create_list|create_vip_audience|create_campaign_draft)")]
    UnsupportedActionType(String),
    #[error("parameters must be a JSON object")]
    ParametersNotAnObject,
    #[error("unknown parameter `{0}`")]
    UnknownField(String),
    #[error("missing required parameter `{0}`")]
    MissingField(&'static str),
    #[error("parameter `{field}` must be {expected}")]
    InvalidField { field: &'static str, expected: &'static str },
    #[error("no list_id was provided and no recently created list is available to target")]
    NoListReference,
    #[error("no from_email was provided and campaign.default_from_email is not configured")]
    NoSenderConfigured,
}

impl ActionParams {
    /// Validates a raw `propose_action` parameter payload into a typed record.
    /// `last_list_id` supplies the implicit-chaining fallback for campaign
    /// drafts proposed without an explicit `list_id`.
    pub fn from_proposal(
        action_type: &str,
        parameters: &Value,
        campaign: &CampaignConfig,
        last_list_id: Option<&str>,
    ) -> Result<Self, ActionParamsError> {
        let action_type = ActionType::parse(action_type)
            .ok_or_else(|| ActionParamsError::UnsupportedActionType(action_type.to_string()))?;
        let fields = object_fields(parameters)?;

        match action_type {
            ActionType::CreateList => {
                reject_unknown(&fields, &["list_name"])?;
                let list_name = require_string(&fields, "list_name")?;
                Ok(Self::CreateList { list_name })
            }
            ActionType::CreateVipAudience => {
                reject_unknown(&fields, &["min_spend", "seed_count"])?;
                let min_spend =
                    optional_i64(&fields, "min_spend")?.unwrap_or(DEFAULT_VIP_MIN_SPEND);
                if min_spend <= 0 {
                    return Err(ActionParamsError::InvalidField {
                        field: "min_spend",
                        expected: "a positive integer",
                    });
                }
                let seed_count =
                    optional_u32(&fields, "seed_count")?.unwrap_or(DEFAULT_VIP_SEED_COUNT);
                if seed_count == 0 || seed_count > MAX_VIP_SEED_COUNT {
                    return Err(ActionParamsError::InvalidField {
                        field: "seed_count",
                        expected: "an integer between 1 and 100",
                    });
                }
                Ok(Self::CreateVipAudience { min_spend, seed_count })
            }
            ActionType::CreateCampaignDraft => {
                reject_unknown(
                    &fields,
                    &["list_id", "campaign_name", "subject", "preview_text", "from_email", "from_label"],
                )?;
                let list_id = match optional_string(&fields, "list_id")? {
                    Some(list_id) => list_id,
                    None => last_list_id
                        .map(str::to_string)
                        .ok_or(ActionParamsError::NoListReference)?,
                };
                let campaign_name = require_string(&fields, "campaign_name")?;
                let subject = require_string(&fields, "subject")?;
                let preview_text = require_string(&fields, "preview_text")?;
                let from_email = match optional_string(&fields, "from_email")? {
                    Some(from_email) => from_email,
                    None if campaign.default_from_email.trim().is_empty() => {
                        return Err(ActionParamsError::NoSenderConfigured);
                    }
                    None => campaign.default_from_email.clone(),
                };
                let from_label = optional_string(&fields, "from_label")?
                    .unwrap_or_else(|| campaign.default_from_label.clone());
                Ok(Self::CreateCampaignDraft {
                    list_id,
                    campaign_name,
                    subject,
                    preview_text,
                    from_email,
                    from_label,
                })
            }
        }
    }

    pub fn action_type(&self) -> ActionType {
        match self {
            Self::CreateList { .. } => ActionType::CreateList,
            Self::CreateVipAudience { .. } => ActionType::CreateVipAudience,
            Self::CreateCampaignDraft { .. } => ActionType::CreateCampaignDraft,
        }
    }

    /// Human-readable draft summary shown on the approval card.
    pub fn describe(&self) -> String {
        match self {
            Self::CreateList { list_name } => {
                format!("Create a new subscriber list named '{list_name}'.")
            }
            Self::CreateVipAudience { min_spend, seed_count } => format!(
                "Create a VIP audience list for customers spending ${min_spend}+, seeded with {seed_count} profiles."
            ),
            Self::CreateCampaignDraft {
                list_id,
                campaign_name,
                subject,
                from_email,
                from_label,
                ..
            } => format!(
                "Draft email campaign '{campaign_name}' (subject: '{subject}') targeting list {list_id}, sent as {from_label} <{from_email}>."
            ),
        }
    }
}

/// A staged mutation awaiting human approval. Minted by `propose_action`,
/// consumed at most once by `execute_action`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAction {
    pub id: ApprovalId,
    pub params: ActionParams,
    pub description: String,
}

fn object_fields(parameters: &Value) -> Result<Map<String, Value>, ActionParamsError> {
    match parameters {
        Value::Object(map) => Ok(map.clone()),
        Value::Null => Ok(Map::new()),
        _ => Err(ActionParamsError::ParametersNotAnObject),
    }
}

fn reject_unknown(fields: &Map<String, Value>, allowed: &[&str]) -> Result<(), ActionParamsError> {
    for key in fields.keys() {
        if !allowed.contains(&key.as_str()) {
            return Err(ActionParamsError::UnknownField(key.clone()));
        }
    }
    Ok(())
}

fn require_string(
    fields: &Map<String, Value>,
    field: &'static str,
) -> Result<String, ActionParamsError> {
    optional_string(fields, field)?.ok_or(ActionParamsError::MissingField(field))
}

fn optional_string(
    fields: &Map<String, Value>,
    field: &'static str,
) -> Result<Option<String>, ActionParamsError> {
    match fields.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(value)) if value.trim().is_empty() => Ok(None),
        Some(Value::String(value)) => Ok(Some(value.trim().to_string())),
        Some(_) => {
            Err(ActionParamsError::InvalidField { field, expected: "a non-empty string" })
        }
    }
}

fn optional_i64(
    fields: &Map<String, Value>,
    field: &'static str,
) -> Result<Option<i64>, ActionParamsError> {
    match fields.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(value)) => value
            .as_i64()
            .map(Some)
            .ok_or(ActionParamsError::InvalidField { field, expected: "an integer" }),
        Some(_) => Err(ActionParamsError::InvalidField { field, expected: "an integer" }),
    }
}

fn optional_u32(
    fields: &Map<String, Value>,
    field: &'static str,
) -> Result<Option<u32>, ActionParamsError> {
    match optional_i64(fields, field)? {
        None => Ok(None),
        Some(value) => u32::try_from(value)
            .map(Some)
            .map_err(|_| ActionParamsError::InvalidField { field, expected: "a non-negative integer" }),
    }
}
