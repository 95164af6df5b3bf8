use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::identity::AccessToken;

/// Uniform failure taxonomy for upstream marketing-API calls. A 401 is kept
/// distinct from other API failures so the user can be told to re-authenticate
/// instead of seeing a generic error.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("upstream credential rejected (HTTP 401)")]
    Unauthorized,
    #[error("upstream API error {status}: {body}")]
    Api { status: u16, body: String },
    #[error("upstream request timed out")]
    Timeout,
    #[error("upstream transport failure: {0}")]
    Transport(String),
    #[error("unexpected upstream response shape: {0}")]
    UnexpectedShape(String),
}

impl UpstreamError {
    /// In-band rendering for tool results. Failures are ordinary text so the
    /// LLM can react to them instead of the turn aborting.
    pub fn tool_text(&self) -> String {
        match self {
            Self::Unauthorized => "Error: OAuth token expired. Please re-login.".to_string(),
            Self::Api { status, body } => format!("API Error {status}: {body}"),
            Self::Timeout => {
                "Error: the upstream API did not respond in time. Please try again.".to_string()
            }
            Self::Transport(detail) => format!("Error: could not reach the upstream API ({detail})."),
            Self::UnexpectedShape(detail) => {
                format!("Error: unexpected response from the upstream API ({detail}).")
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedList {
    pub id: String,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedProfile {
    pub email: String,
    pub min_spend: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedProfile {
    pub id: String,
    pub email: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateSpec {
    pub name: String,
    pub html: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedTemplate {
    pub id: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignSpec {
    pub name: String,
    pub list_id: String,
    pub subject: String,
    pub preview_text: String,
    pub from_email: String,
    pub from_label: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedCampaign {
    pub id: String,
    /// Identifier of the campaign's email message, needed to attach a
    /// template. Absent when the upstream response omitted the message object.
    pub message_id: Option<String>,
}

/// Seam to the upstream marketing-automation API. One method per upstream
/// call: reads return pre-formatted line-per-record summaries, writes return
/// the created resource identifiers. Multi-step operations are sequenced by
/// the [`crate::execution::ActionExecutor`], not inside implementations.
#[async_trait]
pub trait MarketingApi: Send + Sync {
    async fn account_details(&self, token: &AccessToken) -> Result<String, UpstreamError>;
    async fn campaigns(&self, token: &AccessToken) -> Result<String, UpstreamError>;
    async fn lists(&self, token: &AccessToken) -> Result<String, UpstreamError>;
    async fn segments(&self, token: &AccessToken) -> Result<String, UpstreamError>;

    async fn create_list(
        &self,
        token: &AccessToken,
        list_name: &str,
    ) -> Result<CreatedList, UpstreamError>;

    async fn create_profile(
        &self,
        token: &AccessToken,
        profile: &SeedProfile,
    ) -> Result<CreatedProfile, UpstreamError>;

    async fn add_profile_to_list(
        &self,
        token: &AccessToken,
        list_id: &str,
        profile_id: &str,
    ) -> Result<(), UpstreamError>;

    async fn create_template(
        &self,
        token: &AccessToken,
        template: &TemplateSpec,
    ) -> Result<CreatedTemplate, UpstreamError>;

    async fn create_campaign(
        &self,
        token: &AccessToken,
        campaign: &CampaignSpec,
    ) -> Result<CreatedCampaign, UpstreamError>;

    async fn assign_template(
        &self,
        token: &AccessToken,
        message_id: &str,
        template_id: &str,
    ) -> Result<(), UpstreamError>;
}
