//! Hand-rolled fakes shared by the agent test modules.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use nexus_core::identity::AccessToken;
use nexus_core::marketing::{
    CampaignSpec, CreatedCampaign, CreatedList, CreatedProfile, CreatedTemplate, MarketingApi,
    SeedProfile, TemplateSpec, UpstreamError,
};

use crate::llm::{ChatMessage, LlmClient, LlmError, LlmReply, ToolChoice, ToolDescriptor};

/// Call-recording upstream fake. Reads return canned summaries; writes return
/// deterministic ids. Every call also records the bearer token it saw so
/// tests can prove tokens never bleed across turns.
#[derive(Default)]
pub(crate) struct FakeMarketingApi {
    pub(crate) fail_reads: bool,
    pub(crate) calls: Mutex<Vec<String>>,
    pub(crate) tokens: Mutex<Vec<String>>,
    pub(crate) list_counter: AtomicU32,
}

impl FakeMarketingApi {
    fn record(&self, token: &AccessToken, call: impl Into<String>) {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).push(call.into());
        self.tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(token.expose().to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn seen_tokens(&self) -> Vec<String> {
        self.tokens.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn write_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| {
                call.starts_with("create_") || call.starts_with("add_") || call.starts_with("assign_")
            })
            .count()
    }

    pub fn last_created_list_id(&self) -> String {
        format!("LIST{}", self.list_counter.load(Ordering::SeqCst))
    }

    fn read(&self, token: &AccessToken, name: &str, summary: &str) -> Result<String, UpstreamError> {
        self.record(token, name);
        if self.fail_reads {
            return Err(UpstreamError::Unauthorized);
        }
        Ok(summary.to_string())
    }
}

#[async_trait]
impl MarketingApi for FakeMarketingApi {
    async fn account_details(&self, token: &AccessToken) -> Result<String, UpstreamError> {
        self.read(token, "account_details", "Org: Acme Store (ID: AB12cd)")
    }

    async fn campaigns(&self, token: &AccessToken) -> Result<String, UpstreamError> {
        self.read(token, "campaigns", "ID: C1 | Name: Welcome | Status: Sent")
    }

    async fn lists(&self, token: &AccessToken) -> Result<String, UpstreamError> {
        self.read(token, "lists", "ID: L1 | Name: Newsletter | Profiles: 120")
    }

    async fn segments(&self, token: &AccessToken) -> Result<String, UpstreamError> {
        self.read(token, "segments", "No segments found.")
    }

    async fn create_list(
        &self,
        token: &AccessToken,
        list_name: &str,
    ) -> Result<CreatedList, UpstreamError> {
        self.record(token, format!("create_list:{list_name}"));
        let id = format!("LIST{}", self.list_counter.fetch_add(1, Ordering::SeqCst) + 1);
        Ok(CreatedList { id, name: list_name.to_string() })
    }

    async fn create_profile(
        &self,
        token: &AccessToken,
        profile: &SeedProfile,
    ) -> Result<CreatedProfile, UpstreamError> {
        self.record(token, format!("create_profile:{}", profile.email));
        Ok(CreatedProfile { id: format!("P-{}", profile.email), email: profile.email.clone() })
    }

    async fn add_profile_to_list(
        &self,
        token: &AccessToken,
        list_id: &str,
        profile_id: &str,
    ) -> Result<(), UpstreamError> {
        self.record(token, format!("add_profile:{list_id}:{profile_id}"));
        Ok(())
    }

    async fn create_template(
        &self,
        token: &AccessToken,
        template: &TemplateSpec,
    ) -> Result<CreatedTemplate, UpstreamError> {
        self.record(token, format!("create_template:{}", template.name));
        Ok(CreatedTemplate { id: "T1".to_string() })
    }

    async fn create_campaign(
        &self,
        token: &AccessToken,
        campaign: &CampaignSpec,
    ) -> Result<CreatedCampaign, UpstreamError> {
        self.record(token, format!("create_campaign:{}", campaign.name));
        Ok(CreatedCampaign { id: "C1".to_string(), message_id: Some("M1".to_string()) })
    }

    async fn assign_template(
        &self,
        token: &AccessToken,
        message_id: &str,
        template_id: &str,
    ) -> Result<(), UpstreamError> {
        self.record(token, format!("assign_template:{message_id}:{template_id}"));
        Ok(())
    }
}

/// Scripted LLM double: pops one canned reply per `chat` call and records the
/// tool choice each call was made with.
pub(crate) struct ScriptedLlm {
    replies: Mutex<VecDeque<LlmReply>>,
    choices: Mutex<Vec<ToolChoice>>,
}

impl ScriptedLlm {
    pub fn new(replies: Vec<LlmReply>) -> Self {
        Self { replies: Mutex::new(replies.into()), choices: Mutex::new(Vec::new()) }
    }

    pub fn call_count(&self) -> usize {
        self.choices.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn summary_call_count(&self) -> usize {
        self.choices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|choice| matches!(choice, ToolChoice::None))
            .count()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn chat(
        &self,
        _messages: &[ChatMessage],
        _tools: &[ToolDescriptor],
        tool_choice: ToolChoice,
    ) -> Result<LlmReply, LlmError> {
        self.choices.lock().unwrap_or_else(PoisonError::into_inner).push(tool_choice);
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .ok_or_else(|| LlmError::Api("scripted llm exhausted".to_string()))
    }
}
