use std::sync::Arc;

use thiserror::Error;

use crate::actions::ActionParams;
use crate::identity::AccessToken;
use crate::marketing::{CampaignSpec, MarketingApi, SeedProfile, TemplateSpec, UpstreamError};

/// Result of executing an approved action: a user-facing summary plus the
/// created list id (when the action created one) for identity-context
/// chaining.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutionOutcome {
    pub summary: String,
    pub created_list_id: Option<String>,
}

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("{action} aborted after {completed} of {total} steps: {source}")]
    Aborted { action: &'static str, completed: u32, total: u32, source: UpstreamError },
}

impl ExecutionError {
    pub fn tool_text(&self) -> String {
        match self {
            Self::Aborted { action, completed, total, source } => format!(
                "Failed to {action}: completed {completed} of {total} steps before error. {}",
                source.tool_text()
            ),
        }
    }
}

/// Drives approved actions against the upstream API in fixed step sequences.
/// Multi-step operations abort on an early failure and report how far they
/// got; VIP seeding tolerates per-profile failures and reports a reduced
/// seeded count instead.
pub struct ActionExecutor {
    api: Arc<dyn MarketingApi>,
}

impl ActionExecutor {
    pub fn new(api: Arc<dyn MarketingApi>) -> Self {
        Self { api }
    }

    pub async fn execute(
        &self,
        token: &AccessToken,
        params: &ActionParams,
    ) -> Result<ExecutionOutcome, ExecutionError> {
        match params {
            ActionParams::CreateList { list_name } => self.create_list(token, list_name).await,
            ActionParams::CreateVipAudience { min_spend, seed_count } => {
                self.create_vip_audience(token, *min_spend, *seed_count).await
            }
            ActionParams::CreateCampaignDraft {
                list_id,
                campaign_name,
                subject,
                preview_text,
                from_email,
                from_label,
            } => {
                let spec = CampaignSpec {
                    name: campaign_name.clone(),
                    list_id: list_id.clone(),
                    subject: subject.clone(),
                    preview_text: preview_text.clone(),
                    from_email: from_email.clone(),
                    from_label: from_label.clone(),
                };
                self.create_campaign_draft(token, &spec).await
            }
        }
    }

    async fn create_list(
        &self,
        token: &AccessToken,
        list_name: &str,
    ) -> Result<ExecutionOutcome, ExecutionError> {
        let list = self.api.create_list(token, list_name).await.map_err(|source| {
            ExecutionError::Aborted { action: "create list", completed: 0, total: 1, source }
        })?;

        Ok(ExecutionOutcome {
            summary: format!("SUCCESS: Created list '{}' with ID: {}", list.name, list.id),
            created_list_id: Some(list.id),
        })
    }

    async fn create_vip_audience(
        &self,
        token: &AccessToken,
        min_spend: i64,
        seed_count: u32,
    ) -> Result<ExecutionOutcome, ExecutionError> {
        let total = 1 + seed_count;
        let list_name = format!("VIP Customers (${min_spend}+)");
        let list = self.api.create_list(token, &list_name).await.map_err(|source| {
            ExecutionError::Aborted { action: "create VIP audience", completed: 0, total, source }
        })?;

        let mut seeded = 0u32;
        for index in 1..=seed_count {
            let profile = SeedProfile {
                email: seed_email(index, &list.id),
                min_spend,
            };
            let Ok(created) = self.api.create_profile(token, &profile).await else {
                continue;
            };
            if self.api.add_profile_to_list(token, &list.id, &created.id).await.is_ok() {
                seeded += 1;
            }
        }

        let summary = if seeded == seed_count {
            format!(
                "SUCCESS: Created VIP list '{}' with ID: {} and seeded {seeded} profiles.",
                list.name, list.id
            )
        } else {
            format!(
                "SUCCESS: Created VIP list '{}' with ID: {}; seeded {seeded} of {seed_count} profiles ({} failed).",
                list.name,
                list.id,
                seed_count - seeded
            )
        };

        Ok(ExecutionOutcome { summary, created_list_id: Some(list.id) })
    }

    async fn create_campaign_draft(
        &self,
        token: &AccessToken,
        spec: &CampaignSpec,
    ) -> Result<ExecutionOutcome, ExecutionError> {
        const ACTION: &str = "draft campaign";
        const TOTAL: u32 = 3;

        let template_spec = TemplateSpec {
            name: format!("{} template", spec.name),
            html: placeholder_template_html(&spec.name),
        };
        let template = self.api.create_template(token, &template_spec).await.map_err(|source| {
            ExecutionError::Aborted { action: ACTION, completed: 0, total: TOTAL, source }
        })?;

        let campaign = self.api.create_campaign(token, spec).await.map_err(|source| {
            ExecutionError::Aborted { action: ACTION, completed: 1, total: TOTAL, source }
        })?;

        let message_id = campaign.message_id.clone().ok_or_else(|| ExecutionError::Aborted {
            action: ACTION,
            completed: 2,
            total: TOTAL,
            source: UpstreamError::UnexpectedShape(
                "campaign response did not include a campaign-message id".to_string(),
            ),
        })?;

        self.api.assign_template(token, &message_id, &template.id).await.map_err(|source| {
            ExecutionError::Aborted { action: ACTION, completed: 2, total: TOTAL, source }
        })?;

        Ok(ExecutionOutcome {
            summary: format!(
                "SUCCESS: Drafted campaign '{}' with ID: {} targeting list {}; template assigned.",
                spec.name, campaign.id, spec.list_id
            ),
            created_list_id: None,
        })
    }
}

/// Deterministic per-list seed addresses so replays against the same list are
/// idempotent upstream.
fn seed_email(index: u32, list_id: &str) -> String {
    format!("vip-seed-{index}-{}@example.com", list_id.to_ascii_lowercase())
}

fn placeholder_template_html(campaign_name: &str) -> String {
    format!(
        "<html><body><h1>{campaign_name}</h1><p>Draft content. Replace before sending.</p></body></html>"
    )
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex, PoisonError};

    use async_trait::async_trait;

    use super::{ActionExecutor, ExecutionError};
    use crate::actions::ActionParams;
    use crate::identity::AccessToken;
    use crate::marketing::{
        CampaignSpec, CreatedCampaign, CreatedList, CreatedProfile, CreatedTemplate, MarketingApi,
        SeedProfile, TemplateSpec, UpstreamError,
    };

    #[derive(Default)]
    struct FakeApi {
        calls: Mutex<Vec<String>>,
        fail_profile_indexes: Vec<u32>,
        fail_campaign: bool,
        omit_message_id: bool,
    }

    impl FakeApi {
        fn record(&self, call: impl Into<String>) {
            self.calls.lock().unwrap_or_else(PoisonError::into_inner).push(call.into());
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
        }

        fn profile_creations(&self) -> usize {
            self.calls().iter().filter(|call| call.starts_with("create_profile")).count()
        }

        fn links(&self) -> usize {
            self.calls().iter().filter(|call| call.starts_with("add_profile")).count()
        }
    }

    #[async_trait]
    impl MarketingApi for FakeApi {
        async fn account_details(&self, _token: &AccessToken) -> Result<String, UpstreamError> {
            Ok(String::new())
        }

        async fn campaigns(&self, _token: &AccessToken) -> Result<String, UpstreamError> {
            Ok(String::new())
        }

        async fn lists(&self, _token: &AccessToken) -> Result<String, UpstreamError> {
            Ok(String::new())
        }

        async fn segments(&self, _token: &AccessToken) -> Result<String, UpstreamError> {
            Ok(String::new())
        }

        async fn create_list(
            &self,
            _token: &AccessToken,
            list_name: &str,
        ) -> Result<CreatedList, UpstreamError> {
            self.record(format!("create_list:{list_name}"));
            Ok(CreatedList { id: "LIST1".to_string(), name: list_name.to_string() })
        }

        async fn create_profile(
            &self,
            _token: &AccessToken,
            profile: &SeedProfile,
        ) -> Result<CreatedProfile, UpstreamError> {
            self.record(format!("create_profile:{}", profile.email));
            let index = self.profile_creations() as u32;
            if self.fail_profile_indexes.contains(&index) {
                return Err(UpstreamError::Api { status: 409, body: "duplicate".to_string() });
            }
            Ok(CreatedProfile { id: format!("P{index}"), email: profile.email.clone() })
        }

        async fn add_profile_to_list(
            &self,
            _token: &AccessToken,
            list_id: &str,
            profile_id: &str,
        ) -> Result<(), UpstreamError> {
            self.record(format!("add_profile:{list_id}:{profile_id}"));
            Ok(())
        }

        async fn create_template(
            &self,
            _token: &AccessToken,
            template: &TemplateSpec,
        ) -> Result<CreatedTemplate, UpstreamError> {
            self.record(format!("create_template:{}", template.name));
            Ok(CreatedTemplate { id: "T1".to_string() })
        }

        async fn create_campaign(
            &self,
            _token: &AccessToken,
            campaign: &CampaignSpec,
        ) -> Result<CreatedCampaign, UpstreamError> {
            self.record(format!("create_campaign:{}", campaign.name));
            if self.fail_campaign {
                return Err(UpstreamError::Api { status: 400, body: "bad audience".to_string() });
            }
            let message_id =
                if self.omit_message_id { None } else { Some("M1".to_string()) };
            Ok(CreatedCampaign { id: "C1".to_string(), message_id })
        }

        async fn assign_template(
            &self,
            _token: &AccessToken,
            message_id: &str,
            template_id: &str,
        ) -> Result<(), UpstreamError> {
            self.record(format!("assign_template:{message_id}:{template_id}"));
            Ok(())
        }
    }

    fn token() -> AccessToken {
        AccessToken::new("token-test")
    }

    #[tokio::test]
    async fn vip_audience_seeds_exactly_the_requested_count() {
        let api = Arc::new(FakeApi::default());
        let executor = ActionExecutor::new(api.clone());

        let outcome = executor
            .execute(&token(), &ActionParams::CreateVipAudience { min_spend: 300, seed_count: 3 })
            .await
            .expect("execution should succeed");

        assert_eq!(api.profile_creations(), 3);
        assert_eq!(api.links(), 3);
        assert!(outcome.summary.contains("seeded 3 profiles"));
        assert_eq!(outcome.created_list_id.as_deref(), Some("LIST1"));
    }

    #[tokio::test]
    async fn vip_audience_tolerates_partial_profile_failures() {
        let api = Arc::new(FakeApi {
            fail_profile_indexes: vec![2],
            ..FakeApi::default()
        });
        let executor = ActionExecutor::new(api.clone());

        let outcome = executor
            .execute(&token(), &ActionParams::CreateVipAudience { min_spend: 300, seed_count: 3 })
            .await
            .expect("partial profile failure must not fail the operation");

        assert_eq!(api.profile_creations(), 3, "every seed is still attempted");
        assert_eq!(api.links(), 2, "only created profiles are linked");
        assert!(outcome.summary.contains("seeded 2 of 3 profiles"));
    }

    #[tokio::test]
    async fn campaign_draft_reports_partial_step_context_on_abort() {
        let api = Arc::new(FakeApi { fail_campaign: true, ..FakeApi::default() });
        let executor = ActionExecutor::new(api.clone());

        let error = executor
            .execute(
                &token(),
                &ActionParams::CreateCampaignDraft {
                    list_id: "LIST1".to_string(),
                    campaign_name: "Spring Sale".to_string(),
                    subject: "Savings".to_string(),
                    preview_text: "Inside".to_string(),
                    from_email: "hello@acme-store.com".to_string(),
                    from_label: "Acme".to_string(),
                },
            )
            .await
            .expect_err("campaign failure should abort");

        let ExecutionError::Aborted { completed, total, .. } = error;
        assert_eq!((completed, total), (1, 3));
        assert_eq!(
            api.calls().iter().filter(|call| call.starts_with("assign_template")).count(),
            0,
            "later steps must not run after an abort"
        );
    }

    #[tokio::test]
    async fn campaign_draft_assigns_template_to_the_campaign_message() {
        let api = Arc::new(FakeApi::default());
        let executor = ActionExecutor::new(api.clone());

        let outcome = executor
            .execute(
                &token(),
                &ActionParams::CreateCampaignDraft {
                    list_id: "LIST1".to_string(),
                    campaign_name: "Spring Sale".to_string(),
                    subject: "Savings".to_string(),
                    preview_text: "Inside".to_string(),
                    from_email: "hello@acme-store.com".to_string(),
                    from_label: "Acme".to_string(),
                },
            )
            .await
            .expect("draft should succeed");

        assert!(api.calls().contains(&"assign_template:M1:T1".to_string()));
        assert!(outcome.summary.contains("Drafted campaign 'Spring Sale'"));
        assert!(outcome.created_list_id.is_none());
    }

    #[tokio::test]
    async fn missing_message_id_aborts_before_template_assignment() {
        let api = Arc::new(FakeApi { omit_message_id: true, ..FakeApi::default() });
        let executor = ActionExecutor::new(api.clone());

        let error = executor
            .execute(
                &token(),
                &ActionParams::CreateCampaignDraft {
                    list_id: "LIST1".to_string(),
                    campaign_name: "Spring Sale".to_string(),
                    subject: "Savings".to_string(),
                    preview_text: "Inside".to_string(),
                    from_email: "hello@acme-store.com".to_string(),
                    from_label: "Acme".to_string(),
                },
            )
            .await
            .expect_err("missing message id should abort");

        assert!(error.tool_text().contains("completed 2 of 3 steps"));
    }
}
