use async_trait::async_trait;
use nexus_core::identity::AccessToken;
use nexus_core::marketing::{
    CampaignSpec, CreatedCampaign, CreatedList, CreatedProfile, CreatedTemplate, MarketingApi,
    SeedProfile, TemplateSpec, UpstreamError,
};
use serde_json::Value;

use crate::client::KlaviyoClient;
use crate::{format, payloads};

const EMAIL_CAMPAIGN_FILTER: &str = "equals(messages.channel,'email')";

#[async_trait]
impl MarketingApi for KlaviyoClient {
    async fn account_details(&self, token: &AccessToken) -> Result<String, UpstreamError> {
        let body = self.get_json(token, "/accounts/", &[]).await?;
        Ok(format::format_accounts(&data_array(&body)))
    }

    async fn campaigns(&self, token: &AccessToken) -> Result<String, UpstreamError> {
        let body = self
            .get_json(token, "/campaigns/", &[("filter", EMAIL_CAMPAIGN_FILTER)])
            .await?;
        Ok(format::format_campaigns(&data_array(&body)))
    }

    async fn lists(&self, token: &AccessToken) -> Result<String, UpstreamError> {
        let body = self.get_json(token, "/lists/", &[]).await?;
        Ok(format::format_lists(&data_array(&body)))
    }

    async fn segments(&self, token: &AccessToken) -> Result<String, UpstreamError> {
        let body = self.get_json(token, "/segments/", &[]).await?;
        Ok(format::format_segments(&data_array(&body)))
    }

    async fn create_list(
        &self,
        token: &AccessToken,
        list_name: &str,
    ) -> Result<CreatedList, UpstreamError> {
        let body = self.post_json(token, "/lists/", &payloads::create_list(list_name)).await?;
        Ok(CreatedList { id: created_id(&body)?, name: list_name.to_string() })
    }

    async fn create_profile(
        &self,
        token: &AccessToken,
        profile: &SeedProfile,
    ) -> Result<CreatedProfile, UpstreamError> {
        let body = self.post_json(token, "/profiles/", &payloads::create_profile(profile)).await?;
        Ok(CreatedProfile { id: created_id(&body)?, email: profile.email.clone() })
    }

    async fn add_profile_to_list(
        &self,
        token: &AccessToken,
        list_id: &str,
        profile_id: &str,
    ) -> Result<(), UpstreamError> {
        let path = format!("/lists/{list_id}/relationships/profiles/");
        self.post_json(token, &path, &payloads::list_membership(profile_id)).await?;
        Ok(())
    }

    async fn create_template(
        &self,
        token: &AccessToken,
        template: &TemplateSpec,
    ) -> Result<CreatedTemplate, UpstreamError> {
        let body =
            self.post_json(token, "/templates/", &payloads::create_template(template)).await?;
        Ok(CreatedTemplate { id: created_id(&body)? })
    }

    async fn create_campaign(
        &self,
        token: &AccessToken,
        campaign: &CampaignSpec,
    ) -> Result<CreatedCampaign, UpstreamError> {
        let body =
            self.post_json(token, "/campaigns/", &payloads::create_campaign(campaign)).await?;
        Ok(CreatedCampaign { id: created_id(&body)?, message_id: campaign_message_id(&body) })
    }

    async fn assign_template(
        &self,
        token: &AccessToken,
        message_id: &str,
        template_id: &str,
    ) -> Result<(), UpstreamError> {
        self.post_json(
            token,
            "/campaign-message-assign-template/",
            &payloads::assign_template(message_id, template_id),
        )
        .await?;
        Ok(())
    }
}

fn data_array(body: &Value) -> Vec<Value> {
    body.get("data").and_then(Value::as_array).cloned().unwrap_or_default()
}

fn created_id(body: &Value) -> Result<String, UpstreamError> {
    body.pointer("/data/id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| UpstreamError::UnexpectedShape("create response missing data.id".to_string()))
}

/// The campaign-message id lives in the relationship block; some responses
/// only carry it in the `included` sideload.
fn campaign_message_id(body: &Value) -> Option<String> {
    if let Some(id) = body
        .pointer("/data/relationships/campaign-messages/data/0/id")
        .and_then(Value::as_str)
    {
        return Some(id.to_string());
    }

    body.get("included")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .find(|record| record.get("type").and_then(Value::as_str) == Some("campaign-message"))
        .and_then(|record| record.get("id").and_then(Value::as_str))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{campaign_message_id, created_id, data_array};

    #[test]
    fn created_id_reads_the_jsonapi_data_block() {
        let body = json!({"data": {"type": "list", "id": "XyZ123"}});
        assert_eq!(created_id(&body).expect("id should parse"), "XyZ123");
    }

    #[test]
    fn created_id_rejects_shapeless_responses() {
        assert!(created_id(&json!({"ok": true})).is_err());
    }

    #[test]
    fn data_array_tolerates_missing_collections() {
        assert!(data_array(&json!({})).is_empty());
        assert_eq!(data_array(&json!({"data": [{"id": "1"}]})).len(), 1);
    }

    #[test]
    fn message_id_prefers_the_relationship_block() {
        let body = json!({
            "data": {
                "id": "C1",
                "relationships": {
                    "campaign-messages": { "data": [ {"type": "campaign-message", "id": "M1"} ] }
                }
            },
            "included": [ {"type": "campaign-message", "id": "M2"} ]
        });
        assert_eq!(campaign_message_id(&body).as_deref(), Some("M1"));
    }

    #[test]
    fn message_id_falls_back_to_the_included_sideload() {
        let body = json!({
            "data": { "id": "C1" },
            "included": [
                {"type": "template", "id": "T9"},
                {"type": "campaign-message", "id": "M2"}
            ]
        });
        assert_eq!(campaign_message_id(&body).as_deref(), Some("M2"));
    }

    #[test]
    fn message_id_is_none_when_absent() {
        assert!(campaign_message_id(&json!({"data": {"id": "C1"}})).is_none());
    }
}
