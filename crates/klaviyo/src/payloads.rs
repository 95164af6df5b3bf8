use nexus_core::marketing::{CampaignSpec, SeedProfile, TemplateSpec};
use serde_json::{json, Value};

pub(crate) fn create_list(list_name: &str) -> Value {
    json!({
        "data": {
            "type": "list",
            "attributes": { "name": list_name }
        }
    })
}

pub(crate) fn create_profile(profile: &SeedProfile) -> Value {
    json!({
        "data": {
            "type": "profile",
            "attributes": {
                "email": profile.email,
                "properties": { "vip_min_spend": profile.min_spend }
            }
        }
    })
}

pub(crate) fn list_membership(profile_id: &str) -> Value {
    json!({
        "data": [
            { "type": "profile", "id": profile_id }
        ]
    })
}

pub(crate) fn create_template(template: &TemplateSpec) -> Value {
    json!({
        "data": {
            "type": "template",
            "attributes": {
                "name": template.name,
                "editor_type": "CODE",
                "html": template.html
            }
        }
    })
}

pub(crate) fn create_campaign(campaign: &CampaignSpec) -> Value {
    json!({
        "data": {
            "type": "campaign",
            "attributes": {
                "name": campaign.name,
                "audiences": { "included": [campaign.list_id] },
                "send_strategy": { "method": "static" },
                "campaign-messages": {
                    "data": [
                        {
                            "type": "campaign-message",
                            "attributes": {
                                "definition": {
                                    "channel": "email",
                                    "label": campaign.name,
                                    "content": {
                                        "subject": campaign.subject,
                                        "preview_text": campaign.preview_text,
                                        "from_email": campaign.from_email,
                                        "from_label": campaign.from_label
                                    }
                                }
                            }
                        }
                    ]
                }
            }
        }
    })
}

pub(crate) fn assign_template(message_id: &str, template_id: &str) -> Value {
    json!({
        "data": {
            "type": "campaign-message",
            "id": message_id,
            "relationships": {
                "template": {
                    "data": { "type": "template", "id": template_id }
                }
            }
        }
    })
}
