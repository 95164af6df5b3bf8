use serde_json::Value;

/// Renders a record field as display text, degrading to the given placeholder
/// instead of failing the whole summary when the field is absent.
fn field_text<'a>(record: &'a Value, pointer: &str, placeholder: &'a str) -> String {
    match record.pointer(pointer) {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Number(number)) => number.to_string(),
        _ => placeholder.to_string(),
    }
}

pub(crate) fn format_accounts(data: &[Value]) -> String {
    if data.is_empty() {
        return "No account details found.".to_string();
    }

    data.iter()
        .map(|account| {
            format!(
                "Org: {} (ID: {})",
                field_text(
                    account,
                    "/attributes/contact_information/organization_name",
                    "Unknown"
                ),
                field_text(account, "/id", "unknown"),
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub(crate) fn format_campaigns(data: &[Value]) -> String {
    if data.is_empty() {
        return "No email campaigns found.".to_string();
    }

    data.iter()
        .map(|campaign| {
            format!(
                "ID: {} | Name: {} | Status: {}",
                field_text(campaign, "/id", "unknown"),
                field_text(campaign, "/attributes/name", "Unknown"),
                field_text(campaign, "/attributes/status", "n/a"),
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub(crate) fn format_lists(data: &[Value]) -> String {
    if data.is_empty() {
        return "No lists found.".to_string();
    }
    format_audiences(data)
}

pub(crate) fn format_segments(data: &[Value]) -> String {
    if data.is_empty() {
        return "No segments found.".to_string();
    }
    format_audiences(data)
}

fn format_audiences(data: &[Value]) -> String {
    data.iter()
        .map(|record| {
            format!(
                "ID: {} | Name: {} | Profiles: {}",
                field_text(record, "/id", "unknown"),
                field_text(record, "/attributes/name", "Unknown"),
                field_text(record, "/attributes/profile_count", "n/a"),
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{format_accounts, format_campaigns, format_lists, format_segments};

    #[test]
    fn accounts_render_org_name_and_id() {
        let data = vec![json!({
            "id": "AB12cd",
            "attributes": {
                "contact_information": { "organization_name": "Acme Store" }
            }
        })];

        assert_eq!(format_accounts(&data), "Org: Acme Store (ID: AB12cd)");
    }

    #[test]
    fn campaigns_render_one_line_per_record() {
        let data = vec![
            json!({"id": "C1", "attributes": {"name": "Spring Sale", "status": "Draft"}}),
            json!({"id": "C2", "attributes": {"name": "Welcome", "status": "Sent"}}),
        ];

        let summary = format_campaigns(&data);
        assert_eq!(
            summary,
            "ID: C1 | Name: Spring Sale | Status: Draft\nID: C2 | Name: Welcome | Status: Sent"
        );
    }

    #[test]
    fn missing_fields_degrade_to_placeholders() {
        let data = vec![json!({"id": "L1", "attributes": {}})];
        assert_eq!(format_lists(&data), "ID: L1 | Name: Unknown | Profiles: n/a");
    }

    #[test]
    fn numeric_profile_counts_are_rendered() {
        let data = vec![json!({"id": "S1", "attributes": {"name": "VIPs", "profile_count": 42}})];
        assert_eq!(format_segments(&data), "ID: S1 | Name: VIPs | Profiles: 42");
    }

    #[test]
    fn empty_collections_are_valid_non_error_results() {
        assert_eq!(format_campaigns(&[]), "No email campaigns found.");
        assert_eq!(format_lists(&[]), "No lists found.");
        assert_eq!(format_segments(&[]), "No segments found.");
    }
}
