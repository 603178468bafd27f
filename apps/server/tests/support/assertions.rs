use anyhow::Context as _;
use axum::http::StatusCode;
use serde_json::Value;

/// Assert that a response is a searchset Bundle
pub fn assert_searchset(value: &Value) -> anyhow::Result<&Value> {
    assert_eq!(
        value.get("resourceType").and_then(|v| v.as_str()),
        Some("Bundle"),
        "expected Bundle resource type"
    );
    assert_eq!(
        value.get("type").and_then(|v| v.as_str()),
        Some("searchset"),
        "expected Bundle.type = searchset"
    );
    Ok(value)
}

/// Resources of the Bundle's entries; a Bundle without entries yields none
pub fn bundle_resources(bundle: &Value) -> anyhow::Result<Vec<&Value>> {
    let Some(entries) = bundle.get("entry") else {
        return Ok(Vec::new());
    };
    entries
        .as_array()
        .context("Bundle.entry is array")?
        .iter()
        .map(|e| e.get("resource").context("entry has resource"))
        .collect()
}

/// Server-assigned ids of the Bundle's resources, in order
pub fn bundle_ids(bundle: &Value) -> anyhow::Result<Vec<String>> {
    Ok(bundle_resources(bundle)?
        .iter()
        .filter_map(|r| r.get("id").and_then(|v| v.as_str()).map(str::to_string))
        .collect())
}

/// URL of the `next` link, when present
pub fn next_link(bundle: &Value) -> Option<String> {
    bundle
        .get("link")?
        .as_array()?
        .iter()
        .find(|l| l.get("relation").and_then(|v| v.as_str()) == Some("next"))
        .and_then(|l| l.get("url"))
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

/// Assert status code matches expected
pub fn assert_status(actual: StatusCode, expected: StatusCode, context: &str) {
    assert_eq!(
        actual, expected,
        "{context}: expected status {expected}, got {actual}"
    );
}

/// Assert an OperationOutcome whose diagnostics equal `expected`
pub fn assert_diagnostics(outcome: &Value, expected: &str) {
    assert_eq!(
        outcome.get("resourceType").and_then(|v| v.as_str()),
        Some("OperationOutcome"),
        "expected OperationOutcome, got {outcome}"
    );
    assert_eq!(
        outcome["issue"][0]["diagnostics"].as_str(),
        Some(expected),
        "unexpected diagnostics"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bundle_helpers() {
        let bundle = json!({
            "resourceType": "Bundle",
            "type": "searchset",
            "link": [{"relation": "next", "url": "/rdr/v1/PhysicalMeasurements/_history?_token=x"}],
            "entry": [
                {"resource": {"resourceType": "Bundle", "id": "123"}},
                {"resource": {"resourceType": "Bundle", "id": "456"}}
            ]
        });
        assert!(assert_searchset(&bundle).is_ok());
        assert_eq!(bundle_ids(&bundle).unwrap(), vec!["123", "456"]);
        assert!(next_link(&bundle).unwrap().ends_with("_token=x"));
        assert!(bundle_resources(&json!({"resourceType": "Bundle"})).unwrap().is_empty());
    }
}
