use serde::{Deserialize, Serialize};

/// Error body returned by the analysis backend. The service reports failures under
/// `detail`; some routes use `message` instead.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiError {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ApiError {
    /// Human-readable message carried by the body, if any.
    pub fn user_message(&self) -> Option<String> {
        match &self.detail {
            Some(serde_json::Value::String(text)) if !text.trim().is_empty() => {
                return Some(text.clone())
            }
            Some(serde_json::Value::Array(items)) => {
                // validation errors arrive as [{"msg": ...}, ...]
                let joined = items
                    .iter()
                    .filter_map(|item| item.get("msg").and_then(|msg| msg.as_str()))
                    .collect::<Vec<_>>()
                    .join("; ");
                if !joined.is_empty() {
                    return Some(joined);
                }
            }
            _ => {}
        }
        self.message
            .as_ref()
            .filter(|text| !text.trim().is_empty())
            .cloned()
    }
}
