use serde::{Deserialize, Serialize};

use crate::model::ConversationMode;
use crate::topics::Topic;

/// Structured reading: a short summary, the chart factors behind it, and
/// optional remedies. Parsed out of LLM output or built from a stub.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NiroReply {
    pub summary: String,
    pub reasons: Vec<String>,
    pub remedies: Vec<String>,
    /// Full text before section parsing, kept for the transcript view.
    pub raw_text: String,
}

/// A chip the UI can render under a reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestedAction {
    pub id: String,
    pub label: String,
}

impl SuggestedAction {
    pub fn new(id: &str, label: &str) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub session_id: String,
    #[serde(default)]
    pub message: String,
    /// Chip id when the user tapped a suggested action instead of typing.
    #[serde(default)]
    pub action_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub session_id: String,
    pub mode: ConversationMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub focus: Option<Topic>,
    pub reply: NiroReply,
    pub suggested_actions: Vec<SuggestedAction>,
}
