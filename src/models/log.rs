use serde::{Deserialize, Serialize};

/// One chat turn, grouped by calendar day under a day-scoped storage key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationLog {
    pub id: String,
    /// Full ISO timestamp of the turn.
    pub timestamp: String,
    /// HH:MM:SS, for readable daily partitioning.
    pub time: String,
    pub user_message: String,
    pub ai_response: String,
}
