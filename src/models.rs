use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Body of `POST /reply`
#[derive(Debug, Clone, Deserialize)]
pub struct ReplyRequest {
    /// Social media platform the post comes from (e.g. "Twitter", "LinkedIn")
    pub platform: String,
    /// Text content of the original post
    pub post_text: String,
}

impl ReplyRequest {
    /// Name of the first field that is empty, if any.
    pub fn empty_field(&self) -> Option<&'static str> {
        if self.platform.is_empty() {
            Some("platform")
        } else if self.post_text.is_empty() {
            Some("post_text")
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyResult {
    pub platform: String,
    pub post_text: String,
    pub generated_reply: String,
}

/// One generated interaction as written to the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredInteraction {
    #[serde(flatten)]
    pub reply: ReplyResult,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl StoredInteraction {
    /// Stamp a generated reply with the current UTC time. The reply must be non-empty.
    pub fn new(reply: ReplyResult) -> Self {
        debug_assert!(!reply.generated_reply.is_empty());
        Self {
            reply,
            timestamp: Utc::now(),
            id: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub database: String,
    pub llm: String,
}

impl HealthReport {
    pub fn new(db_connected: bool, llm_available: bool) -> Self {
        let healthy = db_connected && llm_available;
        Self {
            status: if healthy { "ok" } else { "error" }.to_string(),
            database: if db_connected { "connected" } else { "disconnected" }.to_string(),
            llm: if llm_available { "available" } else { "unavailable" }.to_string(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == "ok"
    }
}
