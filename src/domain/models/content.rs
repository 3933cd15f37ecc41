use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Reusable message body with `{{placeholder}}` tokens, optionally
/// carrying a media reference. Delivery records snapshot the rendered
/// body, so later edits to a content row do not rewrite history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageContent {
    pub id: Uuid,
    pub name: String,
    pub body: String,
    pub media_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MessageContent {
    pub fn new(name: String, body: String, media_url: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name,
            body,
            media_url,
            created_at: now,
            updated_at: now,
        }
    }
}
