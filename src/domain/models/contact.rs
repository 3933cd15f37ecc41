use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A messaging endpoint known to the system, keyed by its stable
/// WhatsApp ID. Contacts are created on first contact (inbound or
/// outbound) and never deleted by this core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub id: Uuid,
    pub external_id: String,
    pub name: Option<String>,
    pub custom_fields: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Contact {
    pub fn new(external_id: String, name: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            external_id,
            name,
            custom_fields: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// A contact can only be addressed when its WhatsApp ID is non-blank.
    pub fn has_usable_external_id(&self) -> bool {
        !self.external_id.trim().is_empty()
    }
}
