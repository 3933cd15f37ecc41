use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::errors::DomainError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    Pending,
    Processing,
    Sent,
    Failed,
    Cancelled,
}

impl ScheduleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleStatus::Pending => "pending",
            ScheduleStatus::Processing => "processing",
            ScheduleStatus::Sent => "sent",
            ScheduleStatus::Failed => "failed",
            ScheduleStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(ScheduleStatus::Pending),
            "processing" => Some(ScheduleStatus::Processing),
            "sent" => Some(ScheduleStatus::Sent),
            "failed" => Some(ScheduleStatus::Failed),
            "cancelled" => Some(ScheduleStatus::Cancelled),
            _ => None,
        }
    }

    /// Terminal entries are never picked up by the dispatcher again and
    /// are the only ones eligible for hard deletion.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ScheduleStatus::Sent | ScheduleStatus::Failed | ScheduleStatus::Cancelled
        )
    }
}

/// Exactly one delivery target per schedule. Broadcasts are expanded
/// into `Contact` targets before dispatch; a `List` target is only a
/// transient authoring-side state and fails permanently if it ever
/// reaches the dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScheduleTarget {
    Contact { external_id: String, is_group: bool },
    List { list_id: Uuid },
}

impl ScheduleTarget {
    /// Builds a target from the optional pair callers supply, enforcing
    /// the exactly-one rule: a list id or a contact WhatsApp ID, never
    /// both, never neither.
    pub fn from_parts(
        list_id: Option<Uuid>,
        external_id: Option<String>,
        is_group: bool,
    ) -> Result<Self, DomainError> {
        match (list_id, external_id) {
            (Some(_), Some(_)) => Err(DomainError::Validation(
                "provide either a contact list or a direct WhatsApp ID, not both".to_string(),
            )),
            (None, None) => Err(DomainError::Validation(
                "either a contact list or a direct WhatsApp ID is required".to_string(),
            )),
            (Some(list_id), None) => Ok(ScheduleTarget::List { list_id }),
            (None, Some(external_id)) => {
                if external_id.trim().is_empty() {
                    return Err(DomainError::Validation(
                        "target WhatsApp ID must not be blank".to_string(),
                    ));
                }
                Ok(ScheduleTarget::Contact {
                    external_id,
                    is_group,
                })
            }
        }
    }

    pub fn contact_external_id(&self) -> Option<&str> {
        match self {
            ScheduleTarget::Contact { external_id, .. } => Some(external_id),
            ScheduleTarget::List { .. } => None,
        }
    }

    pub fn is_group(&self) -> bool {
        matches!(self, ScheduleTarget::Contact { is_group: true, .. })
    }
}

/// Validated input for creating one scheduled message.
#[derive(Debug, Clone)]
pub struct NewSchedule {
    pub content_id: Uuid,
    pub target: ScheduleTarget,
    pub scheduled_at: DateTime<Utc>,
    pub personalization: HashMap<String, serde_json::Value>,
}

/// The unit of scheduled work: one message to one target at one time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledMessage {
    pub id: Uuid,
    pub content_id: Uuid,
    pub target: ScheduleTarget,
    pub scheduled_at: DateTime<Utc>,
    pub status: ScheduleStatus,
    pub personalization: HashMap<String, serde_json::Value>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ScheduledMessage {
    pub fn from_new(new: NewSchedule) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            content_id: new.content_id,
            target: new.target,
            scheduled_at: new.scheduled_at,
            status: ScheduleStatus::Pending,
            personalization: new.personalization,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }
}
