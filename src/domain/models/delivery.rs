use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Outcome of one transmission attempt as this core knows it.
/// `Delivered` / `Read` arrive later through the inbound webhook path,
/// which only attaches provider status to an existing record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    ApiSent,
    ApiFailed,
    Delivered,
    Read,
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::ApiSent => "api_sent",
            DeliveryStatus::ApiFailed => "api_failed",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Read => "read",
            DeliveryStatus::Failed => "failed",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "api_sent" => Some(DeliveryStatus::ApiSent),
            "api_failed" => Some(DeliveryStatus::ApiFailed),
            "delivered" => Some(DeliveryStatus::Delivered),
            "read" => Some(DeliveryStatus::Read),
            "failed" => Some(DeliveryStatus::Failed),
            _ => None,
        }
    }
}

/// Append-only log row for one transmission attempt. Snapshots the
/// content name and the rendered body as actually sent; ad-hoc sends
/// carry no schedule back-reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub id: Uuid,
    pub schedule_id: Option<Uuid>,
    pub recipient_external_id: String,
    pub content_name: String,
    pub body: String,
    pub provider_message_id: Option<String>,
    pub status: DeliveryStatus,
    pub error: Option<String>,
    pub is_group: bool,
    pub sent_at: DateTime<Utc>,
    pub status_updated_at: Option<DateTime<Utc>>,
}
