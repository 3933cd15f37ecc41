use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{
    errors::DomainResult,
    models::{DeliveryRecord, DeliveryStatus},
    repositories::DeliveryLogRepository,
};

/// Outbound transmission capability. Implementations talk to the actual
/// messaging API; any error they return is a per-message failure outcome
/// for the caller, never fatal to a dispatch cycle. Retry and backoff
/// against the remote API belong to the implementation, not to callers.
#[async_trait]
pub trait MessageGateway: Send + Sync {
    /// Sends one text body to one recipient and returns the
    /// provider-assigned message id.
    async fn send(&self, recipient: &str, body: &str) -> anyhow::Result<String>;
}

/// What one send attempt produced. `record_id` points at the delivery
/// record written for the attempt, success or not.
#[derive(Debug, Clone)]
pub struct SendOutcome {
    pub success: bool,
    pub provider_message_id: Option<String>,
    pub record_id: Uuid,
    pub error: Option<String>,
}

/// Wraps the gateway so that every transmission attempt leaves exactly
/// one delivery record, with the rendered body and content name
/// snapshotted as actually sent.
pub struct DeliveryService {
    gateway: Arc<dyn MessageGateway>,
    delivery_log: Arc<dyn DeliveryLogRepository>,
}

impl DeliveryService {
    pub fn new(gateway: Arc<dyn MessageGateway>, delivery_log: Arc<dyn DeliveryLogRepository>) -> Self {
        Self {
            gateway,
            delivery_log,
        }
    }

    /// Sends a rendered text message. `schedule_id` is `None` for ad-hoc
    /// sends that did not originate from the scheduler.
    pub async fn send_text(
        &self,
        recipient: &str,
        body: &str,
        content_name: &str,
        schedule_id: Option<Uuid>,
        is_group: bool,
    ) -> DomainResult<SendOutcome> {
        let (status, provider_message_id, error) = match self.gateway.send(recipient, body).await {
            Ok(provider_id) => {
                info!(recipient, provider_id = %provider_id, "message accepted by gateway");
                (DeliveryStatus::ApiSent, Some(provider_id), None)
            }
            Err(err) => {
                warn!(recipient, error = %err, "gateway rejected message");
                (DeliveryStatus::ApiFailed, None, Some(err.to_string()))
            }
        };

        let record = DeliveryRecord {
            id: Uuid::new_v4(),
            schedule_id,
            recipient_external_id: recipient.to_string(),
            content_name: content_name.to_string(),
            body: body.to_string(),
            provider_message_id: provider_message_id.clone(),
            status,
            error: error.clone(),
            is_group,
            sent_at: Utc::now(),
            status_updated_at: None,
        };
        self.delivery_log.insert(&record).await?;

        Ok(SendOutcome {
            success: status == DeliveryStatus::ApiSent,
            provider_message_id,
            record_id: record.id,
            error,
        })
    }
}
