use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use crate::domain::{
    errors::{DomainError, DomainResult},
    models::{NewSchedule, ScheduleTarget, ScheduledMessage},
    repositories::{ContactListRepository, ContentRepository, ScheduleRepository},
};

/// Expands one (content, contact list, time) broadcast into individual
/// per-contact scheduled messages, eagerly at schedule time. The
/// dispatcher only ever sees contact-targeted entries, so failures and
/// retries stay independently trackable per recipient.
pub struct ScheduleBroadcastUseCase {
    lists: Arc<dyn ContactListRepository>,
    contents: Arc<dyn ContentRepository>,
    schedules: Arc<dyn ScheduleRepository>,
}

pub struct ScheduleBroadcastRequest {
    pub content_id: Uuid,
    pub list_id: Uuid,
    pub scheduled_at: DateTime<Utc>,
    /// Placeholders shared by every message of this broadcast, surfaced
    /// to templates as `{{batch_<key>}}`.
    pub personalization: HashMap<String, serde_json::Value>,
}

/// Partial-success report: entries that were created stay persisted even
/// when siblings were skipped, and every skip is a reported error.
#[derive(Debug, Default)]
pub struct BroadcastOutcome {
    pub scheduled: usize,
    pub errors: Vec<String>,
}

impl ScheduleBroadcastUseCase {
    pub fn new(
        lists: Arc<dyn ContactListRepository>,
        contents: Arc<dyn ContentRepository>,
        schedules: Arc<dyn ScheduleRepository>,
    ) -> Self {
        Self {
            lists,
            contents,
            schedules,
        }
    }

    pub async fn execute(
        &self,
        request: ScheduleBroadcastRequest,
    ) -> DomainResult<BroadcastOutcome> {
        let list = self
            .lists
            .get(request.list_id)
            .await?
            .ok_or_else(|| DomainError::NotFound(format!("contact list {}", request.list_id)))?;

        self.contents
            .get(request.content_id)
            .await?
            .ok_or_else(|| DomainError::NotFound(format!("message content {}", request.content_id)))?;

        let members = self.lists.members(request.list_id).await?;

        let mut outcome = BroadcastOutcome::default();

        if members.is_empty() {
            outcome
                .errors
                .push(format!("contact list '{}' has no contacts", list.name));
            return Ok(outcome);
        }

        for contact in &members {
            if !contact.has_usable_external_id() {
                let label = contact
                    .name
                    .clone()
                    .unwrap_or_else(|| contact.id.to_string());
                outcome.errors.push(format!(
                    "contact '{}' in list '{}' is missing a WhatsApp ID",
                    label, list.name,
                ));
                continue;
            }

            let schedule = ScheduledMessage::from_new(NewSchedule {
                content_id: request.content_id,
                target: ScheduleTarget::Contact {
                    external_id: contact.external_id.clone(),
                    is_group: false,
                },
                scheduled_at: request.scheduled_at,
                personalization: request.personalization.clone(),
            });

            match self.schedules.insert(&schedule).await {
                Ok(()) => outcome.scheduled += 1,
                Err(err) => outcome.errors.push(format!(
                    "error scheduling for contact {}: {}",
                    contact.external_id, err
                )),
            }
        }

        info!(
            list = %list.name,
            scheduled = outcome.scheduled,
            skipped = outcome.errors.len(),
            "broadcast expanded"
        );
        Ok(outcome)
    }
}
