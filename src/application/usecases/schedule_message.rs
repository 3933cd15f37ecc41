use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    errors::DomainResult,
    models::{NewSchedule, ScheduleTarget, ScheduledMessage},
    repositories::ScheduleRepository,
};

pub struct ScheduleMessageUseCase {
    schedules: Arc<dyn ScheduleRepository>,
}

/// One of `list_id` / `external_id` must be set, never both. Missing
/// content references are not checked here; a dangling content id fails
/// the entry at dispatch time instead.
pub struct ScheduleMessageRequest {
    pub content_id: Uuid,
    pub list_id: Option<Uuid>,
    pub external_id: Option<String>,
    pub is_group: bool,
    pub scheduled_at: DateTime<Utc>,
    pub personalization: HashMap<String, serde_json::Value>,
}

impl ScheduleMessageUseCase {
    pub fn new(schedules: Arc<dyn ScheduleRepository>) -> Self {
        Self { schedules }
    }

    pub async fn execute(&self, request: ScheduleMessageRequest) -> DomainResult<ScheduledMessage> {
        let target =
            ScheduleTarget::from_parts(request.list_id, request.external_id, request.is_group)?;

        let schedule = ScheduledMessage::from_new(NewSchedule {
            content_id: request.content_id,
            target,
            scheduled_at: request.scheduled_at,
            personalization: request.personalization,
        });

        self.schedules.insert(&schedule).await?;
        Ok(schedule)
    }
}
