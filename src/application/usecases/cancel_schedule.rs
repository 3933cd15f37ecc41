use std::sync::Arc;

use uuid::Uuid;

use crate::domain::{
    errors::{DomainError, DomainResult},
    models::{ScheduleStatus, ScheduledMessage},
    repositories::ScheduleRepository,
};

/// Administrative cancel: pending -> cancelled. Anything past pending is
/// either in flight or already terminal and cannot be cancelled.
pub struct CancelScheduleUseCase {
    schedules: Arc<dyn ScheduleRepository>,
}

impl CancelScheduleUseCase {
    pub fn new(schedules: Arc<dyn ScheduleRepository>) -> Self {
        Self { schedules }
    }

    pub async fn execute(&self, schedule_id: Uuid) -> DomainResult<ScheduledMessage> {
        let schedule = self
            .schedules
            .get(schedule_id)
            .await?
            .ok_or_else(|| DomainError::NotFound(format!("scheduled message {schedule_id}")))?;

        if schedule.status != ScheduleStatus::Pending {
            return Err(DomainError::Conflict(format!(
                "cannot cancel a message in '{}' state",
                schedule.status.as_str()
            )));
        }

        self.schedules
            .set_status(schedule_id, ScheduleStatus::Cancelled, None)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{NewSchedule, ScheduleTarget};
    use crate::infrastructure::repositories::in_memory::InMemoryScheduleRepository;
    use chrono::Utc;
    use std::collections::HashMap;

    async fn seeded(repo: &InMemoryScheduleRepository) -> ScheduledMessage {
        let schedule = ScheduledMessage::from_new(NewSchedule {
            content_id: Uuid::new_v4(),
            target: ScheduleTarget::Contact {
                external_id: "555".to_string(),
                is_group: false,
            },
            scheduled_at: Utc::now(),
            personalization: HashMap::new(),
        });
        repo.insert(&schedule).await.unwrap();
        schedule
    }

    #[tokio::test]
    async fn cancels_pending_entry() {
        let repo = Arc::new(InMemoryScheduleRepository::new());
        let schedule = seeded(&repo).await;
        let use_case = CancelScheduleUseCase::new(repo.clone());

        let cancelled = use_case.execute(schedule.id).await.unwrap();
        assert_eq!(cancelled.status, ScheduleStatus::Cancelled);
    }

    #[tokio::test]
    async fn refuses_to_cancel_sent_entry() {
        let repo = Arc::new(InMemoryScheduleRepository::new());
        let schedule = seeded(&repo).await;
        repo.set_status(schedule.id, ScheduleStatus::Sent, None)
            .await
            .unwrap();

        let err = CancelScheduleUseCase::new(repo)
            .execute(schedule.id)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[tokio::test]
    async fn unknown_entry_is_not_found() {
        let err = CancelScheduleUseCase::new(Arc::new(InMemoryScheduleRepository::new()))
            .execute(Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound(_)));
    }
}
