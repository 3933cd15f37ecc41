use std::sync::Arc;

use uuid::Uuid;

use crate::domain::{errors::DomainResult, repositories::ScheduleRepository};

/// Hard delete of a retired entry. The repository enforces that only
/// terminal entries (sent, failed, cancelled) can be removed; a live
/// entry must be cancelled first.
pub struct DeleteScheduleUseCase {
    schedules: Arc<dyn ScheduleRepository>,
}

impl DeleteScheduleUseCase {
    pub fn new(schedules: Arc<dyn ScheduleRepository>) -> Self {
        Self { schedules }
    }

    pub async fn execute(&self, schedule_id: Uuid) -> DomainResult<bool> {
        self.schedules.delete(schedule_id).await
    }
}
