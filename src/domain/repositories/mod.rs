use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    errors::DomainResult,
    models::{
        Contact, ContactList, DeliveryRecord, DeliveryStatus, MessageContent, ScheduleStatus,
        ScheduledMessage,
    },
};

#[async_trait]
pub trait ContactRepository: Send + Sync {
    async fn get_by_external_id(&self, external_id: &str) -> DomainResult<Option<Contact>>;

    /// Insert-or-update keyed by the stable WhatsApp ID. This is how
    /// contacts come into existence on first inbound or outbound touch.
    async fn upsert(&self, contact: &Contact) -> DomainResult<Contact>;
}

#[async_trait]
pub trait ContactListRepository: Send + Sync {
    async fn get(&self, id: Uuid) -> DomainResult<Option<ContactList>>;
    async fn upsert(&self, list: &ContactList) -> DomainResult<()>;
    async fn add_member(&self, list_id: Uuid, contact_id: Uuid) -> DomainResult<()>;
    async fn members(&self, list_id: Uuid) -> DomainResult<Vec<Contact>>;
}

#[async_trait]
pub trait ContentRepository: Send + Sync {
    async fn get(&self, id: Uuid) -> DomainResult<Option<MessageContent>>;
    async fn upsert(&self, content: &MessageContent) -> DomainResult<()>;
}

#[async_trait]
pub trait ScheduleRepository: Send + Sync {
    async fn insert(&self, schedule: &ScheduledMessage) -> DomainResult<()>;

    async fn get(&self, id: Uuid) -> DomainResult<Option<ScheduledMessage>>;

    /// Pending entries with `scheduled_at <= now`, earliest first, at
    /// most `limit` rows. This is the dispatcher's only read path.
    async fn due_before(&self, now: DateTime<Utc>, limit: u32)
    -> DomainResult<Vec<ScheduledMessage>>;

    /// Atomic pending -> processing transition. Returns `false` when the
    /// entry exists but is no longer pending (already claimed elsewhere),
    /// `NotFound` when the row is gone. Two concurrent claimers on the
    /// same id must observe exactly one `true`.
    async fn claim(&self, id: Uuid) -> DomainResult<bool>;

    async fn set_status(
        &self,
        id: Uuid,
        status: ScheduleStatus,
        error: Option<String>,
    ) -> DomainResult<ScheduledMessage>;

    /// Hard delete, allowed only for entries in a terminal status;
    /// `Conflict` otherwise, `Ok(false)` when nothing matched.
    async fn delete(&self, id: Uuid) -> DomainResult<bool>;
}

#[async_trait]
pub trait DeliveryLogRepository: Send + Sync {
    async fn insert(&self, record: &DeliveryRecord) -> DomainResult<()>;

    async fn list_by_schedule(&self, schedule_id: Uuid) -> DomainResult<Vec<DeliveryRecord>>;

    async fn list_by_recipient(
        &self,
        external_id: &str,
        limit: u32,
    ) -> DomainResult<Vec<DeliveryRecord>>;

    /// Attaches a provider-reported status to the record carrying the
    /// given provider message id (inbound webhook path). Returns `false`
    /// when no record matches.
    async fn update_provider_status(
        &self,
        provider_message_id: &str,
        status: DeliveryStatus,
    ) -> DomainResult<bool>;
}
