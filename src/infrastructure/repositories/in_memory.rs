use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::{
    errors::{DomainError, DomainResult},
    models::{
        Contact, ContactList, DeliveryRecord, DeliveryStatus, MessageContent, ScheduleStatus,
        ScheduledMessage,
    },
    repositories::{
        ContactListRepository, ContactRepository, ContentRepository, DeliveryLogRepository,
        ScheduleRepository,
    },
};

#[derive(Default)]
pub struct InMemoryContactRepository {
    contacts: Arc<RwLock<HashMap<Uuid, Contact>>>,
}

impl InMemoryContactRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ContactRepository for InMemoryContactRepository {
    async fn get_by_external_id(&self, external_id: &str) -> DomainResult<Option<Contact>> {
        let contacts = self.contacts.read().await;
        Ok(contacts
            .values()
            .find(|c| c.external_id == external_id)
            .cloned())
    }

    async fn upsert(&self, contact: &Contact) -> DomainResult<Contact> {
        let mut contacts = self.contacts.write().await;
        let existing_id = contacts
            .values()
            .find(|c| c.external_id == contact.external_id)
            .map(|c| c.id);

        match existing_id {
            Some(id) => {
                let entry = contacts.get_mut(&id).expect("id just looked up");
                if contact.name.is_some() {
                    entry.name = contact.name.clone();
                }
                entry
                    .custom_fields
                    .extend(contact.custom_fields.iter().map(|(k, v)| (k.clone(), v.clone())));
                entry.updated_at = Utc::now();
                Ok(entry.clone())
            }
            None => {
                contacts.insert(contact.id, contact.clone());
                Ok(contact.clone())
            }
        }
    }
}

pub struct InMemoryContactListRepository {
    lists: Arc<RwLock<HashMap<Uuid, ContactList>>>,
    memberships: Arc<RwLock<HashMap<Uuid, Vec<Uuid>>>>,
    contacts: Arc<InMemoryContactRepository>,
}

impl InMemoryContactListRepository {
    pub fn new(contacts: Arc<InMemoryContactRepository>) -> Self {
        Self {
            lists: Arc::new(RwLock::new(HashMap::new())),
            memberships: Arc::new(RwLock::new(HashMap::new())),
            contacts,
        }
    }
}

#[async_trait]
impl ContactListRepository for InMemoryContactListRepository {
    async fn get(&self, id: Uuid) -> DomainResult<Option<ContactList>> {
        let lists = self.lists.read().await;
        Ok(lists.get(&id).cloned())
    }

    async fn upsert(&self, list: &ContactList) -> DomainResult<()> {
        let mut lists = self.lists.write().await;
        lists.insert(list.id, list.clone());
        Ok(())
    }

    async fn add_member(&self, list_id: Uuid, contact_id: Uuid) -> DomainResult<()> {
        let mut memberships = self.memberships.write().await;
        let members = memberships.entry(list_id).or_default();
        if !members.contains(&contact_id) {
            members.push(contact_id);
        }
        Ok(())
    }

    async fn members(&self, list_id: Uuid) -> DomainResult<Vec<Contact>> {
        let memberships = self.memberships.read().await;
        let ids = memberships.get(&list_id).cloned().unwrap_or_default();
        drop(memberships);

        let contacts = self.contacts.contacts.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| contacts.get(id).cloned())
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryContentRepository {
    contents: Arc<RwLock<HashMap<Uuid, MessageContent>>>,
}

impl InMemoryContentRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ContentRepository for InMemoryContentRepository {
    async fn get(&self, id: Uuid) -> DomainResult<Option<MessageContent>> {
        let contents = self.contents.read().await;
        Ok(contents.get(&id).cloned())
    }

    async fn upsert(&self, content: &MessageContent) -> DomainResult<()> {
        let mut contents = self.contents.write().await;
        contents.insert(content.id, content.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryScheduleRepository {
    schedules: Arc<RwLock<HashMap<Uuid, ScheduledMessage>>>,
}

impl InMemoryScheduleRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ScheduleRepository for InMemoryScheduleRepository {
    async fn insert(&self, schedule: &ScheduledMessage) -> DomainResult<()> {
        let mut schedules = self.schedules.write().await;
        schedules.insert(schedule.id, schedule.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<ScheduledMessage>> {
        let schedules = self.schedules.read().await;
        Ok(schedules.get(&id).cloned())
    }

    async fn due_before(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> DomainResult<Vec<ScheduledMessage>> {
        let schedules = self.schedules.read().await;
        let mut due: Vec<ScheduledMessage> = schedules
            .values()
            .filter(|s| s.status == ScheduleStatus::Pending && s.scheduled_at <= now)
            .cloned()
            .collect();
        due.sort_by_key(|s| s.scheduled_at);
        due.truncate(limit as usize);
        Ok(due)
    }

    async fn claim(&self, id: Uuid) -> DomainResult<bool> {
        // Single write lock makes the check-and-set atomic.
        let mut schedules = self.schedules.write().await;
        let entry = schedules
            .get_mut(&id)
            .ok_or_else(|| DomainError::NotFound(format!("scheduled message {id}")))?;
        if entry.status != ScheduleStatus::Pending {
            return Ok(false);
        }
        entry.status = ScheduleStatus::Processing;
        entry.updated_at = Utc::now();
        Ok(true)
    }

    async fn set_status(
        &self,
        id: Uuid,
        status: ScheduleStatus,
        error: Option<String>,
    ) -> DomainResult<ScheduledMessage> {
        let mut schedules = self.schedules.write().await;
        let entry = schedules
            .get_mut(&id)
            .ok_or_else(|| DomainError::NotFound(format!("scheduled message {id}")))?;
        entry.status = status;
        if let Some(detail) = error {
            entry.error = Some(detail);
        }
        entry.updated_at = Utc::now();
        Ok(entry.clone())
    }

    async fn delete(&self, id: Uuid) -> DomainResult<bool> {
        let mut schedules = self.schedules.write().await;
        match schedules.get(&id) {
            None => Ok(false),
            Some(entry) if !entry.status.is_terminal() => Err(DomainError::Conflict(format!(
                "cannot delete a message in '{}' state",
                entry.status.as_str()
            ))),
            Some(_) => {
                schedules.remove(&id);
                Ok(true)
            }
        }
    }
}

#[derive(Default)]
pub struct InMemoryDeliveryLogRepository {
    records: Arc<RwLock<HashMap<Uuid, DeliveryRecord>>>,
}

impl InMemoryDeliveryLogRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DeliveryLogRepository for InMemoryDeliveryLogRepository {
    async fn insert(&self, record: &DeliveryRecord) -> DomainResult<()> {
        let mut records = self.records.write().await;
        records.insert(record.id, record.clone());
        Ok(())
    }

    async fn list_by_schedule(&self, schedule_id: Uuid) -> DomainResult<Vec<DeliveryRecord>> {
        let records = self.records.read().await;
        let mut matching: Vec<DeliveryRecord> = records
            .values()
            .filter(|r| r.schedule_id == Some(schedule_id))
            .cloned()
            .collect();
        matching.sort_by_key(|r| r.sent_at);
        Ok(matching)
    }

    async fn list_by_recipient(
        &self,
        external_id: &str,
        limit: u32,
    ) -> DomainResult<Vec<DeliveryRecord>> {
        let records = self.records.read().await;
        let mut matching: Vec<DeliveryRecord> = records
            .values()
            .filter(|r| r.recipient_external_id == external_id)
            .cloned()
            .collect();
        matching.sort_by_key(|r| std::cmp::Reverse(r.sent_at));
        matching.truncate(limit as usize);
        Ok(matching)
    }

    async fn update_provider_status(
        &self,
        provider_message_id: &str,
        status: DeliveryStatus,
    ) -> DomainResult<bool> {
        let mut records = self.records.write().await;
        let matching = records
            .values_mut()
            .find(|r| r.provider_message_id.as_deref() == Some(provider_message_id));
        match matching {
            Some(record) => {
                record.status = status;
                record.status_updated_at = Some(Utc::now());
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{NewSchedule, ScheduleTarget};
    use chrono::Duration;
    use std::collections::HashMap as StdHashMap;

    fn schedule_at(offset_minutes: i64) -> ScheduledMessage {
        ScheduledMessage::from_new(NewSchedule {
            content_id: Uuid::new_v4(),
            target: ScheduleTarget::Contact {
                external_id: "555".to_string(),
                is_group: false,
            },
            scheduled_at: Utc::now() + Duration::minutes(offset_minutes),
            personalization: StdHashMap::new(),
        })
    }

    #[tokio::test]
    async fn due_before_orders_limits_and_excludes_future() {
        let repo = InMemoryScheduleRepository::new();
        let late = schedule_at(-1);
        let early = schedule_at(-10);
        let middle = schedule_at(-5);
        let future = schedule_at(10);
        for s in [&late, &early, &middle, &future] {
            repo.insert(s).await.unwrap();
        }

        let due = repo.due_before(Utc::now(), 10).await.unwrap();
        assert_eq!(
            due.iter().map(|s| s.id).collect::<Vec<_>>(),
            vec![early.id, middle.id, late.id]
        );

        let capped = repo.due_before(Utc::now(), 2).await.unwrap();
        assert_eq!(capped.len(), 2);
        assert_eq!(capped[0].id, early.id);
    }

    #[tokio::test]
    async fn non_pending_entries_are_never_due() {
        let repo = InMemoryScheduleRepository::new();
        for status in [
            ScheduleStatus::Processing,
            ScheduleStatus::Sent,
            ScheduleStatus::Failed,
            ScheduleStatus::Cancelled,
        ] {
            let s = schedule_at(-5);
            repo.insert(&s).await.unwrap();
            repo.set_status(s.id, status, None).await.unwrap();
        }
        assert!(repo.due_before(Utc::now(), 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn concurrent_claims_yield_exactly_one_winner() {
        let repo = Arc::new(InMemoryScheduleRepository::new());
        let entry = schedule_at(-1);
        repo.insert(&entry).await.unwrap();

        let (a, b) = {
            let repo_a = repo.clone();
            let repo_b = repo.clone();
            let id = entry.id;
            tokio::join!(
                tokio::spawn(async move { repo_a.claim(id).await.unwrap() }),
                tokio::spawn(async move { repo_b.claim(id).await.unwrap() }),
            )
        };
        let (a, b) = (a.unwrap(), b.unwrap());
        assert!(a ^ b, "exactly one claimer must win, got {a} and {b}");

        let claimed = repo.get(entry.id).await.unwrap().unwrap();
        assert_eq!(claimed.status, ScheduleStatus::Processing);
    }

    #[tokio::test]
    async fn claim_on_missing_entry_is_not_found() {
        let repo = InMemoryScheduleRepository::new();
        let err = repo.claim(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, DomainError::NotFound(_)));
    }

    #[tokio::test]
    async fn delete_guards_live_entries() {
        let repo = InMemoryScheduleRepository::new();
        let entry = schedule_at(-1);
        repo.insert(&entry).await.unwrap();

        let err = repo.delete(entry.id).await.unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));

        repo.set_status(entry.id, ScheduleStatus::Cancelled, None)
            .await
            .unwrap();
        assert!(repo.delete(entry.id).await.unwrap());
        assert!(!repo.delete(entry.id).await.unwrap());
    }

    #[tokio::test]
    async fn set_status_keeps_existing_error_when_none_given() {
        let repo = InMemoryScheduleRepository::new();
        let entry = schedule_at(-1);
        repo.insert(&entry).await.unwrap();

        repo.set_status(entry.id, ScheduleStatus::Failed, Some("boom".to_string()))
            .await
            .unwrap();
        let updated = repo
            .set_status(entry.id, ScheduleStatus::Failed, None)
            .await
            .unwrap();
        assert_eq!(updated.error.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn contact_upsert_is_keyed_by_external_id() {
        let repo = InMemoryContactRepository::new();
        let first = repo
            .upsert(&Contact::new("555".to_string(), Some("Alice".to_string())))
            .await
            .unwrap();

        let mut update = Contact::new("555".to_string(), None);
        update
            .custom_fields
            .insert("city".to_string(), serde_json::json!("Metropolis"));
        let merged = repo.upsert(&update).await.unwrap();

        assert_eq!(merged.id, first.id);
        assert_eq!(merged.name.as_deref(), Some("Alice"));
        assert_eq!(
            merged.custom_fields.get("city"),
            Some(&serde_json::json!("Metropolis"))
        );
    }

    #[tokio::test]
    async fn provider_status_attaches_to_matching_record() {
        let repo = InMemoryDeliveryLogRepository::new();
        let record = DeliveryRecord {
            id: Uuid::new_v4(),
            schedule_id: None,
            recipient_external_id: "555".to_string(),
            content_name: "Ad-hoc".to_string(),
            body: "hello".to_string(),
            provider_message_id: Some("wamid.1".to_string()),
            status: DeliveryStatus::ApiSent,
            error: None,
            is_group: false,
            sent_at: Utc::now(),
            status_updated_at: None,
        };
        repo.insert(&record).await.unwrap();

        assert!(repo
            .update_provider_status("wamid.1", DeliveryStatus::Delivered)
            .await
            .unwrap());
        assert!(!repo
            .update_provider_status("wamid.unknown", DeliveryStatus::Delivered)
            .await
            .unwrap());

        let history = repo.list_by_recipient("555", 10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, DeliveryStatus::Delivered);
        assert!(history[0].status_updated_at.is_some());
    }
}
