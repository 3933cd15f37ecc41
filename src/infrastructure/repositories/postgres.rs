use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, Pool, Postgres};
use uuid::Uuid;

use crate::domain::{
    errors::{DomainError, DomainResult},
    models::{
        Contact, ContactList, DeliveryRecord, DeliveryStatus, MessageContent, ScheduleStatus,
        ScheduleTarget, ScheduledMessage,
    },
    repositories::{
        ContactListRepository, ContactRepository, ContentRepository, DeliveryLogRepository,
        ScheduleRepository,
    },
};

pub type PgPool = Pool<Postgres>;

fn db_err(err: sqlx::Error) -> DomainError {
    DomainError::Other(err.into())
}

#[derive(Clone)]
pub struct PostgresContactRepository {
    pool: PgPool,
}

impl PostgresContactRepository {
    pub fn new(pool: PgPool) -> Arc<Self> {
        Arc::new(Self { pool })
    }
}

#[async_trait]
impl ContactRepository for PostgresContactRepository {
    async fn get_by_external_id(&self, external_id: &str) -> DomainResult<Option<Contact>> {
        let record = sqlx::query_as::<_, ContactRecord>(
            r#"
            SELECT id, external_id, name, custom_fields, created_at, updated_at
            FROM contacts
            WHERE external_id = $1
            "#,
        )
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        record.map(|record| record.try_into()).transpose()
    }

    async fn upsert(&self, contact: &Contact) -> DomainResult<Contact> {
        let custom_fields = serde_json::to_value(&contact.custom_fields)
            .map_err(|err| DomainError::Other(err.into()))?;
        let record = sqlx::query_as::<_, ContactRecord>(
            r#"
            INSERT INTO contacts (id, external_id, name, custom_fields, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (external_id) DO UPDATE
            SET name = COALESCE(EXCLUDED.name, contacts.name),
                custom_fields = contacts.custom_fields || EXCLUDED.custom_fields,
                updated_at = EXCLUDED.updated_at
            RETURNING id, external_id, name, custom_fields, created_at, updated_at
            "#,
        )
        .bind(contact.id)
        .bind(&contact.external_id)
        .bind(&contact.name)
        .bind(custom_fields)
        .bind(contact.created_at)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        record.try_into()
    }
}

#[derive(Clone)]
pub struct PostgresContactListRepository {
    pool: PgPool,
}

impl PostgresContactListRepository {
    pub fn new(pool: PgPool) -> Arc<Self> {
        Arc::new(Self { pool })
    }
}

#[async_trait]
impl ContactListRepository for PostgresContactListRepository {
    async fn get(&self, id: Uuid) -> DomainResult<Option<ContactList>> {
        let record = sqlx::query_as::<_, ContactListRecord>(
            r#"SELECT id, name, created_at, updated_at FROM contact_lists WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(record.map(ContactList::from))
    }

    async fn upsert(&self, list: &ContactList) -> DomainResult<()> {
        sqlx::query(
            r#"
            INSERT INTO contact_lists (id, name, created_at, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE
            SET name = EXCLUDED.name,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(list.id)
        .bind(&list.name)
        .bind(list.created_at)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn add_member(&self, list_id: Uuid, contact_id: Uuid) -> DomainResult<()> {
        sqlx::query(
            r#"
            INSERT INTO contact_list_members (list_id, contact_id)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(list_id)
        .bind(contact_id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn members(&self, list_id: Uuid) -> DomainResult<Vec<Contact>> {
        let rows = sqlx::query_as::<_, ContactRecord>(
            r#"
            SELECT c.id, c.external_id, c.name, c.custom_fields, c.created_at, c.updated_at
            FROM contacts c
            JOIN contact_list_members m ON m.contact_id = c.id
            WHERE m.list_id = $1
            ORDER BY c.created_at
            "#,
        )
        .bind(list_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.into_iter().map(|record| record.try_into()).collect()
    }
}

#[derive(Clone)]
pub struct PostgresContentRepository {
    pool: PgPool,
}

impl PostgresContentRepository {
    pub fn new(pool: PgPool) -> Arc<Self> {
        Arc::new(Self { pool })
    }
}

#[async_trait]
impl ContentRepository for PostgresContentRepository {
    async fn get(&self, id: Uuid) -> DomainResult<Option<MessageContent>> {
        let record = sqlx::query_as::<_, MessageContentRecord>(
            r#"
            SELECT id, name, body, media_url, created_at, updated_at
            FROM message_contents
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(record.map(MessageContent::from))
    }

    async fn upsert(&self, content: &MessageContent) -> DomainResult<()> {
        sqlx::query(
            r#"
            INSERT INTO message_contents (id, name, body, media_url, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE
            SET name = EXCLUDED.name,
                body = EXCLUDED.body,
                media_url = EXCLUDED.media_url,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(content.id)
        .bind(&content.name)
        .bind(&content.body)
        .bind(&content.media_url)
        .bind(content.created_at)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct PostgresScheduleRepository {
    pool: PgPool,
}

impl PostgresScheduleRepository {
    pub fn new(pool: PgPool) -> Arc<Self> {
        Arc::new(Self { pool })
    }
}

#[async_trait]
impl ScheduleRepository for PostgresScheduleRepository {
    async fn insert(&self, schedule: &ScheduledMessage) -> DomainResult<()> {
        let (target_list_id, target_external_id, is_group) = match &schedule.target {
            ScheduleTarget::List { list_id } => (Some(*list_id), None, false),
            ScheduleTarget::Contact {
                external_id,
                is_group,
            } => (None, Some(external_id.clone()), *is_group),
        };
        let personalization = serde_json::to_value(&schedule.personalization)
            .map_err(|err| DomainError::Other(err.into()))?;

        sqlx::query(
            r#"
            INSERT INTO scheduled_messages (
                id,
                content_id,
                target_list_id,
                target_external_id,
                is_group,
                scheduled_at,
                status,
                personalization,
                error,
                created_at,
                updated_at
            ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11)
            "#,
        )
        .bind(schedule.id)
        .bind(schedule.content_id)
        .bind(target_list_id)
        .bind(target_external_id)
        .bind(is_group)
        .bind(schedule.scheduled_at)
        .bind(schedule.status.as_str())
        .bind(personalization)
        .bind(&schedule.error)
        .bind(schedule.created_at)
        .bind(schedule.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<ScheduledMessage>> {
        let record = sqlx::query_as::<_, ScheduleRecord>(
            r#"
            SELECT id, content_id, target_list_id, target_external_id, is_group,
                   scheduled_at, status, personalization, error, created_at, updated_at
            FROM scheduled_messages
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        record.map(|record| record.try_into()).transpose()
    }

    async fn due_before(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> DomainResult<Vec<ScheduledMessage>> {
        let rows = sqlx::query_as::<_, ScheduleRecord>(
            r#"
            SELECT id, content_id, target_list_id, target_external_id, is_group,
                   scheduled_at, status, personalization, error, created_at, updated_at
            FROM scheduled_messages
            WHERE status = 'pending'
              AND scheduled_at <= $1
            ORDER BY scheduled_at ASC
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.into_iter().map(|record| record.try_into()).collect()
    }

    async fn claim(&self, id: Uuid) -> DomainResult<bool> {
        // Conditional update: only one concurrent claimer can flip the
        // row out of 'pending'.
        let result = sqlx::query(
            r#"
            UPDATE scheduled_messages
            SET status = 'processing', updated_at = NOW()
            WHERE id = $1
              AND status = 'pending'
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }

        let exists = sqlx::query_scalar::<_, bool>(
            r#"SELECT EXISTS(SELECT 1 FROM scheduled_messages WHERE id = $1)"#,
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        if exists {
            Ok(false)
        } else {
            Err(DomainError::NotFound(format!("scheduled message {id}")))
        }
    }

    async fn set_status(
        &self,
        id: Uuid,
        status: ScheduleStatus,
        error: Option<String>,
    ) -> DomainResult<ScheduledMessage> {
        let record = sqlx::query_as::<_, ScheduleRecord>(
            r#"
            UPDATE scheduled_messages
            SET status = $2,
                error = COALESCE($3, error),
                updated_at = NOW()
            WHERE id = $1
            RETURNING id, content_id, target_list_id, target_external_id, is_group,
                      scheduled_at, status, personalization, error, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .bind(error)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        record
            .ok_or_else(|| DomainError::NotFound(format!("scheduled message {id}")))?
            .try_into()
    }

    async fn delete(&self, id: Uuid) -> DomainResult<bool> {
        let status = sqlx::query_scalar::<_, String>(
            r#"SELECT status FROM scheduled_messages WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        let Some(status) = status else {
            return Ok(false);
        };
        let parsed = ScheduleStatus::from_str(&status).ok_or_else(|| {
            DomainError::Other(anyhow::anyhow!("unknown schedule status '{status}'"))
        })?;
        if !parsed.is_terminal() {
            return Err(DomainError::Conflict(format!(
                "cannot delete a message in '{status}' state"
            )));
        }

        let result = sqlx::query(
            r#"DELETE FROM scheduled_messages WHERE id = $1 AND status = $2"#,
        )
        .bind(id)
        .bind(&status)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }
}

#[derive(Clone)]
pub struct PostgresDeliveryLogRepository {
    pool: PgPool,
}

impl PostgresDeliveryLogRepository {
    pub fn new(pool: PgPool) -> Arc<Self> {
        Arc::new(Self { pool })
    }
}

#[async_trait]
impl DeliveryLogRepository for PostgresDeliveryLogRepository {
    async fn insert(&self, record: &DeliveryRecord) -> DomainResult<()> {
        sqlx::query(
            r#"
            INSERT INTO delivery_records (
                id,
                schedule_id,
                recipient_external_id,
                content_name,
                body,
                provider_message_id,
                status,
                error,
                is_group,
                sent_at,
                status_updated_at
            ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11)
            "#,
        )
        .bind(record.id)
        .bind(record.schedule_id)
        .bind(&record.recipient_external_id)
        .bind(&record.content_name)
        .bind(&record.body)
        .bind(&record.provider_message_id)
        .bind(record.status.as_str())
        .bind(&record.error)
        .bind(record.is_group)
        .bind(record.sent_at)
        .bind(record.status_updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn list_by_schedule(&self, schedule_id: Uuid) -> DomainResult<Vec<DeliveryRecord>> {
        let rows = sqlx::query_as::<_, DeliveryRecordRow>(
            r#"
            SELECT id, schedule_id, recipient_external_id, content_name, body,
                   provider_message_id, status, error, is_group, sent_at, status_updated_at
            FROM delivery_records
            WHERE schedule_id = $1
            ORDER BY sent_at
            "#,
        )
        .bind(schedule_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.into_iter().map(|row| row.try_into()).collect()
    }

    async fn list_by_recipient(
        &self,
        external_id: &str,
        limit: u32,
    ) -> DomainResult<Vec<DeliveryRecord>> {
        let rows = sqlx::query_as::<_, DeliveryRecordRow>(
            r#"
            SELECT id, schedule_id, recipient_external_id, content_name, body,
                   provider_message_id, status, error, is_group, sent_at, status_updated_at
            FROM delivery_records
            WHERE recipient_external_id = $1
            ORDER BY sent_at DESC
            LIMIT $2
            "#,
        )
        .bind(external_id)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.into_iter().map(|row| row.try_into()).collect()
    }

    async fn update_provider_status(
        &self,
        provider_message_id: &str,
        status: DeliveryStatus,
    ) -> DomainResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE delivery_records
            SET status = $2, status_updated_at = NOW()
            WHERE provider_message_id = $1
            "#,
        )
        .bind(provider_message_id)
        .bind(status.as_str())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }
}

#[derive(FromRow)]
struct ContactRecord {
    id: Uuid,
    external_id: String,
    name: Option<String>,
    custom_fields: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ContactRecord> for Contact {
    type Error = DomainError;

    fn try_from(record: ContactRecord) -> Result<Self, Self::Error> {
        let custom_fields: HashMap<String, serde_json::Value> =
            if record.custom_fields.is_null() {
                HashMap::new()
            } else {
                serde_json::from_value(record.custom_fields)
                    .map_err(|err| DomainError::Other(err.into()))?
            };
        Ok(Contact {
            id: record.id,
            external_id: record.external_id,
            name: record.name,
            custom_fields,
            created_at: record.created_at,
            updated_at: record.updated_at,
        })
    }
}

#[derive(FromRow)]
struct ContactListRecord {
    id: Uuid,
    name: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ContactListRecord> for ContactList {
    fn from(record: ContactListRecord) -> Self {
        ContactList {
            id: record.id,
            name: record.name,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

#[derive(FromRow)]
struct MessageContentRecord {
    id: Uuid,
    name: String,
    body: String,
    media_url: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<MessageContentRecord> for MessageContent {
    fn from(record: MessageContentRecord) -> Self {
        MessageContent {
            id: record.id,
            name: record.name,
            body: record.body,
            media_url: record.media_url,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

#[derive(FromRow)]
struct ScheduleRecord {
    id: Uuid,
    content_id: Uuid,
    target_list_id: Option<Uuid>,
    target_external_id: Option<String>,
    is_group: bool,
    scheduled_at: DateTime<Utc>,
    status: String,
    personalization: serde_json::Value,
    error: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ScheduleRecord> for ScheduledMessage {
    type Error = DomainError;

    fn try_from(record: ScheduleRecord) -> Result<Self, Self::Error> {
        let target = match (record.target_list_id, record.target_external_id) {
            (Some(list_id), None) => ScheduleTarget::List { list_id },
            (None, Some(external_id)) => ScheduleTarget::Contact {
                external_id,
                is_group: record.is_group,
            },
            _ => {
                return Err(DomainError::Other(anyhow::anyhow!(
                    "scheduled message {} has an invalid target",
                    record.id
                )));
            }
        };
        let status = ScheduleStatus::from_str(&record.status).ok_or_else(|| {
            DomainError::Other(anyhow::anyhow!(
                "unknown schedule status '{}'",
                record.status
            ))
        })?;
        let personalization: HashMap<String, serde_json::Value> =
            if record.personalization.is_null() {
                HashMap::new()
            } else {
                serde_json::from_value(record.personalization)
                    .map_err(|err| DomainError::Other(err.into()))?
            };
        Ok(ScheduledMessage {
            id: record.id,
            content_id: record.content_id,
            target,
            scheduled_at: record.scheduled_at,
            status,
            personalization,
            error: record.error,
            created_at: record.created_at,
            updated_at: record.updated_at,
        })
    }
}

#[derive(FromRow)]
struct DeliveryRecordRow {
    id: Uuid,
    schedule_id: Option<Uuid>,
    recipient_external_id: String,
    content_name: String,
    body: String,
    provider_message_id: Option<String>,
    status: String,
    error: Option<String>,
    is_group: bool,
    sent_at: DateTime<Utc>,
    status_updated_at: Option<DateTime<Utc>>,
}

impl TryFrom<DeliveryRecordRow> for DeliveryRecord {
    type Error = DomainError;

    fn try_from(row: DeliveryRecordRow) -> Result<Self, Self::Error> {
        let status = DeliveryStatus::from_str(&row.status).ok_or_else(|| {
            DomainError::Other(anyhow::anyhow!("unknown delivery status '{}'", row.status))
        })?;
        Ok(DeliveryRecord {
            id: row.id,
            schedule_id: row.schedule_id,
            recipient_external_id: row.recipient_external_id,
            content_name: row.content_name,
            body: row.body,
            provider_message_id: row.provider_message_id,
            status,
            error: row.error,
            is_group: row.is_group,
            sent_at: row.sent_at,
            status_updated_at: row.status_updated_at,
        })
    }
}
