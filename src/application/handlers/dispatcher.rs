use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use tracing::{error, info, warn};

use crate::application::services::{delivery::DeliveryService, renderer};
use crate::domain::{
    errors::{DomainError, DomainResult},
    models::{ScheduleStatus, ScheduledMessage},
    repositories::{ContactRepository, ContentRepository, ScheduleRepository},
};

/// Unexpected per-entry errors are stored on the entry, truncated so a
/// pathological error chain cannot blow up the row.
const ERROR_SNIPPET_LEN: usize = 250;

/// What one dispatch cycle did.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub dispatched: usize,
    pub failed: usize,
    /// Entries another cycle claimed between our fetch and our claim.
    pub already_claimed: usize,
}

enum EntryOutcome {
    Dispatched,
    Failed,
    AlreadyClaimed,
}

/// Drives due scheduled messages to a terminal state: claim, resolve,
/// render, send, record. Invoked periodically by the host; one call
/// processes at most one batch.
///
/// Entries are processed sequentially and independently. The claim
/// (pending -> processing) is persisted before any network call, so an
/// overlapping cycle can never dispatch the same entry twice and a crash
/// leaves an inspectable `processing` marker rather than a double send.
pub struct Dispatcher {
    schedules: Arc<dyn ScheduleRepository>,
    contents: Arc<dyn ContentRepository>,
    contacts: Arc<dyn ContactRepository>,
    delivery: Arc<DeliveryService>,
    stop: AtomicBool,
}

impl Dispatcher {
    pub fn new(
        schedules: Arc<dyn ScheduleRepository>,
        contents: Arc<dyn ContentRepository>,
        contacts: Arc<dyn ContactRepository>,
        delivery: Arc<DeliveryService>,
    ) -> Self {
        Self {
            schedules,
            contents,
            contacts,
            delivery,
            stop: AtomicBool::new(false),
        }
    }

    /// Requests cooperative shutdown. The running cycle finishes the
    /// entry it is on and stops before the next one; interrupting a
    /// gateway call mid-flight would risk an unrecorded double send.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    /// Runs one dispatch cycle over at most `batch_size` due entries.
    /// A failure to fetch the batch propagates to the caller; everything
    /// after that is contained per entry.
    pub async fn run_cycle(&self, batch_size: u32) -> DomainResult<CycleReport> {
        let due = self.schedules.due_before(Utc::now(), batch_size).await?;
        let mut report = CycleReport::default();

        if due.is_empty() {
            return Ok(report);
        }
        info!(count = due.len(), "dispatching due messages");

        for entry in due {
            if self.stop.load(Ordering::Relaxed) {
                info!("stop requested, ending cycle early");
                break;
            }
            match self.process_entry(&entry).await {
                Ok(EntryOutcome::Dispatched) => report.dispatched += 1,
                Ok(EntryOutcome::Failed) => report.failed += 1,
                Ok(EntryOutcome::AlreadyClaimed) => report.already_claimed += 1,
                Err(err) => {
                    // One entry must never abort the batch: force the
                    // entry to failed and move on.
                    report.failed += 1;
                    error!(schedule_id = %entry.id, error = %err, "unexpected dispatch error");
                    let detail =
                        format!("processing error: {}", truncate(&err.to_string(), ERROR_SNIPPET_LEN));
                    if let Err(update_err) = self
                        .schedules
                        .set_status(entry.id, ScheduleStatus::Failed, Some(detail))
                        .await
                    {
                        error!(
                            schedule_id = %entry.id,
                            error = %update_err,
                            "failed to mark message as failed"
                        );
                    }
                }
            }
        }

        info!(
            dispatched = report.dispatched,
            failed = report.failed,
            already_claimed = report.already_claimed,
            "dispatch cycle finished"
        );
        Ok(report)
    }

    async fn process_entry(&self, entry: &ScheduledMessage) -> DomainResult<EntryOutcome> {
        match self.schedules.claim(entry.id).await {
            Ok(true) => {}
            Ok(false) => return Ok(EntryOutcome::AlreadyClaimed),
            // Deleted between fetch and claim; nothing left to do.
            Err(DomainError::NotFound(_)) => return Ok(EntryOutcome::AlreadyClaimed),
            Err(err) => return Err(err),
        }

        let Some(content) = self.contents.get(entry.content_id).await? else {
            return self
                .fail_entry(entry, format!("message content {} not found", entry.content_id))
                .await;
        };

        let Some(external_id) = entry.target.contact_external_id() else {
            // A list target should have been expanded at broadcast time.
            return self
                .fail_entry(entry, "target list was never expanded to contacts".to_string())
                .await;
        };

        let Some(contact) = self.contacts.get_by_external_id(external_id).await? else {
            return self
                .fail_entry(entry, format!("contact with WhatsApp ID {external_id} not found"))
                .await;
        };

        let body = renderer::render(&content.body, &contact, &entry.personalization);

        let outcome = self
            .delivery
            .send_text(
                external_id,
                &body,
                &content.name,
                Some(entry.id),
                entry.target.is_group(),
            )
            .await?;

        if outcome.success {
            self.schedules
                .set_status(entry.id, ScheduleStatus::Sent, None)
                .await?;
            Ok(EntryOutcome::Dispatched)
        } else {
            let detail = outcome.error.unwrap_or_else(|| "send failed".to_string());
            self.fail_entry(entry, detail).await
        }
    }

    async fn fail_entry(
        &self,
        entry: &ScheduledMessage,
        detail: String,
    ) -> DomainResult<EntryOutcome> {
        warn!(schedule_id = %entry.id, error = %detail, "scheduled message failed");
        self.schedules
            .set_status(entry.id, ScheduleStatus::Failed, Some(detail))
            .await?;
        Ok(EntryOutcome::Failed)
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::services::delivery::MessageGateway;
    use crate::domain::models::{
        Contact, DeliveryStatus, MessageContent, NewSchedule, ScheduleTarget,
    };
    use crate::domain::repositories::DeliveryLogRepository;
    use crate::infrastructure::repositories::in_memory::{
        InMemoryContactRepository, InMemoryContentRepository, InMemoryDeliveryLogRepository,
        InMemoryScheduleRepository,
    };
    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;
    use uuid::Uuid;

    /// Scripted gateway: fails for configured recipients, records calls.
    struct MockGateway {
        fail_for: HashSet<String>,
        calls: Mutex<Vec<(String, String)>>,
    }

    impl MockGateway {
        fn new(fail_for: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                fail_for: fail_for.iter().map(|s| s.to_string()).collect(),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn sent_bodies(&self) -> Vec<String> {
            self.calls.lock().unwrap().iter().map(|(_, b)| b.clone()).collect()
        }
    }

    #[async_trait]
    impl MessageGateway for MockGateway {
        async fn send(&self, recipient: &str, body: &str) -> anyhow::Result<String> {
            self.calls
                .lock()
                .unwrap()
                .push((recipient.to_string(), body.to_string()));
            if self.fail_for.contains(recipient) {
                anyhow::bail!("simulated API error for {recipient}");
            }
            Ok(format!("wamid.mock_{recipient}"))
        }
    }

    struct Fixture {
        schedules: Arc<InMemoryScheduleRepository>,
        contents: Arc<InMemoryContentRepository>,
        contacts: Arc<InMemoryContactRepository>,
        deliveries: Arc<InMemoryDeliveryLogRepository>,
        gateway: Arc<MockGateway>,
        dispatcher: Dispatcher,
    }

    fn fixture(fail_for: &[&str]) -> Fixture {
        let schedules = Arc::new(InMemoryScheduleRepository::new());
        let contents = Arc::new(InMemoryContentRepository::new());
        let contacts = Arc::new(InMemoryContactRepository::new());
        let deliveries = Arc::new(InMemoryDeliveryLogRepository::new());
        let gateway = MockGateway::new(fail_for);
        let delivery = Arc::new(DeliveryService::new(gateway.clone(), deliveries.clone()));
        let dispatcher = Dispatcher::new(
            schedules.clone(),
            contents.clone(),
            contacts.clone(),
            delivery,
        );
        Fixture {
            schedules,
            contents,
            contacts,
            deliveries,
            gateway,
            dispatcher,
        }
    }

    async fn seed_contact(fx: &Fixture, external_id: &str, name: &str) -> Contact {
        fx.contacts
            .upsert(&Contact::new(external_id.to_string(), Some(name.to_string())))
            .await
            .unwrap()
    }

    async fn seed_content(fx: &Fixture, body: &str) -> MessageContent {
        let content = MessageContent::new("Campaign".to_string(), body.to_string(), None);
        fx.contents.upsert(&content).await.unwrap();
        content
    }

    async fn seed_entry_at(
        fx: &Fixture,
        content_id: Uuid,
        external_id: &str,
        minutes_ago: i64,
    ) -> ScheduledMessage {
        let schedule = ScheduledMessage::from_new(NewSchedule {
            content_id,
            target: ScheduleTarget::Contact {
                external_id: external_id.to_string(),
                is_group: false,
            },
            scheduled_at: Utc::now() - Duration::minutes(minutes_ago),
            personalization: HashMap::new(),
        });
        fx.schedules.insert(&schedule).await.unwrap();
        schedule
    }

    async fn seed_due_entry(fx: &Fixture, content_id: Uuid, external_id: &str) -> ScheduledMessage {
        seed_entry_at(fx, content_id, external_id, 1).await
    }

    #[tokio::test]
    async fn due_entry_ends_sent_with_one_delivery_record() {
        let fx = fixture(&[]);
        seed_contact(&fx, "555", "Alice").await;
        let content = seed_content(&fx, "Hi {{name}}!").await;
        let entry = seed_due_entry(&fx, content.id, "555").await;

        let report = fx.dispatcher.run_cycle(10).await.unwrap();
        assert_eq!(report.dispatched, 1);
        assert_eq!(report.failed, 0);

        let updated = fx.schedules.get(entry.id).await.unwrap().unwrap();
        assert_eq!(updated.status, ScheduleStatus::Sent);

        let records = fx.deliveries.list_by_schedule(entry.id).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, DeliveryStatus::ApiSent);
        assert_eq!(records[0].body, "Hi Alice!");
        assert!(records[0].provider_message_id.is_some());
        assert_eq!(fx.gateway.sent_bodies(), vec!["Hi Alice!".to_string()]);
    }

    #[tokio::test]
    async fn gateway_failure_ends_failed_and_entry_leaves_due_set() {
        let fx = fixture(&["555"]);
        seed_contact(&fx, "555", "Alice").await;
        let content = seed_content(&fx, "Hi {{name}}!").await;
        let entry = seed_due_entry(&fx, content.id, "555").await;

        let report = fx.dispatcher.run_cycle(10).await.unwrap();
        assert_eq!(report.failed, 1);

        let updated = fx.schedules.get(entry.id).await.unwrap().unwrap();
        assert_eq!(updated.status, ScheduleStatus::Failed);
        assert!(updated.error.as_deref().unwrap_or("").contains("simulated API error"));

        let records = fx.deliveries.list_by_schedule(entry.id).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, DeliveryStatus::ApiFailed);

        // Failed is terminal: a second cycle finds nothing to do.
        let report = fx.dispatcher.run_cycle(10).await.unwrap();
        assert_eq!(report, CycleReport::default());
    }

    #[tokio::test]
    async fn missing_content_is_permanent_failure() {
        let fx = fixture(&[]);
        seed_contact(&fx, "555", "Alice").await;
        let entry = seed_due_entry(&fx, Uuid::new_v4(), "555").await;

        let report = fx.dispatcher.run_cycle(10).await.unwrap();
        assert_eq!(report.failed, 1);

        let updated = fx.schedules.get(entry.id).await.unwrap().unwrap();
        assert_eq!(updated.status, ScheduleStatus::Failed);
        assert!(updated.error.as_deref().unwrap_or("").contains("not found"));
        // No gateway call, no delivery record for missing references.
        assert!(fx.gateway.sent_bodies().is_empty());
        assert!(fx.deliveries.list_by_schedule(entry.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_contact_is_permanent_failure() {
        let fx = fixture(&[]);
        let content = seed_content(&fx, "Hi!").await;
        let entry = seed_due_entry(&fx, content.id, "999").await;

        fx.dispatcher.run_cycle(10).await.unwrap();
        let updated = fx.schedules.get(entry.id).await.unwrap().unwrap();
        assert_eq!(updated.status, ScheduleStatus::Failed);
        assert!(updated.error.as_deref().unwrap_or("").contains("999"));
    }

    #[tokio::test]
    async fn one_bad_entry_does_not_abort_the_batch() {
        let fx = fixture(&["111"]);
        seed_contact(&fx, "111", "Bad").await;
        seed_contact(&fx, "222", "Good").await;
        let content = seed_content(&fx, "Hi {{name}}!").await;
        // Earlier scheduled time so the failing entry is processed first.
        let bad = seed_entry_at(&fx, content.id, "111", 5).await;
        let good = seed_entry_at(&fx, content.id, "222", 1).await;

        let report = fx.dispatcher.run_cycle(10).await.unwrap();
        assert_eq!(report.dispatched, 1);
        assert_eq!(report.failed, 1);

        assert_eq!(
            fx.schedules.get(bad.id).await.unwrap().unwrap().status,
            ScheduleStatus::Failed
        );
        assert_eq!(
            fx.schedules.get(good.id).await.unwrap().unwrap().status,
            ScheduleStatus::Sent
        );
    }

    #[tokio::test]
    async fn unexpanded_list_target_fails_permanently() {
        let fx = fixture(&[]);
        let content = seed_content(&fx, "Hi!").await;
        let schedule = ScheduledMessage::from_new(NewSchedule {
            content_id: content.id,
            target: ScheduleTarget::List { list_id: Uuid::new_v4() },
            scheduled_at: Utc::now() - Duration::minutes(1),
            personalization: HashMap::new(),
        });
        fx.schedules.insert(&schedule).await.unwrap();

        let report = fx.dispatcher.run_cycle(10).await.unwrap();
        assert_eq!(report.failed, 1);
        let updated = fx.schedules.get(schedule.id).await.unwrap().unwrap();
        assert_eq!(updated.status, ScheduleStatus::Failed);
        assert!(updated.error.as_deref().unwrap_or("").contains("never expanded"));
    }

    #[tokio::test]
    async fn claimed_entry_is_never_dispatched_again() {
        let fx = fixture(&[]);
        seed_contact(&fx, "555", "Alice").await;
        let content = seed_content(&fx, "Hi!").await;
        let entry = seed_due_entry(&fx, content.id, "555").await;

        // Another cycle got there first.
        assert!(fx.schedules.claim(entry.id).await.unwrap());

        let report = fx.dispatcher.run_cycle(10).await.unwrap();
        assert_eq!(report.already_claimed, 0); // not even fetched: no longer pending
        assert_eq!(report.dispatched, 0);
        assert!(fx.gateway.sent_bodies().is_empty());
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("short", 250), "short");
    }
}
