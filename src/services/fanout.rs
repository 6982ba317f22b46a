//! Notification fanout
//!
//! Turns thread writes and routing/bid changes into per-recipient
//! notification records and announces each persisted record on the push bus.
//! Writes are at-least-once per recipient: every recipient retries
//! independently, and a failure for one recipient never rolls back another's
//! record or the triggering append.

use std::sync::Arc;
use std::time::Duration;

use backoff::ExponentialBackoff;
use uuid::Uuid;

use crate::domain::{
    BidStatus, Message, NewNotification, Notification, NotificationKind, Project, RoutingChange,
};
use crate::services::events::{ChannelEvent, EventBus};
use crate::store::{NotificationStore, StoreError};

const PREVIEW_LEN: usize = 80;

/// Retry policy for a single recipient write.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub max_elapsed: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(100),
            max_interval: Duration::from_secs(2),
            max_elapsed: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    fn build(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.initial_interval,
            max_interval: self.max_interval,
            max_elapsed_time: Some(self.max_elapsed),
            ..ExponentialBackoff::default()
        }
    }
}

pub struct NotificationFanout {
    store: Arc<dyn NotificationStore>,
    bus: EventBus,
    retry: RetryPolicy,
}

impl NotificationFanout {
    pub fn new(store: Arc<dyn NotificationStore>, bus: EventBus) -> Self {
        Self {
            store,
            bus,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(store: Arc<dyn NotificationStore>, bus: EventBus, retry: RetryPolicy) -> Self {
        Self { store, bus, retry }
    }

    /// Fanout for a newly appended message.
    ///
    /// Recipients are the project owner and the thread's vendor, minus the
    /// sender. Admins monitor by pulling and are never auto-notified.
    /// Returns the records that were persisted.
    pub async fn on_message_appended(
        &self,
        project: &Project,
        message: &Message,
    ) -> Vec<Notification> {
        let mut recipients: Vec<Uuid> = vec![project.owner_id, message.vendor_id];
        recipients.dedup();
        recipients.retain(|r| *r != message.sender_id);

        let mut written = Vec::new();
        for recipient in recipients {
            let new = NewNotification {
                user_id: recipient,
                kind: NotificationKind::Info,
                title: format!("New message on {}", project.name),
                message: Some(preview(&message.text)),
                data: serde_json::json!({
                    "project_id": message.project_id,
                    "vendor_id": message.vendor_id,
                    "message_id": message.id,
                }),
            };
            if let Some(n) = self.persist(new).await {
                written.push(n);
            }
        }
        written
    }

    /// Fanout for a routing or bid lifecycle change coming in from the
    /// external workflow.
    pub async fn on_routing_or_bid_change(
        &self,
        project: &Project,
        change: &RoutingChange,
    ) -> Vec<Notification> {
        let new = match change {
            RoutingChange::VendorRouted { vendor_id, .. } => NewNotification {
                user_id: *vendor_id,
                kind: NotificationKind::Info,
                title: "New project match".to_string(),
                message: Some(format!(
                    "You've been matched with '{}'. Review the brief and place a bid.",
                    project.name
                )),
                data: serde_json::json!({ "project_id": project.id }),
            },
            RoutingChange::BidStatusChanged {
                vendor_id, status, ..
            } => match status {
                BidStatus::Submitted => NewNotification {
                    user_id: project.owner_id,
                    kind: NotificationKind::Info,
                    title: format!("New bid on {}", project.name),
                    message: Some(
                        "A vendor placed a bid. Open the thread to discuss details.".to_string(),
                    ),
                    data: serde_json::json!({
                        "project_id": project.id,
                        "vendor_id": vendor_id,
                    }),
                },
                BidStatus::Accepted => NewNotification {
                    user_id: *vendor_id,
                    kind: NotificationKind::Success,
                    title: "Your bid was accepted!".to_string(),
                    message: Some(format!(
                        "Congratulations! Your bid on '{}' has been selected.",
                        project.name
                    )),
                    data: serde_json::json!({ "project_id": project.id }),
                },
                BidStatus::Rejected => NewNotification {
                    user_id: *vendor_id,
                    kind: NotificationKind::Warning,
                    title: "Bid not selected".to_string(),
                    message: Some(format!(
                        "Your bid on '{}' was not selected. Keep bidding on other projects!",
                        project.name
                    )),
                    data: serde_json::json!({ "project_id": project.id }),
                },
                BidStatus::NoBid => return Vec::new(),
            },
        };

        self.persist(new).await.into_iter().collect()
    }

    /// Persist one recipient's record, retrying transient failures, then
    /// announce it on the push bus. Exhausted retries are logged and
    /// swallowed; the triggering operation already succeeded.
    async fn persist(&self, new: NewNotification) -> Option<Notification> {
        let recipient = new.user_id;
        let result: Result<Notification, StoreError> =
            backoff::future::retry(self.retry.build(), || {
                let new = new.clone();
                async move { self.store.insert(new).await.map_err(backoff::Error::transient) }
            })
            .await;

        match result {
            Ok(n) => {
                tracing::info!(
                    user_id = %recipient,
                    notification_id = %n.id,
                    kind = n.kind.as_str(),
                    "Notification created"
                );
                self.bus.publish(ChannelEvent::Notification(n.clone()));
                Some(n)
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    user_id = %recipient,
                    "Notification write failed after retries"
                );
                None
            }
        }
    }
}

fn preview(text: &str) -> String {
    if text.chars().count() <= PREVIEW_LEN {
        text.to_string()
    } else {
        let cut: String = text.chars().take(PREVIEW_LEN).collect();
        format!("{cut}…")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;

    use axum::async_trait;
    use chrono::{DateTime, Utc};
    use parking_lot::Mutex;

    use crate::domain::ProjectStatus;
    use crate::store::MemoryStore;

    /// Store wrapper that injects per-recipient insert failures.
    struct FlakyStore {
        inner: MemoryStore,
        fail_remaining: Mutex<HashMap<Uuid, u32>>,
    }

    impl FlakyStore {
        fn new() -> Self {
            Self {
                inner: MemoryStore::new(),
                fail_remaining: Mutex::new(HashMap::new()),
            }
        }

        fn fail_times(&self, user_id: Uuid, times: u32) {
            self.fail_remaining.lock().insert(user_id, times);
        }
    }

    #[async_trait]
    impl NotificationStore for FlakyStore {
        async fn insert(&self, new: NewNotification) -> Result<Notification, StoreError> {
            {
                let mut remaining = self.fail_remaining.lock();
                if let Some(n) = remaining.get_mut(&new.user_id) {
                    if *n > 0 {
                        if *n != u32::MAX {
                            *n -= 1;
                        }
                        return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
                    }
                }
            }
            self.inner.insert(new).await
        }

        async fn list_for_user(
            &self,
            user_id: Uuid,
            unread_only: bool,
            limit: i64,
            offset: i64,
        ) -> Result<(Vec<Notification>, i64), StoreError> {
            self.inner
                .list_for_user(user_id, unread_only, limit, offset)
                .await
        }

        async fn list_since(
            &self,
            user_id: Uuid,
            since: Option<DateTime<Utc>>,
        ) -> Result<Vec<Notification>, StoreError> {
            self.inner.list_since(user_id, since).await
        }

        async fn unread_count(&self, user_id: Uuid) -> Result<i64, StoreError> {
            self.inner.unread_count(user_id).await
        }

        async fn mark_read(&self, user_id: Uuid, id: Uuid) -> Result<bool, StoreError> {
            self.inner.mark_read(user_id, id).await
        }

        async fn mark_all_read(&self, user_id: Uuid) -> Result<u64, StoreError> {
            self.inner.mark_all_read(user_id).await
        }

        async fn delete(&self, user_id: Uuid, id: Uuid) -> Result<bool, StoreError> {
            self.inner.delete(user_id, id).await
        }
    }

    fn test_retry() -> RetryPolicy {
        RetryPolicy {
            initial_interval: Duration::from_millis(1),
            max_interval: Duration::from_millis(5),
            max_elapsed: Duration::from_millis(100),
        }
    }

    fn fanout_over(store: Arc<dyn NotificationStore>) -> NotificationFanout {
        NotificationFanout::with_retry(store, EventBus::new(16), test_retry())
    }

    fn project(owner_id: Uuid) -> Project {
        let now = Utc::now();
        Project {
            id: Uuid::new_v4(),
            owner_id,
            name: "Packaging design".to_string(),
            status: ProjectStatus::Open,
            selected_vendor_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn message(project: &Project, vendor_id: Uuid, sender_id: Uuid) -> Message {
        Message {
            id: Uuid::new_v4(),
            project_id: project.id,
            sender_id,
            vendor_id,
            text: "Here's the first draft".to_string(),
            image_url: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn message_fanout_skips_the_sender() {
        let store = Arc::new(MemoryStore::new());
        let fanout = fanout_over(store.clone());
        let owner = Uuid::new_v4();
        let vendor = Uuid::new_v4();
        let p = project(owner);

        // Vendor-authored message notifies the business only.
        let written = fanout
            .on_message_appended(&p, &message(&p, vendor, vendor))
            .await;
        assert_eq!(written.len(), 1);
        assert_eq!(written[0].user_id, owner);

        // Business-authored message notifies the vendor only.
        let written = fanout
            .on_message_appended(&p, &message(&p, vendor, owner))
            .await;
        assert_eq!(written.len(), 1);
        assert_eq!(written[0].user_id, vendor);
    }

    #[tokio::test]
    async fn admin_written_message_notifies_both_sides_and_no_admin() {
        let store = Arc::new(MemoryStore::new());
        let fanout = fanout_over(store.clone());
        let owner = Uuid::new_v4();
        let vendor = Uuid::new_v4();
        let admin = Uuid::new_v4();
        let p = project(owner);

        let written = fanout
            .on_message_appended(&p, &message(&p, vendor, admin))
            .await;
        let recipients: Vec<Uuid> = written.iter().map(|n| n.user_id).collect();
        assert_eq!(recipients.len(), 2);
        assert!(recipients.contains(&owner));
        assert!(recipients.contains(&vendor));
        assert!(!recipients.contains(&admin));
    }

    #[tokio::test]
    async fn transient_failures_are_retried_until_the_record_lands() {
        let store = Arc::new(FlakyStore::new());
        let fanout = fanout_over(store.clone());
        let owner = Uuid::new_v4();
        let vendor = Uuid::new_v4();
        let p = project(owner);

        store.fail_times(owner, 2);

        let written = fanout
            .on_message_appended(&p, &message(&p, vendor, vendor))
            .await;
        assert_eq!(written.len(), 1);
        assert_eq!(store.inner.unread_count(owner).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn one_failing_recipient_does_not_block_the_other() {
        let store = Arc::new(FlakyStore::new());
        let fanout = fanout_over(store.clone());
        let owner = Uuid::new_v4();
        let vendor = Uuid::new_v4();
        let admin = Uuid::new_v4();
        let p = project(owner);

        store.fail_times(owner, u32::MAX);

        // Admin-authored write targets both sides; the owner's record keeps
        // failing, the vendor's still lands.
        let written = fanout
            .on_message_appended(&p, &message(&p, vendor, admin))
            .await;
        assert_eq!(written.len(), 1);
        assert_eq!(written[0].user_id, vendor);
        assert_eq!(store.inner.unread_count(vendor).await.unwrap(), 1);
        assert_eq!(store.inner.unread_count(owner).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn routing_and_bid_changes_notify_the_affected_party() {
        let store = Arc::new(MemoryStore::new());
        let fanout = fanout_over(store.clone());
        let owner = Uuid::new_v4();
        let vendor = Uuid::new_v4();
        let p = project(owner);

        let routed = fanout
            .on_routing_or_bid_change(
                &p,
                &RoutingChange::VendorRouted {
                    project_id: p.id,
                    vendor_id: vendor,
                },
            )
            .await;
        assert_eq!(routed[0].user_id, vendor);
        assert_eq!(routed[0].kind, NotificationKind::Info);

        let submitted = fanout
            .on_routing_or_bid_change(
                &p,
                &RoutingChange::BidStatusChanged {
                    project_id: p.id,
                    vendor_id: vendor,
                    status: BidStatus::Submitted,
                },
            )
            .await;
        assert_eq!(submitted[0].user_id, owner);

        let accepted = fanout
            .on_routing_or_bid_change(
                &p,
                &RoutingChange::BidStatusChanged {
                    project_id: p.id,
                    vendor_id: vendor,
                    status: BidStatus::Accepted,
                },
            )
            .await;
        assert_eq!(accepted[0].user_id, vendor);
        assert_eq!(accepted[0].kind, NotificationKind::Success);

        let no_bid = fanout
            .on_routing_or_bid_change(
                &p,
                &RoutingChange::BidStatusChanged {
                    project_id: p.id,
                    vendor_id: vendor,
                    status: BidStatus::NoBid,
                },
            )
            .await;
        assert!(no_bid.is_empty());
    }
}
