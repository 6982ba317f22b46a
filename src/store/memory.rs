//! In-memory storage backend
//!
//! Process-local single point of truth for dev runs and tests. Each thread
//! key owns its own lock, so appends to the same thread serialize while
//! appends to different threads proceed independently. Routing/bid facts are
//! seeded through the same methods the external workflow would otherwise
//! write through its own tables.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use axum::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use uuid::{ContextV7, Timestamp, Uuid};

use crate::domain::{
    Bid, BidStatus, Message, NewMessage, NewNotification, Notification, Project, RoutingEntry,
    ThreadKey, ThreadScope,
};
use crate::store::{NotificationStore, RoutingGate, StoreError, ThreadStore};

pub struct MemoryStore {
    threads: RwLock<HashMap<ThreadKey, Arc<Mutex<Vec<Message>>>>>,
    notifications: Mutex<Vec<Notification>>,
    projects: RwLock<HashMap<Uuid, Project>>,
    routing: RwLock<Vec<RoutingEntry>>,
    bids: RwLock<Vec<Bid>>,
    /// Shared v7 context; keeps message ids ordered even within one
    /// millisecond.
    uuid_ctx: std::sync::Mutex<ContextV7>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            threads: RwLock::new(HashMap::new()),
            notifications: Mutex::new(Vec::new()),
            projects: RwLock::new(HashMap::new()),
            routing: RwLock::new(Vec::new()),
            bids: RwLock::new(Vec::new()),
            uuid_ctx: std::sync::Mutex::new(ContextV7::new()),
        }
    }

    fn next_message_id(&self) -> Uuid {
        Uuid::new_v7(Timestamp::now(&self.uuid_ctx))
    }

    // ------------------------------------------------------------------
    // Externally-owned facts. In production these rows belong to the
    // project/routing/bidding workflow; the memory backend stands in for
    // those tables in dev and test runs.
    // ------------------------------------------------------------------

    pub fn upsert_project(&self, project: Project) {
        self.projects.write().insert(project.id, project);
    }

    pub fn add_routing_entry(&self, project_id: Uuid, vendor_id: Uuid) -> RoutingEntry {
        let entry = RoutingEntry {
            project_id,
            vendor_id,
            routed_at: Utc::now(),
        };
        self.routing.write().push(entry.clone());
        entry
    }

    pub fn upsert_bid(&self, project_id: Uuid, vendor_id: Uuid, status: BidStatus) {
        let mut bids = self.bids.write();
        if let Some(bid) = bids
            .iter_mut()
            .find(|b| b.project_id == project_id && b.vendor_id == vendor_id)
        {
            bid.status = status;
            bid.updated_at = Utc::now();
        } else {
            let now = Utc::now();
            bids.push(Bid {
                project_id,
                vendor_id,
                status,
                created_at: now,
                updated_at: now,
            });
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn sort_key(m: &Message) -> (DateTime<Utc>, Uuid) {
    (m.created_at, m.id)
}

#[async_trait]
impl ThreadStore for MemoryStore {
    async fn append(&self, key: ThreadKey, new: NewMessage) -> Result<Message, StoreError> {
        if !key.is_well_formed() {
            return Err(StoreError::MalformedThreadKey);
        }

        let slot = self.threads.write().entry(key).or_default().clone();
        let mut thread = slot.lock();

        // Wall clocks can step backwards; the per-thread order must not.
        let now = Utc::now();
        let created_at = match thread.last() {
            Some(last) if last.created_at > now => last.created_at,
            _ => now,
        };

        let message = Message {
            id: self.next_message_id(),
            project_id: key.project_id,
            sender_id: new.sender_id,
            vendor_id: key.vendor_id,
            text: new.text,
            image_url: new.image_url,
            created_at,
        };
        thread.push(message.clone());
        Ok(message)
    }

    async fn list(
        &self,
        project_id: Uuid,
        scope: ThreadScope,
        cursor: Option<Uuid>,
    ) -> Result<Vec<Message>, StoreError> {
        if project_id.is_nil() {
            return Err(StoreError::MalformedThreadKey);
        }
        if let ThreadScope::Vendor(v) = scope {
            if v.is_nil() {
                return Err(StoreError::MalformedThreadKey);
            }
        }

        let mut messages: Vec<Message> = {
            let threads = self.threads.read();
            match scope {
                ThreadScope::Vendor(vendor_id) => threads
                    .get(&ThreadKey::new(project_id, vendor_id))
                    .map(|slot| slot.lock().clone())
                    .unwrap_or_default(),
                ThreadScope::Project => {
                    let mut all = Vec::new();
                    for (key, slot) in threads.iter() {
                        if key.project_id == project_id {
                            all.extend(slot.lock().iter().cloned());
                        }
                    }
                    all
                }
            }
        };

        messages.sort_by(|a, b| sort_key(a).cmp(&sort_key(b)));

        if let Some(cursor) = cursor {
            let after = messages
                .iter()
                .find(|m| m.id == cursor)
                .map(sort_key)
                .ok_or_else(|| StoreError::NotFound("cursor message not in thread".to_string()))?;
            messages.retain(|m| sort_key(m) > after);
        }

        Ok(messages)
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn insert(&self, new: NewNotification) -> Result<Notification, StoreError> {
        let notification = Notification {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            kind: new.kind,
            title: new.title,
            message: new.message,
            data: new.data,
            is_read: false,
            read_at: None,
            created_at: Utc::now(),
        };
        self.notifications.lock().push(notification.clone());
        Ok(notification)
    }

    async fn list_for_user(
        &self,
        user_id: Uuid,
        unread_only: bool,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Notification>, i64), StoreError> {
        let notifications = self.notifications.lock();
        let mut matching: Vec<Notification> = notifications
            .iter()
            .filter(|n| n.user_id == user_id && (!unread_only || !n.is_read))
            .cloned()
            .collect();
        matching.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));

        let total = matching.len() as i64;
        let page = matching
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect();
        Ok((page, total))
    }

    async fn list_since(
        &self,
        user_id: Uuid,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Notification>, StoreError> {
        let notifications = self.notifications.lock();
        let mut matching: Vec<Notification> = notifications
            .iter()
            .filter(|n| n.user_id == user_id && since.map_or(true, |s| n.created_at >= s))
            .cloned()
            .collect();
        matching.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
        Ok(matching)
    }

    async fn unread_count(&self, user_id: Uuid) -> Result<i64, StoreError> {
        let count = self
            .notifications
            .lock()
            .iter()
            .filter(|n| n.user_id == user_id && !n.is_read)
            .count();
        Ok(count as i64)
    }

    async fn mark_read(&self, user_id: Uuid, id: Uuid) -> Result<bool, StoreError> {
        let mut notifications = self.notifications.lock();
        match notifications
            .iter_mut()
            .find(|n| n.id == id && n.user_id == user_id)
        {
            Some(n) => {
                if !n.is_read {
                    n.is_read = true;
                    n.read_at = Some(Utc::now());
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn mark_all_read(&self, user_id: Uuid) -> Result<u64, StoreError> {
        let mut notifications = self.notifications.lock();
        let now = Utc::now();
        let mut marked = 0u64;
        for n in notifications
            .iter_mut()
            .filter(|n| n.user_id == user_id && !n.is_read)
        {
            n.is_read = true;
            n.read_at = Some(now);
            marked += 1;
        }
        Ok(marked)
    }

    async fn delete(&self, user_id: Uuid, id: Uuid) -> Result<bool, StoreError> {
        let mut notifications = self.notifications.lock();
        let before = notifications.len();
        notifications.retain(|n| !(n.id == id && n.user_id == user_id));
        Ok(notifications.len() < before)
    }
}

#[async_trait]
impl RoutingGate for MemoryStore {
    async fn project(&self, project_id: Uuid) -> Result<Option<Project>, StoreError> {
        Ok(self.projects.read().get(&project_id).cloned())
    }

    async fn is_routed(&self, project_id: Uuid, vendor_id: Uuid) -> Result<bool, StoreError> {
        Ok(self
            .routing
            .read()
            .iter()
            .any(|r| r.project_id == project_id && r.vendor_id == vendor_id))
    }

    async fn bid_status(
        &self,
        project_id: Uuid,
        vendor_id: Uuid,
    ) -> Result<BidStatus, StoreError> {
        Ok(self
            .bids
            .read()
            .iter()
            .find(|b| b.project_id == project_id && b.vendor_id == vendor_id)
            .map(|b| b.status)
            .unwrap_or_default())
    }

    async fn eligible_vendors(&self, project_id: Uuid) -> Result<Vec<Uuid>, StoreError> {
        let mut seen = HashSet::new();
        let mut vendors = Vec::new();
        for r in self.routing.read().iter() {
            if r.project_id == project_id && seen.insert(r.vendor_id) {
                vendors.push(r.vendor_id);
            }
        }
        for b in self.bids.read().iter() {
            if b.project_id == project_id && b.status.grants_access() && seen.insert(b.vendor_id)
            {
                vendors.push(b.vendor_id);
            }
        }
        Ok(vendors)
    }
}
