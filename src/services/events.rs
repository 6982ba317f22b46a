//! Push event bus
//!
//! In-process broadcast channel carrying message, notification, and
//! heartbeat events. The bus is the push half of the delivery channel; the
//! polling fallback covers anything a subscriber misses, so lag and
//! no-subscriber conditions are not errors here.

use std::time::Duration;

use axum::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::domain::{Message, Notification, ThreadScope};
use crate::services::delivery::{PushSubscription, PushTransport, TransportError};

/// Event pushed to subscribed client sessions.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChannelEvent {
    Message(Message),
    Notification(Notification),
    Heartbeat { at: DateTime<Utc> },
}

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ChannelEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish to every live subscriber.
    pub fn publish(&self, event: ChannelEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("No live subscribers for push event");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChannelEvent> {
        self.tx.subscribe()
    }

    /// Emit a liveness heartbeat on a fixed cadence. Sessions that stop
    /// seeing heartbeats fall back to polling.
    pub fn spawn_heartbeat(&self, interval: Duration) -> tokio::task::JoinHandle<()> {
        let bus = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                bus.publish(ChannelEvent::Heartbeat { at: Utc::now() });
            }
        })
    }
}

/// What one session is allowed to observe on the bus.
///
/// The access resolver decides the scope before the session subscribes; the
/// filter only enforces the decision, keeping the delivery manager itself
/// access-agnostic.
#[derive(Debug, Clone, Copy)]
pub struct SessionFilter {
    pub user_id: Uuid,
    pub project_id: Uuid,
    pub scope: ThreadScope,
}

impl SessionFilter {
    fn allows(&self, event: &ChannelEvent) -> bool {
        match event {
            ChannelEvent::Message(m) => {
                m.project_id == self.project_id && self.scope.contains(m.vendor_id)
            }
            ChannelEvent::Notification(n) => n.user_id == self.user_id,
            ChannelEvent::Heartbeat { .. } => true,
        }
    }
}

/// Push transport backed by the in-process bus.
pub struct BusTransport {
    bus: EventBus,
    filter: SessionFilter,
}

impl BusTransport {
    pub fn new(bus: EventBus, filter: SessionFilter) -> Self {
        Self { bus, filter }
    }
}

#[async_trait]
impl PushTransport for BusTransport {
    async fn subscribe(&self) -> Result<Box<dyn PushSubscription>, TransportError> {
        Ok(Box::new(BusSubscription {
            rx: self.bus.subscribe(),
            filter: self.filter,
        }))
    }
}

struct BusSubscription {
    rx: broadcast::Receiver<ChannelEvent>,
    filter: SessionFilter,
}

#[async_trait]
impl PushSubscription for BusSubscription {
    async fn next_event(&mut self) -> Result<ChannelEvent, TransportError> {
        loop {
            match self.rx.recv().await {
                Ok(event) if self.filter.allows(&event) => return Ok(event),
                Ok(_) => continue,
                // A lagged receiver has a gap; the polling fallback closes it.
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    return Err(TransportError::Interrupted(format!(
                        "subscription lagged by {n} events"
                    )))
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(TransportError::Interrupted("bus closed".to_string()))
                }
            }
        }
    }
}
