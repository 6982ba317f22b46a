//! Delivery channel manager
//!
//! One manager per connected client session. The session rides the push
//! transport while it is healthy and falls back to interval polling when the
//! transport errors or its heartbeats go silent; both paths feed one
//! de-duplicated update stream, so the UI never double-renders a record that
//! arrived via both.
//!
//! State machine per session:
//! `Disconnected -> Subscribing -> Live -> Degraded(polling) -> Disconnected`,
//! with `Degraded -> Live` on a successful reconnect (plus one trailing poll
//! to close any gap) and any state dropping to `Disconnected` when the
//! client goes away.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use axum::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, sleep_until, Instant};
use uuid::Uuid;

use crate::config::Settings;
use crate::domain::{Message, Notification, ThreadScope};
use crate::services::events::ChannelEvent;
use crate::store::{NotificationStore, ThreadStore};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("push subscription failed: {0}")]
    Subscribe(String),

    #[error("push stream interrupted: {0}")]
    Interrupted(String),

    #[error("poll failed: {0}")]
    Poll(String),
}

/// Connection state of one client session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelState {
    Disconnected,
    Subscribing,
    Live,
    Degraded,
}

/// Update delivered to the UI layer, already de-duplicated.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientUpdate {
    Message(Message),
    Notification(Notification),
    State { state: ChannelState },
    /// Polling has failed repeatedly; the UI should show a
    /// degraded-connectivity indicator. Isolated transport errors never
    /// surface this.
    ConnectivityLost { consecutive_failures: u32 },
}

/// Push half of the channel.
#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn subscribe(&self) -> Result<Box<dyn PushSubscription>, TransportError>;
}

#[async_trait]
pub trait PushSubscription: Send {
    /// Next event visible to this session; heartbeats count as liveness.
    async fn next_event(&mut self) -> Result<ChannelEvent, TransportError>;
}

/// Pull half of the channel.
#[async_trait]
pub trait Poller: Send + Sync {
    async fn poll_messages(&self, cursor: Option<Uuid>) -> Result<Vec<Message>, TransportError>;

    async fn poll_notifications(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Notification>, TransportError>;
}

#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    pub heartbeat_timeout: Duration,
    pub message_poll_interval: Duration,
    pub notification_poll_interval: Duration,
    pub reconnect_interval: Duration,
    pub poll_failure_threshold: u32,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            heartbeat_timeout: Duration::from_secs(15),
            message_poll_interval: Duration::from_secs(10),
            notification_poll_interval: Duration::from_secs(30),
            reconnect_interval: Duration::from_secs(15),
            poll_failure_threshold: 3,
        }
    }
}

impl DeliveryConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            heartbeat_timeout: Duration::from_secs(settings.heartbeat_timeout_seconds),
            message_poll_interval: Duration::from_secs(settings.message_poll_interval_seconds),
            notification_poll_interval: Duration::from_secs(
                settings.notification_poll_interval_seconds,
            ),
            reconnect_interval: Duration::from_secs(settings.reconnect_interval_seconds),
            poll_failure_threshold: settings.poll_failure_threshold,
        }
    }
}

/// Where the session resumes from. A client that already fetched the thread
/// backlog passes its tail here so polling does not replay history.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionWatermarks {
    pub message: Option<(DateTime<Utc>, Uuid)>,
    pub notification: Option<DateTime<Utc>>,
}

/// Handle to a spawned per-session delivery task.
///
/// Dropping (or `close`-ing) the handle releases every timer and
/// subscription the session holds; an in-flight append elsewhere is never
/// affected, since writes are not tied to read lifecycles.
pub struct DeliveryChannel {
    pub updates: mpsc::Receiver<ClientUpdate>,
    pub state: watch::Receiver<ChannelState>,
    handle: tokio::task::JoinHandle<()>,
}

impl DeliveryChannel {
    pub fn spawn(
        transport: Arc<dyn PushTransport>,
        poller: Arc<dyn Poller>,
        config: DeliveryConfig,
        watermarks: SessionWatermarks,
    ) -> Self {
        let (tx, updates) = mpsc::channel(256);
        let (state_tx, state) = watch::channel(ChannelState::Disconnected);
        let session = Session {
            transport,
            poller,
            config,
            tx,
            state_tx,
            seen: HashSet::new(),
            message_watermark: watermarks.message,
            notification_watermark: watermarks.notification,
            poll_failures: 0,
            stalled_reported: false,
        };
        let handle = tokio::spawn(session.run());
        Self {
            updates,
            state,
            handle,
        }
    }

    pub async fn recv(&mut self) -> Option<ClientUpdate> {
        self.updates.recv().await
    }

    /// Tear the session down and wait for every timer and subscription to be
    /// released. Returns the final state.
    pub async fn close(self) -> ChannelState {
        let DeliveryChannel {
            updates,
            state,
            handle,
        } = self;
        drop(updates);
        let _ = handle.await;
        let final_state = *state.borrow();
        final_state
    }
}

enum LiveExit {
    ClientGone,
    TransportLost,
}

struct Session {
    transport: Arc<dyn PushTransport>,
    poller: Arc<dyn Poller>,
    config: DeliveryConfig,
    tx: mpsc::Sender<ClientUpdate>,
    state_tx: watch::Sender<ChannelState>,
    /// Ids already applied by either path.
    seen: HashSet<Uuid>,
    message_watermark: Option<(DateTime<Utc>, Uuid)>,
    notification_watermark: Option<DateTime<Utc>>,
    poll_failures: u32,
    stalled_reported: bool,
}

impl Session {
    async fn run(mut self) {
        let mut resumed: Option<Box<dyn PushSubscription>> = None;
        loop {
            let mut sub = match resumed.take() {
                Some(sub) => sub,
                None => {
                    if !self.set_state(ChannelState::Subscribing).await {
                        break;
                    }
                    match self.transport.subscribe().await {
                        Ok(sub) => sub,
                        Err(e) => {
                            tracing::warn!(error = %e, "Push subscription failed");
                            match self.degraded().await {
                                Some(sub) => sub,
                                None => break,
                            }
                        }
                    }
                }
            };

            if !self.set_state(ChannelState::Live).await {
                break;
            }
            match self.live(sub.as_mut()).await {
                LiveExit::ClientGone => break,
                LiveExit::TransportLost => match self.degraded().await {
                    Some(sub) => resumed = Some(sub),
                    None => break,
                },
            }
        }

        self.state_tx.send_replace(ChannelState::Disconnected);
        tracing::debug!("Delivery channel closed");
    }

    /// Push delivery until the transport dies or goes silent.
    async fn live(&mut self, sub: &mut dyn PushSubscription) -> LiveExit {
        let mut deadline = Instant::now() + self.config.heartbeat_timeout;
        loop {
            let tx = self.tx.clone();
            tokio::select! {
                event = sub.next_event() => match event {
                    Ok(ChannelEvent::Heartbeat { .. }) => {
                        deadline = Instant::now() + self.config.heartbeat_timeout;
                    }
                    Ok(ChannelEvent::Message(m)) => {
                        deadline = Instant::now() + self.config.heartbeat_timeout;
                        if !self.deliver_message(m).await {
                            return LiveExit::ClientGone;
                        }
                    }
                    Ok(ChannelEvent::Notification(n)) => {
                        deadline = Instant::now() + self.config.heartbeat_timeout;
                        if !self.deliver_notification(n).await {
                            return LiveExit::ClientGone;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Push transport error, falling back to polling");
                        return LiveExit::TransportLost;
                    }
                },
                _ = sleep_until(deadline) => {
                    tracing::warn!(
                        timeout = ?self.config.heartbeat_timeout,
                        "Push heartbeats went silent, falling back to polling"
                    );
                    return LiveExit::TransportLost;
                }
                _ = tx.closed() => return LiveExit::ClientGone,
            }
        }
    }

    /// Interval polling until a reconnect succeeds (`Some(sub)`) or the
    /// client goes away (`None`).
    async fn degraded(&mut self) -> Option<Box<dyn PushSubscription>> {
        if !self.set_state(ChannelState::Degraded).await {
            return None;
        }

        // Catch-up poll first: it closes the gap that degraded us.
        if !self.poll_both().await {
            return None;
        }

        let start = Instant::now();
        let mut message_poll = interval_at(
            start + self.config.message_poll_interval,
            self.config.message_poll_interval,
        );
        let mut notification_poll = interval_at(
            start + self.config.notification_poll_interval,
            self.config.notification_poll_interval,
        );
        let mut reconnect = interval_at(
            start + self.config.reconnect_interval,
            self.config.reconnect_interval,
        );

        loop {
            let tx = self.tx.clone();
            tokio::select! {
                _ = message_poll.tick() => {
                    if !self.poll_messages_once().await {
                        return None;
                    }
                }
                _ = notification_poll.tick() => {
                    if !self.poll_notifications_once().await {
                        return None;
                    }
                }
                _ = reconnect.tick() => {
                    match self.transport.subscribe().await {
                        Ok(sub) => {
                            // Trailing poll: anything published between the
                            // last poll and the new subscription.
                            if !self.poll_both().await {
                                return None;
                            }
                            return Some(sub);
                        }
                        Err(e) => tracing::debug!(error = %e, "Reconnect attempt failed"),
                    }
                }
                _ = tx.closed() => return None,
            }
        }
    }

    async fn set_state(&mut self, state: ChannelState) -> bool {
        self.state_tx.send_replace(state);
        self.tx.send(ClientUpdate::State { state }).await.is_ok()
    }

    async fn deliver_message(&mut self, m: Message) -> bool {
        if !self.seen.insert(m.id) {
            return true;
        }
        let key = (m.created_at, m.id);
        if self.message_watermark.map_or(true, |w| key > w) {
            self.message_watermark = Some(key);
        }
        self.tx.send(ClientUpdate::Message(m)).await.is_ok()
    }

    async fn deliver_notification(&mut self, n: Notification) -> bool {
        if !self.seen.insert(n.id) {
            return true;
        }
        if self.notification_watermark.map_or(true, |w| n.created_at > w) {
            self.notification_watermark = Some(n.created_at);
        }
        self.tx.send(ClientUpdate::Notification(n)).await.is_ok()
    }

    async fn poll_both(&mut self) -> bool {
        self.poll_messages_once().await && self.poll_notifications_once().await
    }

    async fn poll_messages_once(&mut self) -> bool {
        let cursor = self.message_watermark.map(|(_, id)| id);
        match self.poller.poll_messages(cursor).await {
            Ok(batch) => {
                self.poll_recovered();
                for m in batch {
                    if !self.deliver_message(m).await {
                        return false;
                    }
                }
                true
            }
            Err(e) => self.poll_failed(e).await,
        }
    }

    async fn poll_notifications_once(&mut self) -> bool {
        match self.poller.poll_notifications(self.notification_watermark).await {
            Ok(batch) => {
                self.poll_recovered();
                for n in batch {
                    if !self.deliver_notification(n).await {
                        return false;
                    }
                }
                true
            }
            Err(e) => self.poll_failed(e).await,
        }
    }

    fn poll_recovered(&mut self) {
        if self.poll_failures > 0 {
            tracing::debug!(failures = self.poll_failures, "Polling recovered");
        }
        self.poll_failures = 0;
        self.stalled_reported = false;
    }

    async fn poll_failed(&mut self, error: TransportError) -> bool {
        self.poll_failures += 1;
        tracing::warn!(
            error = %error,
            consecutive_failures = self.poll_failures,
            "Poll failed"
        );
        if self.poll_failures >= self.config.poll_failure_threshold && !self.stalled_reported {
            self.stalled_reported = true;
            return self
                .tx
                .send(ClientUpdate::ConnectivityLost {
                    consecutive_failures: self.poll_failures,
                })
                .await
                .is_ok();
        }
        true
    }
}

/// Poller backed by the stores, scoped to what the session may see.
pub struct StorePoller {
    threads: Arc<dyn ThreadStore>,
    notifications: Arc<dyn NotificationStore>,
    project_id: Uuid,
    scope: ThreadScope,
    user_id: Uuid,
}

impl StorePoller {
    pub fn new(
        threads: Arc<dyn ThreadStore>,
        notifications: Arc<dyn NotificationStore>,
        project_id: Uuid,
        scope: ThreadScope,
        user_id: Uuid,
    ) -> Self {
        Self {
            threads,
            notifications,
            project_id,
            scope,
            user_id,
        }
    }
}

#[async_trait]
impl Poller for StorePoller {
    async fn poll_messages(&self, cursor: Option<Uuid>) -> Result<Vec<Message>, TransportError> {
        self.threads
            .list(self.project_id, self.scope, cursor)
            .await
            .map_err(|e| TransportError::Poll(e.to_string()))
    }

    async fn poll_notifications(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Notification>, TransportError> {
        self.notifications
            .list_since(self.user_id, since)
            .await
            .map_err(|e| TransportError::Poll(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, Ordering};

    use parking_lot::Mutex;

    use crate::domain::NotificationKind;

    enum SubscribeOutcome {
        Fail,
        Events(mpsc::UnboundedReceiver<ChannelEvent>),
    }

    struct TestTransport {
        outcomes: Mutex<VecDeque<SubscribeOutcome>>,
    }

    impl TestTransport {
        fn new(outcomes: Vec<SubscribeOutcome>) -> Arc<Self> {
            Arc::new(Self {
                outcomes: Mutex::new(outcomes.into()),
            })
        }
    }

    #[async_trait]
    impl PushTransport for TestTransport {
        async fn subscribe(&self) -> Result<Box<dyn PushSubscription>, TransportError> {
            match self.outcomes.lock().pop_front() {
                Some(SubscribeOutcome::Events(rx)) => Ok(Box::new(TestSubscription { rx })),
                Some(SubscribeOutcome::Fail) | None => {
                    Err(TransportError::Subscribe("refused".to_string()))
                }
            }
        }
    }

    struct TestSubscription {
        rx: mpsc::UnboundedReceiver<ChannelEvent>,
    }

    #[async_trait]
    impl PushSubscription for TestSubscription {
        async fn next_event(&mut self) -> Result<ChannelEvent, TransportError> {
            match self.rx.recv().await {
                Some(event) => Ok(event),
                None => Err(TransportError::Interrupted("stream ended".to_string())),
            }
        }
    }

    #[derive(Default)]
    struct TestPoller {
        messages: Mutex<Vec<Message>>,
        notifications: Mutex<Vec<Notification>>,
        failing: AtomicBool,
    }

    #[async_trait]
    impl Poller for TestPoller {
        async fn poll_messages(
            &self,
            _cursor: Option<Uuid>,
        ) -> Result<Vec<Message>, TransportError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(TransportError::Poll("backend unreachable".to_string()));
            }
            Ok(self.messages.lock().clone())
        }

        async fn poll_notifications(
            &self,
            _since: Option<DateTime<Utc>>,
        ) -> Result<Vec<Notification>, TransportError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(TransportError::Poll("backend unreachable".to_string()));
            }
            Ok(self.notifications.lock().clone())
        }
    }

    fn test_message(text: &str) -> Message {
        Message {
            id: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
            sender_id: Uuid::new_v4(),
            vendor_id: Uuid::new_v4(),
            text: text.to_string(),
            image_url: None,
            created_at: Utc::now(),
        }
    }

    fn test_notification(user_id: Uuid) -> Notification {
        Notification {
            id: Uuid::new_v4(),
            user_id,
            kind: NotificationKind::Info,
            title: "New message".to_string(),
            message: None,
            data: serde_json::json!({}),
            is_read: false,
            read_at: None,
            created_at: Utc::now(),
        }
    }

    fn test_config() -> DeliveryConfig {
        DeliveryConfig::default()
    }

    /// Next non-state update from the stream.
    async fn next_data(channel: &mut DeliveryChannel) -> ClientUpdate {
        loop {
            match channel.recv().await.expect("channel closed unexpectedly") {
                ClientUpdate::State { .. } => continue,
                update => return update,
            }
        }
    }

    async fn wait_for_state(channel: &mut DeliveryChannel, state: ChannelState) {
        channel
            .state
            .wait_for(|s| *s == state)
            .await
            .expect("session ended before reaching state");
    }

    #[tokio::test(start_paused = true)]
    async fn push_updates_flow_through_once() {
        let (events, rx) = mpsc::unbounded_channel();
        let transport = TestTransport::new(vec![SubscribeOutcome::Events(rx)]);
        let poller = Arc::new(TestPoller::default());
        let mut channel = DeliveryChannel::spawn(
            transport,
            poller,
            test_config(),
            SessionWatermarks::default(),
        );

        wait_for_state(&mut channel, ChannelState::Live).await;

        let m = test_message("hello");
        events.send(ChannelEvent::Message(m.clone())).unwrap();
        // Second push of the same record is dropped by the merge.
        events.send(ChannelEvent::Message(m.clone())).unwrap();
        let m2 = test_message("again");
        events.send(ChannelEvent::Message(m2.clone())).unwrap();
        let n = test_notification(Uuid::new_v4());
        events.send(ChannelEvent::Notification(n.clone())).unwrap();

        match next_data(&mut channel).await {
            ClientUpdate::Message(got) => assert_eq!(got.id, m.id),
            other => panic!("unexpected update: {other:?}"),
        }
        match next_data(&mut channel).await {
            ClientUpdate::Message(got) => assert_eq!(got.id, m2.id),
            other => panic!("unexpected update: {other:?}"),
        }
        match next_data(&mut channel).await {
            ClientUpdate::Notification(got) => assert_eq!(got.id, n.id),
            other => panic!("unexpected update: {other:?}"),
        }

        assert_eq!(channel.close().await, ChannelState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_silence_degrades_to_polling_without_a_gap() {
        let (events, rx) = mpsc::unbounded_channel();
        let transport = TestTransport::new(vec![SubscribeOutcome::Events(rx)]);
        let poller = Arc::new(TestPoller::default());
        let missed = test_message("missed while push was down");
        poller.messages.lock().push(missed.clone());

        let mut channel = DeliveryChannel::spawn(
            transport,
            poller.clone(),
            test_config(),
            SessionWatermarks::default(),
        );

        wait_for_state(&mut channel, ChannelState::Live).await;
        events.send(ChannelEvent::Heartbeat { at: Utc::now() }).unwrap();

        // No further heartbeats: the deadline lapses and the session starts
        // polling. The catch-up poll delivers the missed message.
        wait_for_state(&mut channel, ChannelState::Degraded).await;
        match next_data(&mut channel).await {
            ClientUpdate::Message(got) => assert_eq!(got.id, missed.id),
            other => panic!("unexpected update: {other:?}"),
        }

        // The 10s message poll keeps delivering while degraded.
        let late = test_message("arrived during polling");
        poller.messages.lock().push(late.clone());
        match next_data(&mut channel).await {
            ClientUpdate::Message(got) => assert_eq!(got.id, late.id),
            other => panic!("unexpected update: {other:?}"),
        }

        drop(events);
        assert_eq!(channel.close().await, ChannelState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn record_seen_on_push_is_not_redelivered_by_poll() {
        let (events, rx) = mpsc::unbounded_channel();
        let transport = TestTransport::new(vec![SubscribeOutcome::Events(rx)]);
        let poller = Arc::new(TestPoller::default());

        let mut channel = DeliveryChannel::spawn(
            transport,
            poller.clone(),
            test_config(),
            SessionWatermarks::default(),
        );
        wait_for_state(&mut channel, ChannelState::Live).await;

        let pushed = test_message("via push");
        events.send(ChannelEvent::Message(pushed.clone())).unwrap();
        match next_data(&mut channel).await {
            ClientUpdate::Message(got) => assert_eq!(got.id, pushed.id),
            other => panic!("unexpected update: {other:?}"),
        }

        // The poll feed overlaps the pushed record; only the new one comes
        // through.
        let fresh = test_message("only via poll");
        *poller.messages.lock() = vec![pushed.clone(), fresh.clone()];

        // Killing the stream forces the fallback.
        drop(events);
        wait_for_state(&mut channel, ChannelState::Degraded).await;
        match next_data(&mut channel).await {
            ClientUpdate::Message(got) => assert_eq!(got.id, fresh.id),
            other => panic!("unexpected update: {other:?}"),
        }

        assert_eq!(channel.close().await, ChannelState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_goes_live_after_a_trailing_poll() {
        let (events1, rx1) = mpsc::unbounded_channel();
        let (events2, rx2) = mpsc::unbounded_channel();
        let transport = TestTransport::new(vec![
            SubscribeOutcome::Events(rx1),
            SubscribeOutcome::Events(rx2),
        ]);
        let poller = Arc::new(TestPoller::default());

        // Polls slower than the reconnect attempt, so the trailing poll is
        // what delivers the gap message.
        let config = DeliveryConfig {
            message_poll_interval: Duration::from_secs(60),
            notification_poll_interval: Duration::from_secs(120),
            reconnect_interval: Duration::from_secs(15),
            ..test_config()
        };

        let mut channel = DeliveryChannel::spawn(
            transport,
            poller.clone(),
            config,
            SessionWatermarks::default(),
        );
        wait_for_state(&mut channel, ChannelState::Live).await;

        drop(events1);
        wait_for_state(&mut channel, ChannelState::Degraded).await;

        let gap = test_message("published during the outage");
        poller.messages.lock().push(gap.clone());

        wait_for_state(&mut channel, ChannelState::Live).await;
        match next_data(&mut channel).await {
            ClientUpdate::Message(got) => assert_eq!(got.id, gap.id),
            other => panic!("unexpected update: {other:?}"),
        }

        // Push works again on the new subscription.
        let resumed = test_message("back on push");
        events2.send(ChannelEvent::Message(resumed.clone())).unwrap();
        match next_data(&mut channel).await {
            ClientUpdate::Message(got) => assert_eq!(got.id, resumed.id),
            other => panic!("unexpected update: {other:?}"),
        }

        assert_eq!(channel.close().await, ChannelState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_poll_failures_surface_connectivity_loss_once() {
        let transport = TestTransport::new(vec![SubscribeOutcome::Fail]);
        let poller = Arc::new(TestPoller::default());
        poller.failing.store(true, Ordering::SeqCst);

        let mut channel = DeliveryChannel::spawn(
            transport,
            poller.clone(),
            test_config(),
            SessionWatermarks::default(),
        );
        wait_for_state(&mut channel, ChannelState::Degraded).await;

        match next_data(&mut channel).await {
            ClientUpdate::ConnectivityLost {
                consecutive_failures,
            } => assert_eq!(consecutive_failures, test_config().poll_failure_threshold),
            other => panic!("unexpected update: {other:?}"),
        }

        // Recovery: polls succeed again and deliveries resume, no further
        // indicator.
        poller.failing.store(false, Ordering::SeqCst);
        let m = test_message("after recovery");
        poller.messages.lock().push(m.clone());
        match next_data(&mut channel).await {
            ClientUpdate::Message(got) => assert_eq!(got.id, m.id),
            other => panic!("unexpected update: {other:?}"),
        }

        assert_eq!(channel.close().await, ChannelState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn closing_the_channel_releases_the_session() {
        let (_events, rx) = mpsc::unbounded_channel();
        let transport = TestTransport::new(vec![SubscribeOutcome::Events(rx)]);
        let poller = Arc::new(TestPoller::default());

        let mut channel = DeliveryChannel::spawn(
            transport,
            poller,
            test_config(),
            SessionWatermarks::default(),
        );
        wait_for_state(&mut channel, ChannelState::Live).await;

        assert_eq!(channel.close().await, ChannelState::Disconnected);
    }
}
