//! Feed connection manager
//!
//! Owns the long-lived connection to the agent service feed. A single task
//! runs the `Disconnected -> Connecting -> Connected -> Disconnected` cycle,
//! pushes parsed messages onto the pipeline channel and, after every lost or
//! failed connection, waits a fixed delay before trying again.

mod connector;

pub use connector::{FeedConnector, FeedStream, WsConnector};

use crate::api::FeedMessage;
use futures::StreamExt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    fn as_u8(self) -> u8 {
        match self {
            ConnectionState::Disconnected => 0,
            ConnectionState::Connecting => 1,
            ConnectionState::Connected => 2,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            _ => ConnectionState::Disconnected,
        }
    }
}

/// Observable state of the feed
#[derive(Debug)]
pub struct FeedStatus {
    state: AtomicU8,
    reconnect_pending: AtomicBool,
    reconnect_attempts: AtomicU64,
    connections: AtomicU64,
    delivered: AtomicU64,
    malformed: AtomicU64,
}

impl FeedStatus {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(ConnectionState::Disconnected.as_u8()),
            reconnect_pending: AtomicBool::new(false),
            reconnect_attempts: AtomicU64::new(0),
            connections: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            malformed: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.store(state.as_u8(), Ordering::SeqCst);
    }

    /// A reconnect timer is currently outstanding
    pub fn reconnect_pending(&self) -> bool {
        self.reconnect_pending.load(Ordering::SeqCst)
    }

    pub fn reconnect_attempts(&self) -> u64 {
        self.reconnect_attempts.load(Ordering::SeqCst)
    }

    /// Successful connections, including the first one
    pub fn connections(&self) -> u64 {
        self.connections.load(Ordering::SeqCst)
    }

    /// Messages handed to the pipeline
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::SeqCst)
    }

    /// Payloads dropped because they did not parse
    pub fn malformed(&self) -> u64 {
        self.malformed.load(Ordering::SeqCst)
    }
}

pub struct FeedManager {
    connector: Arc<dyn FeedConnector>,
    reconnect_delay: Duration,
    status: Arc<FeedStatus>,
}

impl FeedManager {
    pub fn new(connector: Arc<dyn FeedConnector>, reconnect_delay: Duration) -> Self {
        Self {
            connector,
            reconnect_delay,
            status: Arc::new(FeedStatus::new()),
        }
    }

    pub fn status(&self) -> Arc<FeedStatus> {
        Arc::clone(&self.status)
    }

    /// Run until the receiving end of `tx` is dropped
    pub async fn run(self, tx: mpsc::UnboundedSender<FeedMessage>) {
        loop {
            self.status.set_state(ConnectionState::Connecting);

            match self.connector.connect().await {
                Ok(stream) => {
                    self.status.set_state(ConnectionState::Connected);
                    self.status.connections.fetch_add(1, Ordering::SeqCst);
                    tracing::info!("Feed connected");

                    let open = self.forward(stream, &tx).await;
                    self.status.set_state(ConnectionState::Disconnected);
                    if !open {
                        tracing::info!("Pipeline gone, stopping feed");
                        return;
                    }
                    tracing::info!("Feed disconnected");
                }
                Err(e) => {
                    self.status.set_state(ConnectionState::Disconnected);
                    tracing::warn!(error = %e, "Feed connection failed");
                }
            }

            if !self.wait_for_reconnect(&tx).await {
                tracing::info!("Pipeline gone, cancelling reconnect");
                return;
            }
        }
    }

    /// Forward one session's messages. Returns false once the pipeline is gone.
    async fn forward(
        &self,
        mut stream: FeedStream,
        tx: &mpsc::UnboundedSender<FeedMessage>,
    ) -> bool {
        while let Some(frame) = stream.next().await {
            let payload = match frame {
                Ok(payload) => payload,
                Err(e) => {
                    tracing::warn!(error = %e, "Feed read failed");
                    return true;
                }
            };

            match FeedMessage::parse(&payload) {
                Ok(message) => {
                    tracing::debug!(action_id = %message.id, "Feed message received");
                    self.status.delivered.fetch_add(1, Ordering::SeqCst);
                    if tx.send(message).is_err() {
                        return false;
                    }
                }
                Err(e) => {
                    // Not retried; surfaced through the log and the counter
                    self.status.malformed.fetch_add(1, Ordering::SeqCst);
                    tracing::warn!(
                        error = %e,
                        payload_len = payload.len(),
                        "Dropping malformed feed message"
                    );
                }
            }
        }
        true
    }

    /// Hold the single reconnect timer. Returns false if the pipeline went
    /// away while waiting.
    async fn wait_for_reconnect(&self, tx: &mpsc::UnboundedSender<FeedMessage>) -> bool {
        if self
            .status
            .reconnect_pending
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            // Someone else owns the timer: wait it out, leave the flag to them
            tracing::warn!("Reconnect already pending, not scheduling another");
            return tokio::select! {
                _ = tokio::time::sleep(self.reconnect_delay) => true,
                _ = tx.closed() => false,
            };
        }

        let attempt = self.status.reconnect_attempts.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::info!(
            attempt = attempt,
            delay_secs = self.reconnect_delay.as_secs_f64(),
            "Scheduling feed reconnect"
        );

        let fired = tokio::select! {
            _ = tokio::time::sleep(self.reconnect_delay) => true,
            _ = tx.closed() => false,
        };

        // Cleared only once the timer has fired (or been cancelled)
        self.status.reconnect_pending.store(false, Ordering::SeqCst);
        fired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Error, Result};
    use async_trait::async_trait;
    use futures::stream;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use std::time::Instant;
    use tokio::time::timeout;

    enum Session {
        Refused,
        /// Delivers the payloads, then closes
        Frames(Vec<&'static str>),
        /// Delivers `n` distinct valid messages, then stays open
        Burst(usize),
    }

    /// Plays scripted sessions; once the script is exhausted the connection
    /// stays open forever
    struct ScriptedConnector {
        script: Mutex<VecDeque<Session>>,
        connects: AtomicUsize,
        pending_seen_while_connecting: AtomicBool,
        status: Mutex<Option<Arc<FeedStatus>>>,
    }

    impl ScriptedConnector {
        fn new(script: Vec<Session>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                connects: AtomicUsize::new(0),
                pending_seen_while_connecting: AtomicBool::new(false),
                status: Mutex::new(None),
            })
        }

        fn connects(&self) -> usize {
            self.connects.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl FeedConnector for ScriptedConnector {
        async fn connect(&self) -> Result<FeedStream> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            if let Some(status) = self.status.lock().unwrap().as_ref() {
                if status.reconnect_pending() {
                    self.pending_seen_while_connecting
                        .store(true, Ordering::SeqCst);
                }
            }
            let next = self.script.lock().unwrap().pop_front();
            match next {
                Some(Session::Refused) => Err(Error::Feed("connection refused".to_string())),
                Some(Session::Frames(frames)) => Ok(stream::iter(
                    frames.into_iter().map(|f| Ok(f.to_string())).collect::<Vec<_>>(),
                )
                .boxed()),
                Some(Session::Burst(count)) => {
                    let frames = (0..count)
                        .map(|i| Ok(format!(r#"{{"id":"tx{}","type":"Transfer"}}"#, i)))
                        .collect::<Vec<_>>();
                    Ok(stream::iter(frames).chain(stream::pending()).boxed())
                }
                None => Ok(stream::pending().boxed()),
            }
        }
    }

    fn start(
        connector: Arc<ScriptedConnector>,
        delay: Duration,
    ) -> (
        Arc<FeedStatus>,
        mpsc::UnboundedReceiver<FeedMessage>,
        tokio::task::JoinHandle<()>,
    ) {
        let manager = FeedManager::new(connector.clone(), delay);
        let status = manager.status();
        *connector.status.lock().unwrap() = Some(status.clone());
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(manager.run(tx));
        (status, rx, handle)
    }

    async fn wait_for_connects(connector: &ScriptedConnector, count: usize) {
        timeout(Duration::from_secs(5), async {
            while connector.connects() < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("timed out waiting for reconnects");
    }

    #[tokio::test]
    async fn n_closes_schedule_n_reconnects() {
        let delay = Duration::from_millis(30);
        let connector = ScriptedConnector::new(vec![
            Session::Frames(vec![]),
            Session::Frames(vec![]),
            Session::Frames(vec![]),
        ]);
        let started = Instant::now();
        let (status, _rx, handle) = start(connector.clone(), delay);

        wait_for_connects(&connector, 4).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(started.elapsed() >= delay * 3);
        assert_eq!(status.reconnect_attempts(), 3);
        assert_eq!(status.connections(), 4);
        assert_eq!(connector.connects(), 4);
        assert_eq!(status.state(), ConnectionState::Connected);
        assert!(!status.reconnect_pending());
        // The flag is cleared before the reconnect attempt runs
        assert!(!connector
            .pending_seen_while_connecting
            .load(Ordering::SeqCst));

        handle.abort();
    }

    #[tokio::test]
    async fn refused_connection_is_retried_after_delay() {
        let connector = ScriptedConnector::new(vec![Session::Refused, Session::Refused]);
        let (status, _rx, handle) = start(connector.clone(), Duration::from_millis(10));

        wait_for_connects(&connector, 3).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(status.reconnect_attempts(), 2);
        assert_eq!(status.connections(), 1);
        assert_eq!(status.state(), ConnectionState::Connected);

        handle.abort();
    }

    #[tokio::test]
    async fn pending_flag_is_held_during_the_delay() {
        let connector = ScriptedConnector::new(vec![Session::Frames(vec![])]);
        let (status, _rx, handle) = start(connector.clone(), Duration::from_millis(200));

        wait_for_connects(&connector, 1).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(status.reconnect_pending());
        assert_eq!(status.reconnect_attempts(), 1);
        assert_eq!(status.state(), ConnectionState::Disconnected);

        handle.abort();
    }

    #[tokio::test]
    async fn delivers_in_order_and_drops_malformed() {
        let connector = ScriptedConnector::new(vec![Session::Frames(vec![
            r#"{"id":"tx1","type":"Transfer"}"#,
            "{not json",
            r#"{"type":"Transfer"}"#,
            r#"{"id":"tx2","type":"ApproveWithdraw"}"#,
        ])]);
        let (status, mut rx, handle) = start(connector, Duration::from_millis(10));

        let first = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
        let second = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();

        assert_eq!(first.id, "tx1");
        assert_eq!(second.id, "tx2");
        assert_eq!(status.delivered(), 2);
        assert_eq!(status.malformed(), 2);

        handle.abort();
    }

    #[tokio::test]
    async fn unread_backlog_does_not_stall_receipt() {
        let connector = ScriptedConnector::new(vec![Session::Burst(500)]);
        let (status, rx, handle) = start(connector.clone(), Duration::from_secs(60));

        // Nothing reads `rx`; the feed must keep consuming the transport anyway
        timeout(Duration::from_secs(2), async {
            while status.delivered() < 500 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("feed stopped reading while the pipeline was busy");

        assert_eq!(connector.connects(), 1);
        assert_eq!(status.state(), ConnectionState::Connected);

        handle.abort();
        drop(rx);
    }

    #[tokio::test]
    async fn held_timer_is_waited_out_not_skipped() {
        let delay = Duration::from_millis(50);
        let connector = ScriptedConnector::new(vec![]);
        let manager = FeedManager::new(connector, delay);
        let status = manager.status();
        status.reconnect_pending.store(true, Ordering::SeqCst);
        let (tx, _rx) = mpsc::unbounded_channel();

        let started = Instant::now();
        assert!(manager.wait_for_reconnect(&tx).await);

        assert!(started.elapsed() >= delay);
        assert_eq!(status.reconnect_attempts(), 0);
        // The owner of the timer clears the flag, not us
        assert!(status.reconnect_pending());
    }

    #[tokio::test]
    async fn stops_when_pipeline_is_dropped() {
        let connector = ScriptedConnector::new(vec![Session::Frames(vec![])]);
        let (_status, rx, handle) = start(connector.clone(), Duration::from_secs(60));

        wait_for_connects(&connector, 1).await;
        drop(rx);

        timeout(Duration::from_secs(1), handle)
            .await
            .expect("feed manager kept running")
            .unwrap();
    }
}
