//! Control session state machine.
//!
//! ```text
//! Idle ──connect──▶ Connecting ──connect──────▶ Connected ──disconnect──▶ Disconnected
//!                        └──────connect_error──▶ Failed(reason)
//! any state ──connect(device)──▶ Connecting   (prior attempt is torn down first)
//! ```
//!
//! Every `connect` call starts a new attempt generation. Channel events are
//! applied only while their generation is current, so a superseded attempt
//! can never move the state.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::channel::{ChannelCloser, ChannelEvent, ChannelSender, ControlConnector};
use super::socketio::SocketIoConnector;
use crate::config::SessionConfig;
use crate::types::{ControlEndpoint, Device, SessionEvent, SessionState};

/// State-change notifications buffered per subscriber.
const EVENT_BUFFER: usize = 64;

/// Reason recorded when `close` interrupts an attempt still connecting.
const CANCELLED: &str = "cancelled";

/// Owns at most one control connection attempt at a time.
///
/// Cheap to clone; clones share the same session.
#[derive(Clone)]
pub struct SessionManager {
    shared: Arc<Shared>,
}

struct Shared {
    connector: Arc<dyn ControlConnector>,
    control_port: u16,
    inner: Mutex<Inner>,
    events: broadcast::Sender<SessionEvent>,
}

#[derive(Default)]
struct Inner {
    generation: u64,
    state: SessionState,
    target: Option<Device>,
    endpoint: Option<ControlEndpoint>,
    last_error: Option<String>,
    sender: Option<ChannelSender>,
    closer: Option<ChannelCloser>,
    pump: Option<JoinHandle<()>>,
    drained: Option<oneshot::Receiver<()>>,
}

impl Inner {
    /// Drop the current channel and stop listening to it.
    ///
    /// Returns a receiver that resolves once the transport has shut down.
    fn release(&mut self) -> Option<oneshot::Receiver<()>> {
        self.sender = None;
        if let Some(closer) = self.closer.take() {
            closer.close();
        }
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        self.drained.take()
    }
}

impl SessionManager {
    pub fn new(connector: Arc<dyn ControlConnector>, config: &SessionConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            shared: Arc::new(Shared {
                connector,
                control_port: config.control_port,
                inner: Mutex::new(Inner::default()),
                events,
            }),
        }
    }

    /// Session manager speaking Socket.IO to receivers.
    pub fn with_socketio(config: &SessionConfig) -> Self {
        Self::new(
            Arc::new(SocketIoConnector::new(config.connect_timeout())),
            config,
        )
    }

    /// Start a connection attempt to `device`, replacing any prior attempt.
    ///
    /// Returns immediately with the attempt generation; the outcome is
    /// reported through state changes. Must be called within a Tokio runtime.
    pub fn connect(&self, device: Device) -> u64 {
        let endpoint = ControlEndpoint::for_device(&device, self.shared.control_port);
        let mut inner = self.shared.inner.lock();

        inner.release();
        inner.generation += 1;
        let generation = inner.generation;

        info!(address = %device.address, %endpoint, attempt = generation, "connecting");
        inner.target = Some(device);
        inner.endpoint = Some(endpoint.clone());
        self.shared.transition(&mut inner, generation, SessionState::Connecting);

        let channel = self.shared.connector.open(&endpoint);
        inner.sender = Some(channel.sender);
        inner.closer = Some(channel.closer);
        inner.drained = Some(channel.drained);
        inner.pump = Some(tokio::spawn(pump(
            Arc::downgrade(&self.shared),
            generation,
            channel.events,
        )));

        generation
    }

    /// Tear down the current attempt.
    ///
    /// `Connected` becomes `Disconnected`, `Connecting` becomes
    /// `Failed("cancelled")`; other states are left as they are.
    pub fn close(&self) {
        self.teardown();
    }

    /// Like [`SessionManager::close`], then wait until the transport is gone.
    ///
    /// Media dispatched before the call has been flushed to the receiver by
    /// the time this returns, unless the transport gave up on it.
    pub async fn shutdown(&self) {
        if let Some(drained) = self.teardown() {
            let _ = drained.await;
        }
    }

    fn teardown(&self) -> Option<oneshot::Receiver<()>> {
        let mut inner = self.shared.inner.lock();
        let attempt = inner.generation;

        let next = match inner.state {
            SessionState::Connecting => Some(SessionState::Failed(CANCELLED.to_string())),
            SessionState::Connected => Some(SessionState::Disconnected),
            _ => None,
        };

        let drained = inner.release();
        if let Some(next) = next {
            inner.generation += 1;
            info!(attempt, "session closed");
            self.shared.transition(&mut inner, attempt, next);
        }
        drained
    }

    pub fn current_state(&self) -> SessionState {
        self.shared.inner.lock().state.clone()
    }

    pub fn target(&self) -> Option<Device> {
        self.shared.inner.lock().target.clone()
    }

    pub fn endpoint(&self) -> Option<ControlEndpoint> {
        self.shared.inner.lock().endpoint.clone()
    }

    /// Most recent failure reason, kept across later attempts.
    pub fn last_error(&self) -> Option<String> {
        self.shared.inner.lock().last_error.clone()
    }

    /// Generation of the latest `connect` call (0 before the first).
    pub fn attempt(&self) -> u64 {
        self.shared.inner.lock().generation
    }

    /// State transitions in the order they occur.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }

    /// Run `f` with the live channel, atomically with the `Connected` check.
    ///
    /// Returns the current state instead when not connected.
    pub(crate) fn with_connected_channel<R>(
        &self,
        f: impl FnOnce(&ChannelSender) -> R,
    ) -> Result<R, SessionState> {
        let inner = self.shared.inner.lock();
        match (&inner.state, &inner.sender) {
            (SessionState::Connected, Some(sender)) => Ok(f(sender)),
            (state, _) => Err(state.clone()),
        }
    }
}

impl Shared {
    fn transition(&self, inner: &mut Inner, attempt: u64, state: SessionState) {
        if let SessionState::Failed(reason) = &state {
            inner.last_error = Some(reason.clone());
        }
        inner.state = state.clone();

        let address = inner
            .target
            .as_ref()
            .map(|d| d.address.clone())
            .unwrap_or_default();
        info!(%address, attempt, state = %state, "session state changed");

        // Sent under the lock so subscribers see transitions in order.
        let _ = self.events.send(SessionEvent {
            attempt,
            address,
            state,
        });
    }

    /// Apply a channel event. Returns `false` once the attempt is over.
    fn apply(&self, generation: u64, event: ChannelEvent) -> bool {
        let mut inner = self.inner.lock();

        if inner.generation != generation {
            debug!(generation, current = inner.generation, ?event, "ignoring superseded attempt");
            return false;
        }

        let current = inner.state.clone();
        let next = match (current, event) {
            (SessionState::Connecting, ChannelEvent::Connect) => {
                self.transition(&mut inner, generation, SessionState::Connected);
                return true;
            }
            (SessionState::Connecting, ChannelEvent::ConnectError(reason))
            | (SessionState::Connecting, ChannelEvent::Disconnect(reason)) => {
                SessionState::Failed(reason)
            }
            (SessionState::Connected, ChannelEvent::Disconnect(reason)) => {
                debug!(%reason, "control channel lost");
                SessionState::Disconnected
            }
            (state, event) => {
                debug!(%state, ?event, "ignoring channel event");
                return !state.is_terminal();
            }
        };

        // The pump exits on its own after this; detach instead of aborting it.
        inner.pump = None;
        inner.release();
        self.transition(&mut inner, generation, next);
        false
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        self.inner.get_mut().release();
    }
}

async fn pump(
    shared: Weak<Shared>,
    generation: u64,
    mut events: mpsc::UnboundedReceiver<ChannelEvent>,
) {
    while let Some(event) = events.recv().await {
        let Some(shared) = shared.upgrade() else {
            return;
        };
        if !shared.apply(generation, event) {
            return;
        }
    }

    // Transport ended without saying why.
    if let Some(shared) = shared.upgrade() {
        shared.apply(
            generation,
            ChannelEvent::Disconnect("control channel closed".to_string()),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::channel::testing::ScriptedConnector;
    use crate::session::channel::OutboundEvent;
    use crate::types::{DeviceObservation, DiscoverySource};
    use std::time::Duration;
    use tokio::time::timeout;

    fn device(address: &str) -> Device {
        DeviceObservation::new(address, DiscoverySource::Static).into()
    }

    fn manager() -> (SessionManager, Arc<ScriptedConnector>) {
        let connector = Arc::new(ScriptedConnector::default());
        let manager = SessionManager::new(connector.clone(), &SessionConfig::default());
        (manager, connector)
    }

    async fn next_event(rx: &mut broadcast::Receiver<SessionEvent>) -> SessionEvent {
        timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("no session event")
            .unwrap()
    }

    #[tokio::test]
    async fn test_starts_idle() {
        let (manager, connector) = manager();
        assert_eq!(manager.current_state(), SessionState::Idle);
        assert_eq!(manager.attempt(), 0);
        assert!(manager.target().is_none());
        assert_eq!(connector.open_count(), 0);
    }

    #[tokio::test]
    async fn test_connect_then_connected() {
        let (manager, connector) = manager();
        let mut rx = manager.subscribe();

        let attempt = manager.connect(device("192.168.1.2"));
        assert_eq!(manager.current_state(), SessionState::Connecting);
        assert_eq!(
            manager.endpoint().unwrap().http_url(),
            "http://192.168.1.2:3000"
        );
        assert_eq!(connector.channel(0).endpoint.port, 3000);

        let event = next_event(&mut rx).await;
        assert_eq!(event.state, SessionState::Connecting);
        assert_eq!(event.attempt, attempt);
        assert_eq!(event.address, "192.168.1.2");

        connector.channel(0).emit(ChannelEvent::Connect);
        assert_eq!(next_event(&mut rx).await.state, SessionState::Connected);
        assert_eq!(manager.current_state(), SessionState::Connected);
    }

    #[tokio::test]
    async fn test_connect_error_fails_with_reason() {
        let (manager, connector) = manager();
        let mut rx = manager.subscribe();

        manager.connect(device("192.168.1.2"));
        connector
            .channel(0)
            .emit(ChannelEvent::ConnectError("refused".to_string()));

        assert_eq!(next_event(&mut rx).await.state, SessionState::Connecting);
        assert_eq!(
            next_event(&mut rx).await.state,
            SessionState::Failed("refused".to_string())
        );
        assert_eq!(manager.last_error().as_deref(), Some("refused"));
        assert!(connector.channel(0).is_closed());
    }

    #[tokio::test]
    async fn test_connection_lost_disconnects_without_reconnect() {
        let (manager, connector) = manager();
        let mut rx = manager.subscribe();

        manager.connect(device("192.168.1.2"));
        connector.channel(0).emit(ChannelEvent::Connect);
        connector
            .channel(0)
            .emit(ChannelEvent::Disconnect("transport close".to_string()));

        let states: Vec<_> = vec![
            next_event(&mut rx).await.state,
            next_event(&mut rx).await.state,
            next_event(&mut rx).await.state,
        ];
        assert_eq!(
            states,
            vec![
                SessionState::Connecting,
                SessionState::Connected,
                SessionState::Disconnected
            ]
        );

        // A late connect from the dead channel must not revive the session.
        connector.channel(0).emit(ChannelEvent::Connect);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(manager.current_state(), SessionState::Disconnected);
        assert_eq!(connector.open_count(), 1);
    }

    #[tokio::test]
    async fn test_connected_never_skips_connecting() {
        let (manager, connector) = manager();
        let mut rx = manager.subscribe();

        // Event arrives before any connect call: there is no channel to emit on,
        // and the state machine stays idle.
        assert_eq!(manager.current_state(), SessionState::Idle);

        manager.connect(device("10.0.0.1"));
        connector.channel(0).emit(ChannelEvent::Connect);
        connector.channel(0).emit(ChannelEvent::Connect);

        assert_eq!(next_event(&mut rx).await.state, SessionState::Connecting);
        assert_eq!(next_event(&mut rx).await.state, SessionState::Connected);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_superseded_attempt_cannot_connect() {
        let (manager, connector) = manager();
        let mut rx = manager.subscribe();

        let first = manager.connect(device("192.168.1.2"));
        let second = manager.connect(device("192.168.1.3"));
        assert!(second > first);
        assert!(connector.channel(0).is_closed());

        // Device A's late success arrives after B's connect began.
        connector.channel(0).emit(ChannelEvent::Connect);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(manager.current_state(), SessionState::Connecting);
        assert_eq!(manager.target().unwrap().address, "192.168.1.3");

        connector.channel(1).emit(ChannelEvent::Connect);

        let events = vec![
            next_event(&mut rx).await,
            next_event(&mut rx).await,
            next_event(&mut rx).await,
        ];
        assert_eq!(events[0].attempt, first);
        assert_eq!(events[0].state, SessionState::Connecting);
        assert_eq!(events[1].attempt, second);
        assert_eq!(events[1].state, SessionState::Connecting);
        assert_eq!(events[2].attempt, second);
        assert_eq!(events[2].state, SessionState::Connected);
        assert_eq!(events[2].address, "192.168.1.3");

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_reconnect_after_failure() {
        let (manager, connector) = manager();

        manager.connect(device("192.168.1.2"));
        connector
            .channel(0)
            .emit(ChannelEvent::ConnectError("timeout".to_string()));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(manager.current_state().is_terminal());

        manager.connect(device("192.168.1.2"));
        assert_eq!(manager.current_state(), SessionState::Connecting);
        connector.channel(1).emit(ChannelEvent::Connect);
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(manager.current_state(), SessionState::Connected);
        assert_eq!(manager.last_error().as_deref(), Some("timeout"));
    }

    #[tokio::test]
    async fn test_close_while_connected_and_connecting() {
        let (manager, connector) = manager();

        manager.connect(device("192.168.1.2"));
        connector.channel(0).emit(ChannelEvent::Connect);
        tokio::time::sleep(Duration::from_millis(50)).await;

        manager.close();
        assert_eq!(manager.current_state(), SessionState::Disconnected);
        assert!(connector.channel(0).is_closed());

        manager.connect(device("192.168.1.2"));
        manager.close();
        assert_eq!(
            manager.current_state(),
            SessionState::Failed("cancelled".to_string())
        );

        // Nothing to close.
        manager.close();
        assert_eq!(
            manager.current_state(),
            SessionState::Failed("cancelled".to_string())
        );
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_transport() {
        let (manager, connector) = manager();

        // Nothing open yet.
        timeout(Duration::from_secs(1), manager.shutdown())
            .await
            .unwrap();

        manager.connect(device("192.168.1.2"));
        connector.channel(0).emit(ChannelEvent::Connect);
        tokio::time::sleep(Duration::from_millis(50)).await;

        timeout(Duration::from_secs(1), manager.shutdown())
            .await
            .unwrap();
        assert!(connector.channel(0).is_closed());
        assert_eq!(manager.current_state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_channel_ending_silently_is_a_failure() {
        let (manager, connector) = manager();
        manager.connect(device("192.168.1.2"));

        connector.channel(0).hang_up();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(
            manager.current_state(),
            SessionState::Failed("control channel closed".to_string())
        );
    }

    #[tokio::test]
    async fn test_channel_sender_only_while_connected() {
        let (manager, connector) = manager();

        assert_eq!(
            manager.with_connected_channel(|_| ()).unwrap_err(),
            SessionState::Idle
        );

        manager.connect(device("192.168.1.2"));
        assert!(manager.with_connected_channel(|_| ()).is_err());

        connector.channel(0).emit(ChannelEvent::Connect);
        tokio::time::sleep(Duration::from_millis(50)).await;

        manager
            .with_connected_channel(|sender| sender.send(OutboundEvent::media("x")))
            .unwrap()
            .unwrap();
        assert_eq!(connector.channel(0).sent().len(), 1);
    }
}
