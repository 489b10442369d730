//! Control channel seam between the session state machine and a transport.
//!
//! A connector opens a channel without blocking and reports progress as
//! [`ChannelEvent`]s; outbound messages are queued through a [`ChannelSender`].
//! Dropping the [`ChannelCloser`] tears the transport down; `drained`
//! resolves once it is gone.

use tokio::sync::{mpsc, oneshot};

use crate::error::DispatchError;
use crate::protocol::MEDIA_EVENT;
use crate::types::ControlEndpoint;

/// Transport-level notifications, named after the receiver's control events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// `connect`: the channel is open.
    Connect,
    /// `disconnect`: an open channel was lost. Carries the reason.
    Disconnect(String),
    /// `connect_error`: the channel could not be opened.
    ConnectError(String),
}

/// A named event with a single string payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundEvent {
    pub name: String,
    pub payload: String,
}

impl OutboundEvent {
    pub fn media(reference: impl Into<String>) -> Self {
        Self {
            name: MEDIA_EVENT.to_string(),
            payload: reference.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChannelSender(mpsc::UnboundedSender<OutboundEvent>);

impl ChannelSender {
    pub fn send(&self, event: OutboundEvent) -> Result<(), DispatchError> {
        self.0.send(event).map_err(|_| DispatchError::ChannelClosed)
    }
}

/// Closes the channel when dropped.
pub struct ChannelCloser(Option<Box<dyn FnOnce() + Send>>);

impl ChannelCloser {
    pub fn new(on_close: impl FnOnce() + Send + 'static) -> Self {
        Self(Some(Box::new(on_close)))
    }

    pub fn close(mut self) {
        self.run();
    }

    fn run(&mut self) {
        if let Some(on_close) = self.0.take() {
            on_close();
        }
    }
}

impl Drop for ChannelCloser {
    fn drop(&mut self) {
        self.run();
    }
}

/// The session side of one connection attempt.
pub struct ControlChannel {
    pub events: mpsc::UnboundedReceiver<ChannelEvent>,
    pub sender: ChannelSender,
    pub closer: ChannelCloser,
    /// Resolves (with an error) when the transport drops `done`.
    pub drained: oneshot::Receiver<()>,
}

/// The transport side of one connection attempt.
pub struct TransportEnds {
    pub events: mpsc::UnboundedSender<ChannelEvent>,
    pub outbound: mpsc::UnboundedReceiver<OutboundEvent>,
    /// Dropped once the transport has shut down.
    pub done: oneshot::Sender<()>,
}

impl ControlChannel {
    /// Run `on_close` when the session side tears this channel down.
    pub fn on_close(mut self, on_close: impl FnOnce() + Send + 'static) -> Self {
        self.closer = ChannelCloser::new(on_close);
        self
    }
}

/// Build both ends of a channel.
pub fn channel_pair() -> (ControlChannel, TransportEnds) {
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let (done, drained) = oneshot::channel();

    (
        ControlChannel {
            events: event_rx,
            sender: ChannelSender(out_tx),
            closer: ChannelCloser::new(|| {}),
            drained,
        },
        TransportEnds {
            events: event_tx,
            outbound: out_rx,
            done,
        },
    )
}

/// Opens control channels to receivers.
pub trait ControlConnector: Send + Sync + 'static {
    /// Start opening a channel. Must return immediately; the outcome is
    /// reported on the returned channel's events.
    fn open(&self, endpoint: &ControlEndpoint) -> ControlChannel;
}
