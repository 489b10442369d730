//! Media dispatch gated on session state.

use chrono::Utc;
use tracing::{debug, info};

use crate::error::DispatchError;
use crate::session::{OutboundEvent, SessionManager};
use crate::types::MediaRequest;

/// Sends media references over the active control channel.
///
/// Holds no state of its own: every call reads the session state at that
/// moment. No retry, no queueing.
#[derive(Clone)]
pub struct MediaDispatcher {
    session: SessionManager,
}

impl MediaDispatcher {
    pub fn new(session: SessionManager) -> Self {
        Self { session }
    }

    /// Queue `reference` for the receiver.
    ///
    /// Fails with [`DispatchError::NotConnected`] without touching the
    /// network unless the session is `Connected` at the time of the call.
    /// The reference is opaque and sent as given; a blank one is refused.
    pub fn dispatch(&self, reference: &str) -> Result<MediaRequest, DispatchError> {
        self.session
            .with_connected_channel(|sender| {
                if reference.trim().is_empty() {
                    return Err(DispatchError::EmptyReference);
                }
                sender.send(OutboundEvent::media(reference))
            })
            .map_err(|state| {
                debug!(%state, "dispatch refused");
                DispatchError::NotConnected { state }
            })??;

        let mut request = MediaRequest::new(reference);
        request.dispatched_at = Some(Utc::now());
        info!(reference = %request.reference, "media dispatched");
        Ok(request)
    }
}
