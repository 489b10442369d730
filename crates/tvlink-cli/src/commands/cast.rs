//! Cast command implementation.

use std::time::Duration;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::timeout;
use tracing::{debug, info, warn};
use tvlink_core::session::CLOSE_GRACE;
use tvlink_core::{MediaDispatcher, SessionEvent, SessionManager, SessionState};

use super::{spinner, target_device, Context};
use crate::cli::CastArgs;
use crate::error::CliError;
use crate::output::get_formatter;

/// Slack on top of the connect timeout before giving up on the session.
const WAIT_MARGIN: Duration = Duration::from_secs(1);

/// Run the cast command
pub async fn run_cast(args: CastArgs, ctx: Context) -> Result<(), CliError> {
    let device = target_device(&args.address)?;
    let reference = args
        .reference
        .unwrap_or_else(|| ctx.config.media.default_reference.clone());
    let formatter = get_formatter(ctx.json);

    let session = SessionManager::with_socketio(&ctx.config.session);
    let dispatcher = MediaDispatcher::new(session.clone());
    let mut events = session.subscribe();

    let pb = spinner(format!("Connecting to {}...", device.address), ctx.json);
    session.connect(device);

    let wait = ctx.config.session.connect_timeout() + WAIT_MARGIN;
    let outcome = timeout(wait, wait_for_outcome(&mut events)).await;
    pb.finish_and_clear();

    match outcome {
        Err(_) => {
            session.close();
            return Err(CliError::Timeout(format!(
                "no answer from {} within {}ms",
                args.address,
                wait.as_millis()
            )));
        }
        Ok(SessionState::Connected) => {}
        Ok(SessionState::Failed(reason)) => return Err(CliError::SessionFailed(reason)),
        Ok(other) => {
            return Err(CliError::SessionFailed(format!("session ended ({})", other)));
        }
    }

    let result = dispatcher.dispatch(&reference);

    // Flushes the queued event before the runtime shuts down.
    if timeout(CLOSE_GRACE + WAIT_MARGIN, session.shutdown())
        .await
        .is_err()
    {
        warn!(address = %args.address, "control channel did not close in time");
    }
    let request = result?;

    info!(address = %args.address, reference = %request.reference, "cast sent");
    println!("{}", formatter.format_dispatch(&args.address, &request));
    Ok(())
}

/// Wait until the attempt is `Connected` or has ended.
async fn wait_for_outcome(events: &mut broadcast::Receiver<SessionEvent>) -> SessionState {
    loop {
        match events.recv().await {
            Ok(event) => {
                debug!(state = %event.state, "session event");
                if event.state.is_connected() || event.state.is_terminal() {
                    return event.state;
                }
            }
            Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => return SessionState::Disconnected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tvlink_core::error::DispatchError;

    fn event(state: SessionState) -> SessionEvent {
        SessionEvent {
            attempt: 1,
            address: "192.168.1.2".to_string(),
            state,
        }
    }

    #[tokio::test]
    async fn test_wait_stops_at_connected() {
        let (tx, mut rx) = broadcast::channel(8);
        tx.send(event(SessionState::Connecting)).unwrap();
        tx.send(event(SessionState::Connected)).unwrap();

        assert_eq!(wait_for_outcome(&mut rx).await, SessionState::Connected);
    }

    #[tokio::test]
    async fn test_wait_stops_at_failure() {
        let (tx, mut rx) = broadcast::channel(8);
        tx.send(event(SessionState::Connecting)).unwrap();
        tx.send(event(SessionState::Failed("refused".to_string()))).unwrap();

        assert_eq!(
            wait_for_outcome(&mut rx).await,
            SessionState::Failed("refused".to_string())
        );
    }

    #[tokio::test]
    async fn test_dispatch_before_connect_is_refused() {
        let session = SessionManager::with_socketio(&Default::default());
        let dispatcher = MediaDispatcher::new(session);

        assert!(matches!(
            dispatcher.dispatch("http://x/video.mp4"),
            Err(DispatchError::NotConnected {
                state: SessionState::Idle
            })
        ));
    }
}
