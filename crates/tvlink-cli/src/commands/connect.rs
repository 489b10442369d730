//! Connect command implementation.

use tokio::sync::broadcast::error::RecvError;
use tracing::warn;
use tvlink_core::{SessionEvent, SessionManager, SessionState};

use super::{target_device, Context};
use crate::cli::ConnectArgs;
use crate::error::CliError;
use crate::output::{get_formatter, OutputFormatter};

/// Run the connect command
///
/// Prints every session transition until the session ends or Ctrl+C closes it.
pub async fn run_connect(args: ConnectArgs, ctx: Context) -> Result<(), CliError> {
    let device = target_device(&args.address)?;
    let formatter = get_formatter(ctx.json);

    let session = SessionManager::with_socketio(&ctx.config.session);
    let mut events = session.subscribe();
    session.connect(device);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let final_state = loop {
        tokio::select! {
            received = events.recv() => match received {
                Ok(event) => {
                    print_event(formatter.as_ref(), &event);
                    if event.state.is_terminal() {
                        break event.state;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "session events dropped");
                }
                Err(RecvError::Closed) => break session.current_state(),
            },
            _ = &mut ctrl_c => {
                session.shutdown().await;
                while let Ok(event) = events.try_recv() {
                    print_event(formatter.as_ref(), &event);
                }
                break session.current_state();
            }
        }
    };

    match final_state {
        SessionState::Failed(reason) => Err(CliError::SessionFailed(reason)),
        _ => Ok(()),
    }
}

fn print_event(formatter: &dyn OutputFormatter, event: &SessionEvent) {
    println!("{}", formatter.format_session_event(event));
}
