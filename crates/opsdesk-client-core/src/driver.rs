use futures::{channel::mpsc, StreamExt as _};
use tracing::debug;

use crate::{selector::BusinessSelector, session::SessionEvent};

/// Feeds the session manager's identity transitions into the selector.
///
/// Wiring at boot looks like:
/// ```ignore
/// let events = session_manager.subscribe();
/// let driver = drive_selector(events, selector.clone());
/// // spawn or join `driver`, then:
/// session_manager.resolve().await;
/// ```
/// Runs until the session manager (and with it the sending side) goes away.
pub async fn drive_selector(
    mut events: mpsc::UnboundedReceiver<SessionEvent>,
    selector: BusinessSelector,
) {
    while let Some(event) = events.next().await {
        let SessionEvent::Resolved(user_id) = event;
        selector.apply_session(user_id).await;
    }
    debug!("session event channel closed, selector driver stopping");
}
