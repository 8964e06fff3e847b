use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Context as _;
use futures::channel::mpsc;
use opsdesk_shared::{
    errors::AuthError,
    id::UserId,
    req_args::{SignInArgs, SignUpArgs},
    session::{AuthSession, SessionChange},
};
use tracing::{debug, error, instrument};

use crate::services::IdentityService;

/// Snapshot of the authentication state for synchronous reads
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: Option<UserId>,
    pub is_authenticated: bool,
    /// True until the initial resolution completes (or fails)
    pub is_resolving: bool,
}

/// Emitted on subscriber channels exactly once per identity transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The signed in user changed (including to or from nobody)
    Resolved(Option<UserId>),
}

/// Owns authentication state. Leaf dependency, talks only to the identity
/// service.
///
/// Construct once at boot, call [`resolve`](Self::resolve) exactly once, then
/// let the app loop call [`pump_changes`](Self::pump_changes) to apply change
/// notifications.
#[derive(Debug, Clone)]
pub struct SessionManager {
    identity: Arc<dyn IdentityService>,
    inner: Arc<Mutex<SessionInner>>,
}

#[derive(Debug)]
struct SessionInner {
    current: Option<AuthSession>,
    is_resolving: bool,
    resolve_started: bool,
    resolve_completed: bool,
    refresh_active: bool,
    changes: Option<mpsc::UnboundedReceiver<SessionChange>>,
    listeners: Vec<mpsc::UnboundedSender<SessionEvent>>,
    live: bool,
}

impl SessionManager {
    pub fn new(identity: Arc<dyn IdentityService>) -> Self {
        Self {
            identity,
            inner: Arc::new(Mutex::new(SessionInner {
                current: None,
                is_resolving: true,
                resolve_started: false,
                resolve_completed: false,
                refresh_active: false,
                changes: None,
                listeners: Vec::new(),
                live: true,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().expect("mutex poisoned")
    }

    /// Synchronous read of the current in-memory state
    pub fn current_session(&self) -> Session {
        let inner = self.lock();
        Session {
            user_id: inner.current.as_ref().map(|s| s.user_id),
            is_authenticated: inner.current.is_some(),
            is_resolving: inner.is_resolving,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.lock().current.is_some()
    }

    /// Register for identity transition events. Each transition is reported
    /// exactly once per subscriber.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<SessionEvent> {
        let (tx, rx) = mpsc::unbounded();
        self.lock().listeners.push(tx);
        rx
    }

    /// Queries the identity service for an existing session and only then
    /// opens the door to change notifications. Anything the service pushed
    /// while the query was in flight is dropped so a stale "nobody signed in
    /// yet" notification cannot overwrite the answer we are about to apply.
    ///
    /// Effective only once; later calls are no-ops. The token auto-refresh
    /// process is started only after a session was actually found, so a
    /// failed resolution leaves the user signed out without a refresh loop
    /// hammering the service.
    #[instrument(skip(self))]
    pub async fn resolve(&self) {
        {
            let mut inner = self.lock();
            if inner.resolve_started {
                debug!("session resolution already ran, ignoring");
                return;
            }
            inner.resolve_started = true;
            inner.is_resolving = true;
        }
        // Only ever one refresh loop, even if a previous run left one behind
        self.identity.stop_auto_refresh();
        let changes = self.identity.subscribe_changes();
        self.lock().changes = Some(changes);

        let outcome = self.identity.get_session().await;

        let user_id = {
            let mut inner = self.lock();
            if let Some(rx) = inner.changes.as_mut() {
                // Buffered notifications predate the answer we just received
                while let Ok(Some(change)) = rx.try_next() {
                    debug!(
                        ?change,
                        "dropping session change received before resolution completed"
                    );
                }
            }
            match outcome {
                Ok(Ok(session)) => inner.current = session,
                Ok(Err(e)) => {
                    // Fail closed: unreachable identity service means signed out
                    error!("session resolution failed, treating user as signed out: {e:#}");
                    inner.current = None;
                }
                Err(_cancelled) => {
                    error!("identity service dropped the session response, treating user as signed out");
                    inner.current = None;
                }
            }
            inner.is_resolving = false;
            inner.resolve_completed = true;
            inner.current.as_ref().map(|s| s.user_id)
        };

        if user_id.is_some() {
            self.start_refresh();
        }
        self.emit(SessionEvent::Resolved(user_id));
    }

    /// Applies any pending change notifications. Intended to be called from
    /// the app loop; cheap when nothing is pending. Notifications are ignored
    /// until [`resolve`](Self::resolve) has completed and after
    /// [`shutdown`](Self::shutdown).
    pub fn pump_changes(&self) {
        let pending: Vec<SessionChange> = {
            let mut inner = self.lock();
            if !inner.resolve_completed || !inner.live {
                return;
            }
            let Some(rx) = inner.changes.as_mut() else {
                return;
            };
            let mut drained = Vec::new();
            while let Ok(Some(change)) = rx.try_next() {
                drained.push(change);
            }
            drained
        };
        for change in pending {
            self.apply_change(change);
        }
    }

    fn apply_change(&self, change: SessionChange) {
        let (previous, next) = {
            let mut inner = self.lock();
            let previous = inner.current.as_ref().map(|s| s.user_id);
            inner.current = change.session().cloned();
            (previous, inner.current.as_ref().map(|s| s.user_id))
        };
        match &change {
            SessionChange::SignedIn(_) => self.start_refresh(),
            SessionChange::SignedOut => self.stop_refresh(),
            SessionChange::TokenRefreshed(_) => {}
        }
        if previous != next {
            self.emit(SessionEvent::Resolved(next));
        }
    }

    /// Delegates to the identity service. Local state is not touched here;
    /// the follow up change notification is the single source of truth.
    #[instrument(skip(self))]
    pub async fn sign_in(&self, args: SignInArgs) -> Result<(), AuthError> {
        match self.identity.sign_in(args).await {
            Ok(result) => result,
            Err(_cancelled) => Err(AuthError::Service(
                "identity service dropped the sign in response".to_string(),
            )),
        }
    }

    #[instrument(skip(self))]
    pub async fn sign_up(&self, args: SignUpArgs) -> Result<(), AuthError> {
        match self.identity.sign_up(args).await {
            Ok(result) => result,
            Err(_cancelled) => Err(AuthError::Service(
                "identity service dropped the sign up response".to_string(),
            )),
        }
    }

    /// Requests session termination. The change notification clears the
    /// local state (and stops the refresh loop).
    #[instrument(skip(self))]
    pub async fn sign_out(&self) -> anyhow::Result<()> {
        self.identity
            .sign_out()
            .await
            .context("identity service dropped the sign out response")?
    }

    /// Unsubscribes from change notifications and stops the refresh loop.
    /// In-flight responses that arrive later are ignored.
    #[instrument(skip(self))]
    pub fn shutdown(&self) {
        let had_refresh = {
            let mut inner = self.lock();
            inner.live = false;
            inner.changes = None;
            inner.listeners.clear();
            std::mem::take(&mut inner.refresh_active)
        };
        if had_refresh {
            self.identity.stop_auto_refresh();
        }
    }

    fn start_refresh(&self) {
        let start = {
            let mut inner = self.lock();
            if inner.refresh_active || !inner.live {
                false
            } else {
                inner.refresh_active = true;
                true
            }
        };
        if start {
            self.identity.start_auto_refresh();
        }
    }

    fn stop_refresh(&self) {
        let stop = std::mem::take(&mut self.lock().refresh_active);
        if stop {
            self.identity.stop_auto_refresh();
        }
    }

    fn emit(&self, event: SessionEvent) {
        self.lock()
            .listeners
            .retain(|tx| tx.unbounded_send(event.clone()).is_ok());
    }
}
