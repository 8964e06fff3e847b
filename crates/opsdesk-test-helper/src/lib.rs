//! Fake collaborators for exercising the state containers without a backend,
//! plus once-only tracing setup for the test suites

#![warn(unused_crate_dependencies)]

use std::{
    collections::HashMap,
    sync::{LazyLock, Mutex, MutexGuard},
};

use anyhow::anyhow;
use chrono::Utc;
use futures::channel::{mpsc, oneshot};
use opsdesk_client_core::{BusinessDirectory, IdentityService, SelectionStore};
use opsdesk_shared::{
    admin::AdminRecord,
    business::{Business, BusinessDraft, BusinessKind},
    errors::AuthError,
    id::{AdminId, BusinessId, UserId},
    req_args::{SignInArgs, SignUpArgs},
    session::{AuthSession, SessionChange},
    telemetry::{self, get_subscriber, init_subscriber},
};

// Ensure that the `tracing` stack is only initialised once
pub static TRACING: LazyLock<String> = LazyLock::new(|| {
    let default_filter_level = "info".to_string();
    let subscriber_name = "test".to_string();
    if std::env::var("TEST_LOG").is_ok() {
        let log_file_name = format!("client_tests{}", uuid::Uuid::new_v4());
        let (file, path) = telemetry::create_trace_file(&log_file_name).unwrap();
        let subscriber = get_subscriber(subscriber_name, default_filter_level, file);
        init_subscriber(subscriber).unwrap();
        format!("Traces for tests being written to: {path:?}")
    } else {
        let subscriber = get_subscriber(subscriber_name, default_filter_level, std::io::sink);
        init_subscriber(subscriber).unwrap();
        "Traces set to std::io::sink".to_string()
    }
});

pub fn business_named(name: &str) -> Business {
    Business {
        id: BusinessId::new_random(),
        name: name.try_into().unwrap(),
        kind: BusinessKind::Physical,
        address: None,
        currency: "USD".try_into().unwrap(),
        created_at: Utc::now(),
    }
}

pub fn session_for(user_id: UserId) -> AuthSession {
    AuthSession {
        user_id,
        email: "owner@example.com".to_string(),
    }
}

/// What the fake identity service reports when asked for the current session
#[derive(Debug)]
enum ResolveBehavior {
    Session(Option<AuthSession>),
    Fail(String),
    /// Hold the answer until [`FakeIdentity::release_session`] is called
    Pending,
}

#[derive(Debug)]
pub struct FakeIdentity {
    inner: Mutex<FakeIdentityInner>,
}

#[derive(Debug)]
struct FakeIdentityInner {
    resolve: ResolveBehavior,
    pending_resolves: Vec<oneshot::Sender<anyhow::Result<Option<AuthSession>>>>,
    listeners: Vec<mpsc::UnboundedSender<SessionChange>>,
    sign_in_result: Result<(), AuthError>,
    sign_in_calls: u32,
    sign_out_calls: u32,
    refresh_starts: u32,
    refresh_stops: u32,
    refresh_active: bool,
}

impl Default for FakeIdentity {
    fn default() -> Self {
        Self {
            inner: Mutex::new(FakeIdentityInner {
                resolve: ResolveBehavior::Session(None),
                pending_resolves: Vec::new(),
                listeners: Vec::new(),
                sign_in_result: Ok(()),
                sign_in_calls: 0,
                sign_out_calls: 0,
                refresh_starts: 0,
                refresh_stops: 0,
                refresh_active: false,
            }),
        }
    }
}

impl FakeIdentity {
    fn lock(&self) -> MutexGuard<'_, FakeIdentityInner> {
        self.inner.lock().expect("mutex poisoned")
    }

    pub fn set_resolved_session(&self, session: Option<AuthSession>) {
        self.lock().resolve = ResolveBehavior::Session(session);
    }

    pub fn set_resolve_failure(&self, msg: &str) {
        self.lock().resolve = ResolveBehavior::Fail(msg.to_string());
    }

    pub fn set_resolve_pending(&self) {
        self.lock().resolve = ResolveBehavior::Pending;
    }

    /// Answers every `get_session` call held back by
    /// [`set_resolve_pending`](Self::set_resolve_pending)
    pub fn release_session(&self, session: Option<AuthSession>) {
        for tx in self.lock().pending_resolves.drain(..) {
            let _ = tx.send(Ok(session.clone()));
        }
    }

    pub fn set_sign_in_result(&self, result: Result<(), AuthError>) {
        self.lock().sign_in_result = result;
    }

    /// Pushes a change notification to every subscriber
    pub fn emit(&self, change: SessionChange) {
        self.lock()
            .listeners
            .retain(|tx| tx.unbounded_send(change.clone()).is_ok());
    }

    pub fn refresh_starts(&self) -> u32 {
        self.lock().refresh_starts
    }

    pub fn refresh_stops(&self) -> u32 {
        self.lock().refresh_stops
    }

    pub fn is_refresh_active(&self) -> bool {
        self.lock().refresh_active
    }

    pub fn sign_in_calls(&self) -> u32 {
        self.lock().sign_in_calls
    }

    pub fn sign_out_calls(&self) -> u32 {
        self.lock().sign_out_calls
    }
}

impl IdentityService for FakeIdentity {
    fn get_session(&self) -> oneshot::Receiver<anyhow::Result<Option<AuthSession>>> {
        let (tx, rx) = oneshot::channel();
        let mut inner = self.lock();
        match &inner.resolve {
            ResolveBehavior::Session(session) => {
                tx.send(Ok(session.clone())).expect("receiver dropped");
            }
            ResolveBehavior::Fail(msg) => {
                tx.send(Err(anyhow!("{msg}"))).expect("receiver dropped");
            }
            ResolveBehavior::Pending => inner.pending_resolves.push(tx),
        }
        rx
    }

    fn subscribe_changes(&self) -> mpsc::UnboundedReceiver<SessionChange> {
        let (tx, rx) = mpsc::unbounded();
        self.lock().listeners.push(tx);
        rx
    }

    fn sign_in(&self, _args: SignInArgs) -> oneshot::Receiver<Result<(), AuthError>> {
        let (tx, rx) = oneshot::channel();
        let mut inner = self.lock();
        inner.sign_in_calls += 1;
        tx.send(inner.sign_in_result.clone())
            .expect("receiver dropped");
        rx
    }

    fn sign_up(&self, _args: SignUpArgs) -> oneshot::Receiver<Result<(), AuthError>> {
        let (tx, rx) = oneshot::channel();
        tx.send(Ok(())).expect("receiver dropped");
        rx
    }

    fn sign_out(&self) -> oneshot::Receiver<anyhow::Result<()>> {
        let (tx, rx) = oneshot::channel();
        self.lock().sign_out_calls += 1;
        tx.send(Ok(())).expect("receiver dropped");
        rx
    }

    fn start_auto_refresh(&self) {
        let mut inner = self.lock();
        inner.refresh_starts += 1;
        inner.refresh_active = true;
    }

    fn stop_auto_refresh(&self) {
        let mut inner = self.lock();
        inner.refresh_stops += 1;
        inner.refresh_active = false;
    }
}

#[derive(Debug, Default)]
pub struct FakeDirectory {
    inner: Mutex<FakeDirectoryInner>,
}

#[derive(Debug, Default)]
struct FakeDirectoryInner {
    admins: HashMap<UserId, AdminRecord>,
    grants: Vec<(AdminId, BusinessId)>,
    businesses: HashMap<BusinessId, Business>,
    fail_next_admin_lookup: Option<String>,
    fail_next_business_insert: Option<String>,
    hold_next_rows_query: bool,
    held: Vec<(oneshot::Sender<anyhow::Result<Vec<Business>>>, Vec<Business>)>,
    rows_queries: u32,
    inserted_grants: Vec<(AdminId, BusinessId)>,
}

impl FakeDirectory {
    fn lock(&self) -> MutexGuard<'_, FakeDirectoryInner> {
        self.inner.lock().expect("mutex poisoned")
    }

    pub fn add_admin(&self, user_id: UserId) -> AdminRecord {
        let admin = AdminRecord {
            id: AdminId::new_random(),
            user_id,
            email: "owner@example.com".to_string(),
            full_name: None,
            created_at: Utc::now(),
        };
        self.lock().admins.insert(user_id, admin.clone());
        admin
    }

    pub fn add_business(&self, business: Business) {
        self.lock().businesses.insert(business.id, business);
    }

    pub fn grant(&self, admin_id: AdminId, business_id: BusinessId) {
        self.lock().grants.push((admin_id, business_id));
    }

    /// Registers an admin for the user and grants them all the given
    /// businesses in one go
    pub fn grant_all(&self, user_id: UserId, businesses: &[Business]) -> AdminRecord {
        let admin = self.add_admin(user_id);
        for business in businesses {
            self.add_business(business.clone());
            self.grant(admin.id, business.id);
        }
        admin
    }

    pub fn fail_next_admin_lookup(&self, msg: &str) {
        self.lock().fail_next_admin_lookup = Some(msg.to_string());
    }

    pub fn fail_next_business_insert(&self, msg: &str) {
        self.lock().fail_next_business_insert = Some(msg.to_string());
    }

    /// The next business rows query computes its answer immediately but does
    /// not deliver it until [`release_held`](Self::release_held) is called.
    /// Lets tests race a stale fetch against a newer one.
    pub fn hold_next_rows_query(&self) {
        self.lock().hold_next_rows_query = true;
    }

    pub fn release_held(&self) {
        for (tx, rows) in self.lock().held.drain(..) {
            let _ = tx.send(Ok(rows));
        }
    }

    pub fn rows_queries(&self) -> u32 {
        self.lock().rows_queries
    }

    pub fn inserted_grants(&self) -> Vec<(AdminId, BusinessId)> {
        self.lock().inserted_grants.clone()
    }
}

impl BusinessDirectory for FakeDirectory {
    fn find_admin(
        &self,
        user_id: UserId,
    ) -> oneshot::Receiver<anyhow::Result<Option<AdminRecord>>> {
        let (tx, rx) = oneshot::channel();
        let mut inner = self.lock();
        let msg = match inner.fail_next_admin_lookup.take() {
            Some(msg) => Err(anyhow!("{msg}")),
            None => Ok(inner.admins.get(&user_id).cloned()),
        };
        tx.send(msg).expect("receiver dropped");
        rx
    }

    fn granted_business_ids(
        &self,
        admin_id: AdminId,
    ) -> oneshot::Receiver<anyhow::Result<Vec<BusinessId>>> {
        let (tx, rx) = oneshot::channel();
        let ids = self
            .lock()
            .grants
            .iter()
            .filter(|(granted_admin, _)| *granted_admin == admin_id)
            .map(|(_, business_id)| *business_id)
            .collect();
        tx.send(Ok(ids)).expect("receiver dropped");
        rx
    }

    fn businesses_by_ids(
        &self,
        ids: Vec<BusinessId>,
    ) -> oneshot::Receiver<anyhow::Result<Vec<Business>>> {
        let (tx, rx) = oneshot::channel();
        let mut inner = self.lock();
        inner.rows_queries += 1;
        let mut rows: Vec<Business> = ids
            .iter()
            .filter_map(|id| inner.businesses.get(id).cloned())
            .collect();
        rows.sort_by(|a, b| a.name.as_str().cmp(b.name.as_str()));
        if std::mem::take(&mut inner.hold_next_rows_query) {
            inner.held.push((tx, rows));
        } else {
            tx.send(Ok(rows)).expect("receiver dropped");
        }
        rx
    }

    fn insert_business(&self, draft: BusinessDraft) -> oneshot::Receiver<anyhow::Result<Business>> {
        let (tx, rx) = oneshot::channel();
        let mut inner = self.lock();
        let msg = match inner.fail_next_business_insert.take() {
            Some(msg) => Err(anyhow!("{msg}")),
            None => {
                let business = Business {
                    id: BusinessId::new_random(),
                    name: draft.name,
                    kind: draft.kind,
                    address: draft.address,
                    currency: draft.currency,
                    created_at: Utc::now(),
                };
                inner.businesses.insert(business.id, business.clone());
                Ok(business)
            }
        };
        tx.send(msg).expect("receiver dropped");
        rx
    }

    fn insert_grant(
        &self,
        admin_id: AdminId,
        business_id: BusinessId,
    ) -> oneshot::Receiver<anyhow::Result<()>> {
        let (tx, rx) = oneshot::channel();
        let mut inner = self.lock();
        inner.grants.push((admin_id, business_id));
        inner.inserted_grants.push((admin_id, business_id));
        tx.send(Ok(())).expect("receiver dropped");
        rx
    }
}

#[derive(Debug, Default)]
pub struct MemorySelectionStore {
    entries: Mutex<HashMap<String, String>>,
}

impl SelectionStore for MemorySelectionStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self
            .entries
            .lock()
            .expect("mutex poisoned")
            .get(key)
            .cloned())
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.entries
            .lock()
            .expect("mutex poisoned")
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}
