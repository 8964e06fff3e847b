use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Context as _;
use futures::channel::mpsc;
use opsdesk_shared::{
    business::{Business, BusinessDraft, BusinessName},
    errors::{BusinessCreateError, BusinessLoadError},
    id::{AdminId, BusinessId, UserId},
};
use tracing::{debug, error, info, instrument, warn};

use crate::services::{selection_key, BusinessDirectory, SelectionStore};

/// Where the selector currently is. Mirrors what a UI needs to render:
/// nothing (signed out), a spinner, the list, or an error with a retry.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub enum SelectorPhase {
    /// No session, nothing to show
    #[default]
    Idle,
    Loading,
    Ready {
        /// Ordered by name ascending. Empty is a normal state for users
        /// without grants, not an error.
        businesses: Vec<Business>,
        active: Option<Business>,
    },
    /// Recoverable via [`BusinessSelector::refresh`]
    Failed(BusinessLoadError),
}

impl SelectorPhase {
    /// Returns `true` if the selector phase is [`Ready`].
    ///
    /// [`Ready`]: SelectorPhase::Ready
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready { .. })
    }

    /// Returns `true` if the selector phase is [`Loading`].
    ///
    /// [`Loading`]: SelectorPhase::Loading
    #[must_use]
    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    /// Returns `true` if the selector phase is [`Failed`].
    ///
    /// [`Failed`]: SelectorPhase::Failed
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(..))
    }
}

/// User-visible confirmations and complaints (toast material, not state)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Switched { name: BusinessName },
    Created { name: BusinessName },
    CreateFailed { reason: String },
}

/// Owns the list of businesses the signed in user may access and the single
/// active one. Driven by the session manager's events; see
/// [`drive_selector`](crate::drive_selector).
#[derive(Debug, Clone)]
pub struct BusinessSelector {
    directory: Arc<dyn BusinessDirectory>,
    store: Arc<dyn SelectionStore>,
    inner: Arc<Mutex<SelectorInner>>,
}

#[derive(Debug)]
struct SelectorInner {
    phase: SelectorPhase,
    user_id: Option<UserId>,
    admin_id: Option<AdminId>,
    /// Bumped every time a fetch is initiated. A completing fetch commits
    /// only if the generation it was started under is still current, so a
    /// slow stale fetch can never overwrite a newer one.
    generation: u64,
    notice_listeners: Vec<mpsc::UnboundedSender<Notice>>,
}

impl BusinessSelector {
    pub fn new(directory: Arc<dyn BusinessDirectory>, store: Arc<dyn SelectionStore>) -> Self {
        Self {
            directory,
            store,
            inner: Arc::new(Mutex::new(SelectorInner {
                phase: SelectorPhase::default(),
                user_id: None,
                admin_id: None,
                generation: 0,
                notice_listeners: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SelectorInner> {
        self.inner.lock().expect("mutex poisoned")
    }

    pub fn phase(&self) -> SelectorPhase {
        self.lock().phase.clone()
    }

    /// Ordered by name ascending, empty unless ready
    pub fn businesses(&self) -> Vec<Business> {
        match &self.lock().phase {
            SelectorPhase::Ready { businesses, .. } => businesses.clone(),
            _ => Vec::new(),
        }
    }

    pub fn active_business(&self) -> Option<Business> {
        match &self.lock().phase {
            SelectorPhase::Ready { active, .. } => active.clone(),
            _ => None,
        }
    }

    pub fn subscribe_notices(&self) -> mpsc::UnboundedReceiver<Notice> {
        let (tx, rx) = mpsc::unbounded();
        self.lock().notice_listeners.push(tx);
        rx
    }

    /// Reacts to an identity transition. `None` (signed out) drops back to
    /// idle and clears the in-memory list and active selection; the persisted
    /// selection is deliberately left in place so the same user gets it back
    /// on their next sign in. `Some` starts a fresh fetch of the permitted
    /// set.
    #[instrument(skip(self))]
    pub async fn apply_session(&self, user_id: Option<UserId>) {
        let Some(user_id) = user_id else {
            let mut inner = self.lock();
            inner.generation += 1;
            inner.user_id = None;
            inner.admin_id = None;
            inner.phase = SelectorPhase::Idle;
            return;
        };
        let generation = {
            let mut inner = self.lock();
            inner.generation += 1;
            inner.user_id = Some(user_id);
            inner.phase = SelectorPhase::Loading;
            inner.generation
        };
        self.run_fetch(user_id, generation).await;
    }

    /// Re-runs the fetch pipeline on demand, eg. to retry after a failure or
    /// to pick up changes made elsewhere. No-op when signed out.
    #[instrument(skip(self))]
    pub async fn refresh(&self) {
        let Some((user_id, generation)) = self.begin_refetch() else {
            return;
        };
        self.run_fetch(user_id, generation).await;
    }

    /// Validates the id against the current list; switching to a business
    /// that is not in the list is a no-op. On success the selection is
    /// updated in memory and in durable storage and a confirmation notice is
    /// emitted.
    #[instrument(skip(self))]
    pub fn switch_business(&self, business_id: BusinessId) -> Option<Business> {
        let target = {
            let mut inner = self.lock();
            let user_id = inner.user_id?;
            let target = match &mut inner.phase {
                SelectorPhase::Ready { businesses, active } => {
                    let Some(target) = businesses.iter().find(|b| b.id == business_id).cloned()
                    else {
                        debug!(%business_id, "ignoring switch to a business not in the current list");
                        return None;
                    };
                    *active = Some(target.clone());
                    target
                }
                _ => return None,
            };
            if let Err(e) = self
                .store
                .set(&selection_key(user_id), &target.id.to_string())
            {
                warn!("failed to persist business selection: {e:#}");
            }
            target
        };
        info!(business = %target.name, "active business switched");
        self.notify(Notice::Switched {
            name: target.name.clone(),
        });
        Some(target)
    }

    /// Creates a business, grants the signed in user access to it and then
    /// re-fetches the whole list. The list is never spliced locally: the
    /// backend's authorization state is the source of truth for what this
    /// user can see. On failure nothing is mutated and a notice is emitted.
    #[instrument(skip(self))]
    pub async fn add_business(
        &self,
        draft: BusinessDraft,
    ) -> Result<Business, BusinessCreateError> {
        let (user_id, admin_id) = {
            let inner = self.lock();
            let user_id = inner.user_id.ok_or(BusinessCreateError::NotSignedIn)?;
            let admin_id = inner.admin_id.ok_or(BusinessCreateError::NoAdminRecord)?;
            (user_id, admin_id)
        };

        let created = match self.create_and_grant(admin_id, draft).await {
            Ok(created) => created,
            Err(e) => {
                error!("failed to create business: {e:#}");
                self.notify(Notice::CreateFailed {
                    reason: format!("{e:#}"),
                });
                return Err(BusinessCreateError::Backend(format!("{e:#}")));
            }
        };
        self.notify(Notice::Created {
            name: created.name.clone(),
        });

        // Re-fetch under a fresh generation so an older in-flight fetch
        // cannot land on top of the post-create list
        let refetch = {
            let mut inner = self.lock();
            if inner.user_id != Some(user_id) {
                None // user changed while the create was in flight
            } else {
                inner.generation += 1;
                inner.phase = SelectorPhase::Loading;
                Some(inner.generation)
            }
        };
        if let Some(generation) = refetch {
            self.run_fetch(user_id, generation).await;
        }
        Ok(created)
    }

    async fn create_and_grant(
        &self,
        admin_id: AdminId,
        draft: BusinessDraft,
    ) -> anyhow::Result<Business> {
        let created = self
            .directory
            .insert_business(draft)
            .await
            .context("directory dropped the business insert response")??;
        self.directory
            .insert_grant(admin_id, created.id)
            .await
            .context("directory dropped the grant insert response")??;
        Ok(created)
    }

    fn begin_refetch(&self) -> Option<(UserId, u64)> {
        let mut inner = self.lock();
        let user_id = inner.user_id?;
        inner.generation += 1;
        inner.phase = SelectorPhase::Loading;
        Some((user_id, inner.generation))
    }

    async fn run_fetch(&self, user_id: UserId, generation: u64) {
        let outcome = self.fetch_permitted(user_id).await;
        let mut inner = self.lock();
        if inner.generation != generation || inner.user_id != Some(user_id) {
            debug!(generation, "discarding stale business fetch result");
            return;
        }
        match outcome {
            Ok((admin_id, businesses)) => {
                inner.admin_id = admin_id;
                let active = self.resolve_active(user_id, &businesses);
                inner.phase = SelectorPhase::Ready { businesses, active };
            }
            Err(e) => {
                error!("failed to load businesses: {e:#}");
                inner.admin_id = None;
                inner.phase = SelectorPhase::Failed(BusinessLoadError(format!("{e:#}")));
            }
        }
    }

    /// user -> admin record -> granted ids -> business rows (sorted by name).
    /// A user without an admin record or without grants legitimately sees an
    /// empty list.
    async fn fetch_permitted(
        &self,
        user_id: UserId,
    ) -> anyhow::Result<(Option<AdminId>, Vec<Business>)> {
        let admin = self
            .directory
            .find_admin(user_id)
            .await
            .context("directory dropped the admin lookup response")??;
        let Some(admin) = admin else {
            return Ok((None, Vec::new()));
        };
        let ids = self
            .directory
            .granted_business_ids(admin.id)
            .await
            .context("directory dropped the grants lookup response")??;
        if ids.is_empty() {
            return Ok((Some(admin.id), Vec::new()));
        }
        let businesses = self
            .directory
            .businesses_by_ids(ids)
            .await
            .context("directory dropped the business rows response")??;
        Ok((Some(admin.id), businesses))
    }

    /// Restores the persisted selection if it is still in the permitted set,
    /// otherwise falls back to the first business by name and rewrites
    /// storage to match. A stale persisted id is corrected silently.
    fn resolve_active(&self, user_id: UserId, businesses: &[Business]) -> Option<Business> {
        if businesses.is_empty() {
            return None;
        }
        let key = selection_key(user_id);
        let persisted = self.store.get(&key).unwrap_or_else(|e| {
            warn!("failed to read persisted business selection: {e:#}");
            None
        });
        if let Some(persisted) = persisted {
            match persisted.parse::<BusinessId>() {
                Ok(id) => {
                    if let Some(found) = businesses.iter().find(|b| b.id == id) {
                        return Some(found.clone());
                    }
                    warn!(%id, "persisted business selection no longer accessible, falling back to first by name");
                }
                Err(e) => warn!("persisted business selection is not a valid id: {e}"),
            }
        }
        // List arrives sorted by name so the first entry is the
        // lexicographic fallback
        let fallback = businesses[0].clone();
        if let Err(e) = self.store.set(&key, &fallback.id.to_string()) {
            warn!("failed to persist business selection: {e:#}");
        }
        Some(fallback)
    }

    fn notify(&self, notice: Notice) {
        self.lock()
            .notice_listeners
            .retain(|tx| tx.unbounded_send(notice.clone()).is_ok());
    }
}
