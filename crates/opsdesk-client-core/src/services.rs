//! Seams to the external collaborators. The containers in this crate only
//! ever talk to these traits so tests can substitute fakes and the rest
//! adapter stays swappable.
//!
//! Single answers come back as a `oneshot::Receiver` and change streams as an
//! unbounded `mpsc` receiver so callers can either await or poll from a UI
//! loop.

use std::fmt::Debug;

use futures::channel::{mpsc, oneshot};
use opsdesk_shared::{
    admin::AdminRecord,
    business::{Business, BusinessDraft},
    errors::AuthError,
    id::{AdminId, BusinessId, UserId},
    req_args::{SignInArgs, SignUpArgs},
    session::{AuthSession, SessionChange},
};

/// The hosted identity service
pub trait IdentityService: Debug + Send + Sync {
    /// Reports the session that is already in effect, if any. Used exactly
    /// once at boot; later updates arrive via [`Self::subscribe_changes`].
    fn get_session(&self) -> oneshot::Receiver<anyhow::Result<Option<AuthSession>>>;

    /// Change notifications for everything that happens after the initial
    /// resolution. Dropping the receiver unsubscribes.
    fn subscribe_changes(&self) -> mpsc::UnboundedReceiver<SessionChange>;

    /// Success is reported through a follow up [`SessionChange::SignedIn`],
    /// not by the returned result alone
    fn sign_in(&self, args: SignInArgs) -> oneshot::Receiver<Result<(), AuthError>>;

    fn sign_up(&self, args: SignUpArgs) -> oneshot::Receiver<Result<(), AuthError>>;

    fn sign_out(&self) -> oneshot::Receiver<anyhow::Result<()>>;

    fn start_auto_refresh(&self);
    fn stop_auto_refresh(&self);
}

/// Row queries against the tenant data service. Access control lives on the
/// backend; this client only ever sees rows it was granted.
pub trait BusinessDirectory: Debug + Send + Sync {
    fn find_admin(&self, user_id: UserId)
        -> oneshot::Receiver<anyhow::Result<Option<AdminRecord>>>;

    fn granted_business_ids(
        &self,
        admin_id: AdminId,
    ) -> oneshot::Receiver<anyhow::Result<Vec<BusinessId>>>;

    /// Must return rows ordered by name ascending
    fn businesses_by_ids(
        &self,
        ids: Vec<BusinessId>,
    ) -> oneshot::Receiver<anyhow::Result<Vec<Business>>>;

    fn insert_business(&self, draft: BusinessDraft)
        -> oneshot::Receiver<anyhow::Result<Business>>;

    fn insert_grant(
        &self,
        admin_id: AdminId,
        business_id: BusinessId,
    ) -> oneshot::Receiver<anyhow::Result<()>>;
}

/// Durable client-local key/value storage for the active business selection
pub trait SelectionStore: Debug + Send + Sync {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> anyhow::Result<()>;
}

/// Storage key for a user's active business. Namespaced per user so two
/// users sharing a client profile cannot see each other's selection.
pub fn selection_key(user_id: UserId) -> String {
    format!("active_business/{user_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_keys_differ_per_user() {
        let a = UserId::new_random();
        let b = UserId::new_random();
        assert_ne!(selection_key(a), selection_key(b));
        assert!(selection_key(a).starts_with("active_business/"));
    }
}
