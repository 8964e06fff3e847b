use crate::id::UserId;

/// The identity service's view of who is signed in
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq, Eq)]
pub struct AuthSession {
    pub user_id: UserId,
    pub email: String,
}

/// Pushed by the identity service whenever the session changes after the
/// initial resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionChange {
    SignedIn(AuthSession),
    TokenRefreshed(AuthSession),
    SignedOut,
}

impl SessionChange {
    /// The session this change leaves in effect, if any
    pub fn session(&self) -> Option<&AuthSession> {
        match self {
            SessionChange::SignedIn(s) | SessionChange::TokenRefreshed(s) => Some(s),
            SessionChange::SignedOut => None,
        }
    }
}
