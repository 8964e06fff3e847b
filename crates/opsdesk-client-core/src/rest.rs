//! Adapter for the hosted backend: identity endpoints (token grant flows)
//! plus PostgREST-style row endpoints. Everything is non-blocking; results
//! come back on oneshot channels the way the rest of this crate expects.

use std::fmt::Debug;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{anyhow, Context as _};
use closure_traits::{ChannelCallBack, ChannelCallBackOutput};
use futures::channel::{mpsc, oneshot};
use reqwest::StatusCode;
use secrecy::{ExposeSecret as _, SecretString};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use opsdesk_shared::{
    admin::{AccessGrant, AdminRecord},
    business::{Business, BusinessDraft},
    const_config::path::{
        PathSpec, PATH_AUTH_LOGOUT, PATH_AUTH_SIGNUP, PATH_AUTH_TOKEN, PATH_REST_ACCESS_GRANTS,
        PATH_REST_ACCESS_GRANTS_INSERT, PATH_REST_ADMIN_USERS, PATH_REST_BUSINESSES,
        PATH_REST_BUSINESSES_INSERT,
    },
    errors::AuthError,
    id::{AdminId, BusinessId, UserId},
    req_args::{SignInArgs, SignUpArgs},
    session::{AuthSession, SessionChange},
};

use crate::config::RestConfig;
use crate::services::{BusinessDirectory, IdentityService};

pub mod api;

/// Access tokens live an hour by default, refresh well before expiry
const REFRESH_INTERVAL: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, Clone)]
pub struct RestBackend {
    api_client: reqwest::Client,
    inner: Arc<Mutex<RestInner>>,
}

#[derive(Debug)]
struct RestInner {
    base_url: String,
    anon_key: SecretString,
    access_token: Option<SecretString>,
    refresh_token: Option<SecretString>,
    session: Option<AuthSession>,
    change_listeners: Vec<mpsc::UnboundedSender<SessionChange>>,
    refresh_cancel: Option<CancellationToken>,
}

impl RestBackend {
    pub fn new(base_url: String, anon_key: SecretString) -> Self {
        let api_client = reqwest::Client::builder()
            .build()
            .expect("Unable to create reqwest client");
        Self {
            api_client,
            inner: Arc::new(Mutex::new(RestInner {
                base_url,
                anon_key,
                access_token: None,
                refresh_token: None,
                session: None,
                change_listeners: Vec::new(),
                refresh_cancel: None,
            })),
        }
    }

    pub fn from_config(config: RestConfig) -> Self {
        let backend = Self::new(config.base_url, config.anon_key);
        backend.lock().refresh_token = config.refresh_token;
        backend
    }

    fn lock(&self) -> MutexGuard<'_, RestInner> {
        self.inner.lock().expect("mutex poisoned")
    }

    fn path_to_url(&self, path: &str) -> String {
        format!("{}{path}", &self.lock().base_url)
    }

    /// The anon key identifies the project; the bearer token carries the
    /// user's identity (falls back to the anon key when signed out)
    fn attach_headers(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let inner = self.lock();
        let bearer = inner
            .access_token
            .as_ref()
            .unwrap_or(&inner.anon_key)
            .expose_secret()
            .to_string();
        request
            .header("apikey", inner.anon_key.expose_secret())
            .header(reqwest::header::AUTHORIZATION, format!("Bearer {bearer}"))
    }

    fn initiate_get<F, O>(&self, path_spec: PathSpec, query: &[(&str, String)], on_done: F)
    where
        F: ChannelCallBack<O>,
        O: ChannelCallBackOutput,
    {
        debug_assert_eq!(path_spec.method, reqwest::Method::GET);
        let request = self
            .api_client
            .request(path_spec.method, self.path_to_url(path_spec.path))
            .query(query);
        reqwest_cross::fetch(self.attach_headers(request), on_done)
    }

    // WARNING: Must not log the body as it may contain sensitive info
    fn initiate_post<T, F, O>(
        &self,
        path_spec: PathSpec,
        query: &[(&str, &str)],
        body: &T,
        prefer: Option<&'static str>,
        on_done: F,
    ) where
        T: serde::Serialize,
        F: ChannelCallBack<O>,
        O: ChannelCallBackOutput,
    {
        debug_assert_eq!(path_spec.method, reqwest::Method::POST);
        let mut request = self
            .api_client
            .request(path_spec.method, self.path_to_url(path_spec.path))
            .query(query)
            .json(body);
        if let Some(prefer) = prefer {
            request = request.header("Prefer", prefer);
        }
        reqwest_cross::fetch(self.attach_headers(request), on_done)
    }

    /// GET returning json rows, with a mapping step applied before the
    /// result is sent back
    fn send_get_mapped<U, V, M>(
        &self,
        path_spec: PathSpec,
        query: Vec<(&'static str, String)>,
        map: M,
    ) -> oneshot::Receiver<anyhow::Result<V>>
    where
        U: Send + Debug + serde::de::DeserializeOwned + 'static,
        V: Send + Debug + 'static,
        M: FnOnce(U) -> anyhow::Result<V> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let on_done = move |resp: reqwest::Result<reqwest::Response>| async move {
            let msg = match process_json_body::<U>(resp).await {
                Ok(parsed) => map(parsed),
                Err(e) => Err(e),
            };
            tx.send(msg).expect("failed to send oneshot msg");
        };
        self.initiate_get(path_spec, &query, on_done);
        rx
    }

    fn store_session(&self, token: TokenResponse) -> AuthSession {
        let session = AuthSession {
            user_id: token.user.id,
            email: token.user.email,
        };
        let mut inner = self.lock();
        inner.access_token = Some(token.access_token);
        inner.refresh_token = Some(token.refresh_token);
        inner.session = Some(session.clone());
        session
    }

    fn broadcast_change(&self, change: SessionChange) {
        self.lock()
            .change_listeners
            .retain(|tx| tx.unbounded_send(change.clone()).is_ok());
    }

    /// Clears local credentials and tells subscribers, without waiting on
    /// the server
    fn clear_session(&self) {
        let cancel = {
            let mut inner = self.lock();
            inner.access_token = None;
            inner.refresh_token = None;
            inner.session = None;
            inner.refresh_cancel.take()
        };
        if let Some(cancel) = cancel {
            cancel.cancel();
        }
        self.broadcast_change(SessionChange::SignedOut);
    }

    async fn refresh_session(&self) -> anyhow::Result<()> {
        let refresh_token = self.lock().refresh_token.clone();
        let Some(refresh_token) = refresh_token else {
            debug!("no refresh token, skipping token refresh");
            return Ok(());
        };
        let (tx, rx) = oneshot::channel();
        let body = serde_json::json!({ "refresh_token": refresh_token.expose_secret() });
        let backend = self.clone();
        let on_done = move |resp: reqwest::Result<reqwest::Response>| async move {
            let msg =
                process_token_exchange(resp, backend, Some(SessionChange::TokenRefreshed)).await;
            tx.send(msg).expect("failed to send oneshot msg");
        };
        self.initiate_post(
            PATH_AUTH_TOKEN,
            &[("grant_type", "refresh_token")],
            &body,
            None,
            on_done,
        );
        rx.await
            .context("token refresh response channel dropped")??;
        Ok(())
    }
}

impl IdentityService for RestBackend {
    #[tracing::instrument(skip(self))]
    fn get_session(&self) -> oneshot::Receiver<anyhow::Result<Option<AuthSession>>> {
        let (tx, rx) = oneshot::channel();
        let refresh_token = self.lock().refresh_token.clone();
        let Some(refresh_token) = refresh_token else {
            // Fresh profile, nobody was signed in
            tx.send(Ok(None)).expect("failed to send oneshot msg");
            return rx;
        };
        let body = serde_json::json!({ "refresh_token": refresh_token.expose_secret() });
        let backend = self.clone();
        let on_done = move |resp: reqwest::Result<reqwest::Response>| async move {
            // Initial resolution is reported via the return value, not as a
            // change notification
            let msg = process_token_exchange(resp, backend, None).await.map(Some);
            tx.send(msg).expect("failed to send oneshot msg");
        };
        self.initiate_post(
            PATH_AUTH_TOKEN,
            &[("grant_type", "refresh_token")],
            &body,
            None,
            on_done,
        );
        rx
    }

    fn subscribe_changes(&self) -> mpsc::UnboundedReceiver<SessionChange> {
        let (tx, rx) = mpsc::unbounded();
        self.lock().change_listeners.push(tx);
        rx
    }

    #[tracing::instrument(skip(self))]
    fn sign_in(&self, args: SignInArgs) -> oneshot::Receiver<Result<(), AuthError>> {
        let (tx, rx) = oneshot::channel();
        let body = serde_json::json!({
            "email": args.email,
            "password": args.password.expose_secret(),
        });
        let backend = self.clone();
        let on_done = move |resp: reqwest::Result<reqwest::Response>| async move {
            let msg = process_sign_in(resp, backend).await;
            tx.send(msg).expect("failed to send oneshot msg");
        };
        self.initiate_post(
            PATH_AUTH_TOKEN,
            &[("grant_type", "password")],
            &body,
            None,
            on_done,
        );
        rx
    }

    #[tracing::instrument(skip(self))]
    fn sign_up(&self, args: SignUpArgs) -> oneshot::Receiver<Result<(), AuthError>> {
        let (tx, rx) = oneshot::channel();
        let body = serde_json::json!({
            "email": args.email,
            "password": args.password.expose_secret(),
            "data": { "full_name": args.full_name },
        });
        let backend = self.clone();
        let on_done = move |resp: reqwest::Result<reqwest::Response>| async move {
            let msg = process_sign_up(resp, backend).await;
            tx.send(msg).expect("failed to send oneshot msg");
        };
        self.initiate_post(PATH_AUTH_SIGNUP, &[], &body, None, on_done);
        rx
    }

    #[tracing::instrument(skip(self))]
    fn sign_out(&self) -> oneshot::Receiver<anyhow::Result<()>> {
        // Clear local credentials even if the server side logout fails
        self.clear_session();
        let (tx, rx) = oneshot::channel();
        let on_done = move |resp: reqwest::Result<reqwest::Response>| async move {
            let msg = process_empty(resp).await;
            tx.send(msg).expect("failed to send oneshot msg");
        };
        self.initiate_post(PATH_AUTH_LOGOUT, &[], &serde_json::json!({}), None, on_done);
        rx
    }

    fn start_auto_refresh(&self) {
        let cancel = {
            let mut inner = self.lock();
            if inner.refresh_cancel.is_some() {
                debug!("token refresh loop already running");
                return;
            }
            let cancel = CancellationToken::new();
            inner.refresh_cancel = Some(cancel.clone());
            cancel
        };
        let backend = self.clone();
        tokio::spawn(async move {
            info!("token refresh loop started");
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(REFRESH_INTERVAL) => {}
                }
                if let Err(e) = backend.refresh_session().await {
                    warn!("token refresh failed: {e:#}");
                }
            }
            info!("token refresh loop stopped");
        });
    }

    fn stop_auto_refresh(&self) {
        if let Some(cancel) = self.lock().refresh_cancel.take() {
            cancel.cancel();
        }
    }
}

impl BusinessDirectory for RestBackend {
    #[tracing::instrument(skip(self))]
    fn find_admin(
        &self,
        user_id: UserId,
    ) -> oneshot::Receiver<anyhow::Result<Option<AdminRecord>>> {
        self.send_get_mapped(
            PATH_REST_ADMIN_USERS,
            vec![
                ("select", "*".to_string()),
                ("user_id", format!("eq.{user_id}")),
                ("limit", "1".to_string()),
            ],
            |mut rows: Vec<AdminRecord>| Ok(rows.pop()),
        )
    }

    #[tracing::instrument(skip(self))]
    fn granted_business_ids(
        &self,
        admin_id: AdminId,
    ) -> oneshot::Receiver<anyhow::Result<Vec<BusinessId>>> {
        #[derive(Debug, serde::Deserialize)]
        struct GrantRow {
            business_id: BusinessId,
        }
        self.send_get_mapped(
            PATH_REST_ACCESS_GRANTS,
            vec![
                ("select", "business_id".to_string()),
                ("admin_id", format!("eq.{admin_id}")),
            ],
            |rows: Vec<GrantRow>| Ok(rows.into_iter().map(|r| r.business_id).collect()),
        )
    }

    #[tracing::instrument(skip(self))]
    fn businesses_by_ids(
        &self,
        ids: Vec<BusinessId>,
    ) -> oneshot::Receiver<anyhow::Result<Vec<Business>>> {
        self.send_get_mapped(
            PATH_REST_BUSINESSES,
            vec![
                ("select", "*".to_string()),
                ("id", in_filter(&ids)),
                ("order", "name.asc".to_string()),
            ],
            Ok,
        )
    }

    #[tracing::instrument(skip(self))]
    fn insert_business(
        &self,
        draft: BusinessDraft,
    ) -> oneshot::Receiver<anyhow::Result<Business>> {
        let (tx, rx) = oneshot::channel();
        let on_done = move |resp: reqwest::Result<reqwest::Response>| async move {
            let msg = match process_json_body::<Vec<Business>>(resp).await {
                Ok(mut rows) => rows
                    .pop()
                    .ok_or_else(|| anyhow!("backend returned no row for the created business")),
                Err(e) => Err(e),
            };
            tx.send(msg).expect("failed to send oneshot msg");
        };
        self.initiate_post(
            PATH_REST_BUSINESSES_INSERT,
            &[("select", "*")],
            &draft,
            Some("return=representation"),
            on_done,
        );
        rx
    }

    #[tracing::instrument(skip(self))]
    fn insert_grant(
        &self,
        admin_id: AdminId,
        business_id: BusinessId,
    ) -> oneshot::Receiver<anyhow::Result<()>> {
        let (tx, rx) = oneshot::channel();
        let body = AccessGrant {
            admin_id,
            business_id,
        };
        let on_done = move |resp: reqwest::Result<reqwest::Response>| async move {
            let msg = process_empty(resp).await;
            tx.send(msg).expect("failed to send oneshot msg");
        };
        self.initiate_post(
            PATH_REST_ACCESS_GRANTS_INSERT,
            &[],
            &body,
            Some("return=minimal"),
            on_done,
        );
        rx
    }
}

/// PostgREST `in` filter: `in.(id1,id2,...)`
fn in_filter(ids: &[BusinessId]) -> String {
    let list = ids
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",");
    format!("in.({list})")
}

#[derive(Debug, serde::Deserialize)]
struct TokenResponse {
    access_token: SecretString,
    refresh_token: SecretString,
    user: TokenUser,
}

#[derive(Debug, serde::Deserialize)]
struct TokenUser {
    id: UserId,
    email: String,
}

#[tracing::instrument(ret, err(Debug), skip(backend))]
async fn process_token_exchange(
    response: reqwest::Result<reqwest::Response>,
    backend: RestBackend,
    broadcast: Option<fn(AuthSession) -> SessionChange>,
) -> anyhow::Result<AuthSession> {
    let (response, status) = extract_response(response)?;
    if !status.is_success() {
        return Err(handle_error(response).await);
    }
    let token: TokenResponse = response
        .json()
        .await
        .context("failed to parse token response as json")?;
    let session = backend.store_session(token);
    if let Some(change) = broadcast {
        backend.broadcast_change(change(session.clone()));
    }
    Ok(session)
}

#[tracing::instrument(ret, skip(backend))]
async fn process_sign_in(
    response: reqwest::Result<reqwest::Response>,
    backend: RestBackend,
) -> Result<(), AuthError> {
    let (response, status) = extract_response(response)
        .map_err(|e| AuthError::Service(format!("{e:#}")))?;
    match status {
        s if s.is_success() => {
            let token: TokenResponse = response
                .json()
                .await
                .map_err(|e| AuthError::Service(format!("failed to parse token response: {e}")))?;
            let session = backend.store_session(token);
            backend.broadcast_change(SessionChange::SignedIn(session));
            Ok(())
        }
        StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED => Err(AuthError::InvalidCredentials),
        _ => Err(AuthError::Service(format!(
            "{:#}",
            handle_error(response).await
        ))),
    }
}

#[tracing::instrument(ret, skip(backend))]
async fn process_sign_up(
    response: reqwest::Result<reqwest::Response>,
    backend: RestBackend,
) -> Result<(), AuthError> {
    let (response, status) = extract_response(response)
        .map_err(|e| AuthError::Service(format!("{e:#}")))?;
    if !status.is_success() {
        return Err(AuthError::Service(format!(
            "{:#}",
            handle_error(response).await
        )));
    }
    // Depending on backend settings signup may require email confirmation,
    // in which case no token comes back and nobody is signed in yet
    let body = response
        .text()
        .await
        .map_err(|e| AuthError::Service(format!("failed to read signup response: {e}")))?;
    if let Ok(token) = serde_json::from_str::<TokenResponse>(&body) {
        let session = backend.store_session(token);
        backend.broadcast_change(SessionChange::SignedIn(session));
    }
    Ok(())
}

#[tracing::instrument(ret, err(Debug))]
async fn process_empty(response: reqwest::Result<reqwest::Response>) -> anyhow::Result<()> {
    let (response, status) = extract_response(response)?;
    if status.is_success() {
        Ok(())
    } else {
        Err(handle_error(response).await)
    }
}

#[tracing::instrument(ret, err(Debug))]
async fn process_json_body<T>(response: reqwest::Result<reqwest::Response>) -> anyhow::Result<T>
where
    T: Debug + serde::de::DeserializeOwned,
{
    let (response, status) = extract_response(response)?;
    if status.is_success() {
        response
            .json()
            .await
            .context("failed to parse result as json")
    } else {
        Err(handle_error(response).await)
    }
}

#[tracing::instrument(ret)]
async fn handle_error(response: reqwest::Response) -> anyhow::Error {
    let status = response.status();
    debug_assert!(
        !status.is_success(),
        "this is supposed to be an error, right? Status code is: {status}"
    );
    let Ok(body) = response.text().await else {
        return anyhow!("failed to get response body");
    };
    if body.is_empty() {
        anyhow!("request failed with status code: {status} and no body")
    } else {
        anyhow!("{body}")
    }
}

/// Provides a way to standardize the error message
fn extract_response(
    response: reqwest::Result<reqwest::Response>,
) -> anyhow::Result<(reqwest::Response, StatusCode)> {
    if response.is_err() {
        info!("Response is err: {:#?}", response);
    }
    let response = response.context("failed to send request")?;
    let status = response.status();
    Ok((response, status))
}

pub trait UiCallBack: 'static + Send + FnOnce() {}
impl<T> UiCallBack for T where T: 'static + Send + FnOnce() {}

pub mod closure_traits {
    pub trait ChannelCallBack<O>:
        'static + Send + FnOnce(reqwest::Result<reqwest::Response>) -> O
    {
    }
    impl<T, O> ChannelCallBack<O> for T where
        T: 'static + Send + FnOnce(reqwest::Result<reqwest::Response>) -> O
    {
    }
    pub trait ChannelCallBackOutput: futures::Future<Output = ()> + Send {}
    impl<T> ChannelCallBackOutput for T where T: futures::Future<Output = ()> + Send {}
}
