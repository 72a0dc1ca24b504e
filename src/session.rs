//! Session state: credential and identity lifecycle for one client.
//!
//! ARCHITECTURE
//! ============
//! `Session` is the only writer of the credential store and the cached
//! identity. It owns the `ApiClient`, which holds a weak back-reference to
//! the session as its `AuthHandler`, so the single refresh-and-retry path
//! can ask for a new credential without an ownership cycle.
//!
//! STATE MACHINE
//! =============
//! `Anonymous -> Authenticating -> Authenticated -> (Refreshing) ->
//! Authenticated | Anonymous`. `logout()` and any irrecoverable 401 return
//! to `Anonymous` from every state.
//!
//! CONCURRENCY
//! ===========
//! Concurrent `ensure_identity()` calls share one `GET /users/me` through a
//! `Shared` future parked in `in_flight`. The first waiter to observe the
//! result clears the slot and caches the identity. Storing a different
//! credential (login, signup) empties the slot and the cache, so a fetch
//! issued under the previous credential is never cached for the new one.
//! Concurrent refreshes share one `POST /auth/refresh` the same way.

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use reqwest::Method;
use serde_json::Value;

use crate::api::{ApiClient, AuthHandler, RequestBody, RequestOptions, decode};
use crate::config::{ClientConfig, CredentialMode};
use crate::credential::{Credential, CredentialStore};
use crate::error::{ApiError, ConfigError};
use crate::services::{CommentService, ImageService, PostService, UserService};
use crate::types::{Identity, ImageFile, LoginRequest, LoginResponse, RefreshResponse, SignupOutcome, SignupRequest};

const LOGIN_PATH: &str = "/auth/login";
const SIGNUP_PATH: &str = "/auth/signup";
const LOGOUT_PATH: &str = "/auth/logout";
const REFRESH_PATH: &str = "/auth/refresh";
pub(crate) const IDENTITY_PATH: &str = "/users/me";

type IdentityFetch = Shared<BoxFuture<'static, Result<Identity, ApiError>>>;
type RefreshCall = Shared<BoxFuture<'static, Result<Value, ApiError>>>;

/// UI collaborator notified of identity changes and redirects.
pub trait SessionObserver: Send + Sync {
    /// Called whenever the cached identity changes; `None` means signed out.
    fn update_ui(&self, identity: Option<&Identity>);

    /// Called when the session wants the UI to move to `route`.
    fn navigate(&self, route: &str) {
        let _ = route;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Anonymous,
    Authenticating,
    Authenticated,
    Refreshing,
}

pub struct Session {
    api: Arc<ApiClient>,
    store: Arc<dyn CredentialStore>,
    config: ClientConfig,
    identity: Mutex<Option<Identity>>,
    phase: Mutex<SessionPhase>,
    in_flight: Mutex<Option<IdentityFetch>>,
    refreshing: Mutex<Option<RefreshCall>>,
    observer: Option<Arc<dyn SessionObserver>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Empty `slot` if it still holds `call`. Returns whether it did.
fn release<T: Clone>(
    slot: &Mutex<Option<Shared<BoxFuture<'static, T>>>>,
    call: &Shared<BoxFuture<'static, T>>,
) -> bool {
    let mut slot = lock(slot);
    if slot.as_ref().is_some_and(|current| current.ptr_eq(call)) {
        *slot = None;
        true
    } else {
        false
    }
}

impl Session {
    /// Build a session over `store`. A credential already in the store starts
    /// the session `Authenticated`; a mirrored identity is restored only
    /// alongside a credential and only when `mirror_identity` is set.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        config: ClientConfig,
        store: Arc<dyn CredentialStore>,
        observer: Option<Arc<dyn SessionObserver>>,
    ) -> Result<Arc<Self>, ConfigError> {
        let api = ApiClient::new(&config, Arc::clone(&store))?;
        let has_credential = store.credential().is_some();
        let identity = if has_credential && config.mirror_identity { store.identity() } else { None };
        let phase = if has_credential { SessionPhase::Authenticated } else { SessionPhase::Anonymous };
        tracing::debug!(token_present = has_credential, restored_identity = identity.is_some(), "session initialized");

        Ok(Arc::new_cyclic(|weak: &Weak<Self>| {
            let handler: Weak<dyn AuthHandler> = weak.clone();
            Self {
                api: Arc::new(api.with_auth_handler(handler)),
                store,
                config,
                identity: Mutex::new(identity),
                phase: Mutex::new(phase),
                in_flight: Mutex::new(None),
                refreshing: Mutex::new(None),
                observer,
            }
        }))
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    #[must_use]
    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        *lock(&self.phase)
    }

    #[must_use]
    pub fn is_logged_in(&self) -> bool {
        self.store.credential().is_some()
    }

    /// Cached identity. Always `None` without a credential, whatever the cache holds.
    #[must_use]
    pub fn current_user(&self) -> Option<Identity> {
        if !self.is_logged_in() {
            return None;
        }
        lock(&self.identity).clone()
    }

    #[must_use]
    pub fn posts(&self) -> PostService<'_> {
        PostService::new(&self.api)
    }

    #[must_use]
    pub fn comments(&self) -> CommentService<'_> {
        CommentService::new(&self.api)
    }

    #[must_use]
    pub fn users(&self) -> UserService<'_> {
        UserService::new(&self.api)
    }

    #[must_use]
    pub fn images(&self) -> ImageService<'_> {
        ImageService::new(&self.api)
    }

    // =========================================================================
    // LOGIN / SIGNUP / LOGOUT
    // =========================================================================

    /// Log in and report success. Failures are logged, not returned.
    pub async fn login(&self, email: &str, password: &str) -> bool {
        match self.try_login(email, password).await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(error = %e, "login failed");
                false
            }
        }
    }

    /// Log in, returning the cached identity.
    ///
    /// # Errors
    ///
    /// Returns the request failure, or `ApiError::Decode` when a bearer-mode
    /// response carries no `accessToken`.
    pub async fn try_login(&self, email: &str, password: &str) -> Result<Identity, ApiError> {
        self.set_phase(SessionPhase::Authenticating);
        let result = self.authenticate(email, password).await;
        match &result {
            Ok(identity) => {
                self.set_phase(SessionPhase::Authenticated);
                tracing::info!(user_id = identity.id, "login succeeded");
            }
            Err(_) => {
                let phase = if self.is_logged_in() { SessionPhase::Authenticated } else { SessionPhase::Anonymous };
                self.set_phase(phase);
            }
        }
        result
    }

    async fn authenticate(&self, email: &str, password: &str) -> Result<Identity, ApiError> {
        let body = RequestBody::json(&LoginRequest { email, password })?;
        let value = self
            .api
            .send(Method::POST, LOGIN_PATH, Some(body), RequestOptions::ANONYMOUS)
            .await?;
        let response: LoginResponse = if value.is_object() { decode(value)? } else { LoginResponse::default() };

        let credential = match self.config.credential_mode {
            CredentialMode::Bearer => {
                let token = response
                    .access_token
                    .clone()
                    .filter(|token| !token.is_empty())
                    .ok_or_else(|| ApiError::Decode("login response carried no accessToken".to_owned()))?;
                Credential::Bearer(token)
            }
            CredentialMode::Cookie => Credential::Cookie,
        };
        self.replace_credential(credential);

        if let Some(identity) = response.identity() {
            self.set_identity(identity.clone());
            return Ok(identity);
        }

        match self.fetch_identity().await {
            Ok(identity) => Ok(identity),
            Err(e) => {
                self.teardown_local();
                Err(e)
            }
        }
    }

    /// Register a new account. A returned bearer token is stored so the user
    /// is signed in straight away.
    ///
    /// # Errors
    ///
    /// Returns the request failure unchanged for the form to render.
    pub async fn signup(&self, request: &SignupRequest) -> Result<SignupOutcome, ApiError> {
        let body = RequestBody::json(request)?;
        let value = self
            .api
            .send(Method::POST, SIGNUP_PATH, Some(body), RequestOptions::ANONYMOUS)
            .await?;

        if self.config.credential_mode == CredentialMode::Bearer {
            let response: LoginResponse = serde_json::from_value(value.clone()).unwrap_or_default();
            if let Some(token) = response.access_token.clone().filter(|token| !token.is_empty()) {
                self.replace_credential(Credential::Bearer(token));
                self.set_phase(SessionPhase::Authenticated);
                if let Some(identity) = response.identity() {
                    self.set_identity(identity);
                }
            }
        }

        tracing::info!(email = %request.email, "signup succeeded");
        Ok(SignupOutcome { status: 201, message: "signup complete".to_owned(), data: value })
    }

    /// Notify the server (best effort), then clear local state, notify the UI
    /// and navigate to the landing route.
    pub async fn logout(&self) {
        let notify = self
            .api
            .send(Method::POST, LOGOUT_PATH, None, RequestOptions::AUTHENTICATED.without_refresh())
            .await;
        if let Err(e) = notify {
            tracing::warn!(error = %e, "logout notification failed; clearing local session anyway");
        }

        if self.clear_local() {
            self.notify(None);
        }
        self.navigate(&self.config.landing_route);
        tracing::info!("logged out");
    }

    // =========================================================================
    // IDENTITY
    // =========================================================================

    /// Cached identity, or a de-duplicated fetch when a credential exists.
    pub async fn ensure_identity(&self) -> Option<Identity> {
        if let Some(identity) = self.current_user() {
            return Some(identity);
        }
        if !self.is_logged_in() {
            tracing::debug!("no credential; identity unavailable");
            return None;
        }

        match self.fetch_identity().await {
            Ok(identity) => Some(identity),
            Err(e) if e.is_unauthenticated() => {
                self.teardown_local();
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "identity fetch failed");
                None
            }
        }
    }

    /// Drop the cached (and mirrored) identity and fetch it again.
    pub async fn refresh_identity(&self) -> Option<Identity> {
        lock(&self.identity).take();
        if self.config.mirror_identity {
            self.store.set_identity(None);
        }
        self.ensure_identity().await
    }

    /// Update the profile through `/users/me`, then refetch the identity so
    /// the cache, the mirror and the observer see the new values.
    ///
    /// # Errors
    ///
    /// Propagates upload or update failures; the cached identity is left
    /// untouched when the update fails.
    pub async fn update_profile(&self, nickname: &str, image: Option<ImageFile>) -> Result<Value, ApiError> {
        let updated = self.users().update_profile(nickname, image).await?;
        if self.refresh_identity().await.is_none() {
            tracing::warn!("profile updated but identity could not be refetched");
        }
        Ok(updated)
    }

    /// Redirect to the login route when no credential is present.
    pub fn require_auth(&self) -> bool {
        if self.is_logged_in() {
            return true;
        }
        self.navigate(&self.config.login_route);
        false
    }

    async fn fetch_identity(&self) -> Result<Identity, ApiError> {
        let fetch = self.join_identity_fetch();
        let result = fetch.clone().await;

        if release(&self.in_flight, &fetch) {
            if let Ok(identity) = &result {
                if self.is_logged_in() {
                    self.set_identity(identity.clone());
                }
            }
        }
        result
    }

    fn join_identity_fetch(&self) -> IdentityFetch {
        let mut slot = lock(&self.in_flight);
        if let Some(fetch) = slot.as_ref().filter(|fetch| fetch.peek().is_none()) {
            tracing::debug!("joining in-flight identity fetch");
            return fetch.clone();
        }

        let api = Arc::clone(&self.api);
        let fetch = async move {
            let value = api.get(IDENTITY_PATH).await?;
            decode::<Identity>(value)
        }
        .boxed()
        .shared();
        *slot = Some(fetch.clone());
        fetch
    }

    // =========================================================================
    // REFRESH
    // =========================================================================

    /// Obtain a new credential via `POST /auth/refresh` and report success.
    pub async fn refresh(&self) -> bool {
        self.try_refresh().await.is_ok()
    }

    /// Obtain a new credential via `POST /auth/refresh`. Never retries;
    /// concurrent callers share one refresh request.
    ///
    /// # Errors
    ///
    /// A 401 from the refresh endpoint ends the session and is returned as
    /// `ApiError::Unauthenticated`. Other failures are returned unchanged and
    /// keep the current credential; a response without `accessToken` in
    /// bearer mode is `ApiError::Decode`.
    pub async fn try_refresh(&self) -> Result<(), ApiError> {
        self.set_phase(SessionPhase::Refreshing);

        let call = self.join_refresh_call();
        let outcome = call.clone().await;
        release(&self.refreshing, &call);

        let result = match outcome {
            Ok(value) => self.store_refreshed_credential(value),
            Err(e) if e.is_unauthenticated() => {
                tracing::warn!("refresh rejected; session ended");
                self.teardown_local();
                return Err(e);
            }
            Err(e) => {
                tracing::warn!(error = %e, "credential refresh failed");
                Err(e)
            }
        };

        self.set_phase(if self.is_logged_in() { SessionPhase::Authenticated } else { SessionPhase::Anonymous });
        result
    }

    fn join_refresh_call(&self) -> RefreshCall {
        let mut slot = lock(&self.refreshing);
        if let Some(call) = slot.as_ref().filter(|call| call.peek().is_none()) {
            tracing::debug!("joining in-flight refresh");
            return call.clone();
        }

        let api = Arc::clone(&self.api);
        let call = async move { api.send(Method::POST, REFRESH_PATH, None, RequestOptions::ANONYMOUS).await }
            .boxed()
            .shared();
        *slot = Some(call.clone());
        call
    }

    fn store_refreshed_credential(&self, value: Value) -> Result<(), ApiError> {
        match self.config.credential_mode {
            CredentialMode::Bearer => {
                let token = serde_json::from_value::<RefreshResponse>(value)
                    .ok()
                    .and_then(|response| response.access_token)
                    .filter(|token| !token.is_empty())
                    .ok_or_else(|| ApiError::Decode("refresh response carried no accessToken".to_owned()))?;
                self.store.set_credential(Credential::Bearer(token));
                tracing::info!("access token refreshed");
                Ok(())
            }
            CredentialMode::Cookie => {
                self.store.set_credential(Credential::Cookie);
                Ok(())
            }
        }
    }

    // =========================================================================
    // STATE HELPERS
    // =========================================================================

    /// Store a credential for a new sign-in. When it differs from the held
    /// one, the cached identity and any in-flight fetch belong to someone
    /// else and are dropped.
    fn replace_credential(&self, credential: Credential) {
        if self.store.credential().as_ref() != Some(&credential) {
            lock(&self.in_flight).take();
            lock(&self.identity).take();
            if self.config.mirror_identity {
                self.store.set_identity(None);
            }
        }
        self.store.set_credential(credential);
    }

    fn set_phase(&self, next: SessionPhase) {
        let mut phase = lock(&self.phase);
        if *phase != next {
            tracing::debug!(from = ?*phase, to = ?next, "session phase changed");
            *phase = next;
        }
    }

    fn set_identity(&self, identity: Identity) {
        *lock(&self.identity) = Some(identity.clone());
        if self.config.mirror_identity {
            self.store.set_identity(Some(identity.clone()));
        }
        self.notify(Some(&identity));
    }

    /// Clear credential, identity and any in-flight fetch. Returns whether
    /// anything was held.
    fn clear_local(&self) -> bool {
        let had_identity = lock(&self.identity).take().is_some();
        let had_credential = self.store.credential().is_some();
        self.store.clear();
        lock(&self.in_flight).take();
        self.set_phase(SessionPhase::Anonymous);
        had_identity || had_credential
    }

    fn teardown_local(&self) {
        if self.clear_local() {
            tracing::info!("session torn down");
            self.notify(None);
        }
    }

    fn notify(&self, identity: Option<&Identity>) {
        if let Some(observer) = &self.observer {
            observer.update_ui(identity);
        }
    }

    fn navigate(&self, route: &str) {
        if let Some(observer) = &self.observer {
            observer.navigate(route);
        }
    }
}

#[async_trait::async_trait]
impl AuthHandler for Session {
    async fn refresh(&self) -> Result<(), ApiError> {
        self.try_refresh().await
    }

    fn teardown(&self) {
        self.teardown_local();
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
