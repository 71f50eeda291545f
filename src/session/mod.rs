//! Client-side session: who is logged in, with which tokens.
//!
//! [`SessionStore`] is a cheap cloneable handle; the data-access client and
//! the route guard receive it explicitly rather than reaching for a global.

pub mod storage;
pub mod user;

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::client::ClientError;
pub use storage::{FileStorage, MemoryStorage, SessionStorage, StorageError};
pub use user::{Organization, RawUser, Role, User};

/// Storage key holding the session snapshot.
pub const SESSION_KEY: &str = "auth-storage";

/// Keys written by earlier client versions, removed on logout.
pub const LEGACY_KEYS: &[&str] = &["user", "token"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub user: Option<User>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub is_authenticated: bool,
}

impl Session {
    fn settle(&mut self) {
        self.is_authenticated = self.access_token.is_some() && self.user.is_some();
    }
}

/// Snapshot as read back from storage; any older user shape is accepted.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersistedSession {
    #[serde(default)]
    user: Option<RawUser>,
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
}

impl From<PersistedSession> for Session {
    fn from(persisted: PersistedSession) -> Self {
        let mut session = Session {
            user: persisted.user.map(User::from),
            access_token: persisted.access_token.filter(|t| !t.is_empty()),
            refresh_token: persisted.refresh_token.filter(|t| !t.is_empty()),
            is_authenticated: false,
        };
        // The stored flag is not trusted, it is derived again
        session.settle();
        session
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: Option<String>,
}

/// Network calls the session needs from the backend.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    async fn fetch_current_user(&self, access_token: &str) -> Result<RawUser, ClientError>;

    async fn refresh_tokens(&self, refresh_token: &str) -> Result<TokenPair, ClientError>;
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session storage failed: {0}")]
    Storage(#[from] StorageError),

    #[error("failed to encode session snapshot: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("no refresh token in session")]
    NoRefreshToken,

    #[error(transparent)]
    Backend(#[from] ClientError),
}

impl SessionError {
    /// The backend rejected the stored credentials.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, SessionError::Backend(e) if e.is_unauthorized())
    }
}

#[derive(Clone)]
pub struct SessionStore {
    state: Arc<RwLock<Session>>,
    storage: Arc<dyn SessionStorage>,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("is_authenticated", &self.read().is_authenticated)
            .finish_non_exhaustive()
    }
}

impl SessionStore {
    /// Rehydrate the session from storage.
    ///
    /// A missing or unreadable snapshot yields an empty session; the
    /// problem is logged rather than returned.
    pub fn init(storage: Arc<dyn SessionStorage>) -> Self {
        let session = match storage.get_item(SESSION_KEY) {
            Ok(Some(raw)) => match serde_json::from_str::<PersistedSession>(&raw) {
                Ok(persisted) => Session::from(persisted),
                Err(e) => {
                    tracing::warn!(error = %e, "Discarding unreadable session snapshot");
                    Session::default()
                }
            },
            Ok(None) => Session::default(),
            Err(e) => {
                tracing::warn!(error = %e, "Could not read session snapshot");
                Session::default()
            }
        };

        tracing::debug!(
            authenticated = session.is_authenticated,
            has_token = session.access_token.is_some(),
            "Session rehydrated"
        );

        Self {
            state: Arc::new(RwLock::new(session)),
            storage,
        }
    }

    pub fn in_memory() -> Self {
        Self::init(Arc::new(MemoryStorage::new()))
    }

    fn read(&self) -> RwLockReadGuard<'_, Session> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Session> {
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn snapshot(&self) -> Session {
        self.read().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.read().is_authenticated
    }

    pub fn access_token(&self) -> Option<String> {
        self.read().access_token.clone()
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.read().refresh_token.clone()
    }

    /// Store a freshly authenticated user and their tokens.
    pub fn login(
        &self,
        user: RawUser,
        access_token: impl Into<String>,
        refresh_token: Option<String>,
    ) -> Result<User, SessionError> {
        let user = User::from(user);
        let snapshot = {
            let mut state = self.write();
            state.user = Some(user.clone());
            state.access_token = Some(access_token.into()).filter(|t| !t.is_empty());
            state.refresh_token = refresh_token.filter(|t| !t.is_empty());
            state.settle();
            state.clone()
        };

        tracing::info!(user = %user.id, role = %user.role.name, "Logged in");
        self.persist(&snapshot)?;
        Ok(user)
    }

    /// Forget the user and tokens, including keys left by older versions.
    pub fn logout(&self) -> Result<(), SessionError> {
        *self.write() = Session::default();

        self.storage.remove_item(SESSION_KEY)?;
        for key in LEGACY_KEYS {
            self.storage.remove_item(key)?;
        }
        tracing::info!("Logged out");
        Ok(())
    }

    /// Fill in the current user when a token survived a restart without one.
    ///
    /// Failures leave the session exactly as it was and are handed back to
    /// the caller; a flaky network never logs anyone out.
    pub async fn load_me(&self, backend: &dyn AuthBackend) -> Result<Option<User>, SessionError> {
        let (token, user) = {
            let state = self.read();
            (state.access_token.clone(), state.user.clone())
        };

        let token = match token {
            Some(token) => token,
            None => return Ok(None),
        };
        if user.is_some() {
            return Ok(user);
        }

        let raw = match backend.fetch_current_user(&token).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(error = %e, "Loading current user failed; session left as is");
                return Err(e.into());
            }
        };
        let user = User::from(raw);

        let snapshot = {
            let mut state = self.write();
            // A logout or re-login while the fetch was in flight wins
            if state.access_token.as_deref() != Some(token.as_str()) {
                return Ok(state.user.clone());
            }
            state.user = Some(user.clone());
            state.settle();
            state.clone()
        };

        self.persist(&snapshot)?;
        Ok(Some(user))
    }

    /// Trade the refresh token for a new access token.
    ///
    /// Like [`load_me`](Self::load_me), a failure leaves the session untouched.
    pub async fn refresh(&self, backend: &dyn AuthBackend) -> Result<(), SessionError> {
        let refresh_token = self.refresh_token().ok_or(SessionError::NoRefreshToken)?;

        let tokens = match backend.refresh_tokens(&refresh_token).await {
            Ok(tokens) => tokens,
            Err(e) => {
                tracing::warn!(error = %e, "Token refresh failed; session left as is");
                return Err(e.into());
            }
        };

        let snapshot = {
            let mut state = self.write();
            if state.refresh_token.as_deref() != Some(refresh_token.as_str()) {
                return Ok(());
            }
            state.access_token = Some(tokens.access_token).filter(|t| !t.is_empty());
            if let Some(rotated) = tokens.refresh_token.filter(|t| !t.is_empty()) {
                state.refresh_token = Some(rotated);
            }
            state.settle();
            state.clone()
        };

        tracing::debug!("Access token refreshed");
        self.persist(&snapshot)
    }

    /// The current user, already normalized: `role.name` is never empty and
    /// `organization_id` is always present (possibly `None`).
    pub fn get_user_safe(&self) -> Option<User> {
        self.read().user.clone()
    }

    fn persist(&self, session: &Session) -> Result<(), SessionError> {
        let blob = serde_json::to_string(session)?;
        self.storage.set_item(SESSION_KEY, &blob)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::types::ErrorEnvelope;

    struct FakeBackend {
        user: Option<serde_json::Value>,
        tokens: Option<TokenPair>,
        calls: AtomicUsize,
    }

    impl FakeBackend {
        fn failing() -> Self {
            Self { user: None, tokens: None, calls: AtomicUsize::new(0) }
        }

        fn with_user(user: serde_json::Value) -> Self {
            Self { user: Some(user), tokens: None, calls: AtomicUsize::new(0) }
        }

        fn with_tokens(access: &str, refresh: Option<&str>) -> Self {
            Self {
                user: None,
                tokens: Some(TokenPair {
                    access_token: access.to_string(),
                    refresh_token: refresh.map(str::to_string),
                }),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl AuthBackend for FakeBackend {
        async fn fetch_current_user(&self, _access_token: &str) -> Result<RawUser, ClientError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.user {
                Some(user) => Ok(RawUser::from_value(user.clone()).unwrap()),
                None => Err(ClientError::Api {
                    status: 401,
                    envelope: ErrorEnvelope::new("Unauthorized"),
                }),
            }
        }

        async fn refresh_tokens(&self, _refresh_token: &str) -> Result<TokenPair, ClientError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.tokens.clone().ok_or_else(|| ClientError::Api {
                status: 401,
                envelope: ErrorEnvelope::new("Unauthorized"),
            })
        }
    }

    fn raw(value: serde_json::Value) -> RawUser {
        RawUser::from_value(value).unwrap()
    }

    fn store_with(storage: &Arc<MemoryStorage>) -> SessionStore {
        SessionStore::init(storage.clone())
    }

    #[test]
    fn login_with_object_role() {
        let store = SessionStore::in_memory();
        store
            .login(
                raw(json!({ "id": "u1", "role": { "id": "1", "name": "ADMIN" }, "organizationId": "o1" })),
                "tok1",
                Some("ref1".into()),
            )
            .unwrap();

        assert!(store.is_authenticated());
        assert_eq!(store.get_user_safe().unwrap().role.name, "ADMIN");
    }

    #[test]
    fn login_with_string_role() {
        let store = SessionStore::in_memory();
        store
            .login(raw(json!({ "id": "u1", "role": "ADMIN" })), "tok1", Some("ref1".into()))
            .unwrap();

        assert!(store.is_authenticated());
        let user = store.get_user_safe().unwrap();
        assert_eq!(user.role.name, "ADMIN");
        assert!(user.organization_id.is_none());
    }

    #[test]
    fn login_persists_snapshot() {
        let storage = Arc::new(MemoryStorage::new());
        let store = store_with(&storage);
        store
            .login(raw(json!({ "id": 3, "role": "VIEWER" })), "tok1", Some("ref1".into()))
            .unwrap();

        let blob: serde_json::Value =
            serde_json::from_str(&storage.get_item(SESSION_KEY).unwrap().unwrap()).unwrap();
        assert_eq!(blob["accessToken"], "tok1");
        assert_eq!(blob["refreshToken"], "ref1");
        assert_eq!(blob["isAuthenticated"], true);
        assert_eq!(blob["user"]["id"], "3");
        assert_eq!(blob["user"]["role"]["name"], "VIEWER");
    }

    #[test]
    fn init_rehydrates_and_normalizes_old_shapes() {
        let storage = Arc::new(MemoryStorage::with_items([(
            SESSION_KEY,
            json!({
                "user": { "id": 9, "role": "ADMIN", "organization_id": 4 },
                "accessToken": "tok9",
                "refreshToken": null,
                "isAuthenticated": false
            })
            .to_string(),
        )]));
        let store = store_with(&storage);

        let session = store.snapshot();
        assert!(session.is_authenticated, "flag is derived, not trusted");
        let user = session.user.unwrap();
        assert_eq!(user.id, "9");
        assert_eq!(user.role.name, "ADMIN");
        assert_eq!(user.organization_id.as_deref(), Some("4"));
    }

    #[test]
    fn init_keeps_session_with_odd_user_fields() {
        let storage = Arc::new(MemoryStorage::with_items([(
            SESSION_KEY,
            json!({
                "user": { "id": 3, "role": { "id": 1, "name": 1 }, "organizationId": 2, "isActive": 1 },
                "accessToken": "tok3"
            })
            .to_string(),
        )]));
        let store = store_with(&storage);

        assert!(store.is_authenticated());
        let user = store.get_user_safe().unwrap();
        assert!(user.is_active);
        assert_eq!(user.role.name, "1");
    }

    #[test]
    fn init_with_token_but_no_user_is_not_authenticated() {
        let storage = Arc::new(MemoryStorage::with_items([(
            SESSION_KEY,
            json!({ "user": null, "accessToken": "tok", "isAuthenticated": true }).to_string(),
        )]));
        let store = store_with(&storage);
        assert!(!store.is_authenticated());
        assert_eq!(store.access_token().as_deref(), Some("tok"));
    }

    #[test]
    fn init_survives_garbage_snapshot() {
        let storage = Arc::new(MemoryStorage::with_items([(SESSION_KEY, "{not json")]));
        let store = store_with(&storage);
        assert_eq!(store.snapshot(), Session::default());
    }

    #[test]
    fn logout_clears_snapshot_and_legacy_keys() {
        let storage = Arc::new(MemoryStorage::with_items([
            ("user", "{\"role\":\"ADMIN\"}"),
            ("token", "old"),
        ]));
        let store = store_with(&storage);
        store.login(raw(json!({ "id": "u1", "role": "ADMIN" })), "tok1", None).unwrap();

        store.logout().unwrap();

        assert_eq!(store.snapshot(), Session::default());
        for key in [SESSION_KEY, "user", "token"] {
            assert_eq!(storage.get_item(key).unwrap(), None, "key {key} survived logout");
        }
    }

    #[tokio::test]
    async fn load_me_failure_leaves_session_untouched() {
        let storage = Arc::new(MemoryStorage::with_items([(
            SESSION_KEY,
            json!({ "accessToken": "stale" }).to_string(),
        )]));
        let store = store_with(&storage);
        let before = store.snapshot();

        let err = store.load_me(&FakeBackend::failing()).await.unwrap_err();

        assert!(err.is_unauthorized());
        assert_eq!(store.snapshot(), before);
        assert!(!store.is_authenticated());
        assert_eq!(store.access_token().as_deref(), Some("stale"));
    }

    #[tokio::test]
    async fn load_me_failure_keeps_authenticated_flag() {
        let storage = Arc::new(MemoryStorage::new());
        let store = store_with(&storage);
        store.login(raw(json!({ "id": "u1", "role": "ADMIN" })), "tok1", None).unwrap();

        // User already present: no fetch, nothing changes
        let backend = FakeBackend::failing();
        let user = store.load_me(&backend).await.unwrap();
        assert_eq!(user.unwrap().id, "u1");
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
        assert!(store.is_authenticated());
    }

    #[tokio::test]
    async fn load_me_populates_user() {
        let storage = Arc::new(MemoryStorage::with_items([(
            SESSION_KEY,
            json!({ "accessToken": "tok" }).to_string(),
        )]));
        let store = store_with(&storage);
        let backend = FakeBackend::with_user(json!({ "id": 11, "role": { "id": 2, "name": "MANAGER" } }));

        let user = store.load_me(&backend).await.unwrap().unwrap();

        assert_eq!(user.role.name, "MANAGER");
        assert!(store.is_authenticated());
        let blob = storage.get_item(SESSION_KEY).unwrap().unwrap();
        assert!(blob.contains("MANAGER"));
    }

    #[tokio::test]
    async fn load_me_without_token_does_nothing() {
        let store = SessionStore::in_memory();
        let backend = FakeBackend::with_user(json!({ "id": 1 }));
        assert_eq!(store.load_me(&backend).await.unwrap(), None);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn refresh_rotates_tokens() {
        let store = SessionStore::in_memory();
        store
            .login(raw(json!({ "id": "u1", "role": "ADMIN" })), "old", Some("r1".into()))
            .unwrap();

        store.refresh(&FakeBackend::with_tokens("new", Some("r2"))).await.unwrap();

        assert_eq!(store.access_token().as_deref(), Some("new"));
        assert_eq!(store.refresh_token().as_deref(), Some("r2"));
        assert!(store.is_authenticated());
    }

    #[tokio::test]
    async fn refresh_failure_keeps_tokens() {
        let store = SessionStore::in_memory();
        store
            .login(raw(json!({ "id": "u1", "role": "ADMIN" })), "old", Some("r1".into()))
            .unwrap();
        let before = store.snapshot();

        assert!(store.refresh(&FakeBackend::failing()).await.is_err());
        assert_eq!(store.snapshot(), before);
    }

    #[tokio::test]
    async fn refresh_without_refresh_token() {
        let store = SessionStore::in_memory();
        store.login(raw(json!({ "id": "u1", "role": "ADMIN" })), "tok", None).unwrap();
        assert!(matches!(
            store.refresh(&FakeBackend::with_tokens("x", None)).await,
            Err(SessionError::NoRefreshToken)
        ));
    }
}
