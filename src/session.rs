use std::sync::Arc;

use tokio::sync::RwLock;

use crate::{
    cache::CollectionCache,
    error::{SyncError, SyncResult},
    gateway::{AuthGateway, CollectionGateway},
    models::{Credentials, Registration, Session},
};

/// Session lifecycle: `Anonymous → Authenticating → Authenticated → Anonymous`
/// (the last transition on logout or any observed 401).
#[derive(Debug, Clone, Default, PartialEq)]
pub enum SessionState {
    #[default]
    Anonymous,
    Authenticating,
    Authenticated(Session),
}

/// Holds current identity and session validity; every mutation in the core is
/// gated on this store.
pub struct SessionStore {
    auth: Arc<dyn AuthGateway>,
    collections: Arc<dyn CollectionGateway>,
    cache: Arc<CollectionCache>,
    state: RwLock<SessionState>,
}

impl SessionStore {
    pub fn new(
        auth: Arc<dyn AuthGateway>,
        collections: Arc<dyn CollectionGateway>,
        cache: Arc<CollectionCache>,
    ) -> Self {
        Self {
            auth,
            collections,
            cache,
            state: RwLock::new(SessionState::Anonymous),
        }
    }

    /// Startup identity probe.
    ///
    /// Never raises: an absent or unverifiable session leaves the store
    /// anonymous and returns `None`. A recovered session triggers the initial
    /// cache load before returning.
    pub async fn probe(&self) -> Option<Session> {
        match self.auth.probe().await {
            Ok(Some(session)) => {
                tracing::info!(user_id = %session.user_id, "Existing session recovered");
                *self.state.write().await = SessionState::Authenticated(session.clone());
                if self.cache.load(self.collections.as_ref()).await.is_err() {
                    // the collection service rejected what the identity
                    // endpoint accepted; the session is not usable
                    self.handle_unauthorized().await;
                    return None;
                }
                Some(session)
            }
            Ok(None) => {
                *self.state.write().await = SessionState::Anonymous;
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "Session probe failed, staying anonymous");
                *self.state.write().await = SessionState::Anonymous;
                None
            }
        }
    }

    /// Exchanges credentials for a session and performs the initial bulk load.
    pub async fn login(&self, credentials: Credentials) -> SyncResult<Session> {
        *self.state.write().await = SessionState::Authenticating;

        match self.auth.login(credentials).await {
            Ok(session) => {
                tracing::info!(user_id = %session.user_id, "Authenticated");
                *self.state.write().await = SessionState::Authenticated(session.clone());
                if self.cache.load(self.collections.as_ref()).await.is_err() {
                    self.handle_unauthorized().await;
                    return Err(SyncError::Unauthorized);
                }
                Ok(session)
            }
            Err(SyncError::Unauthorized) | Err(SyncError::Validation(_)) => {
                *self.state.write().await = SessionState::Anonymous;
                Err(SyncError::InvalidCredentials)
            }
            Err(e) => {
                *self.state.write().await = SessionState::Anonymous;
                Err(e)
            }
        }
    }

    /// Registers a new account; does not establish a session.
    pub async fn register(&self, registration: Registration) -> SyncResult<()> {
        if registration.username.trim().is_empty()
            || registration.password.is_empty()
            || registration.display_name.trim().is_empty()
        {
            return Err(SyncError::Validation(
                "username, password and display name are required".to_string(),
            ));
        }

        self.auth.register(registration).await
    }

    /// Clears the session and resets the cache.
    ///
    /// Server-side revocation is best-effort on a detached task; dependent
    /// local state changes do not wait for it.
    pub async fn logout(&self) {
        *self.state.write().await = SessionState::Anonymous;
        self.cache.reset().await;

        let auth = Arc::clone(&self.auth);
        tokio::spawn(async move {
            if let Err(e) = auth.logout().await {
                tracing::warn!(error = %e, "Best-effort logout call failed");
            }
        });
    }

    /// Shared teardown path for a 401 observed by any component
    pub async fn handle_unauthorized(&self) {
        tracing::info!("Session rejected by service, tearing down");
        *self.state.write().await = SessionState::Anonymous;
        self.cache.reset().await;
    }

    pub async fn current(&self) -> Option<Session> {
        match &*self.state.read().await {
            SessionState::Authenticated(session) => Some(session.clone()),
            _ => None,
        }
    }

    pub async fn is_authenticated(&self) -> bool {
        matches!(&*self.state.read().await, SessionState::Authenticated(_))
    }

    pub async fn state(&self) -> SessionState {
        self.state.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{MockAuthGateway, MockCollectionGateway};
    use uuid::Uuid;

    fn session() -> Session {
        Session {
            user_id: Uuid::new_v4(),
            username: "neo".to_string(),
            display_name: "Neo".to_string(),
        }
    }

    fn empty_collections() -> MockCollectionGateway {
        let mut gateway = MockCollectionGateway::new();
        gateway.expect_fetch_lists().returning(|| Ok(vec![]));
        gateway.expect_fetch_favorites().returning(|| Ok(vec![]));
        gateway.expect_fetch_ratings().returning(|| Ok(vec![]));
        gateway.expect_fetch_quotes().returning(|| Ok(vec![]));
        gateway
    }

    fn store(auth: MockAuthGateway, collections: MockCollectionGateway) -> SessionStore {
        SessionStore::new(
            Arc::new(auth),
            Arc::new(collections),
            Arc::new(CollectionCache::new()),
        )
    }

    #[tokio::test]
    async fn test_probe_without_session_stays_anonymous() {
        let mut auth = MockAuthGateway::new();
        auth.expect_probe().returning(|| Ok(None));

        let store = store(auth, MockCollectionGateway::new());
        assert_eq!(store.probe().await, None);
        assert_eq!(store.state().await, SessionState::Anonymous);
    }

    #[tokio::test]
    async fn test_probe_failure_is_not_an_error() {
        let mut auth = MockAuthGateway::new();
        auth.expect_probe()
            .returning(|| Err(SyncError::Service("identity endpoint down".to_string())));

        let store = store(auth, MockCollectionGateway::new());
        assert_eq!(store.probe().await, None);
        assert!(!store.is_authenticated().await);
    }

    #[tokio::test]
    async fn test_probe_recovers_session_and_loads_cache() {
        let expected = session();
        let returned = expected.clone();
        let mut auth = MockAuthGateway::new();
        auth.expect_probe()
            .returning(move || Ok(Some(returned.clone())));

        let store = store(auth, empty_collections());
        assert_eq!(store.probe().await, Some(expected.clone()));
        assert_eq!(store.current().await, Some(expected));
    }

    #[tokio::test]
    async fn test_login_rejection_maps_to_invalid_credentials() {
        let mut auth = MockAuthGateway::new();
        auth.expect_login()
            .returning(|_| Err(SyncError::Unauthorized));

        let store = store(auth, MockCollectionGateway::new());
        let result = store
            .login(Credentials {
                username: "neo".to_string(),
                password: "wrong".to_string(),
            })
            .await;

        assert!(matches!(result, Err(SyncError::InvalidCredentials)));
        assert_eq!(store.state().await, SessionState::Anonymous);
    }

    #[tokio::test]
    async fn test_login_success_authenticates() {
        let expected = session();
        let returned = expected.clone();
        let mut auth = MockAuthGateway::new();
        auth.expect_login()
            .returning(move |_| Ok(returned.clone()));

        let store = store(auth, empty_collections());
        let result = store
            .login(Credentials {
                username: "neo".to_string(),
                password: "redpill".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(result, expected);
        assert!(store.is_authenticated().await);
    }

    fn rejecting_collections() -> MockCollectionGateway {
        let mut gateway = MockCollectionGateway::new();
        gateway
            .expect_fetch_lists()
            .returning(|| Err(SyncError::Unauthorized));
        gateway
            .expect_fetch_favorites()
            .returning(|| Err(SyncError::Unauthorized));
        gateway
            .expect_fetch_ratings()
            .returning(|| Err(SyncError::Unauthorized));
        gateway
            .expect_fetch_quotes()
            .returning(|| Err(SyncError::Unauthorized));
        gateway
    }

    #[tokio::test]
    async fn test_rejected_load_tears_down_recovered_session() {
        let returned = session();
        let mut auth = MockAuthGateway::new();
        auth.expect_probe()
            .returning(move || Ok(Some(returned.clone())));

        let store = store(auth, rejecting_collections());

        assert_eq!(store.probe().await, None);
        assert!(!store.is_authenticated().await);
    }

    #[tokio::test]
    async fn test_rejected_load_fails_login() {
        let returned = session();
        let mut auth = MockAuthGateway::new();
        auth.expect_login().returning(move |_| Ok(returned.clone()));

        let store = store(auth, rejecting_collections());
        let result = store
            .login(Credentials {
                username: "neo".to_string(),
                password: "redpill".to_string(),
            })
            .await;

        assert!(matches!(result, Err(SyncError::Unauthorized)));
        assert_eq!(store.state().await, SessionState::Anonymous);
    }

    #[tokio::test]
    async fn test_register_validates_locally() {
        let store = store(MockAuthGateway::new(), MockCollectionGateway::new());
        let result = store
            .register(Registration {
                username: "  ".to_string(),
                password: "pw".to_string(),
                display_name: "Neo".to_string(),
            })
            .await;

        assert!(matches!(result, Err(SyncError::Validation(_))));
    }

    #[tokio::test]
    async fn test_handle_unauthorized_tears_down() {
        let expected = session();
        let returned = expected.clone();
        let mut auth = MockAuthGateway::new();
        auth.expect_probe()
            .returning(move || Ok(Some(returned.clone())));

        let store = store(auth, empty_collections());
        store.probe().await;
        assert!(store.is_authenticated().await);

        store.handle_unauthorized().await;
        assert_eq!(store.state().await, SessionState::Anonymous);
    }
}
