//! Client-side synchronization core for a personal movie collection.
//!
//! The core keeps four user collections (lists, favorites, ratings, quotes)
//! mirrored in memory and synchronized with a remote collection service over
//! a cookie-authenticated HTTP session. Views read from the mirror and issue
//! mutations through the coordinator; the coordinator owns every write, so
//! the mirror only ever changes through confirmed or optimistic patches.
//!
//! Construction wires the pieces together:
//!
//! ```no_run
//! use reelsync::{Config, SyncCore};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = Config::from_env()?;
//! let core = SyncCore::new(&config)?;
//!
//! // recover an existing session, if any, and bulk-load the mirror
//! core.session().probe().await;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

pub mod cache;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod gateway;
pub mod models;
pub mod resolver;
pub mod session;

pub use cache::{CachePatch, CollectionCache};
pub use config::Config;
pub use coordinator::{MutationCoordinator, ViewContext};
pub use error::{SyncError, SyncResult};
pub use gateway::{AuthGateway, CollectionGateway, HttpGateway};
pub use models::{
    CatalogMovie, Credentials, List, MediaType, MovieKey, MovieRef, Quote, QuoteDraft, Rating,
    Registration, Session,
};
pub use resolver::{MembershipBadge, MembershipResolver};
pub use session::{SessionState, SessionStore};

/// Top-level handle owning the session store, the collection mirror, the
/// mutation coordinator and the membership resolver.
///
/// Cheap to share: all components sit behind `Arc`s, and the accessors hand
/// out references for views to hold on to.
pub struct SyncCore {
    session: Arc<SessionStore>,
    cache: Arc<CollectionCache>,
    coordinator: MutationCoordinator,
    resolver: MembershipResolver,
}

impl SyncCore {
    /// Builds the core against the live HTTP services described by `config`.
    pub fn new(config: &Config) -> SyncResult<Self> {
        let gateway = Arc::new(HttpGateway::new(config)?);
        let auth: Arc<dyn AuthGateway> = gateway.clone();
        Ok(Self::with_gateways(auth, gateway))
    }

    /// Builds the core over caller-provided gateways; the seam used by tests
    /// and by any non-HTTP transport.
    pub fn with_gateways(
        auth: Arc<dyn AuthGateway>,
        collections: Arc<dyn CollectionGateway>,
    ) -> Self {
        let cache = Arc::new(CollectionCache::new());
        let session = Arc::new(SessionStore::new(
            auth,
            Arc::clone(&collections),
            Arc::clone(&cache),
        ));
        let coordinator = MutationCoordinator::new(
            Arc::clone(&collections),
            Arc::clone(&cache),
            Arc::clone(&session),
        );
        let resolver = MembershipResolver::new(collections, Arc::clone(&cache), Arc::clone(&session));

        Self {
            session,
            cache,
            coordinator,
            resolver,
        }
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    pub fn cache(&self) -> &CollectionCache {
        &self.cache
    }

    pub fn mutations(&self) -> &MutationCoordinator {
        &self.coordinator
    }

    pub fn membership(&self) -> &MembershipResolver {
        &self.resolver
    }
}
