use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::{
    cache::{CachePatch, CollectionCache},
    error::{SyncError, SyncResult},
    gateway::CollectionGateway,
    models::{List, MovieKey, Quote, Rating},
    session::SessionStore,
};

/// Everything a detail view needs to badge one catalog entry, answered in a
/// single cache pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MembershipBadge {
    pub list_ids: Vec<Uuid>,
    pub favorite: bool,
    pub score: Option<u8>,
}

/// Read-side membership queries, answered from the cache.
///
/// Every query here is a pure cache read except [`MembershipResolver::quotes_for`],
/// which falls back to a scoped fetch the first time a movie's quotes are
/// requested.
#[derive(Clone)]
pub struct MembershipResolver {
    gateway: Arc<dyn CollectionGateway>,
    cache: Arc<CollectionCache>,
    session: Arc<SessionStore>,
}

impl MembershipResolver {
    pub fn new(
        gateway: Arc<dyn CollectionGateway>,
        cache: Arc<CollectionCache>,
        session: Arc<SessionStore>,
    ) -> Self {
        Self {
            gateway,
            cache,
            session,
        }
    }

    /// Lists currently containing the movie, in list order.
    ///
    /// A deleted list stops appearing here the moment its optimistic removal
    /// lands in the cache.
    pub async fn lists_containing(&self, key: &MovieKey) -> Vec<List> {
        self.cache
            .lists()
            .await
            .into_iter()
            .filter(|l| l.contains(key))
            .collect()
    }

    pub async fn is_favorite(&self, key: &MovieKey) -> bool {
        self.cache.is_favorite(key).await
    }

    pub async fn rating_for(&self, key: &MovieKey) -> Option<Rating> {
        self.cache.rating(key).await
    }

    /// Quotes for one movie.
    ///
    /// Served from the cache when the key has been seen before (a cached empty
    /// result counts); otherwise fetched scoped to this movie and folded back
    /// into the cache, which covers sessions where the global quote load
    /// failed.
    pub async fn quotes_for(&self, key: &MovieKey) -> SyncResult<Vec<Quote>> {
        if let Some(quotes) = self.cache.quotes(key).await {
            return Ok(quotes);
        }

        tracing::debug!(key = %key, "Quotes not cached, fetching scoped");
        match self.gateway.fetch_movie_quotes(key.clone()).await {
            Ok(quotes) => {
                self.cache
                    .apply(CachePatch::QuotesReplaced {
                        key: key.clone(),
                        quotes: quotes.clone(),
                    })
                    .await;
                Ok(quotes)
            }
            Err(SyncError::Unauthorized) => {
                self.session.handle_unauthorized().await;
                Err(SyncError::Unauthorized)
            }
            Err(e) => Err(e),
        }
    }

    /// Aggregate membership state for one movie, for detail-view badges
    pub async fn badge_for(&self, key: &MovieKey) -> MembershipBadge {
        MembershipBadge {
            list_ids: self
                .lists_containing(key)
                .await
                .into_iter()
                .map(|l| l.id)
                .collect(),
            favorite: self.cache.is_favorite(key).await,
            score: self.cache.rating(key).await.map(|r| r.score),
        }
    }
}
