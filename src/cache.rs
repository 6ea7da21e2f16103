use std::collections::{HashMap, HashSet};

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    error::{SyncError, SyncResult},
    gateway::CollectionGateway,
    models::{List, MovieKey, MovieRef, Quote, Rating},
};

/// A single committed mutation against exactly one collection.
///
/// Patches are produced only by the mutation coordinator, either after a
/// confirmed write or as the optimistic half (and, on failure, the rollback
/// half) of an optimistic update.
#[derive(Debug, Clone)]
pub enum CachePatch {
    ListCreated(List),
    ListUpdated {
        list_id: Uuid,
        name: String,
        description: String,
    },
    ListDeleted(Uuid),
    /// Wholesale replacement of one list after a scoped reconciliation refetch
    ListReplaced(List),
    /// Rollback of a list deletion, restoring the list at its former position
    ListRestored {
        index: usize,
        list: List,
    },
    MovieAdded {
        list_id: Uuid,
        movie: MovieRef,
    },
    MovieRemoved {
        list_id: Uuid,
        key: MovieKey,
    },
    /// Rollback of a movie removal, restoring order within the list
    MovieRestored {
        list_id: Uuid,
        index: usize,
        movie: MovieRef,
    },
    FavoriteAdded(MovieKey),
    FavoriteRemoved(MovieKey),
    RatingUpserted(Rating),
    RatingDeleted(MovieKey),
    QuoteUpserted(Quote),
    QuoteDeleted(Uuid),
    QuotesReplaced {
        key: MovieKey,
        quotes: Vec<Quote>,
    },
}

#[derive(Default)]
struct CacheInner {
    lists: Vec<List>,
    favorites: HashSet<MovieKey>,
    ratings: HashMap<MovieKey, Rating>,
    quotes: HashMap<MovieKey, Vec<Quote>>,
}

/// Process-wide in-memory mirror of the four collections.
///
/// Created empty at session start, populated by [`CollectionCache::load`], and
/// reset on logout. Reads are unrestricted; writes funnel exclusively through
/// the coordinator via [`CollectionCache::apply`].
#[derive(Default)]
pub struct CollectionCache {
    inner: RwLock<CacheInner>,
}

impl CollectionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Performs the initial bulk load, fetching the four collections in
    /// parallel.
    ///
    /// Each fetch failure is isolated to its own collection: that collection
    /// starts empty while the others keep their results. A heterogeneous
    /// outage therefore degrades the mirror instead of aborting the load.
    /// The one exception is a 401: it is reported back so the caller can tear
    /// the session down instead of keeping a phantom session over an empty
    /// mirror.
    pub async fn load(&self, gateway: &dyn CollectionGateway) -> SyncResult<()> {
        let (lists, favorites, ratings, quotes) = tokio::join!(
            gateway.fetch_lists(),
            gateway.fetch_favorites(),
            gateway.fetch_ratings(),
            gateway.fetch_quotes(),
        );

        let mut unauthorized = false;
        let mut fallback = |e: SyncError, collection: &str| {
            if matches!(e, SyncError::Unauthorized) {
                unauthorized = true;
            }
            tracing::warn!(error = %e, collection, "Collection fetch failed, starting empty");
        };

        let mut inner = self.inner.write().await;

        inner.lists = lists.unwrap_or_else(|e| {
            fallback(e, "lists");
            Vec::new()
        });

        inner.favorites = favorites
            .map(|keys| keys.into_iter().collect())
            .unwrap_or_else(|e| {
                fallback(e, "favorites");
                HashSet::new()
            });

        inner.ratings = ratings
            .map(|ratings| {
                ratings
                    .into_iter()
                    .map(|r| (r.key.clone(), r))
                    .collect()
            })
            .unwrap_or_else(|e| {
                fallback(e, "ratings");
                HashMap::new()
            });

        inner.quotes = quotes
            .map(|quotes| {
                let mut by_key: HashMap<MovieKey, Vec<Quote>> = HashMap::new();
                for quote in quotes {
                    by_key.entry(quote.key.clone()).or_default().push(quote);
                }
                by_key
            })
            .unwrap_or_else(|e| {
                fallback(e, "quotes");
                HashMap::new()
            });

        if unauthorized {
            return Err(SyncError::Unauthorized);
        }

        tracing::info!(
            lists = inner.lists.len(),
            favorites = inner.favorites.len(),
            ratings = inner.ratings.len(),
            quoted_movies = inner.quotes.len(),
            "Collection cache loaded"
        );
        Ok(())
    }

    /// Applies a single committed mutation to exactly one collection
    pub async fn apply(&self, patch: CachePatch) {
        let mut inner = self.inner.write().await;

        match patch {
            CachePatch::ListCreated(list) => {
                inner.lists.push(list);
            }
            CachePatch::ListUpdated {
                list_id,
                name,
                description,
            } => {
                if let Some(list) = inner.lists.iter_mut().find(|l| l.id == list_id) {
                    list.name = name;
                    list.description = description;
                }
            }
            CachePatch::ListDeleted(list_id) => {
                inner.lists.retain(|l| l.id != list_id);
            }
            CachePatch::ListReplaced(list) => {
                if let Some(slot) = inner.lists.iter_mut().find(|l| l.id == list.id) {
                    *slot = list;
                } else {
                    inner.lists.push(list);
                }
            }
            CachePatch::ListRestored { index, list } => {
                let index = index.min(inner.lists.len());
                inner.lists.insert(index, list);
            }
            CachePatch::MovieAdded { list_id, movie } => {
                if let Some(list) = inner.lists.iter_mut().find(|l| l.id == list_id) {
                    list.insert(movie);
                } else {
                    tracing::debug!(%list_id, "Dropping movie patch for unknown list");
                }
            }
            CachePatch::MovieRemoved { list_id, key } => {
                if let Some(list) = inner.lists.iter_mut().find(|l| l.id == list_id) {
                    list.remove(&key);
                }
            }
            CachePatch::MovieRestored {
                list_id,
                index,
                movie,
            } => {
                if let Some(list) = inner.lists.iter_mut().find(|l| l.id == list_id) {
                    list.insert_at(index, movie);
                }
            }
            CachePatch::FavoriteAdded(key) => {
                inner.favorites.insert(key);
            }
            CachePatch::FavoriteRemoved(key) => {
                inner.favorites.remove(&key);
            }
            CachePatch::RatingUpserted(rating) => {
                inner.ratings.insert(rating.key.clone(), rating);
            }
            CachePatch::RatingDeleted(key) => {
                inner.ratings.remove(&key);
            }
            CachePatch::QuoteUpserted(quote) => {
                let entry = inner.quotes.entry(quote.key.clone()).or_default();
                if let Some(slot) = entry.iter_mut().find(|q| q.id == quote.id) {
                    *slot = quote;
                } else {
                    entry.push(quote);
                }
            }
            CachePatch::QuoteDeleted(quote_id) => {
                for quotes in inner.quotes.values_mut() {
                    quotes.retain(|q| q.id != quote_id);
                }
            }
            CachePatch::QuotesReplaced { key, quotes } => {
                inner.quotes.insert(key, quotes);
            }
        }
    }

    /// Clears all four collections (logout)
    pub async fn reset(&self) {
        let mut inner = self.inner.write().await;
        *inner = CacheInner::default();
        tracing::debug!("Collection cache reset");
    }

    pub async fn lists(&self) -> Vec<List> {
        self.inner.read().await.lists.clone()
    }

    pub async fn list(&self, list_id: Uuid) -> Option<List> {
        self.inner
            .read()
            .await
            .lists
            .iter()
            .find(|l| l.id == list_id)
            .cloned()
    }

    /// Whether the list contains the movie; `None` when the list itself is
    /// unknown locally.
    pub async fn list_contains(&self, list_id: Uuid, key: &MovieKey) -> Option<bool> {
        self.inner
            .read()
            .await
            .lists
            .iter()
            .find(|l| l.id == list_id)
            .map(|l| l.contains(key))
    }

    /// Position and snapshot of a movie within a list, for optimistic removal
    pub async fn locate_movie(&self, list_id: Uuid, key: &MovieKey) -> Option<(usize, MovieRef)> {
        let inner = self.inner.read().await;
        let list = inner.lists.iter().find(|l| l.id == list_id)?;
        let index = list.movies().iter().position(|m| &m.key == key)?;
        Some((index, list.movies()[index].clone()))
    }

    /// Position and snapshot of a list, for optimistic deletion
    pub async fn locate_list(&self, list_id: Uuid) -> Option<(usize, List)> {
        let inner = self.inner.read().await;
        let index = inner.lists.iter().position(|l| l.id == list_id)?;
        Some((index, inner.lists[index].clone()))
    }

    pub async fn is_favorite(&self, key: &MovieKey) -> bool {
        self.inner.read().await.favorites.contains(key)
    }

    pub async fn favorites(&self) -> HashSet<MovieKey> {
        self.inner.read().await.favorites.clone()
    }

    pub async fn rating(&self, key: &MovieKey) -> Option<Rating> {
        self.inner.read().await.ratings.get(key).cloned()
    }

    /// Cached quotes for a movie; `None` when no quotes were ever fetched for
    /// this key (distinct from a cached empty result).
    pub async fn quotes(&self, key: &MovieKey) -> Option<Vec<Quote>> {
        self.inner.read().await.quotes.get(key).cloned()
    }

    pub async fn find_quote(&self, quote_id: Uuid) -> Option<Quote> {
        self.inner
            .read()
            .await
            .quotes
            .values()
            .flatten()
            .find(|q| q.id == quote_id)
            .cloned()
    }
}
