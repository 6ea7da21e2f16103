use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::{watch, Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::{
    cache::{CachePatch, CollectionCache},
    error::{SyncError, SyncResult},
    gateway::CollectionGateway,
    models::{List, MovieKey, MovieRef, Quote, QuoteDraft, Rating},
    session::SessionStore,
};

/// Where a mutation was issued from.
///
/// Carried into `AuthRequired` so an unauthenticated caller can be sent to
/// login and returned to the originating location afterward.
#[derive(Debug, Clone)]
pub struct ViewContext {
    location: String,
}

impl ViewContext {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
        }
    }

    pub fn location(&self) -> &str {
        &self.location
    }
}

/// Serialization unit for mutations: one logical queue per
/// (collection type, entity key) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum MutationKey {
    List(Uuid),
    Favorite(MovieKey),
    Rating(MovieKey),
    Quote(Uuid),
}

/// Registry of per-key mutation locks.
///
/// Mutations for the same key queue on one async mutex; distinct keys proceed
/// concurrently. Idle entries are pruned on the next acquisition.
#[derive(Default)]
struct KeyLocks {
    locks: AsyncMutex<HashMap<MutationKey, Arc<AsyncMutex<()>>>>,
}

impl KeyLocks {
    async fn acquire(&self, key: MutationKey) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.retain(|_, l| Arc::strong_count(l) > 1);
            Arc::clone(locks.entry(key).or_default())
        };
        lock.lock_owned().await
    }
}

/// Failure shape shared with callers that joined an in-flight toggle
#[derive(Debug, Clone)]
enum ToggleFailure {
    Auth,
    Transient(String),
}

type ToggleOutcome = Option<Result<bool, ToggleFailure>>;

enum FlightRole {
    Leader(watch::Sender<ToggleOutcome>),
    Joiner(watch::Receiver<ToggleOutcome>),
}

/// Runs a mutation on a detached task so that a view dropping its future (on
/// unmount or navigation) can never abandon the write half-done; the task
/// always reconciles into the shared cache.
async fn run_detached<T, F>(task: F) -> SyncResult<T>
where
    F: Future<Output = SyncResult<T>> + Send + 'static,
    T: Send + 'static,
{
    tokio::spawn(task)
        .await
        .map_err(|e| SyncError::Internal(format!("mutation task aborted: {}", e)))?
}

/// Validates, serializes and applies every mutation across the four
/// collections.
///
/// All writes to [`CollectionCache`] funnel through here, which is what
/// preserves the per-list uniqueness and at-most-one-rating invariants.
#[derive(Clone)]
pub struct MutationCoordinator {
    gateway: Arc<dyn CollectionGateway>,
    cache: Arc<CollectionCache>,
    session: Arc<SessionStore>,
    locks: Arc<KeyLocks>,
    toggle_flights: Arc<AsyncMutex<HashMap<MovieKey, watch::Receiver<ToggleOutcome>>>>,
}

impl MutationCoordinator {
    pub fn new(
        gateway: Arc<dyn CollectionGateway>,
        cache: Arc<CollectionCache>,
        session: Arc<SessionStore>,
    ) -> Self {
        Self {
            gateway,
            cache,
            session,
            locks: Arc::new(KeyLocks::default()),
            toggle_flights: Arc::new(AsyncMutex::new(HashMap::new())),
        }
    }

    /// Gate every mutation on an authenticated session; no network call and no
    /// cache change happen past this point otherwise.
    async fn require_auth(&self, ctx: &ViewContext) -> SyncResult<()> {
        if self.session.is_authenticated().await {
            Ok(())
        } else {
            tracing::debug!(origin = %ctx.location(), "Mutation rejected without session");
            Err(SyncError::AuthRequired {
                origin: ctx.location().to_string(),
            })
        }
    }

    /// Routes a gateway failure: a 401 tears the session down and becomes
    /// `AuthRequired`; everything else passes through.
    async fn map_failure(&self, error: SyncError, origin: &str) -> SyncError {
        if matches!(error, SyncError::Unauthorized) {
            self.session.handle_unauthorized().await;
            return SyncError::AuthRequired {
                origin: origin.to_string(),
            };
        }
        error
    }

    /// Scoped reconciliation: refetches one list and folds the result into the
    /// cache. Returns the fresh list, or `None` when the server no longer has
    /// it (in which case it is purged locally).
    async fn reconcile_list(&self, list_id: Uuid) -> SyncResult<Option<List>> {
        match self.gateway.fetch_list(list_id).await {
            Ok(list) => {
                self.cache.apply(CachePatch::ListReplaced(list.clone())).await;
                Ok(Some(list))
            }
            Err(SyncError::NotFound(_)) => {
                self.cache.apply(CachePatch::ListDeleted(list_id)).await;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    // ------------------------------------------------------------------
    // Lists
    // ------------------------------------------------------------------

    /// Adds a movie to a list. Already-present keys are a success no-op; a
    /// server-side conflict reconciles by refetching that single list.
    pub async fn add_to_list(
        &self,
        ctx: &ViewContext,
        list_id: Uuid,
        movie: impl Into<MovieRef>,
    ) -> SyncResult<()> {
        self.require_auth(ctx).await?;
        let this = self.clone();
        let origin = ctx.location().to_string();
        let movie = movie.into();
        run_detached(async move { this.add_to_list_inner(origin, list_id, movie).await }).await
    }

    async fn add_to_list_inner(
        &self,
        origin: String,
        list_id: Uuid,
        movie: MovieRef,
    ) -> SyncResult<()> {
        let _guard = self.locks.acquire(MutationKey::List(list_id)).await;

        match self.cache.list_contains(list_id, &movie.key).await {
            Some(true) => {
                tracing::debug!(list_id = %list_id, key = %movie.key, "Movie already in list");
                return Ok(());
            }
            Some(false) => {}
            None => {
                // the mirror does not know this list; fetch it before the
                // write so the confirmed add has a list to land in
                match self.reconcile_list(list_id).await {
                    Ok(Some(fresh)) => {
                        if fresh.contains(&movie.key) {
                            return Ok(());
                        }
                    }
                    Ok(None) => {
                        return Err(SyncError::NotFound("list no longer exists".to_string()))
                    }
                    Err(e) => return Err(self.map_failure(e, &origin).await),
                }
            }
        }

        match self.gateway.add_list_movie(list_id, movie.clone()).await {
            Ok(()) => {
                self.cache
                    .apply(CachePatch::MovieAdded { list_id, movie })
                    .await;
                Ok(())
            }
            Err(SyncError::Conflict) => {
                // the server already has it; refetch this one list instead of
                // treating the conflict as an error
                tracing::debug!(list_id = %list_id, key = %movie.key, "Add conflict, reconciling list");
                match self.reconcile_list(list_id).await {
                    Ok(_) => Ok(()),
                    Err(e) => Err(self.map_failure(e, &origin).await),
                }
            }
            Err(SyncError::NotFound(_)) => match self.reconcile_list(list_id).await {
                Ok(Some(fresh)) => {
                    if fresh.contains(&movie.key) {
                        return Ok(());
                    }
                    // local state is fresh now; retry once
                    match self.gateway.add_list_movie(list_id, movie.clone()).await {
                        Ok(()) => {
                            self.cache
                                .apply(CachePatch::MovieAdded { list_id, movie })
                                .await;
                            Ok(())
                        }
                        Err(e) => Err(self.map_failure(e, &origin).await),
                    }
                }
                Ok(None) => Err(SyncError::NotFound("list no longer exists".to_string())),
                Err(e) => Err(self.map_failure(e, &origin).await),
            },
            Err(e) => Err(self.map_failure(e, &origin).await),
        }
    }

    /// Removes a movie from a list, optimistically: the cache entry disappears
    /// immediately and is reinserted at its former position if the server
    /// call fails.
    pub async fn remove_from_list(
        &self,
        ctx: &ViewContext,
        list_id: Uuid,
        key: MovieKey,
    ) -> SyncResult<()> {
        self.require_auth(ctx).await?;
        let this = self.clone();
        let origin = ctx.location().to_string();
        run_detached(async move { this.remove_from_list_inner(origin, list_id, key).await }).await
    }

    async fn remove_from_list_inner(
        &self,
        origin: String,
        list_id: Uuid,
        key: MovieKey,
    ) -> SyncResult<()> {
        let _guard = self.locks.acquire(MutationKey::List(list_id)).await;

        let Some((index, removed)) = self.cache.locate_movie(list_id, &key).await else {
            return Ok(());
        };

        self.cache
            .apply(CachePatch::MovieRemoved {
                list_id,
                key: key.clone(),
            })
            .await;

        match self.gateway.remove_list_movie(list_id, key.clone()).await {
            Ok(()) => Ok(()),
            Err(SyncError::NotFound(_)) => {
                // already gone server-side; the optimistic removal stands, but
                // reconcile in case the whole list vanished
                if let Err(e) = self.reconcile_list(list_id).await {
                    tracing::warn!(error = %e, list_id = %list_id, "Reconcile after stale removal failed");
                }
                Ok(())
            }
            Err(e) => {
                self.cache
                    .apply(CachePatch::MovieRestored {
                        list_id,
                        index,
                        movie: removed,
                    })
                    .await;
                Err(self.map_failure(e, &origin).await)
            }
        }
    }

    /// Creates a list. The name must be non-empty after trimming; validation
    /// happens before any network call.
    pub async fn create_list(
        &self,
        ctx: &ViewContext,
        name: String,
        description: String,
    ) -> SyncResult<List> {
        self.require_auth(ctx).await?;

        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(SyncError::Validation(
                "list name cannot be empty".to_string(),
            ));
        }

        let this = self.clone();
        let origin = ctx.location().to_string();
        run_detached(async move {
            match this.gateway.create_list(name, description).await {
                Ok(list) => {
                    tracing::info!(list_id = %list.id, "List created");
                    this.cache.apply(CachePatch::ListCreated(list.clone())).await;
                    Ok(list)
                }
                Err(e) => Err(this.map_failure(e, &origin).await),
            }
        })
        .await
    }

    /// Renames a list, optimistically, rolling back on failure.
    pub async fn update_list(
        &self,
        ctx: &ViewContext,
        list_id: Uuid,
        name: String,
        description: String,
    ) -> SyncResult<()> {
        self.require_auth(ctx).await?;

        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(SyncError::Validation(
                "list name cannot be empty".to_string(),
            ));
        }

        let this = self.clone();
        let origin = ctx.location().to_string();
        run_detached(async move {
            this.update_list_inner(origin, list_id, name, description)
                .await
        })
        .await
    }

    async fn update_list_inner(
        &self,
        origin: String,
        list_id: Uuid,
        name: String,
        description: String,
    ) -> SyncResult<()> {
        let _guard = self.locks.acquire(MutationKey::List(list_id)).await;

        let Some(current) = self.cache.list(list_id).await else {
            return match self.reconcile_list(list_id).await {
                Ok(Some(_)) => Err(SyncError::NotFound(
                    "list was out of sync, retry the edit".to_string(),
                )),
                Ok(None) => Err(SyncError::NotFound("list no longer exists".to_string())),
                Err(e) => Err(self.map_failure(e, &origin).await),
            };
        };

        self.cache
            .apply(CachePatch::ListUpdated {
                list_id,
                name: name.clone(),
                description: description.clone(),
            })
            .await;

        match self.gateway.update_list(list_id, name, description).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.cache
                    .apply(CachePatch::ListUpdated {
                        list_id,
                        name: current.name,
                        description: current.description,
                    })
                    .await;

                match e {
                    SyncError::NotFound(_) => match self.reconcile_list(list_id).await {
                        Ok(Some(_)) => {
                            Err(SyncError::NotFound("list was out of sync".to_string()))
                        }
                        Ok(None) => {
                            Err(SyncError::NotFound("list no longer exists".to_string()))
                        }
                        Err(e) => Err(self.map_failure(e, &origin).await),
                    },
                    other => Err(self.map_failure(other, &origin).await),
                }
            }
        }
    }

    /// Deletes a list, optimistically. Removal from the cache alone also
    /// removes it from every membership query, since those are cache-derived.
    pub async fn delete_list(&self, ctx: &ViewContext, list_id: Uuid) -> SyncResult<()> {
        self.require_auth(ctx).await?;
        let this = self.clone();
        let origin = ctx.location().to_string();
        run_detached(async move { this.delete_list_inner(origin, list_id).await }).await
    }

    async fn delete_list_inner(&self, origin: String, list_id: Uuid) -> SyncResult<()> {
        let _guard = self.locks.acquire(MutationKey::List(list_id)).await;

        let Some((index, list)) = self.cache.locate_list(list_id).await else {
            return Ok(());
        };

        self.cache.apply(CachePatch::ListDeleted(list_id)).await;

        match self.gateway.delete_list(list_id).await {
            Ok(()) | Err(SyncError::NotFound(_)) => {
                tracing::info!(list_id = %list_id, "List deleted");
                Ok(())
            }
            Err(e) => {
                self.cache
                    .apply(CachePatch::ListRestored { index, list })
                    .await;
                Err(self.map_failure(e, &origin).await)
            }
        }
    }

    // ------------------------------------------------------------------
    // Favorites
    // ------------------------------------------------------------------

    /// Idempotently flips favorite membership; returns the new state.
    ///
    /// Toggles for a key with a request already in flight join that request
    /// instead of firing their own: at most one outstanding call per key, and
    /// a double-fired toggle settles to a single state change.
    pub async fn toggle_favorite(
        &self,
        ctx: &ViewContext,
        movie: impl Into<MovieRef>,
    ) -> SyncResult<bool> {
        self.require_auth(ctx).await?;
        let movie = movie.into();
        let origin = ctx.location().to_string();

        let role = {
            let mut flights = self.toggle_flights.lock().await;
            if let Some(rx) = flights.get(&movie.key) {
                FlightRole::Joiner(rx.clone())
            } else {
                let (tx, rx) = watch::channel(None);
                flights.insert(movie.key.clone(), rx);
                FlightRole::Leader(tx)
            }
        };

        match role {
            FlightRole::Joiner(mut rx) => {
                tracing::debug!(key = %movie.key, "Joining in-flight favorite toggle");
                while rx.borrow_and_update().is_none() {
                    if rx.changed().await.is_err() {
                        break;
                    }
                }
                let settled = rx.borrow().clone();
                match settled {
                    Some(Ok(state)) => Ok(state),
                    Some(Err(ToggleFailure::Auth)) => Err(SyncError::AuthRequired { origin }),
                    Some(Err(ToggleFailure::Transient(message))) => {
                        Err(SyncError::Service(message))
                    }
                    None => Err(SyncError::Internal(
                        "favorite toggle interrupted".to_string(),
                    )),
                }
            }
            FlightRole::Leader(tx) => {
                let this = self.clone();
                run_detached(async move {
                    let key = movie.key.clone();
                    let result = this.toggle_favorite_inner(origin, movie).await;

                    this.toggle_flights.lock().await.remove(&key);
                    let shared = match &result {
                        Ok(state) => Ok(*state),
                        Err(SyncError::AuthRequired { .. }) => Err(ToggleFailure::Auth),
                        Err(e) => Err(ToggleFailure::Transient(e.to_string())),
                    };
                    let _ = tx.send(Some(shared));

                    result
                })
                .await
            }
        }
    }

    async fn toggle_favorite_inner(&self, origin: String, movie: MovieRef) -> SyncResult<bool> {
        let _guard = self
            .locks
            .acquire(MutationKey::Favorite(movie.key.clone()))
            .await;

        if self.cache.is_favorite(&movie.key).await {
            match self.gateway.remove_favorite(movie.key.clone()).await {
                Ok(()) | Err(SyncError::NotFound(_)) => {
                    self.cache
                        .apply(CachePatch::FavoriteRemoved(movie.key.clone()))
                        .await;
                    tracing::info!(key = %movie.key, favorite = false, "Favorite toggled");
                    Ok(false)
                }
                Err(e) => Err(self.map_failure(e, &origin).await),
            }
        } else {
            match self.gateway.add_favorite(movie.clone()).await {
                Ok(()) | Err(SyncError::Conflict) => {
                    self.cache
                        .apply(CachePatch::FavoriteAdded(movie.key.clone()))
                        .await;
                    tracing::info!(key = %movie.key, favorite = true, "Favorite toggled");
                    Ok(true)
                }
                Err(e) => Err(self.map_failure(e, &origin).await),
            }
        }
    }

    // ------------------------------------------------------------------
    // Ratings
    // ------------------------------------------------------------------

    /// Creates or updates the rating for a movie; the dispatch is decided by
    /// the cache so a create is never issued when a rating already exists.
    pub async fn upsert_rating(
        &self,
        ctx: &ViewContext,
        movie: impl Into<MovieRef>,
        score: u8,
        review_text: Option<String>,
    ) -> SyncResult<Rating> {
        self.require_auth(ctx).await?;

        if !(1..=10).contains(&score) {
            return Err(SyncError::Validation(format!(
                "score must be between 1 and 10, got {}",
                score
            )));
        }

        let this = self.clone();
        let origin = ctx.location().to_string();
        let movie = movie.into();
        run_detached(async move {
            this.upsert_rating_inner(origin, movie, score, review_text)
                .await
        })
        .await
    }

    async fn upsert_rating_inner(
        &self,
        origin: String,
        movie: MovieRef,
        score: u8,
        review_text: Option<String>,
    ) -> SyncResult<Rating> {
        let _guard = self
            .locks
            .acquire(MutationKey::Rating(movie.key.clone()))
            .await;

        let rating = Rating {
            key: movie.key.clone(),
            score,
            review_text: review_text.clone(),
        };

        if self.cache.rating(&movie.key).await.is_some() {
            match self
                .gateway
                .update_rating(movie.key.clone(), score, review_text.clone())
                .await
            {
                Ok(()) => {}
                Err(SyncError::NotFound(_)) => {
                    // cache thought one existed, the server disagrees
                    tracing::debug!(key = %movie.key, "Rating missing server-side, creating");
                    if let Err(e) = self
                        .gateway
                        .create_rating(movie.clone(), score, review_text)
                        .await
                    {
                        return Err(self.map_failure(e, &origin).await);
                    }
                }
                Err(e) => return Err(self.map_failure(e, &origin).await),
            }
        } else {
            match self
                .gateway
                .create_rating(movie.clone(), score, review_text.clone())
                .await
            {
                Ok(()) => {}
                Err(SyncError::Conflict) => {
                    // one already exists; switch to update rather than
                    // double-creating
                    tracing::debug!(key = %movie.key, "Rating exists server-side, updating");
                    if let Err(e) = self
                        .gateway
                        .update_rating(movie.key.clone(), score, review_text)
                        .await
                    {
                        return Err(self.map_failure(e, &origin).await);
                    }
                }
                Err(e) => return Err(self.map_failure(e, &origin).await),
            }
        }

        self.cache
            .apply(CachePatch::RatingUpserted(rating.clone()))
            .await;
        tracing::info!(key = %rating.key, score = rating.score, "Rating saved");
        Ok(rating)
    }

    /// Deletes a rating. No optimistic removal: the cached entry goes away
    /// only after the server confirms (ratings are low-frequency, correctness
    /// over latency).
    pub async fn delete_rating(&self, ctx: &ViewContext, key: MovieKey) -> SyncResult<()> {
        self.require_auth(ctx).await?;
        let this = self.clone();
        let origin = ctx.location().to_string();
        run_detached(async move { this.delete_rating_inner(origin, key).await }).await
    }

    async fn delete_rating_inner(&self, origin: String, key: MovieKey) -> SyncResult<()> {
        let _guard = self.locks.acquire(MutationKey::Rating(key.clone())).await;

        match self.gateway.delete_rating(key.clone()).await {
            Ok(()) | Err(SyncError::NotFound(_)) => {
                self.cache.apply(CachePatch::RatingDeleted(key)).await;
                Ok(())
            }
            Err(e) => Err(self.map_failure(e, &origin).await),
        }
    }

    // ------------------------------------------------------------------
    // Quotes
    // ------------------------------------------------------------------

    /// Creates a quote, or updates it when `quote_id` names an existing one.
    pub async fn upsert_quote(
        &self,
        ctx: &ViewContext,
        quote_id: Option<Uuid>,
        draft: QuoteDraft,
    ) -> SyncResult<Quote> {
        self.require_auth(ctx).await?;

        if draft.quote_text.trim().is_empty() {
            return Err(SyncError::Validation(
                "quote text cannot be empty".to_string(),
            ));
        }

        let draft = QuoteDraft {
            quoter: if draft.quoter.trim().is_empty() {
                "Unknown".to_string()
            } else {
                draft.quoter
            },
            ..draft
        };

        let this = self.clone();
        let origin = ctx.location().to_string();
        run_detached(async move { this.upsert_quote_inner(origin, quote_id, draft).await }).await
    }

    async fn upsert_quote_inner(
        &self,
        origin: String,
        quote_id: Option<Uuid>,
        draft: QuoteDraft,
    ) -> SyncResult<Quote> {
        match quote_id {
            Some(id) => {
                let _guard = self.locks.acquire(MutationKey::Quote(id)).await;

                match self.gateway.update_quote(id, draft.clone()).await {
                    Ok(()) => {
                        let quote = Quote {
                            id,
                            key: draft.key,
                            quote_text: draft.quote_text,
                            quoter: draft.quoter,
                        };
                        self.cache
                            .apply(CachePatch::QuoteUpserted(quote.clone()))
                            .await;
                        Ok(quote)
                    }
                    Err(SyncError::NotFound(_)) => {
                        // scoped refetch so local state stops referencing it
                        match self.gateway.fetch_movie_quotes(draft.key.clone()).await {
                            Ok(quotes) => {
                                self.cache
                                    .apply(CachePatch::QuotesReplaced {
                                        key: draft.key.clone(),
                                        quotes,
                                    })
                                    .await;
                            }
                            Err(e) => {
                                tracing::warn!(error = %e, key = %draft.key, "Quote reconcile failed");
                            }
                        }
                        Err(SyncError::NotFound("quote no longer exists".to_string()))
                    }
                    Err(e) => Err(self.map_failure(e, &origin).await),
                }
            }
            None => match self.gateway.create_quote(draft).await {
                Ok(quote) => {
                    tracing::info!(quote_id = %quote.id, key = %quote.key, "Quote created");
                    self.cache
                        .apply(CachePatch::QuoteUpserted(quote.clone()))
                        .await;
                    Ok(quote)
                }
                Err(e) => Err(self.map_failure(e, &origin).await),
            },
        }
    }

    /// Deletes a quote by id; confirmation first, then cache removal.
    pub async fn delete_quote(&self, ctx: &ViewContext, quote_id: Uuid) -> SyncResult<()> {
        self.require_auth(ctx).await?;
        let this = self.clone();
        let origin = ctx.location().to_string();
        run_detached(async move { this.delete_quote_inner(origin, quote_id).await }).await
    }

    async fn delete_quote_inner(&self, origin: String, quote_id: Uuid) -> SyncResult<()> {
        let _guard = self.locks.acquire(MutationKey::Quote(quote_id)).await;

        match self.gateway.delete_quote(quote_id).await {
            Ok(()) | Err(SyncError::NotFound(_)) => {
                self.cache.apply(CachePatch::QuoteDeleted(quote_id)).await;
                Ok(())
            }
            Err(e) => Err(self.map_failure(e, &origin).await),
        }
    }
}
