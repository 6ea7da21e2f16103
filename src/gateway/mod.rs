//! Transport seam between the synchronization core and the remote services.
//!
//! Two traits split the auth collaborator from the collection service proper;
//! `HttpGateway` implements both over a single cookie-carrying HTTP client so
//! every mutating call rides the same session transport.

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    error::SyncResult,
    models::{Credentials, List, MovieKey, MovieRef, Quote, QuoteDraft, Rating, Registration,
        Session},
};

pub mod http;

pub use http::HttpGateway;

/// Identity collaborator: session probe, login, registration, logout
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuthGateway: Send + Sync {
    /// Queries the identity endpoint for an existing session.
    ///
    /// Returns `Ok(None)` when the service answers 401; an anonymous visitor is
    /// an expected outcome, not a failure.
    async fn probe(&self) -> SyncResult<Option<Session>>;

    async fn login(&self, credentials: Credentials) -> SyncResult<Session>;

    async fn register(&self, registration: Registration) -> SyncResult<()>;

    async fn logout(&self) -> SyncResult<()>;
}

/// Remote collection service: reads and writes for the four collections.
///
/// Implementations normalize the service's response envelope and map HTTP
/// statuses onto the `SyncError` taxonomy; callers never see raw responses.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CollectionGateway: Send + Sync {
    async fn fetch_lists(&self) -> SyncResult<Vec<List>>;

    /// Fetches a single list, used for scoped reconciliation after a conflict
    /// or stale-entity response.
    async fn fetch_list(&self, list_id: Uuid) -> SyncResult<List>;

    async fn create_list(&self, name: String, description: String) -> SyncResult<List>;

    async fn update_list(&self, list_id: Uuid, name: String, description: String)
        -> SyncResult<()>;

    async fn delete_list(&self, list_id: Uuid) -> SyncResult<()>;

    async fn add_list_movie(&self, list_id: Uuid, movie: MovieRef) -> SyncResult<()>;

    async fn remove_list_movie(&self, list_id: Uuid, key: MovieKey) -> SyncResult<()>;

    async fn fetch_favorites(&self) -> SyncResult<Vec<MovieKey>>;

    async fn add_favorite(&self, movie: MovieRef) -> SyncResult<()>;

    async fn remove_favorite(&self, key: MovieKey) -> SyncResult<()>;

    async fn fetch_ratings(&self) -> SyncResult<Vec<Rating>>;

    /// Creates a rating; the movie snapshot is sent alongside so the service
    /// can denormalize it on first contact.
    async fn create_rating(
        &self,
        movie: MovieRef,
        score: u8,
        review_text: Option<String>,
    ) -> SyncResult<()>;

    async fn update_rating(
        &self,
        key: MovieKey,
        score: u8,
        review_text: Option<String>,
    ) -> SyncResult<()>;

    async fn delete_rating(&self, key: MovieKey) -> SyncResult<()>;

    async fn fetch_quotes(&self) -> SyncResult<Vec<Quote>>;

    /// Scoped per-movie quote fetch, used by the resolver fallback and for
    /// quote reconciliation.
    async fn fetch_movie_quotes(&self, key: MovieKey) -> SyncResult<Vec<Quote>>;

    /// Creates a quote; returns the stored quote with its server-assigned id.
    async fn create_quote(&self, draft: QuoteDraft) -> SyncResult<Quote>;

    async fn update_quote(&self, quote_id: Uuid, draft: QuoteDraft) -> SyncResult<()>;

    async fn delete_quote(&self, quote_id: Uuid) -> SyncResult<()>;
}
