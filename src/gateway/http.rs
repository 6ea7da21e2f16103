use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client as HttpClient, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    config::Config,
    error::{SyncError, SyncResult},
    models::{
        wire::{ApiFavorite, ApiList, ApiQuote, ApiRating, ApiSession},
        Credentials, List, MovieKey, MovieRef, Quote, QuoteDraft, Rating, Registration, Session,
    },
};

use super::{AuthGateway, CollectionGateway};

/// Response envelope used by the collection service.
///
/// Canonically the service wraps payloads as `{"data": ...}`; some endpoints
/// answer with the bare payload. Both shapes are accepted here so no call site
/// ever unwraps an envelope itself.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Envelope<T> {
    Wrapped { data: T },
    Bare(T),
}

impl<T> Envelope<T> {
    fn into_inner(self) -> T {
        match self {
            Envelope::Wrapped { data } => data,
            Envelope::Bare(inner) => inner,
        }
    }
}

/// Extracts a human-readable message from an error body, falling back to the
/// raw text.
fn error_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        for field in ["message", "error"] {
            if let Some(message) = value.get(field).and_then(|m| m.as_str()) {
                return message.to_string();
            }
        }
    }
    body.to_string()
}

/// Maps a non-success status onto the error taxonomy
fn map_status(status: StatusCode, body: &str) -> SyncError {
    match status {
        StatusCode::UNAUTHORIZED => SyncError::Unauthorized,
        StatusCode::NOT_FOUND => SyncError::NotFound(error_message(body)),
        StatusCode::CONFLICT => SyncError::Conflict,
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            SyncError::Validation(error_message(body))
        }
        _ => SyncError::Service(format!(
            "collection service returned {}: {}",
            status,
            error_message(body)
        )),
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MoviePayload<'a> {
    tmdb_id: u64,
    media_type: String,
    title: &'a str,
    release_year: Option<i32>,
    poster_path: Option<&'a str>,
}

impl<'a> From<&'a MovieRef> for MoviePayload<'a> {
    fn from(movie: &'a MovieRef) -> Self {
        Self {
            tmdb_id: movie.key.tmdb_id,
            media_type: movie.key.media_type.to_string(),
            title: &movie.title,
            release_year: movie.release_year,
            poster_path: movie.poster_path.as_deref(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ListPayload<'a> {
    name: &'a str,
    description: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RatingCreatePayload<'a> {
    #[serde(flatten)]
    movie: MoviePayload<'a>,
    score: u8,
    review_text: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RatingUpdatePayload<'a> {
    score: u8,
    review_text: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QuotePayload<'a> {
    tmdb_id: u64,
    media_type: String,
    quote_text: &'a str,
    quoter: &'a str,
}

impl<'a> From<&'a QuoteDraft> for QuotePayload<'a> {
    fn from(draft: &'a QuoteDraft) -> Self {
        Self {
            tmdb_id: draft.key.tmdb_id,
            media_type: draft.key.media_type.to_string(),
            quote_text: &draft.quote_text,
            quoter: &draft.quoter,
        }
    }
}

#[derive(Debug, Serialize)]
struct LoginPayload<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RegisterPayload<'a> {
    username: &'a str,
    password: &'a str,
    display_name: &'a str,
}

/// HTTP transport adapter for the auth and collection services.
///
/// The session rides a server-set cookie: the client is built with a cookie
/// store, so the jar established at login is attached to every subsequent
/// call without per-request bookkeeping.
#[derive(Clone)]
pub struct HttpGateway {
    http: HttpClient,
    base_url: String,
}

impl HttpGateway {
    pub fn new(config: &Config) -> SyncResult<Self> {
        let http = HttpClient::builder()
            .cookie_store(true)
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Decodes a success body through the envelope, or maps the status onto
    /// the error taxonomy.
    async fn decode<T: DeserializeOwned>(&self, response: Response) -> SyncResult<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_status(status, &body));
        }

        let envelope: Envelope<T> = response.json().await?;
        Ok(envelope.into_inner())
    }

    /// Checks the status of a response whose body carries nothing we mirror
    async fn expect_ok(&self, response: Response) -> SyncResult<()> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_status(status, &body));
        }
        Ok(())
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> SyncResult<T> {
        let response = self.http.get(self.url(path)).send().await?;
        self.decode(response).await
    }
}

#[async_trait]
impl AuthGateway for HttpGateway {
    async fn probe(&self) -> SyncResult<Option<Session>> {
        let response = self.http.get(self.url("/auth/me")).send().await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            return Ok(None);
        }

        let session: ApiSession = self.decode(response).await?;
        Ok(Some(session.into()))
    }

    async fn login(&self, credentials: Credentials) -> SyncResult<Session> {
        let response = self
            .http
            .post(self.url("/auth/login"))
            .json(&LoginPayload {
                username: &credentials.username,
                password: &credentials.password,
            })
            .send()
            .await?;

        let session: ApiSession = self.decode(response).await?;

        tracing::info!(user_id = %session.id, "Login accepted by auth service");

        Ok(session.into())
    }

    async fn register(&self, registration: Registration) -> SyncResult<()> {
        let response = self
            .http
            .post(self.url("/auth/register"))
            .json(&RegisterPayload {
                username: &registration.username,
                password: &registration.password,
                display_name: &registration.display_name,
            })
            .send()
            .await?;

        self.expect_ok(response).await
    }

    async fn logout(&self) -> SyncResult<()> {
        let response = self.http.post(self.url("/auth/logout")).send().await?;
        self.expect_ok(response).await
    }
}

#[async_trait]
impl CollectionGateway for HttpGateway {
    async fn fetch_lists(&self) -> SyncResult<Vec<List>> {
        let lists: Vec<ApiList> = self.get_json("/lists").await?;
        Ok(lists.into_iter().map(List::from).collect())
    }

    async fn fetch_list(&self, list_id: Uuid) -> SyncResult<List> {
        let list: ApiList = self.get_json(&format!("/lists/{}", list_id)).await?;
        Ok(list.into())
    }

    async fn create_list(&self, name: String, description: String) -> SyncResult<List> {
        let response = self
            .http
            .post(self.url("/lists"))
            .json(&ListPayload {
                name: &name,
                description: &description,
            })
            .send()
            .await?;

        let list: ApiList = self.decode(response).await?;
        Ok(list.into())
    }

    async fn update_list(
        &self,
        list_id: Uuid,
        name: String,
        description: String,
    ) -> SyncResult<()> {
        let response = self
            .http
            .put(self.url(&format!("/lists/{}", list_id)))
            .json(&ListPayload {
                name: &name,
                description: &description,
            })
            .send()
            .await?;

        self.expect_ok(response).await
    }

    async fn delete_list(&self, list_id: Uuid) -> SyncResult<()> {
        let response = self
            .http
            .delete(self.url(&format!("/lists/{}", list_id)))
            .send()
            .await?;

        self.expect_ok(response).await
    }

    async fn add_list_movie(&self, list_id: Uuid, movie: MovieRef) -> SyncResult<()> {
        let response = self
            .http
            .post(self.url(&format!("/lists/{}/movies", list_id)))
            .json(&MoviePayload::from(&movie))
            .send()
            .await?;

        self.expect_ok(response).await
    }

    async fn remove_list_movie(&self, list_id: Uuid, key: MovieKey) -> SyncResult<()> {
        let response = self
            .http
            .delete(self.url(&format!("/lists/{}/movies/{}", list_id, key.tmdb_id)))
            .send()
            .await?;

        self.expect_ok(response).await
    }

    async fn fetch_favorites(&self) -> SyncResult<Vec<MovieKey>> {
        let favorites: Vec<ApiFavorite> = self.get_json("/favorites").await?;
        Ok(favorites.into_iter().map(MovieKey::from).collect())
    }

    async fn add_favorite(&self, movie: MovieRef) -> SyncResult<()> {
        let response = self
            .http
            .post(self.url("/favorites"))
            .json(&MoviePayload::from(&movie))
            .send()
            .await?;

        self.expect_ok(response).await
    }

    async fn remove_favorite(&self, key: MovieKey) -> SyncResult<()> {
        let response = self
            .http
            .delete(self.url(&format!("/favorites/{}", key.tmdb_id)))
            .send()
            .await?;

        self.expect_ok(response).await
    }

    async fn fetch_ratings(&self) -> SyncResult<Vec<Rating>> {
        let ratings: Vec<ApiRating> = self.get_json("/ratings").await?;
        Ok(ratings.into_iter().map(Rating::from).collect())
    }

    async fn create_rating(
        &self,
        movie: MovieRef,
        score: u8,
        review_text: Option<String>,
    ) -> SyncResult<()> {
        let response = self
            .http
            .post(self.url(&format!("/rating/{}", movie.key.tmdb_id)))
            .json(&RatingCreatePayload {
                movie: MoviePayload::from(&movie),
                score,
                review_text: review_text.as_deref(),
            })
            .send()
            .await?;

        self.expect_ok(response).await
    }

    async fn update_rating(
        &self,
        key: MovieKey,
        score: u8,
        review_text: Option<String>,
    ) -> SyncResult<()> {
        let response = self
            .http
            .patch(self.url(&format!("/rating/{}", key.tmdb_id)))
            .json(&RatingUpdatePayload {
                score,
                review_text: review_text.as_deref(),
            })
            .send()
            .await?;

        self.expect_ok(response).await
    }

    async fn delete_rating(&self, key: MovieKey) -> SyncResult<()> {
        let response = self
            .http
            .delete(self.url(&format!("/rating/{}", key.tmdb_id)))
            .send()
            .await?;

        self.expect_ok(response).await
    }

    async fn fetch_quotes(&self) -> SyncResult<Vec<Quote>> {
        let quotes: Vec<ApiQuote> = self.get_json("/quotes").await?;
        Ok(quotes.into_iter().map(Quote::from).collect())
    }

    async fn fetch_movie_quotes(&self, key: MovieKey) -> SyncResult<Vec<Quote>> {
        let quotes: Vec<ApiQuote> = self
            .get_json(&format!("/quotes/movie/{}", key.tmdb_id))
            .await?;
        Ok(quotes.into_iter().map(Quote::from).collect())
    }

    async fn create_quote(&self, draft: QuoteDraft) -> SyncResult<Quote> {
        let response = self
            .http
            .post(self.url("/quotes"))
            .json(&QuotePayload::from(&draft))
            .send()
            .await?;

        let quote: ApiQuote = self.decode(response).await?;
        Ok(quote.into())
    }

    async fn update_quote(&self, quote_id: Uuid, draft: QuoteDraft) -> SyncResult<()> {
        let response = self
            .http
            .put(self.url(&format!("/quotes/{}", quote_id)))
            .json(&QuotePayload::from(&draft))
            .send()
            .await?;

        self.expect_ok(response).await
    }

    async fn delete_quote(&self, quote_id: Uuid) -> SyncResult<()> {
        let response = self
            .http
            .delete(self.url(&format!("/quotes/{}", quote_id)))
            .send()
            .await?;

        self.expect_ok(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::wire::ApiList;

    #[test]
    fn test_envelope_wrapped() {
        let json = r#"{"data": [1, 2, 3]}"#;
        let envelope: Envelope<Vec<u32>> = serde_json::from_str(json).unwrap();
        assert_eq!(envelope.into_inner(), vec![1, 2, 3]);
    }

    #[test]
    fn test_envelope_bare() {
        let json = r#"[1, 2, 3]"#;
        let envelope: Envelope<Vec<u32>> = serde_json::from_str(json).unwrap();
        assert_eq!(envelope.into_inner(), vec![1, 2, 3]);
    }

    #[test]
    fn test_envelope_wrapped_list_payload() {
        let json = r#"{"data": [{"id": "5f0fcb95-9270-4cd1-8a02-7d2cd9d0b2b5", "name": "Noir"}]}"#;
        let envelope: Envelope<Vec<ApiList>> = serde_json::from_str(json).unwrap();
        let lists = envelope.into_inner();
        assert_eq!(lists.len(), 1);
        assert_eq!(lists[0].name, "Noir");
    }

    #[test]
    fn test_error_message_from_message_field() {
        assert_eq!(
            error_message(r#"{"message": "list not found"}"#),
            "list not found"
        );
    }

    #[test]
    fn test_error_message_from_error_field() {
        assert_eq!(error_message(r#"{"error": "bad input"}"#), "bad input");
    }

    #[test]
    fn test_error_message_raw_fallback() {
        assert_eq!(error_message("gateway timeout"), "gateway timeout");
    }

    #[test]
    fn test_map_status_taxonomy() {
        assert!(matches!(
            map_status(StatusCode::UNAUTHORIZED, ""),
            SyncError::Unauthorized
        ));
        assert!(matches!(
            map_status(StatusCode::CONFLICT, ""),
            SyncError::Conflict
        ));
        assert!(matches!(
            map_status(StatusCode::NOT_FOUND, r#"{"message": "gone"}"#),
            SyncError::NotFound(msg) if msg == "gone"
        ));
        assert!(matches!(
            map_status(StatusCode::UNPROCESSABLE_ENTITY, ""),
            SyncError::Validation(_)
        ));
        assert!(matches!(
            map_status(StatusCode::INTERNAL_SERVER_ERROR, ""),
            SyncError::Service(_)
        ));
    }

    #[test]
    fn test_movie_payload_is_camel_case_and_tmdb_keyed() {
        let movie = MovieRef {
            key: MovieKey::movie(603),
            title: "The Matrix".to_string(),
            poster_path: Some("/matrix.jpg".to_string()),
            release_year: Some(1999),
        };

        let json = serde_json::to_value(MoviePayload::from(&movie)).unwrap();
        assert_eq!(json["tmdbId"], 603);
        assert_eq!(json["mediaType"], "movie");
        assert_eq!(json["releaseYear"], 1999);
        assert_eq!(json["posterPath"], "/matrix.jpg");
    }
}
