//! Raw collection-service payload shapes and their conversions into domain
//! types.
//!
//! The remote service grew several divergent field spellings over time
//! (`tmdb_id` vs `tmdbId`, `quote_text` vs `quoteText`, `score` vs
//! `personalScore`). They are normalized here, once, via serde aliases; the
//! rest of the crate only ever sees the domain types in `models`.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use super::{List, MediaType, MovieKey, MovieRef, Quote, Rating, Session};

/// A movie object as returned by the catalog service (trending, discover,
/// search, detail). Views hand these to the coordinator, which snapshots them
/// into a [`MovieRef`] at the moment the movie enters a collection.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogMovie {
    #[serde(alias = "tmdb_id")]
    pub id: u64,
    /// TV entries use `name` instead of `title`
    #[serde(alias = "name")]
    pub title: String,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub release_year: Option<i32>,
    /// Full date, e.g. "1999-03-31"; only the year is kept
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub media_type: Option<MediaType>,
}

impl From<CatalogMovie> for MovieRef {
    fn from(movie: CatalogMovie) -> Self {
        let release_year = movie.release_year.or_else(|| {
            movie
                .release_date
                .as_deref()
                .and_then(|d| d.get(..4))
                .and_then(|y| y.parse().ok())
        });

        MovieRef {
            key: MovieKey {
                tmdb_id: movie.id,
                media_type: movie.media_type.unwrap_or_default(),
            },
            title: movie.title,
            poster_path: movie.poster_path,
            release_year,
        }
    }
}

/// A movie entry inside a list payload
#[derive(Debug, Clone, Deserialize)]
pub struct ApiListMovie {
    #[serde(alias = "tmdbId")]
    pub tmdb_id: u64,
    #[serde(default)]
    pub media_type: MediaType,
    pub title: String,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default, alias = "releaseYear")]
    pub release_year: Option<i32>,
}

impl From<ApiListMovie> for MovieRef {
    fn from(movie: ApiListMovie) -> Self {
        MovieRef {
            key: MovieKey {
                tmdb_id: movie.tmdb_id,
                media_type: movie.media_type,
            },
            title: movie.title,
            poster_path: movie.poster_path,
            release_year: movie.release_year,
        }
    }
}

/// A list payload from `GET /lists` or `POST /lists`
#[derive(Debug, Clone, Deserialize)]
pub struct ApiList {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub movies: Vec<ApiListMovie>,
    #[serde(default, alias = "createdAt")]
    pub created_at: Option<DateTime<Utc>>,
}

impl From<ApiList> for List {
    fn from(list: ApiList) -> Self {
        List::from_movies(
            list.id,
            list.name,
            list.description.unwrap_or_default(),
            list.created_at.unwrap_or_else(Utc::now),
            list.movies.into_iter().map(MovieRef::from).collect(),
        )
    }
}

/// A favorite entry from `GET /favorites`; only the key is mirrored
#[derive(Debug, Clone, Deserialize)]
pub struct ApiFavorite {
    #[serde(alias = "tmdbId", alias = "movieId", alias = "id")]
    pub tmdb_id: u64,
    #[serde(default)]
    pub media_type: MediaType,
}

impl From<ApiFavorite> for MovieKey {
    fn from(favorite: ApiFavorite) -> Self {
        MovieKey {
            tmdb_id: favorite.tmdb_id,
            media_type: favorite.media_type,
        }
    }
}

/// A rating payload from `GET /ratings` or `GET /rating/{tmdbId}`
#[derive(Debug, Clone, Deserialize)]
pub struct ApiRating {
    #[serde(alias = "tmdbId")]
    pub tmdb_id: u64,
    #[serde(default)]
    pub media_type: MediaType,
    #[serde(alias = "personalScore")]
    pub score: u8,
    #[serde(default, alias = "reviewText", alias = "personalReview")]
    pub review_text: Option<String>,
}

impl From<ApiRating> for Rating {
    fn from(rating: ApiRating) -> Self {
        Rating {
            key: MovieKey {
                tmdb_id: rating.tmdb_id,
                media_type: rating.media_type,
            },
            score: rating.score,
            review_text: rating.review_text,
        }
    }
}

/// A quote payload from the quotes endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct ApiQuote {
    pub id: Uuid,
    #[serde(alias = "tmdbId")]
    pub tmdb_id: u64,
    #[serde(default)]
    pub media_type: MediaType,
    #[serde(alias = "quoteText")]
    pub quote_text: String,
    #[serde(default)]
    pub quoter: Option<String>,
}

impl From<ApiQuote> for Quote {
    fn from(quote: ApiQuote) -> Self {
        Quote {
            id: quote.id,
            key: MovieKey {
                tmdb_id: quote.tmdb_id,
                media_type: quote.media_type,
            },
            quote_text: quote.quote_text,
            quoter: quote.quoter.unwrap_or_else(|| "Unknown".to_string()),
        }
    }
}

/// Identity payload from `POST /auth/login` and `GET /auth/me`
#[derive(Debug, Clone, Deserialize)]
pub struct ApiSession {
    pub id: Uuid,
    #[serde(default)]
    pub username: String,
    #[serde(alias = "displayName", alias = "display_name")]
    pub display_name: String,
}

impl From<ApiSession> for Session {
    fn from(session: ApiSession) -> Self {
        Session {
            user_id: session.id,
            username: session.username,
            display_name: session.display_name,
        }
    }
}
