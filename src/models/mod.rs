use std::collections::HashSet;
use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod wire;

pub use wire::CatalogMovie;

/// Media type of a catalog entry
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    #[default]
    Movie,
    Tv,
}

impl Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaType::Movie => write!(f, "movie"),
            MediaType::Tv => write!(f, "tv"),
        }
    }
}

/// Identifier correlating one catalog entry across all local collections
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct MovieKey {
    pub tmdb_id: u64,
    pub media_type: MediaType,
}

impl MovieKey {
    pub fn movie(tmdb_id: u64) -> Self {
        Self {
            tmdb_id,
            media_type: MediaType::Movie,
        }
    }

    pub fn tv(tmdb_id: u64) -> Self {
        Self {
            tmdb_id,
            media_type: MediaType::Tv,
        }
    }
}

impl Display for MovieKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.tmdb_id, self.media_type)
    }
}

/// Denormalized catalog snapshot captured when a movie first enters a collection.
///
/// Never refreshed from the catalog afterward; staleness is accepted.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MovieRef {
    pub key: MovieKey,
    pub title: String,
    pub poster_path: Option<String>,
    pub release_year: Option<i32>,
}

/// A user-defined watch-list
///
/// Movies are an ordered set unique by `MovieKey`: insertion order is
/// preserved, and membership checks are constant-time against a keyed index.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct List {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    movies: Vec<MovieRef>,
    #[serde(skip)]
    keys: HashSet<MovieKey>,
}

impl List {
    /// Creates an empty list
    pub fn new(id: Uuid, name: String, description: String, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            name,
            description,
            created_at,
            movies: Vec::new(),
            keys: HashSet::new(),
        }
    }

    /// Creates a list from server-provided movies, dropping duplicate keys
    pub fn from_movies(
        id: Uuid,
        name: String,
        description: String,
        created_at: DateTime<Utc>,
        movies: Vec<MovieRef>,
    ) -> Self {
        let mut list = Self::new(id, name, description, created_at);
        for movie in movies {
            list.insert(movie);
        }
        list
    }

    pub fn movies(&self) -> &[MovieRef] {
        &self.movies
    }

    pub fn contains(&self, key: &MovieKey) -> bool {
        self.keys.contains(key)
    }

    pub fn len(&self) -> usize {
        self.movies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.movies.is_empty()
    }

    /// Appends a movie; returns false without modifying the list if the key is
    /// already present.
    pub fn insert(&mut self, movie: MovieRef) -> bool {
        if !self.keys.insert(movie.key.clone()) {
            return false;
        }
        self.movies.push(movie);
        true
    }

    /// Inserts a movie at a specific position (used to roll back a removal)
    pub fn insert_at(&mut self, index: usize, movie: MovieRef) -> bool {
        if !self.keys.insert(movie.key.clone()) {
            return false;
        }
        let index = index.min(self.movies.len());
        self.movies.insert(index, movie);
        true
    }

    /// Removes a movie by key, returning its former position and snapshot
    pub fn remove(&mut self, key: &MovieKey) -> Option<(usize, MovieRef)> {
        if !self.keys.remove(key) {
            return None;
        }
        let index = self.movies.iter().position(|m| &m.key == key)?;
        Some((index, self.movies.remove(index)))
    }
}

/// A personal rating for one movie; at most one per (user, movieKey)
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Rating {
    pub key: MovieKey,
    /// Integer score in 1..=10
    pub score: u8,
    pub review_text: Option<String>,
}

/// A remembered quote; identity is the quote id, multiple quotes per movie
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Quote {
    pub id: Uuid,
    pub key: MovieKey,
    pub quote_text: String,
    pub quoter: String,
}

/// Draft quote content submitted by a view
#[derive(Debug, Clone, PartialEq)]
pub struct QuoteDraft {
    pub key: MovieKey,
    pub quote_text: String,
    pub quoter: String,
}

/// Established identity for the current session
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Session {
    pub user_id: Uuid,
    pub username: String,
    pub display_name: String,
}

/// Login credentials
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Registration request for a new account
#[derive(Debug, Clone)]
pub struct Registration {
    pub username: String,
    pub password: String,
    pub display_name: String,
}
