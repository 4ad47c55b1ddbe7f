//! Catalog entity models.
//!
//! Every entity carries a store-assigned surrogate `i64` id; the relation
//! rows (ratings, song/genre tags) are keyed by the pair of ids they join.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

pub type ArtistId = i64;
pub type GenreId = i64;
pub type AlbumId = i64;
pub type SongId = i64;
pub type UserId = i64;

/// Inclusive bounds for song ratings.
pub const RATING_MIN: i32 = 1;
pub const RATING_MAX: i32 = 5;

/// The entity and relation kinds of the catalog, in the global table order
/// used for dependent scans and lock acquisition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Artist,
    Genre,
    Album,
    Song,
    User,
    Rating,
    SongGenre,
}

impl EntityKind {
    pub fn table_name(&self) -> &'static str {
        match self {
            EntityKind::Artist => "artists",
            EntityKind::Genre => "genres",
            EntityKind::Album => "albums",
            EntityKind::Song => "songs",
            EntityKind::User => "users",
            EntityKind::Rating => "ratings",
            EntityKind::SongGenre => "song_genres",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Artist => "artist",
            EntityKind::Genre => "genre",
            EntityKind::Album => "album",
            EntityKind::Song => "song",
            EntityKind::User => "user",
            EntityKind::Rating => "rating",
            EntityKind::SongGenre => "song_genre",
        };
        write!(f, "{}", name)
    }
}

/// Artist entity
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artist {
    pub id: ArtistId,
    pub name: String,
}

/// Genre entity
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Genre {
    pub id: GenreId,
    pub name: String,
}

/// User entity
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
}

/// Album entity
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Album {
    pub id: AlbumId,
    pub title: String,
    pub release_date: NaiveDate,
    pub artist_id: ArtistId,
    pub genre_id: GenreId,
}

/// Song entity. A song with no album is a single.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Song {
    pub id: SongId,
    pub title: String,
    pub release_date: NaiveDate,
    pub artist_id: ArtistId,
    pub album_id: Option<AlbumId>,
}

impl Song {
    pub fn is_single(&self) -> bool {
        self.album_id.is_none()
    }
}

/// A user's rating of a song, keyed by the (user, song) pair.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rating {
    pub user_id: UserId,
    pub song_id: SongId,
    pub rating: i32,
    pub rating_date: NaiveDate,
}

/// Input for creating an album; the id is assigned by the store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAlbum {
    pub title: String,
    pub release_date: NaiveDate,
    pub artist_id: ArtistId,
    pub genre_id: GenreId,
}

/// Input for creating a song; the id is assigned by the store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSong {
    pub title: String,
    pub release_date: NaiveDate,
    pub artist_id: ArtistId,
    pub album_id: Option<AlbumId>,
}

/// Input for inserting or upserting a rating.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRating {
    pub user_id: UserId,
    pub song_id: SongId,
    pub rating: i32,
    pub rating_date: NaiveDate,
}

/// Partial update for an album. `None` fields are left unchanged.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlbumPatch {
    pub title: Option<String>,
    pub release_date: Option<NaiveDate>,
    pub artist_id: Option<ArtistId>,
    pub genre_id: Option<GenreId>,
}

/// Partial update for a song. The nested `Option` on `album_id`
/// distinguishes "leave unchanged" (outer `None`) from "set to this value",
/// where the inner `None` detaches the song from its album.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SongPatch {
    pub title: Option<String>,
    pub release_date: Option<NaiveDate>,
    pub artist_id: Option<ArtistId>,
    pub album_id: Option<Option<AlbumId>>,
}

/// Row counts per table, for the stats surface.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogCounts {
    pub artists: usize,
    pub genres: usize,
    pub albums: usize,
    pub songs: usize,
    pub users: usize,
    pub ratings: usize,
    pub song_genres: usize,
}
