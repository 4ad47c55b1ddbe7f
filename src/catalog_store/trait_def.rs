//! CatalogStore trait definition.
//!
//! This trait is the narrow interface every backend implements; the
//! in-memory and SQLite stores are interchangeable behind it. All mutating
//! methods validate every constraint before touching any row and apply
//! their effects atomically, so callers observe either the full operation
//! or none of it.

use std::collections::BTreeSet;

use super::error::CatalogResult;
use super::models::{
    Album, AlbumId, AlbumPatch, Artist, ArtistId, CatalogCounts, Genre, GenreId, NewAlbum,
    NewRating, NewSong, Rating, Song, SongId, SongPatch, User, UserId,
};

/// A single mutation submitted as data, for callers that drive the store
/// through a uniform entry point rather than the typed methods.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Mutation {
    CreateArtist { name: String },
    DeleteArtist { id: ArtistId },
    CreateGenre { name: String },
    DeleteGenre { id: GenreId },
    CreateUser { username: String },
    DeleteUser { id: UserId },
    CreateAlbum(NewAlbum),
    UpdateAlbum { id: AlbumId, patch: AlbumPatch },
    DeleteAlbum { id: AlbumId },
    CreateSong(NewSong),
    UpdateSong { id: SongId, patch: SongPatch },
    DeleteSong { id: SongId },
    InsertRating(NewRating),
    UpsertRating(NewRating),
    DeleteRating { user_id: UserId, song_id: SongId },
    AddSongGenre { song_id: SongId, genre_id: GenreId },
    RemoveSongGenre { song_id: SongId, genre_id: GenreId },
}

/// Trait for catalog storage backends.
pub trait CatalogStore: Send + Sync {
    // =========================================================================
    // Artists
    // =========================================================================

    /// Create an artist. Fails with `InvalidValue` on an empty name and
    /// `DuplicateKey` if the name (exact, case-sensitive) is taken.
    fn create_artist(&self, name: &str) -> CatalogResult<ArtistId>;

    /// Return the artist with this exact name, creating it if absent.
    fn get_or_create_artist(&self, name: &str) -> CatalogResult<ArtistId>;

    fn get_artist(&self, id: ArtistId) -> CatalogResult<Option<Artist>>;

    fn find_artist_by_name(&self, name: &str) -> CatalogResult<Option<Artist>>;

    fn artist_exists(&self, id: ArtistId) -> CatalogResult<bool>;

    /// Delete an artist. Fails with `ReferentialViolation` while any album
    /// or song references it.
    fn delete_artist(&self, id: ArtistId) -> CatalogResult<()>;

    fn list_artists(&self) -> CatalogResult<Vec<Artist>>;

    // =========================================================================
    // Genres
    // =========================================================================

    fn create_genre(&self, name: &str) -> CatalogResult<GenreId>;

    fn get_or_create_genre(&self, name: &str) -> CatalogResult<GenreId>;

    fn get_genre(&self, id: GenreId) -> CatalogResult<Option<Genre>>;

    fn find_genre_by_name(&self, name: &str) -> CatalogResult<Option<Genre>>;

    fn genre_exists(&self, id: GenreId) -> CatalogResult<bool>;

    /// Delete a genre. Fails with `ReferentialViolation` while any album or
    /// song/genre tag references it.
    fn delete_genre(&self, id: GenreId) -> CatalogResult<()>;

    fn list_genres(&self) -> CatalogResult<Vec<Genre>>;

    // =========================================================================
    // Users
    // =========================================================================

    fn create_user(&self, username: &str) -> CatalogResult<UserId>;

    fn get_user(&self, id: UserId) -> CatalogResult<Option<User>>;

    fn find_user_by_username(&self, username: &str) -> CatalogResult<Option<User>>;

    fn user_exists(&self, id: UserId) -> CatalogResult<bool>;

    /// Delete a user. Fails with `ReferentialViolation` while any rating by
    /// the user exists.
    fn delete_user(&self, id: UserId) -> CatalogResult<()>;

    fn list_users(&self) -> CatalogResult<Vec<User>>;

    // =========================================================================
    // Albums
    // =========================================================================

    /// Create an album. Fails with `ForeignKeyViolation` if the artist or
    /// genre does not exist, and with `DuplicateKey` if the artist already
    /// has an album with this title.
    fn create_album(&self, album: NewAlbum) -> CatalogResult<AlbumId>;

    fn get_album(&self, id: AlbumId) -> CatalogResult<Option<Album>>;

    fn find_album_by_artist_and_title(
        &self,
        artist_id: ArtistId,
        title: &str,
    ) -> CatalogResult<Option<Album>>;

    fn album_exists(&self, id: AlbumId) -> CatalogResult<bool>;

    /// Apply a partial update. Changed foreign keys and the (artist, title)
    /// pair are re-validated before anything is written.
    fn update_album(&self, id: AlbumId, patch: AlbumPatch) -> CatalogResult<()>;

    /// Delete an album. Fails with `ReferentialViolation` while any song
    /// references it.
    fn delete_album(&self, id: AlbumId) -> CatalogResult<()>;

    fn list_albums(&self) -> CatalogResult<Vec<Album>>;

    fn songs_for_album(&self, album_id: AlbumId) -> CatalogResult<Vec<Song>>;

    // =========================================================================
    // Songs
    // =========================================================================

    /// Create a song. Fails with `ForeignKeyViolation` if the artist (or
    /// the album, when set) does not exist, and with `DuplicateKey` if the
    /// artist already has a song with this title. The album, when set, is
    /// not required to belong to the same artist.
    fn create_song(&self, song: NewSong) -> CatalogResult<SongId>;

    fn get_song(&self, id: SongId) -> CatalogResult<Option<Song>>;

    fn find_song_by_artist_and_title(
        &self,
        artist_id: ArtistId,
        title: &str,
    ) -> CatalogResult<Option<Song>>;

    fn song_exists(&self, id: SongId) -> CatalogResult<bool>;

    fn update_song(&self, id: SongId, patch: SongPatch) -> CatalogResult<()>;

    /// Delete a song together with its genre tags (cascade), as one atomic
    /// unit. Fails with `ReferentialViolation` while any rating references
    /// the song.
    fn delete_song(&self, id: SongId) -> CatalogResult<()>;

    fn list_songs(&self) -> CatalogResult<Vec<Song>>;

    // =========================================================================
    // Ratings
    // =========================================================================

    /// Strict insert: fails with `DuplicateKey` if the user already rated
    /// the song, `ForeignKeyViolation` if user or song is absent, and
    /// `InvalidValue` if the rating is outside [1,5].
    fn insert_rating(&self, rating: NewRating) -> CatalogResult<()>;

    /// Like `insert_rating`, but an existing rating for the (user, song)
    /// pair is replaced instead of rejected.
    fn upsert_rating(&self, rating: NewRating) -> CatalogResult<()>;

    fn get_rating(&self, user_id: UserId, song_id: SongId) -> CatalogResult<Option<Rating>>;

    fn delete_rating(&self, user_id: UserId, song_id: SongId) -> CatalogResult<()>;

    fn ratings_for_song(&self, song_id: SongId) -> CatalogResult<Vec<Rating>>;

    fn list_ratings(&self) -> CatalogResult<Vec<Rating>>;

    // =========================================================================
    // Song/genre tags
    // =========================================================================

    /// Tag a song with a genre. Adding an existing tag is a no-op (set
    /// membership); fails with `ForeignKeyViolation` if either side is
    /// absent.
    fn add_song_genre(&self, song_id: SongId, genre_id: GenreId) -> CatalogResult<()>;

    /// Remove a tag. Removing an absent tag is a no-op.
    fn remove_song_genre(&self, song_id: SongId, genre_id: GenreId) -> CatalogResult<()>;

    /// Remove every tag of a song. This is the same removal that
    /// [`delete_song`](CatalogStore::delete_song) performs as its cascade,
    /// exposed for callers that want to untag a song wholesale.
    fn remove_genres_for_song(&self, song_id: SongId) -> CatalogResult<()>;

    fn genres_for_song(&self, song_id: SongId) -> CatalogResult<Vec<GenreId>>;

    fn songs_with_genre(&self, genre_id: GenreId) -> CatalogResult<Vec<SongId>>;

    fn list_song_genres(&self) -> CatalogResult<Vec<(SongId, GenreId)>>;

    // =========================================================================
    // Analytics
    // =========================================================================

    /// Top `n` artists by number of singles released in the inclusive year
    /// range, as (name, count), count descending, name ascending on ties.
    fn most_prolific_artists(
        &self,
        n: usize,
        year_range: (i32, i32),
    ) -> CatalogResult<Vec<(String, i64)>>;

    /// Artists whose most recent single was released in `year`.
    fn artists_with_last_single_in(&self, year: i32) -> CatalogResult<BTreeSet<String>>;

    /// Top `n` genres by number of tagged songs, as (name, count). A song
    /// with several genres counts once per genre.
    fn top_song_genres(&self, n: usize) -> CatalogResult<Vec<(String, i64)>>;

    /// Artists with at least one album and at least one single.
    fn artists_with_albums_and_singles(&self) -> CatalogResult<BTreeSet<String>>;

    /// Top `n` songs by number of ratings dated within the inclusive year
    /// range, as (title, artist name, count), title ascending on ties.
    fn most_rated_songs(
        &self,
        year_range: (i32, i32),
        n: usize,
    ) -> CatalogResult<Vec<(String, String, i64)>>;

    /// Top `n` users by number of ratings dated within the inclusive year
    /// range, as (username, count), username ascending on ties.
    fn most_engaged_users(
        &self,
        year_range: (i32, i32),
        n: usize,
    ) -> CatalogResult<Vec<(String, i64)>>;

    // =========================================================================
    // Maintenance
    // =========================================================================

    fn counts(&self) -> CatalogResult<CatalogCounts>;

    /// Remove every row from every table, children before parents, as one
    /// atomic unit. Surrogate id counters are not reset.
    fn clear(&self) -> CatalogResult<()>;

    // =========================================================================
    // Uniform mutation entry point
    // =========================================================================

    /// Apply a [`Mutation`] by dispatching to the typed operation.
    fn mutate(&self, op: Mutation) -> CatalogResult<()> {
        match op {
            Mutation::CreateArtist { name } => self.create_artist(&name).map(|_| ()),
            Mutation::DeleteArtist { id } => self.delete_artist(id),
            Mutation::CreateGenre { name } => self.create_genre(&name).map(|_| ()),
            Mutation::DeleteGenre { id } => self.delete_genre(id),
            Mutation::CreateUser { username } => self.create_user(&username).map(|_| ()),
            Mutation::DeleteUser { id } => self.delete_user(id),
            Mutation::CreateAlbum(album) => self.create_album(album).map(|_| ()),
            Mutation::UpdateAlbum { id, patch } => self.update_album(id, patch),
            Mutation::DeleteAlbum { id } => self.delete_album(id),
            Mutation::CreateSong(song) => self.create_song(song).map(|_| ()),
            Mutation::UpdateSong { id, patch } => self.update_song(id, patch),
            Mutation::DeleteSong { id } => self.delete_song(id),
            Mutation::InsertRating(rating) => self.insert_rating(rating),
            Mutation::UpsertRating(rating) => self.upsert_rating(rating),
            Mutation::DeleteRating { user_id, song_id } => self.delete_rating(user_id, song_id),
            Mutation::AddSongGenre { song_id, genre_id } => {
                self.add_song_genre(song_id, genre_id)
            }
            Mutation::RemoveSongGenre { song_id, genre_id } => {
                self.remove_song_genre(song_id, genre_id)
            }
        }
    }
}
