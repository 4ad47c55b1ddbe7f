//! In-memory catalog store.
//!
//! Tables are `BTreeMap`s behind a single `RwLock`: mutations take the
//! write lock and run validate-then-commit, reads share the read lock and
//! observe a consistent snapshot. Name and title uniqueness is backed by
//! hash indexes kept in lockstep with the tables, and delete policies come
//! from the [`RELATIONSHIPS`](super::relationships::RELATIONSHIPS) table.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::RwLock;

use chrono::{Datelike, NaiveDate};

use super::error::{CatalogError, CatalogResult};
use super::models::{
    Album, AlbumId, AlbumPatch, Artist, ArtistId, CatalogCounts, EntityKind, Genre, GenreId,
    NewAlbum, NewRating, NewSong, Rating, Song, SongId, SongPatch, User, UserId,
};
use super::relationships::{edges_into, DeletePolicy, RelationshipDef};
use super::trait_def::CatalogStore;
use super::validation::{check_non_empty, check_rating_range};

#[derive(Default)]
struct Tables {
    artists: BTreeMap<ArtistId, Artist>,
    genres: BTreeMap<GenreId, Genre>,
    albums: BTreeMap<AlbumId, Album>,
    songs: BTreeMap<SongId, Song>,
    users: BTreeMap<UserId, User>,
    ratings: BTreeMap<(UserId, SongId), Rating>,
    song_genres: BTreeSet<(SongId, GenreId)>,

    // uniqueness indexes, kept in lockstep with the tables above
    artist_by_name: HashMap<String, ArtistId>,
    genre_by_name: HashMap<String, GenreId>,
    user_by_username: HashMap<String, UserId>,
    album_by_artist_title: HashMap<(ArtistId, String), AlbumId>,
    song_by_artist_title: HashMap<(ArtistId, String), SongId>,

    next_id: IdCounters,
}

struct IdCounters {
    artist: i64,
    genre: i64,
    album: i64,
    song: i64,
    user: i64,
}

impl Default for IdCounters {
    fn default() -> Self {
        Self {
            artist: 1,
            genre: 1,
            album: 1,
            song: 1,
            user: 1,
        }
    }
}

impl Tables {
    fn require_artist(&self, id: ArtistId) -> CatalogResult<()> {
        if self.artists.contains_key(&id) {
            Ok(())
        } else {
            Err(CatalogError::ForeignKeyViolation {
                entity: EntityKind::Artist,
                id,
            })
        }
    }

    fn require_genre(&self, id: GenreId) -> CatalogResult<()> {
        if self.genres.contains_key(&id) {
            Ok(())
        } else {
            Err(CatalogError::ForeignKeyViolation {
                entity: EntityKind::Genre,
                id,
            })
        }
    }

    fn require_album(&self, id: AlbumId) -> CatalogResult<()> {
        if self.albums.contains_key(&id) {
            Ok(())
        } else {
            Err(CatalogError::ForeignKeyViolation {
                entity: EntityKind::Album,
                id,
            })
        }
    }

    fn require_song(&self, id: SongId) -> CatalogResult<()> {
        if self.songs.contains_key(&id) {
            Ok(())
        } else {
            Err(CatalogError::ForeignKeyViolation {
                entity: EntityKind::Song,
                id,
            })
        }
    }

    fn require_user(&self, id: UserId) -> CatalogResult<()> {
        if self.users.contains_key(&id) {
            Ok(())
        } else {
            Err(CatalogError::ForeignKeyViolation {
                entity: EntityKind::User,
                id,
            })
        }
    }

    /// First dependent row referencing `parent_id` through `edge`, as a
    /// display key. Table iteration is ascending by primary key, so the
    /// result is deterministic.
    fn first_dependent(&self, edge: &RelationshipDef, parent_id: i64) -> Option<String> {
        match (edge.child, edge.child_field) {
            (EntityKind::Album, "artist_id") => self
                .albums
                .values()
                .find(|a| a.artist_id == parent_id)
                .map(|a| a.id.to_string()),
            (EntityKind::Album, "genre_id") => self
                .albums
                .values()
                .find(|a| a.genre_id == parent_id)
                .map(|a| a.id.to_string()),
            (EntityKind::Song, "artist_id") => self
                .songs
                .values()
                .find(|s| s.artist_id == parent_id)
                .map(|s| s.id.to_string()),
            (EntityKind::Song, "album_id") => self
                .songs
                .values()
                .find(|s| s.album_id == Some(parent_id))
                .map(|s| s.id.to_string()),
            (EntityKind::Rating, "user_id") => self
                .ratings
                .values()
                .find(|r| r.user_id == parent_id)
                .map(|r| format!("{}/{}", r.user_id, r.song_id)),
            (EntityKind::Rating, "song_id") => self
                .ratings
                .values()
                .find(|r| r.song_id == parent_id)
                .map(|r| format!("{}/{}", r.user_id, r.song_id)),
            (EntityKind::SongGenre, "song_id") => self
                .song_genres
                .iter()
                .find(|(song_id, _)| *song_id == parent_id)
                .map(|(song_id, genre_id)| format!("{}/{}", song_id, genre_id)),
            (EntityKind::SongGenre, "genre_id") => self
                .song_genres
                .iter()
                .find(|(_, genre_id)| *genre_id == parent_id)
                .map(|(song_id, genre_id)| format!("{}/{}", song_id, genre_id)),
            _ => None,
        }
    }

    /// Scan the RESTRICT edges into `parent` in declaration order; the
    /// first dependent found aborts the delete.
    fn check_restrict_edges(&self, parent: EntityKind, parent_id: i64) -> CatalogResult<()> {
        for edge in edges_into(parent) {
            if edge.on_delete != DeletePolicy::Restrict {
                continue;
            }
            if let Some(key) = self.first_dependent(edge, parent_id) {
                return Err(CatalogError::ReferentialViolation {
                    entity: parent,
                    id: parent_id,
                    dependent: edge.child,
                    dependent_key: key,
                });
            }
        }
        Ok(())
    }

    fn create_artist(&mut self, name: &str) -> CatalogResult<ArtistId> {
        check_non_empty("name", name)?;
        if self.artist_by_name.contains_key(name) {
            return Err(CatalogError::DuplicateKey {
                entity: EntityKind::Artist,
                field: "name",
                value: name.to_string(),
            });
        }
        let id = self.next_id.artist;
        self.next_id.artist += 1;
        self.artists.insert(
            id,
            Artist {
                id,
                name: name.to_string(),
            },
        );
        self.artist_by_name.insert(name.to_string(), id);
        Ok(id)
    }

    fn create_genre(&mut self, name: &str) -> CatalogResult<GenreId> {
        check_non_empty("name", name)?;
        if self.genre_by_name.contains_key(name) {
            return Err(CatalogError::DuplicateKey {
                entity: EntityKind::Genre,
                field: "name",
                value: name.to_string(),
            });
        }
        let id = self.next_id.genre;
        self.next_id.genre += 1;
        self.genres.insert(
            id,
            Genre {
                id,
                name: name.to_string(),
            },
        );
        self.genre_by_name.insert(name.to_string(), id);
        Ok(id)
    }
}

/// In-memory catalog store. Starts empty; state lives and dies with the
/// value.
#[derive(Default)]
pub struct MemoryCatalogStore {
    inner: RwLock<Tables>,
}

impl MemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Tables> {
        self.inner.read().unwrap()
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Tables> {
        self.inner.write().unwrap()
    }
}

impl CatalogStore for MemoryCatalogStore {
    // =========================================================================
    // Artists
    // =========================================================================

    fn create_artist(&self, name: &str) -> CatalogResult<ArtistId> {
        self.write().create_artist(name)
    }

    fn get_or_create_artist(&self, name: &str) -> CatalogResult<ArtistId> {
        check_non_empty("name", name)?;
        let mut t = self.write();
        if let Some(&id) = t.artist_by_name.get(name) {
            return Ok(id);
        }
        t.create_artist(name)
    }

    fn get_artist(&self, id: ArtistId) -> CatalogResult<Option<Artist>> {
        Ok(self.read().artists.get(&id).cloned())
    }

    fn find_artist_by_name(&self, name: &str) -> CatalogResult<Option<Artist>> {
        let t = self.read();
        Ok(t.artist_by_name
            .get(name)
            .and_then(|id| t.artists.get(id))
            .cloned())
    }

    fn artist_exists(&self, id: ArtistId) -> CatalogResult<bool> {
        Ok(self.read().artists.contains_key(&id))
    }

    fn delete_artist(&self, id: ArtistId) -> CatalogResult<()> {
        let mut t = self.write();
        let artist = t
            .artists
            .get(&id)
            .cloned()
            .ok_or_else(|| CatalogError::not_found(EntityKind::Artist, id))?;
        t.check_restrict_edges(EntityKind::Artist, id)?;
        t.artists.remove(&id);
        t.artist_by_name.remove(&artist.name);
        Ok(())
    }

    fn list_artists(&self) -> CatalogResult<Vec<Artist>> {
        Ok(self.read().artists.values().cloned().collect())
    }

    // =========================================================================
    // Genres
    // =========================================================================

    fn create_genre(&self, name: &str) -> CatalogResult<GenreId> {
        self.write().create_genre(name)
    }

    fn get_or_create_genre(&self, name: &str) -> CatalogResult<GenreId> {
        check_non_empty("name", name)?;
        let mut t = self.write();
        if let Some(&id) = t.genre_by_name.get(name) {
            return Ok(id);
        }
        t.create_genre(name)
    }

    fn get_genre(&self, id: GenreId) -> CatalogResult<Option<Genre>> {
        Ok(self.read().genres.get(&id).cloned())
    }

    fn find_genre_by_name(&self, name: &str) -> CatalogResult<Option<Genre>> {
        let t = self.read();
        Ok(t.genre_by_name
            .get(name)
            .and_then(|id| t.genres.get(id))
            .cloned())
    }

    fn genre_exists(&self, id: GenreId) -> CatalogResult<bool> {
        Ok(self.read().genres.contains_key(&id))
    }

    fn delete_genre(&self, id: GenreId) -> CatalogResult<()> {
        let mut t = self.write();
        let genre = t
            .genres
            .get(&id)
            .cloned()
            .ok_or_else(|| CatalogError::not_found(EntityKind::Genre, id))?;
        t.check_restrict_edges(EntityKind::Genre, id)?;
        t.genres.remove(&id);
        t.genre_by_name.remove(&genre.name);
        Ok(())
    }

    fn list_genres(&self) -> CatalogResult<Vec<Genre>> {
        Ok(self.read().genres.values().cloned().collect())
    }

    // =========================================================================
    // Users
    // =========================================================================

    fn create_user(&self, username: &str) -> CatalogResult<UserId> {
        check_non_empty("username", username)?;
        let mut t = self.write();
        if t.user_by_username.contains_key(username) {
            return Err(CatalogError::DuplicateKey {
                entity: EntityKind::User,
                field: "username",
                value: username.to_string(),
            });
        }
        let id = t.next_id.user;
        t.next_id.user += 1;
        t.users.insert(
            id,
            User {
                id,
                username: username.to_string(),
            },
        );
        t.user_by_username.insert(username.to_string(), id);
        Ok(id)
    }

    fn get_user(&self, id: UserId) -> CatalogResult<Option<User>> {
        Ok(self.read().users.get(&id).cloned())
    }

    fn find_user_by_username(&self, username: &str) -> CatalogResult<Option<User>> {
        let t = self.read();
        Ok(t.user_by_username
            .get(username)
            .and_then(|id| t.users.get(id))
            .cloned())
    }

    fn user_exists(&self, id: UserId) -> CatalogResult<bool> {
        Ok(self.read().users.contains_key(&id))
    }

    fn delete_user(&self, id: UserId) -> CatalogResult<()> {
        let mut t = self.write();
        let user = t
            .users
            .get(&id)
            .cloned()
            .ok_or_else(|| CatalogError::not_found(EntityKind::User, id))?;
        t.check_restrict_edges(EntityKind::User, id)?;
        t.users.remove(&id);
        t.user_by_username.remove(&user.username);
        Ok(())
    }

    fn list_users(&self) -> CatalogResult<Vec<User>> {
        Ok(self.read().users.values().cloned().collect())
    }

    // =========================================================================
    // Albums
    // =========================================================================

    fn create_album(&self, album: NewAlbum) -> CatalogResult<AlbumId> {
        let mut t = self.write();
        t.require_artist(album.artist_id)?;
        t.require_genre(album.genre_id)?;
        let key = (album.artist_id, album.title.clone());
        if t.album_by_artist_title.contains_key(&key) {
            return Err(CatalogError::DuplicateKey {
                entity: EntityKind::Album,
                field: "(artist_id, title)",
                value: format!("{}/{}", album.artist_id, album.title),
            });
        }
        let id = t.next_id.album;
        t.next_id.album += 1;
        t.albums.insert(
            id,
            Album {
                id,
                title: album.title,
                release_date: album.release_date,
                artist_id: album.artist_id,
                genre_id: album.genre_id,
            },
        );
        t.album_by_artist_title.insert(key, id);
        Ok(id)
    }

    fn get_album(&self, id: AlbumId) -> CatalogResult<Option<Album>> {
        Ok(self.read().albums.get(&id).cloned())
    }

    fn find_album_by_artist_and_title(
        &self,
        artist_id: ArtistId,
        title: &str,
    ) -> CatalogResult<Option<Album>> {
        let t = self.read();
        Ok(t.album_by_artist_title
            .get(&(artist_id, title.to_string()))
            .and_then(|id| t.albums.get(id))
            .cloned())
    }

    fn album_exists(&self, id: AlbumId) -> CatalogResult<bool> {
        Ok(self.read().albums.contains_key(&id))
    }

    fn update_album(&self, id: AlbumId, patch: AlbumPatch) -> CatalogResult<()> {
        let mut t = self.write();
        let existing = t
            .albums
            .get(&id)
            .cloned()
            .ok_or_else(|| CatalogError::not_found(EntityKind::Album, id))?;

        if let Some(artist_id) = patch.artist_id {
            t.require_artist(artist_id)?;
        }
        if let Some(genre_id) = patch.genre_id {
            t.require_genre(genre_id)?;
        }

        let new_artist = patch.artist_id.unwrap_or(existing.artist_id);
        let new_title = patch.title.clone().unwrap_or_else(|| existing.title.clone());
        if (new_artist, new_title.as_str()) != (existing.artist_id, existing.title.as_str())
            && t.album_by_artist_title
                .contains_key(&(new_artist, new_title.clone()))
        {
            return Err(CatalogError::DuplicateKey {
                entity: EntityKind::Album,
                field: "(artist_id, title)",
                value: format!("{}/{}", new_artist, new_title),
            });
        }

        t.album_by_artist_title
            .remove(&(existing.artist_id, existing.title.clone()));
        t.album_by_artist_title
            .insert((new_artist, new_title.clone()), id);
        if let Some(album) = t.albums.get_mut(&id) {
            album.title = new_title;
            album.release_date = patch.release_date.unwrap_or(existing.release_date);
            album.artist_id = new_artist;
            album.genre_id = patch.genre_id.unwrap_or(existing.genre_id);
        }
        Ok(())
    }

    fn delete_album(&self, id: AlbumId) -> CatalogResult<()> {
        let mut t = self.write();
        let album = t
            .albums
            .get(&id)
            .cloned()
            .ok_or_else(|| CatalogError::not_found(EntityKind::Album, id))?;
        t.check_restrict_edges(EntityKind::Album, id)?;
        t.albums.remove(&id);
        t.album_by_artist_title
            .remove(&(album.artist_id, album.title));
        Ok(())
    }

    fn list_albums(&self) -> CatalogResult<Vec<Album>> {
        Ok(self.read().albums.values().cloned().collect())
    }

    fn songs_for_album(&self, album_id: AlbumId) -> CatalogResult<Vec<Song>> {
        Ok(self
            .read()
            .songs
            .values()
            .filter(|s| s.album_id == Some(album_id))
            .cloned()
            .collect())
    }

    // =========================================================================
    // Songs
    // =========================================================================

    fn create_song(&self, song: NewSong) -> CatalogResult<SongId> {
        let mut t = self.write();
        t.require_artist(song.artist_id)?;
        if let Some(album_id) = song.album_id {
            // The album may belong to a different artist; the schema keeps
            // the two foreign keys independent.
            t.require_album(album_id)?;
        }
        let key = (song.artist_id, song.title.clone());
        if t.song_by_artist_title.contains_key(&key) {
            return Err(CatalogError::DuplicateKey {
                entity: EntityKind::Song,
                field: "(artist_id, title)",
                value: format!("{}/{}", song.artist_id, song.title),
            });
        }
        let id = t.next_id.song;
        t.next_id.song += 1;
        t.songs.insert(
            id,
            Song {
                id,
                title: song.title,
                release_date: song.release_date,
                artist_id: song.artist_id,
                album_id: song.album_id,
            },
        );
        t.song_by_artist_title.insert(key, id);
        Ok(id)
    }

    fn get_song(&self, id: SongId) -> CatalogResult<Option<Song>> {
        Ok(self.read().songs.get(&id).cloned())
    }

    fn find_song_by_artist_and_title(
        &self,
        artist_id: ArtistId,
        title: &str,
    ) -> CatalogResult<Option<Song>> {
        let t = self.read();
        Ok(t.song_by_artist_title
            .get(&(artist_id, title.to_string()))
            .and_then(|id| t.songs.get(id))
            .cloned())
    }

    fn song_exists(&self, id: SongId) -> CatalogResult<bool> {
        Ok(self.read().songs.contains_key(&id))
    }

    fn update_song(&self, id: SongId, patch: SongPatch) -> CatalogResult<()> {
        let mut t = self.write();
        let existing = t
            .songs
            .get(&id)
            .cloned()
            .ok_or_else(|| CatalogError::not_found(EntityKind::Song, id))?;

        if let Some(artist_id) = patch.artist_id {
            t.require_artist(artist_id)?;
        }
        if let Some(Some(album_id)) = patch.album_id {
            t.require_album(album_id)?;
        }

        let new_artist = patch.artist_id.unwrap_or(existing.artist_id);
        let new_title = patch.title.clone().unwrap_or_else(|| existing.title.clone());
        if (new_artist, new_title.as_str()) != (existing.artist_id, existing.title.as_str())
            && t.song_by_artist_title
                .contains_key(&(new_artist, new_title.clone()))
        {
            return Err(CatalogError::DuplicateKey {
                entity: EntityKind::Song,
                field: "(artist_id, title)",
                value: format!("{}/{}", new_artist, new_title),
            });
        }

        t.song_by_artist_title
            .remove(&(existing.artist_id, existing.title.clone()));
        t.song_by_artist_title
            .insert((new_artist, new_title.clone()), id);
        if let Some(song) = t.songs.get_mut(&id) {
            song.title = new_title;
            song.release_date = patch.release_date.unwrap_or(existing.release_date);
            song.artist_id = new_artist;
            song.album_id = match patch.album_id {
                Some(album_id) => album_id,
                None => existing.album_id,
            };
        }
        Ok(())
    }

    fn delete_song(&self, id: SongId) -> CatalogResult<()> {
        let mut t = self.write();
        let song = t
            .songs
            .get(&id)
            .cloned()
            .ok_or_else(|| CatalogError::not_found(EntityKind::Song, id))?;
        t.check_restrict_edges(EntityKind::Song, id)?;

        // Cascade: the song's genre tags go with it, in the same critical
        // section as the song row itself.
        let tags: Vec<(SongId, GenreId)> = t
            .song_genres
            .iter()
            .filter(|(song_id, _)| *song_id == id)
            .copied()
            .collect();
        for tag in tags {
            t.song_genres.remove(&tag);
        }
        t.songs.remove(&id);
        t.song_by_artist_title
            .remove(&(song.artist_id, song.title));
        Ok(())
    }

    fn list_songs(&self) -> CatalogResult<Vec<Song>> {
        Ok(self.read().songs.values().cloned().collect())
    }

    // =========================================================================
    // Ratings
    // =========================================================================

    fn insert_rating(&self, rating: NewRating) -> CatalogResult<()> {
        let mut t = self.write();
        t.require_user(rating.user_id)?;
        t.require_song(rating.song_id)?;
        check_rating_range(rating.rating)?;
        let key = (rating.user_id, rating.song_id);
        if t.ratings.contains_key(&key) {
            return Err(CatalogError::DuplicateKey {
                entity: EntityKind::Rating,
                field: "(user_id, song_id)",
                value: format!("{}/{}", rating.user_id, rating.song_id),
            });
        }
        t.ratings.insert(
            key,
            Rating {
                user_id: rating.user_id,
                song_id: rating.song_id,
                rating: rating.rating,
                rating_date: rating.rating_date,
            },
        );
        Ok(())
    }

    fn upsert_rating(&self, rating: NewRating) -> CatalogResult<()> {
        let mut t = self.write();
        t.require_user(rating.user_id)?;
        t.require_song(rating.song_id)?;
        check_rating_range(rating.rating)?;
        t.ratings.insert(
            (rating.user_id, rating.song_id),
            Rating {
                user_id: rating.user_id,
                song_id: rating.song_id,
                rating: rating.rating,
                rating_date: rating.rating_date,
            },
        );
        Ok(())
    }

    fn get_rating(&self, user_id: UserId, song_id: SongId) -> CatalogResult<Option<Rating>> {
        Ok(self.read().ratings.get(&(user_id, song_id)).cloned())
    }

    fn delete_rating(&self, user_id: UserId, song_id: SongId) -> CatalogResult<()> {
        let mut t = self.write();
        t.ratings.remove(&(user_id, song_id)).ok_or_else(|| {
            CatalogError::not_found(EntityKind::Rating, format!("{}/{}", user_id, song_id))
        })?;
        Ok(())
    }

    fn ratings_for_song(&self, song_id: SongId) -> CatalogResult<Vec<Rating>> {
        Ok(self
            .read()
            .ratings
            .values()
            .filter(|r| r.song_id == song_id)
            .cloned()
            .collect())
    }

    fn list_ratings(&self) -> CatalogResult<Vec<Rating>> {
        Ok(self.read().ratings.values().cloned().collect())
    }

    // =========================================================================
    // Song/genre tags
    // =========================================================================

    fn add_song_genre(&self, song_id: SongId, genre_id: GenreId) -> CatalogResult<()> {
        let mut t = self.write();
        t.require_song(song_id)?;
        t.require_genre(genre_id)?;
        t.song_genres.insert((song_id, genre_id));
        Ok(())
    }

    fn remove_song_genre(&self, song_id: SongId, genre_id: GenreId) -> CatalogResult<()> {
        self.write().song_genres.remove(&(song_id, genre_id));
        Ok(())
    }

    fn remove_genres_for_song(&self, song_id: SongId) -> CatalogResult<()> {
        self.write().song_genres.retain(|(s, _)| *s != song_id);
        Ok(())
    }

    fn genres_for_song(&self, song_id: SongId) -> CatalogResult<Vec<GenreId>> {
        Ok(self
            .read()
            .song_genres
            .iter()
            .filter(|(s, _)| *s == song_id)
            .map(|(_, g)| *g)
            .collect())
    }

    fn songs_with_genre(&self, genre_id: GenreId) -> CatalogResult<Vec<SongId>> {
        Ok(self
            .read()
            .song_genres
            .iter()
            .filter(|(_, g)| *g == genre_id)
            .map(|(s, _)| *s)
            .collect())
    }

    fn list_song_genres(&self) -> CatalogResult<Vec<(SongId, GenreId)>> {
        Ok(self.read().song_genres.iter().copied().collect())
    }

    // =========================================================================
    // Analytics
    // =========================================================================

    fn most_prolific_artists(
        &self,
        n: usize,
        year_range: (i32, i32),
    ) -> CatalogResult<Vec<(String, i64)>> {
        let t = self.read();
        let (start, end) = year_range;
        let mut counts: BTreeMap<ArtistId, i64> = BTreeMap::new();
        for song in t.songs.values() {
            if song.is_single() && (start..=end).contains(&song.release_date.year()) {
                *counts.entry(song.artist_id).or_default() += 1;
            }
        }
        let mut rows: Vec<(String, i64)> = counts
            .into_iter()
            .filter_map(|(artist_id, count)| {
                t.artists.get(&artist_id).map(|a| (a.name.clone(), count))
            })
            .collect();
        rows.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        rows.truncate(n);
        Ok(rows)
    }

    fn artists_with_last_single_in(&self, year: i32) -> CatalogResult<BTreeSet<String>> {
        let t = self.read();
        let mut last_single: BTreeMap<ArtistId, NaiveDate> = BTreeMap::new();
        for song in t.songs.values() {
            if song.is_single() {
                let entry = last_single
                    .entry(song.artist_id)
                    .or_insert(song.release_date);
                if song.release_date > *entry {
                    *entry = song.release_date;
                }
            }
        }
        Ok(last_single
            .into_iter()
            .filter(|(_, date)| date.year() == year)
            .filter_map(|(artist_id, _)| t.artists.get(&artist_id).map(|a| a.name.clone()))
            .collect())
    }

    fn top_song_genres(&self, n: usize) -> CatalogResult<Vec<(String, i64)>> {
        let t = self.read();
        let mut counts: BTreeMap<GenreId, i64> = BTreeMap::new();
        for (_, genre_id) in t.song_genres.iter() {
            *counts.entry(*genre_id).or_default() += 1;
        }
        let mut rows: Vec<(String, i64)> = counts
            .into_iter()
            .filter_map(|(genre_id, count)| {
                t.genres.get(&genre_id).map(|g| (g.name.clone(), count))
            })
            .collect();
        rows.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        rows.truncate(n);
        Ok(rows)
    }

    fn artists_with_albums_and_singles(&self) -> CatalogResult<BTreeSet<String>> {
        let t = self.read();
        let with_albums: BTreeSet<ArtistId> = t.albums.values().map(|a| a.artist_id).collect();
        let with_singles: BTreeSet<ArtistId> = t
            .songs
            .values()
            .filter(|s| s.is_single())
            .map(|s| s.artist_id)
            .collect();
        Ok(with_albums
            .intersection(&with_singles)
            .filter_map(|artist_id| t.artists.get(artist_id).map(|a| a.name.clone()))
            .collect())
    }

    fn most_rated_songs(
        &self,
        year_range: (i32, i32),
        n: usize,
    ) -> CatalogResult<Vec<(String, String, i64)>> {
        let t = self.read();
        let (start, end) = year_range;
        let mut counts: BTreeMap<SongId, i64> = BTreeMap::new();
        for rating in t.ratings.values() {
            if (start..=end).contains(&rating.rating_date.year()) {
                *counts.entry(rating.song_id).or_default() += 1;
            }
        }
        let mut rows: Vec<(String, String, i64)> = counts
            .into_iter()
            .filter_map(|(song_id, count)| {
                let song = t.songs.get(&song_id)?;
                let artist = t.artists.get(&song.artist_id)?;
                Some((song.title.clone(), artist.name.clone(), count))
            })
            .collect();
        rows.sort_by(|a, b| b.2.cmp(&a.2).then_with(|| a.0.cmp(&b.0)));
        rows.truncate(n);
        Ok(rows)
    }

    fn most_engaged_users(
        &self,
        year_range: (i32, i32),
        n: usize,
    ) -> CatalogResult<Vec<(String, i64)>> {
        let t = self.read();
        let (start, end) = year_range;
        let mut counts: BTreeMap<UserId, i64> = BTreeMap::new();
        for rating in t.ratings.values() {
            if (start..=end).contains(&rating.rating_date.year()) {
                *counts.entry(rating.user_id).or_default() += 1;
            }
        }
        let mut rows: Vec<(String, i64)> = counts
            .into_iter()
            .filter_map(|(user_id, count)| {
                t.users.get(&user_id).map(|u| (u.username.clone(), count))
            })
            .collect();
        rows.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        rows.truncate(n);
        Ok(rows)
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    fn counts(&self) -> CatalogResult<CatalogCounts> {
        let t = self.read();
        Ok(CatalogCounts {
            artists: t.artists.len(),
            genres: t.genres.len(),
            albums: t.albums.len(),
            songs: t.songs.len(),
            users: t.users.len(),
            ratings: t.ratings.len(),
            song_genres: t.song_genres.len(),
        })
    }

    fn clear(&self) -> CatalogResult<()> {
        let mut t = self.write();
        // children before parents, matching the relational backend
        t.ratings.clear();
        t.song_genres.clear();
        t.songs.clear();
        t.albums.clear();
        t.users.clear();
        t.genres.clear();
        t.artists.clear();
        t.artist_by_name.clear();
        t.genre_by_name.clear();
        t.user_by_username.clear();
        t.album_by_artist_title.clear();
        t.song_by_artist_title.clear();
        Ok(())
    }
}
