//! SQLite-backed catalog store.
//!
//! One mutex-guarded write connection serializes all mutations; every
//! mutating method runs its constraint checks and its writes inside a
//! single transaction, so a failed check rolls back without a trace. Reads
//! go through a round-robin pool of read-only WAL connections and observe
//! committed state only.
//!
//! The declared schema (see [`super::schema`]) carries the same uniqueness
//! and foreign-key constraints, so the database itself backstops the
//! application-level checks; the checks exist to turn violations into the
//! typed [`CatalogError`] taxonomy instead of raw SQLite errors.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;

use super::error::{CatalogError, CatalogResult};
use super::models::{
    Album, AlbumId, AlbumPatch, Artist, ArtistId, CatalogCounts, EntityKind, Genre, GenreId,
    NewAlbum, NewRating, NewSong, Rating, Song, SongId, SongPatch, User, UserId,
};
use super::relationships::{edges_into, DeletePolicy, RelationshipDef};
use super::schema::CATALOG_VERSIONED_SCHEMAS;
use super::trait_def::CatalogStore;
use super::validation::{check_non_empty, check_rating_range};

/// SQLite-backed catalog store.
#[derive(Clone)]
pub struct SqliteCatalogStore {
    write_conn: Arc<Mutex<Connection>>,
    read_pool: Vec<Arc<Mutex<Connection>>>,
    read_index: Arc<AtomicUsize>,
}

fn ensure_schema(conn: &Connection) -> Result<()> {
    let table_count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
            [],
            |r| r.get(0),
        )
        .unwrap_or(0);

    let schema = &CATALOG_VERSIONED_SCHEMAS[CATALOG_VERSIONED_SCHEMAS.len() - 1];
    if table_count == 0 {
        info!("Creating catalog db schema at version {}", schema.version);
        schema.create(conn)?;
        return Ok(());
    }

    schema
        .validate(conn)
        .context("catalog database does not match the declared schema")
}

impl SqliteCatalogStore {
    /// Open (or create) a catalog database.
    ///
    /// # Arguments
    /// * `db_path` - Path to the SQLite database file
    /// * `read_pool_size` - Number of connections for concurrent reads
    pub fn open<P: AsRef<Path>>(db_path: P, read_pool_size: usize) -> Result<Self> {
        let db_path = db_path.as_ref();

        let write_conn = Connection::open_with_flags(
            db_path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI
                | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .context("Failed to open catalog database")?;

        ensure_schema(&write_conn)?;

        write_conn.pragma_update(None, "journal_mode", "WAL")?;
        write_conn.pragma_update(None, "foreign_keys", "ON")?;

        let mut read_pool = Vec::with_capacity(read_pool_size.max(1));
        for _ in 0..read_pool_size.max(1) {
            let read_conn = Connection::open_with_flags(
                db_path,
                rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY
                    | rusqlite::OpenFlags::SQLITE_OPEN_URI
                    | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?;
            read_pool.push(Arc::new(Mutex::new(read_conn)));
        }

        Ok(SqliteCatalogStore {
            write_conn: Arc::new(Mutex::new(write_conn)),
            read_pool,
            read_index: Arc::new(AtomicUsize::new(0)),
        })
    }

    fn read_conn(&self) -> Arc<Mutex<Connection>> {
        let index = self.read_index.fetch_add(1, Ordering::SeqCst) % self.read_pool.len();
        self.read_pool[index].clone()
    }

    /// Run `f` inside a transaction on the write connection. Any error
    /// rolls the transaction back.
    fn with_write_tx<T>(
        &self,
        f: impl FnOnce(&rusqlite::Transaction) -> CatalogResult<T>,
    ) -> CatalogResult<T> {
        let mut conn = self.write_conn.lock().unwrap();
        let tx = conn.transaction()?;
        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }

    // =========================================================================
    // Internal helpers
    // =========================================================================

    fn id_exists(conn: &Connection, kind: EntityKind, id: i64) -> CatalogResult<bool> {
        let sql = format!("SELECT 1 FROM {} WHERE id = ?1", kind.table_name());
        let found = conn
            .query_row(&sql, params![id], |r| r.get::<_, i32>(0))
            .optional()?;
        Ok(found.is_some())
    }

    fn require_row(conn: &Connection, kind: EntityKind, id: i64) -> CatalogResult<()> {
        if Self::id_exists(conn, kind, id)? {
            Ok(())
        } else {
            Err(CatalogError::ForeignKeyViolation { entity: kind, id })
        }
    }

    /// First dependent row referencing `parent_id` through `edge`, as a
    /// display key, in ascending key order for deterministic messages.
    fn first_dependent(
        conn: &Connection,
        edge: &RelationshipDef,
        parent_id: i64,
    ) -> CatalogResult<Option<String>> {
        let sql = match (edge.child, edge.child_field) {
            (EntityKind::Album, "artist_id") => {
                "SELECT CAST(id AS TEXT) FROM albums WHERE artist_id = ?1 ORDER BY id LIMIT 1"
            }
            (EntityKind::Album, "genre_id") => {
                "SELECT CAST(id AS TEXT) FROM albums WHERE genre_id = ?1 ORDER BY id LIMIT 1"
            }
            (EntityKind::Song, "artist_id") => {
                "SELECT CAST(id AS TEXT) FROM songs WHERE artist_id = ?1 ORDER BY id LIMIT 1"
            }
            (EntityKind::Song, "album_id") => {
                "SELECT CAST(id AS TEXT) FROM songs WHERE album_id = ?1 ORDER BY id LIMIT 1"
            }
            (EntityKind::Rating, "user_id") => {
                "SELECT user_id || '/' || song_id FROM ratings WHERE user_id = ?1 \
                 ORDER BY user_id, song_id LIMIT 1"
            }
            (EntityKind::Rating, "song_id") => {
                "SELECT user_id || '/' || song_id FROM ratings WHERE song_id = ?1 \
                 ORDER BY user_id, song_id LIMIT 1"
            }
            (EntityKind::SongGenre, "song_id") => {
                "SELECT song_id || '/' || genre_id FROM song_genres WHERE song_id = ?1 \
                 ORDER BY song_id, genre_id LIMIT 1"
            }
            (EntityKind::SongGenre, "genre_id") => {
                "SELECT song_id || '/' || genre_id FROM song_genres WHERE genre_id = ?1 \
                 ORDER BY song_id, genre_id LIMIT 1"
            }
            _ => return Ok(None),
        };
        Ok(conn
            .query_row(sql, params![parent_id], |r| r.get::<_, String>(0))
            .optional()?)
    }

    /// Scan the RESTRICT edges into `parent` in declaration order; the
    /// first dependent found aborts the delete.
    fn check_restrict_edges(
        conn: &Connection,
        parent: EntityKind,
        parent_id: i64,
    ) -> CatalogResult<()> {
        for edge in edges_into(parent) {
            if edge.on_delete != DeletePolicy::Restrict {
                continue;
            }
            if let Some(key) = Self::first_dependent(conn, edge, parent_id)? {
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

    /// Shared delete path for the id-keyed entities: existence check,
    /// RESTRICT scan, CASCADE of song/genre tags for songs, then the row.
    fn delete_parent_row(&self, kind: EntityKind, id: i64) -> CatalogResult<()> {
        self.with_write_tx(|tx| {
            if !Self::id_exists(tx, kind, id)? {
                return Err(CatalogError::not_found(kind, id));
            }
            Self::check_restrict_edges(tx, kind, id)?;
            if kind == EntityKind::Song {
                // cascade, in the same transaction as the song row
                tx.execute("DELETE FROM song_genres WHERE song_id = ?1", params![id])?;
            }
            tx.execute(
                &format!("DELETE FROM {} WHERE id = ?1", kind.table_name()),
                params![id],
            )?;
            Ok(())
        })
    }

    fn create_registry_row(
        &self,
        kind: EntityKind,
        field: &'static str,
        value: &str,
        get_or_create: bool,
    ) -> CatalogResult<i64> {
        check_non_empty(field, value)?;
        self.with_write_tx(|tx| {
            let existing: Option<i64> = tx
                .query_row(
                    &format!(
                        "SELECT id FROM {} WHERE {} = ?1",
                        kind.table_name(),
                        field
                    ),
                    params![value],
                    |r| r.get(0),
                )
                .optional()?;
            if let Some(id) = existing {
                if get_or_create {
                    return Ok(id);
                }
                return Err(CatalogError::DuplicateKey {
                    entity: kind,
                    field,
                    value: value.to_string(),
                });
            }
            tx.execute(
                &format!("INSERT INTO {} ({}) VALUES (?1)", kind.table_name(), field),
                params![value],
            )?;
            Ok(tx.last_insert_rowid())
        })
    }

    fn row_to_album(row: &rusqlite::Row) -> rusqlite::Result<Album> {
        Ok(Album {
            id: row.get(0)?,
            title: row.get(1)?,
            release_date: row.get(2)?,
            artist_id: row.get(3)?,
            genre_id: row.get(4)?,
        })
    }

    fn row_to_song(row: &rusqlite::Row) -> rusqlite::Result<Song> {
        Ok(Song {
            id: row.get(0)?,
            title: row.get(1)?,
            release_date: row.get(2)?,
            artist_id: row.get(3)?,
            album_id: row.get(4)?,
        })
    }

    fn row_to_rating(row: &rusqlite::Row) -> rusqlite::Result<Rating> {
        Ok(Rating {
            user_id: row.get(0)?,
            song_id: row.get(1)?,
            rating: row.get(2)?,
            rating_date: row.get(3)?,
        })
    }

    fn count_table(conn: &Connection, table: &str) -> CatalogResult<usize> {
        let count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| {
            r.get(0)
        })?;
        Ok(count as usize)
    }
}

const SELECT_ALBUM: &str = "SELECT id, title, release_date, artist_id, genre_id FROM albums";
const SELECT_SONG: &str = "SELECT id, title, release_date, artist_id, album_id FROM songs";
const SELECT_RATING: &str = "SELECT user_id, song_id, rating, rating_date FROM ratings";

impl CatalogStore for SqliteCatalogStore {
    // =========================================================================
    // Artists
    // =========================================================================

    fn create_artist(&self, name: &str) -> CatalogResult<ArtistId> {
        self.create_registry_row(EntityKind::Artist, "name", name, false)
    }

    fn get_or_create_artist(&self, name: &str) -> CatalogResult<ArtistId> {
        self.create_registry_row(EntityKind::Artist, "name", name, true)
    }

    fn get_artist(&self, id: ArtistId) -> CatalogResult<Option<Artist>> {
        let conn = self.read_conn();
        let conn = conn.lock().unwrap();
        Ok(conn
            .query_row(
                "SELECT id, name FROM artists WHERE id = ?1",
                params![id],
                |r| {
                    Ok(Artist {
                        id: r.get(0)?,
                        name: r.get(1)?,
                    })
                },
            )
            .optional()?)
    }

    fn find_artist_by_name(&self, name: &str) -> CatalogResult<Option<Artist>> {
        let conn = self.read_conn();
        let conn = conn.lock().unwrap();
        Ok(conn
            .query_row(
                "SELECT id, name FROM artists WHERE name = ?1",
                params![name],
                |r| {
                    Ok(Artist {
                        id: r.get(0)?,
                        name: r.get(1)?,
                    })
                },
            )
            .optional()?)
    }

    fn artist_exists(&self, id: ArtistId) -> CatalogResult<bool> {
        let conn = self.read_conn();
        let conn = conn.lock().unwrap();
        Self::id_exists(&conn, EntityKind::Artist, id)
    }

    fn delete_artist(&self, id: ArtistId) -> CatalogResult<()> {
        self.delete_parent_row(EntityKind::Artist, id)
    }

    fn list_artists(&self) -> CatalogResult<Vec<Artist>> {
        let conn = self.read_conn();
        let conn = conn.lock().unwrap();
        let mut stmt = conn.prepare_cached("SELECT id, name FROM artists ORDER BY id")?;
        let artists = stmt
            .query_map([], |r| {
                Ok(Artist {
                    id: r.get(0)?,
                    name: r.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(artists)
    }

    // =========================================================================
    // Genres
    // =========================================================================

    fn create_genre(&self, name: &str) -> CatalogResult<GenreId> {
        self.create_registry_row(EntityKind::Genre, "name", name, false)
    }

    fn get_or_create_genre(&self, name: &str) -> CatalogResult<GenreId> {
        self.create_registry_row(EntityKind::Genre, "name", name, true)
    }

    fn get_genre(&self, id: GenreId) -> CatalogResult<Option<Genre>> {
        let conn = self.read_conn();
        let conn = conn.lock().unwrap();
        Ok(conn
            .query_row(
                "SELECT id, name FROM genres WHERE id = ?1",
                params![id],
                |r| {
                    Ok(Genre {
                        id: r.get(0)?,
                        name: r.get(1)?,
                    })
                },
            )
            .optional()?)
    }

    fn find_genre_by_name(&self, name: &str) -> CatalogResult<Option<Genre>> {
        let conn = self.read_conn();
        let conn = conn.lock().unwrap();
        Ok(conn
            .query_row(
                "SELECT id, name FROM genres WHERE name = ?1",
                params![name],
                |r| {
                    Ok(Genre {
                        id: r.get(0)?,
                        name: r.get(1)?,
                    })
                },
            )
            .optional()?)
    }

    fn genre_exists(&self, id: GenreId) -> CatalogResult<bool> {
        let conn = self.read_conn();
        let conn = conn.lock().unwrap();
        Self::id_exists(&conn, EntityKind::Genre, id)
    }

    fn delete_genre(&self, id: GenreId) -> CatalogResult<()> {
        self.delete_parent_row(EntityKind::Genre, id)
    }

    fn list_genres(&self) -> CatalogResult<Vec<Genre>> {
        let conn = self.read_conn();
        let conn = conn.lock().unwrap();
        let mut stmt = conn.prepare_cached("SELECT id, name FROM genres ORDER BY id")?;
        let genres = stmt
            .query_map([], |r| {
                Ok(Genre {
                    id: r.get(0)?,
                    name: r.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(genres)
    }

    // =========================================================================
    // Users
    // =========================================================================

    fn create_user(&self, username: &str) -> CatalogResult<UserId> {
        self.create_registry_row(EntityKind::User, "username", username, false)
    }

    fn get_user(&self, id: UserId) -> CatalogResult<Option<User>> {
        let conn = self.read_conn();
        let conn = conn.lock().unwrap();
        Ok(conn
            .query_row(
                "SELECT id, username FROM users WHERE id = ?1",
                params![id],
                |r| {
                    Ok(User {
                        id: r.get(0)?,
                        username: r.get(1)?,
                    })
                },
            )
            .optional()?)
    }

    fn find_user_by_username(&self, username: &str) -> CatalogResult<Option<User>> {
        let conn = self.read_conn();
        let conn = conn.lock().unwrap();
        Ok(conn
            .query_row(
                "SELECT id, username FROM users WHERE username = ?1",
                params![username],
                |r| {
                    Ok(User {
                        id: r.get(0)?,
                        username: r.get(1)?,
                    })
                },
            )
            .optional()?)
    }

    fn user_exists(&self, id: UserId) -> CatalogResult<bool> {
        let conn = self.read_conn();
        let conn = conn.lock().unwrap();
        Self::id_exists(&conn, EntityKind::User, id)
    }

    fn delete_user(&self, id: UserId) -> CatalogResult<()> {
        self.delete_parent_row(EntityKind::User, id)
    }

    fn list_users(&self) -> CatalogResult<Vec<User>> {
        let conn = self.read_conn();
        let conn = conn.lock().unwrap();
        let mut stmt = conn.prepare_cached("SELECT id, username FROM users ORDER BY id")?;
        let users = stmt
            .query_map([], |r| {
                Ok(User {
                    id: r.get(0)?,
                    username: r.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(users)
    }

    // =========================================================================
    // Albums
    // =========================================================================

    fn create_album(&self, album: NewAlbum) -> CatalogResult<AlbumId> {
        self.with_write_tx(|tx| {
            Self::require_row(tx, EntityKind::Artist, album.artist_id)?;
            Self::require_row(tx, EntityKind::Genre, album.genre_id)?;
            let duplicate: Option<i64> = tx
                .query_row(
                    "SELECT id FROM albums WHERE artist_id = ?1 AND title = ?2",
                    params![album.artist_id, album.title],
                    |r| r.get(0),
                )
                .optional()?;
            if duplicate.is_some() {
                return Err(CatalogError::DuplicateKey {
                    entity: EntityKind::Album,
                    field: "(artist_id, title)",
                    value: format!("{}/{}", album.artist_id, album.title),
                });
            }
            tx.execute(
                "INSERT INTO albums (title, release_date, artist_id, genre_id)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    album.title,
                    album.release_date,
                    album.artist_id,
                    album.genre_id
                ],
            )?;
            Ok(tx.last_insert_rowid())
        })
    }

    fn get_album(&self, id: AlbumId) -> CatalogResult<Option<Album>> {
        let conn = self.read_conn();
        let conn = conn.lock().unwrap();
        Ok(conn
            .query_row(
                &format!("{} WHERE id = ?1", SELECT_ALBUM),
                params![id],
                Self::row_to_album,
            )
            .optional()?)
    }

    fn find_album_by_artist_and_title(
        &self,
        artist_id: ArtistId,
        title: &str,
    ) -> CatalogResult<Option<Album>> {
        let conn = self.read_conn();
        let conn = conn.lock().unwrap();
        Ok(conn
            .query_row(
                &format!("{} WHERE artist_id = ?1 AND title = ?2", SELECT_ALBUM),
                params![artist_id, title],
                Self::row_to_album,
            )
            .optional()?)
    }

    fn album_exists(&self, id: AlbumId) -> CatalogResult<bool> {
        let conn = self.read_conn();
        let conn = conn.lock().unwrap();
        Self::id_exists(&conn, EntityKind::Album, id)
    }

    fn update_album(&self, id: AlbumId, patch: AlbumPatch) -> CatalogResult<()> {
        self.with_write_tx(|tx| {
            let existing = tx
                .query_row(
                    &format!("{} WHERE id = ?1", SELECT_ALBUM),
                    params![id],
                    Self::row_to_album,
                )
                .optional()?
                .ok_or_else(|| CatalogError::not_found(EntityKind::Album, id))?;

            if let Some(artist_id) = patch.artist_id {
                Self::require_row(tx, EntityKind::Artist, artist_id)?;
            }
            if let Some(genre_id) = patch.genre_id {
                Self::require_row(tx, EntityKind::Genre, genre_id)?;
            }

            let new_artist = patch.artist_id.unwrap_or(existing.artist_id);
            let new_title = patch.title.unwrap_or_else(|| existing.title.clone());
            if (new_artist, new_title.as_str()) != (existing.artist_id, existing.title.as_str()) {
                let duplicate: Option<i64> = tx
                    .query_row(
                        "SELECT id FROM albums WHERE artist_id = ?1 AND title = ?2 AND id <> ?3",
                        params![new_artist, new_title, id],
                        |r| r.get(0),
                    )
                    .optional()?;
                if duplicate.is_some() {
                    return Err(CatalogError::DuplicateKey {
                        entity: EntityKind::Album,
                        field: "(artist_id, title)",
                        value: format!("{}/{}", new_artist, new_title),
                    });
                }
            }

            tx.execute(
                "UPDATE albums SET title = ?1, release_date = ?2, artist_id = ?3, genre_id = ?4
                 WHERE id = ?5",
                params![
                    new_title,
                    patch.release_date.unwrap_or(existing.release_date),
                    new_artist,
                    patch.genre_id.unwrap_or(existing.genre_id),
                    id
                ],
            )?;
            Ok(())
        })
    }

    fn delete_album(&self, id: AlbumId) -> CatalogResult<()> {
        self.delete_parent_row(EntityKind::Album, id)
    }

    fn list_albums(&self) -> CatalogResult<Vec<Album>> {
        let conn = self.read_conn();
        let conn = conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(&format!("{} ORDER BY id", SELECT_ALBUM))?;
        let albums = stmt
            .query_map([], Self::row_to_album)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(albums)
    }

    fn songs_for_album(&self, album_id: AlbumId) -> CatalogResult<Vec<Song>> {
        let conn = self.read_conn();
        let conn = conn.lock().unwrap();
        let mut stmt =
            conn.prepare_cached(&format!("{} WHERE album_id = ?1 ORDER BY id", SELECT_SONG))?;
        let songs = stmt
            .query_map(params![album_id], Self::row_to_song)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(songs)
    }

    // =========================================================================
    // Songs
    // =========================================================================

    fn create_song(&self, song: NewSong) -> CatalogResult<SongId> {
        self.with_write_tx(|tx| {
            Self::require_row(tx, EntityKind::Artist, song.artist_id)?;
            if let Some(album_id) = song.album_id {
                // The album may belong to a different artist; the two
                // foreign keys are independent.
                Self::require_row(tx, EntityKind::Album, album_id)?;
            }
            let duplicate: Option<i64> = tx
                .query_row(
                    "SELECT id FROM songs WHERE artist_id = ?1 AND title = ?2",
                    params![song.artist_id, song.title],
                    |r| r.get(0),
                )
                .optional()?;
            if duplicate.is_some() {
                return Err(CatalogError::DuplicateKey {
                    entity: EntityKind::Song,
                    field: "(artist_id, title)",
                    value: format!("{}/{}", song.artist_id, song.title),
                });
            }
            tx.execute(
                "INSERT INTO songs (title, release_date, artist_id, album_id)
                 VALUES (?1, ?2, ?3, ?4)",
                params![song.title, song.release_date, song.artist_id, song.album_id],
            )?;
            Ok(tx.last_insert_rowid())
        })
    }

    fn get_song(&self, id: SongId) -> CatalogResult<Option<Song>> {
        let conn = self.read_conn();
        let conn = conn.lock().unwrap();
        Ok(conn
            .query_row(
                &format!("{} WHERE id = ?1", SELECT_SONG),
                params![id],
                Self::row_to_song,
            )
            .optional()?)
    }

    fn find_song_by_artist_and_title(
        &self,
        artist_id: ArtistId,
        title: &str,
    ) -> CatalogResult<Option<Song>> {
        let conn = self.read_conn();
        let conn = conn.lock().unwrap();
        Ok(conn
            .query_row(
                &format!("{} WHERE artist_id = ?1 AND title = ?2", SELECT_SONG),
                params![artist_id, title],
                Self::row_to_song,
            )
            .optional()?)
    }

    fn song_exists(&self, id: SongId) -> CatalogResult<bool> {
        let conn = self.read_conn();
        let conn = conn.lock().unwrap();
        Self::id_exists(&conn, EntityKind::Song, id)
    }

    fn update_song(&self, id: SongId, patch: SongPatch) -> CatalogResult<()> {
        self.with_write_tx(|tx| {
            let existing = tx
                .query_row(
                    &format!("{} WHERE id = ?1", SELECT_SONG),
                    params![id],
                    Self::row_to_song,
                )
                .optional()?
                .ok_or_else(|| CatalogError::not_found(EntityKind::Song, id))?;

            if let Some(artist_id) = patch.artist_id {
                Self::require_row(tx, EntityKind::Artist, artist_id)?;
            }
            if let Some(Some(album_id)) = patch.album_id {
                Self::require_row(tx, EntityKind::Album, album_id)?;
            }

            let new_artist = patch.artist_id.unwrap_or(existing.artist_id);
            let new_title = patch.title.unwrap_or_else(|| existing.title.clone());
            if (new_artist, new_title.as_str()) != (existing.artist_id, existing.title.as_str()) {
                let duplicate: Option<i64> = tx
                    .query_row(
                        "SELECT id FROM songs WHERE artist_id = ?1 AND title = ?2 AND id <> ?3",
                        params![new_artist, new_title, id],
                        |r| r.get(0),
                    )
                    .optional()?;
                if duplicate.is_some() {
                    return Err(CatalogError::DuplicateKey {
                        entity: EntityKind::Song,
                        field: "(artist_id, title)",
                        value: format!("{}/{}", new_artist, new_title),
                    });
                }
            }

            let new_album = match patch.album_id {
                Some(album_id) => album_id,
                None => existing.album_id,
            };
            tx.execute(
                "UPDATE songs SET title = ?1, release_date = ?2, artist_id = ?3, album_id = ?4
                 WHERE id = ?5",
                params![
                    new_title,
                    patch.release_date.unwrap_or(existing.release_date),
                    new_artist,
                    new_album,
                    id
                ],
            )?;
            Ok(())
        })
    }

    fn delete_song(&self, id: SongId) -> CatalogResult<()> {
        self.delete_parent_row(EntityKind::Song, id)
    }

    fn list_songs(&self) -> CatalogResult<Vec<Song>> {
        let conn = self.read_conn();
        let conn = conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(&format!("{} ORDER BY id", SELECT_SONG))?;
        let songs = stmt
            .query_map([], Self::row_to_song)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(songs)
    }

    // =========================================================================
    // Ratings
    // =========================================================================

    fn insert_rating(&self, rating: NewRating) -> CatalogResult<()> {
        self.with_write_tx(|tx| {
            Self::require_row(tx, EntityKind::User, rating.user_id)?;
            Self::require_row(tx, EntityKind::Song, rating.song_id)?;
            check_rating_range(rating.rating)?;
            let duplicate: Option<i32> = tx
                .query_row(
                    "SELECT 1 FROM ratings WHERE user_id = ?1 AND song_id = ?2",
                    params![rating.user_id, rating.song_id],
                    |r| r.get(0),
                )
                .optional()?;
            if duplicate.is_some() {
                return Err(CatalogError::DuplicateKey {
                    entity: EntityKind::Rating,
                    field: "(user_id, song_id)",
                    value: format!("{}/{}", rating.user_id, rating.song_id),
                });
            }
            tx.execute(
                "INSERT INTO ratings (user_id, song_id, rating, rating_date)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    rating.user_id,
                    rating.song_id,
                    rating.rating,
                    rating.rating_date
                ],
            )?;
            Ok(())
        })
    }

    fn upsert_rating(&self, rating: NewRating) -> CatalogResult<()> {
        self.with_write_tx(|tx| {
            Self::require_row(tx, EntityKind::User, rating.user_id)?;
            Self::require_row(tx, EntityKind::Song, rating.song_id)?;
            check_rating_range(rating.rating)?;
            tx.execute(
                "INSERT INTO ratings (user_id, song_id, rating, rating_date)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(user_id, song_id)
                 DO UPDATE SET rating = excluded.rating, rating_date = excluded.rating_date",
                params![
                    rating.user_id,
                    rating.song_id,
                    rating.rating,
                    rating.rating_date
                ],
            )?;
            Ok(())
        })
    }

    fn get_rating(&self, user_id: UserId, song_id: SongId) -> CatalogResult<Option<Rating>> {
        let conn = self.read_conn();
        let conn = conn.lock().unwrap();
        Ok(conn
            .query_row(
                &format!("{} WHERE user_id = ?1 AND song_id = ?2", SELECT_RATING),
                params![user_id, song_id],
                Self::row_to_rating,
            )
            .optional()?)
    }

    fn delete_rating(&self, user_id: UserId, song_id: SongId) -> CatalogResult<()> {
        self.with_write_tx(|tx| {
            let deleted = tx.execute(
                "DELETE FROM ratings WHERE user_id = ?1 AND song_id = ?2",
                params![user_id, song_id],
            )?;
            if deleted == 0 {
                return Err(CatalogError::not_found(
                    EntityKind::Rating,
                    format!("{}/{}", user_id, song_id),
                ));
            }
            Ok(())
        })
    }

    fn ratings_for_song(&self, song_id: SongId) -> CatalogResult<Vec<Rating>> {
        let conn = self.read_conn();
        let conn = conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(&format!(
            "{} WHERE song_id = ?1 ORDER BY user_id",
            SELECT_RATING
        ))?;
        let ratings = stmt
            .query_map(params![song_id], Self::row_to_rating)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ratings)
    }

    fn list_ratings(&self) -> CatalogResult<Vec<Rating>> {
        let conn = self.read_conn();
        let conn = conn.lock().unwrap();
        let mut stmt =
            conn.prepare_cached(&format!("{} ORDER BY user_id, song_id", SELECT_RATING))?;
        let ratings = stmt
            .query_map([], Self::row_to_rating)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ratings)
    }

    // =========================================================================
    // Song/genre tags
    // =========================================================================

    fn add_song_genre(&self, song_id: SongId, genre_id: GenreId) -> CatalogResult<()> {
        self.with_write_tx(|tx| {
            Self::require_row(tx, EntityKind::Song, song_id)?;
            Self::require_row(tx, EntityKind::Genre, genre_id)?;
            tx.execute(
                "INSERT OR IGNORE INTO song_genres (song_id, genre_id) VALUES (?1, ?2)",
                params![song_id, genre_id],
            )?;
            Ok(())
        })
    }

    fn remove_song_genre(&self, song_id: SongId, genre_id: GenreId) -> CatalogResult<()> {
        self.with_write_tx(|tx| {
            tx.execute(
                "DELETE FROM song_genres WHERE song_id = ?1 AND genre_id = ?2",
                params![song_id, genre_id],
            )?;
            Ok(())
        })
    }

    fn remove_genres_for_song(&self, song_id: SongId) -> CatalogResult<()> {
        self.with_write_tx(|tx| {
            tx.execute(
                "DELETE FROM song_genres WHERE song_id = ?1",
                params![song_id],
            )?;
            Ok(())
        })
    }

    fn genres_for_song(&self, song_id: SongId) -> CatalogResult<Vec<GenreId>> {
        let conn = self.read_conn();
        let conn = conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT genre_id FROM song_genres WHERE song_id = ?1 ORDER BY genre_id",
        )?;
        let genres = stmt
            .query_map(params![song_id], |r| r.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(genres)
    }

    fn songs_with_genre(&self, genre_id: GenreId) -> CatalogResult<Vec<SongId>> {
        let conn = self.read_conn();
        let conn = conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT song_id FROM song_genres WHERE genre_id = ?1 ORDER BY song_id",
        )?;
        let songs = stmt
            .query_map(params![genre_id], |r| r.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(songs)
    }

    fn list_song_genres(&self) -> CatalogResult<Vec<(SongId, GenreId)>> {
        let conn = self.read_conn();
        let conn = conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT song_id, genre_id FROM song_genres ORDER BY song_id, genre_id",
        )?;
        let rows = stmt
            .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // =========================================================================
    // Analytics
    // =========================================================================

    fn most_prolific_artists(
        &self,
        n: usize,
        year_range: (i32, i32),
    ) -> CatalogResult<Vec<(String, i64)>> {
        let conn = self.read_conn();
        let conn = conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT a.name, COUNT(*) AS num_singles
             FROM songs s
             JOIN artists a ON s.artist_id = a.id
             WHERE s.album_id IS NULL
               AND CAST(strftime('%Y', s.release_date) AS INTEGER) BETWEEN ?1 AND ?2
             GROUP BY a.id, a.name
             ORDER BY num_singles DESC, a.name ASC
             LIMIT ?3",
        )?;
        let rows = stmt
            .query_map(params![year_range.0, year_range.1, n as i64], |r| {
                Ok((r.get(0)?, r.get(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn artists_with_last_single_in(&self, year: i32) -> CatalogResult<BTreeSet<String>> {
        let conn = self.read_conn();
        let conn = conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT a.name, MAX(s.release_date) AS last_date
             FROM songs s
             JOIN artists a ON s.artist_id = a.id
             WHERE s.album_id IS NULL
             GROUP BY a.id, a.name
             HAVING CAST(strftime('%Y', last_date) AS INTEGER) = ?1",
        )?;
        let names = stmt
            .query_map(params![year], |r| r.get::<_, String>(0))?
            .collect::<Result<BTreeSet<_>, _>>()?;
        Ok(names)
    }

    fn top_song_genres(&self, n: usize) -> CatalogResult<Vec<(String, i64)>> {
        let conn = self.read_conn();
        let conn = conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT g.name, COUNT(*) AS num_songs
             FROM song_genres sg
             JOIN genres g ON sg.genre_id = g.id
             GROUP BY g.id, g.name
             ORDER BY num_songs DESC, g.name ASC
             LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![n as i64], |r| Ok((r.get(0)?, r.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn artists_with_albums_and_singles(&self) -> CatalogResult<BTreeSet<String>> {
        let conn = self.read_conn();
        let conn = conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT DISTINCT a.name
             FROM artists a
             WHERE EXISTS (SELECT 1 FROM albums al WHERE al.artist_id = a.id)
               AND EXISTS (SELECT 1 FROM songs s WHERE s.artist_id = a.id AND s.album_id IS NULL)",
        )?;
        let names = stmt
            .query_map([], |r| r.get::<_, String>(0))?
            .collect::<Result<BTreeSet<_>, _>>()?;
        Ok(names)
    }

    fn most_rated_songs(
        &self,
        year_range: (i32, i32),
        n: usize,
    ) -> CatalogResult<Vec<(String, String, i64)>> {
        let conn = self.read_conn();
        let conn = conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT s.title, a.name, COUNT(*) AS num_ratings
             FROM ratings r
             JOIN songs s ON r.song_id = s.id
             JOIN artists a ON s.artist_id = a.id
             WHERE CAST(strftime('%Y', r.rating_date) AS INTEGER) BETWEEN ?1 AND ?2
             GROUP BY r.song_id, s.title, a.name
             ORDER BY num_ratings DESC, s.title ASC
             LIMIT ?3",
        )?;
        let rows = stmt
            .query_map(params![year_range.0, year_range.1, n as i64], |r| {
                Ok((r.get(0)?, r.get(1)?, r.get(2)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn most_engaged_users(
        &self,
        year_range: (i32, i32),
        n: usize,
    ) -> CatalogResult<Vec<(String, i64)>> {
        let conn = self.read_conn();
        let conn = conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT u.username, COUNT(*) AS num_rated
             FROM ratings r
             JOIN users u ON r.user_id = u.id
             WHERE CAST(strftime('%Y', r.rating_date) AS INTEGER) BETWEEN ?1 AND ?2
             GROUP BY r.user_id, u.username
             ORDER BY num_rated DESC, u.username ASC
             LIMIT ?3",
        )?;
        let rows = stmt
            .query_map(params![year_range.0, year_range.1, n as i64], |r| {
                Ok((r.get(0)?, r.get(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    fn counts(&self) -> CatalogResult<CatalogCounts> {
        let conn = self.read_conn();
        let conn = conn.lock().unwrap();
        Ok(CatalogCounts {
            artists: Self::count_table(&conn, "artists")?,
            genres: Self::count_table(&conn, "genres")?,
            albums: Self::count_table(&conn, "albums")?,
            songs: Self::count_table(&conn, "songs")?,
            users: Self::count_table(&conn, "users")?,
            ratings: Self::count_table(&conn, "ratings")?,
            song_genres: Self::count_table(&conn, "song_genres")?,
        })
    }

    fn clear(&self) -> CatalogResult<()> {
        self.with_write_tx(|tx| {
            // children before parents, so the declared foreign keys never
            // see a dangling reference mid-way
            for table in [
                "ratings",
                "song_genres",
                "songs",
                "albums",
                "users",
                "genres",
                "artists",
            ] {
                tx.execute(&format!("DELETE FROM {}", table), [])?;
            }
            Ok(())
        })
    }
}
