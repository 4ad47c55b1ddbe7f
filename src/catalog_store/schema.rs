//! SQLite schema for the music catalog database.
//!
//! The table layout mirrors the catalog data model one to one: three
//! registries (artists, genres, users), two catalog tables (albums, songs)
//! with artist-scoped title uniqueness, and two relation tables (ratings,
//! song_genres) keyed by their id pairs. Every foreign key declares its
//! delete action explicitly; `RELATIONSHIPS` is the authoritative policy
//! table and a test below keeps the DDL in agreement with it.

use crate::sqlite_column;
use crate::sqlite_persistence::{Column, ForeignKey, OnDelete, SqlType, Table, VersionedSchema};

const FK_ALBUM_ARTIST: ForeignKey = ForeignKey {
    foreign_table: "artists",
    foreign_column: "id",
    on_delete: OnDelete::Restrict,
};

const FK_ALBUM_GENRE: ForeignKey = ForeignKey {
    foreign_table: "genres",
    foreign_column: "id",
    on_delete: OnDelete::Restrict,
};

const FK_SONG_ARTIST: ForeignKey = ForeignKey {
    foreign_table: "artists",
    foreign_column: "id",
    on_delete: OnDelete::Restrict,
};

const FK_SONG_ALBUM: ForeignKey = ForeignKey {
    foreign_table: "albums",
    foreign_column: "id",
    on_delete: OnDelete::Restrict,
};

const FK_RATING_USER: ForeignKey = ForeignKey {
    foreign_table: "users",
    foreign_column: "id",
    on_delete: OnDelete::Restrict,
};

const FK_RATING_SONG: ForeignKey = ForeignKey {
    foreign_table: "songs",
    foreign_column: "id",
    on_delete: OnDelete::Restrict,
};

// Deleting a song drops its genre tags with it.
const FK_SONG_GENRE_SONG: ForeignKey = ForeignKey {
    foreign_table: "songs",
    foreign_column: "id",
    on_delete: OnDelete::Cascade,
};

const FK_SONG_GENRE_GENRE: ForeignKey = ForeignKey {
    foreign_table: "genres",
    foreign_column: "id",
    on_delete: OnDelete::Restrict,
};

const ARTISTS_TABLE: Table = Table {
    name: "artists",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true, autoincrement = true),
        sqlite_column!("name", &SqlType::Text, non_null = true),
    ],
    indices: &[],
    unique_constraints: &[&["name"]],
};

const GENRES_TABLE: Table = Table {
    name: "genres",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true, autoincrement = true),
        sqlite_column!("name", &SqlType::Text, non_null = true),
    ],
    indices: &[],
    unique_constraints: &[&["name"]],
};

const USERS_TABLE: Table = Table {
    name: "users",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true, autoincrement = true),
        sqlite_column!("username", &SqlType::Text, non_null = true),
    ],
    indices: &[],
    unique_constraints: &[&["username"]],
};

const ALBUMS_TABLE: Table = Table {
    name: "albums",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true, autoincrement = true),
        sqlite_column!("title", &SqlType::Text, non_null = true),
        sqlite_column!("release_date", &SqlType::Text, non_null = true), // ISO-8601 YYYY-MM-DD
        sqlite_column!("artist_id", &SqlType::Integer, non_null = true, foreign_key = Some(&FK_ALBUM_ARTIST)),
        sqlite_column!("genre_id", &SqlType::Integer, non_null = true, foreign_key = Some(&FK_ALBUM_GENRE)),
    ],
    indices: &[
        ("idx_albums_artist", "artist_id"),
        ("idx_albums_genre", "genre_id"),
    ],
    unique_constraints: &[&["artist_id", "title"]],
};

const SONGS_TABLE: Table = Table {
    name: "songs",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true, autoincrement = true),
        sqlite_column!("title", &SqlType::Text, non_null = true),
        sqlite_column!("release_date", &SqlType::Text, non_null = true), // ISO-8601 YYYY-MM-DD
        sqlite_column!("artist_id", &SqlType::Integer, non_null = true, foreign_key = Some(&FK_SONG_ARTIST)),
        // NULL album_id marks a single
        sqlite_column!("album_id", &SqlType::Integer, foreign_key = Some(&FK_SONG_ALBUM)),
    ],
    indices: &[
        ("idx_songs_artist", "artist_id"),
        ("idx_songs_album", "album_id"),
    ],
    unique_constraints: &[&["artist_id", "title"]],
};

const RATINGS_TABLE: Table = Table {
    name: "ratings",
    columns: &[
        sqlite_column!("user_id", &SqlType::Integer, non_null = true, foreign_key = Some(&FK_RATING_USER)),
        sqlite_column!("song_id", &SqlType::Integer, non_null = true, foreign_key = Some(&FK_RATING_SONG)),
        sqlite_column!("rating", &SqlType::Integer, non_null = true),
        sqlite_column!("rating_date", &SqlType::Text, non_null = true), // ISO-8601 YYYY-MM-DD
    ],
    indices: &[
        ("idx_ratings_user", "user_id"),
        ("idx_ratings_song", "song_id"),
    ],
    unique_constraints: &[&["user_id", "song_id"]],
};

const SONG_GENRES_TABLE: Table = Table {
    name: "song_genres",
    columns: &[
        sqlite_column!("song_id", &SqlType::Integer, non_null = true, foreign_key = Some(&FK_SONG_GENRE_SONG)),
        sqlite_column!("genre_id", &SqlType::Integer, non_null = true, foreign_key = Some(&FK_SONG_GENRE_GENRE)),
    ],
    indices: &[
        ("idx_song_genres_song", "song_id"),
        ("idx_song_genres_genre", "genre_id"),
    ],
    unique_constraints: &[&["song_id", "genre_id"]],
};

/// Music catalog schema, version 0.
pub const CATALOG_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 0,
    tables: &[
        ARTISTS_TABLE,
        GENRES_TABLE,
        USERS_TABLE,
        ALBUMS_TABLE,
        SONGS_TABLE,
        RATINGS_TABLE,
        SONG_GENRES_TABLE,
    ],
    migration: None,
}];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog_store::relationships::{DeletePolicy, RELATIONSHIPS};
    use rusqlite::Connection;

    #[test]
    fn schema_creates_and_validates() {
        let conn = Connection::open_in_memory().unwrap();
        let schema = &CATALOG_VERSIONED_SCHEMAS[0];
        schema.create(&conn).unwrap();
        schema.validate(&conn).unwrap();
    }

    #[test]
    fn ddl_foreign_keys_match_the_policy_table() {
        let schema = &CATALOG_VERSIONED_SCHEMAS[0];
        let mut declared = 0;

        for rel in RELATIONSHIPS {
            let table = schema
                .tables
                .iter()
                .find(|t| t.name == rel.child.table_name())
                .unwrap_or_else(|| panic!("no table for {}", rel.child));
            let column = table
                .columns
                .iter()
                .find(|c| c.name == rel.child_field)
                .unwrap_or_else(|| panic!("no column {}.{}", table.name, rel.child_field));
            let fk = column
                .foreign_key
                .unwrap_or_else(|| panic!("{}.{} has no foreign key", table.name, column.name));

            assert_eq!(fk.foreign_table, rel.parent.table_name());
            let expected = match rel.on_delete {
                DeletePolicy::Restrict => OnDelete::Restrict,
                DeletePolicy::Cascade => OnDelete::Cascade,
            };
            assert_eq!(
                fk.on_delete, expected,
                "{}.{} delete action drifted from the policy table",
                table.name, column.name
            );
            declared += 1;
        }

        // No DDL foreign key may exist outside the policy table either.
        let total_ddl_fks: usize = schema
            .tables
            .iter()
            .flat_map(|t| t.columns.iter())
            .filter(|c| c.foreign_key.is_some())
            .count();
        assert_eq!(declared, total_ddl_fks);
    }

    #[test]
    fn duplicate_artist_name_is_rejected_by_ddl() {
        let conn = Connection::open_in_memory().unwrap();
        CATALOG_VERSIONED_SCHEMAS[0].create(&conn).unwrap();

        conn.execute("INSERT INTO artists (name) VALUES ('Beatles')", [])
            .unwrap();
        let err = conn
            .execute("INSERT INTO artists (name) VALUES ('Beatles')", [])
            .unwrap_err();
        assert!(err.to_string().contains("UNIQUE"));
    }

    #[test]
    fn song_genre_rows_cascade_with_their_song() {
        let conn = Connection::open_in_memory().unwrap();
        CATALOG_VERSIONED_SCHEMAS[0].create(&conn).unwrap();

        conn.execute("INSERT INTO artists (name) VALUES ('Alice')", [])
            .unwrap();
        conn.execute("INSERT INTO genres (name) VALUES ('Pop')", [])
            .unwrap();
        conn.execute(
            "INSERT INTO songs (title, release_date, artist_id, album_id)
             VALUES ('Sky', '2020-01-01', 1, NULL)",
            [],
        )
        .unwrap();
        conn.execute("INSERT INTO song_genres (song_id, genre_id) VALUES (1, 1)", [])
            .unwrap();

        conn.execute("DELETE FROM songs WHERE id = 1", []).unwrap();
        let remaining: i64 = conn
            .query_row("SELECT COUNT(*) FROM song_genres", [], |r| r.get(0))
            .unwrap();
        assert_eq!(remaining, 0);
    }

    #[test]
    fn genre_with_tagged_songs_cannot_be_deleted_by_ddl() {
        let conn = Connection::open_in_memory().unwrap();
        CATALOG_VERSIONED_SCHEMAS[0].create(&conn).unwrap();

        conn.execute("INSERT INTO artists (name) VALUES ('Alice')", [])
            .unwrap();
        conn.execute("INSERT INTO genres (name) VALUES ('Pop')", [])
            .unwrap();
        conn.execute(
            "INSERT INTO songs (title, release_date, artist_id, album_id)
             VALUES ('Sky', '2020-01-01', 1, NULL)",
            [],
        )
        .unwrap();
        conn.execute("INSERT INTO song_genres (song_id, genre_id) VALUES (1, 1)", [])
            .unwrap();

        assert!(conn.execute("DELETE FROM genres WHERE id = 1", []).is_err());
    }
}
