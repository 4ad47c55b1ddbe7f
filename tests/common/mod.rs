//! Common test infrastructure
//!
//! Helpers to run the same assertions against every storage backend, and
//! a canonical small catalog fixture loaded through the bulk import layer.

#![allow(dead_code)]

use chrono::NaiveDate;
use musicdb::catalog_import::{
    load_albums, load_single_songs, load_song_ratings, load_users, AlbumEntry, RatingEntry,
    SingleSongEntry,
};
use musicdb::catalog_store::CatalogStore;
use musicdb::{MemoryCatalogStore, SqliteCatalogStore};
use tempfile::TempDir;

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Run `test` once against the in-memory store and once against a fresh
/// on-disk SQLite store, so every property is checked on both backends.
pub fn with_each_store(test: impl Fn(&dyn CatalogStore)) {
    let memory = MemoryCatalogStore::new();
    test(&memory);

    let dir = TempDir::new().unwrap();
    let sqlite = SqliteCatalogStore::open(dir.path().join("catalog.db"), 2).unwrap();
    test(&sqlite);
}

pub fn single(title: &str, genres: &[&str], artist: &str, release: NaiveDate) -> SingleSongEntry {
    SingleSongEntry {
        title: title.to_string(),
        genres: genres.iter().map(|g| g.to_string()).collect(),
        artist: artist.to_string(),
        release_date: release,
    }
}

pub fn album(
    title: &str,
    genre: &str,
    artist: &str,
    release: NaiveDate,
    song_titles: &[&str],
) -> AlbumEntry {
    AlbumEntry {
        title: title.to_string(),
        genre: genre.to_string(),
        artist: artist.to_string(),
        release_date: release,
        song_titles: song_titles.iter().map(|t| t.to_string()).collect(),
    }
}

pub fn rating(
    username: &str,
    artist: &str,
    song_title: &str,
    value: i32,
    rated: NaiveDate,
) -> RatingEntry {
    RatingEntry {
        username: username.to_string(),
        artist: artist.to_string(),
        song_title: song_title.to_string(),
        rating: value,
        rating_date: rated,
    }
}

/// Canonical fixture: 3 users, 4 singles, 2 albums with 2 tracks each and
/// 6 ratings. Everything loads cleanly (no rejections).
pub fn seed_fixture(store: &dyn CatalogStore) {
    let rejected = load_users(
        store,
        &[
            "user1".to_string(),
            "user2".to_string(),
            "user3".to_string(),
        ],
    )
    .unwrap();
    assert!(rejected.is_empty());

    let rejected = load_single_songs(
        store,
        &[
            single("Sky", &["Pop"], "Alice", date(2020, 1, 1)),
            single("Rock Me", &["Rock", "Pop"], "Alice", date(2020, 6, 15)),
            single("Jazz Night", &["Jazz"], "Bob", date(2021, 2, 20)),
            single("Old Hit", &["Rock"], "Carl", date(2019, 8, 30)),
        ],
    )
    .unwrap();
    assert!(rejected.is_empty());

    let rejected = load_albums(
        store,
        &[
            album(
                "Alice Album",
                "Pop",
                "Alice",
                date(2019, 12, 1),
                &["AlbumSong1", "AlbumSong2"],
            ),
            album(
                "Bob Debut",
                "Jazz",
                "Bob",
                date(2020, 10, 10),
                &["Smooth", "Late Night"],
            ),
        ],
    )
    .unwrap();
    assert!(rejected.is_empty());

    let rejected = load_song_ratings(
        store,
        &[
            rating("user1", "Alice", "Sky", 5, date(2020, 1, 10)),
            rating("user2", "Alice", "Sky", 3, date(2020, 2, 10)),
            rating("user1", "Alice", "Rock Me", 4, date(2020, 6, 20)),
            rating("user2", "Bob", "Jazz Night", 5, date(2021, 3, 1)),
            rating("user3", "Bob", "Jazz Night", 4, date(2021, 3, 2)),
            rating("user3", "Carl", "Old Hit", 2, date(2019, 9, 1)),
        ],
    )
    .unwrap();
    assert!(rejected.is_empty());
}
