//! Full-scan integrity verification.
//!
//! Walks every table of a live store and re-checks the catalog invariants:
//! registry name uniqueness, foreign-key existence, artist-scoped title
//! uniqueness, rating bounds and tag validity. Returns one human-readable
//! finding per violation; an empty list means the store is healthy.
//!
//! The scan issues independent reads, so it is meant for a quiescent store
//! (startup checks, maintenance CLI), not for stores under concurrent
//! writes.

use std::collections::{HashMap, HashSet};

use super::error::CatalogResult;
use super::models::{ArtistId, RATING_MAX, RATING_MIN};
use super::trait_def::CatalogStore;

pub fn verify_integrity(store: &dyn CatalogStore) -> CatalogResult<Vec<String>> {
    let mut findings = Vec::new();

    let artists = store.list_artists()?;
    let genres = store.list_genres()?;
    let users = store.list_users()?;
    let albums = store.list_albums()?;
    let songs = store.list_songs()?;
    let ratings = store.list_ratings()?;
    let song_genres = store.list_song_genres()?;

    let artist_ids: HashSet<ArtistId> = artists.iter().map(|a| a.id).collect();
    let genre_ids: HashSet<i64> = genres.iter().map(|g| g.id).collect();
    let user_ids: HashSet<i64> = users.iter().map(|u| u.id).collect();
    let album_ids: HashSet<i64> = albums.iter().map(|a| a.id).collect();
    let song_ids: HashSet<i64> = songs.iter().map(|s| s.id).collect();

    let mut seen_names: HashMap<&str, i64> = HashMap::new();
    for artist in &artists {
        if let Some(other) = seen_names.insert(&artist.name, artist.id) {
            findings.push(format!(
                "artists {} and {} share the name '{}'",
                other, artist.id, artist.name
            ));
        }
    }
    seen_names.clear();
    for genre in &genres {
        if let Some(other) = seen_names.insert(&genre.name, genre.id) {
            findings.push(format!(
                "genres {} and {} share the name '{}'",
                other, genre.id, genre.name
            ));
        }
    }
    seen_names.clear();
    for user in &users {
        if let Some(other) = seen_names.insert(&user.username, user.id) {
            findings.push(format!(
                "users {} and {} share the username '{}'",
                other, user.id, user.username
            ));
        }
    }

    let mut seen_album_titles: HashMap<(ArtistId, &str), i64> = HashMap::new();
    for album in &albums {
        if !artist_ids.contains(&album.artist_id) {
            findings.push(format!(
                "album {} references missing artist {}",
                album.id, album.artist_id
            ));
        }
        if !genre_ids.contains(&album.genre_id) {
            findings.push(format!(
                "album {} references missing genre {}",
                album.id, album.genre_id
            ));
        }
        if let Some(other) = seen_album_titles.insert((album.artist_id, &album.title), album.id) {
            findings.push(format!(
                "albums {} and {} share the title '{}' for artist {}",
                other, album.id, album.title, album.artist_id
            ));
        }
    }

    let mut seen_song_titles: HashMap<(ArtistId, &str), i64> = HashMap::new();
    for song in &songs {
        if !artist_ids.contains(&song.artist_id) {
            findings.push(format!(
                "song {} references missing artist {}",
                song.id, song.artist_id
            ));
        }
        if let Some(album_id) = song.album_id {
            if !album_ids.contains(&album_id) {
                findings.push(format!(
                    "song {} references missing album {}",
                    song.id, album_id
                ));
            }
        }
        if let Some(other) = seen_song_titles.insert((song.artist_id, &song.title), song.id) {
            findings.push(format!(
                "songs {} and {} share the title '{}' for artist {}",
                other, song.id, song.title, song.artist_id
            ));
        }
    }

    for rating in &ratings {
        if !user_ids.contains(&rating.user_id) {
            findings.push(format!(
                "rating {}/{} references missing user {}",
                rating.user_id, rating.song_id, rating.user_id
            ));
        }
        if !song_ids.contains(&rating.song_id) {
            findings.push(format!(
                "rating {}/{} references missing song {}",
                rating.user_id, rating.song_id, rating.song_id
            ));
        }
        if !(RATING_MIN..=RATING_MAX).contains(&rating.rating) {
            findings.push(format!(
                "rating {}/{} has out-of-range value {}",
                rating.user_id, rating.song_id, rating.rating
            ));
        }
    }

    for (song_id, genre_id) in &song_genres {
        if !song_ids.contains(song_id) {
            findings.push(format!(
                "song_genre {}/{} references missing song {}",
                song_id, genre_id, song_id
            ));
        }
        if !genre_ids.contains(genre_id) {
            findings.push(format!(
                "song_genre {}/{} references missing genre {}",
                song_id, genre_id, genre_id
            ));
        }
    }

    Ok(findings)
}
