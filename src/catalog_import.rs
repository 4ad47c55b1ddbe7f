//! Bulk import of singles, albums, users and song ratings.
//!
//! Loaders validate and apply each input row independently: a row that
//! fails one of the documented rejection rules lands in the returned set
//! and never aborts the batch. Anything else (a storage failure, an empty
//! artist name) still propagates as an error.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use tracing::debug;

use crate::catalog_store::{CatalogError, CatalogResult, CatalogStore, NewAlbum, NewRating, NewSong};

/// One single: a song released outside any album, tagged with at least one
/// genre.
#[derive(Clone, Debug)]
pub struct SingleSongEntry {
    pub title: String,
    pub genres: Vec<String>,
    pub artist: String,
    pub release_date: NaiveDate,
}

/// One album with its track titles. Album songs share the album's release
/// date and carry the album's genre as their tag.
#[derive(Clone, Debug)]
pub struct AlbumEntry {
    pub title: String,
    pub genre: String,
    pub artist: String,
    pub release_date: NaiveDate,
    pub song_titles: Vec<String>,
}

/// One rating, addressed by username and (artist, song title).
#[derive(Clone, Debug)]
pub struct RatingEntry {
    pub username: String,
    pub artist: String,
    pub song_title: String,
    pub rating: i32,
    pub rating_date: NaiveDate,
}

/// Load singles. A single is rejected (into the returned
/// `(title, artist)` set) when its genre list is empty or when the artist
/// already has a song with that title. Artists and genres are created on
/// first use; duplicate genres within one entry collapse.
pub fn load_single_songs(
    store: &dyn CatalogStore,
    singles: &[SingleSongEntry],
) -> CatalogResult<BTreeSet<(String, String)>> {
    let mut rejected = BTreeSet::new();

    for entry in singles {
        if entry.genres.is_empty() {
            rejected.insert((entry.title.clone(), entry.artist.clone()));
            continue;
        }

        let artist_id = store.get_or_create_artist(&entry.artist)?;
        if store
            .find_song_by_artist_and_title(artist_id, &entry.title)?
            .is_some()
        {
            rejected.insert((entry.title.clone(), entry.artist.clone()));
            continue;
        }

        let song_id = store.create_song(NewSong {
            title: entry.title.clone(),
            release_date: entry.release_date,
            artist_id,
            album_id: None,
        })?;

        let unique_genres: BTreeSet<&str> = entry.genres.iter().map(String::as_str).collect();
        for genre in unique_genres {
            let genre_id = store.get_or_create_genre(genre)?;
            store.add_song_genre(song_id, genre_id)?;
        }
    }

    debug!(
        "Loaded {} singles, rejected {}",
        singles.len() - rejected.len(),
        rejected.len()
    );
    Ok(rejected)
}

/// Load albums. An album is rejected (into the returned `(title, artist)`
/// set) when the artist already has an album with that title. A track
/// title the artist already has is skipped without rejecting the album.
pub fn load_albums(
    store: &dyn CatalogStore,
    albums: &[AlbumEntry],
) -> CatalogResult<BTreeSet<(String, String)>> {
    let mut rejected = BTreeSet::new();

    for entry in albums {
        let artist_id = store.get_or_create_artist(&entry.artist)?;
        let genre_id = store.get_or_create_genre(&entry.genre)?;

        if store
            .find_album_by_artist_and_title(artist_id, &entry.title)?
            .is_some()
        {
            rejected.insert((entry.title.clone(), entry.artist.clone()));
            continue;
        }

        let album_id = store.create_album(NewAlbum {
            title: entry.title.clone(),
            release_date: entry.release_date,
            artist_id,
            genre_id,
        })?;

        for song_title in &entry.song_titles {
            if store
                .find_song_by_artist_and_title(artist_id, song_title)?
                .is_some()
            {
                // the artist already has this song; keep loading the album
                continue;
            }
            let song_id = store.create_song(NewSong {
                title: song_title.clone(),
                release_date: entry.release_date,
                artist_id,
                album_id: Some(album_id),
            })?;
            store.add_song_genre(song_id, genre_id)?;
        }
    }

    debug!(
        "Loaded {} albums, rejected {}",
        albums.len() - rejected.len(),
        rejected.len()
    );
    Ok(rejected)
}

/// Load users. Rejects usernames that duplicate an existing user or an
/// earlier entry of the same batch.
pub fn load_users(
    store: &dyn CatalogStore,
    usernames: &[String],
) -> CatalogResult<BTreeSet<String>> {
    let mut rejected = BTreeSet::new();
    let mut seen_in_batch = BTreeSet::new();

    for username in usernames {
        if !seen_in_batch.insert(username.clone()) {
            rejected.insert(username.clone());
            continue;
        }
        if store.find_user_by_username(username)?.is_some() {
            rejected.insert(username.clone());
            continue;
        }
        store.create_user(username)?;
    }

    Ok(rejected)
}

/// Load ratings with strict insert semantics. A rating is rejected (into
/// the returned `(username, artist, song title)` set) when the user is
/// unknown, the (artist, song) pair is unknown, the user already rated the
/// song, or the rating is outside the valid range.
pub fn load_song_ratings(
    store: &dyn CatalogStore,
    ratings: &[RatingEntry],
) -> CatalogResult<BTreeSet<(String, String, String)>> {
    let mut rejected = BTreeSet::new();

    for entry in ratings {
        let key = (
            entry.username.clone(),
            entry.artist.clone(),
            entry.song_title.clone(),
        );

        let Some(user) = store.find_user_by_username(&entry.username)? else {
            rejected.insert(key);
            continue;
        };
        let Some(artist) = store.find_artist_by_name(&entry.artist)? else {
            rejected.insert(key);
            continue;
        };
        let Some(song) = store.find_song_by_artist_and_title(artist.id, &entry.song_title)? else {
            rejected.insert(key);
            continue;
        };

        match store.insert_rating(NewRating {
            user_id: user.id,
            song_id: song.id,
            rating: entry.rating,
            rating_date: entry.rating_date,
        }) {
            Ok(()) => {}
            Err(CatalogError::InvalidValue { .. }) | Err(CatalogError::DuplicateKey { .. }) => {
                rejected.insert(key);
            }
            Err(e) => return Err(e),
        }
    }

    Ok(rejected)
}
