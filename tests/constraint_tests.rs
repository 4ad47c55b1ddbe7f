mod common;

use common::{date, with_each_store};
use musicdb::catalog_store::{
    verify_integrity, CatalogError, EntityKind, Mutation, NewAlbum, NewRating, NewSong,
};

#[test]
fn duplicate_uniqueness_scoped_creates_fail_on_both_backends() {
    with_each_store(|store| {
        store.create_artist("Beatles").unwrap();
        assert!(matches!(
            store.create_artist("Beatles").unwrap_err(),
            CatalogError::DuplicateKey { .. }
        ));

        store.create_genre("Rock").unwrap();
        assert!(matches!(
            store.create_genre("Rock").unwrap_err(),
            CatalogError::DuplicateKey { .. }
        ));

        store.create_user("ringo").unwrap();
        assert!(matches!(
            store.create_user("ringo").unwrap_err(),
            CatalogError::DuplicateKey { .. }
        ));
    });
}

#[test]
fn foreign_key_violations_leave_no_partial_row() {
    with_each_store(|store| {
        let genre_id = store.create_genre("Rock").unwrap();

        let err = store
            .create_album(NewAlbum {
                title: "Ghost Album".to_string(),
                release_date: date(2020, 1, 1),
                artist_id: 999,
                genre_id,
            })
            .unwrap_err();
        assert!(matches!(
            err,
            CatalogError::ForeignKeyViolation {
                entity: EntityKind::Artist,
                id: 999
            }
        ));
        assert_eq!(store.counts().unwrap().albums, 0);

        let err = store
            .create_song(NewSong {
                title: "Ghost Song".to_string(),
                release_date: date(2020, 1, 1),
                artist_id: 999,
                album_id: None,
            })
            .unwrap_err();
        assert!(matches!(err, CatalogError::ForeignKeyViolation { .. }));
        assert_eq!(store.counts().unwrap().songs, 0);
    });
}

#[test]
fn deleting_a_song_leaves_zero_genre_tags() {
    with_each_store(|store| {
        let artist_id = store.create_artist("Beatles").unwrap();
        let rock = store.create_genre("Rock").unwrap();
        let pop = store.create_genre("Pop").unwrap();
        let song_id = store
            .create_song(NewSong {
                title: "Come Together".to_string(),
                release_date: date(1969, 9, 26),
                artist_id,
                album_id: None,
            })
            .unwrap();
        store.add_song_genre(song_id, rock).unwrap();
        store.add_song_genre(song_id, pop).unwrap();

        store.delete_song(song_id).unwrap();
        assert!(store.genres_for_song(song_id).unwrap().is_empty());
        assert_eq!(store.counts().unwrap().song_genres, 0);
    });
}

#[test]
fn remove_genres_for_song_untags_wholesale() {
    with_each_store(|store| {
        let artist_id = store.create_artist("Beatles").unwrap();
        let rock = store.create_genre("Rock").unwrap();
        let pop = store.create_genre("Pop").unwrap();
        let keeper = store
            .create_song(NewSong {
                title: "Something".to_string(),
                release_date: date(1969, 9, 26),
                artist_id,
                album_id: None,
            })
            .unwrap();
        let target = store
            .create_song(NewSong {
                title: "Come Together".to_string(),
                release_date: date(1969, 9, 26),
                artist_id,
                album_id: None,
            })
            .unwrap();
        store.add_song_genre(keeper, rock).unwrap();
        store.add_song_genre(target, rock).unwrap();
        store.add_song_genre(target, pop).unwrap();

        store.remove_genres_for_song(target).unwrap();
        assert!(store.genres_for_song(target).unwrap().is_empty());
        // other songs' tags are untouched
        assert_eq!(store.genres_for_song(keeper).unwrap(), vec![rock]);
    });
}

#[test]
fn restricted_genre_delete_leaves_all_rows_unchanged() {
    with_each_store(|store| {
        let artist_id = store.create_artist("Beatles").unwrap();
        let rock = store.create_genre("Rock").unwrap();
        let song_id = store
            .create_song(NewSong {
                title: "Come Together".to_string(),
                release_date: date(1969, 9, 26),
                artist_id,
                album_id: None,
            })
            .unwrap();
        store.add_song_genre(song_id, rock).unwrap();

        let before = store.counts().unwrap();
        let err = store.delete_genre(rock).unwrap_err();
        assert!(matches!(
            err,
            CatalogError::ReferentialViolation {
                entity: EntityKind::Genre,
                ..
            }
        ));
        assert_eq!(store.counts().unwrap(), before);
        assert!(store.genre_exists(rock).unwrap());
    });
}

#[test]
fn rating_bounds_are_enforced_on_both_backends() {
    with_each_store(|store| {
        let artist_id = store.create_artist("Beatles").unwrap();
        let song_id = store
            .create_song(NewSong {
                title: "Come Together".to_string(),
                release_date: date(1969, 9, 26),
                artist_id,
                album_id: None,
            })
            .unwrap();

        for (i, value) in [1, 2, 3, 4, 5].into_iter().enumerate() {
            let user_id = store.create_user(&format!("user{}", i)).unwrap();
            store
                .insert_rating(NewRating {
                    user_id,
                    song_id,
                    rating: value,
                    rating_date: date(2020, 1, 1),
                })
                .unwrap();
        }

        let user_id = store.create_user("outlier").unwrap();
        for value in [0, 6] {
            let err = store
                .insert_rating(NewRating {
                    user_id,
                    song_id,
                    rating: value,
                    rating_date: date(2020, 1, 1),
                })
                .unwrap_err();
            assert!(matches!(
                err,
                CatalogError::InvalidValue { field: "rating", .. }
            ));
        }
        assert_eq!(store.counts().unwrap().ratings, 5);
    });
}

#[test]
fn abbey_road_delete_ordering_scenario() {
    with_each_store(|store| {
        let beatles = store.create_artist("Beatles").unwrap();
        let rock = store.create_genre("Rock").unwrap();
        let abbey_road = store
            .create_album(NewAlbum {
                title: "Abbey Road".to_string(),
                release_date: date(1969, 9, 26),
                artist_id: beatles,
                genre_id: rock,
            })
            .unwrap();
        let come_together = store
            .create_song(NewSong {
                title: "Come Together".to_string(),
                release_date: date(1969, 9, 26),
                artist_id: beatles,
                album_id: Some(abbey_road),
            })
            .unwrap();
        store.add_song_genre(come_together, rock).unwrap();

        // Rock is held by both the album and the tag: restricted.
        assert!(matches!(
            store.delete_genre(rock).unwrap_err(),
            CatalogError::ReferentialViolation { .. }
        ));

        // Deleting the song removes the tag, but the album still refers
        // to Rock, so the genre delete stays restricted.
        store.delete_song(come_together).unwrap();
        assert_eq!(store.counts().unwrap().song_genres, 0);
        assert!(matches!(
            store.delete_genre(rock).unwrap_err(),
            CatalogError::ReferentialViolation {
                dependent: EntityKind::Album,
                ..
            }
        ));

        // Once the album is gone the genre is free.
        store.delete_album(abbey_road).unwrap();
        store.delete_genre(rock).unwrap();
        assert!(!store.genre_exists(rock).unwrap());

        assert!(verify_integrity(store).unwrap().is_empty());
    });
}

#[test]
fn song_album_may_belong_to_a_different_artist() {
    // The schema's independent foreign keys allow a song to point at an
    // album owned by another artist; the store preserves that.
    with_each_store(|store| {
        let alice = store.create_artist("Alice").unwrap();
        let bob = store.create_artist("Bob").unwrap();
        let pop = store.create_genre("Pop").unwrap();
        let alice_album = store
            .create_album(NewAlbum {
                title: "Alice Album".to_string(),
                release_date: date(2020, 1, 1),
                artist_id: alice,
                genre_id: pop,
            })
            .unwrap();

        let song_id = store
            .create_song(NewSong {
                title: "Guest Spot".to_string(),
                release_date: date(2020, 1, 1),
                artist_id: bob,
                album_id: Some(alice_album),
            })
            .unwrap();

        let song = store.get_song(song_id).unwrap().unwrap();
        assert_eq!(song.artist_id, bob);
        assert_eq!(song.album_id, Some(alice_album));
        assert!(verify_integrity(store).unwrap().is_empty());
    });
}

#[test]
fn restricted_artist_and_user_deletes() {
    with_each_store(|store| {
        let artist_id = store.create_artist("Alice").unwrap();
        let song_id = store
            .create_song(NewSong {
                title: "Sky".to_string(),
                release_date: date(2020, 1, 1),
                artist_id,
                album_id: None,
            })
            .unwrap();
        let user_id = store.create_user("user1").unwrap();
        store
            .insert_rating(NewRating {
                user_id,
                song_id,
                rating: 5,
                rating_date: date(2020, 2, 1),
            })
            .unwrap();

        // artist blocked by the song, user blocked by the rating
        assert!(matches!(
            store.delete_artist(artist_id).unwrap_err(),
            CatalogError::ReferentialViolation {
                dependent: EntityKind::Song,
                ..
            }
        ));
        assert!(matches!(
            store.delete_user(user_id).unwrap_err(),
            CatalogError::ReferentialViolation {
                dependent: EntityKind::Rating,
                ..
            }
        ));

        // removing dependents bottom-up frees both
        store.delete_rating(user_id, song_id).unwrap();
        store.delete_user(user_id).unwrap();
        store.delete_song(song_id).unwrap();
        store.delete_artist(artist_id).unwrap();
        assert_eq!(store.counts().unwrap().artists, 0);
    });
}

#[test]
fn mutation_entry_point_applies_and_rejects() {
    with_each_store(|store| {
        store
            .mutate(Mutation::CreateArtist {
                name: "Beatles".to_string(),
            })
            .unwrap();
        store
            .mutate(Mutation::CreateGenre {
                name: "Rock".to_string(),
            })
            .unwrap();
        let artist = store.find_artist_by_name("Beatles").unwrap().unwrap();
        let genre = store.find_genre_by_name("Rock").unwrap().unwrap();

        store
            .mutate(Mutation::CreateSong(NewSong {
                title: "Come Together".to_string(),
                release_date: date(1969, 9, 26),
                artist_id: artist.id,
                album_id: None,
            }))
            .unwrap();
        let song = store
            .find_song_by_artist_and_title(artist.id, "Come Together")
            .unwrap()
            .unwrap();

        store
            .mutate(Mutation::AddSongGenre {
                song_id: song.id,
                genre_id: genre.id,
            })
            .unwrap();

        assert!(matches!(
            store.mutate(Mutation::DeleteGenre { id: genre.id }).unwrap_err(),
            CatalogError::ReferentialViolation { .. }
        ));

        store.mutate(Mutation::DeleteSong { id: song.id }).unwrap();
        store.mutate(Mutation::DeleteGenre { id: genre.id }).unwrap();
    });
}

#[test]
fn not_found_targets_are_reported() {
    with_each_store(|store| {
        assert!(matches!(
            store.delete_artist(1).unwrap_err(),
            CatalogError::NotFound {
                entity: EntityKind::Artist,
                ..
            }
        ));
        assert!(matches!(
            store.delete_rating(1, 1).unwrap_err(),
            CatalogError::NotFound {
                entity: EntityKind::Rating,
                ..
            }
        ));
        assert!(matches!(
            store
                .update_song(7, musicdb::catalog_store::SongPatch::default())
                .unwrap_err(),
            CatalogError::NotFound {
                entity: EntityKind::Song,
                ..
            }
        ));
    });
}
