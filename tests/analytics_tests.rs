mod common;

use std::collections::BTreeSet;

use common::{seed_fixture, with_each_store};

#[test]
fn most_prolific_artists_counts_singles_in_range() {
    with_each_store(|store| {
        seed_fixture(store);

        let prolific = store.most_prolific_artists(3, (2019, 2021)).unwrap();
        assert_eq!(
            prolific,
            vec![
                ("Alice".to_string(), 2),
                ("Bob".to_string(), 1),
                ("Carl".to_string(), 1),
            ]
        );

        // album tracks never count as singles
        let only_2019 = store.most_prolific_artists(3, (2019, 2019)).unwrap();
        assert_eq!(only_2019, vec![("Carl".to_string(), 1)]);
    });
}

#[test]
fn artists_with_last_single_in_year() {
    with_each_store(|store| {
        seed_fixture(store);

        assert_eq!(
            store.artists_with_last_single_in(2020).unwrap(),
            BTreeSet::from(["Alice".to_string()])
        );
        assert_eq!(
            store.artists_with_last_single_in(2021).unwrap(),
            BTreeSet::from(["Bob".to_string()])
        );
        assert_eq!(
            store.artists_with_last_single_in(2019).unwrap(),
            BTreeSet::from(["Carl".to_string()])
        );
        assert!(store.artists_with_last_single_in(1999).unwrap().is_empty());
    });
}

#[test]
fn top_song_genres_counts_each_tag_once() {
    with_each_store(|store| {
        seed_fixture(store);

        let top = store.top_song_genres(10).unwrap();
        assert_eq!(
            top,
            vec![
                ("Pop".to_string(), 4),
                ("Jazz".to_string(), 3),
                ("Rock".to_string(), 2),
            ]
        );

        let only_first = store.top_song_genres(1).unwrap();
        assert_eq!(only_first, vec![("Pop".to_string(), 4)]);
    });
}

#[test]
fn artists_with_albums_and_singles() {
    with_each_store(|store| {
        seed_fixture(store);

        assert_eq!(
            store.artists_with_albums_and_singles().unwrap(),
            BTreeSet::from(["Alice".to_string(), "Bob".to_string()])
        );
    });
}

#[test]
fn most_rated_songs_ties_break_by_title() {
    with_each_store(|store| {
        seed_fixture(store);

        let most_rated = store.most_rated_songs((2019, 2021), 10).unwrap();
        assert_eq!(
            most_rated,
            vec![
                ("Jazz Night".to_string(), "Bob".to_string(), 2),
                ("Sky".to_string(), "Alice".to_string(), 2),
                ("Old Hit".to_string(), "Carl".to_string(), 1),
                ("Rock Me".to_string(), "Alice".to_string(), 1),
            ]
        );

        // ratings count in the year they were given, not released
        let only_2020 = store.most_rated_songs((2020, 2020), 10).unwrap();
        assert_eq!(
            only_2020,
            vec![
                ("Sky".to_string(), "Alice".to_string(), 2),
                ("Rock Me".to_string(), "Alice".to_string(), 1),
            ]
        );
    });
}

#[test]
fn most_engaged_users_ties_break_by_username() {
    with_each_store(|store| {
        seed_fixture(store);

        let engaged = store.most_engaged_users((2019, 2021), 10).unwrap();
        assert_eq!(
            engaged,
            vec![
                ("user1".to_string(), 2),
                ("user2".to_string(), 2),
                ("user3".to_string(), 2),
            ]
        );

        let top_two = store.most_engaged_users((2019, 2021), 2).unwrap();
        assert_eq!(
            top_two,
            vec![("user1".to_string(), 2), ("user2".to_string(), 2)]
        );
    });
}
