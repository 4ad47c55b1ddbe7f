//! Foreign-key declarations and their delete policies.
//!
//! Every foreign key in the catalog is listed here with an explicit policy,
//! so cascade/restrict decisions are driven by data rather than scattered
//! through the delete paths. The SQLite schema declares the same policies
//! in its DDL; a test in `schema.rs` keeps the two in sync.

use super::models::EntityKind;

/// What happens to dependent rows when the row they reference is deleted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeletePolicy {
    /// The delete is rejected while any dependent row exists.
    Restrict,
    /// Dependent rows are deleted together with the referenced row.
    Cascade,
}

/// One foreign-key edge: `child.child_field` references `parent`.
#[derive(Clone, Copy, Debug)]
pub struct RelationshipDef {
    pub child: EntityKind,
    pub child_field: &'static str,
    pub parent: EntityKind,
    pub on_delete: DeletePolicy,
}

/// Every foreign key in the catalog, grouped by child table in the global
/// table order. Dependent scans during deletes follow this order, so the
/// blocking reference named in a `ReferentialViolation` is deterministic.
pub const RELATIONSHIPS: &[RelationshipDef] = &[
    RelationshipDef {
        child: EntityKind::Album,
        child_field: "artist_id",
        parent: EntityKind::Artist,
        on_delete: DeletePolicy::Restrict,
    },
    RelationshipDef {
        child: EntityKind::Album,
        child_field: "genre_id",
        parent: EntityKind::Genre,
        on_delete: DeletePolicy::Restrict,
    },
    RelationshipDef {
        child: EntityKind::Song,
        child_field: "artist_id",
        parent: EntityKind::Artist,
        on_delete: DeletePolicy::Restrict,
    },
    RelationshipDef {
        child: EntityKind::Song,
        child_field: "album_id",
        parent: EntityKind::Album,
        on_delete: DeletePolicy::Restrict,
    },
    RelationshipDef {
        child: EntityKind::Rating,
        child_field: "user_id",
        parent: EntityKind::User,
        on_delete: DeletePolicy::Restrict,
    },
    RelationshipDef {
        child: EntityKind::Rating,
        child_field: "song_id",
        parent: EntityKind::Song,
        on_delete: DeletePolicy::Restrict,
    },
    RelationshipDef {
        child: EntityKind::SongGenre,
        child_field: "song_id",
        parent: EntityKind::Song,
        on_delete: DeletePolicy::Cascade,
    },
    RelationshipDef {
        child: EntityKind::SongGenre,
        child_field: "genre_id",
        parent: EntityKind::Genre,
        on_delete: DeletePolicy::Restrict,
    },
];

/// The edges pointing at `parent`, in declaration order.
pub fn edges_into(parent: EntityKind) -> impl Iterator<Item = &'static RelationshipDef> {
    RELATIONSHIPS.iter().filter(move |r| r.parent == parent)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_song_genre_tags_cascade() {
        let cascading: Vec<_> = RELATIONSHIPS
            .iter()
            .filter(|r| r.on_delete == DeletePolicy::Cascade)
            .collect();
        assert_eq!(cascading.len(), 1);
        assert_eq!(cascading[0].child, EntityKind::SongGenre);
        assert_eq!(cascading[0].parent, EntityKind::Song);
    }

    #[test]
    fn edges_are_declared_in_global_table_order() {
        let children: Vec<_> = RELATIONSHIPS.iter().map(|r| r.child).collect();
        let mut sorted = children.clone();
        sorted.sort();
        assert_eq!(children, sorted);
    }

    #[test]
    fn every_parent_has_at_least_one_edge_or_none() {
        assert_eq!(edges_into(EntityKind::Artist).count(), 2);
        assert_eq!(edges_into(EntityKind::Genre).count(), 2);
        assert_eq!(edges_into(EntityKind::Album).count(), 1);
        assert_eq!(edges_into(EntityKind::Song).count(), 2);
        assert_eq!(edges_into(EntityKind::User).count(), 1);
        assert_eq!(edges_into(EntityKind::Rating).count(), 0);
        assert_eq!(edges_into(EntityKind::SongGenre).count(), 0);
    }
}
