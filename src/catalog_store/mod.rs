mod error;
mod integrity;
mod memory_store;
mod models;
mod relationships;
mod schema;
mod sqlite_store;
mod trait_def;
mod validation;

pub use error::{CatalogError, CatalogResult};
pub use integrity::verify_integrity;
pub use memory_store::MemoryCatalogStore;
pub use models::{
    Album, AlbumId, AlbumPatch, Artist, ArtistId, CatalogCounts, EntityKind, Genre, GenreId,
    NewAlbum, NewRating, NewSong, Rating, Song, SongId, SongPatch, User, UserId, RATING_MAX,
    RATING_MIN,
};
pub use relationships::{edges_into, DeletePolicy, RelationshipDef, RELATIONSHIPS};
pub use schema::CATALOG_VERSIONED_SCHEMAS;
pub use sqlite_store::SqliteCatalogStore;
pub use trait_def::{CatalogStore, Mutation};
