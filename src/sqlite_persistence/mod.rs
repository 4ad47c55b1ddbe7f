mod versioned_schema;

pub use versioned_schema::{
    Column, ForeignKey, OnDelete, SqlType, Table, VersionedSchema, BASE_DB_VERSION,
};
