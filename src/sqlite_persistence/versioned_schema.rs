//! Declarative SQLite schema definitions.
//!
//! Tables are described as consts and turned into DDL by [`Table::create`].
//! [`VersionedSchema::validate`] checks a live database against the
//! declaration, including foreign-key delete actions, so a store can refuse
//! to open a database whose constraints drifted from the code.

use anyhow::{bail, Result};
use rusqlite::{params, Connection};

/// Builds a [`Column`] with named optional attributes, e.g.
/// `sqlite_column!("id", &SqlType::Integer, is_primary_key = true)`.
#[macro_export]
macro_rules! sqlite_column {
    ($name:expr, $sql_type:expr $(, $field:ident = $value:expr)*) => {
        {
            // unused_mut fires when no optional attribute is passed
            #[allow(unused_mut)]
            let mut column = Column {
                name: $name,
                sql_type: $sql_type,
                is_primary_key: false,
                autoincrement: false,
                non_null: false,
                foreign_key: None,
            };
            $(
                column.$field = $value;
            )*
            column
        }
    };
}

#[derive(Debug, PartialEq, Eq)]
pub enum SqlType {
    Text,
    Integer,
    Real,
    Blob,
}

impl SqlType {
    fn as_sql(&self) -> &'static str {
        match self {
            SqlType::Text => "TEXT",
            SqlType::Integer => "INTEGER",
            SqlType::Real => "REAL",
            SqlType::Blob => "BLOB",
        }
    }

    fn from_sql(s: &str) -> Option<&'static SqlType> {
        match s {
            "TEXT" => Some(&SqlType::Text),
            "INTEGER" => Some(&SqlType::Integer),
            "REAL" => Some(&SqlType::Real),
            "BLOB" => Some(&SqlType::Blob),
            _ => None,
        }
    }
}

/// Action taken on dependent rows when the referenced row is deleted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OnDelete {
    NoAction,
    Restrict,
    SetNull,
    Cascade,
}

impl OnDelete {
    pub fn as_sql(&self) -> &'static str {
        match self {
            OnDelete::NoAction => "NO ACTION",
            OnDelete::Restrict => "RESTRICT",
            OnDelete::SetNull => "SET NULL",
            OnDelete::Cascade => "CASCADE",
        }
    }
}

pub struct ForeignKey {
    pub foreign_table: &'static str,
    pub foreign_column: &'static str,
    pub on_delete: OnDelete,
}

pub struct Column {
    pub name: &'static str,
    pub sql_type: &'static SqlType,
    pub is_primary_key: bool,
    /// Surrogate ids are declared AUTOINCREMENT so SQLite never reuses the
    /// id of a deleted row.
    pub autoincrement: bool,
    pub non_null: bool,
    pub foreign_key: Option<&'static ForeignKey>,
}

pub struct Table {
    pub name: &'static str,
    pub columns: &'static [Column],
    pub indices: &'static [(&'static str, &'static str)],
    pub unique_constraints: &'static [&'static [&'static str]],
}

impl Table {
    fn create_sql(&self) -> String {
        let mut sql = format!("CREATE TABLE {} (", self.name);
        for (i, column) in self.columns.iter().enumerate() {
            if i > 0 {
                sql.push_str(", ");
            }
            sql.push_str(column.name);
            sql.push(' ');
            sql.push_str(column.sql_type.as_sql());
            if column.is_primary_key {
                sql.push_str(" PRIMARY KEY");
                if column.autoincrement {
                    sql.push_str(" AUTOINCREMENT");
                }
            }
            if column.non_null {
                sql.push_str(" NOT NULL");
            }
            if let Some(fk) = column.foreign_key {
                sql.push_str(&format!(
                    " REFERENCES {}({}) ON DELETE {}",
                    fk.foreign_table,
                    fk.foreign_column,
                    fk.on_delete.as_sql()
                ));
            }
        }
        for unique in self.unique_constraints {
            sql.push_str(&format!(", UNIQUE ({})", unique.join(", ")));
        }
        sql.push_str(");");
        sql
    }

    pub fn create(&self, conn: &Connection) -> Result<()> {
        conn.execute(&self.create_sql(), params![])?;
        for (index_name, columns) in self.indices {
            conn.execute(
                &format!("CREATE INDEX {} ON {}({});", index_name, self.name, columns),
                params![],
            )?;
        }
        Ok(())
    }
}

pub struct VersionedSchema {
    pub version: usize,
    pub tables: &'static [Table],
    pub migration: Option<fn(&Connection) -> Result<()>>,
}

/// Offset added to the schema version before storing it in
/// `PRAGMA user_version`, so versioned databases are distinguishable from
/// databases that predate versioning (which report 0).
pub const BASE_DB_VERSION: usize = 99999;

impl VersionedSchema {
    pub fn create(&self, conn: &Connection) -> Result<()> {
        conn.execute("PRAGMA foreign_keys = ON;", params![])?;
        for table in self.tables {
            table.create(conn)?;
        }
        conn.execute(
            &format!("PRAGMA user_version = {}", BASE_DB_VERSION + self.version),
            [],
        )?;
        Ok(())
    }

    /// Check that the live database matches this schema declaration:
    /// columns (name, type, nullability, primary key), indices, unique
    /// constraints and foreign keys with their delete actions.
    pub fn validate(&self, conn: &Connection) -> Result<()> {
        for table in self.tables {
            self.validate_columns(conn, table)?;
            self.validate_indices(conn, table)?;
            self.validate_unique_constraints(conn, table)?;
            self.validate_foreign_keys(conn, table)?;
        }
        Ok(())
    }

    fn validate_columns(&self, conn: &Connection, table: &Table) -> Result<()> {
        struct ActualColumn {
            name: String,
            sql_type: String,
            non_null: bool,
            is_primary_key: bool,
        }

        let mut stmt = conn.prepare(&format!("PRAGMA table_info({});", table.name))?;
        let actual: Vec<ActualColumn> = stmt
            .query_map(params![], |row| {
                Ok(ActualColumn {
                    name: row.get(1)?,
                    sql_type: row.get(2)?,
                    non_null: row.get::<_, i32>(3)? == 1,
                    is_primary_key: row.get::<_, i32>(5)? == 1,
                })
            })?
            .collect::<Result<_, _>>()?;

        if actual.len() != table.columns.len() {
            bail!(
                "table {}: expected {} columns, found {} ({})",
                table.name,
                table.columns.len(),
                actual.len(),
                actual
                    .iter()
                    .map(|c| c.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }

        for (actual, expected) in actual.iter().zip(table.columns.iter()) {
            if actual.name != expected.name {
                bail!(
                    "table {}: expected column {}, found {}",
                    table.name,
                    expected.name,
                    actual.name
                );
            }
            if SqlType::from_sql(&actual.sql_type) != Some(expected.sql_type) {
                bail!(
                    "table {} column {}: expected type {:?}, found {}",
                    table.name,
                    expected.name,
                    expected.sql_type,
                    actual.sql_type
                );
            }
            if actual.non_null != expected.non_null {
                bail!(
                    "table {} column {}: NOT NULL mismatch (expected {})",
                    table.name,
                    expected.name,
                    expected.non_null
                );
            }
            if actual.is_primary_key != expected.is_primary_key {
                bail!(
                    "table {} column {}: PRIMARY KEY mismatch (expected {})",
                    table.name,
                    expected.name,
                    expected.is_primary_key
                );
            }
        }
        Ok(())
    }

    fn validate_indices(&self, conn: &Connection, table: &Table) -> Result<()> {
        for (index_name, _) in table.indices {
            let exists: bool = conn
                .query_row(
                    "SELECT 1 FROM sqlite_master WHERE type='index' AND name=?1 AND tbl_name=?2",
                    params![index_name, table.name],
                    |_| Ok(true),
                )
                .unwrap_or(false);
            if !exists {
                bail!("table {}: missing index {}", table.name, index_name);
            }
        }
        Ok(())
    }

    fn validate_unique_constraints(&self, conn: &Connection, table: &Table) -> Result<()> {
        if table.unique_constraints.is_empty() {
            return Ok(());
        }

        // SQLite exposes unique constraints as unique indices; compare on
        // sorted column sets since column order is not significant.
        let mut stmt = conn.prepare(&format!("PRAGMA index_list({})", table.name))?;
        let unique_indices: Vec<String> = stmt
            .query_map([], |row| {
                let name: String = row.get(1)?;
                let is_unique: i32 = row.get(2)?;
                Ok((name, is_unique))
            })?
            .filter_map(|r| r.ok())
            .filter(|(_, is_unique)| *is_unique == 1)
            .map(|(name, _)| name)
            .collect();

        let mut unique_column_sets: Vec<Vec<String>> = Vec::new();
        for index_name in &unique_indices {
            let mut stmt = conn.prepare(&format!("PRAGMA index_info({})", index_name))?;
            let mut columns: Vec<String> = stmt
                .query_map([], |row| row.get::<_, String>(2))?
                .filter_map(|r| r.ok())
                .collect();
            columns.sort();
            unique_column_sets.push(columns);
        }

        for expected in table.unique_constraints {
            let mut expected_sorted: Vec<&str> = expected.to_vec();
            expected_sorted.sort_unstable();
            let found = unique_column_sets
                .iter()
                .any(|actual| actual.iter().map(String::as_str).eq(expected_sorted.iter().copied()));
            if !found {
                bail!(
                    "table {}: missing unique constraint on ({})",
                    table.name,
                    expected.join(", ")
                );
            }
        }
        Ok(())
    }

    fn validate_foreign_keys(&self, conn: &Connection, table: &Table) -> Result<()> {
        struct ActualFk {
            from_column: String,
            to_table: String,
            to_column: String,
            on_delete: String,
        }

        // PRAGMA foreign_key_list columns: id, seq, table, from, to, on_update, on_delete, match
        let mut stmt = conn.prepare(&format!("PRAGMA foreign_key_list({})", table.name))?;
        let actual_fks: Vec<ActualFk> = stmt
            .query_map([], |row| {
                Ok(ActualFk {
                    from_column: row.get(3)?,
                    to_table: row.get(2)?,
                    to_column: row.get(4)?,
                    on_delete: row.get(6)?,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();

        for column in table.columns {
            let Some(expected) = column.foreign_key else {
                continue;
            };
            let matching = actual_fks.iter().find(|fk| fk.from_column == column.name);
            match matching {
                Some(fk)
                    if fk.to_table == expected.foreign_table
                        && fk.to_column == expected.foreign_column
                        && fk.on_delete == expected.on_delete.as_sql() => {}
                Some(fk) => bail!(
                    "table {} column {}: foreign key mismatch, expected REFERENCES {}({}) ON DELETE {}, found REFERENCES {}({}) ON DELETE {}",
                    table.name,
                    column.name,
                    expected.foreign_table,
                    expected.foreign_column,
                    expected.on_delete.as_sql(),
                    fk.to_table,
                    fk.to_column,
                    fk.on_delete
                ),
                None => bail!(
                    "table {} column {}: missing foreign key REFERENCES {}({}) ON DELETE {}",
                    table.name,
                    column.name,
                    expected.foreign_table,
                    expected.foreign_column,
                    expected.on_delete.as_sql()
                ),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PARENT_FK: ForeignKey = ForeignKey {
        foreign_table: "parents",
        foreign_column: "id",
        on_delete: OnDelete::Cascade,
    };

    const PARENTS: Table = Table {
        name: "parents",
        columns: &[
            sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
            sqlite_column!("name", &SqlType::Text, non_null = true),
        ],
        indices: &[("idx_parents_name", "name")],
        unique_constraints: &[&["name"]],
    };

    const CHILDREN: Table = Table {
        name: "children",
        columns: &[
            sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
            sqlite_column!("parent_id", &SqlType::Integer, non_null = true, foreign_key = Some(&PARENT_FK)),
        ],
        indices: &[],
        unique_constraints: &[],
    };

    const SCHEMA: VersionedSchema = VersionedSchema {
        version: 0,
        tables: &[PARENTS, CHILDREN],
        migration: None,
    };

    #[test]
    fn create_then_validate_round_trips() {
        let conn = Connection::open_in_memory().unwrap();
        SCHEMA.create(&conn).unwrap();
        SCHEMA.validate(&conn).unwrap();

        let version: i64 = conn
            .query_row("PRAGMA user_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(version, BASE_DB_VERSION as i64);
    }

    #[test]
    fn validate_detects_missing_index() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute(
            "CREATE TABLE parents (id INTEGER PRIMARY KEY, name TEXT NOT NULL, UNIQUE (name))",
            [],
        )
        .unwrap();
        conn.execute(
            "CREATE TABLE children (id INTEGER PRIMARY KEY, parent_id INTEGER NOT NULL \
             REFERENCES parents(id) ON DELETE CASCADE)",
            [],
        )
        .unwrap();

        let err = SCHEMA.validate(&conn).unwrap_err().to_string();
        assert!(err.contains("missing index"), "{err}");
    }

    #[test]
    fn validate_detects_missing_unique_constraint() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute(
            "CREATE TABLE parents (id INTEGER PRIMARY KEY, name TEXT NOT NULL)",
            [],
        )
        .unwrap();
        conn.execute("CREATE INDEX idx_parents_name ON parents(name)", [])
            .unwrap();
        conn.execute(
            "CREATE TABLE children (id INTEGER PRIMARY KEY, parent_id INTEGER NOT NULL \
             REFERENCES parents(id) ON DELETE CASCADE)",
            [],
        )
        .unwrap();

        let err = SCHEMA.validate(&conn).unwrap_err().to_string();
        assert!(err.contains("missing unique constraint"), "{err}");
    }

    #[test]
    fn validate_detects_wrong_on_delete_action() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute(
            "CREATE TABLE parents (id INTEGER PRIMARY KEY, name TEXT NOT NULL, UNIQUE (name))",
            [],
        )
        .unwrap();
        conn.execute("CREATE INDEX idx_parents_name ON parents(name)", [])
            .unwrap();
        conn.execute(
            "CREATE TABLE children (id INTEGER PRIMARY KEY, parent_id INTEGER NOT NULL \
             REFERENCES parents(id) ON DELETE RESTRICT)",
            [],
        )
        .unwrap();

        let err = SCHEMA.validate(&conn).unwrap_err().to_string();
        assert!(err.contains("foreign key mismatch"), "{err}");
        assert!(err.contains("CASCADE"), "{err}");
    }

    #[test]
    fn validate_detects_missing_column() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute("CREATE TABLE parents (id INTEGER PRIMARY KEY)", [])
            .unwrap();

        let err = SCHEMA.validate(&conn).unwrap_err().to_string();
        assert!(err.contains("expected 2 columns"), "{err}");
    }
}
