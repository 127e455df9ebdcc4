//! SQLite sink for export rows.
//!
//! Tables are not declared up front. Each table is created from the first row
//! written to it, and later rows that bring new keys extend it with
//! `ALTER TABLE ... ADD COLUMN`. Writes are `INSERT OR REPLACE` on the declared
//! primary key, so converting the same export twice yields the same rows.
//!
//! Foreign keys are declared but not enforced (`PRAGMA foreign_keys` stays off):
//! replacing a conversation row must not cascade into its messages.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use eyre::{Context, Result, eyre};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, params_from_iter};
use serde::Serialize;
use serde_json::Value;

use crate::importer::Record;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForeignKey {
    pub column: &'static str,
    pub other_table: &'static str,
    pub other_column: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSpec {
    pub name: &'static str,
    pub pk: &'static str,
    pub foreign_keys: &'static [ForeignKey],
}

pub const CONVERSATIONS: TableSpec = TableSpec {
    name: "conversations",
    pk: "uuid",
    foreign_keys: &[],
};

pub const MESSAGES: TableSpec = TableSpec {
    name: "messages",
    pk: "uuid",
    foreign_keys: &[ForeignKey {
        column: "conversation_id",
        other_table: "conversations",
        other_column: "uuid",
    }],
};

pub const ARTIFACTS: TableSpec = TableSpec {
    name: "artifacts",
    pk: "id",
    foreign_keys: &[
        ForeignKey {
            column: "message_id",
            other_table: "messages",
            other_column: "uuid",
        },
        ForeignKey {
            column: "conversation_id",
            other_table: "conversations",
            other_column: "uuid",
        },
    ],
};

pub struct Store {
    conn: Connection,
    // Known columns per table, ASCII-lowercased, filled lazily from `PRAGMA table_info`.
    // SQLite matches column names ignoring ASCII case.
    columns: HashMap<&'static str, HashSet<String>>,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .wrap_err_with(|| format!("Failed to open database: {}", path.display()))?;
        Ok(Self::with_connection(conn))
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().wrap_err("Failed to open in-memory database")?;
        Ok(Self::with_connection(conn))
    }

    fn with_connection(conn: Connection) -> Self {
        Self {
            conn,
            columns: HashMap::new(),
        }
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn begin(&self) -> Result<()> {
        self.conn
            .execute_batch("BEGIN")
            .wrap_err("Failed to begin transaction")
    }

    pub fn commit(&self) -> Result<()> {
        self.conn
            .execute_batch("COMMIT")
            .wrap_err("Failed to commit transaction")
    }

    /// Insert-or-replace one row, creating or widening the table as needed.
    pub fn upsert(&mut self, spec: &TableSpec, row: &Record) -> Result<()> {
        match row.get(spec.pk) {
            None | Some(Value::Null) => {
                return Err(eyre!(
                    "Row for table '{}' has no primary key '{}'",
                    spec.name,
                    spec.pk
                ));
            }
            Some(_) => {}
        }

        self.ensure_columns(spec, row)?;

        let names: Vec<String> = row.keys().map(|k| quote(k)).collect();
        let placeholders: Vec<String> = (1..=row.len()).map(|i| format!("?{}", i)).collect();
        let sql = format!(
            "INSERT OR REPLACE INTO {} ({}) VALUES ({})",
            quote(spec.name),
            names.join(", "),
            placeholders.join(", ")
        );

        let mut stmt = self
            .conn
            .prepare_cached(&sql)
            .wrap_err_with(|| format!("Failed to prepare insert into {}", spec.name))?;
        stmt.execute(params_from_iter(row.values().map(sql_value)))
            .wrap_err_with(|| format!("Failed to upsert into {}", spec.name))?;
        Ok(())
    }

    /// Upserts every row. Zero rows leave the database untouched; in
    /// particular the table is not created.
    pub fn upsert_all<'r, I>(&mut self, spec: &TableSpec, rows: I) -> Result<usize>
    where
        I: IntoIterator<Item = &'r Record>,
    {
        let mut count = 0;
        for row in rows {
            self.upsert(spec, row)?;
            count += 1;
        }
        Ok(count)
    }

    pub fn table_names(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()
            .wrap_err("Failed to list tables")?;
        Ok(names)
    }

    pub fn count(&self, table: &str) -> Result<u64> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote(table));
        let n: i64 = self
            .conn
            .query_row(&sql, [], |row| row.get(0))
            .wrap_err_with(|| format!("Failed to count rows in {}", table))?;
        Ok(n as u64)
    }

    fn ensure_columns(&mut self, spec: &TableSpec, row: &Record) -> Result<()> {
        if !self.columns.contains_key(spec.name) {
            let existing = self.table_columns(spec.name)?;
            if existing.is_empty() {
                self.create_table(spec, row)?;
                self.columns
                    .insert(spec.name, row.keys().map(|k| k.to_ascii_lowercase()).collect());
                return Ok(());
            }
            self.columns.insert(spec.name, existing);
        }

        let known = self.columns.entry(spec.name).or_default();
        for (column, value) in row {
            let folded = column.to_ascii_lowercase();
            if known.contains(&folded) {
                continue;
            }
            let sql = format!(
                "ALTER TABLE {} ADD COLUMN {} {}",
                quote(spec.name),
                quote(column),
                column_type(value)
            );
            self.conn
                .execute(&sql, [])
                .wrap_err_with(|| format!("Failed to add column {}.{}", spec.name, column))?;
            tracing::debug!(table = spec.name, column = %column, "added column");
            known.insert(folded);
        }
        Ok(())
    }

    fn create_table(&self, spec: &TableSpec, row: &Record) -> Result<()> {
        let mut defs: Vec<String> = row
            .iter()
            .map(|(column, value)| {
                let mut def = format!("{} {}", quote(column), column_type(value));
                if column == spec.pk {
                    def.push_str(" PRIMARY KEY");
                }
                def
            })
            .collect();

        for fk in spec.foreign_keys {
            if row.contains_key(fk.column) {
                defs.push(format!(
                    "FOREIGN KEY({}) REFERENCES {}({})",
                    quote(fk.column),
                    quote(fk.other_table),
                    quote(fk.other_column)
                ));
            }
        }

        let sql = format!("CREATE TABLE {} (\n   {}\n)", quote(spec.name), defs.join(",\n   "));
        self.conn
            .execute(&sql, [])
            .wrap_err_with(|| format!("Failed to create table {}", spec.name))?;
        tracing::debug!(table = spec.name, columns = row.len(), "created table");
        Ok(())
    }

    fn table_columns(&self, table: &str) -> Result<HashSet<String>> {
        let sql = format!("PRAGMA table_info({})", quote(table));
        let mut stmt = self.conn.prepare(&sql)?;
        let columns = stmt
            .query_map([], |row| row.get::<_, String>(1).map(|name| name.to_ascii_lowercase()))?
            .collect::<Result<HashSet<_>, _>>()
            .wrap_err_with(|| format!("Failed to read columns of {}", table))?;
        Ok(columns)
    }
}

/// Converts any serializable row type into a column map, keeping field order.
pub fn to_record<T: Serialize>(value: &T) -> Result<Record> {
    match serde_json::to_value(value).wrap_err("Failed to serialize row")? {
        Value::Object(map) => Ok(map),
        other => Err(eyre!("Expected a row object, got {}", other)),
    }
}

fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn column_type(value: &Value) -> &'static str {
    match value {
        Value::Bool(_) => "INTEGER",
        Value::Number(n) if n.is_i64() || n.is_u64() => "INTEGER",
        Value::Number(_) => "REAL",
        _ => "TEXT",
    }
}

// Nested objects and arrays are stored as their JSON text.
fn sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => n.as_f64().map_or(SqlValue::Null, SqlValue::Real),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}
