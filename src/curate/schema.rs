//! Declarative table schemas.
//!
//! A [`TableSchema`] lists its columns in output order. Each column knows its
//! SQL type, the upstream key it is renamed from, and whether it is part of
//! the merge key used for upserts. Everything the transform and the load
//! step need (rename map, select list, DDL, upsert statement) is derived
//! from that list.

use std::collections::HashMap;
use std::fmt;

/// Table that curated footprint records land in.
pub const CARBON_FOOTPRINT_TABLE: &str = "carbon_footprint";

/// Storage type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// 64-bit signed integer.
    Integer,
    /// Double precision float.
    Real,
    /// UTF-8 text.
    Text,
}

impl ColumnType {
    /// SQLite type name.
    #[must_use]
    pub fn sql_type(self) -> &'static str {
        match self {
            Self::Integer => "INTEGER",
            Self::Real => "REAL",
            Self::Text => "TEXT",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Integer => "integer",
            Self::Real => "real",
            Self::Text => "text",
        })
    }
}

/// One output column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    /// Output column name.
    pub name: &'static str,
    /// Storage type.
    pub column_type: ColumnType,
    /// Upstream key this column is renamed from, if it differs from `name`.
    pub rename: Option<&'static str>,
    /// Part of the upsert merge key.
    pub merge_key: bool,
}

impl Column {
    /// Creates a column read from the upstream key of the same name.
    #[must_use]
    pub const fn new(name: &'static str, column_type: ColumnType) -> Self {
        Self {
            name,
            column_type,
            rename: None,
            merge_key: false,
        }
    }

    /// Reads the column from a differently named upstream key.
    #[must_use]
    pub const fn renamed_from(mut self, source: &'static str) -> Self {
        self.rename = Some(source);
        self
    }

    /// Marks the column as part of the merge key.
    #[must_use]
    pub const fn merge_key(mut self) -> Self {
        self.merge_key = true;
        self
    }

    /// The upstream key this column is read from.
    #[must_use]
    pub fn source_key(&self) -> &'static str {
        self.rename.unwrap_or(self.name)
    }
}

/// Ordered set of columns for one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    table: &'static str,
    columns: Vec<Column>,
}

impl TableSchema {
    /// Creates a schema.
    #[must_use]
    pub fn new(table: &'static str, columns: Vec<Column>) -> Self {
        Self { table, columns }
    }

    /// Schema of the curated footprint table.
    #[must_use]
    pub fn carbon_footprint() -> Self {
        use ColumnType::{Integer, Real, Text};

        Self::new(
            CARBON_FOOTPRINT_TABLE,
            vec![
                Column::new("year", Integer).merge_key(),
                Column::new("country_code", Integer)
                    .renamed_from("countryCode")
                    .merge_key(),
                Column::new("country_name", Text).renamed_from("countryName"),
                Column::new("short_name", Text).renamed_from("shortName"),
                Column::new("isoa2", Text),
                Column::new("record", Text).merge_key(),
                Column::new("crop_land", Real).renamed_from("cropLand"),
                Column::new("grazing_land", Real).renamed_from("grazingLand"),
                Column::new("forest_land", Real).renamed_from("forestLand"),
                Column::new("fishing_ground", Real).renamed_from("fishingGround"),
                Column::new("builtup_land", Real).renamed_from("builtupLand"),
                Column::new("carbon", Real),
                Column::new("value", Real),
                Column::new("score", Text),
            ],
        )
    }

    /// Table name.
    #[must_use]
    pub fn table(&self) -> &'static str {
        self.table
    }

    /// Columns in output order.
    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Upstream key to output name, for renamed columns only.
    #[must_use]
    pub fn rename_map(&self) -> HashMap<&'static str, &'static str> {
        self.columns
            .iter()
            .filter_map(|column| column.rename.map(|source| (source, column.name)))
            .collect()
    }

    /// Output column names in order.
    #[must_use]
    pub fn select_list(&self) -> Vec<&'static str> {
        self.columns.iter().map(|column| column.name).collect()
    }

    /// Merge key column names in order.
    #[must_use]
    pub fn merge_keys(&self) -> Vec<&'static str> {
        self.columns
            .iter()
            .filter(|column| column.merge_key)
            .map(|column| column.name)
            .collect()
    }

    /// `CREATE TABLE IF NOT EXISTS` statement. Merge keys are `NOT NULL` and
    /// jointly unique so they can be the upsert conflict target.
    #[must_use]
    pub fn create_table_sql(&self) -> String {
        let mut definitions: Vec<String> = self
            .columns
            .iter()
            .map(|column| {
                let not_null = if column.merge_key { " NOT NULL" } else { "" };
                format!(
                    "{} {}{not_null}",
                    quote(column.name),
                    column.column_type.sql_type()
                )
            })
            .collect();

        let keys = self.merge_keys();
        if !keys.is_empty() {
            definitions.push(format!("UNIQUE ({})", quote_list(&keys)));
        }

        format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            quote(self.table),
            definitions.join(", ")
        )
    }

    /// Parameterised `INSERT ... ON CONFLICT DO UPDATE` statement binding
    /// every column in order.
    #[must_use]
    pub fn upsert_sql(&self) -> String {
        let names = self.select_list();
        let placeholders = vec!["?"; names.len()].join(", ");
        let insert = format!(
            "INSERT INTO {} ({}) VALUES ({placeholders})",
            quote(self.table),
            quote_list(&names)
        );

        let keys = self.merge_keys();
        if keys.is_empty() {
            return insert;
        }

        let updates: Vec<String> = self
            .columns
            .iter()
            .filter(|column| !column.merge_key)
            .map(|column| format!("{0} = excluded.{0}", quote(column.name)))
            .collect();
        let action = if updates.is_empty() {
            "DO NOTHING".to_string()
        } else {
            format!("DO UPDATE SET {}", updates.join(", "))
        };

        format!("{insert} ON CONFLICT ({}) {action}", quote_list(&keys))
    }
}

fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

fn quote_list(identifiers: &[&str]) -> String {
    identifiers
        .iter()
        .map(|identifier| quote(identifier))
        .collect::<Vec<_>>()
        .join(", ")
}
