//! Declarative description of the durable store layout.
//!
//! The layout is expressed as the oldest table shape plus an ordered list of
//! additive column migrations, then the indexes that depend on them. The
//! client applies this plan to SQLite; the engine only checks that it is sound.

use crate::{error::Result, Error};
use serde::{Deserialize, Serialize};
use std::fmt;

/// SQLite storage classes used by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Integer,
    Text,
    Blob,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Integer => write!(f, "INTEGER"),
            ColumnType::Text => write!(f, "TEXT"),
            ColumnType::Blob => write!(f, "BLOB"),
        }
    }
}

/// Definition of one column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDef {
    /// Column name
    pub name: String,
    /// Storage class
    pub column_type: ColumnType,
    /// Whether NULL is rejected
    pub not_null: bool,
    /// SQL literal used as DEFAULT
    pub default: Option<String>,
    /// `INTEGER PRIMARY KEY AUTOINCREMENT`
    pub primary_key: bool,
}

impl ColumnDef {
    /// Auto-incrementing integer key.
    pub fn primary_key(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            column_type: ColumnType::Integer,
            not_null: true,
            default: None,
            primary_key: true,
        }
    }

    /// NOT NULL column without a default. Only valid in a base table.
    pub fn required(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            not_null: true,
            default: None,
            primary_key: false,
        }
    }

    /// Nullable column.
    pub fn optional(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            not_null: false,
            default: None,
            primary_key: false,
        }
    }

    /// Attach a DEFAULT (an SQL literal such as `0` or `'pending'`).
    pub fn with_default(mut self, literal: impl Into<String>) -> Self {
        self.default = Some(literal.into());
        self
    }

    /// Whether the column can be added to a populated table.
    pub fn is_additive(&self) -> bool {
        !self.primary_key && (!self.not_null || self.default.is_some())
    }

    /// Column definition as it appears after the column name.
    pub fn definition_sql(&self) -> String {
        if self.primary_key {
            return "INTEGER PRIMARY KEY AUTOINCREMENT".to_string();
        }
        let mut sql = self.column_type.to_string();
        if self.not_null {
            sql.push_str(" NOT NULL");
        }
        if let Some(default) = &self.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(default);
        }
        sql
    }
}

/// A table in its oldest shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableDef {
    pub name: String,
    pub columns: Vec<ColumnDef>,
}

impl TableDef {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnDef>) -> Self {
        Self {
            name: name.into(),
            columns,
        }
    }

    /// `CREATE TABLE IF NOT EXISTS ...`
    pub fn create_sql(&self) -> String {
        let columns: Vec<String> = self
            .columns
            .iter()
            .map(|c| format!("{} {}", c.name, c.definition_sql()))
            .collect();
        format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            self.name,
            columns.join(", ")
        )
    }
}

/// One additive migration step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddColumn {
    pub table: String,
    pub column: ColumnDef,
    /// Statement run once, right after the column is first added
    pub backfill: Option<String>,
}

impl AddColumn {
    pub fn new(table: impl Into<String>, column: ColumnDef) -> Self {
        Self {
            table: table.into(),
            column,
            backfill: None,
        }
    }

    /// Fix up pre-existing rows after the column appears.
    pub fn with_backfill(mut self, sql: impl Into<String>) -> Self {
        self.backfill = Some(sql.into());
        self
    }

    /// Stable step name, `table.column`.
    pub fn name(&self) -> String {
        format!("{}.{}", self.table, self.column.name)
    }

    /// `ALTER TABLE ... ADD COLUMN ...`
    pub fn alter_sql(&self) -> String {
        format!(
            "ALTER TABLE {} ADD COLUMN {} {}",
            self.table,
            self.column.name,
            self.column.definition_sql()
        )
    }
}

/// A secondary index, created after every migration has run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexDef {
    pub name: String,
    pub table: String,
    pub columns: Vec<String>,
}

impl IndexDef {
    pub fn new(name: impl Into<String>, table: impl Into<String>, columns: &[&str]) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
        }
    }

    /// `CREATE INDEX IF NOT EXISTS ...`
    pub fn create_sql(&self) -> String {
        format!(
            "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
            self.name,
            self.table,
            self.columns.join(", ")
        )
    }
}

/// Base tables, additive migrations in order, then indexes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationPlan {
    pub tables: Vec<TableDef>,
    pub migrations: Vec<AddColumn>,
    pub indexes: Vec<IndexDef>,
}

/// Table holding every queued mutation.
pub const MUTATIONS_TABLE: &str = "pending_mutations";

/// Single-row table holding pass bookkeeping.
pub const SYNC_STATE_TABLE: &str = "sync_state";

impl MigrationPlan {
    /// The layout the current release expects.
    ///
    /// `pending_mutations` starts in the shape the first offline-capable app
    /// release wrote; every later field arrives as an additive migration.
    pub fn current() -> Self {
        let tables = vec![
            TableDef::new(
                MUTATIONS_TABLE,
                vec![
                    ColumnDef::primary_key("id"),
                    ColumnDef::required("entity_type", ColumnType::Text),
                    ColumnDef::required("payload", ColumnType::Blob),
                    ColumnDef::required("created_at", ColumnType::Integer),
                    ColumnDef::required("synced", ColumnType::Integer).with_default("0"),
                ],
            ),
            TableDef::new(
                SYNC_STATE_TABLE,
                vec![
                    ColumnDef::primary_key("id"),
                    ColumnDef::optional("last_sync_at", ColumnType::Integer),
                ],
            ),
        ];

        let add = |column: ColumnDef| AddColumn::new(MUTATIONS_TABLE, column);
        let migrations = vec![
            add(ColumnDef::required("attempts", ColumnType::Integer).with_default("0")),
            add(ColumnDef::optional("last_attempt_at", ColumnType::Integer)),
            add(ColumnDef::optional("last_error", ColumnType::Text)),
            add(ColumnDef::required("operation_type", ColumnType::Text).with_default("'create'")),
            add(ColumnDef::optional("entity_id", ColumnType::Text)),
            add(ColumnDef::required("priority", ColumnType::Integer).with_default("20")),
            add(ColumnDef::required("status", ColumnType::Text).with_default("'pending'"))
                .with_backfill(
                    "UPDATE pending_mutations SET status = 'done' WHERE synced = 1",
                ),
            add(ColumnDef::required("client_ref", ColumnType::Text).with_default("''")),
            add(ColumnDef::required("schema_version", ColumnType::Integer).with_default("1")),
            add(ColumnDef::optional("last_error_class", ColumnType::Text)),
        ];

        let indexes = vec![
            IndexDef::new(
                "idx_pending_synced_attempts",
                MUTATIONS_TABLE,
                &["synced", "attempts"],
            ),
            IndexDef::new(
                "idx_pending_status_priority",
                MUTATIONS_TABLE,
                &["status", "priority"],
            ),
            IndexDef::new(
                "idx_pending_synced_entity",
                MUTATIONS_TABLE,
                &["synced", "entity_type"],
            ),
        ];

        Self {
            tables,
            migrations,
            indexes,
        }
    }

    /// Columns a table has once every migration has run, in order.
    pub fn final_columns(&self, table: &str) -> Vec<&str> {
        let base = self
            .tables
            .iter()
            .filter(|t| t.name == table)
            .flat_map(|t| t.columns.iter().map(|c| c.name.as_str()));
        let added = self
            .migrations
            .iter()
            .filter(|m| m.table == table)
            .map(|m| m.column.name.as_str());
        base.chain(added).collect()
    }

    /// Check the plan only adds, and that indexes only name known columns.
    pub fn validate(&self) -> Result<()> {
        for step in &self.migrations {
            if !self.tables.iter().any(|t| t.name == step.table) {
                return Err(Error::UnknownTable(step.table.clone()));
            }
            if !step.column.is_additive() {
                return Err(Error::NonAdditiveColumn {
                    table: step.table.clone(),
                    column: step.column.name.clone(),
                });
            }
        }

        for index in &self.indexes {
            if !self.tables.iter().any(|t| t.name == index.table) {
                return Err(Error::UnknownTable(index.table.clone()));
            }
            let known = self.final_columns(&index.table);
            for column in &index.columns {
                if !known.contains(&column.as_str()) {
                    return Err(Error::UnknownIndexColumn {
                        index: index.name.clone(),
                        column: column.clone(),
                    });
                }
            }
        }

        Ok(())
    }
}
