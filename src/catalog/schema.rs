use crate::catalog::types::ColumnType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub col_type: ColumnType,
    pub nullable: bool,
    #[serde(default)]
    pub auto_increment: bool,
    /// Columns in other tables whose foreign keys point at this column.
    #[serde(default)]
    pub referrers: Vec<ColumnRefDef>,
    /// Tables this column discriminates between under single-table inheritance.
    #[serde(default)]
    pub inheritance: Vec<String>,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, col_type: ColumnType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            col_type,
            nullable,
            auto_increment: false,
            referrers: Vec::new(),
            inheritance: Vec::new(),
        }
    }

    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    pub fn has_referrers(&self) -> bool {
        !self.referrers.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ColumnRefDef {
    pub table: String,
    pub column: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ForeignKey {
    pub name: String,
    pub columns: Vec<String>,
    pub references_table: String,
    pub references_columns: Vec<String>,
    pub on_delete: ForeignKeyAction,
    pub on_update: ForeignKeyAction,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ForeignKeyAction {
    Restrict,
    Cascade,
    SetNull,
    NoAction,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TableSchema {
    pub table_name: String,
    pub columns: Vec<ColumnDef>,
    pub primary_key: Vec<String>,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKey>,
    /// Names of the schema extensions already applied to this table.
    #[serde(default)]
    pub behaviors: BTreeSet<String>,
    /// Set on archive tables produced by the workspace extension. Archive
    /// tables are never augmented themselves.
    #[serde(default)]
    pub is_version_table: bool,
}

impl TableSchema {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            columns: Vec::new(),
            primary_key: Vec::new(),
            foreign_keys: Vec::new(),
            behaviors: BTreeSet::new(),
            is_version_table: false,
        }
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn is_primary_key(&self, name: &str) -> bool {
        self.primary_key.iter().any(|c| c == name)
    }

    pub fn has_behavior(&self, behavior: &str) -> bool {
        self.behaviors.contains(behavior)
    }

    /// Appends `column`; when `primary_key` is set the column also joins the
    /// primary key.
    pub fn add_column(&mut self, column: ColumnDef, primary_key: bool) {
        if primary_key && !self.is_primary_key(&column.name) {
            self.primary_key.push(column.name.clone());
        }
        self.columns.push(column);
    }
}
