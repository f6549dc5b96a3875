use crate::catalog::Catalog;
use crate::catalog::schema::{ColumnDef, ForeignKey, ForeignKeyAction, TableSchema};
use crate::catalog::types::ColumnType;
use crate::error::WsdbError;
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    pub table_name: String,
    pub if_not_exists: bool,
    pub columns: Vec<ColumnDef>,
    pub primary_key: Vec<String>,
    pub foreign_keys: Vec<ForeignKey>,
}

impl TableSpec {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            if_not_exists: true,
            columns: Vec::new(),
            primary_key: Vec::new(),
            foreign_keys: Vec::new(),
        }
    }

    pub fn if_not_exists(mut self, if_not_exists: bool) -> Self {
        self.if_not_exists = if_not_exists;
        self
    }

    pub fn column(mut self, name: impl Into<String>, col_type: ColumnType, nullable: bool) -> Self {
        self.columns.push(ColumnDef::new(name, col_type, nullable));
        self
    }

    /// Adds a non-null integer column filled from a per-table counter.
    pub fn auto_increment_column(mut self, name: impl Into<String>) -> Self {
        self.columns
            .push(ColumnDef::new(name, ColumnType::Integer, false).auto_increment());
        self
    }

    pub fn primary_key(mut self, primary_key: &[&str]) -> Self {
        self.primary_key = primary_key.iter().map(|c| (*c).to_string()).collect();
        self
    }

    pub fn foreign_key(
        mut self,
        name: impl Into<String>,
        columns: &[&str],
        references_table: impl Into<String>,
        references_columns: &[&str],
    ) -> Self {
        self.foreign_keys.push(ForeignKey {
            name: name.into(),
            columns: columns.iter().map(|c| (*c).to_string()).collect(),
            references_table: references_table.into(),
            references_columns: references_columns.iter().map(|c| (*c).to_string()).collect(),
            on_delete: ForeignKeyAction::Restrict,
            on_update: ForeignKeyAction::Restrict,
        });
        self
    }

    pub fn validate(&self) -> Result<(), WsdbError> {
        if self.columns.is_empty() {
            return Err(WsdbError::Validation(format!(
                "table '{}' must define at least one column",
                self.table_name
            )));
        }
        if self.primary_key.is_empty() {
            return Err(WsdbError::Validation(format!(
                "table '{}' must define a primary key",
                self.table_name
            )));
        }

        let col_names = self
            .columns
            .iter()
            .map(|c| c.name.as_str())
            .collect::<BTreeSet<_>>();
        for pk in &self.primary_key {
            if !col_names.contains(pk.as_str()) {
                return Err(WsdbError::Validation(format!(
                    "table '{}' primary key column '{}' is not declared",
                    self.table_name, pk
                )));
            }
        }
        for fk in &self.foreign_keys {
            if fk.columns.is_empty() || fk.columns.len() != fk.references_columns.len() {
                return Err(WsdbError::Validation(format!(
                    "foreign key '{}' on table '{}' must pair each column with a referenced column",
                    fk.name, self.table_name
                )));
            }
            for col in &fk.columns {
                if !col_names.contains(col.as_str()) {
                    return Err(WsdbError::Validation(format!(
                        "foreign key '{}' on table '{}' references unknown column '{}'",
                        fk.name, self.table_name, col
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn to_schema(&self) -> Result<TableSchema, WsdbError> {
        self.validate()?;
        let mut schema = TableSchema::new(self.table_name.clone());
        for column in &self.columns {
            schema.add_column(column.clone(), false);
        }
        schema.primary_key = self.primary_key.clone();
        schema.foreign_keys = self.foreign_keys.clone();
        Ok(schema)
    }

    /// Creates the table in `catalog`. Returns `false` when the table already
    /// exists and `if_not_exists` is set.
    pub fn apply(&self, catalog: &mut Catalog) -> Result<bool, WsdbError> {
        let schema = self.to_schema()?;
        if self.if_not_exists && catalog.has_table(&self.table_name) {
            return Ok(false);
        }
        catalog.create_table(schema)?;
        Ok(true)
    }
}
