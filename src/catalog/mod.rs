pub mod schema;
pub mod types;

use crate::catalog::schema::{ColumnDef, TableSchema};
use crate::error::{ResourceType, WsdbError};
use im::OrdMap;
use serde::{Deserialize, Serialize};

/// Schema metadata for one database: its tables, the table-name prefix shared
/// by them, and a counter bumped whenever a table is added or reshaped.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Catalog {
    pub table_prefix: Option<String>,
    pub tables: OrdMap<String, TableSchema>,
    pub structural_version: u64,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table_prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        self.table_prefix = (!prefix.is_empty()).then_some(prefix);
        self
    }

    pub fn snapshot(&self) -> Self {
        self.clone()
    }

    pub fn has_table(&self, table_name: &str) -> bool {
        self.tables.contains_key(table_name)
    }

    pub fn table(&self, table_name: &str) -> Result<&TableSchema, WsdbError> {
        self.tables
            .get(table_name)
            .ok_or_else(|| WsdbError::table_not_found(table_name))
    }

    pub fn table_mut(&mut self, table_name: &str) -> Result<&mut TableSchema, WsdbError> {
        self.tables
            .get_mut(table_name)
            .ok_or_else(|| WsdbError::table_not_found(table_name))
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }

    pub fn create_table(&mut self, schema: TableSchema) -> Result<(), WsdbError> {
        if schema.table_name.trim().is_empty() {
            return Err(WsdbError::Validation("table name must not be empty".into()));
        }
        if self.tables.contains_key(&schema.table_name) {
            return Err(WsdbError::AlreadyExists {
                resource_type: ResourceType::Table,
                resource_id: schema.table_name,
            });
        }
        validate_table(&schema)?;
        self.tables.insert(schema.table_name.clone(), schema);
        self.structural_version += 1;
        Ok(())
    }

    pub fn add_column(
        &mut self,
        table_name: &str,
        column: ColumnDef,
        primary_key: bool,
    ) -> Result<(), WsdbError> {
        let table = self.table_mut(table_name)?;
        if table.has_column(&column.name) {
            return Err(WsdbError::AlreadyExists {
                resource_type: ResourceType::Column,
                resource_id: format!("{table_name}.{}", column.name),
            });
        }
        table.add_column(column, primary_key);
        self.structural_version += 1;
        Ok(())
    }

    /// Finds the single non-archive table owning `column`. Archive tables
    /// mirror their base table's columns, so they are excluded to keep the
    /// lookup unambiguous.
    pub fn resolve_table_for_column(&self, column: &str) -> Result<&TableSchema, WsdbError> {
        let mut owners = self
            .tables
            .values()
            .filter(|t| !t.is_version_table && t.has_column(column));
        match (owners.next(), owners.next()) {
            (Some(table), None) => Ok(table),
            (None, _) => Err(WsdbError::AmbiguousCriteria {
                reason: format!("no table owns column '{column}'"),
            }),
            (Some(first), Some(second)) => Err(WsdbError::AmbiguousCriteria {
                reason: format!(
                    "column '{column}' exists in '{}' and '{}'; qualify the column or name the table",
                    first.table_name, second.table_name
                ),
            }),
        }
    }
}

fn validate_table(schema: &TableSchema) -> Result<(), WsdbError> {
    let mut seen = std::collections::BTreeSet::new();
    for column in &schema.columns {
        if !seen.insert(column.name.as_str()) {
            return Err(WsdbError::AlreadyExists {
                resource_type: ResourceType::Column,
                resource_id: format!("{}.{}", schema.table_name, column.name),
            });
        }
    }
    for pk in &schema.primary_key {
        if !schema.has_column(pk) {
            return Err(WsdbError::UnknownColumn {
                table: schema.table_name.clone(),
                column: pk.clone(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::Catalog;
    use crate::catalog::schema::{ColumnDef, TableSchema};
    use crate::catalog::types::ColumnType;
    use crate::error::WsdbErrorCode;

    fn table(name: &str, columns: &[&str]) -> TableSchema {
        let mut schema = TableSchema::new(name);
        for column in columns {
            schema.add_column(
                ColumnDef::new(*column, ColumnType::Integer, false),
                *column == "id",
            );
        }
        schema
    }

    #[test]
    fn create_table_rejects_duplicates() {
        let mut catalog = Catalog::new();
        catalog.create_table(table("book", &["id"])).expect("create");
        let err = catalog
            .create_table(table("book", &["id"]))
            .expect_err("duplicate");
        assert_eq!(err.code(), WsdbErrorCode::TableAlreadyExists);
        assert_eq!(catalog.structural_version, 1);
    }

    #[test]
    fn resolve_table_for_column_requires_unique_owner() {
        let mut catalog = Catalog::new();
        catalog
            .create_table(table("book", &["id", "title"]))
            .expect("book");
        catalog
            .create_table(table("author", &["id", "name"]))
            .expect("author");

        assert_eq!(
            catalog
                .resolve_table_for_column("title")
                .expect("title")
                .table_name,
            "book"
        );
        let err = catalog.resolve_table_for_column("id").expect_err("ambiguous");
        assert_eq!(err.code(), WsdbErrorCode::AmbiguousCriteria);
        let err = catalog
            .resolve_table_for_column("missing")
            .expect_err("missing");
        assert_eq!(err.code(), WsdbErrorCode::AmbiguousCriteria);
    }

    #[test]
    fn add_column_rejects_existing_column() {
        let mut catalog = Catalog::new();
        catalog.create_table(table("book", &["id"])).expect("book");
        let err = catalog
            .add_column("book", ColumnDef::new("id", ColumnType::Integer, false), false)
            .expect_err("dup");
        assert_eq!(err.code(), WsdbErrorCode::ColumnAlreadyExists);
    }
}
