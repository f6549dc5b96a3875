use crate::behavior::{SchemaBuilder, SchemaExtension};
use crate::catalog::Catalog;
use crate::catalog::schema::{ColumnDef, TableSchema};
use crate::catalog::types::{ColumnType, Row, Value};
use crate::config::WorkspaceConfig;
use crate::error::{ResourceType, WsdbError};
use crate::query::plan::Criteria;
use crate::workspace::action::WorkspaceAction;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info};

/// Behavior tag recorded on every augmented table.
pub const WORKSPACE_BEHAVIOR: &str = "workspace";

/// Names and layout of one governed table and its archive, resolved once
/// when the schema is derived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GovernedTable {
    pub table_name: String,
    pub version_table: String,
    pub column_prefix: String,
    /// Base table columns in storage order, audit columns included.
    pub columns: Vec<String>,
    /// Archive columns in storage order, revision column included.
    pub version_columns: Vec<String>,
    pub id_column: String,
    pub action_column: String,
    pub action_date_column: String,
    pub action_user_column: String,
    pub rev_column: String,
}

impl GovernedTable {
    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    /// Value of `column` in a base-table row.
    pub fn get<'r>(&self, row: &'r Row, column: &str) -> Option<&'r Value> {
        self.column_index(column).and_then(|idx| row.get(idx))
    }

    /// Value of `column` in an archive row.
    pub fn get_version<'r>(&self, row: &'r Row, column: &str) -> Option<&'r Value> {
        self.version_columns
            .iter()
            .position(|c| c == column)
            .and_then(|idx| row.get(idx))
    }

    pub fn workspace_of(&self, row: &Row) -> Option<i64> {
        self.get(row, &self.id_column).and_then(Value::as_i64)
    }

    pub fn action_of(&self, row: &Row) -> Option<WorkspaceAction> {
        self.get(row, &self.action_column)
            .and_then(Value::as_i64)
            .and_then(|code| WorkspaceAction::from_code(code).ok())
    }
}

/// Adds workspace scoping and audit columns to tables and derives their
/// archive tables.
#[derive(Debug, Clone)]
pub struct WorkspaceBehavior {
    config: WorkspaceConfig,
}

impl WorkspaceBehavior {
    pub fn new(config: WorkspaceConfig) -> Result<Self, WsdbError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &WorkspaceConfig {
        &self.config
    }

    /// Archive table name for `table_name`: the configured override, or the
    /// table's name without the catalog prefix plus the version suffix.
    pub fn version_table_name(
        &self,
        catalog: &Catalog,
        table_name: &str,
    ) -> Result<String, WsdbError> {
        if let Some(name) = self.config.version_tables.get(table_name) {
            return Ok(name.clone());
        }
        if table_name.trim().is_empty() {
            return Err(WsdbError::SchemaDerivation {
                table: table_name.to_string(),
                message: "table name is empty".into(),
            });
        }
        let prefix = catalog.table_prefix.as_deref().unwrap_or("");
        let base = table_name.strip_prefix(prefix).unwrap_or(table_name);
        if base.is_empty() {
            return Err(WsdbError::SchemaDerivation {
                table: table_name.to_string(),
                message: format!("name is nothing but the table prefix '{prefix}'"),
            });
        }
        Ok(format!("{base}{}", self.config.version_suffix))
    }

    /// Adds the four audit columns to `table_name` where missing, tags the
    /// table and makes sure its archive exists. Repeating the call changes
    /// nothing.
    pub fn augment(
        &self,
        catalog: &mut Catalog,
        table_name: &str,
    ) -> Result<GovernedTable, WsdbError> {
        let table = catalog.table(table_name)?;
        if table.is_version_table {
            return Err(WsdbError::SchemaDerivation {
                table: table_name.to_string(),
                message: "archive tables are never governed".into(),
            });
        }
        let version_name = self.version_table_name(catalog, table_name)?;
        if version_name == table_name {
            return Err(WsdbError::SchemaDerivation {
                table: table_name.to_string(),
                message: "archive table name equals the table name".into(),
            });
        }

        let mut added = 0usize;
        for (column, primary_key) in self.audit_columns() {
            if catalog.table(table_name)?.has_column(&column.name) {
                continue;
            }
            catalog.add_column(table_name, column, primary_key)?;
            added += 1;
        }
        catalog
            .table_mut(table_name)?
            .behaviors
            .insert(WORKSPACE_BEHAVIOR.to_string());
        if added > 0 {
            info!(table = table_name, columns = added, "workspace columns added");
        }

        self.ensure_version_table(catalog, table_name)?;
        self.describe(catalog, table_name)
    }

    /// Returns the archive definition for `table_name`, creating it from the
    /// table's current columns if it does not exist yet.
    pub fn ensure_version_table(
        &self,
        catalog: &mut Catalog,
        table_name: &str,
    ) -> Result<TableSchema, WsdbError> {
        let version_name = self.version_table_name(catalog, table_name)?;
        if let Ok(existing) = catalog.table(&version_name) {
            return Ok(existing.clone());
        }

        let source = catalog.table(table_name)?;
        let mut version = TableSchema::new(version_name.clone());
        for column in &source.columns {
            let mut clone = column.clone();
            clone.auto_increment = false;
            clone.referrers.clear();
            clone.inheritance.clear();
            version.add_column(clone, false);
        }
        version.add_column(
            ColumnDef::new(self.config.rev_column(), ColumnType::Integer, false).auto_increment(),
            true,
        );
        version.is_version_table = true;

        catalog.create_table(version.clone())?;
        info!(
            table = table_name,
            version_table = %version_name,
            "version table created"
        );
        Ok(version)
    }

    /// Descriptor for an already augmented table.
    pub fn describe(&self, catalog: &Catalog, table_name: &str) -> Result<GovernedTable, WsdbError> {
        let table = catalog.table(table_name)?;
        if !table.has_behavior(WORKSPACE_BEHAVIOR) {
            return Err(WsdbError::NotGoverned {
                table: table_name.to_string(),
            });
        }
        let version_name = self.version_table_name(catalog, table_name)?;
        let version = catalog
            .table(&version_name)
            .map_err(|_| WsdbError::NotFound {
                resource_type: ResourceType::VersionTable,
                resource_id: version_name.clone(),
            })?;

        let required = [
            self.config.id_column(),
            self.config.action_column(),
            self.config.action_date_column(),
            self.config.action_user_column(),
        ];
        for column in &required {
            if !table.has_column(column) {
                return Err(missing_column(table_name, column));
            }
        }
        for column in table.columns.iter().map(|c| &c.name) {
            if !version.has_column(column) {
                return Err(missing_column(&version_name, column));
            }
        }
        let rev_column = self.config.rev_column();
        if !version.has_column(&rev_column) {
            return Err(missing_column(&version_name, &rev_column));
        }

        let [id_column, action_column, action_date_column, action_user_column] = required;
        Ok(GovernedTable {
            table_name: table_name.to_string(),
            version_table: version_name,
            column_prefix: self.config.column_prefix.clone(),
            columns: table.column_names(),
            version_columns: version.column_names(),
            id_column,
            action_column,
            action_date_column,
            action_user_column,
            rev_column,
        })
    }

    fn audit_columns(&self) -> [(ColumnDef, bool); 4] {
        [
            (
                ColumnDef::new(self.config.id_column(), ColumnType::Integer, false),
                true,
            ),
            (
                ColumnDef::new(self.config.action_column(), ColumnType::Integer, true),
                false,
            ),
            (
                ColumnDef::new(self.config.action_date_column(), ColumnType::Integer, true),
                false,
            ),
            (
                ColumnDef::new(self.config.action_user_column(), ColumnType::Integer, true),
                false,
            ),
        ]
    }
}

impl SchemaExtension for WorkspaceBehavior {
    fn name(&self) -> &str {
        WORKSPACE_BEHAVIOR
    }

    /// Augments every table that is not an archive, not excluded and not the
    /// archive target of another table.
    fn modify_database(&mut self, catalog: &mut Catalog) -> Result<(), WsdbError> {
        let candidates: Vec<String> = catalog
            .tables
            .values()
            .filter(|t| !t.is_version_table && !self.config.exclude.contains(&t.table_name))
            .map(|t| t.table_name.clone())
            .collect();
        let mut archive_targets = BTreeSet::new();
        for name in &candidates {
            archive_targets.insert(self.version_table_name(catalog, name)?);
        }
        for name in candidates {
            if archive_targets.contains(&name) {
                debug!(table = %name, "skipping archive target");
                continue;
            }
            self.augment(catalog, &name)?;
        }
        Ok(())
    }
}

/// Augmented catalog plus the descriptor of every governed table. Immutable
/// once derived.
#[derive(Debug, Clone)]
pub struct GovernedSchema {
    catalog: Arc<Catalog>,
    config: WorkspaceConfig,
    tables: BTreeMap<String, GovernedTable>,
}

impl GovernedSchema {
    /// Applies [`WorkspaceBehavior`] database-wide and resolves descriptors.
    pub fn derive(catalog: Catalog, config: WorkspaceConfig) -> Result<Self, WsdbError> {
        Self::derive_with(catalog, config, SchemaBuilder::new())
    }

    /// Like [`GovernedSchema::derive`], running `builder`'s extensions
    /// alongside the workspace behavior.
    pub fn derive_with(
        catalog: Catalog,
        config: WorkspaceConfig,
        builder: SchemaBuilder,
    ) -> Result<Self, WsdbError> {
        let behavior = WorkspaceBehavior::new(config.clone())?;
        let catalog = builder.with_extension(behavior).build(catalog)?;
        Self::from_catalog(catalog, config)
    }

    /// Resolves descriptors for tables of an already augmented catalog.
    pub fn from_catalog(catalog: Catalog, config: WorkspaceConfig) -> Result<Self, WsdbError> {
        let behavior = WorkspaceBehavior::new(config.clone())?;
        let mut tables = BTreeMap::new();
        for table in catalog.tables.values() {
            if table.is_version_table || !table.has_behavior(WORKSPACE_BEHAVIOR) {
                continue;
            }
            let governed = behavior.describe(&catalog, &table.table_name)?;
            tables.insert(table.table_name.clone(), governed);
        }
        debug!(governed = tables.len(), "governed schema resolved");
        Ok(Self {
            catalog: Arc::new(catalog),
            config,
            tables,
        })
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn config(&self) -> &WorkspaceConfig {
        &self.config
    }

    pub fn governed(&self, table_name: &str) -> Option<&GovernedTable> {
        self.tables.get(table_name)
    }

    pub fn governed_tables(&self) -> impl Iterator<Item = &GovernedTable> {
        self.tables.values()
    }

    /// Governed table targeted by `criteria`: its explicit table, else the
    /// qualifier of its first entry, else the single table owning that
    /// entry's column.
    pub fn resolve_target(&self, criteria: &Criteria) -> Result<&GovernedTable, WsdbError> {
        let table_name = match criteria.primary_table() {
            Some(table) => table.to_string(),
            None => {
                let first = criteria.entries().first().ok_or_else(|| {
                    WsdbError::AmbiguousCriteria {
                        reason: "criteria names no table and has no entries".into(),
                    }
                })?;
                match &first.table {
                    Some(table) => table.clone(),
                    None => self
                        .catalog
                        .resolve_table_for_column(&first.column)?
                        .table_name
                        .clone(),
                }
            }
        };
        self.catalog.table(&table_name)?;
        self.tables
            .get(&table_name)
            .ok_or(WsdbError::NotGoverned { table: table_name })
    }
}

fn missing_column(table: &str, column: &str) -> WsdbError {
    WsdbError::SchemaDerivation {
        table: table.to_string(),
        message: format!("required column '{column}' is missing"),
    }
}

#[cfg(test)]
mod tests {
    use super::{GovernedSchema, WORKSPACE_BEHAVIOR, WorkspaceBehavior};
    use crate::catalog::Catalog;
    use crate::catalog::schema::{ColumnDef, TableSchema};
    use crate::catalog::types::ColumnType;
    use crate::config::WorkspaceConfig;
    use crate::error::WsdbErrorCode;
    use crate::query::plan::Criteria;

    fn book() -> TableSchema {
        let mut table = TableSchema::new("app_book");
        table.add_column(
            ColumnDef::new("id", ColumnType::Integer, false).auto_increment(),
            true,
        );
        table.add_column(ColumnDef::new("title", ColumnType::Text, true), false);
        table
    }

    fn catalog() -> Catalog {
        let mut catalog = Catalog::new().with_table_prefix("app_");
        catalog.create_table(book()).expect("book");
        catalog
    }

    #[test]
    fn version_name_strips_table_prefix() {
        let behavior = WorkspaceBehavior::new(WorkspaceConfig::default()).expect("behavior");
        let catalog = catalog();
        assert_eq!(
            behavior
                .version_table_name(&catalog, "app_book")
                .expect("name"),
            "book_version"
        );
        let err = behavior
            .version_table_name(&catalog, "app_")
            .expect_err("prefix only");
        assert_eq!(err.code(), WsdbErrorCode::SchemaDerivation);

        let behavior = WorkspaceBehavior::new(
            WorkspaceConfig::default().with_version_table("app_book", "book_history"),
        )
        .expect("behavior");
        assert_eq!(
            behavior
                .version_table_name(&catalog, "app_book")
                .expect("name"),
            "book_history"
        );
    }

    #[test]
    fn augment_adds_audit_columns_and_archive_once() {
        let behavior = WorkspaceBehavior::new(WorkspaceConfig::default()).expect("behavior");
        let mut catalog = catalog();
        let governed = behavior.augment(&mut catalog, "app_book").expect("augment");
        let version_after_first = catalog.structural_version;
        let again = behavior.augment(&mut catalog, "app_book").expect("again");

        assert_eq!(governed, again);
        assert_eq!(catalog.structural_version, version_after_first);
        assert_eq!(
            governed.columns,
            vec![
                "id",
                "title",
                "workspace_id",
                "workspace_action",
                "workspace_action_date",
                "workspace_action_user"
            ]
        );

        let table = catalog.table("app_book").expect("table");
        assert_eq!(table.primary_key, vec!["id", "workspace_id"]);
        assert!(table.has_behavior(WORKSPACE_BEHAVIOR));

        let version = catalog.table("book_version").expect("archive");
        assert!(version.is_version_table);
        assert_eq!(version.primary_key, vec!["workspace_rev"]);
        assert!(!version.column("id").expect("id").auto_increment);
        assert!(version.column("workspace_rev").expect("rev").auto_increment);
        assert_eq!(version.columns.len(), 7);
    }

    #[test]
    fn existing_columns_are_not_duplicated() {
        let mut table = book();
        table.add_column(ColumnDef::new("workspace_id", ColumnType::Integer, false), true);
        let mut catalog = Catalog::new();
        catalog.create_table(table).expect("book");

        let behavior = WorkspaceBehavior::new(WorkspaceConfig::default()).expect("behavior");
        let governed = behavior.augment(&mut catalog, "app_book").expect("augment");
        assert_eq!(
            governed
                .columns
                .iter()
                .filter(|c| *c == "workspace_id")
                .count(),
            1
        );
    }

    #[test]
    fn derive_skips_excluded_and_archive_tables() {
        let mut catalog = catalog();
        let mut log = TableSchema::new("app_log");
        log.add_column(ColumnDef::new("id", ColumnType::Integer, false), true);
        catalog.create_table(log).expect("log");

        let schema = GovernedSchema::derive(
            catalog,
            WorkspaceConfig::default().with_excluded_table("app_log"),
        )
        .expect("derive");
        assert!(schema.governed("app_book").is_some());
        assert!(schema.governed("app_log").is_none());
        assert!(schema.governed("book_version").is_none());
        assert!(
            !schema
                .catalog()
                .table("book_version")
                .expect("archive")
                .has_behavior(WORKSPACE_BEHAVIOR)
        );
    }

    #[test]
    fn resolve_target_follows_table_then_qualifier_then_owner() {
        let schema =
            GovernedSchema::derive(catalog(), WorkspaceConfig::default()).expect("derive");

        let explicit = Criteria::for_table("app_book");
        assert_eq!(
            schema.resolve_target(&explicit).expect("explicit").table_name,
            "app_book"
        );
        let qualified = Criteria::new().add("app_book.id", 1);
        assert_eq!(
            schema.resolve_target(&qualified).expect("qualified").table_name,
            "app_book"
        );
        let inferred = Criteria::new().add("title", "Dune");
        assert_eq!(
            schema.resolve_target(&inferred).expect("inferred").version_table,
            "book_version"
        );

        let err = schema.resolve_target(&Criteria::new()).expect_err("empty");
        assert_eq!(err.code(), WsdbErrorCode::AmbiguousCriteria);
        let err = schema
            .resolve_target(&Criteria::for_table("book_version"))
            .expect_err("archive");
        assert_eq!(err.code(), WsdbErrorCode::NotGoverned);
    }
}
