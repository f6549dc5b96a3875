use crate::behavior::workspace::{GovernedSchema, GovernedTable};
use crate::catalog::types::{Row, Value};
use crate::error::WsdbError;
use crate::query::plan::{Criteria, Expr, Order};
use crate::query::sql::Statement;
use crate::storage::{StatementOutcome, StorageExecutor};
use crate::workspace::action::{WorkspaceAction, WriteMode};
use crate::workspace::context::WorkspaceResolver;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, error};

/// Source of `action_date` stamps, in epoch seconds.
pub type Clock = fn() -> i64;

pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// CRUD plus count over governed tables. Every call resolves the caller's
/// workspace once, before any statement is issued, and runs all of its
/// statements on the executor it is handed.
pub trait GovernedStore {
    fn select(
        &self,
        resolver: &dyn WorkspaceResolver,
        executor: &mut dyn StorageExecutor,
        criteria: Criteria,
    ) -> Result<Vec<Row>, WsdbError>;

    fn count(
        &self,
        resolver: &dyn WorkspaceResolver,
        executor: &mut dyn StorageExecutor,
        criteria: Criteria,
    ) -> Result<u64, WsdbError>;

    fn insert(
        &self,
        resolver: &dyn WorkspaceResolver,
        executor: &mut dyn StorageExecutor,
        values: Criteria,
    ) -> Result<u64, WsdbError>;

    fn update(
        &self,
        resolver: &dyn WorkspaceResolver,
        executor: &mut dyn StorageExecutor,
        select_criteria: Criteria,
        update_values: Criteria,
    ) -> Result<u64, WsdbError>;

    fn delete(
        &self,
        resolver: &dyn WorkspaceResolver,
        executor: &mut dyn StorageExecutor,
        criteria: Criteria,
    ) -> Result<u64, WsdbError>;
}

/// Gateway enforcing workspace scoping and archive-before-mutate on every
/// governed table of a [`GovernedSchema`].
#[derive(Debug, Clone)]
pub struct WorkspaceInterceptor {
    schema: Arc<GovernedSchema>,
    clock: Clock,
}

impl WorkspaceInterceptor {
    pub fn new(schema: Arc<GovernedSchema>) -> Self {
        Self {
            schema,
            clock: unix_now,
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn schema(&self) -> &GovernedSchema {
        &self.schema
    }

    pub fn table(&self, table_name: &str) -> Result<&GovernedTable, WsdbError> {
        self.schema
            .governed(table_name)
            .ok_or_else(|| WsdbError::NotGoverned {
                table: table_name.to_string(),
            })
    }

    /// Criteria on `table_name` constraining its scoping column to
    /// `workspace_id`.
    pub fn filter_by_workspace(
        &self,
        table_name: &str,
        workspace_id: i64,
    ) -> Result<Criteria, WsdbError> {
        let table = self.table(table_name)?;
        Ok(Criteria::for_table(table.table_name.clone()).add(&table.id_column, workspace_id))
    }

    /// Adds `scoping column = workspace_id` unless the criteria already
    /// constrain it, and the action code implied by `mode` unless the action
    /// column is already present.
    pub fn append_workspace_info(
        &self,
        criteria: &mut Criteria,
        mode: WriteMode,
        workspace_id: i64,
    ) -> Result<&GovernedTable, WsdbError> {
        let table = self.schema.resolve_target(criteria)?;
        if !criteria.contains_key(&table.id_column) {
            criteria.insert(&table.id_column, Value::Integer(workspace_id));
        }
        if let Some(action) = mode.action()
            && !criteria.contains_key(&table.action_column)
        {
            criteria.insert(&table.action_column, action.into());
        }
        debug!(
            table = %table.table_name,
            workspace_id,
            mode = ?mode,
            "workspace scope applied"
        );
        Ok(table)
    }

    /// Copies every row matching `criteria` into the table's archive in one
    /// `INSERT ... SELECT`. Returns the number of archived rows.
    pub fn backup_record(
        &self,
        executor: &mut dyn StorageExecutor,
        criteria: &Criteria,
    ) -> Result<u64, WsdbError> {
        if criteria.is_empty() {
            return Err(WsdbError::AmbiguousCriteria {
                reason: "backup requires at least one criterion".into(),
            });
        }
        let table = self.schema.resolve_target(criteria)?;
        archive(executor, table, criteria.to_predicate())
    }

    /// Predicate matching exactly `rows` of `table` by key. The key is the
    /// primary key when it has more than the scoping column, else every
    /// column a soft delete leaves untouched.
    fn pin_rows(&self, table: &GovernedTable, rows: &[Row]) -> Result<Option<Expr>, WsdbError> {
        let schema = self.schema.catalog().table(&table.table_name)?;
        let key: Vec<&str> = if schema.primary_key.iter().any(|c| *c != table.id_column) {
            schema.primary_key.iter().map(String::as_str).collect()
        } else {
            table
                .columns
                .iter()
                .filter(|c| **c != table.action_column && **c != table.action_date_column)
                .map(String::as_str)
                .collect()
        };
        let mut pinned = Vec::with_capacity(rows.len());
        for row in rows {
            let mut terms = Vec::with_capacity(key.len());
            for column in &key {
                let term = match table.get(row, column) {
                    Some(Value::Null) => Expr::IsNull(column.to_string()),
                    Some(value) => Expr::Eq(column.to_string(), value.clone()),
                    None => {
                        return Err(WsdbError::Decode(format!(
                            "row of '{}' has no column '{column}'",
                            table.table_name
                        )));
                    }
                };
                terms.push(term);
            }
            if let Some(term) = terms.into_iter().reduce(Expr::and) {
                pinned.push(term);
            }
        }
        Ok(any_of(pinned))
    }

    /// Archive rows matching `criteria` for the caller's workspace, oldest
    /// revision first.
    pub fn history(
        &self,
        resolver: &dyn WorkspaceResolver,
        executor: &mut dyn StorageExecutor,
        mut criteria: Criteria,
    ) -> Result<Vec<Row>, WsdbError> {
        let workspace_id = resolver.current_workspace()?;
        criteria.validate()?;
        let table = self.schema.resolve_target(&criteria)?;
        if !criteria.contains_key(&table.id_column) {
            criteria.insert(&table.id_column, Value::Integer(workspace_id));
        }
        let statement = Statement::Select {
            table: table.version_table.clone(),
            predicate: criteria.to_predicate(),
            order_by: vec![(table.rev_column.clone(), Order::Asc)],
            limit: criteria.row_limit(),
        };
        run(executor, &statement)?.into_rows()
    }

    fn stamp_action(&self, table: &GovernedTable, values: &mut Criteria, action: WorkspaceAction) {
        if !values.contains_key(&table.action_column) {
            values.insert(&table.action_column, action.into());
        }
        self.stamp_action_date(table, values);
    }

    fn stamp_action_date(&self, table: &GovernedTable, values: &mut Criteria) {
        if self.schema.config().stamp_action_date
            && !values.contains_key(&table.action_date_column)
        {
            values.insert(&table.action_date_column, Value::Integer((self.clock)()));
        }
    }
}

impl GovernedStore for WorkspaceInterceptor {
    fn select(
        &self,
        resolver: &dyn WorkspaceResolver,
        executor: &mut dyn StorageExecutor,
        mut criteria: Criteria,
    ) -> Result<Vec<Row>, WsdbError> {
        let workspace_id = resolver.current_workspace()?;
        criteria.validate()?;
        let table = self.append_workspace_info(&mut criteria, WriteMode::Select, workspace_id)?;
        let statement = Statement::Select {
            table: table.table_name.clone(),
            predicate: criteria.to_predicate(),
            order_by: criteria.ordering().to_vec(),
            limit: criteria.row_limit(),
        };
        run(executor, &statement)?.into_rows()
    }

    fn count(
        &self,
        resolver: &dyn WorkspaceResolver,
        executor: &mut dyn StorageExecutor,
        mut criteria: Criteria,
    ) -> Result<u64, WsdbError> {
        let workspace_id = resolver.current_workspace()?;
        criteria.validate()?;
        let table = self.append_workspace_info(&mut criteria, WriteMode::Select, workspace_id)?;
        let statement = Statement::Count {
            table: table.table_name.clone(),
            predicate: criteria.to_predicate(),
        };
        run(executor, &statement)?.count()
    }

    fn insert(
        &self,
        resolver: &dyn WorkspaceResolver,
        executor: &mut dyn StorageExecutor,
        mut values: Criteria,
    ) -> Result<u64, WsdbError> {
        let workspace_id = resolver.current_workspace()?;
        let table = self.append_workspace_info(&mut values, WriteMode::Insert, workspace_id)?;
        self.stamp_action_date(table, &mut values);
        let statement = Statement::Insert {
            table: table.table_name.clone(),
            values: values.assignments()?,
        };
        run(executor, &statement)?.affected()
    }

    fn update(
        &self,
        resolver: &dyn WorkspaceResolver,
        executor: &mut dyn StorageExecutor,
        select_criteria: Criteria,
        mut update_values: Criteria,
    ) -> Result<u64, WsdbError> {
        let workspace_id = resolver.current_workspace()?;
        select_criteria.validate()?;
        // Reject malformed values before anything is archived.
        update_values.assignments()?;

        self.backup_record(executor, &select_criteria)?;

        let table = self.schema.resolve_target(&select_criteria)?;
        self.stamp_action(table, &mut update_values, WorkspaceAction::Updated);
        let statement = Statement::Update {
            table: table.table_name.clone(),
            assignments: update_values.assignments()?,
            predicate: select_criteria.to_predicate(),
        };
        let updated = run(executor, &statement)?.affected()?;
        debug!(table = %table.table_name, workspace_id, updated, "rows updated");
        Ok(updated)
    }

    fn delete(
        &self,
        resolver: &dyn WorkspaceResolver,
        executor: &mut dyn StorageExecutor,
        criteria: Criteria,
    ) -> Result<u64, WsdbError> {
        let workspace_id = resolver.current_workspace()?;
        criteria.validate()?;
        if criteria.is_empty() {
            return Err(WsdbError::AmbiguousCriteria {
                reason: "delete requires at least one criterion".into(),
            });
        }
        let table = self.schema.resolve_target(&criteria)?;

        // The soft delete rewrites the audit columns, which `criteria` may
        // filter on, so later statements address the matched rows by key.
        let matched = run(
            executor,
            &Statement::Select {
                table: table.table_name.clone(),
                predicate: criteria.to_predicate(),
                order_by: Vec::new(),
                limit: None,
            },
        )?
        .into_rows()?;
        let Some(pinned) = self.pin_rows(table, &matched)? else {
            debug!(table = %table.table_name, workspace_id, "delete matched no rows");
            return Ok(0);
        };

        archive(executor, table, Some(pinned.clone()))?;

        let mut marker = Criteria::for_table(table.table_name.clone());
        self.stamp_action(table, &mut marker, WorkspaceAction::Deleted);
        let soft_delete = Statement::Update {
            table: table.table_name.clone(),
            assignments: marker.assignments()?,
            predicate: Some(pinned.clone()),
        };
        run(executor, &soft_delete)?;

        archive(executor, table, Some(pinned.clone()))?;

        let statement = Statement::Delete {
            table: table.table_name.clone(),
            predicate: Some(pinned),
        };
        let deleted = run(executor, &statement)?.affected()?;
        debug!(table = %table.table_name, workspace_id, deleted, "rows deleted");
        Ok(deleted)
    }
}

/// Copies the rows of `table` matching `predicate` into its archive in one
/// `INSERT ... SELECT`. Returns the number of archived rows.
fn archive(
    executor: &mut dyn StorageExecutor,
    table: &GovernedTable,
    predicate: Option<Expr>,
) -> Result<u64, WsdbError> {
    let statement = Statement::CopyRows {
        target: table.version_table.clone(),
        source: table.table_name.clone(),
        columns: table.columns.clone(),
        predicate,
    };
    let archived = run(executor, &statement)?.affected()?;
    debug!(
        table = %table.table_name,
        version_table = %table.version_table,
        archived,
        "rows archived"
    );
    Ok(archived)
}

/// Disjunction of `exprs` as a balanced tree, `None` when empty.
fn any_of(mut exprs: Vec<Expr>) -> Option<Expr> {
    if exprs.len() <= 1 {
        return exprs.pop();
    }
    let right = exprs.split_off(exprs.len() / 2);
    match (any_of(exprs), any_of(right)) {
        (Some(left), Some(right)) => Some(left.or(right)),
        (left, right) => left.or(right),
    }
}

/// Executes `statement`, attaching its rendered SQL and parameters to any
/// failure.
fn run(
    executor: &mut dyn StorageExecutor,
    statement: &Statement,
) -> Result<StatementOutcome, WsdbError> {
    executor.execute(statement).map_err(|e| {
        let rendered = statement.to_sql();
        let params = rendered.params_display();
        error!(
            statement = %rendered.sql,
            params = %params,
            error = %e,
            "statement failed"
        );
        WsdbError::StorageExecution {
            statement: rendered.sql,
            params,
            message: e.to_string(),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::{GovernedStore, WorkspaceInterceptor};
    use crate::behavior::workspace::GovernedSchema;
    use crate::catalog::Catalog;
    use crate::catalog::schema::{ColumnDef, TableSchema};
    use crate::catalog::types::{ColumnType, Value};
    use crate::config::WorkspaceConfig;
    use crate::error::{WsdbError, WsdbErrorCode};
    use crate::query::plan::{Criteria, col, lit};
    use crate::query::sql::Statement;
    use crate::storage::memory::MemoryStorage;
    use crate::storage::{StatementOutcome, StorageExecutor};
    use crate::workspace::action::WriteMode;
    use crate::workspace::context::{FnResolver, WorkspaceContext};
    use std::cell::Cell;
    use std::sync::Arc;

    fn fixture(config: WorkspaceConfig) -> (WorkspaceInterceptor, MemoryStorage) {
        let mut note = TableSchema::new("note");
        note.add_column(
            ColumnDef::new("id", ColumnType::Integer, false).auto_increment(),
            true,
        );
        note.add_column(ColumnDef::new("body", ColumnType::Text, false), false);
        let mut catalog = Catalog::new();
        catalog.create_table(note).expect("note");

        let schema = GovernedSchema::derive(catalog, config).expect("derive");
        let storage = MemoryStorage::new(schema.catalog());
        let interceptor = WorkspaceInterceptor::new(Arc::new(schema)).with_clock(|| 1_700_000_000);
        (interceptor, storage)
    }

    /// Records statements and fails every `CopyRows`.
    #[derive(Default)]
    struct RejectCopies {
        seen: Vec<String>,
    }

    impl StorageExecutor for RejectCopies {
        fn execute(&mut self, statement: &Statement) -> Result<StatementOutcome, WsdbError> {
            self.seen.push(statement.kind().to_string());
            match statement {
                Statement::CopyRows { .. } => Err(WsdbError::Validation("disk full".into())),
                _ => Ok(StatementOutcome::Affected(0)),
            }
        }
    }

    #[test]
    fn append_workspace_info_keeps_existing_constraints() {
        let (interceptor, _) = fixture(WorkspaceConfig::strict());
        let mut criteria = Criteria::for_table("note").add("workspace_id", 3);
        interceptor
            .append_workspace_info(&mut criteria, WriteMode::Select, 7)
            .expect("append");
        assert_eq!(criteria.len(), 1);
        assert_eq!(
            criteria.get("workspace_id").and_then(|c| c.assigned_value()),
            Some(&Value::Integer(3))
        );

        let mut criteria = Criteria::for_table("note");
        interceptor
            .append_workspace_info(&mut criteria, WriteMode::Delete, 7)
            .expect("append");
        assert_eq!(
            criteria
                .get("workspace_action")
                .and_then(|c| c.assigned_value()),
            Some(&Value::Integer(0))
        );
    }

    #[test]
    fn insert_stamps_scope_action_and_date() {
        let (interceptor, storage) = fixture(WorkspaceConfig::default());
        let ctx = WorkspaceContext::new(7);
        let mut tx = storage.begin();
        interceptor
            .insert(&ctx, &mut tx, Criteria::for_table("note").add("body", "a"))
            .expect("insert");
        let rows = interceptor
            .select(&ctx, &mut tx, Criteria::for_table("note"))
            .expect("select");
        tx.commit();

        let table = interceptor.table("note").expect("governed");
        assert_eq!(rows.len(), 1);
        assert_eq!(table.workspace_of(&rows[0]), Some(7));
        assert_eq!(
            table.get(&rows[0], "workspace_action_date"),
            Some(&Value::Integer(1_700_000_000))
        );
        assert_eq!(table.get(&rows[0], "workspace_action_user"), Some(&Value::Null));
    }

    #[test]
    fn resolver_is_consulted_once_per_operation() {
        let (interceptor, storage) = fixture(WorkspaceConfig::strict());
        let calls = Cell::new(0);
        let resolver = FnResolver::new(|| {
            calls.set(calls.get() + 1);
            Some(1)
        });
        let mut tx = storage.begin();
        interceptor
            .insert(&resolver, &mut tx, Criteria::for_table("note").add("body", "a"))
            .expect("insert");
        interceptor
            .delete(&resolver, &mut tx, Criteria::for_table("note").add("id", 1))
            .expect("delete");
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn missing_workspace_blocks_every_statement() {
        let (interceptor, _) = fixture(WorkspaceConfig::strict());
        let mut executor = RejectCopies::default();
        let unset = WorkspaceContext::unset();
        let err = interceptor
            .delete(&unset, &mut executor, Criteria::for_table("note").add("id", 1))
            .expect_err("no workspace");
        assert_eq!(err.code(), WsdbErrorCode::WorkspaceContextMissing);
        let err = interceptor
            .insert(&unset, &mut executor, Criteria::for_table("note").add("body", "x"))
            .expect_err("no workspace");
        assert_eq!(err.code(), WsdbErrorCode::WorkspaceContextMissing);
        assert!(executor.seen.is_empty());
    }

    #[test]
    fn failed_backup_aborts_before_the_mutation() {
        let (interceptor, _) = fixture(WorkspaceConfig::strict());
        let mut executor = RejectCopies::default();
        let err = interceptor
            .update(
                &WorkspaceContext::new(1),
                &mut executor,
                Criteria::for_table("note").add("id", 1),
                Criteria::new().add("body", "b"),
            )
            .expect_err("copy fails");
        assert_eq!(err.code(), WsdbErrorCode::StorageExecution);
        assert!(err.to_string().contains("INSERT INTO note_version"));
        assert_eq!(executor.seen, vec!["copy"]);
    }

    #[test]
    fn backup_with_empty_criteria_is_rejected() {
        let (interceptor, storage) = fixture(WorkspaceConfig::strict());
        let mut tx = storage.begin();
        let err = interceptor
            .backup_record(&mut tx, &Criteria::for_table("note"))
            .expect_err("empty");
        assert_eq!(err.code(), WsdbErrorCode::AmbiguousCriteria);
        assert!(tx.statement_log().is_empty());
    }

    #[test]
    fn update_values_must_be_assignments() {
        let (interceptor, storage) = fixture(WorkspaceConfig::strict());
        let mut tx = storage.begin();
        let err = interceptor
            .update(
                &WorkspaceContext::new(1),
                &mut tx,
                Criteria::for_table("note").add("id", 1),
                Criteria::new().add_expr("body", col("body").like("a%")),
            )
            .expect_err("not an assignment");
        assert_eq!(err.code(), WsdbErrorCode::Validation);
        assert!(tx.statement_log().is_empty());
    }

    #[test]
    fn history_is_scoped_and_ordered_by_revision() {
        let (interceptor, storage) = fixture(WorkspaceConfig::strict());
        let mut tx = storage.begin();
        for ws in [1, 2] {
            let ctx = WorkspaceContext::new(ws);
            interceptor
                .insert(&ctx, &mut tx, Criteria::for_table("note").add("id", 1).add("body", "v1"))
                .expect("insert");
            interceptor
                .update(
                    &ctx,
                    &mut tx,
                    Criteria::for_table("note")
                        .add("id", 1)
                        .add("workspace_id", ws),
                    Criteria::new().add("body", "v2"),
                )
                .expect("update");
            interceptor
                .update(
                    &ctx,
                    &mut tx,
                    Criteria::for_table("note")
                        .add("id", 1)
                        .add("workspace_id", ws),
                    Criteria::new().add("body", "v3"),
                )
                .expect("update");
        }

        let table = interceptor.table("note").expect("governed").clone();
        let history = interceptor
            .history(
                &WorkspaceContext::new(2),
                &mut tx,
                Criteria::for_table("note").add_expr("id", col("id").eq(lit(1))),
            )
            .expect("history");
        let bodies: Vec<_> = history
            .iter()
            .map(|row| table.get_version(row, "body").cloned())
            .collect();
        assert_eq!(bodies, vec![Some(lit("v1")), Some(lit("v2"))]);
        assert!(
            history
                .iter()
                .all(|row| table.get_version(row, "workspace_id") == Some(&Value::Integer(2)))
        );
    }

    #[test]
    fn filter_by_workspace_uses_configured_prefix() {
        let (interceptor, _) = fixture(WorkspaceConfig::strict().with_column_prefix("ws_"));
        let criteria = interceptor.filter_by_workspace("note", 9).expect("filter");
        assert_eq!(criteria.primary_table(), Some("note"));
        assert_eq!(criteria.keys().collect::<Vec<_>>(), vec!["ws_id"]);
        let err = interceptor
            .filter_by_workspace("note_version", 9)
            .expect_err("archives are not governed");
        assert_eq!(err.code(), WsdbErrorCode::NotGoverned);
    }
}
