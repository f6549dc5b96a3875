use crate::catalog::Catalog;
use crate::catalog::schema::TableSchema;
use crate::catalog::types::{Row, Value};
use crate::error::WsdbError;
use crate::query::eval::{compare_rows, compile_filter, compile_ordering, matches};
use crate::query::plan::Expr;
use crate::query::sql::Statement;
use crate::storage::encoded_key::EncodedKey;
use crate::storage::{StatementOutcome, StorageExecutor};
use im::{HashMap, OrdMap};
use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, trace};

#[derive(Debug, Clone, Default)]
struct TableData {
    rows: OrdMap<EncodedKey, Row>,
    /// Next value handed out for the table's auto-increment column.
    next_auto_increment: i64,
}

#[derive(Debug, Clone, Default)]
struct StorageState {
    catalog: Catalog,
    tables: HashMap<String, TableData>,
}

/// In-process row store used as the reference [`StorageExecutor`].
///
/// Writers are serialized: [`MemoryStorage::begin`] holds the store lock for
/// the lifetime of the transaction and works on a persistent copy of the
/// tables, so an uncommitted transaction leaves no trace when dropped.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    state: Mutex<StorageState>,
}

impl MemoryStorage {
    pub fn new(catalog: &Catalog) -> Self {
        let storage = Self::default();
        storage.sync_catalog(catalog);
        storage
    }

    /// Adopts `catalog` and allocates data for tables not seen before.
    /// Existing rows are kept; columns added since are filled with NULL.
    pub fn sync_catalog(&self, catalog: &Catalog) {
        let mut state = self.state.lock();
        state.catalog = catalog.snapshot();
        for (name, schema) in catalog.tables.iter() {
            let width = schema.columns.len();
            match state.tables.get_mut(name) {
                Some(data) => {
                    data.rows = data
                        .rows
                        .iter()
                        .map(|(key, row)| {
                            let mut row = row.clone();
                            row.values.resize(width, Value::Null);
                            (key.clone(), row)
                        })
                        .collect();
                }
                None => {
                    state.tables.insert(
                        name.clone(),
                        TableData {
                            next_auto_increment: 1,
                            ..TableData::default()
                        },
                    );
                }
            }
        }
        debug!(tables = catalog.tables.len(), "memory storage catalog synced");
    }

    pub fn begin(&self) -> MemoryTransaction<'_> {
        let guard = self.state.lock();
        let working = guard.clone();
        trace!("memory transaction started");
        MemoryTransaction {
            guard,
            working,
            log: Vec::new(),
        }
    }

    /// Committed rows of `table_name` in primary-key order.
    pub fn rows(&self, table_name: &str) -> Result<Vec<Row>, WsdbError> {
        let state = self.state.lock();
        let data = state
            .tables
            .get(table_name)
            .ok_or_else(|| WsdbError::table_not_found(table_name))?;
        Ok(data.rows.values().cloned().collect())
    }

    pub fn row_count(&self, table_name: &str) -> Result<usize, WsdbError> {
        let state = self.state.lock();
        state
            .tables
            .get(table_name)
            .map(|data| data.rows.len())
            .ok_or_else(|| WsdbError::table_not_found(table_name))
    }
}

/// A serializable unit of work over [`MemoryStorage`]. Dropping it without
/// calling [`MemoryTransaction::commit`] rolls back.
pub struct MemoryTransaction<'a> {
    guard: MutexGuard<'a, StorageState>,
    working: StorageState,
    log: Vec<String>,
}

impl MemoryTransaction<'_> {
    pub fn commit(mut self) {
        *self.guard = std::mem::take(&mut self.working);
        debug!(statements = self.log.len(), "memory transaction committed");
    }

    pub fn rollback(self) {
        debug!(statements = self.log.len(), "memory transaction rolled back");
    }

    /// SQL text of every statement executed so far, in order.
    pub fn statement_log(&self) -> &[String] {
        &self.log
    }
}

impl StorageExecutor for MemoryTransaction<'_> {
    /// Runs one statement. A failing statement leaves the transaction's
    /// tables exactly as they were before it started.
    fn execute(&mut self, statement: &Statement) -> Result<StatementOutcome, WsdbError> {
        self.log.push(statement.to_sql().sql);
        let before = self.working.tables.clone();
        let outcome = apply(&mut self.working, statement);
        if outcome.is_err() {
            self.working.tables = before;
        }
        outcome
    }
}

fn apply(state: &mut StorageState, statement: &Statement) -> Result<StatementOutcome, WsdbError> {
    match statement {
        Statement::Select {
            table,
            predicate,
            order_by,
            limit,
        } => {
            let schema = state.catalog.table(table)?;
            let filter = compile_filter(predicate.as_ref(), schema)?;
            let ordering = compile_ordering(order_by, schema)?;
            let mut rows: Vec<Row> = table_data(&state.tables, table)?
                .rows
                .values()
                .filter(|row| matches(filter.as_ref(), row))
                .cloned()
                .collect();
            if !ordering.is_empty() {
                rows.sort_by(|a, b| compare_rows(a, b, &ordering));
            }
            if let Some(limit) = limit {
                rows.truncate(*limit);
            }
            Ok(StatementOutcome::Rows(rows))
        }
        Statement::Count { table, predicate } => {
            let schema = state.catalog.table(table)?;
            let filter = compile_filter(predicate.as_ref(), schema)?;
            let count = table_data(&state.tables, table)?
                .rows
                .values()
                .filter(|row| matches(filter.as_ref(), row))
                .count();
            Ok(StatementOutcome::Count(count as u64))
        }
        Statement::Insert { table, values } => {
            let schema = state.catalog.table(table)?.clone();
            insert_row(state, &schema, values)?;
            Ok(StatementOutcome::Affected(1))
        }
        Statement::Update {
            table,
            assignments,
            predicate,
        } => {
            let schema = state.catalog.table(table)?.clone();
            let affected = update_rows(state, &schema, assignments, predicate.as_ref())?;
            Ok(StatementOutcome::Affected(affected))
        }
        Statement::Delete { table, predicate } => {
            let schema = state.catalog.table(table)?;
            let filter = compile_filter(predicate.as_ref(), schema)?;
            let data = table_data_mut(&mut state.tables, table)?;
            let doomed: Vec<EncodedKey> = data
                .rows
                .iter()
                .filter(|(_, row)| matches(filter.as_ref(), row))
                .map(|(key, _)| key.clone())
                .collect();
            for key in &doomed {
                data.rows.remove(key);
            }
            Ok(StatementOutcome::Affected(doomed.len() as u64))
        }
        Statement::CopyRows {
            target,
            source,
            columns,
            predicate,
        } => {
            let source_schema = state.catalog.table(source)?.clone();
            let target_schema = state.catalog.table(target)?.clone();
            let copied = copy_rows(
                state,
                &source_schema,
                &target_schema,
                columns,
                predicate.as_ref(),
            )?;
            Ok(StatementOutcome::Affected(copied))
        }
    }
}

fn table_data<'a>(
    tables: &'a HashMap<String, TableData>,
    table_name: &str,
) -> Result<&'a TableData, WsdbError> {
    tables
        .get(table_name)
        .ok_or_else(|| WsdbError::table_not_found(table_name))
}

fn table_data_mut<'a>(
    tables: &'a mut HashMap<String, TableData>,
    table_name: &str,
) -> Result<&'a mut TableData, WsdbError> {
    tables
        .get_mut(table_name)
        .ok_or_else(|| WsdbError::table_not_found(table_name))
}

fn insert_row(
    state: &mut StorageState,
    schema: &TableSchema,
    values: &[(String, Value)],
) -> Result<(), WsdbError> {
    for (column, _) in values {
        if !schema.has_column(column) {
            return Err(WsdbError::UnknownColumn {
                table: schema.table_name.clone(),
                column: column.clone(),
            });
        }
    }
    let data = table_data_mut(&mut state.tables, &schema.table_name)?;
    let mut row = Row::default();
    for column in &schema.columns {
        let supplied = values
            .iter()
            .find(|(name, _)| *name == column.name)
            .map(|(_, v)| v.clone());
        let value = match supplied {
            Some(Value::Null) | None if column.auto_increment => {
                let next = data.next_auto_increment.max(1);
                data.next_auto_increment = next + 1;
                Value::Integer(next)
            }
            Some(value) => {
                if column.auto_increment
                    && let Some(explicit) = value.as_i64()
                {
                    data.next_auto_increment =
                        data.next_auto_increment.max(explicit.saturating_add(1));
                }
                value
            }
            None => Value::Null,
        };
        row.values.push(value);
    }
    validate_row(schema, &row)?;
    let key = primary_key(schema, &row);
    if data.rows.contains_key(&key) {
        return Err(duplicate_key(schema, &row));
    }
    data.rows.insert(key, row);
    Ok(())
}

fn update_rows(
    state: &mut StorageState,
    schema: &TableSchema,
    assignments: &[(String, Value)],
    predicate: Option<&Expr>,
) -> Result<u64, WsdbError> {
    let mut positions = Vec::with_capacity(assignments.len());
    for (column, value) in assignments {
        let idx = schema
            .column_index(column)
            .ok_or_else(|| WsdbError::UnknownColumn {
                table: schema.table_name.clone(),
                column: column.clone(),
            })?;
        positions.push((idx, value));
    }
    let filter = compile_filter(predicate, schema)?;
    let data = table_data_mut(&mut state.tables, &schema.table_name)?;
    let targets: Vec<(EncodedKey, Row)> = data
        .rows
        .iter()
        .filter(|(_, row)| matches(filter.as_ref(), row))
        .map(|(key, row)| (key.clone(), row.clone()))
        .collect();

    for (old_key, _) in &targets {
        data.rows.remove(old_key);
    }
    for (_, mut row) in targets.iter().cloned() {
        for (idx, value) in &positions {
            row.values[*idx] = (*value).clone();
        }
        validate_row(schema, &row)?;
        let key = primary_key(schema, &row);
        if data.rows.contains_key(&key) {
            return Err(duplicate_key(schema, &row));
        }
        data.rows.insert(key, row);
    }
    Ok(targets.len() as u64)
}

fn copy_rows(
    state: &mut StorageState,
    source: &TableSchema,
    target: &TableSchema,
    columns: &[String],
    predicate: Option<&Expr>,
) -> Result<u64, WsdbError> {
    let mut positions = Vec::with_capacity(columns.len());
    for column in columns {
        let idx = source
            .column_index(column)
            .ok_or_else(|| WsdbError::UnknownColumn {
                table: source.table_name.clone(),
                column: column.clone(),
            })?;
        positions.push((column.clone(), idx));
    }
    let filter = compile_filter(predicate, source)?;
    let selected: Vec<Row> = table_data(&state.tables, &source.table_name)?
        .rows
        .values()
        .filter(|row| matches(filter.as_ref(), row))
        .cloned()
        .collect();
    for row in &selected {
        let values: Vec<(String, Value)> = positions
            .iter()
            .map(|(name, idx)| (name.clone(), row.values[*idx].clone()))
            .collect();
        insert_row(state, target, &values)?;
    }
    Ok(selected.len() as u64)
}

fn validate_row(schema: &TableSchema, row: &Row) -> Result<(), WsdbError> {
    for (column, value) in schema.columns.iter().zip(&row.values) {
        if value.is_null() {
            if !column.nullable {
                return Err(WsdbError::NotNullViolation {
                    table: schema.table_name.clone(),
                    column: column.name.clone(),
                });
            }
            continue;
        }
        if !column.col_type.accepts(value) {
            return Err(WsdbError::TypeMismatch {
                table: schema.table_name.clone(),
                column: column.name.clone(),
                expected: column.col_type.sql_name().to_string(),
                actual: value.type_name().to_string(),
            });
        }
    }
    Ok(())
}

fn primary_key_values(schema: &TableSchema, row: &Row) -> Vec<Value> {
    if schema.primary_key.is_empty() {
        return row.values.clone();
    }
    schema
        .primary_key
        .iter()
        .filter_map(|pk| schema.column_index(pk))
        .map(|idx| row.values[idx].clone())
        .collect()
}

fn primary_key(schema: &TableSchema, row: &Row) -> EncodedKey {
    EncodedKey::from_values(&primary_key_values(schema, row))
}

fn duplicate_key(schema: &TableSchema, row: &Row) -> WsdbError {
    let key = primary_key_values(schema, row)
        .iter()
        .map(Value::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    WsdbError::DuplicatePK {
        table: schema.table_name.clone(),
        key,
    }
}
