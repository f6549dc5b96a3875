use crate::behavior::workspace::GovernedTable;
use crate::catalog::types::{Row, Value};
use crate::error::WsdbError;
use crate::query::plan::Criteria;
use crate::storage::StorageExecutor;
use crate::workspace::action::WorkspaceAction;
use crate::workspace::context::WorkspaceResolver;
use crate::workspace::interceptor::{GovernedStore, WorkspaceInterceptor};
use std::marker::PhantomData;

pub trait TryFromRow: Sized {
    fn try_from_row(row: Row) -> Result<Self, RowDecodeError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RowDecodeError {
    #[error("missing column '{column}' at index {index}")]
    MissingColumn { column: String, index: usize },
    #[error("column '{column}' type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        column: String,
        expected: &'static str,
        actual: &'static str,
    },
    #[error("{message}")]
    Custom { message: String },
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error(transparent)]
    Wsdb(#[from] WsdbError),
    #[error(transparent)]
    Decode(#[from] RowDecodeError),
}

/// One archived state of a governed record.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionEntry<T> {
    pub rev: i64,
    pub action: Option<WorkspaceAction>,
    pub record: T,
}

/// Typed access to one governed table for one caller.
pub struct WorkspaceRepository<'a, T> {
    interceptor: &'a WorkspaceInterceptor,
    resolver: &'a dyn WorkspaceResolver,
    table: &'a GovernedTable,
    _record: PhantomData<fn() -> T>,
}

impl<'a, T: TryFromRow> WorkspaceRepository<'a, T> {
    pub fn new(
        interceptor: &'a WorkspaceInterceptor,
        resolver: &'a dyn WorkspaceResolver,
        table_name: &str,
    ) -> Result<Self, WsdbError> {
        let table = interceptor.table(table_name)?;
        Ok(Self {
            interceptor,
            resolver,
            table,
            _record: PhantomData,
        })
    }

    pub fn table(&self) -> &GovernedTable {
        self.table
    }

    /// Criteria bound to this repository's table.
    pub fn criteria(&self) -> Criteria {
        Criteria::for_table(self.table.table_name.clone())
    }

    pub fn find(
        &self,
        executor: &mut dyn StorageExecutor,
        criteria: Criteria,
    ) -> Result<Vec<T>, RepositoryError> {
        let rows = self
            .interceptor
            .select(self.resolver, executor, self.bind(criteria))?;
        Ok(decode_rows(rows)?)
    }

    pub fn find_one(
        &self,
        executor: &mut dyn StorageExecutor,
        criteria: Criteria,
    ) -> Result<Option<T>, RepositoryError> {
        let rows = self
            .interceptor
            .select(self.resolver, executor, self.bind(criteria).limit(1))?;
        match rows.into_iter().next() {
            Some(row) => Ok(Some(T::try_from_row(row)?)),
            None => Ok(None),
        }
    }

    pub fn count(
        &self,
        executor: &mut dyn StorageExecutor,
        criteria: Criteria,
    ) -> Result<u64, RepositoryError> {
        Ok(self
            .interceptor
            .count(self.resolver, executor, self.bind(criteria))?)
    }

    pub fn insert(
        &self,
        executor: &mut dyn StorageExecutor,
        values: Criteria,
    ) -> Result<u64, RepositoryError> {
        Ok(self
            .interceptor
            .insert(self.resolver, executor, self.bind(values))?)
    }

    pub fn update(
        &self,
        executor: &mut dyn StorageExecutor,
        criteria: Criteria,
        values: Criteria,
    ) -> Result<u64, RepositoryError> {
        Ok(self
            .interceptor
            .update(self.resolver, executor, self.bind(criteria), values)?)
    }

    pub fn delete(
        &self,
        executor: &mut dyn StorageExecutor,
        criteria: Criteria,
    ) -> Result<u64, RepositoryError> {
        Ok(self
            .interceptor
            .delete(self.resolver, executor, self.bind(criteria))?)
    }

    /// Archived states matching `criteria`, oldest first.
    pub fn history(
        &self,
        executor: &mut dyn StorageExecutor,
        criteria: Criteria,
    ) -> Result<Vec<VersionEntry<T>>, RepositoryError> {
        let rows = self
            .interceptor
            .history(self.resolver, executor, self.bind(criteria))?;
        rows.into_iter().map(|row| self.decode_version(row)).collect()
    }

    fn bind(&self, mut criteria: Criteria) -> Criteria {
        if criteria.primary_table().is_none() {
            criteria.set_primary_table(self.table.table_name.clone());
        }
        criteria
    }

    fn decode_version(&self, row: Row) -> Result<VersionEntry<T>, RepositoryError> {
        let table = self.table;
        let rev = match table.get_version(&row, &table.rev_column) {
            Some(Value::Integer(rev)) => *rev,
            Some(other) => {
                return Err(RowDecodeError::TypeMismatch {
                    column: table.rev_column.clone(),
                    expected: "Integer",
                    actual: value_kind(other),
                }
                .into());
            }
            None => {
                return Err(RowDecodeError::MissingColumn {
                    column: table.rev_column.clone(),
                    index: table.version_columns.len(),
                }
                .into());
            }
        };
        let action = table
            .get_version(&row, &table.action_column)
            .and_then(Value::as_i64)
            .map(WorkspaceAction::from_code)
            .transpose()?;
        let mut base = Row::default();
        for (index, column) in table.columns.iter().enumerate() {
            let value = table
                .get_version(&row, column)
                .cloned()
                .ok_or_else(|| RowDecodeError::MissingColumn {
                    column: column.clone(),
                    index,
                })?;
            base.values.push(value);
        }
        Ok(VersionEntry {
            rev,
            action,
            record: T::try_from_row(base)?,
        })
    }
}

pub fn decode_rows<T: TryFromRow>(rows: Vec<Row>) -> Result<Vec<T>, RowDecodeError> {
    rows.into_iter().map(T::try_from_row).collect()
}

pub fn text_at<'a>(row: &'a Row, index: usize, column: &str) -> Result<&'a str, RowDecodeError> {
    match row.values.get(index) {
        Some(Value::Text(v)) => Ok(v.as_str()),
        Some(other) => Err(RowDecodeError::TypeMismatch {
            column: column.to_string(),
            expected: "Text",
            actual: value_kind(other),
        }),
        None => Err(RowDecodeError::MissingColumn {
            column: column.to_string(),
            index,
        }),
    }
}

pub fn i64_at(row: &Row, index: usize, column: &str) -> Result<i64, RowDecodeError> {
    match row.values.get(index) {
        Some(Value::Integer(v)) => Ok(*v),
        Some(other) => Err(RowDecodeError::TypeMismatch {
            column: column.to_string(),
            expected: "Integer",
            actual: value_kind(other),
        }),
        None => Err(RowDecodeError::MissingColumn {
            column: column.to_string(),
            index,
        }),
    }
}

/// Like [`i64_at`] but maps `NULL` to `None`, for nullable audit columns.
pub fn opt_i64_at(row: &Row, index: usize, column: &str) -> Result<Option<i64>, RowDecodeError> {
    match row.values.get(index) {
        Some(Value::Null) => Ok(None),
        _ => i64_at(row, index, column).map(Some),
    }
}

pub fn bool_at(row: &Row, index: usize, column: &str) -> Result<bool, RowDecodeError> {
    match row.values.get(index) {
        Some(Value::Boolean(v)) => Ok(*v),
        Some(other) => Err(RowDecodeError::TypeMismatch {
            column: column.to_string(),
            expected: "Boolean",
            actual: value_kind(other),
        }),
        None => Err(RowDecodeError::MissingColumn {
            column: column.to_string(),
            index,
        }),
    }
}

pub fn timestamp_at(row: &Row, index: usize, column: &str) -> Result<i64, RowDecodeError> {
    match row.values.get(index) {
        Some(Value::Timestamp(v)) => Ok(*v),
        Some(other) => Err(RowDecodeError::TypeMismatch {
            column: column.to_string(),
            expected: "Timestamp",
            actual: value_kind(other),
        }),
        None => Err(RowDecodeError::MissingColumn {
            column: column.to_string(),
            index,
        }),
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Text(_) => "Text",
        Value::Integer(_) => "Integer",
        Value::Float(_) => "Float",
        Value::Boolean(_) => "Boolean",
        Value::Blob(_) => "Blob",
        Value::Timestamp(_) => "Timestamp",
        Value::Json(_) => "Json",
        Value::Null => "Null",
    }
}
