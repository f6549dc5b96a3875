pub mod encoded_key;
pub mod memory;

use crate::catalog::types::Row;
use crate::error::WsdbError;
use crate::query::sql::Statement;

/// Result of executing one [`Statement`].
#[derive(Debug, Clone, PartialEq)]
pub enum StatementOutcome {
    Rows(Vec<Row>),
    Count(u64),
    Affected(u64),
}

impl StatementOutcome {
    pub fn into_rows(self) -> Result<Vec<Row>, WsdbError> {
        match self {
            StatementOutcome::Rows(rows) => Ok(rows),
            other => Err(WsdbError::Decode(format!(
                "expected row set, executor returned {}",
                other.describe()
            ))),
        }
    }

    pub fn count(&self) -> Result<u64, WsdbError> {
        match self {
            StatementOutcome::Count(n) => Ok(*n),
            other => Err(WsdbError::Decode(format!(
                "expected count, executor returned {}",
                other.describe()
            ))),
        }
    }

    /// Rows touched by a write. A count outcome is accepted for executors that
    /// report writes that way.
    pub fn affected(&self) -> Result<u64, WsdbError> {
        match self {
            StatementOutcome::Affected(n) | StatementOutcome::Count(n) => Ok(*n),
            StatementOutcome::Rows(_) => Err(WsdbError::Decode(
                "expected affected-row count, executor returned a row set".into(),
            )),
        }
    }

    fn describe(&self) -> String {
        match self {
            StatementOutcome::Rows(rows) => format!("{} rows", rows.len()),
            StatementOutcome::Count(n) => format!("count {n}"),
            StatementOutcome::Affected(n) => format!("{n} affected"),
        }
    }
}

/// Executes statements inside a transaction owned by the caller. Every
/// statement an interceptor issues for one logical operation goes through the
/// same executor, so commit and rollback stay with whoever opened it.
pub trait StorageExecutor {
    fn execute(&mut self, statement: &Statement) -> Result<StatementOutcome, WsdbError>;
}

impl<E: StorageExecutor + ?Sized> StorageExecutor for &mut E {
    fn execute(&mut self, statement: &Statement) -> Result<StatementOutcome, WsdbError> {
        (**self).execute(statement)
    }
}
