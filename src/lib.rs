pub mod behavior;
pub mod catalog;
pub mod config;
pub mod declarative;
pub mod error;
pub mod query;
pub mod repository;
pub mod storage;
pub mod workspace;

use crate::behavior::workspace::GovernedSchema;
use crate::catalog::Catalog;
use crate::config::WorkspaceConfig;
use crate::error::WsdbError;
use crate::storage::memory::{MemoryStorage, MemoryTransaction};
use crate::workspace::interceptor::WorkspaceInterceptor;
use std::sync::Arc;
use tracing::{debug, info};

pub use crate::behavior::workspace::{GovernedTable, WorkspaceBehavior};
pub use crate::query::plan::{Criteria, col, lit};
pub use crate::workspace::{
    GovernedStore, WorkspaceAction, WorkspaceContext, WorkspaceResolver, WriteMode,
};

/// A governed schema bound to an in-memory store.
///
/// Each call to [`WorkspaceDb::transaction`] is one serializable unit of work:
/// every statement issued by the closure, archive copies included, commits or
/// rolls back together.
pub struct WorkspaceDb {
    storage: MemoryStorage,
    interceptor: WorkspaceInterceptor,
}

impl WorkspaceDb {
    /// Augments `catalog` with workspace behavior and allocates storage for
    /// every table, archives included.
    pub fn open(catalog: Catalog, config: WorkspaceConfig) -> Result<Self, WsdbError> {
        let schema = GovernedSchema::derive(catalog, config)?;
        info!(
            tables = schema.catalog().tables.len(),
            governed = schema.governed_tables().count(),
            "workspace db opened"
        );
        Ok(Self::from_schema(schema))
    }

    pub fn from_schema(schema: GovernedSchema) -> Self {
        let storage = MemoryStorage::new(schema.catalog());
        Self {
            storage,
            interceptor: WorkspaceInterceptor::new(Arc::new(schema)),
        }
    }

    pub fn with_interceptor(mut self, interceptor: WorkspaceInterceptor) -> Self {
        self.interceptor = interceptor;
        self
    }

    pub fn schema(&self) -> &GovernedSchema {
        self.interceptor.schema()
    }

    pub fn interceptor(&self) -> &WorkspaceInterceptor {
        &self.interceptor
    }

    pub fn storage(&self) -> &MemoryStorage {
        &self.storage
    }

    /// Runs `f` inside one transaction, committing when it returns `Ok`.
    pub fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&WorkspaceInterceptor, &mut MemoryTransaction<'_>) -> Result<T, E>,
    {
        let mut tx = self.storage.begin();
        match f(&self.interceptor, &mut tx) {
            Ok(value) => {
                tx.commit();
                Ok(value)
            }
            Err(err) => {
                debug!(statements = tx.statement_log().len(), "transaction aborted");
                tx.rollback();
                Err(err)
            }
        }
    }
}
