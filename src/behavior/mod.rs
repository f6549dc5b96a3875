pub mod workspace;

use crate::catalog::Catalog;
use crate::error::WsdbError;
use tracing::{debug, warn};

/// Upper bound on re-synchronization passes before the extension set is
/// considered non-convergent.
pub const MAX_RESYNC_PASSES: usize = 16;

/// A schema-level extension that derives tables or columns from the catalog.
///
/// `modify_database` must be idempotent: once its output is present, running
/// it again leaves `catalog.structural_version` unchanged.
pub trait SchemaExtension {
    fn name(&self) -> &str;

    fn modify_database(&mut self, catalog: &mut Catalog) -> Result<(), WsdbError>;
}

/// Applies registered extensions in registration order and re-runs all of
/// them whenever a pass changes the catalog's structure, so that every
/// extension observes tables added by the others.
#[derive(Default)]
pub struct SchemaBuilder {
    extensions: Vec<Box<dyn SchemaExtension>>,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_extension<E>(mut self, extension: E) -> Self
    where
        E: SchemaExtension + 'static,
    {
        self.extensions.push(Box::new(extension));
        self
    }

    pub fn extension_names(&self) -> Vec<&str> {
        self.extensions.iter().map(|e| e.name()).collect()
    }

    /// Runs the extensions to a fixpoint and returns the number of passes.
    pub fn apply(&mut self, catalog: &mut Catalog) -> Result<usize, WsdbError> {
        for pass in 1..=MAX_RESYNC_PASSES {
            let before = catalog.structural_version;
            for extension in &mut self.extensions {
                extension.modify_database(catalog)?;
            }
            if catalog.structural_version == before {
                debug!(passes = pass, "schema extensions converged");
                return Ok(pass);
            }
            if pass > 2 {
                warn!(
                    pass,
                    structural_version = catalog.structural_version,
                    "schema extensions still changing the catalog"
                );
            }
        }
        Err(WsdbError::SchemaDerivation {
            table: "*".into(),
            message: format!(
                "schema extensions did not converge after {MAX_RESYNC_PASSES} passes"
            ),
        })
    }

    pub fn build(mut self, mut catalog: Catalog) -> Result<Catalog, WsdbError> {
        self.apply(&mut catalog)?;
        Ok(catalog)
    }
}

#[cfg(test)]
mod tests {
    use super::{SchemaBuilder, SchemaExtension};
    use crate::catalog::Catalog;
    use crate::catalog::schema::{ColumnDef, TableSchema};
    use crate::catalog::types::ColumnType;
    use crate::error::{WsdbError, WsdbErrorCode};

    /// Adds one more table on every pass.
    struct Unbounded;

    impl SchemaExtension for Unbounded {
        fn name(&self) -> &str {
            "unbounded"
        }

        fn modify_database(&mut self, catalog: &mut Catalog) -> Result<(), WsdbError> {
            let name = format!("t{}", catalog.tables.len());
            let mut table = TableSchema::new(name);
            table.add_column(ColumnDef::new("id", ColumnType::Integer, false), true);
            catalog.create_table(table)
        }
    }

    #[test]
    fn non_convergent_extensions_fail() {
        let err = SchemaBuilder::new()
            .with_extension(Unbounded)
            .build(Catalog::new())
            .expect_err("never converges");
        assert_eq!(err.code(), WsdbErrorCode::SchemaDerivation);
    }

    #[test]
    fn empty_builder_converges_in_one_pass() {
        let mut catalog = Catalog::new();
        let passes = SchemaBuilder::new().apply(&mut catalog).expect("apply");
        assert_eq!(passes, 1);
    }
}
