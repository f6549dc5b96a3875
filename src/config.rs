use crate::error::WsdbError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

pub const DEFAULT_COLUMN_PREFIX: &str = "workspace_";
pub const DEFAULT_VERSION_SUFFIX: &str = "_version";

/// Settings for the workspace schema extension and its interceptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Prefix of the four audit columns and of the `<prefix>rev` archive key.
    pub column_prefix: String,
    /// Appended to the (table-prefix stripped) base name to name the archive.
    pub version_suffix: String,
    /// Explicit archive table names, keyed by base table name.
    pub version_tables: BTreeMap<String, String>,
    /// Tables skipped when the extension is applied database-wide.
    pub exclude: BTreeSet<String>,
    /// Stamp `<prefix>action_date` with the current epoch seconds when a write
    /// does not supply it.
    pub stamp_action_date: bool,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            column_prefix: DEFAULT_COLUMN_PREFIX.to_string(),
            version_suffix: DEFAULT_VERSION_SUFFIX.to_string(),
            version_tables: BTreeMap::new(),
            exclude: BTreeSet::new(),
            stamp_action_date: true,
        }
    }
}

impl WorkspaceConfig {
    /// Profile without clock-dependent stamping; archive rows then depend only
    /// on the data written.
    pub fn strict() -> Self {
        Self {
            stamp_action_date: false,
            ..Self::default()
        }
    }

    pub fn with_column_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.column_prefix = prefix.into();
        self
    }

    pub fn with_version_table(
        mut self,
        table_name: impl Into<String>,
        version_table: impl Into<String>,
    ) -> Self {
        self.version_tables
            .insert(table_name.into(), version_table.into());
        self
    }

    pub fn with_excluded_table(mut self, table_name: impl Into<String>) -> Self {
        self.exclude.insert(table_name.into());
        self
    }

    pub fn with_action_date_stamping(mut self, enabled: bool) -> Self {
        self.stamp_action_date = enabled;
        self
    }

    pub fn from_json(json: &str) -> Result<Self, WsdbError> {
        let config: Self = serde_json::from_str(json).map_err(|e| WsdbError::InvalidConfig {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), WsdbError> {
        if self.column_prefix.is_empty() || !is_identifier(&self.column_prefix) {
            return Err(WsdbError::InvalidConfig {
                message: format!(
                    "column_prefix '{}' must be a non-empty identifier",
                    self.column_prefix
                ),
            });
        }
        if self.version_suffix.is_empty() || !is_identifier(&self.version_suffix) {
            return Err(WsdbError::InvalidConfig {
                message: format!(
                    "version_suffix '{}' must be a non-empty identifier",
                    self.version_suffix
                ),
            });
        }
        for (table, version) in &self.version_tables {
            if version.trim().is_empty() {
                return Err(WsdbError::InvalidConfig {
                    message: format!("version table override for '{table}' is empty"),
                });
            }
        }
        Ok(())
    }

    pub fn id_column(&self) -> String {
        format!("{}id", self.column_prefix)
    }

    pub fn action_column(&self) -> String {
        format!("{}action", self.column_prefix)
    }

    pub fn action_date_column(&self) -> String {
        format!("{}action_date", self.column_prefix)
    }

    pub fn action_user_column(&self) -> String {
        format!("{}action_user", self.column_prefix)
    }

    pub fn rev_column(&self) -> String {
        format!("{}rev", self.column_prefix)
    }
}

pub(crate) fn is_identifier(s: &str) -> bool {
    s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::WorkspaceConfig;
    use crate::error::WsdbErrorCode;

    #[test]
    fn default_column_names_use_workspace_prefix() {
        let config = WorkspaceConfig::default();
        assert_eq!(config.id_column(), "workspace_id");
        assert_eq!(config.action_column(), "workspace_action");
        assert_eq!(config.action_date_column(), "workspace_action_date");
        assert_eq!(config.action_user_column(), "workspace_action_user");
        assert_eq!(config.rev_column(), "workspace_rev");
        assert!(config.stamp_action_date);
        assert!(!WorkspaceConfig::strict().stamp_action_date);
    }

    #[test]
    fn from_json_fills_defaults_and_validates() {
        let config = WorkspaceConfig::from_json(
            r#"{ "column_prefix": "ws_", "version_tables": { "book": "book_history" } }"#,
        )
        .expect("config");
        assert_eq!(config.column_prefix, "ws_");
        assert_eq!(config.version_suffix, "_version");
        assert_eq!(
            config.version_tables.get("book").map(String::as_str),
            Some("book_history")
        );

        let err = WorkspaceConfig::from_json(r#"{ "column_prefix": "bad prefix" }"#)
            .expect_err("invalid prefix");
        assert_eq!(err.code(), WsdbErrorCode::InvalidConfig);
    }
}
