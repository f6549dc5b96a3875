use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceType {
    Table,
    Column,
    VersionTable,
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceType::Table => write!(f, "table"),
            ResourceType::Column => write!(f, "column"),
            ResourceType::VersionTable => write!(f, "version table"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WsdbErrorCode {
    Io,
    Encode,
    Decode,
    Validation,
    InvalidConfig,
    SchemaDerivation,
    AmbiguousCriteria,
    WorkspaceContextMissing,
    StorageExecution,
    TableAlreadyExists,
    ColumnAlreadyExists,
    VersionTableAlreadyExists,
    TableNotFound,
    ColumnNotFound,
    VersionTableNotFound,
    NotGoverned,
    DuplicatePrimaryKey,
    NotNullViolation,
    TypeMismatch,
    UnknownColumn,
}

impl WsdbErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            WsdbErrorCode::Io => "io",
            WsdbErrorCode::Encode => "encode",
            WsdbErrorCode::Decode => "decode",
            WsdbErrorCode::Validation => "validation",
            WsdbErrorCode::InvalidConfig => "invalid_config",
            WsdbErrorCode::SchemaDerivation => "schema_derivation",
            WsdbErrorCode::AmbiguousCriteria => "ambiguous_criteria",
            WsdbErrorCode::WorkspaceContextMissing => "workspace_context_missing",
            WsdbErrorCode::StorageExecution => "storage_execution",
            WsdbErrorCode::TableAlreadyExists => "table_already_exists",
            WsdbErrorCode::ColumnAlreadyExists => "column_already_exists",
            WsdbErrorCode::VersionTableAlreadyExists => "version_table_already_exists",
            WsdbErrorCode::TableNotFound => "table_not_found",
            WsdbErrorCode::ColumnNotFound => "column_not_found",
            WsdbErrorCode::VersionTableNotFound => "version_table_not_found",
            WsdbErrorCode::NotGoverned => "not_governed",
            WsdbErrorCode::DuplicatePrimaryKey => "duplicate_primary_key",
            WsdbErrorCode::NotNullViolation => "not_null_violation",
            WsdbErrorCode::TypeMismatch => "type_mismatch",
            WsdbErrorCode::UnknownColumn => "unknown_column",
        }
    }
}

#[derive(Debug, Error)]
pub enum WsdbError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("encode error: {0}")]
    Encode(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("invalid config: {message}")]
    InvalidConfig { message: String },
    /// Schema setup failed; not recoverable at runtime.
    #[error("cannot derive workspace schema for table '{table}': {message}")]
    SchemaDerivation { table: String, message: String },
    #[error("cannot resolve target table from criteria: {reason}")]
    AmbiguousCriteria { reason: String },
    #[error("no current workspace is established")]
    WorkspaceContextMissing,
    #[error("unable to execute statement [{statement}] with params [{params}]: {message}")]
    StorageExecution {
        statement: String,
        params: String,
        message: String,
    },
    #[error("{resource_type} '{resource_id}' already exists")]
    AlreadyExists {
        resource_type: ResourceType,
        resource_id: String,
    },
    #[error("{resource_type} '{resource_id}' not found")]
    NotFound {
        resource_type: ResourceType,
        resource_id: String,
    },
    #[error("table '{table}' is not under workspace behavior")]
    NotGoverned { table: String },
    #[error("duplicate primary key in table '{table}': {key}")]
    DuplicatePK { table: String, key: String },
    #[error("NOT NULL violation: column '{column}' in table '{table}'")]
    NotNullViolation { table: String, column: String },
    #[error(
        "type mismatch: column '{column}' in table '{table}' expected {expected}, got {actual}"
    )]
    TypeMismatch {
        table: String,
        column: String,
        expected: String,
        actual: String,
    },
    #[error("unknown column '{column}' in table '{table}'")]
    UnknownColumn { table: String, column: String },
}

impl WsdbError {
    pub fn code(&self) -> WsdbErrorCode {
        match self {
            WsdbError::Io(_) => WsdbErrorCode::Io,
            WsdbError::Encode(_) => WsdbErrorCode::Encode,
            WsdbError::Decode(_) => WsdbErrorCode::Decode,
            WsdbError::Validation(_) => WsdbErrorCode::Validation,
            WsdbError::InvalidConfig { .. } => WsdbErrorCode::InvalidConfig,
            WsdbError::SchemaDerivation { .. } => WsdbErrorCode::SchemaDerivation,
            WsdbError::AmbiguousCriteria { .. } => WsdbErrorCode::AmbiguousCriteria,
            WsdbError::WorkspaceContextMissing => WsdbErrorCode::WorkspaceContextMissing,
            WsdbError::StorageExecution { .. } => WsdbErrorCode::StorageExecution,
            WsdbError::AlreadyExists { resource_type, .. } => match resource_type {
                ResourceType::Table => WsdbErrorCode::TableAlreadyExists,
                ResourceType::Column => WsdbErrorCode::ColumnAlreadyExists,
                ResourceType::VersionTable => WsdbErrorCode::VersionTableAlreadyExists,
            },
            WsdbError::NotFound { resource_type, .. } => match resource_type {
                ResourceType::Table => WsdbErrorCode::TableNotFound,
                ResourceType::Column => WsdbErrorCode::ColumnNotFound,
                ResourceType::VersionTable => WsdbErrorCode::VersionTableNotFound,
            },
            WsdbError::NotGoverned { .. } => WsdbErrorCode::NotGoverned,
            WsdbError::DuplicatePK { .. } => WsdbErrorCode::DuplicatePrimaryKey,
            WsdbError::NotNullViolation { .. } => WsdbErrorCode::NotNullViolation,
            WsdbError::TypeMismatch { .. } => WsdbErrorCode::TypeMismatch,
            WsdbError::UnknownColumn { .. } => WsdbErrorCode::UnknownColumn,
        }
    }

    pub fn code_str(&self) -> &'static str {
        self.code().as_str()
    }

    pub(crate) fn table_not_found(table: &str) -> Self {
        WsdbError::NotFound {
            resource_type: ResourceType::Table,
            resource_id: table.to_string(),
        }
    }
}
