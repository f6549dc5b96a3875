use crate::catalog::types::Value;
use crate::error::WsdbError;
use serde::{Deserialize, Serialize};

/// Last lifecycle action recorded on a governed row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i64)]
pub enum WorkspaceAction {
    Deleted = 0,
    Created = 1,
    Updated = 2,
}

impl WorkspaceAction {
    pub fn code(self) -> i64 {
        self as i64
    }

    pub fn from_code(code: i64) -> Result<Self, WsdbError> {
        match code {
            0 => Ok(WorkspaceAction::Deleted),
            1 => Ok(WorkspaceAction::Created),
            2 => Ok(WorkspaceAction::Updated),
            other => Err(WsdbError::Decode(format!(
                "unknown workspace action code {other}"
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WorkspaceAction::Deleted => "deleted",
            WorkspaceAction::Created => "created",
            WorkspaceAction::Updated => "updated",
        }
    }
}

impl From<WorkspaceAction> for Value {
    fn from(action: WorkspaceAction) -> Self {
        Value::Integer(action.code())
    }
}

/// Kind of access an interceptor call performs. Determines the action code
/// stamped by scoping injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Insert,
    Update,
    Delete,
    Select,
}

impl WriteMode {
    pub fn action(self) -> Option<WorkspaceAction> {
        match self {
            WriteMode::Insert => Some(WorkspaceAction::Created),
            WriteMode::Update => Some(WorkspaceAction::Updated),
            WriteMode::Delete => Some(WorkspaceAction::Deleted),
            WriteMode::Select => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{WorkspaceAction, WriteMode};

    #[test]
    fn action_codes_are_stable() {
        assert_eq!(WorkspaceAction::Deleted.code(), 0);
        assert_eq!(WorkspaceAction::Created.code(), 1);
        assert_eq!(WorkspaceAction::Updated.code(), 2);
        assert_eq!(
            WorkspaceAction::from_code(2).expect("updated"),
            WorkspaceAction::Updated
        );
        assert!(WorkspaceAction::from_code(9).is_err());
    }

    #[test]
    fn select_mode_implies_no_action() {
        assert_eq!(WriteMode::Select.action(), None);
        assert_eq!(WriteMode::Delete.action(), Some(WorkspaceAction::Deleted));
    }
}
