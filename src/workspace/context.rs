use crate::error::WsdbError;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::sync::Arc;

/// Source of the caller's workspace and user identity.
///
/// Interceptor operations take a resolver explicitly and call
/// [`WorkspaceResolver::current_workspace`] once, before issuing any
/// statement. An error there aborts the operation.
pub trait WorkspaceResolver {
    fn current_workspace(&self) -> Result<i64, WsdbError>;

    fn current_user(&self) -> Option<i64> {
        None
    }
}

/// Fixed identity for one caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkspaceContext {
    workspace_id: Option<i64>,
    user_id: Option<i64>,
}

impl WorkspaceContext {
    pub fn new(workspace_id: i64) -> Self {
        Self {
            workspace_id: Some(workspace_id),
            user_id: None,
        }
    }

    /// Context with no workspace established. Every scoped operation fails.
    pub fn unset() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, user_id: i64) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn workspace_id(&self) -> Option<i64> {
        self.workspace_id
    }
}

impl WorkspaceResolver for WorkspaceContext {
    fn current_workspace(&self) -> Result<i64, WsdbError> {
        self.workspace_id.ok_or(WsdbError::WorkspaceContextMissing)
    }

    fn current_user(&self) -> Option<i64> {
        self.user_id
    }
}

/// Resolver backed by a closure, e.g. one reading a session or request
/// extension. `None` means no workspace is established.
pub struct FnResolver<F> {
    workspace: F,
}

impl<F> FnResolver<F>
where
    F: Fn() -> Option<i64>,
{
    pub fn new(workspace: F) -> Self {
        Self { workspace }
    }
}

impl<F> WorkspaceResolver for FnResolver<F>
where
    F: Fn() -> Option<i64>,
{
    fn current_workspace(&self) -> Result<i64, WsdbError> {
        (self.workspace)().ok_or(WsdbError::WorkspaceContextMissing)
    }
}

type SharedResolver = Arc<dyn WorkspaceResolver + Send + Sync>;

static DEFAULT_RESOLVER: Lazy<RwLock<Option<SharedResolver>>> = Lazy::new(|| RwLock::new(None));

/// Installs the process-wide resolver used by [`DefaultResolver`].
pub fn set_default_resolver<R>(resolver: R)
where
    R: WorkspaceResolver + Send + Sync + 'static,
{
    *DEFAULT_RESOLVER.write() = Some(Arc::new(resolver));
}

pub fn clear_default_resolver() {
    *DEFAULT_RESOLVER.write() = None;
}

/// Delegates to the process-wide resolver installed with
/// [`set_default_resolver`]. Fails with `WorkspaceContextMissing` when none is
/// installed.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultResolver;

impl WorkspaceResolver for DefaultResolver {
    fn current_workspace(&self) -> Result<i64, WsdbError> {
        let installed = DEFAULT_RESOLVER.read().clone();
        match installed {
            Some(resolver) => resolver.current_workspace(),
            None => Err(WsdbError::WorkspaceContextMissing),
        }
    }

    fn current_user(&self) -> Option<i64> {
        let installed = DEFAULT_RESOLVER.read().clone();
        installed.and_then(|resolver| resolver.current_user())
    }
}

pub fn get_workspace_id(resolver: &dyn WorkspaceResolver) -> Result<i64, WsdbError> {
    resolver.current_workspace()
}
