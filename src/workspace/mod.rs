pub mod action;
pub mod context;
pub mod interceptor;

pub use action::{WorkspaceAction, WriteMode};
pub use context::{
    DefaultResolver, FnResolver, WorkspaceContext, WorkspaceResolver, clear_default_resolver,
    get_workspace_id, set_default_resolver,
};
pub use interceptor::{GovernedStore, WorkspaceInterceptor};
