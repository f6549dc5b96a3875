pub mod eval;
pub mod plan;
pub mod sql;
