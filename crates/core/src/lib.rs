//! Quote- and comment-aware SQL text tooling for an editor front end:
//! statement splitting, execution-target selection, destructive statement
//! auditing, named parameters and MySQL to PostgreSQL identifier rewriting.

pub mod charclass;
pub mod destructive;
pub mod dialect;
pub mod execution_target;
pub mod guard;
pub mod parameters;
pub mod retry;
pub mod scanner;
pub mod settings;
pub mod splitter;

pub use destructive::{find_unsafe_statements, DestructiveFinding, DestructiveKind};
pub use dialect::{build_retry_candidates, strip_qualifier, translate_mysql_to_postgres};
pub use execution_target::{pick_execution_target, ExecutionMode, ExecutionTarget, TargetSource};
pub use parameters::{apply_parameters, extract_parameter_names};
pub use splitter::{split_statements, StatementSpan};
