//! PKI services

pub mod command_runner;
pub mod operations;
pub mod parser;
pub mod pki_store;

pub use command_runner::{set_vars, CommandRunner, ToolError};
pub use operations::{CaOperation, OperationReport, OperationRunner};
pub use parser::IndexLineError;
pub use pki_store::PkiStore;
