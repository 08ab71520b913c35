//! easy-rsa manager library
//!
//! Reads the state of an easy-rsa PKI directory and drives the easy-rsa
//! script to change it.

pub mod config;
pub mod models;
pub mod services;
pub mod utils;

pub use config::AppConfig;
pub use services::{CaOperation, CommandRunner, OperationRunner, PkiStore};
