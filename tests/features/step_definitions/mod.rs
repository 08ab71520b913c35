//! Step definitions for Cucumber scenarios

pub mod common_steps;
pub mod operation_steps;
pub mod pki_steps;
