//! Data models

mod certificate;
mod command;
mod pki;

pub use certificate::*;
pub use command::*;
pub use pki::*;
