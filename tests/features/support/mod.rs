//! Shared Cucumber state


pub use world::*;
