//! Repository implementations for database operations

pub mod signals;

pub use signals::*;
