//! Subcommand handlers.

pub mod index;
pub mod runtime;
pub mod sign;
pub mod verify;
