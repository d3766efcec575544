//! CLI command implementations.

pub mod enroll;
pub mod list;
pub mod status;
pub mod verify;
