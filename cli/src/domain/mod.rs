//! Domain layer — pure types, validation, and identifiers.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`,
//! `crate::application`, `tokio`, `std::fs`, `std::process`, or `std::net`.
//! All functions are synchronous and take data in, returning data out.

pub mod config;
pub mod error;
pub mod machine;
pub mod session;

pub use config::VcdriverConfig;
pub use error::{ConfigError, VmError};
pub use machine::{MachineSpec, ObjectKind, ObjectRef, Placement, SshCredentials, VmRef};
