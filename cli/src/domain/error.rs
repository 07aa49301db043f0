//! Typed domain error enums.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`,
//! `crate::application`, `tokio`, `std::fs`, `std::process`, or `std::net`.
//! All error types implement `thiserror::Error` and convert to `anyhow::Error`
//! via the `?` operator.

use thiserror::Error;

use crate::domain::machine::ObjectKind;

// ── Virtual machine errors ────────────────────────────────────────────────────

/// Errors raised while provisioning, tearing down, or driving a VM.
#[derive(Debug, Error)]
pub enum VmError {
    #[error("{kind} '{name}' not found")]
    ObjectNotFound { kind: ObjectKind, name: String },

    #[error("Task failed: {description}: {reason}")]
    TaskFailed { description: String, reason: String },

    #[error("Task timed out after {timeout_secs}s: {description}")]
    TaskTimeout {
        description: String,
        timeout_secs: u64,
    },

    #[error("Virtual machine '{name}' got no DHCP address within {timeout_secs}s")]
    DhcpTimeout { name: String, timeout_secs: u64 },

    #[error("Command '{command}' failed with exit code {exit_code}")]
    RemoteCommandFailed { command: String, exit_code: i32 },

    #[error("Virtual machine '{name}' has no address. Call create() first.")]
    NotProvisioned { name: String },
}

impl VmError {
    /// Whether the error leaves the platform in a state the caller should not
    /// continue from (failed/timed-out tasks and DHCP timeouts).
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::TaskFailed { .. } | Self::TaskTimeout { .. } | Self::DhcpTimeout { .. }
        )
    }
}

/// Returns `true` if `err` wraps a fatal [`VmError`].
#[must_use]
pub fn is_fatal(err: &anyhow::Error) -> bool {
    err.downcast_ref::<VmError>().is_some_and(VmError::is_fatal)
}

// ── Config errors ─────────────────────────────────────────────────────────────

/// Errors related to configuration validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing setting: {key}\n\nSet it in the config file or via {env}")]
    MissingField { key: String, env: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}
