//! Domain types and validators for vcdriver configuration.
//!
//! Pure functions only — no I/O, no async, no filesystem access. Environment
//! overrides are applied from a caller-supplied lookup so they stay testable.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::domain::error::ConfigError;
use crate::domain::machine::{DEFAULT_DHCP_TIMEOUT_SECS, DEFAULT_VCENTER_TIMEOUT_SECS, Placement};

// ── Config schema ────────────────────────────────────────────────────────────

/// Top-level configuration stored in `~/.vcdriver/config.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct VcdriverConfig {
    /// vCenter connection settings.
    pub vsphere: VsphereConfig,
    /// Default placement for cloned VMs.
    pub placement: Placement,
    /// Wait windows.
    pub timeouts: TimeoutConfig,
    /// Remote shell credentials.
    pub ssh: SshConfig,
}

/// vCenter connection settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct VsphereConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Skip TLS certificate verification (self-signed labs).
    pub insecure: bool,
    /// Per-request timeout for short API calls, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for VsphereConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 443,
            username: String::new(),
            password: String::new(),
            insecure: false,
            request_timeout_secs: 30,
        }
    }
}

/// DHCP and platform task windows, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TimeoutConfig {
    pub dhcp_secs: u64,
    pub vcenter_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            dhcp_secs: DEFAULT_DHCP_TIMEOUT_SECS,
            vcenter_secs: DEFAULT_VCENTER_TIMEOUT_SECS,
        }
    }
}

/// Remote shell credentials.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct SshConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

// ── Environment overrides ────────────────────────────────────────────────────

pub const ENV_HOST: &str = "VCDRIVER_HOST";
pub const ENV_PORT: &str = "VCDRIVER_PORT";
pub const ENV_USERNAME: &str = "VCDRIVER_USERNAME";
pub const ENV_PASSWORD: &str = "VCDRIVER_PASSWORD";
pub const ENV_DATA_CENTER: &str = "VCDRIVER_DATA_CENTER";
pub const ENV_DATA_STORE: &str = "VCDRIVER_DATA_STORE";
pub const ENV_RESOURCE_POOL: &str = "VCDRIVER_RESOURCE_POOL";
pub const ENV_FOLDER: &str = "VCDRIVER_FOLDER";
pub const ENV_SSH_USERNAME: &str = "VCDRIVER_SSH_USERNAME";
pub const ENV_SSH_PASSWORD: &str = "VCDRIVER_SSH_PASSWORD";

impl VcdriverConfig {
    /// Overlay values found through `lookup` (normally `std::env::var`).
    ///
    /// # Errors
    ///
    /// Returns an error if `VCDRIVER_PORT` is not a valid port number.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let set = |target: &mut String, key: &str| {
            if let Some(v) = lookup(key) {
                *target = v;
            }
        };
        set(&mut self.vsphere.host, ENV_HOST);
        set(&mut self.vsphere.username, ENV_USERNAME);
        set(&mut self.vsphere.password, ENV_PASSWORD);
        set(&mut self.placement.data_center, ENV_DATA_CENTER);
        set(&mut self.placement.data_store, ENV_DATA_STORE);
        set(&mut self.placement.resource_pool, ENV_RESOURCE_POOL);

        if let Some(port) = lookup(ENV_PORT) {
            self.vsphere.port = port.parse().map_err(|_| ConfigError::InvalidValue {
                key: ENV_PORT.to_string(),
                value: port.clone(),
            })?;
        }
        if let Some(folder) = lookup(ENV_FOLDER) {
            self.placement.folder = (!folder.is_empty()).then_some(folder);
        }
        if let Some(user) = lookup(ENV_SSH_USERNAME) {
            self.ssh.username = Some(user);
        }
        if let Some(password) = lookup(ENV_SSH_PASSWORD) {
            self.ssh.password = Some(password);
        }
        Ok(())
    }

    /// Check that everything needed to open a vCenter session is present.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] naming the first empty setting.
    pub fn validate_connection(&self) -> Result<()> {
        require(&self.vsphere.host, "vsphere.host", ENV_HOST)?;
        require(&self.vsphere.username, "vsphere.username", ENV_USERNAME)?;
        require(&self.vsphere.password, "vsphere.password", ENV_PASSWORD)
    }

    /// Check that the default placement names are all set.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] naming the first empty setting.
    pub fn validate_placement(&self) -> Result<()> {
        require(
            &self.placement.data_center,
            "placement.data_center",
            ENV_DATA_CENTER,
        )?;
        require(
            &self.placement.data_store,
            "placement.data_store",
            ENV_DATA_STORE,
        )?;
        require(
            &self.placement.resource_pool,
            "placement.resource_pool",
            ENV_RESOURCE_POOL,
        )
    }

    /// Check that a remote shell user is configured.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] if `ssh.username` is unset.
    pub fn validate_ssh(&self) -> Result<()> {
        require(
            self.ssh.username.as_deref().unwrap_or_default(),
            "ssh.username",
            ENV_SSH_USERNAME,
        )
    }

    /// Copy of the config with passwords masked, for display.
    #[must_use]
    pub fn redacted(&self) -> Self {
        let mut out = self.clone();
        if !out.vsphere.password.is_empty() {
            out.vsphere.password = MASK.to_string();
        }
        if out.ssh.password.is_some() {
            out.ssh.password = Some(MASK.to_string());
        }
        out
    }
}

const MASK: &str = "********";

fn require(value: &str, key: &str, env: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(ConfigError::MissingField {
            key: key.to_string(),
            env: env.to_string(),
        }
        .into());
    }
    Ok(())
}

// ── Unit tests ───────────────────────────────────────────────────────────────
