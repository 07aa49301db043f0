//! Virtual machine domain types.
//!
//! Pure data only. A [`MachineSpec`] is the fully-resolved, immutable desired
//! configuration of one leased VM; platform references are opaque identifiers
//! handed out by the platform adapter.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::config::VcdriverConfig;

/// Default seconds to wait for a DHCP lease after clone.
pub const DEFAULT_DHCP_TIMEOUT_SECS: u64 = 120;

/// Default seconds allowed for a single platform task (clone, power-off, destroy).
pub const DEFAULT_VCENTER_TIMEOUT_SECS: u64 = 600;

// ── Platform references ───────────────────────────────────────────────────────

/// Kinds of platform objects looked up by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Datacenter,
    Datastore,
    ResourcePool,
    Folder,
    VirtualMachineTemplate,
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Datacenter => "datacenter",
            Self::Datastore => "datastore",
            Self::ResourcePool => "resource pool",
            Self::Folder => "folder",
            Self::VirtualMachineTemplate => "template",
        })
    }
}

/// Opaque reference to a resolved platform object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRef {
    pub kind: ObjectKind,
    pub id: String,
}

impl ObjectRef {
    #[must_use]
    pub fn new(kind: ObjectKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }
}

/// Opaque reference to a provisioned virtual machine.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VmRef(pub String);

impl fmt::Display for VmRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── Desired configuration ─────────────────────────────────────────────────────

/// Where a clone lands on the platform.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Placement {
    pub data_center: String,
    pub data_store: String,
    pub resource_pool: String,
    /// VM folder name. `None` means the data center's default VM folder.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,
}

/// Credentials for the remote shell.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SshCredentials {
    pub username: String,
    /// `None` falls back to key-based authentication.
    pub password: Option<String>,
}

/// Fully-resolved desired configuration of one VM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineSpec {
    /// Template the VM is cloned from.
    pub template: String,
    pub placement: Placement,
    /// Desired VM name. `None` adopts the session identifier on create.
    pub name: Option<String>,
    pub ssh: SshCredentials,
    pub dhcp_timeout_secs: u64,
    pub vcenter_timeout_secs: u64,
}

impl MachineSpec {
    /// Build a spec for `template` from the placement, credentials and
    /// timeouts in `config`.
    #[must_use]
    pub fn new(template: impl Into<String>, config: &VcdriverConfig) -> Self {
        Self {
            template: template.into(),
            placement: config.placement.clone(),
            name: None,
            ssh: SshCredentials {
                username: config.ssh.username.clone().unwrap_or_default(),
                password: config.ssh.password.clone(),
            },
            dhcp_timeout_secs: config.timeouts.dhcp_secs,
            vcenter_timeout_secs: config.timeouts.vcenter_secs,
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_ssh(mut self, username: impl Into<String>, password: Option<String>) -> Self {
        self.ssh = SshCredentials {
            username: username.into(),
            password,
        };
        self
    }

    #[must_use]
    pub fn with_timeouts(mut self, dhcp_secs: u64, vcenter_secs: u64) -> Self {
        self.dhcp_timeout_secs = dhcp_secs;
        self.vcenter_timeout_secs = vcenter_secs;
        self
    }
}
