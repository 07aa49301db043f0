//! The `VirtualMachine` entity: clone, wait for DHCP, run commands, tear down.
//!
//! Imports only from `crate::domain` and `crate::application::ports`.

use std::time::Duration;

use anyhow::Result;

use crate::application::ports::{
    CloneRequest, PlatformConnection, ProgressReporter, RemoteOutcome, RemoteShell, RemoteTarget,
    Session, SessionProvider, Sleeper,
};
use crate::domain::{MachineSpec, ObjectKind, ObjectRef, VmError, VmRef};

/// Granularity of the DHCP countdown.
const DHCP_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// One leased virtual machine.
///
/// `C` is the platform connection type of the session that provisioned it.
/// The VM reference is `Some` exactly while the VM exists on the platform.
pub struct VirtualMachine<C> {
    spec: MachineSpec,
    session: Option<Session<C>>,
    name: Option<String>,
    vm: Option<VmRef>,
    ip: Option<String>,
}

impl<C: PlatformConnection> VirtualMachine<C> {
    #[must_use]
    pub fn new(spec: MachineSpec) -> Self {
        Self {
            name: spec.name.clone(),
            spec,
            session: None,
            vm: None,
            ip: None,
        }
    }

    #[must_use]
    pub fn spec(&self) -> &MachineSpec {
        &self.spec
    }

    /// Name the VM was (or will be) cloned under. `None` until a session has
    /// been opened when no name was configured.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// DHCP address, set after a successful `create()`.
    #[must_use]
    pub fn ip(&self) -> Option<&str> {
        self.ip.as_deref()
    }

    #[must_use]
    pub fn vm_ref(&self) -> Option<&VmRef> {
        self.vm.as_ref()
    }

    #[must_use]
    pub fn exists(&self) -> bool {
        self.vm.is_some()
    }

    /// Clone the template, power it on, and wait for a DHCP address.
    ///
    /// No-op once the VM exists and has an address. A VM that was cloned but
    /// timed out waiting for DHCP is not cloned again; only the wait is
    /// repeated.
    ///
    /// # Errors
    ///
    /// Returns `VmError::ObjectNotFound` for unknown placement names or
    /// template, `VmError::TaskFailed`/`TaskTimeout` if the clone does not
    /// complete, and `VmError::DhcpTimeout` if no address shows up in time.
    /// After a DHCP timeout the VM still exists and must be destroyed.
    pub async fn create<P>(
        &mut self,
        sessions: &P,
        clock: &impl Sleeper,
        reporter: &impl ProgressReporter,
    ) -> Result<()>
    where
        P: SessionProvider<Connection = C>,
    {
        if self.vm.is_some() && self.ip.is_some() {
            return Ok(());
        }
        let session = match self.session.take() {
            Some(session) => session,
            None => sessions.connect().await?,
        };
        let session = &*self.session.insert(session);
        let connection = &session.connection;
        let name = self.name.get_or_insert_with(|| session.id.clone()).clone();

        let vm = match self.vm.clone() {
            Some(vm) => vm,
            None => {
                let placement = resolve_placement(connection, &self.spec).await?;
                let vm = clone_template(
                    connection,
                    &CloneRequest {
                        template: &placement.template,
                        folder: &placement.folder,
                        name: &name,
                        datastore: &placement.datastore,
                        resource_pool: &placement.resource_pool,
                        power_on: true,
                        as_template: false,
                    },
                    &self.spec.template,
                    Duration::from_secs(self.spec.vcenter_timeout_secs),
                )
                .await?;
                reporter.success(&format!("Virtual machine '{name}' created"));
                self.vm = Some(vm.clone());
                vm
            }
        };

        reporter.step(&format!(
            "Virtual machine '{name}' waiting on the DHCP server"
        ));
        let ip = wait_for_dhcp(
            connection,
            clock,
            &vm,
            &name,
            self.spec.dhcp_timeout_secs,
        )
        .await?;
        reporter.success(&format!("Virtual machine '{name}' is at {ip}"));
        self.ip = Some(ip);
        Ok(())
    }

    /// Power the VM off and delete it.
    ///
    /// No-op if the VM does not exist. The VM is considered gone as soon as
    /// teardown starts, even if a step below fails.
    ///
    /// # Errors
    ///
    /// Returns `VmError::TaskFailed`/`TaskTimeout` if power-off or delete
    /// does not complete.
    pub async fn destroy(&mut self) -> Result<()> {
        let Some(vm) = self.vm.take() else {
            return Ok(());
        };
        self.ip = None;
        let Some(session) = self.session.as_ref() else {
            return Ok(());
        };
        let connection = &session.connection;
        let name = self.name.as_deref().unwrap_or(vm.0.as_str());
        let timeout = self.vcenter_timeout();

        let task = connection.submit_power_off(&vm).await?;
        connection
            .await_task(
                task,
                &format!("Power off virtual machine '{name}'"),
                timeout,
            )
            .await?;
        let task = connection.submit_destroy(&vm).await?;
        connection
            .await_task(task, &format!("Destroy virtual machine '{name}'"), timeout)
            .await?;
        Ok(())
    }

    /// Run `command` on the VM, optionally through sudo.
    ///
    /// Returns the remote exit code. Exactly one attempt is made.
    ///
    /// # Errors
    ///
    /// Returns `VmError::NotProvisioned` before a successful `create()` and
    /// `VmError::RemoteCommandFailed` if the command (or the connection to
    /// run it) fails.
    pub async fn ssh(
        &self,
        shell: &impl RemoteShell,
        command: &str,
        use_sudo: bool,
    ) -> Result<i32> {
        let outcome = self.execute(shell, command, use_sudo).await?;
        if outcome.failed {
            return Err(VmError::RemoteCommandFailed {
                command: command.to_string(),
                exit_code: outcome.exit_code,
            }
            .into());
        }
        Ok(outcome.exit_code)
    }

    /// Run `command` on the VM and hand back everything it produced,
    /// whether it succeeded or not.
    ///
    /// # Errors
    ///
    /// Returns `VmError::NotProvisioned` before a successful `create()`, or
    /// the shell's error if the command could not be attempted.
    pub async fn execute(
        &self,
        shell: &impl RemoteShell,
        command: &str,
        use_sudo: bool,
    ) -> Result<RemoteOutcome> {
        let Some(host) = self.ip.as_deref() else {
            return Err(VmError::NotProvisioned {
                name: self.name.clone().unwrap_or_default(),
            }
            .into());
        };
        let target = RemoteTarget {
            host,
            username: &self.spec.ssh.username,
            password: self.spec.ssh.password.as_deref(),
        };
        shell.exec_remote(&target, command, use_sudo).await
    }

    fn vcenter_timeout(&self) -> Duration {
        Duration::from_secs(self.spec.vcenter_timeout_secs)
    }
}

async fn clone_template(
    connection: &impl PlatformConnection,
    request: &CloneRequest<'_>,
    template_name: &str,
    timeout: Duration,
) -> Result<VmRef> {
    let description = format!(
        "Create virtual machine '{}' from template '{template_name}'",
        request.name
    );
    let task = connection.submit_clone(request).await?;
    connection
        .await_task(task, &description, timeout)
        .await?
        .ok_or_else(|| {
            VmError::TaskFailed {
                description,
                reason: "clone finished without a virtual machine".to_string(),
            }
            .into()
        })
}

/// Poll the guest for an address once per second, `timeout_secs` times.
async fn wait_for_dhcp(
    connection: &impl PlatformConnection,
    clock: &impl Sleeper,
    vm: &VmRef,
    name: &str,
    timeout_secs: u64,
) -> Result<String> {
    let mut remaining = timeout_secs;
    while remaining > 0 {
        if let Some(ip) = connection.guest_ip_address(vm).await? {
            return Ok(ip);
        }
        clock.sleep(DHCP_POLL_INTERVAL).await;
        remaining -= 1;
    }
    Err(VmError::DhcpTimeout {
        name: name.to_string(),
        timeout_secs,
    }
    .into())
}

/// Platform objects a clone is placed with.
struct ResolvedPlacement {
    folder: ObjectRef,
    datastore: ObjectRef,
    resource_pool: ObjectRef,
    template: ObjectRef,
}

/// Resolve every placement name and the template, in that order. Without a
/// configured folder the datacenter's default VM folder is used.
async fn resolve_placement(
    connection: &impl PlatformConnection,
    spec: &MachineSpec,
) -> Result<ResolvedPlacement> {
    let placement = &spec.placement;
    let folder = match placement.folder.as_deref() {
        None => {
            let datacenter = connection
                .resolve(ObjectKind::Datacenter, &placement.data_center)
                .await?;
            connection.default_vm_folder(&datacenter).await?
        }
        Some(folder) => connection.resolve(ObjectKind::Folder, folder).await?,
    };
    Ok(ResolvedPlacement {
        folder,
        datastore: connection
            .resolve(ObjectKind::Datastore, &placement.data_store)
            .await?,
        resource_pool: connection
            .resolve(ObjectKind::ResourcePool, &placement.resource_pool)
            .await?,
        template: connection
            .resolve(ObjectKind::VirtualMachineTemplate, &spec.template)
            .await?,
    })
}
