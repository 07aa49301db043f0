//! Run one command on a batch of freshly cloned VMs.
//!
//! The use-case behind `vcdriver run`: clone `count` VMs from the same spec,
//! run the command on each in order, and tear everything down whatever
//! happens.

use anyhow::Result;
use serde::Serialize;

use crate::application::ports::{ProgressReporter, RemoteShell, SessionProvider, Sleeper};
use crate::application::services::vm::{VirtualMachine, with_virtual_machines};
use crate::domain::{MachineSpec, VmError};

/// Exit status and output of the command on one VM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandResult {
    pub name: String,
    pub ip: String,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Expand `base` into `count` specs.
///
/// A configured name is suffixed with `-1`, `-2`, … when more than one VM is
/// requested; unnamed specs stay unnamed and pick up their session id.
#[must_use]
pub fn expand_specs(base: &MachineSpec, count: usize) -> Vec<MachineSpec> {
    (1..=count)
        .map(|index| {
            let mut spec = base.clone();
            if count > 1
                && let Some(name) = &base.name
            {
                spec.name = Some(format!("{name}-{index}"));
            }
            spec
        })
        .collect()
}

/// Clone a VM per spec, run `command` on each, destroy them all.
///
/// Whatever the command prints is echoed through `reporter` as soon as it
/// finishes on each VM, including on the VM where it failed.
///
/// # Errors
///
/// Returns the first creation, command, or teardown error. A failing command
/// stops the batch; the remaining VMs are not run but are still destroyed.
pub async fn run_on_fresh_vms<P: SessionProvider>(
    specs: Vec<MachineSpec>,
    command: &str,
    use_sudo: bool,
    sessions: &P,
    shell: &impl RemoteShell,
    clock: &impl Sleeper,
    reporter: &impl ProgressReporter,
) -> Result<Vec<CommandResult>> {
    let mut vms: Vec<VirtualMachine<P::Connection>> =
        specs.into_iter().map(VirtualMachine::new).collect();

    with_virtual_machines(&mut vms, sessions, clock, reporter, async |vms| {
        let mut results = Vec::with_capacity(vms.len());
        for vm in vms {
            let name = vm.name().unwrap_or_default().to_string();
            reporter.step(&format!("running '{command}' on '{name}'"));
            let outcome = vm.execute(shell, command, use_sudo).await?;
            reporter.remote_output(&name, &outcome.stdout, &outcome.stderr);
            if outcome.failed {
                return Err(VmError::RemoteCommandFailed {
                    command: command.to_string(),
                    exit_code: outcome.exit_code,
                }
                .into());
            }
            results.push(CommandResult {
                ip: vm.ip().unwrap_or_default().to_string(),
                name,
                exit_code: outcome.exit_code,
                stdout: outcome.stdout,
                stderr: outcome.stderr,
            });
        }
        Ok(results)
    })
    .await
}
