//! Scoped lifecycle of a group of VMs: create all, run caller work, destroy all.
//!
//! Imports only from `crate::domain` and `crate::application::ports`.

use anyhow::Result;

use crate::application::ports::{PlatformConnection, ProgressReporter, SessionProvider, Sleeper};

use super::machine::VirtualMachine;

/// Create every VM in `vms` in order, run `body` with the live group, then
/// destroy every VM in order.
///
/// Teardown happens on every path:
/// - if a `create()` fails, the whole group is destroyed and the creation
///   error is returned;
/// - if `body` fails, a notice is reported, the whole group is destroyed and
///   the body's error is returned unchanged; teardown failures on this path
///   are reported as warnings;
/// - if `body` succeeds, the whole group is destroyed and the first teardown
///   error (if any) is returned.
///
/// Each VM's `destroy()` is attempted exactly once per sweep.
///
/// # Errors
///
/// Returns the first creation error, the body's error, or the first teardown
/// error after a successful body.
pub async fn with_virtual_machines<P, T>(
    vms: &mut [VirtualMachine<P::Connection>],
    sessions: &P,
    clock: &impl Sleeper,
    reporter: &impl ProgressReporter,
    body: impl AsyncFnOnce(&[VirtualMachine<P::Connection>]) -> Result<T>,
) -> Result<T>
where
    P: SessionProvider,
{
    let mut creation_error = None;
    for vm in vms.iter_mut() {
        if let Err(err) = vm.create(sessions, clock, reporter).await {
            creation_error = Some(err);
            break;
        }
    }
    if let Some(err) = creation_error {
        reporter.warn("Virtual machine creation failed, cleaning up virtual machines:");
        destroy_all(vms, reporter).await;
        return Err(err);
    }

    match body(&*vms).await {
        Ok(value) => {
            let mut first_error = None;
            for vm in vms.iter_mut() {
                if let Err(err) = vm.destroy().await {
                    first_error.get_or_insert(err);
                }
            }
            match first_error {
                Some(err) => Err(err),
                None => Ok(value),
            }
        }
        Err(err) => {
            reporter.warn("An error has been raised, cleaning up virtual machines:");
            destroy_all(vms, reporter).await;
            Err(err)
        }
    }
}

/// Best-effort teardown used on failure paths.
async fn destroy_all<C: PlatformConnection>(
    vms: &mut [VirtualMachine<C>],
    reporter: &impl ProgressReporter,
) {
    for vm in vms.iter_mut() {
        let name = vm.name().unwrap_or("<unnamed>").to_string();
        if let Err(err) = vm.destroy().await {
            reporter.warn(&format!("failed to destroy '{name}': {err:#}"));
        }
    }
}
