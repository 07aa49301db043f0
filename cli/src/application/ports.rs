//! Port trait definitions for the Application layer.
//!
//! Ports are the interfaces (contracts) that infrastructure must fulfill.
//! This file imports only from `crate::domain` — never from `crate::infra`,
//! `crate::commands`, or `crate::output`.

use std::path::PathBuf;
use std::process::Output;
use std::time::Duration;

use anyhow::Result;

use crate::domain::{ObjectKind, ObjectRef, VcdriverConfig, VmRef};

// ── Value Types ───────────────────────────────────────────────────────────────

/// An authenticated platform session.
pub struct Session<C> {
    /// Unique identifier of this session; the default VM name.
    pub id: String,
    /// Handle used for every subsequent platform call.
    pub connection: C,
}

/// Parameters of a clone-from-template operation.
#[derive(Debug)]
pub struct CloneRequest<'a> {
    pub template: &'a ObjectRef,
    pub folder: &'a ObjectRef,
    pub name: &'a str,
    pub datastore: &'a ObjectRef,
    pub resource_pool: &'a ObjectRef,
    /// Power the clone on once it exists.
    pub power_on: bool,
    /// Mark the clone as a template instead of a runnable VM.
    pub as_template: bool,
}

/// Where and as whom a remote command runs.
#[derive(Debug)]
pub struct RemoteTarget<'a> {
    pub host: &'a str,
    pub username: &'a str,
    pub password: Option<&'a str>,
}

/// Result of one remote command execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteOutcome {
    pub exit_code: i32,
    /// Non-zero exit, connection failure, or authentication failure.
    pub failed: bool,
    /// Captured standard output, lossily decoded.
    pub stdout: String,
    /// Captured standard error, lossily decoded. Also carries `ssh`'s own
    /// diagnostics on connection failures.
    pub stderr: String,
}

// ── Platform Port Traits ──────────────────────────────────────────────────────

/// Name-based lookup of platform objects.
#[allow(async_fn_in_trait)]
pub trait ObjectResolver {
    /// Resolve an object of `kind` by `name`.
    ///
    /// # Errors
    ///
    /// Returns `VmError::ObjectNotFound` when nothing of that kind has that name.
    async fn resolve(&self, kind: ObjectKind, name: &str) -> Result<ObjectRef>;
    /// The default VM folder of a data center.
    async fn default_vm_folder(&self, datacenter: &ObjectRef) -> Result<ObjectRef>;
}

/// Asynchronous VM operations. Each `submit_*` returns a task handle that
/// must be passed to [`TaskWaiter::await_task`].
#[allow(async_fn_in_trait)]
pub trait VmOperations {
    /// Handle to an in-progress platform operation.
    type Task;

    /// Start cloning a template.
    async fn submit_clone(&self, request: &CloneRequest<'_>) -> Result<Self::Task>;
    /// Start powering a VM off.
    async fn submit_power_off(&self, vm: &VmRef) -> Result<Self::Task>;
    /// Start deleting a VM from disk and inventory.
    async fn submit_destroy(&self, vm: &VmRef) -> Result<Self::Task>;
    /// The guest's primary IP address, if the guest reports one yet.
    async fn guest_ip_address(&self, vm: &VmRef) -> Result<Option<String>>;
}

/// Blocks on platform tasks until completion, failure, or timeout.
#[allow(async_fn_in_trait)]
pub trait TaskWaiter: VmOperations {
    /// Wait for `task`. Returns the VM the task produced, if any.
    ///
    /// # Errors
    ///
    /// Returns `VmError::TaskFailed` if the platform reports failure and
    /// `VmError::TaskTimeout` if `timeout` elapses first.
    async fn await_task(
        &self,
        task: Self::Task,
        description: &str,
        timeout: Duration,
    ) -> Result<Option<VmRef>>;
}

/// Composite trait — any type implementing the resolver and task traits is a
/// `PlatformConnection`.
pub trait PlatformConnection: ObjectResolver + TaskWaiter {}

/// Blanket implementation: any type implementing all sub-traits is a `PlatformConnection`.
impl<T> PlatformConnection for T where T: ObjectResolver + TaskWaiter {}

/// Authenticates against the platform.
#[allow(async_fn_in_trait)]
pub trait SessionProvider {
    type Connection: PlatformConnection;

    /// Open a new session with a fresh unique identifier.
    async fn connect(&self) -> Result<Session<Self::Connection>>;
}

// ── Remote Shell Port ─────────────────────────────────────────────────────────

/// Runs a single command on a remote host.
#[allow(async_fn_in_trait)]
pub trait RemoteShell {
    /// Execute `command` on `target`, elevated with sudo if `elevate`.
    ///
    /// Connection and authentication failures are reported through
    /// [`RemoteOutcome::failed`], not as `Err`. `Err` means the command
    /// could not be attempted at all.
    async fn exec_remote(
        &self,
        target: &RemoteTarget<'_>,
        command: &str,
        elevate: bool,
    ) -> Result<RemoteOutcome>;
}

// ── Command Runner Port ───────────────────────────────────────────────────────

/// Abstracts process execution so infrastructure can be swapped or mocked.
#[allow(async_fn_in_trait)]
pub trait CommandRunner {
    /// Run a program and capture its output, bounded by the runner's
    /// configured timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned or exceeds the
    /// timeout. On timeout, the child process must be killed (not left
    /// orphaned).
    async fn run(&self, program: &str, args: &[&str]) -> Result<Output>;
    /// Run a program with extra environment variables and, optionally, stdin
    /// piped from `stdin`.
    async fn run_with_env(
        &self,
        program: &str,
        args: &[&str],
        env: &[(&str, &str)],
        stdin: Option<&[u8]>,
    ) -> Result<Output>;
}

// ── Clock Port ────────────────────────────────────────────────────────────────

/// Abstracts waiting so polling loops can be tested without real delays.
#[allow(async_fn_in_trait)]
pub trait Sleeper {
    async fn sleep(&self, duration: Duration);
}

// ── Progress Reporting Port ───────────────────────────────────────────────────

/// Abstracts progress reporting so services can emit events without
/// depending on the Presentation layer. Sync trait — no async needed.
pub trait ProgressReporter {
    /// Emit an in-progress step message.
    fn step(&self, message: &str);
    /// Emit a success message.
    fn success(&self, message: &str);
    /// Emit a warning message.
    fn warn(&self, message: &str);
    /// Echo what a remote command printed on the VM called `source`.
    fn remote_output(&self, source: &str, stdout: &str, stderr: &str);
}

// ── Configuration Port ────────────────────────────────────────────────────────

/// Abstracts where the configuration comes from.
pub trait ConfigStore {
    /// Load the configuration, with defaults for anything unset.
    ///
    /// # Errors
    ///
    /// Returns an error if the config source exists but cannot be read or parsed.
    fn load(&self) -> Result<VcdriverConfig>;
    /// Location of the backing config file.
    ///
    /// # Errors
    ///
    /// Returns an error if the location cannot be determined.
    fn path(&self) -> Result<PathBuf>;
}
