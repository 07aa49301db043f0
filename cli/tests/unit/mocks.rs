//! Shared fakes for the platform, remote shell, clock and reporter ports.
//!
//! Every fake writes to one shared [`Recorder`] so tests can assert on the
//! global order of platform calls across a whole batch.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use vcdriver::application::ports::{
    CloneRequest, ObjectResolver, ProgressReporter, RemoteOutcome, RemoteShell, RemoteTarget,
    Session, SessionProvider, Sleeper, TaskWaiter, VmOperations,
};
use vcdriver::domain::config::VcdriverConfig;
use vcdriver::domain::session::generate_session_id;
use vcdriver::domain::{MachineSpec, ObjectKind, ObjectRef, VmError, VmRef};

// ── Event log ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Connect(String),
    Resolve(ObjectKind, String),
    DefaultFolder(String),
    Clone {
        name: String,
        template: String,
        folder: String,
        datastore: String,
        resource_pool: String,
        power_on: bool,
        as_template: bool,
    },
    PowerOff(String),
    Destroy(String),
    GuestIp(String),
    Await(String),
    Sleep,
    Body,
}

#[derive(Clone, Default)]
pub struct Recorder(Arc<Mutex<Vec<Event>>>);

impl Recorder {
    pub fn push(&self, event: Event) {
        self.0.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.0.lock().unwrap().iter().filter(|e| pred(e)).count()
    }

    /// Names of cloned VMs, in clone order.
    pub fn cloned(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Clone { name, .. } => Some(name),
                _ => None,
            })
            .collect()
    }

    /// Events relevant to create/destroy ordering: clones, power-offs,
    /// destroys and the body marker.
    pub fn lifecycle(&self) -> Vec<Event> {
        self.events()
            .into_iter()
            .filter(|e| {
                matches!(
                    e,
                    Event::Clone { .. } | Event::PowerOff(_) | Event::Destroy(_) | Event::Body
                )
            })
            .collect()
    }
}

// ── Platform ──────────────────────────────────────────────────────────────────

struct PlatformState {
    next_vm: AtomicU32,
    /// Guest IP polls that return nothing before the address shows up.
    /// `None` means the guest never gets an address.
    ip_after: Option<u32>,
    polls: Mutex<HashMap<String, u32>>,
    addresses: Mutex<HashMap<String, String>>,
    fail_prefix: Mutex<Option<String>>,
}

/// In-memory platform. Names containing `missing` never resolve.
pub struct FakeSessions {
    pub recorder: Recorder,
    state: Arc<PlatformState>,
}

impl FakeSessions {
    /// Guests report an address on the first poll.
    pub fn new(recorder: &Recorder) -> Self {
        Self::with_ip_after(recorder, Some(0))
    }

    pub fn with_ip_after(recorder: &Recorder, ip_after: Option<u32>) -> Self {
        Self {
            recorder: recorder.clone(),
            state: Arc::new(PlatformState {
                next_vm: AtomicU32::new(1),
                ip_after,
                polls: Mutex::new(HashMap::new()),
                addresses: Mutex::new(HashMap::new()),
                fail_prefix: Mutex::new(None),
            }),
        }
    }

    /// Make every awaited task whose description starts with `prefix` fail.
    pub fn fail_tasks_starting_with(&self, prefix: &str) {
        *self.state.fail_prefix.lock().unwrap() = Some(prefix.to_string());
    }
}

impl SessionProvider for FakeSessions {
    type Connection = FakeConnection;

    async fn connect(&self) -> Result<Session<FakeConnection>> {
        let id = generate_session_id();
        self.recorder.push(Event::Connect(id.clone()));
        Ok(Session {
            id,
            connection: FakeConnection {
                recorder: self.recorder.clone(),
                state: Arc::clone(&self.state),
            },
        })
    }
}

pub struct FakeConnection {
    recorder: Recorder,
    state: Arc<PlatformState>,
}

pub struct FakeTask(Option<VmRef>);

impl ObjectResolver for FakeConnection {
    async fn resolve(&self, kind: ObjectKind, name: &str) -> Result<ObjectRef> {
        self.recorder.push(Event::Resolve(kind, name.to_string()));
        if name.contains("missing") {
            return Err(VmError::ObjectNotFound {
                kind,
                name: name.to_string(),
            }
            .into());
        }
        Ok(ObjectRef::new(kind, format!("{name}-id")))
    }

    async fn default_vm_folder(&self, datacenter: &ObjectRef) -> Result<ObjectRef> {
        self.recorder.push(Event::DefaultFolder(datacenter.id.clone()));
        Ok(ObjectRef::new(
            ObjectKind::Folder,
            format!("{}/vm", datacenter.id),
        ))
    }
}

impl VmOperations for FakeConnection {
    type Task = FakeTask;

    async fn submit_clone(&self, request: &CloneRequest<'_>) -> Result<FakeTask> {
        self.recorder.push(Event::Clone {
            name: request.name.to_string(),
            template: request.template.id.clone(),
            folder: request.folder.id.clone(),
            datastore: request.datastore.id.clone(),
            resource_pool: request.resource_pool.id.clone(),
            power_on: request.power_on,
            as_template: request.as_template,
        });
        let n = self.state.next_vm.fetch_add(1, Ordering::SeqCst);
        let vm = format!("vm-{n}");
        self.state
            .addresses
            .lock()
            .unwrap()
            .insert(vm.clone(), format!("10.0.0.{n}"));
        Ok(FakeTask(Some(VmRef(vm))))
    }

    async fn submit_power_off(&self, vm: &VmRef) -> Result<FakeTask> {
        self.recorder.push(Event::PowerOff(vm.0.clone()));
        Ok(FakeTask(None))
    }

    async fn submit_destroy(&self, vm: &VmRef) -> Result<FakeTask> {
        self.recorder.push(Event::Destroy(vm.0.clone()));
        Ok(FakeTask(None))
    }

    async fn guest_ip_address(&self, vm: &VmRef) -> Result<Option<String>> {
        self.recorder.push(Event::GuestIp(vm.0.clone()));
        let mut polls = self.state.polls.lock().unwrap();
        let seen = polls.entry(vm.0.clone()).or_default();
        let ready = self.state.ip_after.is_some_and(|after| *seen >= after);
        *seen += 1;
        if !ready {
            return Ok(None);
        }
        Ok(self.state.addresses.lock().unwrap().get(&vm.0).cloned())
    }
}

impl TaskWaiter for FakeConnection {
    async fn await_task(
        &self,
        task: FakeTask,
        description: &str,
        timeout: Duration,
    ) -> Result<Option<VmRef>> {
        self.recorder.push(Event::Await(description.to_string()));
        let fail = self
            .state
            .fail_prefix
            .lock()
            .unwrap()
            .as_deref()
            .is_some_and(|prefix| description.starts_with(prefix));
        if fail {
            return Err(VmError::TaskTimeout {
                description: description.to_string(),
                timeout_secs: timeout.as_secs(),
            }
            .into());
        }
        Ok(task.0)
    }
}

// ── Clock ─────────────────────────────────────────────────────────────────────

/// Records sleeps instead of waiting.
pub struct RecordingSleeper {
    recorder: Recorder,
    total: Mutex<Duration>,
}

impl RecordingSleeper {
    pub fn new(recorder: &Recorder) -> Self {
        Self {
            recorder: recorder.clone(),
            total: Mutex::new(Duration::ZERO),
        }
    }

    pub fn total(&self) -> Duration {
        *self.total.lock().unwrap()
    }
}

impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.recorder.push(Event::Sleep);
        *self.total.lock().unwrap() += duration;
    }
}

// ── Remote shell ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellCall {
    pub host: String,
    pub username: String,
    pub password: Option<String>,
    pub command: String,
    pub elevate: bool,
}

/// Remote shell that answers every command with a fixed exit code and
/// prints `ran <command>`.
pub struct ScriptedShell {
    exit_code: i32,
    pub calls: Mutex<Vec<ShellCall>>,
}

impl ScriptedShell {
    pub fn exiting(exit_code: i32) -> Self {
        Self {
            exit_code,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<ShellCall> {
        self.calls.lock().unwrap().clone()
    }
}

impl RemoteShell for ScriptedShell {
    async fn exec_remote(
        &self,
        target: &RemoteTarget<'_>,
        command: &str,
        elevate: bool,
    ) -> Result<RemoteOutcome> {
        self.calls.lock().unwrap().push(ShellCall {
            host: target.host.to_string(),
            username: target.username.to_string(),
            password: target.password.map(str::to_string),
            command: command.to_string(),
            elevate,
        });
        Ok(RemoteOutcome {
            exit_code: self.exit_code,
            failed: self.exit_code != 0,
            stdout: format!("ran {command}\n"),
            stderr: String::new(),
        })
    }
}

// ── Reporter ──────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingReporter {
    pub warnings: Mutex<Vec<String>>,
    pub remote: Mutex<Vec<(String, String)>>,
}

impl RecordingReporter {
    pub fn warnings(&self) -> Vec<String> {
        self.warnings.lock().unwrap().clone()
    }

    /// Echoed `(source, stdout)` pairs.
    pub fn remote(&self) -> Vec<(String, String)> {
        self.remote.lock().unwrap().clone()
    }
}

impl ProgressReporter for RecordingReporter {
    fn step(&self, _message: &str) {}

    fn success(&self, _message: &str) {}

    fn warn(&self, message: &str) {
        self.warnings.lock().unwrap().push(message.to_string());
    }

    fn remote_output(&self, source: &str, stdout: &str, _stderr: &str) {
        self.remote
            .lock()
            .unwrap()
            .push((source.to_string(), stdout.to_string()));
    }
}

// ── Specs ─────────────────────────────────────────────────────────────────────

/// A spec with a complete placement, `ci`/`secret` credentials and the given
/// DHCP window.
pub fn machine_spec(dhcp_timeout_secs: u64) -> MachineSpec {
    let mut config = VcdriverConfig::default();
    config.placement.data_center = "dc".to_string();
    config.placement.data_store = "ds".to_string();
    config.placement.resource_pool = "pool".to_string();
    config.ssh.username = Some("ci".to_string());
    config.ssh.password = Some("secret".to_string());
    MachineSpec::new("ubuntu-template", &config).with_timeouts(dhcp_timeout_secs, 60)
}
