//! Scoped batch lifecycle: create all, run the body, destroy all.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::cell::RefCell;

use thiserror::Error;
use vcdriver::application::services::run_batch::{expand_specs, run_on_fresh_vms};
use vcdriver::application::services::vm::{VirtualMachine, with_virtual_machines};
use vcdriver::domain::VmError;

use crate::mocks::{
    Event, FakeConnection, FakeSessions, Recorder, RecordingReporter, RecordingSleeper,
    ScriptedShell, machine_spec,
};

/// A caller-defined error the batch must hand back untouched.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("ValueError: {0}")]
struct ValueError(String);

fn three_vms() -> Vec<VirtualMachine<FakeConnection>> {
    ["a", "b", "c"]
        .into_iter()
        .map(|name| VirtualMachine::new(machine_spec(3).with_name(name)))
        .collect()
}

fn clone_of(name: &str) -> impl Fn(&Event) -> bool + '_ {
    move |e| matches!(e, Event::Clone { name: n, .. } if n == name)
}

#[tokio::test]
async fn successful_body_sees_live_group_and_everything_is_destroyed_in_order() {
    let rec = Recorder::default();
    let sessions = FakeSessions::new(&rec);
    let mut vms = three_vms();
    let seen_ips = RefCell::new(Vec::new());

    let value = with_virtual_machines(
        &mut vms,
        &sessions,
        &RecordingSleeper::new(&rec),
        &RecordingReporter::default(),
        async |group| {
            rec.push(Event::Body);
            seen_ips
                .borrow_mut()
                .extend(group.iter().map(|vm| vm.ip().unwrap().to_string()));
            Ok("done")
        },
    )
    .await
    .expect("batch");

    assert_eq!(value, "done");
    assert_eq!(
        *seen_ips.borrow(),
        vec!["10.0.0.1", "10.0.0.2", "10.0.0.3"]
    );
    let lifecycle = rec.lifecycle();
    let body_at = lifecycle.iter().position(|e| *e == Event::Body).unwrap();
    assert_eq!(
        lifecycle[..body_at]
            .iter()
            .filter(|e| matches!(e, Event::Clone { .. }))
            .count(),
        3,
        "all VMs are created before the body runs"
    );
    assert_eq!(
        lifecycle[body_at + 1..].to_vec(),
        vec![
            Event::PowerOff("vm-1".to_string()),
            Event::Destroy("vm-1".to_string()),
            Event::PowerOff("vm-2".to_string()),
            Event::Destroy("vm-2".to_string()),
            Event::PowerOff("vm-3".to_string()),
            Event::Destroy("vm-3".to_string()),
        ]
    );
    assert_eq!(rec.cloned(), vec!["a", "b", "c"]);
    assert!(vms.iter().all(|vm| !vm.exists()));
}

#[tokio::test]
async fn failing_body_error_is_returned_unchanged_after_teardown() {
    let rec = Recorder::default();
    let sessions = FakeSessions::new(&rec);
    let reporter = RecordingReporter::default();
    let mut vms = three_vms();

    let err = with_virtual_machines(
        &mut vms,
        &sessions,
        &RecordingSleeper::new(&rec),
        &reporter,
        async |_| -> anyhow::Result<()> { Err(ValueError("x".to_string()).into()) },
    )
    .await
    .expect_err("body fails");

    assert_eq!(
        err.downcast_ref::<ValueError>(),
        Some(&ValueError("x".to_string()))
    );
    assert_eq!(err.to_string(), "ValueError: x");
    assert_eq!(
        rec.count(|e| matches!(e, Event::Destroy(_))),
        3,
        "every VM is destroyed"
    );
    let destroyed: Vec<_> = rec
        .events()
        .into_iter()
        .filter_map(|e| match e {
            Event::Destroy(vm) => Some(vm),
            _ => None,
        })
        .collect();
    assert_eq!(destroyed, vec!["vm-1", "vm-2", "vm-3"]);
    assert_eq!(
        reporter.warnings(),
        vec!["An error has been raised, cleaning up virtual machines:".to_string()]
    );
}

#[tokio::test]
async fn teardown_failure_during_error_cleanup_is_only_a_warning() {
    let rec = Recorder::default();
    let sessions = FakeSessions::new(&rec);
    sessions.fail_tasks_starting_with("Power off virtual machine 'b'");
    let reporter = RecordingReporter::default();
    let mut vms = three_vms();

    let err = with_virtual_machines(
        &mut vms,
        &sessions,
        &RecordingSleeper::new(&rec),
        &reporter,
        async |_| -> anyhow::Result<()> { Err(ValueError("x".to_string()).into()) },
    )
    .await
    .expect_err("body fails");

    assert!(err.downcast_ref::<ValueError>().is_some());
    assert_eq!(reporter.warnings().len(), 2);
    assert!(reporter.warnings()[1].contains("'b'"));
    assert_eq!(
        rec.count(|e| matches!(e, Event::Destroy(_))),
        2,
        "'a' and 'c' are still deleted"
    );
}

#[tokio::test]
async fn creation_failure_skips_body_and_cleans_up() {
    let rec = Recorder::default();
    let sessions = FakeSessions::new(&rec);
    let mut vms = three_vms();
    vms[2] = VirtualMachine::new({
        let mut spec = machine_spec(3).with_name("c");
        spec.template = "missing-template".to_string();
        spec
    });

    let err = with_virtual_machines(
        &mut vms,
        &sessions,
        &RecordingSleeper::new(&rec),
        &RecordingReporter::default(),
        async |_| {
            rec.push(Event::Body);
            Ok(())
        },
    )
    .await
    .expect_err("creation fails");

    assert!(matches!(
        err.downcast_ref::<VmError>(),
        Some(VmError::ObjectNotFound { .. })
    ));
    assert_eq!(rec.count(|e| *e == Event::Body), 0);
    assert_eq!(rec.count(clone_of("c")), 0);
    assert_eq!(rec.count(|e| matches!(e, Event::Destroy(_))), 2);
}

#[tokio::test]
async fn dhcp_timeout_during_creation_still_destroys_the_clone() {
    let rec = Recorder::default();
    let sessions = FakeSessions::with_ip_after(&rec, None);
    let mut vms = three_vms();

    let err = with_virtual_machines(
        &mut vms,
        &sessions,
        &RecordingSleeper::new(&rec),
        &RecordingReporter::default(),
        async |_| Ok(()),
    )
    .await
    .expect_err("dhcp timeout");

    assert!(vcdriver::domain::error::is_fatal(&err));
    assert_eq!(rec.cloned(), vec!["a"]);
    assert_eq!(
        rec.lifecycle(),
        vec![
            Event::Clone {
                name: "a".to_string(),
                template: "ubuntu-template-id".to_string(),
                folder: "dc-id/vm".to_string(),
                datastore: "ds-id".to_string(),
                resource_pool: "pool-id".to_string(),
                power_on: true,
                as_template: false,
            },
            Event::PowerOff("vm-1".to_string()),
            Event::Destroy("vm-1".to_string()),
        ]
    );
}

#[tokio::test]
async fn run_on_fresh_vms_reports_each_exit_code() {
    let rec = Recorder::default();
    let sessions = FakeSessions::new(&rec);
    let shell = ScriptedShell::exiting(0);
    let reporter = RecordingReporter::default();

    let results = run_on_fresh_vms(
        expand_specs(&machine_spec(3).with_name("ci"), 2),
        "make test",
        true,
        &sessions,
        &shell,
        &RecordingSleeper::new(&rec),
        &reporter,
    )
    .await
    .expect("run");

    let summary: Vec<_> = results
        .iter()
        .map(|r| (r.name.as_str(), r.ip.as_str(), r.exit_code))
        .collect();
    assert_eq!(
        summary,
        vec![("ci-1", "10.0.0.1", 0), ("ci-2", "10.0.0.2", 0)]
    );
    assert!(shell.calls().iter().all(|c| c.elevate && c.command == "make test"));
    assert!(results.iter().all(|r| r.stdout == "ran make test\n"));
    assert_eq!(
        reporter.remote(),
        vec![
            ("ci-1".to_string(), "ran make test\n".to_string()),
            ("ci-2".to_string(), "ran make test\n".to_string()),
        ]
    );
    assert_eq!(rec.count(|e| matches!(e, Event::Destroy(_))), 2);
}
