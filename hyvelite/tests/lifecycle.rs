//! Integration tests for machine lifecycle against a fake hypervisor process.

#![cfg(unix)]

use std::net::IpAddr;
use std::time::Duration;

use hyvelite::{HyveliteError, Machine, MachinePhase};
use hyvelite_shared::errors::{AddressError, ProcessError};
use hyvelite_test_utils::{FakeHypervisor, GUEST_MAC, TestContext, write_lease_later};

fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}

/// The fake hypervisor echoes its arguments once the shell gets to run.
async fn read_log_when_written(machine: &Machine) -> String {
    let path = machine.layout().hypervisor_log_path();
    for _ in 0..250 {
        let log = std::fs::read_to_string(&path).unwrap_or_default();
        if !log.is_empty() {
            return log;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("hypervisor never wrote {}", path.display());
}

// ============================================================================
// CREATE
// ============================================================================

#[tokio::test]
async fn test_create_reaches_running() {
    let ctx = TestContext::new();
    ctx.write_lease("boot2docker", "192.168.64.2", GUEST_MAC);
    let mut machine = ctx.machine("dev", FakeHypervisor::Sleeping);

    machine.create().await.unwrap();

    assert_eq!(machine.state(), MachinePhase::Running);
    assert_eq!(machine.ip().unwrap(), ip("192.168.64.2"));
    assert_eq!(machine.url(), "tcp://192.168.64.2:2376");

    let layout = machine.layout().clone();
    for path in [
        layout.ssh_key_path(),
        layout.public_key_path(),
        layout.boot_image_path(),
        layout.kernel_path(),
        layout.initrd_path(),
        layout.disk_image_path(),
        layout.userdata_path(),
        layout.state_path(),
    ] {
        assert!(path.exists(), "missing {}", path.display());
    }
    assert_eq!(
        std::fs::metadata(layout.disk_image_path()).unwrap().len(),
        8 * 1_048_576
    );

    machine.kill().await.unwrap();
}

#[tokio::test]
async fn test_create_waits_for_lease() {
    let ctx = TestContext::new();
    write_lease_later(
        ctx.lease_file(),
        "192.168.64.9",
        GUEST_MAC,
        Duration::from_millis(200),
    );
    let mut machine = ctx.machine("dev", FakeHypervisor::Sleeping);

    machine.create().await.unwrap();
    assert_eq!(machine.ip().unwrap(), ip("192.168.64.9"));

    machine.kill().await.unwrap();
}

#[tokio::test]
async fn test_create_with_known_mac_ignores_other_leases() {
    let ctx = TestContext::new();
    ctx.write_lease("boot2docker", "192.168.64.2", GUEST_MAC);
    ctx.write_lease("other", "192.168.64.3", "a:b:c:d:e:f");

    let mut config = ctx.config("dev");
    config.mac_address = Some("e2:04:5c:1a:2b:3c".into());
    let mut machine = Machine::with_collaborators(
        config,
        ctx.options(),
        ctx.builder(),
        ctx.controller(FakeHypervisor::Sleeping),
    );

    machine.create().await.unwrap();
    assert_eq!(machine.ip().unwrap(), ip("192.168.64.2"));

    machine.kill().await.unwrap();
}

#[tokio::test]
async fn test_create_times_out_without_lease() {
    let ctx = TestContext::new();
    let mut machine = ctx.machine("dev", FakeHypervisor::Sleeping);

    let err = machine.create().await.unwrap_err();
    assert!(matches!(
        err,
        HyveliteError::Address(AddressError::Timeout { attempts: 20, .. })
    ));
    assert_eq!(machine.state(), MachinePhase::Absent);
    assert!(!machine.layout().state_path().exists());
}

#[tokio::test]
async fn test_create_reports_hypervisor_crash() {
    let ctx = TestContext::new();
    let mut machine = ctx.machine("dev", FakeHypervisor::Crashing);

    let err = machine.create().await.unwrap_err();
    assert!(matches!(
        err,
        HyveliteError::Process(ProcessError::Exited { .. })
    ));
    assert_eq!(machine.state(), MachinePhase::Absent);

    let log = std::fs::read_to_string(machine.layout().hypervisor_log_path()).unwrap();
    assert!(log.contains("vm_create failed"));
}

#[tokio::test]
async fn test_hypervisor_receives_launch_arguments() {
    let ctx = TestContext::new();
    ctx.write_lease("boot2docker", "192.168.64.2", GUEST_MAC);
    let mut machine = ctx.machine("dev", FakeHypervisor::Sleeping);
    machine.create().await.unwrap();

    let log = read_log_when_written(&machine).await;
    let uuid = machine.machine_state().uuid.clone();
    assert!(log.starts_with("xhyve -A -s 0:0,hostbridge -s 31,lpc -l com1 -s 2:0,virtio-net -m 1024M"));
    assert!(log.contains(&format!("-U {}", uuid)));
    assert!(log.contains("dev.img"));

    machine.kill().await.unwrap();
}

// ============================================================================
// STOP / RESTART / KILL / REMOVE
// ============================================================================

#[tokio::test]
async fn test_stop_then_stop_again() {
    let ctx = TestContext::new();
    ctx.write_lease("boot2docker", "192.168.64.2", GUEST_MAC);
    let mut machine = ctx.machine("dev", FakeHypervisor::Sleeping);
    machine.create().await.unwrap();

    machine.stop().await.unwrap();
    assert_eq!(machine.state(), MachinePhase::Stopped);
    assert_eq!(machine.url(), "");

    machine.stop().await.unwrap();
    assert_eq!(machine.state(), MachinePhase::Stopped);
}

#[tokio::test]
async fn test_stop_times_out_on_stubborn_hypervisor() {
    let ctx = TestContext::new();
    ctx.write_lease("boot2docker", "192.168.64.2", GUEST_MAC);
    let mut machine = ctx.machine("dev", FakeHypervisor::Stubborn);
    machine.create().await.unwrap();
    // SIGTERM is only ignored once the trap is installed
    read_log_when_written(&machine).await;

    let err = machine.stop().await.unwrap_err();
    assert!(matches!(err, HyveliteError::ShutdownTimeout(_)));
    assert_eq!(machine.state(), MachinePhase::Running);

    machine.kill().await.unwrap();
    assert_eq!(machine.state(), MachinePhase::Stopped);
}

#[tokio::test]
async fn test_restart_keeps_identity() {
    let ctx = TestContext::new();
    ctx.write_lease("boot2docker", "192.168.64.2", GUEST_MAC);
    let mut machine = ctx.machine("dev", FakeHypervisor::Sleeping);
    machine.create().await.unwrap();
    let before = machine.machine_state().clone();

    machine.restart().await.unwrap();
    let after = machine.machine_state().clone();

    assert_eq!(after.phase, MachinePhase::Running);
    assert_eq!(after.uuid, before.uuid);
    assert_ne!(after.pid, before.pid);

    machine.kill().await.unwrap();
}

#[tokio::test]
async fn test_remove_stops_and_deletes_artifacts() {
    let ctx = TestContext::new();
    ctx.write_lease("boot2docker", "192.168.64.2", GUEST_MAC);
    let mut machine = ctx.machine("dev", FakeHypervisor::Sleeping);
    machine.create().await.unwrap();
    let pid = machine.machine_state().pid.unwrap();

    machine.remove().await.unwrap();

    assert_eq!(machine.state(), MachinePhase::Removed);
    assert!(!machine.layout().exists());
    assert!(!hyvelite::util::is_process_alive(pid));
}

// ============================================================================
// RELOAD
// ============================================================================

#[tokio::test]
async fn test_load_reattaches_to_running_hypervisor() {
    let ctx = TestContext::new();
    ctx.write_lease("boot2docker", "192.168.64.2", GUEST_MAC);
    let controller = ctx.controller(FakeHypervisor::Sleeping);
    let mut machine = Machine::with_collaborators(
        ctx.config("dev"),
        ctx.options(),
        ctx.builder(),
        controller.clone(),
    );
    machine.create().await.unwrap();

    let mut reloaded =
        Machine::load(ctx.config("dev"), ctx.options(), ctx.builder(), controller).unwrap();
    assert_eq!(reloaded.state(), MachinePhase::Running);
    assert_eq!(reloaded.ip().unwrap(), ip("192.168.64.2"));

    // The original controller still owns the child and reaps it
    machine.kill().await.unwrap();

    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while reloaded.state() != MachinePhase::Stopped && std::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(reloaded.state(), MachinePhase::Stopped);
}
