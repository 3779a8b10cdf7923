//! Seed scenario (c): respawn limits.

use crate::prelude::*;
use ember_core::{ExitStatus, JobResult, JobState};
use std::time::Duration;

#[test]
fn three_rapid_exits_hit_the_limit() {
    let mut rig = Rig::new(&[(
        "flaky.conf",
        "exec /bin/false\nrespawn\nrespawn limit 2 5\n",
    )]);
    rig.start("flaky", &[]);

    // Two deaths inside the window are respawned
    for _ in 0..2 {
        let pid = rig.main_pid("flaky");
        rig.exit(pid, ExitStatus::Code(1));
        let inst = rig.instance("flaky");
        assert_eq!(inst.state, JobState::Running, "respawned");
    }

    // The third exhausts `respawn limit 2 5`: final state is waiting
    // (observed here as destruction of the settled instance)
    let pid = rig.main_pid("flaky");
    rig.exit(pid, ExitStatus::Code(1));
    assert!(rig.engine.instances().of_class("flaky").is_empty());

    // Three mains were forked in total; no fourth attempt
    assert_eq!(rig.spawned.len(), 3);
}

#[test]
fn respawn_limit_result_is_observable_via_events() {
    let mut rig = Rig::new(&[
        ("flaky.conf", "exec /bin/false\nrespawn\nrespawn limit 1 5\n"),
        (
            "watcher.conf",
            "task\nstart on stopped flaky RESULT=respawn-limit\nexec note\n",
        ),
    ]);
    rig.start("flaky", &[]);

    let pid = rig.main_pid("flaky");
    rig.exit(pid, ExitStatus::Code(1));
    let pid = rig.main_pid("flaky");
    rig.exit(pid, ExitStatus::Code(1));

    assert_eq!(rig.instance("watcher").state, JobState::Running);
}

#[test]
fn slow_failures_respawn_indefinitely() {
    let mut rig = Rig::new(&[(
        "svc.conf",
        "exec flapd\nrespawn\nrespawn limit 2 5\n",
    )]);
    rig.start("svc", &[]);

    // Each death arrives after the previous window lapsed
    for _ in 0..5 {
        let pid = rig.main_pid("svc");
        rig.clock.advance(Duration::from_secs(10));
        rig.exit(pid, ExitStatus::Code(1));
        assert_eq!(rig.instance("svc").state, JobState::Running);
        assert_eq!(rig.instance("svc").result, JobResult::Ok, "cycle reset");
    }
}

#[test]
fn clean_exit_is_not_respawned() {
    let mut rig = Rig::new(&[("svc.conf", "exec oneshot\nrespawn\n")]);
    rig.start("svc", &[]);

    let pid = rig.main_pid("svc");
    rig.exit(pid, ExitStatus::Code(0));
    assert!(rig.engine.instances().of_class("svc").is_empty());
    assert_eq!(rig.spawned.len(), 1, "no second fork");
}

#[test]
fn normal_exit_signals_are_not_respawned() {
    let mut rig = Rig::new(&[(
        "svc.conf",
        "exec workerd\nrespawn\nnormal exit TERM\n",
    )]);
    rig.start("svc", &[]);

    let pid = rig.main_pid("svc");
    rig.exit(pid, ExitStatus::Signal(15));
    assert!(rig.engine.instances().of_class("svc").is_empty());
    assert_eq!(rig.spawned.len(), 1);
}
