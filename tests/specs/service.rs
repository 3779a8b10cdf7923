//! Seed scenarios (a) and (b): a simple service's full lifecycle, and the
//! environment a started process receives.

use crate::prelude::*;
use ember_core::{Effect, ExitStatus, Goal, JobState, ProcessKind};

#[test]
fn simple_service_lifecycle() {
    let mut rig = Rig::new(&[("foo.conf", "exec sleep 999\n")]);

    // Start: waiting → starting → (pre-start) → spawned → running
    rig.start("foo", &[]);
    let inst = rig.instance("foo");
    assert_eq!(inst.goal, Goal::Start);
    assert_eq!(inst.state, JobState::Running);
    let pid = inst.pid_of(ProcessKind::Main).unwrap();

    // Stop: SIGTERM to the process group, then killed → post-stop → waiting
    let effects = rig.stop("foo");
    assert!(effects.iter().any(|e| matches!(
        e,
        Effect::Signal { pid: p, signal: 15, group: true } if *p == pid
    )));
    assert_eq!(rig.instance("foo").state, JobState::Killed);

    rig.exit(pid, ExitStatus::Signal(15));
    // Settled in waiting with nothing pending: the instance is destroyed
    assert!(rig.engine.instances().of_class("foo").is_empty());
}

#[test]
fn goal_state_pairs_stay_inside_the_transition_table() {
    let mut rig = Rig::new(&[(
        "foo.conf",
        "pre-start exec /bin/true\nexec sleep 999\npost-stop exec /bin/true\n",
    )]);

    // Sample the pair at every step of a full cycle
    let mut check = |rig: &Rig| {
        if let Some(inst) = rig.engine.instances().of_class("foo").first() {
            assert!(
                ember_core::job::goal_permits(inst.goal, inst.state),
                "illegal pair: {} {}/{}",
                inst.id,
                inst.goal,
                inst.state
            );
        }
    };

    rig.start("foo", &[]);
    check(&rig);
    let pid = rig.main_pid("foo");
    rig.stop("foo");
    check(&rig);
    rig.exit(pid, ExitStatus::Signal(15));
    check(&rig);
}

#[test]
fn running_instance_has_exactly_one_main_pid() {
    let mut rig = Rig::new(&[("foo.conf", "exec sleep 999\n")]);
    rig.start("foo", &[]);

    let inst = rig.instance("foo");
    let mains = inst
        .pids
        .iter()
        .filter(|(kind, _)| *kind == ProcessKind::Main)
        .count();
    assert_eq!(mains, 1);
    assert_eq!(inst.pids.len(), 1);
}

#[test]
fn started_process_sees_trigger_and_identity_environment() {
    let mut rig = Rig::new(&[("foo.conf", "task\nexec env\nconsole log\n")]);
    rig.start("foo", &[("FOO", "foo"), ("BAR", "bar")]);

    let (request, _) = rig
        .spawned
        .iter()
        .find(|(r, _)| r.kind == ProcessKind::Main)
        .unwrap();
    let get = |key: &str| {
        request
            .env
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    };
    assert_eq!(get("FOO"), Some("foo"));
    assert_eq!(get("BAR"), Some("bar"));
    assert_eq!(get("EMBER_JOB"), Some("foo"));
    assert_eq!(get("EMBER_INSTANCE"), Some(""));
    assert_eq!(get("EMBER_SESSION"), Some("sess-spec"));

    // console log routes into the per-job log file
    assert!(request
        .log_path
        .as_ref()
        .unwrap()
        .ends_with("logs/foo.log"));
}

#[test]
fn auxiliary_processes_run_in_order() {
    let mut rig = Rig::new(&[(
        "svc.conf",
        "pre-start exec /bin/prep\nexec maind\npost-start exec /bin/announce\n",
    )]);
    rig.start("svc", &[]);

    // pre-start ran first; its exit gates the main fork
    assert_eq!(spawned_commands(&rig), vec!["/bin/prep"]);
    let pre = rig.spawned[0].1;
    rig.exit(pre, ExitStatus::Code(0));
    assert_eq!(
        spawned_commands(&rig),
        vec!["/bin/prep", "maind", "/bin/announce"]
    );

    let post = rig.spawned[2].1;
    assert_eq!(rig.instance("svc").state, JobState::PostStart);
    rig.exit(post, ExitStatus::Code(0));
    assert_eq!(rig.instance("svc").state, JobState::Running);
}
