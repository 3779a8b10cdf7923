//! Seed scenario (d): blocking event emission, plus dependency cascades.

use crate::prelude::*;
use ember_core::{Effect, EmissionOutcome, ExitStatus, JobState};

fn completed(effects: &[Effect]) -> Option<EmissionOutcome> {
    effects.iter().find_map(|e| match e {
        Effect::CompleteEmission { outcome, .. } => Some(*outcome),
        _ => None,
    })
}

#[test]
fn emit_wait_returns_when_service_reaches_running() {
    let mut rig = Rig::new(&[("bar.conf", "start on foo\nexec sleep 1\n")]);

    let effects = rig.emit("foo", &[], true);
    // The rig confirmed the spawn inside the same drive, so the service hit
    // running and the emission completed
    assert_eq!(completed(&effects), Some(EmissionOutcome::Finished));
    assert_eq!(rig.instance("bar").state, JobState::Running);
}

#[test]
fn emit_wait_on_task_returns_at_waiting() {
    let mut rig = Rig::new(&[("bar.conf", "task\nstart on foo\nexec sleep 1\n")]);

    let effects = rig.emit("foo", &[], true);
    assert_eq!(completed(&effects), None, "task still running");

    let pid = rig.main_pid("bar");
    let effects = rig.exit(pid, ExitStatus::Code(0));
    assert_eq!(completed(&effects), Some(EmissionOutcome::Finished));
}

#[test]
fn emit_wait_fails_when_a_triggered_task_fails() {
    let mut rig = Rig::new(&[("bar.conf", "task\nstart on foo\nexec sleep 1\n")]);

    rig.emit("foo", &[], true);
    let pid = rig.main_pid("bar");
    let effects = rig.exit(pid, ExitStatus::Code(2));
    assert_eq!(completed(&effects), Some(EmissionOutcome::Failed));
}

#[test]
fn emission_blocks_on_every_triggered_instance() {
    let mut rig = Rig::new(&[
        ("one.conf", "task\nstart on go\nexec a\n"),
        ("two.conf", "task\nstart on go\nexec b\n"),
    ]);

    rig.emit("go", &[], true);
    let one = rig.main_pid("one");
    let two = rig.main_pid("two");

    let effects = rig.exit(one, ExitStatus::Code(0));
    assert_eq!(completed(&effects), None, "second blocker outstanding");

    let effects = rig.exit(two, ExitStatus::Code(0));
    assert_eq!(completed(&effects), Some(EmissionOutcome::Finished));
}

#[test]
fn non_waiting_emission_never_blocks() {
    let mut rig = Rig::new(&[("bar.conf", "task\nstart on foo\nexec sleep 1\n")]);
    let effects = rig.emit("foo", &[], false);
    assert_eq!(completed(&effects), None);
    // The job still started
    assert_eq!(rig.instance("bar").state, JobState::Running);
}

#[test]
fn trigger_environment_concatenates_left_to_right() {
    let mut rig = Rig::new(&[(
        "svc.conf",
        "start on (alpha and beta)\nexec serve\n",
    )]);

    // beta first, alpha second: AST order still puts alpha's env first
    rig.emit("beta", &[("SHARED", "beta"), ("B", "2")], false);
    rig.emit("alpha", &[("SHARED", "alpha"), ("A", "1")], false);

    let env = &rig.instance("svc").env;
    assert_eq!(
        env,
        &vec![
            ("SHARED".to_string(), "alpha".to_string()),
            ("A".to_string(), "1".to_string()),
            ("B".to_string(), "2".to_string()),
        ]
    );
}

#[test]
fn started_event_chains_dependent_services() {
    let mut rig = Rig::new(&[
        ("db.conf", "start on startup\nexec dbd\n"),
        ("app.conf", "start on started db\nexec appd\n"),
        ("edge.conf", "start on started app\nexec edged\n"),
    ]);

    rig.emit("startup", &[], false);
    assert_eq!(rig.instance("db").state, JobState::Running);
    assert_eq!(rig.instance("app").state, JobState::Running);
    assert_eq!(rig.instance("edge").state, JobState::Running);
}

#[test]
fn stopped_event_reports_result_to_listeners() {
    let mut rig = Rig::new(&[
        ("svc.conf", "exec crashd\n"),
        // A watcher task keyed on the failure result
        (
            "cleanup.conf",
            "task\nstart on stopped svc RESULT=failed\nexec tidy\n",
        ),
    ]);

    rig.start("svc", &[]);
    let pid = rig.main_pid("svc");
    rig.exit(pid, ExitStatus::Code(1));

    // svc settled failed; the cleanup task was triggered by the result match
    assert!(rig.engine.instances().of_class("svc").is_empty());
    assert_eq!(rig.instance("cleanup").state, JobState::Running);
}
