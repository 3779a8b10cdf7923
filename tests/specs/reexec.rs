//! Seed scenario (e): re-exec transparency.
//!
//! The engine state is exported through the versioned runtime image exactly
//! as the daemon does before calling exec, then rehydrated into a fresh
//! engine standing in for the replacement process.

use crate::prelude::*;
use ember_catalog::Catalog;
use ember_core::{Effect, Event, ExitStatus, FakeClock, JobEnvironment, JobState};
use ember_engine::{Engine, EngineState, SessionInfo};
use ember_storage::RuntimeImage;

/// Round-trip engine state through a saved image file.
fn through_image(rig: &Rig) -> Engine<FakeClock> {
    let image_path = rig.root.path().join("emberd.image");
    let image = RuntimeImage::new(
        rig.engine.catalog().roots().to_vec(),
        rig.engine.catalog().hashes(),
        serde_json::to_value(rig.engine.export_state()).unwrap(),
    );
    image.save(&image_path).unwrap();

    let loaded = RuntimeImage::take(&image_path).unwrap().unwrap();
    assert!(!image_path.exists(), "image consumed on restore");

    let mut catalog = Catalog::new(loaded.catalog_roots.clone());
    catalog.load_all();
    let mut engine = Engine::new(
        catalog,
        rig.clock.clone(),
        rig.root.path().join("logs"),
        JobEnvironment::with_defaults(false),
        SessionInfo::new("replacement"),
    );
    let state: EngineState = serde_json::from_value(loaded.engine).unwrap();
    engine.restore_state(state);
    engine.session_mut().generation += 1;
    engine
}

#[test]
fn running_job_survives_reexec_with_the_same_pid() {
    let mut rig = Rig::new(&[("svc.conf", "exec sleep 999\n")]);
    rig.start("svc", &[]);
    let pid = rig.main_pid("svc");
    let before = rig.instance("svc").clone();

    let engine = through_image(&rig);

    let after = engine
        .instances()
        .get(&before.id)
        .expect("instance preserved");
    assert_eq!(after.goal, before.goal);
    assert_eq!(after.state, before.state);
    assert_eq!(after.pids, before.pids);
    assert_eq!(after.env, before.env);
    assert_eq!(after.pid_of(ember_core::ProcessKind::Main), Some(pid));

    // Identity carried over; generation bumped
    assert_eq!(engine.session().session_id, "sess-spec");
    assert_eq!(engine.session().generation, 1);
}

#[test]
fn stop_after_reexec_signals_the_original_pid() {
    let mut rig = Rig::new(&[("svc.conf", "exec sleep 999\n")]);
    rig.start("svc", &[]);
    let pid = rig.main_pid("svc");

    let mut engine = through_image(&rig);

    let effects = engine.handle_event(Event::StopJob {
        class: "svc".into(),
        instance: String::new(),
        waiter: None,
    });
    assert!(effects.iter().any(|e| matches!(
        e,
        Effect::Signal { pid: p, signal: 15, group: true } if *p == pid
    )));

    // The reaped exit routes through the rebuilt pid index
    engine.handle_event(Event::ChildExited {
        pid,
        status: ExitStatus::Signal(15),
    });
    assert!(engine.instances().of_class("svc").is_empty());
}

#[test]
fn queued_emissions_are_preserved_in_position() {
    let mut rig = Rig::new(&[
        ("svc.conf", "exec sleep 999\n"),
        ("gate.conf", "task\nstart on gate\nexec gated\n"),
    ]);
    rig.start("svc", &[]);
    // Park an emission on the unfinished gate task
    rig.emit("gate", &[], true);

    let (pending_before, parked_before) = {
        let state = rig.engine.export_state();
        (state.pending.clone(), state.parked.clone())
    };
    assert_eq!(parked_before.len(), 1);

    let engine = through_image(&rig);
    let state = engine.export_state();
    assert_eq!(state.pending, pending_before);
    assert_eq!(state.parked, parked_before);
}

#[test]
fn kill_timer_rearms_across_reexec() {
    let mut rig = Rig::new(&[("svc.conf", "exec sleep 999\nkill timeout 7\n")]);
    rig.start("svc", &[]);
    rig.stop("svc");
    assert_eq!(rig.instance("svc").state, JobState::Killed);

    let image_value = serde_json::to_value(rig.engine.export_state()).unwrap();
    let mut catalog = Catalog::new(vec![rig.root.path().to_path_buf()]);
    catalog.load_all();
    let mut engine = Engine::new(
        catalog,
        rig.clock.clone(),
        rig.root.path().join("logs"),
        JobEnvironment::with_defaults(false),
        SessionInfo::new("replacement"),
    );
    let effects = engine.restore_state(serde_json::from_value(image_value).unwrap());

    assert!(effects.iter().any(|e| matches!(
        e,
        Effect::SetTimer { id, duration } if id.is_kill_timeout()
            && *duration == std::time::Duration::from_secs(7)
    )));
}

#[test]
fn image_written_by_a_newer_version_round_trips_unknown_state() {
    let rig = Rig::new(&[("svc.conf", "exec sleep 999\n")]);
    let image_path = rig.root.path().join("emberd.image");

    let mut image = RuntimeImage::new(
        rig.engine.catalog().roots().to_vec(),
        rig.engine.catalog().hashes(),
        serde_json::to_value(rig.engine.export_state()).unwrap(),
    );
    image.extra.insert(
        "future_field".to_string(),
        serde_json::json!({"carried": true}),
    );
    image.save(&image_path).unwrap();

    let loaded = RuntimeImage::load(&image_path).unwrap().unwrap();
    assert_eq!(
        loaded.extra["future_field"],
        serde_json::json!({"carried": true})
    );
}
