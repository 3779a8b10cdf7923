// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn spawn_request() -> SpawnRequest {
    SpawnRequest {
        id: InstanceId::singleton("web"),
        kind: ProcessKind::Main,
        command: CommandLine::Exec("sleep 999".into()),
        env: vec![("PATH".into(), "/bin".into())],
        console: ConsoleMode::Log,
        log_path: Some(PathBuf::from("/var/log/ember/web.log")),
        chdir: None,
        chroot: None,
        umask: Some(0o022),
        nice: None,
        oom_score: None,
        limits: vec![ResourceLimit {
            resource: "nofile".into(),
            soft: 1024,
            hard: 4096,
        }],
        setuid: None,
        setgid: None,
    }
}

#[test]
fn spawn_effect_round_trips() {
    let effect = Effect::Spawn {
        request: spawn_request(),
    };
    let json = serde_json::to_string(&effect).unwrap();
    let back: Effect = serde_json::from_str(&json).unwrap();
    assert_eq!(back, effect);
}

#[test]
fn set_timer_serializes_duration_as_millis() {
    let effect = Effect::SetTimer {
        id: TimerId::quiesce(),
        duration: Duration::from_secs(5),
    };
    let json = serde_json::to_value(&effect).unwrap();
    assert_eq!(json["SetTimer"]["duration"], 5000);
    let back: Effect = serde_json::from_value(json).unwrap();
    assert_eq!(back, effect);
}

#[test]
fn effect_names_cover_all_variants() {
    let effects = [
        Effect::Spawn {
            request: spawn_request(),
        },
        Effect::Signal {
            pid: 1,
            signal: 15,
            group: true,
        },
        Effect::SetTimer {
            id: TimerId::quiesce(),
            duration: Duration::from_secs(1),
        },
        Effect::CancelTimer {
            id: TimerId::quiesce(),
        },
        Effect::Emit {
            name: "started".into(),
            env: vec![],
        },
        Effect::CompleteEmission {
            id: EmissionId(1),
            waiter: WaiterId(2),
            outcome: EmissionOutcome::Finished,
        },
        Effect::CompleteCommand {
            waiter: WaiterId(1),
            outcome: CommandOutcome::Ok,
        },
    ];
    let names: Vec<&str> = effects.iter().map(|e| e.name()).collect();
    assert_eq!(
        names,
        vec![
            "spawn",
            "signal",
            "set_timer",
            "cancel_timer",
            "emit",
            "complete_emission",
            "complete_command",
        ]
    );
}

#[test]
fn fields_carry_structured_context() {
    let effect = Effect::Signal {
        pid: 42,
        signal: 9,
        group: true,
    };
    let fields = effect.fields();
    assert!(fields.contains(&("pid", "42".to_string())));
    assert!(fields.contains(&("group", "true".to_string())));
}

#[test]
fn command_outcome_failed_carries_message() {
    let outcome = CommandOutcome::Failed("unknown job: foo".into());
    let json = serde_json::to_string(&outcome).unwrap();
    let back: CommandOutcome = serde_json::from_str(&json).unwrap();
    assert_eq!(back, outcome);
}
