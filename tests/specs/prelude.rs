//! Shared test rig: a real catalog over a tempdir, the engine under a fake
//! clock, and an in-test executor that assigns deterministic pids.

use ember_catalog::Catalog;
use ember_core::{
    Effect, Event, ExitStatus, FakeClock, JobEnvironment, JobInstance, ProcessKind, SpawnRequest,
    WaiterId,
};
use ember_engine::{Engine, SessionInfo};
use std::collections::VecDeque;
use std::fs;
use tempfile::TempDir;

pub struct Rig {
    pub engine: Engine<FakeClock>,
    pub clock: FakeClock,
    pub spawned: Vec<(SpawnRequest, u32)>,
    pub root: TempDir,
    next_pid: u32,
}

impl Rig {
    pub fn new(files: &[(&str, &str)]) -> Self {
        let root = TempDir::new().unwrap();
        for (name, content) in files {
            let path = root.path().join(name);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            fs::write(path, content).unwrap();
        }
        let mut catalog = Catalog::new(vec![root.path().to_path_buf()]);
        let report = catalog.load_all();
        assert!(report.is_clean(), "{:?}", report.errors);

        let clock = FakeClock::new();
        let engine = Engine::new(
            catalog,
            clock.clone(),
            root.path().join("logs"),
            JobEnvironment::with_defaults(false),
            SessionInfo::new("sess-spec"),
        );
        Self {
            engine,
            clock,
            spawned: Vec::new(),
            root,
            next_pid: 0,
        }
    }

    /// Feed one event, confirming every spawn like the executor would.
    /// Returns the non-spawn effects in order.
    pub fn drive(&mut self, event: Event) -> Vec<Effect> {
        let mut pending = VecDeque::from([event]);
        let mut out = Vec::new();
        while let Some(event) = pending.pop_front() {
            for effect in self.engine.handle_event(event) {
                match effect {
                    Effect::Spawn { request } => {
                        self.next_pid += 1;
                        let pid = self.next_pid + 900;
                        pending.push_back(Event::ProcessSpawned {
                            id: request.id.clone(),
                            kind: request.kind,
                            pid,
                        });
                        self.spawned.push((request, pid));
                    }
                    other => out.push(other),
                }
            }
        }
        out
    }

    pub fn emit(&mut self, name: &str, env: &[(&str, &str)], wait: bool) -> Vec<Effect> {
        self.drive(Event::Emit {
            name: name.to_string(),
            env: env
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            wait,
            waiter: wait.then_some(WaiterId(1)),
        })
    }

    pub fn start(&mut self, class: &str, env: &[(&str, &str)]) -> Vec<Effect> {
        self.drive(Event::StartJob {
            class: class.to_string(),
            env: env
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            waiter: None,
        })
    }

    pub fn stop(&mut self, class: &str) -> Vec<Effect> {
        self.drive(Event::StopJob {
            class: class.to_string(),
            instance: String::new(),
            waiter: None,
        })
    }

    pub fn exit(&mut self, pid: u32, status: ExitStatus) -> Vec<Effect> {
        self.drive(Event::ChildExited { pid, status })
    }

    pub fn instance(&self, class: &str) -> &JobInstance {
        self.engine
            .instances()
            .of_class(class)
            .into_iter()
            .next()
            .unwrap_or_else(|| panic!("no live instance of {class}"))
    }

    pub fn main_pid(&self, class: &str) -> u32 {
        self.instance(class).pid_of(ProcessKind::Main).unwrap()
    }
}

/// Commands forked so far, in spawn order.
pub fn spawned_commands(rig: &Rig) -> Vec<String> {
    rig.spawned
        .iter()
        .map(|(request, _)| request.command.summary().to_string())
        .collect()
}
