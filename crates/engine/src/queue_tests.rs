// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn inst(name: &str) -> InstanceId {
    InstanceId::singleton(name)
}

#[test]
fn emissions_pop_in_fifo_order() {
    let mut queue = EventQueue::new();
    queue.enqueue("first", vec![], false, None);
    queue.enqueue("second", vec![], false, None);

    assert_eq!(queue.take_next().unwrap().name, "first");
    assert_eq!(queue.take_next().unwrap().name, "second");
    assert!(queue.take_next().is_none());
}

#[test]
fn ids_are_monotonic() {
    let mut queue = EventQueue::new();
    let a = queue.enqueue("a", vec![], false, None);
    let b = queue.enqueue("b", vec![], false, None);
    assert!(a < b);
}

#[test]
fn handling_marks_progress() {
    let mut queue = EventQueue::new();
    queue.enqueue("a", vec![], false, None);
    let emission = queue.take_next().unwrap();
    assert_eq!(emission.progress, EmissionProgress::Handling);
}

#[test]
fn unblocked_emission_completes_immediately() {
    let mut queue = EventQueue::new();
    queue.enqueue("a", vec![], true, Some(WaiterId(7)));
    let emission = queue.take_next().unwrap();
    let id = emission.id;

    let effect = queue.settle_handling(emission, vec![]);
    assert_eq!(
        effect,
        Some(Effect::CompleteEmission {
            id,
            waiter: WaiterId(7),
            outcome: EmissionOutcome::Finished,
        })
    );
}

#[test]
fn no_completion_effect_without_a_waiter() {
    let mut queue = EventQueue::new();
    queue.enqueue("a", vec![], false, None);
    let emission = queue.take_next().unwrap();
    assert_eq!(queue.settle_handling(emission, vec![]), None);
}

#[test]
fn parked_emission_completes_when_last_blocker_settles() {
    let mut queue = EventQueue::new();
    queue.enqueue("a", vec![], true, Some(WaiterId(1)));
    let emission = queue.take_next().unwrap();
    let id = emission.id;

    queue.settle_handling(emission, vec![inst("x"), inst("y")]);

    assert_eq!(queue.release_blocker(id, &inst("x"), true), None);
    let effect = queue.release_blocker(id, &inst("y"), true);
    assert_eq!(
        effect,
        Some(Effect::CompleteEmission {
            id,
            waiter: WaiterId(1),
            outcome: EmissionOutcome::Finished,
        })
    );
}

#[test]
fn any_failed_blocker_fails_the_emission() {
    let mut queue = EventQueue::new();
    queue.enqueue("a", vec![], true, Some(WaiterId(1)));
    let emission = queue.take_next().unwrap();
    let id = emission.id;

    queue.settle_handling(emission, vec![inst("x"), inst("y")]);
    queue.release_blocker(id, &inst("x"), false);
    let effect = queue.release_blocker(id, &inst("y"), true);
    assert_eq!(
        effect,
        Some(Effect::CompleteEmission {
            id,
            waiter: WaiterId(1),
            outcome: EmissionOutcome::Failed,
        })
    );
}

#[test]
fn releasing_an_unknown_blocker_is_harmless() {
    let mut queue = EventQueue::new();
    assert_eq!(
        queue.release_blocker(EmissionId(99), &inst("x"), true),
        None
    );
}

#[test]
fn drop_blocker_releases_across_all_parked() {
    let mut queue = EventQueue::new();
    queue.enqueue("a", vec![], true, Some(WaiterId(1)));
    let ea = queue.take_next().unwrap();
    queue.settle_handling(ea, vec![inst("x")]);

    queue.enqueue("b", vec![], true, Some(WaiterId(2)));
    let eb = queue.take_next().unwrap();
    queue.settle_handling(eb, vec![inst("x"), inst("y")]);

    // Destroying x completes a (sole blocker) but not b (y remains)
    let effects = queue.drop_blocker(&inst("x"));
    assert_eq!(effects.len(), 1);
    assert!(matches!(
        effects[0],
        Effect::CompleteEmission {
            waiter: WaiterId(1),
            ..
        }
    ));
}

#[test]
fn snapshot_round_trip_preserves_order_and_blockers() {
    let mut queue = EventQueue::new();
    queue.enqueue("head", vec![("K".into(), "V".into())], true, None);
    let parked = queue.take_next().unwrap();
    queue.settle_handling(parked, vec![inst("x")]);
    queue.enqueue("p1", vec![], false, None);
    queue.enqueue("p2", vec![], false, None);

    let (pending, parked) = queue.snapshot();
    assert_eq!(pending.len(), 2);
    assert_eq!(parked.len(), 1);
    assert_eq!(parked[0].remaining, vec![inst("x")]);

    let mut restored = EventQueue::new();
    restored.restore(pending.clone(), parked.clone());
    let (pending2, parked2) = restored.snapshot();
    assert_eq!(pending2, pending);
    assert_eq!(parked2, parked);

    // Ids continue past the restored maximum
    let next = restored.enqueue("new", vec![], false, None);
    assert!(next.0 > 3);
}

#[test]
fn snapshot_keeps_the_failed_flag_of_partially_settled_emissions() {
    let mut queue = EventQueue::new();
    queue.enqueue("a", vec![], true, Some(WaiterId(1)));
    let emission = queue.take_next().unwrap();
    let id = emission.id;
    queue.settle_handling(emission, vec![inst("x"), inst("y")]);

    // One blocker settles badly before the re-exec boundary
    assert_eq!(queue.release_blocker(id, &inst("x"), false), None);

    let (pending, parked) = queue.snapshot();
    assert!(parked[0].failed, "failure flag rides the snapshot");

    let mut restored = EventQueue::new();
    restored.restore(pending, parked);

    // The surviving blocker settling OK must still fail the emission
    let effect = restored.release_blocker(id, &inst("y"), true);
    assert_eq!(
        effect,
        Some(Effect::CompleteEmission {
            id,
            waiter: WaiterId(1),
            outcome: EmissionOutcome::Failed,
        })
    );
}

#[test]
fn restored_queue_keeps_fifo_order() {
    let mut queue = EventQueue::new();
    queue.enqueue("p1", vec![], false, None);
    queue.enqueue("p2", vec![], false, None);
    let (pending, parked) = queue.snapshot();

    let mut restored = EventQueue::new();
    restored.restore(pending, parked);
    assert_eq!(restored.take_next().unwrap().name, "p1");
    assert_eq!(restored.take_next().unwrap().name, "p2");
}
