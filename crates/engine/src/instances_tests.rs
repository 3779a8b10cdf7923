// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use ember_core::ProcessKind;

fn instance(class: &str, name: &str) -> JobInstance {
    JobInstance::new(InstanceId::new(class, name), vec![], 0)
}

#[test]
fn insert_get_remove_round_trip() {
    let mut table = InstanceTable::new();
    let id = InstanceId::singleton("foo");
    table.insert(instance("foo", ""));

    assert!(table.contains(&id));
    assert!(table.get(&id).is_some());
    assert!(table.remove(&id).is_some());
    assert!(!table.contains(&id));
}

#[test]
fn pid_routing() {
    let mut table = InstanceTable::new();
    let id = InstanceId::singleton("foo");
    table.insert(instance("foo", ""));
    table.index_pid(100, id.clone());

    assert_eq!(table.owner_of(100), Some(&id));
    assert_eq!(table.unindex_pid(100), Some(id));
    assert_eq!(table.owner_of(100), None);
}

#[test]
fn remove_drops_pid_entries() {
    let mut table = InstanceTable::new();
    let id = InstanceId::singleton("foo");
    table.insert(instance("foo", ""));
    table.index_pid(100, id.clone());
    table.index_pid(101, id.clone());

    table.remove(&id);
    assert_eq!(table.owner_of(100), None);
    assert_eq!(table.owner_of(101), None);
}

#[test]
fn reindex_rebuilds_from_pid_tables() {
    let mut table = InstanceTable::new();
    let id = InstanceId::singleton("foo");
    let mut inst = instance("foo", "");
    inst.set_pid(ProcessKind::Main, 555);
    table.insert(inst);

    assert_eq!(table.owner_of(555), None);
    table.reindex();
    assert_eq!(table.owner_of(555), Some(&id));
}

#[test]
fn of_class_filters_and_sorts() {
    let mut table = InstanceTable::new();
    table.insert(instance("getty", "tty2"));
    table.insert(instance("getty", "tty1"));
    table.insert(instance("other", ""));

    let names: Vec<&str> = table
        .of_class("getty")
        .iter()
        .map(|i| i.id.instance.as_str())
        .collect();
    assert_eq!(names, vec!["tty1", "tty2"]);
}

#[test]
fn all_sorts_by_class_then_instance() {
    let mut table = InstanceTable::new();
    table.insert(instance("b", ""));
    table.insert(instance("a", "2"));
    table.insert(instance("a", "1"));

    let ids: Vec<String> = table.all().iter().map(|i| i.id.to_string()).collect();
    assert_eq!(ids, vec!["a (1)", "a (2)", "b"]);
}
