// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The live instance table and the pid → instance index.

use ember_core::{InstanceId, JobInstance};
use std::collections::HashMap;

/// Maps `(class, instance name)` to the live instance, with a secondary
/// index routing reaped pids back to their owner.
#[derive(Debug, Default)]
pub struct InstanceTable {
    instances: HashMap<InstanceId, JobInstance>,
    pid_index: HashMap<u32, InstanceId>,
}

impl InstanceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a freshly created instance.
    pub fn insert(&mut self, instance: JobInstance) {
        self.instances.insert(instance.id.clone(), instance);
    }

    pub fn get(&self, id: &InstanceId) -> Option<&JobInstance> {
        self.instances.get(id)
    }

    pub fn get_mut(&mut self, id: &InstanceId) -> Option<&mut JobInstance> {
        self.instances.get_mut(id)
    }

    pub fn contains(&self, id: &InstanceId) -> bool {
        self.instances.contains_key(id)
    }

    /// Remove a destroyed instance, dropping its pid index entries.
    pub fn remove(&mut self, id: &InstanceId) -> Option<JobInstance> {
        let instance = self.instances.remove(id)?;
        self.pid_index.retain(|_, owner| owner != id);
        Some(instance)
    }

    /// Register a spawned pid for routing.
    pub fn index_pid(&mut self, pid: u32, owner: InstanceId) {
        self.pid_index.insert(pid, owner);
    }

    /// Owner of a pid, if known. Does not unregister.
    pub fn owner_of(&self, pid: u32) -> Option<&InstanceId> {
        self.pid_index.get(&pid)
    }

    /// Drop a pid from the index (on reap).
    pub fn unindex_pid(&mut self, pid: u32) -> Option<InstanceId> {
        self.pid_index.remove(&pid)
    }

    /// Rebuild the pid index from instance pid tables (after re-exec).
    pub fn reindex(&mut self) {
        self.pid_index.clear();
        for (id, instance) in &self.instances {
            for (_, pid) in &instance.pids {
                self.pid_index.insert(*pid, id.clone());
            }
        }
    }

    /// Live instances of a class, sorted by instance name.
    pub fn of_class(&self, class: &str) -> Vec<&JobInstance> {
        let mut list: Vec<&JobInstance> = self
            .instances
            .values()
            .filter(|i| i.id.class == class)
            .collect();
        list.sort_by(|a, b| a.id.instance.cmp(&b.id.instance));
        list
    }

    /// All instances, sorted by class then instance name.
    pub fn all(&self) -> Vec<&JobInstance> {
        let mut list: Vec<&JobInstance> = self.instances.values().collect();
        list.sort_by(|a, b| {
            a.id.class
                .cmp(&b.id.class)
                .then_with(|| a.id.instance.cmp(&b.id.instance))
        });
        list
    }

    /// Instance ids, sorted. Used for deterministic bulk operations.
    pub fn ids(&self) -> Vec<InstanceId> {
        self.all().into_iter().map(|i| i.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

#[cfg(test)]
#[path = "instances_tests.rs"]
mod tests;
