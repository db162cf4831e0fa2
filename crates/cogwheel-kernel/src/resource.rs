//! [`Resource`] and [`ResourceTable`] – per-subsystem mutual exclusion.
//!
//! Every physical or logical subsystem (a gripper, a drive base, ...) is
//! registered once in the [`ResourceTable`] and referenced by
//! [`ResourceId`] from each command that requires it.  The table is owned
//! by the scheduler; nothing else mutates hold state.
//!
//! # Notification
//!
//! A command that wants to know when a resource frees up registers itself
//! with [`Resource::wait`].  A successful [`Resource::release`] wakes exactly
//! the waiters registered at that moment and clears the list.  The table
//! collects woken waiters into a pending set that the scheduler drains with
//! [`ResourceTable::take_notification`].  A woken waiter that still cannot
//! proceed simply registers again, so it is woken by every future release.
//! A waiter that resumes or stops calls [`ResourceTable::unwait`] so no stale
//! registration or pending wake-up outlives its wait.

use std::collections::{HashMap, HashSet};

use cogwheel_types::{CommandId, ResourceId, SchedError};
use tracing::{debug, warn};

// ────────────────────────────────────────────────────────────────────────────
// Resource
// ────────────────────────────────────────────────────────────────────────────

/// One exclusive subsystem lock.
#[derive(Debug)]
pub struct Resource {
    id: ResourceId,
    name: String,
    holder: Option<CommandId>,
    waiters: Vec<CommandId>,
}

impl Resource {
    /// Create an unheld resource.
    pub fn new(id: ResourceId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            holder: None,
            waiters: Vec::new(),
        }
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Record `holder` as the owner iff the resource is currently unheld.
    ///
    /// Non-blocking.  A second acquire by the current holder fails as well.
    pub fn try_acquire(&mut self, holder: CommandId) -> bool {
        if self.holder.is_some() {
            return false;
        }
        self.holder = Some(holder);
        true
    }

    /// Clear the hold iff it belongs to `holder`, returning the waiters to wake.
    ///
    /// A release by anyone else is logged and ignored.
    pub fn release(&mut self, holder: CommandId) -> Vec<CommandId> {
        match self.holder {
            Some(current) if current == holder => {
                self.holder = None;
                std::mem::take(&mut self.waiters)
            }
            current => {
                warn!(
                    resource = %self.name,
                    requested_by = %holder,
                    held_by = ?current,
                    "release ignored: resource not held by requester"
                );
                Vec::new()
            }
        }
    }

    pub fn is_locked(&self) -> bool {
        self.holder.is_some()
    }

    pub fn holder(&self) -> Option<CommandId> {
        self.holder
    }

    /// Register `waiter` for the next release notification.
    pub fn wait(&mut self, waiter: CommandId) {
        if !self.waiters.contains(&waiter) {
            self.waiters.push(waiter);
        }
    }

    /// Drop `waiter` from the notification list.
    pub fn unwait(&mut self, waiter: CommandId) {
        self.waiters.retain(|w| *w != waiter);
    }

    /// Number of tasks currently waiting on this resource.
    pub fn waiter_count(&self) -> usize {
        self.waiters.len()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// ResourceTable
// ────────────────────────────────────────────────────────────────────────────

/// Owns every [`Resource`] for the lifetime of the process.
///
/// # Example
///
/// ```
/// use cogwheel_kernel::ResourceTable;
/// use cogwheel_types::CommandId;
///
/// let mut table = ResourceTable::new();
/// let gripper = table.register("gripper");
/// let lifter = table.register("lifter");
///
/// assert!(table.try_acquire_all(CommandId(1), &[gripper, lifter]).is_ok());
/// // Overlapping request fails without taking anything.
/// assert!(table.try_acquire_all(CommandId(2), &[lifter]).is_err());
///
/// table.release_all(CommandId(1), &[gripper, lifter]);
/// assert!(table.all_free(&[gripper, lifter]));
/// ```
#[derive(Debug, Default)]
pub struct ResourceTable {
    resources: Vec<Resource>,
    by_name: HashMap<String, ResourceId>,
    notified: HashSet<CommandId>,
}

impl ResourceTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subsystem under `name` and return its id.
    ///
    /// Registering an existing name returns the id already assigned.
    pub fn register(&mut self, name: impl Into<String>) -> ResourceId {
        let name = name.into();
        if let Some(id) = self.by_name.get(&name) {
            return *id;
        }
        let id = ResourceId(self.resources.len() as u32);
        debug!(resource = %name, %id, "resource registered");
        self.by_name.insert(name.clone(), id);
        self.resources.push(Resource::new(id, name));
        id
    }

    pub fn lookup(&self, name: &str) -> Option<ResourceId> {
        self.by_name.get(name).copied()
    }

    pub fn get(&self, id: ResourceId) -> Option<&Resource> {
        self.resources.get(id.0 as usize)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Resource> {
        self.resources.iter()
    }

    /// Display name for `id`, falling back to the id itself.
    pub fn name_of(&self, id: ResourceId) -> String {
        self.get(id)
            .map(|r| r.name().to_string())
            .unwrap_or_else(|| id.to_string())
    }

    fn resource_mut(&mut self, id: ResourceId) -> Result<&mut Resource, SchedError> {
        self.resources
            .get_mut(id.0 as usize)
            .ok_or(SchedError::UnknownResource(id))
    }

    /// Acquire every resource in `ids` for `holder`, or none of them.
    ///
    /// All resources are checked in declaration order before anything is
    /// taken.  The first busy one is reported as a
    /// [`SchedError::ResourceConflict`].
    pub fn try_acquire_all(
        &mut self,
        holder: CommandId,
        ids: &[ResourceId],
    ) -> Result<(), SchedError> {
        for &id in ids {
            let res = self.get(id).ok_or(SchedError::UnknownResource(id))?;
            if let Some(current) = res.holder() {
                return Err(SchedError::ResourceConflict {
                    command: holder,
                    resource: id,
                    holder: current,
                });
            }
        }

        for (taken, &id) in ids.iter().enumerate() {
            let acquired = self.resource_mut(id)?.try_acquire(holder);
            if !acquired {
                // Duplicate id in the request: roll back what this call took.
                let current = self.get(id).and_then(Resource::holder).unwrap_or(holder);
                self.release_all(holder, &ids[..taken]);
                return Err(SchedError::ResourceConflict {
                    command: holder,
                    resource: id,
                    holder: current,
                });
            }
        }
        Ok(())
    }

    /// Release every resource in `ids` held by `holder` and queue wake-ups.
    pub fn release_all(&mut self, holder: CommandId, ids: &[ResourceId]) {
        for &id in ids {
            let Some(res) = self.resources.get_mut(id.0 as usize) else {
                warn!(%id, "release of unknown resource ignored");
                continue;
            };
            if res.holder() != Some(holder) {
                continue;
            }
            let woken = res.release(holder);
            if !woken.is_empty() {
                debug!(resource = %res.name(), woken = woken.len(), "waiters notified");
            }
            self.notified.extend(woken);
        }
    }

    /// Register `waiter` on every resource in `ids`.
    pub fn wait_any(&mut self, waiter: CommandId, ids: &[ResourceId]) {
        for &id in ids {
            if let Some(res) = self.resources.get_mut(id.0 as usize) {
                res.wait(waiter);
            }
        }
    }

    /// Forget `waiter` everywhere: its registration on each of `ids` and any
    /// notification still pending for it.
    pub fn unwait(&mut self, waiter: CommandId, ids: &[ResourceId]) {
        for &id in ids {
            if let Some(res) = self.resources.get_mut(id.0 as usize) {
                res.unwait(waiter);
            }
        }
        self.notified.remove(&waiter);
    }

    /// Consume a pending release notification for `waiter`.
    pub fn take_notification(&mut self, waiter: CommandId) -> bool {
        self.notified.remove(&waiter)
    }

    /// `true` when no resource in `ids` is held.
    pub fn all_free(&self, ids: &[ResourceId]) -> bool {
        ids.iter()
            .all(|id| self.get(*id).is_some_and(|r| !r.is_locked()))
    }

    /// How many of `ids` are currently held by `holder`.
    pub fn held_count(&self, holder: CommandId, ids: &[ResourceId]) -> usize {
        ids.iter()
            .filter(|id| self.get(**id).and_then(Resource::holder) == Some(holder))
            .count()
    }

    /// `true` when `holder` holds every resource in `ids` or none of them.
    pub fn holds_all_or_none(&self, holder: CommandId, ids: &[ResourceId]) -> bool {
        let held = self.held_count(holder, ids);
        held == 0 || held == ids.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: CommandId = CommandId(1);
    const B: CommandId = CommandId(2);

    #[test]
    fn try_acquire_records_holder() {
        let mut r = Resource::new(ResourceId(0), "gripper");
        assert!(!r.is_locked());
        assert!(r.try_acquire(A));
        assert!(r.is_locked());
        assert_eq!(r.holder(), Some(A));
    }

    #[test]
    fn second_acquire_fails() {
        let mut r = Resource::new(ResourceId(0), "gripper");
        assert!(r.try_acquire(A));
        assert!(!r.try_acquire(B));
        assert!(!r.try_acquire(A));
        assert_eq!(r.holder(), Some(A));
    }

    #[test]
    fn release_by_non_holder_is_ignored() {
        let mut r = Resource::new(ResourceId(0), "gripper");
        r.try_acquire(A);
        r.wait(B);
        let woken = r.release(B);
        assert!(woken.is_empty());
        assert_eq!(r.holder(), Some(A));
        assert_eq!(r.waiter_count(), 1);
    }

    #[test]
    fn release_wakes_current_waiters_once() {
        let mut r = Resource::new(ResourceId(0), "gripper");
        r.try_acquire(A);
        r.wait(B);
        r.wait(B);
        assert_eq!(r.waiter_count(), 1);
        assert_eq!(r.release(A), vec![B]);
        assert_eq!(r.waiter_count(), 0);

        // Nobody waiting any more: next release wakes nobody.
        r.try_acquire(A);
        assert!(r.release(A).is_empty());
    }

    #[test]
    fn register_is_idempotent_by_name() {
        let mut t = ResourceTable::new();
        let g = t.register("gripper");
        let l = t.register("lifter");
        assert_ne!(g, l);
        assert_eq!(t.register("gripper"), g);
        assert_eq!(t.lookup("lifter"), Some(l));
        assert_eq!(t.len(), 2);
        assert_eq!(t.name_of(g), "gripper");
    }

    #[test]
    fn acquire_all_is_all_or_nothing() {
        let mut t = ResourceTable::new();
        let g = t.register("gripper");
        let l = t.register("lifter");
        t.try_acquire_all(A, &[l]).unwrap();

        let err = t.try_acquire_all(B, &[g, l]).unwrap_err();
        match err {
            SchedError::ResourceConflict { command, resource, holder } => {
                assert_eq!(command, B);
                assert_eq!(resource, l);
                assert_eq!(holder, A);
            }
            other => panic!("unexpected error: {other}"),
        }
        // Gripper was free but must not have been taken.
        assert!(!t.get(g).unwrap().is_locked());
        assert_eq!(t.held_count(B, &[g, l]), 0);
    }

    #[test]
    fn duplicate_ids_roll_back() {
        let mut t = ResourceTable::new();
        let g = t.register("gripper");
        assert!(t.try_acquire_all(A, &[g, g]).is_err());
        assert!(!t.get(g).unwrap().is_locked());
    }

    #[test]
    fn unknown_resource_is_reported() {
        let mut t = ResourceTable::new();
        let err = t.try_acquire_all(A, &[ResourceId(9)]).unwrap_err();
        assert!(matches!(err, SchedError::UnknownResource(ResourceId(9))));
    }

    #[test]
    fn release_all_queues_notifications() {
        let mut t = ResourceTable::new();
        let g = t.register("gripper");
        let l = t.register("lifter");
        t.try_acquire_all(A, &[g, l]).unwrap();
        t.wait_any(B, &[g, l]);

        assert!(!t.take_notification(B));
        t.release_all(A, &[g, l]);
        assert!(t.take_notification(B));
        // Consumed.
        assert!(!t.take_notification(B));
        assert!(t.all_free(&[g, l]));
    }

    #[test]
    fn unwait_clears_registrations_and_pending_notification() {
        let mut t = ResourceTable::new();
        let g = t.register("gripper");
        let l = t.register("lifter");
        t.try_acquire_all(A, &[g]).unwrap();
        t.wait_any(B, &[g, l]);
        t.release_all(A, &[g]);
        assert_eq!(t.get(l).unwrap().waiter_count(), 1);

        t.unwait(B, &[g, l]);
        assert!(!t.take_notification(B));
        assert_eq!(t.get(g).unwrap().waiter_count(), 0);
        assert_eq!(t.get(l).unwrap().waiter_count(), 0);

        // Nothing left to wake on a later release.
        t.try_acquire_all(A, &[l]).unwrap();
        t.release_all(A, &[l]);
        assert!(!t.take_notification(B));
    }

    #[test]
    fn release_all_skips_resources_held_by_others() {
        let mut t = ResourceTable::new();
        let g = t.register("gripper");
        t.try_acquire_all(A, &[g]).unwrap();
        t.release_all(B, &[g]);
        assert_eq!(t.get(g).unwrap().holder(), Some(A));
    }

    #[test]
    fn holds_all_or_none_reports_partial_sets() {
        let mut t = ResourceTable::new();
        let g = t.register("gripper");
        let l = t.register("lifter");
        assert!(t.holds_all_or_none(A, &[g, l]));
        t.resource_mut(g).unwrap().try_acquire(A);
        assert!(!t.holds_all_or_none(A, &[g, l]));
        t.resource_mut(l).unwrap().try_acquire(A);
        assert!(t.holds_all_or_none(A, &[g, l]));
    }
}
