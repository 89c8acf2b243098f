//! Deduplication of discovery tasks by (package, target address).
//!
//! The registry is the admission point for scheduling: a task is only
//! scheduled after `register` accepts it, which guarantees a target is never
//! double-scheduled under the same package even when several callers race.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use linkd_core::{DedupKey, NodeId};
use tracing::debug;

use crate::error::DuplicateTaskError;
use crate::task::DiscoveryTask;

/// Proof that a task was admitted; the caller should now schedule it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Accepted;

#[derive(Default)]
pub struct TaskRegistry {
    tasks: Mutex<HashMap<DedupKey, Arc<DiscoveryTask>>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<DedupKey, Arc<DiscoveryTask>>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Admit `task` unless an equal task is already registered.
    pub fn register(&self, task: &Arc<DiscoveryTask>) -> Result<Accepted, DuplicateTaskError> {
        let key = task.dedup_key();
        match self.lock().entry(key) {
            Entry::Occupied(existing) => {
                debug!(
                    key = %existing.key(),
                    existing_node = existing.get().node_id(),
                    candidate_node = task.node_id(),
                    "duplicate discovery task refused"
                );
                Err(DuplicateTaskError {
                    package: existing.key().package.clone(),
                    address: existing.key().address,
                })
            }
            Entry::Vacant(slot) => {
                slot.insert(Arc::clone(task));
                Ok(Accepted)
            }
        }
    }

    /// Drop the mapping held by this very task instance. A task that was
    /// never accepted (or was refused as a duplicate) leaves the registry
    /// untouched.
    pub fn unregister(&self, task: &DiscoveryTask) -> bool {
        let key = task.dedup_key();
        let mut tasks = self.lock();
        match tasks.get(&key) {
            Some(current) if current.id() == task.id() => {
                tasks.remove(&key);
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, package: &str, address: std::net::IpAddr) -> Option<Arc<DiscoveryTask>> {
        self.lock().get(&DedupKey::new(package, address)).cloned()
    }

    pub fn tasks_for_node(&self, node_id: NodeId) -> Vec<Arc<DiscoveryTask>> {
        self.lock()
            .values()
            .filter(|t| t.node_id() == node_id)
            .cloned()
            .collect()
    }

    pub fn tasks_for_package(&self, package: &str) -> Vec<Arc<DiscoveryTask>> {
        self.lock()
            .values()
            .filter(|t| t.package_name() == package)
            .cloned()
            .collect()
    }

    /// Remove and return every registered task.
    pub fn drain(&self) -> Vec<Arc<DiscoveryTask>> {
        self.lock().drain().map(|(_, t)| t).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::net::IpAddr;
    use std::thread;

    use linkd_core::{CollectionConfig, DiscoveryTarget, TaskTiming};
    use linkd_events::NullEventSink;

    use super::*;
    use crate::strategy::{CollectionStrategy, ConfigSource};
    use crate::timer::{ManualTimerQueue, TimerQueue};

    struct Noop;

    impl CollectionStrategy for Noop {
        fn perform_discovery(&self, _: &DiscoveryTarget, _: &CollectionConfig) {}
        fn info(&self) -> String {
            "noop".into()
        }
    }

    impl ConfigSource for Noop {
        fn lookup_current_config(&self, address: IpAddr) -> CollectionConfig {
            CollectionConfig::for_address(address)
        }
    }

    fn task(queue: &Arc<dyn TimerQueue>, package: &str, node_id: NodeId, address: &str, timing: TaskTiming) -> Arc<DiscoveryTask> {
        let target = DiscoveryTarget::parse(node_id, address).unwrap();
        DiscoveryTask::builder(target, CollectionConfig::for_address(target.address))
            .package(package)
            .timing(timing)
            .timer_queue(queue)
            .event_sink(Arc::new(NullEventSink))
            .strategy(Arc::new(Noop))
            .config_source(Arc::new(Noop))
            .build()
            .unwrap()
    }

    fn queue() -> Arc<dyn TimerQueue> {
        Arc::new(ManualTimerQueue::new())
    }

    #[test]
    fn equal_tasks_yield_one_accepted_one_duplicate() {
        let q = queue();
        let a = task(&q, "p", 1, "10.0.0.1", TaskTiming::default());
        let b = task(&q, "p", 2, "10.0.0.1", TaskTiming::from_secs(1, 2));

        let registry = TaskRegistry::new();
        assert_eq!(registry.register(&a), Ok(Accepted));
        let dup = registry.register(&b).unwrap_err();
        assert_eq!(dup.package, "p");
        assert_eq!(dup.address.to_string(), "10.0.0.1");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn registration_order_does_not_matter() {
        let q = queue();
        let a = task(&q, "p", 1, "10.0.0.1", TaskTiming::default());
        let b = task(&q, "p", 2, "10.0.0.1", TaskTiming::default());

        let registry = TaskRegistry::new();
        assert!(registry.register(&b).is_ok());
        assert!(registry.register(&a).is_err());
        assert_eq!(registry.get("p", b.address()).unwrap().id(), b.id());
    }

    #[test]
    fn different_package_or_address_are_distinct() {
        let q = queue();
        let registry = TaskRegistry::new();
        assert!(registry.register(&task(&q, "p", 1, "10.0.0.1", TaskTiming::default())).is_ok());
        assert!(registry.register(&task(&q, "q", 1, "10.0.0.1", TaskTiming::default())).is_ok());
        assert!(registry.register(&task(&q, "p", 1, "10.0.0.2", TaskTiming::default())).is_ok());
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.tasks_for_node(1).len(), 3);
        assert_eq!(registry.tasks_for_package("p").len(), 2);
    }

    #[test]
    fn unregister_only_removes_own_mapping() {
        let q = queue();
        let accepted = task(&q, "p", 1, "10.0.0.1", TaskTiming::default());
        let refused = task(&q, "p", 2, "10.0.0.1", TaskTiming::default());

        let registry = TaskRegistry::new();
        registry.register(&accepted).unwrap();
        assert!(registry.register(&refused).is_err());

        assert!(!registry.unregister(&refused));
        assert_eq!(registry.len(), 1);

        assert!(registry.unregister(&accepted));
        assert!(registry.is_empty());
        assert!(!registry.unregister(&accepted));
    }

    #[test]
    fn concurrent_registration_admits_exactly_one() {
        let q = queue();
        let registry = Arc::new(TaskRegistry::new());
        let candidates: Vec<_> = (0..16)
            .map(|i| task(&q, "p", i, "10.0.0.1", TaskTiming::default()))
            .collect();

        let handles: Vec<_> = candidates
            .into_iter()
            .map(|t| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || registry.register(&t).is_ok())
            })
            .collect();

        let accepted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(accepted, 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn drain_empties_registry() {
        let q = queue();
        let registry = TaskRegistry::new();
        registry.register(&task(&q, "p", 1, "10.0.0.1", TaskTiming::default())).unwrap();
        registry.register(&task(&q, "p", 2, "10.0.0.2", TaskTiming::default())).unwrap();
        assert_eq!(registry.drain().len(), 2);
        assert!(registry.is_empty());
    }
}
