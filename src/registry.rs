//! Singleton instance cache with in-creation leasing and early references.
//!
//! The registry keeps three tiers per identifier: finished instances, early
//! references exposed mid-construction to break cycles, and early-reference
//! factories not yet forced. An in-creation lease guarantees exactly one
//! construction per identifier: concurrent requesters of an in-progress
//! identifier block on a condvar until the builder finishes, then observe the
//! same instance.
//!
//! Same-call-stack re-entry is not the registry's concern; callers detect it
//! through their creation context before asking the registry to resolve. Two
//! threads building a genuine A-needs-B, B-needs-A singleton cycle block each
//! other permanently; such graphs must be broken by property-injected cycles
//! resolved on one stack.

use std::collections::{HashMap, HashSet};
use std::sync::{Condvar, Mutex};

use crate::error::ContainerResult;
use crate::token::AnyArc;

type EarlyFactory = Box<dyn FnOnce() -> AnyArc + Send>;

#[derive(Default)]
struct RegistryState {
    finished: HashMap<String, AnyArc>,
    early: HashMap<String, AnyArc>,
    early_factories: HashMap<String, EarlyFactory>,
    in_creation: HashSet<String>,
    produced_nothing: HashSet<String>,
}

/// Thread-safe singleton instance registry.
#[derive(Default)]
pub struct InstanceRegistry {
    state: Mutex<RegistryState>,
    created: Condvar,
}

impl InstanceRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the finished instance for `id`, or constructs it under an
    /// in-creation lease.
    ///
    /// The construct closure runs without the registry lock held, so it may
    /// resolve other components. On success the result is promoted to the
    /// finished tier (or remembered as an empty result); on failure all
    /// traces of the attempt are rolled back so a later request can retry.
    pub fn resolve(
        &self,
        id: &str,
        construct: impl FnOnce() -> ContainerResult<Option<AnyArc>>,
    ) -> ContainerResult<Option<AnyArc>> {
        let mut state = self.state.lock().unwrap();
        loop {
            if let Some(found) = state.finished.get(id) {
                return Ok(Some(found.clone()));
            }
            if state.produced_nothing.contains(id) {
                return Ok(None);
            }
            if state.in_creation.contains(id) {
                state = self.created.wait(state).unwrap();
                continue;
            }
            state.in_creation.insert(id.to_string());
            break;
        }
        drop(state);

        let outcome = construct();

        let mut state = self.state.lock().unwrap();
        state.in_creation.remove(id);
        state.early.remove(id);
        state.early_factories.remove(id);
        match &outcome {
            Ok(Some(instance)) => {
                state.finished.insert(id.to_string(), instance.clone());
            }
            Ok(None) => {
                state.produced_nothing.insert(id.to_string());
            }
            Err(_) => {}
        }
        drop(state);
        self.created.notify_all();
        outcome
    }

    /// Returns the instance for `id`: the finished one, or, when `allow_early`
    /// is set, an early reference (forcing the registered factory at most
    /// once).
    pub fn get(&self, id: &str, allow_early: bool) -> Option<AnyArc> {
        let mut state = self.state.lock().unwrap();
        if let Some(found) = state.finished.get(id) {
            return Some(found.clone());
        }
        if !allow_early {
            return None;
        }
        if let Some(early) = state.early.get(id) {
            return Some(early.clone());
        }
        let factory = state.early_factories.remove(id)?;
        let early = factory();
        state.early.insert(id.to_string(), early.clone());
        Some(early)
    }

    /// Registers an early-reference factory for an identifier currently under
    /// an in-creation lease. Ignored otherwise.
    pub fn add_early_factory(&self, id: &str, factory: impl FnOnce() -> AnyArc + Send + 'static) {
        let mut state = self.state.lock().unwrap();
        if state.in_creation.contains(id) && !state.early.contains_key(id) {
            state
                .early_factories
                .insert(id.to_string(), Box::new(factory));
        }
    }

    /// The early reference for `id` if one was actually handed out.
    pub fn peek_early(&self, id: &str) -> Option<AnyArc> {
        self.state.lock().unwrap().early.get(id).cloned()
    }

    /// Whether `id` holds an in-creation lease right now.
    pub fn is_in_creation(&self, id: &str) -> bool {
        self.state.lock().unwrap().in_creation.contains(id)
    }

    /// Whether a finished instance exists for `id`.
    pub fn contains(&self, id: &str) -> bool {
        self.state.lock().unwrap().finished.contains_key(id)
    }

    /// Registers a pre-built instance directly in the finished tier.
    pub fn add_finished(&self, id: &str, instance: AnyArc) {
        self.state
            .lock()
            .unwrap()
            .finished
            .insert(id.to_string(), instance);
    }

    /// Forgets every trace of `id`, including a remembered empty result.
    pub fn remove(&self, id: &str) {
        let mut state = self.state.lock().unwrap();
        state.finished.remove(id);
        state.early.remove(id);
        state.early_factories.remove(id);
        state.produced_nothing.remove(id);
    }

    /// Drops all instances. Used at the end of shutdown.
    pub fn clear(&self) {
        let mut state = self.state.lock().unwrap();
        state.finished.clear();
        state.early.clear();
        state.early_factories.clear();
        state.produced_nothing.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn failed_construction_rolls_back_the_lease() {
        let registry = InstanceRegistry::new();
        let result = registry.resolve("a", || {
            Err(crate::error::ContainerError::NoSuchComponent("a".into()))
        });
        assert!(result.is_err());
        assert!(!registry.is_in_creation("a"));

        let ok = registry
            .resolve("a", || Ok(Some(Arc::new(1u8) as AnyArc)))
            .unwrap();
        assert!(ok.is_some());
    }

    #[test]
    fn empty_results_are_remembered() {
        let registry = InstanceRegistry::new();
        let first = registry.resolve("a", || Ok(None)).unwrap();
        assert!(first.is_none());
        let second = registry
            .resolve("a", || panic!("must not rebuild"))
            .unwrap();
        assert!(second.is_none());
    }

    #[test]
    fn early_factory_is_forced_at_most_once() {
        let registry = InstanceRegistry::new();
        registry
            .resolve("a", || {
                registry.add_early_factory("a", || Arc::new(7u32) as AnyArc);
                let early1 = registry.get("a", true).unwrap();
                let early2 = registry.get("a", true).unwrap();
                assert!(Arc::ptr_eq(&early1, &early2));
                Ok(Some(early1))
            })
            .unwrap();
        assert!(registry.contains("a"));
        assert!(registry.peek_early("a").is_none());
    }

    #[test]
    fn early_factory_outside_lease_is_ignored() {
        let registry = InstanceRegistry::new();
        registry.add_early_factory("a", || Arc::new(1u8) as AnyArc);
        assert!(registry.get("a", true).is_none());
    }
}
