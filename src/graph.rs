//! Dependency edge tracking for ordered teardown and depends-on cycle checks.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

/// Records which component depends on which, as two inverse multimaps under
/// one lock. Edges accumulate during wiring and drive dependents-first
/// teardown.
#[derive(Default)]
pub struct DependencyGraph {
    state: Mutex<GraphState>,
}

#[derive(Default)]
struct GraphState {
    /// dependency id -> ids depending on it
    dependents: HashMap<String, Vec<String>>,
    /// dependent id -> ids it depends on
    dependencies: HashMap<String, Vec<String>>,
}

impl DependencyGraph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `dependent` depends on `dependency`. Idempotent.
    pub fn register(&self, dependency: &str, dependent: &str) {
        let mut state = self.state.lock().unwrap();
        let dependents = state.dependents.entry(dependency.to_string()).or_default();
        if dependents.iter().any(|d| d == dependent) {
            return;
        }
        dependents.push(dependent.to_string());
        state
            .dependencies
            .entry(dependent.to_string())
            .or_default()
            .push(dependency.to_string());
    }

    /// Whether `candidate` transitively depends on `id`. Used to fail an
    /// explicit depends-on declaration that would close a cycle.
    pub fn is_dependent(&self, id: &str, candidate: &str) -> bool {
        let state = self.state.lock().unwrap();
        let mut visited = HashSet::new();
        Self::is_dependent_inner(&state, id, candidate, &mut visited)
    }

    fn is_dependent_inner(
        state: &GraphState,
        id: &str,
        candidate: &str,
        visited: &mut HashSet<String>,
    ) -> bool {
        if !visited.insert(id.to_string()) {
            return false;
        }
        let Some(dependents) = state.dependents.get(id) else {
            return false;
        };
        if dependents.iter().any(|d| d == candidate) {
            return true;
        }
        dependents
            .iter()
            .any(|d| Self::is_dependent_inner(state, d, candidate, visited))
    }

    /// Direct dependents of `id`, in registration order.
    pub fn dependents_of(&self, id: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .dependents
            .get(id)
            .cloned()
            .unwrap_or_default()
    }

    /// Removes and returns the direct dependents of `id`. Taking the entry
    /// before recursing keeps teardown of cyclic graphs finite.
    pub fn take_dependents(&self, id: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .dependents
            .remove(id)
            .unwrap_or_default()
    }

    /// Drops all edges touching `id` after its teardown.
    pub fn prune(&self, id: &str) {
        let mut state = self.state.lock().unwrap();
        state.dependents.remove(id);
        state.dependencies.remove(id);
        for dependents in state.dependents.values_mut() {
            dependents.retain(|d| d != id);
        }
        for dependencies in state.dependencies.values_mut() {
            dependencies.retain(|d| d != id);
        }
    }
}
