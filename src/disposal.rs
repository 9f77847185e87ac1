//! Ordered component teardown.
//!
//! Components with destruction work get a [`DisposalHandle`] when their
//! construction finishes. Destroying one component first destroys everything
//! depending on it, then runs its own hooks, then its contained components.
//! Full shutdown walks handles in reverse registration order. Destruction
//! never propagates failures: panics and errors are caught and logged so one
//! broken hook cannot block the rest of the teardown.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::blueprint::DESTROY_METHOD_INFERRED;
use crate::class::ClassSpec;
use crate::graph::DependencyGraph;
use crate::interceptor::InterceptorChain;
use crate::lifecycle::{CONVENTIONAL_DESTROY_METHOD, INFERRED_DESTROY_CANDIDATES};
use crate::merge::MergedBlueprint;
use crate::registry::InstanceRegistry;
use crate::token::AnyArc;

/// Everything needed to tear one component down, captured at the end of its
/// construction. Consumed exactly once.
pub struct DisposalHandle {
    id: String,
    instance: AnyArc,
    merged: Arc<MergedBlueprint>,
    class: Arc<ClassSpec>,
    chain: InterceptorChain,
}

impl DisposalHandle {
    pub(crate) fn new(
        id: impl Into<String>,
        instance: AnyArc,
        merged: Arc<MergedBlueprint>,
        class: Arc<ClassSpec>,
        chain: InterceptorChain,
    ) -> Self {
        Self {
            id: id.into(),
            instance,
            merged,
            class,
            chain,
        }
    }

    /// Whether the component has any destruction work at all. Components
    /// without it never get a handle.
    pub(crate) fn worth_registering(
        merged: &MergedBlueprint,
        class: &ClassSpec,
        chain: &InterceptorChain,
        instance: &AnyArc,
    ) -> bool {
        if chain.requires_destruction(instance) {
            return true;
        }
        if class.capabilities.disposable.is_some() {
            return true;
        }
        match merged.def().destroy_method.as_deref() {
            None => false,
            Some(DESTROY_METHOD_INFERRED) => INFERRED_DESTROY_CANDIDATES
                .iter()
                .any(|m| class.has_method(m)),
            Some(_) => true,
        }
    }

    /// Runs all destruction phases, swallowing panics and errors.
    pub(crate) fn destroy(self) {
        debug!(component = %self.id, "destroying component");

        let caught = catch_unwind(AssertUnwindSafe(|| {
            self.chain.apply_before_destruction(&self.id, &self.instance);
        }));
        if caught.is_err() {
            warn!(component = %self.id, "before-destruction hook panicked");
        }

        let mut conventional_ran = false;
        if let Some(caster) = &self.class.capabilities.disposable {
            if let Some(disposable) = caster(&self.instance) {
                conventional_ran = true;
                let caught = catch_unwind(AssertUnwindSafe(|| disposable.dispose()));
                if caught.is_err() {
                    warn!(component = %self.id, "conventional dispose panicked");
                }
            }
        }

        match self.merged.def().destroy_method.as_deref() {
            None => {}
            Some(DESTROY_METHOD_INFERRED) => {
                // Absent candidates make inference a silent no-op.
                if let Some(method) = INFERRED_DESTROY_CANDIDATES
                    .iter()
                    .find(|m| self.class.has_method(m))
                {
                    self.run_destroy_method(method);
                }
            }
            Some(method) if conventional_ran && method == CONVENTIONAL_DESTROY_METHOD => {}
            Some(method) => {
                if self.class.has_method(method) {
                    self.run_destroy_method(method);
                } else {
                    warn!(
                        component = %self.id,
                        method,
                        "configured destroy method not found"
                    );
                }
            }
        }
    }

    fn run_destroy_method(&self, method: &str) {
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            self.class.invoke_method(&self.instance, method)
        }));
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(component = %self.id, method, error = %e, "destroy method failed");
            }
            Err(_) => {
                warn!(component = %self.id, method, "destroy method panicked");
            }
        }
    }
}

#[derive(Default)]
struct DisposalState {
    handles: HashMap<String, DisposalHandle>,
    order: Vec<String>,
    contained: HashMap<String, Vec<String>>,
}

/// Registry of disposal handles, keyed by component identifier.
#[derive(Default)]
pub struct DisposalRegistry {
    state: Mutex<DisposalState>,
}

impl DisposalRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(&self, handle: DisposalHandle) {
        let mut state = self.state.lock().unwrap();
        let id = handle.id.clone();
        if state.handles.insert(id.clone(), handle).is_none() {
            state.order.push(id);
        }
    }

    /// Ties a contained (nested) component's teardown to its owner.
    pub(crate) fn register_contained(&self, owner: &str, contained_id: &str) {
        self.state
            .lock()
            .unwrap()
            .contained
            .entry(owner.to_string())
            .or_default()
            .push(contained_id.to_string());
    }

    /// Destroys `id`: dependents first, then its own hooks, then contained
    /// components. Removes all cache and graph traces.
    pub(crate) fn destroy(&self, id: &str, graph: &DependencyGraph, instances: &InstanceRegistry) {
        for dependent in graph.take_dependents(id) {
            if dependent != id {
                self.destroy(&dependent, graph, instances);
            }
        }

        let (handle, contained) = {
            let mut state = self.state.lock().unwrap();
            let handle = state.handles.remove(id);
            if handle.is_some() {
                state.order.retain(|o| o != id);
            }
            let contained = state.contained.remove(id).unwrap_or_default();
            (handle, contained)
        };

        if let Some(handle) = handle {
            handle.destroy();
        }
        instances.remove(id);

        for contained_id in contained {
            self.destroy(&contained_id, graph, instances);
        }

        graph.prune(id);
    }

    /// Destroys every registered handle in reverse registration order, then
    /// drops all remaining instances.
    pub(crate) fn shutdown(&self, graph: &DependencyGraph, instances: &InstanceRegistry) {
        let order: Vec<String> = {
            let state = self.state.lock().unwrap();
            state.order.iter().rev().cloned().collect()
        };
        for id in order {
            self.destroy(&id, graph, instances);
        }
        instances.clear();
    }
}
