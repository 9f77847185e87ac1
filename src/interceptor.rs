//! Interceptor hooks around blueprint processing, construction, and
//! destruction.

use std::sync::Arc;

use crate::blueprint::Blueprint;
use crate::class::ClassSpec;
use crate::error::ContainerResult;
use crate::token::AnyArc;

/// Extension hooks invoked at fixed points of a component's life.
///
/// Every method has a no-op default; implementors override only the hooks
/// they care about. Interceptors run in registration order, except
/// before-destruction hooks which run in reverse.
#[allow(unused_variables)]
pub trait ComponentInterceptor: Send + Sync {
    /// Mutates a freshly merged blueprint before it is cached. Runs once per
    /// merged entry.
    fn post_process_blueprint(&self, id: &str, blueprint: &mut Blueprint) {}

    /// Proposes constructor candidates (indexes into the class's declared
    /// constructors). The first non-`None` answer wins.
    fn candidate_constructors(&self, id: &str, class: &ClassSpec) -> Option<Vec<usize>> {
        None
    }

    /// May return a pre-built instance, short-circuiting instantiation and
    /// population. Only after-initialization hooks still run.
    fn before_construction(&self, id: &str, class: &ClassSpec) -> ContainerResult<Option<AnyArc>> {
        Ok(None)
    }

    /// Runs after instantiation, before population. Returning `false` vetoes
    /// population and dependency checking for the remaining chain too.
    fn after_construction(&self, id: &str, instance: &AnyArc) -> ContainerResult<bool> {
        Ok(true)
    }

    /// Wraps the early reference handed to cyclic dependents. The default
    /// returns the raw instance.
    fn wrap_early_reference(&self, id: &str, instance: AnyArc) -> AnyArc {
        instance
    }

    /// Transforms the instance before init methods run. `None` short-circuits
    /// the whole construction to an empty result.
    fn before_initialization(
        &self,
        id: &str,
        instance: AnyArc,
    ) -> ContainerResult<Option<AnyArc>> {
        Ok(Some(instance))
    }

    /// Transforms the instance after init methods ran. `None` short-circuits
    /// to an empty result.
    fn after_initialization(&self, id: &str, instance: AnyArc) -> ContainerResult<Option<AnyArc>> {
        Ok(Some(instance))
    }

    /// Whether this interceptor wants a before-destruction callback for the
    /// instance.
    fn requires_destruction(&self, instance: &AnyArc) -> bool {
        false
    }

    /// Runs before the instance's destroy methods.
    fn before_destruction(&self, id: &str, instance: &AnyArc) {}
}

/// Ordered interceptor chain shared by the container and disposal handles.
#[derive(Clone, Default)]
pub struct InterceptorChain {
    interceptors: Vec<Arc<dyn ComponentInterceptor>>,
}

impl InterceptorChain {
    pub(crate) fn new(interceptors: Vec<Arc<dyn ComponentInterceptor>>) -> Self {
        Self { interceptors }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    pub(crate) fn post_process_blueprint(&self, id: &str, blueprint: &mut Blueprint) {
        for interceptor in &self.interceptors {
            interceptor.post_process_blueprint(id, blueprint);
        }
    }

    pub(crate) fn candidate_constructors(&self, id: &str, class: &ClassSpec) -> Option<Vec<usize>> {
        self.interceptors
            .iter()
            .find_map(|i| i.candidate_constructors(id, class))
    }

    pub(crate) fn apply_before_construction(
        &self,
        id: &str,
        class: &ClassSpec,
    ) -> ContainerResult<Option<AnyArc>> {
        for interceptor in &self.interceptors {
            if let Some(instance) = interceptor.before_construction(id, class)? {
                return Ok(Some(instance));
            }
        }
        Ok(None)
    }

    pub(crate) fn apply_after_construction(
        &self,
        id: &str,
        instance: &AnyArc,
    ) -> ContainerResult<bool> {
        for interceptor in &self.interceptors {
            if !interceptor.after_construction(id, instance)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub(crate) fn wrap_early(&self, id: &str, instance: AnyArc) -> AnyArc {
        let mut current = instance;
        for interceptor in &self.interceptors {
            current = interceptor.wrap_early_reference(id, current);
        }
        current
    }

    pub(crate) fn apply_before_initialization(
        &self,
        id: &str,
        instance: AnyArc,
    ) -> ContainerResult<Option<AnyArc>> {
        let mut current = instance;
        for interceptor in &self.interceptors {
            match interceptor.before_initialization(id, current)? {
                Some(next) => current = next,
                None => return Ok(None),
            }
        }
        Ok(Some(current))
    }

    pub(crate) fn apply_after_initialization(
        &self,
        id: &str,
        instance: AnyArc,
    ) -> ContainerResult<Option<AnyArc>> {
        let mut current = instance;
        for interceptor in &self.interceptors {
            match interceptor.after_initialization(id, current)? {
                Some(next) => current = next,
                None => return Ok(None),
            }
        }
        Ok(Some(current))
    }

    pub(crate) fn requires_destruction(&self, instance: &AnyArc) -> bool {
        self.interceptors
            .iter()
            .any(|i| i.requires_destruction(instance))
    }

    pub(crate) fn apply_before_destruction(&self, id: &str, instance: &AnyArc) {
        for interceptor in self.interceptors.iter().rev() {
            interceptor.before_destruction(id, instance);
        }
    }
}
