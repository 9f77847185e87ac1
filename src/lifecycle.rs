//! Component lifecycle: aware callbacks, initialization hooks, and the
//! ordering between them.
//!
//! After population, every component passes through a fixed sequence: aware
//! callbacks, the before-initialization interceptor chain, the conventional
//! [`Initializable`] capability, the configured init method, and the
//! after-initialization chain. Interceptors may replace the instance at
//! either chain point or short-circuit the whole construction to an empty
//! result.

use std::sync::Arc;

use crate::class::{ClassRegistry, ClassSpec};
use crate::container::{Container, ContainerInner};
use crate::error::{ContainerError, ContainerResult};
use crate::merge::MergedBlueprint;
use crate::token::AnyArc;

/// Init method invoked when a class declares the [`Initializable`]
/// capability. A configured init method of this name is not invoked twice.
pub const CONVENTIONAL_INIT_METHOD: &str = "initialize";

/// Destroy method represented by the [`Dispose`] capability. A configured
/// destroy method of this name is not invoked twice.
pub const CONVENTIONAL_DESTROY_METHOD: &str = "dispose";

/// Method names tried, in order, when a blueprint asks for destroy-method
/// inference.
pub(crate) const INFERRED_DESTROY_CANDIDATES: [&str; 2] = ["close", "shutdown"];

/// Receives the component identifier before initialization.
pub trait ComponentIdAware: Send + Sync {
    fn set_component_id(&self, id: &str);
}

/// Receives a handle to the owning container before initialization.
///
/// The handle is cheap to clone and may be stored for later lookups; holding
/// it does not keep resolved singletons alive past shutdown.
pub trait ContainerAware: Send + Sync {
    fn set_container(&self, container: Container);
}

/// Receives the shared class registry before initialization.
pub trait ClassRegistryAware: Send + Sync {
    fn set_class_registry(&self, registry: Arc<ClassRegistry>);
}

/// Conventional initialization hook, run after all properties are set.
pub trait Initializable: Send + Sync {
    fn initialize(&self) -> ContainerResult<()>;
}

/// Conventional disposal hook, run during teardown.
pub trait Dispose: Send + Sync {
    fn dispose(&self);
}

impl ContainerInner {
    /// Runs the full post-population sequence. `Ok(None)` means an
    /// interceptor short-circuited construction to an empty result.
    pub(crate) fn finalize_component(
        &self,
        id: &str,
        merged: &MergedBlueprint,
        class: &ClassSpec,
        instance: AnyArc,
    ) -> ContainerResult<Option<AnyArc>> {
        self.apply_aware(id, class, &instance);

        let skip_chain = merged.def().synthetic;
        let instance = if skip_chain {
            instance
        } else {
            match self.chain.apply_before_initialization(id, instance)? {
                Some(next) => next,
                None => return Ok(None),
            }
        };

        self.invoke_init_methods(id, merged, class, &instance)?;

        if skip_chain {
            Ok(Some(instance))
        } else {
            self.chain.apply_after_initialization(id, instance)
        }
    }

    fn apply_aware(&self, id: &str, class: &ClassSpec, instance: &AnyArc) {
        if let Some(caster) = &class.capabilities.component_id_aware {
            if let Some(aware) = caster(instance) {
                aware.set_component_id(id);
            }
        }
        if let Some(caster) = &class.capabilities.class_registry_aware {
            if let Some(aware) = caster(instance) {
                aware.set_class_registry(self.classes.clone());
            }
        }
        if let Some(caster) = &class.capabilities.container_aware {
            if let Some(aware) = caster(instance) {
                aware.set_container(self.facade());
            }
        }
    }

    fn invoke_init_methods(
        &self,
        id: &str,
        merged: &MergedBlueprint,
        class: &ClassSpec,
        instance: &AnyArc,
    ) -> ContainerResult<()> {
        let def = merged.def();

        let mut conventional_ran = false;
        if let Some(caster) = &class.capabilities.initializable {
            if let Some(init) = caster(instance) {
                tracing::debug!(component = id, "running conventional initialization");
                init.initialize()
                    .map_err(|e| ContainerError::LifecycleFailure {
                        id: id.to_string(),
                        method: CONVENTIONAL_INIT_METHOD.to_string(),
                        detail: e.to_string(),
                    })?;
                conventional_ran = true;
            }
        }

        let Some(method) = def.init_method.as_deref() else {
            return Ok(());
        };
        if def.init_externally_managed {
            return Ok(());
        }
        if conventional_ran && method == CONVENTIONAL_INIT_METHOD {
            return Ok(());
        }
        if class.has_method(method) {
            tracing::debug!(component = id, method, "running configured init method");
            class
                .invoke_method(instance, method)
                .map_err(|e| ContainerError::LifecycleFailure {
                    id: id.to_string(),
                    method: method.to_string(),
                    detail: e.to_string(),
                })
        } else if def.enforce_init_method {
            Err(ContainerError::MethodNotFound {
                id: id.to_string(),
                method: method.to_string(),
            })
        } else {
            Ok(())
        }
    }
}
