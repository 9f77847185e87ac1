//! The container façade and the component resolution pipeline.

use std::any::TypeId;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use tracing::{debug, warn};

use crate::blueprint::{Blueprint, BlueprintSource, Scope, SimpleBlueprintRegistry};
use crate::class::{ClassRegistry, ClassSpec};
use crate::convert::{ConversionService, StandardConversions};
use crate::disposal::{DisposalHandle, DisposalRegistry};
use crate::error::{ContainerError, ContainerResult};
use crate::graph::DependencyGraph;
use crate::instantiate::{DirectInstantiation, InstantiationStrategy};
use crate::interceptor::{ComponentInterceptor, InterceptorChain};
use crate::merge::{BlueprintMerger, MergedBlueprint};
use crate::registry::InstanceRegistry;
use crate::scope::ComponentScope;
use crate::token::{AnyArc, TypeToken};

/// What to do when an early reference handed to cyclic dependents turns out
/// to differ from the finished instance (an interceptor replaced it after the
/// raw one escaped).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RawInjectionPolicy {
    /// Log a warning and keep the finished instance; dependents keep the raw
    /// one they already received.
    #[default]
    Tolerate,
    /// Fail the construction.
    Fail,
}

/// Per-call-stack creation state, threaded through the resolution chain.
///
/// Singleton entries let a re-entrant request on the same stack be served an
/// early reference; prototype entries turn re-entry into a hard error.
#[derive(Default)]
pub(crate) struct CreationContext {
    singletons: Vec<String>,
    prototypes: Vec<String>,
}

impl CreationContext {
    fn in_singleton(&self, id: &str) -> bool {
        self.singletons.iter().any(|s| s == id)
    }

    fn in_prototype(&self, id: &str) -> bool {
        self.prototypes.iter().any(|s| s == id)
    }
}

/// Layers the container's own mutable registry over an optional external
/// blueprint source. Local registrations shadow external ones.
struct CombinedSource {
    local: SimpleBlueprintRegistry,
    external: Option<Arc<dyn BlueprintSource>>,
}

impl BlueprintSource for CombinedSource {
    fn get(&self, id: &str) -> Option<Arc<Blueprint>> {
        self.local
            .get(id)
            .or_else(|| self.external.as_ref().and_then(|e| e.get(id)))
    }

    fn exists(&self, id: &str) -> bool {
        self.local.exists(id) || self.external.as_ref().is_some_and(|e| e.exists(id))
    }

    fn ids(&self) -> Vec<String> {
        let mut ids = self.local.ids();
        if let Some(external) = &self.external {
            for id in external.ids() {
                if !ids.contains(&id) {
                    ids.push(id);
                }
            }
        }
        ids
    }
}

pub(crate) struct ContainerInner {
    weak_self: Weak<ContainerInner>,
    blueprints: Arc<CombinedSource>,
    pub(crate) classes: Arc<ClassRegistry>,
    pub(crate) merger: BlueprintMerger,
    pub(crate) instances: InstanceRegistry,
    pub(crate) graph: DependencyGraph,
    pub(crate) disposals: DisposalRegistry,
    pub(crate) chain: InterceptorChain,
    pub(crate) conversion: Arc<dyn ConversionService>,
    pub(crate) strategy: Arc<dyn InstantiationStrategy>,
    scopes: HashMap<String, Arc<dyn ComponentScope>>,
    pub(crate) ignored_autowire_tokens: HashSet<TypeId>,
    raw_injection_policy: RawInjectionPolicy,
    allow_circular: bool,
    shutting_down: AtomicBool,
}

impl ContainerInner {
    pub(crate) fn facade(&self) -> Container {
        // weak_self always upgrades: callers reach us through a live Arc.
        Container {
            inner: self.weak_self.upgrade().expect("container is alive"),
        }
    }

    pub(crate) fn blueprint_exists(&self, id: &str) -> bool {
        self.blueprints.exists(id)
    }

    pub(crate) fn blueprint_ids(&self) -> Vec<String> {
        self.blueprints.ids()
    }

    pub(crate) fn resolve_root(&self, id: &str) -> ContainerResult<Option<AnyArc>> {
        let mut ctx = CreationContext::default();
        self.resolve_component(id, &mut ctx)
    }

    pub(crate) fn resolve_component(
        &self,
        id: &str,
        ctx: &mut CreationContext,
    ) -> ContainerResult<Option<AnyArc>> {
        if ctx.in_singleton(id) {
            // Same-stack re-entry: serve the early reference if one exists.
            if let Some(early) = self.instances.get(id, self.allow_circular) {
                return Ok(Some(early));
            }
            return Err(ContainerError::CurrentlyInCreation(id.to_string()));
        }
        if ctx.in_prototype(id) {
            return Err(ContainerError::CurrentlyInCreation(id.to_string()));
        }
        if let Some(found) = self.instances.get(id, false) {
            return Ok(Some(found));
        }
        if self.shutting_down.load(Ordering::SeqCst) {
            return Err(ContainerError::CreationNotAllowed(id.to_string()));
        }

        let merged = self.merger.merged(id)?;
        let def = merged.def();
        if def.abstract_blueprint {
            return Err(ContainerError::AbstractComponent(id.to_string()));
        }

        for dep in &def.depends_on {
            if self.graph.is_dependent(id, dep) {
                return Err(ContainerError::CircularDependency(
                    id.to_string(),
                    dep.clone(),
                ));
            }
            self.graph.register(dep, id);
            self.resolve_component(dep, ctx)?;
        }

        match merged.scope().clone() {
            Scope::Singleton => {
                ctx.singletons.push(id.to_string());
                let result = self
                    .instances
                    .resolve(id, || self.create_component(id, &merged, None, ctx));
                ctx.singletons.pop();
                result.map_err(|e| e.in_creation_of(id))
            }
            Scope::Prototype => {
                ctx.prototypes.push(id.to_string());
                let result = self.create_component(id, &merged, None, ctx);
                ctx.prototypes.pop();
                result.map_err(|e| e.in_creation_of(id))
            }
            Scope::Custom(name) => {
                let scope = self.scopes.get(&name).cloned().ok_or_else(|| {
                    ContainerError::UnknownScope {
                        id: id.to_string(),
                        scope: name.clone(),
                    }
                })?;
                ctx.prototypes.push(id.to_string());
                let mut factory = || self.create_component(id, &merged, None, ctx);
                let result = scope.get(id, &mut factory);
                ctx.prototypes.pop();
                result.map_err(|e| e.in_creation_of(id))
            }
        }
    }

    fn resolve_with_args(&self, id: &str, args: &[AnyArc]) -> ContainerResult<Option<AnyArc>> {
        if self.shutting_down.load(Ordering::SeqCst) {
            return Err(ContainerError::CreationNotAllowed(id.to_string()));
        }
        let merged = self.merger.merged(id)?;
        if merged.def().abstract_blueprint {
            return Err(ContainerError::AbstractComponent(id.to_string()));
        }
        let mut ctx = CreationContext::default();
        ctx.prototypes.push(id.to_string());
        self.create_component(id, &merged, Some(args), &mut ctx)
            .map_err(|e| e.in_creation_of(id))
    }

    /// Full construction episode for one instance: instantiate, expose the
    /// early reference, populate, finalize, register disposal.
    pub(crate) fn create_component(
        &self,
        id: &str,
        merged: &Arc<MergedBlueprint>,
        explicit_args: Option<&[AnyArc]>,
        ctx: &mut CreationContext,
    ) -> ContainerResult<Option<AnyArc>> {
        debug!(component = id, "creating component");
        let def = merged.def();

        let declared_class = match &def.class_name {
            Some(name) => {
                Some(
                    self.classes
                        .get(name)
                        .ok_or_else(|| ContainerError::UnknownClass {
                            id: id.to_string(),
                            class: name.clone(),
                        })?,
                )
            }
            None => None,
        };

        if !def.synthetic && !self.chain.is_empty() {
            if let Some(class) = &declared_class {
                if let Some(shortcut) = self.chain.apply_before_construction(id, class)? {
                    // A pre-built replacement skips population and init
                    // methods; only after-initialization hooks still apply.
                    return self.chain.apply_after_initialization(id, shortcut);
                }
            }
        }

        let raw =
            self.instantiate_component(id, merged, declared_class.as_ref(), explicit_args, ctx)?;
        let class = self.class_for_instance(&raw, declared_class);

        let exposed_early = merged.is_singleton()
            && explicit_args.is_none()
            && self.allow_circular
            && self.instances.is_in_creation(id);
        if exposed_early {
            let chain = self.chain.clone();
            let wrap_id = id.to_string();
            let raw_ref = raw.clone();
            self.instances
                .add_early_factory(id, move || chain.wrap_early(&wrap_id, raw_ref));
        }

        self.populate_component(id, merged, &class, &raw, ctx)?;
        let Some(mut finished) = self.finalize_component(id, merged, &class, raw.clone())? else {
            return Ok(None);
        };

        if exposed_early {
            if let Some(early) = self.instances.peek_early(id) {
                if Arc::ptr_eq(&finished, &raw) {
                    // Dependents saw the wrapped early reference; promote it
                    // so the cache and the dependents agree.
                    finished = early;
                } else {
                    let holders = self.graph.dependents_of(id);
                    if !holders.is_empty() {
                        match self.raw_injection_policy {
                            RawInjectionPolicy::Fail => {
                                return Err(ContainerError::EarlyReferenceEscaped(id.to_string()));
                            }
                            RawInjectionPolicy::Tolerate => {
                                warn!(
                                    component = id,
                                    dependents = ?holders,
                                    "raw instance escaped to dependents before it was replaced"
                                );
                            }
                        }
                    }
                }
            }
        }

        if merged.is_singleton()
            && explicit_args.is_none()
            && DisposalHandle::worth_registering(merged, &class, &self.chain, &finished)
        {
            self.disposals.register(DisposalHandle::new(
                id,
                finished.clone(),
                merged.clone(),
                class.clone(),
                self.chain.clone(),
            ));
        }

        Ok(Some(finished))
    }

    /// The spec matching the instance's concrete type: the declared class if
    /// it matches, a spec registered for the type, or an anonymous empty one.
    pub(crate) fn class_for_instance(
        &self,
        instance: &AnyArc,
        declared: Option<Arc<ClassSpec>>,
    ) -> Arc<ClassSpec> {
        let type_id = (**instance).type_id();
        if let Some(declared) = declared {
            if declared.token().id() == type_id {
                return declared;
            }
        }
        if let Some(spec) = self.classes.spec_for_type(type_id) {
            return spec;
        }
        Arc::new(ClassSpec::anonymous(
            "<unregistered>",
            TypeToken::anonymous(type_id),
        ))
    }

    fn type_of(&self, id: &str) -> ContainerResult<TypeToken> {
        if let Some(instance) = self.instances.get(id, false) {
            return Ok(self.class_for_instance(&instance, None).token());
        }
        let merged = self.merger.merged(id)?;
        let def = merged.def();

        let host_class_name = match (&def.factory_method, &def.factory_component) {
            (Some(_), Some(component)) => self.merger.merged(component)?.def().class_name.clone(),
            _ => def.class_name.clone(),
        };
        let host_class_name = host_class_name.ok_or_else(|| ContainerError::UnknownClass {
            id: id.to_string(),
            class: "<undeclared>".to_string(),
        })?;
        let host = self
            .classes
            .get(&host_class_name)
            .ok_or_else(|| ContainerError::UnknownClass {
                id: id.to_string(),
                class: host_class_name.clone(),
            })?;

        match &def.factory_method {
            Some(method) => host
                .factory_overloads(method)
                .first()
                .map(|m| m.returns)
                .ok_or_else(|| ContainerError::MethodNotFound {
                    id: id.to_string(),
                    method: method.clone(),
                }),
            None => Ok(host.token()),
        }
    }

    fn pre_instantiate(&self) -> ContainerResult<()> {
        for id in self.blueprints.ids() {
            let merged = self.merger.merged(&id)?;
            let def = merged.def();
            if def.abstract_blueprint || def.lazy_init || !merged.is_singleton() {
                continue;
            }
            self.resolve_root(&id)?;
        }
        Ok(())
    }
}

/// The component container.
///
/// Cheap to clone; all clones share the same state. Built through
/// [`Container::builder`].
///
/// # Examples
///
/// ```rust
/// use chassis_di::{Blueprint, BlueprintValue, ClassSpec, Container, Field};
///
/// struct Greeter {
///     greeting: Field<String>,
/// }
///
/// let greeter_class = ClassSpec::builder::<Greeter>("Greeter")
///     .no_arg_constructor(|| Greeter { greeting: Field::new() })
///     .value_property("greeting", |g: &Greeter| &g.greeting)
///     .build();
///
/// let container = Container::builder()
///     .class(greeter_class)
///     .blueprint(
///         "greeter",
///         Blueprint::for_class("Greeter")
///             .prop("greeting", BlueprintValue::Str("hello".into())),
///     )
///     .build();
///
/// let greeter = container.get_as::<Greeter>("greeter")?;
/// assert_eq!(greeter.greeting.get().as_deref(), Some("hello"));
/// # Ok::<(), chassis_di::ContainerError>(())
/// ```
#[derive(Clone)]
pub struct Container {
    inner: Arc<ContainerInner>,
}

impl Container {
    /// Starts a container builder.
    pub fn builder() -> ContainerBuilder {
        ContainerBuilder::new()
    }

    /// Resolves the component registered under `id`, constructing it (and its
    /// dependencies) on first request.
    pub fn get(&self, id: &str) -> ContainerResult<AnyArc> {
        self.inner
            .resolve_root(id)?
            .ok_or_else(|| ContainerError::NoInstanceProduced(id.to_string()))
    }

    /// Resolves `id` and downcasts to the concrete type `T`.
    pub fn get_as<T: Send + Sync + 'static>(&self, id: &str) -> ContainerResult<Arc<T>> {
        self.get(id)?
            .downcast::<T>()
            .map_err(|_| ContainerError::TypeMismatch {
                id: id.to_string(),
                target: std::any::type_name::<T>().to_string(),
            })
    }

    /// Resolves `id` and coerces to `P` through the class's declared
    /// assignability, allowing trait-object targets.
    pub fn get_cast<P: ?Sized + Send + Sync + 'static>(&self, id: &str) -> ContainerResult<Arc<P>> {
        let instance = self.get(id)?;
        let class = self.inner.class_for_instance(&instance, None);
        class
            .cast_to(&instance, &TypeToken::of::<P>())
            .and_then(|handle| handle.downcast_ref::<Arc<P>>().cloned())
            .ok_or_else(|| ContainerError::TypeMismatch {
                id: id.to_string(),
                target: std::any::type_name::<P>().to_string(),
            })
    }

    /// Builds a fresh instance of `id` with explicit constructor arguments,
    /// bypassing the singleton cache. The result is never cached and never
    /// torn down by the container. Wrap arguments with
    /// [`ref_handle`](crate::ref_handle) / [`value_handle`](crate::value_handle).
    pub fn get_with_args(&self, id: &str, args: &[AnyArc]) -> ContainerResult<AnyArc> {
        self.inner
            .resolve_with_args(id, args)?
            .ok_or_else(|| ContainerError::NoInstanceProduced(id.to_string()))
    }

    /// Whether a blueprint or registered instance exists under `id`.
    pub fn contains(&self, id: &str) -> bool {
        self.inner.blueprints.exists(id) || self.inner.instances.contains(id)
    }

    /// Whether `id` resolves to a shared singleton.
    pub fn is_singleton(&self, id: &str) -> ContainerResult<bool> {
        if self.inner.blueprints.exists(id) {
            return Ok(self.inner.merger.merged(id)?.is_singleton());
        }
        if self.inner.instances.contains(id) {
            return Ok(true);
        }
        Err(ContainerError::NoSuchComponent(id.to_string()))
    }

    /// Whether `id` resolves to a fresh instance per request.
    pub fn is_prototype(&self, id: &str) -> ContainerResult<bool> {
        if self.inner.blueprints.exists(id) {
            return Ok(self.inner.merger.merged(id)?.is_prototype());
        }
        if self.inner.instances.contains(id) {
            return Ok(false);
        }
        Err(ContainerError::NoSuchComponent(id.to_string()))
    }

    /// The type `id` would produce, determined without instantiating it.
    pub fn type_of(&self, id: &str) -> ContainerResult<TypeToken> {
        self.inner.type_of(id)
    }

    /// Registers (or replaces) a blueprint at runtime, invalidating any
    /// merged entry for `id`.
    pub fn register_blueprint(&self, id: impl Into<String>, blueprint: Blueprint) {
        let id = id.into();
        self.inner.blueprints.local.register(id.clone(), blueprint);
        self.inner.merger.clear(&id);
    }

    /// Registers a class spec at runtime.
    pub fn register_class(&self, spec: Arc<ClassSpec>) {
        self.inner.classes.register(spec);
    }

    /// Registers a pre-built instance as a finished singleton. The instance
    /// gets no population, lifecycle hooks, or teardown.
    pub fn register_instance(&self, id: &str, instance: AnyArc) {
        self.inner.instances.add_finished(id, instance);
    }

    /// Drops every memoized merged blueprint.
    pub fn clear_merged(&self) {
        self.inner.merger.clear_all();
    }

    /// The merged blueprint for `id`. Repeated calls return the same shared
    /// entry until invalidated.
    pub fn merged_blueprint(&self, id: &str) -> ContainerResult<Arc<MergedBlueprint>> {
        self.inner.merger.merged(id)
    }

    /// Eagerly instantiates every non-lazy singleton blueprint, in
    /// registration order. Fails on the first broken component.
    pub fn pre_instantiate(&self) -> ContainerResult<()> {
        self.inner.pre_instantiate()
    }

    /// Tears down `id` and everything depending on it, dependents first.
    pub fn destroy(&self, id: &str) {
        self.inner
            .disposals
            .destroy(id, &self.inner.graph, &self.inner.instances);
    }

    /// Tears down every singleton in reverse registration order. Further
    /// lookups of uncached components fail with
    /// [`ContainerError::CreationNotAllowed`]. Destroy failures are logged
    /// and swallowed.
    pub fn shutdown(&self) {
        self.inner.shutting_down.store(true, Ordering::SeqCst);
        self.inner
            .disposals
            .shutdown(&self.inner.graph, &self.inner.instances);
    }
}

/// Configures and builds a [`Container`].
pub struct ContainerBuilder {
    classes: ClassRegistry,
    local: SimpleBlueprintRegistry,
    external: Option<Arc<dyn BlueprintSource>>,
    interceptors: Vec<Arc<dyn ComponentInterceptor>>,
    conversion: Option<Arc<dyn ConversionService>>,
    strategy: Option<Arc<dyn InstantiationStrategy>>,
    scopes: HashMap<String, Arc<dyn ComponentScope>>,
    ignored_autowire_tokens: HashSet<TypeId>,
    raw_injection_policy: RawInjectionPolicy,
    allow_circular: bool,
    merge_caching: bool,
}

impl Default for ContainerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ContainerBuilder {
    fn new() -> Self {
        let mut ignored_autowire_tokens = HashSet::new();
        // Container handles are injected via the aware callback, never
        // autowired.
        ignored_autowire_tokens.insert(TypeId::of::<Container>());
        Self {
            classes: ClassRegistry::new(),
            local: SimpleBlueprintRegistry::new(),
            external: None,
            interceptors: Vec::new(),
            conversion: None,
            strategy: None,
            scopes: HashMap::new(),
            ignored_autowire_tokens,
            raw_injection_policy: RawInjectionPolicy::default(),
            allow_circular: true,
            merge_caching: true,
        }
    }

    /// Registers a class spec.
    pub fn class(self, spec: Arc<ClassSpec>) -> Self {
        self.classes.register(spec);
        self
    }

    /// Registers a blueprint under `id`.
    pub fn blueprint(self, id: impl Into<String>, blueprint: Blueprint) -> Self {
        self.local.register(id, blueprint);
        self
    }

    /// Layers the container over an external blueprint source. Local
    /// registrations shadow it.
    pub fn external_source(mut self, source: Arc<dyn BlueprintSource>) -> Self {
        self.external = Some(source);
        self
    }

    /// Appends an interceptor to the chain.
    pub fn interceptor(mut self, interceptor: Arc<dyn ComponentInterceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    /// Replaces the default [`StandardConversions`].
    pub fn conversion_service(mut self, service: Arc<dyn ConversionService>) -> Self {
        self.conversion = Some(service);
        self
    }

    /// Replaces the default [`DirectInstantiation`] strategy.
    pub fn instantiation_strategy(mut self, strategy: Arc<dyn InstantiationStrategy>) -> Self {
        self.strategy = Some(strategy);
        self
    }

    /// Registers a custom scope under `name`.
    pub fn scope(mut self, name: impl Into<String>, scope: Arc<dyn ComponentScope>) -> Self {
        self.scopes.insert(name.into(), scope);
        self
    }

    /// Exempts a type from by-name and by-type autowiring.
    pub fn ignore_autowire_type<T: ?Sized + 'static>(mut self) -> Self {
        self.ignored_autowire_tokens.insert(TypeId::of::<T>());
        self
    }

    /// Sets the policy for escaped raw early references.
    pub fn raw_injection_policy(mut self, policy: RawInjectionPolicy) -> Self {
        self.raw_injection_policy = policy;
        self
    }

    /// Disables circular reference resolution: cycles fail instead of being
    /// served early references.
    pub fn forbid_circular_references(mut self) -> Self {
        self.allow_circular = false;
        self
    }

    /// Disables merged-blueprint memoization.
    pub fn without_merge_caching(mut self) -> Self {
        self.merge_caching = false;
        self
    }

    /// Builds the container.
    pub fn build(self) -> Container {
        let chain = InterceptorChain::new(self.interceptors);
        let blueprints = Arc::new(CombinedSource {
            local: self.local,
            external: self.external,
        });
        let merger = BlueprintMerger::new(
            blueprints.clone() as Arc<dyn BlueprintSource>,
            chain.clone(),
            self.merge_caching,
        );
        let inner = Arc::new_cyclic(|weak_self| ContainerInner {
            weak_self: weak_self.clone(),
            blueprints,
            classes: Arc::new(self.classes),
            merger,
            instances: InstanceRegistry::new(),
            graph: DependencyGraph::new(),
            disposals: DisposalRegistry::new(),
            chain,
            conversion: self
                .conversion
                .unwrap_or_else(|| Arc::new(StandardConversions::new())),
            strategy: self
                .strategy
                .unwrap_or_else(|| Arc::new(DirectInstantiation)),
            scopes: self.scopes,
            ignored_autowire_tokens: self.ignored_autowire_tokens,
            raw_injection_policy: self.raw_injection_policy,
            allow_circular: self.allow_circular,
            shutting_down: AtomicBool::new(false),
        });
        Container { inner }
    }
}
