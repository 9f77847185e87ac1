//! Declarative component blueprints and their registration source.
//!
//! A [`Blueprint`] describes how to build one component: its class, scope,
//! constructor arguments, property assignments, lifecycle method names, and
//! wiring hints. Blueprints are immutable once merged; the container resolves
//! them lazily through the [`BlueprintMerger`](crate::merge::BlueprintMerger).

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use once_cell::sync::OnceCell;

use crate::token::AnyArc;

/// Sentinel destroy-method name asking the container to infer one by
/// convention (`close`, then `shutdown`); a missing candidate is a silent
/// no-op at teardown.
pub const DESTROY_METHOD_INFERRED: &str = "(inferred)";

/// Component scope controlling instance caching behavior.
///
/// # Scope characteristics
///
/// - **Singleton**: one shared instance per identifier, cached in the
///   container until teardown
/// - **Prototype**: a fresh instance per request, never cached and never torn
///   down by the container
/// - **Custom**: delegated to a [`ComponentScope`](crate::scope::ComponentScope)
///   registered under the given name
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Scope {
    /// One shared instance per identifier.
    Singleton,
    /// A fresh instance per resolution request.
    Prototype,
    /// A named custom scope registered on the container builder.
    Custom(String),
}

impl Scope {
    /// Whether this is the singleton scope.
    pub fn is_singleton(&self) -> bool {
        matches!(self, Scope::Singleton)
    }

    /// Whether this is the prototype scope.
    pub fn is_prototype(&self) -> bool {
        matches!(self, Scope::Prototype)
    }
}

/// Autowire mode for a blueprint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum AutowireMode {
    /// No automatic wiring; only explicit values apply.
    #[default]
    Off,
    /// Unset reference properties are matched against component identifiers.
    ByName,
    /// Unset reference properties are matched against declared types.
    ByType,
    /// Constructor parameters are resolved against the container.
    Constructor,
}

/// Dependency-check level enforced after population.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum DependencyCheck {
    /// No enforcement.
    #[default]
    Off,
    /// Non-reference (value) properties must end up set.
    Simple,
    /// Reference properties must end up set.
    Objects,
    /// All properties must end up set.
    All,
}

/// A configured value in a blueprint: a literal, a reference to another
/// component, a nested blueprint, or a pre-built instance.
#[derive(Clone)]
pub enum BlueprintValue {
    /// Explicit null; never convertible.
    Null,
    /// Boolean literal.
    Bool(bool),
    /// Integer literal, convertible to the common integer widths.
    Int(i64),
    /// Floating-point literal.
    Float(f64),
    /// String literal, convertible to `String` or parseable targets.
    Str(String),
    /// Reference to another component by identifier; resolved recursively.
    Ref(String),
    /// Homogeneous list of values.
    List(Vec<BlueprintValue>),
    /// Anonymous nested blueprint, built as a contained component.
    Inner(Arc<Blueprint>),
    /// A pre-built instance passed through as-is.
    Instance(AnyArc),
}

impl BlueprintValue {
    /// Whether the value is statically known, i.e. safe to cache after
    /// conversion. References and nested blueprints are dynamic.
    pub fn is_static(&self) -> bool {
        match self {
            BlueprintValue::Ref(_) | BlueprintValue::Inner(_) => false,
            BlueprintValue::List(items) => items.iter().all(BlueprintValue::is_static),
            _ => true,
        }
    }
}

impl PartialEq for BlueprintValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (BlueprintValue::Null, BlueprintValue::Null) => true,
            (BlueprintValue::Bool(a), BlueprintValue::Bool(b)) => a == b,
            (BlueprintValue::Int(a), BlueprintValue::Int(b)) => a == b,
            (BlueprintValue::Float(a), BlueprintValue::Float(b)) => a == b,
            (BlueprintValue::Str(a), BlueprintValue::Str(b)) => a == b,
            (BlueprintValue::Ref(a), BlueprintValue::Ref(b)) => a == b,
            (BlueprintValue::List(a), BlueprintValue::List(b)) => a == b,
            // Nested blueprints and instances compare by identity.
            (BlueprintValue::Inner(a), BlueprintValue::Inner(b)) => Arc::ptr_eq(a, b),
            (BlueprintValue::Instance(a), BlueprintValue::Instance(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for BlueprintValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlueprintValue::Null => write!(f, "Null"),
            BlueprintValue::Bool(v) => write!(f, "Bool({v})"),
            BlueprintValue::Int(v) => write!(f, "Int({v})"),
            BlueprintValue::Float(v) => write!(f, "Float({v})"),
            BlueprintValue::Str(v) => write!(f, "Str({v:?})"),
            BlueprintValue::Ref(id) => write!(f, "Ref({id})"),
            BlueprintValue::List(items) => f.debug_tuple("List").field(items).finish(),
            BlueprintValue::Inner(bp) => write!(
                f,
                "Inner({})",
                bp.class_name.as_deref().unwrap_or("<no class>")
            ),
            BlueprintValue::Instance(_) => write!(f, "Instance(..)"),
        }
    }
}

/// One property assignment on a blueprint.
///
/// Carries a per-assignment conversion cache: once a statically known value
/// has been converted to the property's declared type, the result is reused
/// across prototype instances.
#[derive(Clone)]
pub struct PropertyAssignment {
    /// Property name, matched against the class's property specs.
    pub name: String,
    /// The configured value.
    pub value: BlueprintValue,
    pub(crate) converted: Arc<OnceCell<AnyArc>>,
}

impl PropertyAssignment {
    /// Creates an assignment of `value` to the property `name`.
    pub fn new(name: impl Into<String>, value: BlueprintValue) -> Self {
        Self {
            name: name.into(),
            value,
            converted: Arc::new(OnceCell::new()),
        }
    }
}

impl fmt::Debug for PropertyAssignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyAssignment")
            .field("name", &self.name)
            .field("value", &self.value)
            .finish()
    }
}

/// One declared constructor argument, matched by index, by parameter name, or
/// positionally.
#[derive(Clone, Debug)]
pub struct ConstructorArg {
    /// Explicit zero-based parameter index, if declared.
    pub index: Option<usize>,
    /// Parameter name to match, if declared.
    pub name: Option<String>,
    /// The configured value.
    pub value: BlueprintValue,
}

/// Declarative description of one component.
///
/// Built with the fluent methods on [`Blueprint::for_class`] /
/// [`Blueprint::child_of`] and registered on the
/// [`ContainerBuilder`](crate::container::ContainerBuilder) or at runtime via
/// [`Container::register_blueprint`](crate::Container::register_blueprint).
///
/// # Examples
///
/// ```rust
/// use chassis_di::{AutowireMode, Blueprint, BlueprintValue};
///
/// let bp = Blueprint::for_class("AppService")
///     .autowire(AutowireMode::ByType)
///     .prop("label", BlueprintValue::Str("orders".into()))
///     .init_method("start")
///     .depends_on(["config"]);
/// assert!(bp.scope.is_none()); // defaults to singleton at merge time
/// ```
#[derive(Clone, Debug, Default)]
pub struct Blueprint {
    /// Name of the class spec to instantiate (or hosting static factory
    /// methods). May be unset on abstract parents and factory-component
    /// blueprints.
    pub class_name: Option<String>,
    /// Declared scope; defaults to singleton on the merged form.
    pub scope: Option<Scope>,
    /// Skip this component during eager pre-instantiation.
    pub lazy_init: bool,
    /// Abstract blueprints exist only to be merged into children.
    pub abstract_blueprint: bool,
    /// Synthetic blueprints bypass the interceptor chain.
    pub synthetic: bool,
    /// Parent blueprint identifier for configuration inheritance.
    pub parent: Option<String>,
    /// Identifier of the component hosting the factory method.
    pub factory_component: Option<String>,
    /// Factory-method name; takes priority over constructor resolution.
    pub factory_method: Option<String>,
    /// Declared constructor arguments.
    pub constructor_args: Vec<ConstructorArg>,
    /// Declared property assignments.
    pub property_values: Vec<PropertyAssignment>,
    /// Configured initialization method name.
    pub init_method: Option<String>,
    /// Whether a missing init method is fatal.
    pub enforce_init_method: bool,
    /// Whether the init method is invoked by an external party.
    pub init_externally_managed: bool,
    /// Configured destroy method name; may be [`DESTROY_METHOD_INFERRED`].
    pub destroy_method: Option<String>,
    /// Autowire mode.
    pub autowire: AutowireMode,
    /// Dependency-check level.
    pub dependency_check: DependencyCheck,
    /// Identifiers that must be fully resolved before this component.
    pub depends_on: Vec<String>,
    /// Marks this component as the preferred autowire candidate.
    pub primary: bool,
    /// Qualifier strings used to break by-type autowire ties.
    pub qualifiers: Vec<String>,
    /// Whether this component participates in by-type autowiring.
    pub autowire_candidate: bool,
    /// Whether constructor-resolution ties pick the first declared candidate
    /// instead of failing.
    pub lenient_matching: bool,
}

impl Blueprint {
    /// Starts a blueprint for the named class.
    pub fn for_class(class_name: impl Into<String>) -> Self {
        Self {
            class_name: Some(class_name.into()),
            autowire_candidate: true,
            ..Self::default()
        }
    }

    /// Starts a blueprint produced by a factory method on another component.
    pub fn produced_by(component: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            factory_component: Some(component.into()),
            factory_method: Some(method.into()),
            autowire_candidate: true,
            ..Self::default()
        }
    }

    /// Starts a child blueprint inheriting from `parent`.
    pub fn child_of(parent: impl Into<String>) -> Self {
        Self {
            parent: Some(parent.into()),
            autowire_candidate: true,
            ..Self::default()
        }
    }

    /// Declares singleton scope (the merged default).
    pub fn singleton(mut self) -> Self {
        self.scope = Some(Scope::Singleton);
        self
    }

    /// Declares prototype scope.
    pub fn prototype(mut self) -> Self {
        self.scope = Some(Scope::Prototype);
        self
    }

    /// Declares a custom scope by name.
    pub fn scoped(mut self, scope_name: impl Into<String>) -> Self {
        self.scope = Some(Scope::Custom(scope_name.into()));
        self
    }

    /// Marks the blueprint abstract: usable only as a parent.
    pub fn abstract_only(mut self) -> Self {
        self.abstract_blueprint = true;
        self
    }

    /// Marks the blueprint synthetic, bypassing interceptors.
    pub fn synthetic(mut self) -> Self {
        self.synthetic = true;
        self
    }

    /// Defers instantiation until first request even during eager
    /// pre-instantiation.
    pub fn lazy(mut self) -> Self {
        self.lazy_init = true;
        self
    }

    /// Assigns `value` to the property `name`.
    pub fn prop(mut self, name: impl Into<String>, value: BlueprintValue) -> Self {
        self.property_values.push(PropertyAssignment::new(name, value));
        self
    }

    /// Assigns a reference to another component to the property `name`.
    pub fn prop_ref(self, name: impl Into<String>, target: impl Into<String>) -> Self {
        self.prop(name, BlueprintValue::Ref(target.into()))
    }

    /// Appends a positional constructor argument.
    pub fn ctor_arg(mut self, value: BlueprintValue) -> Self {
        self.constructor_args.push(ConstructorArg {
            index: None,
            name: None,
            value,
        });
        self
    }

    /// Appends a constructor argument bound to a parameter name.
    pub fn named_ctor_arg(mut self, name: impl Into<String>, value: BlueprintValue) -> Self {
        self.constructor_args.push(ConstructorArg {
            index: None,
            name: Some(name.into()),
            value,
        });
        self
    }

    /// Appends a constructor argument bound to a parameter index.
    pub fn indexed_ctor_arg(mut self, index: usize, value: BlueprintValue) -> Self {
        self.constructor_args.push(ConstructorArg {
            index: Some(index),
            name: None,
            value,
        });
        self
    }

    /// Names the factory method used to produce the instance.
    pub fn factory_method(mut self, name: impl Into<String>) -> Self {
        self.factory_method = Some(name.into());
        self
    }

    /// Names the component hosting the factory method.
    pub fn factory_component(mut self, id: impl Into<String>) -> Self {
        self.factory_component = Some(id.into());
        self
    }

    /// Configures the initialization method.
    pub fn init_method(mut self, name: impl Into<String>) -> Self {
        self.init_method = Some(name.into());
        self
    }

    /// Makes a missing configured init method fatal.
    pub fn enforce_init_method(mut self) -> Self {
        self.enforce_init_method = true;
        self
    }

    /// Marks the init method as externally managed (never invoked here).
    pub fn init_externally_managed(mut self) -> Self {
        self.init_externally_managed = true;
        self
    }

    /// Configures the destroy method.
    pub fn destroy_method(mut self, name: impl Into<String>) -> Self {
        self.destroy_method = Some(name.into());
        self
    }

    /// Asks the container to infer a destroy method by convention.
    pub fn infer_destroy_method(mut self) -> Self {
        self.destroy_method = Some(DESTROY_METHOD_INFERRED.to_string());
        self
    }

    /// Sets the autowire mode.
    pub fn autowire(mut self, mode: AutowireMode) -> Self {
        self.autowire = mode;
        self
    }

    /// Sets the dependency-check level.
    pub fn dependency_check(mut self, check: DependencyCheck) -> Self {
        self.dependency_check = check;
        self
    }

    /// Declares identifiers that must resolve before this component.
    pub fn depends_on<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on.extend(ids.into_iter().map(Into::into));
        self
    }

    /// Marks this component primary among by-type autowire candidates.
    pub fn primary(mut self) -> Self {
        self.primary = true;
        self
    }

    /// Adds a qualifier string.
    pub fn qualifier(mut self, qualifier: impl Into<String>) -> Self {
        self.qualifiers.push(qualifier.into());
        self
    }

    /// Excludes this component from by-type autowiring.
    pub fn not_autowire_candidate(mut self) -> Self {
        self.autowire_candidate = false;
        self
    }

    /// Resolves constructor ties to the first declared candidate instead of
    /// failing with an ambiguity error.
    pub fn lenient(mut self) -> Self {
        self.lenient_matching = true;
        self
    }
}

/// Lookup contract consumed by the blueprint merger.
///
/// The textual/structural front end that parses definitions into blueprints
/// lives behind this trait; the container only reads from it.
pub trait BlueprintSource: Send + Sync {
    /// Returns the blueprint registered under `id`, if any.
    fn get(&self, id: &str) -> Option<Arc<Blueprint>>;
    /// Whether a blueprint is registered under `id`.
    fn exists(&self, id: &str) -> bool;
    /// All registered identifiers, in registration order. Used for by-type
    /// candidate scans and eager pre-instantiation.
    fn ids(&self) -> Vec<String>;
}

/// In-memory [`BlueprintSource`] keeping registration order.
#[derive(Default)]
pub struct SimpleBlueprintRegistry {
    state: RwLock<RegistryState>,
}

#[derive(Default)]
struct RegistryState {
    map: HashMap<String, Arc<Blueprint>>,
    order: Vec<String>,
}

impl SimpleBlueprintRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) a blueprint under `id`.
    pub fn register(&self, id: impl Into<String>, blueprint: Blueprint) {
        let id = id.into();
        let mut state = self.state.write().unwrap();
        if state.map.insert(id.clone(), Arc::new(blueprint)).is_none() {
            state.order.push(id);
        }
    }
}

impl BlueprintSource for SimpleBlueprintRegistry {
    fn get(&self, id: &str) -> Option<Arc<Blueprint>> {
        self.state.read().unwrap().map.get(id).cloned()
    }

    fn exists(&self, id: &str) -> bool {
        self.state.read().unwrap().map.contains_key(id)
    }

    fn ids(&self) -> Vec<String> {
        self.state.read().unwrap().order.clone()
    }
}
