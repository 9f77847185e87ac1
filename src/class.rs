//! Per-type capability tables standing in for reflection.
//!
//! A [`ClassSpec`] records everything the container may do with one concrete
//! type: which constructors and factory methods produce it, which properties
//! can be assigned after construction, which no-arg methods are invocable by
//! name, and which trait-object types an instance is assignable to. Specs are
//! registered once per type in a [`ClassRegistry`] and shared.
//!
//! Reference values travel as an [`AnyArc`] wrapping an `Arc<P>` handle, for
//! sized and trait-object `P` alike. [`ref_arg`] and [`value_arg`] unwrap
//! constructor and factory arguments inside invoke closures; [`ref_handle`]
//! wraps explicit caller-supplied arguments the same way.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use once_cell::sync::OnceCell;

use crate::error::{ContainerError, ContainerResult};
use crate::lifecycle::{
    ClassRegistryAware, ComponentIdAware, ContainerAware, Dispose, Initializable,
};
use crate::token::{AnyArc, TypeToken};

/// Coerces a stored instance into a type-erased `Arc<P>` handle.
pub type CasterFn = Arc<dyn Fn(&AnyArc) -> Option<AnyArc> + Send + Sync>;

type CapCaster<C> = Arc<dyn Fn(&AnyArc) -> Option<Arc<C>> + Send + Sync>;
type MethodFn = Arc<dyn Fn(&AnyArc) -> ContainerResult<()> + Send + Sync>;

/// One constructor or factory-method parameter.
#[derive(Clone, Debug)]
pub struct ParamSpec {
    /// Parameter name, matched against named constructor arguments.
    pub name: &'static str,
    /// Declared parameter type.
    pub ty: TypeToken,
    /// Whether the parameter takes a component reference rather than a value.
    pub reference: bool,
}

impl ParamSpec {
    /// Declares a reference parameter of handle type `Arc<P>`.
    pub fn reference<P: ?Sized + 'static>(name: &'static str) -> Self {
        Self {
            name,
            ty: TypeToken::of::<P>(),
            reference: true,
        }
    }

    /// Declares a value parameter of type `V`.
    pub fn value<V: 'static>(name: &'static str) -> Self {
        Self {
            name,
            ty: TypeToken::of::<V>(),
            reference: false,
        }
    }
}

/// One constructor: parameter list plus an invoke closure taking resolved
/// arguments in declaration order.
#[derive(Clone)]
pub struct ConstructorSpec {
    pub params: Vec<ParamSpec>,
    pub(crate) invoke: Arc<dyn Fn(&[AnyArc]) -> ContainerResult<AnyArc> + Send + Sync>,
}

impl ConstructorSpec {
    /// Invokes the constructor with resolved arguments in declaration order.
    pub fn instantiate(&self, args: &[AnyArc]) -> ContainerResult<AnyArc> {
        (self.invoke)(args)
    }
}

/// One factory method, static on the class or instance-bound on a factory
/// component.
#[derive(Clone)]
pub struct FactoryMethodSpec {
    pub name: &'static str,
    pub params: Vec<ParamSpec>,
    /// Type of the produced instance.
    pub returns: TypeToken,
    /// Static methods take no receiver.
    pub is_static: bool,
    pub(crate) invoke:
        Arc<dyn Fn(Option<&AnyArc>, &[AnyArc]) -> ContainerResult<AnyArc> + Send + Sync>,
}

impl FactoryMethodSpec {
    /// Invokes the factory method. Static methods ignore the receiver.
    pub fn produce(&self, receiver: Option<&AnyArc>, args: &[AnyArc]) -> ContainerResult<AnyArc> {
        (self.invoke)(receiver, args)
    }
}

/// One settable property: declared type, setter, and a set-state probe used by
/// autowiring and dependency checks.
#[derive(Clone)]
pub struct PropertySpec {
    pub name: &'static str,
    pub ty: TypeToken,
    /// Reference properties receive `Arc<P>` handles, value properties plain
    /// converted values.
    pub reference: bool,
    pub(crate) set: Arc<dyn Fn(&AnyArc, AnyArc) -> ContainerResult<()> + Send + Sync>,
    pub(crate) is_set: Arc<dyn Fn(&AnyArc) -> bool + Send + Sync>,
}

#[derive(Clone, Default)]
pub(crate) struct Capabilities {
    pub(crate) component_id_aware: Option<CapCaster<dyn ComponentIdAware>>,
    pub(crate) container_aware: Option<CapCaster<dyn ContainerAware>>,
    pub(crate) class_registry_aware: Option<CapCaster<dyn ClassRegistryAware>>,
    pub(crate) initializable: Option<CapCaster<dyn Initializable>>,
    pub(crate) disposable: Option<CapCaster<dyn Dispose>>,
}

/// Capability table for one concrete type.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use chassis_di::{ClassSpec, ParamSpec, Slot, ref_arg};
///
/// trait Greeter: Send + Sync {
///     fn greet(&self) -> String;
/// }
///
/// struct English;
/// impl Greeter for English {
///     fn greet(&self) -> String { "hello".into() }
/// }
///
/// struct App {
///     greeter: Slot<dyn Greeter>,
/// }
///
/// let english = ClassSpec::builder::<English>("English")
///     .no_arg_constructor(|| English)
///     .implements::<dyn Greeter>(|this| this)
///     .build();
///
/// let app = ClassSpec::builder::<App>("App")
///     .constructor(vec![ParamSpec::reference::<dyn Greeter>("greeter")], |args| {
///         let app = App { greeter: Slot::new() };
///         app.greeter.set(ref_arg::<dyn Greeter>(args, 0)?);
///         Ok(app)
///     })
///     .build();
///
/// assert_eq!(english.name(), "English");
/// assert_eq!(app.constructors().len(), 1);
/// ```
pub struct ClassSpec {
    name: String,
    token: TypeToken,
    constructors: Vec<ConstructorSpec>,
    factory_methods: Vec<FactoryMethodSpec>,
    properties: Vec<PropertySpec>,
    methods: HashMap<&'static str, MethodFn>,
    assignable: HashMap<TypeId, CasterFn>,
    pub(crate) capabilities: Capabilities,
}

impl ClassSpec {
    /// Starts a builder for the concrete type `T` under the given class name.
    pub fn builder<T: Send + Sync + 'static>(name: impl Into<String>) -> ClassSpecBuilder<T> {
        ClassSpecBuilder::new(name.into())
    }

    /// A spec with no declared capabilities, synthesized for instances whose
    /// type was never registered.
    pub(crate) fn anonymous(name: impl Into<String>, token: TypeToken) -> Self {
        Self {
            name: name.into(),
            token,
            constructors: Vec::new(),
            factory_methods: Vec::new(),
            properties: Vec::new(),
            methods: HashMap::new(),
            assignable: HashMap::new(),
            capabilities: Capabilities::default(),
        }
    }

    /// The registered class name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Token of the concrete type.
    pub fn token(&self) -> TypeToken {
        self.token
    }

    /// Declared constructors, in declaration order.
    pub fn constructors(&self) -> &[ConstructorSpec] {
        &self.constructors
    }

    /// Declared factory methods.
    pub fn factory_methods(&self) -> &[FactoryMethodSpec] {
        &self.factory_methods
    }

    /// Factory-method overloads sharing the given name.
    pub fn factory_overloads(&self, name: &str) -> Vec<&FactoryMethodSpec> {
        self.factory_methods
            .iter()
            .filter(|m| m.name == name)
            .collect()
    }

    /// Declared settable properties.
    pub fn properties(&self) -> &[PropertySpec] {
        &self.properties
    }

    /// Looks up one property by name.
    pub fn property(&self, name: &str) -> Option<&PropertySpec> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Whether a no-arg method of the given name is invocable.
    pub fn has_method(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    /// Invokes a declared no-arg method on the instance.
    pub fn invoke_method(&self, instance: &AnyArc, name: &str) -> ContainerResult<()> {
        match self.methods.get(name) {
            Some(f) => f(instance),
            None => Err(ContainerError::MethodNotFound {
                id: self.name.clone(),
                method: name.to_string(),
            }),
        }
    }

    /// Whether instances are assignable to the given type token.
    pub fn assignable_to(&self, ty: &TypeToken) -> bool {
        self.assignable.contains_key(&ty.id())
    }

    /// Coerces a stored instance into a handle for the given type token.
    pub fn cast_to(&self, instance: &AnyArc, ty: &TypeToken) -> Option<AnyArc> {
        self.assignable.get(&ty.id()).and_then(|c| c(instance))
    }
}

/// Fluent builder for [`ClassSpec`], parameterized by the concrete type.
pub struct ClassSpecBuilder<T: Send + Sync + 'static> {
    spec: ClassSpec,
    _marker: std::marker::PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> ClassSpecBuilder<T> {
    fn new(name: String) -> Self {
        let mut assignable: HashMap<TypeId, CasterFn> = HashMap::new();
        // Instances are always assignable to their own concrete type.
        assignable.insert(
            TypeId::of::<T>(),
            Arc::new(|any: &AnyArc| {
                any.clone()
                    .downcast::<T>()
                    .ok()
                    .map(|t| Arc::new(t) as AnyArc)
            }),
        );
        Self {
            spec: ClassSpec {
                name,
                token: TypeToken::of::<T>(),
                constructors: Vec::new(),
                factory_methods: Vec::new(),
                properties: Vec::new(),
                methods: HashMap::new(),
                assignable,
                capabilities: Capabilities::default(),
            },
            _marker: std::marker::PhantomData,
        }
    }

    /// Declares a parameterless constructor.
    pub fn no_arg_constructor(self, f: impl Fn() -> T + Send + Sync + 'static) -> Self {
        self.constructor(Vec::new(), move |_| Ok(f()))
    }

    /// Declares a constructor with the given parameters. The closure receives
    /// resolved arguments in declaration order; unwrap them with [`ref_arg`]
    /// and [`value_arg`].
    pub fn constructor(
        mut self,
        params: Vec<ParamSpec>,
        f: impl Fn(&[AnyArc]) -> ContainerResult<T> + Send + Sync + 'static,
    ) -> Self {
        self.spec.constructors.push(ConstructorSpec {
            params,
            invoke: Arc::new(move |args| Ok(Arc::new(f(args)?) as AnyArc)),
        });
        self
    }

    /// Declares a static factory method producing `R`.
    pub fn static_factory<R: Send + Sync + 'static>(
        mut self,
        name: &'static str,
        params: Vec<ParamSpec>,
        f: impl Fn(&[AnyArc]) -> ContainerResult<R> + Send + Sync + 'static,
    ) -> Self {
        self.spec.factory_methods.push(FactoryMethodSpec {
            name,
            params,
            returns: TypeToken::of::<R>(),
            is_static: true,
            invoke: Arc::new(move |_recv, args| Ok(Arc::new(f(args)?) as AnyArc)),
        });
        self
    }

    /// Declares an instance factory method on `T` producing `R`.
    pub fn instance_factory<R: Send + Sync + 'static>(
        mut self,
        name: &'static str,
        params: Vec<ParamSpec>,
        f: impl Fn(&T, &[AnyArc]) -> ContainerResult<R> + Send + Sync + 'static,
    ) -> Self {
        let class = self.spec.name.clone();
        self.spec.factory_methods.push(FactoryMethodSpec {
            name,
            params,
            returns: TypeToken::of::<R>(),
            is_static: false,
            invoke: Arc::new(move |recv, args| {
                let recv = recv.ok_or_else(|| ContainerError::MethodNotFound {
                    id: class.clone(),
                    method: name.to_string(),
                })?;
                let this = recv
                    .downcast_ref::<T>()
                    .ok_or_else(|| ContainerError::TypeMismatch {
                        id: class.clone(),
                        target: std::any::type_name::<T>().to_string(),
                    })?;
                Ok(Arc::new(f(this, args)?) as AnyArc)
            }),
        });
        self
    }

    /// Declares a reference property backed by a [`Slot`] cell.
    pub fn ref_property<P: ?Sized + Send + Sync + 'static>(
        mut self,
        name: &'static str,
        accessor: impl Fn(&T) -> &Slot<P> + Send + Sync + Copy + 'static,
    ) -> Self {
        let class = self.spec.name.clone();
        self.spec.properties.push(PropertySpec {
            name,
            ty: TypeToken::of::<P>(),
            reference: true,
            set: Arc::new(move |this, value| {
                let t = downcast_this::<T>(this, &class)?;
                let handle =
                    value
                        .downcast::<Arc<P>>()
                        .map_err(|_| ContainerError::TypeMismatch {
                            id: std::any::type_name::<T>().to_string(),
                            target: std::any::type_name::<P>().to_string(),
                        })?;
                accessor(t).set((*handle).clone());
                Ok(())
            }),
            is_set: Arc::new(move |this| {
                this.downcast_ref::<T>()
                    .map(|t| accessor(t).is_set())
                    .unwrap_or(false)
            }),
        });
        self
    }

    /// Declares a value property backed by a [`Field`] cell.
    pub fn value_property<V: Clone + Send + Sync + 'static>(
        mut self,
        name: &'static str,
        accessor: impl Fn(&T) -> &Field<V> + Send + Sync + Copy + 'static,
    ) -> Self {
        let class = self.spec.name.clone();
        self.spec.properties.push(PropertySpec {
            name,
            ty: TypeToken::of::<V>(),
            reference: false,
            set: Arc::new(move |this, value| {
                let t = downcast_this::<T>(this, &class)?;
                let value =
                    value
                        .downcast::<V>()
                        .map_err(|_| ContainerError::TypeMismatch {
                            id: std::any::type_name::<T>().to_string(),
                            target: std::any::type_name::<V>().to_string(),
                        })?;
                accessor(t).set((*value).clone());
                Ok(())
            }),
            is_set: Arc::new(move |this| {
                this.downcast_ref::<T>()
                    .map(|t| accessor(t).is_set())
                    .unwrap_or(false)
            }),
        });
        self
    }

    /// Declares assignability to `P` via an explicit coercion.
    pub fn implements<P: ?Sized + Send + Sync + 'static>(
        mut self,
        cast: impl Fn(Arc<T>) -> Arc<P> + Send + Sync + 'static,
    ) -> Self {
        self.spec.assignable.insert(
            TypeId::of::<P>(),
            Arc::new(move |any: &AnyArc| {
                any.clone()
                    .downcast::<T>()
                    .ok()
                    .map(|t| Arc::new(cast(t)) as AnyArc)
            }),
        );
        self
    }

    /// Declares an invocable no-arg method, usable as a configured init or
    /// destroy method.
    pub fn method(
        mut self,
        name: &'static str,
        f: impl Fn(&T) -> ContainerResult<()> + Send + Sync + 'static,
    ) -> Self {
        let class = self.spec.name.clone();
        self.spec.methods.insert(
            name,
            Arc::new(move |this| f(downcast_this::<T>(this, &class)?)),
        );
        self
    }

    /// Declares that instances receive their component identifier.
    pub fn component_id_aware(mut self) -> Self
    where
        T: ComponentIdAware,
    {
        self.spec.capabilities.component_id_aware = Some(Arc::new(|any: &AnyArc| {
            any.clone()
                .downcast::<T>()
                .ok()
                .map(|t| t as Arc<dyn ComponentIdAware>)
        }));
        self
    }

    /// Declares that instances receive a container handle.
    pub fn container_aware(mut self) -> Self
    where
        T: ContainerAware,
    {
        self.spec.capabilities.container_aware = Some(Arc::new(|any: &AnyArc| {
            any.clone()
                .downcast::<T>()
                .ok()
                .map(|t| t as Arc<dyn ContainerAware>)
        }));
        self
    }

    /// Declares that instances receive the class registry.
    pub fn class_registry_aware(mut self) -> Self
    where
        T: ClassRegistryAware,
    {
        self.spec.capabilities.class_registry_aware = Some(Arc::new(|any: &AnyArc| {
            any.clone()
                .downcast::<T>()
                .ok()
                .map(|t| t as Arc<dyn ClassRegistryAware>)
        }));
        self
    }

    /// Declares the conventional initialization capability.
    pub fn initializable(mut self) -> Self
    where
        T: Initializable,
    {
        self.spec.capabilities.initializable = Some(Arc::new(|any: &AnyArc| {
            any.clone()
                .downcast::<T>()
                .ok()
                .map(|t| t as Arc<dyn Initializable>)
        }));
        self
    }

    /// Declares the conventional disposal capability.
    pub fn disposable(mut self) -> Self
    where
        T: Dispose,
    {
        self.spec.capabilities.disposable = Some(Arc::new(|any: &AnyArc| {
            any.clone()
                .downcast::<T>()
                .ok()
                .map(|t| t as Arc<dyn Dispose>)
        }));
        self
    }

    /// Finishes the spec.
    pub fn build(self) -> Arc<ClassSpec> {
        Arc::new(self.spec)
    }
}

fn downcast_this<'a, T: Send + Sync + 'static>(
    this: &'a AnyArc,
    class: &str,
) -> ContainerResult<&'a T> {
    this.downcast_ref::<T>()
        .ok_or_else(|| ContainerError::TypeMismatch {
            id: class.to_string(),
            target: std::any::type_name::<T>().to_string(),
        })
}

/// Write-once cell for an injected reference of handle type `Arc<P>`.
///
/// Components expose one `Slot` per reference property; the container fills it
/// during population or constructor invocation. Repeated sets are ignored.
pub struct Slot<P: ?Sized + Send + Sync + 'static> {
    cell: OnceCell<Arc<P>>,
}

impl<P: ?Sized + Send + Sync + 'static> Slot<P> {
    /// Creates an empty slot.
    pub fn new() -> Self {
        Self {
            cell: OnceCell::new(),
        }
    }

    /// Fills the slot; a second set is a no-op.
    pub fn set(&self, value: Arc<P>) {
        let _ = self.cell.set(value);
    }

    /// The injected handle, if set.
    pub fn get(&self) -> Option<Arc<P>> {
        self.cell.get().cloned()
    }

    /// Whether the slot has been filled.
    pub fn is_set(&self) -> bool {
        self.cell.get().is_some()
    }
}

impl<P: ?Sized + Send + Sync + 'static> Default for Slot<P> {
    fn default() -> Self {
        Self::new()
    }
}

/// Mutable cell for a configured value property.
pub struct Field<V> {
    cell: RwLock<Option<V>>,
}

impl<V: Clone> Field<V> {
    /// Creates an empty field.
    pub fn new() -> Self {
        Self {
            cell: RwLock::new(None),
        }
    }

    /// Assigns the value, replacing any previous one.
    pub fn set(&self, value: V) {
        *self.cell.write().unwrap() = Some(value);
    }

    /// The configured value, if set.
    pub fn get(&self) -> Option<V> {
        self.cell.read().unwrap().clone()
    }

    /// Whether a value has been assigned.
    pub fn is_set(&self) -> bool {
        self.cell.read().unwrap().is_some()
    }
}

impl<V: Clone> Default for Field<V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Unwraps a reference argument at position `index` as an `Arc<P>` handle.
pub fn ref_arg<P: ?Sized + Send + Sync + 'static>(
    args: &[AnyArc],
    index: usize,
) -> ContainerResult<Arc<P>> {
    args.get(index)
        .and_then(|a| a.downcast_ref::<Arc<P>>())
        .cloned()
        .ok_or_else(|| ContainerError::TypeMismatch {
            id: format!("argument #{index}"),
            target: std::any::type_name::<P>().to_string(),
        })
}

/// Unwraps a value argument at position `index`.
pub fn value_arg<V: Clone + Send + Sync + 'static>(
    args: &[AnyArc],
    index: usize,
) -> ContainerResult<V> {
    args.get(index)
        .and_then(|a| a.downcast_ref::<V>())
        .cloned()
        .ok_or_else(|| ContainerError::TypeMismatch {
            id: format!("argument #{index}"),
            target: std::any::type_name::<V>().to_string(),
        })
}

/// Wraps an `Arc<P>` as the type-erased handle form expected by reference
/// parameters, for explicit argument lists.
pub fn ref_handle<P: ?Sized + Send + Sync + 'static>(handle: Arc<P>) -> AnyArc {
    Arc::new(handle) as AnyArc
}

/// Wraps a plain value as a type-erased explicit argument.
pub fn value_handle<V: Send + Sync + 'static>(value: V) -> AnyArc {
    Arc::new(value) as AnyArc
}

/// Registry of class specs, indexed by name and by concrete [`TypeId`].
#[derive(Default)]
pub struct ClassRegistry {
    state: RwLock<ClassRegistryState>,
}

#[derive(Default)]
struct ClassRegistryState {
    by_name: HashMap<String, Arc<ClassSpec>>,
    by_type: HashMap<TypeId, Arc<ClassSpec>>,
}

impl ClassRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a spec under its class name and concrete type.
    pub fn register(&self, spec: Arc<ClassSpec>) {
        let mut state = self.state.write().unwrap();
        state.by_type.insert(spec.token().id(), spec.clone());
        state.by_name.insert(spec.name().to_string(), spec);
    }

    /// Looks up a spec by class name.
    pub fn get(&self, name: &str) -> Option<Arc<ClassSpec>> {
        self.state.read().unwrap().by_name.get(name).cloned()
    }

    /// Looks up a spec by the concrete type of a live instance.
    pub fn spec_for_type(&self, id: TypeId) -> Option<Arc<ClassSpec>> {
        self.state.read().unwrap().by_type.get(&id).cloned()
    }
}
