//! # chassis-di
//!
//! A blueprint-driven component container: declarative component definitions
//! are merged, constructed, wired (including cyclic references), initialized,
//! and torn down in dependency order.
//!
//! ## Features
//!
//! - **Declarative blueprints**: class, scope, constructor arguments,
//!   property values, lifecycle methods, all built fluently and mergeable
//!   through parent chains
//! - **Cycle-safe wiring**: property-injected singleton cycles resolve
//!   through early references; unresolvable cycles fail with a precise error
//! - **Autowiring**: by-name and by-type property wiring with primary and
//!   qualifier tie-breaking, plus constructor autowiring
//! - **Lifecycle hooks**: aware callbacks, interceptor chains, conventional
//!   and configured init/destroy methods
//! - **Ordered teardown**: dependents-first destruction, reverse-order
//!   shutdown, destroy failures logged and contained
//! - **Thread-safe**: one construction per identifier under concurrency;
//!   waiters observe the same shared instance
//!
//! ## Quick start
//!
//! ```rust
//! use chassis_di::{Blueprint, ClassSpec, Container, Slot};
//!
//! trait Repository: Send + Sync {
//!     fn find(&self, key: &str) -> Option<String>;
//! }
//!
//! struct InMemoryRepository;
//! impl Repository for InMemoryRepository {
//!     fn find(&self, key: &str) -> Option<String> {
//!         (key == "answer").then(|| "42".to_string())
//!     }
//! }
//!
//! struct LookupService {
//!     repository: Slot<dyn Repository>,
//! }
//!
//! let repository_class = ClassSpec::builder::<InMemoryRepository>("InMemoryRepository")
//!     .no_arg_constructor(|| InMemoryRepository)
//!     .implements::<dyn Repository>(|this| this)
//!     .build();
//!
//! let service_class = ClassSpec::builder::<LookupService>("LookupService")
//!     .no_arg_constructor(|| LookupService { repository: Slot::new() })
//!     .ref_property("repository", |s: &LookupService| &s.repository)
//!     .build();
//!
//! let container = Container::builder()
//!     .class(repository_class)
//!     .class(service_class)
//!     .blueprint("repository", Blueprint::for_class("InMemoryRepository"))
//!     .blueprint(
//!         "service",
//!         Blueprint::for_class("LookupService").prop_ref("repository", "repository"),
//!     )
//!     .build();
//!
//! let service = container.get_as::<LookupService>("service")?;
//! let repository = service.repository.get().unwrap();
//! assert_eq!(repository.find("answer").as_deref(), Some("42"));
//!
//! container.shutdown();
//! # Ok::<(), chassis_di::ContainerError>(())
//! ```
//!
//! ## Scopes
//!
//! - **Singleton** (default): one shared instance per identifier, torn down
//!   with the container
//! - **Prototype**: a fresh instance per request, never tracked for teardown
//! - **Custom**: storage delegated to a registered
//!   [`ComponentScope`](scope::ComponentScope)
//!
//! ## Cyclic references
//!
//! Two singletons referencing each other through properties both resolve:
//! the one constructed first exposes an early reference that the second
//! receives mid-construction. Constructor cycles and prototype cycles cannot
//! be broken this way and fail with
//! [`ContainerError::CurrentlyInCreation`].

pub mod blueprint;
pub mod class;
pub mod container;
pub mod convert;
pub mod disposal;
pub mod error;
pub mod graph;
pub mod instantiate;
pub mod interceptor;
pub mod lifecycle;
pub mod merge;
pub mod registry;
pub mod scope;
pub mod token;

mod populate;

pub use blueprint::{
    AutowireMode, Blueprint, BlueprintSource, BlueprintValue, ConstructorArg, DependencyCheck,
    PropertyAssignment, Scope, SimpleBlueprintRegistry, DESTROY_METHOD_INFERRED,
};
pub use class::{
    ref_arg, ref_handle, value_arg, value_handle, CasterFn, ClassRegistry, ClassSpec,
    ClassSpecBuilder, ConstructorSpec, FactoryMethodSpec, Field, ParamSpec, PropertySpec, Slot,
};
pub use container::{Container, ContainerBuilder, RawInjectionPolicy};
pub use convert::{ConversionService, StandardConversions};
pub use error::{ContainerError, ContainerResult};
pub use instantiate::{DirectInstantiation, InstantiationStrategy};
pub use interceptor::{ComponentInterceptor, InterceptorChain};
pub use lifecycle::{
    ClassRegistryAware, ComponentIdAware, ContainerAware, Dispose, Initializable,
    CONVENTIONAL_DESTROY_METHOD, CONVENTIONAL_INIT_METHOD,
};
pub use merge::{BlueprintMerger, ChosenConstruction, MergedBlueprint};
pub use scope::ComponentScope;
pub use token::{AnyArc, TypeToken};
