//! Error types for the component container.

use thiserror::Error;

/// Container errors
///
/// Represents the error conditions that can occur while merging blueprints,
/// constructing components, wiring properties, or running lifecycle hooks.
/// Construction failures are wrapped in [`ContainerError::CreationFailure`]
/// carrying the identifier whose build aborted; use
/// [`ContainerError::root_cause`] to reach the originating condition.
///
/// # Examples
///
/// ```rust
/// use chassis_di::{Container, ContainerError};
///
/// let container = Container::builder().build();
/// match container.get("missing") {
///     Err(ContainerError::NoSuchComponent(id)) => assert_eq!(id, "missing"),
///     _ => unreachable!(),
/// }
/// ```
#[derive(Debug, Error)]
pub enum ContainerError {
    /// No blueprint or registered instance exists under the identifier.
    #[error("no component named '{0}' is registered")]
    NoSuchComponent(String),
    /// Resolution was requested against an abstract-only blueprint.
    #[error("component '{0}' is abstract and cannot be resolved")]
    AbstractComponent(String),
    /// Re-entrant resolution of an identifier already being created on this
    /// call stack, with no early reference available to break the cycle.
    #[error("component '{0}' is currently in creation: unresolvable circular reference")]
    CurrentlyInCreation(String),
    /// An explicit depends-on declaration forms a cycle.
    #[error("circular depends-on declaration between '{0}' and '{1}'")]
    CircularDependency(String, String),
    /// Autowiring or dependency checking found no candidate, or more than one
    /// equally ranked candidate with no primary/qualifier distinction.
    #[error("unsatisfied dependency '{property}' of component '{id}': {detail}")]
    UnsatisfiedDependency {
        id: String,
        property: String,
        detail: String,
    },
    /// Constructor resolution ended in a true tie.
    #[error("ambiguous constructor for component '{id}': {candidates} equally ranked candidates")]
    AmbiguousConstructor { id: String, candidates: usize },
    /// Factory-method overload selection ended in a true tie.
    #[error("ambiguous factory method '{method}' for component '{id}'")]
    AmbiguousFactoryMethod { id: String, method: String },
    /// A value could not be converted to the declared target type.
    #[error("cannot convert value for '{id}' to {target}")]
    TypeMismatch { id: String, target: String },
    /// Lookup attempted while the container is shutting down.
    #[error("cannot resolve component '{0}' while the container is shutting down")]
    CreationNotAllowed(String),
    /// A blueprint names a parent that cannot be found, or itself.
    #[error("cannot resolve parent '{parent}' of blueprint '{id}'")]
    UnresolvableParent { id: String, parent: String },
    /// A blueprint names a class with no registered [`ClassSpec`](crate::class::ClassSpec).
    #[error("no class named '{class}' is registered (required by component '{id}')")]
    UnknownClass { id: String, class: String },
    /// A blueprint declares a custom scope with no registered implementation.
    #[error("unknown scope '{scope}' declared by component '{id}'")]
    UnknownScope { id: String, scope: String },
    /// A configured init/destroy method or usable constructor is missing.
    #[error("no invocable method '{method}' on component '{id}'")]
    MethodNotFound { id: String, method: String },
    /// An interceptor short-circuited the construction to an empty result.
    #[error("component '{0}' produced no instance")]
    NoInstanceProduced(String),
    /// An early-reference wrapper replaced the instance after the raw one had
    /// already been injected into dependents, under the strict policy.
    #[error("early reference for '{0}' was replaced after the raw instance escaped to dependents")]
    EarlyReferenceEscaped(String),
    /// An initialization callback or invoked method failed.
    #[error("lifecycle callback '{method}' of component '{id}' failed: {detail}")]
    LifecycleFailure {
        id: String,
        method: String,
        detail: String,
    },
    /// Wrapper carrying the identifier whose construction episode failed.
    #[error("creation of component '{id}' failed: {source}")]
    CreationFailure {
        id: String,
        #[source]
        source: Box<ContainerError>,
    },
}

impl ContainerError {
    /// Wraps an error with the identifier whose construction it aborted.
    /// Already-wrapped errors pass through unchanged.
    pub(crate) fn in_creation_of(self, id: &str) -> Self {
        match self {
            e @ ContainerError::CreationFailure { .. } => e,
            e => ContainerError::CreationFailure {
                id: id.to_string(),
                source: Box::new(e),
            },
        }
    }

    /// Walks through [`ContainerError::CreationFailure`] wrappers to the
    /// originating error.
    pub fn root_cause(&self) -> &ContainerError {
        match self {
            ContainerError::CreationFailure { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

/// Result type for container operations
///
/// A convenience alias for `Result<T, ContainerError>` used throughout the
/// crate.
pub type ContainerResult<T> = Result<T, ContainerError>;
