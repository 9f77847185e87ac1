//! Type identity for components, properties, and constructor parameters.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

/// Type-erased, shareable component instance.
///
/// Every instance managed by the container is stored behind this alias,
/// whatever its concrete type. Typed access goes through
/// [`Container::get_as`](crate::Container::get_as) or the caster machinery in
/// [`class`](crate::class).
pub type AnyArc = Arc<dyn Any + Send + Sync>;

/// Runtime identity of a concrete type or trait object.
///
/// Tokens pair a [`TypeId`] for fast comparison with the type name for
/// diagnostics. They identify property targets, constructor parameters, and
/// the set of types a component class is assignable to.
///
/// # Examples
///
/// ```rust
/// use chassis_di::TypeToken;
///
/// trait Repository: Send + Sync {}
///
/// let concrete = TypeToken::of::<String>();
/// let trait_obj = TypeToken::of::<dyn Repository>();
///
/// assert_eq!(concrete, TypeToken::of::<String>());
/// assert_ne!(concrete, trait_obj);
/// assert!(trait_obj.name().contains("Repository"));
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeToken {
    id: TypeId,
    name: &'static str,
}

impl TypeToken {
    /// Creates the token for `T`, which may be a trait object type.
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// Token for a live instance whose type was never registered.
    pub(crate) fn anonymous(id: TypeId) -> Self {
        Self {
            id,
            name: "<unregistered type>",
        }
    }

    /// The underlying [`TypeId`].
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// The human-readable type name, as produced by `std::any::type_name`.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Debug for TypeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeToken({})", self.name)
    }
}

impl fmt::Display for TypeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}
