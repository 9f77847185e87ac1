//! Custom scope seam for lifetimes beyond singleton and prototype.

use crate::error::ContainerResult;
use crate::token::AnyArc;

/// Storage strategy for a named custom scope.
///
/// A blueprint declaring `Scope::Custom(name)` routes its resolutions through
/// the scope registered under that name. The scope decides whether to return
/// a cached instance or to invoke the supplied factory, which runs the full
/// construction pipeline (population, lifecycle hooks) on its behalf.
pub trait ComponentScope: Send + Sync {
    /// Returns the scoped instance for `id`, creating it via `factory` if the
    /// scope has none. A `None` from the factory means an interceptor
    /// short-circuited construction to an empty result.
    fn get(
        &self,
        id: &str,
        factory: &mut dyn FnMut() -> ContainerResult<Option<AnyArc>>,
    ) -> ContainerResult<Option<AnyArc>>;

    /// Removes the scoped instance for `id`, returning it if present. The
    /// container runs no teardown for custom-scoped instances; the scope owns
    /// their lifetime.
    fn remove(&self, id: &str) -> Option<AnyArc>;
}
