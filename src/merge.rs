//! Parent-chain blueprint merging.
//!
//! Child blueprints inherit configuration from a parent chain. Merging
//! flattens the chain into a [`MergedBlueprint`] with the scope defaulted and
//! all inherited values overlaid, memoized per identifier until invalidated.
//!
//! Overlay rules: optional scalars replace (child wins when declared), flag
//! inheritance is additive (a child cannot un-declare a parent flag, except
//! abstractness and syntheticness which are never inherited), constructor
//! arguments and property assignments append with child-wins-on-collision,
//! and depends-on and qualifier lists union in declaration order.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use once_cell::sync::OnceCell;

use crate::blueprint::{Blueprint, BlueprintSource, ConstructorArg, Scope};
use crate::error::{ContainerError, ContainerResult};
use crate::interceptor::InterceptorChain;

/// Which construction path resolution settled on for a merged blueprint.
/// Cached so prototypes skip re-selection on every request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChosenConstruction {
    /// Index into the class's declared constructors.
    Constructor(usize),
    /// Index into the class's declared factory methods (static).
    StaticFactory(usize),
    /// Instance factory method on another component.
    ComponentFactory { component: String, index: usize },
}

#[derive(Default)]
pub(crate) struct ResolutionArtifacts {
    pub(crate) chosen: Option<ChosenConstruction>,
}

/// A blueprint with its parent chain flattened and its scope decided.
///
/// Shared between resolution, disposal, and identity-sensitive callers; the
/// merger hands out the same `Arc` for an identifier until invalidated.
pub struct MergedBlueprint {
    id: String,
    def: Blueprint,
    scope: Scope,
    artifacts: Mutex<ResolutionArtifacts>,
}

impl MergedBlueprint {
    /// The identifier this blueprint was merged for.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The flattened definition. Never carries a parent reference.
    pub fn def(&self) -> &Blueprint {
        &self.def
    }

    /// The decided scope (singleton when the chain declared none).
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Whether the decided scope is singleton.
    pub fn is_singleton(&self) -> bool {
        self.scope.is_singleton()
    }

    /// Whether the decided scope is prototype.
    pub fn is_prototype(&self) -> bool {
        self.scope.is_prototype()
    }

    pub(crate) fn chosen(&self) -> Option<ChosenConstruction> {
        self.artifacts.lock().unwrap().chosen.clone()
    }

    pub(crate) fn set_chosen(&self, chosen: ChosenConstruction) {
        self.artifacts.lock().unwrap().chosen = Some(chosen);
    }
}

impl fmt::Debug for MergedBlueprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MergedBlueprint")
            .field("id", &self.id)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

/// Memoizing blueprint merger.
pub struct BlueprintMerger {
    source: Arc<dyn BlueprintSource>,
    chain: InterceptorChain,
    cache: Mutex<HashMap<String, Arc<MergedBlueprint>>>,
    caching_enabled: bool,
}

impl BlueprintMerger {
    pub(crate) fn new(
        source: Arc<dyn BlueprintSource>,
        chain: InterceptorChain,
        caching_enabled: bool,
    ) -> Self {
        Self {
            source,
            chain,
            cache: Mutex::new(HashMap::new()),
            caching_enabled,
        }
    }

    /// Returns the merged blueprint for `id`, computing and caching it on
    /// first request.
    pub fn merged(&self, id: &str) -> ContainerResult<Arc<MergedBlueprint>> {
        if self.caching_enabled {
            if let Some(found) = self.cache.lock().unwrap().get(id) {
                return Ok(found.clone());
            }
        }
        let raw = self
            .source
            .get(id)
            .ok_or_else(|| ContainerError::NoSuchComponent(id.to_string()))?;
        let merged = self.build_merged(id, &raw, None)?;
        if self.caching_enabled {
            self.cache
                .lock()
                .unwrap()
                .insert(id.to_string(), merged.clone());
        }
        Ok(merged)
    }

    /// Merges a nested blueprint in the context of its containing component.
    /// Never cached; the decided scope is coerced to the containing scope when
    /// that scope is not singleton.
    pub fn merge_contained(
        &self,
        id: &str,
        inner: &Blueprint,
        containing: &MergedBlueprint,
    ) -> ContainerResult<Arc<MergedBlueprint>> {
        self.build_merged(id, inner, Some(containing.scope()))
    }

    fn build_merged(
        &self,
        id: &str,
        raw: &Blueprint,
        containing_scope: Option<&Scope>,
    ) -> ContainerResult<Arc<MergedBlueprint>> {
        let mut chain_seen = vec![id.to_string()];
        let mut def = self.flatten(id, raw, &mut chain_seen)?;

        // Conversion caches are per merged entry; sibling children may
        // declare differently typed properties under one inherited name.
        for assignment in &mut def.property_values {
            assignment.converted = Arc::new(OnceCell::new());
        }

        // Runs once per merged entry; the cache guards against re-processing.
        if !def.synthetic && !self.chain.is_empty() {
            self.chain.post_process_blueprint(id, &mut def);
        }

        let mut scope = def.scope.clone().unwrap_or(Scope::Singleton);
        if let Some(containing) = containing_scope {
            if !containing.is_singleton() && scope.is_singleton() {
                scope = containing.clone();
            }
        }

        Ok(Arc::new(MergedBlueprint {
            id: id.to_string(),
            def,
            scope,
            artifacts: Mutex::new(ResolutionArtifacts::default()),
        }))
    }

    fn flatten(
        &self,
        id: &str,
        raw: &Blueprint,
        seen: &mut Vec<String>,
    ) -> ContainerResult<Blueprint> {
        let Some(parent_id) = raw.parent.clone() else {
            return Ok(raw.clone());
        };
        if seen.iter().any(|s| s == &parent_id) {
            return Err(ContainerError::UnresolvableParent {
                id: id.to_string(),
                parent: parent_id,
            });
        }
        let parent_raw =
            self.source
                .get(&parent_id)
                .ok_or_else(|| ContainerError::UnresolvableParent {
                    id: id.to_string(),
                    parent: parent_id.clone(),
                })?;
        seen.push(parent_id.clone());
        let parent = self.flatten(&parent_id, &parent_raw, seen)?;
        Ok(overlay(parent, raw))
    }

    /// Drops the memoized entry for `id`.
    pub fn clear(&self, id: &str) {
        self.cache.lock().unwrap().remove(id);
    }

    /// Drops every memoized entry.
    pub fn clear_all(&self) {
        self.cache.lock().unwrap().clear();
    }
}

fn overlay(parent: Blueprint, child: &Blueprint) -> Blueprint {
    let mut out = parent;
    out.parent = None;

    if child.class_name.is_some() {
        out.class_name = child.class_name.clone();
    }
    if child.scope.is_some() {
        out.scope = child.scope.clone();
    }
    if child.factory_component.is_some() {
        out.factory_component = child.factory_component.clone();
    }
    if child.factory_method.is_some() {
        out.factory_method = child.factory_method.clone();
    }
    if child.init_method.is_some() {
        out.init_method = child.init_method.clone();
    }
    if child.destroy_method.is_some() {
        out.destroy_method = child.destroy_method.clone();
    }
    if child.autowire != Default::default() {
        out.autowire = child.autowire;
    }
    if child.dependency_check != Default::default() {
        out.dependency_check = child.dependency_check;
    }

    // Abstractness and syntheticness belong to the definition itself.
    out.abstract_blueprint = child.abstract_blueprint;
    out.synthetic = child.synthetic;
    out.lazy_init |= child.lazy_init;
    out.enforce_init_method |= child.enforce_init_method;
    out.init_externally_managed |= child.init_externally_managed;
    out.primary |= child.primary;
    out.lenient_matching |= child.lenient_matching;
    out.autowire_candidate &= child.autowire_candidate;

    for arg in &child.constructor_args {
        let collision = out.constructor_args.iter().position(|existing| {
            (arg.index.is_some() && existing.index == arg.index)
                || (arg.name.is_some() && existing.name == arg.name)
        });
        match collision {
            Some(at) => out.constructor_args[at] = arg.clone(),
            None => out.constructor_args.push(ConstructorArg {
                index: arg.index,
                name: arg.name.clone(),
                value: arg.value.clone(),
            }),
        }
    }

    for assignment in &child.property_values {
        match out
            .property_values
            .iter()
            .position(|existing| existing.name == assignment.name)
        {
            Some(at) => out.property_values[at] = assignment.clone(),
            None => out.property_values.push(assignment.clone()),
        }
    }

    for dep in &child.depends_on {
        if !out.depends_on.contains(dep) {
            out.depends_on.push(dep.clone());
        }
    }
    for qualifier in &child.qualifiers {
        if !out.qualifiers.contains(qualifier) {
            out.qualifiers.push(qualifier.clone());
        }
    }

    out
}
