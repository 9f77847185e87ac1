//! Property population and autowiring.
//!
//! Population runs after instantiation and before lifecycle hooks: the
//! after-construction veto, then autowiring of unset reference properties
//! (by name or by type per the blueprint), then explicit property values,
//! then dependency-check enforcement. Every reference resolved here registers
//! a dependency edge for teardown ordering.

use std::sync::Arc;

use once_cell::sync::OnceCell;
use tracing::debug;

use crate::blueprint::{AutowireMode, Blueprint, BlueprintValue, DependencyCheck};
use crate::class::ClassSpec;
use crate::container::{ContainerInner, CreationContext};
use crate::error::{ContainerError, ContainerResult};
use crate::merge::MergedBlueprint;
use crate::token::{AnyArc, TypeToken};

impl ContainerInner {
    pub(crate) fn populate_component(
        &self,
        id: &str,
        merged: &Arc<MergedBlueprint>,
        class: &Arc<ClassSpec>,
        instance: &AnyArc,
        ctx: &mut CreationContext,
    ) -> ContainerResult<()> {
        let def = merged.def();

        if !def.synthetic && !self.chain.is_empty() {
            // A veto skips population and dependency checking entirely.
            if !self.chain.apply_after_construction(id, instance)? {
                return Ok(());
            }
        }

        match def.autowire {
            AutowireMode::ByName => self.autowire_by_name(id, merged, class, instance, ctx)?,
            AutowireMode::ByType => self.autowire_by_type(id, merged, class, instance, ctx)?,
            AutowireMode::Off | AutowireMode::Constructor => {}
        }

        for assignment in &def.property_values {
            let prop = class.property(&assignment.name).ok_or_else(|| {
                ContainerError::UnsatisfiedDependency {
                    id: id.to_string(),
                    property: assignment.name.clone(),
                    detail: format!("class '{}' has no such property", class.name()),
                }
            })?;
            let cache = if assignment.value.is_static() {
                Some(&*assignment.converted)
            } else {
                None
            };
            let value = self.resolve_value(
                id,
                merged,
                &assignment.value,
                prop.ty,
                prop.reference,
                cache,
                prop.name,
                ctx,
            )?;
            (prop.set)(instance, value)?;
        }

        self.enforce_dependency_check(id, merged, class, instance)
    }

    fn wants_autowire(
        &self,
        def: &Blueprint,
        class: &ClassSpec,
        instance: &AnyArc,
        prop_name: &str,
    ) -> bool {
        let Some(prop) = class.property(prop_name) else {
            return false;
        };
        prop.reference
            && !self.ignored_autowire_tokens.contains(&prop.ty.id())
            && !def.property_values.iter().any(|a| a.name == prop.name)
            && !(prop.is_set)(instance)
    }

    fn autowire_by_name(
        &self,
        id: &str,
        merged: &Arc<MergedBlueprint>,
        class: &Arc<ClassSpec>,
        instance: &AnyArc,
        ctx: &mut CreationContext,
    ) -> ContainerResult<()> {
        let def = merged.def();
        for prop in class.properties() {
            if !self.wants_autowire(def, class, instance, prop.name) {
                continue;
            }
            if !self.blueprint_exists(prop.name) {
                continue;
            }
            let handle = self.resolve_reference(id, prop.name, prop.ty, ctx)?;
            (prop.set)(instance, handle)?;
            debug!(component = id, property = prop.name, "autowired by name");
        }
        Ok(())
    }

    fn autowire_by_type(
        &self,
        id: &str,
        merged: &Arc<MergedBlueprint>,
        class: &Arc<ClassSpec>,
        instance: &AnyArc,
        ctx: &mut CreationContext,
    ) -> ContainerResult<()> {
        let def = merged.def();
        for prop in class.properties() {
            if !self.wants_autowire(def, class, instance, prop.name) {
                continue;
            }
            let Some(candidate) = self.find_autowire_candidate(id, prop.ty, prop.name)? else {
                continue;
            };
            let handle = self.resolve_reference(id, &candidate, prop.ty, ctx)?;
            (prop.set)(instance, handle)?;
            debug!(
                component = id,
                property = prop.name,
                candidate = %candidate,
                "autowired by type"
            );
        }
        Ok(())
    }

    /// Finds the single blueprint whose produced type is assignable to
    /// `want`. Ties break on the primary flag, then on a candidate qualifier
    /// matching `hint`, then on a candidate identifier matching `hint`.
    pub(crate) fn find_autowire_candidate(
        &self,
        owner: &str,
        want: TypeToken,
        hint: &str,
    ) -> ContainerResult<Option<String>> {
        struct Candidate {
            id: String,
            primary: bool,
            qualified: bool,
        }

        let mut found: Vec<Candidate> = Vec::new();
        for cid in self.blueprint_ids() {
            if cid == owner {
                continue;
            }
            let Ok(m) = self.merger.merged(&cid) else {
                continue;
            };
            let def = m.def();
            if def.abstract_blueprint || !def.autowire_candidate {
                continue;
            }
            if !self.candidate_assignable(&m, want) {
                continue;
            }
            found.push(Candidate {
                primary: def.primary,
                qualified: def.qualifiers.iter().any(|q| q == hint),
                id: cid,
            });
        }

        match found.len() {
            0 => return Ok(None),
            1 => return Ok(Some(found.remove(0).id)),
            _ => {}
        }

        let primaries: Vec<&Candidate> = found.iter().filter(|c| c.primary).collect();
        match primaries.len() {
            1 => return Ok(Some(primaries[0].id.clone())),
            n if n > 1 => {
                return Err(ContainerError::UnsatisfiedDependency {
                    id: owner.to_string(),
                    property: hint.to_string(),
                    detail: format!("{n} primary candidates for type {want}"),
                })
            }
            _ => {}
        }

        let qualified: Vec<&Candidate> = found.iter().filter(|c| c.qualified).collect();
        if qualified.len() == 1 {
            return Ok(Some(qualified[0].id.clone()));
        }

        if let Some(by_name) = found.iter().find(|c| c.id == hint) {
            return Ok(Some(by_name.id.clone()));
        }

        Err(ContainerError::UnsatisfiedDependency {
            id: owner.to_string(),
            property: hint.to_string(),
            detail: format!("{} equally ranked candidates for type {want}", found.len()),
        })
    }

    /// Whether a candidate blueprint produces something assignable to `want`,
    /// decided from declared classes and factory return types alone, without
    /// instantiating the candidate.
    fn candidate_assignable(&self, m: &MergedBlueprint, want: TypeToken) -> bool {
        let def = m.def();
        if let Some(method) = &def.factory_method {
            let host_name = match &def.factory_component {
                Some(component) => self
                    .merger
                    .merged(component)
                    .ok()
                    .and_then(|f| f.def().class_name.clone()),
                None => def.class_name.clone(),
            };
            let Some(host) = host_name.and_then(|n| self.classes.get(&n)) else {
                return false;
            };
            host.factory_overloads(method).iter().any(|o| {
                o.returns.id() == want.id()
                    || self
                        .classes
                        .spec_for_type(o.returns.id())
                        .map(|s| s.assignable_to(&want))
                        .unwrap_or(false)
            })
        } else if let Some(name) = &def.class_name {
            self.classes
                .get(name)
                .map(|c| c.assignable_to(&want))
                .unwrap_or(false)
        } else {
            false
        }
    }

    /// Resolves `target` and coerces it to the handle type `want`, recording
    /// the dependency edge.
    pub(crate) fn resolve_reference(
        &self,
        owner: &str,
        target: &str,
        want: TypeToken,
        ctx: &mut CreationContext,
    ) -> ContainerResult<AnyArc> {
        self.graph.register(target, owner);
        let instance = self
            .resolve_component(target, ctx)?
            .ok_or_else(|| ContainerError::NoInstanceProduced(target.to_string()))?;
        let class = self.class_for_instance(&instance, None);
        class
            .cast_to(&instance, &want)
            .ok_or_else(|| ContainerError::TypeMismatch {
                id: target.to_string(),
                target: want.name().to_string(),
            })
    }

    /// Resolves one configured value to its target form: references
    /// recursively, nested blueprints as contained components, literals
    /// through the conversion service (cached when static).
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn resolve_value(
        &self,
        owner: &str,
        merged: &Arc<MergedBlueprint>,
        value: &BlueprintValue,
        want: TypeToken,
        want_reference: bool,
        cache: Option<&OnceCell<AnyArc>>,
        label: &str,
        ctx: &mut CreationContext,
    ) -> ContainerResult<AnyArc> {
        match value {
            BlueprintValue::Ref(target) => {
                if !want_reference {
                    return Err(ContainerError::TypeMismatch {
                        id: owner.to_string(),
                        target: want.name().to_string(),
                    });
                }
                self.resolve_reference(owner, target, want, ctx)
            }
            BlueprintValue::Inner(inner) => {
                if !want_reference {
                    return Err(ContainerError::TypeMismatch {
                        id: owner.to_string(),
                        target: want.name().to_string(),
                    });
                }
                let cid = format!("(inner){owner}#{label}");
                let inner_merged = self.merger.merge_contained(&cid, inner, merged)?;
                let instance = self
                    .create_component(&cid, &inner_merged, None, ctx)?
                    .ok_or_else(|| ContainerError::NoInstanceProduced(cid.clone()))?;
                self.disposals.register_contained(owner, &cid);
                let class = self.class_for_instance(&instance, None);
                class
                    .cast_to(&instance, &want)
                    .ok_or_else(|| ContainerError::TypeMismatch {
                        id: cid,
                        target: want.name().to_string(),
                    })
            }
            BlueprintValue::Instance(any) if want_reference => {
                let class = self.class_for_instance(any, None);
                class
                    .cast_to(any, &want)
                    .ok_or_else(|| ContainerError::TypeMismatch {
                        id: owner.to_string(),
                        target: want.name().to_string(),
                    })
            }
            literal => {
                if want_reference {
                    return Err(ContainerError::TypeMismatch {
                        id: owner.to_string(),
                        target: want.name().to_string(),
                    });
                }
                match cache {
                    Some(cell) => cell
                        .get_or_try_init(|| self.conversion.convert(owner, literal, want))
                        .cloned(),
                    None => self.conversion.convert(owner, literal, want),
                }
            }
        }
    }

    fn enforce_dependency_check(
        &self,
        id: &str,
        merged: &Arc<MergedBlueprint>,
        class: &Arc<ClassSpec>,
        instance: &AnyArc,
    ) -> ContainerResult<()> {
        let level = merged.def().dependency_check;
        if level == DependencyCheck::Off {
            return Ok(());
        }
        for prop in class.properties() {
            if self.ignored_autowire_tokens.contains(&prop.ty.id()) {
                continue;
            }
            let required = match level {
                DependencyCheck::Off => false,
                DependencyCheck::Simple => !prop.reference,
                DependencyCheck::Objects => prop.reference,
                DependencyCheck::All => true,
            };
            if required && !(prop.is_set)(instance) {
                return Err(ContainerError::UnsatisfiedDependency {
                    id: id.to_string(),
                    property: prop.name.to_string(),
                    detail: "required property left unset".to_string(),
                });
            }
        }
        Ok(())
    }
}
