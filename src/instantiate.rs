//! Instance production: factory-method and constructor selection.
//!
//! A blueprint naming a factory method always takes that path, hosted either
//! on another component (instance method) or on the component's own class
//! (static method). Otherwise constructors are ranked: interceptor-proposed
//! candidates first, then every declared constructor, scored by how well
//! declared arguments and autowiring cover the parameter list. The winning
//! path is cached on the merged blueprint so prototypes skip re-selection.

use std::sync::Arc;

use tracing::debug;

use crate::blueprint::{AutowireMode, BlueprintValue, ConstructorArg};
use crate::class::{ClassSpec, ConstructorSpec, ParamSpec};
use crate::container::{ContainerInner, CreationContext};
use crate::error::{ContainerError, ContainerResult};
use crate::merge::{ChosenConstruction, MergedBlueprint};
use crate::token::AnyArc;

/// Pluggable instance production, given a selected constructor and resolved
/// arguments. The default [`DirectInstantiation`] invokes the constructor;
/// replacements may produce wrapped or proxied instances.
pub trait InstantiationStrategy: Send + Sync {
    fn construct(
        &self,
        merged: &MergedBlueprint,
        ctor: &ConstructorSpec,
        args: &[AnyArc],
    ) -> ContainerResult<AnyArc>;
}

/// Invokes the selected constructor directly.
pub struct DirectInstantiation;

impl InstantiationStrategy for DirectInstantiation {
    fn construct(
        &self,
        _merged: &MergedBlueprint,
        ctor: &ConstructorSpec,
        args: &[AnyArc],
    ) -> ContainerResult<AnyArc> {
        ctor.instantiate(args)
    }
}

/// How one parameter of a candidate gets its value.
#[derive(Clone)]
enum ArgPlan {
    /// Index into the blueprint's declared constructor arguments.
    Declared(usize),
    /// Resolved from the container by type.
    Autowire,
}

struct CandidateScore {
    plan: Vec<ArgPlan>,
    /// Distance between parameter count and declared argument count.
    distance: usize,
    /// Number of literal conversions required.
    weight: u32,
    params: usize,
}

impl ContainerInner {
    pub(crate) fn instantiate_component(
        &self,
        id: &str,
        merged: &Arc<MergedBlueprint>,
        declared_class: Option<&Arc<ClassSpec>>,
        explicit_args: Option<&[AnyArc]>,
        ctx: &mut CreationContext,
    ) -> ContainerResult<AnyArc> {
        let def = merged.def();

        if explicit_args.is_none() {
            if let Some(chosen) = merged.chosen() {
                return self.invoke_chosen(id, merged, declared_class, &chosen, ctx);
            }
        }

        if let Some(method) = def.factory_method.clone() {
            return self.instantiate_via_factory(id, merged, declared_class, &method, ctx);
        }

        let class = declared_class.ok_or_else(|| ContainerError::UnknownClass {
            id: id.to_string(),
            class: "<undeclared>".to_string(),
        })?;
        self.instantiate_via_constructor(id, merged, class, explicit_args, ctx)
    }

    /// Re-runs only argument resolution for a previously selected path.
    fn invoke_chosen(
        &self,
        id: &str,
        merged: &Arc<MergedBlueprint>,
        declared_class: Option<&Arc<ClassSpec>>,
        chosen: &ChosenConstruction,
        ctx: &mut CreationContext,
    ) -> ContainerResult<AnyArc> {
        let autowire_ctor = merged.def().autowire == AutowireMode::Constructor;
        match chosen {
            ChosenConstruction::Constructor(index) => {
                let class = declared_class.ok_or_else(|| ContainerError::UnknownClass {
                    id: id.to_string(),
                    class: "<undeclared>".to_string(),
                })?;
                let ctor = &class.constructors()[*index];
                let score = plan_candidate(
                    &merged.def().constructor_args,
                    &ctor.params,
                    autowire_ctor,
                    |value, param| self.conversion.can_convert(value, param.ty),
                )
                .ok_or_else(|| ContainerError::AmbiguousConstructor {
                    id: id.to_string(),
                    candidates: 0,
                })?;
                let args = self.resolve_planned_args(id, merged, &ctor.params, &score.plan, ctx)?;
                self.strategy.construct(merged, ctor, &args)
            }
            ChosenConstruction::StaticFactory(index) => {
                let class = declared_class.ok_or_else(|| ContainerError::UnknownClass {
                    id: id.to_string(),
                    class: "<undeclared>".to_string(),
                })?;
                let method = &class.factory_methods()[*index];
                let score = plan_candidate(
                    &merged.def().constructor_args,
                    &method.params,
                    autowire_ctor,
                    |value, param| self.conversion.can_convert(value, param.ty),
                )
                .ok_or_else(|| ContainerError::AmbiguousFactoryMethod {
                    id: id.to_string(),
                    method: method.name.to_string(),
                })?;
                let args = self.resolve_planned_args(id, merged, &method.params, &score.plan, ctx)?;
                method.produce(None, &args)
            }
            ChosenConstruction::ComponentFactory { component, index } => {
                let receiver = self.factory_receiver(id, component, ctx)?;
                let host = self.class_for_instance(&receiver, None);
                let method = &host.factory_methods()[*index];
                let score = plan_candidate(
                    &merged.def().constructor_args,
                    &method.params,
                    autowire_ctor,
                    |value, param| self.conversion.can_convert(value, param.ty),
                )
                .ok_or_else(|| ContainerError::AmbiguousFactoryMethod {
                    id: id.to_string(),
                    method: method.name.to_string(),
                })?;
                let args = self.resolve_planned_args(id, merged, &method.params, &score.plan, ctx)?;
                method.produce(Some(&receiver), &args)
            }
        }
    }

    fn factory_receiver(
        &self,
        id: &str,
        component: &str,
        ctx: &mut CreationContext,
    ) -> ContainerResult<AnyArc> {
        self.graph.register(component, id);
        self.resolve_component(component, ctx)?
            .ok_or_else(|| ContainerError::NoInstanceProduced(component.to_string()))
    }

    fn instantiate_via_factory(
        &self,
        id: &str,
        merged: &Arc<MergedBlueprint>,
        declared_class: Option<&Arc<ClassSpec>>,
        method: &str,
        ctx: &mut CreationContext,
    ) -> ContainerResult<AnyArc> {
        let def = merged.def();
        let autowire_ctor = def.autowire == AutowireMode::Constructor;

        let (host, receiver) = match def.factory_component.clone() {
            Some(component) => {
                let receiver = self.factory_receiver(id, &component, ctx)?;
                let host = self.class_for_instance(&receiver, None);
                (host, Some((component, receiver)))
            }
            None => {
                let class = declared_class.ok_or_else(|| ContainerError::UnknownClass {
                    id: id.to_string(),
                    class: "<undeclared>".to_string(),
                })?;
                (class.clone(), None)
            }
        };
        let want_static = receiver.is_none();

        let mut candidates: Vec<CandidateScore> = Vec::new();
        let mut indexes: Vec<usize> = Vec::new();
        for (index, overload) in host.factory_methods().iter().enumerate() {
            if overload.name != method || overload.is_static != want_static {
                continue;
            }
            if let Some(score) = plan_candidate(
                &def.constructor_args,
                &overload.params,
                autowire_ctor,
                |value, param| self.conversion.can_convert(value, param.ty),
            ) {
                candidates.push(score);
                indexes.push(index);
            }
        }
        if candidates.is_empty() {
            return Err(ContainerError::MethodNotFound {
                id: id.to_string(),
                method: method.to_string(),
            });
        }

        let winner = match select_best(&candidates, def.lenient_matching) {
            Some(at) => at,
            None => {
                return Err(ContainerError::AmbiguousFactoryMethod {
                    id: id.to_string(),
                    method: method.to_string(),
                })
            }
        };
        let index = indexes[winner];
        let overload = &host.factory_methods()[index];
        debug!(component = id, method, "selected factory method");

        let args =
            self.resolve_planned_args(id, merged, &overload.params, &candidates[winner].plan, ctx)?;
        let instance = overload.produce(receiver.as_ref().map(|(_, r)| r), &args)?;

        merged.set_chosen(match receiver {
            Some((component, _)) => ChosenConstruction::ComponentFactory { component, index },
            None => ChosenConstruction::StaticFactory(index),
        });
        Ok(instance)
    }

    fn instantiate_via_constructor(
        &self,
        id: &str,
        merged: &Arc<MergedBlueprint>,
        class: &Arc<ClassSpec>,
        explicit_args: Option<&[AnyArc]>,
        ctx: &mut CreationContext,
    ) -> ContainerResult<AnyArc> {
        let def = merged.def();
        let ctors = class.constructors();
        if ctors.is_empty() {
            return Err(ContainerError::MethodNotFound {
                id: id.to_string(),
                method: "<constructor>".to_string(),
            });
        }

        let candidate_indexes: Vec<usize> = self
            .chain
            .candidate_constructors(id, class)
            .unwrap_or_else(|| (0..ctors.len()).collect());

        if let Some(args) = explicit_args {
            // Explicit arguments match on arity alone; they arrive pre-wrapped.
            let matching: Vec<usize> = candidate_indexes
                .iter()
                .copied()
                .filter(|&i| ctors[i].params.len() == args.len())
                .collect();
            let index = match matching.len() {
                0 => {
                    return Err(ContainerError::MethodNotFound {
                        id: id.to_string(),
                        method: "<constructor>".to_string(),
                    })
                }
                1 => matching[0],
                _ if def.lenient_matching => matching[0],
                n => {
                    return Err(ContainerError::AmbiguousConstructor {
                        id: id.to_string(),
                        candidates: n,
                    })
                }
            };
            return self.strategy.construct(merged, &ctors[index], args);
        }

        let autowire_ctor = def.autowire == AutowireMode::Constructor;
        let mut candidates: Vec<CandidateScore> = Vec::new();
        let mut indexes: Vec<usize> = Vec::new();
        for &index in &candidate_indexes {
            if let Some(score) = plan_candidate(
                &def.constructor_args,
                &ctors[index].params,
                autowire_ctor,
                |value, param| self.conversion.can_convert(value, param.ty),
            ) {
                candidates.push(score);
                indexes.push(index);
            }
        }
        if candidates.is_empty() {
            return Err(ContainerError::MethodNotFound {
                id: id.to_string(),
                method: "<constructor>".to_string(),
            });
        }

        let winner = match select_best(&candidates, def.lenient_matching) {
            Some(at) => at,
            None => {
                return Err(ContainerError::AmbiguousConstructor {
                    id: id.to_string(),
                    candidates: candidates.len(),
                })
            }
        };
        let index = indexes[winner];
        debug!(component = id, constructor = index, "selected constructor");

        let args = self.resolve_planned_args(
            id,
            merged,
            &ctors[index].params,
            &candidates[winner].plan,
            ctx,
        )?;
        let instance = self.strategy.construct(merged, &ctors[index], &args)?;
        merged.set_chosen(ChosenConstruction::Constructor(index));
        Ok(instance)
    }

    fn resolve_planned_args(
        &self,
        id: &str,
        merged: &Arc<MergedBlueprint>,
        params: &[ParamSpec],
        plan: &[ArgPlan],
        ctx: &mut CreationContext,
    ) -> ContainerResult<Vec<AnyArc>> {
        let declared = &merged.def().constructor_args;
        let mut args = Vec::with_capacity(params.len());
        for (param, step) in params.iter().zip(plan) {
            let value = match step {
                ArgPlan::Declared(at) => self.resolve_value(
                    id,
                    merged,
                    &declared[*at].value,
                    param.ty,
                    param.reference,
                    None,
                    param.name,
                    ctx,
                )?,
                ArgPlan::Autowire => {
                    let candidate = self
                        .find_autowire_candidate(id, param.ty, param.name)?
                        .ok_or_else(|| ContainerError::UnsatisfiedDependency {
                            id: id.to_string(),
                            property: param.name.to_string(),
                            detail: format!("no autowire candidate of type {}", param.ty),
                        })?;
                    self.resolve_reference(id, &candidate, param.ty, ctx)?
                }
            };
            args.push(value);
        }
        Ok(args)
    }
}

/// Plans how a candidate's parameters would be satisfied, or `None` when the
/// candidate is ineligible. Every declared argument must be claimed.
fn plan_candidate(
    declared: &[ConstructorArg],
    params: &[ParamSpec],
    autowire_ctor: bool,
    can_convert: impl Fn(&BlueprintValue, &ParamSpec) -> bool,
) -> Option<CandidateScore> {
    let mut claimed = vec![false; declared.len()];
    let mut plan = Vec::with_capacity(params.len());
    let mut weight = 0u32;

    for (position, param) in params.iter().enumerate() {
        let found = find_declared(declared, &claimed, position, param.name);
        match found {
            Some(at) => {
                let arg = &declared[at];
                match &arg.value {
                    BlueprintValue::Ref(_) | BlueprintValue::Inner(_) => {
                        if !param.reference {
                            return None;
                        }
                    }
                    BlueprintValue::Instance(_) => {}
                    literal => {
                        if param.reference || !can_convert(literal, param) {
                            return None;
                        }
                        weight += 1;
                    }
                }
                claimed[at] = true;
                plan.push(ArgPlan::Declared(at));
            }
            None => {
                if param.reference && autowire_ctor {
                    plan.push(ArgPlan::Autowire);
                } else {
                    return None;
                }
            }
        }
    }

    if claimed.iter().any(|c| !*c) {
        return None;
    }

    let distance = if autowire_ctor && declared.is_empty() {
        0
    } else {
        params.len().abs_diff(declared.len())
    };
    Some(CandidateScore {
        plan,
        distance,
        weight,
        params: params.len(),
    })
}

/// Declared-argument matching: explicit index, then parameter name, then the
/// next unclaimed positional argument.
fn find_declared(
    declared: &[ConstructorArg],
    claimed: &[bool],
    position: usize,
    name: &str,
) -> Option<usize> {
    if let Some(at) = declared
        .iter()
        .enumerate()
        .position(|(i, a)| !claimed[i] && a.index == Some(position))
    {
        return Some(at);
    }
    if let Some(at) = declared
        .iter()
        .enumerate()
        .position(|(i, a)| !claimed[i] && a.name.as_deref() == Some(name))
    {
        return Some(at);
    }
    declared
        .iter()
        .enumerate()
        .position(|(i, a)| !claimed[i] && a.index.is_none() && a.name.is_none())
}

/// Picks the best-scored candidate: smallest declared-count distance, then
/// fewest conversions, then most parameters. A true tie is an ambiguity
/// unless lenient matching picks the first declared.
fn select_best(candidates: &[CandidateScore], lenient: bool) -> Option<usize> {
    let mut best = 0usize;
    let mut tied = false;
    for (at, candidate) in candidates.iter().enumerate().skip(1) {
        let b = &candidates[best];
        let ord = candidate
            .distance
            .cmp(&b.distance)
            .then(candidate.weight.cmp(&b.weight))
            .then(b.params.cmp(&candidate.params));
        match ord {
            std::cmp::Ordering::Less => {
                best = at;
                tied = false;
            }
            std::cmp::Ordering::Equal => tied = true,
            std::cmp::Ordering::Greater => {}
        }
    }
    if tied && !lenient {
        None
    } else {
        Some(best)
    }
}
