//! Value conversion from blueprint literals to declared property and
//! parameter types.

use std::sync::Arc;

use crate::blueprint::BlueprintValue;
use crate::error::{ContainerError, ContainerResult};
use crate::token::{AnyArc, TypeToken};

/// Converts configured literal values to declared target types.
///
/// The container consults this seam for every non-reference value it assigns.
/// Implementations must be pure: the result for a static value is cached on
/// the assignment and reused across prototype instances.
pub trait ConversionService: Send + Sync {
    /// Converts `value` to the target type, erased as an [`AnyArc`] wrapping
    /// the concrete converted value.
    fn convert(
        &self,
        id: &str,
        value: &BlueprintValue,
        target: TypeToken,
    ) -> ContainerResult<AnyArc>;

    /// Whether a conversion for this pair would succeed.
    fn can_convert(&self, value: &BlueprintValue, target: TypeToken) -> bool;
}

/// Default conversions: identity pass-through for pre-built instances,
/// numeric widenings and narrowings, string parses, and homogeneous lists of
/// strings or integers.
#[derive(Default)]
pub struct StandardConversions;

impl StandardConversions {
    /// Creates the standard converter.
    pub fn new() -> Self {
        Self
    }
}

fn is<T: 'static>(target: TypeToken) -> bool {
    target.id() == TypeToken::of::<T>().id()
}

fn ok<T: Send + Sync + 'static>(value: T) -> Option<AnyArc> {
    Some(Arc::new(value) as AnyArc)
}

fn convert_int(i: i64, target: TypeToken) -> Option<AnyArc> {
    if is::<i64>(target) {
        ok(i)
    } else if is::<i32>(target) {
        i32::try_from(i).ok().and_then(ok)
    } else if is::<i16>(target) {
        i16::try_from(i).ok().and_then(ok)
    } else if is::<u64>(target) {
        u64::try_from(i).ok().and_then(ok)
    } else if is::<u32>(target) {
        u32::try_from(i).ok().and_then(ok)
    } else if is::<u16>(target) {
        u16::try_from(i).ok().and_then(ok)
    } else if is::<u8>(target) {
        u8::try_from(i).ok().and_then(ok)
    } else if is::<usize>(target) {
        usize::try_from(i).ok().and_then(ok)
    } else if is::<f64>(target) {
        ok(i as f64)
    } else if is::<f32>(target) {
        ok(i as f32)
    } else {
        None
    }
}

fn convert_float(f: f64, target: TypeToken) -> Option<AnyArc> {
    if is::<f64>(target) {
        ok(f)
    } else if is::<f32>(target) {
        ok(f as f32)
    } else {
        None
    }
}

fn convert_str(s: &str, target: TypeToken) -> Option<AnyArc> {
    if is::<String>(target) {
        ok(s.to_string())
    } else if is::<i64>(target) {
        s.parse::<i64>().ok().and_then(ok)
    } else if is::<i32>(target) {
        s.parse::<i32>().ok().and_then(ok)
    } else if is::<u64>(target) {
        s.parse::<u64>().ok().and_then(ok)
    } else if is::<u32>(target) {
        s.parse::<u32>().ok().and_then(ok)
    } else if is::<usize>(target) {
        s.parse::<usize>().ok().and_then(ok)
    } else if is::<f64>(target) {
        s.parse::<f64>().ok().and_then(ok)
    } else if is::<f32>(target) {
        s.parse::<f32>().ok().and_then(ok)
    } else if is::<bool>(target) {
        s.parse::<bool>().ok().and_then(ok)
    } else {
        None
    }
}

fn convert_list(items: &[BlueprintValue], target: TypeToken) -> Option<AnyArc> {
    if is::<Vec<String>>(target) {
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            match item {
                BlueprintValue::Str(s) => out.push(s.clone()),
                _ => return None,
            }
        }
        ok(out)
    } else if is::<Vec<i64>>(target) {
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            match item {
                BlueprintValue::Int(i) => out.push(*i),
                _ => return None,
            }
        }
        ok(out)
    } else {
        None
    }
}

fn convert_value(value: &BlueprintValue, target: TypeToken) -> Option<AnyArc> {
    match value {
        BlueprintValue::Null => None,
        BlueprintValue::Bool(b) if is::<bool>(target) => ok(*b),
        BlueprintValue::Bool(_) => None,
        BlueprintValue::Int(i) => convert_int(*i, target),
        BlueprintValue::Float(f) => convert_float(*f, target),
        BlueprintValue::Str(s) => convert_str(s, target),
        BlueprintValue::List(items) => convert_list(items, target),
        BlueprintValue::Instance(any) if (**any).type_id() == target.id() => Some(any.clone()),
        BlueprintValue::Instance(_) => None,
        // Dynamic values are resolved before conversion is consulted.
        BlueprintValue::Ref(_) | BlueprintValue::Inner(_) => None,
    }
}

impl ConversionService for StandardConversions {
    fn convert(
        &self,
        id: &str,
        value: &BlueprintValue,
        target: TypeToken,
    ) -> ContainerResult<AnyArc> {
        convert_value(value, target).ok_or_else(|| ContainerError::TypeMismatch {
            id: id.to_string(),
            target: target.name().to_string(),
        })
    }

    fn can_convert(&self, value: &BlueprintValue, target: TypeToken) -> bool {
        convert_value(value, target).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widens_and_narrows_integers() {
        let svc = StandardConversions::new();
        let v = svc
            .convert("n", &BlueprintValue::Int(7), TypeToken::of::<u32>())
            .unwrap();
        assert_eq!(*v.downcast_ref::<u32>().unwrap(), 7);

        let overflow = svc.convert("n", &BlueprintValue::Int(-1), TypeToken::of::<u32>());
        assert!(matches!(overflow, Err(ContainerError::TypeMismatch { .. })));
    }

    #[test]
    fn parses_strings() {
        let svc = StandardConversions::new();
        let v = svc
            .convert(
                "flag",
                &BlueprintValue::Str("true".into()),
                TypeToken::of::<bool>(),
            )
            .unwrap();
        assert!(*v.downcast_ref::<bool>().unwrap());
    }

    #[test]
    fn rejects_dynamic_values() {
        let svc = StandardConversions::new();
        assert!(!svc.can_convert(
            &BlueprintValue::Ref("other".into()),
            TypeToken::of::<String>()
        ));
    }

    #[test]
    fn converts_string_lists() {
        let svc = StandardConversions::new();
        let v = svc
            .convert(
                "names",
                &BlueprintValue::List(vec![
                    BlueprintValue::Str("a".into()),
                    BlueprintValue::Str("b".into()),
                ]),
                TypeToken::of::<Vec<String>>(),
            )
            .unwrap();
        assert_eq!(
            v.downcast_ref::<Vec<String>>().unwrap(),
            &vec!["a".to_string(), "b".to_string()]
        );
    }
}
