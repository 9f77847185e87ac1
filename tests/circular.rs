use std::sync::Arc;

use chassis_di::{
    ref_arg, Blueprint, BlueprintValue, ClassSpec, Container, ContainerError, ParamSpec, Slot,
};

struct Chicken {
    egg: Slot<Egg>,
}

struct Egg {
    chicken: Slot<Chicken>,
}

fn cyclic_classes() -> (Arc<ClassSpec>, Arc<ClassSpec>) {
    let chicken = ClassSpec::builder::<Chicken>("Chicken")
        .no_arg_constructor(|| Chicken { egg: Slot::new() })
        .ref_property("egg", |c: &Chicken| &c.egg)
        .build();
    let egg = ClassSpec::builder::<Egg>("Egg")
        .no_arg_constructor(|| Egg {
            chicken: Slot::new(),
        })
        .ref_property("chicken", |e: &Egg| &e.chicken)
        .build();
    (chicken, egg)
}

#[test]
fn property_cycle_resolves_through_early_references() {
    let (chicken, egg) = cyclic_classes();
    let container = Container::builder()
        .class(chicken)
        .class(egg)
        .blueprint(
            "chicken",
            Blueprint::for_class("Chicken").prop_ref("egg", "egg"),
        )
        .blueprint("egg", Blueprint::for_class("Egg").prop_ref("chicken", "chicken"))
        .build();

    let chicken = container.get_as::<Chicken>("chicken").unwrap();
    let egg = chicken.egg.get().unwrap();
    let back = egg.chicken.get().unwrap();
    assert!(Arc::ptr_eq(&chicken, &back));

    // The egg the container hands out is the same one inside the cycle.
    let egg_direct = container.get_as::<Egg>("egg").unwrap();
    assert!(Arc::ptr_eq(&egg, &egg_direct));
}

#[test]
fn constructor_cycle_cannot_be_broken() {
    struct Left {
        _right: Arc<Right>,
    }
    struct Right {
        _left: Arc<Left>,
    }

    let left = ClassSpec::builder::<Left>("Left")
        .constructor(vec![ParamSpec::reference::<Right>("right")], |args| {
            Ok(Left {
                _right: ref_arg::<Right>(args, 0)?,
            })
        })
        .build();
    let right = ClassSpec::builder::<Right>("Right")
        .constructor(vec![ParamSpec::reference::<Left>("left")], |args| {
            Ok(Right {
                _left: ref_arg::<Left>(args, 0)?,
            })
        })
        .build();

    let container = Container::builder()
        .class(left)
        .class(right)
        .blueprint(
            "left",
            Blueprint::for_class("Left").ctor_arg(BlueprintValue::Ref("right".into())),
        )
        .blueprint(
            "right",
            Blueprint::for_class("Right").ctor_arg(BlueprintValue::Ref("left".into())),
        )
        .build();

    // Constructors need the finished dependency; no early reference exists
    // before instantiation.
    let err = container.get("left").unwrap_err();
    assert!(matches!(
        err.root_cause(),
        ContainerError::CurrentlyInCreation(_)
    ));
}

#[test]
fn explicit_depends_on_cycle_fails_before_instantiation() {
    let (chicken, egg) = cyclic_classes();
    let built = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let probe = built.clone();

    let counting = ClassSpec::builder::<u8>("Counting")
        .no_arg_constructor(move || {
            probe.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            0u8
        })
        .build();

    let container = Container::builder()
        .class(chicken)
        .class(egg)
        .class(counting)
        .blueprint("a", Blueprint::for_class("Counting").depends_on(["b"]))
        .blueprint("b", Blueprint::for_class("Counting").depends_on(["a"]))
        .build();

    let err = container.get("a").unwrap_err();
    assert!(matches!(err, ContainerError::CircularDependency(_, _)));
    assert_eq!(built.load(std::sync::atomic::Ordering::SeqCst), 0);
}

#[test]
fn prototype_self_reference_is_rejected() {
    struct Mirror {
        reflection: Slot<Mirror>,
    }
    let class = ClassSpec::builder::<Mirror>("Mirror")
        .no_arg_constructor(|| Mirror {
            reflection: Slot::new(),
        })
        .ref_property("reflection", |m: &Mirror| &m.reflection)
        .build();

    let container = Container::builder()
        .class(class)
        .blueprint(
            "mirror",
            Blueprint::for_class("Mirror")
                .prototype()
                .prop_ref("reflection", "mirror"),
        )
        .build();

    let err = container.get("mirror").unwrap_err();
    assert!(matches!(
        err.root_cause(),
        ContainerError::CurrentlyInCreation(_)
    ));
}

#[test]
fn forbidding_circular_references_turns_cycles_into_errors() {
    let (chicken, egg) = cyclic_classes();
    let container = Container::builder()
        .class(chicken)
        .class(egg)
        .forbid_circular_references()
        .blueprint(
            "chicken",
            Blueprint::for_class("Chicken").prop_ref("egg", "egg"),
        )
        .blueprint("egg", Blueprint::for_class("Egg").prop_ref("chicken", "chicken"))
        .build();

    let err = container.get("chicken").unwrap_err();
    assert!(matches!(
        err.root_cause(),
        ContainerError::CurrentlyInCreation(_)
    ));
}
