use std::sync::{Arc, Mutex};

use chassis_di::{Blueprint, ClassSpec, ComponentIdAware, Container, Dispose, Slot};

type Journal = Arc<Mutex<Vec<String>>>;

struct Tracked {
    id: Mutex<String>,
    journal: Journal,
}

impl ComponentIdAware for Tracked {
    fn set_component_id(&self, id: &str) {
        *self.id.lock().unwrap() = id.to_string();
    }
}

impl Dispose for Tracked {
    fn dispose(&self) {
        let id = self.id.lock().unwrap().clone();
        self.journal.lock().unwrap().push(id);
    }
}

fn tracked_class(name: &'static str, journal: Journal) -> Arc<ClassSpec> {
    ClassSpec::builder::<Tracked>(name)
        .no_arg_constructor(move || Tracked {
            id: Mutex::new(String::new()),
            journal: journal.clone(),
        })
        .component_id_aware()
        .disposable()
        .build()
}

#[test]
fn shutdown_destroys_in_reverse_registration_order() {
    let journal: Journal = Arc::new(Mutex::new(Vec::new()));
    let container = Container::builder()
        .class(tracked_class("Tracked", journal.clone()))
        .blueprint("a", Blueprint::for_class("Tracked"))
        .blueprint("b", Blueprint::for_class("Tracked"))
        .blueprint("c", Blueprint::for_class("Tracked"))
        .build();

    container.get("a").unwrap();
    container.get("b").unwrap();
    container.get("c").unwrap();
    container.shutdown();

    assert_eq!(journal.lock().unwrap().clone(), vec!["c", "b", "a"]);
}

#[test]
fn dependents_are_destroyed_before_their_dependencies() {
    let journal: Journal = Arc::new(Mutex::new(Vec::new()));

    struct Consumer {
        journal: Journal,
        dependency: Slot<Tracked>,
    }
    impl Dispose for Consumer {
        fn dispose(&self) {
            self.journal.lock().unwrap().push("consumer".to_string());
        }
    }
    let consumer_journal = journal.clone();
    let consumer_class = ClassSpec::builder::<Consumer>("Consumer")
        .no_arg_constructor(move || Consumer {
            journal: consumer_journal.clone(),
            dependency: Slot::new(),
        })
        .ref_property("dependency", |c: &Consumer| &c.dependency)
        .disposable()
        .build();

    let container = Container::builder()
        .class(tracked_class("producer", journal.clone()))
        .class(consumer_class)
        .blueprint("producer", Blueprint::for_class("producer"))
        .blueprint(
            "consumer",
            Blueprint::for_class("Consumer").prop_ref("dependency", "producer"),
        )
        .build();

    container.get("consumer").unwrap();

    // Destroying the dependency cascades through its dependents first.
    container.destroy("producer");
    assert_eq!(journal.lock().unwrap().clone(), vec!["consumer", "producer"]);
    assert!(container.contains("producer")); // blueprint survives

    // Both can be rebuilt afterwards.
    journal.lock().unwrap().clear();
    container.get("consumer").unwrap();
    assert!(journal.lock().unwrap().is_empty());
}

#[test]
fn configured_destroy_methods_run_instead_of_nothing() {
    let journal: Journal = Arc::new(Mutex::new(Vec::new()));
    struct Closeable {
        journal: Journal,
    }
    let probe = journal.clone();
    let class = ClassSpec::builder::<Closeable>("Closeable")
        .no_arg_constructor(move || Closeable {
            journal: probe.clone(),
        })
        .method("stop", |c: &Closeable| {
            c.journal.lock().unwrap().push("stop".to_string());
            Ok(())
        })
        .build();

    let container = Container::builder()
        .class(class)
        .blueprint(
            "closeable",
            Blueprint::for_class("Closeable").destroy_method("stop"),
        )
        .build();

    container.get("closeable").unwrap();
    container.shutdown();
    assert_eq!(journal.lock().unwrap().clone(), vec!["stop"]);
}

#[test]
fn inferred_destroy_methods_find_close_then_shutdown() {
    let journal: Journal = Arc::new(Mutex::new(Vec::new()));
    struct Inferring {
        journal: Journal,
    }
    let probe = journal.clone();
    let closer = ClassSpec::builder::<Inferring>("Closer")
        .no_arg_constructor(move || Inferring {
            journal: probe.clone(),
        })
        .method("close", |c: &Inferring| {
            c.journal.lock().unwrap().push("close".to_string());
            Ok(())
        })
        .method("shutdown", |c: &Inferring| {
            c.journal.lock().unwrap().push("shutdown".to_string());
            Ok(())
        })
        .build();

    struct Plain;
    let plain = ClassSpec::builder::<Plain>("Plain")
        .no_arg_constructor(|| Plain)
        .build();

    let container = Container::builder()
        .class(closer)
        .class(plain)
        .blueprint(
            "closer",
            Blueprint::for_class("Closer").infer_destroy_method(),
        )
        .blueprint(
            "silent",
            Blueprint::for_class("Plain").infer_destroy_method(),
        )
        .build();

    container.get("closer").unwrap();
    container.get("silent").unwrap();
    container.shutdown();

    // Only "close" runs: inference stops at the first candidate, and the
    // candidate-less component is a silent no-op.
    assert_eq!(journal.lock().unwrap().clone(), vec!["close"]);
}

#[test]
fn a_panicking_dispose_does_not_block_the_rest() {
    let journal: Journal = Arc::new(Mutex::new(Vec::new()));

    struct Panicky;
    impl Dispose for Panicky {
        fn dispose(&self) {
            panic!("teardown gone wrong");
        }
    }
    let panicky = ClassSpec::builder::<Panicky>("Panicky")
        .no_arg_constructor(|| Panicky)
        .disposable()
        .build();

    let container = Container::builder()
        .class(tracked_class("calm", journal.clone()))
        .class(panicky)
        .blueprint("calm", Blueprint::for_class("calm"))
        .blueprint("panicky", Blueprint::for_class("Panicky"))
        .build();

    container.get("calm").unwrap();
    container.get("panicky").unwrap();
    container.shutdown();

    assert_eq!(journal.lock().unwrap().clone(), vec!["calm"]);
}

#[test]
fn prototypes_are_never_tracked_for_teardown() {
    let journal: Journal = Arc::new(Mutex::new(Vec::new()));
    let container = Container::builder()
        .class(tracked_class("proto", journal.clone()))
        .blueprint("proto", Blueprint::for_class("proto").prototype())
        .build();

    container.get("proto").unwrap();
    container.shutdown();
    assert!(journal.lock().unwrap().is_empty());
}
