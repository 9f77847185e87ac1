use std::sync::{Arc, Mutex};

use chassis_di::{
    Blueprint, BlueprintValue, ClassSpec, ComponentIdAware, ComponentInterceptor, Container,
    ContainerAware, ContainerError, Field, Initializable,
};

type Journal = Arc<Mutex<Vec<String>>>;

struct Worker {
    journal: Journal,
    id: Mutex<Option<String>>,
    has_container: Mutex<bool>,
}

impl Worker {
    fn new(journal: Journal) -> Self {
        Self {
            journal,
            id: Mutex::new(None),
            has_container: Mutex::new(false),
        }
    }
}

impl ComponentIdAware for Worker {
    fn set_component_id(&self, id: &str) {
        self.journal.lock().unwrap().push(format!("aware:{id}"));
        *self.id.lock().unwrap() = Some(id.to_string());
    }
}

impl ContainerAware for Worker {
    fn set_container(&self, _container: Container) {
        self.journal.lock().unwrap().push("container".to_string());
        *self.has_container.lock().unwrap() = true;
    }
}

impl Initializable for Worker {
    fn initialize(&self) -> chassis_di::ContainerResult<()> {
        self.journal.lock().unwrap().push("initialize".to_string());
        Ok(())
    }
}

fn worker_class(journal: Journal) -> Arc<ClassSpec> {
    ClassSpec::builder::<Worker>("Worker")
        .no_arg_constructor(move || Worker::new(journal.clone()))
        .method("start", |w: &Worker| {
            w.journal.lock().unwrap().push("start".to_string());
            Ok(())
        })
        .component_id_aware()
        .container_aware()
        .initializable()
        .build()
}

#[test]
fn aware_callbacks_run_before_initialization() {
    let journal: Journal = Arc::new(Mutex::new(Vec::new()));
    let container = Container::builder()
        .class(worker_class(journal.clone()))
        .blueprint("worker", Blueprint::for_class("Worker").init_method("start"))
        .build();

    let worker = container.get_as::<Worker>("worker").unwrap();
    assert_eq!(worker.id.lock().unwrap().as_deref(), Some("worker"));
    assert!(*worker.has_container.lock().unwrap());

    let entries = journal.lock().unwrap().clone();
    assert_eq!(entries, vec!["aware:worker", "container", "initialize", "start"]);
}

#[test]
fn a_configured_init_method_naming_the_convention_runs_once() {
    let journal: Journal = Arc::new(Mutex::new(Vec::new()));
    let container = Container::builder()
        .class(worker_class(journal.clone()))
        .blueprint(
            "worker",
            Blueprint::for_class("Worker").init_method("initialize"),
        )
        .build();

    container.get("worker").unwrap();
    let initializations = journal
        .lock()
        .unwrap()
        .iter()
        .filter(|e| *e == "initialize")
        .count();
    assert_eq!(initializations, 1);
}

#[test]
fn externally_managed_init_methods_are_not_invoked() {
    let journal: Journal = Arc::new(Mutex::new(Vec::new()));
    let container = Container::builder()
        .class(worker_class(journal.clone()))
        .blueprint(
            "worker",
            Blueprint::for_class("Worker")
                .init_method("start")
                .init_externally_managed(),
        )
        .build();

    container.get("worker").unwrap();
    assert!(!journal.lock().unwrap().contains(&"start".to_string()));
}

#[test]
fn a_missing_init_method_is_fatal_only_when_enforced() {
    let journal: Journal = Arc::new(Mutex::new(Vec::new()));
    let container = Container::builder()
        .class(worker_class(journal.clone()))
        .blueprint("tolerant", Blueprint::for_class("Worker").init_method("boot"))
        .blueprint(
            "strict",
            Blueprint::for_class("Worker")
                .init_method("boot")
                .enforce_init_method(),
        )
        .build();

    container.get("tolerant").unwrap();

    let err = container.get("strict").unwrap_err();
    assert!(matches!(
        err.root_cause(),
        ContainerError::MethodNotFound { method, .. } if method == "boot"
    ));
}

#[test]
fn a_failing_init_method_aborts_and_rolls_back() {
    struct Fragile;

    let class = ClassSpec::builder::<Fragile>("Fragile")
        .no_arg_constructor(|| Fragile)
        .method("explode", |_: &Fragile| {
            Err(ContainerError::LifecycleFailure {
                id: String::new(),
                method: "explode".to_string(),
                detail: "broken".to_string(),
            })
        })
        .build();

    let container = Container::builder()
        .class(class)
        .blueprint(
            "fragile",
            Blueprint::for_class("Fragile").init_method("explode"),
        )
        .build();

    let err = container.get("fragile").unwrap_err();
    assert!(matches!(
        err.root_cause(),
        ContainerError::LifecycleFailure { .. }
    ));

    // The failed attempt left no cached instance behind; retrying fails the
    // same way instead of returning a half-initialized component.
    assert!(container.get("fragile").is_err());
}

struct ShortCircuit;

impl ComponentInterceptor for ShortCircuit {
    fn before_initialization(
        &self,
        _id: &str,
        _instance: chassis_di::AnyArc,
    ) -> chassis_di::ContainerResult<Option<chassis_di::AnyArc>> {
        Ok(None)
    }
}

#[test]
fn an_empty_interceptor_result_means_no_instance() {
    let journal: Journal = Arc::new(Mutex::new(Vec::new()));
    let container = Container::builder()
        .class(worker_class(journal))
        .interceptor(Arc::new(ShortCircuit))
        .blueprint("worker", Blueprint::for_class("Worker"))
        .build();

    assert!(matches!(
        container.get("worker"),
        Err(ContainerError::NoInstanceProduced(id)) if id == "worker"
    ));
}

struct PrebuiltProxy {
    replacement: chassis_di::AnyArc,
}

impl ComponentInterceptor for PrebuiltProxy {
    fn before_construction(
        &self,
        _id: &str,
        _class: &ClassSpec,
    ) -> chassis_di::ContainerResult<Option<chassis_di::AnyArc>> {
        Ok(Some(self.replacement.clone()))
    }
}

#[test]
fn a_before_construction_shortcut_skips_population_and_init() {
    struct Plain {
        label: Field<String>,
    }
    let class = ClassSpec::builder::<Plain>("Plain")
        .no_arg_constructor(|| Plain {
            label: Field::new(),
        })
        .value_property("label", |p: &Plain| &p.label)
        .build();

    let replacement = Arc::new(Plain {
        label: Field::new(),
    });
    let container = Container::builder()
        .class(class)
        .interceptor(Arc::new(PrebuiltProxy {
            replacement: replacement.clone(),
        }))
        .blueprint(
            "plain",
            Blueprint::for_class("Plain").prop("label", BlueprintValue::Str("ignored".into())),
        )
        .build();

    let resolved = container.get_as::<Plain>("plain").unwrap();
    assert!(Arc::ptr_eq(&resolved, &replacement));
    assert_eq!(resolved.label.get(), None);
}

struct VetoPopulation;

impl ComponentInterceptor for VetoPopulation {
    fn after_construction(
        &self,
        _id: &str,
        _instance: &chassis_di::AnyArc,
    ) -> chassis_di::ContainerResult<bool> {
        Ok(false)
    }
}

#[test]
fn an_after_construction_veto_skips_property_values() {
    struct Plain {
        label: Field<String>,
    }
    let class = ClassSpec::builder::<Plain>("Plain")
        .no_arg_constructor(|| Plain {
            label: Field::new(),
        })
        .value_property("label", |p: &Plain| &p.label)
        .build();

    let container = Container::builder()
        .class(class)
        .interceptor(Arc::new(VetoPopulation))
        .blueprint(
            "plain",
            Blueprint::for_class("Plain").prop("label", BlueprintValue::Str("skipped".into())),
        )
        .build();

    let resolved = container.get_as::<Plain>("plain").unwrap();
    assert_eq!(resolved.label.get(), None);
}

#[test]
fn synthetic_blueprints_bypass_the_interceptor_chain() {
    let journal: Journal = Arc::new(Mutex::new(Vec::new()));
    let container = Container::builder()
        .class(worker_class(journal))
        .interceptor(Arc::new(ShortCircuit))
        .blueprint("worker", Blueprint::for_class("Worker").synthetic())
        .build();

    // The short-circuiting interceptor never sees the synthetic component.
    assert!(container.get("worker").is_ok());
}
