use std::sync::Arc;

use chassis_di::{
    AutowireMode, Blueprint, ClassSpec, Container, ContainerError, DependencyCheck, Slot,
};

trait Repository: Send + Sync {
    fn name(&self) -> &'static str;
}

struct SqlRepository;
impl Repository for SqlRepository {
    fn name(&self) -> &'static str {
        "sql"
    }
}

struct MemoryRepository;
impl Repository for MemoryRepository {
    fn name(&self) -> &'static str {
        "memory"
    }
}

struct Service {
    repository: Slot<dyn Repository>,
}

fn sql_class() -> Arc<ClassSpec> {
    ClassSpec::builder::<SqlRepository>("SqlRepository")
        .no_arg_constructor(|| SqlRepository)
        .implements::<dyn Repository>(|this| this)
        .build()
}

fn memory_class() -> Arc<ClassSpec> {
    ClassSpec::builder::<MemoryRepository>("MemoryRepository")
        .no_arg_constructor(|| MemoryRepository)
        .implements::<dyn Repository>(|this| this)
        .build()
}

fn service_class() -> Arc<ClassSpec> {
    ClassSpec::builder::<Service>("Service")
        .no_arg_constructor(|| Service {
            repository: Slot::new(),
        })
        .ref_property("repository", |s: &Service| &s.repository)
        .build()
}

#[test]
fn by_name_autowiring_matches_property_names_to_identifiers() {
    let container = Container::builder()
        .class(sql_class())
        .class(service_class())
        .blueprint("repository", Blueprint::for_class("SqlRepository"))
        .blueprint(
            "service",
            Blueprint::for_class("Service").autowire(AutowireMode::ByName),
        )
        .build();

    let service = container.get_as::<Service>("service").unwrap();
    assert_eq!(service.repository.get().unwrap().name(), "sql");
}

#[test]
fn by_type_autowiring_with_a_single_candidate() {
    let container = Container::builder()
        .class(sql_class())
        .class(service_class())
        .blueprint("someRepo", Blueprint::for_class("SqlRepository"))
        .blueprint(
            "service",
            Blueprint::for_class("Service").autowire(AutowireMode::ByType),
        )
        .build();

    let service = container.get_as::<Service>("service").unwrap();
    assert_eq!(service.repository.get().unwrap().name(), "sql");
}

#[test]
fn ambiguous_candidates_fail_with_a_detailed_error() {
    let container = Container::builder()
        .class(sql_class())
        .class(memory_class())
        .class(service_class())
        .blueprint("sqlRepo", Blueprint::for_class("SqlRepository"))
        .blueprint("memRepo", Blueprint::for_class("MemoryRepository"))
        .blueprint(
            "service",
            Blueprint::for_class("Service").autowire(AutowireMode::ByType),
        )
        .build();

    let err = container.get("service").unwrap_err();
    assert!(matches!(
        err.root_cause(),
        ContainerError::UnsatisfiedDependency { property, .. } if property == "repository"
    ));
}

#[test]
fn the_primary_flag_breaks_by_type_ties() {
    let container = Container::builder()
        .class(sql_class())
        .class(memory_class())
        .class(service_class())
        .blueprint("sqlRepo", Blueprint::for_class("SqlRepository"))
        .blueprint("memRepo", Blueprint::for_class("MemoryRepository").primary())
        .blueprint(
            "service",
            Blueprint::for_class("Service").autowire(AutowireMode::ByType),
        )
        .build();

    let service = container.get_as::<Service>("service").unwrap();
    assert_eq!(service.repository.get().unwrap().name(), "memory");
}

#[test]
fn qualifiers_matching_the_property_name_break_ties() {
    let container = Container::builder()
        .class(sql_class())
        .class(memory_class())
        .class(service_class())
        .blueprint(
            "sqlRepo",
            Blueprint::for_class("SqlRepository").qualifier("repository"),
        )
        .blueprint("memRepo", Blueprint::for_class("MemoryRepository"))
        .blueprint(
            "service",
            Blueprint::for_class("Service").autowire(AutowireMode::ByType),
        )
        .build();

    let service = container.get_as::<Service>("service").unwrap();
    assert_eq!(service.repository.get().unwrap().name(), "sql");
}

#[test]
fn a_candidate_id_matching_the_property_name_breaks_ties() {
    let container = Container::builder()
        .class(sql_class())
        .class(memory_class())
        .class(service_class())
        .blueprint("repository", Blueprint::for_class("SqlRepository"))
        .blueprint("backup", Blueprint::for_class("MemoryRepository"))
        .blueprint(
            "service",
            Blueprint::for_class("Service").autowire(AutowireMode::ByType),
        )
        .build();

    let service = container.get_as::<Service>("service").unwrap();
    assert_eq!(service.repository.get().unwrap().name(), "sql");
}

#[test]
fn excluded_candidates_are_never_autowired() {
    let container = Container::builder()
        .class(sql_class())
        .class(memory_class())
        .class(service_class())
        .blueprint(
            "sqlRepo",
            Blueprint::for_class("SqlRepository").not_autowire_candidate(),
        )
        .blueprint("memRepo", Blueprint::for_class("MemoryRepository"))
        .blueprint(
            "service",
            Blueprint::for_class("Service").autowire(AutowireMode::ByType),
        )
        .build();

    let service = container.get_as::<Service>("service").unwrap();
    assert_eq!(service.repository.get().unwrap().name(), "memory");
}

#[test]
fn explicit_values_take_precedence_over_autowiring() {
    let container = Container::builder()
        .class(sql_class())
        .class(memory_class())
        .class(service_class())
        .blueprint("sqlRepo", Blueprint::for_class("SqlRepository").primary())
        .blueprint("memRepo", Blueprint::for_class("MemoryRepository"))
        .blueprint(
            "service",
            Blueprint::for_class("Service")
                .autowire(AutowireMode::ByType)
                .prop_ref("repository", "memRepo"),
        )
        .build();

    let service = container.get_as::<Service>("service").unwrap();
    assert_eq!(service.repository.get().unwrap().name(), "memory");
}

#[test]
fn dependency_checking_reports_unset_required_properties() {
    let container = Container::builder()
        .class(service_class())
        .blueprint(
            "service",
            Blueprint::for_class("Service").dependency_check(DependencyCheck::Objects),
        )
        .build();

    let err = container.get("service").unwrap_err();
    assert!(matches!(
        err.root_cause(),
        ContainerError::UnsatisfiedDependency { property, detail, .. }
            if property == "repository" && detail.contains("unset")
    ));
}

#[test]
fn by_type_autowiring_never_instantiates_rejected_candidates() {
    use std::sync::atomic::{AtomicUsize, Ordering};

    let built = Arc::new(AtomicUsize::new(0));
    let probe = built.clone();
    let counting_sql = ClassSpec::builder::<SqlRepository>("SqlRepository")
        .no_arg_constructor(move || {
            probe.fetch_add(1, Ordering::SeqCst);
            SqlRepository
        })
        .implements::<dyn Repository>(|this| this)
        .build();

    let container = Container::builder()
        .class(counting_sql)
        .class(memory_class())
        .class(service_class())
        .blueprint(
            "sqlRepo",
            Blueprint::for_class("SqlRepository").not_autowire_candidate(),
        )
        .blueprint("memRepo", Blueprint::for_class("MemoryRepository"))
        .blueprint(
            "service",
            Blueprint::for_class("Service").autowire(AutowireMode::ByType),
        )
        .build();

    container.get("service").unwrap();
    assert_eq!(built.load(Ordering::SeqCst), 0);
}
