use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use chassis_di::{Blueprint, ClassSpec, Container};

struct Shared;

/// Opt-in diagnostics: RUST_LOG=chassis_di=debug cargo test.
fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn counting_class(built: Arc<AtomicUsize>) -> Arc<ClassSpec> {
    ClassSpec::builder::<Shared>("Shared")
        .no_arg_constructor(move || {
            built.fetch_add(1, Ordering::SeqCst);
            // Widen the race window so contending threads pile up on the
            // in-creation lease instead of missing it.
            thread::sleep(Duration::from_millis(10));
            Shared
        })
        .build()
}

#[test]
fn contended_singleton_resolution_builds_exactly_once() {
    const THREADS: usize = 8;

    init_logging();
    let built = Arc::new(AtomicUsize::new(0));
    let container = Container::builder()
        .class(counting_class(built.clone()))
        .blueprint("shared", Blueprint::for_class("Shared"))
        .build();

    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let container = container.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                container.get_as::<Shared>("shared").unwrap()
            })
        })
        .collect();

    let instances: Vec<Arc<Shared>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(built.load(Ordering::SeqCst), 1);
    for instance in &instances[1..] {
        assert!(Arc::ptr_eq(&instances[0], instance));
    }
}

#[test]
fn contended_prototype_resolution_stays_independent() {
    const THREADS: usize = 8;

    let built = Arc::new(AtomicUsize::new(0));
    let container = Container::builder()
        .class(counting_class(built.clone()))
        .blueprint("fresh", Blueprint::for_class("Shared").prototype())
        .build();

    let barrier = Arc::new(Barrier::new(THREADS));
    crossbeam_utils::thread::scope(|s| {
        for _ in 0..THREADS {
            let container = container.clone();
            let barrier = barrier.clone();
            s.spawn(move |_| {
                barrier.wait();
                container.get_as::<Shared>("fresh").unwrap()
            });
        }
    })
    .unwrap();

    assert_eq!(built.load(Ordering::SeqCst), THREADS);
}

#[test]
fn distinct_singletons_resolve_in_parallel() {
    let built = Arc::new(AtomicUsize::new(0));
    let container = Container::builder()
        .class(counting_class(built.clone()))
        .blueprint("a", Blueprint::for_class("Shared"))
        .blueprint("b", Blueprint::for_class("Shared"))
        .blueprint("c", Blueprint::for_class("Shared"))
        .build();

    crossbeam_utils::thread::scope(|s| {
        for id in ["a", "b", "c"] {
            let container = container.clone();
            s.spawn(move |_| container.get(id).unwrap());
        }
    })
    .unwrap();

    assert_eq!(built.load(Ordering::SeqCst), 3);

    let a = container.get_as::<Shared>("a").unwrap();
    let b = container.get_as::<Shared>("b").unwrap();
    assert!(!Arc::ptr_eq(&a, &b));
}

#[test]
fn a_failing_creation_releases_waiting_threads() {
    const THREADS: usize = 4;

    struct Flaky;
    let attempts = Arc::new(AtomicUsize::new(0));
    let probe = attempts.clone();
    let class = ClassSpec::builder::<Flaky>("Flaky")
        .constructor(Vec::new(), move |_| {
            probe.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(10));
            Err::<Flaky, _>(chassis_di::ContainerError::LifecycleFailure {
                id: "flaky".to_string(),
                method: "<constructor>".to_string(),
                detail: "refused".to_string(),
            })
        })
        .build();

    let container = Container::builder()
        .class(class)
        .blueprint("flaky", Blueprint::for_class("Flaky"))
        .build();

    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let container = container.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                container.get("flaky").is_err()
            })
        })
        .collect();

    // Every waiter observes the failure or retries and fails itself; none
    // hangs on an abandoned lease.
    for handle in handles {
        assert!(handle.join().unwrap());
    }
    assert!(attempts.load(Ordering::SeqCst) >= 1);
}
