use fibre_di::{
  compose, Error, Inject, Injectable, Injections, Lifetime, MaybeAsync, Module, Provider,
  ResolutionTable,
};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use std::sync::{
  atomic::{AtomicUsize, Ordering},
  Arc,
};
use std::time::Duration;

fn ready<T: Send + 'static>(resolution: MaybeAsync<T>) -> T {
  match resolution {
    MaybeAsync::Ready(value) => value,
    MaybeAsync::Deferred(_) => panic!("expected a synchronous resolution"),
  }
}

// --- Fixtures ---

#[derive(Debug, Default)]
struct Request {
  user: Inject<String>,
}

impl Injectable for Request {
  fn construct() -> Self {
    Request::default()
  }

  fn injections(points: &mut Injections<Self>) {
    points.inject("user", "user", |this: &Self| &this.user);
  }
}

#[derive(Default)]
struct Recursive {
  child: Inject<Recursive>,
}

impl Injectable for Recursive {
  fn construct() -> Self {
    Recursive::default()
  }

  fn injections(points: &mut Injections<Self>) {
    points.inject_type("child", |this: &Self| &this.child);
  }
}

// --- Transient ---

#[test]
fn test_transient_factory_runs_on_every_request() {
  let table = ResolutionTable::new();
  let calls = Arc::new(AtomicUsize::new(0));
  let counter = calls.clone();
  table
    .define(
      Provider::factory("request_id", move |_| Ok(counter.fetch_add(1, Ordering::SeqCst)))
        .transient(),
    )
    .unwrap();

  let first = ready(table.resolve_as::<usize>("request_id")).unwrap();
  let second = ready(table.resolve_as::<usize>("request_id")).unwrap();

  assert_eq!((*first, *second), (0, 1));
  assert_eq!(calls.load(Ordering::SeqCst), 2);
  assert!(!table.is_resolved("request_id"));
  assert!(table.get("request_id").unwrap_err().is_undefined());
  // Never frozen, so it can still be replaced.
  table.define(Provider::value("request_id", 99usize)).unwrap();
  assert_eq!(*ready(table.resolve_as::<usize>("request_id")).unwrap(), 99);
}

#[test]
fn test_transient_class_is_injected_every_time() {
  let table = ResolutionTable::new();
  table.define(Provider::value("user", String::from("alice"))).unwrap();
  table
    .define(Provider::use_class::<Request>("request").lifetime(Lifetime::Transient))
    .unwrap();

  let first = ready(table.resolve_as::<Request>("request")).unwrap();
  let second = ready(table.resolve_as::<Request>("request")).unwrap();

  assert!(!Arc::ptr_eq(&first, &second));
  assert_eq!(*first.user, "alice");
  assert_eq!(*second.user, "alice");
}

#[test]
fn test_singleton_dependency_of_a_transient_is_shared() {
  let table = ResolutionTable::new();
  table
    .define(Provider::factory("pool", |_| Ok(String::from("pool"))))
    .unwrap();
  table
    .define(
      Provider::factory("handle", |args| Ok(args.get::<String>(0)?))
        .inject("pool")
        .transient(),
    )
    .unwrap();

  let first = ready(table.resolve_as::<Arc<String>>("handle")).unwrap();
  let second = ready(table.resolve_as::<Arc<String>>("handle")).unwrap();

  assert!(!Arc::ptr_eq(&first, &second));
  assert!(Arc::ptr_eq(&*first, &*second));
  assert!(table.is_resolved("pool"));
}

#[test]
fn test_transient_that_injects_itself_is_a_cycle() {
  let table = ResolutionTable::new();
  table.define(Provider::class::<Recursive>().transient()).unwrap();

  let error = ready(table.resolve(fibre_di::Identifier::of::<Recursive>())).unwrap_err();

  assert!(matches!(error, Error::Circular { .. }));
  // The marker is gone once the request returns.
  table.define(Provider::value(fibre_di::Identifier::of::<Recursive>(), 0u8)).unwrap();
}

#[tokio::test]
async fn test_async_transient_settles_separately() {
  let table = ResolutionTable::new();
  let calls = Arc::new(AtomicUsize::new(0));
  let counter = calls.clone();
  table
    .define(
      Provider::async_factory("token", move |_| {
        let token = counter.fetch_add(1, Ordering::SeqCst);
        async move {
          tokio::time::sleep(Duration::from_millis(5)).await;
          Ok(token)
        }
      })
      .transient(),
    )
    .unwrap();

  let first = table.resolve_as::<usize>("token");
  let second = table.resolve_as::<usize>("token");
  assert!(first.is_deferred());

  let (first, second) = tokio::join!(async { first.await }, async { second.await });
  assert_eq!((*first.unwrap(), *second.unwrap()), (0, 1));
}

#[tokio::test]
async fn test_exported_transient_stays_transient_across_modules() {
  let calls = Arc::new(AtomicUsize::new(0));
  let counter = calls.clone();
  let inner = Module::builder()
    .name("inner")
    .provide(
      Provider::factory("request_id", move |_| Ok(counter.fetch_add(1, Ordering::SeqCst)))
        .transient(),
    )
    .export("request_id")
    .build();
  let outer = Module::builder()
    .name("outer")
    .import(&inner)
    .export("request_id")
    .build();

  let container = compose(&outer).await.unwrap();
  let before = calls.load(Ordering::SeqCst);

  let first = container.resolve_as::<usize>("request_id").await.unwrap();
  let second = container.resolve_as::<usize>("request_id").await.unwrap();

  assert_ne!(*first, *second);
  assert_eq!(calls.load(Ordering::SeqCst), before + 2);
}

// --- After-resolve handlers ---

#[test]
fn test_sync_after_handlers_run_in_order_and_stay_ready() {
  let seen = Arc::new(Mutex::new(Vec::new()));
  let (first, second) = (seen.clone(), seen.clone());
  let table = ResolutionTable::new();
  table.define(Provider::value("user", String::from("bob"))).unwrap();
  table
    .define(
      Provider::use_class::<Request>("request")
        .after(move |request: &Request| {
          first.lock().push(format!("first {}", *request.user));
          Ok(())
        })
        .after(move |_: &Request| {
          second.lock().push(String::from("second"));
          Ok(())
        }),
    )
    .unwrap();

  let request = table.resolve_as::<Request>("request");
  assert!(request.is_ready());
  let again = ready(table.resolve_as::<Request>("request")).unwrap();

  assert!(Arc::ptr_eq(&ready(request).unwrap(), &again));
  assert_eq!(*seen.lock(), vec!["first bob", "second"]);
}

#[tokio::test]
async fn test_async_after_handler_makes_the_resolution_deferred() {
  let seen = Arc::new(Mutex::new(Vec::new()));
  let (sync_seen, async_seen, last_seen) = (seen.clone(), seen.clone(), seen.clone());
  let table = ResolutionTable::new();
  table
    .define(
      Provider::factory("config", |_| Ok(5u32))
        .after(move |value: &u32| {
          sync_seen.lock().push(format!("sync {}", value));
          Ok(())
        })
        .after_async(move |value: Arc<u32>| {
          let seen = async_seen.clone();
          async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            seen.lock().push(format!("async {}", value));
            Ok(())
          }
        })
        .after(move |_: &u32| {
          last_seen.lock().push(String::from("last"));
          Ok(())
        }),
    )
    .unwrap();

  let config = table.resolve_as::<u32>("config");
  assert!(config.is_deferred());
  assert_eq!(*config.await.unwrap(), 5);
  assert_eq!(*seen.lock(), vec!["sync 5", "async 5", "last"]);
}

#[test]
fn test_failing_after_handler_fails_and_reverts_the_resolution() {
  let attempts = Arc::new(AtomicUsize::new(0));
  let counter = attempts.clone();
  let table = ResolutionTable::new();
  table
    .define(Provider::value("port", 80u16).after(move |_: &u16| {
      if counter.fetch_add(1, Ordering::SeqCst) == 0 {
        Err(Error::provider("port check failed"))
      } else {
        Ok(())
      }
    }))
    .unwrap();

  let error = ready(table.resolve("port")).unwrap_err();
  assert_eq!(error.to_string(), "port check failed");
  assert!(!table.is_resolved("port"));

  assert_eq!(*ready(table.resolve_as::<u16>("port")).unwrap(), 80);
  assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

#[test]
fn test_after_handler_with_the_wrong_type() {
  let table = ResolutionTable::new();
  table
    .define(Provider::value("port", 80u16).after(|_: &String| Ok(())))
    .unwrap();

  let error = ready(table.resolve("port")).unwrap_err();
  assert!(matches!(error, Error::TypeMismatch { .. }));
}

#[test]
fn test_after_handlers_of_a_transient_run_per_request() {
  let runs = Arc::new(AtomicUsize::new(0));
  let counter = runs.clone();
  let table = ResolutionTable::new();
  table
    .define(
      Provider::factory("id", |_| Ok(1u8))
        .transient()
        .after(move |_: &u8| {
          counter.fetch_add(1, Ordering::SeqCst);
          Ok(())
        }),
    )
    .unwrap();

  for _ in 0..3 {
    ready(table.resolve("id")).unwrap();
  }
  assert_eq!(runs.load(Ordering::SeqCst), 3);
}
