use fibre_di::{Error, FactoryArgs, Identifier, MaybeAsync, Provider, ResolutionTable, Symbol};
use std::sync::{
  atomic::{AtomicUsize, Ordering},
  Arc,
};
use std::time::Duration;

// --- Helpers ---

fn ready<T: Send + 'static>(resolution: MaybeAsync<T>) -> T {
  match resolution {
    MaybeAsync::Ready(value) => value,
    MaybeAsync::Deferred(_) => panic!("expected a synchronous resolution"),
  }
}

fn counting_factory(id: &str, calls: &Arc<AtomicUsize>) -> Provider {
  let calls = calls.clone();
  Provider::factory(id, move |_| {
    calls.fetch_add(1, Ordering::SeqCst);
    Ok(String::from("built"))
  })
  .into()
}

// --- Tests ---

#[test]
fn test_factory_runs_at_most_once() {
  let table = ResolutionTable::new();
  let calls = Arc::new(AtomicUsize::new(0));
  table.define(counting_factory("service", &calls)).unwrap();

  let first = ready(table.resolve_as::<String>("service")).unwrap();
  let second = ready(table.resolve_as::<String>("service")).unwrap();

  assert!(Arc::ptr_eq(&first, &second));
  assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_alias_is_transparent() {
  let table = ResolutionTable::new();
  table.define(Provider::value("target", 7u32)).unwrap();
  table.define(Provider::existing("alias1", "alias2")).unwrap();
  table.alias("alias2", "target").unwrap();

  let through_alias = ready(table.resolve("alias1")).unwrap();
  let direct = ready(table.resolve("target")).unwrap();

  assert!(Arc::ptr_eq(&through_alias, &direct));
  assert_eq!(*table.get_as::<u32>("alias1").unwrap(), 7);
}

#[test]
fn test_redefinition_before_first_request_wins() {
  let table = ResolutionTable::new();
  table.define(Provider::value("port", 80u16)).unwrap();
  table.define(Provider::value("port", 8080u16)).unwrap();

  assert_eq!(*ready(table.resolve_as::<u16>("port")).unwrap(), 8080);
}

#[test]
fn test_resolved_identifier_is_frozen() {
  let table = ResolutionTable::new();
  table.define(Provider::value("port", 80u16)).unwrap();
  ready(table.resolve("port")).unwrap();

  let error = table.define(Provider::value("port", 8080u16)).unwrap_err();
  assert!(matches!(error, Error::Frozen(_)));
  assert_eq!(error.to_string(), "\"port\" is already frozen.");
  assert!(table.alias("port", "elsewhere").is_err());
  assert_eq!(*table.get_as::<u16>("port").unwrap(), 80);
}

#[test]
fn test_has_does_not_construct() {
  let table = ResolutionTable::new();
  let calls = Arc::new(AtomicUsize::new(0));
  table.define(counting_factory("service", &calls)).unwrap();
  table.alias("service_alias", "service").unwrap();
  table.alias("dangling", "nowhere").unwrap();

  assert!(table.has("service"));
  assert!(table.has("service_alias"));
  assert!(!table.has("dangling"));
  assert!(!table.has("nowhere"));
  assert_eq!(calls.load(Ordering::SeqCst), 0);
  assert!(!table.is_resolved("service"));
}

#[test]
fn test_get_only_returns_resolved_values() {
  let table = ResolutionTable::new();
  table.define(Provider::value("answer", 42i32)).unwrap();

  assert!(table.get("answer").unwrap_err().is_undefined());
  ready(table.resolve("answer")).unwrap();
  assert_eq!(*table.get_as::<i32>("answer").unwrap(), 42);
  assert_eq!(table.resolved_identifiers(), vec![Identifier::from("answer")]);
}

#[test]
fn test_synchronous_chain_stays_synchronous() {
  let table = ResolutionTable::new();
  table.define(Provider::value("host", String::from("localhost"))).unwrap();
  table.define(Provider::value("port", 5432u16)).unwrap();
  table
    .define(
      Provider::factory("url", |args: &FactoryArgs| {
        Ok(format!("{}:{}", args.get::<String>(0)?, args.get::<u16>(1)?))
      })
      .inject("host")
      .inject("port"),
    )
    .unwrap();

  let url = table.resolve_as::<String>("url");
  assert!(url.is_ready());
  assert_eq!(*ready(url).unwrap(), "localhost:5432");
}

#[tokio::test]
async fn test_async_factory_is_shared_while_pending() {
  let table = ResolutionTable::new();
  let calls = Arc::new(AtomicUsize::new(0));
  let counter = calls.clone();
  table
    .define(Provider::async_factory("slow", move |_| {
      counter.fetch_add(1, Ordering::SeqCst);
      async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        Ok(99u64)
      }
    }))
    .unwrap();

  let first = table.resolve_as::<u64>("slow");
  let second = table.resolve_as::<u64>("slow");
  assert!(first.is_deferred());
  assert!(second.is_deferred());
  assert!(table.has("slow"));

  let (first, second) = tokio::join!(async { first.await }, async { second.await });
  let (first, second) = (first.unwrap(), second.unwrap());
  assert!(Arc::ptr_eq(&first, &second));
  assert_eq!(*first, 99);
  assert_eq!(calls.load(Ordering::SeqCst), 1);

  // Settled values are served synchronously from then on.
  assert!(table.resolve("slow").is_ready());
  assert!(table.is_resolved("slow"));
}

#[tokio::test]
async fn test_deferred_dependency_defers_dependents() {
  let table = ResolutionTable::new();
  table
    .define(Provider::deferred_value("token", async {
      tokio::time::sleep(Duration::from_millis(5)).await;
      Ok(String::from("secret"))
    }))
    .unwrap();
  table
    .define(
      Provider::factory("header", |args| Ok(format!("Bearer {}", args.get::<String>(0)?))).inject("token"),
    )
    .unwrap();

  let header = table.resolve_as::<String>("header");
  assert!(header.is_deferred());
  assert_eq!(*header.await.unwrap(), "Bearer secret");
}

#[test]
fn test_failed_construction_can_be_retried() {
  let table = ResolutionTable::new();
  let attempts = Arc::new(AtomicUsize::new(0));
  let counter = attempts.clone();
  table
    .define(Provider::factory("flaky", move |_| {
      if counter.fetch_add(1, Ordering::SeqCst) == 0 {
        Err(Error::provider("connection refused"))
      } else {
        Ok(1u8)
      }
    }))
    .unwrap();

  let error = ready(table.resolve("flaky")).unwrap_err();
  assert_eq!(error.to_string(), "connection refused");
  assert!(!table.is_resolved("flaky"));

  assert_eq!(*ready(table.resolve_as::<u8>("flaky")).unwrap(), 1);
  assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

#[test]
fn test_optional_dependencies() {
  let table = ResolutionTable::new();
  table.define(Provider::value("present", 3usize)).unwrap();
  table
    .define(
      Provider::factory("sum", |args| {
        let present = args.optional::<usize>(0)?.map_or(0, |v| *v);
        let absent = args.optional::<usize>(1)?.map_or(0, |v| *v);
        assert!(args.value(1).is_none());
        Ok(present + absent)
      })
      .inject_optional("present")
      .inject_optional("absent"),
    )
    .unwrap();

  assert_eq!(*ready(table.resolve_as::<usize>("sum")).unwrap(), 3);
}

#[test]
fn test_type_mismatch() {
  let table = ResolutionTable::new();
  table.define(Provider::value("port", 80u16)).unwrap();

  let error = ready(table.resolve_as::<String>("port")).unwrap_err();
  assert!(matches!(error, Error::TypeMismatch { .. }));
}

#[test]
fn test_factory_argument_cycle_is_reported() {
  let table = ResolutionTable::new();
  table
    .define(Provider::factory("a", |args| Ok(*args.get::<u8>(0)?)).inject("b"))
    .unwrap();
  table
    .define(Provider::factory("b", |args| Ok(*args.get::<u8>(0)?)).inject("a"))
    .unwrap();

  let error = ready(table.resolve("a")).unwrap_err();
  match &error {
    Error::Circular { id, stack } => {
      assert_eq!(*id, Identifier::from("a"));
      assert_eq!(stack.identifiers(), vec!["\"a\"", "\"b\"", "\"a\""]);
    }
    other => panic!("expected a circular error, got {other:?}"),
  }
  // Nothing was left half-constructed.
  assert!(!table.is_resolved("a"));
  assert!(!table.is_resolved("b"));
}

#[test]
fn test_alias_cycle_terminates_as_undefined() {
  let table = ResolutionTable::new();
  table.alias("ping", "pong").unwrap();
  table.alias("pong", "ping").unwrap();

  let error = ready(table.resolve("ping")).unwrap_err();
  assert!(error.is_undefined());
  assert!(!table.has("ping"));
}

#[test]
fn test_symbol_and_type_identifiers() {
  struct Clock;

  let table = ResolutionTable::new();
  let token = Symbol::new("token");
  let lookalike = Symbol::new("token");
  table.define(Provider::value(&token, 1u8)).unwrap();
  table.define(Provider::value(Identifier::of::<Clock>(), 2u8)).unwrap();

  assert!(table.has(&token));
  assert!(!table.has(&lookalike));
  assert_eq!(*ready(table.resolve_as::<u8>(Identifier::of::<Clock>())).unwrap(), 2);
}

#[test]
fn test_pending_resolution_does_not_keep_the_table_alive() {
  let payload = Arc::new(String::from("payload"));
  let table = ResolutionTable::new();
  table.define(Provider::shared_value("payload", payload.clone())).unwrap();
  table
    .define(Provider::async_factory("slow", |_| async {
      tokio::time::sleep(Duration::from_millis(5)).await;
      Ok(1u8)
    }))
    .unwrap();

  let resolution = table.resolve("slow");
  assert!(resolution.is_deferred());
  drop(resolution);
  assert_eq!(Arc::strong_count(&payload), 2);

  drop(table);
  assert_eq!(Arc::strong_count(&payload), 1);
}

#[tokio::test]
async fn test_pending_resolution_outliving_its_table() {
  let table = ResolutionTable::new();
  table
    .define(Provider::async_factory("slow", |_| async {
      tokio::time::sleep(Duration::from_millis(5)).await;
      Ok(1u8)
    }))
    .unwrap();

  let resolution = table.resolve("slow");
  drop(table);

  assert!(matches!(resolution.await, Err(Error::Disposed)));
}
