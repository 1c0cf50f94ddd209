//! Provider declarations: how the value for an identifier is produced.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt, Shared};

use crate::core::{Journal, Value};
use crate::error::{Error, Result};
use crate::identifier::Identifier;
use crate::inject::{inject_properties, points_of, Injectable};
use crate::maybe_async::{MaybeAsync, Resolution};
use crate::table::{downcast, ResolutionTable};

type FactoryFn = Arc<dyn Fn(FactoryArgs) -> Resolution<Value> + Send + Sync>;
type ClassFn = Arc<dyn Fn() -> Constructed + Send + Sync>;
type AfterFn = Arc<dyn Fn(&Identifier, &Value) -> Resolution<()> + Send + Sync>;

/// Runs the property-injection pass for a freshly constructed instance.
pub(crate) type Injector =
  Box<dyn FnOnce(&ResolutionTable, &Journal) -> Option<Resolution<()>> + Send>;

/// How long a resolved value is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Lifetime {
  /// Constructed on first request and cached; the binding is frozen from then on.
  #[default]
  Singleton,
  /// Constructed (and injected) again on every request. Nothing is cached.
  Transient,
}

/// A constructed value, plus the injection pass still owed to it.
pub(crate) struct Constructed {
  pub(crate) value: Value,
  pub(crate) injector: Option<Injector>,
}

impl Constructed {
  fn plain(value: Value) -> Self {
    Self {
      value,
      injector: None,
    }
  }
}

/// Where a provider's raw value comes from.
pub(crate) enum Source {
  Value(Value),
  Deferred(Shared<BoxFuture<'static, Result<Value>>>),
  Factory {
    deps: Vec<Dependency>,
    factory: FactoryFn,
  },
  Class(ClassFn),
  /// A transient binding of another module's table, resolved there on every request.
  Forward {
    table: ResolutionTable,
    id: Identifier,
  },
}

impl Source {
  fn kind(&self) -> &'static str {
    match self {
      Source::Value(_) => "value",
      Source::Deferred(_) => "deferred value",
      Source::Factory { .. } => "factory",
      Source::Class(_) => "class",
      Source::Forward { .. } => "forwarded",
    }
  }
}

/// How a provider builds its value, minus the identifier it is registered under.
pub(crate) struct Recipe {
  source: Arc<Source>,
  pub(crate) lifetime: Lifetime,
  after: Vec<AfterFn>,
}

impl Recipe {
  pub(crate) fn forward(table: ResolutionTable, id: Identifier) -> Self {
    Self {
      source: Arc::new(Source::Forward { table, id }),
      lifetime: Lifetime::Transient,
      after: Vec::new(),
    }
  }

  /// Produces the raw value. Property injection is left to the caller so the value
  /// can be cached before its dependencies are requested.
  pub(crate) fn build(&self, table: &ResolutionTable, journal: &Journal) -> Resolution<Constructed> {
    match &*self.source {
      Source::Value(value) => MaybeAsync::Ready(Ok(Constructed::plain(value.clone()))),
      Source::Deferred(shared) => {
        MaybeAsync::Deferred(shared.clone().map(|r| r.map(Constructed::plain)).boxed())
      }
      Source::Class(construct) => MaybeAsync::Ready(Ok(construct())),
      Source::Forward { table, id } => table.resolve(id.clone()).map_ok(Constructed::plain),
      Source::Factory { deps, factory } => {
        let requests = deps
          .iter()
          .map(|dep| {
            let request = table.resolve_in(dep.id.clone(), journal);
            if dep.optional {
              request.map(|result| match result {
                Ok(value) => Ok(Some(value)),
                Err(Error::Undefined(_)) => Ok(None),
                Err(e) => Err(e),
              })
            } else {
              request.map_ok(Some)
            }
          })
          .collect::<Vec<_>>();
        let ids = deps.iter().map(|dep| dep.id.clone()).collect::<Vec<_>>();
        let factory = factory.clone();
        MaybeAsync::try_all(requests)
          .and_then(move |values| factory(FactoryArgs { ids, values }))
          .map_ok(Constructed::plain)
      }
    }
  }

  /// Runs the after-resolve handlers in declaration order.
  ///
  /// Stays ready while every handler is synchronous.
  pub(crate) fn after_resolve(&self, id: &Identifier, value: &Value) -> Resolution<()> {
    let mut chain = MaybeAsync::Ready(Ok(()));
    for handler in &self.after {
      let handler = handler.clone();
      let id = id.clone();
      let value = value.clone();
      chain = chain.and_then(move |()| handler(&id, &value));
    }
    chain
  }
}

fn sync_handler<T, F>(handler: F) -> AfterFn
where
  T: Any + Send + Sync,
  F: Fn(&T) -> Result<()> + Send + Sync + 'static,
{
  Arc::new(move |id: &Identifier, value: &Value| {
    MaybeAsync::Ready(downcast::<T>(id, value.clone()).and_then(|value| handler(&*value)))
  })
}

fn async_handler<T, F, Fut>(handler: F) -> AfterFn
where
  T: Any + Send + Sync,
  F: Fn(Arc<T>) -> Fut + Send + Sync + 'static,
  Fut: Future<Output = Result<()>> + Send + 'static,
{
  Arc::new(move |id: &Identifier, value: &Value| {
    match downcast::<T>(id, value.clone()) {
      Ok(value) => MaybeAsync::deferred(handler(value)),
      Err(e) => MaybeAsync::Ready(Err(e)),
    }
  })
}

/// A dependency passed to a factory, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
  pub id: Identifier,
  /// An undefined optional dependency is passed as absent instead of failing.
  pub optional: bool,
}

impl Dependency {
  pub fn required(id: impl Into<Identifier>) -> Self {
    Self {
      id: id.into(),
      optional: false,
    }
  }

  pub fn optional(id: impl Into<Identifier>) -> Self {
    Self {
      id: id.into(),
      optional: true,
    }
  }
}

/// The resolved dependencies handed to a factory.
#[derive(Clone)]
pub struct FactoryArgs {
  ids: Vec<Identifier>,
  values: Vec<Option<Value>>,
}

impl FactoryArgs {
  pub fn len(&self) -> usize {
    self.values.len()
  }

  pub fn is_empty(&self) -> bool {
    self.values.is_empty()
  }

  /// The dependency at `index`, which must be present and of type `T`.
  pub fn get<T: Any + Send + Sync>(&self, index: usize) -> Result<Arc<T>> {
    match self.optional::<T>(index)? {
      Some(value) => Ok(value),
      None => Err(Error::undefined(vec![crate::error::StackFrame::new(
        self.id_at(index),
      )])),
    }
  }

  /// The dependency at `index`, or `None` if it was optional and undefined.
  pub fn optional<T: Any + Send + Sync>(&self, index: usize) -> Result<Option<Arc<T>>> {
    match self.values.get(index) {
      Some(Some(value)) => downcast::<T>(&self.id_at(index), value.clone()).map(Some),
      _ => Ok(None),
    }
  }

  /// The untyped dependency at `index`.
  pub fn value(&self, index: usize) -> Option<&Value> {
    self.values.get(index).and_then(Option::as_ref)
  }

  fn id_at(&self, index: usize) -> Identifier {
    self
      .ids
      .get(index)
      .cloned()
      .unwrap_or_else(|| Identifier::name(format!("argument #{}", index)))
  }
}

impl fmt::Debug for FactoryArgs {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("FactoryArgs")
      .field("ids", &self.ids)
      .field(
        "present",
        &self.values.iter().map(Option::is_some).collect::<Vec<_>>(),
      )
      .finish()
  }
}

#[derive(Clone)]
pub(crate) enum ProviderKind {
  Recipe {
    source: Arc<Source>,
    lifetime: Lifetime,
    after: Vec<AfterFn>,
  },
  Existing(Identifier),
}

impl ProviderKind {
  /// The recipe a table stores for this provider, or the target of an alias.
  pub(crate) fn into_recipe(self) -> Result<Recipe, Identifier> {
    match self {
      ProviderKind::Recipe {
        source,
        lifetime,
        after,
      } => Ok(Recipe {
        source,
        lifetime,
        after,
      }),
      ProviderKind::Existing(target) => Err(target),
    }
  }
}

/// A declaration of how to produce the value for one identifier.
///
/// ```
/// use fibre_di::{Provider, ResolutionTable};
///
/// let table = ResolutionTable::new();
/// table.define(Provider::value("port", 8080u16)).unwrap();
/// table
///   .define(
///     Provider::factory("address", |args| Ok(format!("0.0.0.0:{}", args.get::<u16>(0)?)))
///       .inject("port"),
///   )
///   .unwrap();
/// table.define(Provider::existing("listen", "address")).unwrap();
///
/// let address = table.resolve_as::<String>("listen").into_ready().unwrap().unwrap();
/// assert_eq!(*address, "0.0.0.0:8080");
/// ```
///
/// [`Provider::lifetime`] and the `after` handlers apply to every kind except
/// [`Provider::existing`]; an alias takes them from its target.
#[derive(Clone)]
pub struct Provider {
  pub(crate) id: Identifier,
  pub(crate) kind: ProviderKind,
}

impl Provider {
  fn recipe(id: Identifier, source: Source) -> Self {
    Self {
      id,
      kind: ProviderKind::Recipe {
        source: Arc::new(source),
        lifetime: Lifetime::default(),
        after: Vec::new(),
      },
    }
  }

  /// A type bound under its own identifier, built with `construct` then injected.
  pub fn class<T: Injectable>() -> Self {
    Self::use_class::<T>(Identifier::of::<T>())
  }

  /// An instance of `T` bound under `id`.
  pub fn use_class<T: Injectable>(id: impl Into<Identifier>) -> Self {
    let points = Arc::new(points_of::<T>());
    let construct: ClassFn = Arc::new(move || {
      let instance = Arc::new(T::construct());
      let injector: Option<Injector> = if points.is_empty() {
        None
      } else {
        let points = points.clone();
        let target = instance.clone();
        Some(Box::new(move |table: &ResolutionTable, journal: &Journal| {
          inject_properties(target, points, table, journal)
        }))
      };
      Constructed {
        value: instance,
        injector,
      }
    });
    Self::recipe(id.into(), Source::Class(construct))
  }

  pub fn value<T: Any + Send + Sync>(id: impl Into<Identifier>, value: T) -> Self {
    Self::recipe(id.into(), Source::Value(Arc::new(value)))
  }

  /// A value that is already shared elsewhere; the same `Arc` is handed out.
  pub fn shared_value<T: Any + Send + Sync>(id: impl Into<Identifier>, value: Arc<T>) -> Self {
    Self::recipe(id.into(), Source::Value(value))
  }

  /// A value that becomes available once `future` settles.
  pub fn deferred_value<T, F>(id: impl Into<Identifier>, future: F) -> Self
  where
    T: Any + Send + Sync,
    F: Future<Output = Result<T>> + Send + 'static,
  {
    let future = future
      .map(|result| result.map(|value| Arc::new(value) as Value))
      .boxed()
      .shared();
    Self::recipe(id.into(), Source::Deferred(future))
  }

  /// A synchronous factory. Declare its arguments with [`FactoryProvider::inject`].
  pub fn factory<T, F>(id: impl Into<Identifier>, factory: F) -> FactoryProvider
  where
    T: Any + Send + Sync,
    F: Fn(&FactoryArgs) -> Result<T> + Send + Sync + 'static,
  {
    FactoryProvider {
      id: id.into(),
      deps: Vec::new(),
      lifetime: Lifetime::default(),
      after: Vec::new(),
      factory: Arc::new(move |args: FactoryArgs| {
        MaybeAsync::Ready(factory(&args).map(|value| Arc::new(value) as Value))
      }),
    }
  }

  /// A factory whose value settles later.
  pub fn async_factory<T, F, Fut>(id: impl Into<Identifier>, factory: F) -> FactoryProvider
  where
    T: Any + Send + Sync,
    F: Fn(FactoryArgs) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
  {
    FactoryProvider {
      id: id.into(),
      deps: Vec::new(),
      lifetime: Lifetime::default(),
      after: Vec::new(),
      factory: Arc::new(move |args: FactoryArgs| {
        MaybeAsync::deferred(
          factory(args).map(|result| result.map(|value| Arc::new(value) as Value)),
        )
      }),
    }
  }

  /// An alias: `id` resolves to whatever `target` resolves to.
  pub fn existing(id: impl Into<Identifier>, target: impl Into<Identifier>) -> Self {
    Self {
      id: id.into(),
      kind: ProviderKind::Existing(target.into()),
    }
  }

  /// Sets how long the resolved value is kept. Ignored for aliases.
  pub fn lifetime(mut self, lifetime: Lifetime) -> Self {
    if let ProviderKind::Recipe { lifetime: current, .. } = &mut self.kind {
      *current = lifetime;
    }
    self
  }

  pub fn transient(self) -> Self {
    self.lifetime(Lifetime::Transient)
  }

  /// Appends a handler that runs once the value is constructed and injected,
  /// before it is handed to the requester. A failing handler fails the resolution.
  pub fn after<T, F>(self, handler: F) -> Self
  where
    T: Any + Send + Sync,
    F: Fn(&T) -> Result<()> + Send + Sync + 'static,
  {
    self.push_after(sync_handler(handler))
  }

  /// Asynchronous counterpart of [`Provider::after`]; makes the resolution deferred.
  pub fn after_async<T, F, Fut>(self, handler: F) -> Self
  where
    T: Any + Send + Sync,
    F: Fn(Arc<T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
  {
    self.push_after(async_handler(handler))
  }

  fn push_after(mut self, handler: AfterFn) -> Self {
    if let ProviderKind::Recipe { after, .. } = &mut self.kind {
      after.push(handler);
    }
    self
  }

  pub fn id(&self) -> &Identifier {
    &self.id
  }

  pub fn is_alias(&self) -> bool {
    matches!(self.kind, ProviderKind::Existing(_))
  }
}

impl fmt::Debug for Provider {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mut debug = f.debug_struct("Provider");
    debug.field("id", &self.id);
    match &self.kind {
      ProviderKind::Existing(target) => debug.field("kind", &"existing").field("target", target),
      ProviderKind::Recipe {
        source,
        lifetime,
        after,
      } => debug
        .field("kind", &source.kind())
        .field("lifetime", lifetime)
        .field("after", &after.len()),
    };
    debug.finish()
  }
}

/// A factory provider under construction.
pub struct FactoryProvider {
  id: Identifier,
  deps: Vec<Dependency>,
  lifetime: Lifetime,
  after: Vec<AfterFn>,
  factory: FactoryFn,
}

impl FactoryProvider {
  /// Appends a required argument.
  pub fn inject(mut self, id: impl Into<Identifier>) -> Self {
    self.deps.push(Dependency::required(id));
    self
  }

  /// Appends an argument that is passed as absent when it is undefined.
  pub fn inject_optional(mut self, id: impl Into<Identifier>) -> Self {
    self.deps.push(Dependency::optional(id));
    self
  }

  pub fn dependency(mut self, dependency: Dependency) -> Self {
    self.deps.push(dependency);
    self
  }

  pub fn lifetime(mut self, lifetime: Lifetime) -> Self {
    self.lifetime = lifetime;
    self
  }

  /// The factory runs on every request.
  pub fn transient(self) -> Self {
    self.lifetime(Lifetime::Transient)
  }

  /// See [`Provider::after`].
  pub fn after<T, F>(mut self, handler: F) -> Self
  where
    T: Any + Send + Sync,
    F: Fn(&T) -> Result<()> + Send + Sync + 'static,
  {
    self.after.push(sync_handler(handler));
    self
  }

  pub fn after_async<T, F, Fut>(mut self, handler: F) -> Self
  where
    T: Any + Send + Sync,
    F: Fn(Arc<T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
  {
    self.after.push(async_handler(handler));
    self
  }
}

impl From<FactoryProvider> for Provider {
  fn from(provider: FactoryProvider) -> Self {
    Provider {
      id: provider.id,
      kind: ProviderKind::Recipe {
        source: Arc::new(Source::Factory {
          deps: provider.deps,
          factory: provider.factory,
        }),
        lifetime: provider.lifetime,
        after: provider.after,
      },
    }
  }
}
