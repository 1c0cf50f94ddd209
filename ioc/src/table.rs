//! The resolution table: identifier to provider, in-flight resolution or resolved value.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use futures_util::future::FutureExt;
use tracing::trace;

use crate::config::ContainerConfig;
use crate::core::{self, ConstructionGuard, Journal, Lookup, Slot, Value};
use crate::error::{Error, Result, StackFrame};
use crate::identifier::Identifier;
use crate::inject::{inject_properties, points_of, Injectable};
use crate::maybe_async::{MaybeAsync, Resolution};
use crate::provider::{Constructed, Lifetime, Provider, Recipe};

/// Downcasts a stored value to the concrete type a caller asked for.
pub(crate) fn downcast<T: Any + Send + Sync>(id: &Identifier, value: Value) -> Result<Arc<T>> {
  value.downcast::<T>().map_err(|_| Error::TypeMismatch {
    id: id.clone(),
    expected: std::any::type_name::<T>(),
  })
}

/// Maps identifiers to providers and caches what they produce.
///
/// Every identifier is constructed at most once: the first request runs the
/// provider and later requests observe the same value, or the same in-flight
/// resolution while it is still pending. A binding that has been resolved is
/// frozen and can no longer be redefined. Transient providers are the exception:
/// they run again on every request and never freeze their binding.
///
/// The table is a cheap handle; clones share the same bindings.
#[derive(Clone)]
pub struct ResolutionTable {
  inner: Arc<TableInner>,
}

struct TableInner {
  slots: DashMap<Identifier, Slot>,
  config: ContainerConfig,
}

impl Default for ResolutionTable {
  fn default() -> Self {
    Self::with_config(ContainerConfig::default())
  }
}

impl ResolutionTable {
  /// Creates a new, empty `ResolutionTable`.
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_config(config: ContainerConfig) -> Self {
    Self {
      inner: Arc::new(TableInner {
        slots: DashMap::new(),
        config,
      }),
    }
  }

  pub fn config(&self) -> &ContainerConfig {
    &self.inner.config
  }

  fn upgrade(inner: &Weak<TableInner>) -> Option<Self> {
    inner.upgrade().map(|inner| Self { inner })
  }

  // --- Definition ---

  /// Installs `provider`, replacing any earlier declaration for the same identifier.
  ///
  /// Fails with [`Error::Frozen`] once the identifier has been requested.
  pub fn define(&self, provider: impl Into<Provider>) -> Result<()> {
    let provider = provider.into();
    let slot = match provider.kind.into_recipe() {
      Ok(recipe) => Slot::Unresolved(Arc::new(recipe)),
      Err(target) => Slot::Alias(target),
    };
    self.install(provider.id, slot)
  }

  /// Declares `id` as an alias of `target`.
  pub fn alias(&self, id: impl Into<Identifier>, target: impl Into<Identifier>) -> Result<()> {
    self.install(id.into(), Slot::Alias(target.into()))
  }

  fn install(&self, id: Identifier, slot: Slot) -> Result<()> {
    match self.inner.slots.entry(id) {
      dashmap::mapref::entry::Entry::Occupied(mut entry) => {
        if entry.get().is_frozen() {
          return Err(Error::Frozen(entry.key().clone()));
        }
        entry.insert(slot);
      }
      dashmap::mapref::entry::Entry::Vacant(entry) => {
        entry.insert(slot);
      }
    }
    Ok(())
  }

  /// Makes `id` of `source` visible in this table.
  ///
  /// Resolved values are shared as they are. A transient binding keeps running in
  /// `source`, so every request here still gets a fresh value.
  pub(crate) fn import(&self, source: &ResolutionTable, id: Identifier) -> Result<()> {
    let slot = if source.is_transient(&id) {
      Slot::Unresolved(Arc::new(Recipe::forward(source.clone(), id.clone())))
    } else {
      Slot::Resolved(source.get(id.clone())?)
    };
    self.inner.slots.insert(id, slot);
    Ok(())
  }

  fn is_transient(&self, id: &Identifier) -> bool {
    let mut current = id.clone();
    for _ in 0..=self.inner.config.max_alias_depth {
      let next = match self.inner.slots.get(&current).as_deref() {
        Some(Slot::Unresolved(recipe)) => return recipe.lifetime == Lifetime::Transient,
        Some(Slot::Alias(target)) => target.clone(),
        _ => return false,
      };
      current = next;
    }
    false
  }

  // --- Lookup ---

  /// Reports whether `id` (after following aliases) has a binding, without
  /// constructing anything.
  pub fn has(&self, id: impl Into<Identifier>) -> bool {
    let mut current = id.into();
    for _ in 0..=self.inner.config.max_alias_depth {
      let target = match self.inner.slots.get(&current) {
        None => return false,
        Some(slot) => match &*slot {
          Slot::Alias(target) => target.clone(),
          _ => return true,
        },
      };
      current = target;
    }
    false
  }

  /// Returns the value of `id` if it has already been resolved.
  pub fn get(&self, id: impl Into<Identifier>) -> Result<Value> {
    let requested = id.into();
    let mut hops = Vec::new();
    let mut current = requested;
    loop {
      let next = match self.inner.slots.get(&current) {
        Some(slot) => match &*slot {
          Slot::Resolved(value) => return Ok(value.clone()),
          Slot::Alias(target) => Some(target.clone()),
          _ => None,
        },
        None => None,
      };
      match next {
        Some(target) if self.can_follow(&hops, &current, &target) => {
          hops.push(current);
          current = target;
        }
        _ => return Err(Error::undefined(vec![StackFrame::new(current)]).within_aliases(&hops)),
      }
    }
  }

  pub fn get_as<T: Any + Send + Sync>(&self, id: impl Into<Identifier>) -> Result<Arc<T>> {
    let id = id.into();
    downcast::<T>(&id, self.get(id.clone())?)
  }

  /// Whether `id` itself holds a frozen, resolved value (aliases are not followed).
  pub fn is_resolved(&self, id: impl Into<Identifier>) -> bool {
    let id = id.into();
    matches!(
      self.inner.slots.get(&id).as_deref(),
      Some(Slot::Resolved(_))
    )
  }

  /// Every identifier that currently holds a resolved value.
  pub fn resolved_identifiers(&self) -> Vec<Identifier> {
    self
      .inner
      .slots
      .iter()
      .filter(|entry| matches!(entry.value(), Slot::Resolved(_)))
      .map(|entry| entry.key().clone())
      .collect()
  }

  pub fn len(&self) -> usize {
    self.inner.slots.len()
  }

  pub fn is_empty(&self) -> bool {
    self.inner.slots.is_empty()
  }

  fn can_follow(&self, hops: &[Identifier], current: &Identifier, target: &Identifier) -> bool {
    hops.len() < self.inner.config.max_alias_depth
      && target != current
      && !hops.contains(target)
  }

  // --- Resolution ---

  /// Resolves `id`, constructing it on first request.
  ///
  /// The result stays [`MaybeAsync::Ready`] when every provider involved is
  /// synchronous.
  pub fn resolve(&self, id: impl Into<Identifier>) -> Resolution<Value> {
    self.resolve_in(id.into(), &Journal::default())
  }

  /// Resolves `id` on behalf of a construction whose bindings are tracked in `journal`.
  pub(crate) fn resolve_in(&self, id: Identifier, journal: &Journal) -> Resolution<Value> {
    let mut hops: Vec<Identifier> = Vec::new();
    let mut current = id;
    loop {
      match core::claim(&self.inner.slots, &current) {
        Lookup::Alias(target) => {
          if !self.can_follow(&hops, &current, &target) {
            return MaybeAsync::Ready(Err(
              Error::undefined(vec![StackFrame::new(current)]).within_aliases(&hops),
            ));
          }
          trace!(alias = %current, target = %target, "following alias");
          hops.push(current);
          current = target;
        }
        Lookup::Missing => {
          return MaybeAsync::Ready(Err(
            Error::undefined(vec![StackFrame::new(current)]).within_aliases(&hops),
          ));
        }
        Lookup::Resolved(value) => return MaybeAsync::Ready(Ok(value)),
        Lookup::Pending(shared) => {
          return MaybeAsync::Deferred(
            shared
              .map(move |result| result.map_err(|e| e.within_aliases(&hops)))
              .boxed(),
          );
        }
        Lookup::Constructing => {
          return MaybeAsync::Ready(Err(
            Error::circular(current.clone(), vec![StackFrame::new(current)]).within_aliases(&hops),
          ));
        }
        Lookup::Claimed(recipe) => {
          return self
            .construct(current, recipe, journal)
            .map_err(move |e| e.within_aliases(&hops));
        }
      }
    }
  }

  pub fn resolve_as<T: Any + Send + Sync>(&self, id: impl Into<Identifier>) -> Resolution<Arc<T>> {
    let id = id.into();
    self
      .resolve(id.clone())
      .map(move |result| result.and_then(|value| downcast::<T>(&id, value)))
  }

  /// Constructs and injects a fresh instance of `T` without caching it.
  pub fn create<T: Injectable>(&self) -> Resolution<Arc<T>> {
    let instance = Arc::new(T::construct());
    let points = Arc::new(points_of::<T>());
    match inject_properties(instance.clone(), points, self, &Journal::default()) {
      None => MaybeAsync::Ready(Ok(instance)),
      Some(injection) => injection.map_ok(move |()| instance),
    }
  }

  fn construct(&self, id: Identifier, recipe: Arc<Recipe>, parent: &Journal) -> Resolution<Value> {
    match recipe.lifetime {
      Lifetime::Singleton => self.construct_singleton(id, recipe, parent),
      Lifetime::Transient => self.construct_transient(id, recipe, parent),
    }
  }

  fn construct_singleton(
    &self,
    id: Identifier,
    recipe: Arc<Recipe>,
    parent: &Journal,
  ) -> Resolution<Value> {
    trace!(id = %id, "constructing");
    let guard = ConstructionGuard::new(&self.inner.slots, id.clone(), recipe.clone());
    match recipe.build(self, parent) {
      MaybeAsync::Ready(Ok(constructed)) => {
        // Cache before injecting so cycles observe this instance.
        guard.finish(Slot::Resolved(constructed.value.clone()));
        self.complete(id, recipe, constructed, parent.clone())
      }
      MaybeAsync::Ready(Err(e)) => {
        drop(guard);
        MaybeAsync::Ready(Err(e.within(StackFrame::new(id))))
      }
      MaybeAsync::Deferred(future) => {
        // The slot owns this future, so it must not keep the table alive.
        let inner = Arc::downgrade(&self.inner);
        let pending_id = id.clone();
        let pending_recipe = recipe.clone();
        let parent = parent.clone();
        let shared = async move {
          let built = future.await;
          let Some(table) = Self::upgrade(&inner) else {
            return Err(Error::Disposed);
          };
          match built {
            Ok(constructed) => {
              table.settle(&pending_id, constructed.value.clone());
              let completion = table.complete(pending_id, pending_recipe, constructed, parent);
              drop(table);
              completion.await
            }
            Err(e) => {
              core::revert(&table.inner.slots, &pending_id, pending_recipe, |slot| {
                matches!(slot, Slot::Pending(..))
              });
              Err(e.within(StackFrame::new(pending_id)))
            }
          }
        }
        .boxed()
        .shared();
        guard.finish(Slot::Pending(recipe, shared.clone()));
        MaybeAsync::Deferred(shared.boxed())
      }
    }
  }

  /// Builds a value that is never cached.
  ///
  /// The slot is only marked as constructing while the synchronous part runs, which
  /// is enough to report a transient that depends on itself as a cycle.
  fn construct_transient(
    &self,
    id: Identifier,
    recipe: Arc<Recipe>,
    parent: &Journal,
  ) -> Resolution<Value> {
    trace!(id = %id, "constructing transient");
    let _guard = ConstructionGuard::new(&self.inner.slots, id.clone(), recipe.clone());
    match recipe.build(self, parent) {
      MaybeAsync::Ready(Ok(constructed)) => self.complete(id, recipe, constructed, parent.clone()),
      MaybeAsync::Ready(Err(e)) => MaybeAsync::Ready(Err(e.within(StackFrame::new(id)))),
      MaybeAsync::Deferred(future) => {
        let inner = Arc::downgrade(&self.inner);
        let parent = parent.clone();
        MaybeAsync::deferred(async move {
          let constructed = future
            .await
            .map_err(|e| e.within(StackFrame::new(id.clone())))?;
          let Some(table) = Self::upgrade(&inner) else {
            return Err(Error::Disposed);
          };
          let completion = table.complete(id, recipe, constructed, parent);
          drop(table);
          completion.await
        })
      }
    }
  }

  fn settle(&self, id: &Identifier, value: Value) {
    if let Some(mut slot) = self.inner.slots.get_mut(id) {
      if matches!(&*slot, Slot::Pending(..)) {
        *slot = Slot::Resolved(value);
      }
    }
  }

  /// Runs the injection pass and the after-resolve handlers of a constructed value.
  ///
  /// Bindings frozen during the pass are journaled. On success they join `parent`
  /// along with this binding; on failure they are reverted together with it.
  fn complete(
    &self,
    id: Identifier,
    recipe: Arc<Recipe>,
    constructed: Constructed,
    parent: Journal,
  ) -> Resolution<Value> {
    let Constructed { value, injector } = constructed;
    let journal = Journal::default();
    let injection = injector
      .and_then(|injector| injector(self, &journal))
      .unwrap_or(MaybeAsync::Ready(Ok(())));
    let hooks = recipe.clone();
    let hooked_id = id.clone();
    let hooked = value.clone();
    let finished = injection.and_then(move |()| hooks.after_resolve(&hooked_id, &hooked));

    let inner = Arc::downgrade(&self.inner);
    finished.map(move |result| {
      let singleton = recipe.lifetime == Lifetime::Singleton;
      match result {
        Ok(()) => {
          parent.absorb(&journal);
          if singleton {
            parent.record(id, recipe, value.clone());
          }
          Ok(value)
        }
        Err(e) => {
          if let Some(inner) = inner.upgrade() {
            journal.rollback(&inner.slots);
            if singleton {
              core::revert(&inner.slots, &id, recipe, |slot| {
                matches!(slot, Slot::Resolved(current) if Arc::ptr_eq(current, &value))
              });
            }
          }
          Err(e.within(StackFrame::new(id)))
        }
      }
    })
  }
}

impl fmt::Debug for ResolutionTable {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ResolutionTable")
      .field("bindings", &self.inner.slots.len())
      .field("config", &self.inner.config)
      .finish()
  }
}
