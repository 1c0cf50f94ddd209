//! Property injection: declaring injection points and filling them after construction.
//!
//! A type opts in by implementing [`Injectable`]. Its dependencies live in
//! [`Inject<T>`] fields, which are filled *after* the instance has been constructed
//! and cached. That ordering is what lets two types reference each other (or a type
//! reference itself) without deadlocking resolution.
//!
//! ```
//! use fibre_di::{Inject, Injectable, Injections};
//!
//! #[derive(Default)]
//! struct Driver;
//!
//! impl Injectable for Driver {
//!   fn construct() -> Self {
//!     Driver
//!   }
//! }
//!
//! #[derive(Default)]
//! struct Connection {
//!   driver: Inject<Driver>,
//!   timeout: Inject<u64>,
//! }
//!
//! impl Injectable for Connection {
//!   fn construct() -> Self {
//!     Connection::default()
//!   }
//!
//!   fn injections(points: &mut Injections<Self>) {
//!     points
//!       .inject_type("driver", |this: &Self| &this.driver)
//!       .inject("timeout", "CONNECTION_TIMEOUT", |this: &Self| &this.timeout);
//!   }
//! }
//! ```

use std::any::Any;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::core::{Journal, Value};
use crate::error::{Error, Result};
use crate::identifier::Identifier;
use crate::maybe_async::{MaybeAsync, Resolution};
use crate::table::{downcast, ResolutionTable};

/// A type the container can construct and then fill through property injection.
pub trait Injectable: Any + Send + Sync + Sized {
  /// Builds a bare instance. Injected fields start out empty.
  fn construct() -> Self;

  /// Declares the injection points of this type. The default declares none.
  fn injections(points: &mut Injections<Self>) {
    let _ = points;
  }
}

/// A write-once slot filled by the container after construction.
///
/// Dereferencing an empty slot panics; use [`Inject::get`] when the slot may not
/// have been injected yet (for instance while a dependency cycle is still being
/// resolved).
pub struct Inject<T> {
  cell: OnceCell<Arc<T>>,
}

impl<T> Inject<T> {
  pub fn new() -> Self {
    Self {
      cell: OnceCell::new(),
    }
  }

  pub fn get(&self) -> Option<&Arc<T>> {
    self.cell.get()
  }

  pub fn is_injected(&self) -> bool {
    self.cell.get().is_some()
  }

  pub(crate) fn set(&self, value: Arc<T>) -> std::result::Result<(), Arc<T>> {
    self.cell.set(value)
  }
}

impl<T> Default for Inject<T> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T> Deref for Inject<T> {
  type Target = T;

  fn deref(&self) -> &T {
    match self.cell.get() {
      Some(value) => value,
      None => panic!(
        "dependency of type `{}` has not been injected",
        std::any::type_name::<T>()
      ),
    }
  }
}

impl<T> fmt::Debug for Inject<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Inject")
      .field("type", &std::any::type_name::<T>())
      .field("injected", &self.is_injected())
      .finish()
  }
}

type Transform = Arc<dyn Fn(Value) -> Result<Value> + Send + Sync>;
type Assign<T> = Arc<dyn Fn(&T, Value) -> Result<()> + Send + Sync>;

/// One declared dependency of a type: which property receives which identifier.
pub struct InjectionPoint<T> {
  property: &'static str,
  id: Identifier,
  transform: Option<Transform>,
  assign: Assign<T>,
}

impl<T> InjectionPoint<T> {
  pub fn property(&self) -> &'static str {
    self.property
  }

  pub fn id(&self) -> &Identifier {
    &self.id
  }

  pub fn has_transform(&self) -> bool {
    self.transform.is_some()
  }
}

impl<T> Clone for InjectionPoint<T> {
  fn clone(&self) -> Self {
    Self {
      property: self.property,
      id: self.id.clone(),
      transform: self.transform.clone(),
      assign: self.assign.clone(),
    }
  }
}

impl<T> fmt::Debug for InjectionPoint<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("InjectionPoint")
      .field("property", &self.property)
      .field("id", &self.id)
      .field("transform", &self.transform.is_some())
      .finish()
  }
}

/// Collects the injection points of `T`, including those inherited from embedded
/// base types.
pub struct Injections<T> {
  own: Vec<InjectionPoint<T>>,
  inherited: Vec<InjectionPoint<T>>,
}

impl<T: 'static> Injections<T> {
  fn new() -> Self {
    Self {
      own: Vec::new(),
      inherited: Vec::new(),
    }
  }

  /// Injects the value bound to `id` into the slot returned by `slot`.
  pub fn inject<D>(
    &mut self,
    property: &'static str,
    id: impl Into<Identifier>,
    slot: fn(&T) -> &Inject<D>,
  ) -> &mut Self
  where
    D: Any + Send + Sync,
  {
    let id = id.into();
    let assign_id = id.clone();
    let assign: Assign<T> = Arc::new(move |this: &T, value: Value| {
      let value = downcast::<D>(&assign_id, value)?;
      slot(this)
        .set(value)
        .map_err(|_| Error::AlreadyInjected { property })
    });
    self.push(InjectionPoint {
      property,
      id,
      transform: None,
      assign,
    })
  }

  /// Injects the value bound to the type identifier of `D`.
  pub fn inject_type<D>(&mut self, property: &'static str, slot: fn(&T) -> &Inject<D>) -> &mut Self
  where
    D: Any + Send + Sync,
  {
    self.inject(property, Identifier::of::<D>(), slot)
  }

  /// Injects the value bound to `id` after passing it through `transform`.
  pub fn inject_with<D, U, F>(
    &mut self,
    property: &'static str,
    id: impl Into<Identifier>,
    transform: F,
    slot: fn(&T) -> &Inject<U>,
  ) -> &mut Self
  where
    D: Any + Send + Sync,
    U: Any + Send + Sync,
    F: Fn(Arc<D>) -> U + Send + Sync + 'static,
  {
    let id = id.into();
    let transform_id = id.clone();
    let transform: Transform = Arc::new(move |value: Value| {
      let value = downcast::<D>(&transform_id, value)?;
      Ok(Arc::new(transform(value)) as Value)
    });
    let assign_id = id.clone();
    let assign: Assign<T> = Arc::new(move |this: &T, value: Value| {
      let value = downcast::<U>(&assign_id, value)?;
      slot(this)
        .set(value)
        .map_err(|_| Error::AlreadyInjected { property })
    });
    self.push(InjectionPoint {
      property,
      id,
      transform: Some(transform),
      assign,
    })
  }

  /// Inherits the injection points of an embedded base type.
  ///
  /// Points declared directly on `T` override inherited points with the same
  /// property name, whatever the call order.
  pub fn extend<B: Injectable>(&mut self, base: fn(&T) -> &B) -> &mut Self {
    for point in points_of::<B>() {
      let assign = point.assign;
      self.inherited.push(InjectionPoint {
        property: point.property,
        id: point.id,
        transform: point.transform,
        assign: Arc::new(move |this: &T, value: Value| assign(base(this), value)),
      });
    }
    self
  }

  // Last declaration wins within one level.
  fn push(&mut self, point: InjectionPoint<T>) -> &mut Self {
    match self.own.iter_mut().find(|p| p.property == point.property) {
      Some(existing) => *existing = point,
      None => self.own.push(point),
    }
    self
  }

  fn collect(self) -> Vec<InjectionPoint<T>> {
    let mut points = self.own;
    for point in self.inherited {
      if !points.iter().any(|p| p.property == point.property) {
        points.push(point);
      }
    }
    points
  }
}

/// Every injection point of `T`, each property exactly once.
pub fn points_of<T: Injectable>() -> Vec<InjectionPoint<T>> {
  let mut points = Injections::new();
  T::injections(&mut points);
  points.collect()
}

/// Resolves every injection point of `instance` through `table` and assigns the results.
///
/// Returns `None` when `T` declares no injection points, so plain values never touch
/// the table. All points are requested before any is assigned, and the whole pass
/// stays synchronous unless one of the dependencies is deferred.
pub(crate) fn inject_properties<T: Injectable>(
  instance: Arc<T>,
  points: Arc<Vec<InjectionPoint<T>>>,
  table: &ResolutionTable,
  journal: &Journal,
) -> Option<Resolution<()>> {
  if points.is_empty() {
    return None;
  }
  let requests = points
    .iter()
    .map(|point| {
      let transform = point.transform.clone();
      table.resolve_in(point.id.clone(), journal).and_then(move |value| {
        MaybeAsync::Ready(match transform {
          Some(transform) => transform(value),
          None => Ok(value),
        })
      })
    })
    .collect::<Vec<_>>();
  Some(MaybeAsync::try_all(requests).map(move |resolved| {
    for (point, value) in points.iter().zip(resolved?) {
      (point.assign)(&*instance, value)?;
    }
    Ok(())
  }))
}
