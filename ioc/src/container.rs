//! The `Container` handle returned by composition and passed to module hooks.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use futures_util::future::{self, BoxFuture, FutureExt};

use crate::core::Value;
use crate::error::{Error, Result, StackFrame};
use crate::identifier::Identifier;
use crate::instance::{ModuleInstance, ModuleState};
use crate::maybe_async::{MaybeAsync, Resolution};
use crate::module::Module;
use crate::table::downcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum View {
  /// What importers and application code see: the module's exports only.
  Exports,
  /// What the module's own hooks see: everything it provides or imports.
  Internal,
}

/// A view onto a composed module.
///
/// The container returned by [`compose`](crate::compose) only exposes the root
/// module's exports; identifiers that are provided but not exported behave as if
/// they were undefined. Boot and dispose hooks receive an internal view of their own
/// module instead.
#[derive(Clone)]
pub struct Container {
  instance: Arc<ModuleInstance>,
  view: View,
}

impl Container {
  pub(crate) fn exports(instance: Arc<ModuleInstance>) -> Self {
    Self {
      instance,
      view: View::Exports,
    }
  }

  pub(crate) fn internal(instance: Arc<ModuleInstance>) -> Self {
    Self {
      instance,
      view: View::Internal,
    }
  }

  fn check(&self, id: &Identifier) -> Result<()> {
    if self.instance.state() == ModuleState::Disposed {
      return Err(Error::Disposed);
    }
    if self.view == View::Exports && !self.instance.exports().contains(id) {
      return Err(Error::undefined(vec![StackFrame::new(id.clone())]));
    }
    Ok(())
  }

  /// Reports whether `id` is visible through this container.
  pub fn has(&self, id: impl Into<Identifier>) -> bool {
    let id = id.into();
    self.check(&id).is_ok() && self.instance.table().has(id)
  }

  /// Returns the already-resolved value of `id`.
  ///
  /// Every provider of a module is resolved during composition, so this only fails
  /// for identifiers that are not visible through this container.
  pub fn get(&self, id: impl Into<Identifier>) -> Result<Value> {
    let id = id.into();
    self.check(&id)?;
    self.instance.table().get(id)
  }

  pub fn get_as<T: Any + Send + Sync>(&self, id: impl Into<Identifier>) -> Result<Arc<T>> {
    let id = id.into();
    downcast::<T>(&id, self.get(id.clone())?)
  }

  /// Resolves `id`, synchronously when possible.
  pub fn resolve(&self, id: impl Into<Identifier>) -> Resolution<Value> {
    let id = id.into();
    if let Err(e) = self.check(&id) {
      return MaybeAsync::Ready(Err(e));
    }
    self.instance.table().resolve(id)
  }

  pub fn resolve_as<T: Any + Send + Sync>(&self, id: impl Into<Identifier>) -> Resolution<Arc<T>> {
    let id = id.into();
    self
      .resolve(id.clone())
      .map(move |result| result.and_then(|value| downcast::<T>(&id, value)))
  }

  /// The identifiers visible through this container.
  pub fn identifiers(&self) -> Vec<Identifier> {
    match self.view {
      View::Exports => self.instance.exports().iter().cloned().collect(),
      View::Internal => self.instance.table().resolved_identifiers(),
    }
  }

  pub fn module(&self) -> &Module {
    self.instance.module()
  }

  pub fn state(&self) -> ModuleState {
    self.instance.state()
  }

  /// Disposes the module and releases its imports.
  ///
  /// Safe to call more than once, including concurrently: the dispose hooks run once
  /// and every caller observes the same outcome.
  pub fn dispose(&self) -> BoxFuture<'static, Result<()>> {
    match self.view {
      View::Internal => future::ready(Err(Error::DisposeFromHook)).boxed(),
      View::Exports => self.instance.dispose().boxed(),
    }
  }
}

impl fmt::Debug for Container {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Container")
      .field("module", &self.instance.module().name())
      .field("view", &self.view)
      .field("state", &self.instance.state())
      .finish()
  }
}
