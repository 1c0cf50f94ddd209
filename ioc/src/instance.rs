//! One live instantiation of a module within a root composition.

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures_util::future::{self, BoxFuture, FutureExt, Shared};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::container::Container;
use crate::error::Result;
use crate::identifier::Identifier;
use crate::module::Module;
use crate::table::ResolutionTable;

/// Lifecycle of a module instantiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleState {
  /// Imports and providers are being resolved, or `boot` is running.
  Composing,
  Live,
  /// The module's dispose hook is running or its imports are being released.
  Disposing,
  Disposed,
}

type Disposal = Shared<BoxFuture<'static, Result<()>>>;

pub(crate) struct ModuleInstance {
  module: Module,
  table: ResolutionTable,
  imports: Vec<Arc<ModuleInstance>>,
  exports: HashSet<Identifier>,
  /// Number of importers that currently hold this instantiation.
  refs: AtomicUsize,
  state: Mutex<ModuleState>,
  disposal: OnceCell<Disposal>,
}

impl ModuleInstance {
  pub(crate) fn new(module: Module, table: ResolutionTable, imports: Vec<Arc<ModuleInstance>>) -> Self {
    let mut exports = HashSet::new();
    for id in module.exports() {
      if table.has(id.clone()) {
        exports.insert(id.clone());
      } else {
        warn!(module = module.name(), id = %id, "export names no provider or import; skipping");
      }
    }
    Self {
      module,
      table,
      imports,
      exports,
      refs: AtomicUsize::new(0),
      state: Mutex::new(ModuleState::Composing),
      disposal: OnceCell::new(),
    }
  }

  pub(crate) fn module(&self) -> &Module {
    &self.module
  }

  pub(crate) fn table(&self) -> &ResolutionTable {
    &self.table
  }

  pub(crate) fn exports(&self) -> &HashSet<Identifier> {
    &self.exports
  }

  pub(crate) fn state(&self) -> ModuleState {
    *self.state.lock()
  }

  pub(crate) fn refs(&self) -> usize {
    self.refs.load(Ordering::SeqCst)
  }

  /// Runs the boot hook, then takes a reference on every import.
  ///
  /// References are only taken once boot has succeeded, so a module that fails to
  /// compose never holds its imports alive.
  pub(crate) async fn boot(self: &Arc<Self>) -> Result<()> {
    if let Some(hook) = &self.module.def.boot {
      hook(Container::internal(self.clone())).await?;
    }
    for import in &self.imports {
      import.retain();
    }
    *self.state.lock() = ModuleState::Live;
    debug!(module = self.module.name(), "module booted");
    Ok(())
  }

  fn retain(&self) {
    self.refs.fetch_add(1, Ordering::SeqCst);
  }

  /// Drops one importer's reference. The last release disposes the instantiation.
  fn release(self: &Arc<Self>) -> BoxFuture<'static, Result<()>> {
    let previous = self
      .refs
      .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |refs| refs.checked_sub(1));
    match previous {
      Ok(1) => self.dispose().boxed(),
      _ => future::ready(Ok(())).boxed(),
    }
  }

  /// Disposes this instantiation. Every call, concurrent or not, observes the same
  /// single run of the dispose hook.
  pub(crate) fn dispose(self: &Arc<Self>) -> Disposal {
    self
      .disposal
      .get_or_init(|| self.clone().run_dispose().shared())
      .clone()
  }

  fn run_dispose(self: Arc<Self>) -> BoxFuture<'static, Result<()>> {
    async move {
      *self.state.lock() = ModuleState::Disposing;
      debug!(module = self.module.name(), "disposing module");

      let mut first_error = None;
      if let Some(hook) = &self.module.def.dispose {
        if let Err(e) = hook(Container::internal(self.clone())).await {
          first_error = Some(e);
        }
      }
      let releases = self.imports.iter().map(|import| import.release());
      for result in future::join_all(releases).await {
        if let Err(e) = result {
          first_error.get_or_insert(e);
        }
      }

      *self.state.lock() = ModuleState::Disposed;
      debug!(module = self.module.name(), "module disposed");
      match first_error {
        Some(e) => Err(e),
        None => Ok(()),
      }
    }
    .boxed()
  }
}

impl fmt::Debug for ModuleInstance {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ModuleInstance")
      .field("module", &self.module.name())
      .field("state", &self.state())
      .field("refs", &self.refs())
      .field("exports", &self.exports)
      .finish()
  }
}
