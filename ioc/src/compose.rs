//! The composition engine: turns a root module into a live container.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::{self, BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::config::ContainerConfig;
use crate::container::Container;
use crate::error::{Error, Result};
use crate::identifier::Identifier;
use crate::instance::ModuleInstance;
use crate::maybe_async::MaybeAsync;
use crate::module::{Module, ModuleKey};
use crate::table::ResolutionTable;

type PendingInstance = Shared<BoxFuture<'static, Result<Arc<ModuleInstance>>>>;

/// Composes modules into containers.
///
/// ```
/// use fibre_di::{Composer, ContainerConfig, Module, Provider};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> fibre_di::Result<()> {
/// let module = Module::builder()
///   .provide(Provider::value("greeting", "hello"))
///   .export("greeting")
///   .build();
///
/// let composer = Composer::with_config(ContainerConfig::new().max_alias_depth(4));
/// let container = composer.compose(&module).await?;
/// assert_eq!(*container.get_as::<&str>("greeting")?, "hello");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct Composer {
  config: ContainerConfig,
}

impl Composer {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_config(config: ContainerConfig) -> Self {
    Self { config }
  }

  pub fn config(&self) -> &ContainerConfig {
    &self.config
  }

  /// Composes `root` and everything it imports.
  ///
  /// Each distinct module object is instantiated once, however many importers reach
  /// it. On failure nothing is left live: modules that had already booted are
  /// disposed again (unless rollback is disabled) and the composition error is returned.
  pub async fn compose(&self, root: &Module) -> Result<Container> {
    let composition = Arc::new(Composition {
      config: self.config.clone(),
      instances: Mutex::new(HashMap::new()),
      live: Mutex::new(Vec::new()),
    });
    match composition.instantiate(root).await {
      Ok(instance) => Ok(Container::exports(instance)),
      Err(e) => {
        if self.config.rollback_on_failure {
          composition.rollback().await;
        }
        Err(e)
      }
    }
  }
}

/// Composes `root` with the default configuration.
pub async fn compose(root: &Module) -> Result<Container> {
  Composer::default().compose(root).await
}

/// State shared by every module reached from one root composition.
struct Composition {
  config: ContainerConfig,
  instances: Mutex<HashMap<ModuleKey, PendingInstance>>,
  /// Instantiations that reached `Live`, in boot order.
  live: Mutex<Vec<Arc<ModuleInstance>>>,
}

impl Composition {
  /// Returns the in-flight or finished instantiation of `module`, starting it if needed.
  fn instantiate(self: &Arc<Self>, module: &Module) -> PendingInstance {
    let mut instances = self.instances.lock();
    if let Some(pending) = instances.get(&module.key()) {
      return pending.clone();
    }
    let pending = self.clone().build(module.clone()).shared();
    instances.insert(module.key(), pending.clone());
    pending
  }

  fn build(self: Arc<Self>, module: Module) -> BoxFuture<'static, Result<Arc<ModuleInstance>>> {
    async move {
      debug!(module = module.name(), "composing module");

      // Siblings are allowed to finish so a failure never leaves half-booted modules behind.
      let pending = module
        .imports()
        .iter()
        .map(|import| self.instantiate(import))
        .collect::<Vec<_>>();
      let mut imports: Vec<Arc<ModuleInstance>> = Vec::new();
      for result in future::join_all(pending).await {
        let import = result?;
        if !imports.iter().any(|seen| Arc::ptr_eq(seen, &import)) {
          imports.push(import);
        }
      }

      let table = ResolutionTable::with_config(self.config.clone());
      for import in &imports {
        for id in import.exports() {
          table.import(import.table(), id.clone())?;
        }
      }
      for provider in module.providers() {
        // Imported transient bindings are not frozen, so shadowing is checked here.
        if imports.iter().any(|import| import.exports().contains(provider.id())) {
          return Err(Error::Frozen(provider.id().clone()));
        }
        table.define(provider.clone())?;
      }

      let own: Vec<Identifier> = module.providers().iter().map(|p| p.id().clone()).collect();
      MaybeAsync::try_all(own.into_iter().map(|id| table.resolve(id))).await?;

      let instance = Arc::new(ModuleInstance::new(module, table, imports));
      instance.boot().await?;
      self.live.lock().push(instance.clone());
      Ok(instance)
    }
    .boxed()
  }

  /// Disposes every instantiation that went live, importers before imports.
  async fn rollback(&self) {
    let live = std::mem::take(&mut *self.live.lock());
    if live.is_empty() {
      return;
    }
    debug!(modules = live.len(), "rolling back failed composition");
    for instance in live.iter().rev() {
      if instance.refs() > 0 {
        continue;
      }
      if let Err(e) = instance.dispose().await {
        warn!(module = instance.module().name(), error = %e, "dispose failed during rollback");
      }
    }
  }
}
