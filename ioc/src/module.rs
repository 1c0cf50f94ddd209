//! Modules: bounded sets of providers with explicit imports and exports.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::container::Container;
use crate::error::Result;
use crate::identifier::Identifier;
use crate::maybe_async::{MaybeAsync, Resolution};
use crate::provider::Provider;

pub(crate) type Hook = Arc<dyn Fn(Container) -> Resolution<()> + Send + Sync>;

pub(crate) struct ModuleDef {
  pub(crate) name: Option<String>,
  pub(crate) imports: Vec<Module>,
  pub(crate) providers: Vec<Provider>,
  pub(crate) exports: Vec<Identifier>,
  pub(crate) boot: Option<Hook>,
  pub(crate) dispose: Option<Hook>,
}

/// A unit of provider scope.
///
/// Modules are compared by identity: cloning a `Module` yields the same module, while
/// two modules built from identical declarations are distinct. This identity is what
/// lets a module imported along several paths be instantiated only once.
///
/// ```
/// use fibre_di::{compose, Module, Provider};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> fibre_di::Result<()> {
/// let config = Module::builder()
///   .name("config")
///   .provide(Provider::value("database_url", String::from("postgres://localhost/app")))
///   .export("database_url")
///   .build();
///
/// let app = Module::builder()
///   .name("app")
///   .import(&config)
///   .provide(
///     Provider::factory("banner", |args| {
///       Ok(format!("connected to {}", args.get::<String>(0)?))
///     })
///     .inject("database_url"),
///   )
///   .export("banner")
///   .build();
///
/// let container = compose(&app).await?;
/// assert_eq!(*container.get_as::<String>("banner")?, "connected to postgres://localhost/app");
/// assert!(!container.has("database_url"));
/// container.dispose().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Module {
  pub(crate) def: Arc<ModuleDef>,
}

/// Identity of a module object, used as the deduplication key during composition.
pub(crate) type ModuleKey = usize;

impl Module {
  pub fn builder() -> ModuleBuilder {
    ModuleBuilder::default()
  }

  pub fn name(&self) -> &str {
    self.def.name.as_deref().unwrap_or("<anonymous>")
  }

  pub fn imports(&self) -> &[Module] {
    &self.def.imports
  }

  pub fn providers(&self) -> &[Provider] {
    &self.def.providers
  }

  pub fn exports(&self) -> &[Identifier] {
    &self.def.exports
  }

  pub(crate) fn key(&self) -> ModuleKey {
    Arc::as_ptr(&self.def) as *const () as usize
  }
}

impl PartialEq for Module {
  fn eq(&self, other: &Self) -> bool {
    Arc::ptr_eq(&self.def, &other.def)
  }
}

impl Eq for Module {}

impl fmt::Debug for Module {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Module")
      .field("name", &self.name())
      .field("imports", &self.def.imports.iter().map(Module::name).collect::<Vec<_>>())
      .field("providers", &self.def.providers.len())
      .field("exports", &self.def.exports)
      .finish()
  }
}

/// A builder for [`Module`].
#[derive(Default)]
pub struct ModuleBuilder {
  name: Option<String>,
  imports: Vec<Module>,
  providers: Vec<Provider>,
  exports: Vec<Identifier>,
  boot: Option<Hook>,
  dispose: Option<Hook>,
}

impl ModuleBuilder {
  /// A name used in logs and import-cycle diagnostics. It plays no part in identity.
  pub fn name(mut self, name: impl Into<String>) -> Self {
    self.name = Some(name.into());
    self
  }

  pub fn import(mut self, module: &Module) -> Self {
    self.imports.push(module.clone());
    self
  }

  pub fn imports<'a>(mut self, modules: impl IntoIterator<Item = &'a Module>) -> Self {
    self.imports.extend(modules.into_iter().cloned());
    self
  }

  pub fn provide(mut self, provider: impl Into<Provider>) -> Self {
    self.providers.push(provider.into());
    self
  }

  pub fn export(mut self, id: impl Into<Identifier>) -> Self {
    self.exports.push(id.into());
    self
  }

  /// Runs after every provider of the module has been resolved. The container
  /// sees everything the module provides or imports, exported or not.
  pub fn on_boot<F>(mut self, hook: F) -> Self
  where
    F: Fn(&Container) -> Result<()> + Send + Sync + 'static,
  {
    self.boot = Some(Arc::new(move |container: Container| {
      MaybeAsync::Ready(hook(&container))
    }));
    self
  }

  pub fn on_boot_async<F, Fut>(mut self, hook: F) -> Self
  where
    F: Fn(Container) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
  {
    self.boot = Some(Arc::new(move |container: Container| {
      MaybeAsync::deferred(hook(container))
    }));
    self
  }

  /// Runs when the module is disposed, before its imports are released.
  pub fn on_dispose<F>(mut self, hook: F) -> Self
  where
    F: Fn(&Container) -> Result<()> + Send + Sync + 'static,
  {
    self.dispose = Some(Arc::new(move |container: Container| {
      MaybeAsync::Ready(hook(&container))
    }));
    self
  }

  pub fn on_dispose_async<F, Fut>(mut self, hook: F) -> Self
  where
    F: Fn(Container) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
  {
    self.dispose = Some(Arc::new(move |container: Container| {
      MaybeAsync::deferred(hook(container))
    }));
    self
  }

  pub fn build(self) -> Module {
    Module {
      def: Arc::new(ModuleDef {
        name: self.name,
        imports: self.imports,
        providers: self.providers,
        exports: self.exports,
        boot: self.boot,
        dispose: self.dispose,
      }),
    }
  }
}
