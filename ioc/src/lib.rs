//! # Fibre DI
//!
//! A module-based dependency injection container for Rust.
//!
//! Values are declared through **providers** grouped into **modules**. Composing a
//! root module builds every module it imports (once, however many importers reach
//! it), resolves each module's providers eagerly, runs its `boot` hook, and hands back
//! a [`Container`] that exposes only the root module's exports.
//!
//! ## Core Concepts
//!
//! - **Identifier**: a lookup key. Either a string name, a unique [`Symbol`] or a type.
//! - **Provider**: how a value is produced. A fixed value, a (possibly async) factory
//!   with dependencies, an [`Injectable`] type, or an alias of another identifier.
//! - **Resolution**: every identifier is constructed at most once, unless its provider
//!   is [`Lifetime::Transient`]. Resolution stays synchronous unless a provider on the
//!   path is asynchronous, see [`MaybeAsync`].
//! - **Property injection**: [`Inject<T>`] fields are filled after the owning instance
//!   has been cached, so types may reference each other, or themselves.
//! - **Lifecycle**: disposing the root container runs each module's `dispose` hook
//!   once, importers before the modules they import.
//!
//! ## Quick Start
//!
//! ```
//! use fibre_di::{compose, Inject, Injectable, Injections, Module, Provider};
//!
//! #[derive(Default)]
//! struct Greeter {
//!   message: Inject<String>,
//! }
//!
//! impl Greeter {
//!   fn greet(&self) -> String {
//!     format!("{}, World!", *self.message)
//!   }
//! }
//!
//! impl Injectable for Greeter {
//!   fn construct() -> Self {
//!     Greeter::default()
//!   }
//!
//!   fn injections(points: &mut Injections<Self>) {
//!     points.inject("message", "greeting_message", |this: &Self| &this.message);
//!   }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> fibre_di::Result<()> {
//! let messages = Module::builder()
//!   .name("messages")
//!   .provide(Provider::value("greeting_message", String::from("Hello")))
//!   .export("greeting_message")
//!   .build();
//!
//! let app = Module::builder()
//!   .name("app")
//!   .import(&messages)
//!   .provide(Provider::class::<Greeter>())
//!   .export(fibre_di::Identifier::of::<Greeter>())
//!   .build();
//!
//! let container = compose(&app).await?;
//! let greeter = container.get_as::<Greeter>(fibre_di::Identifier::of::<Greeter>())?;
//! assert_eq!(greeter.greet(), "Hello, World!");
//! container.dispose().await?;
//! # Ok(())
//! # }
//! ```

mod compose;
mod config;
mod container;
mod core;
mod error;
mod identifier;
mod inject;
mod instance;
mod maybe_async;
mod module;
mod provider;
mod table;

pub use compose::{compose, Composer};
pub use config::{ContainerConfig, DEFAULT_MAX_ALIAS_DEPTH};
pub use container::Container;
pub use crate::core::Value;
pub use error::{Error, ResolveStack, Result, StackFrame, UndefinedError};
pub use identifier::{Identifier, Symbol, TypeKey};
pub use inject::{points_of, Inject, Injectable, InjectionPoint, Injections};
pub use instance::ModuleState;
pub use maybe_async::{MaybeAsync, Resolution};
pub use module::{Module, ModuleBuilder};
pub use provider::{Dependency, FactoryArgs, FactoryProvider, Lifetime, Provider};
pub use table::ResolutionTable;
