use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::identifier::Identifier;

/// One hop in a resolve stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
  pub id: Identifier,
  /// The hop was taken because `id` is an alias for the next frame.
  pub alias: bool,
}

impl StackFrame {
  pub fn new(id: Identifier) -> Self {
    Self { id, alias: false }
  }

  pub fn alias(id: Identifier) -> Self {
    Self { id, alias: true }
  }
}

/// The ordered trail of identifiers traversed before a resolution failed.
///
/// The head is the outermost request, the tail is where resolution gave up.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolveStack {
  frames: Vec<StackFrame>,
}

impl ResolveStack {
  pub fn new(frames: Vec<StackFrame>) -> Self {
    Self { frames }
  }

  pub fn frames(&self) -> &[StackFrame] {
    &self.frames
  }

  pub fn head(&self) -> Option<&Identifier> {
    self.frames.first().map(|frame| &frame.id)
  }

  pub fn tail(&self) -> Option<&Identifier> {
    self.frames.last().map(|frame| &frame.id)
  }

  /// Formatted identifiers in request order, without alias markers.
  pub fn identifiers(&self) -> Vec<String> {
    self.frames.iter().map(|frame| frame.id.to_string()).collect()
  }

  pub fn len(&self) -> usize {
    self.frames.len()
  }

  pub fn is_empty(&self) -> bool {
    self.frames.is_empty()
  }

  fn prepend(&mut self, frame: StackFrame) {
    self.frames.insert(0, frame);
  }
}

impl fmt::Display for ResolveStack {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("resolve stack:")?;
    for (index, frame) in self.frames.iter().enumerate() {
      if frame.alias {
        write!(f, "\n  [{}] (alias) {}", index, frame.id)?;
      } else {
        write!(f, "\n  [{}] {}", index, frame.id)?;
      }
    }
    Ok(())
  }
}

/// Raised when resolution reaches an identifier with no provider and no alias target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndefinedError {
  stack: ResolveStack,
}

impl UndefinedError {
  pub(crate) fn new(stack: ResolveStack) -> Self {
    Self { stack }
  }

  /// The outermost identifier that was requested.
  pub fn id(&self) -> Option<&Identifier> {
    self.stack.head()
  }

  /// The identifier that was ultimately missing.
  pub fn missing(&self) -> Option<&Identifier> {
    self.stack.tail()
  }

  pub fn resolve_stack(&self) -> &ResolveStack {
    &self.stack
  }
}

impl fmt::Display for UndefinedError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self.stack.head() {
      Some(id) => write!(f, "{} is undefined!", id),
      None => f.write_str("identifier is undefined!"),
    }
  }
}

impl std::error::Error for UndefinedError {}

/// The main error type for `fibre_di`.
#[derive(Debug, Clone, Error)]
pub enum Error {
  #[error("{0}")]
  Undefined(UndefinedError),

  #[error("circular dependency detected while constructing {id}")]
  Circular { id: Identifier, stack: ResolveStack },

  #[error("{0} is already frozen.")]
  Frozen(Identifier),

  #[error("{id} does not hold a value of type `{expected}`")]
  TypeMismatch {
    id: Identifier,
    expected: &'static str,
  },

  #[error("property `{property}` has already been injected")]
  AlreadyInjected { property: &'static str },

  #[error("container has been disposed")]
  Disposed,

  #[error("a module hook cannot dispose its own container")]
  DisposeFromHook,

  /// An error raised by a factory, a deferred value or a module hook.
  #[error(transparent)]
  Provider(Arc<dyn std::error::Error + Send + Sync + 'static>),
}

impl Error {
  /// Wraps an error raised by user code (factory, deferred value, hook).
  pub fn provider(error: impl Into<Box<dyn std::error::Error + Send + Sync + 'static>>) -> Self {
    Error::Provider(Arc::from(error.into()))
  }

  pub(crate) fn undefined(frames: Vec<StackFrame>) -> Self {
    Error::Undefined(UndefinedError::new(ResolveStack::new(frames)))
  }

  pub(crate) fn circular(id: Identifier, frames: Vec<StackFrame>) -> Self {
    Error::Circular {
      id,
      stack: ResolveStack::new(frames),
    }
  }

  pub fn is_undefined(&self) -> bool {
    matches!(self, Error::Undefined(_))
  }

  /// The resolve stack carried by undefined and circular failures.
  pub fn resolve_stack(&self) -> Option<&ResolveStack> {
    match self {
      Error::Undefined(e) => Some(&e.stack),
      Error::Circular { stack, .. } => Some(stack),
      _ => None,
    }
  }

  /// Prepends an outer hop to the resolve stack. Other errors pass through unchanged.
  pub(crate) fn within(mut self, frame: StackFrame) -> Self {
    match &mut self {
      Error::Undefined(e) => e.stack.prepend(frame),
      Error::Circular { stack, .. } => stack.prepend(frame),
      _ => {}
    }
    self
  }

  pub(crate) fn within_aliases(self, hops: &[Identifier]) -> Self {
    hops
      .iter()
      .rev()
      .fold(self, |error, hop| error.within(StackFrame::alias(hop.clone())))
  }
}

/// A specialized `Result` type for `fibre_di` operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
  use super::*;
  use crate::identifier::Symbol;

  #[test]
  fn undefined_message_names_the_outermost_identifier() {
    let error = Error::undefined(vec![StackFrame::new(Identifier::from("unknown"))])
      .within(StackFrame::new(Identifier::from("instance")));
    assert_eq!(error.to_string(), "\"instance\" is undefined!");
  }

  #[test]
  fn stack_renders_alias_hops() {
    let error = Error::undefined(vec![StackFrame::new(Identifier::from("target"))])
      .within_aliases(&[Identifier::from("a1"), Identifier::from(Symbol::new("a2"))]);
    let stack = error.resolve_stack().map(ToString::to_string);
    assert_eq!(
      stack.as_deref(),
      Some("resolve stack:\n  [0] (alias) \"a1\"\n  [1] (alias) Symbol(a2)\n  [2] \"target\"")
    );
  }

  #[test]
  fn within_leaves_other_errors_alone() {
    let error = Error::Frozen(Identifier::from("x")).within(StackFrame::new(Identifier::from("y")));
    assert_eq!(error.to_string(), "\"x\" is already frozen.");
    assert!(error.resolve_stack().is_none());
  }

  #[test]
  fn provider_errors_are_transparent() {
    let error = Error::provider("connection refused");
    assert_eq!(error.to_string(), "connection refused");
  }
}
