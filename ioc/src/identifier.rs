//! Identifiers used as lookup keys in a resolution table.

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_SYMBOL: AtomicU64 = AtomicU64::new(0);

/// A unique, opaque identifier.
///
/// Two symbols are equal only if one is a clone of the other, even when they share
/// the same description.
#[derive(Clone)]
pub struct Symbol {
  id: u64,
  description: Arc<str>,
}

impl Symbol {
  pub fn new(description: impl AsRef<str>) -> Self {
    Self {
      id: NEXT_SYMBOL.fetch_add(1, Ordering::Relaxed),
      description: Arc::from(description.as_ref()),
    }
  }

  pub fn description(&self) -> &str {
    &self.description
  }
}

impl PartialEq for Symbol {
  fn eq(&self, other: &Self) -> bool {
    self.id == other.id
  }
}

impl Eq for Symbol {}

impl Hash for Symbol {
  fn hash<H: Hasher>(&self, state: &mut H) {
    self.id.hash(state);
  }
}

impl fmt::Debug for Symbol {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "Symbol({})#{}", self.description, self.id)
  }
}

/// Identity of a Rust type, with its name kept around for diagnostics.
#[derive(Clone, Copy)]
pub struct TypeKey {
  type_id: TypeId,
  name: &'static str,
}

impl TypeKey {
  pub fn of<T: ?Sized + Any>() -> Self {
    Self {
      type_id: TypeId::of::<T>(),
      name: std::any::type_name::<T>(),
    }
  }

  pub fn type_id(&self) -> TypeId {
    self.type_id
  }

  /// The full path of the type, as reported by `std::any::type_name`.
  pub fn type_name(&self) -> &'static str {
    self.name
  }
}

impl PartialEq for TypeKey {
  fn eq(&self, other: &Self) -> bool {
    self.type_id == other.type_id
  }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
  fn hash<H: Hasher>(&self, state: &mut H) {
    self.type_id.hash(state);
  }
}

impl fmt::Debug for TypeKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "TypeKey({})", self.name)
  }
}

/// A key used to request a value from a container.
///
/// Names compare by value, symbols by identity, and types by `TypeId`.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum Identifier {
  Name(Arc<str>),
  Symbol(Symbol),
  Type(TypeKey),
}

impl Identifier {
  /// The identifier of a type, used by class providers declared without an explicit id.
  pub fn of<T: ?Sized + Any>() -> Self {
    Identifier::Type(TypeKey::of::<T>())
  }

  pub fn name(name: impl AsRef<str>) -> Self {
    Identifier::Name(Arc::from(name.as_ref()))
  }
}

impl From<&str> for Identifier {
  fn from(name: &str) -> Self {
    Identifier::name(name)
  }
}

impl From<String> for Identifier {
  fn from(name: String) -> Self {
    Identifier::Name(Arc::from(name))
  }
}

impl From<Symbol> for Identifier {
  fn from(symbol: Symbol) -> Self {
    Identifier::Symbol(symbol)
  }
}

impl From<&Symbol> for Identifier {
  fn from(symbol: &Symbol) -> Self {
    Identifier::Symbol(symbol.clone())
  }
}

impl From<TypeKey> for Identifier {
  fn from(key: TypeKey) -> Self {
    Identifier::Type(key)
  }
}

impl From<&Identifier> for Identifier {
  fn from(id: &Identifier) -> Self {
    id.clone()
  }
}

/// Human-readable rendering used in diagnostics only, never for lookup.
impl fmt::Display for Identifier {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Identifier::Name(name) => {
        f.write_str("\"")?;
        for c in name.chars() {
          match c {
            '"' => f.write_str("\\\"")?,
            '\\' => f.write_str("\\\\")?,
            '\n' => f.write_str("\\n")?,
            c => write!(f, "{}", c)?,
          }
        }
        f.write_str("\"")
      }
      Identifier::Symbol(symbol) => write!(f, "Symbol({})", symbol.description),
      Identifier::Type(key) => write!(f, "[class {}]", short_type_name(key.name)),
    }
  }
}

impl fmt::Debug for Identifier {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Identifier::Symbol(symbol) => fmt::Debug::fmt(symbol, f),
      other => fmt::Display::fmt(other, f),
    }
  }
}

/// Strips module paths from every path segment of a type name:
/// `app::db::Pool<app::db::Driver>` becomes `Pool<Driver>`.
fn short_type_name(full: &str) -> String {
  let mut out = String::with_capacity(full.len());
  let mut segment_start = 0;
  for (index, c) in full.char_indices() {
    if matches!(c, '<' | '>' | ',' | '(' | ')' | '[' | ']' | '&' | ';' | ' ') {
      out.push_str(last_path_segment(&full[segment_start..index]));
      out.push(c);
      segment_start = index + c.len_utf8();
    }
  }
  out.push_str(last_path_segment(&full[segment_start..]));
  out
}

fn last_path_segment(path: &str) -> &str {
  path.rsplit("::").next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
  use super::*;

  struct Something;

  #[test]
  fn names_are_quoted_and_escaped() {
    assert_eq!(Identifier::from("instance").to_string(), "\"instance\"");
    assert_eq!(Identifier::from("a\"b").to_string(), "\"a\\\"b\"");
  }

  #[test]
  fn symbols_print_their_description() {
    assert_eq!(Identifier::from(Symbol::new("symbol")).to_string(), "Symbol(symbol)");
  }

  #[test]
  fn types_print_their_short_name() {
    assert_eq!(Identifier::of::<Something>().to_string(), "[class Something]");
    assert_eq!(
      Identifier::of::<Vec<Something>>().to_string(),
      "[class Vec<Something>]"
    );
  }

  #[test]
  fn symbols_compare_by_identity() {
    let a = Symbol::new("same");
    let b = Symbol::new("same");
    assert_ne!(Identifier::from(&a), Identifier::from(&b));
    assert_eq!(Identifier::from(&a), Identifier::from(a.clone()));
  }

  #[test]
  fn names_compare_by_value() {
    assert_eq!(Identifier::from("x"), Identifier::from(String::from("x")));
    assert_ne!(Identifier::from("x"), Identifier::of::<Something>());
  }
}
