//! Core, non-public data structures for the resolution table.

use std::any::Any;
use std::sync::Arc;

use dashmap::DashMap;
use futures_util::future::{BoxFuture, Shared};
use parking_lot::Mutex;

use crate::error::Result;
use crate::identifier::Identifier;
use crate::provider::Recipe;

/// A resolved value as stored in a resolution table.
pub type Value = Arc<dyn Any + Send + Sync>;

/// An in-flight resolution shared by every request made while it is pending.
pub(crate) type SharedResolution = Shared<BoxFuture<'static, Result<Value>>>;

/// The state of one identifier inside a resolution table.
pub(crate) enum Slot {
  /// Declared but never requested. Redefinition is still allowed.
  Unresolved(Arc<Recipe>),
  /// Synchronous construction is running on the current call stack.
  Constructing(Arc<Recipe>),
  /// Construction returned a deferred value that has not settled yet.
  Pending(Arc<Recipe>, SharedResolution),
  /// Frozen: the provider will not run again.
  Resolved(Value),
  Alias(Identifier),
}

impl Slot {
  pub(crate) fn is_frozen(&self) -> bool {
    matches!(
      self,
      Slot::Constructing(_) | Slot::Pending(..) | Slot::Resolved(_)
    )
  }
}

/// What a single table lookup found, detached from the map so no lock is held.
pub(crate) enum Lookup {
  Missing,
  Alias(Identifier),
  Resolved(Value),
  Pending(SharedResolution),
  Constructing,
  /// The slot was unresolved and has been claimed by the caller for construction.
  Claimed(Arc<Recipe>),
}

/// Atomically inspects a slot, claiming it for construction if it is unresolved.
pub(crate) fn claim(slots: &DashMap<Identifier, Slot>, id: &Identifier) -> Lookup {
  let Some(mut slot) = slots.get_mut(id) else {
    return Lookup::Missing;
  };
  let recipe = match &*slot {
    Slot::Alias(target) => return Lookup::Alias(target.clone()),
    Slot::Resolved(value) => return Lookup::Resolved(value.clone()),
    Slot::Pending(_, shared) => return Lookup::Pending(shared.clone()),
    Slot::Constructing(_) => return Lookup::Constructing,
    Slot::Unresolved(recipe) => recipe.clone(),
  };
  *slot = Slot::Constructing(recipe.clone());
  Lookup::Claimed(recipe)
}

/// An RAII guard over a claimed slot.
///
/// Until [`ConstructionGuard::finish`] is called the slot stays `Constructing`, which
/// is how re-entrant requests for the same identifier are recognised as a cycle.
/// If the guard is dropped without finishing (construction failed or panicked) the
/// slot is handed back to its recipe so a later request can retry.
pub(crate) struct ConstructionGuard<'a> {
  slots: &'a DashMap<Identifier, Slot>,
  id: Identifier,
  recipe: Option<Arc<Recipe>>,
}

impl<'a> ConstructionGuard<'a> {
  pub(crate) fn new(
    slots: &'a DashMap<Identifier, Slot>,
    id: Identifier,
    recipe: Arc<Recipe>,
  ) -> Self {
    Self {
      slots,
      id,
      recipe: Some(recipe),
    }
  }

  pub(crate) fn finish(mut self, slot: Slot) {
    self.recipe = None;
    self.slots.insert(self.id.clone(), slot);
  }
}

impl Drop for ConstructionGuard<'_> {
  fn drop(&mut self) {
    if let Some(recipe) = self.recipe.take() {
      revert(self.slots, &self.id, recipe, |slot| {
        matches!(slot, Slot::Constructing(_))
      });
    }
  }
}

/// Hands a slot back to its recipe if it is still in the state `expected` accepts.
pub(crate) fn revert(
  slots: &DashMap<Identifier, Slot>,
  id: &Identifier,
  recipe: Arc<Recipe>,
  expected: impl FnOnce(&Slot) -> bool,
) {
  if let Some(mut slot) = slots.get_mut(id) {
    if expected(&*slot) {
      *slot = Slot::Unresolved(recipe);
    }
  }
}

/// Bindings frozen during one injection pass.
///
/// A partner constructed while an instance is being injected may already hold a
/// reference to that instance. If the pass fails, every binding recorded here is
/// handed back to its recipe together with the failed instance, so a retry rebuilds
/// the whole group instead of reusing values wired to a discarded object.
#[derive(Clone, Default)]
pub(crate) struct Journal {
  entries: Arc<Mutex<Vec<Frozen>>>,
}

struct Frozen {
  id: Identifier,
  recipe: Arc<Recipe>,
  value: Value,
}

impl Journal {
  pub(crate) fn record(&self, id: Identifier, recipe: Arc<Recipe>, value: Value) {
    self.entries.lock().push(Frozen { id, recipe, value });
  }

  /// Moves everything `child` recorded into this journal.
  pub(crate) fn absorb(&self, child: &Journal) {
    let entries = std::mem::take(&mut *child.entries.lock());
    self.entries.lock().extend(entries);
  }

  /// Reverts every recorded binding that still holds the value it was frozen with.
  pub(crate) fn rollback(&self, slots: &DashMap<Identifier, Slot>) {
    let entries = std::mem::take(&mut *self.entries.lock());
    for Frozen { id, recipe, value } in entries.into_iter().rev() {
      revert(slots, &id, recipe, |slot| {
        matches!(slot, Slot::Resolved(current) if Arc::ptr_eq(current, &value))
      });
    }
  }
}
