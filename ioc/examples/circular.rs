use fibre_di::{Identifier, Inject, Injectable, Injections, MaybeAsync, Provider, ResolutionTable};
use std::sync::Arc;

#[derive(Default)]
struct Parent {
  child: Inject<Child>,
}

#[derive(Default)]
struct Child {
  parent: Inject<Parent>,
}

impl Injectable for Parent {
  fn construct() -> Self {
    Parent::default()
  }

  fn injections(points: &mut Injections<Self>) {
    points.inject_type("child", |this: &Self| &this.child);
  }
}

impl Injectable for Child {
  fn construct() -> Self {
    Child::default()
  }

  fn injections(points: &mut Injections<Self>) {
    points.inject_type("parent", |this: &Self| &this.parent);
  }
}

fn main() -> fibre_di::Result<()> {
  let table = ResolutionTable::new();
  table.define(Provider::class::<Parent>())?;
  table.define(Provider::class::<Child>())?;

  // Both types are synchronous, so resolution completes on the spot.
  let MaybeAsync::Ready(parent) = table.resolve_as::<Parent>(Identifier::of::<Parent>()) else {
    unreachable!("no provider here is asynchronous");
  };
  let parent = parent?;

  let child = parent.child.get().expect("child injected");
  let back = child.parent.get().expect("parent injected");
  assert!(Arc::ptr_eq(back, &parent));
  println!("parent -> child -> parent resolved to the same instance");

  // Constructor-style cycles cannot be broken and are reported instead.
  table.define(Provider::factory("a", |args| Ok(*args.get::<u8>(0)?)).inject("b"))?;
  table.define(Provider::factory("b", |args| Ok(*args.get::<u8>(0)?)).inject("a"))?;
  if let MaybeAsync::Ready(Err(e)) = table.resolve("a") {
    println!("{}", e);
    if let Some(stack) = e.resolve_stack() {
      println!("{}", stack);
    }
  }
  Ok(())
}
