use fibre_di::{MaybeAsync, Provider, ResolutionTable};

fn main() {
  let table = ResolutionTable::new();
  table
    .define(Provider::factory("service", |args| Ok(args.len())).inject("repository"))
    .unwrap();
  table
    .define(Provider::factory("repository", |args| Ok(args.len())).inject("connection"))
    .unwrap();
  table.define(Provider::existing("api", "service")).unwrap();

  // `connection` was never declared.
  let MaybeAsync::Ready(result) = table.resolve("api") else {
    unreachable!("no provider here is asynchronous");
  };
  let error = result.expect_err("connection is undefined");

  println!("{}", error);
  if let Some(stack) = error.resolve_stack() {
    println!("{}", stack);
    assert_eq!(
      stack.identifiers(),
      vec!["\"api\"", "\"service\"", "\"repository\"", "\"connection\""]
    );
  }

  // A failed resolution leaves nothing behind; define the missing piece and retry.
  table.define(Provider::value("connection", ())).unwrap();
  assert!(table.has("api"));
  if let MaybeAsync::Ready(Ok(_)) = table.resolve("api") {
    println!("resolved after defining \"connection\"");
  }
}
