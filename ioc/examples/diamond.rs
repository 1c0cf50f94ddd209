use fibre_di::{compose, Module, Provider};

// --- Module graph ---
//
//        app
//       /   \
//   users   posts
//       \   /
//      database

fn logged(name: &'static str) -> fibre_di::ModuleBuilder {
  Module::builder()
    .name(name)
    .on_boot(move |_| {
      println!("boot    {}", name);
      Ok(())
    })
    .on_dispose(move |_| {
      println!("dispose {}", name);
      Ok(())
    })
}

#[tokio::main]
async fn main() -> fibre_di::Result<()> {
  let database = logged("database")
    .provide(Provider::factory("pool", |_| {
      println!("opening connection pool");
      Ok(String::from("pool#1"))
    }))
    .export("pool")
    .build();

  let users = logged("users")
    .import(&database)
    .provide(Provider::factory("users", |args| Ok(format!("users via {}", args.get::<String>(0)?))).inject("pool"))
    .export("users")
    .build();

  let posts = logged("posts")
    .import(&database)
    .provide(Provider::factory("posts", |args| Ok(format!("posts via {}", args.get::<String>(0)?))).inject("pool"))
    .export("posts")
    .build();

  let app = logged("app")
    .import(&users)
    .import(&posts)
    .export("users")
    .export("posts")
    .build();

  // The shared database module is built and booted once.
  let container = compose(&app).await?;
  println!("{}", container.get_as::<String>("users")?);
  println!("{}", container.get_as::<String>("posts")?);
  assert!(!container.has("pool"), "pool is not exported by app");

  // Importers are disposed before the modules they import.
  container.dispose().await?;
  Ok(())
}
