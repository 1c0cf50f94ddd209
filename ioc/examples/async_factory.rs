use fibre_di::{compose, Container, Module, Provider};
use std::time::Duration;

struct Connection {
  url: String,
}

#[tokio::main]
async fn main() -> fibre_di::Result<()> {
  let module = Module::builder()
    .name("storage")
    .provide(Provider::value("url", String::from("postgres://localhost/app")))
    .provide(
      Provider::async_factory("connection", |args| async move {
        let url = args.get::<String>(0)?;
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok::<_, fibre_di::Error>(Connection { url: url.to_string() })
      })
      .inject("url"),
    )
    .provide(Provider::existing("db", "connection"))
    .export("db")
    .on_boot(|container| {
      let connection = container.get_as::<Connection>("connection")?;
      println!("connected to {}", connection.url);
      Ok(())
    })
    .on_dispose_async(|container: Container| async move {
      let connection = container.get_as::<Connection>("connection")?;
      tokio::time::sleep(Duration::from_millis(5)).await;
      println!("closed {}", connection.url);
      Ok::<_, fibre_di::Error>(())
    })
    .build();

  let container = compose(&module).await?;

  // Everything settled during composition, so this is synchronous now.
  assert!(container.resolve("db").is_ready());
  println!("db -> {}", container.get_as::<Connection>("db")?.url);

  container.dispose().await
}
