use fibre_di::{Composer, ContainerConfig, Module, Provider, DEFAULT_MAX_ALIAS_DEPTH};

#[test]
fn test_config_from_yaml() {
  let yaml = "max_alias_depth: 8\nrollback_on_failure: false\n";
  let config: ContainerConfig = serde_yaml::from_str(yaml).unwrap();

  assert_eq!(config, ContainerConfig::new().max_alias_depth(8).rollback_on_failure(false));
}

#[test]
fn test_missing_fields_use_defaults() {
  let config: ContainerConfig = serde_yaml::from_str("{}").unwrap();

  assert_eq!(config.max_alias_depth, DEFAULT_MAX_ALIAS_DEPTH);
  assert!(config.rollback_on_failure);
}

#[tokio::test]
async fn test_alias_depth_limit_applies_to_composed_modules() {
  let config: ContainerConfig = serde_yaml::from_str("max_alias_depth: 1").unwrap();
  let module = Module::builder()
    .provide(Provider::value("target", 1u8))
    .provide(Provider::existing("one_hop", "target"))
    .provide(Provider::existing("two_hops", "one_hop"))
    .export("one_hop")
    .build();

  let error = Composer::with_config(config).compose(&module).await.unwrap_err();

  assert!(error.is_undefined());
  assert_eq!(
    error.resolve_stack().unwrap().identifiers(),
    vec!["\"two_hops\"", "\"one_hop\""]
  );
}
