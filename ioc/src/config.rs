//! Tunables shared by resolution tables and the composition engine.

/// Default bound on the number of alias hops followed for a single request.
pub const DEFAULT_MAX_ALIAS_DEPTH: usize = 64;

/// Configuration for a [`ResolutionTable`](crate::ResolutionTable) or a
/// [`Composer`](crate::Composer).
///
/// ```
/// use fibre_di::ContainerConfig;
///
/// let config = ContainerConfig::new()
///   .max_alias_depth(8)
///   .rollback_on_failure(false);
/// assert_eq!(config.max_alias_depth, 8);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ContainerConfig {
  /// Alias chains longer than this fail as undefined instead of being followed.
  pub max_alias_depth: usize,
  /// When a root composition fails, dispose every module that already went live.
  pub rollback_on_failure: bool,
}

impl Default for ContainerConfig {
  fn default() -> Self {
    Self {
      max_alias_depth: DEFAULT_MAX_ALIAS_DEPTH,
      rollback_on_failure: true,
    }
  }
}

impl ContainerConfig {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn max_alias_depth(mut self, depth: usize) -> Self {
    self.max_alias_depth = depth;
    self
  }

  pub fn rollback_on_failure(mut self, enabled: bool) -> Self {
    self.rollback_on_failure = enabled;
    self
  }
}
