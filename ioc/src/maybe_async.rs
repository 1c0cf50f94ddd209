//! A value that is either available now or will be available later.
//!
//! Resolution never coerces an immediate value into a future: chaining onto a
//! [`MaybeAsync::Ready`] runs the continuation on the spot, and collecting a list
//! of ready values yields a ready list. Only when some link actually is deferred
//! does the result become [`MaybeAsync::Deferred`].

use std::fmt;
use std::future::{Future, IntoFuture};

use futures_util::future::{self, BoxFuture, FutureExt};

use crate::error::Error;

/// The outcome of a resolution: a result that may still be in flight.
pub type Resolution<T> = MaybeAsync<Result<T, Error>>;

pub enum MaybeAsync<T> {
  Ready(T),
  Deferred(BoxFuture<'static, T>),
}

impl<T: Send + 'static> MaybeAsync<T> {
  pub fn ready(value: T) -> Self {
    MaybeAsync::Ready(value)
  }

  pub fn deferred(future: impl Future<Output = T> + Send + 'static) -> Self {
    MaybeAsync::Deferred(future.boxed())
  }

  pub fn is_ready(&self) -> bool {
    matches!(self, MaybeAsync::Ready(_))
  }

  pub fn is_deferred(&self) -> bool {
    !self.is_ready()
  }

  /// Returns the value if it is available now, or gives `self` back otherwise.
  pub fn into_ready(self) -> Result<T, Self> {
    match self {
      MaybeAsync::Ready(value) => Ok(value),
      deferred => Err(deferred),
    }
  }

  /// Applies `next` immediately for a ready value, or after the deferred value settles.
  pub fn next<U, F>(self, next: F) -> MaybeAsync<U>
  where
    U: Send + 'static,
    F: FnOnce(T) -> MaybeAsync<U> + Send + 'static,
  {
    match self {
      MaybeAsync::Ready(value) => next(value),
      MaybeAsync::Deferred(future) => {
        MaybeAsync::Deferred(async move { next(future.await).await }.boxed())
      }
    }
  }

  pub fn map<U, F>(self, f: F) -> MaybeAsync<U>
  where
    U: Send + 'static,
    F: FnOnce(T) -> U + Send + 'static,
  {
    match self {
      MaybeAsync::Ready(value) => MaybeAsync::Ready(f(value)),
      MaybeAsync::Deferred(future) => MaybeAsync::Deferred(future.map(f).boxed()),
    }
  }

  /// Collects values in input order.
  ///
  /// Stays ready when every input is ready; otherwise settles once all inputs have.
  pub fn all<I>(values: I) -> MaybeAsync<Vec<T>>
  where
    I: IntoIterator<Item = MaybeAsync<T>>,
  {
    let values: Vec<_> = values.into_iter().collect();
    if values.iter().all(MaybeAsync::is_ready) {
      return MaybeAsync::Ready(
        values
          .into_iter()
          .filter_map(|value| value.into_ready().ok())
          .collect(),
      );
    }
    let futures: Vec<_> = values.into_iter().map(MaybeAsync::into_future).collect();
    MaybeAsync::Deferred(future::join_all(futures).boxed())
  }
}

impl<T, E> MaybeAsync<Result<T, E>>
where
  T: Send + 'static,
  E: Send + 'static,
{
  /// Chains a fallible continuation; an error skips it.
  pub fn and_then<U, F>(self, next: F) -> MaybeAsync<Result<U, E>>
  where
    U: Send + 'static,
    F: FnOnce(T) -> MaybeAsync<Result<U, E>> + Send + 'static,
  {
    self.next(move |result| match result {
      Ok(value) => next(value),
      Err(e) => MaybeAsync::Ready(Err(e)),
    })
  }

  pub fn map_ok<U, F>(self, f: F) -> MaybeAsync<Result<U, E>>
  where
    U: Send + 'static,
    F: FnOnce(T) -> U + Send + 'static,
  {
    self.map(move |result| result.map(f))
  }

  pub fn map_err<E2, F>(self, f: F) -> MaybeAsync<Result<T, E2>>
  where
    E2: Send + 'static,
    F: FnOnce(E) -> E2 + Send + 'static,
  {
    self.map(move |result| result.map_err(f))
  }

  /// Fallible counterpart of [`MaybeAsync::all`].
  ///
  /// An input that has already failed short-circuits to a ready error. Deferred
  /// inputs are driven concurrently and the first failure wins.
  pub fn try_all<I>(values: I) -> MaybeAsync<Result<Vec<T>, E>>
  where
    I: IntoIterator<Item = MaybeAsync<Result<T, E>>>,
  {
    let mut pending = Vec::new();
    for value in values {
      match value {
        MaybeAsync::Ready(Err(e)) => return MaybeAsync::Ready(Err(e)),
        other => pending.push(other),
      }
    }
    if pending.iter().all(MaybeAsync::is_ready) {
      return MaybeAsync::Ready(
        pending
          .into_iter()
          .filter_map(|value| value.into_ready().ok())
          .collect(),
      );
    }
    let futures: Vec<_> = pending.into_iter().map(MaybeAsync::into_future).collect();
    MaybeAsync::Deferred(future::try_join_all(futures).boxed())
  }
}

impl<T: Send + 'static> IntoFuture for MaybeAsync<T> {
  type Output = T;
  type IntoFuture = BoxFuture<'static, T>;

  fn into_future(self) -> Self::IntoFuture {
    match self {
      MaybeAsync::Ready(value) => future::ready(value).boxed(),
      MaybeAsync::Deferred(future) => future,
    }
  }
}

impl<T: fmt::Debug> fmt::Debug for MaybeAsync<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      MaybeAsync::Ready(value) => f.debug_tuple("Ready").field(value).finish(),
      MaybeAsync::Deferred(_) => f.write_str("Deferred(..)"),
    }
  }
}
