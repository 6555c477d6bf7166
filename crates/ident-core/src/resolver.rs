//! [`Resolver`] — the stateless service that runs resolutions against a
//! [`ContactStore`], one transaction per attempt.

use std::{
  sync::Arc,
  time::{Duration, Instant},
};

use tracing::warn;

use crate::{
  Error, ResolveError,
  contact::Fragment,
  resolve::{Resolution, lookup_in, resolve_in},
  store::{ContactRepo, ContactStore, FailureClass, StoreFailure},
  view::ConsolidatedView,
};

/// Bounds on how long and how often a resolution may be attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  /// Total attempts, the first included. Values below 1 are treated as 1.
  pub max_attempts: u32,
  /// Pause between a conflicting attempt and the next one.
  pub backoff:      Duration,
  /// Budget for a single store transaction.
  pub tx_timeout:   Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_attempts: 3,
      backoff:      Duration::from_millis(25),
      tx_timeout:   Duration::from_secs(5),
    }
  }
}

/// Resolves contact fragments into identity clusters.
///
/// Holds no state of its own beyond the store handle; any number of requests
/// may share one `Resolver`.
pub struct Resolver<S> {
  store:  Arc<S>,
  policy: RetryPolicy,
}

impl<S> Clone for Resolver<S> {
  fn clone(&self) -> Self {
    Self { store: Arc::clone(&self.store), policy: self.policy }
  }
}

impl<S: ContactStore + 'static> Resolver<S> {
  pub fn new(store: Arc<S>) -> Self {
    Self::with_policy(store, RetryPolicy::default())
  }

  pub fn with_policy(store: Arc<S>, policy: RetryPolicy) -> Self {
    Self { store, policy }
  }

  /// Resolve an incoming (email?, phone?) pair, creating, linking or merging
  /// contacts as needed, and return the consolidated cluster.
  ///
  /// Fails with [`ResolveError::Validation`] before touching the store when
  /// both values are absent. Write conflicts are retried from scratch up to
  /// [`RetryPolicy::max_attempts`] times.
  pub async fn resolve(
    &self,
    email: Option<String>,
    phone_number: Option<String>,
  ) -> Result<Resolution, ResolveError> {
    let fragment =
      Fragment::new(email, phone_number).map_err(ResolveError::Validation)?;
    let max_attempts = self.policy.max_attempts.max(1);

    let mut attempt = 1;
    loop {
      let work = fragment.clone();
      let result = self
        .run(move |repo| resolve_in(repo, &work))
        .await?;

      match result {
        Ok(resolution) => return Ok(resolution),
        Err(e) if e.class() == FailureClass::Conflict && attempt < max_attempts => {
          warn!(attempt, max_attempts, error = %e, "write conflict, retrying");
          tokio::time::sleep(self.policy.backoff).await;
          attempt += 1;
        }
        Err(e) => return Err(self.classify(e, attempt)),
      }
    }
  }

  /// Report the cluster an (email?, phone?) pair belongs to without writing
  /// anything. Returns `None` when nothing matches.
  pub async fn lookup(
    &self,
    email: Option<String>,
    phone_number: Option<String>,
  ) -> Result<Option<ConsolidatedView>, ResolveError> {
    let fragment =
      Fragment::new(email, phone_number).map_err(ResolveError::Validation)?;

    self
      .run(move |repo| lookup_in(repo, &fragment))
      .await?
      .map_err(|e| self.classify(e, 1))
  }

  /// One transaction under the policy's timeout. The outer error is the
  /// timeout; the inner one is whatever the store reported.
  ///
  /// Dropping the future does not stop a store that already queued `work`
  /// elsewhere, so `work` also carries the deadline: started or finished
  /// late, it fails with [`Error::DeadlineExceeded`] and the store rolls
  /// back instead of committing.
  async fn run<F, T>(&self, work: F) -> Result<Result<T, S::Error>, ResolveError>
  where
    F: FnOnce(&dyn ContactRepo<Error = S::Error>) -> Result<T, S::Error>
      + Send
      + 'static,
    T: Send + 'static,
  {
    let deadline = Instant::now() + self.policy.tx_timeout;
    let bounded =
      move |repo: &dyn ContactRepo<Error = S::Error>| -> Result<T, S::Error> {
        check_deadline(deadline)?;
        let out = work(repo)?;
        check_deadline(deadline)?;
        Ok(out)
      };

    tokio::time::timeout(self.policy.tx_timeout, self.store.transact(bounded))
      .await
      .map_err(|_| ResolveError::Timeout(self.policy.tx_timeout))
  }

  fn classify(&self, e: S::Error, attempts: u32) -> ResolveError {
    match e.class() {
      FailureClass::Conflict => {
        ResolveError::ConflictsExhausted { attempts, last: Box::new(e) }
      }
      FailureClass::Timeout => ResolveError::Timeout(self.policy.tx_timeout),
      FailureClass::Fatal => ResolveError::Store(Box::new(e)),
    }
  }
}

fn check_deadline(deadline: Instant) -> Result<(), Error> {
  if Instant::now() >= deadline {
    return Err(Error::DeadlineExceeded);
  }
  Ok(())
}
