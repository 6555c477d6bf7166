//! Error types for `ident-core`.

use std::time::Duration;

use thiserror::Error;

use crate::contact::ContactId;

/// Boxed store error, so callers above the store need not be generic over it.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum Error {
  #[error("either email or phoneNumber must be provided")]
  EmptyFragment,

  #[error("contact not found: {0}")]
  ContactNotFound(ContactId),

  #[error("contact {0} cannot be linked to itself")]
  SelfLink(ContactId),

  #[error("contact {contact} has a broken primary link to {linked}")]
  BrokenLink { contact: ContactId, linked: ContactId },

  #[error("unknown link precedence: {0:?}")]
  UnknownPrecedence(String),

  /// The transaction outlived its budget and must not commit.
  #[error("transaction deadline exceeded")]
  DeadlineExceeded,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failure of a [`crate::resolver::Resolver`] operation, as seen by callers.
#[derive(Debug, Error)]
pub enum ResolveError {
  /// The request itself is unusable; nothing was read or written.
  #[error("invalid request: {0}")]
  Validation(#[source] Error),

  /// Every attempt lost a write race against a concurrent request.
  #[error("gave up after {attempts} conflicting attempts")]
  ConflictsExhausted {
    attempts: u32,
    #[source]
    last:     BoxError,
  },

  /// The store transaction did not finish within the configured budget.
  #[error("store transaction timed out after {0:?}")]
  Timeout(Duration),

  #[error("store error: {0}")]
  Store(#[source] BoxError),
}

impl ResolveError {
  /// `true` for faults caused by the request rather than the server.
  pub fn is_client_error(&self) -> bool { matches!(self, Self::Validation(_)) }

  /// `true` when repeating the same request later may succeed.
  pub fn is_retryable(&self) -> bool {
    matches!(self, Self::ConflictsExhausted { .. } | Self::Timeout(_))
  }
}
