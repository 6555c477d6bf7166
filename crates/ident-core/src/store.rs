//! The `ContactRepo` / `ContactStore` traits.
//!
//! Storage backends (e.g. `ident-store-sqlite`, [`crate::memory`]) implement
//! both. The resolver depends on this abstraction only; a store is passed to
//! it explicitly, never reached through a process-wide handle.

use std::future::Future;

use crate::contact::{Contact, ContactId, NewContact};

// ─── Failure classification ─────────────────────────────────────────────────

/// How a failed store operation should be treated by the resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
  /// Lost a race with a concurrent writer; retrying from scratch may succeed.
  Conflict,
  /// Gave up waiting for a lock or for the transaction to finish.
  Timeout,
  /// Anything else. Not retried.
  Fatal,
}

/// Implemented by store error types so the resolver can classify them
/// without knowing the backend.
pub trait StoreFailure {
  fn class(&self) -> FailureClass;
}

// ─── Repo (one open transaction) ────────────────────────────────────────────

/// The contact operations available inside a single store transaction.
///
/// Every lookup ignores soft-deleted contacts.
pub trait ContactRepo {
  type Error;

  /// Retrieve a contact by id. Returns `None` if missing or soft-deleted.
  fn get_contact(&self, id: ContactId) -> Result<Option<Contact>, Self::Error>;

  /// A primary whose email equals `email` or whose phone equals `phone`.
  /// When several qualify (an unmerged store), the most senior one wins.
  fn find_primary_by_email_or_phone(
    &self,
    email: Option<&str>,
    phone: Option<&str>,
  ) -> Result<Option<Contact>, Self::Error>;

  /// Every contact, of either precedence, matching `email` or `phone`,
  /// ordered by creation ascending.
  fn find_by_email_or_phone(
    &self,
    email: Option<&str>,
    phone: Option<&str>,
  ) -> Result<Vec<Contact>, Self::Error>;

  /// All secondaries currently linked to `primary_id`, ordered by creation
  /// ascending.
  fn find_secondaries_of(
    &self,
    primary_id: ContactId,
  ) -> Result<Vec<Contact>, Self::Error>;

  /// Insert a new contact. Fails if `input` has neither email nor phone.
  fn create(&self, input: NewContact) -> Result<Contact, Self::Error>;

  /// Turn `contact_id` into a secondary of `new_primary_id`.
  fn demote_to_secondary(
    &self,
    contact_id: ContactId,
    new_primary_id: ContactId,
  ) -> Result<(), Self::Error>;

  /// Repoint every secondary of `old_primary_id` at `new_primary_id`.
  /// Returns the number of contacts moved.
  fn relink_secondaries(
    &self,
    old_primary_id: ContactId,
    new_primary_id: ContactId,
  ) -> Result<usize, Self::Error>;
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// Abstraction over a transactional contact store backend.
///
/// All work happens through [`ContactStore::transact`]: either everything the
/// closure wrote commits, or nothing does.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait ContactStore: Send + Sync {
  type Error: StoreFailure
    + From<crate::Error>
    + std::error::Error
    + Send
    + Sync
    + 'static;

  /// Run `work` inside one transaction. Commits if it returns `Ok`, rolls
  /// back otherwise.
  fn transact<F, T>(
    &self,
    work: F,
  ) -> impl Future<Output = Result<T, Self::Error>> + Send + '_
  where
    F: FnOnce(&dyn ContactRepo<Error = Self::Error>) -> Result<T, Self::Error>
      + Send
      + 'static,
    T: Send + 'static;
}
