//! [`MemoryStore`] — an in-process reference implementation of
//! [`ContactStore`].
//!
//! Each transaction works on a private copy of the table and publishes it
//! only when the work succeeds, so writes are all-or-nothing. Transactions are
//! fully serialised by a single mutex.

use std::{
  cell::RefCell,
  sync::{Arc, Mutex, MutexGuard},
};

use chrono::Utc;
use thiserror::Error;

use crate::{
  contact::{Contact, ContactId, Link, NewContact},
  store::{ContactRepo, ContactStore, FailureClass, StoreFailure},
};

#[derive(Debug, Error)]
pub enum MemoryError {
  #[error("core error: {0}")]
  Core(#[from] crate::Error),

  /// Mirrors the SQL backend's partial unique indexes on live primaries.
  #[error("conflict: {0}")]
  Conflict(String),

  #[error("store lock poisoned")]
  Poisoned,
}

impl StoreFailure for MemoryError {
  fn class(&self) -> FailureClass {
    match self {
      Self::Conflict(_) => FailureClass::Conflict,
      Self::Core(crate::Error::DeadlineExceeded) => FailureClass::Timeout,
      Self::Core(_) | Self::Poisoned => FailureClass::Fatal,
    }
  }
}

pub type Result<T, E = MemoryError> = std::result::Result<T, E>;

#[derive(Debug, Clone, Default)]
struct Table {
  rows:    Vec<Contact>,
  next_id: ContactId,
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// Cloning is cheap — clones share the same table.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
  table: Arc<Mutex<Table>>,
}

impl MemoryStore {
  pub fn new() -> Self { Self::default() }

  /// A store pre-populated with `contacts`, kept verbatim (ids, timestamps,
  /// links). New ids continue after the largest seeded one.
  pub fn with_contacts(contacts: Vec<Contact>) -> Self {
    let next_id = contacts.iter().map(|c| c.id).max().unwrap_or(0);
    Self {
      table: Arc::new(Mutex::new(Table { rows: contacts, next_id })),
    }
  }

  /// Snapshot of every stored contact, soft-deleted ones included, in id
  /// order.
  pub fn contacts(&self) -> Result<Vec<Contact>> {
    let mut rows = self.lock()?.rows.clone();
    rows.sort_by_key(|c| c.id);
    Ok(rows)
  }

  fn lock(&self) -> Result<MutexGuard<'_, Table>> {
    self.table.lock().map_err(|_| MemoryError::Poisoned)
  }

  fn run<F, T>(&self, work: F) -> Result<T>
  where
    F: FnOnce(&dyn ContactRepo<Error = MemoryError>) -> Result<T>,
  {
    let mut table = self.lock()?;
    let tx = MemoryTx { table: RefCell::new(table.clone()) };
    let out = work(&tx)?;
    *table = tx.table.into_inner();
    Ok(out)
  }
}

impl ContactStore for MemoryStore {
  type Error = MemoryError;

  async fn transact<F, T>(&self, work: F) -> Result<T>
  where
    F: FnOnce(&dyn ContactRepo<Error = MemoryError>) -> Result<T>
      + Send
      + 'static,
    T: Send + 'static,
  {
    self.run(work)
  }
}

// ─── Transaction ─────────────────────────────────────────────────────────────

struct MemoryTx {
  table: RefCell<Table>,
}

impl MemoryTx {
  fn live(&self) -> Vec<Contact> {
    let mut rows: Vec<Contact> = self
      .table
      .borrow()
      .rows
      .iter()
      .filter(|c| c.deleted_at.is_none())
      .cloned()
      .collect();
    rows.sort_by_key(Contact::seniority);
    rows
  }

  fn matching(&self, email: Option<&str>, phone: Option<&str>) -> Vec<Contact> {
    self
      .live()
      .into_iter()
      .filter(|c| {
        email.is_some_and(|e| c.has_email(e)) || phone.is_some_and(|p| c.has_phone(p))
      })
      .collect()
  }

  fn update<F>(&self, id: ContactId, f: F) -> Result<()>
  where
    F: FnOnce(&mut Contact),
  {
    let mut table = self.table.borrow_mut();
    let row = table
      .rows
      .iter_mut()
      .find(|c| c.id == id && c.deleted_at.is_none())
      .ok_or(crate::Error::ContactNotFound(id))?;
    f(row);
    Ok(())
  }
}

impl ContactRepo for MemoryTx {
  type Error = MemoryError;

  fn get_contact(&self, id: ContactId) -> Result<Option<Contact>> {
    Ok(self.live().into_iter().find(|c| c.id == id))
  }

  fn find_primary_by_email_or_phone(
    &self,
    email: Option<&str>,
    phone: Option<&str>,
  ) -> Result<Option<Contact>> {
    Ok(self.matching(email, phone).into_iter().find(Contact::is_primary))
  }

  fn find_by_email_or_phone(
    &self,
    email: Option<&str>,
    phone: Option<&str>,
  ) -> Result<Vec<Contact>> {
    Ok(self.matching(email, phone))
  }

  fn find_secondaries_of(&self, primary_id: ContactId) -> Result<Vec<Contact>> {
    Ok(
      self
        .live()
        .into_iter()
        .filter(|c| c.link == Link::Secondary { linked_id: primary_id })
        .collect(),
    )
  }

  fn create(&self, input: NewContact) -> Result<Contact> {
    input.validate()?;

    if input.link == Link::Primary {
      let clash = self
        .live()
        .into_iter()
        .filter(Contact::is_primary)
        .find(|c| {
          input.email.as_deref().is_some_and(|e| c.has_email(e))
            || input.phone_number.as_deref().is_some_and(|p| c.has_phone(p))
        });
      if let Some(c) = clash {
        return Err(MemoryError::Conflict(format!(
          "primary contact {} already holds this email or phone",
          c.id
        )));
      }
    }

    if let Some(linked_id) = input.link.linked_id()
      && self.get_contact(linked_id)?.is_none()
    {
      return Err(crate::Error::ContactNotFound(linked_id).into());
    }

    let mut table = self.table.borrow_mut();
    table.next_id += 1;
    let now = Utc::now();
    let contact = Contact {
      id:           table.next_id,
      email:        input.email,
      phone_number: input.phone_number,
      link:         input.link,
      created_at:   now,
      updated_at:   now,
      deleted_at:   None,
    };
    table.rows.push(contact.clone());
    Ok(contact)
  }

  fn demote_to_secondary(
    &self,
    contact_id: ContactId,
    new_primary_id: ContactId,
  ) -> Result<()> {
    if contact_id == new_primary_id {
      return Err(crate::Error::SelfLink(contact_id).into());
    }
    self.update(contact_id, |c| {
      c.link = Link::Secondary { linked_id: new_primary_id };
      c.updated_at = Utc::now();
    })
  }

  fn relink_secondaries(
    &self,
    old_primary_id: ContactId,
    new_primary_id: ContactId,
  ) -> Result<usize> {
    if old_primary_id == new_primary_id {
      return Err(crate::Error::SelfLink(old_primary_id).into());
    }
    let now = Utc::now();
    let mut moved = 0;
    for c in self.table.borrow_mut().rows.iter_mut() {
      if c.deleted_at.is_none() && c.link == (Link::Secondary { linked_id: old_primary_id }) {
        c.link = Link::Secondary { linked_id: new_primary_id };
        c.updated_at = now;
        moved += 1;
      }
    }
    Ok(moved)
  }
}
