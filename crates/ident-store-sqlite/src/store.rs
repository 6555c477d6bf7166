//! [`SqliteStore`] — the SQLite implementation of [`ContactStore`].

use std::{path::Path, time::Duration};

use chrono::Utc;
use ident_core::{
  contact::{Contact, ContactId, NewContact},
  store::{ContactRepo, ContactStore},
};
use rusqlite::{OptionalExtension as _, TransactionBehavior};
use tracing::debug;

use crate::{
  Error, Result,
  encode::{CONTACT_COLUMNS, RawContact, encode_dt},
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// An identity store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted. All
/// transactions run on the connection's thread, one at a time.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref();
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    debug!(path = %path.display(), "opened contact store");
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// How long a transaction waits for another process's write lock before
  /// giving up with a timeout.
  pub async fn set_busy_timeout(&self, timeout: Duration) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        conn.busy_timeout(timeout)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Mark a contact as deleted. Deleted contacts no longer take part in any
  /// lookup. Returns `false` if the contact was missing or already deleted.
  ///
  /// The cluster stays whole: deleting a primary promotes its most senior
  /// live secondary and relinks the rest to it, and contacts linked to a
  /// deleted secondary move to that secondary's primary.
  pub async fn soft_delete(&self, id: ContactId) -> Result<bool> {
    let at = encode_dt(Utc::now());
    let deleted = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let Some(linked_id) = tx
          .query_row(
            "SELECT linked_id FROM contacts WHERE id = ?1 AND deleted_at IS NULL",
            rusqlite::params![id],
            |row| row.get::<_, Option<ContactId>>(0),
          )
          .optional()?
        else {
          return Ok(false);
        };

        tx.execute(
          "UPDATE contacts SET deleted_at = ?2, updated_at = ?2 WHERE id = ?1",
          rusqlite::params![id, at],
        )?;

        let heir = match linked_id {
          Some(primary) => Some(primary),
          None => {
            let heir = tx
              .query_row(
                "SELECT id FROM contacts
                 WHERE linked_id = ?1 AND link_precedence = 'secondary'
                   AND deleted_at IS NULL
                 ORDER BY created_at, id
                 LIMIT 1",
                rusqlite::params![id],
                |row| row.get::<_, ContactId>(0),
              )
              .optional()?;
            if let Some(heir) = heir {
              tx.execute(
                "UPDATE contacts
                 SET link_precedence = 'primary', linked_id = NULL, updated_at = ?2
                 WHERE id = ?1",
                rusqlite::params![heir, at],
              )?;
            }
            heir
          }
        };

        if let Some(heir) = heir {
          tx.execute(
            "UPDATE contacts SET linked_id = ?2, updated_at = ?3
             WHERE linked_id = ?1 AND link_precedence = 'secondary'
               AND deleted_at IS NULL",
            rusqlite::params![id, heir, at],
          )?;
        }

        tx.commit()?;
        Ok(true)
      })
      .await?;
    if deleted {
      debug!(contact_id = id, "soft-deleted contact");
    }
    Ok(deleted)
  }

  /// Every stored contact, deleted ones included, in id order.
  pub async fn all_contacts(&self) -> Result<Vec<Contact>> {
    let raws: Vec<RawContact> = self
      .conn
      .call(|conn| {
        let mut stmt = conn
          .prepare(&format!("SELECT {CONTACT_COLUMNS} FROM contacts ORDER BY id"))?;
        let rows = stmt
          .query_map([], RawContact::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawContact::into_contact).collect()
  }
}

// ─── ContactStore impl ───────────────────────────────────────────────────────

impl ContactStore for SqliteStore {
  type Error = Error;

  async fn transact<F, T>(&self, work: F) -> Result<T>
  where
    F: FnOnce(&dyn ContactRepo<Error = Error>) -> Result<T> + Send + 'static,
    T: Send + 'static,
  {
    self
      .conn
      .call(move |conn| {
        // IMMEDIATE takes the write lock up front, so two writers can never
        // both read "no match" and then race to insert.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        match work(&SqliteTx { tx: &tx }) {
          Ok(out) => {
            tx.commit()?;
            Ok(Ok(out))
          }
          // Dropping `tx` rolls back.
          Err(e) => {
            debug!(error = %e, "rolling back contact transaction");
            Ok(Err(e))
          }
        }
      })
      .await?
  }
}

// ─── Transaction ─────────────────────────────────────────────────────────────

struct SqliteTx<'a> {
  tx: &'a rusqlite::Transaction<'a>,
}

impl SqliteTx<'_> {
  fn query_contacts(
    &self,
    filter: &str,
    params: impl rusqlite::Params,
  ) -> Result<Vec<Contact>> {
    let sql = format!(
      "SELECT {CONTACT_COLUMNS} FROM contacts
       WHERE deleted_at IS NULL AND ({filter})
       ORDER BY created_at, id"
    );
    let mut stmt = self.tx.prepare_cached(&sql)?;
    let raws = stmt
      .query_map(params, RawContact::from_row)?
      .collect::<rusqlite::Result<Vec<_>>>()?;
    raws.into_iter().map(RawContact::into_contact).collect()
  }
}

impl ContactRepo for SqliteTx<'_> {
  type Error = Error;

  fn get_contact(&self, id: ContactId) -> Result<Option<Contact>> {
    let raw = self
      .tx
      .query_row(
        &format!(
          "SELECT {CONTACT_COLUMNS} FROM contacts WHERE id = ?1 AND deleted_at IS NULL"
        ),
        rusqlite::params![id],
        RawContact::from_row,
      )
      .optional()?;
    raw.map(RawContact::into_contact).transpose()
  }

  fn find_primary_by_email_or_phone(
    &self,
    email: Option<&str>,
    phone: Option<&str>,
  ) -> Result<Option<Contact>> {
    let found = self.query_contacts(
      "link_precedence = 'primary' AND (email = ?1 OR phone_number = ?2)",
      rusqlite::params![email, phone],
    )?;
    Ok(found.into_iter().next())
  }

  fn find_by_email_or_phone(
    &self,
    email: Option<&str>,
    phone: Option<&str>,
  ) -> Result<Vec<Contact>> {
    self.query_contacts(
      "email = ?1 OR phone_number = ?2",
      rusqlite::params![email, phone],
    )
  }

  fn find_secondaries_of(&self, primary_id: ContactId) -> Result<Vec<Contact>> {
    self.query_contacts(
      "link_precedence = 'secondary' AND linked_id = ?1",
      rusqlite::params![primary_id],
    )
  }

  fn create(&self, input: NewContact) -> Result<Contact> {
    input.validate()?;

    let now = Utc::now();
    let at = encode_dt(now);
    self.tx.execute(
      "INSERT INTO contacts (
         email, phone_number, link_precedence, linked_id, created_at, updated_at
       ) VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
      rusqlite::params![
        input.email,
        input.phone_number,
        input.link.precedence().as_str(),
        input.link.linked_id(),
        at,
      ],
    )?;

    Ok(Contact {
      id:           self.tx.last_insert_rowid(),
      email:        input.email,
      phone_number: input.phone_number,
      link:         input.link,
      created_at:   now,
      updated_at:   now,
      deleted_at:   None,
    })
  }

  fn demote_to_secondary(
    &self,
    contact_id: ContactId,
    new_primary_id: ContactId,
  ) -> Result<()> {
    if contact_id == new_primary_id {
      return Err(ident_core::Error::SelfLink(contact_id).into());
    }
    let changed = self.tx.execute(
      "UPDATE contacts
       SET link_precedence = 'secondary', linked_id = ?2, updated_at = ?3
       WHERE id = ?1 AND deleted_at IS NULL",
      rusqlite::params![contact_id, new_primary_id, encode_dt(Utc::now())],
    )?;
    if changed == 0 {
      return Err(Error::Core(ident_core::Error::ContactNotFound(contact_id)));
    }
    Ok(())
  }

  fn relink_secondaries(
    &self,
    old_primary_id: ContactId,
    new_primary_id: ContactId,
  ) -> Result<usize> {
    if old_primary_id == new_primary_id {
      return Err(ident_core::Error::SelfLink(old_primary_id).into());
    }
    Ok(self.tx.execute(
      "UPDATE contacts
       SET linked_id = ?2, updated_at = ?3
       WHERE linked_id = ?1 AND link_precedence = 'secondary'
         AND deleted_at IS NULL",
      rusqlite::params![old_primary_id, new_primary_id, encode_dt(Utc::now())],
    )?)
  }
}
