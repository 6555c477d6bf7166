//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as RFC 3339 strings with a fixed microsecond
//! precision, so lexical order in SQL equals chronological order.

use chrono::{DateTime, SecondsFormat, Utc};
use ident_core::contact::{Contact, ContactId, Link, LinkPrecedence};

use crate::{Error, Result};

/// Columns selected by every contact query, in [`RawContact`] order.
pub const CONTACT_COLUMNS: &str = "id, email, phone_number, link_precedence, linked_id, \
                                   created_at, updated_at, deleted_at";

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Raw row ─────────────────────────────────────────────────────────────────

/// A `contacts` row exactly as read from SQLite, before validation.
pub struct RawContact {
  pub id:              ContactId,
  pub email:           Option<String>,
  pub phone_number:    Option<String>,
  pub link_precedence: String,
  pub linked_id:       Option<ContactId>,
  pub created_at:      String,
  pub updated_at:      String,
  pub deleted_at:      Option<String>,
}

impl RawContact {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:              row.get(0)?,
      email:           row.get(1)?,
      phone_number:    row.get(2)?,
      link_precedence: row.get(3)?,
      linked_id:       row.get(4)?,
      created_at:      row.get(5)?,
      updated_at:      row.get(6)?,
      deleted_at:      row.get(7)?,
    })
  }

  pub fn into_contact(self) -> Result<Contact> {
    let precedence = LinkPrecedence::parse(&self.link_precedence)?;
    Ok(Contact {
      id:           self.id,
      email:        self.email,
      phone_number: self.phone_number,
      link:         Link::from_parts(precedence, self.linked_id, self.id)?,
      created_at:   decode_dt(&self.created_at)?,
      updated_at:   decode_dt(&self.updated_at)?,
      deleted_at:   self.deleted_at.as_deref().map(decode_dt).transpose()?,
    })
  }
}
