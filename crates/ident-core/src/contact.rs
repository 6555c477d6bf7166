//! Contact — the sole persisted entity — and the request fragment it is
//! matched against.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Store-assigned, immutable contact identifier.
pub type ContactId = i64;

// ─── Precedence ──────────────────────────────────────────────────────────────

/// Whether a contact is the canonical representative of its cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkPrecedence {
  Primary,
  Secondary,
}

impl LinkPrecedence {
  /// The string stored in the `link_precedence` column.
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Primary => "primary",
      Self::Secondary => "secondary",
    }
  }

  pub fn parse(s: &str) -> Result<Self> {
    match s {
      "primary" => Ok(Self::Primary),
      "secondary" => Ok(Self::Secondary),
      other => Err(Error::UnknownPrecedence(other.to_owned())),
    }
  }
}

/// A contact's position in its cluster. A secondary always carries the id of
/// its primary; a primary never carries one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "linkPrecedence", rename_all = "lowercase")]
pub enum Link {
  Primary,
  Secondary {
    #[serde(rename = "linkedId")]
    linked_id: ContactId,
  },
}

impl Link {
  pub fn precedence(self) -> LinkPrecedence {
    match self {
      Self::Primary => LinkPrecedence::Primary,
      Self::Secondary { .. } => LinkPrecedence::Secondary,
    }
  }

  pub fn linked_id(self) -> Option<ContactId> {
    match self {
      Self::Primary => None,
      Self::Secondary { linked_id } => Some(linked_id),
    }
  }

  /// Rebuild from the two columns a row stores it in.
  pub fn from_parts(
    precedence: LinkPrecedence,
    linked_id: Option<ContactId>,
    id: ContactId,
  ) -> Result<Self> {
    match (precedence, linked_id) {
      (LinkPrecedence::Primary, None) => Ok(Self::Primary),
      (LinkPrecedence::Secondary, Some(linked_id)) => {
        Ok(Self::Secondary { linked_id })
      }
      (LinkPrecedence::Primary, Some(linked)) => {
        Err(Error::BrokenLink { contact: id, linked })
      }
      (LinkPrecedence::Secondary, None) => Err(Error::BrokenLink { contact: id, linked: id }),
    }
  }
}

// ─── Contact ─────────────────────────────────────────────────────────────────

/// One recorded (email, phone) observation of a person.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
  pub id:           ContactId,
  pub email:        Option<String>,
  pub phone_number: Option<String>,
  #[serde(flatten)]
  pub link:         Link,
  pub created_at:   DateTime<Utc>,
  /// Bumped whenever `link` changes.
  pub updated_at:   DateTime<Utc>,
  pub deleted_at:   Option<DateTime<Utc>>,
}

impl Contact {
  pub fn is_primary(&self) -> bool { self.link == Link::Primary }

  /// The id of this contact's primary: itself, or the one it links to.
  pub fn primary_id(&self) -> ContactId {
    self.link.linked_id().unwrap_or(self.id)
  }

  pub fn has_email(&self, email: &str) -> bool {
    self.email.as_deref() == Some(email)
  }

  pub fn has_phone(&self, phone: &str) -> bool {
    self.phone_number.as_deref() == Some(phone)
  }

  /// Ordering used to pick the surviving primary of a merge.
  pub fn seniority(&self) -> (DateTime<Utc>, ContactId) {
    (self.created_at, self.id)
  }
}

// ─── NewContact ──────────────────────────────────────────────────────────────

/// Input to [`crate::store::ContactRepo::create`]. The id and timestamps are
/// always assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewContact {
  pub email:        Option<String>,
  pub phone_number: Option<String>,
  pub link:         Link,
}

impl NewContact {
  pub fn primary(fragment: &Fragment) -> Self {
    Self {
      email:        fragment.email.clone(),
      phone_number: fragment.phone_number.clone(),
      link:         Link::Primary,
    }
  }

  pub fn secondary(fragment: &Fragment, linked_id: ContactId) -> Self {
    Self {
      email:        fragment.email.clone(),
      phone_number: fragment.phone_number.clone(),
      link:         Link::Secondary { linked_id },
    }
  }

  /// Stores must refuse rows that carry neither an email nor a phone.
  pub fn validate(&self) -> Result<()> {
    if self.email.is_none() && self.phone_number.is_none() {
      return Err(Error::EmptyFragment);
    }
    Ok(())
  }
}

// ─── Fragment ────────────────────────────────────────────────────────────────

/// A validated (email?, phone?) pair with at least one value present.
///
/// Empty strings count as absent. Nothing else is normalised: matching is
/// exact string equality.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
  email:        Option<String>,
  phone_number: Option<String>,
}

impl Fragment {
  pub fn new(
    email: Option<String>,
    phone_number: Option<String>,
  ) -> Result<Self> {
    let email = email.filter(|e| !e.is_empty());
    let phone_number = phone_number.filter(|p| !p.is_empty());
    if email.is_none() && phone_number.is_none() {
      return Err(Error::EmptyFragment);
    }
    Ok(Self { email, phone_number })
  }

  pub fn email(&self) -> Option<&str> { self.email.as_deref() }

  pub fn phone_number(&self) -> Option<&str> { self.phone_number.as_deref() }
}
