//! The consolidated, read-only view of one identity cluster.

use serde::{Deserialize, Serialize};

use crate::contact::{Contact, ContactId};

/// Canonical view of a cluster, as returned to callers.
///
/// `Default` is the zeroed shape used in error responses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsolidatedView {
  pub primary_contact_id:    ContactId,
  /// The primary's email first, then secondaries' in creation order.
  pub emails:                Vec<String>,
  /// The primary's phone first, then secondaries' in creation order.
  pub phone_numbers:         Vec<String>,
  pub secondary_contact_ids: Vec<ContactId>,
}

impl ConsolidatedView {
  /// Build the view from a primary and its secondaries, which must already be
  /// in ascending creation order.
  pub fn assemble(primary: &Contact, secondaries: &[Contact]) -> Self {
    let members = || std::iter::once(primary).chain(secondaries);

    Self {
      primary_contact_id:    primary.id,
      emails:                dedup_in_order(members().filter_map(|c| c.email.as_deref())),
      phone_numbers:         dedup_in_order(
        members().filter_map(|c| c.phone_number.as_deref()),
      ),
      secondary_contact_ids: secondaries.iter().map(|c| c.id).collect(),
    }
  }
}

/// Keep the first occurrence of each value, preserving order.
fn dedup_in_order<'a>(values: impl Iterator<Item = &'a str>) -> Vec<String> {
  let mut out: Vec<String> = Vec::new();
  for v in values {
    if !out.iter().any(|seen| seen == v) {
      out.push(v.to_owned());
    }
  }
  out
}
