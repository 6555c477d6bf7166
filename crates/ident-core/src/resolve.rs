//! The identity-resolution algorithm, run against one open transaction.
//!
//! 1. Find every contact matching the fragment's email or phone.
//! 2. No match: the fragment becomes a new primary.
//! 3. Otherwise collect the distinct primaries behind the matches. The most
//!    senior (earliest `created_at`, then lowest id) survives; every other one
//!    is demoted and its secondaries are relinked to the survivor.
//! 4. If the fragment carries a value the merged cluster lacks, it is stored
//!    as a new secondary of the survivor.
//! 5. The cluster is read back and assembled into a [`ConsolidatedView`].

use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::{
  Error,
  contact::{Contact, ContactId, Fragment, NewContact},
  store::ContactRepo,
  view::ConsolidatedView,
};

/// What a resolution changed in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
  /// Nothing matched; a new primary was created.
  CreatedPrimary(ContactId),
  /// One cluster matched and the fragment added a new value to it.
  CreatedSecondary(ContactId),
  /// The fragment was already fully represented. Nothing was written.
  Unchanged,
  /// The fragment bridged several clusters (or reached a chained
  /// secondary), which were folded into `survivor`.
  Merged {
    survivor: ContactId,
    /// Former primaries, now secondaries of `survivor`.
    demoted:  Vec<ContactId>,
    /// Secondary created after the merge, if the fragment was still new.
    created:  Option<ContactId>,
  },
}

impl Outcome {
  pub fn is_write(&self) -> bool { !matches!(self, Self::Unchanged) }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
  pub view:    ConsolidatedView,
  pub outcome: Outcome,
}

/// Resolve `fragment` against `repo`, writing whatever the cluster invariant
/// requires. Must run inside a single transaction.
pub fn resolve_in<R>(repo: &R, fragment: &Fragment) -> Result<Resolution, R::Error>
where
  R: ContactRepo + ?Sized,
  R::Error: From<Error>,
{
  let matches =
    repo.find_by_email_or_phone(fragment.email(), fragment.phone_number())?;

  if matches.is_empty() {
    let primary = repo.create(NewContact::primary(fragment))?;
    info!(contact_id = primary.id, "created primary contact");
    return Ok(Resolution {
      view:    ConsolidatedView::assemble(&primary, &[]),
      outcome: Outcome::CreatedPrimary(primary.id),
    });
  }

  let Roots { primaries, intermediates } = roots_of(repo, &matches)?;
  let mut primaries = primaries.into_iter();
  let Some(survivor) = primaries.next() else {
    return Err(Error::ContactNotFound(matches[0].primary_id()).into());
  };

  let mut demoted = Vec::new();
  for loser in primaries {
    repo.demote_to_secondary(loser.id, survivor.id)?;
    let moved = repo.relink_secondaries(loser.id, survivor.id)?;
    info!(
      survivor = survivor.id,
      demoted = loser.id,
      relinked = moved,
      "merged identity clusters"
    );
    demoted.push(loser.id);
  }

  let mut flattened = 0;
  for link in intermediates {
    flattened += repo.relink_secondaries(link, survivor.id)?;
  }
  if flattened > 0 {
    info!(survivor = survivor.id, relinked = flattened, "flattened secondary chain");
  }

  let mut secondaries = repo.find_secondaries_of(survivor.id)?;

  let created = if is_represented(fragment, &survivor, &secondaries) {
    None
  } else {
    let contact = repo.create(NewContact::secondary(fragment, survivor.id))?;
    info!(
      contact_id = contact.id,
      primary = survivor.id,
      "created secondary contact"
    );
    secondaries = repo.find_secondaries_of(survivor.id)?;
    Some(contact.id)
  };

  let outcome = match (demoted.is_empty() && flattened == 0, created) {
    (false, created) => Outcome::Merged {
      survivor: survivor.id,
      demoted,
      created,
    },
    (true, Some(id)) => Outcome::CreatedSecondary(id),
    (true, None) => {
      debug!(primary = survivor.id, "fragment already known");
      Outcome::Unchanged
    }
  };

  Ok(Resolution {
    view: ConsolidatedView::assemble(&survivor, &secondaries),
    outcome,
  })
}

/// Read-only variant of [`resolve_in`]: report the cluster `fragment` belongs
/// to without writing anything.
///
/// A fragment spanning unmerged clusters reports the cluster of a primary it
/// matches directly, falling back to the cluster of the oldest match.
pub fn lookup_in<R>(
  repo: &R,
  fragment: &Fragment,
) -> Result<Option<ConsolidatedView>, R::Error>
where
  R: ContactRepo + ?Sized,
  R::Error: From<Error>,
{
  let primary = match repo
    .find_primary_by_email_or_phone(fragment.email(), fragment.phone_number())?
  {
    Some(primary) => primary,
    None => {
      let matches = repo
        .find_by_email_or_phone(fragment.email(), fragment.phone_number())?;
      match matches.first() {
        Some(first) => root_primary(repo, first, &matches)?.0,
        None => return Ok(None),
      }
    }
  };

  let secondaries = repo.find_secondaries_of(primary.id)?;
  Ok(Some(ConsolidatedView::assemble(&primary, &secondaries)))
}

struct Roots {
  /// Distinct primaries behind the matches, most senior first.
  primaries:     Vec<Contact>,
  /// Secondaries found in the middle of a link chain.
  intermediates: Vec<ContactId>,
}

fn roots_of<R>(repo: &R, matches: &[Contact]) -> Result<Roots, R::Error>
where
  R: ContactRepo + ?Sized,
  R::Error: From<Error>,
{
  let mut by_id: BTreeMap<ContactId, Contact> = BTreeMap::new();
  let mut intermediates = Vec::new();
  for contact in matches {
    if by_id.contains_key(&contact.primary_id()) {
      continue;
    }
    let (primary, chain) = root_primary(repo, contact, matches)?;
    for id in chain {
      if !intermediates.contains(&id) {
        intermediates.push(id);
      }
    }
    by_id.insert(primary.id, primary);
  }

  let mut primaries: Vec<Contact> = by_id.into_values().collect();
  primaries.sort_by_key(Contact::seniority);
  Ok(Roots { primaries, intermediates })
}

/// Follow `contact`'s link to its primary. Normally a single hop; longer
/// chains left behind by older writers are walked until a primary is reached,
/// and the secondaries passed on the way are returned alongside it.
fn root_primary<R>(
  repo: &R,
  contact: &Contact,
  known: &[Contact],
) -> Result<(Contact, Vec<ContactId>), R::Error>
where
  R: ContactRepo + ?Sized,
  R::Error: From<Error>,
{
  let mut current = contact.clone();
  let mut visited = vec![current.id];

  while let Some(linked) = current.link.linked_id() {
    if visited.contains(&linked) {
      return Err(Error::BrokenLink { contact: current.id, linked }.into());
    }
    let next = match known.iter().find(|c| c.id == linked) {
      Some(c) => c.clone(),
      None => repo
        .get_contact(linked)?
        .ok_or(Error::BrokenLink { contact: current.id, linked })?,
    };
    visited.push(next.id);
    current = next;
  }

  // Drop the starting contact and the primary itself.
  visited.pop();
  let intermediates = visited.into_iter().skip(1).collect();
  Ok((current, intermediates))
}

/// `true` if every value `fragment` carries already appears somewhere in the
/// cluster.
fn is_represented(
  fragment: &Fragment,
  primary: &Contact,
  secondaries: &[Contact],
) -> bool {
  let mut members = std::iter::once(primary).chain(secondaries);
  let email_known = fragment
    .email()
    .is_none_or(|e| members.clone().any(|c| c.has_email(e)));
  let phone_known = fragment
    .phone_number()
    .is_none_or(|p| members.any(|c| c.has_phone(p)));
  email_known && phone_known
}
