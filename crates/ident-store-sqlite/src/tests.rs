//! Integration tests for `SqliteStore` against an in-memory database.

use std::{collections::BTreeSet, sync::Arc, time::Duration};

use ident_core::{
  ResolveError,
  contact::{Contact, Fragment, Link, NewContact},
  resolve::Outcome,
  resolver::{Resolver, RetryPolicy},
  store::{ContactStore, FailureClass, StoreFailure},
};

use crate::SqliteStore;

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn fragment(email: Option<&str>, phone: Option<&str>) -> Fragment {
  Fragment::new(email.map(str::to_owned), phone.map(str::to_owned)).unwrap()
}

fn some(v: &str) -> Option<String> { Some(v.to_owned()) }

async fn insert(s: &SqliteStore, input: NewContact) -> Contact {
  s.transact(move |repo| repo.create(input)).await.unwrap()
}

// ─── Store contract ──────────────────────────────────────────────────────────

#[tokio::test]
async fn create_and_get_contact() {
  let s = store().await;
  let created = insert(&s, NewContact::primary(&fragment(Some("a@x"), Some("1")))).await;
  assert!(created.id > 0);
  assert_eq!(created.link, Link::Primary);

  let fetched = s
    .transact(move |repo| repo.get_contact(created.id))
    .await
    .unwrap()
    .unwrap();
  assert_eq!(fetched.email.as_deref(), Some("a@x"));
  assert_eq!(fetched.phone_number.as_deref(), Some("1"));
  assert_eq!(fetched.created_at, fetched.updated_at);
  assert!(fetched.deleted_at.is_none());
}

#[tokio::test]
async fn create_without_values_is_rejected() {
  let s = store().await;
  let err = s
    .transact(|repo| {
      repo.create(NewContact { email: None, phone_number: None, link: Link::Primary })
    })
    .await
    .unwrap_err();
  assert!(matches!(err, crate::Error::Core(ident_core::Error::EmptyFragment)));
}

#[tokio::test]
async fn find_by_email_or_phone_matches_either_field() {
  let s = store().await;
  let p = insert(&s, NewContact::primary(&fragment(Some("a@x"), Some("1")))).await;
  let sec = insert(&s, NewContact::secondary(&fragment(Some("b@y"), Some("1")), p.id)).await;
  insert(&s, NewContact::primary(&fragment(Some("c@z"), Some("3")))).await;

  let by_phone = s
    .transact(|repo| repo.find_by_email_or_phone(None, Some("1")))
    .await
    .unwrap();
  assert_eq!(by_phone.iter().map(|c| c.id).collect::<Vec<_>>(), [p.id, sec.id]);

  let by_either = s
    .transact(|repo| repo.find_by_email_or_phone(Some("b@y"), Some("3")))
    .await
    .unwrap();
  assert_eq!(by_either.len(), 2);

  let none = s
    .transact(|repo| repo.find_by_email_or_phone(Some("zzz"), None))
    .await
    .unwrap();
  assert!(none.is_empty());
}

#[tokio::test]
async fn find_primary_ignores_secondaries() {
  let s = store().await;
  let p = insert(&s, NewContact::primary(&fragment(Some("a@x"), Some("1")))).await;
  insert(&s, NewContact::secondary(&fragment(Some("b@y"), Some("1")), p.id)).await;

  let hit = s
    .transact(|repo| repo.find_primary_by_email_or_phone(None, Some("1")))
    .await
    .unwrap();
  assert_eq!(hit.map(|c| c.id), Some(p.id));

  let miss = s
    .transact(|repo| repo.find_primary_by_email_or_phone(Some("b@y"), None))
    .await
    .unwrap();
  assert!(miss.is_none());
}

#[tokio::test]
async fn demote_and_relink_flatten_the_cluster() {
  let s = store().await;
  let p1 = insert(&s, NewContact::primary(&fragment(Some("a@x"), Some("1")))).await;
  let p2 = insert(&s, NewContact::primary(&fragment(Some("b@y"), Some("2")))).await;
  let s2 = insert(&s, NewContact::secondary(&fragment(Some("c@z"), Some("2")), p2.id)).await;

  let moved = s
    .transact(move |repo| {
      repo.demote_to_secondary(p2.id, p1.id)?;
      repo.relink_secondaries(p2.id, p1.id)
    })
    .await
    .unwrap();
  assert_eq!(moved, 1);

  let secondaries = s
    .transact(move |repo| repo.find_secondaries_of(p1.id))
    .await
    .unwrap();
  assert_eq!(secondaries.iter().map(|c| c.id).collect::<Vec<_>>(), [p2.id, s2.id]);
  assert!(secondaries.iter().all(|c| c.link == Link::Secondary { linked_id: p1.id }));
  assert!(secondaries[0].updated_at >= secondaries[0].created_at);
}

#[tokio::test]
async fn demote_missing_contact_errors() {
  let s = store().await;
  let p = insert(&s, NewContact::primary(&fragment(Some("a@x"), None))).await;
  let err = s
    .transact(move |repo| repo.demote_to_secondary(999, p.id))
    .await
    .unwrap_err();
  assert!(matches!(
    err,
    crate::Error::Core(ident_core::Error::ContactNotFound(999))
  ));

  let err = s
    .transact(move |repo| repo.demote_to_secondary(p.id, p.id))
    .await
    .unwrap_err();
  assert!(matches!(err, crate::Error::Core(ident_core::Error::SelfLink(_))));
}

#[tokio::test]
async fn duplicate_primary_is_a_conflict() {
  let s = store().await;
  insert(&s, NewContact::primary(&fragment(Some("a@x"), Some("1")))).await;

  let err = s
    .transact(|repo| repo.create(NewContact::primary(&fragment(Some("b@y"), Some("1")))))
    .await
    .unwrap_err();
  assert_eq!(err.class(), FailureClass::Conflict, "{err}");
}

#[tokio::test]
async fn failed_transaction_rolls_back() {
  let s = store().await;
  let err = s
    .transact(|repo| {
      repo.create(NewContact::primary(&fragment(Some("a@x"), None)))?;
      repo.create(NewContact::primary(&fragment(Some("a@x"), None)))
    })
    .await
    .unwrap_err();
  assert_eq!(err.class(), FailureClass::Conflict);
  assert!(s.all_contacts().await.unwrap().is_empty());
}

#[tokio::test]
async fn soft_deleted_contacts_are_invisible() {
  let s = store().await;
  let p = insert(&s, NewContact::primary(&fragment(Some("a@x"), None))).await;
  assert!(s.soft_delete(p.id).await.unwrap());
  assert!(!s.soft_delete(p.id).await.unwrap());

  let found = s
    .transact(|repo| repo.find_by_email_or_phone(Some("a@x"), None))
    .await
    .unwrap();
  assert!(found.is_empty());

  // A deleted primary no longer blocks a new one for the same email.
  let fresh = insert(&s, NewContact::primary(&fragment(Some("a@x"), None))).await;
  assert_ne!(fresh.id, p.id);

  let all = s.all_contacts().await.unwrap();
  assert_eq!(all.len(), 2);
  assert!(all[0].deleted_at.is_some());
}

#[tokio::test]
async fn soft_deleting_a_primary_promotes_its_oldest_secondary() {
  let s = Arc::new(store().await);
  let r = Resolver::new(Arc::clone(&s));
  let p1 = r.resolve(some("a@x"), some("1")).await.unwrap().view.primary_contact_id;
  let s2 = r.resolve(some("b@y"), some("1")).await.unwrap().view.secondary_contact_ids[0];
  let s3 = r.resolve(some("c@z"), some("1")).await.unwrap().view.secondary_contact_ids[1];

  assert!(s.soft_delete(p1).await.unwrap());

  let res = r.resolve(some("b@y"), None).await.unwrap();
  assert_eq!(res.outcome, Outcome::Unchanged);
  assert_eq!(res.view.primary_contact_id, s2);
  assert_eq!(res.view.emails, ["b@y", "c@z"]);
  assert_eq!(res.view.phone_numbers, ["1"]);
  assert_eq!(res.view.secondary_contact_ids, [s3]);

  // The promoted contact now holds the phone number for the cluster.
  let err = s
    .transact(|repo| repo.create(NewContact::primary(&fragment(None, Some("1")))))
    .await
    .unwrap_err();
  assert_eq!(err.class(), FailureClass::Conflict);
}

#[tokio::test]
async fn soft_deleting_a_secondary_relinks_its_chain() {
  let s = store().await;
  let p = insert(&s, NewContact::primary(&fragment(Some("a@x"), Some("1")))).await;
  let mid = insert(&s, NewContact::secondary(&fragment(Some("b@y"), Some("1")), p.id)).await;
  let tail = insert(&s, NewContact::secondary(&fragment(Some("c@z"), Some("1")), mid.id)).await;

  assert!(s.soft_delete(mid.id).await.unwrap());

  let secondaries = s
    .transact(move |repo| repo.find_secondaries_of(p.id))
    .await
    .unwrap();
  assert_eq!(secondaries.iter().map(|c| c.id).collect::<Vec<_>>(), [tail.id]);
}

#[tokio::test]
async fn timed_out_resolution_does_not_commit() {
  let s = Arc::new(store().await);

  // Occupy the connection thread.
  let blocker = {
    let s = Arc::clone(&s);
    tokio::spawn(async move {
      s.transact(|_| {
        std::thread::sleep(Duration::from_millis(300));
        Ok(())
      })
      .await
    })
  };
  tokio::time::sleep(Duration::from_millis(20)).await;

  let policy = RetryPolicy {
    tx_timeout: Duration::from_millis(50),
    ..RetryPolicy::default()
  };
  let r = Resolver::with_policy(Arc::clone(&s), policy);
  let err = r.resolve(some("late@x"), some("9")).await.unwrap_err();
  assert!(matches!(err, ResolveError::Timeout(_)), "{err}");

  blocker.await.unwrap().unwrap();
  // Queued behind the abandoned work, so it sees whatever that work left.
  assert!(s.all_contacts().await.unwrap().is_empty());
}

// ─── Resolution end to end ───────────────────────────────────────────────────

#[tokio::test]
async fn resolve_walkthrough() {
  let s = Arc::new(store().await);
  let r = Resolver::new(Arc::clone(&s));

  let first = r.resolve(some("a@x"), some("1")).await.unwrap();
  let p1 = first.view.primary_contact_id;
  assert_eq!(first.outcome, Outcome::CreatedPrimary(p1));

  let second = r.resolve(some("a@x"), some("2")).await.unwrap();
  let Outcome::CreatedSecondary(sec) = second.outcome else {
    panic!("unexpected outcome {:?}", second.outcome);
  };
  assert_eq!(second.view.phone_numbers, ["1", "2"]);
  assert_eq!(second.view.secondary_contact_ids, [sec]);

  let other = r.resolve(some("b@y"), some("3")).await.unwrap();
  let p2 = other.view.primary_contact_id;
  assert_ne!(p1, p2);

  let merged = r.resolve(some("b@y"), some("1")).await.unwrap();
  assert_eq!(
    merged.outcome,
    Outcome::Merged { survivor: p1, demoted: vec![p2], created: None }
  );
  assert_eq!(merged.view.primary_contact_id, p1);
  assert_eq!(merged.view.emails, ["a@x", "b@y"]);
  assert_eq!(merged.view.phone_numbers, ["1", "2", "3"]);
  assert_eq!(merged.view.secondary_contact_ids, [sec, p2]);

  let before = s.all_contacts().await.unwrap();
  let again = r.resolve(some("b@y"), some("1")).await.unwrap();
  assert_eq!(again.outcome, Outcome::Unchanged);
  assert_eq!(again.view, merged.view);
  assert_eq!(s.all_contacts().await.unwrap(), before);

  assert_eq!(r.lookup(None, some("3")).await.unwrap(), Some(merged.view));
}

#[tokio::test]
async fn validation_happens_before_store_access() {
  let s = Arc::new(store().await);
  let r = Resolver::new(Arc::clone(&s));
  let err = r.resolve(None, some("")).await.unwrap_err();
  assert!(matches!(err, ResolveError::Validation(_)));
  assert!(s.all_contacts().await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_first_requests_create_one_primary() {
  let s = Arc::new(store().await);
  let r = Resolver::new(Arc::clone(&s));

  let handles: Vec<_> = (0..12)
    .map(|_| {
      let r = r.clone();
      tokio::spawn(async move { r.resolve(some("race@x"), some("77")).await })
    })
    .collect();

  let mut primaries = BTreeSet::new();
  for h in handles {
    primaries.insert(h.await.unwrap().unwrap().view.primary_contact_id);
  }
  assert_eq!(primaries.len(), 1);

  let rows = s.all_contacts().await.unwrap();
  assert_eq!(rows.len(), 1);
  assert!(rows[0].is_primary());
}
