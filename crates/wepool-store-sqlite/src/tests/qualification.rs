use chrono::Utc;
use wepool_core::{
  member::{MemberKind, OverrideStamp, Status},
  qualification::{self, PAYING_REFERRAL_THRESHOLD},
  workflow,
};

use super::{member, reload, save, store};

#[tokio::test]
async fn yellow_check_needs_all_three_conditions() {
  let s = store().await;
  let mut m = member(&s, "5550001", MemberKind::Paying, None).await;

  m.verified_email = true;
  m.externally_registered = true;
  save(&s, &m).await;
  assert!(!qualification::run_yellow_check(&s, m.member_id).await.unwrap());

  m.external_link = Some("https://example.org/me".into());
  save(&s, &m).await;
  assert!(qualification::run_yellow_check(&s, m.member_id).await.unwrap());
  assert_eq!(reload(&s, m.member_id).await.status, Status::Yellow);
}

#[tokio::test]
async fn yellow_check_is_idempotent() {
  let s = store().await;
  let mut m = member(&s, "5550001", MemberKind::Paying, None).await;
  m.verified_email = true;
  m.externally_registered = true;
  m.external_link = Some("https://example.org/me".into());
  save(&s, &m).await;

  assert!(qualification::run_yellow_check(&s, m.member_id).await.unwrap());
  assert!(!qualification::run_yellow_check(&s, m.member_id).await.unwrap());
  assert_eq!(reload(&s, m.member_id).await.status, Status::Yellow);
}

#[tokio::test]
async fn yellow_check_never_demotes() {
  let s = store().await;
  let mut m = member(&s, "5550001", MemberKind::Paying, None).await;
  m.status = Status::Green;
  m.verified_email = true;
  m.externally_registered = true;
  m.external_link = Some("https://example.org/me".into());
  save(&s, &m).await;

  assert!(!qualification::run_yellow_check(&s, m.member_id).await.unwrap());
  assert_eq!(reload(&s, m.member_id).await.status, Status::Green);
}

#[tokio::test]
async fn override_suppresses_both_checks() {
  let s = store().await;
  let mut m = member(&s, "5550000", MemberKind::Sponsored, None).await;
  for i in 1..=PAYING_REFERRAL_THRESHOLD {
    member(&s, &format!("555100{i}"), MemberKind::Paying, Some(&m)).await;
  }
  m.verified_email = true;
  m.externally_registered = true;
  m.external_link = Some("https://example.org/me".into());
  m.qualification_override = Some(OverrideStamp {
    reason: "on hold".into(),
    by:     None,
    at:     Utc::now(),
  });
  save(&s, &m).await;

  assert!(!qualification::run_yellow_check(&s, m.member_id).await.unwrap());
  assert!(!qualification::run_sponsored_check(&s, m.member_id).await.unwrap());
  assert_eq!(reload(&s, m.member_id).await.status, Status::Pending);
}

#[tokio::test]
async fn sponsored_member_qualifies_on_fourth_paying_referral() {
  let s = store().await;
  let root = member(&s, "5550000", MemberKind::Sponsored, None).await;
  for i in 1..=3 {
    member(&s, &format!("555100{i}"), MemberKind::Paying, Some(&root)).await;
  }
  // Sponsored referrals never count toward the threshold.
  member(&s, "5552001", MemberKind::Sponsored, Some(&root)).await;

  assert!(!qualification::run_sponsored_check(&s, root.member_id).await.unwrap());
  assert_eq!(reload(&s, root.member_id).await.status, Status::Pending);

  member(&s, "5551004", MemberKind::Paying, Some(&root)).await;
  assert!(qualification::run_sponsored_check(&s, root.member_id).await.unwrap());
  assert_eq!(reload(&s, root.member_id).await.status, Status::Qualified);
}

#[tokio::test]
async fn paying_member_never_qualifies() {
  let s = store().await;
  let root = member(&s, "5550000", MemberKind::Paying, None).await;
  for i in 1..=5 {
    member(&s, &format!("555100{i}"), MemberKind::Paying, Some(&root)).await;
  }
  assert!(!qualification::run_sponsored_check(&s, root.member_id).await.unwrap());
}

#[tokio::test]
async fn green_sponsored_member_is_not_requalified() {
  let s = store().await;
  let mut root = member(&s, "5550000", MemberKind::Sponsored, None).await;
  for i in 1..=4 {
    member(&s, &format!("555100{i}"), MemberKind::Paying, Some(&root)).await;
  }
  root.status = Status::Green;
  save(&s, &root).await;

  assert!(!qualification::run_sponsored_check(&s, root.member_id).await.unwrap());
  assert_eq!(reload(&s, root.member_id).await.status, Status::Green);
}

#[tokio::test]
async fn sweep_promotes_then_reports_nothing() {
  let s = store().await;
  let mut ready = member(&s, "5550001", MemberKind::Paying, None).await;
  ready.verified_email = true;
  ready.externally_registered = true;
  ready.external_link = Some("https://example.org/ready".into());
  save(&s, &ready).await;

  let sponsored = member(&s, "5550002", MemberKind::Sponsored, None).await;
  for i in 1..=4 {
    member(&s, &format!("555100{i}"), MemberKind::Paying, Some(&sponsored)).await;
  }

  let first = workflow::check_qualifications(&s).await.unwrap();
  assert_eq!(first.yellow, 1);
  assert_eq!(first.qualified, 1);
  assert_eq!(reload(&s, ready.member_id).await.status, Status::Yellow);
  assert_eq!(reload(&s, sponsored.member_id).await.status, Status::Qualified);

  let second = workflow::check_qualifications(&s).await.unwrap();
  assert_eq!(second.yellow, 0);
  assert_eq!(second.qualified, 0);
}

#[tokio::test]
async fn missing_member_is_not_found() {
  let s = store().await;
  let err = qualification::run_yellow_check(&s, uuid::Uuid::new_v4())
    .await
    .unwrap_err();
  assert!(matches!(err, wepool_core::Error::MemberNotFound(_)));
}

#[tokio::test]
async fn sweep_skips_a_failing_member_and_carries_on() {
  let s = store().await;
  let mut stuck = member(&s, "5550001", MemberKind::Paying, None).await;
  let mut ready = member(&s, "5550002", MemberKind::Paying, None).await;
  for m in [&mut stuck, &mut ready] {
    m.verified_email = true;
    m.externally_registered = true;
    m.external_link = Some("https://example.org/me".into());
    save(&s, m).await;
  }
  let sponsored = member(&s, "5550003", MemberKind::Sponsored, None).await;
  for i in 1..=4 {
    member(&s, &format!("555100{i}"), MemberKind::Paying, Some(&sponsored)).await;
  }

  s.execute_raw(
    "CREATE TRIGGER members_locked BEFORE UPDATE ON members \
     WHEN OLD.phone = '5550001' \
     BEGIN SELECT RAISE(ABORT, 'row locked'); END;",
  )
  .await
  .unwrap();

  let report = workflow::check_qualifications(&s).await.unwrap();
  assert_eq!(report.yellow, 1);
  assert_eq!(report.qualified, 1);
  assert_eq!(report.skipped, 1);
  assert_eq!(reload(&s, stuck.member_id).await.status, Status::Pending);
  assert_eq!(reload(&s, ready.member_id).await.status, Status::Yellow);
  assert_eq!(reload(&s, sponsored.member_id).await.status, Status::Qualified);
}
