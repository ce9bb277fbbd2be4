//! Router tests: every request goes through [`api_router`] via `oneshot`
//! against an in-memory SQLite store.

use std::sync::Arc;

use axum::{
  body::Body,
  http::{Request, StatusCode, header},
};
use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use serde_json::{Value, json};
use tower::ServiceExt as _;
use uuid::Uuid;
use wepool_core::{
  account::NewAccount,
  member::{Member, MemberKind, NewMember, ProfileDetails, Status},
  notify::{MailSettings, MemoryNotifier},
  store::{Changeset, MemberStore},
};
use wepool_store_sqlite::SqliteStore;

use crate::{AppState, api_router, auth::hash_password};

const PASSWORD: &str = "password123";

struct Harness {
  state:  AppState<SqliteStore>,
  outbox: Arc<MemoryNotifier>,
}

impl Harness {
  async fn new() -> Self {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let outbox = Arc::new(MemoryNotifier::default());
    let state = AppState {
      store:    Arc::new(store),
      notifier: outbox.clone(),
      mail:     Arc::new(MailSettings {
        from_email:  "noreply@wepool.test".into(),
        admin_email: "admin@wepool.test".into(),
        base_url:    "http://localhost:8080".into(),
      }),
    };
    Self { state, outbox }
  }

  fn store(&self) -> &SqliteStore { &self.state.store }

  async fn staff(&self, username: &str, superuser: bool) {
    self
      .store()
      .create_account(NewAccount {
        username:      username.into(),
        email:         format!("{username}@wepool.test"),
        first_name:    "Staff".into(),
        last_name:     username.into(),
        password_hash: hash_password(PASSWORD).unwrap(),
        is_active:     true,
        is_staff:      true,
        is_superuser:  superuser,
      })
      .await
      .unwrap();
  }

  /// An active member who can log in as `username`.
  async fn member(&self, username: &str, phone: &str, kind: MemberKind) -> Member {
    self
      .store()
      .register(
        NewAccount {
          username:      username.into(),
          email:         format!("{username}@example.com"),
          first_name:    "Member".into(),
          last_name:     username.into(),
          password_hash: hash_password(PASSWORD).unwrap(),
          is_active:     true,
          is_staff:      false,
          is_superuser:  false,
        },
        NewMember {
          phone:          phone.into(),
          referrer_phone: None,
          kind,
          details:        ProfileDetails::default(),
        },
        None,
      )
      .await
      .unwrap()
      .member
  }

  async fn send(
    &self,
    method: &str,
    uri: &str,
    user: Option<&str>,
    body: Option<Value>,
  ) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
      let encoded = B64.encode(format!("{user}:{PASSWORD}"));
      builder = builder.header(header::AUTHORIZATION, format!("Basic {encoded}"));
    }
    let req = match body {
      Some(json) => builder
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json.to_string()))
        .unwrap(),
      None => builder.body(Body::empty()).unwrap(),
    };

    let res = api_router(self.state.clone()).oneshot(req).await.unwrap();
    let status = res.status();
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
      .await
      .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
  }
}

fn registration(username: &str, phone: &str) -> Value {
  json!({
    "username": username,
    "email": format!("{username}@example.com"),
    "first_name": "Ada",
    "last_name": "Lovelace",
    "password": PASSWORD,
    "phone": phone,
    "kind": "paying",
    "agreed_to_terms": true,
  })
}

// ─── Public ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn register_creates_pending_member_and_sends_mail() {
  let h = Harness::new().await;

  let (status, body) = h
    .send("POST", "/register", None, Some(registration("ada", "5550001")))
    .await;
  assert_eq!(status, StatusCode::CREATED);
  assert_eq!(body["member"]["status"], "pending");
  assert_eq!(body["account"]["is_active"], false);
  assert!(body["referral"].is_null());
  assert!(body["account"].get("password_hash").is_none());

  assert_eq!(h.outbox.sent().len(), 2);
}

#[tokio::test]
async fn register_rejects_short_password() {
  let h = Harness::new().await;
  let mut body = registration("ada", "5550001");
  body["password"] = json!("short");

  let (status, body) = h.send("POST", "/register", None, Some(body)).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert!(body["error"].as_str().unwrap().contains("password"));
}

#[tokio::test]
async fn register_with_unknown_referrer_reports_no_referral() {
  let h = Harness::new().await;
  let mut body = registration("ada", "5550001");
  body["referrer_phone"] = json!("5559999");

  let (status, body) = h.send("POST", "/register", None, Some(body)).await;
  assert_eq!(status, StatusCode::CREATED);
  assert!(body["referral"].is_null());
  assert_eq!(body["member"]["referrer_phone"], "5559999");
}

#[tokio::test]
async fn verification_unlocks_login() {
  let h = Harness::new().await;
  h.send("POST", "/register", None, Some(registration("ada", "5550001")))
    .await;

  // Not verified yet: the account is inactive.
  let (status, _) = h.send("GET", "/me", Some("ada"), None).await;
  assert_eq!(status, StatusCode::UNAUTHORIZED);

  let token = h
    .store()
    .find_member_by_phone("5550001")
    .await
    .unwrap()
    .unwrap()
    .verification_token;
  let (status, body) = h.send("GET", &format!("/verify/{token}"), None, None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["verified_email"], true);

  let (status, body) = h.send("GET", "/me", Some("ada"), None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["member"]["phone"], "5550001");
  assert_eq!(body["referrals"]["levels"].as_array().unwrap().len(), 4);

  let (status, _) = h
    .send("GET", &format!("/verify/{}", Uuid::new_v4()), None, None)
    .await;
  assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn referrer_lookup() {
  let h = Harness::new().await;
  h.member("ada", "5550001", MemberKind::Sponsored).await;

  let (status, body) = h.send("GET", "/referrers/5550001", None, None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["name"], "Member ada");
  assert_eq!(body["kind"], "sponsored");

  let (status, _) = h.send("GET", "/referrers/5550002", None, None).await;
  assert_eq!(status, StatusCode::NOT_FOUND);

  let (status, _) = h.send("GET", "/referrers/abc", None, None).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ─── Auth ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn missing_credentials_get_a_challenge() {
  let h = Harness::new().await;
  let req = Request::builder().uri("/me").body(Body::empty()).unwrap();
  let res = api_router(h.state.clone()).oneshot(req).await.unwrap();

  assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
  assert!(res.headers().contains_key(header::WWW_AUTHENTICATE));
}

#[tokio::test]
async fn wrong_password_is_unauthorized() {
  let h = Harness::new().await;
  h.staff("ops", false).await;

  let encoded = B64.encode("ops:not-the-password");
  let req = Request::builder()
    .uri("/stats")
    .header(header::AUTHORIZATION, format!("Basic {encoded}"))
    .body(Body::empty())
    .unwrap();
  let res = api_router(h.state.clone()).oneshot(req).await.unwrap();
  assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

  let (status, _) = h.send("GET", "/stats", Some("nobody"), None).await;
  assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn members_are_forbidden_from_staff_routes() {
  let h = Harness::new().await;
  h.member("ada", "5550001", MemberKind::Paying).await;

  for (method, uri) in [
    ("GET", "/members"),
    ("GET", "/stats"),
    ("GET", "/pools"),
    ("GET", "/overrides"),
    ("POST", "/sweep"),
  ] {
    let (status, _) = h.send(method, uri, Some("ada"), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN, "{method} {uri}");
  }
}

#[tokio::test]
async fn staff_without_profile_has_no_dashboard() {
  let h = Harness::new().await;
  h.staff("ops", false).await;

  let (status, _) = h.send("GET", "/me", Some("ops"), None).await;
  assert_eq!(status, StatusCode::NOT_FOUND);
}

// ─── Self-service ────────────────────────────────────────────────────────────

#[tokio::test]
async fn external_registration_moves_verified_member_to_yellow() {
  let h = Harness::new().await;
  let mut m = h.member("ada", "5550001", MemberKind::Paying).await;
  m.verified_email = true;
  h.store().commit(Changeset::new().member(m)).await.unwrap();

  let (status, _) = h
    .send("POST", "/me/external", Some("ada"), Some(json!({ "registered": true })))
    .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);

  let (status, body) = h
    .send(
      "POST",
      "/me/external",
      Some("ada"),
      Some(json!({ "registered": true, "link": "https://example.org/ada" })),
    )
    .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["qualified_for_yellow"], true);
  assert_eq!(body["status"], "yellow");
}

#[tokio::test]
async fn member_updates_own_profile() {
  let h = Harness::new().await;
  h.member("ada", "5550001", MemberKind::Paying).await;

  let (status, body) = h
    .send(
      "PATCH",
      "/me",
      Some("ada"),
      Some(json!({
        "city": " Cape Town ",
        "country": "South Africa",
        "date_of_birth": "1990-04-01",
        "communications_opt_in": true,
        "phone": "5559999",
      })),
    )
    .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["phone"], "5550001");
  assert_eq!(body["details"]["city"], "Cape Town");
  assert_eq!(body["details"]["country"], "South Africa");
  assert_eq!(body["details"]["date_of_birth"], "1990-04-01");
  assert_eq!(body["details"]["communications_opt_in"], true);

  let (status, _) = h
    .send("PATCH", "/me", Some("ada"), Some(json!({ "date_of_birth": "2999-01-01" })))
    .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);

  let (_, body) = h.send("GET", "/me", Some("ada"), None).await;
  assert_eq!(body["member"]["details"]["date_of_birth"], "1990-04-01");
}

// ─── Members ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn staff_lists_and_filters_members() {
  let h = Harness::new().await;
  h.staff("ops", false).await;
  h.member("ada", "5550001", MemberKind::Paying).await;
  h.member("bob", "5550002", MemberKind::Sponsored).await;

  let (status, body) = h.send("GET", "/members", Some("ops"), None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body.as_array().unwrap().len(), 2);

  let (_, body) = h
    .send("GET", "/members?kind=sponsored&status=pending,yellow", Some("ops"), None)
    .await;
  assert_eq!(body.as_array().unwrap().len(), 1);
  assert_eq!(body[0]["phone"], "5550002");

  let (_, body) = h.send("GET", "/members?q=ada", Some("ops"), None).await;
  assert_eq!(body.as_array().unwrap().len(), 1);

  let (_, body) = h
    .send("GET", "/members?queue=paying", Some("ops"), None)
    .await;
  assert_eq!(body.as_array().unwrap().len(), 1);
  assert_eq!(body[0]["phone"], "5550001");

  let (status, _) = h
    .send("GET", "/members?status=purple", Some("ops"), None)
    .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn member_detail_edit_and_delete() {
  let h = Harness::new().await;
  h.staff("ops", false).await;
  let m = h.member("ada", "5550001", MemberKind::Paying).await;
  let uri = format!("/members/{}", m.member_id);

  let (status, body) = h.send("GET", &uri, Some("ops"), None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["account"]["username"], "ada");
  assert_eq!(body["stats"]["total"], 0);

  let (status, body) = h
    .send(
      "PATCH",
      &uri,
      Some("ops"),
      Some(json!({
        "verified_email": true,
        "externally_registered": true,
        "external_link": "https://example.org/ada",
      })),
    )
    .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["evaluation"]["yellow"], true);
  assert_eq!(body["member"]["status"], "yellow");

  let (status, _) = h.send("DELETE", &uri, Some("ops"), None).await;
  assert_eq!(status, StatusCode::NO_CONTENT);

  let (status, _) = h.send("GET", &uri, Some("ops"), None).await;
  assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn staff_edit_changes_account_fields() {
  let h = Harness::new().await;
  h.staff("ops", false).await;
  h.staff("root", true).await;
  let m = h.member("ada", "5550001", MemberKind::Paying).await;
  let uri = format!("/members/{}", m.member_id);

  let (status, body) = h
    .send(
      "PATCH",
      &uri,
      Some("ops"),
      Some(json!({ "first_name": "Augusta", "email": "augusta@example.com" })),
    )
    .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["account"]["first_name"], "Augusta");
  assert_eq!(body["account"]["email"], "augusta@example.com");

  let (status, _) = h
    .send("PATCH", &uri, Some("ops"), Some(json!({ "username": "root" })))
    .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);

  let (status, _) = h
    .send("PATCH", &uri, Some("ops"), Some(json!({ "is_staff": true })))
    .await;
  assert_eq!(status, StatusCode::FORBIDDEN);

  let (status, body) = h
    .send("PATCH", &uri, Some("root"), Some(json!({ "is_staff": true })))
    .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["account"]["is_staff"], true);
}

#[tokio::test]
async fn unknown_member_is_404() {
  let h = Harness::new().await;
  h.staff("ops", false).await;
  let uri = format!("/members/{}", Uuid::new_v4());

  let (status, body) = h.send("GET", &uri, Some("ops"), None).await;
  assert_eq!(status, StatusCode::NOT_FOUND);
  assert!(body["error"].is_string());

  let (status, _) = h
    .send("GET", &format!("{uri}/referrals"), Some("ops"), None)
    .await;
  assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn referral_tree_depth_is_bounded() {
  let h = Harness::new().await;
  h.staff("ops", false).await;
  let m = h.member("ada", "5550001", MemberKind::Paying).await;
  let uri = format!("/members/{}/referrals", m.member_id);

  let (status, body) = h.send("GET", &uri, Some("ops"), None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["levels"].as_array().unwrap().len(), 4);

  let (_, body) = h
    .send("GET", &format!("{uri}?depth=2"), Some("ops"), None)
    .await;
  assert_eq!(body["levels"].as_array().unwrap().len(), 2);

  let (status, _) = h
    .send("GET", &format!("{uri}?depth=0"), Some("ops"), None)
    .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn approve_and_reject_from_yellow_queue() {
  let h = Harness::new().await;
  h.staff("ops", false).await;
  let m = h.member("ada", "5550001", MemberKind::Paying).await;
  let uri = format!("/members/{}/status", m.member_id);

  let (status, body) = h
    .send("POST", &uri, Some("ops"), Some(json!({ "decision": "approve" })))
    .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["status"], "yellow");

  let (_, body) = h
    .send("POST", &uri, Some("ops"), Some(json!({ "decision": "reject" })))
    .await;
  assert_eq!(body["status"], "pending");
}

// ─── Overrides ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn override_requires_reason_and_capability() {
  let h = Harness::new().await;
  h.staff("ops", false).await;
  h.staff("root", true).await;
  let m = h.member("ada", "5550001", MemberKind::Paying).await;
  let uri = format!("/members/{}/overrides", m.member_id);

  let (status, _) = h
    .send("POST", &uri, Some("ops"), Some(json!({ "kind": "qualification" })))
    .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);

  let (status, _) = h
    .send(
      "POST",
      &uri,
      Some("ops"),
      Some(json!({ "kind": "admin_promotion", "reason": "trusted" })),
    )
    .await;
  assert_eq!(status, StatusCode::FORBIDDEN);

  let (status, body) = h
    .send(
      "POST",
      &uri,
      Some("root"),
      Some(json!({ "kind": "admin_promotion", "reason": "trusted" })),
    )
    .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["staff_changed"], true);
  assert_eq!(body["account"]["is_staff"], true);

  let (_, history) = h.send("GET", "/overrides", Some("ops"), None).await;
  assert_eq!(history["admin_promotion"].as_array().unwrap().len(), 1);

  let (status, body) = h
    .send("DELETE", &format!("{uri}/admin_promotion"), Some("root"), None)
    .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["account"]["is_staff"], false);
}

// ─── Assignments ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn assignment_flow() {
  let h = Harness::new().await;
  h.staff("ops", false).await;
  let mut y = h.member("ada", "5550001", MemberKind::Paying).await;
  let mut q = h.member("bob", "5550002", MemberKind::Sponsored).await;
  y.status = Status::Yellow;
  q.status = Status::Qualified;
  h.store()
    .commit(Changeset::new().member(y.clone()).member(q.clone()))
    .await
    .unwrap();

  let (_, pools) = h.send("GET", "/pools", Some("ops"), None).await;
  assert_eq!(pools["yellow"].as_array().unwrap().len(), 1);
  assert_eq!(pools["sponsored"].as_array().unwrap().len(), 1);

  let (status, _) = h
    .send(
      "POST",
      "/assignments",
      Some("ops"),
      Some(json!({
        "yellow_member_id": y.member_id,
        "sponsored_member_id": y.member_id,
      })),
    )
    .await;
  assert_eq!(status, StatusCode::CONFLICT);

  let (status, body) = h
    .send(
      "POST",
      "/assignments",
      Some("ops"),
      Some(json!({
        "yellow_member_id": y.member_id,
        "sponsored_member_id": q.member_id,
      })),
    )
    .await;
  assert_eq!(status, StatusCode::CREATED);
  assert_eq!(body["completed"], true);

  let (_, recent) = h.send("GET", "/assignments", Some("ops"), None).await;
  assert_eq!(recent.as_array().unwrap().len(), 1);

  let settled = h.store().get_member(q.member_id).await.unwrap().unwrap();
  assert_eq!(settled.status, Status::Green);
}

// ─── Batch and reporting ─────────────────────────────────────────────────────

#[tokio::test]
async fn bulk_update_reports_failures() {
  let h = Harness::new().await;
  h.staff("ops", false).await;
  let m = h.member("ada", "5550001", MemberKind::Paying).await;
  let missing = Uuid::new_v4();

  let (status, _) = h
    .send(
      "POST",
      "/bulk",
      Some("ops"),
      Some(json!({ "member_ids": [m.member_id], "action": "set_status" })),
    )
    .await;
  assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

  let (status, body) = h
    .send(
      "POST",
      "/bulk",
      Some("ops"),
      Some(json!({ "member_ids": [m.member_id], "action": "toggle_active" })),
    )
    .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["updated"][0], m.member_id.to_string());
  let (status, _) = h.send("GET", "/me", Some("ada"), None).await;
  assert_eq!(status, StatusCode::UNAUTHORIZED);

  let (status, body) = h
    .send(
      "POST",
      "/bulk",
      Some("ops"),
      Some(json!({
        "member_ids": [m.member_id, missing],
        "action": "set_status",
        "status": "green",
      })),
    )
    .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["updated"].as_array().unwrap().len(), 1);
  assert_eq!(body["failed"][0]["member_id"], missing.to_string());
}

#[tokio::test]
async fn sweep_and_stats() {
  let h = Harness::new().await;
  h.staff("ops", false).await;
  let mut m = h.member("ada", "5550001", MemberKind::Paying).await;
  m.verified_email = true;
  m.externally_registered = true;
  m.external_link = Some("https://example.org/ada".into());
  h.store().commit(Changeset::new().member(m)).await.unwrap();

  let (status, body) = h.send("POST", "/sweep", Some("ops"), None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["yellow"], 1);
  assert_eq!(body["qualified"], 0);

  let (_, body) = h.send("POST", "/sweep", Some("ops"), None).await;
  assert_eq!(body["yellow"], 0);

  let (status, stats) = h.send("GET", "/stats", Some("ops"), None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(stats["total_members"], 1);
  assert_eq!(stats["status_breakdown"]["yellow"], 1);
  assert_eq!(stats["active_accounts"], 1);
}
