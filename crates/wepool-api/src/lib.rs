//! JSON REST API for WePool.
//!
//! Exposes an axum [`Router`] backed by any [`wepool_core::store::MemberStore`].
//! Requests authenticate with HTTP Basic credentials checked against the
//! accounts table; TLS and transport concerns are the caller's
//! responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", wepool_api::api_router(state))
//! ```

pub mod admin;
pub mod assignments;
pub mod auth;
pub mod error;
pub mod me;
pub mod members;
pub mod overrides;
pub mod public;

use std::sync::Arc;

use axum::{
  Router,
  routing::{delete, get, post},
};
use wepool_core::{
  notify::{MailSettings, Notifier},
  store::MemberStore,
};

pub use error::ApiError;

// ─── Application state ───────────────────────────────────────────────────────

/// Shared state threaded through all handlers.
#[derive(Clone)]
pub struct AppState<S> {
  pub store:    Arc<S>,
  pub notifier: Arc<dyn Notifier>,
  pub mail:     Arc<MailSettings>,
}

// ─── Router ──────────────────────────────────────────────────────────────────

/// Build the API router for `state`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(state: AppState<S>) -> Router<()>
where
  S: MemberStore + Clone + 'static,
{
  Router::new()
    // Public
    .route("/register", post(public::register::<S>))
    .route("/verify/{token}", get(public::verify::<S>))
    .route("/referrers/{phone}", get(public::referrer::<S>))
    // Member self-service
    .route(
      "/me",
      get(me::dashboard::<S>).patch(me::update_profile::<S>),
    )
    .route("/me/external", post(me::external::<S>))
    // Staff: members
    .route("/members", get(members::list::<S>))
    .route(
      "/members/{id}",
      get(members::get_one::<S>)
        .patch(members::edit::<S>)
        .delete(members::remove::<S>),
    )
    .route("/members/{id}/referrals", get(members::referrals::<S>))
    .route("/members/{id}/status", post(members::set_status::<S>))
    // Staff: overrides
    .route("/members/{id}/overrides", post(overrides::apply::<S>))
    .route("/members/{id}/overrides/{kind}", delete(overrides::remove::<S>))
    .route("/overrides", get(overrides::history::<S>))
    // Staff: assignments
    .route("/pools", get(assignments::pools::<S>))
    .route(
      "/assignments",
      get(assignments::recent::<S>).post(assignments::create::<S>),
    )
    // Staff: batch and reporting
    .route("/bulk", post(admin::bulk::<S>))
    .route("/sweep", post(admin::sweep::<S>))
    .route("/stats", get(admin::stats::<S>))
    .with_state(state)
}

#[cfg(test)]
mod tests;
