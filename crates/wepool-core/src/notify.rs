//! Outbound notifications.
//!
//! Delivery is somebody else's problem: a [`Notifier`] accepts a message and
//! either queues it or fails. Callers decide whether a failure matters; for
//! registration mail it never does.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
  pub from:    String,
  pub to:      Vec<String>,
  pub subject: String,
  pub body:    String,
}

#[derive(Debug, Error)]
#[error("notification not sent: {0}")]
pub struct NotifyError(pub String);

/// Fire-and-forget message sink.
pub trait Notifier: Send + Sync {
  fn send(&self, message: &Message) -> Result<(), NotifyError>;
}

/// Writes every message to the log instead of delivering it.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
  fn send(&self, message: &Message) -> Result<(), NotifyError> {
    tracing::info!(
      from = %message.from,
      to = ?message.to,
      subject = %message.subject,
      "{}",
      message.body
    );
    Ok(())
  }
}

/// Keeps sent messages in memory; handy for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryNotifier {
  sent: Mutex<Vec<Message>>,
}

impl MemoryNotifier {
  pub fn sent(&self) -> Vec<Message> {
    self
      .sent
      .lock()
      .map(|sent| sent.clone())
      .unwrap_or_default()
  }
}

impl Notifier for MemoryNotifier {
  fn send(&self, message: &Message) -> Result<(), NotifyError> {
    self
      .sent
      .lock()
      .map_err(|_| NotifyError("outbox lock poisoned".into()))?
      .push(message.clone());
    Ok(())
  }
}

/// Addresses and links used when composing registration mail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailSettings {
  pub from_email:  String,
  pub admin_email: String,
  /// Public base URL; verification links are `{base_url}/api/verify/{token}`.
  pub base_url:    String,
}
