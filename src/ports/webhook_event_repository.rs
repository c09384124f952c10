//! WebhookEventRepository port - audit log of handled gateway events.
//!
//! Every record handler is idempotent on its own natural key; this log
//! lets a redelivered event that was already handled be acknowledged
//! without touching the ledger again, and keeps the payload for audits.
//!
//! The gateway may deliver the same event multiple times due to:
//! - Network timeouts
//! - 5xx responses from our endpoint (triggers retry)
//! - Our endpoint returning success but the gateway not receiving it

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::foundation::DomainError;

/// Record of a handled webhook event.
#[derive(Debug, Clone)]
pub struct WebhookEventRecord {
    pub event_id: String,
    pub event_type: String,
    pub processed_at: DateTime<Utc>,
    pub result: WebhookResult,
    /// Reason for ignored events, error for failed ones.
    pub error_message: Option<String>,
    pub payload: serde_json::Value,
}

impl WebhookEventRecord {
    pub fn handled(
        event_id: impl Into<String>,
        event_type: impl Into<String>,
        result: WebhookResult,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            event_type: event_type.into(),
            processed_at: Utc::now(),
            result,
            error_message: None,
            payload,
        }
    }

    pub fn failed(
        event_id: impl Into<String>,
        event_type: impl Into<String>,
        error: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            event_type: event_type.into(),
            processed_at: Utc::now(),
            result: WebhookResult::Failed,
            error_message: Some(error.into()),
            payload,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    /// A failed attempt must not stop a redelivery from being handled.
    pub fn is_final(&self) -> bool {
        self.result != WebhookResult::Failed
    }
}

/// Result of attempting to save a record.
///
/// Shared by every repository whose insert uses `ON CONFLICT DO NOTHING`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveResult {
    /// Record was inserted.
    Inserted,
    /// A conflicting record already exists; nothing was written.
    AlreadyExists,
}

/// Port for storing handled webhook events.
///
/// Implementations use a PRIMARY KEY on event_id. A failed record may be
/// overwritten by a later attempt; a final record never is.
#[async_trait]
pub trait WebhookEventRepository: Send + Sync {
    async fn find_by_event_id(
        &self,
        event_id: &str,
    ) -> Result<Option<WebhookEventRecord>, DomainError>;

    /// Saves a record unless a final record for the event already exists.
    async fn save(&self, record: WebhookEventRecord) -> Result<SaveResult, DomainError>;

    /// Delete records older than the specified timestamp.
    ///
    /// Returns the number of records deleted.
    async fn delete_before(&self, timestamp: DateTime<Utc>) -> Result<u64, DomainError>;
}

/// Outcome of handling one webhook event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookResult {
    /// Local state changed.
    Processed,
    /// The event's effect was already recorded; nothing changed.
    AlreadyRecorded,
    /// Event type or content needs no local change.
    Ignored,
    /// Handling failed; only ever stored, never returned to the gateway.
    Failed,
}

impl WebhookResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookResult::Processed => "processed",
            WebhookResult::AlreadyRecorded => "already_recorded",
            WebhookResult::Ignored => "ignored",
            WebhookResult::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "processed" => Some(WebhookResult::Processed),
            "already_recorded" => Some(WebhookResult::AlreadyRecorded),
            "ignored" => Some(WebhookResult::Ignored),
            "failed" => Some(WebhookResult::Failed),
            _ => None,
        }
    }
}
