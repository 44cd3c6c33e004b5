use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use coffer_core::{
    AccountId, CategoryId, EventId, EventType, ImportRunId, InstrumentId, UserId,
};

/// A bank or brokerage account owned by one user scope.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub user_id: UserId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn new(id: AccountId, user_id: UserId, name: impl Into<String>) -> Self {
        Self {
            id,
            user_id,
            name: name.into(),
            created_at: Utc::now(),
        }
    }
}

/// One persisted financial occurrence. Append-only: removal is a
/// soft-delete timestamp, restoration clears it, and the engine never
/// hard-deletes.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub account_id: AccountId,
    pub event_type: EventType,
    pub effective_at: DateTime<Utc>,
    pub posted_at: Option<DateTime<Utc>>,
    pub description: String,
    pub external_id: Option<String>,
    /// Globally unique identity used for duplicate detection. Immutable
    /// once assigned; the storage layer enforces uniqueness.
    pub dedupe_key: String,
    pub import_run_id: Option<ImportRunId>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub meta: Option<serde_json::Value>,
}

impl Event {
    /// Explicit lifecycle state, so read paths never test `deleted_at`
    /// directly.
    pub fn status(&self) -> EventStatus {
        if self.deleted_at.is_some() {
            EventStatus::Deleted
        } else {
            EventStatus::Active
        }
    }
}

/// Lifecycle state of an event.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EventStatus {
    Active,
    Deleted,
}

/// One signed money movement belonging to exactly one event.
///
/// Amounts are integer minor units; negative is an outflow. Legs survive
/// the soft-deletion of their event: visibility is the event's concern.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Leg {
    pub id: String,
    pub event_id: EventId,
    pub account_id: AccountId,
    pub instrument_id: InstrumentId,
    pub amount_minor: i64,
    pub category: Option<CategoryId>,
    pub note: Option<String>,
}

/// Current holdings of one instrument in one account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub account_id: AccountId,
    pub instrument_id: InstrumentId,
    pub amount_minor: i64,
}

/// The caller's choice for re-encountered soft-deleted duplicates.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestorePolicy {
    Skip,
    Restore,
}

impl RestorePolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            RestorePolicy::Skip => "skip",
            RestorePolicy::Restore => "restore",
        }
    }
}

impl fmt::Display for RestorePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RestorePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "skip" => Ok(RestorePolicy::Skip),
            "restore" => Ok(RestorePolicy::Restore),
            other => Err(format!("unknown restore policy: {other}")),
        }
    }
}

/// Pipeline stage that produced a row-level import error.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportPhase {
    Parse,
    Resolve,
    Insert,
}

impl fmt::Display for ImportPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ImportPhase::Parse => "parse",
            ImportPhase::Resolve => "resolve",
            ImportPhase::Insert => "insert",
        };
        f.write_str(label)
    }
}

/// Structured row-level failure recorded on an import run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RowError {
    /// Which row failed: a line reference or the transaction's group key.
    pub row: String,
    pub phase: ImportPhase,
    pub message: String,
}

impl RowError {
    pub fn new(row: impl Into<String>, phase: ImportPhase, message: impl Into<String>) -> Self {
        Self {
            row: row.into(),
            phase,
            message: message.into(),
        }
    }
}

/// Immutable audit record summarizing one batch import invocation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ImportRun {
    pub id: ImportRunId,
    pub account_id: AccountId,
    pub filename: String,
    pub imported_count: u32,
    pub skipped_count: u32,
    pub restored_count: u32,
    pub error_count: u32,
    pub skipped_keys: Vec<String>,
    pub errors: Vec<RowError>,
    pub restore_policy: RestorePolicy,
    pub created_at: DateTime<Utc>,
}
