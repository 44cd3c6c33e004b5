use chrono::{DateTime, Utc};

use coffer_core::{AccountId, EventId, ImportRunId, Instrument, InstrumentId, UserId};

use crate::{Account, Balance, Event, ImportRun, LedgerResult, Leg};

/// Abstraction over durable ledger storage engines.
///
/// The `events.dedupe_key` uniqueness constraint lives here, not in
/// application code: `insert_event` must reject a duplicate key with
/// [`crate::LedgerError::DuplicateDedupeKey`] even when two callers race.
pub trait LedgerStore: Send + Sync {
    fn insert_account(&self, account: &Account) -> LedgerResult<()>;

    fn account(&self, id: &AccountId) -> LedgerResult<Option<Account>>;

    fn insert_instrument(&self, instrument: &Instrument) -> LedgerResult<()>;

    fn instrument(&self, id: &InstrumentId) -> LedgerResult<Option<Instrument>>;

    /// All instruments visible to the given account scope: user-wide rows
    /// plus rows local to the account.
    fn instruments_in_scope(
        &self,
        user: &UserId,
        account: &AccountId,
    ) -> LedgerResult<Vec<Instrument>>;

    fn event_by_dedupe_key(&self, dedupe_key: &str) -> LedgerResult<Option<Event>>;

    /// Persist an event and all of its legs in one atomic transaction;
    /// either every row becomes visible or none does.
    fn insert_event(&self, event: &Event, legs: &[Leg]) -> LedgerResult<()>;

    /// Clear a soft-deleted event's deletion flag.
    fn restore_event(&self, id: &EventId) -> LedgerResult<()>;

    fn soft_delete_event(&self, id: &EventId, at: DateTime<Utc>) -> LedgerResult<()>;

    /// Soft-delete every still-active event created by the given import
    /// run. Returns how many events were flagged.
    fn soft_delete_import(&self, run: &ImportRunId, at: DateTime<Utc>) -> LedgerResult<usize>;

    fn insert_import_run(&self, run: &ImportRun) -> LedgerResult<()>;

    fn import_run(&self, id: &ImportRunId) -> LedgerResult<Option<ImportRun>>;

    fn event_legs(&self, event: &EventId) -> LedgerResult<Vec<Leg>>;

    /// Current balances for one user scope: `SUM(amount_minor)` of all
    /// legs whose parent event is not soft-deleted, grouped by
    /// (account, instrument). Committed reads only.
    fn balances(&self, user: &UserId) -> LedgerResult<Vec<Balance>>;
}
