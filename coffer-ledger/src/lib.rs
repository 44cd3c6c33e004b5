//! Ledger persistence and posting for Coffer: the storage abstraction, the
//! SQLite backend, the duplicate-aware ledger writer, instrument
//! resolution, and read-side balance aggregation.

mod balance;
mod error;
mod record;
mod resolve;
mod sqlite;
mod store;
mod writer;

pub use balance::{balance_report, BalanceReport};
pub use error::{LedgerError, LedgerResult};
pub use record::{
    Account, Balance, Event, EventStatus, ImportPhase, ImportRun, Leg, RestorePolicy, RowError,
};
pub use resolve::{resolve_instruments, ResolvedInstruments};
pub use sqlite::SqliteLedgerStore;
pub use store::LedgerStore;
pub use writer::{post_transaction, PostOutcome, ResolvedLeg};
