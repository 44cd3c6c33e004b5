//! Domain types shared by the Coffer ledger engine: string ids, the
//! canonical transaction model produced by format parsers, minor-unit
//! amount arithmetic, and the dedupe key computer.

mod amount;
mod canonical;
mod dedupe;
mod ids;
mod instrument;

pub use amount::{format_minor, AmountError, LegAmount};
pub use canonical::{CanonicalLeg, CanonicalTransaction, EventType, ParseIssue};
pub use dedupe::{dedupe_key, normalize_description};
pub use ids::{AccountId, CategoryId, EventId, ImportRunId, InstrumentId, UserId};
pub use instrument::{Instrument, InstrumentDraft, InstrumentKind};
