//! Turning provider exports into ledger history: the canonical parser
//! contract, the shipped provider parsers, and the batch import
//! orchestrator that drives resolve → dedupe → write per row.

mod bank_csv;
mod parser;
mod runner;
mod trade_csv;

pub use parser::{Parsed, ProviderFormat};
pub use runner::{run_import, ImportError, ImportRequest};
