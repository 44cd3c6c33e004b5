use std::collections::BTreeSet;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info};

use coffer_core::{AccountId, ImportRunId, InstrumentDraft, UserId};
use coffer_ledger::{
    post_transaction, resolve_instruments, ImportPhase, ImportRun, LedgerError, LedgerStore,
    PostOutcome, ResolvedLeg, RestorePolicy, RowError,
};

use crate::ProviderFormat;

/// One batch import invocation.
#[derive(Clone, Debug)]
pub struct ImportRequest {
    pub account_id: AccountId,
    pub imported_by: UserId,
    pub filename: String,
    pub raw_content: String,
    pub format: ProviderFormat,
    pub restore_policy: RestorePolicy,
    /// Authorizations to create instruments first referenced by this file.
    pub instrument_drafts: Vec<InstrumentDraft>,
}

/// Batch-setup failures, surfaced directly to the caller before any row
/// is processed. Row-level failures never take this path; they land in
/// the import run's error list instead.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("account not found in scope: {0}")]
    AccountNotFound(AccountId),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Drive one import batch end to end and persist its audit record.
///
/// Rows are processed in parser order. Every transaction goes through
/// resolve → dedupe-aware write; failures of any phase are recorded and
/// counted without aborting the remaining rows. Exactly one [`ImportRun`]
/// is persisted after the last row, and every event created here carries
/// its id.
pub fn run_import(
    store: &dyn LedgerStore,
    request: &ImportRequest,
) -> Result<ImportRun, ImportError> {
    let account = store
        .account(&request.account_id)?
        .filter(|account| account.user_id == request.imported_by)
        .ok_or_else(|| ImportError::AccountNotFound(request.account_id.clone()))?;

    let parsed = request.format.parse(&request.raw_content);
    info!(
        file = %request.filename,
        format = %request.format,
        transactions = parsed.transactions.len(),
        parse_issues = parsed.issues.len(),
        "starting import batch"
    );

    let mut errors: Vec<RowError> = parsed
        .issues
        .iter()
        .map(|issue| {
            RowError::new(
                format!("line {}", issue.line),
                ImportPhase::Parse,
                issue.message.clone(),
            )
        })
        .collect();

    let codes: Vec<String> = parsed
        .transactions
        .iter()
        .flat_map(|tx| tx.legs.iter().map(|leg| leg.instrument_code.clone()))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let resolved = resolve_instruments(
        store,
        &account.user_id,
        &account.id,
        &codes,
        &request.instrument_drafts,
    )?;

    let run_id = ImportRunId::generate();
    let mut imported_count = 0u32;
    let mut skipped_count = 0u32;
    let mut restored_count = 0u32;
    let mut skipped_keys: Vec<String> = Vec::new();

    'rows: for transaction in &parsed.transactions {
        let mut legs = Vec::with_capacity(transaction.legs.len());
        for leg in &transaction.legs {
            let instrument = match resolved.require(&leg.instrument_code) {
                Ok(instrument) => instrument.clone(),
                Err(err) => {
                    errors.push(RowError::new(
                        transaction.group_key.clone(),
                        ImportPhase::Resolve,
                        err.to_string(),
                    ));
                    continue 'rows;
                }
            };
            let amount_minor = match leg.amount.to_minor(instrument.minor_unit) {
                Ok(amount) => amount,
                Err(err) => {
                    errors.push(RowError::new(
                        transaction.group_key.clone(),
                        ImportPhase::Resolve,
                        err.to_string(),
                    ));
                    continue 'rows;
                }
            };
            legs.push(ResolvedLeg {
                instrument,
                amount_minor,
                category: leg.category.clone(),
                note: leg.note.clone(),
            });
        }

        match post_transaction(
            store,
            &account.id,
            transaction,
            &legs,
            request.restore_policy,
            Some(&run_id),
        ) {
            Ok(PostOutcome::Created(event_id)) => {
                debug!(row = %transaction.group_key, event = %event_id, "imported");
                imported_count += 1;
            }
            Ok(PostOutcome::Skipped { dedupe_key }) => {
                debug!(row = %transaction.group_key, key = %dedupe_key, "skipped duplicate");
                skipped_count += 1;
                skipped_keys.push(dedupe_key);
            }
            Ok(PostOutcome::Restored(event_id)) => {
                debug!(row = %transaction.group_key, event = %event_id, "restored");
                restored_count += 1;
            }
            Err(err) => {
                errors.push(RowError::new(
                    transaction.group_key.clone(),
                    ImportPhase::Insert,
                    err.to_string(),
                ));
            }
        }
    }

    let run = ImportRun {
        id: run_id,
        account_id: account.id,
        filename: request.filename.clone(),
        imported_count,
        skipped_count,
        restored_count,
        error_count: errors.len() as u32,
        skipped_keys,
        errors,
        restore_policy: request.restore_policy,
        created_at: Utc::now(),
    };
    store.insert_import_run(&run)?;
    info!(
        run = %run.id,
        imported = run.imported_count,
        skipped = run.skipped_count,
        restored = run.restored_count,
        errors = run.error_count,
        "import batch finished"
    );
    Ok(run)
}
