use tracing::{debug, warn};

use uuid::Uuid;

use coffer_core::{
    dedupe_key, AccountId, CanonicalTransaction, CategoryId, EventId, ImportRunId, Instrument,
};

use crate::{Event, LedgerError, LedgerResult, LedgerStore, Leg, RestorePolicy};

/// A canonical leg after instrument resolution and minor-unit conversion.
#[derive(Clone, Debug)]
pub struct ResolvedLeg {
    pub instrument: Instrument,
    pub amount_minor: i64,
    pub category: Option<CategoryId>,
    pub note: Option<String>,
}

impl ResolvedLeg {
    pub fn new(instrument: Instrument, amount_minor: i64) -> Self {
        Self {
            instrument,
            amount_minor,
            category: None,
            note: None,
        }
    }
}

/// Outcome of posting one canonical transaction to the ledger.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PostOutcome {
    /// A new event and all of its legs were persisted.
    Created(EventId),
    /// A duplicate already exists and nothing was written. The key is
    /// reported for the caller's audit trail.
    Skipped { dedupe_key: String },
    /// A soft-deleted duplicate existed and its deletion flag was cleared.
    Restored(EventId),
}

/// Post one canonical transaction: create it, skip it as a duplicate, or
/// restore a soft-deleted prior copy, per the supplied restore policy.
///
/// The pre-check lookup is an optimization only; the storage layer's
/// dedupe-key uniqueness constraint is the source of truth, and losing a
/// race to a concurrent import degrades to `Skipped` rather than an error.
pub fn post_transaction(
    store: &dyn LedgerStore,
    account: &AccountId,
    transaction: &CanonicalTransaction,
    legs: &[ResolvedLeg],
    policy: RestorePolicy,
    import_run: Option<&ImportRunId>,
) -> LedgerResult<PostOutcome> {
    let primary = legs.first().ok_or(LedgerError::EmptyTransaction)?;
    let key = dedupe_key(
        account,
        transaction.external_id.as_deref(),
        transaction.effective_at,
        primary.amount_minor,
        &transaction.description,
    );

    if let Some(existing) = store.event_by_dedupe_key(&key)? {
        return settle_duplicate(store, existing, key, policy);
    }

    let event = Event {
        id: EventId::generate(),
        account_id: account.clone(),
        event_type: transaction.event_type,
        effective_at: transaction.effective_at,
        posted_at: transaction.posted_at,
        description: transaction.description.clone(),
        external_id: transaction.external_id.clone(),
        dedupe_key: key.clone(),
        import_run_id: import_run.cloned(),
        deleted_at: None,
        meta: None,
    };
    let rows: Vec<Leg> = legs
        .iter()
        .map(|leg| Leg {
            id: Uuid::new_v4().to_string(),
            event_id: event.id.clone(),
            account_id: account.clone(),
            instrument_id: leg.instrument.id.clone(),
            amount_minor: leg.amount_minor,
            category: leg.category.clone(),
            note: leg.note.clone(),
        })
        .collect();

    match store.insert_event(&event, &rows) {
        Ok(()) => {
            debug!(event = %event.id, key = %key, legs = rows.len(), "posted ledger event");
            Ok(PostOutcome::Created(event.id))
        }
        Err(LedgerError::DuplicateDedupeKey(_)) => {
            // Lost an insert race with a concurrent import of the same
            // transaction; whichever copy won is the canonical one.
            warn!(key = %key, "concurrent duplicate insert, settling as existing");
            match store.event_by_dedupe_key(&key)? {
                Some(existing) => settle_duplicate(store, existing, key, policy),
                None => Ok(PostOutcome::Skipped { dedupe_key: key }),
            }
        }
        Err(err) => Err(err),
    }
}

fn settle_duplicate(
    store: &dyn LedgerStore,
    existing: Event,
    key: String,
    policy: RestorePolicy,
) -> LedgerResult<PostOutcome> {
    if existing.deleted_at.is_some() && policy == RestorePolicy::Restore {
        store.restore_event(&existing.id)?;
        debug!(event = %existing.id, key = %key, "restored soft-deleted duplicate");
        return Ok(PostOutcome::Restored(existing.id));
    }
    debug!(event = %existing.id, key = %key, "skipped duplicate");
    Ok(PostOutcome::Skipped { dedupe_key: key })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Account, SqliteLedgerStore};
    use chrono::{TimeZone, Utc};
    use coffer_core::{CanonicalLeg, EventType, InstrumentId, InstrumentKind, LegAmount, UserId};
    use tempfile::tempdir;

    fn fixture() -> (tempfile::TempDir, SqliteLedgerStore, Account, Instrument) {
        let dir = tempdir().unwrap();
        let store = SqliteLedgerStore::open(dir.path().join("ledger.db")).unwrap();
        let account = Account::new(AccountId::from("A1"), UserId::from("U1"), "Everyday");
        store.insert_account(&account).unwrap();
        let instrument = Instrument {
            id: InstrumentId::generate(),
            user_id: account.user_id.clone(),
            account_id: None,
            code: "AUD".to_string(),
            kind: InstrumentKind::Fiat,
            minor_unit: 2,
            name: "Australian Dollar".to_string(),
        };
        store.insert_instrument(&instrument).unwrap();
        (dir, store, account, instrument)
    }

    fn groceries() -> CanonicalTransaction {
        CanonicalTransaction::single(
            "L2",
            EventType::Purchase,
            Utc.with_ymd_and_hms(2025, 1, 10, 0, 0, 0).single().unwrap(),
            "WOOLWORTHS 1234 PENRITH",
            CanonicalLeg::new("AUD", LegAmount::Minor(-5520)),
        )
    }

    #[test]
    fn second_post_of_same_transaction_is_skipped() {
        let (_dir, store, account, instrument) = fixture();
        let tx = groceries();
        let legs = [ResolvedLeg::new(instrument, -5520)];

        let first = post_transaction(&store, &account.id, &tx, &legs, RestorePolicy::Skip, None)
            .unwrap();
        assert!(matches!(first, PostOutcome::Created(_)));

        let second = post_transaction(&store, &account.id, &tx, &legs, RestorePolicy::Skip, None)
            .unwrap();
        let PostOutcome::Skipped { dedupe_key } = second else {
            panic!("expected skip, got {second:?}");
        };
        assert_eq!(dedupe_key.len(), 64);
    }

    #[test]
    fn soft_deleted_duplicate_respects_restore_policy() {
        let (_dir, store, account, instrument) = fixture();
        let tx = groceries();
        let legs = [ResolvedLeg::new(instrument, -5520)];

        let PostOutcome::Created(event_id) =
            post_transaction(&store, &account.id, &tx, &legs, RestorePolicy::Skip, None).unwrap()
        else {
            panic!("expected creation");
        };
        store.soft_delete_event(&event_id, Utc::now()).unwrap();

        // Without restore the duplicate stays deleted.
        let skipped =
            post_transaction(&store, &account.id, &tx, &legs, RestorePolicy::Skip, None).unwrap();
        assert!(matches!(skipped, PostOutcome::Skipped { .. }));
        let still_deleted = store
            .event_by_dedupe_key(match &skipped {
                PostOutcome::Skipped { dedupe_key } => dedupe_key,
                _ => unreachable!(),
            })
            .unwrap()
            .unwrap();
        assert!(still_deleted.deleted_at.is_some());

        // With restore the same key reactivates the original event.
        let restored = post_transaction(
            &store,
            &account.id,
            &tx,
            &legs,
            RestorePolicy::Restore,
            None,
        )
        .unwrap();
        assert_eq!(restored, PostOutcome::Restored(event_id.clone()));
        let reactivated = store.event_by_dedupe_key(&still_deleted.dedupe_key).unwrap().unwrap();
        assert!(reactivated.deleted_at.is_none());
    }

    #[test]
    fn empty_leg_list_is_rejected() {
        let (_dir, store, account, _) = fixture();
        let tx = groceries();
        let err = post_transaction(&store, &account.id, &tx, &[], RestorePolicy::Skip, None)
            .unwrap_err();
        assert!(matches!(err, LedgerError::EmptyTransaction));
    }

    #[test]
    fn external_id_path_yields_account_scoped_key() {
        let (_dir, store, account, instrument) = fixture();
        let tx = groceries().with_external_id("prov-77");
        let legs = [ResolvedLeg::new(instrument, -5520)];
        post_transaction(&store, &account.id, &tx, &legs, RestorePolicy::Skip, None).unwrap();
        assert!(store.event_by_dedupe_key("A1:prov-77").unwrap().is_some());
    }
}
