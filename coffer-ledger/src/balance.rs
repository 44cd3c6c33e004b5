use coffer_core::{AccountId, InstrumentId, UserId};

use crate::{Balance, LedgerResult, LedgerStore};

/// Read-side snapshot of current balances for one user scope.
///
/// All aggregation happens in integer minor units inside the store; this
/// type only carries the grouped rows and offers lookups for callers.
#[derive(Clone, Debug, Default)]
pub struct BalanceReport {
    rows: Vec<Balance>,
}

impl BalanceReport {
    pub fn rows(&self) -> &[Balance] {
        &self.rows
    }

    /// Minor-unit balance for one (account, instrument) pair, or `None`
    /// when no active leg references the pair.
    pub fn amount(&self, account: &AccountId, instrument: &InstrumentId) -> Option<i64> {
        self.rows
            .iter()
            .find(|row| &row.account_id == account && &row.instrument_id == instrument)
            .map(|row| row.amount_minor)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Sum non-deleted legs grouped by (account, instrument). No side effects.
pub fn balance_report(store: &dyn LedgerStore, user: &UserId) -> LedgerResult<BalanceReport> {
    let rows = store.balances(user)?;
    Ok(BalanceReport { rows })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{post_transaction, Account, PostOutcome, ResolvedLeg, RestorePolicy, SqliteLedgerStore};
    use chrono::{TimeZone, Utc};
    use coffer_core::{
        CanonicalLeg, CanonicalTransaction, EventType, Instrument, InstrumentKind, LegAmount,
    };
    use tempfile::tempdir;

    fn instrument(account: &Account, code: &str, kind: InstrumentKind, minor: u32) -> Instrument {
        Instrument {
            id: InstrumentId::generate(),
            user_id: account.user_id.clone(),
            account_id: None,
            code: code.to_string(),
            kind,
            minor_unit: minor,
            name: code.to_string(),
        }
    }

    #[test]
    fn sums_active_legs_and_ignores_soft_deleted_events() {
        let dir = tempdir().unwrap();
        let store = SqliteLedgerStore::open(dir.path().join("ledger.db")).unwrap();
        let account = Account::new(AccountId::from("A1"), UserId::from("U1"), "Everyday");
        store.insert_account(&account).unwrap();
        let aud = instrument(&account, "AUD", InstrumentKind::Fiat, 2);
        store.insert_instrument(&aud).unwrap();

        let effective = Utc.with_ymd_and_hms(2025, 1, 10, 0, 0, 0).single().unwrap();
        let salary = CanonicalTransaction::single(
            "L2",
            EventType::Payout,
            effective,
            "ACME PAYROLL",
            CanonicalLeg::new("AUD", LegAmount::Minor(250_000)),
        );
        let groceries = CanonicalTransaction::single(
            "L3",
            EventType::Purchase,
            effective,
            "WOOLWORTHS 1234 PENRITH",
            CanonicalLeg::new("AUD", LegAmount::Minor(-5520)),
        );
        post_transaction(
            &store,
            &account.id,
            &salary,
            &[ResolvedLeg::new(aud.clone(), 250_000)],
            RestorePolicy::Skip,
            None,
        )
        .unwrap();
        let PostOutcome::Created(groceries_id) = post_transaction(
            &store,
            &account.id,
            &groceries,
            &[ResolvedLeg::new(aud.clone(), -5520)],
            RestorePolicy::Skip,
            None,
        )
        .unwrap() else {
            panic!("expected creation");
        };

        let report = balance_report(&store, &account.user_id).unwrap();
        assert_eq!(report.amount(&account.id, &aud.id), Some(244_480));

        // Soft-deleting removes the legs from the sum without deleting
        // the rows themselves.
        store.soft_delete_event(&groceries_id, Utc::now()).unwrap();
        let report = balance_report(&store, &account.user_id).unwrap();
        assert_eq!(report.amount(&account.id, &aud.id), Some(250_000));
        assert_eq!(store.event_legs(&groceries_id).unwrap().len(), 1);
    }
}
