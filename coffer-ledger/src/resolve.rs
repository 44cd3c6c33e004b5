use std::collections::HashMap;

use tracing::debug;

use coffer_core::{AccountId, Instrument, InstrumentDraft, InstrumentId, InstrumentKind, UserId};

use crate::{LedgerError, LedgerResult, LedgerStore};

/// Instruments resolved for one import batch, indexed by uppercased code.
#[derive(Clone, Debug, Default)]
pub struct ResolvedInstruments {
    by_code: HashMap<String, Instrument>,
}

impl ResolvedInstruments {
    pub fn get(&self, code: &str) -> Option<&Instrument> {
        self.by_code.get(&code.to_uppercase())
    }

    /// Resolve a code or fail with the per-transaction "unknown
    /// instrument" condition the orchestrator routes to the error list.
    pub fn require(&self, code: &str) -> LedgerResult<&Instrument> {
        self.get(code)
            .ok_or_else(|| LedgerError::UnknownInstrument(code.to_string()))
    }

    pub fn len(&self) -> usize {
        self.by_code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_code.is_empty()
    }
}

/// Resolve every instrument code an import batch requires against the
/// persisted instruments visible in scope.
///
/// Existing instruments are reused as-is; their kind and minor unit are
/// never mutated here. A code with no persisted instrument is created only
/// when the caller supplied a draft for it, otherwise it is simply absent
/// from the result and each referencing transaction fails resolution
/// individually.
pub fn resolve_instruments(
    store: &dyn LedgerStore,
    user: &UserId,
    account: &AccountId,
    codes: &[String],
    drafts: &[InstrumentDraft],
) -> LedgerResult<ResolvedInstruments> {
    let mut by_code: HashMap<String, Instrument> = store
        .instruments_in_scope(user, account)?
        .into_iter()
        .map(|instrument| (instrument.code.to_uppercase(), instrument))
        .collect();

    let drafts_by_code: HashMap<String, &InstrumentDraft> = drafts
        .iter()
        .map(|draft| (draft.code.to_uppercase(), draft))
        .collect();

    let mut resolved = ResolvedInstruments::default();
    for code in codes {
        let upper = code.to_uppercase();
        if let Some(existing) = by_code.get(&upper) {
            resolved.by_code.insert(upper, existing.clone());
            continue;
        }
        let Some(draft) = drafts_by_code.get(&upper) else {
            debug!(code = %code, "no instrument or draft for code");
            continue;
        };
        let instrument = Instrument {
            id: InstrumentId::generate(),
            user_id: user.clone(),
            // Currencies are useful across the whole user scope; anything
            // else stays local to the account that introduced it.
            account_id: if draft.kind == InstrumentKind::Fiat {
                None
            } else {
                Some(account.clone())
            },
            code: draft.code.clone(),
            kind: draft.kind,
            minor_unit: draft.minor_unit,
            name: draft.name.clone(),
        };
        store.insert_instrument(&instrument)?;
        debug!(code = %instrument.code, kind = %instrument.kind, "created instrument from draft");
        by_code.insert(upper.clone(), instrument.clone());
        resolved.by_code.insert(upper, instrument);
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Account, SqliteLedgerStore};
    use tempfile::tempdir;

    fn fixture() -> (tempfile::TempDir, SqliteLedgerStore, Account) {
        let dir = tempdir().unwrap();
        let store = SqliteLedgerStore::open(dir.path().join("ledger.db")).unwrap();
        let account = Account::new(AccountId::from("A1"), UserId::from("U1"), "Everyday");
        store.insert_account(&account).unwrap();
        (dir, store, account)
    }

    #[test]
    fn reuses_existing_instrument_without_mutation() {
        let (_dir, store, account) = fixture();
        let existing = Instrument {
            id: InstrumentId::generate(),
            user_id: account.user_id.clone(),
            account_id: None,
            code: "AUD".to_string(),
            kind: InstrumentKind::Fiat,
            minor_unit: 2,
            name: "Australian Dollar".to_string(),
        };
        store.insert_instrument(&existing).unwrap();

        // A draft with conflicting attributes must not win over the
        // persisted row.
        let draft = InstrumentDraft::new("aud", InstrumentKind::Other, 0, "Wrong");
        let resolved = resolve_instruments(
            &store,
            &account.user_id,
            &account.id,
            &["aud".to_string()],
            &[draft],
        )
        .unwrap();
        let instrument = resolved.require("AUD").unwrap();
        assert_eq!(instrument.id, existing.id);
        assert_eq!(instrument.kind, InstrumentKind::Fiat);
        assert_eq!(instrument.minor_unit, 2);
    }

    #[test]
    fn creates_from_draft_when_authorized() {
        let (_dir, store, account) = fixture();
        let draft = InstrumentDraft::new("VDAL", InstrumentKind::Security, 0, "Vanguard");
        let resolved = resolve_instruments(
            &store,
            &account.user_id,
            &account.id,
            &["VDAL".to_string()],
            &[draft],
        )
        .unwrap();
        let instrument = resolved.require("vdal").unwrap();
        assert_eq!(instrument.account_id, Some(account.id.clone()));

        // Created instrument is persisted for the next batch.
        let visible = store
            .instruments_in_scope(&account.user_id, &account.id)
            .unwrap();
        assert_eq!(visible.len(), 1);
    }

    #[test]
    fn unknown_code_without_draft_is_left_unresolved() {
        let (_dir, store, account) = fixture();
        let resolved = resolve_instruments(
            &store,
            &account.user_id,
            &account.id,
            &["MYSTERY".to_string()],
            &[],
        )
        .unwrap();
        assert!(resolved.is_empty());
        let err = resolved.require("MYSTERY").unwrap_err();
        assert!(matches!(err, LedgerError::UnknownInstrument(code) if code == "MYSTERY"));
    }
}
