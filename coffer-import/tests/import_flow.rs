use tempfile::tempdir;

use coffer_core::{AccountId, InstrumentDraft, InstrumentKind, UserId};
use coffer_import::{run_import, ImportError, ImportRequest, ProviderFormat};
use coffer_ledger::{
    balance_report, Account, ImportPhase, LedgerStore, RestorePolicy, SqliteLedgerStore,
};

const BANK_FILE: &str = "\
date,description,amount,currency,id
2025-01-10,WOOLWORTHS 1234 PENRITH,-55.20,AUD,
2025-01-11,ACME PAYROLL,2500.00,AUD,
";

const TRADE_FILE: &str = "\
order_id,date,side,symbol,units,total,currency
ord-1,2025-03-05,buy,VDAL,19,855.00,AUD
";

fn fixture() -> (tempfile::TempDir, SqliteLedgerStore, Account) {
    let dir = tempdir().unwrap();
    let store = SqliteLedgerStore::open(dir.path().join("ledger.db")).unwrap();
    let account = Account::new(AccountId::from("A1"), UserId::from("U1"), "Everyday");
    store.insert_account(&account).unwrap();
    (dir, store, account)
}

fn aud_draft() -> InstrumentDraft {
    InstrumentDraft::new("AUD", InstrumentKind::Fiat, 2, "Australian Dollar")
}

fn bank_request(account: &Account, restore_policy: RestorePolicy) -> ImportRequest {
    ImportRequest {
        account_id: account.id.clone(),
        imported_by: account.user_id.clone(),
        filename: "statement.csv".to_string(),
        raw_content: BANK_FILE.to_string(),
        format: ProviderFormat::BankCsv,
        restore_policy,
        instrument_drafts: vec![aud_draft()],
    }
}

#[test]
fn reimporting_the_same_file_is_a_no_op() {
    let (_dir, store, account) = fixture();
    let request = bank_request(&account, RestorePolicy::Skip);

    let first = run_import(&store, &request).unwrap();
    assert_eq!(first.imported_count, 2);
    assert_eq!(first.skipped_count, 0);
    assert_eq!(first.error_count, 0);

    let second = run_import(&store, &request).unwrap();
    assert_eq!(second.imported_count, 0);
    assert_eq!(second.skipped_count, 2);
    assert_eq!(second.skipped_keys.len(), 2);

    // The audit record is persisted and immutable.
    let reloaded = store.import_run(&second.id).unwrap().unwrap();
    assert_eq!(reloaded.skipped_count, 2);
    assert_eq!(reloaded.restore_policy, RestorePolicy::Skip);
}

#[test]
fn trade_import_produces_one_event_with_two_legs_and_correct_balances() {
    let (_dir, store, account) = fixture();
    let request = ImportRequest {
        account_id: account.id.clone(),
        imported_by: account.user_id.clone(),
        filename: "trades.csv".to_string(),
        raw_content: TRADE_FILE.to_string(),
        format: ProviderFormat::TradeCsv,
        restore_policy: RestorePolicy::Skip,
        instrument_drafts: vec![
            aud_draft(),
            InstrumentDraft::new("VDAL", InstrumentKind::Security, 0, "Vanguard Diversified"),
        ],
    };

    let run = run_import(&store, &request).unwrap();
    assert_eq!(run.imported_count, 1);
    assert_eq!(run.error_count, 0);

    let event = store.event_by_dedupe_key("A1:ord-1").unwrap().unwrap();
    let legs = store.event_legs(&event.id).unwrap();
    assert_eq!(legs.len(), 2);

    let instruments = store
        .instruments_in_scope(&account.user_id, &account.id)
        .unwrap();
    let aud = instruments.iter().find(|i| i.code == "AUD").unwrap();
    let vdal = instruments.iter().find(|i| i.code == "VDAL").unwrap();

    let report = balance_report(&store, &account.user_id).unwrap();
    assert_eq!(report.amount(&account.id, &vdal.id), Some(19));
    assert_eq!(report.amount(&account.id, &aud.id), Some(-85500));
}

#[test]
fn restore_policy_controls_reactivation_of_deleted_history() {
    let (_dir, store, account) = fixture();
    let first = run_import(&store, &bank_request(&account, RestorePolicy::Skip)).unwrap();
    assert_eq!(first.imported_count, 2);

    // Cascading removal of everything the run created.
    let flagged = store.soft_delete_import(&first.id, chrono::Utc::now()).unwrap();
    assert_eq!(flagged, 2);
    let report = balance_report(&store, &account.user_id).unwrap();
    assert!(report.is_empty());

    // Without restore the duplicates stay deleted.
    let skipped = run_import(&store, &bank_request(&account, RestorePolicy::Skip)).unwrap();
    assert_eq!(skipped.imported_count, 0);
    assert_eq!(skipped.skipped_count, 2);
    assert_eq!(skipped.restored_count, 0);
    assert!(balance_report(&store, &account.user_id).unwrap().is_empty());

    // With restore the same file reactivates the original events.
    let restored = run_import(&store, &bank_request(&account, RestorePolicy::Restore)).unwrap();
    assert_eq!(restored.imported_count, 0);
    assert_eq!(restored.restored_count, 2);
    let report = balance_report(&store, &account.user_id).unwrap();
    let instruments = store
        .instruments_in_scope(&account.user_id, &account.id)
        .unwrap();
    let aud = instruments.iter().find(|i| i.code == "AUD").unwrap();
    assert_eq!(report.amount(&account.id, &aud.id), Some(244_480));
}

#[test]
fn unknown_instrument_fails_the_row_but_not_the_batch() {
    let (_dir, store, account) = fixture();
    let raw = "\
date,description,amount,currency
2025-01-10,GROCERIES,-55.20,AUD
2025-01-11,MYSTERY PURCHASE,-10.00,XXX
";
    let request = ImportRequest {
        account_id: account.id.clone(),
        imported_by: account.user_id.clone(),
        filename: "statement.csv".to_string(),
        raw_content: raw.to_string(),
        format: ProviderFormat::BankCsv,
        restore_policy: RestorePolicy::Skip,
        instrument_drafts: vec![aud_draft()],
    };

    let run = run_import(&store, &request).unwrap();
    assert_eq!(run.imported_count, 1);
    assert_eq!(run.error_count, 1);
    assert_eq!(run.errors[0].phase, ImportPhase::Resolve);
    assert!(run.errors[0].message.contains("XXX"));
}

#[test]
fn parse_issues_are_merged_into_the_error_list() {
    let (_dir, store, account) = fixture();
    let raw = "\
date,description,amount,currency
garbage-date,BAD ROW,-1.00,AUD
2025-01-10,GOOD ROW,-2.00,AUD
";
    let request = ImportRequest {
        account_id: account.id.clone(),
        imported_by: account.user_id.clone(),
        filename: "statement.csv".to_string(),
        raw_content: raw.to_string(),
        format: ProviderFormat::BankCsv,
        restore_policy: RestorePolicy::Skip,
        instrument_drafts: vec![aud_draft()],
    };

    let run = run_import(&store, &request).unwrap();
    assert_eq!(run.imported_count, 1);
    assert_eq!(run.error_count, 1);
    assert_eq!(run.errors[0].phase, ImportPhase::Parse);
    assert_eq!(run.errors[0].row, "line 2");
}

#[test]
fn same_row_with_distinct_external_ids_never_collides() {
    let (_dir, store, account) = fixture();
    let raw = "\
date,description,amount,currency,id
2025-01-10,DOUBLE COFFEE,-4.50,AUD,tx-1
2025-01-10,DOUBLE COFFEE,-4.50,AUD,tx-2
";
    let request = ImportRequest {
        account_id: account.id.clone(),
        imported_by: account.user_id.clone(),
        filename: "statement.csv".to_string(),
        raw_content: raw.to_string(),
        format: ProviderFormat::BankCsv,
        restore_policy: RestorePolicy::Skip,
        instrument_drafts: vec![aud_draft()],
    };

    let run = run_import(&store, &request).unwrap();
    assert_eq!(run.imported_count, 2);
    assert_eq!(run.skipped_count, 0);
}

#[test]
fn missing_or_foreign_account_aborts_before_any_row() {
    let (_dir, store, account) = fixture();
    let mut request = bank_request(&account, RestorePolicy::Skip);
    request.account_id = AccountId::from("nope");
    assert!(matches!(
        run_import(&store, &request).unwrap_err(),
        ImportError::AccountNotFound(_)
    ));

    let mut request = bank_request(&account, RestorePolicy::Skip);
    request.imported_by = UserId::from("intruder");
    assert!(matches!(
        run_import(&store, &request).unwrap_err(),
        ImportError::AccountNotFound(_)
    ));

    // Nothing was written for either attempt.
    assert!(balance_report(&store, &account.user_id).unwrap().is_empty());
}
