use std::fs;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use coffer_core::{
    AccountId, CategoryId, EventId, EventType, ImportRunId, Instrument, InstrumentId,
    InstrumentKind, UserId,
};

use crate::{
    Account, Balance, Event, ImportRun, LedgerError, LedgerResult, LedgerStore, Leg,
    RestorePolicy, RowError,
};

const LEDGER_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS accounts (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    name TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS accounts_idx_user ON accounts(user_id);

CREATE TABLE IF NOT EXISTS instruments (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    account_id TEXT,
    code TEXT NOT NULL COLLATE NOCASE,
    kind TEXT NOT NULL,
    minor_unit INTEGER NOT NULL,
    name TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS instruments_scope_user
    ON instruments(user_id, code) WHERE account_id IS NULL;
CREATE UNIQUE INDEX IF NOT EXISTS instruments_scope_account
    ON instruments(user_id, account_id, code) WHERE account_id IS NOT NULL;

CREATE TABLE IF NOT EXISTS events (
    id TEXT PRIMARY KEY,
    account_id TEXT NOT NULL REFERENCES accounts(id),
    event_type TEXT NOT NULL,
    effective_at TEXT NOT NULL,
    posted_at TEXT,
    description TEXT NOT NULL,
    external_id TEXT,
    dedupe_key TEXT NOT NULL UNIQUE,
    import_run_id TEXT,
    deleted_at TEXT,
    meta TEXT
);
CREATE INDEX IF NOT EXISTS events_idx_account_effective
    ON events(account_id, effective_at);
CREATE INDEX IF NOT EXISTS events_idx_import_run
    ON events(import_run_id);

CREATE TABLE IF NOT EXISTS legs (
    id TEXT PRIMARY KEY,
    event_id TEXT NOT NULL REFERENCES events(id),
    account_id TEXT NOT NULL,
    instrument_id TEXT NOT NULL REFERENCES instruments(id),
    amount_minor INTEGER NOT NULL,
    category_id TEXT,
    note TEXT
);
CREATE INDEX IF NOT EXISTS legs_idx_event ON legs(event_id);
CREATE INDEX IF NOT EXISTS legs_idx_account_instrument
    ON legs(account_id, instrument_id);

CREATE TABLE IF NOT EXISTS import_runs (
    id TEXT PRIMARY KEY,
    account_id TEXT NOT NULL REFERENCES accounts(id),
    filename TEXT NOT NULL,
    imported_count INTEGER NOT NULL,
    skipped_count INTEGER NOT NULL,
    restored_count INTEGER NOT NULL,
    error_count INTEGER NOT NULL,
    skipped_keys TEXT NOT NULL,
    errors TEXT NOT NULL,
    restore_policy TEXT NOT NULL,
    created_at TEXT NOT NULL
);
"#;

/// SQLite-backed ledger store used by the import runtime and the CLI.
#[derive(Clone, Debug)]
pub struct SqliteLedgerStore {
    path: PathBuf,
}

impl SqliteLedgerStore {
    pub fn open(path: impl Into<PathBuf>) -> LedgerResult<Self> {
        let store = Self { path: path.into() };
        store.initialize_schema()?;
        Ok(store)
    }

    fn initialize_schema(&self) -> LedgerResult<()> {
        let conn = self.connect()?;
        conn.execute_batch(LEDGER_SCHEMA)?;
        Ok(())
    }

    fn connect(&self) -> LedgerResult<Connection> {
        if let Some(parent) = self.path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(&self.path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;",
        )?;
        Ok(conn)
    }
}

impl LedgerStore for SqliteLedgerStore {
    fn insert_account(&self, account: &Account) -> LedgerResult<()> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO accounts (id, user_id, name, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                account.id.as_str(),
                account.user_id.as_str(),
                account.name,
                account.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn account(&self, id: &AccountId) -> LedgerResult<Option<Account>> {
        let conn = self.connect()?;
        conn.query_row(
            "SELECT id, user_id, name, created_at FROM accounts WHERE id = ?1",
            params![id.as_str()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            },
        )
        .optional()?
        .map(|(id, user_id, name, created_at)| {
            Ok(Account {
                id: AccountId::new(id),
                user_id: UserId::new(user_id),
                name,
                created_at: parse_timestamp(&created_at)?,
            })
        })
        .transpose()
    }

    fn insert_instrument(&self, instrument: &Instrument) -> LedgerResult<()> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO instruments (id, user_id, account_id, code, kind, minor_unit, name)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                instrument.id.as_str(),
                instrument.user_id.as_str(),
                instrument.account_id.as_ref().map(|id| id.as_str()),
                instrument.code,
                instrument.kind.as_str(),
                instrument.minor_unit,
                instrument.name,
            ],
        )?;
        Ok(())
    }

    fn instrument(&self, id: &InstrumentId) -> LedgerResult<Option<Instrument>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, account_id, code, kind, minor_unit, name
             FROM instruments WHERE id = ?1",
        )?;
        let mut rows = stmt.query(params![id.as_str()])?;
        match rows.next()? {
            Some(row) => Ok(Some(row_to_instrument(row)?)),
            None => Ok(None),
        }
    }

    fn instruments_in_scope(
        &self,
        user: &UserId,
        account: &AccountId,
    ) -> LedgerResult<Vec<Instrument>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, account_id, code, kind, minor_unit, name
             FROM instruments
             WHERE user_id = ?1 AND (account_id IS NULL OR account_id = ?2)
             ORDER BY code",
        )?;
        let mut rows = stmt.query(params![user.as_str(), account.as_str()])?;
        let mut instruments = Vec::new();
        while let Some(row) = rows.next()? {
            instruments.push(row_to_instrument(row)?);
        }
        Ok(instruments)
    }

    fn event_by_dedupe_key(&self, dedupe_key: &str) -> LedgerResult<Option<Event>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT id, account_id, event_type, effective_at, posted_at, description,
                    external_id, dedupe_key, import_run_id, deleted_at, meta
             FROM events WHERE dedupe_key = ?1",
        )?;
        let mut rows = stmt.query(params![dedupe_key])?;
        match rows.next()? {
            Some(row) => Ok(Some(row_to_event(row)?)),
            None => Ok(None),
        }
    }

    fn insert_event(&self, event: &Event, legs: &[Leg]) -> LedgerResult<()> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO events (
                id, account_id, event_type, effective_at, posted_at, description,
                external_id, dedupe_key, import_run_id, deleted_at, meta
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                event.id.as_str(),
                event.account_id.as_str(),
                event.event_type.as_str(),
                event.effective_at.to_rfc3339(),
                event.posted_at.map(|ts| ts.to_rfc3339()),
                event.description,
                event.external_id,
                event.dedupe_key,
                event.import_run_id.as_ref().map(|id| id.as_str()),
                event.deleted_at.map(|ts| ts.to_rfc3339()),
                event.meta.as_ref().map(|value| value.to_string()),
            ],
        )
        .map_err(|err| map_unique_violation(err, &event.dedupe_key))?;
        for leg in legs {
            tx.execute(
                "INSERT INTO legs (
                    id, event_id, account_id, instrument_id, amount_minor, category_id, note
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    leg.id,
                    leg.event_id.as_str(),
                    leg.account_id.as_str(),
                    leg.instrument_id.as_str(),
                    leg.amount_minor,
                    leg.category.as_ref().map(|id| id.as_str()),
                    leg.note,
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn restore_event(&self, id: &EventId) -> LedgerResult<()> {
        let conn = self.connect()?;
        let changed = conn.execute(
            "UPDATE events SET deleted_at = NULL WHERE id = ?1",
            params![id.as_str()],
        )?;
        if changed == 0 {
            return Err(LedgerError::EventNotFound(id.clone()));
        }
        Ok(())
    }

    fn soft_delete_event(&self, id: &EventId, at: DateTime<Utc>) -> LedgerResult<()> {
        let conn = self.connect()?;
        let changed = conn.execute(
            "UPDATE events SET deleted_at = ?2 WHERE id = ?1 AND deleted_at IS NULL",
            params![id.as_str(), at.to_rfc3339()],
        )?;
        if changed == 0 {
            return Err(LedgerError::EventNotFound(id.clone()));
        }
        Ok(())
    }

    fn soft_delete_import(&self, run: &ImportRunId, at: DateTime<Utc>) -> LedgerResult<usize> {
        let conn = self.connect()?;
        let changed = conn.execute(
            "UPDATE events SET deleted_at = ?2
             WHERE import_run_id = ?1 AND deleted_at IS NULL",
            params![run.as_str(), at.to_rfc3339()],
        )?;
        Ok(changed)
    }

    fn insert_import_run(&self, run: &ImportRun) -> LedgerResult<()> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO import_runs (
                id, account_id, filename, imported_count, skipped_count, restored_count,
                error_count, skipped_keys, errors, restore_policy, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                run.id.as_str(),
                run.account_id.as_str(),
                run.filename,
                run.imported_count,
                run.skipped_count,
                run.restored_count,
                run.error_count,
                serde_json::to_string(&run.skipped_keys)?,
                serde_json::to_string(&run.errors)?,
                run.restore_policy.as_str(),
                run.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn import_run(&self, id: &ImportRunId) -> LedgerResult<Option<ImportRun>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT id, account_id, filename, imported_count, skipped_count, restored_count,
                    error_count, skipped_keys, errors, restore_policy, created_at
             FROM import_runs WHERE id = ?1",
        )?;
        let mut rows = stmt.query(params![id.as_str()])?;
        match rows.next()? {
            Some(row) => Ok(Some(row_to_import_run(row)?)),
            None => Ok(None),
        }
    }

    fn event_legs(&self, event: &EventId) -> LedgerResult<Vec<Leg>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT id, event_id, account_id, instrument_id, amount_minor, category_id, note
             FROM legs WHERE event_id = ?1 ORDER BY id",
        )?;
        let mut rows = stmt.query(params![event.as_str()])?;
        let mut legs = Vec::new();
        while let Some(row) = rows.next()? {
            legs.push(row_to_leg(row)?);
        }
        Ok(legs)
    }

    fn balances(&self, user: &UserId) -> LedgerResult<Vec<Balance>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT l.account_id, l.instrument_id, SUM(l.amount_minor)
             FROM legs l
             JOIN events e ON e.id = l.event_id
             JOIN accounts a ON a.id = l.account_id
             WHERE a.user_id = ?1 AND e.deleted_at IS NULL
             GROUP BY l.account_id, l.instrument_id
             ORDER BY l.account_id, l.instrument_id",
        )?;
        let mut rows = stmt.query(params![user.as_str()])?;
        let mut balances = Vec::new();
        while let Some(row) = rows.next()? {
            balances.push(Balance {
                account_id: AccountId::new(row.get::<_, String>(0)?),
                instrument_id: InstrumentId::new(row.get::<_, String>(1)?),
                amount_minor: row.get::<_, i64>(2)?,
            });
        }
        Ok(balances)
    }
}

fn map_unique_violation(err: rusqlite::Error, dedupe_key: &str) -> LedgerError {
    if let rusqlite::Error::SqliteFailure(code, Some(message)) = &err {
        if code.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
            && message.contains("events.dedupe_key")
        {
            return LedgerError::DuplicateDedupeKey(dedupe_key.to_string());
        }
    }
    LedgerError::from(err)
}

fn parse_timestamp(raw: &str) -> LedgerResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|err| LedgerError::Serialization(format!("invalid timestamp {raw}: {err}")))
}

fn row_to_instrument(row: &rusqlite::Row<'_>) -> LedgerResult<Instrument> {
    let kind_str: String = row.get(4)?;
    Ok(Instrument {
        id: InstrumentId::new(row.get::<_, String>(0)?),
        user_id: UserId::new(row.get::<_, String>(1)?),
        account_id: row.get::<_, Option<String>>(2)?.map(AccountId::new),
        code: row.get(3)?,
        kind: InstrumentKind::from_str(&kind_str).map_err(LedgerError::Serialization)?,
        minor_unit: row.get(5)?,
        name: row.get(6)?,
    })
}

fn row_to_event(row: &rusqlite::Row<'_>) -> LedgerResult<Event> {
    let event_type_str: String = row.get(2)?;
    let effective_at: String = row.get(3)?;
    let posted_at: Option<String> = row.get(4)?;
    let deleted_at: Option<String> = row.get(9)?;
    let meta: Option<String> = row.get(10)?;
    Ok(Event {
        id: EventId::new(row.get::<_, String>(0)?),
        account_id: AccountId::new(row.get::<_, String>(1)?),
        event_type: EventType::from_str(&event_type_str).map_err(LedgerError::Serialization)?,
        effective_at: parse_timestamp(&effective_at)?,
        posted_at: posted_at.as_deref().map(parse_timestamp).transpose()?,
        description: row.get(5)?,
        external_id: row.get(6)?,
        dedupe_key: row.get(7)?,
        import_run_id: row.get::<_, Option<String>>(8)?.map(ImportRunId::new),
        deleted_at: deleted_at.as_deref().map(parse_timestamp).transpose()?,
        meta: meta
            .map(|json| {
                serde_json::from_str(&json).map_err(|err| {
                    LedgerError::Serialization(format!("invalid event meta payload: {err}"))
                })
            })
            .transpose()?,
    })
}

fn row_to_leg(row: &rusqlite::Row<'_>) -> LedgerResult<Leg> {
    Ok(Leg {
        id: row.get(0)?,
        event_id: EventId::new(row.get::<_, String>(1)?),
        account_id: AccountId::new(row.get::<_, String>(2)?),
        instrument_id: InstrumentId::new(row.get::<_, String>(3)?),
        amount_minor: row.get(4)?,
        category: row.get::<_, Option<String>>(5)?.map(CategoryId::new),
        note: row.get(6)?,
    })
}

fn row_to_import_run(row: &rusqlite::Row<'_>) -> LedgerResult<ImportRun> {
    let skipped_keys_json: String = row.get(7)?;
    let errors_json: String = row.get(8)?;
    let policy_str: String = row.get(9)?;
    let created_at: String = row.get(10)?;
    let skipped_keys: Vec<String> = serde_json::from_str(&skipped_keys_json)?;
    let errors: Vec<RowError> = serde_json::from_str(&errors_json)?;
    Ok(ImportRun {
        id: ImportRunId::new(row.get::<_, String>(0)?),
        account_id: AccountId::new(row.get::<_, String>(1)?),
        filename: row.get(2)?,
        imported_count: row.get(3)?,
        skipped_count: row.get(4)?,
        restored_count: row.get(5)?,
        error_count: row.get(6)?,
        skipped_keys,
        errors,
        restore_policy: RestorePolicy::from_str(&policy_str)
            .map_err(LedgerError::Serialization)?,
        created_at: parse_timestamp(&created_at)?,
    })
}
