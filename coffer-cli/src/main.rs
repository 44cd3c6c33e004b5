use std::fs;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use coffer_core::{format_minor, AccountId, InstrumentDraft, InstrumentKind, UserId};
use coffer_import::{run_import, ImportRequest, ProviderFormat};
use coffer_ledger::{balance_report, Account, LedgerStore, RestorePolicy, SqliteLedgerStore};

#[derive(Parser)]
#[command(
    name = "coffer",
    version,
    about = "Append-only personal ledger with import reconciliation"
)]
struct Cli {
    /// Path to the ledger database file.
    #[arg(long, global = true, default_value = "coffer.db")]
    db: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Register an account in a user scope.
    InitAccount {
        #[arg(long)]
        user: String,
        #[arg(long)]
        account: String,
        #[arg(long)]
        name: String,
    },
    /// Import a provider export into an account.
    Import {
        #[arg(long)]
        user: String,
        #[arg(long)]
        account: String,
        /// Provider format: bank-csv or trade-csv.
        #[arg(long)]
        format: ProviderFormat,
        /// Reactivate soft-deleted duplicates instead of skipping them.
        #[arg(long)]
        restore: bool,
        /// Authorize creating an instrument, repeatable.
        /// Shape: CODE:KIND:MINOR_UNIT:NAME, e.g. AUD:fiat:2:Australian Dollar
        #[arg(long = "draft", value_name = "DRAFT")]
        drafts: Vec<String>,
        /// The export file to import.
        file: PathBuf,
    },
    /// Show current balances for a user scope.
    Balances {
        #[arg(long)]
        user: String,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();
    let cli = Cli::parse();
    let store = SqliteLedgerStore::open(&cli.db)
        .with_context(|| format!("opening ledger database {}", cli.db.display()))?;

    match cli.command {
        Command::InitAccount {
            user,
            account,
            name,
        } => {
            let record = Account::new(AccountId::new(account), UserId::new(user), name);
            store.insert_account(&record)?;
            info!(account = %record.id, user = %record.user_id, "account registered");
            Ok(())
        }
        Command::Import {
            user,
            account,
            format,
            restore,
            drafts,
            file,
        } => {
            let raw_content = fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let drafts = drafts
                .iter()
                .map(|spec| parse_draft(spec))
                .collect::<Result<Vec<_>>>()?;
            let request = ImportRequest {
                account_id: AccountId::new(account),
                imported_by: UserId::new(user),
                filename: file
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_else(|| file.display().to_string()),
                raw_content,
                format,
                restore_policy: if restore {
                    RestorePolicy::Restore
                } else {
                    RestorePolicy::Skip
                },
                instrument_drafts: drafts,
            };
            let run = run_import(&store, &request)?;
            println!(
                "run {}: imported {} skipped {} restored {} errors {}",
                run.id, run.imported_count, run.skipped_count, run.restored_count, run.error_count
            );
            for error in &run.errors {
                println!("  [{}] {}: {}", error.phase, error.row, error.message);
            }
            if run.error_count > 0 {
                bail!("{} rows failed; see the import run for details", run.error_count);
            }
            Ok(())
        }
        Command::Balances { user } => {
            let report = balance_report(&store, &UserId::new(user))?;
            for balance in report.rows() {
                let instrument = store
                    .instrument(&balance.instrument_id)?
                    .ok_or_else(|| anyhow!("dangling instrument {}", balance.instrument_id))?;
                println!(
                    "{}  {:<8} {:>16}",
                    balance.account_id,
                    instrument.code,
                    format_minor(balance.amount_minor, instrument.minor_unit)
                );
            }
            Ok(())
        }
    }
}

/// Parse a `CODE:KIND:MINOR_UNIT:NAME` draft argument.
fn parse_draft(spec: &str) -> Result<InstrumentDraft> {
    let mut parts = spec.splitn(4, ':');
    let (code, kind, minor, name) = match (parts.next(), parts.next(), parts.next(), parts.next())
    {
        (Some(code), Some(kind), Some(minor), Some(name)) => (code, kind, minor, name),
        _ => bail!("draft must be CODE:KIND:MINOR_UNIT:NAME, got {spec:?}"),
    };
    let kind = InstrumentKind::from_str(kind).map_err(|err| anyhow!(err))?;
    let minor_unit: u32 = minor
        .parse()
        .with_context(|| format!("invalid minor unit in draft {spec:?}"))?;
    Ok(InstrumentDraft::new(code, kind, minor_unit, name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_draft_argument() {
        let draft = parse_draft("AUD:fiat:2:Australian Dollar").unwrap();
        assert_eq!(draft.code, "AUD");
        assert_eq!(draft.kind, InstrumentKind::Fiat);
        assert_eq!(draft.minor_unit, 2);
        assert_eq!(draft.name, "Australian Dollar");
    }

    #[test]
    fn rejects_malformed_draft() {
        assert!(parse_draft("AUD:fiat").is_err());
        assert!(parse_draft("AUD:money:2:Name").is_err());
    }
}
