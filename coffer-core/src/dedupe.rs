use chrono::{DateTime, SecondsFormat, Utc};
use sha2::{Digest, Sha256};

use crate::AccountId;

/// Derive the stable identity of a transaction for duplicate detection.
///
/// Providers that supply a stable transaction id get exact identity:
/// `{account}:{external_id}`. Everything else falls back to a SHA-256 hash
/// over the invariant fields, so re-importing an identical file is a no-op.
///
/// The hash covers only the primary (first) leg's amount. Two multi-leg
/// transactions on the same day with the same account, description, and
/// first-leg amount collide even if later legs differ; likewise two real
/// same-day transactions with identical amount and normalized description
/// are indistinguishable. Both are accepted limits of the hash path.
pub fn dedupe_key(
    account: &AccountId,
    external_id: Option<&str>,
    effective_at: DateTime<Utc>,
    primary_amount_minor: i64,
    description: &str,
) -> String {
    if let Some(external) = external_id {
        return format!("{account}:{external}");
    }
    let normalized = normalize_description(description);
    let payload = format!(
        "{}|{}|{}|{}",
        account,
        effective_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        primary_amount_minor,
        normalized
    );
    let digest = Sha256::digest(payload.as_bytes());
    hex::encode(digest)
}

/// Trim, lowercase, and collapse internal whitespace runs to single spaces
/// so cosmetic differences between exports of the same row hash alike.
pub fn normalize_description(description: &str) -> String {
    description
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
