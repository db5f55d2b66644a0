use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use sha2::{Digest, Sha256};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use uuid::Uuid;

use crate::DomainResult;
use crate::error::DomainError;

pub fn uuid_v7_without_dashes() -> String {
    Uuid::now_v7().simple().to_string()
}

pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

pub fn format_ms_rfc3339(epoch_ms: i64) -> String {
    let fallback = OffsetDateTime::UNIX_EPOCH;
    let value =
        OffsetDateTime::from_unix_timestamp_nanos(epoch_ms as i128 * 1_000_000).unwrap_or(fallback);
    value
        .format(&Rfc3339)
        .unwrap_or("1970-01-01T00:00:00Z".to_string())
}

/// Deterministic hex digest of a serializable value. Used to derive the
/// submission idempotency key from (survey_id, stable_key, submitted_at_ms).
pub fn fingerprint<T>(value: &T) -> DomainResult<String>
where
    T: Serialize,
{
    let payload = serde_json::to_vec(value).map_err(|err| {
        DomainError::Validation(format!("failed to serialize fingerprint payload: {err}"))
    })?;
    let digest = Sha256::digest(&payload);
    Ok(hex::encode(digest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_deterministic() {
        let left = fingerprint(&("s1", "10.0.0.7", 1_700_000_000_000_i64)).unwrap();
        let right = fingerprint(&("s1", "10.0.0.7", 1_700_000_000_000_i64)).unwrap();
        assert_eq!(left, right);
    }

    #[test]
    fn fingerprint_changes_with_input() {
        let left = fingerprint(&("s1", "10.0.0.7", 1_i64)).unwrap();
        let right = fingerprint(&("s1", "10.0.0.7", 2_i64)).unwrap();
        assert_ne!(left, right);
    }

    #[test]
    fn format_ms_renders_rfc3339() {
        assert_eq!(format_ms_rfc3339(0), "1970-01-01T00:00:00Z");
    }
}
