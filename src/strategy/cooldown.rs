//! Action cooldown gate.

use chrono::{DateTime, Duration, Utc};

/// Whether an action taken at `last_action_at` still blocks a new one at `now`.
///
/// True iff `now - last_action_at < cooldown_seconds`. A zero cooldown never
/// blocks; a `now` earlier than the last action always does.
pub fn is_cooling(
    last_action_at: DateTime<Utc>,
    now: DateTime<Utc>,
    cooldown_seconds: u64,
) -> bool {
    let window_ms = cooldown_seconds.saturating_mul(1000).min(i64::MAX as u64) as i64;
    let window = Duration::milliseconds(window_ms);
    now - last_action_at < window
}

/// [`is_cooling`] for a position that may never have acted.
pub fn is_cooling_since(
    last_action_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    cooldown_seconds: u64,
) -> bool {
    last_action_at.is_some_and(|last| is_cooling(last, now, cooldown_seconds))
}
